use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::prelude::*;

use chitchat_core::ChatTab;

mod api;
mod chat;
mod cli;
mod config;
mod push;
mod session;
mod state;
#[cfg(test)]
mod test_helpers;

use crate::config::{ChitchatConfig, CliOverrides};

#[derive(Parser)]
#[command(name = "chitchat")]
#[command(about = "Terminal client for the chitchat messaging service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Custom data directory (defaults to ~/.chitchat)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Base URL of the chat API (overrides config.toml)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Base URL of the push socket (overrides config.toml)
    #[arg(long, global = true)]
    ws_url: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive client (default)
    Tui,

    /// Create an account
    Register(CredentialArgs),

    /// Log in and remember the session
    Login(CredentialArgs),

    /// Forget the stored session
    Logout,

    /// Show the logged-in user
    Whoami,

    /// List all users
    Users(JsonArgs),

    /// List your chats
    Chats(ChatsArgs),

    /// Print a chat's history
    Messages(TargetArgs),

    /// Send a message to a chat
    Send(SendArgs),

    /// Start a chat with one or more users
    New(NewArgs),

    /// Delete a chat
    Delete(DeleteArgs),

    /// Print incoming messages until Ctrl-C
    Watch,
}

#[derive(Parser)]
struct CredentialArgs {
    #[arg(short, long)]
    username: String,

    /// Read from stdin when omitted
    #[arg(short, long)]
    password: Option<String>,
}

#[derive(Parser)]
struct JsonArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum TabArg {
    All,
    Private,
    Group,
}

impl From<TabArg> for ChatTab {
    fn from(t: TabArg) -> Self {
        match t {
            TabArg::All => ChatTab::All,
            TabArg::Private => ChatTab::Private,
            TabArg::Group => ChatTab::Group,
        }
    }
}

#[derive(Parser)]
struct ChatsArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,

    #[arg(long, value_enum, default_value = "all")]
    tab: TabArg,

    /// Case-insensitive name filter
    #[arg(long)]
    search: Option<String>,
}

#[derive(Parser)]
struct TargetArgs {
    /// Chat ID, name, or ID prefix
    chat: String,
}

#[derive(Parser)]
struct SendArgs {
    /// Chat ID, name, or ID prefix
    chat: String,

    #[arg(required = true, trailing_var_arg = true)]
    text: Vec<String>,
}

#[derive(Parser)]
struct NewArgs {
    /// User IDs or usernames
    #[arg(required = true)]
    users: Vec<String>,

    /// Required when more than one user is given
    #[arg(long)]
    group_name: Option<String>,
}

#[derive(Parser)]
struct DeleteArgs {
    /// Chat ID, name, or ID prefix
    chat: String,

    /// Skip confirmation prompt
    #[arg(short, long)]
    force: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ChitchatConfig::new(
        cli.data_dir.clone(),
        CliOverrides {
            api_url: cli.api_url.clone(),
            ws_url: cli.ws_url.clone(),
        },
    )?;

    let interactive = matches!(cli.command, None | Some(Commands::Tui));
    init_logging(&config, cli.debug, interactive)?;
    tracing::debug!(
        data_dir = %config.data_dir.display(),
        config_file = %config.config_toml_path().display(),
        api_url = %config.server.api_url,
        "configuration loaded"
    );

    match cli.command {
        None | Some(Commands::Tui) => cli::tui_command(&config).await,
        Some(Commands::Register(args)) => {
            cli::register_command(&config, &args.username, args.password).await
        }
        Some(Commands::Login(args)) => {
            cli::login_command(&config, &args.username, args.password).await
        }
        Some(Commands::Logout) => cli::logout_command(&config),
        Some(Commands::Whoami) => cli::whoami_command(&config),
        Some(Commands::Users(args)) => cli::users_command(&config, args.json).await,
        Some(Commands::Chats(args)) => {
            cli::chats_command(&config, args.json, args.tab.into(), args.search).await
        }
        Some(Commands::Messages(args)) => cli::messages_command(&config, &args.chat).await,
        Some(Commands::Send(args)) => {
            cli::send_command(&config, &args.chat, &args.text.join(" ")).await
        }
        Some(Commands::New(args)) => cli::new_command(&config, &args.users, args.group_name).await,
        Some(Commands::Delete(args)) => {
            cli::delete_command(&config, &args.chat, args.force).await
        }
        Some(Commands::Watch) => cli::watch_command(&config).await,
    }
}

/// The TUI owns the terminal, so it logs to a file; everything else logs to
/// stderr.
fn init_logging(config: &ChitchatConfig, debug: bool, interactive: bool) -> Result<()> {
    let default_directive = if debug {
        "chitchat=debug,chitchat_core=debug,warn"
    } else {
        "chitchat=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    if interactive {
        let log_path = config.log_path();
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("Failed to open log file {:?}", log_path))?;
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    }
    Ok(())
}
