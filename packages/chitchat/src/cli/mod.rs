pub mod app;
pub mod login;
pub mod picker;
pub mod view;

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use tracing::{debug, warn};

use chitchat_core::{ChatTab, Conversation, Directory, ServerEvent, Session, filter_conversations};

use crate::api::ApiClient;
use crate::chat::{self, Composer, SendOutcome, SkipReason};
use crate::config::ChitchatConfig;
use crate::push::{PushConnection, PushEvent};
use crate::session::SessionStore;
use crate::state::ChatState;

/// Interactive client (the default command).
pub async fn tui_command(config: &ChitchatConfig) -> Result<()> {
    app::run(config).await
}

// =============================================================================
// Session commands
// =============================================================================

pub async fn register_command(
    config: &ChitchatConfig,
    username: &str,
    password: Option<String>,
) -> Result<()> {
    let password = match password {
        Some(p) => p,
        None => read_password()?,
    };
    let api = ApiClient::new(&config.server)?;
    chat::register(&api, username, &password).await?;
    eprintln!("{}", chat::REGISTERED_NOTICE);
    Ok(())
}

pub async fn login_command(
    config: &ChitchatConfig,
    username: &str,
    password: Option<String>,
) -> Result<()> {
    let password = match password {
        Some(p) => p,
        None => read_password()?,
    };
    let api = ApiClient::new(&config.server)?;
    let store = SessionStore::new(config.session_path());
    let session = chat::login(&api, &store, username, &password).await?;
    eprintln!("Logged in as {} (id {})", session.username, session.user_id);
    Ok(())
}

pub fn logout_command(config: &ChitchatConfig) -> Result<()> {
    let store = SessionStore::new(config.session_path());
    chat::logout(&store, None)?;
    eprintln!("Logged out.");
    Ok(())
}

pub fn whoami_command(config: &ChitchatConfig) -> Result<()> {
    let store = SessionStore::new(config.session_path());
    match store.load()? {
        Some(session) => println!("{} (id {})", session.username, session.user_id),
        None => println!("Not logged in."),
    }
    Ok(())
}

// =============================================================================
// Listing
// =============================================================================

pub async fn users_command(config: &ChitchatConfig, json: bool) -> Result<()> {
    let (session, api) = authed(config)?;
    let users = api.users().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&users)?);
        return Ok(());
    }
    println!("{:<26} {}", "ID", "USERNAME");
    println!("{}", "-".repeat(48));
    for u in &users {
        let marker = if u.id == session.user_id { " (you)" } else { "" };
        println!("{:<26} {}{}", u.id, u.username, marker);
    }
    println!("\n{} user(s)", users.len());
    Ok(())
}

#[derive(Serialize)]
struct ChatRow<'a> {
    id: &'a str,
    name: String,
    is_group: bool,
    participants: &'a [String],
    last_message_at: Option<f64>,
}

pub async fn chats_command(
    config: &ChitchatConfig,
    json: bool,
    tab: ChatTab,
    search: Option<String>,
) -> Result<()> {
    let (session, api) = authed(config)?;
    let (directory, conversations) = fetch_overview(&api, &session).await?;
    let name_of = |c: &Conversation| directory.conversation_name(c, &session.user_id);
    let visible = filter_conversations(
        &conversations,
        tab,
        search.as_deref().unwrap_or(""),
        name_of,
    );

    if json {
        let rows: Vec<ChatRow> = visible
            .iter()
            .map(|c| ChatRow {
                id: &c.id,
                name: name_of(c),
                is_group: c.is_group,
                participants: &c.participants,
                last_message_at: c.last_message_at,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if visible.is_empty() {
        println!("No chats found.");
        return Ok(());
    }
    println!("{:<26} {:<24} {:<8} {}", "ID", "NAME", "KIND", "ACTIVITY");
    println!("{}", "-".repeat(80));
    for c in &visible {
        let kind = if c.is_group { "group" } else { "private" };
        println!(
            "{:<26} {:<24} {:<8} {}",
            c.id,
            name_of(c),
            kind,
            c.activity_label()
        );
    }
    println!("\n{} chat(s)", visible.len());
    Ok(())
}

pub async fn messages_command(config: &ChitchatConfig, target: &str) -> Result<()> {
    let (session, api) = authed(config)?;
    let (directory, conversations) = fetch_overview(&api, &session).await?;
    let conv = match_conversation(&conversations, &directory, &session.user_id, target)?;

    let messages = api.messages(&conv.id).await?;
    if messages.is_empty() {
        println!("No messages yet.");
    }
    for m in &messages {
        println!(
            "[{}] {}: {}",
            view::clock_time(m.timestamp),
            directory.sender_label(&m.sender_id, &session.user_id),
            m.text
        );
    }
    Ok(())
}

// =============================================================================
// Mutations
// =============================================================================

/// Send one message over the push channel and wait for its echo.
pub async fn send_command(config: &ChitchatConfig, target: &str, text: &str) -> Result<()> {
    let (session, api) = authed(config)?;
    let (directory, conversations) = fetch_overview(&api, &session).await?;
    let conv = match_conversation(&conversations, &directory, &session.user_id, target)?.clone();
    let name = directory.conversation_name(&conv, &session.user_id);

    let mut state = ChatState::new(&session);
    state.set_directory(directory);
    state.select(conv);

    let (push, mut events) = PushConnection::connect(config.server.push_url(&session.user_id));
    if !push.wait_open().await {
        anyhow::bail!("Could not connect to the chat server at {}", config.server.ws_url);
    }

    let mut composer = Composer::new();
    composer.set_input(text);
    let client_msg_id = match composer.send(&mut state, &push) {
        SendOutcome::Sent { client_msg_id } => client_msg_id,
        SendOutcome::Skipped(SkipReason::EmptyText) => anyhow::bail!("Nothing to send."),
        SendOutcome::Skipped(reason) => anyhow::bail!("Message not sent ({reason:?})"),
    };
    debug!(client_msg_id = %client_msg_id, "waiting for echo");

    let confirmed = tokio::time::timeout(config.server.request_timeout, async {
        while let Some(ev) = events.recv().await {
            match ev {
                PushEvent::Event(event) => {
                    if state.apply_push(event).confirmed.as_deref() == Some(client_msg_id.as_str()) {
                        return true;
                    }
                }
                PushEvent::Closed => return false,
                PushEvent::Opened => {}
            }
        }
        false
    })
    .await
    .unwrap_or(false);
    push.shutdown().await;

    if confirmed {
        eprintln!("Sent to {name}.");
    } else {
        warn!(client_msg_id = %client_msg_id, "no echo for sent message");
        eprintln!("Sent to {name} (not confirmed by server).");
    }
    Ok(())
}

pub async fn new_command(
    config: &ChitchatConfig,
    targets: &[String],
    group_name: Option<String>,
) -> Result<()> {
    let (session, api) = authed(config)?;
    let directory = Directory::from_users(api.users().await?);
    let selected = resolve_users(&directory, targets)?;

    let started = chat::start_conversation(
        &api,
        &session.user_id,
        &selected,
        group_name.as_deref().unwrap_or(""),
    )
    .await?;
    match started.conversation() {
        Some(conv) => eprintln!(
            "Chat ready: {} ({})",
            directory.conversation_name(conv, &session.user_id),
            conv.id
        ),
        None => eprintln!("Chat ready: {}", started.id),
    }
    Ok(())
}

pub async fn delete_command(config: &ChitchatConfig, target: &str, force: bool) -> Result<()> {
    let (session, api) = authed(config)?;
    let (directory, conversations) = fetch_overview(&api, &session).await?;
    let conv = match_conversation(&conversations, &directory, &session.user_id, target)?;
    let name = directory.conversation_name(conv, &session.user_id);

    if !force && !confirm(&format!("Delete chat \"{name}\"? This cannot be undone. (y/N) "))? {
        eprintln!("Cancelled.");
        return Ok(());
    }

    chat::delete_conversation(&api, &session.user_id, &conv.id)
        .await
        .context("Failed to delete chat")?;
    eprintln!("Deleted chat \"{name}\".");
    Ok(())
}

/// Print push events until Ctrl-C or the server closes the channel.
pub async fn watch_command(config: &ChitchatConfig) -> Result<()> {
    let (session, api) = authed(config)?;
    let (directory, conversations) = fetch_overview(&api, &session).await?;
    let mut state = ChatState::new(&session);
    state.set_directory(directory);
    let seq = state.begin_list_refresh();
    state.apply_conversations(seq, conversations);

    let (push, mut events) = PushConnection::connect(config.server.push_url(&session.user_id));
    if !push.wait_open().await {
        anyhow::bail!("Could not connect to the chat server at {}", config.server.ws_url);
    }
    eprintln!("Watching as {}. Ctrl-C to stop.", session.username);

    loop {
        tokio::select! {
            ev = events.recv() => {
                let Some(ev) = ev else { break };
                match ev {
                    PushEvent::Event(ServerEvent::NewMessage { conversation_id, message }) => {
                        let chat = state
                            .find(&conversation_id)
                            .map(|c| state.display_name(c))
                            .unwrap_or_else(|| conversation_id.clone());
                        println!(
                            "[{}] {} · {}: {}",
                            view::clock_time(message.timestamp),
                            chat,
                            state.sender_label(&message.sender_id),
                            message.text
                        );
                        if state.find(&conversation_id).is_none() {
                            refresh(&api, &mut state).await;
                        }
                    }
                    PushEvent::Event(ServerEvent::NewChat { chat_id }) => {
                        refresh(&api, &mut state).await;
                        let name = chat_id
                            .as_deref()
                            .and_then(|id| state.find(id))
                            .map(|c| state.display_name(c))
                            .unwrap_or_else(|| "a new chat".to_string());
                        println!("* added to {name}");
                    }
                    PushEvent::Event(ServerEvent::Unknown(_)) | PushEvent::Opened => {}
                    PushEvent::Closed => {
                        eprintln!("Connection closed.");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    push.shutdown().await;
    Ok(())
}

// =============================================================================
// Helpers
// =============================================================================

fn authed(config: &ChitchatConfig) -> Result<(Session, ApiClient)> {
    let store = SessionStore::new(config.session_path());
    let session = store
        .load()?
        .context("Not logged in. Run `chitchat login -u <username>` first.")?;
    let api = ApiClient::new(&config.server)?.with_token(session.token.clone());
    Ok((session, api))
}

async fn fetch_overview(
    api: &ApiClient,
    session: &Session,
) -> Result<(Directory, Vec<Conversation>)> {
    let (users, conversations) = tokio::try_join!(
        api.users(),
        api.recent_conversations(&session.user_id)
    )?;
    Ok((Directory::from_users(users), conversations))
}

async fn refresh(api: &ApiClient, state: &mut ChatState) {
    let seq = state.begin_list_refresh();
    match api.recent_conversations(state.me()).await {
        Ok(list) => {
            state.apply_conversations(seq, list);
        }
        Err(e) => warn!(error = %e, "failed to refresh conversation list"),
    }
}

fn read_password() -> Result<String> {
    eprint!("Password: ");
    std::io::stderr().flush()?;
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim_end_matches(['\r', '\n']).to_string())
}

fn confirm(prompt: &str) -> Result<bool> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

/// Resolve a conversation target. Tries exact id, then display name, then
/// id prefix.
fn match_conversation<'a>(
    conversations: &'a [Conversation],
    directory: &Directory,
    me: &str,
    target: &str,
) -> Result<&'a Conversation> {
    if conversations.is_empty() {
        anyhow::bail!("No chats yet. Use `chitchat new <user>` to start one.");
    }

    if let Some(c) = conversations.iter().find(|c| c.id == target) {
        return Ok(c);
    }
    if let Some(c) = conversations
        .iter()
        .find(|c| directory.conversation_name(c, me) == target)
    {
        return Ok(c);
    }
    let prefix_matches: Vec<_> = conversations
        .iter()
        .filter(|c| c.id.starts_with(target))
        .collect();
    match prefix_matches.len() {
        0 => anyhow::bail!("No chat found matching '{}'", target),
        1 => Ok(prefix_matches[0]),
        n => anyhow::bail!(
            "Ambiguous: '{}' matches {} chats. Be more specific.",
            target,
            n
        ),
    }
}

/// Resolve user targets (id or username) to ids.
fn resolve_users(directory: &Directory, targets: &[String]) -> Result<Vec<String>> {
    targets
        .iter()
        .map(|t| {
            directory
                .resolve(t)
                .map(|u| u.id.clone())
                .with_context(|| format!("No user found matching '{t}'"))
        })
        .collect()
}
