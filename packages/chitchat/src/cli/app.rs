//! Interactive client: login screen, then the chat screen.
//!
//! The loop owns all state. Network calls run as spawned tasks that post an
//! [`AppEvent`] back; push events arrive on the connection's own channel.
//! Both are drained before every draw.

use anyhow::Result;
use ratatui::{
    DefaultTerminal,
    crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    widgets::ListState,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use chitchat_core::{ChatTab, Conversation, Directory, Message, Session, User};

use super::login::{AuthMode, LoginAction, LoginForm};
use super::picker::{NewChatPicker, PickerAction};
use super::view;
use crate::api::{ApiClient, ApiError};
use crate::chat::{self, AuthError, Composer, SendOutcome, StartError, Started};
use crate::config::{ChitchatConfig, ServerConfig};
use crate::push::{PushConnection, PushEvent};
use crate::session::SessionStore;
use crate::state::{ChatState, FetchTicket};

/// Results of background work, posted back to the loop.
pub enum AppEvent {
    LoggedIn(Result<Session, AuthError>),
    Registered(Result<(), AuthError>),
    Users(Result<Vec<User>, ApiError>),
    Conversations {
        seq: u64,
        result: Result<Vec<Conversation>, ApiError>,
    },
    Messages {
        ticket: FetchTicket,
        result: Result<Vec<Message>, ApiError>,
    },
    Started(Result<Started, StartError>),
    Deleted {
        conversation_id: String,
        result: Result<Option<Vec<Conversation>>, ApiError>,
    },
}

pub enum Screen {
    Login(LoginForm),
    Chat(Box<ChatScreen>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    List,
    Search,
    Composer,
}

pub enum Modal {
    NewChat(NewChatPicker),
    ConfirmDelete { conversation_id: String, name: String },
}

enum ChatAction {
    None,
    Quit,
    Logout,
}

/// Whether an event left the session usable.
enum Flow {
    Continue,
    Expired,
}

pub struct ChatScreen {
    pub state: ChatState,
    api: ApiClient,
    pub push: PushConnection,
    push_events: mpsc::UnboundedReceiver<PushEvent>,
    pub composer: Composer,
    pub focus: Focus,
    pub tab: ChatTab,
    pub search: String,
    pub list_state: ListState,
    pub modal: Option<Modal>,
    pub status: Option<String>,
}

pub struct App {
    server: ServerConfig,
    store: SessionStore,
    api: ApiClient,
    pub screen: Screen,
    tx: mpsc::UnboundedSender<AppEvent>,
    rx: mpsc::UnboundedReceiver<AppEvent>,
    pub quit: bool,
}

/// Run the interactive client until the user quits.
pub async fn run(config: &ChitchatConfig) -> Result<()> {
    let store = SessionStore::new(config.session_path());
    let mut app = App::new(config.server.clone(), store)?;

    let mut terminal = ratatui::init();
    let result = app.event_loop(&mut terminal);
    ratatui::restore();

    app.shutdown();
    result
}

impl App {
    /// Start on the chat screen when a stored session exists, else on login.
    pub fn new(server: ServerConfig, store: SessionStore) -> Result<Self> {
        let api = ApiClient::new(&server)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let mut app = Self {
            server,
            store,
            api,
            screen: Screen::Login(LoginForm::default()),
            tx,
            rx,
            quit: false,
        };

        match app.store.load() {
            Ok(Some(session)) => {
                info!(user_id = %session.user_id, "resuming stored session");
                app.enter_chat(session);
            }
            Ok(None) => {}
            Err(e) => warn!(path = %app.store.path().display(), error = %e, "ignoring unreadable session file"),
        }
        Ok(app)
    }

    fn event_loop(&mut self, terminal: &mut DefaultTerminal) -> Result<()> {
        loop {
            self.drain();
            if self.quit {
                return Ok(());
            }

            terminal.draw(|frame| view::draw(frame, self))?;

            // Poll with a short timeout so background results land between frames
            if !event::poll(Duration::from_millis(100))? {
                continue;
            }
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    self.handle_key(key);
                }
            }
        }
    }

    /// Close the push channel, if any.
    pub fn shutdown(&mut self) {
        if let Screen::Chat(chat) = &mut self.screen {
            chat.push.close();
        }
    }

    fn enter_chat(&mut self, session: Session) {
        let api = self.api.clone().with_token(session.token.clone());
        let (push, push_events) = PushConnection::connect(self.server.push_url(&session.user_id));
        let mut chat = ChatScreen {
            state: ChatState::new(&session),
            api,
            push,
            push_events,
            composer: Composer::new(),
            focus: Focus::List,
            tab: ChatTab::All,
            search: String::new(),
            list_state: ListState::default(),
            modal: None,
            status: None,
        };
        chat.load_users(&self.tx);
        chat.refresh_list(&self.tx);
        self.screen = Screen::Chat(Box::new(chat));
    }

    fn expire_session(&mut self) {
        warn!("session rejected by server");
        if let Err(e) = self.store.clear() {
            error!(error = %e, "failed to clear session");
        }
        self.shutdown();
        self.screen = Screen::Login(LoginForm::with_notice(chat::SESSION_EXPIRED_NOTICE));
    }

    fn logout(&mut self) {
        let old = std::mem::replace(&mut self.screen, Screen::Login(LoginForm::default()));
        let push = match old {
            Screen::Chat(chat) => Some(chat.push),
            Screen::Login(_) => None,
        };
        if let Err(e) = chat::logout(&self.store, push) {
            error!(error = %e, "logout failed");
        }
    }

    /// Apply everything that has arrived since the last frame.
    pub fn drain(&mut self) {
        while let Ok(ev) = self.rx.try_recv() {
            self.apply(ev);
        }
        if let Screen::Chat(chat) = &mut self.screen {
            while let Ok(ev) = chat.push_events.try_recv() {
                chat.apply_push(ev, &self.tx);
            }
        }
    }

    fn apply(&mut self, ev: AppEvent) {
        match ev {
            AppEvent::LoggedIn(result) => match result {
                Ok(session) => {
                    if matches!(self.screen, Screen::Login(_)) {
                        self.enter_chat(session);
                    }
                }
                Err(e) => {
                    if let Screen::Login(form) = &mut self.screen {
                        form.failed(e.to_string());
                    }
                }
            },
            AppEvent::Registered(result) => {
                if let Screen::Login(form) = &mut self.screen {
                    match result {
                        Ok(()) => form.registered(chat::REGISTERED_NOTICE),
                        Err(e) => form.failed(e.to_string()),
                    }
                }
            }
            other => {
                let Screen::Chat(chat) = &mut self.screen else {
                    debug!("dropping result for a closed chat screen");
                    return;
                };
                if let Flow::Expired = chat.apply(other, &self.tx) {
                    self.expire_session();
                }
            }
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.quit = true;
            return;
        }

        match &mut self.screen {
            Screen::Login(form) => match form.handle_key(key) {
                LoginAction::None => {}
                LoginAction::Quit => self.quit = true,
                LoginAction::Submit {
                    mode,
                    username,
                    password,
                } => {
                    let api = self.api.clone();
                    let tx = self.tx.clone();
                    match mode {
                        AuthMode::Login => {
                            let store = self.store.clone();
                            tokio::spawn(async move {
                                let result = chat::login(&api, &store, &username, &password).await;
                                let _ = tx.send(AppEvent::LoggedIn(result));
                            });
                        }
                        AuthMode::Register => {
                            tokio::spawn(async move {
                                let result = chat::register(&api, &username, &password).await;
                                let _ = tx.send(AppEvent::Registered(result));
                            });
                        }
                    }
                }
            },
            Screen::Chat(chat) => match chat.handle_key(key, &self.tx) {
                ChatAction::None => {}
                ChatAction::Quit => self.quit = true,
                ChatAction::Logout => self.logout(),
            },
        }
    }
}

impl ChatScreen {
    fn load_users(&self, tx: &mpsc::UnboundedSender<AppEvent>) {
        let api = self.api.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = api.users().await;
            let _ = tx.send(AppEvent::Users(result));
        });
    }

    fn refresh_list(&mut self, tx: &mpsc::UnboundedSender<AppEvent>) {
        let seq = self.state.begin_list_refresh();
        let api = self.api.clone();
        let me = self.state.me().to_string();
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = api.recent_conversations(&me).await;
            let _ = tx.send(AppEvent::Conversations { seq, result });
        });
    }

    fn open(&mut self, conv: Conversation, tx: &mpsc::UnboundedSender<AppEvent>) {
        let ticket = self.state.select(conv);
        let api = self.api.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = api.messages(&ticket.conversation_id).await;
            let _ = tx.send(AppEvent::Messages { ticket, result });
        });
        self.focus = Focus::Composer;
        self.status = None;
    }

    /// Conversations currently shown in the list pane.
    pub fn visible(&self) -> Vec<&Conversation> {
        self.state.visible(self.tab, &self.search)
    }

    fn highlighted(&self) -> Option<Conversation> {
        let i = self.list_state.selected()?;
        self.visible().get(i).map(|c| (*c).clone())
    }

    /// Keep the list highlight in range after the list or filter changed.
    fn clamp_selection(&mut self) {
        let total = self.visible().len();
        if total == 0 {
            self.list_state.select(None);
        } else {
            let i = self.list_state.selected().unwrap_or(0).min(total - 1);
            self.list_state.select(Some(i));
        }
    }

    fn replace_list(&mut self, conversations: Vec<Conversation>) {
        let seq = self.state.begin_list_refresh();
        self.state.apply_conversations(seq, conversations);
        self.clamp_selection();
    }

    fn apply(&mut self, ev: AppEvent, tx: &mpsc::UnboundedSender<AppEvent>) -> Flow {
        match ev {
            AppEvent::Users(result) => match result {
                Ok(users) => {
                    self.state.set_directory(Directory::from_users(users));
                    if let Some(Modal::NewChat(picker)) = &mut self.modal {
                        picker.refresh_users(self.state.directory());
                    }
                }
                Err(e) => return failed(e, "failed to load users"),
            },
            AppEvent::Conversations { seq, result } => match result {
                Ok(list) => {
                    if self.state.apply_conversations(seq, list) {
                        self.clamp_selection();
                    }
                }
                Err(e) => return failed(e, "failed to load conversations"),
            },
            AppEvent::Messages { ticket, result } => match result {
                Ok(messages) => {
                    self.state.apply_messages(&ticket, messages);
                }
                Err(e) => return failed(e, "failed to load messages"),
            },
            AppEvent::Started(result) => match result {
                Ok(started) => {
                    self.modal = None;
                    let created = started.conversation().cloned();
                    let Started { id, conversations } = started;
                    if let Some(list) = conversations {
                        self.replace_list(list);
                    }
                    match created {
                        Some(conv) => self.open(conv, tx),
                        None => {
                            debug!(conversation_id = %id, "created chat not in list yet");
                            self.state.clear_active();
                        }
                    }
                }
                Err(StartError::Invalid(e)) => {
                    if let Some(Modal::NewChat(picker)) = &mut self.modal {
                        picker.failed(e.to_string());
                    }
                }
                Err(StartError::Api(e)) => {
                    if e.is_unauthorized() {
                        return Flow::Expired;
                    }
                    error!(error = %e, "failed to create chat");
                    if let Some(Modal::NewChat(picker)) = &mut self.modal {
                        picker.failed("Failed to create chat");
                    }
                }
            },
            AppEvent::Deleted {
                conversation_id,
                result,
            } => match result {
                Ok(list) => {
                    self.state.conversation_removed(&conversation_id);
                    match list {
                        Some(list) => self.replace_list(list),
                        None => self.clamp_selection(),
                    }
                    self.focus = Focus::List;
                    self.status = Some("Chat deleted".to_string());
                }
                Err(e) => {
                    if e.is_unauthorized() {
                        return Flow::Expired;
                    }
                    self.status = Some("Failed to delete chat".to_string());
                }
            },
            AppEvent::LoggedIn(_) | AppEvent::Registered(_) => {}
        }
        Flow::Continue
    }

    fn apply_push(&mut self, ev: PushEvent, tx: &mpsc::UnboundedSender<AppEvent>) {
        match ev {
            PushEvent::Opened => {}
            PushEvent::Event(event) => {
                let outcome = self.state.apply_push(event);
                if outcome.refresh_list {
                    self.refresh_list(tx);
                }
            }
            PushEvent::Closed => {
                self.state.abandon_pending();
                self.status = Some("Disconnected from chat server".to_string());
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent, tx: &mpsc::UnboundedSender<AppEvent>) -> ChatAction {
        if let Some(modal) = &mut self.modal {
            match modal {
                Modal::NewChat(picker) => match picker.handle_key(key) {
                    PickerAction::None => {}
                    PickerAction::Cancel => self.modal = None,
                    PickerAction::Submit {
                        selected,
                        group_name,
                    } => {
                        let api = self.api.clone();
                        let me = self.state.me().to_string();
                        let tx = tx.clone();
                        tokio::spawn(async move {
                            let result =
                                chat::start_conversation(&api, &me, &selected, &group_name).await;
                            let _ = tx.send(AppEvent::Started(result));
                        });
                    }
                },
                Modal::ConfirmDelete {
                    conversation_id, ..
                } => {
                    let conversation_id = conversation_id.clone();
                    self.modal = None;
                    if matches!(key.code, KeyCode::Char('y') | KeyCode::Char('Y')) {
                        self.status = Some("Deleting…".to_string());
                        let api = self.api.clone();
                        let me = self.state.me().to_string();
                        let tx = tx.clone();
                        tokio::spawn(async move {
                            let result = chat::delete_conversation(&api, &me, &conversation_id).await;
                            let _ = tx.send(AppEvent::Deleted {
                                conversation_id,
                                result,
                            });
                        });
                    }
                }
            }
            return ChatAction::None;
        }

        match self.focus {
            Focus::Composer => match key.code {
                KeyCode::Esc | KeyCode::Tab => self.focus = Focus::List,
                KeyCode::Enter => {
                    if let SendOutcome::Skipped(reason) = self.composer.send(&mut self.state, &self.push) {
                        debug!(?reason, "send skipped");
                    }
                }
                KeyCode::Backspace => self.composer.backspace(),
                KeyCode::Char(c) => self.composer.push_char(c),
                _ => {}
            },
            Focus::Search => match key.code {
                KeyCode::Esc | KeyCode::Enter | KeyCode::Tab => self.focus = Focus::List,
                KeyCode::Backspace => {
                    self.search.pop();
                    self.clamp_selection();
                }
                KeyCode::Char(c) => {
                    self.search.push(c);
                    self.clamp_selection();
                }
                _ => {}
            },
            Focus::List => {
                let total = self.visible().len();
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => return ChatAction::Quit,
                    KeyCode::Char('L') => return ChatAction::Logout,
                    KeyCode::Down | KeyCode::Char('j') if total > 0 => {
                        let i = self.list_state.selected().unwrap_or(0);
                        self.list_state.select(Some((i + 1) % total));
                    }
                    KeyCode::Up | KeyCode::Char('k') if total > 0 => {
                        let i = self.list_state.selected().unwrap_or(0);
                        self.list_state
                            .select(Some(if i == 0 { total - 1 } else { i - 1 }));
                    }
                    KeyCode::Enter => {
                        if let Some(conv) = self.highlighted() {
                            self.open(conv, tx);
                        }
                    }
                    KeyCode::Tab | KeyCode::Char('i') if self.state.active().is_some() => {
                        self.focus = Focus::Composer;
                    }
                    KeyCode::Char('/') => self.focus = Focus::Search,
                    KeyCode::Char('t') => {
                        self.tab = self.tab.next();
                        self.clamp_selection();
                    }
                    KeyCode::Char('n') => {
                        self.modal = Some(Modal::NewChat(NewChatPicker::new(
                            self.state.directory(),
                            self.state.me(),
                        )));
                        self.load_users(tx);
                    }
                    KeyCode::Char('d') => {
                        let target = self.highlighted().or_else(|| self.state.active().cloned());
                        if let Some(conv) = target {
                            let name = self.state.display_name(&conv);
                            self.modal = Some(Modal::ConfirmDelete {
                                conversation_id: conv.id,
                                name,
                            });
                        }
                    }
                    KeyCode::Char('r') => self.refresh_list(tx),
                    _ => {}
                }
            }
        }
        ChatAction::None
    }
}

/// Log a failed fetch. Only a rejected token ends the session.
fn failed(e: ApiError, what: &str) -> Flow {
    if e.is_unauthorized() {
        return Flow::Expired;
    }
    warn!(error = %e, "{what}");
    Flow::Continue
}
