//! User-level chat operations: authentication, sending, creating and
//! deleting conversations. Shared by the TUI and the one-shot commands.

use tracing::{error, info, warn};

use chitchat_core::{
    ClientFrame, Conversation, NewConversation, Session, ValidationError, is_blank,
};

use crate::api::{ApiClient, ApiError};
use crate::push::{FrameSink, PushConnection};
use crate::session::SessionStore;
use crate::state::ChatState;

pub const REGISTERED_NOTICE: &str = "Account created! Please log in.";
pub const SESSION_EXPIRED_NOTICE: &str = "Session expired. Please log in again.";

// =============================================================================
// Authentication
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Username and password are required")]
    MissingFields,

    #[error("{}", .0.auth_message())]
    Rejected(ApiError),

    #[error(transparent)]
    Persist(anyhow::Error),
}

fn check_fields(username: &str, password: &str) -> Result<(), AuthError> {
    if is_blank(username) || password.is_empty() {
        return Err(AuthError::MissingFields);
    }
    Ok(())
}

/// Log in and persist the session. On failure nothing is written.
pub async fn login(
    api: &ApiClient,
    store: &SessionStore,
    username: &str,
    password: &str,
) -> Result<Session, AuthError> {
    check_fields(username, password)?;
    let resp = api
        .login(username, password)
        .await
        .map_err(AuthError::Rejected)?;
    let session = Session::from(resp);
    store.save(&session).map_err(AuthError::Persist)?;
    info!(user_id = %session.user_id, "logged in");
    Ok(session)
}

/// Create an account. The caller still has to log in afterwards.
pub async fn register(api: &ApiClient, username: &str, password: &str) -> Result<(), AuthError> {
    check_fields(username, password)?;
    api.register(username, password)
        .await
        .map_err(AuthError::Rejected)?;
    info!(username, "account created");
    Ok(())
}

/// Close the push channel (if any) and forget the stored session.
pub fn logout(store: &SessionStore, push: Option<PushConnection>) -> anyhow::Result<()> {
    if let Some(mut push) = push {
        push.close();
    }
    store.clear()?;
    info!("logged out");
    Ok(())
}

// =============================================================================
// Composer
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    EmptyText,
    NoConversation,
    NotConnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent { client_msg_id: String },
    Skipped(SkipReason),
}

/// Single-line message input.
#[derive(Debug, Default)]
pub struct Composer {
    input: String,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    pub fn push_char(&mut self, c: char) {
        self.input.push(c);
    }

    pub fn backspace(&mut self) {
        self.input.pop();
    }

    pub fn clear(&mut self) {
        self.input.clear();
    }

    /// Send the input to the active conversation over `sink`.
    ///
    /// Blank input, no active conversation, or a channel that is not open
    /// makes this a no-op that keeps the input. On success the input is
    /// cleared and the send is tracked until its echo arrives.
    pub fn send(&mut self, state: &mut ChatState, sink: &impl FrameSink) -> SendOutcome {
        if is_blank(&self.input) {
            return SendOutcome::Skipped(SkipReason::EmptyText);
        }
        let Some(conversation_id) = state.active_id().map(str::to_string) else {
            return SendOutcome::Skipped(SkipReason::NoConversation);
        };
        if !sink.is_open() {
            return SendOutcome::Skipped(SkipReason::NotConnected);
        }

        let client_msg_id = state.track_send(&conversation_id, &self.input);
        let frame = ClientFrame::Message {
            conversation_id,
            text: self.input.clone(),
            sender_id: state.me().to_string(),
            client_msg_id: Some(client_msg_id.clone()),
        };
        match sink.transmit(frame) {
            Ok(()) => {
                self.input.clear();
                SendOutcome::Sent { client_msg_id }
            }
            Err(e) => {
                warn!(error = %e, "message not sent");
                state.forget_send(&client_msg_id);
                SendOutcome::Skipped(SkipReason::NotConnected)
            }
        }
    }
}

// =============================================================================
// Conversation creation / deletion
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("{0}")]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Result of creating a conversation: its id and, when the refetch worked,
/// the list fetched after.
#[derive(Debug)]
pub struct Started {
    pub id: String,
    pub conversations: Option<Vec<Conversation>>,
}

impl Started {
    /// The created conversation, if the refreshed list already has it.
    pub fn conversation(&self) -> Option<&Conversation> {
        self.conversations.as_ref()?.iter().find(|c| c.id == self.id)
    }
}

/// Validate, create, then refetch the creator's conversation list.
///
/// Validation failures return before any request is made. Once the server
/// has created the conversation the call succeeds; a failed refetch only
/// leaves `conversations` empty.
pub async fn start_conversation(
    api: &ApiClient,
    creator_id: &str,
    selected: &[String],
    group_name: &str,
) -> Result<Started, StartError> {
    let request = NewConversation::validate(creator_id, selected, group_name)?;
    let id = api.start_conversation(&request).await.map_err(|e| {
        error!(error = %e, "failed to create conversation");
        e
    })?;
    info!(conversation_id = %id, is_group = request.is_group, "conversation created");
    let conversations = refetch(api, creator_id).await;
    Ok(Started { id, conversations })
}

/// Delete a conversation, then refetch the list.
///
/// Nothing is changed locally here; the caller clears its active state only
/// after this succeeds. `Ok(None)` means the delete went through but the
/// refetch did not.
pub async fn delete_conversation(
    api: &ApiClient,
    me: &str,
    conversation_id: &str,
) -> Result<Option<Vec<Conversation>>, ApiError> {
    if let Err(e) = api.delete_conversation(conversation_id).await {
        error!(conversation_id, error = %e, "failed to delete conversation");
        return Err(e);
    }
    info!(conversation_id, "conversation deleted");
    Ok(refetch(api, me).await)
}

async fn refetch(api: &ApiClient, me: &str) -> Option<Vec<Conversation>> {
    match api.recent_conversations(me).await {
        Ok(list) => Some(list),
        Err(e) => {
            warn!(error = %e, "failed to refresh conversation list");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::{ChannelState, PushError};
    use crate::test_helpers::MockBackend;
    use std::cell::RefCell;

    struct FakeSink {
        open: bool,
        sent: RefCell<Vec<ClientFrame>>,
    }

    impl FakeSink {
        fn open() -> Self {
            Self {
                open: true,
                sent: RefCell::new(Vec::new()),
            }
        }

        fn closed() -> Self {
            Self {
                open: false,
                sent: RefCell::new(Vec::new()),
            }
        }
    }

    impl FrameSink for FakeSink {
        fn is_open(&self) -> bool {
            self.open
        }

        fn transmit(&self, frame: ClientFrame) -> Result<(), PushError> {
            self.sent.borrow_mut().push(frame);
            Ok(())
        }
    }

    fn alice() -> Session {
        Session {
            token: "t1".into(),
            user_id: "1".into(),
            username: "alice".into(),
        }
    }

    fn state_with_active(conversation_id: &str) -> ChatState {
        let mut st = ChatState::new(&alice());
        st.select(Conversation {
            id: conversation_id.into(),
            is_group: false,
            group_name: None,
            participants: vec!["1".into(), "2".into()],
            last_message_at: None,
        });
        st
    }

    fn store() -> (SessionStore, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        (SessionStore::new(tmp.path().join("session.toml")), tmp)
    }

    // ── composer ────────────────────────────────────────────────────────

    #[test]
    fn whitespace_input_is_noop() {
        let mut st = state_with_active("c1");
        let sink = FakeSink::open();
        let mut composer = Composer::new();
        composer.set_input("   \t ");
        assert_eq!(
            composer.send(&mut st, &sink),
            SendOutcome::Skipped(SkipReason::EmptyText)
        );
        assert!(sink.sent.borrow().is_empty());
        assert_eq!(composer.input(), "   \t ");
        assert_eq!(st.pending_count(), 0);
    }

    #[test]
    fn no_active_conversation_is_noop() {
        let mut st = ChatState::new(&alice());
        let sink = FakeSink::open();
        let mut composer = Composer::new();
        composer.set_input("hello");
        assert_eq!(
            composer.send(&mut st, &sink),
            SendOutcome::Skipped(SkipReason::NoConversation)
        );
        assert!(sink.sent.borrow().is_empty());
    }

    #[test]
    fn closed_channel_is_noop() {
        let mut st = state_with_active("c1");
        let sink = FakeSink::closed();
        let mut composer = Composer::new();
        composer.set_input("hello");
        assert_eq!(
            composer.send(&mut st, &sink),
            SendOutcome::Skipped(SkipReason::NotConnected)
        );
        assert_eq!(composer.input(), "hello");
    }

    #[test]
    fn send_emits_one_frame_and_clears() {
        let mut st = state_with_active("c1");
        let sink = FakeSink::open();
        let mut composer = Composer::new();
        for c in "hi bob".chars() {
            composer.push_char(c);
        }
        let outcome = composer.send(&mut st, &sink);
        let SendOutcome::Sent { client_msg_id } = outcome else {
            panic!("Expected Sent, got {outcome:?}");
        };

        let sent = sink.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0],
            ClientFrame::Message {
                conversation_id: "c1".into(),
                text: "hi bob".into(),
                sender_id: "1".into(),
                client_msg_id: Some(client_msg_id),
            }
        );
        assert_eq!(composer.input(), "");
        assert_eq!(st.pending_for_active().len(), 1);
    }

    #[test]
    fn send_does_not_append_locally() {
        let mut st = state_with_active("c1");
        let sink = FakeSink::open();
        let mut composer = Composer::new();
        composer.set_input("hello");
        composer.send(&mut st, &sink);
        assert!(st.messages().is_empty());
    }

    #[test]
    fn editing() {
        let mut composer = Composer::new();
        composer.push_char('a');
        composer.push_char('b');
        composer.backspace();
        assert_eq!(composer.input(), "a");
        composer.clear();
        composer.backspace();
        assert_eq!(composer.input(), "");
    }

    // ── auth ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn login_persists_session() {
        let backend = MockBackend::start().await;
        let api = ApiClient::new(&backend.server_config()).unwrap();
        let (store, _tmp) = store();

        let session = login(&api, &store, "alice", "x").await.unwrap();
        assert_eq!(
            session,
            Session {
                token: "t1".into(),
                user_id: "1".into(),
                username: "alice".into(),
            }
        );
        assert_eq!(store.load().unwrap(), Some(session));
    }

    #[tokio::test]
    async fn failed_login_writes_nothing() {
        let backend = MockBackend::start().await;
        let api = ApiClient::new(&backend.server_config()).unwrap();
        let (store, _tmp) = store();

        let err = login(&api, &store, "alice", "nope").await.unwrap_err();
        assert_eq!(err.to_string(), "Incorrect username or password");
        assert!(store.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn blank_fields_skip_request() {
        let config = crate::config::ServerConfig {
            api_url: "http://127.0.0.1:1".into(),
            ws_url: "ws://127.0.0.1:1".into(),
            request_timeout: std::time::Duration::from_secs(1),
        };
        let api = ApiClient::new(&config).unwrap();
        let (store, _tmp) = store();
        assert!(matches!(
            login(&api, &store, "  ", "x").await,
            Err(AuthError::MissingFields)
        ));
        assert!(matches!(
            register(&api, "dave", "").await,
            Err(AuthError::MissingFields)
        ));
    }

    #[tokio::test]
    async fn register_then_login() {
        let backend = MockBackend::start().await;
        let api = ApiClient::new(&backend.server_config()).unwrap();
        let (store, _tmp) = store();

        register(&api, "dave", "pw").await.unwrap();
        let err = register(&api, "dave", "pw").await.unwrap_err();
        assert_eq!(err.to_string(), "Username already registered");
        let session = login(&api, &store, "dave", "pw").await.unwrap();
        assert_eq!(session.username, "dave");
    }

    #[tokio::test]
    async fn logout_clears_session_and_closes_channel() {
        let backend = MockBackend::start().await;
        let config = backend.server_config();
        let api = ApiClient::new(&config).unwrap();
        let (store, _tmp) = store();
        let session = login(&api, &store, "alice", "x").await.unwrap();

        let (push, _rx) = PushConnection::connect(config.push_url(&session.user_id));
        assert!(push.wait_open().await);
        assert_eq!(push.state(), ChannelState::Open);
        backend.wait_for_sockets("1", 1).await;

        logout(&store, Some(push)).unwrap();
        assert!(store.load().unwrap().is_none());
        backend.wait_for_sockets("1", 0).await;
    }

    // ── create / delete ─────────────────────────────────────────────────

    #[tokio::test]
    async fn start_private_conversation() {
        let backend = MockBackend::start().await;
        let api = ApiClient::new(&backend.server_config()).unwrap();

        let started = start_conversation(&api, "1", &["2".to_string()], "")
            .await
            .unwrap();
        let conv = started.conversation().unwrap();
        assert!(!conv.is_group);
        assert_eq!(conv.participants, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn start_group_conversation() {
        let backend = MockBackend::start().await;
        let api = ApiClient::new(&backend.server_config()).unwrap();

        let started = start_conversation(&api, "1", &["2".to_string(), "3".to_string()], " Team ")
            .await
            .unwrap();
        let conv = started.conversation().unwrap();
        assert!(conv.is_group);
        assert_eq!(conv.group_name.as_deref(), Some("Team"));
        assert_eq!(conv.participants, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn group_without_name_makes_no_request() {
        let backend = MockBackend::start().await;
        let api = ApiClient::new(&backend.server_config()).unwrap();

        let err = start_conversation(&api, "1", &["2".to_string(), "3".to_string()], "  ")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Please enter a group name");
        assert!(backend.conversation_ids().is_empty());

        let err = start_conversation(&api, "1", &[], "").await.unwrap_err();
        assert_eq!(err.to_string(), "Select at least one user");
    }

    #[tokio::test]
    async fn delete_returns_refreshed_list() {
        let backend = MockBackend::start().await;
        let api = ApiClient::new(&backend.server_config()).unwrap();
        let a = backend.seed_conversation(&["1", "2"], None);
        let b = backend.seed_conversation(&["1", "3"], None);

        let list = delete_conversation(&api, "1", &a).await.unwrap().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, b);
    }

    #[tokio::test]
    async fn delete_failure_leaves_state_alone() {
        let backend = MockBackend::start().await;
        let api = ApiClient::new(&backend.server_config()).unwrap();
        let a = backend.seed_conversation(&["1", "2"], None);

        let mut st = ChatState::new(&alice());
        let seq = st.begin_list_refresh();
        st.apply_conversations(seq, api.recent_conversations("1").await.unwrap());
        st.select_by_id(&a).unwrap();

        assert!(delete_conversation(&api, "1", "missing").await.is_err());
        assert_eq!(st.active_id(), Some(a.as_str()));
        assert_eq!(backend.conversation_ids(), vec![a]);
    }

    #[tokio::test]
    async fn delete_succeeds_when_refetch_fails() {
        let backend = MockBackend::start().await;
        let api = ApiClient::new(&backend.server_config()).unwrap();
        let a = backend.seed_conversation(&["1", "2"], None);
        backend.recent_unavailable(true);

        let list = delete_conversation(&api, "1", &a).await.unwrap();
        assert!(list.is_none());
        assert!(backend.conversation_ids().is_empty());
    }

    #[tokio::test]
    async fn start_succeeds_when_refetch_fails() {
        let backend = MockBackend::start().await;
        let api = ApiClient::new(&backend.server_config()).unwrap();
        backend.recent_unavailable(true);

        let started = start_conversation(&api, "1", &["2".to_string(), "3".to_string()], "Team")
            .await
            .unwrap();
        assert!(started.conversations.is_none());
        assert!(started.conversation().is_none());
        assert_eq!(backend.conversation_ids(), vec![started.id]);
    }
}
