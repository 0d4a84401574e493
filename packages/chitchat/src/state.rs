//! Chat screen state, owned by the UI loop.
//!
//! Every mutation goes through a method here, so the active conversation is
//! always read at the moment an event is applied. Fetch results carry the
//! ticket or sequence they were issued under and are dropped when stale.

use tracing::{debug, warn};

use chitchat_core::{
    ChatTab, Conversation, Directory, Message, PendingSend, PendingSends, ServerEvent, Session,
    filter_conversations,
};

/// Issued by [`ChatState::select`]; a message fetch result is applied only if
/// its ticket is still current.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub conversation_id: String,
    pub generation: u64,
}

/// What applying a push event changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PushOutcome {
    /// A message was added to the open thread.
    pub appended: bool,
    /// The conversation list should be fetched again.
    pub refresh_list: bool,
    /// A pending send was confirmed by its echo.
    pub confirmed: Option<String>,
}

pub struct ChatState {
    me: String,
    username: String,
    directory: Directory,
    conversations: Vec<Conversation>,
    active: Option<Conversation>,
    messages: Vec<Message>,
    pending: PendingSends,
    message_generation: u64,
    list_requested: u64,
    list_applied: u64,
}

impl ChatState {
    pub fn new(session: &Session) -> Self {
        Self {
            me: session.user_id.clone(),
            username: session.username.clone(),
            directory: Directory::default(),
            conversations: Vec::new(),
            active: None,
            messages: Vec::new(),
            pending: PendingSends::new(),
            message_generation: 0,
            list_requested: 0,
            list_applied: 0,
        }
    }

    pub fn me(&self) -> &str {
        &self.me
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn set_directory(&mut self, directory: Directory) {
        self.directory = directory;
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn find(&self, conversation_id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == conversation_id)
    }

    pub fn active(&self) -> Option<&Conversation> {
        self.active.as_ref()
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_ref().map(|c| c.id.as_str())
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn display_name(&self, conv: &Conversation) -> String {
        self.directory.conversation_name(conv, &self.me)
    }

    pub fn sender_label(&self, sender_id: &str) -> String {
        self.directory.sender_label(sender_id, &self.me)
    }

    /// Conversations for the list pane after tab and search filtering.
    pub fn visible(&self, tab: ChatTab, search: &str) -> Vec<&Conversation> {
        filter_conversations(&self.conversations, tab, search, |c| self.display_name(c))
    }

    // ── selection ───────────────────────────────────────────────────────

    /// Make `conv` active. The thread is emptied until the returned ticket's
    /// fetch lands.
    pub fn select(&mut self, conv: Conversation) -> FetchTicket {
        self.message_generation += 1;
        self.messages.clear();
        let ticket = FetchTicket {
            conversation_id: conv.id.clone(),
            generation: self.message_generation,
        };
        debug!(conversation_id = %conv.id, generation = ticket.generation, "conversation selected");
        self.active = Some(conv);
        ticket
    }

    pub fn select_by_id(&mut self, conversation_id: &str) -> Option<FetchTicket> {
        let conv = self.find(conversation_id)?.clone();
        Some(self.select(conv))
    }

    /// Deselect. Any in-flight message fetch becomes stale.
    pub fn clear_active(&mut self) {
        self.message_generation += 1;
        self.active = None;
        self.messages.clear();
    }

    /// Apply a history fetch. Returns false when the ticket is stale.
    ///
    /// Messages pushed for the active conversation while the fetch was in
    /// flight are kept after the fetched history.
    pub fn apply_messages(&mut self, ticket: &FetchTicket, fetched: Vec<Message>) -> bool {
        if ticket.generation != self.message_generation
            || self.active_id() != Some(ticket.conversation_id.as_str())
        {
            debug!(conversation_id = %ticket.conversation_id, "dropping stale message fetch");
            return false;
        }
        let mut thread: Vec<Message> = fetched
            .into_iter()
            .filter(|m| m.conversation_id == ticket.conversation_id)
            .collect();
        for m in self.messages.drain(..) {
            if !thread.iter().any(|t| t.id == m.id) {
                thread.push(m);
            }
        }
        self.messages = thread;
        true
    }

    // ── conversation list ───────────────────────────────────────────────

    /// Number a list fetch before issuing it.
    pub fn begin_list_refresh(&mut self) -> u64 {
        self.list_requested += 1;
        self.list_requested
    }

    /// Apply a list fetch. A response older than one already applied is
    /// dropped.
    pub fn apply_conversations(&mut self, seq: u64, conversations: Vec<Conversation>) -> bool {
        if seq <= self.list_applied {
            debug!(seq, applied = self.list_applied, "dropping stale conversation list");
            return false;
        }
        self.list_applied = seq;
        self.conversations = conversations;
        let fresh = self
            .active_id()
            .and_then(|id| self.find(id))
            .cloned();
        if fresh.is_some() {
            self.active = fresh;
        }
        true
    }

    /// Forget a deleted conversation. Clears the thread if it was open.
    pub fn conversation_removed(&mut self, conversation_id: &str) {
        if self.active_id() == Some(conversation_id) {
            self.clear_active();
        }
        self.conversations.retain(|c| c.id != conversation_id);
        self.pending.drop_conversation(conversation_id);
    }

    // ── push ────────────────────────────────────────────────────────────

    /// Apply one push event against the current active conversation.
    pub fn apply_push(&mut self, event: ServerEvent) -> PushOutcome {
        match event {
            ServerEvent::NewMessage {
                conversation_id,
                message,
            } => {
                let mut outcome = PushOutcome {
                    refresh_list: true,
                    ..Default::default()
                };
                outcome.confirmed = self
                    .pending
                    .reconcile(&message, &self.me)
                    .map(|p| p.client_msg_id);

                if self.active_id() == Some(conversation_id.as_str())
                    && !self.messages.iter().any(|m| m.id == message.id)
                {
                    self.messages.push(message);
                    outcome.appended = true;
                }
                outcome
            }
            ServerEvent::NewChat { .. } => PushOutcome {
                refresh_list: true,
                ..Default::default()
            },
            ServerEvent::Unknown(_) => PushOutcome::default(),
        }
    }

    // ── pending sends ───────────────────────────────────────────────────

    pub fn track_send(&mut self, conversation_id: &str, text: &str) -> String {
        self.pending.track(conversation_id, text)
    }

    pub fn forget_send(&mut self, client_msg_id: &str) {
        self.pending.forget(client_msg_id);
    }

    /// Unconfirmed sends for the open thread, oldest first.
    pub fn pending_for_active(&self) -> Vec<&PendingSend> {
        match self.active_id() {
            Some(id) => self.pending.for_conversation(id).collect(),
            None => Vec::new(),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// The channel closed; no echo can arrive for anything still pending.
    pub fn abandon_pending(&mut self) {
        let dropped = self.pending.abandon_all();
        if dropped > 0 {
            warn!(dropped, "dropping unconfirmed sends after channel closed");
        }
    }
}
