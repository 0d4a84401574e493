//! In-process stand-in for the chat backend, served by axum on an ephemeral
//! port. Only what the client talks to is implemented.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use chitchat_core::{Conversation, Message};

use crate::config::ServerConfig;

struct MockUser {
    id: String,
    username: String,
    password: String,
}

struct MockSocket {
    id: u64,
    user_id: String,
    tx: mpsc::UnboundedSender<WsMessage>,
}

#[derive(Default)]
struct MockState {
    users: Vec<MockUser>,
    conversations: Vec<Conversation>,
    messages: Vec<Message>,
    sockets: Vec<MockSocket>,
    frames: Vec<Value>,
    next_id: u64,
    clock: f64,
    reject_all: bool,
    recent_unavailable: bool,
}

impl MockState {
    fn seeded() -> Self {
        let mut state = Self {
            clock: 1_700_000_000.0,
            next_id: 100,
            ..Default::default()
        };
        for (id, name, pw) in [("1", "alice", "x"), ("2", "bob", "y"), ("3", "carol", "z")] {
            state.users.push(MockUser {
                id: id.into(),
                username: name.into(),
                password: pw.into(),
            });
        }
        state
    }

    fn fresh_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }

    fn tick(&mut self) -> f64 {
        self.clock += 1.0;
        self.clock
    }

    fn send_to(&self, user_id: &str, frame: &Value) {
        let text = frame.to_string();
        for s in self.sockets.iter().filter(|s| s.user_id == user_id) {
            let _ = s.tx.send(WsMessage::Text(text.clone().into()));
        }
    }

    fn store_message(&mut self, conversation_id: &str, sender_id: &str, text: &str) -> Message {
        let id = self.fresh_id("m");
        let timestamp = self.tick();
        let message = Message {
            id,
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            text: text.to_string(),
            timestamp,
        };
        self.messages.push(message.clone());
        if let Some(conv) = self
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
        {
            conv.last_message_at = Some(timestamp);
        }
        message
    }

    /// Store and fan out to every participant, sender included.
    fn deliver(&mut self, conversation_id: &str, sender_id: &str, text: &str) -> Option<Message> {
        let participants = self
            .conversations
            .iter()
            .find(|c| c.id == conversation_id)?
            .participants
            .clone();
        let message = self.store_message(conversation_id, sender_id, text);
        let frame = json!({
            "type": "new_message",
            "conversation_id": conversation_id,
            "message": {
                "id": message.id,
                "sender_id": message.sender_id,
                "text": message.text,
                "timestamp": message.timestamp,
            },
        });
        for p in &participants {
            self.send_to(p, &frame);
        }
        Some(message)
    }

    fn create_conversation(&mut self, participants: Vec<String>, group_name: Option<String>) -> String {
        let id = self.fresh_id("c");
        self.conversations.push(Conversation {
            id: id.clone(),
            is_group: participants.len() > 2,
            group_name,
            participants,
            last_message_at: None,
        });
        id
    }
}

type Shared = Arc<Mutex<MockState>>;

type Reply = Result<Json<Value>, (StatusCode, Json<Value>)>;

fn fail(status: StatusCode, detail: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "detail": detail })))
}

fn guard(state: &MockState) -> Result<(), (StatusCode, Json<Value>)> {
    if state.reject_all {
        return Err(fail(StatusCode::UNAUTHORIZED, "Not authenticated"));
    }
    Ok(())
}

#[derive(Deserialize)]
struct CredentialsBody {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct StartBody {
    participants: Vec<String>,
    #[serde(default)]
    is_group: bool,
    #[serde(default)]
    group_name: Option<String>,
}

async fn register(State(state): State<Shared>, Json(body): Json<CredentialsBody>) -> Reply {
    let mut st = state.lock().unwrap();
    if st.users.iter().any(|u| u.username == body.username) {
        return Err(fail(StatusCode::BAD_REQUEST, "Username already registered"));
    }
    let id = st.fresh_id("u");
    st.users.push(MockUser {
        id: id.clone(),
        username: body.username.clone(),
        password: body.password,
    });
    Ok(Json(json!({ "_id": id, "username": body.username })))
}

async fn login(State(state): State<Shared>, Json(body): Json<CredentialsBody>) -> Reply {
    let st = state.lock().unwrap();
    let user = st
        .users
        .iter()
        .find(|u| u.username == body.username && u.password == body.password)
        .ok_or_else(|| fail(StatusCode::BAD_REQUEST, "Incorrect username or password"))?;
    Ok(Json(json!({
        "access_token": format!("t{}", user.id),
        "token_type": "bearer",
        "user_id": user.id,
        "username": user.username,
    })))
}

async fn users(State(state): State<Shared>) -> Reply {
    let st = state.lock().unwrap();
    guard(&st)?;
    let list: Vec<Value> = st
        .users
        .iter()
        .map(|u| json!({ "id": u.id, "username": u.username }))
        .collect();
    Ok(Json(Value::Array(list)))
}

async fn recent(State(state): State<Shared>, Path(user_id): Path<String>) -> Reply {
    let st = state.lock().unwrap();
    guard(&st)?;
    if st.recent_unavailable {
        return Err(fail(StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable"));
    }
    let mut convs: Vec<&Conversation> = st
        .conversations
        .iter()
        .filter(|c| c.participants.contains(&user_id))
        .collect();
    convs.sort_by(|a, b| {
        b.last_message_at
            .unwrap_or(0.0)
            .total_cmp(&a.last_message_at.unwrap_or(0.0))
    });
    Ok(Json(json!(convs)))
}

async fn messages(State(state): State<Shared>, Path(chat_id): Path<String>) -> Reply {
    let st = state.lock().unwrap();
    guard(&st)?;
    // History rows carry no conversation id
    let rows: Vec<Value> = st
        .messages
        .iter()
        .filter(|m| m.conversation_id == chat_id)
        .map(|m| {
            json!({
                "id": m.id,
                "sender_id": m.sender_id,
                "text": m.text,
                "timestamp": m.timestamp,
            })
        })
        .collect();
    Ok(Json(Value::Array(rows)))
}

async fn start(State(state): State<Shared>, Json(body): Json<StartBody>) -> Reply {
    let mut st = state.lock().unwrap();
    guard(&st)?;
    if !body.is_group && body.participants.len() == 2 {
        let existing = st.conversations.iter().find(|c| {
            !c.is_group
                && c.participants.len() == 2
                && body.participants.iter().all(|p| c.participants.contains(p))
        });
        if let Some(c) = existing {
            return Ok(Json(json!({ "id": c.id, "is_group": false })));
        }
    }
    let participants = body.participants.clone();
    let id = st.create_conversation(body.participants, body.group_name);
    let frame = json!({ "type": "new_chat", "chat_id": id });
    for p in &participants {
        st.send_to(p, &frame);
    }
    Ok(Json(json!({ "id": id, "is_group": body.is_group })))
}

async fn delete(State(state): State<Shared>, Path(chat_id): Path<String>) -> Reply {
    let mut st = state.lock().unwrap();
    guard(&st)?;
    let before = st.conversations.len();
    st.conversations.retain(|c| c.id != chat_id);
    if st.conversations.len() == before {
        return Err(fail(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete chat"));
    }
    st.messages.retain(|m| m.conversation_id != chat_id);
    Ok(Json(json!({ "message": "Chat deleted" })))
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Path(user_id): Path<String>,
    State(state): State<Shared>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, user_id, state))
}

async fn handle_socket(socket: WebSocket, user_id: String, state: Shared) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let socket_id = {
        let mut st = state.lock().unwrap();
        st.next_id += 1;
        let id = st.next_id;
        st.sockets.push(MockSocket {
            id,
            user_id: user_id.clone(),
            tx,
        });
        id
    };

    loop {
        tokio::select! {
            out = rx.recv() => {
                let Some(msg) = out else { break };
                let closing = matches!(msg, WsMessage::Close(_));
                if sink.send(msg).await.is_err() || closing {
                    break;
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        let Ok(frame) = serde_json::from_str::<Value>(text.as_str()) else {
                            continue;
                        };
                        let mut st = state.lock().unwrap();
                        st.frames.push(frame.clone());
                        if frame["type"] == "message" {
                            let conv = frame["conversation_id"].as_str().unwrap_or_default().to_string();
                            let sender = frame["sender_id"].as_str().unwrap_or_default().to_string();
                            let body = frame["text"].as_str().unwrap_or_default().to_string();
                            st.deliver(&conv, &sender, &body);
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.lock().unwrap().sockets.retain(|s| s.id != socket_id);
}

/// Running mock server. Dropping it aborts the server task.
pub struct MockBackend {
    addr: SocketAddr,
    state: Shared,
    task: tokio::task::JoinHandle<()>,
}

impl MockBackend {
    /// Serve on 127.0.0.1 with users alice/x (id 1), bob/y (id 2), carol/z (id 3).
    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(MockState::seeded()));
        let app = Router::new()
            .route("/auth/register", post(register))
            .route("/auth/login", post(login))
            .route("/users", get(users))
            .route("/chat/recent/{user_id}", get(recent))
            .route("/chat/start", post(start))
            .route("/chat/{chat_id}/messages", get(messages))
            .route("/chat/{chat_id}", axum::routing::delete(delete))
            .route("/ws/{user_id}", get(ws_upgrade))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock backend");
        let addr = listener.local_addr().expect("local addr");
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state, task }
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            api_url: format!("http://{}", self.addr),
            ws_url: format!("ws://{}", self.addr),
            request_timeout: Duration::from_secs(5),
        }
    }

    pub fn seed_conversation(&self, participants: &[&str], group_name: Option<&str>) -> String {
        let mut st = self.state.lock().unwrap();
        st.create_conversation(
            participants.iter().map(|p| p.to_string()).collect(),
            group_name.map(str::to_string),
        )
    }

    /// Store a message without pushing it to anyone.
    pub fn seed_message(&self, conversation_id: &str, sender_id: &str, text: &str) -> String {
        let mut st = self.state.lock().unwrap();
        st.store_message(conversation_id, sender_id, text).id
    }

    /// Store a message and push `new_message` to every participant.
    pub fn push_message(&self, conversation_id: &str, sender_id: &str, text: &str) -> String {
        let mut st = self.state.lock().unwrap();
        st.deliver(conversation_id, sender_id, text)
            .expect("unknown conversation")
            .id
    }

    /// Send an arbitrary text frame to a user's sockets.
    pub fn push_raw(&self, user_id: &str, text: &str) {
        let st = self.state.lock().unwrap();
        for s in st.sockets.iter().filter(|s| s.user_id == user_id) {
            let _ = s.tx.send(WsMessage::Text(text.to_string().into()));
        }
    }

    /// Close every socket the user has open, server side.
    pub fn disconnect_all(&self, user_id: &str) {
        let st = self.state.lock().unwrap();
        for s in st.sockets.iter().filter(|s| s.user_id == user_id) {
            let _ = s.tx.send(WsMessage::Close(None));
        }
    }

    /// Answer every authenticated endpoint with 401.
    pub fn reject_all(&self, on: bool) {
        self.state.lock().unwrap().reject_all = on;
    }

    /// Answer `/chat/recent` with 503 while the other routes keep working.
    pub fn recent_unavailable(&self, on: bool) {
        self.state.lock().unwrap().recent_unavailable = on;
    }

    /// Client frames received on any socket, in arrival order.
    pub fn frames(&self) -> Vec<Value> {
        self.state.lock().unwrap().frames.clone()
    }

    pub fn conversation_ids(&self) -> Vec<String> {
        let st = self.state.lock().unwrap();
        st.conversations.iter().map(|c| c.id.clone()).collect()
    }

    pub fn message_texts(&self, conversation_id: &str) -> Vec<String> {
        let st = self.state.lock().unwrap();
        st.messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .map(|m| m.text.clone())
            .collect()
    }

    pub fn sockets_for(&self, user_id: &str) -> usize {
        let st = self.state.lock().unwrap();
        st.sockets.iter().filter(|s| s.user_id == user_id).count()
    }

    /// Poll until `user_id` has exactly `count` open sockets.
    pub async fn wait_for_sockets(&self, user_id: &str, count: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while self.sockets_for(user_id) != count {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {count} sockets for user {user_id}"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Poll until the server has seen `count` client frames.
    pub async fn wait_for_frames(&self, count: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while self.frames().len() < count {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {count} frames"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.task.abort();
    }
}
