//! In-process stand-in for the chat backend: the REST endpoints and the
//! websocket channel (store, deliver to recipient, echo to sender).

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;

use nextext_api::{ClientConfig, CredentialStore, MemoryCredentialStore};
use nextext_client::ChatClient;
use nextext_types::events::OutboundMessage;
use nextext_types::models::Message;

pub const ALICE: i64 = 1;
pub const BOB: i64 = 2;
pub const CAROL: i64 = 3;
pub const USER4: i64 = 4;

pub const ALICE_PASSWORD: &str = "alice-password";
pub const BOB_PASSWORD: &str = "bob-password";

/// Upper bound for anything a test awaits.
pub const WAIT: Duration = Duration::from_secs(5);

#[derive(Clone)]
struct FakeUser {
    id: i64,
    username: String,
    email: String,
    password: String,
}

enum Outgoing {
    Text(String),
    Close,
}

#[derive(Default)]
pub struct BackendState {
    users: Mutex<Vec<FakeUser>>,
    messages: Mutex<Vec<Message>>,
    sockets: Mutex<HashMap<i64, Vec<mpsc::UnboundedSender<Outgoing>>>>,
    frames: Mutex<Vec<(i64, OutboundMessage)>>,
    hits: Mutex<Vec<String>>,
    /// Stored and pushed when the next history request comes in.
    during_history: Mutex<Option<(i64, i64, String)>>,
    pub fail_history: AtomicBool,
    pub reject_logins: AtomicBool,
    /// Refuse every websocket upgrade while REST keeps working.
    pub reject_channels: AtomicBool,
}

impl BackendState {
    fn with_users() -> Self {
        let state = Self::default();
        {
            let mut users = state.users.lock().unwrap();
            for (id, name, password) in [
                (ALICE, "alice", ALICE_PASSWORD),
                (BOB, "bob", BOB_PASSWORD),
                (CAROL, "carol", "carol-password"),
                (USER4, "user4", "user4-password"),
            ] {
                users.push(FakeUser {
                    id,
                    username: name.into(),
                    email: format!("{}@example.com", name),
                    password: password.into(),
                });
            }
        }
        state
    }

    fn user_for_token(&self, token: &str) -> Option<FakeUser> {
        let id: i64 = token.strip_prefix("token-")?.parse().ok()?;
        self.users.lock().unwrap().iter().find(|u| u.id == id).cloned()
    }

    fn bearer_user(&self, headers: &HeaderMap) -> Option<FakeUser> {
        let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
        self.user_for_token(value.strip_prefix("Bearer ")?)
    }

    fn hit(&self, what: &str) {
        self.hits.lock().unwrap().push(what.to_string());
    }

    fn store(&self, sender_id: i64, recipient_id: i64, content: &str) -> Message {
        let mut messages = self.messages.lock().unwrap();
        let id = messages.len() as i64 + 1;
        let message = Message {
            id,
            sender_id,
            recipient_id,
            content: content.to_string(),
            timestamp: format!("2025-05-22T12:{:02}:{:02}.000000", id / 60 % 60, id % 60),
        };
        messages.push(message.clone());
        message
    }

    fn send_to(&self, user_id: i64, message: &Message) {
        let text = serde_json::to_string(message).unwrap();
        if let Some(senders) = self.sockets.lock().unwrap().get(&user_id) {
            for tx in senders {
                let _ = tx.send(Outgoing::Text(text.clone()));
            }
        }
    }

    fn deliver(&self, sender_id: i64, frame: OutboundMessage) {
        self.frames.lock().unwrap().push((sender_id, frame.clone()));
        let message = self.store(sender_id, frame.to, &frame.content);
        self.send_to(frame.to, &message);
        self.send_to(sender_id, &message);
    }
}

pub struct TestBackend {
    pub addr: SocketAddr,
    pub state: Arc<BackendState>,
}

impl TestBackend {
    pub async fn spawn() -> Self {
        let state = Arc::new(BackendState::with_users());

        let app = Router::new()
            .route("/api/v1/users/login", post(login))
            .route("/api/v1/users/register", post(register))
            .route("/api/v1/users/me", get(me))
            .route("/api/v1/users", get(list_users))
            .route("/api/v1/chat/history/{other_id}", get(history))
            .route("/api/v1/chat/ws", get(ws_upgrade))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(&format!("http://{}/api/v1", self.addr)).unwrap()
    }

    pub fn client(&self) -> ChatClient {
        self.client_with_store(Box::new(MemoryCredentialStore::default()))
    }

    pub fn client_with_store(&self, store: Box<dyn CredentialStore>) -> ChatClient {
        ChatClient::new(self.config(), store).unwrap()
    }

    pub async fn logged_in(&self, username: &str, password: &str) -> ChatClient {
        let client = self.client();
        client.login(username, password).await.unwrap();
        client
    }

    /// Persist a message without pushing it anywhere (history only).
    pub fn seed_message(&self, sender_id: i64, recipient_id: i64, content: &str) -> Message {
        self.state.store(sender_id, recipient_id, content)
    }

    /// Make the next history request store and push a message before it
    /// answers, so the message is both in the history and on the channel.
    pub fn store_during_history(&self, sender_id: i64, recipient_id: i64, content: &str) {
        *self.state.during_history.lock().unwrap() = Some((sender_id, recipient_id, content.to_string()));
    }

    /// Push an arbitrary frame to `user_id`'s open channels, unpersisted.
    pub fn push(&self, user_id: i64, message: &Message) {
        self.state.send_to(user_id, message);
    }

    /// Server-side close of every channel `user_id` has open.
    pub fn kick(&self, user_id: i64) {
        if let Some(senders) = self.state.sockets.lock().unwrap().remove(&user_id) {
            for tx in senders {
                let _ = tx.send(Outgoing::Close);
            }
        }
    }

    pub fn history_between(&self, a: i64, b: i64) -> Vec<Message> {
        self.state
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.is_between(a, b))
            .cloned()
            .collect()
    }

    /// Outbound frames the channel endpoint has received, with their sender.
    pub fn frames(&self) -> Vec<(i64, OutboundMessage)> {
        self.state.frames.lock().unwrap().clone()
    }

    pub fn hits(&self, what: &str) -> usize {
        self.state.hits.lock().unwrap().iter().filter(|h| *h == what).count()
    }

    /// The server registers a socket just after the handshake completes; wait
    /// for that before pushing to it.
    pub async fn wait_for_socket(&self, user_id: i64) {
        tokio::time::timeout(WAIT, async {
            loop {
                let connected = self
                    .state
                    .sockets
                    .lock()
                    .unwrap()
                    .get(&user_id)
                    .is_some_and(|senders| senders.iter().any(|tx| !tx.is_closed()));
                if connected {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("user never connected to the channel");
    }
}

pub fn message(id: i64, sender_id: i64, recipient_id: i64, timestamp: &str) -> Message {
    Message {
        id,
        sender_id,
        recipient_id,
        content: format!("pushed {}", id),
        timestamp: timestamp.into(),
    }
}

fn detail(status: StatusCode, detail: serde_json::Value) -> Response {
    (status, Json(json!({ "detail": detail }))).into_response()
}

fn user_json(user: &FakeUser) -> serde_json::Value {
    json!({
        "id": user.id,
        "username": user.username,
        "email": user.email,
        "is_active": true,
        "created_at": "2025-05-22T12:00:00",
    })
}

#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

async fn login(State(state): State<Arc<BackendState>>, Form(form): Form<LoginForm>) -> Response {
    state.hit("login");
    let user = state
        .users
        .lock()
        .unwrap()
        .iter()
        .find(|u| u.username == form.username && u.password == form.password)
        .cloned();

    match user {
        Some(user) if !state.reject_logins.load(Ordering::SeqCst) => Json(json!({
            "access_token": format!("token-{}", user.id),
            "token_type": "bearer",
        }))
        .into_response(),
        _ => detail(StatusCode::UNAUTHORIZED, json!("Incorrect username or password")),
    }
}

#[derive(Deserialize)]
struct RegisterBody {
    username: String,
    email: String,
    password: String,
}

async fn register(State(state): State<Arc<BackendState>>, Json(body): Json<RegisterBody>) -> Response {
    state.hit("register");
    let mut problems = Vec::new();
    if body.password.len() < 8 {
        problems.push(json!({
            "loc": ["body", "password"],
            "msg": "String should have at least 8 characters",
            "type": "string_too_short",
        }));
    }
    if !body.email.contains('@') {
        problems.push(json!({
            "loc": ["body", "email"],
            "msg": "value is not a valid email address",
            "type": "value_error",
        }));
    }
    if !problems.is_empty() {
        return detail(StatusCode::UNPROCESSABLE_ENTITY, json!(problems));
    }

    let mut users = state.users.lock().unwrap();
    if users
        .iter()
        .any(|u| u.username == body.username || u.email == body.email)
    {
        return detail(StatusCode::BAD_REQUEST, json!("Username or email already registered"));
    }

    let user = FakeUser {
        id: users.len() as i64 + 1,
        username: body.username,
        email: body.email,
        password: body.password,
    };
    users.push(user.clone());
    (StatusCode::CREATED, Json(user_json(&user))).into_response()
}

async fn me(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    state.hit("me");
    match state.bearer_user(&headers) {
        Some(user) => Json(user_json(&user)).into_response(),
        None => detail(StatusCode::UNAUTHORIZED, json!("Could not validate credentials")),
    }
}

#[derive(Deserialize)]
struct ListQuery {
    q: Option<String>,
    skip: Option<usize>,
    limit: Option<usize>,
}

async fn list_users(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Response {
    state.hit("users");
    if state.bearer_user(&headers).is_none() {
        return detail(StatusCode::UNAUTHORIZED, json!("Could not validate credentials"));
    }

    let needle = query.q.map(|q| q.to_lowercase());
    let users: Vec<serde_json::Value> = state
        .users
        .lock()
        .unwrap()
        .iter()
        .filter(|u| match &needle {
            Some(n) => u.username.to_lowercase().contains(n) || u.email.to_lowercase().contains(n),
            None => true,
        })
        .skip(query.skip.unwrap_or(0))
        .take(query.limit.unwrap_or(10))
        .map(user_json)
        .collect();
    Json(users).into_response()
}

async fn history(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Path(other_id): Path<i64>,
) -> Response {
    state.hit("history");
    let Some(user) = state.bearer_user(&headers) else {
        return detail(StatusCode::UNAUTHORIZED, json!("Could not validate credentials"));
    };
    if state.fail_history.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let pending = state.during_history.lock().unwrap().take();
    if let Some((sender_id, recipient_id, content)) = pending {
        let stored = state.store(sender_id, recipient_id, &content);
        state.send_to(recipient_id, &stored);
        state.send_to(sender_id, &stored);
    }

    let messages: Vec<Message> = state
        .messages
        .lock()
        .unwrap()
        .iter()
        .filter(|m| m.is_between(user.id, other_id))
        .cloned()
        .collect();
    Json(messages).into_response()
}

async fn ws_upgrade(
    State(state): State<Arc<BackendState>>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    if state.reject_channels.load(Ordering::SeqCst) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let Some(user) = params.get("token").and_then(|t| state.user_for_token(t)) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    ws.on_upgrade(move |socket| handle_socket(socket, state, user.id))
}

async fn handle_socket(socket: WebSocket, state: Arc<BackendState>, user_id: i64) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();
    state.sockets.lock().unwrap().entry(user_id).or_default().push(tx);

    let mut forward = tokio::spawn(async move {
        while let Some(out) = rx.recv().await {
            match out {
                Outgoing::Text(text) => {
                    if sink.send(WsMessage::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Outgoing::Close => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    break;
                }
            }
        }
    });

    let recv_state = state.clone();
    let mut receive = tokio::spawn(async move {
        while let Some(Ok(frame)) = stream.next().await {
            match frame {
                WsMessage::Text(text) => {
                    if let Ok(out) = serde_json::from_str::<OutboundMessage>(text.as_str()) {
                        recv_state.deliver(user_id, out);
                    }
                }
                WsMessage::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut forward => receive.abort(),
        _ = &mut receive => forward.abort(),
    }
}
