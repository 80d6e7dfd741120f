//! Support chat over REST and a WebSocket relay.
//!
//! Messages are always persisted through `ChatService` before they are
//! published to the rooms returned with them. The socket never replays
//! history; clients load it over REST.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::Json;
use domain::chat::{can_join, PostedMessage, Room};
use domain::service::Actor;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth::{self, AuthUser};
use crate::dto::{ConversationOut, MessageOut};
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::hub::{Frame, RecentIds, Relay};
use crate::routes::PageQuery;
use crate::state::AppState;

/// Frames sent by clients.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Join { room: String },
    Leave { room: String },
    Send { chat_id: String, text: String },
}

/// Frames sent to clients.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Joined { room: String },
    Left { room: String },
    Message { chat_id: String, message: MessageOut },
    Error { code: &'static str, message: String },
}

impl ServerFrame {
    fn encode(&self) -> Frame {
        match serde_json::to_string(self) {
            Ok(s) => Arc::from(s),
            Err(e) => {
                warn!(err = %e, "failed to encode chat frame");
                Arc::from(r#"{"type":"error","code":"internal","message":"encoding failed"}"#)
            }
        }
    }

    fn error(code: &'static str, message: impl Into<String>) -> Self {
        ServerFrame::Error {
            code,
            message: message.into(),
        }
    }
}

/// How many message ids a socket remembers for filtering repeats.
const RECENT_IDS: usize = 256;

/// Relay a stored message to every room it belongs to.
fn publish(state: &AppState, posted: PostedMessage) -> usize {
    let message_id = posted.message.id.clone();
    let frame = ServerFrame::Message {
        chat_id: posted.chat_id,
        message: posted.message.into(),
    };
    state
        .hub
        .publish(&posted.rooms, Relay::new(&message_id, frame.encode()))
}

// ---- REST ----

pub async fn list_conversations(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiQuery(page): ApiQuery<PageQuery>,
) -> ApiResult<Json<Vec<ConversationOut>>> {
    let conversations = state.chat.list_conversations(&actor, page.limit())?;
    Ok(Json(
        conversations.into_iter().map(ConversationOut::from).collect(),
    ))
}

pub async fn history(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiPath(chat_id): ApiPath<String>,
) -> ApiResult<Json<Vec<MessageOut>>> {
    let messages = state.chat.history(&actor, &chat_id)?;
    Ok(Json(messages.into_iter().map(MessageOut::from).collect()))
}

#[derive(Deserialize)]
pub struct PostReq {
    text: String,
}

pub async fn post_message(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiPath(chat_id): ApiPath<String>,
    ApiJson(body): ApiJson<PostReq>,
) -> ApiResult<(StatusCode, Json<MessageOut>)> {
    let posted = state.chat.post_message(&actor, &chat_id, &body.text)?;
    let out = MessageOut::from(posted.message.clone());
    let delivered = publish(&state, posted);
    debug!(chat_id = %chat_id, delivered, "message relayed");
    Ok((StatusCode::CREATED, Json(out)))
}

// ---- socket ----

#[derive(Deserialize)]
pub struct SocketQuery {
    token: Option<String>,
}

/// `GET /ws/chat?token=<access token>`. Browsers cannot set headers on a
/// socket handshake, so the token may come as a query parameter.
pub async fn socket(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<SocketQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> ApiResult<Response> {
    let actor = auth::authenticate(&state, &headers, q.token.as_deref())?
        .ok_or(ApiError::Unauthorized("missing credentials"))?;
    info!(user_id = %actor.user_id, role = actor.role.as_str(), "chat socket opened");
    Ok(ws.on_upgrade(move |socket| run_socket(state, actor, socket)))
}

/// Per-connection state: one forwarding task per joined room. The tasks
/// share `recent`, so a message sent to several joined rooms arrives once.
struct Session {
    state: AppState,
    actor: Actor,
    out: mpsc::Sender<Frame>,
    rooms: HashMap<String, JoinHandle<()>>,
    recent: Arc<Mutex<RecentIds>>,
}

impl Session {
    fn new(state: AppState, actor: Actor, out: mpsc::Sender<Frame>) -> Self {
        Self {
            state,
            actor,
            out,
            rooms: HashMap::new(),
            recent: Arc::new(Mutex::new(RecentIds::new(RECENT_IDS))),
        }
    }

    async fn reply(&self, frame: ServerFrame) {
        // A closed channel means the writer is gone; the read loop ends next.
        let _ = self.out.send(frame.encode()).await;
    }

    async fn handle(&mut self, frame: ClientFrame) {
        match frame {
            ClientFrame::Join { room } => self.join(room).await,
            ClientFrame::Leave { room } => match self.rooms.remove(&room) {
                Some(task) => {
                    task.abort();
                    self.reply(ServerFrame::Left { room }).await;
                }
                None => {
                    self.reply(ServerFrame::error(
                        "not_joined",
                        format!("not in room '{}'", room),
                    ))
                    .await
                }
            },
            ClientFrame::Send { chat_id, text } => {
                match self.state.chat.post_message(&self.actor, &chat_id, &text) {
                    Ok(posted) => {
                        publish(&self.state, posted);
                    }
                    Err(e) => {
                        let err = ApiError::from(e);
                        self.reply(ServerFrame::error("rejected", err.to_string()))
                            .await;
                    }
                }
            }
        }
    }

    async fn join(&mut self, name: String) {
        let Some(room) = Room::parse(&name) else {
            return self
                .reply(ServerFrame::error("unknown_room", format!("no room '{}'", name)))
                .await;
        };
        if !can_join(&self.actor, &room) {
            warn!(user_id = %self.actor.user_id, room = %room, "join refused");
            return self
                .reply(ServerFrame::error("forbidden", "cannot join this room"))
                .await;
        }
        if !self.rooms.contains_key(&name) {
            let mut rx = self.state.hub.subscribe(&room);
            let out = self.out.clone();
            let recent = Arc::clone(&self.recent);
            let room_name = name.clone();
            let task = tokio::spawn(async move {
                loop {
                    match rx.recv().await {
                        Ok(relay) => {
                            let fresh = recent
                                .lock()
                                .unwrap_or_else(PoisonError::into_inner)
                                .insert(&relay.message_id);
                            if fresh && out.send(relay.frame).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(room = %room_name, skipped, "chat listener lagged, frames skipped");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            });
            self.rooms.insert(name.clone(), task);
        }
        self.reply(ServerFrame::Joined { room: name }).await;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for (_, task) in self.rooms.drain() {
            task.abort();
        }
    }
}

async fn run_socket(state: AppState, actor: Actor, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Frame>(64);

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame.to_string())).await.is_err() {
                break;
            }
        }
    });

    let user_id = actor.user_id.clone();
    let mut session = Session::new(state, actor, tx);

    while let Some(msg) = stream.next().await {
        let text = match msg {
            Ok(Message::Text(t)) => t,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(err = %e, "chat socket read failed");
                break;
            }
        };
        match serde_json::from_str::<ClientFrame>(&text) {
            Ok(frame) => session.handle(frame).await,
            Err(e) => {
                session
                    .reply(ServerFrame::error("bad_frame", e.to_string()))
                    .await
            }
        }
    }

    drop(session);
    writer.abort();
    info!(user_id = %user_id, "chat socket closed");
}
