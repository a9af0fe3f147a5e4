//! Realtime collaboration gateway
//!
//! WebSocket endpoint at `/ws`. The handshake requires an access token, taken
//! from the `token` query parameter or an `Authorization: Bearer` header, and
//! goes through the same verification as HTTP requests (blacklist included).
//!
//! Messages are JSON objects `{"event": ..., "data": ...}`:
//! - client to server: `join-project`, `leave-project`, `file-change`, `cursor-move`
//! - server to client: `file-changed`, `cursor-moved`
//!
//! Every connection joins `user:<id>`. Project events fan out to
//! `project:<projectId>`, never back to the connection that sent them.
//!
//! Author: hephaex@gmail.com

use crate::audit::{security_log, ClientInfo, SecurityEvent};
use crate::auth::middleware::bearer_token;
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use chrono::{SecondsFormat, Utc};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use uuid::Uuid;

pub const MSG_SOCKET_AUTH_FAILED: &str = "Authentication error";

const HUB_CAPACITY: usize = 1024;

pub fn user_room(user_id: Uuid) -> String {
    format!("user:{user_id}")
}

pub fn project_room(project_id: &str) -> String {
    format!("project:{project_id}")
}

/// Events a client may send
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    JoinProject(String),
    LeaveProject(String),
    FileChange(Map<String, Value>),
    CursorMove(Map<String, Value>),
}

/// Events the server emits to project rooms
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    FileChanged(Map<String, Value>),
    CursorMoved(Map<String, Value>),
}

/// One serialized event addressed to a room
#[derive(Debug, Clone)]
pub struct RoomMessage {
    pub room: String,
    /// Connection that produced the event; it never receives it back
    pub origin: Uuid,
    pub payload: Arc<str>,
}

/// Fan-out point shared by all connections
#[derive(Clone)]
pub struct RealtimeHub {
    tx: broadcast::Sender<RoomMessage>,
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

impl RealtimeHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(HUB_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomMessage> {
        self.tx.subscribe()
    }

    /// Publish to a room; returns the number of live subscribers
    pub fn publish(&self, message: RoomMessage) -> usize {
        // No subscribers is not an error
        self.tx.send(message).unwrap_or(0)
    }

    pub fn connection_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Per-connection state: identity and joined rooms
#[derive(Debug)]
pub struct Session {
    pub connection_id: Uuid,
    pub user_id: Uuid,
    rooms: HashSet<String>,
}

impl Session {
    pub fn new(user_id: Uuid) -> Self {
        let mut rooms = HashSet::new();
        rooms.insert(user_room(user_id));
        Self {
            connection_id: Uuid::new_v4(),
            user_id,
            rooms,
        }
    }

    pub fn is_in(&self, room: &str) -> bool {
        self.rooms.contains(room)
    }

    /// Apply a client event; returns what must be broadcast, if anything
    pub fn handle(&mut self, event: ClientEvent) -> Option<RoomMessage> {
        match event {
            ClientEvent::JoinProject(project_id) => {
                tracing::info!(user_id = %self.user_id, project_id = %project_id, connection_id = %self.connection_id, "User joined project");
                self.rooms.insert(project_room(&project_id));
                None
            }
            ClientEvent::LeaveProject(project_id) => {
                tracing::info!(user_id = %self.user_id, project_id = %project_id, connection_id = %self.connection_id, "User left project");
                self.rooms.remove(&project_room(&project_id));
                None
            }
            ClientEvent::FileChange(data) => self.relay(data, ServerEvent::FileChanged),
            ClientEvent::CursorMove(data) => self.relay(data, ServerEvent::CursorMoved),
        }
    }

    fn relay(
        &self,
        mut data: Map<String, Value>,
        wrap: fn(Map<String, Value>) -> ServerEvent,
    ) -> Option<RoomMessage> {
        let room = match data.get("projectId") {
            Some(Value::String(id)) => project_room(id),
            Some(Value::Number(id)) => project_room(&id.to_string()),
            _ => {
                tracing::debug!(connection_id = %self.connection_id, "Dropping event without projectId");
                return None;
            }
        };

        data.insert("userId".to_string(), Value::String(self.user_id.to_string()));
        data.insert(
            "timestamp".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );

        let payload = serde_json::to_string(&wrap(data)).ok()?;
        Some(RoomMessage {
            room,
            origin: self.connection_id,
            payload: payload.into(),
        })
    }

    /// Whether a hub message is for this connection
    pub fn accepts(&self, message: &RoomMessage) -> bool {
        message.origin != self.connection_id && self.is_in(&message.room)
    }
}

#[derive(Debug, Deserialize)]
pub struct SocketAuthQuery {
    pub token: Option<String>,
}

/// WebSocket handshake
///
/// Rejects with 401 before upgrading when the token is missing or invalid.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SocketAuthQuery>,
    headers: HeaderMap,
    client: ClientInfo,
    upgrade: Option<WebSocketUpgrade>,
) -> Result<Response, AppError> {
    let token = query
        .token
        .filter(|t| !t.is_empty())
        .or_else(|| bearer_token(&headers).map(str::to_string));

    let reject = |reason: &str| {
        security_log(&SecurityEvent::SocketAuthenticationFailed {
            reason: reason.to_string(),
            ip_address: client.ip_address.clone(),
        });
        AppError::unauthorized(MSG_SOCKET_AUTH_FAILED)
    };

    let Some(token) = token else {
        return Err(reject("Missing token"));
    };

    let user = match state.auth.resolve_access_token(&token).await {
        Ok(user) => user,
        Err(e) if e.status().is_client_error() => return Err(reject(&e.message)),
        Err(e) => return Err(e),
    };

    let upgrade = upgrade.ok_or_else(|| AppError::bad_request("WebSocket upgrade required"))?;
    let hub = state.realtime.clone();
    let user_id = user.id;

    Ok(upgrade.on_upgrade(move |socket| handle_socket(socket, hub, user_id)))
}

async fn handle_socket(socket: WebSocket, hub: RealtimeHub, user_id: Uuid) {
    let mut session = Session::new(user_id);
    let mut events = hub.subscribe();
    let (mut sink, mut stream) = socket.split();

    tracing::info!(user_id = %user_id, connection_id = %session.connection_id, "Client connected");

    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => {
                        if let Some(message) = session.handle(event) {
                            hub.publish(message);
                        }
                    }
                    Err(e) => tracing::debug!(connection_id = %session.connection_id, error = %e, "Ignoring malformed event"),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(connection_id = %session.connection_id, error = %e, "Socket read failed");
                    break;
                }
            },
            outgoing = events.recv() => match outgoing {
                Ok(message) if session.accepts(&message) => {
                    if sink.send(Message::Text(message.payload.to_string())).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(connection_id = %session.connection_id, skipped, "Realtime subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    tracing::info!(user_id = %user_id, connection_id = %session.connection_id, "Client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(raw: Value) -> ClientEvent {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn test_client_event_parsing() {
        assert_eq!(
            event(json!({"event": "join-project", "data": "p1"})),
            ClientEvent::JoinProject("p1".to_string())
        );
        assert!(matches!(
            event(json!({"event": "cursor-move", "data": {"projectId": "p1", "line": 3}})),
            ClientEvent::CursorMove(_)
        ));
        assert!(serde_json::from_value::<ClientEvent>(json!({"event": "shutdown"})).is_err());
    }

    #[test]
    fn test_session_starts_in_user_room() {
        let user_id = Uuid::new_v4();
        let session = Session::new(user_id);
        assert!(session.is_in(&user_room(user_id)));
        assert!(!session.is_in(&project_room("p1")));
    }

    #[test]
    fn test_file_change_fans_out_with_identity() {
        let mut alice = Session::new(Uuid::new_v4());
        let mut bob = Session::new(Uuid::new_v4());
        let carol = Session::new(Uuid::new_v4());

        alice.handle(ClientEvent::JoinProject("p1".into()));
        bob.handle(ClientEvent::JoinProject("p1".into()));

        let message = alice
            .handle(event(json!({
                "event": "file-change",
                "data": {"projectId": "p1", "path": "src/main.rs"}
            })))
            .unwrap();

        assert_eq!(message.room, "project:p1");
        assert!(bob.accepts(&message));
        assert!(!alice.accepts(&message), "sender is excluded");
        assert!(!carol.accepts(&message), "not in the room");

        let payload: Value = serde_json::from_str(&message.payload).unwrap();
        assert_eq!(payload["event"], "file-changed");
        assert_eq!(payload["data"]["path"], "src/main.rs");
        assert_eq!(payload["data"]["userId"], alice.user_id.to_string());
        assert!(payload["data"]["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_leave_stops_delivery() {
        let mut alice = Session::new(Uuid::new_v4());
        let mut bob = Session::new(Uuid::new_v4());
        bob.handle(ClientEvent::JoinProject("p1".into()));
        bob.handle(ClientEvent::LeaveProject("p1".into()));

        let message = alice
            .handle(event(json!({"event": "cursor-move", "data": {"projectId": "p1"}})))
            .unwrap();
        assert!(!bob.accepts(&message));

        let payload: Value = serde_json::from_str(&message.payload).unwrap();
        assert_eq!(payload["event"], "cursor-moved");
    }

    #[test]
    fn test_event_without_project_is_dropped() {
        let mut session = Session::new(Uuid::new_v4());
        assert!(session
            .handle(event(json!({"event": "file-change", "data": {"path": "a"}})))
            .is_none());
    }

    #[tokio::test]
    async fn test_hub_delivers_to_subscribers() {
        let hub = RealtimeHub::new();
        assert_eq!(hub.connection_count(), 0);

        let mut rx = hub.subscribe();
        let delivered = hub.publish(RoomMessage {
            room: project_room("p1"),
            origin: Uuid::new_v4(),
            payload: Arc::from("{}"),
        });
        assert_eq!(delivered, 1);
        assert_eq!(rx.recv().await.unwrap().room, "project:p1");

        drop(rx);
        let nobody = hub.publish(RoomMessage {
            room: project_room("p1"),
            origin: Uuid::new_v4(),
            payload: Arc::from("{}"),
        });
        assert_eq!(nobody, 0);
    }
}
