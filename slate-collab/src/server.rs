//! WebSocket sync server with room-based document routing.
//!
//! Architecture:
//! ```text
//! Client A ──┐
//!             ├── Room (room_id) ── BoardDocument ── BroadcastGroup
//! Client B ──┘          ▲
//!                        │ join admitted only with a valid
//!                        │ room-scoped credential
//!                 JoinAuthorizer
//! ```
//!
//! Each room maintains:
//! - A `BoardDocument` for authoritative state
//! - A `BroadcastGroup` for fan-out to connected sessions
//! - The session set backing the presence projection
//!
//! The server never originates document mutations; it applies well-formed
//! deltas from admitted sessions and fans them out. Room metadata and
//! identity live behind the gateway, which issues the credentials checked
//! here at join time.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use slate_core::{extract_snapshot, BoardDocument};

use crate::broadcast::BroadcastGroup;
use crate::presence::AwarenessMessage;
use crate::protocol::{MessageType, SessionProfile, SyncMessage};

/// Outcome of a verified join credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedSession {
    /// The durable user id the credential was issued to.
    pub user_id: String,
}

/// Why a join was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinDenied {
    InvalidCredential(String),
    Expired,
    WrongRoom,
}

impl std::fmt::Display for JoinDenied {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidCredential(reason) => write!(f, "invalid credential: {reason}"),
            Self::Expired => write!(f, "credential expired"),
            Self::WrongRoom => write!(f, "credential not scoped to this room"),
        }
    }
}

/// Verifies gateway-issued room credentials at join time.
///
/// The gateway implements this against its signing key; tests supply
/// their own.
pub trait JoinAuthorizer: Send + Sync {
    fn authorize(&self, credential: &str, room_id: &str) -> Result<AuthorizedSession, JoinDenied>;
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Maximum sessions per room
    pub max_sessions_per_room: usize,
    /// Broadcast channel capacity per room
    pub broadcast_capacity: usize,
    /// Heartbeat interval in seconds
    pub heartbeat_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            max_sessions_per_room: 100,
            broadcast_capacity: 256,
            heartbeat_interval_secs: 30,
        }
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_messages: u64,
    pub total_bytes: u64,
    pub active_rooms: usize,
    pub denied_joins: u64,
}

/// One room: authoritative document + broadcast group.
struct DocumentRoom {
    doc: BoardDocument,
    broadcast: Arc<BroadcastGroup>,
}

impl DocumentRoom {
    fn new(broadcast_capacity: usize) -> Self {
        Self {
            doc: BoardDocument::new(),
            broadcast: Arc::new(BroadcastGroup::new(broadcast_capacity)),
        }
    }
}

/// The sync server.
pub struct SyncServer {
    config: ServerConfig,
    /// Rooms: room_id → (BoardDocument + BroadcastGroup)
    rooms: Arc<RwLock<HashMap<String, DocumentRoom>>>,
    authorizer: Arc<dyn JoinAuthorizer>,
    stats: Arc<RwLock<ServerStats>>,
}

impl SyncServer {
    /// Create a new sync server.
    pub fn new(config: ServerConfig, authorizer: Arc<dyn JoinAuthorizer>) -> Self {
        Self {
            config,
            rooms: Arc::new(RwLock::new(HashMap::new())),
            authorizer,
            stats: Arc::new(RwLock::new(ServerStats::default())),
        }
    }

    /// Start listening for WebSocket connections.
    ///
    /// This runs the server event loop. Call from an async runtime.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!("Sync server listening on {}", self.config.bind_addr);

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let rooms = self.rooms.clone();
            let stats = self.stats.clone();
            let config = self.config.clone();
            let authorizer = self.authorizer.clone();

            tokio::spawn(async move {
                if let Err(e) =
                    Self::handle_connection(stream, addr, rooms, stats, config, authorizer).await
                {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    /// Handle a single WebSocket connection.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        rooms: Arc<RwLock<HashMap<String, DocumentRoom>>>,
        stats: Arc<RwLock<ServerStats>>,
        config: ServerConfig,
        authorizer: Arc<dyn JoinAuthorizer>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        log::info!("WebSocket connection established from {addr}");

        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        // State for this connection, set once the join is admitted
        let mut connection_id: Option<Uuid> = None;
        let mut room_id: Option<String> = None;
        let mut broadcast_rx: Option<tokio::sync::broadcast::Receiver<Arc<Vec<u8>>>> = None;

        loop {
            tokio::select! {
                // Incoming WebSocket message
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Binary(data))) => {
                            let bytes: Vec<u8> = data.into();
                            let sync_msg = match SyncMessage::decode(&bytes) {
                                Ok(m) => m,
                                Err(e) => {
                                    log::warn!("Failed to decode message from {addr}: {e}");
                                    continue;
                                }
                            };

                            {
                                let mut s = stats.write().await;
                                s.total_messages += 1;
                                s.total_bytes += bytes.len() as u64;
                            }

                            match sync_msg.msg_type {
                                MessageType::Join => {
                                    let request = match sync_msg.join_request() {
                                        Ok(r) => r,
                                        Err(e) => {
                                            log::warn!("Malformed join from {addr}: {e}");
                                            break;
                                        }
                                    };

                                    // Gate on the gateway-issued credential before
                                    // any room state is touched.
                                    let authorized = match authorizer
                                        .authorize(&request.credential, &sync_msg.room_id)
                                    {
                                        Ok(a) => a,
                                        Err(denied) => {
                                            log::warn!(
                                                "Join denied for {} on room {}: {denied}",
                                                request.profile.user_id,
                                                sync_msg.room_id
                                            );
                                            stats.write().await.denied_joins += 1;
                                            break;
                                        }
                                    };
                                    if authorized.user_id != request.profile.user_id {
                                        log::warn!(
                                            "Join denied: credential issued to {} presented by {}",
                                            authorized.user_id,
                                            request.profile.user_id
                                        );
                                        stats.write().await.denied_joins += 1;
                                        break;
                                    }

                                    let profile = request.profile.clone();

                                    let mut rooms_w = rooms.write().await;
                                    let room = rooms_w
                                        .entry(sync_msg.room_id.clone())
                                        .or_insert_with(|| DocumentRoom::new(config.broadcast_capacity));

                                    if room.broadcast.session_count().await >= config.max_sessions_per_room {
                                        log::warn!("Room {} full, refusing {addr}", sync_msg.room_id);
                                        stats.write().await.denied_joins += 1;
                                        break;
                                    }

                                    let rx = room.broadcast.add_session(profile.clone()).await;
                                    broadcast_rx = Some(rx);
                                    connection_id = Some(profile.connection_id);
                                    room_id = Some(sync_msg.room_id.clone());

                                    let state = room.doc.encode_state_as_update();
                                    let existing = room.broadcast.sessions().await;
                                    let join_msg = SyncMessage::session_joined(&sync_msg.room_id, &profile);
                                    let broadcast_clone = room.broadcast.clone();
                                    let room_count = rooms_w.len();
                                    drop(rooms_w); // Release lock before awaiting the socket

                                    // Current document state first, then the
                                    // session list, so the newcomer renders a
                                    // complete board with everyone present.
                                    let state_msg = SyncMessage::sync_step2(&sync_msg.room_id, state);
                                    ws_sender.send(Message::Binary(state_msg.encode()?.into())).await?;
                                    for session in existing {
                                        if session.connection_id == profile.connection_id {
                                            continue;
                                        }
                                        let peer_msg = SyncMessage::session_joined(&sync_msg.room_id, &session);
                                        ws_sender.send(Message::Binary(peer_msg.encode()?.into())).await?;
                                    }

                                    let _ = broadcast_clone.broadcast(&join_msg);

                                    {
                                        let mut s = stats.write().await;
                                        s.active_rooms = room_count;
                                    }

                                    log::info!(
                                        "Session {} ({}) joined room {}",
                                        profile.name,
                                        profile.connection_id,
                                        sync_msg.room_id
                                    );
                                }

                                MessageType::Delta => {
                                    // Apply to the authoritative doc, then fan out
                                    if let Some(ref rid) = room_id {
                                        let broadcast_clone = {
                                            let rooms_r = rooms.read().await;
                                            if let Some(room) = rooms_r.get(rid) {
                                                if let Err(e) = room.doc.apply_remote_update(&sync_msg.payload) {
                                                    log::warn!("Rejected malformed delta for room {rid}: {e}");
                                                    None
                                                } else {
                                                    Some(room.broadcast.clone())
                                                }
                                            } else {
                                                None
                                            }
                                        };
                                        if let Some(bc) = broadcast_clone {
                                            let _ = bc.broadcast(&sync_msg);
                                        }
                                    }
                                }

                                MessageType::SyncStep1 => {
                                    // Client requesting the state it is missing
                                    if let Some(ref rid) = room_id {
                                        let diff = {
                                            let rooms_r = rooms.read().await;
                                            rooms_r
                                                .get(rid)
                                                .and_then(|room| room.doc.encode_diff(&sync_msg.payload).ok())
                                        };
                                        if let Some(diff) = diff {
                                            let response = SyncMessage::sync_step2(rid.clone(), diff);
                                            ws_sender.send(Message::Binary(response.encode()?.into())).await?;
                                        }
                                    }
                                }

                                MessageType::Awareness => {
                                    if let Some(ref rid) = room_id {
                                        if let Ok(awareness) = AwarenessMessage::decode(&sync_msg.payload) {
                                            match &awareness {
                                                AwarenessMessage::Join { name, .. } => {
                                                    log::info!("Presence: {name} joined room {rid}");
                                                }
                                                AwarenessMessage::Leave { connection_id } => {
                                                    log::info!("Presence: {connection_id} left room {rid}");
                                                }
                                                AwarenessMessage::Cursor { .. } => {
                                                    log::trace!("Presence: cursor update in room {rid}");
                                                }
                                                AwarenessMessage::Selection { connection_id, layer_ids } => {
                                                    log::debug!(
                                                        "Presence: {connection_id} selected {} layers in room {rid}",
                                                        layer_ids.len()
                                                    );
                                                }
                                            }
                                        }

                                        let broadcast_clone = {
                                            let rooms_r = rooms.read().await;
                                            rooms_r.get(rid).map(|r| r.broadcast.clone())
                                        };
                                        if let Some(bc) = broadcast_clone {
                                            let _ = bc.broadcast(&sync_msg);
                                        }
                                    }
                                }

                                MessageType::Ping => {
                                    if let Some(cid) = connection_id {
                                        let pong = SyncMessage::pong(cid);
                                        ws_sender.send(Message::Binary(pong.encode()?.into())).await?;
                                    }
                                }

                                _ => {
                                    log::debug!("Unhandled message type: {:?}", sync_msg.msg_type);
                                }
                            }
                        }

                        Some(Ok(Message::Close(_))) | None => {
                            log::info!("Connection closed from {addr}");
                            break;
                        }

                        Some(Ok(Message::Ping(data))) => {
                            ws_sender.send(Message::Pong(data)).await?;
                        }

                        Some(Err(e)) => {
                            log::error!("WebSocket error from {addr}: {e}");
                            break;
                        }

                        _ => {}
                    }
                }

                // Outgoing broadcast message
                msg = async {
                    if let Some(ref mut rx) = broadcast_rx {
                        rx.recv().await
                    } else {
                        // Not joined yet: wait forever
                        std::future::pending().await
                    }
                } => {
                    match msg {
                        Ok(data) => {
                            if let Ok(sync_msg) = SyncMessage::decode(&data) {
                                // Don't echo back to sender
                                if Some(sync_msg.connection_id) == connection_id {
                                    continue;
                                }
                                // Room evicted: tell the client, then hang up
                                if sync_msg.msg_type == MessageType::RoomClosed {
                                    let _ = ws_sender.send(Message::Binary(data.to_vec().into())).await;
                                    break;
                                }
                            }
                            ws_sender.send(Message::Binary(data.to_vec().into())).await?;
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            log::warn!("Session {connection_id:?} lagged by {n} messages");
                        }
                        Err(_) => break,
                    }
                }
            }
        }

        // Cleanup: remove session from room
        if let (Some(cid), Some(rid)) = (connection_id, room_id) {
            let mut rooms_w = rooms.write().await;
            if let Some(room) = rooms_w.get_mut(&rid) {
                room.broadcast.remove_session(&cid).await;

                let leave_msg = SyncMessage::session_left(cid, &rid);
                let _ = room.broadcast.broadcast(&leave_msg);

                if room.broadcast.session_count().await == 0 {
                    rooms_w.remove(&rid);
                    log::info!("Room {rid} removed (empty)");
                }
            }

            let mut s = stats.write().await;
            s.active_connections = s.active_connections.saturating_sub(1);
            s.active_rooms = rooms_w.len();
        } else {
            let mut s = stats.write().await;
            s.active_connections = s.active_connections.saturating_sub(1);
        }

        Ok(())
    }

    /// Extract the assistant-facing snapshot of a live room.
    ///
    /// Returns `None` when no session has the room open (no live document
    /// exists server-side; the board is simply empty of activity).
    pub async fn room_snapshot(&self, room_id: &str) -> Option<String> {
        let rooms = self.rooms.read().await;
        rooms.get(room_id).map(|room| extract_snapshot(&room.doc))
    }

    /// Current participant profiles of a live room.
    pub async fn room_sessions(&self, room_id: &str) -> Vec<SessionProfile> {
        let rooms = self.rooms.read().await;
        match rooms.get(room_id) {
            Some(room) => room.broadcast.sessions().await,
            None => Vec::new(),
        }
    }

    /// Evict a room: every connected session is told the room closed and
    /// disconnected, and the authoritative document is dropped. Called when
    /// the board is deleted.
    pub async fn evict_room(&self, room_id: &str) -> bool {
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.remove(room_id) {
            let _ = room.broadcast.broadcast(&SyncMessage::room_closed(room_id));
            log::info!("Room {room_id} evicted");
            let mut s = self.stats.write().await;
            s.active_rooms = rooms.len();
            true
        } else {
            false
        }
    }

    /// Get server statistics.
    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    /// Get the configured bind address.
    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accepts `"token:<user_id>:<room_id>"` shaped credentials.
    struct TestAuthorizer;

    impl JoinAuthorizer for TestAuthorizer {
        fn authorize(
            &self,
            credential: &str,
            room_id: &str,
        ) -> Result<AuthorizedSession, JoinDenied> {
            let mut parts = credential.splitn(3, ':');
            match (parts.next(), parts.next(), parts.next()) {
                (Some("token"), Some(user), Some(room)) if room == room_id => {
                    Ok(AuthorizedSession {
                        user_id: user.to_string(),
                    })
                }
                (Some("token"), Some(_), Some(_)) => Err(JoinDenied::WrongRoom),
                _ => Err(JoinDenied::InvalidCredential("bad shape".into())),
            }
        }
    }

    fn test_server() -> SyncServer {
        SyncServer::new(ServerConfig::default(), Arc::new(TestAuthorizer))
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:9090");
        assert_eq!(config.max_sessions_per_room, 100);
        assert_eq!(config.broadcast_capacity, 256);
        assert_eq!(config.heartbeat_interval_secs, 30);
    }

    #[test]
    fn test_authorizer_scoping() {
        let auth = TestAuthorizer;
        assert_eq!(
            auth.authorize("token:user_1:room-a", "room-a"),
            Ok(AuthorizedSession {
                user_id: "user_1".into()
            })
        );
        assert_eq!(
            auth.authorize("token:user_1:room-a", "room-b"),
            Err(JoinDenied::WrongRoom)
        );
        assert!(matches!(
            auth.authorize("garbage", "room-a"),
            Err(JoinDenied::InvalidCredential(_))
        ));
    }

    #[tokio::test]
    async fn test_server_stats_initial() {
        let server = test_server();
        let stats = server.stats().await;
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.total_messages, 0);
        assert_eq!(stats.active_rooms, 0);
        assert_eq!(stats.denied_joins, 0);
    }

    #[tokio::test]
    async fn test_room_snapshot_absent_room() {
        let server = test_server();
        assert_eq!(server.room_snapshot("nope").await, None);
        assert!(server.room_sessions("nope").await.is_empty());
    }

    #[tokio::test]
    async fn test_evict_absent_room() {
        let server = test_server();
        assert!(!server.evict_room("nope").await);
    }

    #[tokio::test]
    async fn test_document_room_creation() {
        let room = DocumentRoom::new(64);
        assert_eq!(room.broadcast.session_count().await, 0);
        assert_eq!(room.broadcast.capacity(), 64);
        assert_eq!(room.doc.layer_count(), 0);
    }
}
