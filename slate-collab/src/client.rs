//! WebSocket sync client for connecting to the collaboration server.
//!
//! Provides:
//! - Connection lifecycle (connect, disconnect)
//! - Credentialed join handshake
//! - Delta send/receive with automatic document integration
//! - Awareness (cursor/selection) updates
//! - Offline queue for disconnected edits

use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use futures_util::StreamExt;
use uuid::Uuid;

use crate::presence::AwarenessMessage;
use crate::protocol::{JoinRequest, ProtocolError, SessionProfile, SyncMessage};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Events emitted by the sync client.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// Connection established and join sent
    Connected,
    /// Connection lost
    Disconnected,
    /// Received a CRDT delta from a remote session
    RemoteDelta {
        connection_id: Uuid,
        clock: u64,
        update: Vec<u8>,
    },
    /// Received awareness update from a remote session
    RemoteAwareness {
        connection_id: Uuid,
        message: AwarenessMessage,
    },
    /// Another session joined the room
    SessionJoined(SessionProfile),
    /// A session left the room
    SessionLeft(Uuid),
    /// Document state sync received
    StateSynced(Vec<u8>),
    /// The room was evicted server-side (board deleted)
    RoomClosed,
}

/// Offline queue for edits made while disconnected.
///
/// Queued deltas are replayed on reconnection.
pub struct OfflineQueue {
    queue: VecDeque<QueuedDelta>,
    max_size: usize,
}

#[derive(Debug, Clone)]
struct QueuedDelta {
    clock: u64,
    payload: Vec<u8>,
}

impl OfflineQueue {
    /// Create a new offline queue with max capacity.
    pub fn new(max_size: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(max_size.min(1024)),
            max_size,
        }
    }

    /// Queue a delta for later replay.
    pub fn enqueue(&mut self, clock: u64, payload: Vec<u8>) -> bool {
        if self.queue.len() >= self.max_size {
            return false; // Queue full
        }
        self.queue.push_back(QueuedDelta { clock, payload });
        true
    }

    /// Drain all queued deltas for replay.
    pub fn drain(&mut self) -> Vec<(u64, Vec<u8>)> {
        self.queue.drain(..).map(|d| (d.clock, d.payload)).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Total bytes queued.
    pub fn total_bytes(&self) -> usize {
        self.queue.iter().map(|d| d.payload.len()).sum()
    }
}

/// The sync client.
///
/// Manages a WebSocket connection to the collaboration server, handles the
/// credentialed join, delta sync, awareness updates, and offline queueing.
pub struct SyncClient {
    /// Our session identity
    profile: SessionProfile,

    /// Room we are editing
    room_id: String,

    /// Gateway-issued room credential presented at join
    credential: String,

    /// Connection state
    state: Arc<RwLock<ConnectionState>>,

    /// Lamport clock for per-origin ordering
    clock: Arc<RwLock<u64>>,

    /// Offline queue for disconnected edits
    offline_queue: Arc<Mutex<OfflineQueue>>,

    /// Channel to send messages to the WebSocket writer task
    outgoing_tx: Option<mpsc::Sender<Vec<u8>>>,

    /// Event receiver for the application
    event_rx: Option<mpsc::Receiver<SyncEvent>>,

    /// Event sender (held by connection task)
    event_tx: mpsc::Sender<SyncEvent>,

    /// Server URL
    server_url: String,
}

impl SyncClient {
    /// Create a new sync client.
    pub fn new(
        profile: SessionProfile,
        room_id: impl Into<String>,
        credential: impl Into<String>,
        server_url: impl Into<String>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        Self {
            profile,
            room_id: room_id.into(),
            credential: credential.into(),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            clock: Arc::new(RwLock::new(0)),
            offline_queue: Arc::new(Mutex::new(OfflineQueue::new(10_000))),
            outgoing_tx: None,
            event_rx: Some(event_rx),
            event_tx,
            server_url: server_url.into(),
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<SyncEvent>> {
        self.event_rx.take()
    }

    /// Connect to the server and join the room.
    ///
    /// Spawns background tasks for reading/writing WebSocket messages.
    pub async fn connect(&mut self) -> Result<(), ProtocolError> {
        *self.state.write().await = ConnectionState::Connecting;

        let ws_result = tokio_tungstenite::connect_async(&self.server_url).await;

        match ws_result {
            Ok((ws_stream, _)) => {
                let (ws_writer, mut ws_reader) = futures_util::StreamExt::split(ws_stream);

                // Outgoing message channel
                let (out_tx, mut out_rx) = mpsc::channel::<Vec<u8>>(256);
                self.outgoing_tx = Some(out_tx);

                // Writer task: forward outgoing channel to WebSocket
                let ws_writer = Arc::new(tokio::sync::Mutex::new(ws_writer));
                let writer = ws_writer.clone();
                tokio::spawn(async move {
                    while let Some(data) = out_rx.recv().await {
                        let mut w = writer.lock().await;
                        use futures_util::SinkExt;
                        if w.send(tokio_tungstenite::tungstenite::Message::Binary(data.into()))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                });

                // Join handshake: profile + credential
                let join = SyncMessage::join(
                    &self.room_id,
                    &JoinRequest {
                        profile: self.profile.clone(),
                        credential: self.credential.clone(),
                    },
                );
                if let Ok(encoded) = join.encode() {
                    if let Some(ref tx) = self.outgoing_tx {
                        let _ = tx.send(encoded).await;
                    }
                }

                *self.state.write().await = ConnectionState::Connected;
                let _ = self.event_tx.send(SyncEvent::Connected).await;

                // Replay offline queue
                {
                    let mut queue = self.offline_queue.lock().await;
                    let queued = queue.drain();
                    if !queued.is_empty() {
                        log::info!("Replaying {} queued deltas", queued.len());
                        for (clock, payload) in queued {
                            let msg = SyncMessage::delta(
                                self.profile.connection_id,
                                &self.room_id,
                                clock,
                                payload,
                            );
                            if let Ok(encoded) = msg.encode() {
                                if let Some(ref tx) = self.outgoing_tx {
                                    let _ = tx.send(encoded).await;
                                }
                            }
                        }
                    }
                }

                // Reader task: process incoming WebSocket messages
                let event_tx = self.event_tx.clone();
                let state = self.state.clone();
                let connection_id = self.profile.connection_id;
                tokio::spawn(async move {
                    while let Some(msg) = ws_reader.next().await {
                        match msg {
                            Ok(tokio_tungstenite::tungstenite::Message::Binary(data)) => {
                                let bytes: Vec<u8> = data.into();
                                if let Ok(sync_msg) = SyncMessage::decode(&bytes) {
                                    // Skip our own messages
                                    if sync_msg.connection_id == connection_id {
                                        continue;
                                    }

                                    let event = match sync_msg.msg_type {
                                        crate::protocol::MessageType::Delta => {
                                            Some(SyncEvent::RemoteDelta {
                                                connection_id: sync_msg.connection_id,
                                                clock: sync_msg.clock,
                                                update: sync_msg.payload,
                                            })
                                        }
                                        crate::protocol::MessageType::SyncStep2 => {
                                            Some(SyncEvent::StateSynced(sync_msg.payload))
                                        }
                                        crate::protocol::MessageType::Awareness => {
                                            AwarenessMessage::decode(&sync_msg.payload).ok().map(
                                                |message| SyncEvent::RemoteAwareness {
                                                    connection_id: sync_msg.connection_id,
                                                    message,
                                                },
                                            )
                                        }
                                        crate::protocol::MessageType::SessionJoined => {
                                            sync_msg.session_profile().ok().map(SyncEvent::SessionJoined)
                                        }
                                        crate::protocol::MessageType::SessionLeft => {
                                            Some(SyncEvent::SessionLeft(sync_msg.connection_id))
                                        }
                                        crate::protocol::MessageType::RoomClosed => {
                                            Some(SyncEvent::RoomClosed)
                                        }
                                        _ => None,
                                    };

                                    let closed =
                                        matches!(event, Some(SyncEvent::RoomClosed));
                                    if let Some(evt) = event {
                                        let _ = event_tx.send(evt).await;
                                    }
                                    if closed {
                                        break;
                                    }
                                }
                            }
                            Ok(tokio_tungstenite::tungstenite::Message::Close(_)) | Err(_) => {
                                break;
                            }
                            _ => {}
                        }
                    }

                    // Connection lost
                    *state.write().await = ConnectionState::Disconnected;
                    let _ = event_tx.send(SyncEvent::Disconnected).await;
                });

                Ok(())
            }
            Err(_e) => {
                *self.state.write().await = ConnectionState::Disconnected;
                Err(ProtocolError::ConnectionClosed)
            }
        }
    }

    /// Send a CRDT delta to the server.
    ///
    /// If disconnected, queues the delta for later replay.
    pub async fn send_delta(&self, update: Vec<u8>) -> Result<(), ProtocolError> {
        let mut clock = self.clock.write().await;
        *clock += 1;
        let current_clock = *clock;

        let state = *self.state.read().await;
        if state != ConnectionState::Connected {
            // Queue for offline replay
            let mut queue = self.offline_queue.lock().await;
            if !queue.enqueue(current_clock, update) {
                return Err(ProtocolError::ConnectionClosed);
            }
            return Ok(());
        }

        let msg = SyncMessage::delta(
            self.profile.connection_id,
            &self.room_id,
            current_clock,
            update,
        );
        let encoded = msg.encode()?;

        if let Some(ref tx) = self.outgoing_tx {
            tx.send(encoded)
                .await
                .map_err(|_| ProtocolError::ConnectionClosed)?;
        }

        Ok(())
    }

    /// Send an awareness update (cursor position, selection).
    pub async fn send_awareness(&self, message: &AwarenessMessage) -> Result<(), ProtocolError> {
        let state = *self.state.read().await;
        if state != ConnectionState::Connected {
            return Ok(()); // Silently drop awareness when offline
        }

        let payload = message
            .encode()
            .map_err(ProtocolError::SerializationError)?;
        let clock = *self.clock.read().await;
        let msg = SyncMessage::awareness(self.profile.connection_id, &self.room_id, clock, payload);
        let encoded = msg.encode()?;

        if let Some(ref tx) = self.outgoing_tx {
            tx.send(encoded)
                .await
                .map_err(|_| ProtocolError::ConnectionClosed)?;
        }

        Ok(())
    }

    /// Send a ping to the server.
    pub async fn send_ping(&self) -> Result<(), ProtocolError> {
        let msg = SyncMessage::ping(self.profile.connection_id);
        let encoded = msg.encode()?;

        if let Some(ref tx) = self.outgoing_tx {
            tx.send(encoded)
                .await
                .map_err(|_| ProtocolError::ConnectionClosed)?;
        }

        Ok(())
    }

    /// Get the current connection state.
    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Get our session profile.
    pub fn profile(&self) -> &SessionProfile {
        &self.profile
    }

    /// Get the room id.
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Get the server URL.
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Get the current Lamport clock value.
    pub async fn clock(&self) -> u64 {
        *self.clock.read().await
    }

    /// Get offline queue length.
    pub async fn offline_queue_len(&self) -> usize {
        self.offline_queue.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::Vec2;

    fn test_client() -> SyncClient {
        let profile = SessionProfile::new("user_1", "TestUser");
        SyncClient::new(profile, "room-1", "credential", "ws://localhost:9090")
    }

    #[test]
    fn test_client_creation() {
        let client = test_client();
        assert_eq!(client.profile().name, "TestUser");
        assert_eq!(client.room_id(), "room-1");
        assert_eq!(client.server_url(), "ws://localhost:9090");
    }

    #[tokio::test]
    async fn test_client_initial_state() {
        let client = test_client();
        assert_eq!(client.connection_state().await, ConnectionState::Disconnected);
        assert_eq!(client.clock().await, 0);
        assert_eq!(client.offline_queue_len().await, 0);
    }

    #[tokio::test]
    async fn test_send_delta_offline_queues() {
        let client = test_client();

        // Not connected: delta is queued
        client.send_delta(vec![1, 2, 3]).await.unwrap();
        assert_eq!(client.offline_queue_len().await, 1);

        client.send_delta(vec![4, 5, 6]).await.unwrap();
        assert_eq!(client.offline_queue_len().await, 2);

        // Clock incremented per send
        assert_eq!(client.clock().await, 2);
    }

    #[tokio::test]
    async fn test_send_awareness_offline_noop() {
        let client = test_client();
        let message = AwarenessMessage::Cursor {
            connection_id: client.profile().connection_id,
            position: Vec2::new(1.0, 2.0),
            timestamp: 1,
        };
        // Should not error when offline
        client.send_awareness(&message).await.unwrap();
    }

    #[test]
    fn test_offline_queue() {
        let mut queue = OfflineQueue::new(100);
        assert!(queue.is_empty());

        queue.enqueue(1, vec![1, 2, 3]);
        queue.enqueue(2, vec![4, 5, 6, 7]);

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.total_bytes(), 7);

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].0, 1);
        assert_eq!(drained[0].1, vec![1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_offline_queue_capacity() {
        let mut queue = OfflineQueue::new(3);

        assert!(queue.enqueue(1, vec![1]));
        assert!(queue.enqueue(2, vec![2]));
        assert!(queue.enqueue(3, vec![3]));
        assert!(!queue.enqueue(4, vec![4])); // Full

        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_offline_queue_clear() {
        let mut queue = OfflineQueue::new(100);
        queue.enqueue(1, vec![1]);
        queue.enqueue(2, vec![2]);
        queue.clear();
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_take_event_rx() {
        let mut client = test_client();
        assert!(client.take_event_rx().is_some());
        assert!(client.take_event_rx().is_none());
    }
}
