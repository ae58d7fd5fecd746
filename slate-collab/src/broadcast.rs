//! Fan-out broadcast to N-1 sessions with backpressure.
//!
//! Uses tokio broadcast channels for O(1) send to all subscribers.
//! Each session gets an independent receiver that buffers up to `capacity`
//! messages; lagging receivers drop the oldest.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::protocol::{SessionProfile, SyncMessage};

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Default)]
pub struct BroadcastStats {
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub active_sessions: usize,
}

/// Atomic broadcast stats, lock-free on the hot path.
struct AtomicBroadcastStats {
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
}

impl AtomicBroadcastStats {
    fn new() -> Self {
        Self {
            messages_sent: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
        }
    }
}

/// A broadcast group for a single room.
///
/// All sessions in the same room share one broadcast channel. When a
/// session sends a delta, it is fanned out to the N-1 other sessions
/// (filtering out the sender is the receiver loop's job).
pub struct BroadcastGroup {
    sender: broadcast::Sender<Arc<Vec<u8>>>,

    /// Connected sessions in this room
    sessions: Arc<RwLock<HashMap<Uuid, SessionProfile>>>,

    /// Channel capacity (messages buffered per receiver)
    capacity: usize,

    atomic_stats: Arc<AtomicBroadcastStats>,
}

impl BroadcastGroup {
    /// Create a new broadcast group with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            capacity,
            atomic_stats: Arc::new(AtomicBroadcastStats::new()),
        }
    }

    /// Add a session to this broadcast group.
    ///
    /// Returns a receiver for this session to consume messages.
    pub async fn add_session(&self, profile: SessionProfile) -> broadcast::Receiver<Arc<Vec<u8>>> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(profile.connection_id, profile);
        self.sender.subscribe()
    }

    /// Remove a session from this broadcast group.
    pub async fn remove_session(&self, connection_id: &Uuid) -> Option<SessionProfile> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(connection_id)
    }

    /// Broadcast a message to all sessions.
    ///
    /// Returns the number of receivers that got the message. Stats are
    /// tracked via atomics; no lock on the hot path.
    pub fn broadcast(&self, msg: &SyncMessage) -> Result<usize, crate::protocol::ProtocolError> {
        let encoded = msg.encode()?;
        let count = self.sender.send(Arc::new(encoded)).unwrap_or(0);
        self.atomic_stats.messages_sent.fetch_add(1, Ordering::Relaxed);
        Ok(count)
    }

    /// Broadcast pre-encoded bytes directly (zero-copy fast path).
    pub fn broadcast_raw(&self, encoded: Arc<Vec<u8>>) -> usize {
        let count = self.sender.send(encoded).unwrap_or(0);
        self.atomic_stats.messages_sent.fetch_add(1, Ordering::Relaxed);
        count
    }

    /// Get the current session count.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Get all connected session profiles.
    pub async fn sessions(&self) -> Vec<SessionProfile> {
        self.sessions.read().await.values().cloned().collect()
    }

    /// Check if a session is connected.
    pub async fn has_session(&self, connection_id: &Uuid) -> bool {
        self.sessions.read().await.contains_key(connection_id)
    }

    /// Get broadcast statistics.
    pub async fn stats(&self) -> BroadcastStats {
        let sessions = self.sessions.read().await;
        BroadcastStats {
            messages_sent: self.atomic_stats.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.atomic_stats.messages_dropped.load(Ordering::Relaxed),
            active_sessions: sessions.len(),
        }
    }

    /// Get the channel capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Subscribe to this broadcast group (raw receiver).
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Vec<u8>>> {
        self.sender.subscribe()
    }
}

/// Room manager: maps room ids to broadcast groups.
///
/// Each room gets its own broadcast group so that messages are isolated
/// between rooms.
pub struct RoomManager {
    rooms: Arc<RwLock<HashMap<String, Arc<BroadcastGroup>>>>,
    default_capacity: usize,
}

impl RoomManager {
    /// Create a new room manager.
    pub fn new(default_capacity: usize) -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            default_capacity,
        }
    }

    /// Get or create a group for the given room.
    pub async fn get_or_create(&self, room_id: &str) -> Arc<BroadcastGroup> {
        // Fast path: read lock
        {
            let rooms = self.rooms.read().await;
            if let Some(room) = rooms.get(room_id) {
                return room.clone();
            }
        }

        // Slow path: write lock to create, double-checked
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(room_id) {
            return room.clone();
        }

        let room = Arc::new(BroadcastGroup::new(self.default_capacity));
        rooms.insert(room_id.to_string(), room.clone());
        room
    }

    /// Remove an empty room.
    pub async fn remove_if_empty(&self, room_id: &str) -> bool {
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(room_id) {
            if room.session_count().await == 0 {
                rooms.remove(room_id);
                return true;
            }
        }
        false
    }

    /// Get the number of active rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Get all active room ids.
    pub async fn active_rooms(&self) -> Vec<String> {
        self.rooms.read().await.keys().cloned().collect()
    }
}
