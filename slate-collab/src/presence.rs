//! Presence: who is in the room, where their cursor is, what they have
//! selected, and how that set projects into the participant display list.
//!
//! ```text
//! Local cursor move
//!       │
//!       ▼
//! PresenceRoom::update_local_cursor()
//!       │  (rate-limited: 30fps)
//!       ▼
//! AwarenessMessage::Cursor { … }
//!       │
//!       ▼   (WebSocket broadcast)
//! Remote PresenceRoom
//!       │
//!       ▼
//! RemoteSessionState::update()  (interpolation)
//! ```
//!
//! None of this is authoritative state: the display list, colors and
//! cursor positions are derived from the connected session set and vanish
//! with it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::protocol::SessionProfile;

/// How many other participants are shown before collapsing into "+N more".
pub const MAX_SHOWN_OTHERS: usize = 2;

// ───────────────────────────────────────────────────────────────────
// Core types
// ───────────────────────────────────────────────────────────────────

/// 2D position in document (world) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Vec2) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Linear interpolation toward `target` by factor `t` in [0, 1].
    pub fn lerp(&self, target: &Vec2, t: f32) -> Vec2 {
        Vec2 {
            x: self.x + (target.x - self.x) * t,
            y: self.y + (target.y - self.y) * t,
        }
    }
}

impl Default for Vec2 {
    fn default() -> Self {
        Self::ZERO
    }
}

/// RGBA color for cursor/avatar-ring rendering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PresenceColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl PresenceColor {
    /// Generate a stable, visually distinct color from a connection id.
    ///
    /// Uses HSL with high saturation; the hue is derived from the id hash
    /// so the same connection always renders the same color everywhere.
    pub fn from_connection(id: Uuid) -> Self {
        let hash = id.as_u128();
        let hue = ((hash % 360) as f32) / 360.0;
        let saturation = 0.7;
        let lightness = 0.6;

        let (r, g, b) = hsl_to_rgb(hue, saturation, lightness);
        Self { r, g, b, a: 1.0 }
    }

    /// Convert to [f32; 4] array for GPU upload.
    pub fn to_array(&self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }
}

impl Default for PresenceColor {
    fn default() -> Self {
        Self { r: 0.26, g: 0.52, b: 0.96, a: 1.0 } // Default blue
    }
}

fn hsl_to_rgb(h: f32, s: f32, l: f32) -> (f32, f32, f32) {
    if s == 0.0 {
        return (l, l, l); // Achromatic
    }

    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;

    let r = hue_to_rgb(p, q, h + 1.0 / 3.0);
    let g = hue_to_rgb(p, q, h);
    let b = hue_to_rgb(p, q, h - 1.0 / 3.0);

    (r, g, b)
}

fn hue_to_rgb(p: f32, q: f32, mut t: f32) -> f32 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        return p + (q - p) * 6.0 * t;
    }
    if t < 1.0 / 2.0 {
        return q;
    }
    if t < 2.0 / 3.0 {
        return p + (q - p) * (2.0 / 3.0 - t) * 6.0;
    }
    p
}

// ───────────────────────────────────────────────────────────────────
// Wire protocol messages
// ───────────────────────────────────────────────────────────────────

/// Awareness message types sent over the wire.
///
/// These are serialized inside `SyncMessage::Awareness` payloads.
/// Cursor updates are rate-limited to 30fps (33ms) to reduce bandwidth.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum AwarenessMessage {
    /// Announce a session's profile to the room.
    Join {
        connection_id: Uuid,
        user_id: String,
        name: String,
        avatar: Option<String>,
    },

    /// Leave room (clean disconnect).
    Leave { connection_id: Uuid },

    /// Cursor position update (high frequency, rate-limited to 30fps).
    Cursor {
        connection_id: Uuid,
        position: Vec2,
        /// Monotonic timestamp for interpolation ordering.
        timestamp: u64,
    },

    /// Selection update (lower frequency, only on selection change).
    Selection {
        connection_id: Uuid,
        /// Ids of selected layers.
        layer_ids: Vec<String>,
    },
}

impl AwarenessMessage {
    /// Check if this message should be broadcast given the last broadcast
    /// time. Cursor updates are throttled; Join/Leave/Selection are always
    /// immediate.
    pub fn should_broadcast(&self, last_broadcast: Instant) -> bool {
        match self {
            AwarenessMessage::Cursor { .. } => {
                last_broadcast.elapsed() >= Duration::from_millis(33)
            }
            _ => true,
        }
    }

    /// Encode to binary (bincode).
    #[inline(always)]
    pub fn encode(&self) -> Result<Vec<u8>, String> {
        bincode::serde::encode_to_vec(self, bincode::config::standard()).map_err(|e| e.to_string())
    }

    /// Decode from binary.
    #[inline(always)]
    pub fn decode(bytes: &[u8]) -> Result<Self, String> {
        let (msg, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| e.to_string())?;
        Ok(msg)
    }

    /// Get the connection_id from any variant.
    pub fn connection_id(&self) -> Uuid {
        match self {
            AwarenessMessage::Join { connection_id, .. } => *connection_id,
            AwarenessMessage::Leave { connection_id } => *connection_id,
            AwarenessMessage::Cursor { connection_id, .. } => *connection_id,
            AwarenessMessage::Selection { connection_id, .. } => *connection_id,
        }
    }
}

// ───────────────────────────────────────────────────────────────────
// Remote session state with interpolation
// ───────────────────────────────────────────────────────────────────

/// A remote session's presence state tracked locally.
///
/// Maintains both the latest network position and a smoothly interpolated
/// rendering position to prevent jitter/teleportation.
#[derive(Debug, Clone)]
pub struct RemoteSessionState {
    pub connection_id: Uuid,
    pub name: String,
    pub avatar: Option<String>,
    pub color: PresenceColor,

    /// Current rendered position (interpolated).
    current: Vec2,
    /// Target position from last network update.
    target: Vec2,
    /// Velocity estimate for smooth interpolation.
    velocity: Vec2,

    /// Selected layer ids.
    pub selection: Vec<String>,

    /// Last time we received a network update.
    last_update: Instant,
    /// Last network timestamp (monotonic, from sender).
    last_timestamp: u64,
    /// Whether this session is actively connected.
    pub active: bool,
}

impl RemoteSessionState {
    pub fn new(connection_id: Uuid, name: String, color: PresenceColor) -> Self {
        Self {
            connection_id,
            name,
            avatar: None,
            color,
            current: Vec2::ZERO,
            target: Vec2::ZERO,
            velocity: Vec2::ZERO,
            selection: Vec::new(),
            last_update: Instant::now(),
            last_timestamp: 0,
            active: true,
        }
    }

    /// Update target position from a network cursor message.
    ///
    /// Only applies updates with newer timestamps (per-origin ordering).
    pub fn update_position(&mut self, new_position: Vec2, timestamp: u64) {
        // Reject stale updates
        if timestamp < self.last_timestamp {
            return;
        }

        let now = Instant::now();
        let dt = (now - self.last_update).as_secs_f32().max(0.001);

        // Estimate velocity from position delta
        self.velocity = Vec2::new(
            (new_position.x - self.target.x) / dt,
            (new_position.y - self.target.y) / dt,
        );

        self.target = new_position;
        self.last_update = now;
        self.last_timestamp = timestamp;
    }

    /// Update selection from a network selection message.
    pub fn update_selection(&mut self, layer_ids: Vec<String>) {
        self.selection = layer_ids;
    }

    /// Get the smoothly interpolated cursor position for rendering.
    ///
    /// Critically damped to avoid overshoot while providing smooth 60fps
    /// rendering from 30fps network updates.
    pub fn interpolated_position(&mut self) -> Vec2 {
        let now = Instant::now();
        let dt = (now - self.last_update).as_secs_f32();

        // Smoothing factor: higher = smoother but more latency
        let smooth_factor = 0.85_f32;
        let t = 1.0 - smooth_factor.powf(dt * 60.0); // Frame-rate independent

        self.current = self.current.lerp(&self.target, t.clamp(0.0, 1.0));
        self.current
    }

    /// Get the raw target position (last network update, no interpolation).
    pub fn target_position(&self) -> Vec2 {
        self.target
    }

    /// Check if this session has been idle for a given duration.
    pub fn is_idle(&self, timeout: Duration) -> bool {
        self.last_update.elapsed() > timeout
    }

    /// Mark as disconnected.
    pub fn disconnect(&mut self) {
        self.active = false;
    }
}

/// Per-cursor data handed to the renderer.
#[derive(Debug, Clone)]
pub struct CursorRenderData {
    pub connection_id: Uuid,
    pub position: Vec2,
    pub color: PresenceColor,
    pub name: String,
    pub selection: Vec<String>,
}

// ───────────────────────────────────────────────────────────────────
// Presence room — tracks all remote sessions
// ───────────────────────────────────────────────────────────────────

/// Manages presence state for all remote sessions in a room.
///
/// The local session sends cursor/selection updates; remote sessions'
/// states are tracked and interpolated for rendering.
pub struct PresenceRoom {
    /// Our local connection id.
    local_connection_id: Uuid,
    /// Remote session states, indexed by connection id.
    peers: HashMap<Uuid, RemoteSessionState>,
    /// Rate limiter: last time we broadcast a cursor update.
    last_cursor_broadcast: Instant,
    /// Minimum interval between cursor broadcasts (33ms = 30fps).
    cursor_broadcast_interval: Duration,
    /// Local cursor position (document coordinates).
    local_cursor: Vec2,
    /// Local selection.
    local_selection: Vec<String>,
    /// Monotonic timestamp counter for outgoing messages.
    timestamp_counter: u64,
}

impl PresenceRoom {
    pub fn new(local_connection_id: Uuid) -> Self {
        Self {
            local_connection_id,
            peers: HashMap::new(),
            last_cursor_broadcast: Instant::now() - Duration::from_secs(1), // allow immediate first broadcast
            cursor_broadcast_interval: Duration::from_millis(33), // 30fps
            local_cursor: Vec2::ZERO,
            local_selection: Vec::new(),
            timestamp_counter: 0,
        }
    }

    /// Create with custom broadcast interval (for testing).
    pub fn with_interval(local_connection_id: Uuid, interval: Duration) -> Self {
        let mut room = Self::new(local_connection_id);
        room.cursor_broadcast_interval = interval;
        room
    }

    /// Handle an incoming awareness message from the network.
    pub fn handle_message(&mut self, msg: &AwarenessMessage) {
        // Ignore our own messages
        if msg.connection_id() == self.local_connection_id {
            return;
        }

        match msg {
            AwarenessMessage::Join { connection_id, name, avatar, .. } => {
                let color = PresenceColor::from_connection(*connection_id);
                let mut state = RemoteSessionState::new(*connection_id, name.clone(), color);
                state.avatar = avatar.clone();
                self.peers.insert(*connection_id, state);
            }

            AwarenessMessage::Leave { connection_id } => {
                if let Some(peer) = self.peers.get_mut(connection_id) {
                    peer.disconnect();
                }
                self.peers.remove(connection_id);
            }

            AwarenessMessage::Cursor { connection_id, position, timestamp } => {
                if let Some(peer) = self.peers.get_mut(connection_id) {
                    peer.update_position(*position, *timestamp);
                } else {
                    // Cursor from an unknown session: it joined before we
                    // connected. Create a placeholder entry.
                    let color = PresenceColor::from_connection(*connection_id);
                    let mut state = RemoteSessionState::new(
                        *connection_id,
                        format!("Session-{}", &connection_id.to_string()[..8]),
                        color,
                    );
                    state.update_position(*position, *timestamp);
                    self.peers.insert(*connection_id, state);
                }
            }

            AwarenessMessage::Selection { connection_id, layer_ids } => {
                if let Some(peer) = self.peers.get_mut(connection_id) {
                    peer.update_selection(layer_ids.clone());
                }
            }
        }
    }

    /// Update local cursor position and return a message if it should be
    /// broadcast. Rate-limited; returns `None` when throttled.
    pub fn update_local_cursor(&mut self, position: Vec2) -> Option<AwarenessMessage> {
        self.local_cursor = position;

        if self.last_cursor_broadcast.elapsed() < self.cursor_broadcast_interval {
            return None; // Throttled
        }

        self.timestamp_counter += 1;
        self.last_cursor_broadcast = Instant::now();

        Some(AwarenessMessage::Cursor {
            connection_id: self.local_connection_id,
            position,
            timestamp: self.timestamp_counter,
        })
    }

    /// Force a cursor broadcast regardless of rate limiting.
    pub fn force_cursor_broadcast(&mut self) -> AwarenessMessage {
        self.timestamp_counter += 1;
        self.last_cursor_broadcast = Instant::now();

        AwarenessMessage::Cursor {
            connection_id: self.local_connection_id,
            position: self.local_cursor,
            timestamp: self.timestamp_counter,
        }
    }

    /// Update local selection and return a broadcast message.
    pub fn update_local_selection(&mut self, layer_ids: Vec<String>) -> AwarenessMessage {
        self.local_selection = layer_ids.clone();
        AwarenessMessage::Selection {
            connection_id: self.local_connection_id,
            layer_ids,
        }
    }

    /// Create a Join message for the local session.
    pub fn create_join_message(&self, profile: &SessionProfile) -> AwarenessMessage {
        AwarenessMessage::Join {
            connection_id: self.local_connection_id,
            user_id: profile.user_id.clone(),
            name: profile.name.clone(),
            avatar: profile.avatar.clone(),
        }
    }

    /// Create a Leave message for the local session.
    pub fn create_leave_message(&self) -> AwarenessMessage {
        AwarenessMessage::Leave {
            connection_id: self.local_connection_id,
        }
    }

    /// Get all remote sessions.
    pub fn remote_peers(&self) -> &HashMap<Uuid, RemoteSessionState> {
        &self.peers
    }

    /// Get a specific remote session.
    pub fn peer(&self, connection_id: &Uuid) -> Option<&RemoteSessionState> {
        self.peers.get(connection_id)
    }

    /// Number of remote sessions.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Get all active remote cursors for rendering, positions interpolated.
    pub fn active_cursors(&mut self) -> Vec<CursorRenderData> {
        self.peers
            .values_mut()
            .filter(|p| p.active)
            .map(|peer| {
                let position = peer.interpolated_position();
                CursorRenderData {
                    connection_id: peer.connection_id,
                    position,
                    color: peer.color,
                    name: peer.name.clone(),
                    selection: peer.selection.clone(),
                }
            })
            .collect()
    }
}

// ───────────────────────────────────────────────────────────────────
// Participant display projection
// ───────────────────────────────────────────────────────────────────

/// One entry of the participant strip: avatar ring color, label and the
/// single-character fallback shown when no avatar image is available.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantBadge {
    pub label: String,
    pub fallback: String,
    pub avatar: Option<String>,
    /// Ring color; `None` for the synthetic overflow badge.
    pub color: Option<PresenceColor>,
}

fn initial_of(name: &str) -> String {
    name.chars()
        .next()
        .map(|c| c.to_string())
        .unwrap_or_else(|| "T".to_string())
}

/// Derive the participant display list from the connected session set.
///
/// Shows at most [`MAX_SHOWN_OTHERS`] other sessions, then the local
/// session marked "(You)", then a "+N more" overflow badge when the room
/// is fuller than that. Pure projection: never mutates session state.
pub fn build_participant_list(
    local: Option<&SessionProfile>,
    others: &[SessionProfile],
) -> Vec<ParticipantBadge> {
    let mut badges = Vec::new();

    for session in others.iter().take(MAX_SHOWN_OTHERS) {
        badges.push(ParticipantBadge {
            label: session.name.clone(),
            fallback: initial_of(&session.name),
            avatar: session.avatar.clone(),
            color: Some(PresenceColor::from_connection(session.connection_id)),
        });
    }

    if let Some(me) = local {
        badges.push(ParticipantBadge {
            label: format!("{} (You)", me.name),
            fallback: initial_of(&me.name),
            avatar: me.avatar.clone(),
            color: Some(PresenceColor::from_connection(me.connection_id)),
        });
    }

    if others.len() > MAX_SHOWN_OTHERS {
        let extra = others.len() - MAX_SHOWN_OTHERS;
        badges.push(ParticipantBadge {
            label: format!("{extra} more"),
            fallback: format!("+{extra}"),
            avatar: None,
            color: None,
        });
    }

    badges
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str) -> SessionProfile {
        SessionProfile::new(format!("user_{name}"), name)
    }

    #[test]
    fn test_awareness_roundtrip() {
        let msg = AwarenessMessage::Cursor {
            connection_id: Uuid::new_v4(),
            position: Vec2::new(100.5, 200.3),
            timestamp: 7,
        };
        let decoded = AwarenessMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_selection_roundtrip_with_string_ids() {
        let msg = AwarenessMessage::Selection {
            connection_id: Uuid::new_v4(),
            layer_ids: vec!["layer-a".into(), "layer-b".into()],
        };
        let decoded = AwarenessMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_stable_color_from_connection() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(
            PresenceColor::from_connection(id),
            PresenceColor::from_connection(id)
        );
    }

    #[test]
    fn test_presence_room_join_leave() {
        let local = Uuid::new_v4();
        let mut room = PresenceRoom::new(local);

        let remote = profile("Alice");
        room.handle_message(&AwarenessMessage::Join {
            connection_id: remote.connection_id,
            user_id: remote.user_id.clone(),
            name: remote.name.clone(),
            avatar: None,
        });
        assert_eq!(room.peer_count(), 1);
        assert_eq!(room.peer(&remote.connection_id).unwrap().name, "Alice");

        room.handle_message(&AwarenessMessage::Leave {
            connection_id: remote.connection_id,
        });
        assert_eq!(room.peer_count(), 0);
    }

    #[test]
    fn test_presence_room_ignores_own_messages() {
        let local = Uuid::new_v4();
        let mut room = PresenceRoom::new(local);
        room.handle_message(&AwarenessMessage::Join {
            connection_id: local,
            user_id: "me".into(),
            name: "Me".into(),
            avatar: None,
        });
        assert_eq!(room.peer_count(), 0);
    }

    #[test]
    fn test_cursor_from_unknown_session_creates_placeholder() {
        let mut room = PresenceRoom::new(Uuid::new_v4());
        let ghost = Uuid::new_v4();
        room.handle_message(&AwarenessMessage::Cursor {
            connection_id: ghost,
            position: Vec2::new(5.0, 6.0),
            timestamp: 1,
        });
        assert_eq!(room.peer_count(), 1);
        assert!(room.peer(&ghost).unwrap().name.starts_with("Session-"));
    }

    #[test]
    fn test_stale_cursor_updates_rejected() {
        let mut state =
            RemoteSessionState::new(Uuid::new_v4(), "A".into(), PresenceColor::default());
        state.update_position(Vec2::new(10.0, 10.0), 5);
        state.update_position(Vec2::new(99.0, 99.0), 3); // stale
        assert_eq!(state.target_position(), Vec2::new(10.0, 10.0));
    }

    #[test]
    fn test_cursor_rate_limit() {
        let mut room = PresenceRoom::with_interval(Uuid::new_v4(), Duration::from_secs(3600));
        // First broadcast is allowed (limiter primed in the past)
        assert!(room.update_local_cursor(Vec2::new(1.0, 1.0)).is_some());
        // Immediately after: throttled
        assert!(room.update_local_cursor(Vec2::new(2.0, 2.0)).is_none());
        // Forced broadcast bypasses the limiter
        let forced = room.force_cursor_broadcast();
        assert!(matches!(forced, AwarenessMessage::Cursor { .. }));
    }

    #[test]
    fn test_participant_list_small_room() {
        let me = profile("Me");
        let others = vec![profile("Alice"), profile("Bob")];

        let badges = build_participant_list(Some(&me), &others);
        assert_eq!(badges.len(), 3);
        assert_eq!(badges[0].label, "Alice");
        assert_eq!(badges[0].fallback, "A");
        assert_eq!(badges[2].label, "Me (You)");
        assert!(badges.iter().all(|b| b.color.is_some()));
    }

    #[test]
    fn test_participant_list_overflow() {
        let me = profile("Me");
        let others: Vec<SessionProfile> =
            ["Alice", "Bob", "Carol", "Dan"].iter().map(|n| profile(n)).collect();

        let badges = build_participant_list(Some(&me), &others);
        // 2 shown others + self + overflow
        assert_eq!(badges.len(), 4);
        let overflow = badges.last().unwrap();
        assert_eq!(overflow.label, "2 more");
        assert_eq!(overflow.fallback, "+2");
        assert!(overflow.color.is_none());
    }

    #[test]
    fn test_participant_list_empty_name_fallback() {
        let anon = SessionProfile::new("user_x", "");
        let badges = build_participant_list(None, &[anon]);
        assert_eq!(badges[0].fallback, "T");
    }
}
