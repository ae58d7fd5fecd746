//! Binary protocol for delta synchronization between sessions.
//!
//! Wire format (bincode-encoded):
//! ```text
//! ┌──────────┬───────────────┬──────────┬──────────┬──────────┐
//! │ msg_type │ connection_id │ room_id  │ clock    │ payload  │
//! │ 1 byte   │ 16 bytes      │ variable │ 8 bytes  │ variable │
//! └──────────┴───────────────┴──────────┴──────────┴──────────┘
//! ```
//!
//! Room ids are externally-assigned strings, so the header is not fixed
//! width; everything else stays compact. The clock is a per-origin Lamport
//! counter: the replication layer preserves each client's issue order.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Message types for the sync protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    /// Join request: first message on a connection, carries the credential
    Join = 1,
    /// Yrs state vector for sync handshake
    SyncStep1 = 2,
    /// Yrs state diff response
    SyncStep2 = 3,
    /// Incremental CRDT delta update
    Delta = 4,
    /// Cursor/selection awareness update
    Awareness = 5,
    /// Session joined notification (server → peers)
    SessionJoined = 6,
    /// Session left notification
    SessionLeft = 7,
    /// Heartbeat ping
    Ping = 8,
    /// Heartbeat pong
    Pong = 9,
    /// Room evicted server-side (board deleted); sessions must disconnect
    RoomClosed = 10,
}

/// One connected participant's identity, as displayed to others.
///
/// `connection_id` is ephemeral and unique per active connection;
/// `user_id` is the durable identity behind it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionProfile {
    pub connection_id: Uuid,
    pub user_id: String,
    pub name: String,
    pub avatar: Option<String>,
}

impl SessionProfile {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            user_id: user_id.into(),
            name: name.into(),
            avatar: None,
        }
    }

    /// Create with explicit connection_id (for testing)
    pub fn with_connection_id(
        connection_id: Uuid,
        user_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            connection_id,
            user_id: user_id.into(),
            name: name.into(),
            avatar: None,
        }
    }

    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }
}

/// Payload of a [`MessageType::Join`] message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JoinRequest {
    pub profile: SessionProfile,
    /// Room-scoped credential issued by the authorization gateway.
    pub credential: String,
}

/// Top-level protocol message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncMessage {
    pub msg_type: MessageType,
    pub connection_id: Uuid,
    pub room_id: String,
    /// Lamport clock for per-origin ordering
    pub clock: u64,
    /// Message payload (varies by msg_type)
    pub payload: Vec<u8>,
}

impl SyncMessage {
    /// Create a join request message.
    pub fn join(room_id: impl Into<String>, request: &JoinRequest) -> Self {
        let payload = bincode::serde::encode_to_vec(request, bincode::config::standard())
            .unwrap_or_default();
        Self {
            msg_type: MessageType::Join,
            connection_id: request.profile.connection_id,
            room_id: room_id.into(),
            clock: 0,
            payload,
        }
    }

    /// Create a delta update message.
    pub fn delta(
        connection_id: Uuid,
        room_id: impl Into<String>,
        clock: u64,
        update: Vec<u8>,
    ) -> Self {
        Self {
            msg_type: MessageType::Delta,
            connection_id,
            room_id: room_id.into(),
            clock,
            payload: update,
        }
    }

    /// Create a sync step 1 (state vector request).
    pub fn sync_step1(connection_id: Uuid, room_id: impl Into<String>, state_vector: Vec<u8>) -> Self {
        Self {
            msg_type: MessageType::SyncStep1,
            connection_id,
            room_id: room_id.into(),
            clock: 0,
            payload: state_vector,
        }
    }

    /// Create a sync step 2 (state diff response).
    pub fn sync_step2(room_id: impl Into<String>, state_diff: Vec<u8>) -> Self {
        Self {
            msg_type: MessageType::SyncStep2,
            connection_id: Uuid::nil(),
            room_id: room_id.into(),
            clock: 0,
            payload: state_diff,
        }
    }

    /// Create an awareness update carrying a pre-encoded presence payload.
    pub fn awareness(
        connection_id: Uuid,
        room_id: impl Into<String>,
        clock: u64,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            msg_type: MessageType::Awareness,
            connection_id,
            room_id: room_id.into(),
            clock,
            payload,
        }
    }

    /// Create a session joined notification.
    pub fn session_joined(room_id: impl Into<String>, profile: &SessionProfile) -> Self {
        let payload = bincode::serde::encode_to_vec(profile, bincode::config::standard())
            .unwrap_or_default();
        Self {
            msg_type: MessageType::SessionJoined,
            connection_id: profile.connection_id,
            room_id: room_id.into(),
            clock: 0,
            payload,
        }
    }

    /// Create a session left notification.
    pub fn session_left(connection_id: Uuid, room_id: impl Into<String>) -> Self {
        Self {
            msg_type: MessageType::SessionLeft,
            connection_id,
            room_id: room_id.into(),
            clock: 0,
            payload: Vec::new(),
        }
    }

    /// Create a ping message.
    pub fn ping(connection_id: Uuid) -> Self {
        Self {
            msg_type: MessageType::Ping,
            connection_id,
            room_id: String::new(),
            clock: 0,
            payload: Vec::new(),
        }
    }

    /// Create a pong message.
    pub fn pong(connection_id: Uuid) -> Self {
        Self {
            msg_type: MessageType::Pong,
            connection_id,
            room_id: String::new(),
            clock: 0,
            payload: Vec::new(),
        }
    }

    /// Create a room closed notification.
    pub fn room_closed(room_id: impl Into<String>) -> Self {
        Self {
            msg_type: MessageType::RoomClosed,
            connection_id: Uuid::nil(),
            room_id: room_id.into(),
            clock: 0,
            payload: Vec::new(),
        }
    }

    /// Serialize to binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::SerializationError(e.to_string()))
    }

    /// Deserialize from binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (msg, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
        Ok(msg)
    }

    /// Parse a join request payload.
    pub fn join_request(&self) -> Result<JoinRequest, ProtocolError> {
        if self.msg_type != MessageType::Join {
            return Err(ProtocolError::InvalidMessageType);
        }
        let (request, _) =
            bincode::serde::decode_from_slice(&self.payload, bincode::config::standard())
                .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
        Ok(request)
    }

    /// Parse a session profile payload.
    pub fn session_profile(&self) -> Result<SessionProfile, ProtocolError> {
        if self.msg_type != MessageType::SessionJoined {
            return Err(ProtocolError::InvalidMessageType);
        }
        let (profile, _) =
            bincode::serde::decode_from_slice(&self.payload, bincode::config::standard())
                .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
        Ok(profile)
    }
}

/// Protocol errors.
#[derive(Debug, Clone)]
pub enum ProtocolError {
    SerializationError(String),
    DeserializationError(String),
    InvalidMessageType,
    AccessDenied(String),
    ConnectionClosed,
    Timeout,
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SerializationError(e) => write!(f, "Serialization error: {e}"),
            Self::DeserializationError(e) => write!(f, "Deserialization error: {e}"),
            Self::InvalidMessageType => write!(f, "Invalid message type"),
            Self::AccessDenied(reason) => write!(f, "Access denied: {reason}"),
            Self::ConnectionClosed => write!(f, "Connection closed"),
            Self::Timeout => write!(f, "Connection timeout"),
        }
    }
}

impl std::error::Error for ProtocolError {}
