//! # slate-collab — realtime collaboration layer for slate
//!
//! WebSocket-based multiplayer editing on top of CRDT synchronization.
//! Conflict resolution itself is delegated to the document layer (Yrs);
//! this crate moves well-formed deltas between sessions and keeps track of
//! who is in which room.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     WebSocket      ┌─────────────┐
//! │ SyncClient  │ ◄─────────────────► │ SyncServer  │
//! │ (per user)  │     Binary Proto    │ (central)   │
//! └──────┬──────┘                     └──────┬──────┘
//!        │                                   │ join gated by
//!        ▼                                   │ room credential
//! ┌─────────────┐                     ┌──────┴──────┐
//! │ BoardDocument│                    │ BoardDocument│
//! │ (local)     │                     │ (authority)  │
//! └─────────────┘                     └──────┬──────┘
//!                                            │
//!                                    ┌───────┴───────┐
//!                                    │ BroadcastGroup│
//!                                    │ (fan-out)     │
//!                                    └───────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — binary wire protocol (bincode-encoded SyncMessage)
//! - [`broadcast`] — room-based fan-out with backpressure
//! - [`server`] — WebSocket sync server with join authorization
//! - [`client`] — WebSocket sync client with offline queue
//! - [`presence`] — session awareness and the participant display list

pub mod broadcast;
pub mod client;
pub mod presence;
pub mod protocol;
pub mod server;

pub use broadcast::{BroadcastGroup, BroadcastStats, RoomManager};
pub use client::{ConnectionState, OfflineQueue, SyncClient, SyncEvent};
pub use presence::{
    build_participant_list, AwarenessMessage, CursorRenderData, ParticipantBadge, PresenceColor,
    PresenceRoom, RemoteSessionState, Vec2, MAX_SHOWN_OTHERS,
};
pub use protocol::{JoinRequest, MessageType, ProtocolError, SessionProfile, SyncMessage};
pub use server::{
    AuthorizedSession, JoinAuthorizer, JoinDenied, ServerConfig, ServerStats, SyncServer,
};
