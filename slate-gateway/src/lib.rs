//! # slate-gateway — session authorization and assistant gateway
//!
//! The HTTP edge of slate: decides who may join which room and with what
//! scope, signs the resulting credentials, mints video capabilities, and
//! bridges assistant queries to the hosted language model with the board
//! snapshot as context.
//!
//! ## Modules
//!
//! - [`authz`] — pure join decision procedures
//! - [`identity`] — identity & membership oracle contract
//! - [`rooms`] — room metadata directory contract
//! - [`credentials`] — JWT issuance/verification for room and video access
//! - [`assistant`] — prompt assembly and the language-model client
//! - [`routes`] — axum handlers and router
//! - [`config`] — environment configuration
//! - [`error`] — error taxonomy and HTTP mapping

pub mod assistant;
pub mod authz;
pub mod config;
pub mod credentials;
pub mod error;
pub mod identity;
pub mod rooms;
pub mod routes;

pub use assistant::{AssistantBridge, GeminiClient};
pub use authz::{
    authorize_document_join, authorize_video_join, DocumentGrant, DocumentJoinDecision,
    VideoGrantSpec, VideoJoinDecision,
};
pub use config::GatewayConfig;
pub use credentials::{CredentialService, VideoTokenIssuer};
pub use error::ApiError;
pub use identity::{Identity, IdentityProvider, StaticIdentityProvider};
pub use rooms::{InMemoryRoomDirectory, RoomDirectory, RoomRecord};
pub use routes::{router, AppState};
