//! # slate-core — shared board document model
//!
//! The replicated heart of a slate room: a CRDT-backed document of layers
//! plus auxiliary text buffers, the mutation contract that keeps it
//! well-formed under concurrent edits, and the read-side pipelines built on
//! top of it (snapshot extraction for the AI assistant, the suggestion
//! heuristic, client-local panel stores).
//!
//! ## Modules
//!
//! - [`layer`] — layer entities and their closed kind set
//! - [`document`] — `BoardDocument`: the Yrs-backed shared state and its
//!   allowed state transitions
//! - [`snapshot`] — deterministic textual flattening of a document
//! - [`suggest`] — "has the board changed enough?" watcher
//! - [`panel`] — per-client assistant/video panel state

pub mod document;
pub mod layer;
pub mod panel;
pub mod snapshot;
pub mod suggest;

pub use document::{BoardDocument, DocumentError, LayerPatch, AUXILIARY_BUFFERS, COMPILER_BUFFER};
pub use layer::{Color, Layer, LayerKind};
pub use panel::{
    AiPanelStore, AssistantMessage, AssistantRole, ConnectPanelStore, MessageRole, GREETING,
};
pub use snapshot::{extract_snapshot, NO_CONTENT_PLACEHOLDER};
pub use suggest::{SuggestionWatcher, CANNED_SUGGESTIONS, SUGGESTION_TRIGGER_DELTA};
