//! The shared board document and its mutation contract.
//!
//! A `BoardDocument` wraps a Yrs doc with three root containers:
//!
//! ```text
//! ┌────────────────────────────────────────────────┐
//! │ yrs::Doc                                        │
//! │                                                 │
//! │  "layers"       Map: layer id → field map       │
//! │  "layer_order"  Array: z-ordered layer ids      │
//! │  "buffers"      Map: well-known name → text     │
//! └────────────────────────────────────────────────┘
//! ```
//!
//! `layer_order` is always a permutation of the `layers` key set: insertion
//! and removal touch both containers inside a single transaction, so remote
//! peers only ever observe the pair in a consistent state.
//!
//! Every mutation is an absolute-value field set (safe to retry, merges as
//! last-writer-wins per field) and returns the encoded update for the
//! replication layer to fan out. Reads always open a fresh transaction
//! against the live doc; there is no cached private copy to drift.

use std::collections::HashMap;

use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Any, Array, ArrayRef, Doc, Map, MapPrelim, MapRef, Out, ReadTxn};

use crate::layer::{Color, Layer, LayerKind};

/// Name of the flat text buffer used by the compiler room mode.
pub const COMPILER_BUFFER: &str = "compiler_code";

/// The fixed set of auxiliary buffer names a client may write.
pub const AUXILIARY_BUFFERS: &[&str] = &[COMPILER_BUFFER];

/// Errors surfaced by the mutation contract.
///
/// `UnknownLayer` is the benign one: it usually means the layer was deleted
/// by a concurrent peer between the caller's read and its write. Callers
/// treat it as a local no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    DuplicateLayer(String),
    UnknownLayer(String),
    UnknownBuffer(String),
    Update(String),
}

impl std::fmt::Display for DocumentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateLayer(id) => write!(f, "layer {id} already exists"),
            Self::UnknownLayer(id) => write!(f, "layer {id} does not exist"),
            Self::UnknownBuffer(name) => write!(f, "unknown auxiliary buffer {name}"),
            Self::Update(e) => write!(f, "update error: {e}"),
        }
    }
}

impl std::error::Error for DocumentError {}

/// Absolute-value patch for a text-bearing layer's content update.
///
/// `width`/`height` carry the size measured by the presentation layer for
/// the new content; the committed size only ever grows (auto-fit rule).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerPatch {
    pub value: Option<String>,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

impl LayerPatch {
    pub fn value(text: impl Into<String>) -> Self {
        Self {
            value: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn measured(mut self, width: f64, height: f64) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }
}

/// The live replicated state of one room.
pub struct BoardDocument {
    doc: Doc,
    layers: MapRef,
    layer_order: ArrayRef,
    buffers: MapRef,
}

impl BoardDocument {
    pub fn new() -> Self {
        let doc = Doc::new();
        let layers = doc.get_or_insert_map("layers");
        let layer_order = doc.get_or_insert_array("layer_order");
        let buffers = doc.get_or_insert_map("buffers");
        Self {
            doc,
            layers,
            layer_order,
            buffers,
        }
    }

    // ── mutations ──────────────────────────────────────────────────

    /// Insert a new layer: adds the field map and appends the id to the
    /// z-order in one transaction, so the pair is atomic on the wire.
    pub fn insert_layer(&self, layer: Layer) -> Result<Vec<u8>, DocumentError> {
        let mut txn = yrs::Transact::transact_mut(&self.doc);
        if self.layers.get(&txn, layer.id.as_str()).is_some() {
            return Err(DocumentError::DuplicateLayer(layer.id));
        }

        let mut fields: Vec<(String, Any)> = vec![
            ("kind".into(), Any::from(layer.kind.as_str())),
            ("x".into(), Any::from(layer.x)),
            ("y".into(), Any::from(layer.y)),
            ("width".into(), Any::from(layer.width.max(0.0))),
            ("height".into(), Any::from(layer.height.max(0.0))),
        ];
        if let Some(fill) = layer.fill {
            fields.push(("fill".into(), Any::from(fill.to_hex())));
        }
        if let Some(value) = layer.value {
            fields.push(("value".into(), Any::from(value)));
        }

        self.layers
            .insert(&mut txn, layer.id.clone(), MapPrelim::from_iter(fields));
        self.layer_order.push_back(&mut txn, layer.id.clone());
        log::debug!("inserted layer {}", layer.id);
        Ok(txn.encode_update_v1())
    }

    /// Remove a layer from both containers. No-op when the id is absent.
    pub fn remove_layer(&self, layer_id: &str) -> Result<Vec<u8>, DocumentError> {
        let mut txn = yrs::Transact::transact_mut(&self.doc);
        if self.layers.get(&txn, layer_id).is_none() {
            return Ok(Vec::new());
        }
        self.layers.remove(&mut txn, layer_id);

        // Drop every occurrence of the id from the order list so the
        // permutation invariant holds even if a duplicate ever slipped in
        // through a concurrent merge.
        let mut index = 0u32;
        while index < self.layer_order.len(&txn) {
            let matches = matches!(
                self.layer_order.get(&txn, index),
                Some(Out::Any(Any::String(ref s))) if s.as_ref() == layer_id
            );
            if matches {
                self.layer_order.remove(&mut txn, index);
            } else {
                index += 1;
            }
        }
        log::debug!("removed layer {layer_id}");
        Ok(txn.encode_update_v1())
    }

    /// Update a text-bearing layer's content and measured size.
    ///
    /// The committed size is `max(committed, measured)` per axis, so the
    /// bounding box never shrinks from re-measurement jitter. Rejects when
    /// the layer is absent; a content update must never create a layer.
    pub fn upsert_layer_content(
        &self,
        layer_id: &str,
        patch: LayerPatch,
    ) -> Result<Vec<u8>, DocumentError> {
        let mut txn = yrs::Transact::transact_mut(&self.doc);
        let layer_map = match self.layers.get(&txn, layer_id) {
            Some(Out::YMap(m)) => m,
            _ => return Err(DocumentError::UnknownLayer(layer_id.to_string())),
        };

        if let Some(value) = patch.value {
            layer_map.insert(&mut txn, "value", Any::from(value));
        }
        if let Some(measured) = patch.width {
            let committed = read_f64(&txn, &layer_map, "width").unwrap_or(0.0);
            layer_map.insert(&mut txn, "width", Any::from(committed.max(measured.max(0.0))));
        }
        if let Some(measured) = patch.height {
            let committed = read_f64(&txn, &layer_map, "height").unwrap_or(0.0);
            layer_map.insert(&mut txn, "height", Any::from(committed.max(measured.max(0.0))));
        }
        Ok(txn.encode_update_v1())
    }

    /// Set a layer's position. Absolute values, whole-field replacement.
    pub fn move_layer(&self, layer_id: &str, x: f64, y: f64) -> Result<Vec<u8>, DocumentError> {
        let mut txn = yrs::Transact::transact_mut(&self.doc);
        let layer_map = match self.layers.get(&txn, layer_id) {
            Some(Out::YMap(m)) => m,
            _ => return Err(DocumentError::UnknownLayer(layer_id.to_string())),
        };
        layer_map.insert(&mut txn, "x", Any::from(x));
        layer_map.insert(&mut txn, "y", Any::from(y));
        Ok(txn.encode_update_v1())
    }

    /// Set a layer's fill color.
    pub fn set_layer_fill(&self, layer_id: &str, fill: Color) -> Result<Vec<u8>, DocumentError> {
        let mut txn = yrs::Transact::transact_mut(&self.doc);
        let layer_map = match self.layers.get(&txn, layer_id) {
            Some(Out::YMap(m)) => m,
            _ => return Err(DocumentError::UnknownLayer(layer_id.to_string())),
        };
        layer_map.insert(&mut txn, "fill", Any::from(fill.to_hex()));
        Ok(txn.encode_update_v1())
    }

    /// Replace an auxiliary buffer wholesale. Only well-known names are
    /// accepted; anything else is a validation failure, not a new buffer.
    pub fn set_auxiliary_buffer(
        &self,
        name: &str,
        value: impl Into<String>,
    ) -> Result<Vec<u8>, DocumentError> {
        if !AUXILIARY_BUFFERS.contains(&name) {
            return Err(DocumentError::UnknownBuffer(name.to_string()));
        }
        let mut txn = yrs::Transact::transact_mut(&self.doc);
        self.buffers.insert(&mut txn, name, Any::from(value.into()));
        Ok(txn.encode_update_v1())
    }

    // ── replication ────────────────────────────────────────────────

    /// Merge a remote peer's update into the local doc.
    pub fn apply_remote_update(&self, update: &[u8]) -> Result<(), DocumentError> {
        let mut txn = yrs::Transact::transact_mut(&self.doc);
        let update =
            yrs::Update::decode_v1(update).map_err(|e| DocumentError::Update(e.to_string()))?;
        txn.apply_update(update)
            .map_err(|e| DocumentError::Update(e.to_string()))?;
        Ok(())
    }

    /// Encode the full document state as a single update.
    pub fn encode_state_as_update(&self) -> Vec<u8> {
        let txn = yrs::Transact::transact(&self.doc);
        txn.encode_state_as_update_v1(&yrs::StateVector::default())
    }

    /// Encode the state a remote peer is missing, given its state vector.
    pub fn encode_diff(&self, remote_state_vector: &[u8]) -> Result<Vec<u8>, DocumentError> {
        let txn = yrs::Transact::transact(&self.doc);
        let sv = yrs::StateVector::decode_v1(remote_state_vector)
            .map_err(|e| DocumentError::Update(e.to_string()))?;
        Ok(txn.encode_diff_v1(&sv))
    }

    /// This doc's state vector, for requesting a diff from a peer.
    pub fn state_vector(&self) -> Vec<u8> {
        let txn = yrs::Transact::transact(&self.doc);
        txn.state_vector().encode_v1()
    }

    // ── reads ──────────────────────────────────────────────────────

    /// Materialize one layer from the replicated store.
    pub fn layer(&self, layer_id: &str) -> Option<Layer> {
        let txn = yrs::Transact::transact(&self.doc);
        let layer_map = match self.layers.get(&txn, layer_id) {
            Some(Out::YMap(m)) => m,
            _ => return None,
        };
        let kind = read_string(&txn, &layer_map, "kind")
            .and_then(|tag| LayerKind::parse(&tag))
            .unwrap_or(LayerKind::Rectangle);
        Some(Layer {
            id: layer_id.to_string(),
            kind,
            x: read_f64(&txn, &layer_map, "x").unwrap_or(0.0),
            y: read_f64(&txn, &layer_map, "y").unwrap_or(0.0),
            width: read_f64(&txn, &layer_map, "width").unwrap_or(0.0),
            height: read_f64(&txn, &layer_map, "height").unwrap_or(0.0),
            fill: read_string(&txn, &layer_map, "fill").and_then(|hex| Color::from_hex(&hex)),
            value: read_string(&txn, &layer_map, "value"),
        })
    }

    /// All layer ids currently present, in map key order.
    pub fn layer_keys(&self) -> Vec<String> {
        let txn = yrs::Transact::transact(&self.doc);
        self.layers.keys(&txn).map(|k| k.to_string()).collect()
    }

    /// Layer ids in z-order.
    pub fn layer_ids_in_order(&self) -> Vec<String> {
        let txn = yrs::Transact::transact(&self.doc);
        self.layer_order
            .iter(&txn)
            .filter_map(|out| match out {
                Out::Any(Any::String(s)) => Some(s.to_string()),
                _ => None,
            })
            .collect()
    }

    /// Stable iteration order for snapshot extraction: the explicit z-order
    /// when present, otherwise sorted key order (a raw replicated map with
    /// no order list still extracts deterministically).
    pub fn snapshot_order(&self) -> Vec<String> {
        let ordered = self.layer_ids_in_order();
        if !ordered.is_empty() {
            return ordered;
        }
        let mut keys = self.layer_keys();
        keys.sort();
        keys
    }

    pub fn layer_count(&self) -> usize {
        let txn = yrs::Transact::transact(&self.doc);
        self.layers.len(&txn) as usize
    }

    /// Read an auxiliary buffer. Unknown names are rejected just like writes.
    pub fn auxiliary_buffer(&self, name: &str) -> Result<Option<String>, DocumentError> {
        if !AUXILIARY_BUFFERS.contains(&name) {
            return Err(DocumentError::UnknownBuffer(name.to_string()));
        }
        let txn = yrs::Transact::transact(&self.doc);
        Ok(match self.buffers.get(&txn, name) {
            Some(Out::Any(Any::String(s))) => Some(s.to_string()),
            _ => None,
        })
    }
}

impl Default for BoardDocument {
    fn default() -> Self {
        Self::new()
    }
}

fn read_f64<T: ReadTxn>(txn: &T, map: &MapRef, field: &str) -> Option<f64> {
    match map.get(txn, field) {
        Some(Out::Any(Any::Number(n))) => Some(n),
        Some(Out::Any(Any::BigInt(n))) => Some(n as f64),
        _ => None,
    }
}

fn read_string<T: ReadTxn>(txn: &T, map: &MapRef, field: &str) -> Option<String> {
    match map.get(txn, field) {
        Some(Out::Any(Any::String(s))) => Some(s.to_string()),
        _ => None,
    }
}
