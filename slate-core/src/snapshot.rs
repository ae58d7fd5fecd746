//! Snapshot extraction: flatten the live document into stable text.
//!
//! The output feeds the assistant prompt and the suggestion heuristic. The
//! heuristic compares successive snapshots by length, so extraction must be
//! pure and order-stable: the same document state always yields the same
//! bytes.

use crate::document::BoardDocument;

/// What the assistant prompt carries when the board has no text content.
/// Callers must substitute this rather than sending an empty context field.
pub const NO_CONTENT_PLACEHOLDER: &str = "(No text on board)";

/// Flatten a document into one line per text-carrying layer:
///
/// ```text
/// [Type: text, Pos: (x: 10, y: 20)] Text: Newton's Laws
/// ```
///
/// Layers are visited in z-order (sorted key order when no order list
/// exists); layers without text contribute nothing. An empty board yields
/// the empty string.
pub fn extract_snapshot(doc: &BoardDocument) -> String {
    let mut lines = Vec::new();
    for id in doc.snapshot_order() {
        let Some(layer) = doc.layer(&id) else { continue };
        let Some(text) = layer.value else { continue };
        if text.is_empty() {
            continue;
        }
        lines.push(format!(
            "[Type: {}, Pos: (x: {}, y: {})] Text: {}",
            layer.kind.as_str(),
            fmt_coord(layer.x),
            fmt_coord(layer.y),
            text
        ));
    }
    lines.join("\n")
}

/// Whole-number coordinates print without a fractional part so snapshots
/// are byte-identical across runs and across the wire.
fn fmt_coord(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::COMPILER_BUFFER;
    use crate::layer::{Layer, LayerKind};

    #[test]
    fn test_snapshot_exact_line_format() {
        let doc = BoardDocument::new();
        doc.insert_layer(
            Layer::new("a", LayerKind::Text, 10.0, 20.0).with_value("Newton's Laws"),
        )
        .unwrap();
        doc.insert_layer(Layer::new("b", LayerKind::Rectangle, 0.0, 0.0))
            .unwrap();

        assert_eq!(
            extract_snapshot(&doc),
            "[Type: text, Pos: (x: 10, y: 20)] Text: Newton's Laws"
        );
    }

    #[test]
    fn test_snapshot_is_deterministic() {
        let doc = BoardDocument::new();
        for (id, text) in [("a", "first"), ("b", "second"), ("c", "third")] {
            doc.insert_layer(Layer::new(id, LayerKind::Note, 1.0, 2.0).with_value(text))
                .unwrap();
        }
        let once = extract_snapshot(&doc);
        let twice = extract_snapshot(&doc);
        assert_eq!(once, twice);
        assert_eq!(once.lines().count(), 3);
    }

    #[test]
    fn test_snapshot_follows_z_order() {
        let doc = BoardDocument::new();
        doc.insert_layer(Layer::new("z", LayerKind::Text, 0.0, 0.0).with_value("first inserted"))
            .unwrap();
        doc.insert_layer(Layer::new("a", LayerKind::Text, 0.0, 0.0).with_value("second inserted"))
            .unwrap();

        let snapshot = extract_snapshot(&doc);
        let first = snapshot.lines().next().unwrap();
        assert!(first.ends_with("first inserted"));
    }

    #[test]
    fn test_empty_and_textless_boards_yield_empty_string() {
        let doc = BoardDocument::new();
        assert_eq!(extract_snapshot(&doc), "");

        doc.insert_layer(Layer::new("r", LayerKind::Rectangle, 3.0, 4.0))
            .unwrap();
        doc.insert_layer(Layer::new("t", LayerKind::Text, 0.0, 0.0).with_value(""))
            .unwrap();
        doc.set_auxiliary_buffer(COMPILER_BUFFER, "code is not a shape")
            .unwrap();
        assert_eq!(extract_snapshot(&doc), "");
    }

    #[test]
    fn test_fractional_coordinates_survive() {
        let doc = BoardDocument::new();
        doc.insert_layer(Layer::new("a", LayerKind::Text, 10.5, -3.25).with_value("hi"))
            .unwrap();
        assert_eq!(
            extract_snapshot(&doc),
            "[Type: text, Pos: (x: 10.5, y: -3.25)] Text: hi"
        );
    }

    #[test]
    fn test_fmt_coord() {
        assert_eq!(fmt_coord(10.0), "10");
        assert_eq!(fmt_coord(-7.0), "-7");
        assert_eq!(fmt_coord(0.0), "0");
        assert_eq!(fmt_coord(1.5), "1.5");
    }
}
