//! Suggestion heuristic: watch the snapshot stream, decide when the board
//! changed enough to proactively offer assistant actions.
//!
//! Deliberately coarse: it compares snapshot lengths, not contents. A jump
//! of more than [`SUGGESTION_TRIGGER_DELTA`] characters means someone added
//! a sentence or a shape worth reacting to; single keystrokes stay quiet.

/// Minimum snapshot growth (in characters) that triggers suggestions.
pub const SUGGESTION_TRIGGER_DELTA: usize = 50;

/// The canned prompts offered when the watcher fires.
pub const CANNED_SUGGESTIONS: [&str; 3] = [
    "Summarize board",
    "What was just taught?",
    "Would you like a quick revision summary?",
];

/// Stateful watcher over successive snapshots.
///
/// Once visible, suggestions stay visible (sticky) until the user sends a
/// message or dismisses them; further growth does not re-trigger.
#[derive(Debug, Clone)]
pub struct SuggestionWatcher {
    last_snapshot_len: usize,
    visible: bool,
}

impl SuggestionWatcher {
    pub fn new() -> Self {
        Self {
            last_snapshot_len: 0,
            visible: false,
        }
    }

    /// Feed the latest snapshot. Returns true when this call made the
    /// suggestions visible. The remembered length is updated on every call,
    /// trigger or not.
    pub fn observe(&mut self, snapshot: &str) -> bool {
        let len = snapshot.len();
        let triggered = len > self.last_snapshot_len + SUGGESTION_TRIGGER_DELTA && !self.visible;
        if triggered {
            self.visible = true;
        }
        self.last_snapshot_len = len;
        triggered
    }

    pub fn suggestions_visible(&self) -> bool {
        self.visible
    }

    /// Hide suggestions: called when a message is sent or a suggestion is
    /// dismissed.
    pub fn reset(&mut self) {
        self.visible = false;
    }
}

impl Default for SuggestionWatcher {
    fn default() -> Self {
        Self::new()
    }
}
