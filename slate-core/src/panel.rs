//! Client-local panel state.
//!
//! Each connected client owns one `AiPanelStore` and one
//! `ConnectPanelStore`, constructed once with an explicit initial state and
//! passed by reference to the UI layer. Nothing here is replicated: the
//! assistant transcript and suggestion visibility are private to the client.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::suggest::{SuggestionWatcher, CANNED_SUGGESTIONS};

/// First transcript entry shown when the panel opens.
pub const GREETING: &str = "Hello! I am your AI Teaching Assistant. How can I help you?";

/// Which perspective the assistant should answer from.
///
/// Closed two-variant set; request validation rejects anything else rather
/// than defaulting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssistantRole {
    Student,
    Teacher,
}

impl AssistantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssistantRole::Student => "student",
            AssistantRole::Teacher => "teacher",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "student" => Some(AssistantRole::Student),
            "teacher" => Some(AssistantRole::Teacher),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
}

/// One bubble of the assistant transcript. Append-only until reset.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantMessage {
    pub id: Uuid,
    pub role: MessageRole,
    pub text: String,
}

impl AssistantMessage {
    fn new(role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            text: text.into(),
        }
    }
}

/// State behind the AI assistant panel of one client.
pub struct AiPanelStore {
    open: bool,
    busy: bool,
    role: AssistantRole,
    messages: Vec<AssistantMessage>,
    watcher: SuggestionWatcher,
}

impl AiPanelStore {
    pub fn new() -> Self {
        Self {
            open: false,
            busy: false,
            role: AssistantRole::Student,
            messages: vec![AssistantMessage::new(MessageRole::Assistant, GREETING)],
            watcher: SuggestionWatcher::new(),
        }
    }

    pub fn open(&mut self) {
        self.open = true;
    }

    pub fn close(&mut self) {
        self.open = false;
    }

    pub fn toggle(&mut self) {
        self.open = !self.open;
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn set_role(&mut self, role: AssistantRole) {
        self.role = role;
    }

    pub fn role(&self) -> AssistantRole {
        self.role
    }

    /// One request may be in flight per panel; the input affordance is
    /// disabled while this is true.
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Feed the latest board snapshot to the suggestion watcher.
    pub fn observe_snapshot(&mut self, snapshot: &str) -> bool {
        self.watcher.observe(snapshot)
    }

    /// Canned prompts, when the watcher has made them visible.
    pub fn suggestions(&self) -> Option<&'static [&'static str]> {
        if self.watcher.suggestions_visible() {
            Some(&CANNED_SUGGESTIONS)
        } else {
            None
        }
    }

    pub fn dismiss_suggestions(&mut self) {
        self.watcher.reset();
    }

    /// Record an outgoing user message. Returns false (and records nothing)
    /// for blank input or while a request is already in flight. Sending
    /// always hides suggestions.
    pub fn begin_send(&mut self, text: &str) -> bool {
        if self.busy || text.trim().is_empty() {
            return false;
        }
        self.messages
            .push(AssistantMessage::new(MessageRole::User, text));
        self.busy = true;
        self.watcher.reset();
        true
    }

    /// Append the assistant's reply and clear the in-flight flag.
    pub fn complete_send(&mut self, reply: impl Into<String>) {
        self.messages
            .push(AssistantMessage::new(MessageRole::Assistant, reply));
        self.busy = false;
    }

    /// A failed call still appends a bubble so the conversation never
    /// silently stalls; the prior history is preserved.
    pub fn fail_send(&mut self, error: &str) {
        self.messages.push(AssistantMessage::new(
            MessageRole::Assistant,
            format!("Error: {error}"),
        ));
        self.busy = false;
    }

    pub fn messages(&self) -> &[AssistantMessage] {
        &self.messages
    }
}

impl Default for AiPanelStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Open/closed state of the video-call panel.
pub struct ConnectPanelStore {
    open: bool,
}

impl ConnectPanelStore {
    pub fn new() -> Self {
        Self { open: false }
    }

    pub fn open(&mut self) {
        self.open = true;
    }

    pub fn close(&mut self) {
        self.open = false;
    }

    pub fn is_open(&self) -> bool {
        self.open
    }
}

impl Default for ConnectPanelStore {
    fn default() -> Self {
        Self::new()
    }
}
