//! Assistant bridge: single-turn queries to the hosted language model,
//! grounded in the room title and the extracted board snapshot.
//!
//! The bridge holds no conversation memory; every call carries a fresh
//! snapshot and one user message. Validation happens before any upstream
//! work, room resolution before the model call, and upstream failures are
//! surfaced with their raw diagnostic text.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use slate_collab::server::SyncServer;
use slate_core::{AssistantRole, NO_CONTENT_PLACEHOLDER};

use crate::error::ApiError;
use crate::rooms::RoomDirectory;

/// Sentinel board id meaning "no specific room context".
pub const DASHBOARD_BOARD_ID: &str = "dashboard";

/// Title used for the sentinel context.
pub const DEFAULT_BOARD_TITLE: &str = "General Dashboard";

const PERSONA: &str = "You are an intelligent real-time classroom assistant \
integrated inside a collaborative whiteboard application.";

const STUDENT_INSTRUCTIONS: &str = "
- Explain simply.
- Give examples.
- Provide structured answers (5-mark / 7-mark if academic topic).
";

const TEACHER_INSTRUCTIONS: &str = "
- Suggest quiz questions.
- Suggest improvements.
- Suggest flowchart ideas.
- Detect topic from board automatically.
";

/// Pure lookup from the closed role set to its instruction block.
pub fn role_instructions(role: AssistantRole) -> &'static str {
    match role {
        AssistantRole::Student => STUDENT_INSTRUCTIONS,
        AssistantRole::Teacher => TEACHER_INSTRUCTIONS,
    }
}

/// The fixed system persona plus the role's instruction block.
pub fn system_instruction(role: AssistantRole) -> String {
    format!("{PERSONA} {}", role_instructions(role))
}

/// Compose the single user turn sent to the model. An empty context is
/// replaced by the literal no-content placeholder, never left blank.
pub fn build_prompt(title: &str, role: AssistantRole, context: &str, message: &str) -> String {
    let context = if context.is_empty() {
        NO_CONTENT_PLACEHOLDER
    } else {
        context
    };
    format!(
        "Board Title: {title}\nCurrent User Role: {role}\n\n\
         Whiteboard Content (Text from Shapes):\n{context}\n\n\
         User Question:\n{message}",
        role = role.as_str(),
    )
}

// ── wire types for the generateContent endpoint ────────────────────

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    #[serde(rename = "systemInstruction")]
    system_instruction: InstructionParts,
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct InstructionParts {
    parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
struct TextPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Option<Vec<ResponsePart>>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// The first candidate's first text part, or empty. An empty-but-well-formed
/// response is a valid (empty) reply, not an error.
fn extract_reply(response: GenerateContentResponse) -> String {
    response
        .candidates
        .and_then(|mut c| if c.is_empty() { None } else { Some(c.remove(0)) })
        .and_then(|c| c.content)
        .and_then(|c| c.parts)
        .and_then(|mut p| if p.is_empty() { None } else { Some(p.remove(0)) })
        .and_then(|p| p.text)
        .unwrap_or_default()
}

/// Client for the hosted language model.
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            model: model.into(),
            api_key: api_key.into(),
        }
    }

    /// Point at a different endpoint (self-hosted proxy, test server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// One single-turn generation call.
    pub async fn generate(&self, system: &str, user_text: &str) -> Result<String, ApiError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let request = GenerateContentRequest {
            system_instruction: InstructionParts {
                parts: vec![TextPart {
                    text: system.to_string(),
                }],
            },
            contents: vec![Content {
                role: "user",
                parts: vec![TextPart {
                    text: user_text.to_string(),
                }],
            }],
            generation_config: GenerationConfig { temperature: 0.7 },
        };

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ApiError::upstream("Failed to fetch AI response", Some(e.to_string())))?;

        if !response.status().is_success() {
            let details = response.text().await.unwrap_or_default();
            tracing::error!(details = %details, "language model returned an error");
            return Err(ApiError::upstream("Failed to fetch AI response", Some(details)));
        }

        let data: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ApiError::upstream("Failed to fetch AI response", Some(e.to_string())))?;
        Ok(extract_reply(data))
    }
}

/// Assembles role-scoped prompts from room context and forwards them to
/// the language model.
pub struct AssistantBridge {
    directory: Arc<dyn RoomDirectory>,
    sync: Arc<SyncServer>,
    gemini: Option<GeminiClient>,
}

impl AssistantBridge {
    pub fn new(
        directory: Arc<dyn RoomDirectory>,
        sync: Arc<SyncServer>,
        gemini: Option<GeminiClient>,
    ) -> Self {
        Self {
            directory,
            sync,
            gemini,
        }
    }

    /// Answer one user message in the context of `board_id`.
    ///
    /// Resolution order matters: a nonexistent board fails with NotFound
    /// before any model call is attempted; missing model credentials are a
    /// configuration error, not a silent no-op.
    pub async fn ask(
        &self,
        board_id: &str,
        message: &str,
        role: AssistantRole,
        board_state: Option<String>,
    ) -> Result<String, ApiError> {
        let mut title = DEFAULT_BOARD_TITLE.to_string();
        let mut context = board_state.unwrap_or_default();

        if board_id != DASHBOARD_BOARD_ID {
            let room = self
                .directory
                .get(board_id)
                .await
                .ok_or(ApiError::NotFound("Board"))?;
            title = room.title;

            // Caller-supplied snapshot wins; otherwise flatten the live
            // room document (empty is fine, the prompt substitutes the
            // placeholder).
            if context.is_empty() {
                context = self.sync.room_snapshot(board_id).await.unwrap_or_default();
            }
        }

        let gemini = self.gemini.as_ref().ok_or_else(|| {
            ApiError::Configuration("GEMINI_API_KEY is not configured".to_string())
        })?;

        let system = system_instruction(role);
        let prompt = build_prompt(&title, role, &context, message);
        tracing::debug!(board = %board_id, role = %role.as_str(), "assistant query");
        gemini.generate(&system, &prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rooms::InMemoryRoomDirectory;
    use slate_collab::server::{
        AuthorizedSession, JoinAuthorizer, JoinDenied, ServerConfig,
    };

    struct DenyAll;
    impl JoinAuthorizer for DenyAll {
        fn authorize(&self, _: &str, _: &str) -> Result<AuthorizedSession, JoinDenied> {
            Err(JoinDenied::InvalidCredential("test".into()))
        }
    }

    fn test_bridge(directory: Arc<InMemoryRoomDirectory>) -> AssistantBridge {
        let sync = Arc::new(SyncServer::new(ServerConfig::default(), Arc::new(DenyAll)));
        AssistantBridge::new(directory, sync, None)
    }

    #[test]
    fn test_role_instruction_table() {
        assert!(role_instructions(AssistantRole::Student).contains("Explain simply."));
        assert!(role_instructions(AssistantRole::Student).contains("5-mark / 7-mark"));
        assert!(role_instructions(AssistantRole::Teacher).contains("Suggest quiz questions."));
        assert!(role_instructions(AssistantRole::Teacher)
            .contains("Detect topic from board automatically."));
    }

    #[test]
    fn test_prompt_shape() {
        let prompt = build_prompt(
            "Physics 101",
            AssistantRole::Student,
            "[Type: text, Pos: (x: 10, y: 20)] Text: Newton's Laws",
            "Explain the second law",
        );
        assert_eq!(
            prompt,
            "Board Title: Physics 101\nCurrent User Role: student\n\n\
             Whiteboard Content (Text from Shapes):\n\
             [Type: text, Pos: (x: 10, y: 20)] Text: Newton's Laws\n\n\
             User Question:\nExplain the second law"
        );
    }

    #[test]
    fn test_empty_context_gets_placeholder() {
        let prompt = build_prompt("Board", AssistantRole::Teacher, "", "Hello?");
        assert!(prompt.contains("(No text on board)"));
        assert!(!prompt.contains("Shapes):\n\n"));
    }

    #[test]
    fn test_extract_reply_happy_path() {
        let response: GenerateContentResponse = serde_json::from_value(serde_json::json!({
            "candidates": [
                { "content": { "parts": [ { "text": "First answer" }, { "text": "ignored" } ] } },
                { "content": { "parts": [ { "text": "second candidate ignored" } ] } }
            ]
        }))
        .unwrap();
        assert_eq!(extract_reply(response), "First answer");
    }

    #[test]
    fn test_extract_reply_empty_but_well_formed() {
        for value in [
            serde_json::json!({}),
            serde_json::json!({ "candidates": [] }),
            serde_json::json!({ "candidates": [ { "content": null } ] }),
            serde_json::json!({ "candidates": [ { "content": { "parts": [] } } ] }),
            serde_json::json!({ "candidates": [ { "content": { "parts": [ {} ] } } ] }),
        ] {
            let response: GenerateContentResponse = serde_json::from_value(value).unwrap();
            assert_eq!(extract_reply(response), "");
        }
    }

    #[tokio::test]
    async fn test_unknown_board_is_not_found_before_any_upstream_call() {
        let bridge = test_bridge(Arc::new(InMemoryRoomDirectory::new()));
        // gemini is None: if the bridge got past room resolution it would
        // report a configuration error instead.
        let err = bridge
            .ask("missing-board", "hi", AssistantRole::Student, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound("Board")));
    }

    #[tokio::test]
    async fn test_dashboard_sentinel_skips_directory() {
        let bridge = test_bridge(Arc::new(InMemoryRoomDirectory::new()));
        // No board lookup for the sentinel: resolution succeeds and the
        // missing model credentials are what fail.
        let err = bridge
            .ask(DASHBOARD_BOARD_ID, "hi", AssistantRole::Student, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Configuration(_)));
    }
}
