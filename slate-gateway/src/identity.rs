//! The identity and membership oracle.
//!
//! Identity resolution itself is external; the gateway only consumes the
//! resolved record. `StaticIdentityProvider` is the in-process
//! implementation used for development and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// A resolved caller: durable user id plus optional profile and the
/// organization the session is currently acting in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub org_id: Option<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            name: None,
            avatar_url: None,
            org_id: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_org(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    pub fn with_avatar(mut self, avatar_url: impl Into<String>) -> Self {
        self.avatar_url = Some(avatar_url.into());
        self
    }

    /// Display name used inside the document room.
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| "Teammate".to_string())
    }

    /// Synthesized guest label from a truncated id suffix, used when no
    /// human-readable name is available for video participants.
    pub fn guest_label(&self) -> String {
        let suffix_start = self.user_id.len().saturating_sub(4);
        format!("Guest ({})", &self.user_id[suffix_start..])
    }

    /// Participant name for the video room: real name or guest label.
    pub fn video_participant_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.guest_label())
    }
}

/// Resolves a bearer token to an identity. `None` means anonymous.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve(&self, token: &str) -> Option<Identity>;
}

/// In-memory token table.
pub struct StaticIdentityProvider {
    tokens: RwLock<HashMap<String, Identity>>,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register(&self, token: impl Into<String>, identity: Identity) {
        self.tokens.write().await.insert(token.into(), identity);
    }
}

impl Default for StaticIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn resolve(&self, token: &str) -> Option<Identity> {
        self.tokens.read().await.get(token).cloned()
    }
}

/// Pull the bearer token out of the Authorization header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}
