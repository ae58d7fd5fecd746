//! Gateway configuration from the process environment.
//!
//! The signing secret is mandatory: refusing to start beats silently
//! issuing unverifiable credentials. Model and video credentials are
//! optional at startup; their absence surfaces as a configuration error at
//! the endpoint that needs them, so the operator sees exactly which
//! integration is unconfigured.

use crate::credentials::VideoTokenIssuer;
use crate::error::ApiError;

const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_SYNC_ADDR: &str = "127.0.0.1:9090";
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_ROOM_TOKEN_TTL_SECS: i64 = 12 * 3600;
const DEFAULT_VIDEO_TOKEN_TTL_SECS: i64 = 6 * 3600;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub http_addr: String,
    pub sync_addr: String,
    pub credential_secret: String,
    pub room_token_ttl_secs: i64,
    pub video_token_ttl_secs: i64,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub video_api_key: Option<String>,
    pub video_api_secret: Option<String>,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (testable without touching the
    /// process environment).
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ApiError> {
        let credential_secret = get("SLATE_CREDENTIAL_SECRET").ok_or_else(|| {
            ApiError::Configuration("SLATE_CREDENTIAL_SECRET is not configured".to_string())
        })?;

        Ok(Self {
            http_addr: get("SLATE_HTTP_ADDR").unwrap_or_else(|| DEFAULT_HTTP_ADDR.to_string()),
            sync_addr: get("SLATE_SYNC_ADDR").unwrap_or_else(|| DEFAULT_SYNC_ADDR.to_string()),
            credential_secret,
            room_token_ttl_secs: get("SLATE_ROOM_TOKEN_TTL_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_ROOM_TOKEN_TTL_SECS),
            video_token_ttl_secs: get("SLATE_VIDEO_TOKEN_TTL_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_VIDEO_TOKEN_TTL_SECS),
            gemini_api_key: get("GEMINI_API_KEY"),
            gemini_model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            video_api_key: get("SLATE_VIDEO_API_KEY"),
            video_api_secret: get("SLATE_VIDEO_API_SECRET"),
        })
    }

    /// Video token issuer, when both halves of the media credentials are
    /// present.
    pub fn video_issuer(&self) -> Option<VideoTokenIssuer> {
        match (&self.video_api_key, &self.video_api_secret) {
            (Some(key), Some(secret)) => Some(VideoTokenIssuer::new(
                key.clone(),
                secret,
                self.video_token_ttl_secs,
            )),
            _ => None,
        }
    }
}
