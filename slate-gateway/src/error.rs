//! Gateway error taxonomy and its HTTP mapping.
//!
//! Validation failures are rejected before any external call; authorization
//! failures are terminal for the request; upstream failures carry the raw
//! diagnostic so the client can render it instead of stalling.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// No resolvable identity on the request.
    #[error("Unauthorized")]
    Unauthenticated,

    /// Identity resolved but lacks room membership.
    #[error("Forbidden")]
    Forbidden,

    /// Target room/resource does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Missing or malformed required fields, unrecognized role.
    #[error("{0}")]
    InvalidRequest(String),

    /// An external collaborator failed or was unreachable.
    #[error("{message}")]
    Upstream {
        message: String,
        details: Option<String>,
    },

    /// Required server-side credentials are absent. Operator-visible,
    /// never silently defaulted.
    #[error("{0}")]
    Configuration(String),
}

impl ApiError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn upstream(message: impl Into<String>, details: Option<String>) -> Self {
        Self::Upstream {
            message: message.into(),
            details,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upstream { .. } => StatusCode::BAD_GATEWAY,
            Self::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(%status, error = %self, "request failed");
        } else {
            tracing::debug!(%status, error = %self, "request rejected");
        }

        let body = match &self {
            ApiError::Upstream {
                message,
                details: Some(details),
            } => json!({ "error": message, "details": details }),
            other => json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotFound("Board").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::invalid("Missing required fields").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::upstream("Failed to fetch AI response", None).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::Configuration("no secret".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_not_found_message() {
        assert_eq!(ApiError::NotFound("Board").to_string(), "Board not found");
    }
}
