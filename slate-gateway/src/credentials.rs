//! Credential issuance and verification.
//!
//! Two token families, both HS256 JWTs:
//!
//! - Room credentials: scoped to exactly one document room with full
//!   read/write access. Verified by the sync server at join time (this
//!   module implements [`JoinAuthorizer`] for that purpose).
//! - Video capabilities: time-bounded grants naming one video room with
//!   publish/subscribe permission, signed with the media provider's API
//!   secret and carrying its key id as issuer.
//!
//! Tokens expire naturally; there is no revocation list.

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use slate_collab::server::{AuthorizedSession, JoinAuthorizer, JoinDenied};

use crate::authz::{DocumentGrant, VideoGrantSpec};
use crate::error::ApiError;

/// Claims of a document-room credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomClaims {
    /// User id the credential was issued to.
    pub sub: String,
    /// Display name inside the room.
    pub name: String,
    /// The single room this credential opens.
    pub room: String,
    pub full_access: bool,
    pub iat: i64,
    pub exp: i64,
}

/// Claims of a video capability token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoClaims {
    /// Media provider API key id.
    pub iss: String,
    /// Participant identity.
    pub sub: String,
    /// Participant display name.
    pub name: String,
    pub video: VideoGrantClaims,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoGrantClaims {
    pub room: String,
    pub room_join: bool,
    pub can_publish: bool,
    pub can_subscribe: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    Expired,
    WrongRoom,
    Invalid(String),
}

impl std::fmt::Display for CredentialError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Expired => write!(f, "credential expired"),
            Self::WrongRoom => write!(f, "credential not scoped to this room"),
            Self::Invalid(e) => write!(f, "invalid credential: {e}"),
        }
    }
}

impl std::error::Error for CredentialError {}

/// Issues and verifies room credentials with the gateway signing secret.
pub struct CredentialService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: i64,
}

impl CredentialService {
    pub fn new(secret: &str, ttl_secs: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs,
        }
    }

    /// Turn an allowed document join into a signed room credential.
    pub fn issue_room_credential(&self, grant: &DocumentGrant) -> Result<String, ApiError> {
        let now = Utc::now().timestamp();
        let claims = RoomClaims {
            sub: grant.user_id.clone(),
            name: grant.display_name.clone(),
            room: grant.room_id.clone(),
            full_access: true,
            iat: now,
            exp: now + self.ttl_secs,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| ApiError::upstream("Failed to sign session credential", Some(e.to_string())))
    }

    /// Verify a credential and check it opens `room_id`.
    pub fn verify_room_credential(
        &self,
        token: &str,
        room_id: &str,
    ) -> Result<RoomClaims, CredentialError> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        let data = decode::<RoomClaims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => CredentialError::Expired,
                _ => CredentialError::Invalid(e.to_string()),
            }
        })?;
        if data.claims.room != room_id {
            return Err(CredentialError::WrongRoom);
        }
        Ok(data.claims)
    }
}

impl JoinAuthorizer for CredentialService {
    fn authorize(&self, credential: &str, room_id: &str) -> Result<AuthorizedSession, JoinDenied> {
        match self.verify_room_credential(credential, room_id) {
            Ok(claims) => Ok(AuthorizedSession {
                user_id: claims.sub,
            }),
            Err(CredentialError::Expired) => Err(JoinDenied::Expired),
            Err(CredentialError::WrongRoom) => Err(JoinDenied::WrongRoom),
            Err(CredentialError::Invalid(e)) => Err(JoinDenied::InvalidCredential(e)),
        }
    }
}

/// Signs video capability tokens with the media provider's secret.
pub struct VideoTokenIssuer {
    api_key: String,
    encoding: EncodingKey,
    ttl_secs: i64,
}

impl VideoTokenIssuer {
    pub fn new(api_key: impl Into<String>, api_secret: &str, ttl_secs: i64) -> Self {
        Self {
            api_key: api_key.into(),
            encoding: EncodingKey::from_secret(api_secret.as_bytes()),
            ttl_secs,
        }
    }

    /// Turn an allowed video join into a signed capability token.
    pub fn issue(&self, grant: &VideoGrantSpec) -> Result<String, ApiError> {
        let now = Utc::now().timestamp();
        let claims = VideoClaims {
            iss: self.api_key.clone(),
            sub: grant.participant_identity.clone(),
            name: grant.participant_name.clone(),
            video: VideoGrantClaims {
                room: grant.room.clone(),
                room_join: true,
                can_publish: grant.can_publish,
                can_subscribe: grant.can_subscribe,
            },
            iat: now,
            exp: now + self.ttl_secs,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| ApiError::upstream("Failed to sign video token", Some(e.to_string())))
    }
}
