//! HTTP surface of the gateway.
//!
//! Three core endpoints (document-room auth, video token, assistant) plus
//! board management. Handlers validate before touching any external
//! collaborator and translate the closed decision enums into HTTP
//! responses via [`ApiError`].

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use slate_collab::server::SyncServer;
use slate_core::AssistantRole;

use crate::assistant::AssistantBridge;
use crate::authz::{
    authorize_document_join, authorize_video_join, DocumentJoinDecision, VideoJoinDecision,
};
use crate::credentials::{CredentialService, VideoTokenIssuer};
use crate::error::ApiError;
use crate::identity::{bearer_token, Identity, IdentityProvider};
use crate::rooms::{RoomDirectory, RoomRecord};

/// Shared handler state, constructed once at startup.
#[derive(Clone)]
pub struct AppState {
    pub identity: Arc<dyn IdentityProvider>,
    pub rooms: Arc<dyn RoomDirectory>,
    pub credentials: Arc<CredentialService>,
    pub video: Option<Arc<VideoTokenIssuer>>,
    pub assistant: Arc<AssistantBridge>,
    pub sync: Arc<SyncServer>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/realtime-auth", post(realtime_auth))
        .route("/api/video-token", get(video_token))
        .route("/api/ai-assistant", post(ai_assistant))
        .route("/api/boards", post(create_board).get(list_boards))
        .route("/api/boards/{id}", axum::routing::patch(rename_board).delete(delete_board))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Resolve the caller, if any. `None` means anonymous.
async fn caller(state: &AppState, headers: &HeaderMap) -> Option<Identity> {
    let token = bearer_token(headers)?;
    state.identity.resolve(token).await
}

/// Resolve the caller or reject.
async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Identity, ApiError> {
    caller(state, headers).await.ok_or(ApiError::Unauthenticated)
}

// ── document-room join ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RealtimeAuthRequest {
    pub room: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RealtimeAuthResponse {
    pub token: String,
}

async fn realtime_auth(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RealtimeAuthRequest>,
) -> Result<Json<RealtimeAuthResponse>, ApiError> {
    if body.room.is_empty() {
        return Err(ApiError::invalid("Missing required fields"));
    }

    let identity = caller(&state, &headers).await;
    let room = state.rooms.get(&body.room).await;

    match authorize_document_join(identity.as_ref(), room.as_ref()) {
        DocumentJoinDecision::Allowed(grant) => {
            let token = state.credentials.issue_room_credential(&grant)?;
            tracing::info!(room = %grant.room_id, user = %grant.user_id, "realtime join allowed");
            Ok(Json(RealtimeAuthResponse { token }))
        }
        DocumentJoinDecision::Unauthenticated => Err(ApiError::Unauthenticated),
        DocumentJoinDecision::Forbidden => Err(ApiError::Forbidden),
        DocumentJoinDecision::NotFound => Err(ApiError::NotFound("Board")),
    }
}

// ── video-room token ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct VideoTokenQuery {
    pub room: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VideoTokenResponse {
    pub token: String,
}

async fn video_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<VideoTokenQuery>,
) -> Result<Json<VideoTokenResponse>, ApiError> {
    let room = query
        .room
        .filter(|r| !r.is_empty())
        .ok_or_else(|| ApiError::invalid("Missing 'room' query parameter"))?;

    let identity = caller(&state, &headers).await;
    let grant = match authorize_video_join(identity.as_ref(), &room) {
        VideoJoinDecision::Allowed(grant) => grant,
        VideoJoinDecision::Unauthenticated => return Err(ApiError::Unauthenticated),
    };

    let issuer = state.video.as_ref().ok_or_else(|| {
        ApiError::Configuration("Video server credentials not configured".to_string())
    })?;
    let token = issuer.issue(&grant)?;
    Ok(Json(VideoTokenResponse { token }))
}

// ── assistant ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantRequest {
    #[serde(default)]
    pub board_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub board_state: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AssistantResponse {
    pub reply: String,
}

async fn ai_assistant(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<AssistantRequest>,
) -> Result<Json<AssistantResponse>, ApiError> {
    authenticate(&state, &headers).await?;

    if body.board_id.is_empty() || body.message.is_empty() || body.role.is_empty() {
        return Err(ApiError::invalid("Missing required fields"));
    }
    let role =
        AssistantRole::parse(&body.role).ok_or_else(|| ApiError::invalid("Invalid role"))?;

    let reply = state
        .assistant
        .ask(&body.board_id, &body.message, role, body.board_state)
        .await?;
    Ok(Json(AssistantResponse { reply }))
}

// ── board management ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateBoardRequest {
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct ListBoardsQuery {
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenameBoardRequest {
    #[serde(default)]
    pub title: String,
}

async fn create_board(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateBoardRequest>,
) -> Result<Json<RoomRecord>, ApiError> {
    let identity = authenticate(&state, &headers).await?;
    if body.title.trim().is_empty() {
        return Err(ApiError::invalid("Missing required fields"));
    }
    let record = state
        .rooms
        .create(body.title.trim(), identity.org_id.as_deref())
        .await;
    Ok(Json(record))
}

async fn list_boards(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListBoardsQuery>,
) -> Result<Json<Vec<RoomRecord>>, ApiError> {
    let identity = authenticate(&state, &headers).await?;
    let records = state
        .rooms
        .list(identity.org_id.as_deref(), query.search.as_deref())
        .await;
    Ok(Json(records))
}

/// Check the caller may manage this board: same gate as the document join.
fn check_board_access(identity: &Identity, room: &RoomRecord) -> Result<(), ApiError> {
    if let Some(room_org) = &room.org_id {
        if identity.org_id.as_ref() != Some(room_org) {
            return Err(ApiError::Forbidden);
        }
    }
    Ok(())
}

async fn rename_board(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<RenameBoardRequest>,
) -> Result<Json<RoomRecord>, ApiError> {
    let identity = authenticate(&state, &headers).await?;
    if body.title.trim().is_empty() {
        return Err(ApiError::invalid("Missing required fields"));
    }
    let room = state.rooms.get(&id).await.ok_or(ApiError::NotFound("Board"))?;
    check_board_access(&identity, &room)?;

    let renamed = state
        .rooms
        .rename(&id, body.title.trim())
        .await
        .ok_or(ApiError::NotFound("Board"))?;
    Ok(Json(renamed))
}

async fn delete_board(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let identity = authenticate(&state, &headers).await?;
    let room = state.rooms.get(&id).await.ok_or(ApiError::NotFound("Board"))?;
    check_board_access(&identity, &room)?;

    state.rooms.delete(&id).await;
    // Every live session derived from this room must go with it.
    state.sync.evict_room(&id).await;
    tracing::info!(room = %id, "board deleted and sessions evicted");
    Ok(Json(serde_json::json!({ "deleted": true })))
}
