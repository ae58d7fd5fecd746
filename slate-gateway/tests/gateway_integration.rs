//! End-to-end handler tests: real router, real state, no network.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use slate_collab::server::{ServerConfig, SyncServer};
use slate_gateway::assistant::AssistantBridge;
use slate_gateway::credentials::CredentialService;
use slate_gateway::identity::{Identity, StaticIdentityProvider};
use slate_gateway::rooms::{InMemoryRoomDirectory, RoomDirectory};
use slate_gateway::routes::{router, AppState};
use slate_gateway::VideoTokenIssuer;

struct TestContext {
    state: AppState,
    rooms: Arc<InMemoryRoomDirectory>,
    credentials: Arc<CredentialService>,
}

async fn setup(with_video: bool) -> TestContext {
    let identity = Arc::new(StaticIdentityProvider::new());
    identity
        .register(
            "tok-ada",
            Identity::new("user_ada").with_name("Ada").with_org("org_A"),
        )
        .await;
    identity
        .register(
            "tok-bob",
            Identity::new("user_bob").with_name("Bob").with_org("org_B"),
        )
        .await;
    identity
        .register("tok-guest", Identity::new("user_2kT9xWQp"))
        .await;

    let credentials = Arc::new(CredentialService::new("test-secret", 3600));
    let sync = Arc::new(SyncServer::new(
        ServerConfig::default(),
        credentials.clone(),
    ));
    let rooms = Arc::new(InMemoryRoomDirectory::new());
    let directory: Arc<dyn RoomDirectory> = rooms.clone();
    let assistant = Arc::new(AssistantBridge::new(directory.clone(), sync.clone(), None));

    let video = with_video.then(|| Arc::new(VideoTokenIssuer::new("vid-key", "vid-secret", 3600)));

    let state = AppState {
        identity,
        rooms: directory,
        credentials: credentials.clone(),
        video,
        assistant,
        sync,
    };

    TestContext {
        state,
        rooms,
        credentials,
    }
}

async fn send(
    ctx: &TestContext,
    request: Request<Body>,
) -> (StatusCode, serde_json::Value) {
    let response = router(ctx.state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn post_json(uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get_req(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

// ── document-room join ─────────────────────────────────────────────

#[tokio::test]
async fn test_realtime_auth_requires_identity() {
    let ctx = setup(false).await;
    let room = ctx.rooms.create("Board", Some("org_A")).await;

    let (status, body) = send(
        &ctx,
        post_json("/api/realtime-auth", None, serde_json::json!({ "room": room.id })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");

    // An unknown token is anonymous too.
    let (status, _) = send(
        &ctx,
        post_json(
            "/api/realtime-auth",
            Some("tok-nobody"),
            serde_json::json!({ "room": room.id }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_realtime_auth_missing_room_is_not_found() {
    let ctx = setup(false).await;
    let (status, body) = send(
        &ctx,
        post_json(
            "/api/realtime-auth",
            Some("tok-ada"),
            serde_json::json!({ "room": "no-such-room" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Board not found");
}

#[tokio::test]
async fn test_realtime_auth_org_mismatch_is_forbidden() {
    let ctx = setup(false).await;
    let room = ctx.rooms.create("Org A Board", Some("org_A")).await;

    let (status, body) = send(
        &ctx,
        post_json(
            "/api/realtime-auth",
            Some("tok-bob"),
            serde_json::json!({ "room": room.id }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Forbidden");
}

#[tokio::test]
async fn test_realtime_auth_issues_room_scoped_credential() {
    let ctx = setup(false).await;
    let room = ctx.rooms.create("Org A Board", Some("org_A")).await;

    let (status, body) = send(
        &ctx,
        post_json(
            "/api/realtime-auth",
            Some("tok-ada"),
            serde_json::json!({ "room": room.id }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let token = body["token"].as_str().unwrap();
    let claims = ctx
        .credentials
        .verify_room_credential(token, &room.id)
        .unwrap();
    assert_eq!(claims.sub, "user_ada");
    assert_eq!(claims.name, "Ada");
    assert!(claims.full_access);

    // Scoped to exactly that room.
    assert!(ctx
        .credentials
        .verify_room_credential(token, "another-room")
        .is_err());
}

#[tokio::test]
async fn test_realtime_auth_ungated_room_open_to_any_identity() {
    let ctx = setup(false).await;
    let room = ctx.rooms.create("Personal Board", None).await;

    for token in ["tok-ada", "tok-bob", "tok-guest"] {
        let (status, _) = send(
            &ctx,
            post_json(
                "/api/realtime-auth",
                Some(token),
                serde_json::json!({ "room": room.id }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "token {token} should join");
    }
}

// ── video-room token ───────────────────────────────────────────────

#[tokio::test]
async fn test_video_token_requires_room_param() {
    let ctx = setup(true).await;
    let (status, body) = send(&ctx, get_req("/api/video-token", Some("tok-ada"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing 'room' query parameter");
}

#[tokio::test]
async fn test_video_token_requires_identity() {
    let ctx = setup(true).await;
    let (status, _) = send(&ctx, get_req("/api/video-token?room=room-1", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_video_token_unconfigured_is_operator_visible() {
    let ctx = setup(false).await;
    let (status, body) = send(&ctx, get_req("/api/video-token?room=room-1", Some("tok-ada"))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Video server credentials not configured");
}

#[tokio::test]
async fn test_video_token_issued_without_org_check() {
    let ctx = setup(true).await;
    // Bob's org does not matter for video.
    let (status, body) = send(&ctx, get_req("/api/video-token?room=room-1", Some("tok-bob"))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body["token"].as_str().unwrap().is_empty());
}

// ── assistant ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_assistant_requires_identity() {
    let ctx = setup(false).await;
    let (status, _) = send(
        &ctx,
        post_json(
            "/api/ai-assistant",
            None,
            serde_json::json!({ "boardId": "dashboard", "message": "hi", "role": "student" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_assistant_validates_before_upstream() {
    let ctx = setup(false).await;

    // Missing fields
    let (status, body) = send(
        &ctx,
        post_json(
            "/api/ai-assistant",
            Some("tok-ada"),
            serde_json::json!({ "boardId": "dashboard" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing required fields");

    // Unrecognized role is a validation failure, never a silent default.
    let (status, body) = send(
        &ctx,
        post_json(
            "/api/ai-assistant",
            Some("tok-ada"),
            serde_json::json!({ "boardId": "dashboard", "message": "hi", "role": "admin" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid role");
}

#[tokio::test]
async fn test_assistant_unknown_board_is_not_found() {
    let ctx = setup(false).await;
    let (status, body) = send(
        &ctx,
        post_json(
            "/api/ai-assistant",
            Some("tok-ada"),
            serde_json::json!({ "boardId": "no-such-board", "message": "hi", "role": "teacher" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Board not found");
}

#[tokio::test]
async fn test_assistant_without_model_key_is_configuration_error() {
    let ctx = setup(false).await;
    let (status, _) = send(
        &ctx,
        post_json(
            "/api/ai-assistant",
            Some("tok-ada"),
            serde_json::json!({ "boardId": "dashboard", "message": "hi", "role": "student" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

// ── board management ───────────────────────────────────────────────

#[tokio::test]
async fn test_board_lifecycle() {
    let ctx = setup(false).await;

    // Create in Ada's org.
    let (status, created) = send(
        &ctx,
        post_json(
            "/api/boards",
            Some("tok-ada"),
            serde_json::json!({ "title": "Physics 101" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["title"], "Physics 101");
    assert_eq!(created["org_id"], "org_A");
    let id = created["id"].as_str().unwrap().to_string();

    // Listed for Ada, with search.
    let (status, listed) = send(&ctx, get_req("/api/boards?search=physics", Some("tok-ada"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    // Not listed for Bob (different org).
    let (_, listed) = send(&ctx, get_req("/api/boards", Some("tok-bob"))).await;
    assert!(listed.as_array().unwrap().is_empty());

    // Rename.
    let request = Request::builder()
        .method("PATCH")
        .uri(format!("/api/boards/{id}"))
        .header("content-type", "application/json")
        .header("authorization", "Bearer tok-ada")
        .body(Body::from(
            serde_json::json!({ "title": "Physics 201" }).to_string(),
        ))
        .unwrap();
    let (status, renamed) = send(&ctx, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(renamed["title"], "Physics 201");

    // Bob cannot delete it.
    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/api/boards/{id}"))
        .header("authorization", "Bearer tok-bob")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&ctx, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Ada deletes it; subsequent joins report not-found.
    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/api/boards/{id}"))
        .header("authorization", "Bearer tok-ada")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&ctx, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], true);

    let (status, _) = send(
        &ctx,
        post_json(
            "/api/realtime-auth",
            Some("tok-ada"),
            serde_json::json!({ "room": id }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
