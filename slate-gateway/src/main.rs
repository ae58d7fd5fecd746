use std::net::SocketAddr;
use std::sync::Arc;

use slate_collab::server::{ServerConfig, SyncServer};
use slate_gateway::assistant::AssistantBridge;
use slate_gateway::config::GatewayConfig;
use slate_gateway::credentials::CredentialService;
use slate_gateway::identity::{Identity, StaticIdentityProvider};
use slate_gateway::rooms::{InMemoryRoomDirectory, RoomDirectory};
use slate_gateway::routes::{router, AppState};
use slate_gateway::GeminiClient;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(env_filter))
        .init();

    let config = GatewayConfig::from_env()?;

    let credentials = Arc::new(CredentialService::new(
        &config.credential_secret,
        config.room_token_ttl_secs,
    ));

    // The sync server verifies joins against the same signing service the
    // gateway issues credentials from.
    let sync = Arc::new(SyncServer::new(
        ServerConfig {
            bind_addr: config.sync_addr.clone(),
            ..ServerConfig::default()
        },
        credentials.clone(),
    ));
    let sync_runner = sync.clone();
    tokio::spawn(async move {
        if let Err(e) = sync_runner.run().await {
            tracing::error!("sync server failed: {e}");
        }
    });

    let identity = Arc::new(StaticIdentityProvider::new());
    if let Ok(token) = std::env::var("SLATE_DEV_TOKEN") {
        identity
            .register(token, Identity::new("user_dev").with_name("Dev"))
            .await;
        tracing::warn!("SLATE_DEV_TOKEN registered; do not use in production");
    }

    let rooms = Arc::new(InMemoryRoomDirectory::new());
    let directory: Arc<dyn RoomDirectory> = rooms.clone();

    let gemini = config
        .gemini_api_key
        .clone()
        .map(|key| GeminiClient::new(key, config.gemini_model.clone()));
    if gemini.is_none() {
        tracing::warn!("GEMINI_API_KEY not set; assistant endpoint will report a configuration error");
    }
    let assistant = Arc::new(AssistantBridge::new(
        directory.clone(),
        sync.clone(),
        gemini,
    ));

    let video = config.video_issuer().map(Arc::new);
    if video.is_none() {
        tracing::warn!("video credentials not set; video-token endpoint will report a configuration error");
    }

    let state = AppState {
        identity,
        rooms: directory,
        credentials,
        video,
        assistant,
        sync,
    };

    let addr: SocketAddr = config.http_addr.parse()?;
    tracing::info!("Gateway listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}
