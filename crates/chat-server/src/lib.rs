//! SkillSwap Chat Server Library
//!
//! Real-time chat core: canonical conversation identity, ordered message
//! delivery over live subscription streams, block-aware visibility
//! filtering, and an asynchronous AI assistant responder.

pub mod assistant;
pub mod blocks;
pub mod config;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod models;
pub mod service;
pub mod store;
pub mod stream;
pub mod visibility;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use tracing::info;
use tracing_subscriber::EnvFilter;

use assistant::{AssistantConfig, AssistantOrchestrator, GenAiGenerator};
use blocks::BlockRegistry;
use config::{AppState, ChatServerConfig};
use handlers::{
    clear_context, command_suggestions, get_conversation, list_blocked,
    list_conversations, put_message, set_blocked, start_conversation, subscribe,
};
use service::ChatService;
use store::JsonConversationStore;
use stream::MessageStream;

/// Build the chat service from configuration.
pub async fn build_service(
    config: ChatServerConfig,
    assistant_config: AssistantConfig,
) -> anyhow::Result<Arc<ChatService>> {
    let store = Arc::new(JsonConversationStore::new(config.clone()).await?);
    let blocks = Arc::new(BlockRegistry::new(&config.blocks_db_path).await?);
    let stream = MessageStream::new(store.clone(), blocks.clone());
    let assistant = AssistantOrchestrator::new(
        assistant_config,
        store.clone(),
        blocks.clone(),
        Arc::new(GenAiGenerator::new()),
    );

    Ok(Arc::new(ChatService::new(store, blocks, stream, assistant)))
}

/// Build the HTTP router over a chat service.
pub fn router(service: Arc<ChatService>) -> Router {
    let state = AppState { service };

    Router::new()
        .route("/chat", axum::routing::post(start_conversation))
        .route("/chat/conversations", get(list_conversations))
        .route("/chat/{key}", get(get_conversation).put(put_message))
        .route("/chat/{key}/subscribe", get(subscribe))
        .route(
            "/chat/{key}/context",
            axum::routing::delete(clear_context),
        )
        .route("/blocks", get(list_blocked))
        .route("/blocks/{target}", axum::routing::put(set_blocked))
        .route("/assistant/commands", get(command_suggestions))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

pub async fn run() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("=== SkillSwap Chat Server ===");
    info!("Features: Conversations | Live Streams | Blocks | AI Assistant");

    let config = ChatServerConfig::default();
    config.ensure_dirs().await?;
    info!("Storage directory: {:?}", config.storage_dir);
    info!("Blocks database: {:?}", config.blocks_db_path);

    let assistant_config = AssistantConfig::default();
    info!("Assistant model: {}", assistant_config.model);

    let service = build_service(config, assistant_config).await?;
    let app = router(service);

    let addr = SocketAddr::from(([0, 0, 0, 0], 3001));
    info!("Chat server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK - SkillSwap Chat Server"
}
