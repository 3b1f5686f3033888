mod api;

use std::sync::Arc;

use paperthread::chat::ConversationEngine;
use paperthread::config::EngineConfig;
use paperthread::embeddings::RemoteEmbedder;
use paperthread::index::RemoteVectorIndex;
use paperthread::llm::{GenerationConfig, OpenAiCompletions};
use paperthread::store::SqliteStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = EngineConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;

    // Long-lived collaborators, built once and injected into the engine.
    let store = Arc::new(SqliteStore::connect(&config.database_url).await?);
    let embedder = Arc::new(RemoteEmbedder::new(&config.embedding)?);
    let index = Arc::new(RemoteVectorIndex::new(&config.index)?);
    let completions = Arc::new(OpenAiCompletions::new(&config.completion)?);

    let engine = Arc::new(ConversationEngine::new(
        store.clone(),
        store,
        embedder,
        index,
        completions,
        GenerationConfig::from(&config.completion),
        config.turn.clone(),
    ));

    let app = api::create_router(engine);

    let addr = std::env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
    info!("shutdown signal received");
}
