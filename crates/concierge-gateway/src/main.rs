use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use concierge_cache::CacheStore;
use concierge_core::config::ConciergeConfig;
use concierge_persistence::{AuditStore, ConnectorStore, ConversationStore, PolicyStore, ProcedureStore, TenantStore};
use concierge_providers::anthropic::AnthropicProvider;
use concierge_providers::embedding::OpenAiEmbeddingProvider;
use concierge_retriever::{Retriever, VectorStore};

mod app;
mod auth;
mod http;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "concierge_gateway=info,tower_http=debug".into()),
        )
        .init();

    // load config: explicit path > CONCIERGE_CONFIG env > ~/.concierge/concierge.toml
    let config_path = std::env::var("CONCIERGE_CONFIG").ok();
    let config = ConciergeConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("config load failed ({}), using defaults", e);
        ConciergeConfig::default()
    });

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;

    let orchestrator = build_orchestrator(&config)?;
    let state = Arc::new(app::AppState::new(config, orchestrator));
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!("concierge gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

/// Opens every store's own SQLite file alongside the configured database
/// path and wires the generation/embedding providers from config. Each
/// store owns a single connection (§4.7 "Connection model"); there is no
/// shared database handle to pass around.
fn build_orchestrator(
    config: &ConciergeConfig,
) -> anyhow::Result<concierge_orchestrator::Orchestrator<AnthropicProvider, OpenAiEmbeddingProvider>> {
    let dir = Path::new(&config.database.path)
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| Path::new(".").to_path_buf());
    std::fs::create_dir_all(&dir)?;
    let store_path = |name: &str| dir.join(format!("{name}.db")).to_string_lossy().into_owned();

    let tenants = TenantStore::open(&store_path("tenants"))?;
    let policies = PolicyStore::open(&store_path("policies"))?;
    let procedures = ProcedureStore::open(&store_path("procedures"))?;
    let connectors = ConnectorStore::open(&store_path("connectors"))?;
    let conversations = ConversationStore::open(&store_path("conversations"))?;
    let audit = AuditStore::open(&store_path("audit"))?;
    let cache = CacheStore::open(&store_path("cache"))?;
    let vectors = VectorStore::open(&store_path("vectors"))?;

    let anthropic = config
        .providers
        .anthropic
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("providers.anthropic is required to serve generation requests"))?;
    let llm = AnthropicProvider::new(anthropic.api_key.clone(), Some(anthropic.base_url.clone()));

    let embeddings = config
        .providers
        .embeddings
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("providers.embeddings is required to serve retrieval requests"))?;
    let embedder = OpenAiEmbeddingProvider::new(
        embeddings.api_key.clone(),
        Some(embeddings.base_url.clone()),
        embeddings.model.clone(),
    );

    let retriever = Retriever::new(vectors, embedder);

    Ok(concierge_orchestrator::Orchestrator::new(
        tenants,
        policies,
        procedures,
        connectors,
        conversations,
        audit,
        cache,
        retriever,
        llm,
    ))
}
