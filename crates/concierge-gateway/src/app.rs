use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use concierge_core::config::ConciergeConfig;
use concierge_orchestrator::Orchestrator;
use concierge_providers::anthropic::AnthropicProvider;
use concierge_providers::embedding::OpenAiEmbeddingProvider;

/// The orchestrator wired against this deployment's concrete providers.
/// The core crate is generic over `LlmProvider`/`EmbeddingProvider`; the
/// gateway binary is the one place that picks concrete implementations.
pub type AppOrchestrator = Orchestrator<AnthropicProvider, OpenAiEmbeddingProvider>;

/// Central shared state — passed as `Arc<AppState>` to every Axum handler.
pub struct AppState {
    pub config: ConciergeConfig,
    pub orchestrator: AppOrchestrator,
    /// In-flight `(tenantId, conversationId)` pipeline calls, keyed by the
    /// same string the cancellation token guards. Registered for the
    /// duration of one `handle` call and removed unconditionally when it
    /// returns (§5 "Cancellation wiring").
    pub active_operations: DashMap<String, CancellationToken>,
}

impl AppState {
    pub fn new(config: ConciergeConfig, orchestrator: AppOrchestrator) -> Self {
        Self {
            config,
            orchestrator,
            active_operations: DashMap::new(),
        }
    }
}

/// Assemble the full Axum router — the three routes that make up the
/// externally reachable surface (§6 "HTTP surface (gateway)").
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(crate::http::health::health_handler))
        .route(
            "/v1/tenants/{tenant_id}/messages",
            post(crate::http::messages::send_message),
        )
        .route(
            "/v1/tenants/{tenant_id}/messages/stream",
            post(crate::http::messages::stream_message),
        )
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
