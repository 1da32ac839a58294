use axum::Json;
use serde_json::{json, Value};

/// GET /healthz — process liveness probe (§6 "HTTP surface").
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
