//! The two request-driven routes that expose the orchestrator over HTTP
//! (§6 "HTTP surface (gateway)"): a synchronous JSON call and a streaming
//! one whose wire format must be bit-exact for the embeddable widget.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use concierge_core::types::Channel;
use concierge_orchestrator::{HandleOptions, HandleRequest, HandleResult, HandleStreamEvent, OrchestratorError};

use crate::app::AppState;
use crate::auth::check_auth;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRequest {
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub message: String,
    pub channel: Channel,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
}

fn unauthorized() -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorBody {
            error: "unauthorized. Set 'Authorization: Bearer <token>' for this tenant.".to_string(),
            code: "GATEWAY_UNAUTHORIZED",
        }),
    )
}

fn build_request(tenant_id: String, req: MessageRequest) -> HandleRequest {
    HandleRequest {
        tenant_id,
        conversation_id: req.conversation_id,
        user_message: req.message,
        channel: req.channel,
        user_id: req.user_id,
        options: HandleOptions { dry_run: req.dry_run },
    }
}

/// Registers a cancellation token for the duration of one pipeline call and
/// removes it unconditionally on return, success or failure (§5
/// "Cancellation wiring").
async fn run_guarded(
    state: &Arc<AppState>,
    tenant_id: &str,
    conversation_id: Option<&str>,
    req: HandleRequest,
) -> Result<HandleResult, OrchestratorError> {
    let key = format!("{tenant_id}:{}", conversation_id.unwrap_or("new"));
    let cancel = CancellationToken::new();
    state.active_operations.insert(key.clone(), cancel.clone());
    let result = state.orchestrator.handle(req, Some(cancel)).await;
    state.active_operations.remove(&key);
    result
}

/// POST /v1/tenants/{tenant_id}/messages — synchronous pipeline call.
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<MessageRequest>,
) -> Result<Json<HandleResult>, (StatusCode, Json<ErrorBody>)> {
    if !check_auth(&state, &tenant_id, &headers) {
        return Err(unauthorized());
    }

    let conversation_id = req.conversation_id.clone();
    let handle_req = build_request(tenant_id.clone(), req);
    match run_guarded(&state, &tenant_id, conversation_id.as_deref(), handle_req).await {
        Ok(result) => Ok(Json(result)),
        Err(e) => {
            warn!(tenant_id, error = %e, "pipeline call failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody { error: e.to_string(), code: e.code() }),
            ))
        }
    }
}

/// Registers a cancellation token and drives [`concierge_orchestrator::Orchestrator::handle_stream`]
/// to completion, forwarding every chunk to `tx` as it arrives. Runs as a
/// spawned task so the handler can hand an `Sse` response back to Axum
/// immediately instead of waiting for the whole pipeline to finish.
async fn run_guarded_stream(
    state: Arc<AppState>,
    tenant_id: String,
    conversation_id: Option<String>,
    req: HandleRequest,
    tx: mpsc::Sender<HandleStreamEvent>,
) {
    let key = format!("{tenant_id}:{}", conversation_id.as_deref().unwrap_or("new"));
    let cancel = CancellationToken::new();
    state.active_operations.insert(key.clone(), cancel.clone());
    if let Err(e) = state.orchestrator.handle_stream(req, Some(cancel), tx).await {
        warn!(tenant_id, error = %e, "streaming pipeline call failed");
    }
    state.active_operations.remove(&key);
}

/// POST /v1/tenants/{tenant_id}/messages/stream — same body; pipeline step
/// 12 is streamed chunk-by-chunk and mapped onto the fixed
/// `delta`/`done`/`escalated`/`blocked`/`error` event shapes, terminated by
/// `data: [DONE]` (§4.1 "Streaming mode", §6 "Chat stream (outbound format)").
pub async fn stream_message(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<MessageRequest>,
) -> Result<Sse<impl futures_util::Stream<Item = Result<Event, Infallible>>>, (StatusCode, Json<ErrorBody>)> {
    if !check_auth(&state, &tenant_id, &headers) {
        return Err(unauthorized());
    }

    let conversation_id = req.conversation_id.clone();
    let handle_req = build_request(tenant_id.clone(), req);

    let (tx, mut rx) = mpsc::channel(32);
    tokio::spawn(run_guarded_stream(state, tenant_id, conversation_id, handle_req, tx));

    let events = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            yield Ok::<_, Infallible>(Event::default().data(stream_event_to_payload(&event)));
        }
        yield Ok::<_, Infallible>(Event::default().data("[DONE]"));
    };
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// Maps one [`HandleStreamEvent`] onto its fixed wire payload (§6 "Chat
/// stream (outbound format)"). Split out from the handler so the mapping can
/// be tested without spinning up Axum.
fn stream_event_to_payload(event: &HandleStreamEvent) -> String {
    match event {
        HandleStreamEvent::Delta { text } => {
            serde_json::json!({"type": "delta", "content": text}).to_string()
        }
        HandleStreamEvent::Done { conversation_id } => {
            serde_json::json!({"type": "done", "conversationId": conversation_id}).to_string()
        }
        HandleStreamEvent::Blocked { message } => tagged_json("blocked", message, None),
        HandleStreamEvent::Escalated { message, conversation_id } => {
            tagged_json("escalated", message, Some(conversation_id))
        }
        HandleStreamEvent::Error { message } => {
            warn!(error = %message, "streaming pipeline call failed");
            serde_json::json!({"type": "error", "message": message}).to_string()
        }
    }
}

fn tagged_json(kind: &str, message: &str, conversation_id: Option<&str>) -> String {
    let mut value = serde_json::json!({"type": kind, "message": message});
    if let Some(id) = conversation_id {
        value["conversationId"] = serde_json::Value::String(id.to_string());
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_event_has_no_conversation_id() {
        let payload = stream_event_to_payload(&HandleStreamEvent::Blocked { message: "blocked msg".to_string() });
        assert!(payload.contains("\"type\":\"blocked\""));
        assert!(!payload.contains("conversationId"));
    }

    #[test]
    fn escalated_event_includes_conversation_id() {
        let payload = stream_event_to_payload(&HandleStreamEvent::Escalated {
            message: "low confidence".to_string(),
            conversation_id: "conv1".to_string(),
        });
        assert!(payload.contains("\"type\":\"escalated\""));
        assert!(payload.contains("\"conversationId\":\"conv1\""));
    }

    #[test]
    fn delta_event_carries_chunk_text() {
        let payload = stream_event_to_payload(&HandleStreamEvent::Delta { text: "the ans".to_string() });
        assert!(payload.contains("\"type\":\"delta\""));
        assert!(payload.contains("the ans"));
    }

    #[test]
    fn done_event_carries_no_content_field() {
        let payload = stream_event_to_payload(&HandleStreamEvent::Done { conversation_id: "conv1".to_string() });
        assert!(payload.contains("\"type\":\"done\""));
        assert!(payload.contains("\"conversationId\":\"conv1\""));
        assert!(!payload.contains("content"));
    }

    #[test]
    fn error_event_carries_message() {
        let payload = stream_event_to_payload(&HandleStreamEvent::Error { message: "boom".to_string() });
        assert!(payload.contains("\"type\":\"error\""));
        assert!(payload.contains("boom"));
    }
}
