use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use concierge_core::types::{
    ConversationStatus, MessageId, Role, SourceId, TenantConfig, TenantId, DEFAULT_RETRIEVAL_K,
    GENERATION_FALLBACK_MESSAGE, LOW_CONFIDENCE_MESSAGE, POLICY_BLOCKED_MESSAGE,
};
use concierge_persistence::types::Message as PersistedMessage;
use concierge_persistence::{AuditStore, ConnectorStore, ConversationStore, PolicyStore, ProcedureStore, TenantStore};
use concierge_policy::types::{Policy, PolicyMode};
use concierge_procedures::executor::Executor;
use concierge_procedures::types::ExecutionContext;
use concierge_providers::provider::{ChatRequest, EmbeddingProvider, LlmProvider, Message as LlmMessage, Role as LlmRole};
use concierge_providers::stream::StreamEvent as ProviderStreamEvent;
use concierge_retriever::{Retriever, SearchResult};

use concierge_cache::CacheStore;

use crate::error::Result;
use crate::types::{HandleOptions, HandleRequest, HandleResult, HandleStreamEvent};

/// Wires every component crate together and drives the fixed per-message
/// pipeline (§4.1). One instance is shared across all inbound requests —
/// every method takes `&self` and the underlying stores serialize their own
/// writes, so a single `Arc<Orchestrator>` can be handed to every handler.
pub struct Orchestrator<L: LlmProvider, E: EmbeddingProvider> {
    pub tenants: TenantStore,
    pub policies: PolicyStore,
    pub procedures: ProcedureStore,
    pub connectors: ConnectorStore,
    pub conversations: ConversationStore,
    pub audit: AuditStore,
    pub cache: CacheStore,
    pub retriever: Retriever<E>,
    pub llm: L,
    pub executor: Executor,
}

/// Everything pipeline steps 13-15 need once an answer exists, whether it
/// came back buffered (`handle`) or accumulated chunk-by-chunk
/// (`handle_stream`). Carried out of [`Orchestrator::run_until_generation`]
/// so both callers share one copy of steps 1-11.
struct GenerationContext {
    conversation_id: String,
    policies: Vec<Policy>,
    citations: Vec<SourceId>,
    confidence: f32,
    chat_request: ChatRequest,
    query_embedding: Option<Vec<f32>>,
    config: TenantConfig,
}

/// Where [`Orchestrator::run_until_generation`] leaves the pipeline.
enum PipelineStage {
    /// Terminated before step 12 (steps 3, 7, 8, or 10); the result is
    /// already final.
    Early(HandleResult),
    /// Ready for step 12. The caller drives generation — buffered or
    /// streamed — then finishes with [`Orchestrator::finish_generation`].
    Generate(GenerationContext),
}

impl<L: LlmProvider, E: EmbeddingProvider> Orchestrator<L, E> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenants: TenantStore,
        policies: PolicyStore,
        procedures: ProcedureStore,
        connectors: ConnectorStore,
        conversations: ConversationStore,
        audit: AuditStore,
        cache: CacheStore,
        retriever: Retriever<E>,
        llm: L,
    ) -> Self {
        Self {
            tenants,
            policies,
            procedures,
            connectors,
            conversations,
            audit,
            cache,
            retriever,
            llm,
            executor: Executor::new(reqwest::Client::new()),
        }
    }

    /// Run the full pipeline for one inbound message (§4.1, steps 1-15),
    /// buffering the whole answer before returning.
    #[instrument(skip(self, req, cancel), fields(tenant_id = %req.tenant_id))]
    pub async fn handle(&self, req: HandleRequest, cancel: Option<CancellationToken>) -> Result<HandleResult> {
        let ctx = match self.run_until_generation(&req, &cancel).await? {
            PipelineStage::Early(result) => return Ok(result),
            PipelineStage::Generate(ctx) => ctx,
        };

        if is_cancelled(&cancel) {
            return Err(crate::error::OrchestratorError::Cancelled);
        }

        // Step 12: LLM generation.
        let answer = match self.llm.send(&ctx.chat_request).await {
            Ok(resp) => resp.content,
            Err(e) => {
                warn!(tenant_id = %req.tenant_id, error = %e, "generation failed");
                return self.generation_fallback_result(&req, &ctx.conversation_id);
            }
        };

        self.finish_generation(&req, ctx, answer)
    }

    /// Streaming counterpart of [`Self::handle`] (§4.1 "Streaming mode").
    /// Steps 1-11 run identically; the four early-outcome steps (3, 7, 8,
    /// 10) are forwarded as a single terminal [`HandleStreamEvent`] with no
    /// preceding deltas. Once step 12 starts, every provider text chunk is
    /// forwarded to `tx` the moment it arrives — including chunks from an
    /// answer step 13 later discards, an accepted tradeoff of streaming
    /// generation rather than buffering the full response first. Callers
    /// must treat a trailing `Blocked`/`Escalated` event as authoritative
    /// over any `Delta`s that preceded it.
    #[instrument(skip(self, req, cancel, tx), fields(tenant_id = %req.tenant_id))]
    pub async fn handle_stream(
        &self,
        req: HandleRequest,
        cancel: Option<CancellationToken>,
        tx: mpsc::Sender<HandleStreamEvent>,
    ) -> Result<()> {
        let ctx = match self.run_until_generation(&req, &cancel).await {
            Ok(PipelineStage::Early(result)) => {
                let _ = tx.send(result_to_stream_event(&result)).await;
                return Ok(());
            }
            Ok(PipelineStage::Generate(ctx)) => ctx,
            Err(e) => {
                let _ = tx.send(HandleStreamEvent::Error { message: e.to_string() }).await;
                return Err(e);
            }
        };

        if is_cancelled(&cancel) {
            let _ = tx.send(HandleStreamEvent::Error { message: "request cancelled".to_string() }).await;
            return Err(crate::error::OrchestratorError::Cancelled);
        }

        // Step 12: drive the provider's own chunk channel concurrently with
        // a consumer that forwards each chunk through `tx` as it arrives and
        // accumulates the full text for steps 13-15. `tokio::join!` rather
        // than `tokio::spawn` because the producer borrows `&self.llm`.
        let (chunk_tx, mut chunk_rx) = mpsc::channel::<ProviderStreamEvent>(32);
        let producer = self.llm.send_stream(&ctx.chat_request, chunk_tx);
        let consumer = async {
            let mut accumulated = String::new();
            let mut stream_error = None;
            while let Some(event) = chunk_rx.recv().await {
                match event {
                    ProviderStreamEvent::TextDelta { text } => {
                        accumulated.push_str(&text);
                        let _ = tx.send(HandleStreamEvent::Delta { text }).await;
                    }
                    ProviderStreamEvent::Done { .. } => {}
                    ProviderStreamEvent::Error { message } => stream_error = Some(message),
                }
            }
            (accumulated, stream_error)
        };
        let (send_result, (answer, stream_error)) = tokio::join!(producer, consumer);

        if let Some(message) = stream_error.or_else(|| send_result.err().map(|e| e.to_string())) {
            warn!(tenant_id = %req.tenant_id, error = %message, "streaming generation failed");
            let result = self.generation_fallback_result(&req, &ctx.conversation_id)?;
            // The fallback message was never streamed as a chunk (the
            // provider call itself failed), and the `done` event carries no
            // content field, so send it as one delta before the terminal
            // event rather than dropping it silently.
            let _ = tx.send(HandleStreamEvent::Delta { text: result.content.clone() }).await;
            let _ = tx.send(result_to_stream_event(&result)).await;
            return Ok(());
        }

        let result = self.finish_generation(&req, ctx, answer)?;
        let _ = tx.send(result_to_stream_event(&result)).await;
        Ok(())
    }

    /// Steps 1-11: tenant config, policies, pre-policy gate, PII redaction,
    /// conversation bookkeeping, procedure matching, semantic cache, vector
    /// retrieval, confidence gate, and LLM context construction. Returns
    /// either a final result (an early outcome) or everything step 12 needs.
    async fn run_until_generation(
        &self,
        req: &HandleRequest,
        cancel: &Option<CancellationToken>,
    ) -> Result<PipelineStage> {
        if is_cancelled(cancel) {
            return Err(crate::error::OrchestratorError::Cancelled);
        }

        // Step 1: load tenant config, falling back to defaults on read failure.
        let config = self.tenants.get_or_default(&TenantId::from(req.tenant_id.clone()));

        // Step 2: load policies; an empty set on failure, never a hard error.
        let policies = self.policies.list_enabled(&req.tenant_id).unwrap_or_else(|e| {
            warn!(tenant_id = %req.tenant_id, error = %e, "policy load failed, continuing with empty set");
            Vec::new()
        });

        // Step 3: pre-policy gate.
        let pre = concierge_policy::validate(&req.user_message, &policies, PolicyMode::Pre);
        if !pre.passed {
            let conversation_id = self.ensure_conversation(req).await?;
            self.persist_user_message(&req.tenant_id, &conversation_id, &req.user_message, &req.options)?;
            let reason = join_violations(&pre.violations);
            self.audit.record_best_effort(
                &req.tenant_id,
                "policy.violated",
                serde_json::json!({"conversation_id": conversation_id, "phase": "pre", "reason": reason}),
            );
            return Ok(PipelineStage::Early(HandleResult {
                resolved: false,
                content: POLICY_BLOCKED_MESSAGE.to_string(),
                conversation_id,
                message_id: None,
                confidence: 0.0,
                citations: vec![],
                blocked_reason: Some(reason),
                escalated: false,
                debug: serde_json::json!({}),
            }));
        }

        // Step 4: PII redaction. The cleaned message drives every downstream
        // step; the original is what gets persisted as the user message.
        let cleaned_message = concierge_policy::redact_pii(&req.user_message, &policies);

        // Step 5: ensure conversation, emit conversation/message events.
        let conversation_id = self.ensure_conversation(req).await?;
        self.audit.record_best_effort(
            &req.tenant_id,
            "message.received",
            serde_json::json!({"conversation_id": conversation_id, "channel": req.channel.to_string()}),
        );

        // Step 6: persist user message (skipped in dry_run).
        let user_message_id =
            self.persist_user_message(&req.tenant_id, &conversation_id, &req.user_message, &req.options)?;

        if is_cancelled(cancel) {
            return Err(crate::error::OrchestratorError::Cancelled);
        }

        // Step 7: procedure match / execution short-circuit.
        let procedures = self.procedures.list_enabled(&req.tenant_id).unwrap_or_else(|e| {
            warn!(tenant_id = %req.tenant_id, error = %e, "procedure load failed, continuing with empty set");
            Vec::new()
        });
        if let Some(procedure) = concierge_procedures::find_matching(&cleaned_message, &procedures) {
            self.audit.record_best_effort(
                &req.tenant_id,
                "procedure.triggered",
                serde_json::json!({"conversation_id": conversation_id, "procedure_id": procedure.id}),
            );
            let connectors = self.connectors.list_enabled(&req.tenant_id).unwrap_or_default();
            let mut exec_ctx = ExecutionContext {
                tenant_id: req.tenant_id.clone(),
                conversation_id: conversation_id.clone(),
                user_id: req.user_id.clone(),
                variables: HashMap::new(),
                dry_run: req.options.dry_run,
            };
            let outcome = self.executor.execute(procedure, &connectors, &mut exec_ctx, &self.audit).await;
            self.audit.record_best_effort(
                &req.tenant_id,
                if outcome.success { "procedure.completed" } else { "procedure.failed" },
                serde_json::json!({"conversation_id": conversation_id, "procedure_id": procedure.id}),
            );
            if outcome.success {
                if let Some(message) = outcome.final_message {
                    let message_id = self.persist_assistant_message(
                        &req.tenant_id,
                        &conversation_id,
                        &message,
                        Some(1.0),
                        &[],
                        &req.options,
                    )?;
                    self.set_status(&req.tenant_id, &conversation_id, ConversationStatus::Resolved, &req.options);
                    return Ok(PipelineStage::Early(HandleResult {
                        resolved: true,
                        content: message,
                        conversation_id,
                        message_id,
                        confidence: 1.0,
                        citations: vec![],
                        blocked_reason: None,
                        escalated: false,
                        debug: serde_json::json!({"procedure_id": procedure.id}),
                    }));
                }
            }
        }

        // Step 8: semantic cache lookup. The query embedding is computed
        // once here and reused by retrieval below so a cache miss doesn't
        // cost a second round-trip to the embedding provider.
        let query_embedding = match self.retriever.embed_query(&cleaned_message).await {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(tenant_id = %req.tenant_id, error = %e, "embedding the query failed, skipping cache and retrieval");
                None
            }
        };
        if let Some(ref embedding) = query_embedding {
            if let Some(hit) = self.cache.get(&req.tenant_id, embedding) {
                self.audit.record_best_effort(
                    &req.tenant_id,
                    "cache.hit",
                    serde_json::json!({"conversation_id": conversation_id}),
                );
                let citations: Vec<SourceId> = hit.citations.iter().map(|c| SourceId::from(c.as_str())).collect();
                let message_id = self.persist_assistant_message(
                    &req.tenant_id,
                    &conversation_id,
                    &hit.content,
                    Some(hit.confidence),
                    &citations,
                    &req.options,
                )?;
                let resolved = hit.confidence >= config.confidence_threshold;
                if resolved {
                    self.set_status(&req.tenant_id, &conversation_id, ConversationStatus::Resolved, &req.options);
                }
                return Ok(PipelineStage::Early(HandleResult {
                    resolved,
                    content: hit.content,
                    conversation_id,
                    message_id,
                    confidence: hit.confidence,
                    citations,
                    blocked_reason: None,
                    escalated: false,
                    debug: serde_json::json!({"cache_hit": true}),
                }));
            }
            self.audit.record_best_effort(
                &req.tenant_id,
                "cache.miss",
                serde_json::json!({"conversation_id": conversation_id}),
            );
        }

        if is_cancelled(cancel) {
            return Err(crate::error::OrchestratorError::Cancelled);
        }

        // Step 9: vector retrieval.
        let results = match &query_embedding {
            Some(embedding) => self
                .retriever
                .search_with_embedding(&req.tenant_id, embedding, DEFAULT_RETRIEVAL_K)
                .unwrap_or_else(|e| {
                    warn!(tenant_id = %req.tenant_id, error = %e, "retrieval failed, treating as empty");
                    Vec::new()
                }),
            None => Vec::new(),
        };
        let confidence = mean_score(&results);
        let citations = dedup_citations(&results);

        // Step 10: confidence gate.
        if results.is_empty() || confidence < config.confidence_threshold {
            let message_id = self.persist_assistant_message(
                &req.tenant_id,
                &conversation_id,
                LOW_CONFIDENCE_MESSAGE,
                Some(confidence),
                &[],
                &req.options,
            )?;
            self.set_status(&req.tenant_id, &conversation_id, ConversationStatus::Escalated, &req.options);
            self.audit.record_best_effort(
                &req.tenant_id,
                "conversation.escalated",
                serde_json::json!({"conversation_id": conversation_id, "reason": "low_confidence"}),
            );
            return Ok(PipelineStage::Early(HandleResult {
                resolved: false,
                content: LOW_CONFIDENCE_MESSAGE.to_string(),
                conversation_id,
                message_id,
                confidence,
                citations: vec![],
                blocked_reason: None,
                escalated: true,
                debug: serde_json::json!({}),
            }));
        }

        // Step 11: build LLM context.
        let history = self
            .conversations
            .recent_messages(&req.tenant_id, &conversation_id, config.max_history_messages)
            .unwrap_or_default();
        let history: Vec<LlmMessage> = history
            .into_iter()
            .filter(|m| Some(m.id.as_str()) != user_message_id.as_deref())
            .map(|m| LlmMessage {
                role: match m.role {
                    Role::User => LlmRole::User,
                    Role::Assistant => LlmRole::Assistant,
                },
                content: m.content,
            })
            .collect();
        let system_prompt = build_system_prompt(&config, &results);
        let mut messages = history;
        messages.push(LlmMessage { role: LlmRole::User, content: cleaned_message.clone() });

        if is_cancelled(cancel) {
            return Err(crate::error::OrchestratorError::Cancelled);
        }

        let model = config.model_override.clone().unwrap_or_else(|| "claude-3-5-sonnet-20241022".to_string());
        let chat_request = ChatRequest {
            model,
            system: system_prompt,
            messages,
            max_tokens: 1024,
            stream: false,
        };

        Ok(PipelineStage::Generate(GenerationContext {
            conversation_id,
            policies,
            citations,
            confidence,
            chat_request,
            query_embedding,
            config,
        }))
    }

    /// Steps 13-15 once an answer exists, buffered from [`Self::handle`] or
    /// accumulated chunk-by-chunk from [`Self::handle_stream`].
    fn finish_generation(&self, req: &HandleRequest, ctx: GenerationContext, answer: String) -> Result<HandleResult> {
        let GenerationContext { conversation_id, policies, citations, confidence, query_embedding, config, .. } = ctx;

        // Step 13: post-policy gate.
        let post = concierge_policy::validate(&answer, &policies, PolicyMode::Post);
        if !post.passed {
            let reason = join_violations(&post.violations);
            let message_id = self.persist_assistant_message(
                &req.tenant_id,
                &conversation_id,
                GENERATION_FALLBACK_MESSAGE,
                None,
                &[],
                &req.options,
            )?;
            self.set_status(&req.tenant_id, &conversation_id, ConversationStatus::Escalated, &req.options);
            self.audit.record_best_effort(
                &req.tenant_id,
                "policy.violated",
                serde_json::json!({"conversation_id": conversation_id, "phase": "post", "reason": reason}),
            );
            self.audit.record_best_effort(
                &req.tenant_id,
                "conversation.escalated",
                serde_json::json!({"conversation_id": conversation_id, "reason": "post_policy_violation"}),
            );
            return Ok(HandleResult {
                resolved: false,
                content: GENERATION_FALLBACK_MESSAGE.to_string(),
                conversation_id,
                message_id,
                confidence: 0.0,
                citations: vec![],
                blocked_reason: Some(reason),
                escalated: true,
                debug: serde_json::json!({}),
            });
        }

        // Step 14: persist assistant message with citations and confidence.
        let message_id = self.persist_assistant_message(
            &req.tenant_id,
            &conversation_id,
            &answer,
            Some(confidence),
            &citations,
            &req.options,
        )?;
        let resolved = confidence >= config.confidence_threshold;
        if resolved {
            self.set_status(&req.tenant_id, &conversation_id, ConversationStatus::Resolved, &req.options);
            self.audit.record_best_effort(
                &req.tenant_id,
                "conversation.resolved",
                serde_json::json!({"conversation_id": conversation_id}),
            );
        }
        self.audit.record_best_effort(
            &req.tenant_id,
            "message.sent",
            serde_json::json!({"conversation_id": conversation_id}),
        );

        // Step 15: populate cache (best-effort).
        if !req.options.dry_run {
            if let Some(embedding) = query_embedding {
                let citation_strings: Vec<String> = citations.iter().map(|c| c.as_str().to_string()).collect();
                self.cache.set(
                    &req.tenant_id,
                    &embedding,
                    &answer,
                    confidence,
                    &citation_strings,
                    config.cache_ttl_secs,
                );
            }
        }

        info!(tenant_id = %req.tenant_id, conversation_id = %conversation_id, resolved, confidence, "pipeline complete");

        Ok(HandleResult {
            resolved,
            content: answer,
            conversation_id,
            message_id,
            confidence,
            citations,
            blocked_reason: None,
            escalated: false,
            debug: serde_json::json!({}),
        })
    }

    /// The fixed fallback result used when step 12 itself fails, buffered or
    /// streamed: persists [`GENERATION_FALLBACK_MESSAGE`] and returns a
    /// non-resolved, non-escalated result (a human may retry).
    fn generation_fallback_result(&self, req: &HandleRequest, conversation_id: &str) -> Result<HandleResult> {
        let message_id = self.persist_assistant_message(
            &req.tenant_id,
            conversation_id,
            GENERATION_FALLBACK_MESSAGE,
            None,
            &[],
            &req.options,
        )?;
        Ok(HandleResult {
            resolved: false,
            content: GENERATION_FALLBACK_MESSAGE.to_string(),
            conversation_id: conversation_id.to_string(),
            message_id,
            confidence: 0.0,
            citations: vec![],
            blocked_reason: None,
            escalated: false,
            debug: serde_json::json!({}),
        })
    }

    async fn ensure_conversation(&self, req: &HandleRequest) -> Result<String> {
        if let Some(ref id) = req.conversation_id {
            if self.conversations.get(&req.tenant_id, id)?.is_some() {
                return Ok(id.clone());
            }
        }
        let conversation = self.conversations.create(&req.tenant_id, req.channel, req.user_id.as_deref())?;
        self.audit.record_best_effort(
            &req.tenant_id,
            "conversation.created",
            serde_json::json!({"conversation_id": conversation.id}),
        );
        Ok(conversation.id)
    }

    /// Persists the inbound user message and returns its id so callers can
    /// exclude exactly this turn from history by id rather than by content
    /// equality, which would also drop any earlier turn that happens to
    /// repeat the same text.
    fn persist_user_message(
        &self,
        tenant_id: &str,
        conversation_id: &str,
        content: &str,
        options: &HandleOptions,
    ) -> Result<Option<String>> {
        if options.dry_run {
            return Ok(None);
        }
        let id = MessageId::new().to_string();
        let message = PersistedMessage {
            id: id.clone(),
            conversation_id: conversation_id.to_string(),
            role: Role::User,
            content: content.to_string(),
            confidence: None,
            citations: vec![],
            metadata: serde_json::json!({}),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        self.conversations.append_message(tenant_id, &message)?;
        Ok(Some(id))
    }

    fn persist_assistant_message(
        &self,
        tenant_id: &str,
        conversation_id: &str,
        content: &str,
        confidence: Option<f32>,
        citations: &[SourceId],
        options: &HandleOptions,
    ) -> Result<Option<String>> {
        if options.dry_run {
            return Ok(None);
        }
        let id = MessageId::new().to_string();
        let message = PersistedMessage {
            id: id.clone(),
            conversation_id: conversation_id.to_string(),
            role: Role::Assistant,
            content: content.to_string(),
            confidence,
            citations: citations.to_vec(),
            metadata: serde_json::json!({}),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        self.conversations.append_message(tenant_id, &message)?;
        Ok(Some(id))
    }

    fn set_status(&self, tenant_id: &str, conversation_id: &str, status: ConversationStatus, options: &HandleOptions) {
        if options.dry_run {
            return;
        }
        if let Err(e) = self.conversations.set_status(tenant_id, conversation_id, status) {
            warn!(tenant_id, conversation_id, error = %e, "failed to transition conversation status");
        }
    }
}

fn is_cancelled(cancel: &Option<CancellationToken>) -> bool {
    cancel.as_ref().is_some_and(|c| c.is_cancelled())
}

/// Maps a terminal [`HandleResult`] onto the matching [`HandleStreamEvent`].
/// A resolved, non-escalated result with no blocked reason means step 12
/// already streamed its content as `Delta`s, so `Done` carries no content of
/// its own — only the conversation id the caller already has.
fn result_to_stream_event(result: &HandleResult) -> HandleStreamEvent {
    if result.blocked_reason.is_some() && !result.escalated {
        HandleStreamEvent::Blocked { message: result.content.clone() }
    } else if result.escalated {
        HandleStreamEvent::Escalated {
            message: result.content.clone(),
            conversation_id: result.conversation_id.clone(),
        }
    } else {
        HandleStreamEvent::Done { conversation_id: result.conversation_id.clone() }
    }
}

fn join_violations(violations: &[concierge_policy::types::Violation]) -> String {
    violations.iter().map(|v| v.reason.clone()).collect::<Vec<_>>().join("; ")
}

fn mean_score(results: &[SearchResult]) -> f32 {
    if results.is_empty() {
        return 0.0;
    }
    results.iter().map(|r| r.score).sum::<f32>() / results.len() as f32
}

fn dedup_citations(results: &[SearchResult]) -> Vec<SourceId> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for r in results {
        if seen.insert(r.chunk.source_id.clone()) {
            out.push(SourceId::from(r.chunk.source_id.clone()));
        }
    }
    out
}

fn build_system_prompt(config: &TenantConfig, results: &[SearchResult]) -> String {
    let default_prompt = "You are a helpful customer support assistant. Answer only from the retrieved context below; if it does not contain the answer, say so.";
    let mut prompt = match &config.system_prompt_prefix {
        Some(prefix) => format!("{prefix}\n\n{default_prompt}"),
        None => default_prompt.to_string(),
    };
    if !results.is_empty() {
        prompt.push_str("\n\nRetrieved Context:\n");
        for (i, r) in results.iter().enumerate() {
            prompt.push_str(&format!("[{}] ({:.0}% relevant) {}\n", i + 1, r.score * 100.0, r.chunk.text));
        }
    }
    prompt
}
