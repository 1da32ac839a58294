//! Stitches every component crate into the fixed, per-message pipeline
//! (policy gates, procedure matching, semantic cache, vector retrieval,
//! generation, post-policy gate, persistence) behind a single
//! [`orchestrator::Orchestrator::handle`] entry point.

pub mod error;
pub mod orchestrator;
pub mod types;

pub use error::{OrchestratorError, Result};
pub use orchestrator::Orchestrator;
pub use types::{HandleOptions, HandleRequest, HandleResult, HandleStreamEvent};

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use concierge_cache::CacheStore;
    use concierge_core::types::{Channel, POLICY_BLOCKED_MESSAGE};
    use concierge_persistence::{AuditStore, ConnectorStore, ConversationStore, PolicyStore, ProcedureStore, TenantStore};
    use concierge_policy::types::{Policy, PolicyKind, PolicyMode, TopicFilterConfig};
    use concierge_procedures::types::{Procedure, Step, StepType, Trigger, TriggerType};
    use concierge_providers::provider::{ChatRequest, ChatResponse, EmbeddingProvider, LlmProvider, ProviderError};
    use concierge_retriever::{Retriever, VectorStore};

    use super::*;

    struct FakeLlm {
        response: String,
    }

    #[async_trait]
    impl LlmProvider for FakeLlm {
        fn name(&self) -> &str {
            "fake"
        }

        async fn send(&self, _req: &ChatRequest) -> std::result::Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                content: self.response.clone(),
                model: "fake-model".to_string(),
                tokens_in: 10,
                tokens_out: 10,
                stop_reason: "end_turn".to_string(),
            })
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl LlmProvider for FailingLlm {
        fn name(&self) -> &str {
            "failing"
        }

        async fn send(&self, _req: &ChatRequest) -> std::result::Result<ChatResponse, ProviderError> {
            Err(ProviderError::Unavailable("down for maintenance".to_string()))
        }
    }

    struct FakeEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FakeEmbedder {
        fn name(&self) -> &str {
            "fake"
        }

        async fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    fn build_orchestrator<L: LlmProvider>(llm: L) -> Orchestrator<L, FakeEmbedder> {
        Orchestrator::new(
            TenantStore::in_memory().unwrap(),
            PolicyStore::in_memory().unwrap(),
            ProcedureStore::in_memory().unwrap(),
            ConnectorStore::in_memory().unwrap(),
            ConversationStore::in_memory().unwrap(),
            AuditStore::in_memory().unwrap(),
            CacheStore::in_memory().unwrap(),
            Retriever::new(VectorStore::in_memory().unwrap(), FakeEmbedder),
            llm,
        )
    }

    fn request(message: &str) -> HandleRequest {
        HandleRequest {
            tenant_id: "acme".to_string(),
            conversation_id: None,
            user_message: message.to_string(),
            channel: Channel::Web,
            user_id: Some("user-1".to_string()),
            options: HandleOptions::default(),
        }
    }

    #[tokio::test]
    async fn pre_policy_violation_blocks_before_generation() {
        let orch = build_orchestrator(FakeLlm { response: "should never be reached".to_string() });
        orch.policies
            .upsert(&Policy {
                id: "p1".to_string(),
                tenant_id: "acme".to_string(),
                name: "no-rivals".to_string(),
                kind: PolicyKind::TopicFilter,
                mode: PolicyMode::Pre,
                config: serde_json::to_value(TopicFilterConfig {
                    blocked_topics: vec!["rival-corp".to_string()],
                    blocked_patterns: None,
                })
                .unwrap(),
                enabled: true,
                priority: 10,
            })
            .unwrap();

        let result = orch.handle(request("tell me about rival-corp"), None).await.unwrap();
        assert!(!result.resolved);
        assert_eq!(result.content, POLICY_BLOCKED_MESSAGE);
        assert!(result.blocked_reason.is_some());
    }

    #[tokio::test]
    async fn procedure_match_short_circuits_generation() {
        let orch = build_orchestrator(FakeLlm { response: "should never be reached".to_string() });
        orch.procedures
            .upsert(&Procedure {
                id: "proc1".to_string(),
                tenant_id: "acme".to_string(),
                name: "refund-flow".to_string(),
                trigger: Trigger { kind: TriggerType::Keyword, condition: "refund".to_string() },
                steps: vec![Step {
                    id: "s1".to_string(),
                    kind: StepType::Message,
                    config: serde_json::json!({"template": "Your refund has been started."}),
                    next_step_id: None,
                }],
                enabled: true,
                version: 1,
            })
            .unwrap();

        let result = orch.handle(request("I want a refund"), None).await.unwrap();
        assert!(result.resolved);
        assert_eq!(result.content, "Your refund has been started.");
        assert_eq!(result.confidence, 1.0);
    }

    #[tokio::test]
    async fn no_retrieval_hits_escalates_on_low_confidence() {
        let orch = build_orchestrator(FakeLlm { response: "an answer".to_string() });
        let result = orch.handle(request("what is your return policy"), None).await.unwrap();
        assert!(result.escalated);
        assert!(!result.resolved);
    }

    #[tokio::test]
    async fn generation_failure_falls_back_without_escalating() {
        let orch = build_orchestrator(FailingLlm);
        orch.retriever
            .ingest("acme", "doc1", None, vec![(0, "our return window is 30 days".to_string(), serde_json::json!({}))])
            .await
            .unwrap();
        let mut config = concierge_core::types::TenantConfig::defaults(concierge_core::types::TenantId::from("acme"));
        config.confidence_threshold = 0.0;
        orch.tenants.upsert(&config).unwrap();

        let result = orch.handle(request("what is your return window"), None).await.unwrap();
        assert!(!result.resolved);
        assert!(!result.escalated);
        assert_eq!(result.content, concierge_core::types::GENERATION_FALLBACK_MESSAGE);
    }

    #[tokio::test]
    async fn successful_generation_resolves_and_cites_sources() {
        let orch = build_orchestrator(FakeLlm { response: "our return window is 30 days".to_string() });
        orch.retriever
            .ingest("acme", "doc1", None, vec![(0, "our return window is 30 days".to_string(), serde_json::json!({}))])
            .await
            .unwrap();
        let mut config = concierge_core::types::TenantConfig::defaults(concierge_core::types::TenantId::from("acme"));
        config.confidence_threshold = 0.0;
        orch.tenants.upsert(&config).unwrap();

        let result = orch.handle(request("what is your return window"), None).await.unwrap();
        assert!(result.resolved);
        assert_eq!(result.content, "our return window is 30 days");
        assert_eq!(result.citations.len(), 1);
    }

    #[tokio::test]
    async fn cache_hit_skips_generation_entirely() {
        let orch = build_orchestrator(FakeLlm { response: "should never be reached".to_string() });
        let embedding = orch.retriever.embed_query("what is your return window").await.unwrap();
        orch.cache.set("acme", &embedding, "cached answer", 0.9, &[], 3600);

        let mut config = concierge_core::types::TenantConfig::defaults(concierge_core::types::TenantId::from("acme"));
        config.confidence_threshold = 0.0;
        orch.tenants.upsert(&config).unwrap();

        let result = orch.handle(request("what is your return window"), None).await.unwrap();
        assert!(result.resolved);
        assert_eq!(result.content, "cached answer");
    }

    #[tokio::test]
    async fn post_policy_violation_escalates_with_fallback_message() {
        let orch = build_orchestrator(FakeLlm { response: "our rival-corp beats everyone".to_string() });
        orch.policies
            .upsert(&Policy {
                id: "p1".to_string(),
                tenant_id: "acme".to_string(),
                name: "no-rivals".to_string(),
                kind: PolicyKind::TopicFilter,
                mode: PolicyMode::Post,
                config: serde_json::to_value(TopicFilterConfig {
                    blocked_topics: vec!["rival-corp".to_string()],
                    blocked_patterns: None,
                })
                .unwrap(),
                enabled: true,
                priority: 10,
            })
            .unwrap();
        orch.retriever
            .ingest("acme", "doc1", None, vec![(0, "our rival-corp beats everyone".to_string(), serde_json::json!({}))])
            .await
            .unwrap();
        let mut config = concierge_core::types::TenantConfig::defaults(concierge_core::types::TenantId::from("acme"));
        config.confidence_threshold = 0.0;
        orch.tenants.upsert(&config).unwrap();

        let result = orch.handle(request("tell me about rivals"), None).await.unwrap();
        assert!(result.escalated);
        assert!(result.blocked_reason.is_some());
    }

    #[tokio::test]
    async fn dry_run_never_persists_messages() {
        let orch = build_orchestrator(FakeLlm { response: "an answer".to_string() });
        let mut req = request("hello there");
        req.options.dry_run = true;
        let result = orch.handle(req, None).await.unwrap();
        assert!(result.message_id.is_none());
    }

    #[tokio::test]
    async fn streaming_generation_forwards_deltas_then_done() {
        let orch = build_orchestrator(FakeLlm { response: "our return window is 30 days".to_string() });
        orch.retriever
            .ingest("acme", "doc1", None, vec![(0, "our return window is 30 days".to_string(), serde_json::json!({}))])
            .await
            .unwrap();
        let mut config = concierge_core::types::TenantConfig::defaults(concierge_core::types::TenantId::from("acme"));
        config.confidence_threshold = 0.0;
        orch.tenants.upsert(&config).unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::channel(16);
        orch.handle_stream(request("what is your return window"), None, tx).await.unwrap();

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        let deltas: String = events
            .iter()
            .filter_map(|e| match e {
                HandleStreamEvent::Delta { text } => Some(text.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(deltas, "our return window is 30 days");
        assert!(matches!(events.last(), Some(HandleStreamEvent::Done { .. })));
    }

    #[tokio::test]
    async fn streaming_pre_policy_violation_emits_blocked_with_no_deltas() {
        let orch = build_orchestrator(FakeLlm { response: "should never be reached".to_string() });
        orch.policies
            .upsert(&Policy {
                id: "p1".to_string(),
                tenant_id: "acme".to_string(),
                name: "no-rivals".to_string(),
                kind: PolicyKind::TopicFilter,
                mode: PolicyMode::Pre,
                config: serde_json::to_value(TopicFilterConfig {
                    blocked_topics: vec!["rival-corp".to_string()],
                    blocked_patterns: None,
                })
                .unwrap(),
                enabled: true,
                priority: 10,
            })
            .unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::channel(16);
        orch.handle_stream(request("tell me about rival-corp"), None, tx).await.unwrap();

        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], HandleStreamEvent::Blocked { .. }));
    }
}
