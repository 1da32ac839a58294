use std::collections::HashMap;

use base64::Engine;
use concierge_core::audit::AuditSink;
use serde_json::Value;
use tracing::{info, warn};

use crate::template::{eval_condition, interpolate};
use crate::types::{
    ConnectorAuthType, ConnectorEndpoint, DataConnector, ExecutionContext, ExecutionResult, Procedure,
    Step, StepLog, StepOutcome, StepType,
};

/// Safety cap against cyclic procedure graphs — treated as a successful
/// termination of the walk, not an error (§4.3).
const MAX_ITERATIONS: u32 = 50;

/// Interprets a procedure's step graph as a small loop over an explicit step
/// pointer rather than recursion, so a cyclic graph degrades to a bounded
/// number of ticks instead of a stack overflow. Each step handler returns a
/// `StepOutcome`; the loop owns all control flow.
pub struct Executor {
    http: reqwest::Client,
}

impl Executor {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    pub async fn execute(
        &self,
        procedure: &Procedure,
        connectors: &[DataConnector],
        ctx: &mut ExecutionContext,
        audit: &dyn AuditSink,
    ) -> ExecutionResult {
        let mut logs = Vec::new();
        let mut final_message = None;
        let mut current = procedure.steps.first().map(|s| s.id.clone());
        let mut iterations = 0;

        while let Some(step_id) = current.take() {
            iterations += 1;
            if iterations > MAX_ITERATIONS {
                break;
            }

            let step = match procedure.step(&step_id) {
                Some(step) => step,
                None => {
                    logs.push(StepLog {
                        step_id: step_id.clone(),
                        success: false,
                        detail: Some("step not found".to_string()),
                    });
                    return ExecutionResult {
                        success: false,
                        steps: logs,
                        final_message,
                        error: Some(format!("step not found: {step_id}")),
                    };
                }
            };

            let outcome = self.run_step(step, connectors, ctx, audit).await;
            match outcome {
                StepOutcome::Advance { next, message } => {
                    logs.push(StepLog {
                        step_id: step.id.clone(),
                        success: true,
                        detail: message.clone(),
                    });
                    if message.is_some() {
                        final_message = message;
                    }
                    current = next;
                }
                StepOutcome::Fail { error } => {
                    logs.push(StepLog {
                        step_id: step.id.clone(),
                        success: false,
                        detail: Some(error.clone()),
                    });
                    warn!(procedure_id = %procedure.id, step_id = %step.id, error, "procedure.failed");
                    return ExecutionResult {
                        success: false,
                        steps: logs,
                        final_message,
                        error: Some(error),
                    };
                }
            }
        }

        ExecutionResult {
            success: true,
            steps: logs,
            final_message,
            error: None,
        }
    }

    async fn run_step(
        &self,
        step: &Step,
        connectors: &[DataConnector],
        ctx: &mut ExecutionContext,
        audit: &dyn AuditSink,
    ) -> StepOutcome {
        match step.kind {
            StepType::Message => self.run_message(step, ctx),
            StepType::ApiCall => self.run_api_call(step, connectors, ctx, "", audit).await,
            StepType::DataLookup => self.run_api_call(step, connectors, ctx, "GET", audit).await,
            StepType::Conditional => self.run_conditional(step, ctx),
            StepType::Approval => self.run_approval(step, ctx, audit),
        }
    }

    fn run_message(&self, step: &Step, ctx: &ExecutionContext) -> StepOutcome {
        let template = step
            .config
            .get("template")
            .or_else(|| step.config.get("message"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        let message = interpolate(template, &ctx.variables);
        StepOutcome::Advance {
            next: step.next_step_id.clone(),
            message: Some(message),
        }
    }

    fn run_conditional(&self, step: &Step, ctx: &ExecutionContext) -> StepOutcome {
        let condition = step.config.get("condition").and_then(Value::as_str).unwrap_or_default();
        let result = eval_condition(condition, &ctx.variables);
        let next = if result {
            step.config.get("trueStep").and_then(Value::as_str)
        } else {
            step.config.get("falseStep").and_then(Value::as_str)
        }
        .map(str::to_string);
        StepOutcome::Advance { next, message: None }
    }

    fn run_approval(&self, step: &Step, ctx: &ExecutionContext, audit: &dyn AuditSink) -> StepOutcome {
        if !ctx.dry_run {
            info!(step_id = %step.id, "approval.requested");
            audit.record_best_effort(
                &ctx.tenant_id,
                "approval.requested",
                serde_json::json!({"conversation_id": ctx.conversation_id, "step_id": step.id}),
            );
        }
        // A pending-approval queue is a future extension; this version
        // auto-approves after logging the request.
        StepOutcome::Advance {
            next: step.next_step_id.clone(),
            message: None,
        }
    }

    async fn run_api_call(
        &self,
        step: &Step,
        connectors: &[DataConnector],
        ctx: &mut ExecutionContext,
        force_method: &str,
        audit: &dyn AuditSink,
    ) -> StepOutcome {
        let connector_id = match step.config.get("connector_id").and_then(Value::as_str) {
            Some(id) => id,
            None => return StepOutcome::Fail { error: "missing connector_id".to_string() },
        };
        let endpoint_id = match step.config.get("endpoint_id").and_then(Value::as_str) {
            Some(id) => id,
            None => return StepOutcome::Fail { error: "missing endpoint_id".to_string() },
        };

        let connector = match connectors.iter().find(|c| c.id == connector_id) {
            Some(c) => c,
            None => return StepOutcome::Fail { error: format!("connector not found: {connector_id}") },
        };
        if connector.tenant_id != ctx.tenant_id {
            return StepOutcome::Fail {
                error: format!("connector {connector_id} belongs to a different tenant"),
            };
        }
        let endpoint = match connector.endpoint(endpoint_id) {
            Some(e) => e,
            None => return StepOutcome::Fail { error: format!("endpoint not found: {endpoint_id}") },
        };

        let method = if force_method.is_empty() { endpoint.method.as_str() } else { force_method };
        let (url, body_params) = build_url(connector, endpoint, &ctx.variables);

        if ctx.dry_run {
            info!(step_id = %step.id, connector_id, "connector.called (dry run)");
            audit.record_best_effort(
                &ctx.tenant_id,
                "connector.called",
                serde_json::json!({"conversation_id": ctx.conversation_id, "connector_id": connector_id, "dry_run": true}),
            );
            return StepOutcome::Advance { next: step.next_step_id.clone(), message: None };
        }

        let mut request = self
            .http
            .request(method.parse().unwrap_or(reqwest::Method::GET), &url)
            .header("Content-Type", "application/json");
        request = apply_auth(request, connector);

        let is_get = method.eq_ignore_ascii_case("GET");
        if is_get {
            request = request.query(&body_params);
        } else {
            request = request.json(&body_params);
        }

        let response = match request.send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(step_id = %step.id, connector_id, error = %e, "connector.error");
                audit.record_best_effort(
                    &ctx.tenant_id,
                    "connector.error",
                    serde_json::json!({"conversation_id": ctx.conversation_id, "connector_id": connector_id, "error": e.to_string()}),
                );
                return StepOutcome::Fail { error: e.to_string() };
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(step_id = %step.id, connector_id, %status, "connector.error");
            audit.record_best_effort(
                &ctx.tenant_id,
                "connector.error",
                serde_json::json!({"conversation_id": ctx.conversation_id, "connector_id": connector_id, "status": status.as_u16()}),
            );
            return StepOutcome::Fail { error: format!("connector returned status {status}") };
        }

        let body: Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                warn!(step_id = %step.id, connector_id, error = %e, "connector.error");
                audit.record_best_effort(
                    &ctx.tenant_id,
                    "connector.error",
                    serde_json::json!({"conversation_id": ctx.conversation_id, "connector_id": connector_id, "error": e.to_string()}),
                );
                return StepOutcome::Fail { error: e.to_string() };
            }
        };

        for (json_path, var_name) in &endpoint.response_mapping {
            if let Some(value) = get_json_path(&body, json_path) {
                set_nested(&mut ctx.variables, var_name, value);
            }
        }

        info!(step_id = %step.id, connector_id, "connector.called");
        audit.record_best_effort(
            &ctx.tenant_id,
            "connector.called",
            serde_json::json!({"conversation_id": ctx.conversation_id, "connector_id": connector_id, "dry_run": false}),
        );
        StepOutcome::Advance { next: step.next_step_id.clone(), message: None }
    }
}

fn apply_auth(request: reqwest::RequestBuilder, connector: &DataConnector) -> reqwest::RequestBuilder {
    match connector.auth.kind {
        ConnectorAuthType::ApiKey => {
            let key = connector.auth.credentials.get("api_key").and_then(Value::as_str).unwrap_or_default();
            request.header("Authorization", format!("Bearer {key}"))
        }
        ConnectorAuthType::Basic => {
            let user = connector.auth.credentials.get("username").and_then(Value::as_str).unwrap_or_default();
            let pass = connector.auth.credentials.get("password").and_then(Value::as_str).unwrap_or_default();
            let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"));
            request.header("Authorization", format!("Basic {encoded}"))
        }
        ConnectorAuthType::OAuth => {
            let token = connector.auth.credentials.get("access_token").and_then(Value::as_str).unwrap_or_default();
            request.header("Authorization", format!("Bearer {token}"))
        }
    }
}

/// Builds the endpoint URL, substituting `{{name}}` tokens present in the
/// path template with URL-encoded interpolated values and returning the
/// declared params that were *not* consumed by the path as the remaining
/// query/body params (§4.3).
fn build_url(
    connector: &DataConnector,
    endpoint: &ConnectorEndpoint,
    variables: &HashMap<String, Value>,
) -> (String, HashMap<String, String>) {
    let mut path = endpoint.path_template.clone();
    let mut remaining = HashMap::new();

    for param in &endpoint.params {
        let token = format!("{{{{{param}}}}}");
        let resolved = interpolate(&token, variables);
        if path.contains(&token) {
            path = path.replace(&token, &urlencoding::encode(&resolved));
        } else {
            remaining.insert(param.clone(), resolved);
        }
    }

    (format!("{}{}", connector.auth.base_url.trim_end_matches('/'), path), remaining)
}

fn get_json_path(value: &Value, path: &str) -> Option<Value> {
    let mut current = value.clone();
    for segment in path.split('.') {
        current = current.get(segment)?.clone();
    }
    Some(current)
}

/// Writes `value` into `variables` under a possibly dotted name, creating
/// nested objects as needed (e.g. `order.total` nests under `order`).
fn set_nested(variables: &mut HashMap<String, Value>, name: &str, value: Value) {
    let mut segments = name.split('.');
    let root = match segments.next() {
        Some(r) => r,
        None => return,
    };
    let rest: Vec<&str> = segments.collect();
    if rest.is_empty() {
        variables.insert(root.to_string(), value);
        return;
    }

    let entry = variables.entry(root.to_string()).or_insert_with(|| Value::Object(Default::default()));
    let mut current = entry;
    for (i, segment) in rest.iter().enumerate() {
        if !current.is_object() {
            *current = Value::Object(Default::default());
        }
        if i == rest.len() - 1 {
            current.as_object_mut().unwrap().insert(segment.to_string(), value.clone());
        } else {
            current = current
                .as_object_mut()
                .unwrap()
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Default::default()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StepType, Trigger, TriggerType};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingAudit {
        events: Mutex<Vec<(String, String)>>,
    }

    impl AuditSink for RecordingAudit {
        fn record_best_effort(&self, tenant_id: &str, event_type: &str, _payload: serde_json::Value) {
            self.events.lock().unwrap().push((tenant_id.to_string(), event_type.to_string()));
        }
    }

    fn procedure_with_steps(steps: Vec<Step>) -> Procedure {
        Procedure {
            id: "p1".to_string(),
            tenant_id: "acme".to_string(),
            name: "test".to_string(),
            trigger: Trigger { kind: TriggerType::Manual, condition: String::new() },
            steps,
            enabled: true,
            version: 1,
        }
    }

    #[tokio::test]
    async fn message_step_interpolates_and_produces_final_message() {
        let steps = vec![Step {
            id: "s1".to_string(),
            kind: StepType::Message,
            config: serde_json::json!({"template": "hi {{name}}"}),
            next_step_id: None,
        }];
        let procedure = procedure_with_steps(steps);
        let mut ctx = ExecutionContext::new("acme", "conv1");
        ctx.variables.insert("name".to_string(), Value::String("Ada".into()));

        let executor = Executor::new(reqwest::Client::new());
        let audit = RecordingAudit::default();
        let result = executor.execute(&procedure, &[], &mut ctx, &audit).await;
        assert!(result.success);
        assert_eq!(result.final_message, Some("hi Ada".to_string()));
    }

    #[tokio::test]
    async fn conditional_step_branches_on_true_step() {
        let steps = vec![
            Step {
                id: "cond".to_string(),
                kind: StepType::Conditional,
                config: serde_json::json!({"condition": "{{score}} > 50", "trueStep": "yes", "falseStep": "no"}),
                next_step_id: None,
            },
            Step {
                id: "yes".to_string(),
                kind: StepType::Message,
                config: serde_json::json!({"template": "passed"}),
                next_step_id: None,
            },
            Step {
                id: "no".to_string(),
                kind: StepType::Message,
                config: serde_json::json!({"template": "failed"}),
                next_step_id: None,
            },
        ];
        let procedure = procedure_with_steps(steps);
        let mut ctx = ExecutionContext::new("acme", "conv1");
        ctx.variables.insert("score".to_string(), serde_json::json!(75));

        let executor = Executor::new(reqwest::Client::new());
        let audit = RecordingAudit::default();
        let result = executor.execute(&procedure, &[], &mut ctx, &audit).await;
        assert_eq!(result.final_message, Some("passed".to_string()));
    }

    #[tokio::test]
    async fn iteration_cap_terminates_a_cycle_successfully() {
        let steps = vec![Step {
            id: "loop".to_string(),
            kind: StepType::Conditional,
            config: serde_json::json!({"condition": "1 == 1", "trueStep": "loop", "falseStep": "loop"}),
            next_step_id: None,
        }];
        let procedure = procedure_with_steps(steps);
        let mut ctx = ExecutionContext::new("acme", "conv1");

        let executor = Executor::new(reqwest::Client::new());
        let audit = RecordingAudit::default();
        let result = executor.execute(&procedure, &[], &mut ctx, &audit).await;
        assert!(result.success);
        assert_eq!(result.steps.len() as u32, MAX_ITERATIONS);
    }

    #[tokio::test]
    async fn api_call_rejects_cross_tenant_connector() {
        let steps = vec![Step {
            id: "s1".to_string(),
            kind: StepType::ApiCall,
            config: serde_json::json!({"connector_id": "c1", "endpoint_id": "e1"}),
            next_step_id: None,
        }];
        let procedure = procedure_with_steps(steps);
        let mut ctx = ExecutionContext::new("acme", "conv1");
        let connector = DataConnector {
            id: "c1".to_string(),
            tenant_id: "other-tenant".to_string(),
            provider: "test".to_string(),
            auth: crate::types::ConnectorAuth {
                kind: ConnectorAuthType::ApiKey,
                credentials: serde_json::json!({}),
                base_url: "https://example.com".to_string(),
            },
            endpoints: vec![],
            enabled: true,
        };

        let executor = Executor::new(reqwest::Client::new());
        let audit = RecordingAudit::default();
        let result = executor.execute(&procedure, &[connector], &mut ctx, &audit).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn approval_step_records_audit_event() {
        let steps = vec![Step {
            id: "a1".to_string(),
            kind: StepType::Approval,
            config: serde_json::json!({}),
            next_step_id: None,
        }];
        let procedure = procedure_with_steps(steps);
        let mut ctx = ExecutionContext::new("acme", "conv1");

        let executor = Executor::new(reqwest::Client::new());
        let audit = RecordingAudit::default();
        let result = executor.execute(&procedure, &[], &mut ctx, &audit).await;
        assert!(result.success);
        let events = audit.events.lock().unwrap();
        assert!(events.iter().any(|(tenant, kind)| tenant == "acme" && kind == "approval.requested"));
    }
}
