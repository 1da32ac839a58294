use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Keyword,
    Intent,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    #[serde(rename = "type")]
    pub kind: TriggerType,
    pub condition: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Message,
    ApiCall,
    DataLookup,
    Conditional,
    Approval,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: StepType,
    pub config: serde_json::Value,
    pub next_step_id: Option<String>,
}

/// {id, tenantId, name, trigger, steps, enabled, version} (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Procedure {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub trigger: Trigger,
    pub steps: Vec<Step>,
    pub enabled: bool,
    pub version: u32,
}

impl Procedure {
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorAuthType {
    OAuth,
    ApiKey,
    Basic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorAuth {
    #[serde(rename = "type")]
    pub kind: ConnectorAuthType,
    pub credentials: serde_json::Value,
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorEndpoint {
    pub id: String,
    pub method: String,
    pub path_template: String,
    pub params: Vec<String>,
    /// JSON-path (dot-separated) -> variable name to write the resolved value into.
    pub response_mapping: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConnector {
    pub id: String,
    pub tenant_id: String,
    pub provider: String,
    pub auth: ConnectorAuth,
    pub endpoints: Vec<ConnectorEndpoint>,
    pub enabled: bool,
}

impl DataConnector {
    pub fn endpoint(&self, id: &str) -> Option<&ConnectorEndpoint> {
        self.endpoints.iter().find(|e| e.id == id)
    }
}

/// Execution context threaded through the whole procedure run (§4.3).
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub tenant_id: String,
    pub conversation_id: String,
    pub user_id: Option<String>,
    pub variables: HashMap<String, serde_json::Value>,
    pub dry_run: bool,
}

impl ExecutionContext {
    pub fn new(tenant_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            conversation_id: conversation_id.into(),
            user_id: None,
            variables: HashMap::new(),
            dry_run: false,
        }
    }
}

/// What a single step produces, handed back to the executor loop (§4.3
/// "Executor implementation shape"). The loop owns all control flow;
/// handlers only report what happened.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    Advance {
        next: Option<String>,
        message: Option<String>,
    },
    Fail {
        error: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct StepLog {
    pub step_id: String,
    pub success: bool,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub steps: Vec<StepLog>,
    pub final_message: Option<String>,
    pub error: Option<String>,
}
