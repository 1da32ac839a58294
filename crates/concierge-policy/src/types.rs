use serde::{Deserialize, Serialize};

/// When a policy is evaluated relative to the LLM call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyMode {
    Pre,
    Post,
}

/// The four policy kinds the engine understands. Selects which sum-typed
/// config `parse_config` deserializes `Policy::config` into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    TopicFilter,
    PiiFilter,
    Tone,
    Length,
}

/// A tenant's policy row, loaded once per request (pipeline step 2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub kind: PolicyKind,
    pub mode: PolicyMode,
    /// Opaque until parsed by `parse_config` — arrives from persistence as a
    /// JSON blob (§9's dynamic-configuration-blob guidance).
    pub config: serde_json::Value,
    pub enabled: bool,
    /// Higher value evaluated first.
    pub priority: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicFilterConfig {
    #[serde(default)]
    pub blocked_topics: Vec<String>,
    #[serde(default)]
    pub blocked_patterns: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiKind {
    Email,
    Phone,
    Ssn,
    CreditCard,
    IpAddress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiAction {
    Block,
    Redact,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PiiFilterConfig {
    #[serde(default)]
    pub detect: Vec<PiiKind>,
    pub action: PiiAction,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToneConfig {
    #[serde(default)]
    pub blocked_phrases: Vec<String>,
    #[serde(default)]
    pub block_uncertain: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LengthConfig {
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
}

/// A single policy's verdict on a piece of text. The first violation per
/// policy is reported (§4.2 "The first violation per policy is reported").
#[derive(Debug, Clone, Serialize)]
pub struct Violation {
    pub policy_id: String,
    pub policy_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub passed: bool,
    pub violations: Vec<Violation>,
}

/// Fixed uncertainty lexicon checked by the tone policy when
/// `block_uncertain` is set (§4.2).
pub const UNCERTAINTY_LEXICON: &[&str] = &[
    "i'm not sure",
    "i don't know",
    "i am not certain",
    "i cannot determine",
    "it might be",
    "possibly",
    "i think maybe",
];
