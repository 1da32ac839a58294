use regex::Regex;
use tracing::warn;

use crate::types::{
    LengthConfig, PiiAction, PiiFilterConfig, PiiKind, Policy, PolicyKind, PolicyMode,
    ToneConfig, TopicFilterConfig, ValidationResult, Violation, UNCERTAINTY_LEXICON,
};

/// Evaluate every enabled policy of the given mode against `text`, in
/// priority-descending order (§4.2). A text passes only if every matching
/// policy passes.
pub fn validate(text: &str, policies: &[Policy], mode: PolicyMode) -> ValidationResult {
    let mut matching: Vec<&Policy> = policies
        .iter()
        .filter(|p| p.enabled && p.mode == mode)
        .collect();
    matching.sort_by(|a, b| b.priority.cmp(&a.priority));

    let mut violations = Vec::new();
    for policy in matching {
        if let Some(reason) = evaluate_policy(policy, text) {
            violations.push(Violation {
                policy_id: policy.id.clone(),
                policy_name: policy.name.clone(),
                reason,
            });
        }
    }

    ValidationResult {
        passed: violations.is_empty(),
        violations,
    }
}

/// Apply every enabled pre-phase `pii_filter` policy in redact mode,
/// replacing matches with `[REDACTED]` (pipeline step 4).
pub fn redact_pii(text: &str, policies: &[Policy]) -> String {
    let mut out = text.to_string();
    for policy in policies
        .iter()
        .filter(|p| p.enabled && p.mode == PolicyMode::Pre && p.kind == PolicyKind::PiiFilter)
    {
        let Some(config) = parse_pii_config(policy) else {
            continue;
        };
        if config.action != PiiAction::Redact {
            continue;
        }
        for kind in &config.detect {
            if let Some(re) = pii_regex(*kind) {
                out = re.replace_all(&out, "[REDACTED]").into_owned();
            }
        }
    }
    out
}

/// Evaluate a single policy, returning `Some(reason)` on its first violation
/// or `None` if it passes (or fails to parse — §4.2 "never itself become an
/// outage").
fn evaluate_policy(policy: &Policy, text: &str) -> Option<String> {
    match policy.kind {
        PolicyKind::TopicFilter => evaluate_topic_filter(policy, text),
        PolicyKind::PiiFilter => evaluate_pii_filter(policy, text),
        PolicyKind::Tone => evaluate_tone(policy, text),
        PolicyKind::Length => evaluate_length(policy, text),
    }
}

fn evaluate_topic_filter(policy: &Policy, text: &str) -> Option<String> {
    let config: TopicFilterConfig = parse_config(policy)?;
    let lowered = text.to_lowercase();

    for topic in &config.blocked_topics {
        if lowered.contains(&topic.to_lowercase()) {
            return Some(format!("blocked topic: {topic}"));
        }
    }

    if let Some(patterns) = &config.blocked_patterns {
        for pattern in patterns {
            match Regex::new(pattern) {
                Ok(re) => {
                    if re.is_match(text) {
                        return Some(format!("blocked pattern: {pattern}"));
                    }
                }
                Err(_) => {
                    // Invalid patterns are silently skipped (§4.2).
                    continue;
                }
            }
        }
    }

    None
}

fn evaluate_pii_filter(policy: &Policy, text: &str) -> Option<String> {
    let config = parse_pii_config(policy)?;
    if config.action != PiiAction::Block {
        return None;
    }
    for kind in &config.detect {
        if let Some(re) = pii_regex(*kind) {
            if re.is_match(text) {
                return Some(format!("detected PII: {kind:?}"));
            }
        }
    }
    None
}

fn evaluate_tone(policy: &Policy, text: &str) -> Option<String> {
    let config: ToneConfig = parse_config(policy)?;
    let lowered = text.to_lowercase();

    for phrase in &config.blocked_phrases {
        if lowered.contains(&phrase.to_lowercase()) {
            return Some(format!("blocked phrase: {phrase}"));
        }
    }

    if config.block_uncertain.unwrap_or(false) {
        for phrase in UNCERTAINTY_LEXICON {
            if lowered.contains(phrase) {
                return Some(format!("uncertain phrasing: {phrase}"));
            }
        }
    }

    None
}

fn evaluate_length(policy: &Policy, text: &str) -> Option<String> {
    let config: LengthConfig = parse_config(policy)?;
    let len = text.chars().count();

    if let Some(min) = config.min_length {
        if len < min {
            return Some(format!("text too short: {len} < {min}"));
        }
    }
    if let Some(max) = config.max_length {
        if len > max {
            return Some(format!("text too long: {len} > {max}"));
        }
    }

    None
}

/// Parse `policy.config` into `T`, logging and returning `None` on failure
/// rather than propagating an error — a malformed config is treated as a
/// non-matching (always-pass) policy (§4.2).
fn parse_config<T: serde::de::DeserializeOwned>(policy: &Policy) -> Option<T> {
    match serde_json::from_value(policy.config.clone()) {
        Ok(config) => Some(config),
        Err(e) => {
            warn!(policy_id = %policy.id, error = %e, "malformed policy config, treating as pass");
            None
        }
    }
}

fn parse_pii_config(policy: &Policy) -> Option<PiiFilterConfig> {
    parse_config(policy)
}

fn pii_regex(kind: PiiKind) -> Option<Regex> {
    let pattern = match kind {
        PiiKind::Email => r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
        PiiKind::Phone => r"\+?\d{1,3}?[-.\s]?\(?\d{2,4}\)?[-.\s]?\d{2,4}[-.\s]?\d{2,4}",
        PiiKind::Ssn => r"\d{3}-?\d{2}-?\d{4}",
        PiiKind::CreditCard => r"\d{4}[ -]\d{4}[ -]\d{4}[ -]\d{4}",
        PiiKind::IpAddress => r"\b(?:\d{1,3}\.){3}\d{1,3}\b",
    };
    Regex::new(pattern).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(kind: PolicyKind, mode: PolicyMode, config: serde_json::Value) -> Policy {
        Policy {
            id: "p1".to_string(),
            tenant_id: "acme".to_string(),
            name: "test".to_string(),
            kind,
            mode,
            config,
            enabled: true,
            priority: 0,
        }
    }

    #[test]
    fn topic_filter_blocks_substring_match() {
        let p = policy(
            PolicyKind::TopicFilter,
            PolicyMode::Pre,
            serde_json::json!({"blocked_topics": ["refunds"]}),
        );
        let result = validate("can I get a refund?", &[p], PolicyMode::Pre);
        assert!(!result.passed);
    }

    #[test]
    fn malformed_config_passes_with_warning() {
        let p = policy(
            PolicyKind::TopicFilter,
            PolicyMode::Pre,
            serde_json::json!("not an object"),
        );
        let result = validate("anything", &[p], PolicyMode::Pre);
        assert!(result.passed);
    }

    #[test]
    fn opposite_phase_is_ignored() {
        let p = policy(
            PolicyKind::Length,
            PolicyMode::Post,
            serde_json::json!({"max_length": 1}),
        );
        let result = validate("this is long", &[p], PolicyMode::Pre);
        assert!(result.passed);
    }

    #[test]
    fn redact_pii_replaces_email() {
        let p = policy(
            PolicyKind::PiiFilter,
            PolicyMode::Pre,
            serde_json::json!({"detect": ["email"], "action": "redact"}),
        );
        let out = redact_pii("contact me at a@b.com please", &[p]);
        assert_eq!(out, "contact me at [REDACTED] please");
    }

    #[test]
    fn tone_blocks_uncertain_phrasing() {
        let p = policy(
            PolicyKind::Tone,
            PolicyMode::Post,
            serde_json::json!({"block_uncertain": true}),
        );
        let result = validate("it might be the second option", &[p], PolicyMode::Post);
        assert!(!result.passed);
    }

    #[test]
    fn priority_order_does_not_affect_pass_fail_only_order() {
        let low = {
            let mut p = policy(
                PolicyKind::Length,
                PolicyMode::Pre,
                serde_json::json!({"max_length": 1000}),
            );
            p.priority = 1;
            p
        };
        let high = {
            let mut p = policy(
                PolicyKind::TopicFilter,
                PolicyMode::Pre,
                serde_json::json!({"blocked_topics": ["x"]}),
            );
            p.priority = 10;
            p
        };
        let result = validate("contains x here", &[low, high], PolicyMode::Pre);
        assert!(!result.passed);
        assert_eq!(result.violations[0].policy_name, "test");
    }
}
