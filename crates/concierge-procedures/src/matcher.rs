use crate::types::{Procedure, TriggerType};

/// `findMatching(tenantId, userMessage)`: returns the first enabled procedure
/// (scanned in storage order, i.e. the order `procedures` is given in) whose
/// trigger matches (§4.3). Callers are expected to have already fetched up
/// to 100 enabled procedures for the tenant.
pub fn find_matching<'a>(user_message: &str, procedures: &'a [Procedure]) -> Option<&'a Procedure> {
    let lowered = user_message.to_lowercase();
    procedures
        .iter()
        .filter(|p| p.enabled)
        .find(|p| trigger_matches(p, &lowered))
}

fn trigger_matches(procedure: &Procedure, lowered_message: &str) -> bool {
    match procedure.trigger.kind {
        TriggerType::Keyword => procedure
            .trigger
            .condition
            .split(',')
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .any(|k| lowered_message.contains(&k)),
        TriggerType::Intent => lowered_message.contains(&procedure.trigger.condition.to_lowercase()),
        TriggerType::Manual => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Trigger;

    fn procedure(trigger: Trigger, enabled: bool) -> Procedure {
        Procedure {
            id: "p1".to_string(),
            tenant_id: "acme".to_string(),
            name: "test".to_string(),
            trigger,
            steps: vec![],
            enabled,
            version: 1,
        }
    }

    #[test]
    fn keyword_trigger_matches_substring_case_insensitive() {
        let p = procedure(
            Trigger {
                kind: TriggerType::Keyword,
                condition: "refund, cancel".to_string(),
            },
            true,
        );
        assert!(find_matching("I want a REFUND please", &[p]).is_some());
    }

    #[test]
    fn disabled_procedure_never_matches() {
        let p = procedure(
            Trigger {
                kind: TriggerType::Keyword,
                condition: "refund".to_string(),
            },
            false,
        );
        assert!(find_matching("refund", &[p]).is_none());
    }

    #[test]
    fn manual_trigger_never_auto_matches() {
        let p = procedure(
            Trigger {
                kind: TriggerType::Manual,
                condition: String::new(),
            },
            true,
        );
        assert!(find_matching("anything", &[p]).is_none());
    }
}
