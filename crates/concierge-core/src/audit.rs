/// Sink for durable audit events (§3 "Audit Event"), implemented by
/// `concierge-persistence`'s `AuditStore`. Lives here rather than in
/// `concierge-persistence` itself so that crates which cannot depend on
/// persistence without introducing a cycle — `concierge-procedures` is
/// depended on *by* `concierge-persistence` — can still emit audit events
/// through a shared seam instead of only logging them.
pub trait AuditSink: Send + Sync {
    /// Record an event, swallowing any write failure rather than
    /// propagating it — the call site that triggered the event must never
    /// fail because audit logging did.
    fn record_best_effort(&self, tenant_id: &str, event_type: &str, payload: serde_json::Value);
}
