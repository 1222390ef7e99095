use tracing::{info, warn};

use crate::modules::events::models::AuditEvent;

/// Receiver for audit events emitted after a change is committed
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &AuditEvent);

    fn emit_all(&self, events: &[AuditEvent]) {
        for event in events {
            self.emit(event);
        }
    }
}

/// Writes events to the `audit` tracing target for an external collector
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &AuditEvent) {
        match serde_json::to_string(event) {
            Ok(payload) => info!(
                target: "audit",
                event = event.name(),
                agency_id = event.agency_id(),
                payload = %payload,
                "Audit event"
            ),
            Err(e) => warn!(
                target: "audit",
                event = event.name(),
                error = %e,
                "Failed to serialize audit event"
            ),
        }
    }
}
