//! The out-of-scope `TelemetrySink` collaborator (§6 EXPANSION): a
//! non-blocking, injected sink for connection/routing/CASIL events. The
//! telemetry fan-out WebSocket itself is a non-goal; this trait is the seam
//! a real one would attach through.

use std::collections::VecDeque;
use std::sync::Mutex;

/// One observable event the core is willing to report, independent of
/// `tracing` (which is for operators; this is for a structured subscriber).
#[derive(Debug, Clone, serde::Serialize)]
pub struct TelemetryEvent {
    pub kind: &'static str,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub detail: serde_json::Value,
    pub at_ms: u64,
}

pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: TelemetryEvent);
}

/// Discards every event. The default when no sink is configured.
#[derive(Debug, Default)]
pub struct NoopTelemetrySink;

impl TelemetrySink for NoopTelemetrySink {
    fn emit(&self, _event: TelemetryEvent) {}
}

/// Retains the last `capacity` events in memory, for tests and local
/// inspection (`arqonbus-cli`'s `status` subcommand reads one of these).
pub struct RingTelemetrySink {
    events: Mutex<VecDeque<TelemetryEvent>>,
    capacity: usize,
}

impl RingTelemetrySink {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn snapshot(&self) -> Vec<TelemetryEvent> {
        let events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        events.iter().cloned().collect()
    }
}

impl TelemetrySink for RingTelemetrySink {
    fn emit(&self, event: TelemetryEvent) {
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: &'static str) -> TelemetryEvent {
        TelemetryEvent {
            kind,
            tenant_id: Some("t1".into()),
            client_id: None,
            detail: serde_json::json!({}),
            at_ms: 0,
        }
    }

    #[test]
    fn ring_evicts_oldest_past_capacity() {
        let sink = RingTelemetrySink::new(2);
        sink.emit(event("a"));
        sink.emit(event("b"));
        sink.emit(event("c"));
        let snapshot = sink.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].kind, "b");
        assert_eq!(snapshot[1].kind, "c");
    }

    #[test]
    fn noop_sink_never_panics() {
        NoopTelemetrySink.emit(event("x"));
    }
}
