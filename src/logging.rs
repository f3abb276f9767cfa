//! Observability boundary
//!
//! The core never writes files, stderr, or metrics itself (spec.md §6). It
//! emits structured [`LogEvent`]s to an injected [`LogSink`]; the default
//! sink fans them out through `tracing`, the way the rest of this codebase
//! logs.

use std::sync::Arc;

/// Severity of a log event. `Security` is used for anomalies worth paging on
/// (currently: reorg detection) — everything else about state transitions
/// and payment creation is `Info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Security,
}

/// A single structured event emitted by the core.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub level: LogLevel,
    /// Short machine-stable event name, e.g. `"payment.created"`,
    /// `"payment.transition"`, `"payment.reorg_detected"`.
    pub event: &'static str,
    pub payment_id: String,
    pub message: String,
}

impl LogEvent {
    pub fn info(event: &'static str, payment_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Info,
            event,
            payment_id: payment_id.into(),
            message: message.into(),
        }
    }

    pub fn security(event: &'static str, payment_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Security,
            event,
            payment_id: payment_id.into(),
            message: message.into(),
        }
    }
}

/// Injection point for the core's observability boundary.
///
/// Implement this to route events into an external audit log or metrics
/// pipeline. [`TracingLogSink`] is the default and routes through `tracing`.
pub trait LogSink: Send + Sync {
    fn record(&self, event: LogEvent);
}

/// Default sink: routes every [`LogEvent`] through `tracing`'s structured
/// macros, `security`-level events at `warn!` so they stand out from routine
/// transition logging.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn record(&self, event: LogEvent) {
        match event.level {
            LogLevel::Info => {
                tracing::info!(
                    event = event.event,
                    payment_id = %event.payment_id,
                    "{}",
                    event.message
                );
            }
            LogLevel::Security => {
                tracing::warn!(
                    event = event.event,
                    payment_id = %event.payment_id,
                    security = true,
                    "{}",
                    event.message
                );
            }
        }
    }
}

/// A sink that drops every event. Useful for tests that don't want to
/// initialize a subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogSink;

impl LogSink for NullLogSink {
    fn record(&self, _event: LogEvent) {}
}

pub fn default_sink() -> Arc<dyn LogSink> {
    Arc::new(TracingLogSink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<LogEvent>>,
    }

    impl LogSink for RecordingSink {
        fn record(&self, event: LogEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[test]
    fn test_recording_sink_captures_events() {
        let sink = RecordingSink::default();
        sink.record(LogEvent::info("payment.created", "pay-1", "created"));
        sink.record(LogEvent::security("payment.reorg_detected", "pay-1", "reorg"));

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].level, LogLevel::Info);
        assert_eq!(events[1].level, LogLevel::Security);
    }

    #[test]
    fn test_null_sink_does_not_panic() {
        let sink = NullLogSink;
        sink.record(LogEvent::info("x", "pay-1", "msg"));
    }
}
