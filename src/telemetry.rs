/// Telemetry observer seam
///
/// The core never depends on a telemetry vendor; it talks to this pair of
/// traits and functions identically when the no-op implementation is
/// plugged in.
use std::sync::Arc;

use tracing::debug;

use crate::error::TradingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanStatus {
    Ok,
    Error,
}

/// One unit of observed work
pub trait Span: Send {
    fn set_attribute(&mut self, key: &str, value: &str);
    fn add_event(&mut self, message: &str);
    fn record_error(&mut self, error: &TradingError);
    fn set_status(&mut self, status: SpanStatus);
}

/// Factory for spans
pub trait Observer: Send + Sync {
    fn start_span(&self, name: &str) -> Box<dyn Span>;
}

/// Observer that observes nothing, the default
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

struct NullSpan;

impl Span for NullSpan {
    fn set_attribute(&mut self, _key: &str, _value: &str) {}
    fn add_event(&mut self, _message: &str) {}
    fn record_error(&mut self, _error: &TradingError) {}
    fn set_status(&mut self, _status: SpanStatus) {}
}

impl Observer for NullObserver {
    fn start_span(&self, _name: &str) -> Box<dyn Span> {
        Box::new(NullSpan)
    }
}

pub fn null_observer() -> Arc<dyn Observer> {
    Arc::new(NullObserver)
}

/// Observer that forwards span activity to the `tracing` logs
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

struct TracingSpan {
    name: String,
}

impl Span for TracingSpan {
    fn set_attribute(&mut self, key: &str, value: &str) {
        debug!("[{}] {}={}", self.name, key, value);
    }

    fn add_event(&mut self, message: &str) {
        debug!("[{}] {}", self.name, message);
    }

    fn record_error(&mut self, error: &TradingError) {
        debug!("[{}] error {}: {}", self.name, error.error_code(), error);
    }

    fn set_status(&mut self, status: SpanStatus) {
        debug!("[{}] status={:?}", self.name, status);
    }
}

impl Observer for TracingObserver {
    fn start_span(&self, name: &str) -> Box<dyn Span> {
        Box::new(TracingSpan {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_observer_is_inert() {
        let observer = NullObserver;
        let mut span = observer.start_span("test");
        span.set_attribute("symbol", "AAPL");
        span.add_event("nothing happened");
        span.record_error(&TradingError::BrokerError("boom".to_string()));
        span.set_status(SpanStatus::Error);
    }
}
