use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::IdentifierError;
use crate::family::SequenceKey;

/// Prometheus counters for identifier allocation.
#[derive(Clone)]
pub struct AllocationMetrics {
    registry: Registry,
    allocations: IntCounterVec,
    failures: IntCounterVec,
}

impl AllocationMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let allocations = IntCounterVec::new(
            Opts::new(
                "identifiers_allocated_total",
                "Identifiers handed out, by family and type code",
            ),
            &["family", "type_code"],
        )?;
        let failures = IntCounterVec::new(
            Opts::new(
                "identifier_allocation_failures_total",
                "Failed allocation attempts, by error kind",
            ),
            &["kind"],
        )?;

        registry.register(Box::new(allocations.clone()))?;
        registry.register(Box::new(failures.clone()))?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(AllocationMetrics {
            registry,
            allocations,
            failures,
        })
    }

    pub fn record_allocation(&self, key: &SequenceKey) {
        let type_code = key.type_code().map(|t| t.code()).unwrap_or("none");
        self.allocations
            .with_label_values(&[key.family().as_str(), type_code])
            .inc();
    }

    pub fn record_failure(&self, err: &IdentifierError) {
        self.failures.with_label_values(&[err.kind()]).inc();
    }

    /// Text exposition format of every registered metric.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::family::TypeCode;

    #[test]
    fn test_render_includes_recorded_values() {
        let metrics = AllocationMetrics::new().unwrap();
        metrics.record_allocation(&SequenceKey::typed(TypeCode::Savings));
        metrics.record_allocation(&SequenceKey::typed(TypeCode::Savings));
        metrics.record_failure(&IdentifierError::StoreUnavailable("down".to_string()));

        let output = metrics.render().unwrap();
        assert!(output.contains(
            r#"identifiers_allocated_total{family="account",type_code="SB"} 2"#
        ));
        assert!(output.contains(
            r#"identifier_allocation_failures_total{kind="store_unavailable"} 1"#
        ));
    }
}
