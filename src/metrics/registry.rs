//! Prometheus metrics for the SSP operator
//!
//! # Exported metrics
//! - `ssp_operator_reconcile_total` (counter): reconcile attempts labeled by controller.
//! - `ssp_operator_reconcile_errors_total` (counter): reconcile errors labeled by controller and kind.
//! - `ssp_operator_reconcile_duration_seconds` (histogram): reconcile duration labeled by controller.

use std::sync::atomic::AtomicU64;

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

/// Labels for operator reconcile metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ReconcileLabels {
    /// Controller name, e.g. "ssp"
    pub controller: String,
}

/// Labels for operator error metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    pub controller: String,
    /// Error kind/category, e.g. "kube", "serialization"
    pub kind: String,
}

fn reconcile_histogram() -> Histogram {
    // 1ms .. ~32s across 16 buckets.
    Histogram::new(exponential_buckets(0.001, 2.0, 16))
}

/// Metric handles shared by the components that populate them
#[derive(Clone)]
pub struct OperatorMetrics {
    pub reconcile_total: Family<ReconcileLabels, Counter<u64, AtomicU64>>,
    pub reconcile_errors_total: Family<ErrorLabels, Counter<u64, AtomicU64>>,
    pub reconcile_duration_seconds: Family<ReconcileLabels, Histogram, fn() -> Histogram>,
}

impl Default for OperatorMetrics {
    fn default() -> Self {
        Self {
            reconcile_total: Family::default(),
            reconcile_errors_total: Family::default(),
            reconcile_duration_seconds: Family::new_with_constructor(reconcile_histogram),
        }
    }
}

impl OperatorMetrics {
    /// Create the handles and register them under the `ssp_operator` prefix
    pub fn register(registry: &mut Registry) -> Self {
        let metrics = Self::default();
        let sub = registry.sub_registry_with_prefix("ssp_operator");

        sub.register(
            "reconcile",
            "Total number of reconcile attempts",
            metrics.reconcile_total.clone(),
        );
        sub.register(
            "reconcile_errors",
            "Total number of reconcile errors",
            metrics.reconcile_errors_total.clone(),
        );
        sub.register(
            "reconcile_duration_seconds",
            "Duration of reconcile loops in seconds",
            metrics.reconcile_duration_seconds.clone(),
        );

        metrics
    }

    pub fn inc_reconcile(&self, controller: &str) {
        self.reconcile_total
            .get_or_create(&ReconcileLabels {
                controller: controller.to_string(),
            })
            .inc();
    }

    pub fn inc_reconcile_error(&self, controller: &str, kind: &str) {
        self.reconcile_errors_total
            .get_or_create(&ErrorLabels {
                controller: controller.to_string(),
                kind: kind.to_string(),
            })
            .inc();
    }

    pub fn observe_reconcile_duration_seconds(&self, controller: &str, seconds: f64) {
        self.reconcile_duration_seconds
            .get_or_create(&ReconcileLabels {
                controller: controller.to_string(),
            })
            .observe(seconds);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus_client::encoding::text::encode;

    #[test]
    fn test_registered_metrics_are_encoded() {
        let mut registry = Registry::default();
        let metrics = OperatorMetrics::register(&mut registry);

        metrics.inc_reconcile("ssp");
        metrics.inc_reconcile("ssp");
        metrics.inc_reconcile_error("ssp", "kube");
        metrics.observe_reconcile_duration_seconds("ssp", 0.25);

        let mut buffer = String::new();
        encode(&mut buffer, &registry).unwrap();

        assert!(buffer.contains("ssp_operator_reconcile_total{controller=\"ssp\"} 2"));
        assert!(buffer
            .contains("ssp_operator_reconcile_errors_total{controller=\"ssp\",kind=\"kube\"} 1"));
        assert!(buffer.contains("ssp_operator_reconcile_duration_seconds_count"));
    }

    #[test]
    fn test_clones_share_state() {
        let mut registry = Registry::default();
        let metrics = OperatorMetrics::register(&mut registry);
        let clone = metrics.clone();

        clone.inc_reconcile("ssp");
        let value = metrics
            .reconcile_total
            .get_or_create(&ReconcileLabels {
                controller: "ssp".to_string(),
            })
            .get();
        assert_eq!(value, 1);
    }
}
