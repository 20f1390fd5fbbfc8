use common_metrics::MetricsRegistry;

use crate::state::LifecycleState;

pub(crate) const METRIC_STATE: &str = "lifecycle_state";
pub(crate) const METRIC_SHUTDOWN_INITIATED: &str = "lifecycle_shutdown_initiated_total";
pub(crate) const METRIC_SHUTDOWN_COMPLETED: &str = "lifecycle_shutdown_completed_total";

pub(crate) fn emit_state(registry: &MetricsRegistry, state: LifecycleState) {
    registry.set_gauge(METRIC_STATE, &[], state.gauge_value());
}

pub(crate) fn emit_shutdown_initiated(registry: &MetricsRegistry, trigger: &str) {
    registry.increment_counter(METRIC_SHUTDOWN_INITIATED, &[("trigger", trigger.to_string())]);
}

pub(crate) fn emit_shutdown_completed(registry: &MetricsRegistry, clean: bool) {
    registry.increment_counter(METRIC_SHUTDOWN_COMPLETED, &[("clean", clean.to_string())]);
}
