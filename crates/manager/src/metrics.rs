//! Counters emitted by the coordinators. The exporter is installed by the
//! binary; without one these calls are no-ops.

use metrics::counter;

pub const RUNS_CREATED_TOTAL: &str = "pipeline_runs_created_total";
pub const RUNS_RETRIED_TOTAL: &str = "pipeline_runs_retried_total";

pub(crate) fn record_run_created(namespace: &str) {
    counter!(RUNS_CREATED_TOTAL, "namespace" => namespace.to_string()).increment(1);
}

pub(crate) fn record_run_retried(namespace: &str) {
    counter!(RUNS_RETRIED_TOTAL, "namespace" => namespace.to_string()).increment(1);
}
