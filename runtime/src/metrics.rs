//! Prometheus metrics for registration and consistency.
//!
//! Metric names:
//!
//! | Name | Kind | Labels |
//! |------|------|--------|
//! | `registration_operations_total` | counter | `operation`, `outcome` |
//! | `registration_operation_duration_seconds` | histogram | `operation` |
//! | `registration_repairs_total` | counter | `operation`, `result` |
//! | `registration_partial_failures_total` | counter | `operation` |
//! | `consistency_drift_detected_total` | counter | `kind` |
//! | `consistency_repairs_applied_total` | counter | `kind` |
//!
//! # Example
//!
//! ```rust,no_run
//! use campus_events_runtime::metrics::MetricsRecorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut recorder = MetricsRecorder::new();
//! recorder.install()?;
//!
//! // Later, from the /metrics handler
//! let text = recorder.render().unwrap_or_default();
//! # Ok(())
//! # }
//! ```

use campus_events_core::registration::Operation;
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Installs the global Prometheus recorder and renders its text output.
///
/// The server exposes the rendered text on its own `/metrics` route, so this
/// type does not bind a listener.
#[derive(Clone, Default)]
pub struct MetricsRecorder {
    handle: Option<PrometheusHandle>,
}

impl std::fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRecorder")
            .field("installed", &self.handle.is_some())
            .finish()
    }
}

impl MetricsRecorder {
    /// Create a recorder that has not been installed yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Register metric descriptions and install the global recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (several tests in one process),
    /// this logs a warning and leaves [`MetricsRecorder::render`] returning `None`.
    pub fn install(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Prometheus metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                if message.contains("already") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(message))
                }
            }
        }
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if this instance did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!(
        "registration_operations_total",
        "Registration engine operations by operation and outcome"
    );
    describe_histogram!(
        "registration_operation_duration_seconds",
        "Time taken by registration engine operations"
    );
    describe_counter!(
        "registration_repairs_total",
        "Retries and compensations run to keep both membership lists in step"
    );
    describe_counter!(
        "registration_partial_failures_total",
        "Operations that left the event and user lists out of step"
    );
    describe_counter!(
        "consistency_drift_detected_total",
        "Drift findings reported by the consistency audit"
    );
    describe_counter!(
        "consistency_repairs_applied_total",
        "Drift findings fixed by the consistency audit"
    );
}

/// Registration engine metrics recorder.
pub struct RegistrationMetrics;

impl RegistrationMetrics {
    /// Record a finished operation.
    pub fn record_operation(operation: Operation, outcome: &'static str, duration: Duration) {
        counter!(
            "registration_operations_total",
            "operation" => operation.as_str(),
            "outcome" => outcome
        )
        .increment(1);
        histogram!(
            "registration_operation_duration_seconds",
            "operation" => operation.as_str()
        )
        .record(duration.as_secs_f64());
    }

    /// Record a repair step: `result` is `retried`, `compensated` or `failed`.
    pub fn record_repair(operation: Operation, result: &'static str) {
        counter!(
            "registration_repairs_total",
            "operation" => operation.as_str(),
            "result" => result
        )
        .increment(1);
    }

    /// Record a partial failure.
    pub fn record_partial_failure(operation: Operation) {
        counter!(
            "registration_partial_failures_total",
            "operation" => operation.as_str()
        )
        .increment(1);
    }
}

/// Consistency audit metrics recorder.
pub struct AuditMetrics;

impl AuditMetrics {
    /// Record findings of one kind.
    pub fn record_drift(kind: &'static str, count: usize) {
        if count > 0 {
            counter!("consistency_drift_detected_total", "kind" => kind)
                .increment(count as u64);
        }
    }

    /// Record fixes of one kind.
    pub fn record_repaired(kind: &'static str, count: usize) {
        if count > 0 {
            counter!("consistency_repairs_applied_total", "kind" => kind)
                .increment(count as u64);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn new_recorder_renders_nothing() {
        let recorder = MetricsRecorder::new();
        assert!(recorder.render().is_none());
    }

    #[test]
    fn install_then_record() {
        let mut recorder = MetricsRecorder::new();
        recorder.install().unwrap();

        RegistrationMetrics::record_operation(Operation::Register, "ok", Duration::from_millis(3));
        RegistrationMetrics::record_repair(Operation::Register, "retried");
        AuditMetrics::record_drift("orphaned_participant", 2);

        // Another test in this process may own the recorder
        if let Some(rendered) = recorder.render() {
            assert!(rendered.contains("registration_operations_total"));
            assert!(rendered.contains("consistency_drift_detected_total"));
        }
    }
}
