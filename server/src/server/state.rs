//! Application state for the Campus Events HTTP server.

use axum::extract::FromRef;
use campus_events_core::entity_store::EntityStore;
use campus_events_core::environment::Clock;
use campus_events_runtime::metrics::MetricsRecorder;
use campus_events_runtime::{ConsistencyAuditor, RegistrationEngine, RetryPolicy, RosterQuery};
use std::sync::Arc;

/// Shared handler state. Cheap to clone; every service shares one store.
#[derive(Clone)]
pub struct AppState {
    /// Entity store, for plain document reads and writes
    pub store: Arc<dyn EntityStore>,
    /// Clock used for derived status and timestamps
    pub clock: Arc<dyn Clock>,
    /// Registration engine
    pub engine: RegistrationEngine,
    /// Roster queries
    pub roster: RosterQuery,
    /// Consistency audit
    pub auditor: ConsistencyAuditor,
    /// Prometheus recorder backing `/metrics`
    pub metrics: MetricsRecorder,
}

impl AppState {
    /// Wire every service over one store and clock.
    #[must_use]
    pub fn new(
        store: Arc<dyn EntityStore>,
        clock: Arc<dyn Clock>,
        repair_policy: RetryPolicy,
        metrics: MetricsRecorder,
    ) -> Self {
        Self {
            engine: RegistrationEngine::with_repair_policy(
                Arc::clone(&store),
                Arc::clone(&clock),
                repair_policy,
            ),
            roster: RosterQuery::new(Arc::clone(&store)),
            auditor: ConsistencyAuditor::new(Arc::clone(&store)),
            store,
            clock,
            metrics,
        }
    }
}

// Lets the shared readiness handler pull the store out of AppState
impl FromRef<AppState> for Arc<dyn EntityStore> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.store)
    }
}
