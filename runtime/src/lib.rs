//! # Campus Events Runtime
//!
//! The imperative shell around `campus-events-core`.
//!
//! ## Core Components
//!
//! - **engine**: [`RegistrationEngine`] runs register, unregister, admin
//!   removal and cascade delete against an `EntityStore`, keeping both
//!   membership lists in step
//! - **roster**: [`RosterQuery`] for participant lists, CSV export and a
//!   user's registered events
//! - **audit**: [`ConsistencyAuditor`] finds and repairs drift
//! - **retry**: exponential backoff used for repairs
//! - **metrics**: Prometheus recorder and metric helpers
//!
//! ## Example
//!
//! ```
//! use campus_events_runtime::RegistrationEngine;
//! use campus_events_testing::{fixtures, test_clock, InMemoryEntityStore};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let clock = test_clock();
//! let store = InMemoryEntityStore::new();
//! let event = fixtures::event_in_days(&clock, 2);
//! let student = fixtures::student("Nila", &clock);
//! store.put_event(event.clone());
//! store.put_user(student.clone());
//!
//! let engine = RegistrationEngine::new(Arc::new(store.clone()), Arc::new(clock));
//! let updated = engine.register(event.id, student.id).await.unwrap();
//! assert_eq!(updated.participants, vec![student.id]);
//! # }
//! ```

/// Consistency audit
pub mod audit;

/// Registration engine
pub mod engine;

/// Prometheus metrics for observability
pub mod metrics;

/// Retry logic with exponential backoff
pub mod retry;

/// Roster queries
pub mod roster;

pub use audit::{ConsistencyAuditor, DriftReport, Membership, RepairSummary};
pub use engine::{AccountDeletionReport, CascadeReport, RegistrationEngine};
pub use retry::RetryPolicy;
pub use roster::{Roster, RosterEntry, RosterQuery};
