//! # Campus Events Testing
//!
//! Testing utilities for Campus Events.
//!
//! This crate provides:
//! - [`InMemoryEntityStore`]: `HashMap`-backed store with fault injection
//! - Clocks with a pinned or manually advanced "now"
//! - Fixture builders for events and users
//! - proptest strategies for domain enums
//!
//! ## Example
//!
//! ```
//! use campus_events_core::entity_store::EntityStore;
//! use campus_events_testing::{fixtures, test_clock, InMemoryEntityStore};
//!
//! # block_on(async {
//! let clock = test_clock();
//! let store = InMemoryEntityStore::new();
//! let event = fixtures::event_in_days(&clock, 3);
//! let student = fixtures::student("Ravi", &clock);
//! store.put_event(event.clone());
//! store.put_user(student.clone());
//!
//! let outcome = store.add_participant(event.id, student.id).await.unwrap();
//! assert!(outcome.is_applied());
//! # });
//! # fn block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use chrono::{DateTime, Duration, Utc};
use campus_events_core::environment::Clock;

mod in_memory_store;

pub use in_memory_store::{InMemoryEntityStore, StoreOperation};

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Duration, Utc};
    use std::sync::{Arc, RwLock};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use campus_events_testing::mocks::FixedClock;
    /// use campus_events_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when a test tells it to.
    ///
    /// Clones share the same time, so a test can keep one handle and give
    /// another to the engine.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Start at the given time.
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
            }
        }

        /// Move the clock forward.
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.write().unwrap_or_else(std::sync::PoisonError::into_inner);
            *time += by;
        }

        /// Jump to an absolute time.
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.write().unwrap_or_else(std::sync::PoisonError::into_inner) = to;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.read().unwrap_or_else(std::sync::PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 09:00:00 UTC)
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp fails to parse, which cannot happen.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T09:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Builders for documents used across test suites.
///
/// Dates are relative to the clock passed in, so "3 days from now" stays
/// upcoming regardless of when the suite runs.
pub mod fixtures {
    use super::{Clock, Duration};
    use campus_events_core::types::{Category, Event, Role, User, UserId, Year};

    /// Upcoming event, `days` after the clock's current day (negative for past events).
    #[must_use]
    pub fn event_in_days(clock: &dyn Clock, days: i64) -> Event {
        let now = clock.now();
        Event::new(
            format!("Event {days}"),
            Category::Workshop,
            now + Duration::days(days),
            UserId::new(),
            now,
        )
    }

    /// Event that does not take registrations.
    #[must_use]
    pub fn open_event(clock: &dyn Clock) -> Event {
        let mut event = event_in_days(clock, 7);
        event.name = "Open Air Concert".to_string();
        event.category = Category::Festival;
        event.registration_required = false;
        event
    }

    /// Second-year student. Email is derived from the name.
    #[must_use]
    pub fn student(name: &str, clock: &dyn Clock) -> User {
        let email = format!("{}@college.edu", name.to_lowercase().replace(' ', "."));
        User::new(name, &email, Role::Student, Some(Year::Second), clock.now())
    }

    /// Coordinator account.
    #[must_use]
    pub fn coordinator(name: &str, clock: &dyn Clock) -> User {
        let email = format!("{}@staff.college.edu", name.to_lowercase().replace(' ', "."));
        User::new(name, &email, Role::Coordinator, None, clock.now())
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use campus_events_core::types::{Category, Role, Year};
    use proptest::prelude::*;

    /// Any category.
    pub fn arb_category() -> impl Strategy<Value = Category> {
        proptest::sample::select(Category::ALL.to_vec())
    }

    /// Any year of study.
    pub fn arb_year() -> impl Strategy<Value = Year> {
        prop_oneof![
            Just(Year::First),
            Just(Year::Second),
            Just(Year::Third),
            Just(Year::Fourth),
        ]
    }

    /// Any role.
    pub fn arb_role() -> impl Strategy<Value = Role> {
        prop_oneof![Just(Role::Student), Just(Role::Coordinator), Just(Role::Admin)]
    }
}

/// Route `tracing` output to the test harness. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{FixedClock, ManualClock, test_clock};
