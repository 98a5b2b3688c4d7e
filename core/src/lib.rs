//! # Campus Events Core
//!
//! Domain types and the pure half of the registration consistency contract.
//!
//! The crate is split along the "functional core, imperative shell" line:
//!
//! - **types**: `Event`, `User` and their identifiers, categories and roles
//! - **registration**: precondition checks (pure functions of an event, a user id
//!   and today's date) plus the error taxonomy every caller maps from
//! - **entity_store**: the persistence seam, with atomic set primitives for the
//!   two membership lists
//! - **environment**: injected dependencies such as the [`Clock`](environment::Clock)
//!
//! Nothing here performs I/O. The engine that drives the store lives in
//! `campus-events-runtime`.
//!
//! ## Cross-entity invariant
//!
//! ```text
//! for every user u and event e:
//!     u.id ∈ e.participants  ⇔  e.id ∈ u.registered_events
//! ```
//!
//! ## Example
//!
//! ```
//! use campus_events_core::registration::{check_register, InvalidReason, RegistrationError};
//! use campus_events_core::types::{Category, Event, UserId};
//! use chrono::{TimeZone, Utc};
//!
//! let creator = UserId::new();
//! let date = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
//! let mut event = Event::new("Hack Night", Category::Hackathon, date, creator, date);
//! event.registration_required = false;
//!
//! let today = date.date_naive();
//! let result = check_register(&event, UserId::new(), today);
//! assert!(matches!(
//!     result,
//!     Err(RegistrationError::InvalidOperation(InvalidReason::RegistrationNotRequired))
//! ));
//! ```

pub mod entity_store;
pub mod registration;
pub mod types;

// Re-export commonly used types
pub use chrono::{DateTime, NaiveDate, Utc};
pub use serde::{Deserialize, Serialize};

/// Environment module - Dependency injection traits
///
/// All time-dependent decisions (event status derivation in particular) go
/// through [`Clock`](environment::Clock) so tests can pin "today".
pub mod environment {
    use chrono::{DateTime, NaiveDate, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use campus_events_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// assert_eq!(clock.today(), clock.now().date_naive());
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;

        /// Current calendar day (UTC), the granularity event status works at.
        fn today(&self) -> NaiveDate {
            self.now().date_naive()
        }
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
