//! Registration policy: precondition checks and the error taxonomy.
//!
//! Everything in this module is a pure function of already-loaded documents
//! and the current calendar day. The engine in `campus-events-runtime` loads
//! the documents, calls these checks, and only then touches the store.
//!
//! # Precondition order
//!
//! | Operation | Checks, first failure wins |
//! |-----------|----------------------------|
//! | register | event exists → registration required → not closed → not already a participant → user exists |
//! | unregister | event exists → not closed → is a participant |
//! | admin remove | event exists → is a participant |
//!
//! "Event exists" and "user exists" are checked by the engine since they need
//! a store round-trip.

use crate::entity_store::EntityStoreError;
use crate::types::{Event, EventId, UserId};
use chrono::NaiveDate;
use std::fmt;
use thiserror::Error;

/// Which document a `NotFound` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    /// An event document
    Event,
    /// A user document
    User,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Event => f.write_str("event"),
            Self::User => f.write_str("user"),
        }
    }
}

/// Why a state precondition failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    /// The event does not take registrations
    RegistrationNotRequired,
    /// Register attempted on a completed event
    RegistrationClosed,
    /// Unregister attempted on a completed event
    EventClosed,
    /// Unregister by a user who is not a participant
    NotRegistered,
    /// Administrative removal of a user who is not a participant
    UserNotRegistered,
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            Self::RegistrationNotRequired => "registration not required",
            Self::RegistrationClosed => "registration closed",
            Self::EventClosed => "cannot modify closed event",
            Self::NotRegistered => "not registered",
            Self::UserNotRegistered => "user not registered",
        };
        f.write_str(message)
    }
}

/// Engine operation, used in partial-failure reports and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Student registers
    Register,
    /// Student unregisters
    Unregister,
    /// Coordinator removes a participant
    AdminRemove,
    /// Event deletion with back-reference cleanup
    CascadeDelete,
    /// User account deletion with participant cleanup
    DeleteAccount,
}

impl Operation {
    /// Stable label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Unregister => "unregister",
            Self::AdminRemove => "admin_remove",
            Self::CascadeDelete => "cascade_delete",
            Self::DeleteAccount => "delete_account",
        }
    }

    /// Noun used in user-facing partial failure messages.
    const fn noun(self) -> &'static str {
        match self {
            Self::Register => "registration",
            Self::Unregister | Self::AdminRemove => "unregistration",
            Self::CascadeDelete => "event deletion",
            Self::DeleteAccount => "account deletion",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by registration operations.
///
/// Domain errors (`NotFound`, `InvalidOperation`, `Conflict`) mean nothing was
/// written. `StoreFailure` means the store failed and nothing is left
/// half-applied. `PartialFailure` is the one state where the two lists
/// disagree: the event side was committed, the user side could not be
/// written, and rolling back the event side failed too.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// Referenced event or user does not exist.
    #[error("{0} not found")]
    NotFound(Entity),

    /// Event state forbids the operation.
    #[error("{0}")]
    InvalidOperation(InvalidReason),

    /// Duplicate registration attempt.
    #[error("already registered")]
    Conflict,

    /// The store failed; nothing was left half-applied.
    #[error("store failure: {0}")]
    StoreFailure(EntityStoreError),

    /// Event side committed, user side not, rollback failed.
    #[error(
        "{} recorded on event {event_id} but not on user {user_id}; contact support ({source})",
        operation.noun()
    )]
    PartialFailure {
        /// Operation that was interrupted
        operation: Operation,
        /// Event whose participant list was changed
        event_id: EventId,
        /// User whose registration list could not be changed
        user_id: UserId,
        /// Last store error seen
        source: EntityStoreError,
    },
}

impl RegistrationError {
    /// HTTP-style status code for this error.
    ///
    /// `Conflict` maps to 400, not 409: duplicate registration is reported as
    /// an ordinary client error to match the existing API contract.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::InvalidOperation(_) | Self::Conflict => 400,
            Self::StoreFailure(_) | Self::PartialFailure { .. } => 500,
        }
    }

    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidOperation(_) => "INVALID_OPERATION",
            Self::Conflict => "ALREADY_REGISTERED",
            Self::StoreFailure(_) => "STORE_FAILURE",
            Self::PartialFailure { .. } => "PARTIAL_FAILURE",
        }
    }

    /// Whether the error is a domain outcome rather than an infrastructure failure.
    #[must_use]
    pub const fn is_domain(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::InvalidOperation(_) | Self::Conflict
        )
    }

    /// Short label for metrics.
    #[must_use]
    pub const fn outcome(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidOperation(_) => "invalid_operation",
            Self::Conflict => "conflict",
            Self::StoreFailure(_) => "store_failure",
            Self::PartialFailure { .. } => "partial_failure",
        }
    }
}

impl From<EntityStoreError> for RegistrationError {
    fn from(error: EntityStoreError) -> Self {
        Self::StoreFailure(error)
    }
}

/// Register preconditions 2-4 (event already loaded).
///
/// # Errors
///
/// - `InvalidOperation(RegistrationNotRequired)`
/// - `InvalidOperation(RegistrationClosed)`
/// - `Conflict` if the user is already a participant
pub fn check_register(
    event: &Event,
    user_id: UserId,
    today: NaiveDate,
) -> Result<(), RegistrationError> {
    if !event.registration_required {
        return Err(RegistrationError::InvalidOperation(
            InvalidReason::RegistrationNotRequired,
        ));
    }

    if event.is_closed_on(today) {
        return Err(RegistrationError::InvalidOperation(
            InvalidReason::RegistrationClosed,
        ));
    }

    if event.has_participant(user_id) {
        return Err(RegistrationError::Conflict);
    }

    Ok(())
}

/// Unregister preconditions 2-3 (event already loaded).
///
/// Same-day (`ongoing`) events can still be left.
///
/// # Errors
///
/// - `InvalidOperation(EventClosed)`
/// - `InvalidOperation(NotRegistered)`
pub fn check_unregister(
    event: &Event,
    user_id: UserId,
    today: NaiveDate,
) -> Result<(), RegistrationError> {
    if event.is_closed_on(today) {
        return Err(RegistrationError::InvalidOperation(
            InvalidReason::EventClosed,
        ));
    }

    if !event.has_participant(user_id) {
        return Err(RegistrationError::InvalidOperation(
            InvalidReason::NotRegistered,
        ));
    }

    Ok(())
}

/// Administrative removal precondition (event already loaded). No date check.
///
/// # Errors
///
/// - `InvalidOperation(UserNotRegistered)`
pub fn check_admin_remove(event: &Event, user_id: UserId) -> Result<(), RegistrationError> {
    if event.has_participant(user_id) {
        Ok(())
    } else {
        Err(RegistrationError::InvalidOperation(
            InvalidReason::UserNotRegistered,
        ))
    }
}
