//! Entity store trait and related types.
//!
//! The store persists `Event` and `User` documents. Beyond plain get/list/insert
//! it exposes four **atomic set primitives**, one per direction of the
//! membership relation:
//!
//! - [`add_participant`](EntityStore::add_participant) / [`remove_participant`](EntityStore::remove_participant)
//!   on `Event.participants`
//! - [`add_registered_event`](EntityStore::add_registered_event) / [`remove_registered_event`](EntityStore::remove_registered_event)
//!   on `User.registered_events`
//!
//! Duplicate collapse and the two fan-out removals follow the same rule.
//!
//! Each primitive must be a single conditional update inside the store
//! ("add to set if absent", "remove if present"), never a load/modify/save done
//! by the caller. Two concurrent `add_participant` calls for the same pair must
//! see exactly one [`SetMutation::Applied`].
//!
//! # Implementations
//!
//! - `PostgresEntityStore` (in `campus-events-postgres`): production
//! - `InMemoryEntityStore` (in `campus-events-testing`): fast, deterministic tests
//!
//! # Dyn Compatibility
//!
//! Methods return `Pin<Box<dyn Future>>` instead of using `async fn` so the
//! engine can hold an `Arc<dyn EntityStore>` and move it into spawned tasks.

use crate::types::{Category, Event, EventId, EventUpdate, User, UserId, UserUpdate};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by every store method.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, EntityStoreError>> + Send + 'a>>;

/// Errors that can occur during entity store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntityStoreError {
    /// Database connection or query error.
    #[error("Database error: {0}")]
    Database(String),

    /// A stored document could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Another user already owns this email.
    #[error("Email already registered: {0}")]
    DuplicateEmail(String),

    /// The store refused the call without touching data (injected faults,
    /// closed pools, aborted background tasks).
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl EntityStoreError {
    /// Whether retrying the same call could succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Unavailable(_))
    }
}

/// Outcome of an atomic set mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetMutation<T> {
    /// The set changed; carries the document as stored after the change.
    Applied(T),
    /// The set was already in the requested state. Nothing was written.
    Unchanged,
    /// The owning document does not exist.
    Missing,
}

impl<T> SetMutation<T> {
    /// Whether this call changed the set.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    /// Whether the owning document was absent.
    #[must_use]
    pub const fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }
}

/// Filter for [`EntityStore::list_events`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventFilter {
    /// Only events in this category
    pub category: Option<Category>,
}

/// Entity store abstraction for events and users.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one instance is shared by every
/// request handler and by the engine's detached commit tasks.
pub trait EntityStore: Send + Sync {
    /// Load an event by id. `None` if it does not exist.
    fn find_event(&self, event_id: EventId) -> StoreFuture<'_, Option<Event>>;

    /// Load a user by id. `None` if it does not exist.
    fn find_user(&self, user_id: UserId) -> StoreFuture<'_, Option<User>>;

    /// Load several users. Ids that do not resolve are silently absent from
    /// the result; order of the result is unspecified.
    fn find_users(&self, user_ids: Vec<UserId>) -> StoreFuture<'_, Vec<User>>;

    /// List events matching the filter, newest date first.
    fn list_events(&self, filter: EventFilter) -> StoreFuture<'_, Vec<Event>>;

    /// List every user. Used by the consistency audit.
    fn list_users(&self) -> StoreFuture<'_, Vec<User>>;

    /// Persist a new event.
    ///
    /// # Errors
    ///
    /// - `Database`: the insert failed (including a duplicate id)
    fn insert_event(&self, event: Event) -> StoreFuture<'_, ()>;

    /// Persist a new user.
    ///
    /// # Errors
    ///
    /// - `DuplicateEmail`: another user already has this email
    /// - `Database`: the insert failed
    fn insert_user(&self, user: User) -> StoreFuture<'_, ()>;

    /// Apply a descriptive update stamped with `now`. Never writes `participants`.
    /// Returns the updated event, or `None` if it does not exist.
    fn update_event_details(
        &self,
        event_id: EventId,
        update: EventUpdate,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<Event>>;

    /// Apply a profile update. Never writes `registered_events`.
    /// Returns the updated user, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// - `DuplicateEmail`: the new email belongs to another user
    fn update_user_profile(
        &self,
        user_id: UserId,
        update: UserUpdate,
    ) -> StoreFuture<'_, Option<User>>;

    /// Delete an event document. Returns whether a document was removed.
    fn delete_event(&self, event_id: EventId) -> StoreFuture<'_, bool>;

    /// Delete a user document. Returns whether a document was removed.
    fn delete_user(&self, user_id: UserId) -> StoreFuture<'_, bool>;

    /// Atomically add `user_id` to the event's participants if absent.
    fn add_participant(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> StoreFuture<'_, SetMutation<Event>>;

    /// Atomically remove every occurrence of `user_id` from the event's participants.
    fn remove_participant(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> StoreFuture<'_, SetMutation<Event>>;

    /// Atomically add `event_id` to the user's registered events if absent.
    fn add_registered_event(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> StoreFuture<'_, SetMutation<User>>;

    /// Atomically remove every occurrence of `event_id` from the user's registered events.
    fn remove_registered_event(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> StoreFuture<'_, SetMutation<User>>;

    /// Atomically drop every occurrence of `user_id` after the first from the
    /// event's participants. `Unchanged` when it appears at most once.
    fn collapse_participant_duplicates(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> StoreFuture<'_, SetMutation<Event>>;

    /// Atomically drop every occurrence of `event_id` after the first from the
    /// user's registered events. `Unchanged` when it appears at most once.
    fn collapse_registration_duplicates(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> StoreFuture<'_, SetMutation<User>>;

    /// Remove `event_id` from every user's registered events.
    /// Returns the number of user documents changed.
    fn remove_event_from_all_users(&self, event_id: EventId) -> StoreFuture<'_, u64>;

    /// Remove `user_id` from every event's participants.
    /// Returns the number of event documents changed.
    fn remove_user_from_all_events(&self, user_id: UserId) -> StoreFuture<'_, u64>;

    /// Cheap connectivity check for the readiness endpoint.
    fn ping(&self) -> StoreFuture<'_, ()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_email_error_display() {
        let error = EntityStoreError::DuplicateEmail("a@b.edu".to_string());
        assert_eq!(error.to_string(), "Email already registered: a@b.edu");
    }

    #[test]
    fn only_infrastructure_errors_are_transient() {
        assert!(EntityStoreError::Unavailable("pool".into()).is_transient());
        assert!(EntityStoreError::Database("io".into()).is_transient());
        assert!(!EntityStoreError::DuplicateEmail("x".into()).is_transient());
        assert!(!EntityStoreError::Serialization("bad row".into()).is_transient());
    }

    #[test]
    fn set_mutation_predicates() {
        assert!(SetMutation::Applied(()).is_applied());
        assert!(!SetMutation::<()>::Unchanged.is_applied());
        assert!(SetMutation::<()>::Missing.is_missing());
    }
}
