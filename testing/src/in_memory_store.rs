//! In-memory entity store for fast, deterministic testing.
//!
//! Both collections sit behind one lock, so every set primitive is atomic
//! with respect to every other call. Tests can also:
//!
//! - seed documents directly with [`InMemoryEntityStore::put_event`] /
//!   [`InMemoryEntityStore::put_user`], bypassing all invariants (used to
//!   build drifted states for the consistency audit)
//! - make the next N calls of a given [`StoreOperation`] fail with
//!   `EntityStoreError::Unavailable`
//! - count how often each operation was called

use campus_events_core::entity_store::{
    EntityStore, EntityStoreError, EventFilter, SetMutation, StoreFuture,
};
use campus_events_core::types::{Event, EventId, EventUpdate, User, UserId, UserUpdate};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Store method, used to target injected faults and read call counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    /// `find_event`
    FindEvent,
    /// `find_user`
    FindUser,
    /// `find_users`
    FindUsers,
    /// `list_events`
    ListEvents,
    /// `list_users`
    ListUsers,
    /// `insert_event`
    InsertEvent,
    /// `insert_user`
    InsertUser,
    /// `update_event_details`
    UpdateEventDetails,
    /// `update_user_profile`
    UpdateUserProfile,
    /// `delete_event`
    DeleteEvent,
    /// `delete_user`
    DeleteUser,
    /// `add_participant`
    AddParticipant,
    /// `remove_participant`
    RemoveParticipant,
    /// `add_registered_event`
    AddRegisteredEvent,
    /// `remove_registered_event`
    RemoveRegisteredEvent,
    /// `collapse_participant_duplicates`
    CollapseParticipantDuplicates,
    /// `collapse_registration_duplicates`
    CollapseRegistrationDuplicates,
    /// `remove_event_from_all_users`
    RemoveEventFromAllUsers,
    /// `remove_user_from_all_events`
    RemoveUserFromAllEvents,
    /// `ping`
    Ping,
}

#[derive(Debug, Default)]
struct Documents {
    events: HashMap<EventId, Event>,
    users: HashMap<UserId, User>,
}

/// `HashMap`-backed [`EntityStore`].
///
/// Clones share the same data, faults and counters.
#[derive(Clone, Debug, Default)]
pub struct InMemoryEntityStore {
    documents: Arc<RwLock<Documents>>,
    faults: Arc<Mutex<HashMap<StoreOperation, u32>>>,
    calls: Arc<Mutex<HashMap<StoreOperation, u32>>>,
}

impl InMemoryEntityStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an event document as-is.
    pub fn put_event(&self, event: Event) {
        self.write().events.insert(event.id, event);
    }

    /// Insert or replace a user document as-is.
    pub fn put_user(&self, user: User) {
        self.write().users.insert(user.id, user);
    }

    /// Snapshot of an event, bypassing fault injection.
    #[must_use]
    pub fn event(&self, event_id: EventId) -> Option<Event> {
        self.read().events.get(&event_id).cloned()
    }

    /// Snapshot of a user, bypassing fault injection.
    #[must_use]
    pub fn user(&self, user_id: UserId) -> Option<User> {
        self.read().users.get(&user_id).cloned()
    }

    /// Remove a user document directly (simulates a user deleted out of band).
    pub fn remove_user(&self, user_id: UserId) {
        self.write().users.remove(&user_id);
    }

    /// Fail the next `times` calls of `operation`.
    pub fn fail_next(&self, operation: StoreOperation, times: u32) {
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        *faults.entry(operation).or_insert(0) += times;
    }

    /// Fail every call of `operation` until [`InMemoryEntityStore::clear_faults`].
    pub fn fail_always(&self, operation: StoreOperation) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(operation, u32::MAX);
    }

    /// Drop all pending faults.
    pub fn clear_faults(&self) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// How many times `operation` was called, failed calls included.
    #[must_use]
    pub fn calls(&self, operation: StoreOperation) -> u32 {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&operation)
            .copied()
            .unwrap_or(0)
    }

    /// Whether the two membership lists agree everywhere.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let documents = self.read();
        let forward = documents.events.values().all(|event| {
            event.participants.iter().all(|user_id| {
                documents
                    .users
                    .get(user_id)
                    .is_some_and(|user| user.is_registered_for(event.id))
            })
        });
        let backward = documents.users.values().all(|user| {
            user.registered_events.iter().all(|event_id| {
                documents
                    .events
                    .get(event_id)
                    .is_some_and(|event| event.has_participant(user.id))
            })
        });
        forward && backward
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Documents> {
        self.documents.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Documents> {
        self.documents.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self, operation: StoreOperation) -> Result<(), EntityStoreError> {
        *self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(operation)
            .or_insert(0) += 1;

        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        match faults.get_mut(&operation) {
            Some(remaining) if *remaining > 0 => {
                if *remaining != u32::MAX {
                    *remaining -= 1;
                }
                Err(EntityStoreError::Unavailable(format!(
                    "injected fault on {operation:?}"
                )))
            }
            _ => Ok(()),
        }
    }
}

impl EntityStore for InMemoryEntityStore {
    fn find_event(&self, event_id: EventId) -> StoreFuture<'_, Option<Event>> {
        Box::pin(async move {
            self.enter(StoreOperation::FindEvent)?;
            Ok(self.read().events.get(&event_id).cloned())
        })
    }

    fn find_user(&self, user_id: UserId) -> StoreFuture<'_, Option<User>> {
        Box::pin(async move {
            self.enter(StoreOperation::FindUser)?;
            Ok(self.read().users.get(&user_id).cloned())
        })
    }

    fn find_users(&self, user_ids: Vec<UserId>) -> StoreFuture<'_, Vec<User>> {
        Box::pin(async move {
            self.enter(StoreOperation::FindUsers)?;
            let documents = self.read();
            Ok(user_ids
                .iter()
                .filter_map(|id| documents.users.get(id).cloned())
                .collect())
        })
    }

    fn list_events(&self, filter: EventFilter) -> StoreFuture<'_, Vec<Event>> {
        Box::pin(async move {
            self.enter(StoreOperation::ListEvents)?;
            let mut events: Vec<Event> = self
                .read()
                .events
                .values()
                .filter(|event| filter.category.is_none_or(|c| event.category == c))
                .cloned()
                .collect();
            events.sort_by(|a, b| b.date.cmp(&a.date));
            Ok(events)
        })
    }

    fn list_users(&self) -> StoreFuture<'_, Vec<User>> {
        Box::pin(async move {
            self.enter(StoreOperation::ListUsers)?;
            let mut users: Vec<User> = self.read().users.values().cloned().collect();
            users.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            Ok(users)
        })
    }

    fn insert_event(&self, event: Event) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.enter(StoreOperation::InsertEvent)?;
            let mut documents = self.write();
            if documents.events.contains_key(&event.id) {
                return Err(EntityStoreError::Database(format!(
                    "event {} already exists",
                    event.id
                )));
            }
            documents.events.insert(event.id, event);
            Ok(())
        })
    }

    fn insert_user(&self, user: User) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.enter(StoreOperation::InsertUser)?;
            let mut documents = self.write();
            if documents.users.values().any(|u| u.email == user.email) {
                return Err(EntityStoreError::DuplicateEmail(user.email));
            }
            documents.users.insert(user.id, user);
            Ok(())
        })
    }

    fn update_event_details(
        &self,
        event_id: EventId,
        update: EventUpdate,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<Event>> {
        Box::pin(async move {
            self.enter(StoreOperation::UpdateEventDetails)?;
            let mut documents = self.write();
            Ok(documents.events.get_mut(&event_id).map(|event| {
                event.apply_update(update, now);
                event.clone()
            }))
        })
    }

    fn update_user_profile(
        &self,
        user_id: UserId,
        update: UserUpdate,
    ) -> StoreFuture<'_, Option<User>> {
        Box::pin(async move {
            self.enter(StoreOperation::UpdateUserProfile)?;
            let mut documents = self.write();
            let Some(mut updated) = documents.users.get(&user_id).cloned() else {
                return Ok(None);
            };
            updated.apply_update(update);
            if documents
                .users
                .values()
                .any(|other| other.id != user_id && other.email == updated.email)
            {
                return Err(EntityStoreError::DuplicateEmail(updated.email));
            }
            documents.users.insert(user_id, updated.clone());
            Ok(Some(updated))
        })
    }

    fn delete_event(&self, event_id: EventId) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            self.enter(StoreOperation::DeleteEvent)?;
            Ok(self.write().events.remove(&event_id).is_some())
        })
    }

    fn delete_user(&self, user_id: UserId) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            self.enter(StoreOperation::DeleteUser)?;
            Ok(self.write().users.remove(&user_id).is_some())
        })
    }

    fn add_participant(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> StoreFuture<'_, SetMutation<Event>> {
        Box::pin(async move {
            self.enter(StoreOperation::AddParticipant)?;
            let mut documents = self.write();
            let Some(event) = documents.events.get_mut(&event_id) else {
                return Ok(SetMutation::Missing);
            };
            if event.has_participant(user_id) {
                return Ok(SetMutation::Unchanged);
            }
            event.participants.push(user_id);
            Ok(SetMutation::Applied(event.clone()))
        })
    }

    fn remove_participant(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> StoreFuture<'_, SetMutation<Event>> {
        Box::pin(async move {
            self.enter(StoreOperation::RemoveParticipant)?;
            let mut documents = self.write();
            let Some(event) = documents.events.get_mut(&event_id) else {
                return Ok(SetMutation::Missing);
            };
            let before = event.participants.len();
            event.participants.retain(|id| *id != user_id);
            if event.participants.len() == before {
                Ok(SetMutation::Unchanged)
            } else {
                Ok(SetMutation::Applied(event.clone()))
            }
        })
    }

    fn add_registered_event(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> StoreFuture<'_, SetMutation<User>> {
        Box::pin(async move {
            self.enter(StoreOperation::AddRegisteredEvent)?;
            let mut documents = self.write();
            let Some(user) = documents.users.get_mut(&user_id) else {
                return Ok(SetMutation::Missing);
            };
            if user.is_registered_for(event_id) {
                return Ok(SetMutation::Unchanged);
            }
            user.registered_events.push(event_id);
            Ok(SetMutation::Applied(user.clone()))
        })
    }

    fn remove_registered_event(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> StoreFuture<'_, SetMutation<User>> {
        Box::pin(async move {
            self.enter(StoreOperation::RemoveRegisteredEvent)?;
            let mut documents = self.write();
            let Some(user) = documents.users.get_mut(&user_id) else {
                return Ok(SetMutation::Missing);
            };
            let before = user.registered_events.len();
            user.registered_events.retain(|id| *id != event_id);
            if user.registered_events.len() == before {
                Ok(SetMutation::Unchanged)
            } else {
                Ok(SetMutation::Applied(user.clone()))
            }
        })
    }

    fn collapse_participant_duplicates(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> StoreFuture<'_, SetMutation<Event>> {
        Box::pin(async move {
            self.enter(StoreOperation::CollapseParticipantDuplicates)?;
            let mut documents = self.write();
            let Some(event) = documents.events.get_mut(&event_id) else {
                return Ok(SetMutation::Missing);
            };
            if keep_first(&mut event.participants, user_id) {
                Ok(SetMutation::Applied(event.clone()))
            } else {
                Ok(SetMutation::Unchanged)
            }
        })
    }

    fn collapse_registration_duplicates(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> StoreFuture<'_, SetMutation<User>> {
        Box::pin(async move {
            self.enter(StoreOperation::CollapseRegistrationDuplicates)?;
            let mut documents = self.write();
            let Some(user) = documents.users.get_mut(&user_id) else {
                return Ok(SetMutation::Missing);
            };
            if keep_first(&mut user.registered_events, event_id) {
                Ok(SetMutation::Applied(user.clone()))
            } else {
                Ok(SetMutation::Unchanged)
            }
        })
    }

    fn remove_user_from_all_events(&self, user_id: UserId) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            self.enter(StoreOperation::RemoveUserFromAllEvents)?;
            let mut documents = self.write();
            let mut changed = 0;
            for event in documents.events.values_mut() {
                let before = event.participants.len();
                event.participants.retain(|id| *id != user_id);
                if event.participants.len() != before {
                    changed += 1;
                }
            }
            Ok(changed)
        })
    }

    fn remove_event_from_all_users(&self, event_id: EventId) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            self.enter(StoreOperation::RemoveEventFromAllUsers)?;
            let mut documents = self.write();
            let mut changed = 0;
            for user in documents.users.values_mut() {
                let before = user.registered_events.len();
                user.registered_events.retain(|id| *id != event_id);
                if user.registered_events.len() != before {
                    changed += 1;
                }
            }
            Ok(changed)
        })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move { self.enter(StoreOperation::Ping) })
    }
}

/// Keep the first occurrence of `id` and drop the rest, in place.
/// Returns whether anything was dropped.
fn keep_first<T: PartialEq + Copy>(ids: &mut Vec<T>, id: T) -> bool {
    let before = ids.len();
    let mut seen = false;
    ids.retain(|candidate| {
        if *candidate != id {
            return true;
        }
        let keep = !seen;
        seen = true;
        keep
    });
    ids.len() != before
}
