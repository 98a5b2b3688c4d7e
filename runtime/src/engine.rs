//! Registration engine.
//!
//! Keeps `Event.participants` and `User.registered_events` in step. Every
//! mutating operation follows the same shape:
//!
//! 1. Load the event and run the pure precondition checks from
//!    [`campus_events_core::registration`].
//! 2. Hand the writes to a spawned task (the *detached commit*), so a caller
//!    that goes away mid-request cannot leave one list updated and the other not.
//! 3. Write the event side with an atomic set primitive. A lost race shows up
//!    here as `SetMutation::Unchanged`.
//! 4. Write the user side, retried per the repair [`RetryPolicy`].
//! 5. If the user side still fails, undo the event side (also retried). Only
//!    when the undo fails too does the caller see `PartialFailure`.

use crate::metrics::RegistrationMetrics;
use crate::retry::{RetryPolicy, retry_with_predicate};
use campus_events_core::entity_store::{EntityStore, EntityStoreError, SetMutation};
use campus_events_core::environment::Clock;
use campus_events_core::registration::{
    Entity, InvalidReason, Operation, RegistrationError, check_admin_remove, check_register,
    check_unregister,
};
use campus_events_core::types::{Event, EventId, UserId};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Result of a cascade delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeReport {
    /// The deleted event
    pub event_id: EventId,
    /// User documents cleaned before the delete
    pub registrations_removed: u64,
    /// User documents cleaned by the sweep after the delete
    pub late_registrations_removed: u64,
}

/// Result of deleting an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDeletionReport {
    /// The deleted user
    pub user_id: UserId,
    /// Event documents cleaned before the delete
    pub participations_removed: u64,
    /// Event documents cleaned by the sweep after the delete
    pub late_participations_removed: u64,
}

/// Decrements the in-flight commit counter on drop.
struct PendingGuard(Arc<AtomicUsize>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Registration engine over an [`EntityStore`].
///
/// Cheap to clone; clones share the store, clock and in-flight counter.
#[derive(Clone)]
pub struct RegistrationEngine {
    store: Arc<dyn EntityStore>,
    clock: Arc<dyn Clock>,
    repair_policy: RetryPolicy,
    pending: Arc<AtomicUsize>,
}

impl std::fmt::Debug for RegistrationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationEngine")
            .field("repair_policy", &self.repair_policy)
            .field("pending_commits", &self.pending_commits())
            .finish_non_exhaustive()
    }
}

impl RegistrationEngine {
    /// Create an engine with the default repair policy (one retry).
    #[must_use]
    pub fn new(store: Arc<dyn EntityStore>, clock: Arc<dyn Clock>) -> Self {
        Self::with_repair_policy(store, clock, RetryPolicy::default())
    }

    /// Create an engine with an explicit repair policy.
    #[must_use]
    pub fn with_repair_policy(
        store: Arc<dyn EntityStore>,
        clock: Arc<dyn Clock>,
        repair_policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            repair_policy,
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The repair policy in use.
    #[must_use]
    pub const fn repair_policy(&self) -> &RetryPolicy {
        &self.repair_policy
    }

    /// Commits currently running on detached tasks.
    #[must_use]
    pub fn pending_commits(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Wait until no detached commit is running, or `timeout` passes.
    ///
    /// Returns `true` if everything drained.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.pending_commits() > 0 {
            if Instant::now() >= deadline {
                tracing::warn!(
                    pending = self.pending_commits(),
                    "Timed out waiting for registration commits"
                );
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        true
    }

    /// Register `user_id` for `event_id`. Returns the event as stored after the change.
    ///
    /// # Errors
    ///
    /// - `NotFound(Event)`, `InvalidOperation(RegistrationNotRequired | RegistrationClosed)`,
    ///   `Conflict`, `NotFound(User)`: nothing written
    /// - `StoreFailure`: store failed, nothing left half-applied
    /// - `PartialFailure`: participant recorded, back-reference missing
    #[tracing::instrument(skip(self), fields(operation = "register"))]
    pub async fn register(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> Result<Event, RegistrationError> {
        observe(Operation::Register, async {
            let event = self.load_event(event_id).await?;
            check_register(&event, user_id, self.clock.today())?;

            if self.store.find_user(user_id).await?.is_none() {
                return Err(RegistrationError::NotFound(Entity::User));
            }

            self.detach(Operation::Register, move |engine| async move {
                engine.commit_register(event_id, user_id).await
            })
            .await
        })
        .await
    }

    /// Unregister `user_id` from `event_id`. Returns the event as stored after the change.
    ///
    /// # Errors
    ///
    /// - `NotFound(Event)`, `InvalidOperation(EventClosed | NotRegistered)`: nothing written
    /// - `StoreFailure`: store failed, nothing left half-applied
    /// - `PartialFailure`: participant removed, back-reference still present
    #[tracing::instrument(skip(self), fields(operation = "unregister"))]
    pub async fn unregister(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> Result<Event, RegistrationError> {
        observe(Operation::Unregister, async {
            let event = self.load_event(event_id).await?;
            check_unregister(&event, user_id, self.clock.today())?;

            self.detach(Operation::Unregister, move |engine| async move {
                engine
                    .commit_removal(
                        Operation::Unregister,
                        event_id,
                        user_id,
                        InvalidReason::NotRegistered,
                    )
                    .await
            })
            .await
        })
        .await
    }

    /// Coordinator removal of `user_id` from `event_id`. No date restriction.
    ///
    /// # Errors
    ///
    /// - `NotFound(Event)`, `InvalidOperation(UserNotRegistered)`: nothing written
    /// - `StoreFailure` / `PartialFailure`: as for [`RegistrationEngine::unregister`]
    #[tracing::instrument(skip(self), fields(operation = "admin_remove"))]
    pub async fn remove_participant(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> Result<Event, RegistrationError> {
        observe(Operation::AdminRemove, async {
            let event = self.load_event(event_id).await?;
            check_admin_remove(&event, user_id)?;

            self.detach(Operation::AdminRemove, move |engine| async move {
                engine
                    .commit_removal(
                        Operation::AdminRemove,
                        event_id,
                        user_id,
                        InvalidReason::UserNotRegistered,
                    )
                    .await
            })
            .await
        })
        .await
    }

    /// Delete an event and every back-reference to it.
    ///
    /// Back-references go first, then the event, then one more sweep for
    /// registrations that landed between the two. If the delete itself fails
    /// the event is still there and the call can be repeated.
    ///
    /// # Errors
    ///
    /// - `NotFound(Event)`
    /// - `StoreFailure`: fan-out or delete failed after retries
    #[tracing::instrument(skip(self), fields(operation = "cascade_delete"))]
    pub async fn delete_event(&self, event_id: EventId) -> Result<CascadeReport, RegistrationError> {
        observe(Operation::CascadeDelete, async {
            self.load_event(event_id).await?;

            self.detach(Operation::CascadeDelete, move |engine| async move {
                engine.commit_cascade_delete(event_id).await
            })
            .await
        })
        .await
    }

    /// Delete a user account and take the user off every event roster.
    ///
    /// Same ordering as [`Self::delete_event`] with the roles swapped.
    ///
    /// # Errors
    ///
    /// - `NotFound(User)`
    /// - `StoreFailure`: fan-out or delete failed after retries
    #[tracing::instrument(skip(self), fields(operation = "delete_account"))]
    pub async fn delete_account(
        &self,
        user_id: UserId,
    ) -> Result<AccountDeletionReport, RegistrationError> {
        observe(Operation::DeleteAccount, async {
            self.store
                .find_user(user_id)
                .await?
                .ok_or(RegistrationError::NotFound(Entity::User))?;

            self.detach(Operation::DeleteAccount, move |engine| async move {
                engine.commit_account_delete(user_id).await
            })
            .await
        })
        .await
    }

    async fn load_event(&self, event_id: EventId) -> Result<Event, RegistrationError> {
        self.store
            .find_event(event_id)
            .await?
            .ok_or(RegistrationError::NotFound(Entity::Event))
    }

    /// Run the write half on its own task and wait for it.
    async fn detach<T, F, Fut>(&self, operation: Operation, work: F) -> Result<T, RegistrationError>
    where
        F: FnOnce(Self) -> Fut,
        Fut: Future<Output = Result<T, RegistrationError>> + Send + 'static,
        T: Send + 'static,
    {
        self.pending.fetch_add(1, Ordering::SeqCst);
        let guard = PendingGuard(Arc::clone(&self.pending));
        let task = work(self.clone());

        let handle = tokio::spawn(
            async move {
                let _guard = guard;
                task.await
            }
            .in_current_span(),
        );

        handle.await.map_err(|join_error| {
            tracing::error!(%operation, error = %join_error, "Commit task did not complete");
            RegistrationError::StoreFailure(EntityStoreError::Unavailable(format!(
                "{operation} commit task failed: {join_error}"
            )))
        })?
    }

    async fn commit_register(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> Result<Event, RegistrationError> {
        let event = match self.store.add_participant(event_id, user_id).await? {
            SetMutation::Applied(event) => event,
            SetMutation::Unchanged => return Err(RegistrationError::Conflict),
            SetMutation::Missing => return Err(RegistrationError::NotFound(Entity::Event)),
        };

        let back_reference = self
            .repair(Operation::Register, || {
                self.store.add_registered_event(user_id, event_id)
            })
            .await;

        let failure = match back_reference {
            Ok(SetMutation::Applied(_) | SetMutation::Unchanged) => return Ok(event),
            Ok(SetMutation::Missing) => {
                tracing::warn!(%event_id, %user_id, "User vanished during registration, rolling back");
                RegistrationError::NotFound(Entity::User)
            }
            Err(error) => RegistrationError::StoreFailure(error),
        };

        let rollback = self
            .repair(Operation::Register, || {
                self.store.remove_participant(event_id, user_id)
            })
            .await;

        Err(self.after_compensation(Operation::Register, event_id, user_id, failure, rollback))
    }

    async fn commit_removal(
        &self,
        operation: Operation,
        event_id: EventId,
        user_id: UserId,
        not_member: InvalidReason,
    ) -> Result<Event, RegistrationError> {
        let event = match self.store.remove_participant(event_id, user_id).await? {
            SetMutation::Applied(event) => event,
            SetMutation::Unchanged => {
                return Err(RegistrationError::InvalidOperation(not_member));
            }
            SetMutation::Missing => return Err(RegistrationError::NotFound(Entity::Event)),
        };

        let back_reference = self
            .repair(operation, || {
                self.store.remove_registered_event(user_id, event_id)
            })
            .await;

        let error = match back_reference {
            Ok(SetMutation::Applied(_) | SetMutation::Unchanged) => return Ok(event),
            Ok(SetMutation::Missing) => {
                tracing::warn!(
                    %event_id,
                    %user_id,
                    "User document missing, keeping participant removal"
                );
                return Ok(event);
            }
            Err(error) => error,
        };

        let rollback = self
            .repair(operation, || self.store.add_participant(event_id, user_id))
            .await;

        Err(self.after_compensation(
            operation,
            event_id,
            user_id,
            RegistrationError::StoreFailure(error),
            rollback,
        ))
    }

    async fn commit_cascade_delete(
        &self,
        event_id: EventId,
    ) -> Result<CascadeReport, RegistrationError> {
        let registrations_removed = self
            .repair(Operation::CascadeDelete, || {
                self.store.remove_event_from_all_users(event_id)
            })
            .await?;

        let deleted = self
            .repair(Operation::CascadeDelete, || self.store.delete_event(event_id))
            .await?;
        if !deleted {
            return Err(RegistrationError::NotFound(Entity::Event));
        }

        let late_registrations_removed =
            match self.store.remove_event_from_all_users(event_id).await {
                Ok(count) => count,
                Err(error) => {
                    tracing::warn!(%event_id, %error, "Late sweep after event delete failed");
                    0
                }
            };
        if late_registrations_removed > 0 {
            tracing::info!(
                %event_id,
                late_registrations_removed,
                "Removed registrations that raced the delete"
            );
        }

        tracing::info!(%event_id, registrations_removed, "Event deleted");
        Ok(CascadeReport {
            event_id,
            registrations_removed,
            late_registrations_removed,
        })
    }

    async fn commit_account_delete(
        &self,
        user_id: UserId,
    ) -> Result<AccountDeletionReport, RegistrationError> {
        let participations_removed = self
            .repair(Operation::DeleteAccount, || {
                self.store.remove_user_from_all_events(user_id)
            })
            .await?;

        let deleted = self
            .repair(Operation::DeleteAccount, || self.store.delete_user(user_id))
            .await?;
        if !deleted {
            return Err(RegistrationError::NotFound(Entity::User));
        }

        let late_participations_removed =
            match self.store.remove_user_from_all_events(user_id).await {
                Ok(count) => count,
                Err(error) => {
                    tracing::warn!(%user_id, %error, "Late sweep after account delete failed");
                    0
                }
            };
        if late_participations_removed > 0 {
            tracing::info!(
                %user_id,
                late_participations_removed,
                "Removed participations that raced the delete"
            );
        }

        tracing::info!(%user_id, participations_removed, "Account deleted");
        Ok(AccountDeletionReport {
            user_id,
            participations_removed,
            late_participations_removed,
        })
    }

    /// Run one store call under the repair policy, recording any retries.
    async fn repair<'a, T, F>(
        &'a self,
        operation: Operation,
        mut call: F,
    ) -> Result<T, EntityStoreError>
    where
        F: FnMut() -> campus_events_core::entity_store::StoreFuture<'a, T>,
    {
        let mut attempts = 0_u32;
        let result = retry_with_predicate(
            &self.repair_policy,
            || {
                attempts += 1;
                call()
            },
            EntityStoreError::is_transient,
        )
        .await;

        if attempts > 1 {
            RegistrationMetrics::record_repair(operation, "retried");
        }
        result
    }

    fn after_compensation<T>(
        &self,
        operation: Operation,
        event_id: EventId,
        user_id: UserId,
        failure: RegistrationError,
        rollback: Result<SetMutation<T>, EntityStoreError>,
    ) -> RegistrationError {
        match rollback {
            Ok(_) => {
                RegistrationMetrics::record_repair(operation, "compensated");
                tracing::warn!(%event_id, %user_id, %failure, "Event side rolled back");
                failure
            }
            Err(source) => {
                RegistrationMetrics::record_repair(operation, "failed");
                RegistrationMetrics::record_partial_failure(operation);
                tracing::error!(
                    %event_id,
                    %user_id,
                    %failure,
                    rollback_error = %source,
                    pending = self.pending_commits(),
                    "Membership lists out of step, rollback failed"
                );
                RegistrationError::PartialFailure {
                    operation,
                    event_id,
                    user_id,
                    source,
                }
            }
        }
    }
}

/// Time an operation and record its outcome.
async fn observe<T, F>(operation: Operation, work: F) -> Result<T, RegistrationError>
where
    F: Future<Output = Result<T, RegistrationError>>,
{
    let start = Instant::now();
    let result = work.await;
    let outcome = match &result {
        Ok(_) => "ok",
        Err(error) => {
            if error.is_domain() {
                tracing::debug!(%error, "Operation rejected");
            } else {
                tracing::error!(%error, "Operation failed");
            }
            error.outcome()
        }
    };
    RegistrationMetrics::record_operation(operation, outcome, start.elapsed());
    result
}
