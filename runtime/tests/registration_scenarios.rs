//! End-to-end registration flows against the in-memory store.

#![allow(clippy::unwrap_used)]

use campus_events_core::entity_store::EntityStore;
use campus_events_core::environment::Clock;
use campus_events_core::registration::{Entity, InvalidReason, RegistrationError};
use campus_events_core::types::{EventId, StoredStatus, UserId};
use campus_events_runtime::{RegistrationEngine, RetryPolicy, RosterQuery};
use campus_events_testing::{InMemoryEntityStore, ManualClock, StoreOperation, fixtures, test_clock};
use chrono::Duration as Days;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    store: InMemoryEntityStore,
    clock: ManualClock,
    engine: RegistrationEngine,
}

impl Harness {
    fn new() -> Self {
        campus_events_testing::init_tracing();
        let store = InMemoryEntityStore::new();
        let clock = ManualClock::new(test_clock().now());
        let policy = RetryPolicy::builder()
            .initial_delay(Duration::from_millis(1))
            .jitter(false)
            .build();
        let engine = RegistrationEngine::with_repair_policy(
            Arc::new(store.clone()),
            Arc::new(clock.clone()),
            policy,
        );
        Self { store, clock, engine }
    }

    fn event_in_days(&self, days: i64) -> EventId {
        let event = fixtures::event_in_days(&self.clock, days);
        let id = event.id;
        self.store.put_event(event);
        id
    }

    fn student(&self, name: &str) -> UserId {
        let user = fixtures::student(name, &self.clock);
        let id = user.id;
        self.store.put_user(user);
        id
    }

    fn participants(&self, event_id: EventId) -> Vec<UserId> {
        self.store.event(event_id).unwrap().participants
    }

    fn registrations(&self, user_id: UserId) -> Vec<EventId> {
        self.store.user(user_id).unwrap().registered_events
    }
}

#[tokio::test]
async fn register_then_repeat_then_unregister() {
    let h = Harness::new();
    let e1 = h.event_in_days(1);
    let u1 = h.student("Uma");

    let event = h.engine.register(e1, u1).await.unwrap();
    assert_eq!(event.participants, vec![u1]);
    assert_eq!(h.registrations(u1), vec![e1]);

    let err = h.engine.register(e1, u1).await.unwrap_err();
    assert_eq!(err, RegistrationError::Conflict);
    assert_eq!(err.status_code(), 400);
    assert_eq!(err.to_string(), "already registered");
    assert_eq!(h.participants(e1), vec![u1]);
    assert_eq!(h.registrations(u1), vec![e1]);

    let event = h.engine.unregister(e1, u1).await.unwrap();
    assert!(event.participants.is_empty());
    assert!(h.registrations(u1).is_empty());
    assert!(h.store.is_consistent());
}

#[tokio::test]
async fn register_rejected_when_not_required() {
    let h = Harness::new();
    let event = fixtures::open_event(&h.clock);
    let e2 = event.id;
    h.store.put_event(event);
    let u2 = h.student("Vik");

    let err = h.engine.register(e2, u2).await.unwrap_err();

    assert_eq!(err.to_string(), "registration not required");
    assert_eq!(err.status_code(), 400);
    assert!(h.participants(e2).is_empty());
    assert_eq!(h.store.calls(StoreOperation::AddParticipant), 0);
}

#[tokio::test]
async fn register_rejected_for_yesterdays_event() {
    let h = Harness::new();
    let e3 = h.event_in_days(-1);
    let u3 = h.student("Wen");
    assert_eq!(h.store.event(e3).unwrap().status, StoredStatus::Upcoming);

    let err = h.engine.register(e3, u3).await.unwrap_err();

    assert_eq!(
        err,
        RegistrationError::InvalidOperation(InvalidReason::RegistrationClosed)
    );
    assert_eq!(err.to_string(), "registration closed");
}

#[tokio::test]
async fn admin_remove_of_non_participant_changes_nothing() {
    let h = Harness::new();
    let e1 = h.event_in_days(1);
    let u1 = h.student("Xia");

    let err = h.engine.remove_participant(e1, u1).await.unwrap_err();

    assert_eq!(err.to_string(), "user not registered");
    assert_eq!(h.store.calls(StoreOperation::RemoveParticipant), 0);
    assert!(h.participants(e1).is_empty());
}

#[tokio::test]
async fn unregister_twice_reports_not_registered() {
    let h = Harness::new();
    let e1 = h.event_in_days(3);
    let u1 = h.student("Yash");
    h.engine.register(e1, u1).await.unwrap();

    h.engine.unregister(e1, u1).await.unwrap();
    let err = h.engine.unregister(e1, u1).await.unwrap_err();

    assert_eq!(
        err,
        RegistrationError::InvalidOperation(InvalidReason::NotRegistered)
    );
    assert!(h.participants(e1).is_empty());
    assert!(h.registrations(u1).is_empty());
}

#[tokio::test]
async fn unregister_allowed_on_event_day_but_not_after() {
    let h = Harness::new();
    let e1 = h.event_in_days(1);
    let u1 = h.student("Zoe");
    let u2 = h.student("Amir");
    h.engine.register(e1, u1).await.unwrap();
    h.engine.register(e1, u2).await.unwrap();

    h.clock.advance(Days::days(1));
    h.engine.unregister(e1, u1).await.unwrap();

    h.clock.advance(Days::days(1));
    let err = h.engine.unregister(e1, u2).await.unwrap_err();
    assert_eq!(err.to_string(), "cannot modify closed event");
    assert_eq!(h.participants(e1), vec![u2]);
}

#[tokio::test]
async fn admin_remove_works_after_event_closed() {
    let h = Harness::new();
    let e1 = h.event_in_days(1);
    let u1 = h.student("Bo");
    h.engine.register(e1, u1).await.unwrap();

    h.clock.advance(Days::days(10));
    let event = h.engine.remove_participant(e1, u1).await.unwrap();

    assert!(event.participants.is_empty());
    assert!(h.registrations(u1).is_empty());
}

#[tokio::test]
async fn stored_completed_status_closes_registration() {
    let h = Harness::new();
    let mut event = fixtures::event_in_days(&h.clock, 30);
    event.status = StoredStatus::Completed;
    let id = event.id;
    h.store.put_event(event);
    let u1 = h.student("Cy");

    let err = h.engine.register(id, u1).await.unwrap_err();
    assert_eq!(err.to_string(), "registration closed");
}

#[tokio::test]
async fn unknown_documents_are_not_found() {
    let h = Harness::new();
    let u1 = h.student("Di");
    let e1 = h.event_in_days(2);

    assert_eq!(
        h.engine.register(EventId::new(), u1).await.unwrap_err(),
        RegistrationError::NotFound(Entity::Event)
    );
    assert_eq!(
        h.engine.register(e1, UserId::new()).await.unwrap_err(),
        RegistrationError::NotFound(Entity::User)
    );
    assert_eq!(
        h.engine.unregister(EventId::new(), u1).await.unwrap_err().status_code(),
        404
    );
}

#[tokio::test]
async fn unregister_tolerates_missing_user_document() {
    let h = Harness::new();
    let e1 = h.event_in_days(2);
    let u1 = h.student("Eli");
    h.engine.register(e1, u1).await.unwrap();
    h.store.remove_user(u1);

    let event = h.engine.unregister(e1, u1).await.unwrap();
    assert!(event.participants.is_empty());
}

#[tokio::test]
async fn roster_follows_registration_order() {
    let h = Harness::new();
    let e1 = h.event_in_days(4);
    let first = h.student("Farah");
    let second = h.student("Gus");
    h.engine.register(e1, first).await.unwrap();
    h.engine.register(e1, second).await.unwrap();

    let roster = RosterQuery::new(Arc::new(h.store.clone()))
        .participants(e1)
        .await
        .unwrap();

    let names: Vec<_> = roster.entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["Farah", "Gus"]);
    assert_eq!(roster.unresolved, 0);
    assert!(roster.to_csv().contains("\"farah@college.edu\""));
}

#[tokio::test]
async fn roster_skips_unresolvable_participants() {
    let h = Harness::new();
    let e1 = h.event_in_days(4);
    let u1 = h.student("Hana");
    h.engine.register(e1, u1).await.unwrap();
    h.store.remove_user(u1);

    let roster = RosterQuery::new(Arc::new(h.store.clone()))
        .participants(e1)
        .await
        .unwrap();

    assert!(roster.is_empty());
    assert_eq!(roster.unresolved, 1);
    // Queries never repair
    assert_eq!(h.participants(e1), vec![u1]);
}

#[tokio::test]
async fn registered_events_resolve_in_order() {
    let h = Harness::new();
    let e1 = h.event_in_days(2);
    let e2 = h.event_in_days(9);
    let u1 = h.student("Ivo");
    h.engine.register(e2, u1).await.unwrap();
    h.engine.register(e1, u1).await.unwrap();

    let events = RosterQuery::new(Arc::new(h.store.clone()))
        .registered_events(u1)
        .await
        .unwrap();

    let ids: Vec<_> = events.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![e2, e1]);
    assert_eq!(h.store.find_user(u1).await.unwrap().unwrap().registered_events, vec![e2, e1]);
}
