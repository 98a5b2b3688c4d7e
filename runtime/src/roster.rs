//! Read-only projections over the membership lists.

use campus_events_core::entity_store::EntityStore;
use campus_events_core::registration::{Entity, RegistrationError};
use campus_events_core::types::{Event, EventId, UserId, Year};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

/// One participant as shown to coordinators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    /// Participant id
    pub user_id: UserId,
    /// Display name
    pub name: String,
    /// Email
    pub email: String,
    /// Year of study, if recorded
    pub year: Option<Year>,
}

/// Participants of one event, in registration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Roster {
    /// Event id
    pub event_id: EventId,
    /// Event name, used for the export file name
    pub event_name: String,
    /// Resolved participants
    pub entries: Vec<RosterEntry>,
    /// Participant ids with no user document
    pub unresolved: usize,
}

impl Roster {
    /// Number of resolved participants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no participant resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// CSV with a `Name,Email,Year` header and one quoted row per participant.
    #[must_use]
    pub fn to_csv(&self) -> String {
        let mut csv = String::from("Name,Email,Year\n");
        for entry in &self.entries {
            let year = entry.year.map_or("", |year| year.as_str());
            let _ = writeln!(
                csv,
                "{},{},{}",
                quote(&entry.name),
                quote(&entry.email),
                quote(year)
            );
        }
        csv
    }

    /// `<event name>_participants.csv`, whitespace runs replaced by `_`.
    #[must_use]
    pub fn csv_file_name(&self) -> String {
        let stem = self
            .event_name
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("_");
        let stem: String = stem
            .chars()
            .filter(|c| !matches!(c, '"' | '/' | '\\'))
            .collect();
        format!("{stem}_participants.csv")
    }
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// Roster queries. Never repairs drift; unresolved ids are only counted.
#[derive(Clone)]
pub struct RosterQuery {
    store: Arc<dyn EntityStore>,
}

impl RosterQuery {
    /// Create a query service over the store.
    #[must_use]
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Participants of an event joined against user records.
    ///
    /// # Errors
    ///
    /// - `NotFound(Event)`
    /// - `StoreFailure`
    #[tracing::instrument(skip(self))]
    pub async fn participants(&self, event_id: EventId) -> Result<Roster, RegistrationError> {
        let event = self
            .store
            .find_event(event_id)
            .await?
            .ok_or(RegistrationError::NotFound(Entity::Event))?;

        let mut users: HashMap<UserId, _> = self
            .store
            .find_users(event.participants.clone())
            .await?
            .into_iter()
            .map(|user| (user.id, user))
            .collect();

        let entries: Vec<RosterEntry> = event
            .participants
            .iter()
            .filter_map(|id| users.remove(id))
            .map(|user| RosterEntry {
                user_id: user.id,
                name: user.name,
                email: user.email,
                year: user.year,
            })
            .collect();

        let unresolved = event.participants.len() - entries.len();
        if unresolved > 0 {
            tracing::warn!(%event_id, unresolved, "Roster has participants with no user document");
        }

        Ok(Roster {
            event_id,
            event_name: event.name,
            entries,
            unresolved,
        })
    }

    /// Events a user is registered for, in registration order. Dangling ids are skipped.
    ///
    /// # Errors
    ///
    /// - `NotFound(User)`
    /// - `StoreFailure`
    #[tracing::instrument(skip(self))]
    pub async fn registered_events(&self, user_id: UserId) -> Result<Vec<Event>, RegistrationError> {
        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or(RegistrationError::NotFound(Entity::User))?;

        let mut events = Vec::with_capacity(user.registered_events.len());
        for event_id in user.registered_events {
            match self.store.find_event(event_id).await? {
                Some(event) => events.push(event),
                None => tracing::warn!(%user_id, %event_id, "Skipping dangling registration"),
            }
        }
        Ok(events)
    }
}
