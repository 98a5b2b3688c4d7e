//! Row types and their conversion to domain documents.

use campus_events_core::entity_store::EntityStoreError;
use campus_events_core::types::{
    Event, EventDetails, EventId, Role, StoredStatus, User, UserId, Year,
};
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;

#[derive(sqlx::FromRow)]
pub(crate) struct EventRow {
    id: Uuid,
    name: String,
    theme: Option<String>,
    description: Option<String>,
    eligibility: String,
    category: String,
    date: DateTime<Utc>,
    status: String,
    registration_required: bool,
    created_by: Uuid,
    details: Json<EventDetails>,
    image: Option<String>,
    participants: Vec<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for Event {
    type Error = EntityStoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: EventId::from_uuid(row.id),
            name: row.name,
            theme: row.theme,
            description: row.description,
            eligibility: row.eligibility,
            category: row.category.parse().map_err(decode)?,
            date: row.date,
            status: row.status.parse::<StoredStatus>().map_err(decode)?,
            registration_required: row.registration_required,
            created_by: UserId::from_uuid(row.created_by),
            details: row.details.0,
            image: row.image,
            participants: row.participants.into_iter().map(UserId::from_uuid).collect(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    role: String,
    year: Option<String>,
    bio: String,
    registered_events: Vec<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = EntityStoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: UserId::from_uuid(row.id),
            name: row.name,
            email: row.email,
            role: row.role.parse::<Role>().map_err(decode)?,
            year: row
                .year
                .map(|year| year.parse::<Year>())
                .transpose()
                .map_err(decode)?,
            bio: row.bio,
            registered_events: row
                .registered_events
                .into_iter()
                .map(EventId::from_uuid)
                .collect(),
            created_at: row.created_at,
        })
    }
}

fn decode(error: impl std::fmt::Display) -> EntityStoreError {
    EntityStoreError::Serialization(error.to_string())
}

pub(crate) fn user_uuids(ids: &[UserId]) -> Vec<Uuid> {
    ids.iter().map(|id| *id.as_uuid()).collect()
}

pub(crate) fn event_uuids(ids: &[EventId]) -> Vec<Uuid> {
    ids.iter().map(|id| *id.as_uuid()).collect()
}
