//! Event management endpoints.
//!
//! - `GET /api/events` - list, optionally filtered by derived status and category
//! - `GET /api/events/:id` - one event
//! - `POST /api/events` - create (coordinator, admin)
//! - `PUT|PATCH /api/events/:id` - update descriptive fields (creator or admin)
//! - `DELETE /api/events/:id` - cascade delete (creator or admin)

use crate::server::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use campus_events_core::entity_store::EventFilter;
use campus_events_core::types::{
    Category, Event, EventDetails, EventId, EventStatus, EventUpdate, StoredStatus, UserId,
};
use campus_events_runtime::CascadeReport;
use campus_events_web::{ApiResponse, AppError, Staff};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Event as returned to clients: the stored document with the derived status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResponse {
    /// Event id
    pub id: EventId,
    /// Display name
    pub name: String,
    /// Theme
    pub theme: Option<String>,
    /// Description
    pub description: Option<String>,
    /// Eligibility text
    pub eligibility: String,
    /// Category
    pub category: Category,
    /// Event date
    pub date: DateTime<Utc>,
    /// Derived status
    pub status: EventStatus,
    /// Whether registration is required
    pub registration_required: bool,
    /// Creator
    pub created_by: UserId,
    /// Practical details
    pub details: EventDetails,
    /// Banner image
    pub image: Option<String>,
    /// Registered users in registration order
    pub participants: Vec<UserId>,
    /// `participants.len()`
    pub participant_count: usize,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

impl EventResponse {
    /// Render an event as seen on `today`.
    #[must_use]
    pub fn from_event(event: Event, today: NaiveDate) -> Self {
        let status = event.status_on(today);
        Self {
            id: event.id,
            name: event.name,
            theme: event.theme,
            description: event.description,
            eligibility: event.eligibility,
            category: event.category,
            date: event.date,
            status,
            registration_required: event.registration_required,
            created_by: event.created_by,
            details: event.details,
            image: event.image,
            participant_count: event.participants.len(),
            participants: event.participants,
            created_at: event.created_at,
            updated_at: event.updated_at,
        }
    }
}

/// Query parameters for listing events.
#[derive(Debug, Default, Deserialize)]
pub struct ListEventsQuery {
    /// Derived status to keep
    pub status: Option<EventStatus>,
    /// Category to keep
    pub category: Option<Category>,
}

/// Request to create an event. `participants` is not accepted.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    /// Display name
    pub name: String,
    /// Theme
    pub theme: Option<String>,
    /// Description
    pub description: Option<String>,
    /// Eligibility text, `"all"` when absent
    pub eligibility: Option<String>,
    /// Category
    pub category: Category,
    /// Event date
    pub date: DateTime<Utc>,
    /// Stored status override
    pub status: Option<StoredStatus>,
    /// Whether registration is required, `true` when absent
    pub registration_required: Option<bool>,
    /// Practical details
    pub details: Option<EventDetails>,
    /// Banner image
    pub image: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// List events, newest date first.
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<ListEventsQuery>,
) -> Result<Json<ApiResponse<Vec<EventResponse>>>, AppError> {
    let today = state.clock.today();
    let events = state
        .store
        .list_events(EventFilter {
            category: query.category,
        })
        .await?;

    let events: Vec<EventResponse> = events
        .into_iter()
        .map(|event| EventResponse::from_event(event, today))
        .filter(|event| query.status.is_none_or(|status| event.status == status))
        .collect();

    Ok(Json(ApiResponse::list(events)))
}

/// Get one event.
pub async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
) -> Result<Json<ApiResponse<EventResponse>>, AppError> {
    let event = load_event(&state, event_id).await?;
    Ok(Json(ApiResponse::ok(EventResponse::from_event(
        event,
        state.clock.today(),
    ))))
}

/// Create an event owned by the caller.
pub async fn create_event(
    State(state): State<AppState>,
    staff: Staff,
    Json(request): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<ApiResponse<EventResponse>>), AppError> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(AppError::validation("Event name is required"));
    }

    let now = state.clock.now();
    let mut event = Event::new(name, request.category, request.date, staff.user_id(), now);
    event.theme = request.theme;
    event.description = request.description;
    if let Some(eligibility) = request.eligibility {
        event.eligibility = eligibility;
    }
    if let Some(status) = request.status {
        event.status = status;
    }
    if let Some(required) = request.registration_required {
        event.registration_required = required;
    }
    event.details = request.details.unwrap_or_default();
    event.image = request.image;

    state.store.insert_event(event.clone()).await?;
    tracing::info!(event_id = %event.id, created_by = %staff.user_id(), "Event created");

    Ok(ApiResponse::created(
        EventResponse::from_event(event, state.clock.today()),
        "Event created successfully",
    ))
}

/// Update descriptive fields. The participant list is never touched.
pub async fn update_event(
    State(state): State<AppState>,
    staff: Staff,
    Path(event_id): Path<EventId>,
    Json(update): Json<EventUpdate>,
) -> Result<Json<ApiResponse<EventResponse>>, AppError> {
    let event = load_event(&state, event_id).await?;
    ensure_owner(&event, &staff, "edit")?;

    if update.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
        return Err(AppError::validation("Event name cannot be empty"));
    }

    let updated = state
        .store
        .update_event_details(event_id, update, state.clock.now())
        .await?
        .ok_or_else(|| AppError::not_found("Event not found"))?;

    tracing::info!(%event_id, "Event updated");
    Ok(Json(ApiResponse::with_message(
        EventResponse::from_event(updated, state.clock.today()),
        "Event updated successfully",
    )))
}

/// Delete an event and every back-reference to it.
pub async fn delete_event(
    State(state): State<AppState>,
    staff: Staff,
    Path(event_id): Path<EventId>,
) -> Result<Json<ApiResponse<CascadeReport>>, AppError> {
    let event = load_event(&state, event_id).await?;
    ensure_owner(&event, &staff, "delete")?;

    let report = state.engine.delete_event(event_id).await?;

    Ok(Json(ApiResponse::with_message(
        report,
        "Event deleted successfully",
    )))
}

pub(crate) async fn load_event(state: &AppState, event_id: EventId) -> Result<Event, AppError> {
    state
        .store
        .find_event(event_id)
        .await?
        .ok_or_else(|| AppError::not_found("Event not found"))
}

fn ensure_owner(event: &Event, staff: &Staff, action: &str) -> Result<(), AppError> {
    if event.created_by == staff.user_id() || staff.actor().is_admin() {
        Ok(())
    } else {
        Err(AppError::forbidden(format!(
            "You are not authorized to {action} this event"
        )))
    }
}
