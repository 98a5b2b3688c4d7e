//! Registration endpoints.
//!
//! Students register and unregister themselves; coordinators and admins read
//! and export rosters and remove participants. All writes go through the
//! registration engine so both membership lists change together.

use super::events::EventResponse;
use crate::server::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use campus_events_core::types::{EventId, UserId};
use campus_events_runtime::RosterEntry;
use campus_events_web::{ApiResponse, AppError, Staff, Student};

/// `POST /api/events/:id/register`
pub async fn register(
    State(state): State<AppState>,
    student: Student,
    Path(event_id): Path<EventId>,
) -> Result<Json<ApiResponse<EventResponse>>, AppError> {
    let event = state.engine.register(event_id, student.user_id()).await?;

    Ok(Json(ApiResponse::with_message(
        EventResponse::from_event(event, state.clock.today()),
        "Successfully registered for event",
    )))
}

/// `DELETE /api/events/:id/register`
pub async fn unregister(
    State(state): State<AppState>,
    student: Student,
    Path(event_id): Path<EventId>,
) -> Result<Json<ApiResponse<EventResponse>>, AppError> {
    let event = state.engine.unregister(event_id, student.user_id()).await?;

    Ok(Json(ApiResponse::with_message(
        EventResponse::from_event(event, state.clock.today()),
        "Successfully unregistered from event",
    )))
}

/// `GET /api/events/:id/registrations`
pub async fn list_participants(
    State(state): State<AppState>,
    _staff: Staff,
    Path(event_id): Path<EventId>,
) -> Result<Json<ApiResponse<Vec<RosterEntry>>>, AppError> {
    let roster = state.roster.participants(event_id).await?;
    Ok(Json(ApiResponse::list(roster.entries)))
}

/// `GET /api/events/:id/registrations/export`, as a CSV attachment.
pub async fn export_participants(
    State(state): State<AppState>,
    _staff: Staff,
    Path(event_id): Path<EventId>,
) -> Result<Response, AppError> {
    let roster = state.roster.participants(event_id).await?;
    let disposition = format!("attachment; filename=\"{}\"", roster.csv_file_name());

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        roster.to_csv(),
    )
        .into_response())
}

/// `DELETE /api/events/:id/registrations/:user_id`
pub async fn remove_participant(
    State(state): State<AppState>,
    staff: Staff,
    Path((event_id, user_id)): Path<(EventId, UserId)>,
) -> Result<Json<ApiResponse<EventResponse>>, AppError> {
    let event = state.engine.remove_participant(event_id, user_id).await?;
    tracing::info!(%event_id, %user_id, removed_by = %staff.user_id(), "Participant removed");

    Ok(Json(ApiResponse::with_message(
        EventResponse::from_event(event, state.clock.today()),
        "User registration removed successfully",
    )))
}
