//! Error type for web handlers.
//!
//! [`AppError`] carries a status, a stable code and a client-facing message,
//! and renders as `{ success: false, statusCode, code, message }`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use campus_events_core::entity_store::EntityStoreError;
use campus_events_core::registration::RegistrationError;
use serde::Serialize;
use std::fmt;

/// Application error type for web handlers.
///
/// Domain errors convert through `From`, so handlers can use `?` on engine
/// and store results directly:
///
/// ```ignore
/// async fn register(
///     State(state): State<AppState>,
///     student: Student,
///     Path(event_id): Path<EventId>,
/// ) -> Result<Json<ApiResponse<EventResponse>>, AppError> {
///     let event = state.engine.register(event_id, student.user_id()).await?;
///     Ok(Json(ApiResponse::with_message(event.into(), "Registered")))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    code: String,
    /// Logged for 5xx responses, never sent to the client
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: String) -> Self {
        Self {
            status,
            message,
            code,
            source: None,
        }
    }

    /// Attach an internal source error.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// 400 Bad Request.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message.into(), "BAD_REQUEST".to_string())
    }

    /// 400 with a `VALIDATION_ERROR` code, for malformed request bodies.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            message.into(),
            "VALIDATION_ERROR".to_string(),
        )
    }

    /// 401 Unauthorized.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message.into(), "UNAUTHORIZED".to_string())
    }

    /// 403 Forbidden.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message.into(), "FORBIDDEN".to_string())
    }

    /// 404 Not Found.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message.into(), "NOT_FOUND".to_string())
    }

    /// 409 Conflict.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message.into(), "CONFLICT".to_string())
    }

    /// 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            message.into(),
            "INTERNAL_SERVER_ERROR".to_string(),
        )
    }

    /// 503 Service Unavailable.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            message.into(),
            "SERVICE_UNAVAILABLE".to_string(),
        )
    }

    /// HTTP status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Client-facing message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    success: bool,
    status_code: u16,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    error = %source,
                    "Internal server error"
                ),
                None => tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    "Internal server error"
                ),
            }
        }

        let body = ErrorResponse {
            success: false,
            status_code: self.status.as_u16(),
            code: self.code,
            message: self.message,
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<RegistrationError> for AppError {
    fn from(err: RegistrationError) -> Self {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = match &err {
            // Store details stay in the logs
            RegistrationError::StoreFailure(_) => "Server error, nothing was changed".to_string(),
            other => other.to_string(),
        };
        let error = Self::new(status, message, err.code().to_string());

        if err.is_domain() {
            error
        } else {
            error.with_source(anyhow::Error::new(err))
        }
    }
}

impl From<EntityStoreError> for AppError {
    fn from(err: EntityStoreError) -> Self {
        match err {
            EntityStoreError::DuplicateEmail(email) => {
                Self::conflict(format!("A user with email {email} already exists"))
            }
            other @ EntityStoreError::Unavailable(_) => {
                Self::unavailable("Storage is temporarily unavailable").with_source(other.into())
            }
            other => Self::internal("Server error").with_source(other.into()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use campus_events_core::registration::{Entity, InvalidReason, Operation};
    use campus_events_core::types::{EventId, UserId};

    async fn body_json(error: AppError) -> serde_json::Value {
        let response = error.into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_error_display() {
        let err = AppError::bad_request("Invalid input");
        assert_eq!(err.to_string(), "[BAD_REQUEST] Invalid input");
    }

    #[test]
    fn test_conflict_keeps_existing_contract() {
        let err = AppError::from(RegistrationError::Conflict);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "ALREADY_REGISTERED");
        assert_eq!(err.message(), "already registered");
    }

    #[test]
    fn test_domain_errors_map_to_client_statuses() {
        let err = AppError::from(RegistrationError::NotFound(Entity::Event));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.message(), "event not found");

        let err = AppError::from(RegistrationError::InvalidOperation(
            InvalidReason::RegistrationClosed,
        ));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.source.is_none());
    }

    #[test]
    fn test_store_failure_hides_details() {
        let err = AppError::from(RegistrationError::StoreFailure(EntityStoreError::Database(
            "connection reset".to_string(),
        )));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message().contains("connection reset"));
        assert!(err.source.is_some());
    }

    #[test]
    fn test_duplicate_email_is_conflict() {
        let err = AppError::from(EntityStoreError::DuplicateEmail("a@college.edu".to_string()));
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_partial_failure_body() {
        let event_id = EventId::new();
        let user_id = UserId::new();
        let err = AppError::from(RegistrationError::PartialFailure {
            operation: Operation::Register,
            event_id,
            user_id,
            source: EntityStoreError::Unavailable("down".to_string()),
        });

        let body = body_json(err).await;

        assert_eq!(body["success"], false);
        assert_eq!(body["statusCode"], 500);
        assert_eq!(body["code"], "PARTIAL_FAILURE");
        let message = body["message"].as_str().unwrap();
        assert!(message.contains(&format!("recorded on event {event_id} but not on user {user_id}")));
    }
}
