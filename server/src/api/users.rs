//! User endpoints: admin provisioning, the caller's profile and account deletion.

use super::events::EventResponse;
use crate::server::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use campus_events_core::entity_store::EntityStoreError;
use campus_events_core::types::{Role, User, UserId, UserUpdate, Year};
use campus_events_runtime::AccountDeletionReport;
use campus_events_web::{Actor, Admin, ApiResponse, AppError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MAX_BIO_CHARS: usize = 500;

/// Request to provision a user.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    /// Display name
    pub name: String,
    /// Email, stored lowercased
    pub email: String,
    /// Role
    pub role: Role,
    /// Year of study, required for students
    pub year: Option<Year>,
    /// Biography
    #[serde(default)]
    pub bio: String,
}

/// A user as returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    /// User id
    pub id: UserId,
    /// Display name
    pub name: String,
    /// Email
    pub email: String,
    /// Role
    pub role: Role,
    /// Year of study
    pub year: Option<Year>,
    /// Biography
    pub bio: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            year: user.year,
            bio: user.bio,
            created_at: user.created_at,
        }
    }
}

/// Profile: the user plus resolved registered events.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    /// The user
    #[serde(flatten)]
    pub user: UserResponse,
    /// Events the user is registered for, in registration order
    pub registered_events: Vec<EventResponse>,
}

/// `POST /api/users`
pub async fn create_user(
    State(state): State<AppState>,
    _admin: Admin,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<ApiResponse<UserResponse>>), AppError> {
    validate(&request)?;

    let mut user = User::new(
        request.name,
        &request.email,
        request.role,
        request.year,
        state.clock.now(),
    );
    user.bio = request.bio;

    state.store.insert_user(user.clone()).await?;
    tracing::info!(user_id = %user.id, role = %user.role, "User created");

    Ok(ApiResponse::created(
        UserResponse::from(user),
        "User created successfully",
    ))
}

/// `GET /api/users/me`
pub async fn get_profile(
    State(state): State<AppState>,
    actor: Actor,
) -> Result<Json<ApiResponse<ProfileResponse>>, AppError> {
    let user = state
        .store
        .find_user(actor.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    let events = state.roster.registered_events(actor.user_id).await?;

    let today = state.clock.today();
    Ok(Json(ApiResponse::ok(ProfileResponse {
        user: user.into(),
        registered_events: events
            .into_iter()
            .map(|event| EventResponse::from_event(event, today))
            .collect(),
    })))
}

/// `PATCH /api/users/profile`
///
/// Registrations are not part of the profile and are never written here.
pub async fn update_profile(
    State(state): State<AppState>,
    actor: Actor,
    Json(update): Json<UserUpdate>,
) -> Result<Json<ApiResponse<UserResponse>>, AppError> {
    validate_update(&update)?;

    let user = match state.store.update_user_profile(actor.user_id, update).await {
        Ok(user) => user.ok_or_else(|| AppError::not_found("User not found"))?,
        Err(EntityStoreError::DuplicateEmail(_)) => {
            return Err(AppError::bad_request("Email already in use"));
        }
        Err(error) => return Err(error.into()),
    };
    tracing::info!(user_id = %user.id, "Profile updated");

    Ok(Json(ApiResponse::with_message(
        UserResponse::from(user),
        "Profile updated successfully",
    )))
}

/// `DELETE /api/users/account`
pub async fn delete_account(
    State(state): State<AppState>,
    actor: Actor,
) -> Result<Json<ApiResponse<AccountDeletionReport>>, AppError> {
    let report = state.engine.delete_account(actor.user_id).await?;
    Ok(Json(ApiResponse::with_message(
        report,
        "Account deleted successfully",
    )))
}

/// `GET /api/admin/coordinators`
pub async fn list_coordinators(
    State(state): State<AppState>,
    _admin: Admin,
) -> Result<Json<ApiResponse<Vec<UserResponse>>>, AppError> {
    let coordinators = state
        .store
        .list_users()
        .await?
        .into_iter()
        .filter(|user| user.role == Role::Coordinator)
        .map(UserResponse::from)
        .collect();
    Ok(Json(ApiResponse::list(coordinators)))
}

fn validate_update(update: &UserUpdate) -> Result<(), AppError> {
    if update.name.as_ref().is_some_and(|name| name.trim().is_empty()) {
        return Err(AppError::validation("Name cannot be empty"));
    }
    if update.email.as_ref().is_some_and(|email| !is_valid_email(email.trim())) {
        return Err(AppError::validation("Please provide a valid email"));
    }
    if update.bio.as_ref().is_some_and(|bio| bio.chars().count() > MAX_BIO_CHARS) {
        return Err(AppError::validation(format!(
            "Bio cannot exceed {MAX_BIO_CHARS} characters"
        )));
    }
    Ok(())
}

fn validate(request: &CreateUserRequest) -> Result<(), AppError> {
    if request.name.trim().is_empty() {
        return Err(AppError::validation("Name is required"));
    }
    if !is_valid_email(request.email.trim()) {
        return Err(AppError::validation("Please provide a valid email"));
    }
    if request.role == Role::Student && request.year.is_none() {
        return Err(AppError::validation("Year is required for students"));
    }
    if request.bio.chars().count() > MAX_BIO_CHARS {
        return Err(AppError::validation(format!(
            "Bio cannot exceed {MAX_BIO_CHARS} characters"
        )));
    }
    Ok(())
}

/// `local@domain.tld` with no whitespace and a dotted domain.
fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    let labels: Vec<&str> = domain.split('.').collect();

    !local.is_empty()
        && !email.chars().any(char::is_whitespace)
        && !domain.contains('@')
        && labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty() && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
        && labels.last().is_some_and(|tld| tld.len() >= 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(role: Role, year: Option<Year>) -> CreateUserRequest {
        CreateUserRequest {
            name: "Lena".to_string(),
            email: "lena@college.edu".to_string(),
            role,
            year,
            bio: String::new(),
        }
    }

    #[test]
    fn email_shapes() {
        assert!(is_valid_email("lena@college.edu"));
        assert!(is_valid_email("first.last@cs.college.edu"));
        assert!(!is_valid_email("lena@college"));
        assert!(!is_valid_email("lena college@edu.in"));
        assert!(!is_valid_email("@college.edu"));
        assert!(!is_valid_email("lena@@college.edu"));
    }

    #[test]
    fn students_need_a_year() {
        assert!(validate(&request(Role::Student, None)).is_err());
        assert!(validate(&request(Role::Student, Some(Year::First))).is_ok());
        assert!(validate(&request(Role::Coordinator, None)).is_ok());
    }

    #[test]
    fn bio_is_capped() {
        let mut long = request(Role::Admin, None);
        long.bio = "x".repeat(MAX_BIO_CHARS + 1);
        assert!(validate(&long).is_err());
    }

    #[test]
    fn profile_update_checks_only_present_fields() {
        assert!(validate_update(&UserUpdate::default()).is_ok());

        let blank = UserUpdate {
            name: Some("   ".to_string()),
            ..UserUpdate::default()
        };
        assert!(validate_update(&blank).is_err());

        let bad_email = UserUpdate {
            email: Some("lena@college".to_string()),
            ..UserUpdate::default()
        };
        assert!(validate_update(&bad_email).is_err());

        let long_bio = UserUpdate {
            bio: Some("x".repeat(MAX_BIO_CHARS + 1)),
            ..UserUpdate::default()
        };
        assert!(validate_update(&long_bio).is_err());
    }
}
