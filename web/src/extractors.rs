//! Custom Axum extractors.
//!
//! - [`CorrelationId`]: the request's correlation id
//! - [`Actor`]: the already-authenticated caller, read from gateway headers
//! - [`Student`], [`Staff`], [`Admin`]: role gates over [`Actor`]
//!
//! Identity is established upstream. These extractors only read the
//! `X-User-Id` / `X-User-Role` headers the gateway sets and apply route-level
//! role checks; a missing or malformed identity is `401`, a wrong role `403`.
//!
//! ```ignore
//! async fn export(staff: Staff, Path(event_id): Path<EventId>) -> Result<Response, AppError> {
//!     tracing::info!(actor = %staff.user_id(), "Exporting roster");
//!     // ...
//! }
//! ```

use crate::error::AppError;
use crate::middleware::CORRELATION_ID_HEADER;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};
use campus_events_core::types::{Role, UserId};
use uuid::Uuid;

/// Header carrying the caller's user id.
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Header carrying the caller's role.
pub const USER_ROLE_HEADER: &str = "X-User-Role";

/// Correlation ID for request tracing.
///
/// Prefers the id stored by the correlation middleware, then the
/// `X-Correlation-ID` header, and generates a new UUID v4 otherwise.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(id) = parts.extensions.get::<CorrelationId>() {
            return Ok(*id);
        }

        Ok(Self(
            correlation_id_from(&parts.headers).unwrap_or_else(Uuid::new_v4),
        ))
    }
}

/// The `X-Correlation-ID` header, if it holds a UUID.
pub(crate) fn correlation_id_from(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
}

/// The caller of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    /// Caller's user id
    pub user_id: UserId,
    /// Caller's role
    pub role: Role,
}

impl Actor {
    /// Whether the caller has one of the given roles.
    #[must_use]
    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        roles.contains(&self.role)
    }

    /// Whether the caller is an admin.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Fail with `403` unless the caller has one of the given roles.
    ///
    /// # Errors
    ///
    /// Returns a forbidden [`AppError`] naming the caller's role.
    pub fn require(&self, roles: &[Role]) -> Result<(), AppError> {
        if self.has_any_role(roles) {
            Ok(())
        } else {
            metrics::counter!("http_forbidden_total", "role" => self.role.as_str()).increment(1);
            Err(AppError::forbidden(format!(
                "Role {} is not allowed to perform this action",
                self.role
            )))
        }
    }

    fn from_headers(headers: &HeaderMap) -> Result<Self, AppError> {
        let user_id = header_str(headers, USER_ID_HEADER)?
            .parse::<Uuid>()
            .map(UserId::from_uuid)
            .map_err(|_| unauthorized("malformed user id"))?;
        let role = header_str(headers, USER_ROLE_HEADER)?
            .parse::<Role>()
            .map_err(|_| unauthorized("unknown role"))?;

        Ok(Self { user_id, role })
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, AppError> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| unauthorized("missing identity"))
}

fn unauthorized(reason: &'static str) -> AppError {
    metrics::counter!("http_unauthorized_total", "reason" => reason).increment(1);
    tracing::debug!(reason, "Rejected request without a usable identity");
    AppError::unauthorized("Not authorized, no valid identity")
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers)
    }
}

macro_rules! role_gate {
    ($(#[$doc:meta])* $name:ident => [$($role:expr),+ $(,)?]) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name(pub Actor);

        impl $name {
            /// Roles admitted by this gate.
            pub const ROLES: &[Role] = &[$($role),+];

            /// Caller's user id.
            #[must_use]
            pub const fn user_id(&self) -> UserId {
                self.0.user_id
            }

            /// The underlying actor.
            #[must_use]
            pub const fn actor(&self) -> Actor {
                self.0
            }
        }

        #[async_trait]
        impl<S> FromRequestParts<S> for $name
        where
            S: Send + Sync,
        {
            type Rejection = AppError;

            async fn from_request_parts(
                parts: &mut Parts,
                state: &S,
            ) -> Result<Self, Self::Rejection> {
                let actor = Actor::from_request_parts(parts, state).await?;
                actor.require(Self::ROLES)?;
                Ok(Self(actor))
            }
        }
    };
}

role_gate!(
    /// A caller with the student role.
    Student => [Role::Student]
);

role_gate!(
    /// A coordinator or admin.
    Staff => [Role::Coordinator, Role::Admin]
);

role_gate!(
    /// An admin.
    Admin => [Role::Admin]
);
