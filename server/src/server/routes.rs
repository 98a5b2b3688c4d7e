//! Router configuration for Campus Events.

use super::state::AppState;
use crate::api::{admin, events, registrations, users};
use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{delete, get, patch, post},
};
use campus_events_web::correlation_id_layer;
use campus_events_web::handlers::{health_check, readiness_check};

/// Build the complete router.
///
/// Health, readiness and metrics sit at the root; everything else is nested
/// under `/api`. Callers add transport layers (tracing, CORS) on top.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Events
        .route("/events", get(events::list_events).post(events::create_event))
        .route(
            "/events/:id",
            get(events::get_event)
                .put(events::update_event)
                .patch(events::update_event)
                .delete(events::delete_event),
        )
        // Registrations
        .route(
            "/events/:id/register",
            post(registrations::register).delete(registrations::unregister),
        )
        .route(
            "/events/:id/registrations",
            get(registrations::list_participants),
        )
        .route(
            "/events/:id/registrations/export",
            get(registrations::export_participants),
        )
        .route(
            "/events/:id/registrations/:user_id",
            delete(registrations::remove_participant),
        )
        // Users
        .route("/users", post(users::create_user))
        .route("/users/me", get(users::get_profile))
        .route("/users/profile", patch(users::update_profile))
        .route("/users/account", delete(users::delete_account))
        // Admin
        .route("/admin/coordinators", get(users::list_coordinators))
        .route("/admin/consistency", get(admin::scan))
        .route("/admin/consistency/repair", post(admin::repair));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(render_metrics))
        .nest("/api", api_routes)
        .layer(correlation_id_layer())
        .with_state(state)
}

/// Prometheus text exposition.
#[allow(clippy::unused_async)]
async fn render_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.render() {
        Some(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            "metrics recorder not installed".to_string(),
        ),
    }
}
