//! Liveness and readiness endpoints.

use axum::{Json, extract::State, http::StatusCode};
use campus_events_core::entity_store::EntityStore;
use serde::Serialize;
use std::sync::Arc;

/// Liveness response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"`
    pub status: &'static str,
    /// Crate version
    pub version: &'static str,
}

/// `GET /health`. Does not touch the store.
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

/// Readiness response.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    /// Whether the service can take traffic
    pub ready: bool,
    /// Whether the entity store answered a ping
    pub store: bool,
}

/// `GET /ready`. `503` when the store does not answer.
///
/// Any router state works as long as it can hand out the store through
/// `FromRef`.
pub async fn readiness_check(
    State(store): State<Arc<dyn EntityStore>>,
) -> (StatusCode, Json<ReadinessResponse>) {
    match store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ReadinessResponse {
                ready: true,
                store: true,
            }),
        ),
        Err(error) => {
            tracing::warn!(%error, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessResponse {
                    ready: false,
                    store: false,
                }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_events_testing::{InMemoryEntityStore, StoreOperation};

    #[tokio::test]
    async fn test_simple_health_check() {
        let (status, Json(body)) = health_check().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "ok");
    }

    #[tokio::test]
    async fn test_readiness_follows_store() {
        let store = InMemoryEntityStore::new();
        let shared: Arc<dyn EntityStore> = Arc::new(store.clone());

        let (status, Json(body)) = readiness_check(State(Arc::clone(&shared))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.ready);

        store.fail_next(StoreOperation::Ping, 1);
        let (status, Json(body)) = readiness_check(State(shared)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!body.store);
    }
}
