//! Campus Events HTTP server.

use axum::http::{HeaderName, HeaderValue, Method, header};
use campus_events_core::entity_store::EntityStore;
use campus_events_core::environment::SystemClock;
use campus_events_postgres::PostgresEntityStore;
use campus_events_runtime::metrics::MetricsRecorder;
use campus_events_server::{AppState, Config, StoreBackend, build_router};
use campus_events_testing::InMemoryEntityStore;
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .env is optional
    let _ = dotenvy::dotenv();
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.server.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        store_backend = ?config.store_backend,
        address = %config.bind_address(),
        repair_retries = config.registration.repair_retries,
        "Starting Campus Events server"
    );

    let mut metrics = MetricsRecorder::new();
    metrics.install()?;

    let store: Arc<dyn EntityStore> = match config.store_backend {
        StoreBackend::Postgres => {
            info!("Connecting to PostgreSQL...");
            let store =
                PostgresEntityStore::connect(&config.postgres.url, &config.pool_settings()).await?;
            store.migrate().await?;
            Arc::new(store)
        }
        StoreBackend::Memory => {
            warn!("Using the in-memory store; data is lost on restart");
            Arc::new(InMemoryEntityStore::new())
        }
    };

    let state = AppState::new(
        store,
        Arc::new(SystemClock),
        config.repair_policy(),
        metrics,
    );
    let engine = state.engine.clone();

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config)?);

    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    info!(address = %config.bind_address(), "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Detached commits keep running after their callers are gone
    if engine.drain(config.shutdown_timeout()).await {
        info!("All registration commits finished");
    } else {
        warn!(
            pending = engine.pending_commits(),
            "Shutdown timeout reached with registration commits still running"
        );
    }

    info!("Server shut down");
    Ok(())
}

fn cors_layer(config: &Config) -> Result<CorsLayer, Box<dyn std::error::Error>> {
    let Some(origin) = &config.server.cors_allowed_origin else {
        return Ok(CorsLayer::permissive());
    };

    Ok(CorsLayer::new()
        .allow_origin(origin.parse::<HeaderValue>()?)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static("x-user-id"),
            HeaderName::from_static("x-user-role"),
            HeaderName::from_static("x-correlation-id"),
        ])
        .expose_headers([
            header::CONTENT_DISPOSITION,
            HeaderName::from_static("x-correlation-id"),
        ]))
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down gracefully..."),
        () = terminate => info!("Received SIGTERM, shutting down gracefully..."),
    }
}
