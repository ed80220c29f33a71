//! Rota - pull request reviewer assignment and reassignment.

pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod openapi;
pub mod schema;
pub mod store;
pub mod telemetry;

use axum::{
    http::StatusCode,
    middleware as axum_middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use diesel::r2d2::{self, ConnectionManager};
use diesel::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::sync::Arc;
use std::time::Duration;

use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

use config::StorageBackend;
use engine::{Deadline, ReviewService, StorageError};
use error::ApiError;
use middleware::{metrics::metrics_middleware, request_id::request_id_middleware};
use store::{DbPool, MemoryStore, PgStore, ReviewStore};
use telemetry::{MetricsState, PrometheusMetrics};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Added to the transport timeout so the engine deadline always fires first.
const TIMEOUT_GRACE: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ReviewService>,
    pub metrics: MetricsState,
    pub request_timeout: Duration,
    pub long_request_timeout: Duration,
}

impl AppState {
    pub fn new(service: Arc<ReviewService>, config: &Config) -> Self {
        Self {
            service,
            metrics: MetricsState::new(config.telemetry.metrics_enabled),
            request_timeout: Duration::from_secs(config.server.request_timeout_secs),
            long_request_timeout: Duration::from_secs(config.timeouts.long_operation_secs),
        }
    }

    /// Deadline for single-entity workflows and reads.
    pub fn deadline(&self) -> Deadline {
        Deadline::within(self.request_timeout)
    }

    /// Deadline for bulk workflows.
    pub fn long_deadline(&self) -> Deadline {
        Deadline::within(self.long_request_timeout)
    }
}

pub fn create_router(state: AppState, config: &config::Config) -> Router {
    let cors = build_cors_layer(config);
    let body_limit = RequestBodyLimitLayer::new(config.server.max_body_size);

    let transport_timeout = Duration::from_secs(
        config
            .server
            .request_timeout_secs
            .max(config.timeouts.long_operation_secs),
    ) + TIMEOUT_GRACE;

    #[allow(deprecated)]
    let timeout = TimeoutLayer::new(transport_timeout);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let metrics_state = state.metrics.clone();
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::ready_check))
        .route("/health/live", get(handlers::health::live_check))
        .route(
            "/metrics",
            get(telemetry::metrics::metrics_handler).with_state(metrics_state),
        )
        .with_state(state.clone());

    let team_routes = Router::new()
        .route("/team/add", post(handlers::teams::create_team))
        .route("/team/get", get(handlers::teams::get_team))
        .route("/team/deactivate", post(handlers::teams::deactivate_team))
        .with_state(state.clone());

    let user_routes = Router::new()
        .route("/users/setIsActive", post(handlers::users::set_is_active))
        .route("/users/getReview", get(handlers::users::get_review))
        .with_state(state.clone());

    let pull_request_routes = Router::new()
        .route(
            "/pullRequest/create",
            post(handlers::pull_requests::create_pull_request),
        )
        .route(
            "/pullRequest/merge",
            post(handlers::pull_requests::merge_pull_request),
        )
        .route(
            "/pullRequest/reassign",
            post(handlers::pull_requests::reassign_reviewer),
        )
        .route(
            "/pullRequest/history",
            get(handlers::pull_requests::assignment_history),
        )
        .route(
            "/stats/assignments",
            get(handlers::stats::assignment_stats),
        )
        .with_state(state);

    let docs_routes = openapi::swagger_router();

    Router::new()
        .merge(docs_routes)
        .merge(public_routes)
        .merge(team_routes)
        .merge(user_routes)
        .merge(pull_request_routes)
        .fallback(fallback_handler)
        .layer(axum_middleware::from_fn(metrics_middleware))
        .layer(axum_middleware::from_fn(request_id_middleware))
        .layer(trace_layer)
        .layer(timeout)
        .layer(body_limit)
        .layer(cors)
}

async fn fallback_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ApiError::new("NOT_FOUND", "route not found")),
    )
}

fn build_cors_layer(config: &config::Config) -> CorsLayer {
    use axum::http::header::HeaderName;
    use axum::http::Method;

    let is_wildcard_origin = config.cors.allowed_origins.contains(&"*".to_string())
        || config.cors.allowed_origins.is_empty();

    let methods: Vec<Method> = config
        .cors
        .allowed_methods
        .iter()
        .filter_map(|m| m.parse().ok())
        .collect();

    let headers: Vec<HeaderName> = config
        .cors
        .allowed_headers
        .iter()
        .filter_map(|h| h.parse().ok())
        .collect();

    let max_age = Duration::from_secs(config.cors.max_age_secs);

    let cors = match (config.cors.allow_credentials, is_wildcard_origin) {
        (true, true) => CorsLayer::new()
            .allow_origin(tower_http::cors::AllowOrigin::mirror_request())
            .allow_credentials(true),
        (true, false) => CorsLayer::new()
            .allow_origin(parse_origins(config))
            .allow_credentials(true),
        (false, true) => CorsLayer::new().allow_origin(Any),
        (false, false) => CorsLayer::new().allow_origin(parse_origins(config)),
    };

    cors.allow_methods(methods)
        .allow_headers(headers)
        .max_age(max_age)
}

fn parse_origins(config: &config::Config) -> Vec<axum::http::HeaderValue> {
    config
        .cors
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect()
}

pub fn create_db_pool(config: &config::Config) -> Result<DbPool, StorageError> {
    let manager = ConnectionManager::<PgConnection>::new(&config.database.url);
    r2d2::Pool::builder()
        .max_size(config.database.max_connections)
        .min_idle(Some(config.database.min_connections))
        .connection_timeout(Duration::from_secs(config.database.connection_timeout_secs))
        .idle_timeout(Some(Duration::from_secs(config.database.idle_timeout_secs)))
        .build(manager)
        .map_err(StorageError::new)
}

pub fn create_db_pool_with_url(database_url: &str) -> Result<DbPool, StorageError> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    r2d2::Pool::builder()
        .max_size(10)
        .min_idle(Some(2))
        .connection_timeout(Duration::from_secs(30))
        .idle_timeout(Some(Duration::from_secs(600)))
        .build(manager)
        .map_err(StorageError::new)
}

pub fn run_migrations(pool: &DbPool) -> Result<(), StorageError> {
    let mut conn = pool.get().map_err(StorageError::new)?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(StorageError::new)?;

    info!(applied = applied.len(), "Database migrations complete");
    Ok(())
}

/// Opens the configured backend, applying migrations to Postgres when enabled.
pub fn build_store(config: &config::Config) -> Result<Arc<dyn ReviewStore>, StorageError> {
    match config.storage.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageBackend::Postgres => {
            let pool = create_db_pool(config)?;
            if config.database.run_migrations {
                run_migrations(&pool)?;
            }
            Ok(Arc::new(PgStore::new(pool)))
        }
    }
}

/// Wires the engine to a store with production metrics and configured budgets.
pub fn build_service(store: Arc<dyn ReviewStore>, config: &config::Config) -> ReviewService {
    ReviewService::builder(store)
        .metrics(Arc::new(PrometheusMetrics))
        .timeouts(config.timeouts.operations())
        .build()
}

pub fn init_tracing(config: &config::Config) {
    telemetry::init_telemetry(config);
}

pub use telemetry::tracing::shutdown_telemetry;

pub use config::Config;

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> AppState {
        let config = Config::default_for_testing();
        let store = build_store(&config).unwrap();
        AppState::new(Arc::new(build_service(store, &config)), &config)
    }

    #[test]
    fn test_app_state_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[test]
    fn test_memory_backend_selected_for_testing() {
        let state = test_state();
        assert_eq!(state.service.backend(), "memory");
    }

    #[test]
    fn test_long_deadline_outlasts_request_deadline() {
        let state = test_state();
        let short = state.deadline().remaining().unwrap();
        let long = state.long_deadline().remaining().unwrap();
        assert!(long > short);
    }

    #[test]
    fn test_build_cors_layer_wildcard() {
        let mut config = Config::default_for_testing();
        config.cors.allowed_origins = vec!["*".to_string()];
        let _ = build_cors_layer(&config);
    }

    #[test]
    fn test_build_cors_layer_specific_origins_with_credentials() {
        let mut config = Config::default_for_testing();
        config.cors.allowed_origins = vec![
            "http://localhost:3000".to_string(),
            "https://example.com".to_string(),
        ];
        config.cors.allow_credentials = true;
        let _ = build_cors_layer(&config);
    }
}
