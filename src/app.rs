use crate::config::AppConfig;
use crate::ingest::handler as ingest_handler;
use crate::query::handler as query_handler;
use crate::storage::ClickStore;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Shared handler state: the click store, owned for the life of the server.
pub struct AppState {
    pub store: Arc<dyn ClickStore>,
}

/// Build the HTTP surface over `store`.
pub fn build_router(store: Arc<dyn ClickStore>, config: &AppConfig) -> Router {
    let state = Arc::new(AppState { store });

    let counter_routes = Router::new()
        .route("/counter/{id}", post(ingest_handler::increment_clicks))
        .route("/stats/{id}", post(query_handler::get_stats))
        .layer(DefaultBodyLimit::max(config.server.max_body_bytes))
        .with_state(state.clone());

    let counter_routes = if config.rate_limit.enabled {
        let governor_conf = GovernorConfigBuilder::default()
            .key_extractor(SmartIpKeyExtractor)
            .per_millisecond(config.rate_limit.replenish_interval_ms)
            .burst_size(config.rate_limit.burst_size)
            .finish()
            .expect("rate limit settings are validated at load");
        tracing::info!(
            replenish_interval_ms = config.rate_limit.replenish_interval_ms,
            burst_size = config.rate_limit.burst_size,
            "rate limiting enabled"
        );
        counter_routes.layer(GovernorLayer::new(governor_conf))
    } else {
        counter_routes
    };

    let health_route = Router::new()
        .route("/health", get(query_handler::health))
        .with_state(state);

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .merge(counter_routes)
        .merge(health_route)
        .layer(cors)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.server.request_timeout_secs),
        ))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
}
