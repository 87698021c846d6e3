//! Route assembly.
//!
//! | Method | Path                 | Handler                 |
//! |--------|----------------------|-------------------------|
//! | GET    | `/`                  | [`health::welcome`]     |
//! | GET    | `/health`            | [`health::health`]      |
//! | GET    | `/metrics`           | Prometheus exposition   |
//! | GET    | `/{store}`           | [`query::totals`]       |
//! | GET    | `/{store}/time`      | [`query::over_time`]    |
//! | GET    | `/{store}/{property}`| [`query::group_by`]     |
//! | POST   | `/{store}`           | [`ingest::insert`]      |
//! | POST   | `/{store}/special`   | [`ingest::insert_special`] |
//! | DELETE | `/{store}`           | [`store::delete`]       |
//!
//! Static segments win over parameters, so stores named `health` or
//! `metrics` cannot be read over GET, and `time`/`special` are never treated
//! as grouping properties.

pub mod health;
pub mod ingest;
pub mod query;
pub mod store;

use std::time::Duration;

use axum::{
    http::{header, HeaderValue, Method},
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

async fn not_found() -> ApiError {
    ApiError::route_not_found()
}

/// CORS for browser-side trackers.
///
/// No configured origins allows any origin. Otherwise origins are matched by
/// [`ApiConfig::is_origin_allowed`], which also understands `*.domain` entries.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if !config.is_production() {
        tracing::info!("CORS open to all origins");
        return cors.allow_origin(Any);
    }

    tracing::info!(origins = ?config.cors_origins, "CORS restricted");
    let allowed = config.clone();
    cors.allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
        origin
            .to_str()
            .map(|o| allowed.is_origin_allowed(o))
            .unwrap_or(false)
    }))
}

/// Create the complete API router.
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    Router::new()
        .route("/", get(health::welcome))
        .route("/health", get(health::health))
        .route("/metrics", get(metrics_handler))
        .route(
            "/:store",
            get(query::totals)
                .post(ingest::insert)
                .delete(store::delete),
        )
        .route("/:store/time", get(query::over_time))
        .route("/:store/special", post(ingest::insert_special))
        .route("/:store/:property", get(query::group_by))
        .route_layer(from_fn(observability_middleware))
        .fallback(not_found)
        .layer(build_cors_layer(config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
