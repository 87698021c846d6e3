//! Service Information Endpoints
//!
//! - / - Welcome message and version
//! - /health - Liveness with store and cache statistics
//!
//! `health` shadows a store of the same name for GET requests.

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tally_storage::{AccessBroker, CacheStats};

use crate::types::WelcomeResponse;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub open_stores: usize,
    pub cache: CacheReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheReport {
    pub capacity: usize,
    #[serde(flatten)]
    pub stats: CacheStats,
    pub hit_rate: f64,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET / - Welcome message
pub async fn welcome() -> Json<WelcomeResponse> {
    Json(WelcomeResponse::default())
}

/// GET /health - Process liveness with runtime statistics
pub async fn health(
    State(broker): State<Arc<AccessBroker>>,
    State(start_time): State<Instant>,
) -> Json<HealthResponse> {
    let stats = broker.cache().stats();
    Json(HealthResponse {
        status: HealthStatus::Healthy,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: start_time.elapsed().as_secs(),
        open_stores: broker.registry().open_count(),
        cache: CacheReport {
            capacity: broker.cache().capacity(),
            stats,
            hit_rate: stats.hit_rate(),
        },
    })
}
