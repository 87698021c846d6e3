//! Tally API - HTTP Surface
//!
//! Axum routes over the tally store broker: aggregate reads with response
//! caching, event ingestion with GeoIP enrichment, and store deletion.

pub mod config;
pub mod error;
pub mod extractors;
pub mod geoip;
pub mod macros;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod types;

use std::sync::Arc;

use tally_storage::{AccessBroker, Registry, ResultCache};

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use geoip::{CidrTable, GeoIpError, GeoIpLookup, NoGeoIp};
pub use routes::create_router;
pub use state::AppState;

/// Build the broker and GeoIP resolver described by `config`.
///
/// A missing or unreadable GeoIP table is logged and replaced by [`NoGeoIp`].
pub fn build_state(config: &ApiConfig) -> ApiResult<AppState> {
    let registry = Registry::new(&config.data_dir, config.engine_options())?;
    let cache = ResultCache::new(config.cache_capacity);
    let broker = AccessBroker::new(registry, cache, config.broker_config());

    let geoip: Arc<dyn GeoIpLookup> = match &config.geoip_table {
        Some(path) => match CidrTable::load(path) {
            Ok(table) => {
                tracing::info!(path = %path.display(), networks = table.len(), "Loaded GeoIP table");
                Arc::new(table)
            }
            Err(e) => {
                tracing::warn!(error = %e, "GeoIP disabled");
                Arc::new(NoGeoIp)
            }
        },
        None => Arc::new(NoGeoIp),
    };

    Ok(AppState::new(Arc::new(broker), geoip))
}
