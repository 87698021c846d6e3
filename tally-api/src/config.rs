//! API Configuration Module
//!
//! Server, storage, cache and CORS settings. Configuration is loaded from
//! environment variables with sensible defaults for development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tally_storage::{BrokerConfig, EngineOptions};

use crate::error::{ApiError, ApiResult};

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// Runtime configuration for the tally server.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    // ========================================================================
    // Server
    // ========================================================================
    /// Interface to bind.
    pub bind_host: String,

    /// TCP port to listen on.
    pub port: String,

    // ========================================================================
    // Storage
    // ========================================================================
    /// Directory holding one subdirectory per store.
    pub data_dir: PathBuf,

    /// Per-store LMDB map size, in megabytes.
    pub map_size_mb: usize,

    /// Maximum number of cached query results. Zero disables the cache.
    pub cache_capacity: usize,

    /// Give up on a contended store after this long. `None` waits forever.
    pub checkout_timeout: Option<Duration>,

    /// Drop a store's cached results on every insert into it.
    pub invalidate_on_write: bool,

    /// Optional `network,country_code` CSV used for GeoIP lookups.
    pub geoip_table: Option<PathBuf>,

    // ========================================================================
    // CORS Configuration
    // ========================================================================
    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: "7070".to_string(),
            data_dir: PathBuf::from("./dbs"),
            map_size_mb: EngineOptions::default().map_size_mb,
            cache_capacity: 10_000,
            checkout_timeout: None,
            invalidate_on_write: true,
            geoip_table: None,
            cors_origins: Vec::new(), // Empty = allow all
            cors_max_age_secs: 86400, // 24 hours
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `TALLY_API_BIND`: Interface to bind (default: 0.0.0.0)
    /// - `PORT` or `TALLY_API_PORT`: Port (default: 7070)
    /// - `TALLY_DATA_DIR`: Store root directory (default: ./dbs)
    /// - `TALLY_MAP_SIZE_MB`: Per-store LMDB map size (default: 64)
    /// - `TALLY_CACHE_CAPACITY`: Cached result entries (default: 10000)
    /// - `TALLY_CHECKOUT_TIMEOUT_MS`: Checkout wait bound (default: unset, wait forever)
    /// - `TALLY_INVALIDATE_ON_WRITE`: "true" or "false" (default: true)
    /// - `TALLY_GEOIP_TABLE`: Path to a `network,country_code` CSV (default: unset)
    /// - `TALLY_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `TALLY_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind_host = std::env::var("TALLY_API_BIND").unwrap_or(defaults.bind_host);

        let port = std::env::var("PORT")
            .ok()
            .or_else(|| std::env::var("TALLY_API_PORT").ok())
            .unwrap_or(defaults.port);

        let data_dir = std::env::var("TALLY_DATA_DIR")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let map_size_mb = std::env::var("TALLY_MAP_SIZE_MB")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|mb| *mb > 0)
            .unwrap_or(defaults.map_size_mb);

        let cache_capacity = std::env::var("TALLY_CACHE_CAPACITY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.cache_capacity);

        let checkout_timeout = std::env::var("TALLY_CHECKOUT_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);

        let invalidate_on_write = std::env::var("TALLY_INVALIDATE_ON_WRITE")
            .ok()
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(defaults.invalidate_on_write);

        let geoip_table = std::env::var("TALLY_GEOIP_TABLE")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let cors_origins = std::env::var("TALLY_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let cors_max_age_secs = std::env::var("TALLY_CORS_MAX_AGE_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.cors_max_age_secs);

        Self {
            bind_host,
            port,
            data_dir,
            map_size_mb,
            cache_capacity,
            checkout_timeout,
            invalidate_on_write,
            geoip_table,
            cors_origins,
            cors_max_age_secs,
        }
    }

    /// Resolve the listen address.
    pub fn bind_addr(&self) -> ApiResult<SocketAddr> {
        let port = self.port.parse::<u16>().map_err(|_| {
            ApiError::internal_error(format!("Invalid port value: {}", self.port))
        })?;

        let addr = format!("{}:{}", self.bind_host, port);
        addr.parse::<SocketAddr>().map_err(|e| {
            ApiError::internal_error(format!("Invalid bind address {}: {}", addr, e))
        })
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            map_size_mb: self.map_size_mb,
        }
    }

    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig::new()
            .with_checkout_timeout(self.checkout_timeout)
            .with_invalidate_on_write(self.invalidate_on_write)
    }

    /// Check if running in production mode (strict CORS).
    pub fn is_production(&self) -> bool {
        !self.cors_origins.is_empty()
    }

    /// Check if a given origin is allowed.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        if self.cors_origins.is_empty() {
            return true;
        }

        self.cors_origins.iter().any(|allowed| {
            if allowed == origin {
                return true;
            }
            // Wildcard subdomains: *.example.com
            if let Some(pattern) = allowed.strip_prefix("*.") {
                if let Some(origin_domain) = origin.strip_prefix("https://") {
                    return origin_domain.ends_with(&format!(".{pattern}"))
                        || origin_domain == pattern;
                }
            }
            false
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert_eq!(config.port, "7070");
        assert_eq!(config.data_dir, PathBuf::from("./dbs"));
        assert_eq!(config.cache_capacity, 10_000);
        assert_eq!(config.map_size_mb, 64);
        assert!(config.checkout_timeout.is_none());
        assert!(config.invalidate_on_write);
        assert!(config.cors_origins.is_empty());
    }

    #[test]
    fn test_bind_addr() {
        let config = ApiConfig::default();
        assert_eq!(config.bind_addr().unwrap().port(), 7070);

        let bad = ApiConfig {
            port: "seventy".into(),
            ..ApiConfig::default()
        };
        assert!(bad.bind_addr().is_err());
    }

    #[test]
    fn test_broker_config_follows_settings() {
        let config = ApiConfig {
            checkout_timeout: Some(Duration::from_millis(250)),
            invalidate_on_write: false,
            ..ApiConfig::default()
        };
        let broker = config.broker_config();
        assert_eq!(broker.checkout_timeout, Some(Duration::from_millis(250)));
        assert!(!broker.invalidate_on_write);
    }

    #[test]
    fn test_origin_allowed() {
        let mut config = ApiConfig::default();
        assert!(!config.is_production());
        assert!(config.is_origin_allowed("http://localhost:3000"));

        config.cors_origins = vec![
            "https://stats.example.com".to_string(),
            "*.example.org".to_string(),
        ];
        assert!(config.is_production());
        assert!(config.is_origin_allowed("https://stats.example.com"));
        assert!(config.is_origin_allowed("https://app.example.org"));
        assert!(!config.is_origin_allowed("https://evilexample.org"));
        assert!(!config.is_origin_allowed("https://evil.com"));
    }
}
