//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use tally_storage::AccessBroker;

use crate::geoip::GeoIpLookup;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Sole gateway to stores and the result cache.
    pub broker: Arc<AccessBroker>,
    pub geoip: Arc<dyn GeoIpLookup>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(broker: Arc<AccessBroker>, geoip: Arc<dyn GeoIpLookup>) -> Self {
        Self {
            broker,
            geoip,
            start_time: Instant::now(),
        }
    }
}

crate::impl_from_ref!(Arc<AccessBroker>, broker);
crate::impl_from_ref!(Arc<dyn GeoIpLookup>, geoip);
crate::impl_from_ref!(Instant, start_time);
