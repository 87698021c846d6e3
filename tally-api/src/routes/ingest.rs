//! Write routes.
//!
//! Both routes create the store on first insert. Bodies are read as raw bytes
//! so that any decode failure maps to `INVALID_JSON`.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    Json,
};
use tally_core::{AnalyticRecord, StoreName, TallyResult};
use tally_storage::AccessBroker;
use tracing::{debug, info};

use crate::error::ApiResult;
use crate::extractors::ApiPath;
use crate::geoip::GeoIpLookup;
use crate::telemetry::metrics;
use crate::types::{Empty, PostAnalytic, PostData};

async fn insert_under_checkout(
    broker: &AccessBroker,
    store: &StoreName,
    record: &AnalyticRecord,
) -> TallyResult<()> {
    let checkout = broker.checkout_or_create(store).await?;
    if let Some(metrics) = metrics() {
        metrics.record_checkout_wait(checkout.waited().as_secs_f64());
    }
    checkout.insert(record)
}

async fn store_record(
    broker: &AccessBroker,
    store: &StoreName,
    record: &AnalyticRecord,
    route: &str,
) -> ApiResult<Json<Empty>> {
    let result = insert_under_checkout(broker, store, record).await;

    if let Some(metrics) = metrics() {
        metrics.record_insert(route, result.is_ok());
        metrics.set_open_stores(broker.registry().open_count());
    }
    result?;

    info!(store = %store, event = %record.event, time = %record.time, "Inserted record");
    Ok(Json(Empty {}))
}

/// POST /{store} - insert an event, deriving platform, referer domain and country.
pub async fn insert(
    State(broker): State<Arc<AccessBroker>>,
    State(geoip): State<Arc<dyn GeoIpLookup>>,
    ApiPath(store): ApiPath<String>,
    body: Bytes,
) -> ApiResult<Json<Empty>> {
    let store = StoreName::new(store)?;
    let data: PostData = serde_json::from_slice(&body)?;
    let raw = data.into_raw_event()?;

    let country = match geoip.country(&raw.ip) {
        Ok(code) => Some(code),
        Err(e) => {
            debug!(ip = %raw.ip, error = %e, "GeoIP lookup failed");
            None
        }
    };
    let record = AnalyticRecord::from_raw(raw, country);

    store_record(&broker, &store, &record, "standard").await
}

/// POST /{store}/special - insert a fully specified record as-is.
pub async fn insert_special(
    State(broker): State<Arc<AccessBroker>>,
    ApiPath(store): ApiPath<String>,
    body: Bytes,
) -> ApiResult<Json<Empty>> {
    let store = StoreName::new(store)?;
    let data: PostAnalytic = serde_json::from_slice(&body)?;
    let record = data.into_record()?;

    store_record(&broker, &store, &record, "special").await
}
