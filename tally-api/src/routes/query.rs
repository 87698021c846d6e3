//! Read routes: totals, group-by and over-time.
//!
//! Every parameter is validated before the store is touched. Results are
//! served from the result cache when possible and otherwise computed under an
//! exclusive checkout.

use std::sync::Arc;

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use tally_core::{GroupProperty, QueryResult, StoreName, TallyResult};
use tally_storage::{AccessBroker, CacheKey, Checkout};

use crate::error::{ApiError, ApiResult};
use crate::extractors::{ApiPath, ApiQuery};
use crate::telemetry::metrics;
use crate::types::QueryParams;

fn json_response(result: &QueryResult) -> ApiResult<Response> {
    let body = serde_json::to_vec(result)
        .map_err(|e| ApiError::internal_error(format!("Failed to encode result: {}", e)))?;
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

async fn serve<F>(
    broker: &AccessBroker,
    store: &StoreName,
    key: CacheKey,
    compute: F,
) -> ApiResult<Response>
where
    F: FnOnce(&Checkout<'_>) -> TallyResult<QueryResult>,
{
    let served = broker.read(store, key, compute).await?;
    if let Some(metrics) = metrics() {
        metrics.record_cache_lookup(served.cache_hit);
        if !served.cache_hit {
            metrics.record_checkout_wait(served.waited.as_secs_f64());
        }
        metrics.set_open_stores(broker.registry().open_count());
    }
    json_response(&served.result)
}

/// GET /{store} - totals within `[start, end)`.
pub async fn totals(
    State(broker): State<Arc<AccessBroker>>,
    ApiPath(store): ApiPath<String>,
    ApiQuery(params): ApiQuery<QueryParams>,
) -> ApiResult<Response> {
    let store = StoreName::new(store)?;
    let range = params.range()?;

    let key = CacheKey::totals(&store, &range);
    serve(&broker, &store, key, |checkout| {
        Ok(checkout.query(&range)?.into())
    })
    .await
}

/// GET /{store}/{property} - counts per value of an allow-listed property.
pub async fn group_by(
    State(broker): State<Arc<AccessBroker>>,
    ApiPath((store, property)): ApiPath<(String, String)>,
    ApiQuery(params): ApiQuery<QueryParams>,
) -> ApiResult<Response> {
    let store = StoreName::new(store)?;
    let property: GroupProperty = property.parse()?;
    let range = params.range()?;
    let unique = params.unique();

    let key = CacheKey::group_by(&store, property, &range, unique);
    serve(&broker, &store, key, |checkout| {
        Ok(checkout.group_by(property, &range, unique)?.into())
    })
    .await
}

/// GET /{store}/time - bucketed counts.
pub async fn over_time(
    State(broker): State<Arc<AccessBroker>>,
    ApiPath(store): ApiPath<String>,
    ApiQuery(params): ApiQuery<QueryParams>,
) -> ApiResult<Response> {
    let store = StoreName::new(store)?;
    let range = params.range()?;
    let interval = params.interval()?;
    interval.check_range(&range)?;
    let unique = params.unique();

    let key = CacheKey::over_time(&store, interval, &range, unique);
    serve(&broker, &store, key, |checkout| {
        Ok(checkout.over_time(interval, &range, unique)?.into())
    })
    .await
}
