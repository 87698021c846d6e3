//! Store lifecycle routes.

use std::sync::Arc;

use axum::{extract::State, Json};
use tally_core::StoreName;
use tally_storage::AccessBroker;

use crate::error::ApiResult;
use crate::extractors::ApiPath;
use crate::telemetry::metrics;
use crate::types::Empty;

/// DELETE /{store} - remove a store and its cached results.
pub async fn delete(
    State(broker): State<Arc<AccessBroker>>,
    ApiPath(store): ApiPath<String>,
) -> ApiResult<Json<Empty>> {
    let store = StoreName::new(store)?;
    broker.delete(&store).await?;
    if let Some(metrics) = metrics() {
        metrics.set_open_stores(broker.registry().open_count());
    }
    Ok(Json(Empty {}))
}
