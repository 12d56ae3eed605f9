//! Update endpoints

use axum::Json;
use axum::extract::{Path, State};
use tracing::debug;

use crate::api::{ApiResult, ApiState};
use crate::storage::Metric;

/// POST /update/:kind/:name/:value
///
/// Raw textual update. The kind and value are validated by the store.
pub async fn update_raw(
    State(state): State<ApiState>,
    Path((kind, name, value)): Path<(String, String, String)>,
) -> ApiResult<&'static str> {
    state.store.update(&kind, &name, &value).await?;
    debug!(%kind, %name, %value, "metric updated");

    state.after_update().await;
    Ok("ok")
}

/// POST /update
///
/// Typed JSON update; responds with the value stored after the merge
pub async fn update_json(
    State(state): State<ApiState>,
    Json(metric): Json<Metric>,
) -> ApiResult<Json<Metric>> {
    state.store.update_typed(&metric).await?;
    let stored = state.store.get_value(metric.kind, &metric.id).await?;

    state.after_update().await;
    Ok(Json(Metric::from_value(metric.id, stored)))
}

/// POST /updates
///
/// JSON array of typed updates, applied all or nothing
pub async fn update_batch(
    State(state): State<ApiState>,
    Json(metrics): Json<Vec<Metric>>,
) -> ApiResult<&'static str> {
    state.store.update_batch(&metrics).await?;
    debug!("applied batch of {} updates", metrics.len());

    state.after_update().await;
    Ok("ok")
}
