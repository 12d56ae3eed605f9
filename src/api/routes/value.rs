//! Read endpoints

use axum::Json;
use axum::extract::{Path, State};

use crate::api::{ApiResult, ApiState};
use crate::storage::{MetricKind, StoreState};

/// GET /value/:kind/:name
///
/// The current value as plain text
pub async fn get_value(
    State(state): State<ApiState>,
    Path((kind, name)): Path<(String, String)>,
) -> ApiResult<String> {
    let kind: MetricKind = kind.parse()?;
    let value = state.store.get_value(kind, &name).await?;
    Ok(value.to_string())
}

/// GET /
///
/// Every metric, grouped by kind
pub async fn get_all(State(state): State<ApiState>) -> ApiResult<Json<StoreState>> {
    Ok(Json(state.store.get_all().await?))
}
