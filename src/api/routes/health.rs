//! Health check endpoint

use axum::extract::State;

use crate::api::{ApiResult, ApiState};

/// GET /ping
///
/// Returns 200 when the backend answers, 503 otherwise
pub async fn ping(State(state): State<ApiState>) -> ApiResult<&'static str> {
    state.store.ping().await?;
    Ok("ok")
}
