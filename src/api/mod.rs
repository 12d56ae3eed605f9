//! HTTP API for the metric store
//!
//! ## Architecture
//!
//! - **Axum** web framework with Tower middleware
//! - **Shared state**: the store as `Arc<dyn MetricStore>` plus the
//!   snapshot actor handle
//!
//! ## Endpoints
//!
//! - `POST /update/:kind/:name/:value` - Raw textual update
//! - `POST /update` - Typed JSON update
//! - `POST /updates` - Batch of typed JSON updates
//! - `GET /value/:kind/:name` - Single value
//! - `GET /` - All metrics
//! - `GET /ping` - Backend health check

pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;

use std::future::Future;
use std::net::SocketAddr;

use axum::Router;
use axum::routing::{get, post};
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the router with all routes
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(routes::value::get_all))
        .route("/ping", get(routes::health::ping))
        .route("/update", post(routes::update::update_json))
        .route("/updates", post(routes::update::update_batch))
        .route("/update/:kind/:name/:value", post(routes::update::update_raw))
        .route("/value/:kind/:name", get(routes::value::get_value))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task that stops
/// accepting requests once `shutdown` resolves. Returns the server's local
/// address and the task handle.
pub async fn spawn_api_server<F>(
    bind_addr: SocketAddr,
    state: ApiState,
    shutdown: F,
) -> anyhow::Result<(SocketAddr, JoinHandle<()>)>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("starting API server on {}", bind_addr);

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok((addr, server))
}
