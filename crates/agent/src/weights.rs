//! HTTP endpoint the load balancer polls for current weights
//!
//! Intentionally a pure getter: any method on any path returns the
//! current weights string verbatim with Connection: close. The request
//! body is read and logged but otherwise ignored.

use anyhow::Result;
use arbiter_lib::session::SharedWeights;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Router,
};
use tracing::{debug, info};

async fn current_weights(State(weights): State<SharedWeights>, body: Bytes) -> impl IntoResponse {
    if !body.is_empty() {
        debug!(body = %String::from_utf8_lossy(&body), "Weights poll carried a body");
    }
    let current = weights.current().await;
    (StatusCode::OK, [(header::CONNECTION, "close")], current)
}

/// Create the weights router. Every route falls through to the getter.
pub fn create_router(weights: SharedWeights) -> Router {
    Router::new().fallback(current_weights).with_state(weights)
}

/// Start the weights server.
pub async fn serve(port: u16, weights: SharedWeights) -> Result<()> {
    let app = create_router(weights);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting weights server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
