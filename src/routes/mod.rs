//! HTTP routes
//!
//! - `GET /health` - liveness probe
//! - `POST /resize` - multipart upload, returns the downscaled file

pub mod health;
pub mod resize;

use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let max_upload_bytes = state.config().resize.max_upload_bytes;

    Router::new()
        .route("/health", get(health::health_check))
        .merge(resize::router(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
