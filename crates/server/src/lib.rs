pub mod error;
pub mod routes;
pub mod storage;
pub mod worker;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use convert_common::config::ServerAppConfig;

pub struct AppState {
    pub config: ServerAppConfig,
}

/// Build the HTTP router.  Storage directories are expected to exist.
#[rustfmt::skip]
pub fn app(state: Arc<AppState>) -> Router {
    let body_limit = state.config.conversion.max_upload_mb.saturating_mul(1024 * 1024);

    Router::new()
        .route("/",                    get(routes::index))
        .route("/health",              get(routes::health))
        .route("/api/v1/conversions",  get(routes::list_conversions))
        .route("/convert",             post(routes::convert))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
