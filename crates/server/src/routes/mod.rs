mod convert;

pub use convert::convert;

use axum::{
    http::{header, StatusCode},
    response::{Html, IntoResponse},
    Json,
};
use rust_embed::RustEmbed;

use convert_common::api::ConversionInfo;

#[derive(RustEmbed)]
#[folder = "web/"]
struct WebAssets;

// ── GET / ─────────────────────────────────────────────────────────────────────

pub async fn index() -> impl IntoResponse {
    match WebAssets::get("index.html") {
        Some(file) => Html(file.data.into_owned()).into_response(),
        None => (StatusCode::NOT_FOUND, "upload page not bundled").into_response(),
    }
}

// ── GET /health ───────────────────────────────────────────────────────────────

pub async fn health() -> impl IntoResponse {
    ([(header::CACHE_CONTROL, "no-store")], "ok")
}

// ── GET /api/v1/conversions ───────────────────────────────────────────────────

pub async fn list_conversions() -> Json<Vec<ConversionInfo>> {
    Json(convert_dispatch::entries().iter().map(|e| e.info()).collect())
}
