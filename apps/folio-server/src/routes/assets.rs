//! Book asset route
//!
//! Endpoints:
//! - GET /books/:edition_id/assets/:asset_id - Inline image of a chapter

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
    routing::get,
    Router,
};

use crate::db::LibraryRepository;
use crate::error::{AppError, Result};
use crate::state::AppState;

/// Create the assets router
pub fn router() -> Router<AppState> {
    Router::new().route("/:edition_id/assets/:asset_id", get(get_asset))
}

/// GET /books/:edition_id/assets/:asset_id
async fn get_asset(
    State(state): State<AppState>,
    Path((edition_id, asset_id)): Path<(String, String)>,
) -> Result<Response> {
    let asset = LibraryRepository::new(state.db())
        .get_asset(&edition_id, &asset_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Asset {}", asset_id)))?;

    let data = state.store().get(&asset.storage_key).await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, asset.mime_type)
        .header(header::CONTENT_LENGTH, data.len())
        // Asset keys are content-addressed
        .header(header::CACHE_CONTROL, "public, max-age=31536000, immutable")
        .body(Body::from(data))
        .map_err(|e| AppError::Internal(e.to_string()))
}
