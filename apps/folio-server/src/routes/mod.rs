//! Route modules for the Folio server

pub mod assets;
pub mod health;
pub mod jobs;
pub mod uploads;

use axum::{routing::get, Router};

use crate::state::AppState;

/// Assemble every route of the ingestion surface
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/health", get(health::health_check))
        .nest("/api/v1/uploads", uploads::router())
        .nest("/api/v1/jobs", jobs::router())
        .nest("/books", assets::router())
        .with_state(state)
}
