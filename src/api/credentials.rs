//! Credential cache endpoints
//!
//! Secrets are never exposed over HTTP; only cache occupancy and a manual flush.

use crate::{api::AppState, credentials::CacheStats};
use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{delete, get},
    Router,
};

pub fn create_credential_routes() -> Router<AppState> {
    Router::new()
        .route("/api/credentials/cache", delete(clear_cache))
        .route("/api/credentials/cache/stats", get(cache_stats))
}

/// Drop every cached credential so the next lookup re-reads the store
///
/// DELETE /api/credentials/cache
async fn clear_cache(State(state): State<AppState>) -> StatusCode {
    state.coordinator.credentials().clear_cache();
    StatusCode::NO_CONTENT
}

/// GET /api/credentials/cache/stats
async fn cache_stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.coordinator.credentials().cache_stats())
}
