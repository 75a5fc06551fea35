//! Memory session endpoints

use crate::{
    api::AppState,
    memory::{MemoryStatistics, SessionInfo},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};

pub fn create_memory_routes() -> Router<AppState> {
    Router::new()
        .route("/api/memory/stats", get(memory_stats))
        .route("/api/memory/sessions/{id}", get(get_session).delete(delete_session))
}

/// GET /api/memory/stats
async fn memory_stats(State(state): State<AppState>) -> Json<MemoryStatistics> {
    Json(state.memory.get_statistics())
}

/// GET /api/memory/sessions/{id}
async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionInfo>, StatusCode> {
    state
        .memory
        .get_session_info(&id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// Evict a session immediately
///
/// DELETE /api/memory/sessions/{id}
async fn delete_session(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    if state.memory.cleanup(&id, "manual") {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support;
    use crate::memory::MemoryOptions;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    fn request(method: &str, uri: &str) -> Request<Body> {
        Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_stats_reflect_sessions() {
        let state = test_support::state().await;
        let memory = state.memory.get_or_create("s1", &MemoryOptions::default());
        memory.add_user_message("hello");
        state.memory.get_or_create("s1", &MemoryOptions::default());

        let response = create_memory_routes()
            .with_state(state)
            .oneshot(request("GET", "/api/memory/stats"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = test_support::json_body(response).await;
        assert_eq!(body["active_sessions"], 1);
        assert_eq!(body["total_messages"], 1);
        assert_eq!(body["policy"]["max_total_sessions"], 500);
    }

    #[tokio::test]
    async fn test_session_detail_and_404() {
        let state = test_support::state().await;
        state.memory.get_or_create("s1", &MemoryOptions::default());
        let app = create_memory_routes().with_state(state);

        let response = app
            .clone()
            .oneshot(request("GET", "/api/memory/sessions/s1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = test_support::json_body(response).await;
        assert_eq!(body["session_id"], "s1");
        assert_eq!(body["access_count"], 1);

        let response = app
            .oneshot(request("GET", "/api/memory/sessions/missing"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_session() {
        let state = test_support::state().await;
        state.memory.get_or_create("s1", &MemoryOptions::default());
        let app = create_memory_routes().with_state(state.clone());

        let response = app
            .clone()
            .oneshot(request("DELETE", "/api/memory/sessions/s1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(state.memory.session_count(), 0);

        let response = app
            .oneshot(request("DELETE", "/api/memory/sessions/s1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
