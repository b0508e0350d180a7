//! HTTP REST API routes

mod status_routes;

use axum::{routing::get, Router};
use std::sync::Arc;

use crate::infrastructure::state::AppState;

/// Create all API routes
pub fn create_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/status", get(status_routes::get_status))
        .route("/api/image/checkpoints", get(status_routes::list_checkpoints))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::application::services::test_support::{MockImageGen, ScriptedLlm};
    use crate::infrastructure::state::test_state;

    fn app() -> Router {
        let state = test_state(Arc::new(ScriptedLlm::new()), Arc::new(MockImageGen::new()));
        create_routes().with_state(Arc::new(state))
    }

    async fn get_json(uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_checkpoints_route() {
        let (status, body) = get_json("/api/image/checkpoints").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!(["CrowPonyQp_ponyV3.safetensors"]));
    }

    #[tokio::test]
    async fn test_status_route() {
        let (status, body) = get_json("/api/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["text"]["is_connected"], true);
        assert_eq!(body["image"]["reachable"], true);
    }
}
