pub mod commands;
pub mod error;
pub mod middleware;
pub mod routes;

use axum::{
    routing::{get, post},
    Router,
};
use eternity_core::{DirectorySource, NotificationSink, PollEngine};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub struct AppState<S, N> {
    pub engine: Arc<PollEngine<S, N>>,
    /// Shared secret the gateway relay presents as a bearer token.
    pub api_token: Arc<str>,
}

impl<S, N> Clone for AppState<S, N> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            api_token: self.api_token.clone(),
        }
    }
}

pub fn build_router<S, N>(state: AppState<S, N>) -> Router
where
    S: DirectorySource,
    N: NotificationSink,
{
    Router::new()
        .route("/health", get(routes::health::health::<S, N>))
        .route(
            "/api/v1/commands",
            post(routes::commands::relay_command::<S, N>),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use chrono::{FixedOffset, TimeZone, Utc};
    use eternity_core::directory::default_job_roles;
    use eternity_core::poll::{PollSettings, DEFAULT_MAX_DURATION_HOURS};
    use eternity_core::testing::{FakeDirectory, ManualClock, RecordingSink};
    use eternity_core::DirectoryCache;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const TOKEN: &str = "relay-secret";
    const POLL_CHANNEL: i64 = 500;

    async fn app() -> Router {
        let pool = eternity_db::create_pool("sqlite::memory:", 1).await.unwrap();
        eternity_db::run_migrations(&pool).await.unwrap();
        let directory = FakeDirectory::with_job_roles();
        directory.add_member(1, "Lv120 바람", &[8]);
        let cache = Arc::new(DirectoryCache::new(directory, 1, default_job_roles()));
        cache.refresh_all().await.unwrap();
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap());
        let engine = PollEngine::new(
            pool,
            cache,
            RecordingSink::new(),
            Arc::new(clock),
            PollSettings {
                poll_channel_id: POLL_CHANNEL,
                max_duration_hours: DEFAULT_MAX_DURATION_HOURS,
                display_offset: FixedOffset::east_opt(9 * 3600).unwrap(),
            },
        );
        build_router(AppState {
            engine: Arc::new(engine),
            api_token: Arc::from(TOKEN),
        })
    }

    fn command_request(token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/v1/commands")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_directory_size() {
        let response = app()
            .await
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["members"], 1);
        assert_eq!(body["roles"], 10);
    }

    #[tokio::test]
    async fn test_commands_require_bearer_token() {
        let app = app().await;
        let body = json!({ "author_id": "1", "channel_id": "500", "content": "!poll list" });

        let response = app.clone().oneshot(command_request(None, body.clone())).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app.oneshot(command_request(Some("wrong"), body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_command_reply_is_returned_with_chunks() {
        let app = app().await;
        let body = json!({
            "author_id": "99",
            "channel_id": "500",
            "content": "!poll create named ALL t1 네,아니오 2",
        });
        let response = app.oneshot(command_request(Some(TOKEN), body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let reply = body["reply"].as_str().unwrap();
        assert!(reply.starts_with("Poll 't1' created"));
        assert_eq!(body["chunks"], json!([reply]));
    }

    #[tokio::test]
    async fn test_ignored_message_has_no_reply() {
        let body = json!({ "author_id": "99", "channel_id": "1", "content": "hello" });
        let response = app().await.oneshot(command_request(Some(TOKEN), body)).await.unwrap();
        let body = json_body(response).await;
        assert!(body["reply"].is_null());
        assert_eq!(body["chunks"], json!([]));
    }

    #[tokio::test]
    async fn test_non_numeric_author_is_bad_request() {
        let body = json!({ "author_id": "abc", "content": "!poll vote 1 1" });
        let response = app().await.oneshot(command_request(Some(TOKEN), body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "BAD_REQUEST");
    }
}
