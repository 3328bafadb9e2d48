//! Web worker: a JSON front-end over the auth worker.
//!
//! Every `/api` route is a thin proxy. When the auth worker cannot be reached
//! the read routes answer 500 with a zeroed body instead of partial data.

pub mod api;
pub mod health;

use std::sync::Arc;

use axum::middleware;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::AuthClient;
use crate::logging::request_logger;

pub struct WebState {
    pub auth: AuthClient,
}

pub fn router(auth: AuthClient) -> Router {
    let state = Arc::new(WebState { auth });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(health::router())
        .nest("/api", api::router(state))
        .layer(middleware::from_fn(request_logger))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use relay_common::{workers, LocalTransport, MemoryDirectory, PeerAddress, ServiceDirectory};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::auth::{AuthGateway, AuthWorker, MemoryCredentialStore};
    use crate::clock::SystemClock;
    use crate::limiter::SlidingWindowLimiter;
    use crate::usage::MemoryUsageRecorder;

    async fn app_with_auth() -> Router {
        let directory = Arc::new(MemoryDirectory::new());
        let transport = LocalTransport::new();
        let address = PeerAddress::new("local://auth");

        let gateway = AuthGateway::new(
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(SlidingWindowLimiter::default()),
            Arc::new(MemoryUsageRecorder::default()),
            Arc::new(SystemClock),
            10,
        );
        transport
            .mount(address.clone(), Arc::new(AuthWorker::new(Arc::new(gateway))))
            .await;
        directory.register(workers::AUTH, address).await.unwrap();

        router(AuthClient::new(
            directory,
            Arc::new(transport),
            Duration::from_secs(1),
        ))
    }

    fn app_without_auth() -> Router {
        router(AuthClient::new(
            Arc::new(MemoryDirectory::new()),
            Arc::new(LocalTransport::new()),
            Duration::from_secs(1),
        ))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(app_without_auth(), get("/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_register_then_usage_and_validate() {
        let app = app_with_auth().await;

        let (status, body) = send(
            app.clone(),
            post_json(
                "/api/register",
                serde_json::json!({"username": "alice", "email": "a@x", "password": "pw"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "User registered successfully");
        let key = body["apiKey"].as_str().unwrap().to_string();

        let (status, body) = send(app.clone(), get(&format!("/api/usage?apiKey={}", key))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totalRequests"], 0);
        assert_eq!(body["totalTokens"], 0);

        let (status, body) = send(app.clone(), get(&format!("/api/validate?apiKey={}", key))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["valid"], true);

        let (status, body) = send(app, get(&format!("/api/profile?apiKey={}", key))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["username"], "alice");
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_bad_request() {
        let app = app_with_auth().await;
        let account = serde_json::json!({"username": "bob", "email": "b@x", "password": "pw"});

        let (status, _) = send(app.clone(), post_json("/api/register", account.clone())).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(app, post_json("/api/register", account)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Username already exists");
    }

    #[tokio::test]
    async fn test_generate_key_rejects_bad_password() {
        let app = app_with_auth().await;
        send(
            app.clone(),
            post_json(
                "/api/register",
                serde_json::json!({"username": "carol", "email": "c@x", "password": "pw"}),
            ),
        )
        .await;

        let (status, body) = send(
            app,
            post_json(
                "/api/generate-key",
                serde_json::json!({"username": "carol", "password": "wrong"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid username or password");
    }

    #[tokio::test]
    async fn test_missing_api_key_is_bad_request() {
        let (status, body) = send(app_without_auth(), get("/api/usage")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "API key is required");
    }

    #[tokio::test]
    async fn test_usage_fails_closed_without_auth_worker() {
        let (status, body) = send(app_without_auth(), get("/api/usage?apiKey=k")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to get usage data");
        assert_eq!(body["totalRequests"], 0);
        assert_eq!(body["requestHistory"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_profile_fails_closed_without_auth_worker() {
        let (status, body) = send(app_without_auth(), get("/api/profile?apiKey=k")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["user"]["username"], "Unknown");
        assert_eq!(body["apiKey"]["tier"], "unknown");
    }

    #[tokio::test]
    async fn test_validate_fails_closed_without_auth_worker() {
        let (status, body) = send(app_without_auth(), get("/api/validate?apiKey=k")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["valid"], false);
        assert_eq!(body["reason"], "Validation service error");
    }
}
