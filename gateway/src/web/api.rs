//! JSON account API, proxied to the auth worker.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use relay_common::protocol::{
    GenerateKeyRequest, GenerateKeyResponse, RegisterRequest, RegisterResponse,
};
use serde::Deserialize;
use serde_json::json;

use super::WebState;
use crate::auth::AuthCallError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyQuery {
    #[serde(default)]
    api_key: Option<String>,
}

impl KeyQuery {
    fn require(self) -> Result<String, Response> {
        self.api_key.filter(|k| !k.is_empty()).ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "API key is required" })),
            )
                .into_response()
        })
    }
}

/// Rejections from the auth worker are the caller's fault; anything else is ours.
fn failure(context: &str, error: AuthCallError) -> Response {
    match error {
        AuthCallError::Rejected(message) => {
            (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
        }
        other => {
            tracing::error!("{}: {}", context, other);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": context })),
            )
                .into_response()
        }
    }
}

/// POST /api/register
async fn register(
    State(state): State<Arc<WebState>>,
    Json(request): Json<RegisterRequest>,
) -> Response {
    match state.auth.register(&request).await {
        Ok(api_key) => Json(RegisterResponse {
            message: "User registered successfully".to_string(),
            api_key,
        })
        .into_response(),
        Err(e) => failure("Registration failed", e),
    }
}

/// POST /api/generate-key
async fn generate_key(
    State(state): State<Arc<WebState>>,
    Json(request): Json<GenerateKeyRequest>,
) -> Response {
    match state.auth.generate_api_key(&request).await {
        Ok(api_key) => Json(GenerateKeyResponse { api_key }).into_response(),
        Err(e) => failure("Failed to generate API key", e),
    }
}

/// GET /api/usage?apiKey=
async fn usage(State(state): State<Arc<WebState>>, Query(query): Query<KeyQuery>) -> Response {
    let api_key = match query.require() {
        Ok(k) => k,
        Err(response) => return response,
    };

    match state.auth.stats(&api_key).await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => {
            tracing::error!("Error getting usage: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Failed to get usage data",
                    "totalRequests": 0,
                    "totalTokens": 0,
                    "requestHistory": []
                })),
            )
                .into_response()
        }
    }
}

/// GET /api/account?apiKey=
async fn account(State(state): State<Arc<WebState>>, Query(query): Query<KeyQuery>) -> Response {
    let api_key = match query.require() {
        Ok(k) => k,
        Err(response) => return response,
    };

    match state.auth.usage_summary(&api_key).await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => failure("Failed to get account data", e),
    }
}

/// GET /api/profile?apiKey=
async fn profile(State(state): State<Arc<WebState>>, Query(query): Query<KeyQuery>) -> Response {
    let api_key = match query.require() {
        Ok(k) => k,
        Err(response) => return response,
    };

    match state.auth.profile(&api_key).await {
        Ok(profile) => Json(profile).into_response(),
        Err(e) => {
            tracing::error!("Error getting profile: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Failed to get profile data",
                    "user": { "username": "Unknown", "email": "Unknown" },
                    "apiKey": { "tier": "unknown" },
                    "usage": { "totalRequests": 0, "totalTokens": 0 }
                })),
            )
                .into_response()
        }
    }
}

/// GET /api/validate?apiKey=
async fn validate(State(state): State<Arc<WebState>>, Query(query): Query<KeyQuery>) -> Response {
    let api_key = match query.require() {
        Ok(k) => k,
        Err(response) => return response,
    };

    match state.auth.validate(&api_key).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => {
            tracing::error!("Error validating API key: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "valid": false, "reason": "Validation service error" })),
            )
                .into_response()
        }
    }
}

pub fn router(state: Arc<WebState>) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/generate-key", post(generate_key))
        .route("/usage", get(usage))
        .route("/account", get(account))
        .route("/profile", get(profile))
        .route("/validate", get(validate))
        .with_state(state)
}
