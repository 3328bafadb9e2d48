//! RPC wire shapes shared by the gateway, auth, inference and web workers.
//!
//! Every RPC payload is a JSON document carried as opaque bytes by the
//! transport. Field names are camelCase on the wire, except the token usage
//! block which keeps the provider's snake_case names.
//!
//! # Method surface
//!
//! | Worker    | Methods                                                                   |
//! |-----------|---------------------------------------------------------------------------|
//! | gateway   | `infer`, `health`, `models`, `stats`, `ping`                              |
//! | auth      | `register`, `validate`, `check-limit`, `track-usage`, `stats`, `profile`, |
//! |           | `generateApiKey`, `getUsage`, `ping`                                      |
//! | inference | `process`, `health`, `ping`                                               |
//!
//! Domain failures never become transport faults: handlers answer with an
//! [`ErrorEnvelope`] (`{"error": "..."}`) or with the method's documented
//! fail-open / fail-closed default.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::InferenceFailure;

/// Logical worker names used for discovery.
pub mod workers {
    pub const GATEWAY: &str = "gateway";
    pub const AUTH: &str = "auth";
    pub const INFERENCE: &str = "inference";
    pub const WEB: &str = "web";
}

/// RPC method names.
pub mod methods {
    pub const PING: &str = "ping";
    pub const HEALTH: &str = "health";
    pub const INFER: &str = "infer";
    pub const MODELS: &str = "models";
    pub const PROCESS: &str = "process";
    pub const REGISTER: &str = "register";
    pub const VALIDATE: &str = "validate";
    pub const CHECK_LIMIT: &str = "check-limit";
    pub const TRACK_USAGE: &str = "track-usage";
    pub const STATS: &str = "stats";
    pub const PROFILE: &str = "profile";
    pub const GENERATE_API_KEY: &str = "generateApiKey";
    pub const GET_USAGE: &str = "getUsage";
}

/// Literal reply to a `ping`.
pub const PONG: &[u8] = b"pong";

/// Failure envelope returned instead of a protocol-level fault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: String,
}

impl ErrorEnvelope {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

// ============================================================================
// Inference
// ============================================================================

/// Sampling options forwarded to the model provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InferOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

/// Inbound `infer` request. Fields are optional so that missing values are
/// reported as a `BadRequest` by the pipeline rather than a parse failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferRequest {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub options: InferOptions,
}

/// Token usage reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl Usage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Successful inference: what the caller of `infer` receives.
///
/// `usage` is absent when the backend did not report one; such completions
/// are returned but not accounted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub completion: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl Completion {
    pub fn new(completion: impl Into<String>, usage: Usage) -> Self {
        Self {
            completion: completion.into(),
            usage: Some(usage),
        }
    }

    /// Tokens to charge, zero when usage is unknown.
    pub fn total_tokens(&self) -> u64 {
        self.usage.map_or(0, |u| u.total_tokens)
    }
}

/// `process` request sent from the gateway to an inference worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRequest {
    pub prompt: String,
    pub model: String,
    #[serde(default)]
    pub options: InferOptions,
}

/// Category of a failed `process`, so the gateway can tell a provider
/// timeout from a provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Provider,
    Timeout,
    Unavailable,
    Misconfigured,
}

impl FailureKind {
    pub fn of(failure: &InferenceFailure) -> Self {
        match failure {
            InferenceFailure::Provider(_) => FailureKind::Provider,
            InferenceFailure::Timeout => FailureKind::Timeout,
            InferenceFailure::Unavailable(_) => FailureKind::Unavailable,
            InferenceFailure::Misconfigured(_) => FailureKind::Misconfigured,
        }
    }
}

/// `process` reply. On failure `error` is set and the completion carries a
/// human-readable copy of it with zeroed usage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Missing on replies from workers that predate it; read as `Provider`.
    #[serde(rename = "errorKind", default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FailureKind>,
    #[serde(default)]
    pub completion: String,
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl ProcessReply {
    pub fn ok(completion: Completion) -> Self {
        Self {
            error: None,
            error_kind: None,
            completion: completion.completion,
            usage: completion.usage,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            completion: format!("Error: {}", message),
            error: Some(message),
            error_kind: Some(FailureKind::Provider),
            usage: Some(Usage::default()),
        }
    }

    pub fn from_failure(failure: &InferenceFailure) -> Self {
        Self {
            error_kind: Some(FailureKind::of(failure)),
            ..Self::failed(failure.detail())
        }
    }

    /// Back to the backend result the worker produced.
    pub fn into_result(self) -> Result<Completion, InferenceFailure> {
        let Some(error) = self.error else {
            return Ok(Completion {
                completion: self.completion,
                usage: self.usage,
            });
        };
        Err(match self.error_kind.unwrap_or(FailureKind::Provider) {
            FailureKind::Provider => InferenceFailure::Provider(error),
            FailureKind::Timeout => InferenceFailure::Timeout,
            FailureKind::Unavailable => InferenceFailure::Unavailable(error),
            FailureKind::Misconfigured => InferenceFailure::Misconfigured(error),
        })
    }
}

/// `models` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub available: Vec<String>,
    pub default: String,
}

// ============================================================================
// Health
// ============================================================================

/// Gateway `health` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: String,
    pub auth_peers: u32,
    pub inference_peers: u32,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

/// Inference worker `health` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendHealth {
    pub status: String,
    pub backend: String,
    pub timestamp: i64,
}

// ============================================================================
// Auth
// ============================================================================

/// Request carrying only an API key (`validate`, `check-limit`, `stats`,
/// `profile`, `getUsage`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyRequest {
    #[serde(default)]
    pub api_key: Option<String>,
}

impl ApiKeyRequest {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub message: String,
    pub api_key: String,
}

/// `generateApiKey` request (key rotation).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateKeyRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateKeyResponse {
    pub api_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckLimitResponse {
    pub allowed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackUsageRequest {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub tokens: u64,
    #[serde(default = "default_model_label")]
    pub model: String,
}

fn default_model_label() -> String {
    "unknown".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackUsageResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One accounted request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub tokens: u64,
    pub model: String,
}

/// `stats` reply. The zero value is the fail-closed answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub total_requests: u64,
    pub total_tokens: u64,
    #[serde(default)]
    pub request_history: Vec<HistoryEntry>,
}

/// Public view of an account; never carries the password digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub username: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyView {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub tier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_requests_per_minute: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// `profile` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub user: UserView,
    pub api_key: ApiKeyView,
    pub usage: UsageStats,
}

impl Profile {
    /// Fail-closed profile returned when the key or account cannot be read.
    pub fn unknown() -> Self {
        Self {
            user: UserView {
                id: None,
                username: "Unknown".to_string(),
                email: "Unknown".to_string(),
                created_at: None,
            },
            api_key: ApiKeyView {
                key: None,
                tier: "unknown".to_string(),
                active: None,
                max_requests_per_minute: None,
                created_at: None,
            },
            usage: UsageStats::default(),
        }
    }
}

/// Compact usage block of a `getUsage` reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageTotals {
    pub total_requests: u64,
    pub total_tokens_used: u64,
    #[serde(default)]
    pub last_request: Option<DateTime<Utc>>,
}

/// `getUsage` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub usage: UsageTotals,
}

impl UsageSummary {
    /// Fail-closed summary carrying the reason.
    pub fn unknown(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            username: "Unknown".to_string(),
            email: "Unknown".to_string(),
            created_at: Utc::now(),
            usage: UsageTotals::default(),
        }
    }
}

/// Serialize a reply. The shapes above cannot fail to serialize, so an
/// error here degrades to an envelope rather than a panic.
pub fn encode<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_else(|e| {
        format!(r#"{{"error":"Failed to encode reply: {}"}}"#, e).into_bytes()
    })
}
