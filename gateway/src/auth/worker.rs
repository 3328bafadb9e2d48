//! RPC surface of the auth worker.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use relay_common::protocol::{
    encode, CheckLimitResponse, GenerateKeyRequest, GenerateKeyResponse, RegisterRequest,
    RegisterResponse, TrackUsageRequest, TrackUsageResponse, UsageSummary, ValidateResponse, PONG,
};
use relay_common::rpc::decode;
use relay_common::{methods, ApiKeyRequest, ErrorEnvelope, Profile, RpcError, RpcService, UsageStats};

use super::{AuthGateway, ValidationOutcome};

pub struct AuthWorker {
    auth: Arc<AuthGateway>,
}

impl AuthWorker {
    pub fn new(auth: Arc<AuthGateway>) -> Self {
        Self { auth }
    }

    fn register(&self, payload: &[u8]) -> Vec<u8> {
        let request: RegisterRequest = match decode(payload) {
            Ok(r) => r,
            Err(e) => return encode(&ErrorEnvelope::new(e.to_string())),
        };

        match self
            .auth
            .register(&request.username, &request.email, &request.password)
        {
            Ok(api_key) => encode(&RegisterResponse {
                message: "User registered successfully".to_string(),
                api_key,
            }),
            Err(e) => {
                tracing::warn!(username = %request.username, "Registration failed: {}", e);
                encode(&ErrorEnvelope::new(e.to_string()))
            }
        }
    }

    fn generate_api_key(&self, payload: &[u8]) -> Vec<u8> {
        let request: GenerateKeyRequest = match decode(payload) {
            Ok(r) => r,
            Err(e) => return encode(&ErrorEnvelope::new(e.to_string())),
        };

        match self.auth.rotate_key(&request.username, &request.password) {
            Ok(api_key) => encode(&GenerateKeyResponse { api_key }),
            Err(e) => {
                tracing::warn!(username = %request.username, "Generate API key error: {}", e);
                encode(&ErrorEnvelope::new(e.to_string()))
            }
        }
    }

    fn validate(&self, payload: &[u8]) -> Vec<u8> {
        let response = match decode::<ApiKeyRequest>(payload) {
            Ok(request) => match self.auth.validate(request.api_key.as_deref()) {
                ValidationOutcome::Valid { account_id } => ValidateResponse {
                    valid: true,
                    account_id: Some(account_id),
                    reason: None,
                },
                ValidationOutcome::Invalid { reason } => ValidateResponse {
                    valid: false,
                    account_id: None,
                    reason: Some(reason),
                },
            },
            Err(e) => {
                tracing::error!("Validation error: {}", e);
                ValidateResponse {
                    valid: false,
                    account_id: None,
                    reason: Some("Validation error".to_string()),
                }
            }
        };
        tracing::info!(valid = response.valid, "Validation result");
        encode(&response)
    }

    fn check_limit(&self, payload: &[u8]) -> Vec<u8> {
        let allowed = match decode::<ApiKeyRequest>(payload) {
            Ok(ApiKeyRequest { api_key: Some(key) }) => {
                self.auth.check_rate_limit(&key).is_allowed()
            }
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Rate limit check failed, allowing request: {}", e);
                true
            }
        };
        encode(&CheckLimitResponse { allowed })
    }

    fn track_usage(&self, payload: &[u8]) -> Vec<u8> {
        let result = decode::<TrackUsageRequest>(payload)
            .map_err(|e| e.to_string())
            .and_then(|r| {
                self.auth
                    .track_usage(&r.api_key, r.tokens, &r.model)
                    .map_err(|e| e.to_string())
            });

        match result {
            Ok(()) => encode(&TrackUsageResponse {
                success: true,
                error: None,
            }),
            Err(e) => {
                tracing::error!("Track usage error: {}", e);
                encode(&TrackUsageResponse {
                    success: false,
                    error: Some(e),
                })
            }
        }
    }

    fn api_key(payload: &[u8]) -> Option<String> {
        decode::<ApiKeyRequest>(payload).ok().and_then(|r| r.api_key)
    }

    fn stats(&self, payload: &[u8]) -> Vec<u8> {
        let stats = Self::api_key(payload)
            .map(|k| self.auth.stats(&k))
            .unwrap_or_else(UsageStats::default);
        encode(&stats)
    }

    fn profile(&self, payload: &[u8]) -> Vec<u8> {
        let profile = Self::api_key(payload)
            .map(|k| self.auth.profile(&k))
            .unwrap_or_else(Profile::unknown);
        encode(&profile)
    }

    fn usage_summary(&self, payload: &[u8]) -> Vec<u8> {
        let summary = Self::api_key(payload)
            .map(|k| self.auth.usage_summary(&k))
            .unwrap_or_else(|| UsageSummary::unknown("Invalid API key"));
        encode(&summary)
    }
}

#[async_trait]
impl RpcService for AuthWorker {
    async fn handle(&self, method: &str, payload: Bytes) -> Result<Bytes, RpcError> {
        let reply = match method {
            methods::PING => return Ok(Bytes::from_static(PONG)),
            methods::REGISTER => self.register(&payload),
            methods::GENERATE_API_KEY => self.generate_api_key(&payload),
            methods::VALIDATE => self.validate(&payload),
            methods::CHECK_LIMIT => self.check_limit(&payload),
            methods::TRACK_USAGE => self.track_usage(&payload),
            methods::STATS => self.stats(&payload),
            methods::PROFILE => self.profile(&payload),
            methods::GET_USAGE => self.usage_summary(&payload),
            other => return Err(RpcError::UnknownMethod(other.to_string())),
        };
        Ok(Bytes::from(reply))
    }
}
