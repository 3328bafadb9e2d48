//! The `infer` request pipeline.
//!
//! ```text
//! Received -> AuthDiscovered -> Authenticated -> Admitted -> Dispatched -> Recorded -> Responded
//! ```
//!
//! Any stage may exit to a [`PipelineError`]. The pipeline owns no mutable
//! state; accounts, quotas and counters live behind the auth worker and
//! completions come from an [`InferenceBackend`].

use std::sync::Arc;

use relay_common::protocol::TrackUsageRequest;
use relay_common::{
    Completion, DirectoryError, InferOptions, InferRequest, InferenceBackend, InferenceFailure,
    RpcError,
};

use crate::auth::{Admission, AuthCallError, AuthClient};
use crate::error::PipelineError;

/// Progress of one request, reported with failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    AuthDiscovered,
    Authenticated,
    Admitted,
    Dispatched,
    Recorded,
    Responded,
}

/// A request that passed `Received`.
struct Accepted {
    api_key: String,
    prompt: String,
    model: String,
    options: InferOptions,
}

pub struct GatewayPipeline {
    auth: AuthClient,
    backend: Arc<dyn InferenceBackend>,
    default_model: String,
}

impl GatewayPipeline {
    pub fn new(auth: AuthClient, backend: Arc<dyn InferenceBackend>, default_model: String) -> Self {
        Self {
            auth,
            backend,
            default_model,
        }
    }

    /// Run one request to a terminal state.
    pub async fn handle(&self, request: InferRequest) -> Result<Completion, PipelineError> {
        let mut stage = Stage::Received;
        let result = self.run(request, &mut stage).await;
        match &result {
            Ok(completion) => tracing::info!(
                total_tokens = completion.total_tokens(),
                "Gateway inference completed"
            ),
            Err(e) if e.is_transient() => {
                tracing::warn!(stage = ?stage, "Gateway infer failed: {}", e)
            }
            Err(e) => tracing::info!(stage = ?stage, "Gateway infer rejected: {}", e),
        }
        result
    }

    async fn run(
        &self,
        request: InferRequest,
        stage: &mut Stage,
    ) -> Result<Completion, PipelineError> {
        let request = self.accept(request)?;

        *stage = Stage::AuthDiscovered;
        let validation = self
            .auth
            .validate(&request.api_key)
            .await
            .map_err(auth_failure)?;

        *stage = Stage::Authenticated;
        if !validation.valid {
            let reason = validation
                .reason
                .unwrap_or_else(|| "Invalid API key".to_string());
            return Err(PipelineError::Unauthorized(reason));
        }

        *stage = Stage::Admitted;
        if !self.admit(&request.api_key).await.is_allowed() {
            return Err(PipelineError::RateLimited);
        }

        *stage = Stage::Dispatched;
        let completion = self
            .backend
            .process(&request.prompt, &request.model, &request.options)
            .await
            .map_err(inference_failure)?;

        *stage = Stage::Recorded;
        self.record(&request, &completion).await;

        *stage = Stage::Responded;
        Ok(completion)
    }

    fn accept(&self, request: InferRequest) -> Result<Accepted, PipelineError> {
        let api_key = request
            .api_key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| PipelineError::BadRequest("API key is required".to_string()))?;
        let prompt = request
            .prompt
            .filter(|p| !p.is_empty())
            .ok_or_else(|| PipelineError::BadRequest("Prompt is required".to_string()))?;
        let model = request
            .model
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.default_model.clone());

        Ok(Accepted {
            api_key,
            prompt,
            model,
            options: request.options,
        })
    }

    /// Admission fails open: if the check cannot be made, the request passes.
    async fn admit(&self, api_key: &str) -> Admission {
        match self.auth.check_limit(api_key).await {
            Ok(true) => Admission::Allowed,
            Ok(false) => Admission::Denied,
            Err(e) => {
                tracing::warn!("Rate limit check failed, allowing request: {}", e);
                Admission::FailedOpen {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Accounting never fails the request. A completion without usage is not
    /// counted at all.
    async fn record(&self, request: &Accepted, completion: &Completion) {
        let Some(usage) = completion.usage else {
            tracing::warn!(model = %request.model, "Completion without usage left unaccounted");
            return;
        };
        let track = TrackUsageRequest {
            api_key: request.api_key.clone(),
            tokens: usage.total_tokens,
            model: request.model.clone(),
        };

        match self.auth.track_usage(&track).await {
            Ok(reply) if reply.success => {
                tracing::debug!(tokens = track.tokens, "Usage tracked");
            }
            Ok(reply) => tracing::error!(
                "Failed to track usage via auth service: {}",
                reply.error.unwrap_or_default()
            ),
            Err(e) => tracing::error!("Failed to track usage via auth service: {}", e),
        }
    }
}

fn auth_failure(error: AuthCallError) -> PipelineError {
    match error {
        AuthCallError::Discovery(DirectoryError::NotFound(_)) => {
            PipelineError::ServiceUnavailable("Authentication service unavailable".to_string())
        }
        AuthCallError::Rpc(RpcError::Timeout(_)) => {
            PipelineError::Timeout("Authentication service timed out".to_string())
        }
        AuthCallError::Rpc(RpcError::Unreachable(_))
        | AuthCallError::Rpc(RpcError::UnknownMethod(_)) => {
            PipelineError::ServiceUnavailable("Authentication service unavailable".to_string())
        }
        other => PipelineError::Internal(other.to_string()),
    }
}

fn inference_failure(failure: InferenceFailure) -> PipelineError {
    match failure {
        InferenceFailure::Timeout => PipelineError::Timeout(failure.to_string()),
        InferenceFailure::Unavailable(_) => PipelineError::ServiceUnavailable(failure.to_string()),
        InferenceFailure::Provider(_) | InferenceFailure::Misconfigured(_) => {
            PipelineError::BackendError(failure.to_string())
        }
    }
}
