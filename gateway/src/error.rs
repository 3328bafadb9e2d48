//! Failure taxonomy of the inference pipeline.

use relay_common::ErrorEnvelope;

/// Terminal failure of one `infer` request. Every variant is answered as an
/// `{error}` envelope; none is raised across the RPC boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    /// Malformed input. Not worth retrying.
    #[error("{0}")]
    BadRequest(String),

    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    /// Quota exhausted for now; retry after backoff.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// A required peer is not registered or not reachable.
    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("{0}")]
    Timeout(String),

    /// The inference provider reported an error.
    #[error("{0}")]
    BackendError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Whether the same request may succeed later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PipelineError::RateLimited
                | PipelineError::ServiceUnavailable(_)
                | PipelineError::Timeout(_)
        )
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope::new(self.to_string())
    }
}
