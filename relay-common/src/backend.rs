//! Inference capability abstraction.
//!
//! An [`InferenceBackend`] turns a prompt into a completion. The inference
//! worker wraps a model provider behind it; the gateway reaches a remote
//! worker through the same trait.

use async_trait::async_trait;

use crate::protocol::{Completion, InferOptions};

/// Classified inference failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InferenceFailure {
    /// The provider answered with an error.
    #[error("{0}")]
    Provider(String),

    /// The provider or peer did not answer within the deadline.
    #[error("Request timeout - the inference took too long")]
    Timeout,

    /// No backend could be reached.
    #[error("Inference backend unavailable: {0}")]
    Unavailable(String),

    /// The backend cannot serve any request as configured.
    #[error("{0}")]
    Misconfigured(String),
}

impl InferenceFailure {
    /// The message without the variant's prefix.
    pub fn detail(&self) -> String {
        match self {
            InferenceFailure::Provider(message)
            | InferenceFailure::Unavailable(message)
            | InferenceFailure::Misconfigured(message) => message.clone(),
            InferenceFailure::Timeout => self.to_string(),
        }
    }
}

/// Capability object serving completions.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Short identifier reported by health checks (e.g. "openai").
    fn name(&self) -> &str;

    /// Run one completion.
    async fn process(
        &self,
        prompt: &str,
        model: &str,
        options: &InferOptions,
    ) -> Result<Completion, InferenceFailure>;
}
