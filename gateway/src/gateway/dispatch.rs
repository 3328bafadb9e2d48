//! Inference backend reached over RPC through discovery.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use relay_common::protocol::{ProcessReply, ProcessRequest};
use relay_common::rpc::call;
use relay_common::{
    methods, workers, Completion, InferOptions, InferenceBackend, InferenceFailure, RpcError,
    RpcTransport, ServiceDirectory,
};

/// Forwards `process` to whichever worker is registered as `inference`.
pub struct RemoteInference {
    directory: Arc<dyn ServiceDirectory>,
    transport: Arc<dyn RpcTransport>,
    timeout: Duration,
}

impl RemoteInference {
    pub fn new(
        directory: Arc<dyn ServiceDirectory>,
        transport: Arc<dyn RpcTransport>,
        timeout: Duration,
    ) -> Self {
        Self {
            directory,
            transport,
            timeout,
        }
    }
}

#[async_trait]
impl InferenceBackend for RemoteInference {
    fn name(&self) -> &str {
        "remote"
    }

    async fn process(
        &self,
        prompt: &str,
        model: &str,
        options: &InferOptions,
    ) -> Result<Completion, InferenceFailure> {
        let peer = self
            .directory
            .resolve(workers::INFERENCE)
            .await
            .map_err(|e| InferenceFailure::Unavailable(e.to_string()))?;

        let request = ProcessRequest {
            prompt: prompt.to_string(),
            model: model.to_string(),
            options: options.clone(),
        };

        tracing::debug!(peer = %peer, "Forwarding to inference worker");
        let reply: ProcessReply = call(
            &*self.transport,
            &peer,
            methods::PROCESS,
            &request,
            self.timeout,
        )
        .await
        .map_err(|e| match e {
            RpcError::Timeout(_) => InferenceFailure::Timeout,
            other => InferenceFailure::Unavailable(other.to_string()),
        })?;

        if reply.error.is_none() && reply.usage.is_none() {
            tracing::warn!("No usage data in inference reply");
        }
        reply.into_result()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use relay_common::{LocalTransport, MemoryDirectory, PeerAddress, RpcService};

    use super::*;

    /// Inference worker that answers every `process` with a fixed body.
    struct CannedWorker(&'static str);

    #[async_trait]
    impl RpcService for CannedWorker {
        async fn handle(&self, _method: &str, _payload: Bytes) -> Result<Bytes, RpcError> {
            Ok(Bytes::from_static(self.0.as_bytes()))
        }
    }

    async fn remote(reply: &'static str) -> RemoteInference {
        let directory = Arc::new(MemoryDirectory::new());
        let transport = LocalTransport::new();
        let address = PeerAddress::new("local://inference");
        transport
            .mount(address.clone(), Arc::new(CannedWorker(reply)))
            .await;
        directory
            .register(workers::INFERENCE, address)
            .await
            .unwrap();
        RemoteInference::new(directory, Arc::new(transport), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_reply_without_usage_has_no_usage() {
        let completion = remote(r#"{"completion":"hi"}"#)
            .await
            .process("hello", "gpt-4", &InferOptions::default())
            .await
            .unwrap();

        assert_eq!(completion.completion, "hi");
        assert_eq!(completion.usage, None);
    }

    #[tokio::test]
    async fn test_worker_timeout_stays_a_timeout() {
        let err = remote(
            r#"{"error":"Request timeout - the inference took too long","errorKind":"timeout","completion":"Error: Request timeout - the inference took too long"}"#,
        )
        .await
        .process("hello", "gpt-4", &InferOptions::default())
        .await
        .unwrap_err();

        assert_eq!(err, InferenceFailure::Timeout);
    }

    #[tokio::test]
    async fn test_unclassified_worker_error_is_a_provider_error() {
        let err = remote(r#"{"error":"OpenAI API error: quota","completion":"Error: OpenAI API error: quota"}"#)
            .await
            .process("hello", "gpt-4", &InferOptions::default())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            InferenceFailure::Provider("OpenAI API error: quota".to_string())
        );
    }
}
