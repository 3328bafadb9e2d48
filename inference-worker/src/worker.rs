//! The inference worker: `process`, `health` and `ping` over RPC.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use relay_common::protocol::{encode, BackendHealth, ProcessReply, ProcessRequest, PONG};
use relay_common::rpc::decode;
use relay_common::{
    methods, workers, DirectoryError, InferenceBackend, PeerAddress, RpcError, RpcService,
    ServerHandle, ServiceDirectory,
};

use crate::config::ServerConfig;

/// RPC method table wrapping one backend.
pub struct InferenceWorker {
    backend: Arc<dyn InferenceBackend>,
}

impl InferenceWorker {
    pub fn new(backend: Arc<dyn InferenceBackend>) -> Self {
        Self { backend }
    }

    async fn process(&self, payload: &[u8]) -> ProcessReply {
        let request: ProcessRequest = match decode(payload) {
            Ok(request) => request,
            Err(e) => return ProcessReply::failed(format!("Invalid request: {}", e)),
        };

        let preview: String = request.prompt.chars().take(50).collect();
        tracing::info!(model = %request.model, "Processing inference: {}...", preview);

        match self
            .backend
            .process(&request.prompt, &request.model, &request.options)
            .await
        {
            Ok(completion) => {
                tracing::info!(
                    total_tokens = completion.total_tokens(),
                    "Inference completed"
                );
                ProcessReply::ok(completion)
            }
            Err(e) => {
                tracing::error!("Inference failed: {}", e);
                ProcessReply::from_failure(&e)
            }
        }
    }

    fn health(&self) -> BackendHealth {
        BackendHealth {
            status: "healthy".to_string(),
            backend: self.backend.name().to_string(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

#[async_trait]
impl RpcService for InferenceWorker {
    async fn handle(&self, method: &str, payload: Bytes) -> Result<Bytes, RpcError> {
        match method {
            methods::PING => Ok(Bytes::from_static(PONG)),
            methods::PROCESS => Ok(encode(&self.process(&payload).await).into()),
            methods::HEALTH => Ok(encode(&self.health()).into()),
            other => Err(RpcError::UnknownMethod(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("Failed to register in discovery: {0}")]
    Discovery(#[from] DirectoryError),
}

/// A started inference worker: listening and registered as `inference`.
pub struct RunningInferenceWorker {
    server: ServerHandle,
    address: PeerAddress,
    directory: Arc<dyn ServiceDirectory>,
}

impl RunningInferenceWorker {
    pub async fn open(
        server_config: &ServerConfig,
        backend: Arc<dyn InferenceBackend>,
        directory: Arc<dyn ServiceDirectory>,
    ) -> Result<Self, StartError> {
        let addr = format!("{}:{}", server_config.host, server_config.port);
        let service: Arc<dyn RpcService> = Arc::new(InferenceWorker::new(backend));
        let server = ServerHandle::bind_rpc(&addr, service)
            .await
            .map_err(|source| StartError::Bind { addr, source })?;

        let address = server.peer_address(&server_config.advertise_host);
        if let Err(e) = directory.register(workers::INFERENCE, address.clone()).await {
            let _ = server.close().await;
            return Err(e.into());
        }
        tracing::info!("Inference worker registered at {}", address);

        Ok(Self {
            server,
            address,
            directory,
        })
    }

    pub fn address(&self) -> &PeerAddress {
        &self.address
    }

    /// Mark the directory entry stopped, then drain and stop the server.
    pub async fn close(self) -> std::io::Result<()> {
        if let Err(e) = self
            .directory
            .deregister(workers::INFERENCE, &self.address)
            .await
        {
            tracing::warn!("Failed to deregister inference worker: {}", e);
        }
        self.server.close().await?;
        tracing::info!("Inference worker stopped");
        Ok(())
    }
}
