//! RPC surface of the gateway worker.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use relay_common::protocol::{encode, ModelsResponse, PONG};
use relay_common::rpc::decode;
use relay_common::{
    methods, workers, ApiKeyRequest, HealthReport, InferRequest, RpcError, RpcService,
    ServiceDirectory, UsageStats,
};

use super::pipeline::GatewayPipeline;
use crate::auth::AuthClient;
use crate::config::ModelsConfig;
use crate::error::PipelineError;

pub struct GatewayWorker {
    pipeline: GatewayPipeline,
    auth: AuthClient,
    directory: Arc<dyn ServiceDirectory>,
    models: ModelsConfig,
}

impl GatewayWorker {
    pub fn new(
        pipeline: GatewayPipeline,
        auth: AuthClient,
        directory: Arc<dyn ServiceDirectory>,
        models: ModelsConfig,
    ) -> Self {
        Self {
            pipeline,
            auth,
            directory,
            models,
        }
    }

    async fn infer(&self, payload: &[u8]) -> Vec<u8> {
        let request: InferRequest = match decode(payload) {
            Ok(r) => r,
            Err(e) => {
                let error = PipelineError::BadRequest(format!("Invalid request: {}", e));
                return encode(&error.envelope());
            }
        };

        match self.pipeline.handle(request).await {
            Ok(completion) => encode(&completion),
            Err(e) => encode(&e.envelope()),
        }
    }

    async fn health(&self) -> HealthReport {
        let auth_peers = self.peer_count(workers::AUTH).await;
        let inference_peers = self.peer_count(workers::INFERENCE).await;
        let status = if auth_peers > 0 && inference_peers > 0 {
            "healthy"
        } else {
            "degraded"
        };

        HealthReport {
            status: status.to_string(),
            auth_peers,
            inference_peers,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    async fn peer_count(&self, name: &str) -> u32 {
        match self.directory.resolve(name).await {
            Ok(_) => 1,
            Err(_) => 0,
        }
    }

    fn models(&self) -> ModelsResponse {
        ModelsResponse {
            available: self.models.available.clone(),
            default: self.models.default.clone(),
        }
    }

    /// Proxied to the auth worker; zeroed on any failure.
    async fn stats(&self, payload: &[u8]) -> UsageStats {
        let api_key = match decode::<ApiKeyRequest>(payload).ok().and_then(|r| r.api_key) {
            Some(k) => k,
            None => return UsageStats::default(),
        };

        self.auth.stats(&api_key).await.unwrap_or_else(|e| {
            tracing::error!("Stats error: {}", e);
            UsageStats::default()
        })
    }
}

#[async_trait]
impl RpcService for GatewayWorker {
    async fn handle(&self, method: &str, payload: Bytes) -> Result<Bytes, RpcError> {
        let reply = match method {
            methods::PING => return Ok(Bytes::from_static(PONG)),
            methods::INFER => self.infer(&payload).await,
            methods::HEALTH => encode(&self.health().await),
            methods::MODELS => encode(&self.models()),
            methods::STATS => encode(&self.stats(&payload).await),
            other => return Err(RpcError::UnknownMethod(other.to_string())),
        };
        Ok(Bytes::from(reply))
    }
}
