//! Client for the auth worker, resolved through discovery on every call.

use std::sync::Arc;
use std::time::Duration;

use relay_common::protocol::{
    CheckLimitResponse, GenerateKeyRequest, GenerateKeyResponse, RegisterRequest,
    RegisterResponse, TrackUsageRequest, TrackUsageResponse, UsageSummary, ValidateResponse,
};
use relay_common::rpc;
use relay_common::{
    methods, workers, ApiKeyRequest, DirectoryError, ErrorEnvelope, Profile, RpcError,
    RpcTransport, ServiceDirectory, UsageStats,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthCallError {
    #[error(transparent)]
    Discovery(#[from] DirectoryError),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// The auth worker answered with an error envelope.
    #[error("{0}")]
    Rejected(String),
}

/// Either the expected reply or an error envelope.
#[derive(Deserialize)]
#[serde(untagged)]
enum Reply<T> {
    Failed(ErrorEnvelope),
    Ok(T),
}

#[derive(Clone)]
pub struct AuthClient {
    directory: Arc<dyn ServiceDirectory>,
    transport: Arc<dyn RpcTransport>,
    timeout: Duration,
}

impl AuthClient {
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

    async fn call<Req, Resp>(&self, method: &str, request: &Req) -> Result<Resp, AuthCallError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let peer = self.directory.resolve(workers::AUTH).await?;
        let reply = rpc::call(&*self.transport, &peer, method, request, self.timeout).await?;
        Ok(reply)
    }

    /// Like `call`, but an `{error}` reply becomes [`AuthCallError::Rejected`].
    async fn call_checked<Req, Resp>(
        &self,
        method: &str,
        request: &Req,
    ) -> Result<Resp, AuthCallError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        match self.call::<Req, Reply<Resp>>(method, request).await? {
            Reply::Ok(reply) => Ok(reply),
            Reply::Failed(envelope) => Err(AuthCallError::Rejected(envelope.error)),
        }
    }

    pub async fn ping(&self) -> Result<(), AuthCallError> {
        let peer = self.directory.resolve(workers::AUTH).await?;
        self.transport
            .request(&peer, methods::PING, bytes::Bytes::new(), self.timeout)
            .await?;
        Ok(())
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<String, AuthCallError> {
        let reply: RegisterResponse = self.call_checked(methods::REGISTER, request).await?;
        Ok(reply.api_key)
    }

    pub async fn generate_api_key(
        &self,
        request: &GenerateKeyRequest,
    ) -> Result<String, AuthCallError> {
        let reply: GenerateKeyResponse = self.call_checked(methods::GENERATE_API_KEY, request).await?;
        Ok(reply.api_key)
    }

    pub async fn validate(&self, api_key: &str) -> Result<ValidateResponse, AuthCallError> {
        self.call(methods::VALIDATE, &ApiKeyRequest::new(api_key))
            .await
    }

    pub async fn check_limit(&self, api_key: &str) -> Result<bool, AuthCallError> {
        let reply: CheckLimitResponse = self
            .call(methods::CHECK_LIMIT, &ApiKeyRequest::new(api_key))
            .await?;
        Ok(reply.allowed)
    }

    pub async fn track_usage(
        &self,
        request: &TrackUsageRequest,
    ) -> Result<TrackUsageResponse, AuthCallError> {
        self.call(methods::TRACK_USAGE, request).await
    }

    pub async fn stats(&self, api_key: &str) -> Result<UsageStats, AuthCallError> {
        self.call(methods::STATS, &ApiKeyRequest::new(api_key)).await
    }

    pub async fn profile(&self, api_key: &str) -> Result<Profile, AuthCallError> {
        self.call(methods::PROFILE, &ApiKeyRequest::new(api_key))
            .await
    }

    pub async fn usage_summary(&self, api_key: &str) -> Result<UsageSummary, AuthCallError> {
        self.call(methods::GET_USAGE, &ApiKeyRequest::new(api_key))
            .await
    }
}

