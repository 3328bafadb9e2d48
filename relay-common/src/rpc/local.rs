//! In-process transport for single-process deployments and tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use super::{RpcError, RpcService, RpcTransport};
use crate::directory::PeerAddress;

/// Routes calls to services mounted under a peer address.
///
/// Each call runs on its own task: when the caller's deadline passes, the
/// caller stops waiting but the handler still runs to completion and its
/// result is discarded.
#[derive(Clone, Default)]
pub struct LocalTransport {
    services: Arc<RwLock<HashMap<PeerAddress, Arc<dyn RpcService>>>>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn mount(&self, address: PeerAddress, service: Arc<dyn RpcService>) {
        self.services.write().await.insert(address, service);
    }

    pub async fn unmount(&self, address: &PeerAddress) {
        self.services.write().await.remove(address);
    }
}

#[async_trait]
impl RpcTransport for LocalTransport {
    async fn request(
        &self,
        peer: &PeerAddress,
        method: &str,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Bytes, RpcError> {
        let service = self
            .services
            .read()
            .await
            .get(peer)
            .cloned()
            .ok_or_else(|| RpcError::Unreachable(peer.to_string()))?;

        let method = method.to_string();
        let call = tokio::spawn(async move { service.handle(&method, payload).await });

        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(join_error)) => Err(RpcError::Remote {
                status: 500,
                message: join_error.to_string(),
            }),
            Err(_) => Err(RpcError::Timeout(peer.to_string())),
        }
    }
}
