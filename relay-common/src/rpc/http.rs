//! HTTP transport: `POST {peer}/rpc/{method}` with the raw payload as body.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};

use super::{RpcError, RpcTransport};
use crate::directory::PeerAddress;

/// Transport over plain HTTP request/response.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    http_client: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            http_client: Client::new(),
        }
    }

    fn classify(peer: &PeerAddress, error: reqwest::Error) -> RpcError {
        if error.is_timeout() {
            RpcError::Timeout(peer.to_string())
        } else {
            tracing::debug!("RPC to {} failed: {}", peer, error);
            RpcError::Unreachable(peer.to_string())
        }
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn request(
        &self,
        peer: &PeerAddress,
        method: &str,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Bytes, RpcError> {
        let url = format!("{}/rpc/{}", peer.as_str().trim_end_matches('/'), method);

        let response = self
            .http_client
            .post(&url)
            .timeout(timeout)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|e| Self::classify(peer, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RpcError::UnknownMethod(method.to_string()));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RpcError::Remote {
                status: status.as_u16(),
                message,
            });
        }

        response.bytes().await.map_err(|e| Self::classify(peer, e))
    }
}
