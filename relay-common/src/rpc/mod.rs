//! Request/response RPC substrate between workers.
//!
//! Payloads are opaque bytes (JSON in practice). A worker exposes its methods
//! by implementing [`RpcService`]; callers reach peers through an
//! [`RpcTransport`], always with an explicit deadline. There is no automatic
//! retry: a timed-out call is abandoned and reported as [`RpcError::Timeout`].

mod http;
mod local;
mod server;

pub use self::http::HttpTransport;
pub use local::LocalTransport;
pub use server::{log_rpc_call, rpc_router, ServerHandle};

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::directory::PeerAddress;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    #[error("Request to {0} timed out")]
    Timeout(String),

    #[error("Peer {0} is unreachable")]
    Unreachable(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Peer returned {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("Malformed payload: {0}")]
    Malformed(String),
}

/// Method table of one worker.
#[async_trait]
pub trait RpcService: Send + Sync {
    /// Answer one call. Domain failures are encoded in the reply; only an
    /// unknown method or a broken handler yields an error.
    async fn handle(&self, method: &str, payload: Bytes) -> Result<Bytes, RpcError>;
}

/// Client side of the substrate.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn request(
        &self,
        peer: &PeerAddress,
        method: &str,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Bytes, RpcError>;
}

/// Typed call: JSON-encode `request`, send it, decode the reply as `Resp`.
pub async fn call<Req, Resp>(
    transport: &dyn RpcTransport,
    peer: &PeerAddress,
    method: &str,
    request: &Req,
    timeout: Duration,
) -> Result<Resp, RpcError>
where
    Req: Serialize + ?Sized,
    Resp: DeserializeOwned,
{
    let payload =
        serde_json::to_vec(request).map_err(|e| RpcError::Malformed(e.to_string()))?;
    let reply = transport
        .request(peer, method, Bytes::from(payload), timeout)
        .await?;
    decode(&reply)
}

/// Decode a JSON payload.
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, RpcError> {
    serde_json::from_slice(payload).map_err(|e| RpcError::Malformed(e.to_string()))
}
