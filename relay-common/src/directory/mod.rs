//! Service discovery: logical worker name → current peer address.
//!
//! The directory holds at most one descriptor per name. A later registration
//! replaces the earlier one as a whole (last write wins). Resolution does not
//! check liveness; a stale address surfaces as an RPC timeout at the caller.

mod file;
mod memory;

pub use file::FileDirectory;
pub use memory::MemoryDirectory;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque identity of a reachable peer.
///
/// For the HTTP substrate this is the worker's base URL. On disk it is stored
/// hex-encoded, the same way the peer-to-peer substrate stores public keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerAddress(String);

impl PeerAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0.as_bytes())
    }

    pub fn from_hex(encoded: &str) -> Result<Self, DirectoryError> {
        let bytes = hex::decode(encoded)
            .map_err(|e| DirectoryError::Store(format!("invalid peer key: {}", e)))?;
        let address = String::from_utf8(bytes)
            .map_err(|e| DirectoryError::Store(format!("invalid peer key: {}", e)))?;
        Ok(Self(address))
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Liveness marker stored with each descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Active,
    Stopped,
}

impl Default for WorkerStatus {
    fn default() -> Self {
        WorkerStatus::Active
    }
}

/// One registered worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerDescriptor {
    pub name: String,
    pub address: PeerAddress,
    pub registered_at: DateTime<Utc>,
    pub status: WorkerStatus,
}

impl WorkerDescriptor {
    pub fn active(name: &str, address: PeerAddress) -> Self {
        Self {
            name: name.to_string(),
            address,
            registered_at: Utc::now(),
            status: WorkerStatus::Active,
        }
    }

    pub fn is_live(&self) -> bool {
        self.status == WorkerStatus::Active
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    #[error("Worker {0} not found in discovery")]
    NotFound(String),

    #[error("Discovery store error: {0}")]
    Store(String),
}

/// Name → address registry shared between workers.
#[async_trait]
pub trait ServiceDirectory: Send + Sync {
    /// Upsert the descriptor for `name`, replacing any earlier one.
    async fn register(&self, name: &str, address: PeerAddress) -> Result<(), DirectoryError>;

    /// Current live address for `name`.
    async fn resolve(&self, name: &str) -> Result<PeerAddress, DirectoryError>;

    /// Mark `name` stopped, but only while it still points at `address`.
    async fn deregister(&self, name: &str, address: &PeerAddress) -> Result<(), DirectoryError>;

    /// All descriptors, live or not.
    async fn list(&self) -> Result<Vec<WorkerDescriptor>, DirectoryError>;
}
