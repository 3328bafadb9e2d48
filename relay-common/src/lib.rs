//! Relay Common Types
//!
//! Shared by the gateway, auth, inference and web workers: RPC wire shapes,
//! the inference capability trait, service discovery and the RPC substrate.

pub mod backend;
pub mod directory;
pub mod protocol;
pub mod rpc;
pub mod signal;

pub use backend::{InferenceBackend, InferenceFailure};
pub use directory::{
    DirectoryError, FileDirectory, MemoryDirectory, PeerAddress, ServiceDirectory,
    WorkerDescriptor, WorkerStatus,
};
pub use protocol::{
    methods, workers, ApiKeyRequest, Completion, ErrorEnvelope, FailureKind, HealthReport,
    HistoryEntry, InferOptions, InferRequest, Profile, Usage, UsageStats,
};
pub use rpc::{HttpTransport, LocalTransport, RpcError, RpcService, RpcTransport, ServerHandle};
