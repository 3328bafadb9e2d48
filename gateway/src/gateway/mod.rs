//! Gateway worker: the `infer` pipeline and its RPC surface.

pub mod dispatch;
pub mod pipeline;
pub mod worker;

pub use dispatch::RemoteInference;
pub use pipeline::{GatewayPipeline, Stage};
pub use worker::GatewayWorker;
