//! Relay inference worker.
//!
//! Wraps an OpenAI-compatible provider behind the `process` RPC and registers
//! itself in discovery as `inference`.

pub mod config;
pub mod openai;
pub mod worker;

pub use openai::OpenAiBackend;
pub use worker::{InferenceWorker, RunningInferenceWorker, StartError};
