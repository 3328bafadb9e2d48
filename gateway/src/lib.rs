pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod limiter;
pub mod logging;
pub mod models;
pub mod usage;
pub mod web;

pub use auth::{
    Admission, AuthClient, AuthGateway, AuthWorker, CredentialStore, MemoryCredentialStore,
    SqliteCredentialStore, ValidationOutcome,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, ModelsConfig};
pub use error::PipelineError;
pub use gateway::{GatewayPipeline, GatewayWorker, RemoteInference};
pub use lifecycle::{Role, RunningWorker, StartError};
pub use limiter::{RateLimiter, SlidingWindowLimiter};
pub use usage::{MemoryUsageRecorder, UsageRecorder};
