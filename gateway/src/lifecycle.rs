//! Starting and stopping a worker role.
//!
//! [`RunningWorker::open`] acquires everything a role needs: stores, the
//! listener, the directory entry and the idle sweep. If any step fails the
//! steps before it are undone. [`RunningWorker::close`] releases them in
//! reverse order.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use relay_common::rpc::rpc_router;
use relay_common::{
    workers, DirectoryError, PeerAddress, RpcTransport, ServerHandle, ServiceDirectory,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::auth::{
    AuthClient, AuthGateway, AuthWorker, CredentialError, CredentialStore, MemoryCredentialStore,
    SqliteCredentialStore,
};
use crate::clock::SystemClock;
use crate::config::Config;
use crate::gateway::{GatewayPipeline, GatewayWorker, RemoteInference};
use crate::limiter::SlidingWindowLimiter;
use crate::usage::MemoryUsageRecorder;
use crate::web;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Role {
    Gateway,
    Auth,
    Web,
}

impl Role {
    /// Name the role registers under in the directory.
    pub fn worker_name(&self) -> &'static str {
        match self {
            Role::Gateway => workers::GATEWAY,
            Role::Auth => workers::AUTH,
            Role::Web => workers::WEB,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.worker_name())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("Failed to open credential store: {0}")]
    Store(#[from] CredentialError),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("Failed to register in discovery: {0}")]
    Discovery(#[from] DirectoryError),
}

/// What a role serves. `auth` is set for the role that owns rate-limit state.
struct Assembly {
    router: Router,
    auth: Option<Arc<AuthGateway>>,
}

fn assemble(
    config: &Config,
    role: Role,
    directory: &Arc<dyn ServiceDirectory>,
    transport: &Arc<dyn RpcTransport>,
) -> Result<Assembly, StartError> {
    let auth_client = || {
        AuthClient::new(
            directory.clone(),
            transport.clone(),
            config.timeouts.auth(),
        )
    };

    let assembly = match role {
        Role::Auth => {
            let credentials: Arc<dyn CredentialStore> = match &config.database.url {
                Some(url) => {
                    tracing::info!("Using SQLite credential store at {}", url);
                    Arc::new(SqliteCredentialStore::new(url)?)
                }
                None => Arc::new(MemoryCredentialStore::new()),
            };
            let gateway = Arc::new(AuthGateway::new(
                credentials,
                Arc::new(SlidingWindowLimiter::default()),
                Arc::new(MemoryUsageRecorder::new(config.limits.history_capacity)),
                Arc::new(SystemClock),
                config.limits.default_max_requests_per_minute,
            ));
            Assembly {
                router: rpc_router(Arc::new(AuthWorker::new(gateway.clone()))),
                auth: Some(gateway),
            }
        }
        Role::Gateway => {
            let backend = RemoteInference::new(
                directory.clone(),
                transport.clone(),
                config.timeouts.inference(),
            );
            let pipeline = GatewayPipeline::new(
                auth_client(),
                Arc::new(backend),
                config.models.default.clone(),
            );
            let worker = GatewayWorker::new(
                pipeline,
                auth_client(),
                directory.clone(),
                config.models.clone(),
            );
            Assembly {
                router: rpc_router(Arc::new(worker)),
                auth: None,
            }
        }
        Role::Web => Assembly {
            router: web::router(auth_client()),
            auth: None,
        },
    };

    Ok(assembly)
}

fn spawn_idle_sweep(auth: Arc<AuthGateway>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = auth.evict_idle();
            if evicted > 0 {
                tracing::debug!(evicted, "Evicted idle rate-limit windows");
            }
        }
    })
}

/// A started role: listening, registered, sweeping.
pub struct RunningWorker {
    role: Role,
    server: ServerHandle,
    address: PeerAddress,
    directory: Arc<dyn ServiceDirectory>,
    sweep: Option<JoinHandle<()>>,
}

impl RunningWorker {
    pub async fn open(
        config: &Config,
        role: Role,
        directory: Arc<dyn ServiceDirectory>,
        transport: Arc<dyn RpcTransport>,
    ) -> Result<Self, StartError> {
        let assembly = assemble(config, role, &directory, &transport)?;

        let addr = config.server.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| StartError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let server = ServerHandle::spawn(listener, assembly.router)
            .map_err(|source| StartError::Bind { addr, source })?;

        let address = server.peer_address(&config.server.advertise_host);
        if let Err(e) = directory.register(role.worker_name(), address.clone()).await {
            let _ = server.close().await;
            return Err(e.into());
        }
        tracing::info!(role = %role, "Worker registered at {}", address);

        let sweep = match assembly.auth {
            Some(auth) if config.limits.idle_sweep_secs > 0 => Some(spawn_idle_sweep(
                auth,
                Duration::from_secs(config.limits.idle_sweep_secs),
            )),
            _ => None,
        };

        Ok(Self {
            role,
            server,
            address,
            directory,
            sweep,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn address(&self) -> &PeerAddress {
        &self.address
    }

    /// Deregister, stop the sweep, then drain and stop the server.
    pub async fn close(mut self) -> std::io::Result<()> {
        if let Err(e) = self
            .directory
            .deregister(self.role.worker_name(), &self.address)
            .await
        {
            tracing::warn!(role = %self.role, "Failed to deregister: {}", e);
        }
        if let Some(sweep) = self.sweep.take() {
            sweep.abort();
        }
        self.server.close().await?;
        tracing::info!(role = %self.role, "Worker stopped");
        Ok(())
    }
}
