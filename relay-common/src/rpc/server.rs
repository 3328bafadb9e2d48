//! HTTP server side of the substrate, with graceful drain on close.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::{RpcError, RpcService};
use crate::directory::PeerAddress;

/// Middleware that logs every RPC call at INFO level.
pub async fn log_rpc_call(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let path = request.uri().path().to_string();
    let method = path.strip_prefix("/rpc/").unwrap_or(&path).to_string();

    let response = next.run(request).await;

    tracing::info!(
        rpc_method = %method,
        status = %response.status().as_u16(),
        duration_ms = %start.elapsed().as_millis(),
        "RPC call"
    );

    response
}

async fn dispatch(
    State(service): State<Arc<dyn RpcService>>,
    Path(method): Path<String>,
    payload: Bytes,
) -> Response {
    match service.handle(&method, payload).await {
        Ok(reply) => (StatusCode::OK, reply).into_response(),
        Err(RpcError::UnknownMethod(m)) => {
            (StatusCode::NOT_FOUND, format!("Unknown method: {}", m)).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Router exposing `service` at `POST /rpc/{method}`.
pub fn rpc_router(service: Arc<dyn RpcService>) -> Router {
    Router::new()
        .route("/rpc/:method", post(dispatch))
        .layer(middleware::from_fn(log_rpc_call))
        .with_state(service)
}

/// A running HTTP server.
///
/// [`ServerHandle::close`] stops accepting connections and waits for
/// in-flight requests to finish. Dropping the handle without closing still
/// signals shutdown, so the listener is released on every exit path.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<std::io::Result<()>>>,
}

impl ServerHandle {
    /// Serve `router` on an already bound listener.
    pub fn spawn(listener: TcpListener, router: Router) -> std::io::Result<Self> {
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        tracing::info!("Listening on {}", local_addr);
        Ok(Self {
            local_addr,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    /// Bind `addr` and serve `service` over the RPC router.
    pub async fn bind_rpc(addr: &str, service: Arc<dyn RpcService>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Self::spawn(listener, rpc_router(service))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Address peers should use to reach this server.
    pub fn peer_address(&self, advertise_host: &str) -> PeerAddress {
        PeerAddress::new(format!(
            "http://{}:{}",
            advertise_host,
            self.local_addr.port()
        ))
    }

    /// Stop accepting, drain in-flight requests, release the listener.
    pub async fn close(mut self) -> std::io::Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?,
            None => Ok(()),
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
