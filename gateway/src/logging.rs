use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Query parameters whose values never reach the log.
const SECRET_PARAMS: &[&str] = &["apiKey", "password"];

/// Install the global subscriber. `RUST_LOG` wins over `level`.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// `query` with the values of secret parameters masked.
pub fn redact_query(query: &str) -> String {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((name, _)) if SECRET_PARAMS.contains(&name) => format!("{}=***", name),
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Logs each web request once answered: server errors at ERROR, rejected
/// requests at WARN, everything else at INFO.
pub async fn request_logger(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let route = request.uri().path().to_string();
    let query = request.uri().query().map(redact_query).unwrap_or_default();

    let response = next.run(request).await;

    let status = response.status();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    if status.is_server_error() {
        tracing::error!(%method, %route, %query, status = status.as_u16(), elapsed_ms, "Web request failed");
    } else if status.is_client_error() {
        tracing::warn!(%method, %route, %query, status = status.as_u16(), elapsed_ms, "Web request rejected");
    } else {
        tracing::info!(%method, %route, %query, status = status.as_u16(), elapsed_ms, "Web request served");
    }

    response
}
