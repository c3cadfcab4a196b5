//! Local HTTP endpoint the broadcast CLI posts to.

use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{
        rejection::{FormRejection, QueryRejection},
        Query, State,
    },
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::post,
    Form, Router,
};
use serde::Deserialize;
use tokio::{net::TcpListener, sync::mpsc};
use tokio_util::sync::CancellationToken;

use rcb_core::{errors::Error, Result};

pub use rcb_core::broadcast::BROADCAST_PATH;

#[derive(Clone)]
struct HttpState {
    queue: mpsc::Sender<String>,
    auth_token: Option<Arc<str>>,
}

#[derive(Debug, Deserialize)]
struct BroadcastForm {
    #[serde(default)]
    m: String,
}

/// `POST /broadcast` with field `m` in the form body or the query string.
/// When `auth_token` is set the request must carry `Authorization: Bearer <token>`.
pub fn router(queue: mpsc::Sender<String>, auth_token: Option<String>) -> Router {
    let state = HttpState {
        queue,
        auth_token: auth_token.map(Arc::from),
    };
    Router::new()
        .route(BROADCAST_PATH, post(broadcast))
        .with_state(state)
}

fn is_authorized(expected: Option<&str>, headers: &HeaderMap) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token.trim() == expected)
}

async fn broadcast(
    State(state): State<HttpState>,
    headers: HeaderMap,
    query: std::result::Result<Query<BroadcastForm>, QueryRejection>,
    form: std::result::Result<Form<BroadcastForm>, FormRejection>,
) -> StatusCode {
    if !is_authorized(state.auth_token.as_deref(), &headers) {
        tracing::warn!("rejected broadcast request without a valid token");
        return StatusCode::UNAUTHORIZED;
    }

    // The body wins over the query string; anything unparseable counts as empty.
    let from_body = form.map(|Form(f)| f.m).unwrap_or_default();
    let from_query = query.map(|Query(q)| q.m).unwrap_or_default();
    let message = if from_body.trim().is_empty() {
        from_query.trim().to_string()
    } else {
        from_body.trim().to_string()
    };
    if message.is_empty() {
        return StatusCode::OK;
    }

    tracing::debug!("received message from CLI: {message}");
    // Waits while the queue is full.
    if state.queue.send(message).await.is_err() {
        tracing::warn!("broadcast queue is closed");
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::OK
}

/// Serve on `127.0.0.1:<port>` until `shutdown` is cancelled.
pub async fn serve(
    port: u16,
    queue: mpsc::Sender<String>,
    auth_token: Option<String>,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("starting local web server for CLI on port: {port}");

    axum::serve(listener, router(queue, auth_token))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| Error::External(format!("local web server failed: {e}")))
}
