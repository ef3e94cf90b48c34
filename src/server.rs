//! Inbound HTTP: the push webhook and a health check.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::push::{PushHandler, PushOutcome};

/// Header a pusher can set to name the endpoint the update belongs to
pub const SOURCE_URL_HEADER: &str = "x-source-url";

#[derive(Debug, Deserialize)]
struct PushQuery {
    source: Option<String>,
}

pub fn router(handler: Arc<PushHandler>) -> Router {
    Router::new()
        .route("/", post(receive_push))
        .route("/webhook", post(receive_push))
        .route("/health", get(health))
        .with_state(handler)
}

/// Bind before anything else starts, so a taken port aborts startup
pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Push server listening on {}", addr);
    Ok(listener)
}

/// Serve until `shutdown` fires
pub async fn serve(
    listener: TcpListener,
    handler: Arc<PushHandler>,
    shutdown: CancellationToken,
) -> Result<()> {
    axum::serve(listener, router(handler))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("Push server failed")?;

    info!("Push server stopped");
    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

async fn receive_push(
    State(handler): State<Arc<PushHandler>>,
    Query(query): Query<PushQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    let source_url = headers
        .get(SOURCE_URL_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .or(query.source);

    info!(
        "Push received: {} bytes, content type {:?}, source {:?}",
        body.len(),
        content_type,
        source_url
    );

    match handler
        .on_push(&body, content_type, source_url.as_deref())
        .await
    {
        PushOutcome::Accepted { chats, .. } => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "chats": chats })),
        ),
        PushOutcome::Rejected(reason) => {
            warn!("Push rejected: {}", reason);
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "status": "rejected", "reason": reason })),
            )
        }
    }
}
