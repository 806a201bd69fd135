//! Webhook HTTP server.
//!
//! | Route            | Purpose                                     |
//! |------------------|---------------------------------------------|
//! | `POST /webhook`  | GitHub deliveries, kind in `X-GitHub-Event` |
//! | `GET /health`    | liveness check                              |
//! | `GET /metrics`   | Prometheus text exposition                  |
//!
//! When a webhook secret is configured every delivery must carry a valid
//! `X-Hub-Signature-256` header.
//!
//! Webhook responses:
//!
//! - `401 Unauthorized` when the signature is missing or wrong
//! - `202 Accepted` with `{"release": ..., "jobs": [...]}` when builds were spawned
//! - `200 OK` with the same body when the event was ignored
//! - `400 Bad Request` when the header is missing or the payload does not decode
//! - `500 Internal Server Error` when routing failed

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::error::RouterError;
use crate::metrics;
use crate::router::{EventRouter, WebhookEvent};
use crate::signature::{WebhookSecret, SIGNATURE_HEADER};

/// Header carrying the webhook event kind.
pub const EVENT_HEADER: &str = "x-github-event";

/// State shared by the webhook handlers.
#[derive(Clone)]
struct ServerState {
    router: Arc<EventRouter>,
    secret: Option<WebhookSecret>,
}

/// Build the axum router with all endpoints.
///
/// Without a secret, deliveries are accepted unsigned.
pub fn build_router(router: Arc<EventRouter>, secret: Option<WebhookSecret>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/webhook", post(webhook_handler))
        .with_state(ServerState { router, secret })
}

/// Serves `app` on `addr` until `shutdown` resolves.
pub async fn serve<F>(addr: SocketAddr, app: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind webhook server to {}", addr))?;
    let local = listener
        .local_addr()
        .context("Failed to get server address")?;

    info!(addr = %local, "Webhook server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Webhook server error")
}

/// Health check endpoint.
async fn health_handler() -> &'static str {
    "ok"
}

async fn metrics_handler() -> String {
    metrics::export_metrics()
}

/// Decodes and routes one delivery.
async fn webhook_handler(
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(secret) = &state.secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok());
        if let Err(e) = secret.verify(signature, &body) {
            let kind = headers
                .get(EVENT_HEADER)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("unknown");
            warn!(kind, error = %e, "Rejected unsigned webhook delivery");
            metrics::webhook_event(kind, "unauthorized");
            return error_response(StatusCode::UNAUTHORIZED, &e.to_string());
        }
    }

    let Some(kind) = headers
        .get(EVENT_HEADER)
        .and_then(|value| value.to_str().ok())
    else {
        warn!("Webhook delivery without event header");
        return error_response(StatusCode::BAD_REQUEST, "missing X-GitHub-Event header");
    };

    let event = match WebhookEvent::from_delivery(kind, &body) {
        Ok(event) => event,
        Err(e) => {
            warn!(kind, error = %e, "Rejected webhook delivery");
            return error_response(StatusCode::BAD_REQUEST, &e.to_string());
        }
    };

    match state.router.route(&event).await {
        Ok(outcome) => {
            let status = if outcome.is_ignored() {
                StatusCode::OK
            } else {
                StatusCode::ACCEPTED
            };
            (status, Json(outcome)).into_response()
        }
        Err(e) => {
            error!(kind, error = %e, "Failed to route webhook event");
            let status = match e {
                RouterError::Decode { .. } => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            error_response(status, &e.to_string())
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
