//! HTTP listener for AI Studio webhooks.

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use super::{WebhookHandler, WebhookOutcome};
use crate::consts::WEBHOOK_SECRET_HEADER;

/// Build the router serving `POST {path}`.
pub fn router(handler: Arc<WebhookHandler>, path: &str) -> Router {
    Router::new()
        .route(path, post(webhook_handler))
        .with_state(handler)
}

/// Serve until Ctrl+C.
pub async fn serve(listener: TcpListener, router: Router) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "webhook listener started");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down webhook listener");
        })
        .await
}

async fn webhook_handler(
    State(handler): State<Arc<WebhookHandler>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let secret = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|value| value.to_str().ok());

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "webhook body is not valid JSON");
            return (StatusCode::BAD_REQUEST, format!("invalid json: {e}")).into_response();
        }
    };

    match handler.handle(secret, payload).await {
        Ok(WebhookOutcome::Rejected) => {
            (StatusCode::UNAUTHORIZED, "invalid webhook secret").into_response()
        }
        Ok(WebhookOutcome::TaskReady {
            task_id,
            callback_executed,
        }) => axum::Json(json!({
            "status": "ok",
            "taskId": task_id,
            "callbackExecuted": callback_executed,
        }))
        .into_response(),
        Ok(WebhookOutcome::Forwarded) => axum::Json(json!({"status": "ok"})).into_response(),
        Err(e) => {
            error!(error = %e, "failed to process webhook");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
