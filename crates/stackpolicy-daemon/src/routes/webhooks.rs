use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use tracing::{error, info, warn};

use crate::error::AppError;
use crate::state::AppState;
use crate::webhook::{verify_signature, WebhookEvent, SIGNATURE_HEADER};

/// POST /api/webhooks/pulumi
///
/// Stack-created deliveries start a creation pass in the background and
/// answer 202; any other event is acknowledged and ignored.
pub async fn pulumi_webhook(
    State(app): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    if let Some(secret) = app.webhook_secret.as_deref() {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !verify_signature(secret, &body, signature) {
            warn!("webhook rejected: bad or missing signature");
            return Err(AppError::unauthorized("invalid webhook signature"));
        }
    }

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::bad_request(format!("invalid webhook payload: {e}")))?;

    if !event.is_stack_created() {
        return Ok((
            StatusCode::OK,
            Json(serde_json::json!({ "status": "ignored" })),
        ));
    }

    let id = event.identity()?;
    info!(stack = %id, "stack created webhook received");

    let scheduler = app.scheduler.clone();
    let target = id.clone();
    tokio::spawn(async move {
        if let Err(e) = scheduler.on_stack_created(&target).await {
            error!(stack = %target, error = %e, "creation pass did not run");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "accepted", "stack": id.to_string() })),
    ))
}
