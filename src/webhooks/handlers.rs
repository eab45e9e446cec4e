use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use super::payload::{action_for, WebhookAction};
use super::signature::{self, Delivery, SignatureError};
use crate::{app::internal, state::AppState, users::services::sync_user};

pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/webhooks/clerk", post(identity_webhook))
}

fn header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, SignatureError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or(SignatureError::MissingHeader(name))
}

fn check_signature(secret: &str, headers: &HeaderMap, body: &[u8]) -> Result<(), SignatureError> {
    let delivery = Delivery {
        id: header(headers, signature::ID_HEADER)?,
        timestamp: header(headers, signature::TIMESTAMP_HEADER)?,
        signatures: header(headers, signature::SIGNATURE_HEADER)?,
    };
    signature::verify(
        secret,
        &delivery,
        body,
        OffsetDateTime::now_utc().unix_timestamp(),
    )
}

/// Keeps the users table in step with the identity provider.
#[instrument(skip(state, headers, body))]
pub async fn identity_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, (StatusCode, String)> {
    if let Some(secret) = state.config.webhook_secret.as_deref() {
        if let Err(e) = check_signature(secret, &headers, &body) {
            warn!(error = %e, "rejected identity webhook");
            return Err((StatusCode::UNAUTHORIZED, e.to_string()));
        }
    }

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid JSON: {}", e)))?;

    match action_for(&payload) {
        WebhookAction::Ignore(reason) => {
            info!(%reason, "ignoring identity webhook");
            Ok(Json(json!({ "status": "ignored" })))
        }
        WebhookAction::Upsert(user) => {
            let (user, created) = sync_user(state.store.as_ref(), user)
                .await
                .map_err(internal)?;
            Ok(Json(json!({
                "status": "ok",
                "user_id": user.id,
                "created": created,
            })))
        }
    }
}
