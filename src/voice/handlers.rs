use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error, instrument, warn};

use super::events::parse_server_message;
use super::session::CallSession;
use crate::{
    auth::{extractors::secrets_match, AuthUser},
    state::AppState,
};

pub const SERVER_SECRET_HEADER: &str = "x-vapi-secret";
const DEFAULT_FULL_NAME: &str = "User";

#[derive(Debug, Serialize)]
pub struct VariableValues {
    pub full_name: String,
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct AssistantOverrides {
    pub recording_enabled: bool,
    pub variable_values: VariableValues,
}

#[derive(Debug, Serialize)]
pub struct VoiceConfigResponse {
    pub api_key: String,
    pub assistant_id: String,
    pub overrides: AssistantOverrides,
}

pub fn voice_routes() -> Router<AppState> {
    Router::new()
        .route("/voice/config", get(get_config))
        .route("/voice/events", post(receive_event))
        .route("/voice/calls/:call_id", get(get_call))
}

/// Everything the browser needs to start a call for the signed-in user.
#[instrument(skip(state))]
pub async fn get_config(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<VoiceConfigResponse>, (StatusCode, String)> {
    let voice = &state.config.voice;
    let (Some(api_key), Some(assistant_id)) = (&voice.api_key, &voice.assistant_id) else {
        warn!("voice assistant requested but not configured");
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "voice assistant is not configured".into(),
        ));
    };

    let full_name = match state.store.find_user(&user_id).await {
        Ok(Some(user)) if !user.name.trim().is_empty() => user.name,
        Ok(_) => DEFAULT_FULL_NAME.to_string(),
        Err(e) => {
            error!(error = %e, %user_id, "user lookup failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };

    Ok(Json(VoiceConfigResponse {
        api_key: api_key.clone(),
        assistant_id: assistant_id.clone(),
        overrides: AssistantOverrides {
            recording_enabled: false,
            variable_values: VariableValues { full_name, user_id },
        },
    }))
}

#[instrument(skip(state, headers, body))]
pub async fn receive_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, (StatusCode, String)> {
    if let Some(expected) = state.config.voice.server_secret.as_deref() {
        let given = headers
            .get(SERVER_SECRET_HEADER)
            .and_then(|h| h.to_str().ok())
            .unwrap_or_default();
        if !secrets_match(given, expected) {
            warn!("voice server message with bad secret");
            return Err((StatusCode::UNAUTHORIZED, "invalid voice server secret".into()));
        }
    }

    let Some(message) = parse_server_message(&body) else {
        debug!("ignoring voice server message");
        return Ok(Json(json!({ "status": "ignored" })));
    };

    let session = state
        .calls
        .apply(&message.call_id, message.owner, message.event)
        .await;
    debug!(call_id = %message.call_id, status = ?session.status, "voice call updated");
    Ok(Json(json!({ "status": "ok" })))
}

#[instrument(skip(state))]
pub async fn get_call(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(call_id): Path<String>,
) -> Result<Json<CallSession>, (StatusCode, String)> {
    state
        .calls
        .snapshot_for(&call_id, &user_id)
        .await
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "call not found".to_string()))
}
