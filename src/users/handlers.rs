use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, warn};

use super::dto::{SyncUserRequest, SyncUserResponse, UpdateUserRequest};
use super::repo_types::{NewUser, User, UserPatch};
use super::services::{is_valid_email, normalize_email, sync_user};
use crate::{app::internal, auth::AuthUser, state::AppState};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/sync", post(sync))
        .route("/users/:external_id", get(get_by_external_id).put(update))
        .route("/me", get(get_me))
}

fn check_email(email: &str) -> Result<String, (StatusCode, String)> {
    let email = normalize_email(email);
    if !email.is_empty() && !is_valid_email(&email) {
        warn!(%email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }
    Ok(email)
}

fn check_self(caller: &str, target: &str) -> Result<(), (StatusCode, String)> {
    if caller != target {
        warn!(%caller, %target, "user tried to modify another user");
        return Err((StatusCode::FORBIDDEN, "Cannot modify another user".into()));
    }
    Ok(())
}

#[instrument(skip(state, payload))]
pub async fn sync(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Json(payload): Json<SyncUserRequest>,
) -> Result<Json<SyncUserResponse>, (StatusCode, String)> {
    check_self(&caller, &payload.external_id)?;
    let email = check_email(&payload.email)?;

    let (user, created) = sync_user(
        state.store.as_ref(),
        NewUser {
            external_id: payload.external_id,
            name: payload.name.trim().to_string(),
            email,
            image: payload.image.filter(|i| !i.is_empty()),
        },
    )
    .await
    .map_err(internal)?;

    Ok(Json(SyncUserResponse {
        id: user.id,
        created,
    }))
}

#[instrument(skip(state, payload))]
pub async fn update(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(external_id): Path<String>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<User>, (StatusCode, String)> {
    check_self(&caller, &external_id)?;
    let email = check_email(&payload.email)?;

    let patch = UserPatch {
        name: payload.name.trim().to_string(),
        email,
        image: payload.image.filter(|i| !i.is_empty()),
    };
    state
        .store
        .patch_user(&external_id, patch)
        .await
        .map_err(internal)?
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "User not found".to_string()))
}

#[instrument(skip(state))]
pub async fn get_by_external_id(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
) -> Result<Json<Option<User>>, (StatusCode, String)> {
    let user = state
        .store
        .find_user(&external_id)
        .await
        .map_err(internal)?;
    Ok(Json(user))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Option<User>>, (StatusCode, String)> {
    let user = state.store.find_user(&user_id).await.map_err(internal)?;
    Ok(Json(user))
}
