use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderName, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, warn};
use uuid::Uuid;

use super::dto::{
    CreatePlanRequest, CreatedPlanResponse, ListPlansQuery, PatchPlanRequest, RepairRequest,
    RepairResponse,
};
use super::repo_types::{NewPlan, Plan, PLACEHOLDER_USER_ID};
use super::services::{create_plan, list_plans, repair_placeholder_plans, resolve_owner};
use crate::{
    app::internal,
    auth::{AuthUser, Caller, MaybeAuthUser},
    state::AppState,
};

pub fn plan_routes() -> Router<AppState> {
    Router::new()
        .route("/plans", get(list).post(create))
        .route("/plans/repair", post(repair))
        .route("/plans/:id", get(get_one).patch(patch_activity))
}

fn not_found() -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, "Plan not found".into())
}

/// Loads a plan, hiding plans of other owners behind 404.
async fn owned_plan(
    state: &AppState,
    user_id: &str,
    id: Uuid,
) -> Result<Plan, (StatusCode, String)> {
    match state.store.get_plan(id).await.map_err(internal)? {
        Some(plan) if plan.user_id == user_id => Ok(plan),
        _ => Err(not_found()),
    }
}

/// POST /plans, called by the signed-in owner or by the voice workflow.
#[instrument(skip(state, payload))]
pub async fn create(
    State(state): State<AppState>,
    caller: Caller,
    Json(payload): Json<CreatePlanRequest>,
) -> Result<(StatusCode, [(HeaderName, String); 1], Json<CreatedPlanResponse>), (StatusCode, String)>
{
    let user_id = payload.user_id.trim().to_string();
    if user_id.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "user_id is required".into()));
    }
    if let Caller::User(sub) = &caller {
        if *sub != user_id {
            warn!(caller = %sub, %user_id, "plan creation for another user");
            return Err((StatusCode::FORBIDDEN, "Cannot create plans for another user".into()));
        }
    }

    let plan = create_plan(
        state.store.as_ref(),
        NewPlan {
            user_id,
            name: payload.name,
            workout_plan: payload.workout_plan,
            diet_plan: payload.diet_plan,
            is_active: payload.is_active,
        },
    )
    .await
    .map_err(internal)?;

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, format!("/api/v1/plans/{}", plan.id))],
        Json(CreatedPlanResponse { id: plan.id }),
    ))
}

/// GET /plans?user_id=...; without any owner the answer is an empty list.
#[instrument(skip(state))]
pub async fn list(
    State(state): State<AppState>,
    MaybeAuthUser(identity): MaybeAuthUser,
    Query(query): Query<ListPlansQuery>,
) -> Result<Json<Vec<Plan>>, (StatusCode, String)> {
    let owner = resolve_owner(query.user_id, identity);
    let plans = list_plans(state.store.as_ref(), owner)
        .await
        .map_err(internal)?;
    Ok(Json(plans))
}

#[instrument(skip(state))]
pub async fn get_one(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Plan>, (StatusCode, String)> {
    owned_plan(&state, &user_id, id).await.map(Json)
}

#[instrument(skip(state, payload))]
pub async fn patch_activity(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<PatchPlanRequest>,
) -> Result<Json<Plan>, (StatusCode, String)> {
    owned_plan(&state, &user_id, id).await?;
    state
        .store
        .set_plan_active(id, payload.is_active)
        .await
        .map_err(internal)?
        .map(Json)
        .ok_or_else(not_found)
}

#[instrument(skip(state, payload))]
pub async fn repair(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    payload: Option<Json<RepairRequest>>,
) -> Result<Json<RepairResponse>, (StatusCode, String)> {
    let Json(payload) = payload.unwrap_or_default();
    let target = payload.user_id.unwrap_or_else(|| caller.clone());
    if target != caller {
        warn!(%caller, %target, "repair requested for another user");
        return Err((StatusCode::FORBIDDEN, "Cannot repair plans for another user".into()));
    }
    if target == PLACEHOLDER_USER_ID {
        return Err((StatusCode::BAD_REQUEST, "Invalid user_id".into()));
    }

    let repaired_count = repair_placeholder_plans(state.store.as_ref(), &target)
        .await
        .map_err(internal)?;
    Ok(Json(RepairResponse { repaired_count }))
}
