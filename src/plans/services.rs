use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use super::repo_types::{NewPlan, Plan, PLACEHOLDER_USER_ID};
use crate::store::{Store, StoreError};

const DIAGNOSTIC_SAMPLE: i64 = 5;

/// True for owner ids such as `{{user_id}}` that a template engine never filled in.
pub(crate) fn looks_like_placeholder(user_id: &str) -> bool {
    lazy_static! {
        static ref PLACEHOLDER_RE: Regex =
            Regex::new(r"^\{\{\s*[A-Za-z_][A-Za-z0-9_]*\s*\}\}$").unwrap();
    }
    PLACEHOLDER_RE.is_match(user_id)
}

/// The explicit owner wins; the caller's identity is the fallback.
pub fn resolve_owner(explicit: Option<String>, identity: Option<String>) -> Option<String> {
    explicit
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .or(identity)
}

pub async fn create_plan(store: &dyn Store, plan: NewPlan) -> Result<Plan, StoreError> {
    info!(
        user_id = %plan.user_id,
        name = %plan.name,
        is_active = plan.is_active,
        workout_days = plan.workout_plan.exercises.len(),
        diet_meals = plan.diet_plan.meals.len(),
        "creating plan"
    );
    if looks_like_placeholder(&plan.user_id) {
        warn!(user_id = %plan.user_id, "plan owner looks like an unrendered template variable");
    }

    let created = store.create_plan(plan).await?;
    info!(plan_id = %created.id, user_id = %created.user_id, "inserted plan");
    Ok(created)
}

/// Lists the owner's plans, newest first. No owner means no plans.
pub async fn list_plans(store: &dyn Store, owner: Option<String>) -> Result<Vec<Plan>, StoreError> {
    let Some(owner) = owner else {
        warn!("no identity and no user_id provided; returning no plans");
        return Ok(Vec::new());
    };

    let plans = store.list_plans(&owner).await?;
    info!(user_id = %owner, count = plans.len(), "listed plans");
    if plans.is_empty() {
        let recent = store.recent_plan_owners(DIAGNOSTIC_SAMPLE).await?;
        info!(user_id = %owner, recent_owners = ?recent, "no plans for owner");
    }
    Ok(plans)
}

/// Hands every plan stored under the placeholder owner to `user_id`.
pub async fn repair_placeholder_plans(store: &dyn Store, user_id: &str) -> Result<u64, StoreError> {
    let repaired = store.reassign_plans(PLACEHOLDER_USER_ID, user_id).await?;
    info!(%user_id, repaired, "repaired placeholder plans");
    Ok(repaired)
}
