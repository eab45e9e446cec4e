use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::repo_types::{DietPlan, WorkoutPlan};

#[derive(Debug, Deserialize)]
pub struct CreatePlanRequest {
    #[serde(alias = "userId")]
    pub user_id: String,
    pub name: String,
    #[serde(alias = "workoutPlan")]
    pub workout_plan: WorkoutPlan,
    #[serde(alias = "dietPlan")]
    pub diet_plan: DietPlan,
    #[serde(alias = "isActive", default = "default_active")]
    pub is_active: bool,
}
fn default_active() -> bool { true }

#[derive(Debug, Serialize)]
pub struct CreatedPlanResponse {
    pub id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ListPlansQuery {
    #[serde(default, alias = "userId")]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PatchPlanRequest {
    #[serde(alias = "isActive")]
    pub is_active: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct RepairRequest {
    #[serde(default, alias = "userId")]
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RepairResponse {
    pub repaired_count: u64,
}
