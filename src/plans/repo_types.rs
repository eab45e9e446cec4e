use serde::{de, Deserialize, Deserializer, Serialize};
use sqlx::{types::Json, FromRow};
use time::OffsetDateTime;
use uuid::Uuid;

/// Owner id left behind when the voice workflow fails to render its
/// `user_id` template variable.
pub const PLACEHOLDER_USER_ID: &str = "{{user_id}}";

/// Accepts `3` as well as `3.0`; generated plans often carry integral floats.
fn whole_number<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let n = f64::deserialize(deserializer)?;
    if n.is_finite() && n.fract() == 0.0 && (0.0..=f64::from(u32::MAX)).contains(&n) {
        Ok(n as u32)
    } else {
        Err(de::Error::custom(format!("expected a whole number, got {n}")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Routine {
    pub name: String,
    #[serde(deserialize_with = "whole_number")]
    pub sets: u32,
    #[serde(deserialize_with = "whole_number")]
    pub reps: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseDay {
    pub day: String,
    pub routines: Vec<Routine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutPlan {
    pub schedule: Vec<String>,
    pub exercises: Vec<ExerciseDay>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meal {
    pub name: String,
    pub foods: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DietPlan {
    #[serde(alias = "dailyCalories", deserialize_with = "whole_number")]
    pub daily_calories: u32,
    pub meals: Vec<Meal>,
}

#[derive(Debug, Clone)]
pub struct NewPlan {
    pub user_id: String,
    pub name: String,
    pub workout_plan: WorkoutPlan,
    pub diet_plan: DietPlan,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub workout_plan: WorkoutPlan,
    pub diet_plan: DietPlan,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, FromRow)]
pub struct PlanRow {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub workout_plan: Json<WorkoutPlan>,
    pub diet_plan: Json<DietPlan>,
    pub is_active: bool,
    pub created_at: OffsetDateTime,
}

impl From<PlanRow> for Plan {
    fn from(r: PlanRow) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            name: r.name,
            workout_plan: r.workout_plan.0,
            diet_plan: r.diet_plan.0,
            is_active: r.is_active,
            created_at: r.created_at,
        }
    }
}
