use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, types::Json, FromRow, PgPool, Postgres, Transaction};
use tracing::{error, info};
use uuid::Uuid;

use super::{Store, StoreError};
use crate::plans::repo_types::{NewPlan, Plan, PlanRow};
use crate::users::repo_types::{NewUser, User, UserPatch, UNKNOWN_USER_NAME};

const PLAN_COLUMNS: &str = "id, user_id, name, workout_plan, diet_plan, is_active, created_at";

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

#[derive(FromRow)]
struct UpsertRow {
    #[sqlx(flatten)]
    user: User,
    inserted: bool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let db = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { db })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.db).await?;
        Ok(())
    }
}

/// Serializes active-flag changes for one owner until the transaction ends.
async fn lock_owner(tx: &mut Transaction<'_, Postgres>, user_id: &str) -> Result<(), StoreError> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(user_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[async_trait]
impl Store for PgStore {
    async fn upsert_user(&self, user: NewUser) -> Result<(User, bool), StoreError> {
        let row = sqlx::query_as::<_, UpsertRow>(
            r#"
            INSERT INTO users (external_id, name, email, image)
            VALUES ($1, COALESCE(NULLIF($2, ''), $5), $3, $4)
            ON CONFLICT (external_id) DO UPDATE
               SET name  = COALESCE(NULLIF($2, ''), users.name),
                   email = EXCLUDED.email,
                   image = EXCLUDED.image
            RETURNING id, external_id, name, email, image, created_at, (xmax = 0) AS inserted
            "#,
        )
        .bind(&user.external_id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.image)
        .bind(UNKNOWN_USER_NAME)
        .fetch_one(&self.db)
        .await?;
        Ok((row.user, row.inserted))
    }

    async fn find_user(&self, external_id: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, external_id, name, email, image, created_at
            FROM users
            WHERE external_id = $1
            "#,
        )
        .bind(external_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn patch_user(
        &self,
        external_id: &str,
        patch: UserPatch,
    ) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
               SET name = $2, email = $3, image = $4
             WHERE external_id = $1
            RETURNING id, external_id, name, email, image, created_at
            "#,
        )
        .bind(external_id)
        .bind(&patch.name)
        .bind(&patch.email)
        .bind(&patch.image)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn create_plan(&self, plan: NewPlan) -> Result<Plan, StoreError> {
        let mut tx = self.db.begin().await?;
        lock_owner(&mut tx, &plan.user_id).await?;

        if plan.is_active {
            let deactivated: Vec<(Uuid,)> = sqlx::query_as(
                r#"
                UPDATE plans SET is_active = FALSE
                 WHERE user_id = $1 AND is_active
                RETURNING id
                "#,
            )
            .bind(&plan.user_id)
            .fetch_all(&mut *tx)
            .await?;
            for (id,) in &deactivated {
                info!(plan_id = %id, user_id = %plan.user_id, "deactivated plan");
            }
        }

        let inserted = sqlx::query_as::<_, PlanRow>(&format!(
            r#"
            INSERT INTO plans (user_id, name, workout_plan, diet_plan, is_active)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {PLAN_COLUMNS}
            "#
        ))
        .bind(&plan.user_id)
        .bind(&plan.name)
        .bind(Json(&plan.workout_plan))
        .bind(Json(&plan.diet_plan))
        .bind(plan.is_active)
        .fetch_one(&mut *tx)
        .await;

        let row = match inserted {
            Ok(row) => row,
            Err(e) => {
                error!(error = %e, user_id = %plan.user_id, "plan insert failed");
                return Err(e.into());
            }
        };
        tx.commit().await?;
        Ok(row.into())
    }

    async fn list_plans(&self, user_id: &str) -> Result<Vec<Plan>, StoreError> {
        let rows = sqlx::query_as::<_, PlanRow>(&format!(
            r#"
            SELECT {PLAN_COLUMNS}
            FROM plans
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Plan::from).collect())
    }

    async fn recent_plan_owners(&self, limit: i64) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT user_id
            FROM plans
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        let mut owners: Vec<String> = Vec::with_capacity(rows.len());
        for (owner,) in rows {
            if !owners.contains(&owner) {
                owners.push(owner);
            }
        }
        Ok(owners)
    }

    async fn get_plan(&self, id: Uuid) -> Result<Option<Plan>, StoreError> {
        let row = sqlx::query_as::<_, PlanRow>(&format!(
            "SELECT {PLAN_COLUMNS} FROM plans WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(Plan::from))
    }

    async fn set_plan_active(&self, id: Uuid, active: bool) -> Result<Option<Plan>, StoreError> {
        let mut tx = self.db.begin().await?;

        let owner: Option<(String,)> = sqlx::query_as("SELECT user_id FROM plans WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some((user_id,)) = owner else {
            return Ok(None);
        };
        lock_owner(&mut tx, &user_id).await?;

        if active {
            sqlx::query(
                r#"
                UPDATE plans SET is_active = FALSE
                 WHERE user_id = $1 AND is_active AND id <> $2
                "#,
            )
            .bind(&user_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }

        let row = sqlx::query_as::<_, PlanRow>(&format!(
            "UPDATE plans SET is_active = $2 WHERE id = $1 RETURNING {PLAN_COLUMNS}"
        ))
        .bind(id)
        .bind(active)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(row.map(Plan::from))
    }

    async fn reassign_plans(&self, from: &str, to: &str) -> Result<u64, StoreError> {
        let mut tx = self.db.begin().await?;
        let (first, second) = if from <= to { (from, to) } else { (to, from) };
        lock_owner(&mut tx, first).await?;
        lock_owner(&mut tx, second).await?;

        // A moved active plan stays active only if the target has none.
        let result = sqlx::query(
            r#"
            UPDATE plans
               SET user_id = $2,
                   is_active = is_active AND NOT EXISTS (
                       SELECT 1 FROM plans p WHERE p.user_id = $2 AND p.is_active
                   )
             WHERE user_id = $1
            "#,
        )
        .bind(from)
        .bind(to)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }
}
