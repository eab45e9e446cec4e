mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::plans::repo_types::{NewPlan, Plan};
use crate::users::repo_types::{NewUser, User, UserPatch};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Record storage for users and plans.
///
/// Plan mutations that touch the active flag keep at most one active plan
/// per owner, also under concurrent callers.
#[async_trait]
pub trait Store: Send + Sync {
    /// Returns the stored user and whether it was newly inserted.
    async fn upsert_user(&self, user: NewUser) -> Result<(User, bool), StoreError>;
    async fn find_user(&self, external_id: &str) -> Result<Option<User>, StoreError>;
    async fn patch_user(
        &self,
        external_id: &str,
        patch: UserPatch,
    ) -> Result<Option<User>, StoreError>;

    async fn create_plan(&self, plan: NewPlan) -> Result<Plan, StoreError>;
    /// Newest first.
    async fn list_plans(&self, user_id: &str) -> Result<Vec<Plan>, StoreError>;
    async fn recent_plan_owners(&self, limit: i64) -> Result<Vec<String>, StoreError>;
    async fn get_plan(&self, id: Uuid) -> Result<Option<Plan>, StoreError>;
    async fn set_plan_active(&self, id: Uuid, active: bool) -> Result<Option<Plan>, StoreError>;
    /// Moves every plan owned by `from` to `to`, returning how many moved.
    async fn reassign_plans(&self, from: &str, to: &str) -> Result<u64, StoreError>;
}
