use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Store, StoreError};
use crate::plans::repo_types::{NewPlan, Plan};
use crate::users::repo_types::{NewUser, User, UserPatch, UNKNOWN_USER_NAME};

/// In-process store. Records live in insertion order, so the newest plan is
/// always last.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    users: Vec<User>,
    plans: Vec<Plan>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_user(&self, user: NewUser) -> Result<(User, bool), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner
            .users
            .iter_mut()
            .find(|u| u.external_id == user.external_id)
        {
            if !user.name.is_empty() {
                existing.name = user.name;
            }
            existing.email = user.email;
            existing.image = user.image;
            return Ok((existing.clone(), false));
        }

        let name = if user.name.is_empty() {
            UNKNOWN_USER_NAME.to_string()
        } else {
            user.name
        };
        let created = User {
            id: Uuid::new_v4(),
            external_id: user.external_id,
            name,
            email: user.email,
            image: user.image,
            created_at: OffsetDateTime::now_utc(),
        };
        inner.users.push(created.clone());
        Ok((created, true))
    }

    async fn find_user(&self, external_id: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .iter()
            .find(|u| u.external_id == external_id)
            .cloned())
    }

    async fn patch_user(
        &self,
        external_id: &str,
        patch: UserPatch,
    ) -> Result<Option<User>, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(user) = inner.users.iter_mut().find(|u| u.external_id == external_id) else {
            return Ok(None);
        };
        user.name = patch.name;
        user.email = patch.email;
        user.image = patch.image;
        Ok(Some(user.clone()))
    }

    async fn create_plan(&self, plan: NewPlan) -> Result<Plan, StoreError> {
        let mut inner = self.inner.write().await;
        if plan.is_active {
            for existing in inner
                .plans
                .iter_mut()
                .filter(|p| p.user_id == plan.user_id && p.is_active)
            {
                existing.is_active = false;
            }
        }
        let created = Plan {
            id: Uuid::new_v4(),
            user_id: plan.user_id,
            name: plan.name,
            workout_plan: plan.workout_plan,
            diet_plan: plan.diet_plan,
            is_active: plan.is_active,
            created_at: OffsetDateTime::now_utc(),
        };
        inner.plans.push(created.clone());
        Ok(created)
    }

    async fn list_plans(&self, user_id: &str) -> Result<Vec<Plan>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .plans
            .iter()
            .rev()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn recent_plan_owners(&self, limit: i64) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.read().await;
        let take = usize::try_from(limit).unwrap_or(0);
        let mut owners: Vec<String> = Vec::new();
        for plan in inner.plans.iter().rev().take(take) {
            if !owners.contains(&plan.user_id) {
                owners.push(plan.user_id.clone());
            }
        }
        Ok(owners)
    }

    async fn get_plan(&self, id: Uuid) -> Result<Option<Plan>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.plans.iter().find(|p| p.id == id).cloned())
    }

    async fn set_plan_active(&self, id: Uuid, active: bool) -> Result<Option<Plan>, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(owner) = inner
            .plans
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.user_id.clone())
        else {
            return Ok(None);
        };

        let mut updated = None;
        for plan in inner.plans.iter_mut().filter(|p| p.user_id == owner) {
            if plan.id == id {
                plan.is_active = active;
                updated = Some(plan.clone());
            } else if active {
                plan.is_active = false;
            }
        }
        Ok(updated)
    }

    async fn reassign_plans(&self, from: &str, to: &str) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        let target_has_active = inner.plans.iter().any(|p| p.user_id == to && p.is_active);
        let mut moved = 0;
        for plan in inner.plans.iter_mut().filter(|p| p.user_id == from) {
            plan.user_id = to.to_string();
            plan.is_active = plan.is_active && !target_has_active;
            moved += 1;
        }
        Ok(moved)
    }
}
