use lazy_static::lazy_static;
use regex::Regex;
use tracing::info;

use super::repo_types::{NewUser, User};
use crate::store::{Store, StoreError};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Upserts a user by external id: patch on hit, insert on miss.
pub async fn sync_user(store: &dyn Store, mut user: NewUser) -> Result<(User, bool), StoreError> {
    user.email = normalize_email(&user.email);
    let external_id = user.external_id.clone();
    let (user, created) = store.upsert_user(user).await?;
    if created {
        info!(user_id = %external_id, id = %user.id, "created user");
    } else {
        info!(user_id = %external_id, id = %user.id, "updated existing user");
    }
    Ok((user, created))
}
