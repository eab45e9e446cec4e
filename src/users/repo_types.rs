use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

pub const UNKNOWN_USER_NAME: &str = "Unknown User";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub external_id: String,
    pub name: String,
    pub email: String,
    pub image: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Fields coming from the identity provider for an upsert.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub external_id: String,
    pub name: String,
    pub email: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UserPatch {
    pub name: String,
    pub email: String,
    pub image: Option<String>,
}
