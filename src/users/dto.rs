use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct SyncUserRequest {
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(alias = "clerkId", alias = "externalId")]
    pub external_id: String,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SyncUserResponse {
    pub id: Uuid,
    pub created: bool,
}
