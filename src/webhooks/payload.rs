use serde::Deserialize;
use serde_json::Value;

use crate::users::repo_types::NewUser;

#[derive(Debug, Default, Deserialize)]
struct EmailAddress {
    #[serde(default)]
    email_address: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UserData {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    email_addresses: Option<Vec<EmailAddress>>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
}

/// What to do with one identity-provider event.
#[derive(Debug)]
pub enum WebhookAction {
    Upsert(NewUser),
    Ignore(&'static str),
}

/// Maps `user.created` / `user.updated` events to a user upsert.
pub fn action_for(payload: &Value) -> WebhookAction {
    let kind = payload.get("type").and_then(Value::as_str).unwrap_or_default();
    let Some(data) = payload.get("data").filter(|d| d.is_object()) else {
        return WebhookAction::Ignore("missing data");
    };
    if kind.is_empty() {
        return WebhookAction::Ignore("missing type");
    }
    if kind != "user.created" && kind != "user.updated" {
        return WebhookAction::Ignore("unhandled event type");
    }

    let Ok(data) = UserData::deserialize(data) else {
        return WebhookAction::Ignore("malformed user data");
    };
    let Some(external_id) = data.id.filter(|id| !id.is_empty()) else {
        return WebhookAction::Ignore("missing user id");
    };

    let email = data
        .email_addresses
        .and_then(|list| list.into_iter().next())
        .and_then(|e| e.email_address)
        .unwrap_or_default();
    let name = format!(
        "{} {}",
        data.first_name.unwrap_or_default(),
        data.last_name.unwrap_or_default()
    )
    .trim()
    .to_string();
    let image = data.image_url.filter(|url| !url.is_empty());

    WebhookAction::Upsert(NewUser {
        external_id,
        name,
        email,
        image,
    })
}
