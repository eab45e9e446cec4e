use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, HeaderMap, StatusCode},
};
use sha2::{Digest, Sha256};
use tracing::warn;

use super::jwt::JwtKeys;
use crate::state::AppState;

pub const SERVICE_KEY_HEADER: &str = "x-service-key";

/// Authenticated caller; carries the external user id.
#[derive(Debug)]
pub struct AuthUser(pub String);

/// Like [`AuthUser`] but never rejects.
#[derive(Debug)]
pub struct MaybeAuthUser(pub Option<String>);

/// Who is allowed to write plans: a signed-in user or the voice workflow.
#[derive(Debug, PartialEq, Eq)]
pub enum Caller {
    User(String),
    Service,
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, (StatusCode, String)> {
    let auth = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or((StatusCode::UNAUTHORIZED, "missing Authorization header".to_string()))?;

    auth.strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
        .ok_or((StatusCode::UNAUTHORIZED, "invalid auth scheme".to_string()))
}

fn authenticate(headers: &HeaderMap, state: &AppState) -> Result<String, (StatusCode, String)> {
    let token = bearer_token(headers)?;
    let keys = JwtKeys::from_ref(state);
    match keys.verify(token) {
        Ok(claims) => Ok(claims.sub),
        Err(e) => {
            warn!(error = %e, "invalid or expired token");
            Err((StatusCode::UNAUTHORIZED, "invalid or expired token".into()))
        }
    }
}

/// Compares shared secrets without short-circuiting on the first differing byte.
pub(crate) fn secrets_match(given: &str, expected: &str) -> bool {
    Sha256::digest(given.as_bytes())
        .iter()
        .zip(Sha256::digest(expected.as_bytes()).iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        authenticate(&parts.headers, state).map(AuthUser)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeAuthUser(authenticate(&parts.headers, state).ok()))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(given) = parts
            .headers
            .get(SERVICE_KEY_HEADER)
            .and_then(|h| h.to_str().ok())
        else {
            return authenticate(&parts.headers, state).map(Caller::User);
        };

        match state.config.service_api_key.as_deref() {
            Some(expected) if secrets_match(given, expected) => Ok(Caller::Service),
            _ => {
                warn!("rejected service key");
                Err((StatusCode::UNAUTHORIZED, "invalid service key".into()))
            }
        }
    }
}
