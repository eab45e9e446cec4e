use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const ID_HEADER: &str = "svix-id";
pub const TIMESTAMP_HEADER: &str = "svix-timestamp";
pub const SIGNATURE_HEADER: &str = "svix-signature";

/// Allowed clock skew between the provider and us, in seconds.
pub const TOLERANCE_SECS: u64 = 5 * 60;

const SECRET_PREFIX: &str = "whsec_";

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("missing header {0}")]
    MissingHeader(&'static str),
    #[error("webhook secret is not valid base64")]
    InvalidSecret,
    #[error("invalid timestamp")]
    InvalidTimestamp,
    #[error("timestamp outside tolerance")]
    StaleTimestamp,
    #[error("no matching signature")]
    Mismatch,
}

/// The signed parts of one delivery, as found in the request headers.
pub struct Delivery<'a> {
    pub id: &'a str,
    pub timestamp: &'a str,
    pub signatures: &'a str,
}

fn mac_for(secret: &str, id: &str, timestamp: &str, body: &[u8]) -> Result<HmacSha256, SignatureError> {
    let key = general_purpose::STANDARD
        .decode(secret.strip_prefix(SECRET_PREFIX).unwrap_or(secret))
        .map_err(|_| SignatureError::InvalidSecret)?;
    let mut mac = HmacSha256::new_from_slice(&key).map_err(|_| SignatureError::InvalidSecret)?;
    mac.update(format!("{}.{}.", id, timestamp).as_bytes());
    mac.update(body);
    Ok(mac)
}

/// Checks `v1,<base64>` signatures over `"{id}.{timestamp}.{body}"`.
pub fn verify(
    secret: &str,
    delivery: &Delivery<'_>,
    body: &[u8],
    now_unix: i64,
) -> Result<(), SignatureError> {
    let sent_at: i64 = delivery
        .timestamp
        .trim()
        .parse()
        .map_err(|_| SignatureError::InvalidTimestamp)?;
    if now_unix.abs_diff(sent_at) > TOLERANCE_SECS {
        return Err(SignatureError::StaleTimestamp);
    }

    let mac = mac_for(secret, delivery.id, delivery.timestamp, body)?;
    let matched = delivery
        .signatures
        .split_whitespace()
        .filter_map(|entry| entry.strip_prefix("v1,"))
        .filter_map(|b64| general_purpose::STANDARD.decode(b64).ok())
        .any(|sig| mac.clone().verify_slice(&sig).is_ok());

    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

#[cfg(test)]
pub(crate) fn sign_for_tests(secret: &str, id: &str, timestamp: &str, body: &[u8]) -> String {
    let mac = mac_for(secret, id, timestamp, body).expect("valid test secret");
    format!("v1,{}", general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}
