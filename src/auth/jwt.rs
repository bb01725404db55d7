use anyhow::{anyhow, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct JwtClaims {
    exp: i64,
}

/// Reads the `exp` claim of a JWT access token without verifying it.
/// Only used for reporting; opaque tokens simply yield an error.
pub fn access_token_expiry(token: &str) -> Result<DateTime<Utc>> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(anyhow!("invalid JWT format"));
    }

    // tolerate padded payloads
    let payload = parts[1].trim_end_matches('=');
    let decoded = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| anyhow!("base64 decode error: {}", e))?;
    let claims = serde_json::from_slice::<JwtClaims>(&decoded)
        .map_err(|e| anyhow!("invalid JWT payload: {}", e))?;

    DateTime::from_timestamp(claims.exp, 0).ok_or_else(|| anyhow!("exp {} out of range", claims.exp))
}
