//! Bearer-token verification for the `/v1` surface.
//!
//! Token issuance, registration, and refresh rotation live in the auth
//! front-end; this module only checks the compact HMAC-SHA256 token it
//! mints: `base64url(claims).base64url(hmac(claims, secret))` with
//! audience, issuer, and expiry claims.

use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{Error, Result};
use crate::routes::AppState;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: i64,
    aud: String,
    iss: String,
    exp: i64,
}

/// The authenticated caller's user id.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub i64);

pub fn issue_access_token(
    user_id: i64,
    secret: &str,
    audience: &str,
    issuer: &str,
    ttl_secs: i64,
) -> Result<String> {
    let claims = Claims {
        sub: user_id,
        aud: audience.to_string(),
        iss: issuer.to_string(),
        exp: Utc::now().timestamp() + ttl_secs,
    };
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).map_err(anyhow::Error::from)?);
    let sig = sign(&payload, secret)?;
    Ok(format!("{payload}.{sig}"))
}

pub fn verify_access_token(token: &str, secret: &str, audience: &str, issuer: &str) -> Result<i64> {
    let (payload, sig) = token
        .split_once('.')
        .ok_or_else(|| Error::Unauthorized("malformed access token".into()))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| Error::Unauthorized("invalid token secret".into()))?;
    mac.update(payload.as_bytes());
    let sig_bytes = URL_SAFE_NO_PAD
        .decode(sig)
        .map_err(|_| Error::Unauthorized("malformed access token".into()))?;
    mac.verify_slice(&sig_bytes)
        .map_err(|_| Error::Unauthorized("invalid access token".into()))?;

    let claims: Claims = URL_SAFE_NO_PAD
        .decode(payload)
        .ok()
        .and_then(|raw| serde_json::from_slice(&raw).ok())
        .ok_or_else(|| Error::Unauthorized("malformed access token".into()))?;

    if claims.aud != audience || claims.iss != issuer {
        return Err(Error::Unauthorized("invalid access token".into()));
    }
    if claims.exp <= Utc::now().timestamp() {
        return Err(Error::Unauthorized("access token expired".into()));
    }
    Ok(claims.sub)
}

fn sign(payload: &str, secret: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| Error::Unauthorized("invalid token secret".into()))?;
    mac.update(payload.as_bytes());
    Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let state = AppState::from_ref(state);
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::Unauthorized("missing access token".into()))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| Error::Unauthorized("missing bearer token".into()))?;

        let user_id = verify_access_token(
            token,
            &state.config.access_token_secret,
            &state.config.access_token_audience,
            &state.config.access_token_issuer,
        )?;
        Ok(AuthUser(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn roundtrip() {
        let token = issue_access_token(42, SECRET, "mb", "mb", 60).unwrap();
        assert_eq!(verify_access_token(&token, SECRET, "mb", "mb").unwrap(), 42);
    }

    #[test]
    fn rejects_wrong_secret() {
        let token = issue_access_token(42, SECRET, "mb", "mb", 60).unwrap();
        assert!(verify_access_token(&token, "other", "mb", "mb").is_err());
    }

    #[test]
    fn rejects_wrong_audience_or_issuer() {
        let token = issue_access_token(42, SECRET, "mb", "mb", 60).unwrap();
        assert!(verify_access_token(&token, SECRET, "web", "mb").is_err());
        assert!(verify_access_token(&token, SECRET, "mb", "web").is_err());
    }

    #[test]
    fn rejects_expired() {
        let token = issue_access_token(42, SECRET, "mb", "mb", -1).unwrap();
        assert!(verify_access_token(&token, SECRET, "mb", "mb").is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(verify_access_token("not-a-token", SECRET, "mb", "mb").is_err());
        assert!(verify_access_token("a.b", SECRET, "mb", "mb").is_err());
    }
}
