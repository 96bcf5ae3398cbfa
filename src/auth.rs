//! Bearer-token identity gate and credential generation
//!
//! Credentials are opaque random tokens issued once at registration. There
//! is no session state; every write re-resolves the bearer token against
//! the store.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hyper::header::AUTHORIZATION;
use hyper::HeaderMap;
use rand::RngCore;

use crate::store::{Agent, BoardStore};
use crate::types::ApiError;

const API_KEY_PREFIX: &str = "rtbl_";
const CLAIM_TOKEN_PREFIX: &str = "rtbl_claim_";

fn random_suffix(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// New agent credential: `rtbl_` plus 24 random bytes, URL-safe base64.
pub fn generate_api_key() -> String {
    format!("{}{}", API_KEY_PREFIX, random_suffix(24))
}

/// One-shot ownership token: `rtbl_claim_` plus 18 random bytes.
pub fn generate_claim_token() -> String {
    format!("{}{}", CLAIM_TOKEN_PREFIX, random_suffix(18))
}

/// Extract the bearer token from the Authorization header. The scheme is
/// matched case-insensitively and the token is trimmed; missing and
/// malformed headers are indistinguishable to the caller.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthenticated)?;
    let (scheme, rest) = value.split_once(' ').ok_or(ApiError::Unauthenticated)?;
    if !scheme.eq_ignore_ascii_case("Bearer") {
        return Err(ApiError::Unauthenticated);
    }
    let token = rest.trim();
    if token.is_empty() {
        return Err(ApiError::Unauthenticated);
    }
    Ok(token)
}

/// Resolve a bearer token to its agent. A token that matches no agent is
/// an invalid credential, not a not-found.
pub async fn authenticate(store: &dyn BoardStore, token: &str) -> Result<Agent, ApiError> {
    store
        .agent_by_api_key(token)
        .await?
        .ok_or(ApiError::InvalidCredential)
}

/// Check the admin shared secret. When no secret is configured the admin
/// surface rejects everything.
pub fn require_admin(headers: &HeaderMap, admin_key: Option<&str>) -> Result<(), ApiError> {
    let configured = admin_key.ok_or(ApiError::Unauthorized)?;
    let presented = headers
        .get("x-admin-key")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;
    if presented != configured {
        return Err(ApiError::Unauthorized);
    }
    Ok(())
}
