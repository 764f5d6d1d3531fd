//! Session verification and caching.
//!
//! Verifies `SessionToken`s issued by the auth service using ed25519-dalek,
//! and caches successful verifications so a signature is checked once per
//! token rather than on every request.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use safelink_shared::session::{SessionToken, TokenError};
use safelink_shared::Principal;

use crate::api::AppState;
use crate::error::ServerError;

// ---------------------------------------------------------------------------
// Cached entry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct CachedSession {
    principal: Principal,
    valid_until: DateTime<Utc>,
}

impl CachedSession {
    fn is_fresh(&self) -> bool {
        Utc::now() < self.valid_until
    }

    fn matches(&self, token: &SessionToken) -> bool {
        self.principal.user_id == token.user_id
            && self.principal.role == token.role
            && self.valid_until == token.valid_until
    }
}

// ---------------------------------------------------------------------------
// Session verifier
// ---------------------------------------------------------------------------

/// Verifies and caches session tokens.
#[derive(Clone)]
pub struct SessionVerifier {
    /// The token issuer's Ed25519 public key.
    issuer_pubkey: [u8; 32],
    /// Cache: token signature -> verified claims.
    cache: Arc<RwLock<HashMap<Vec<u8>, CachedSession>>>,
}

impl SessionVerifier {
    pub fn new(issuer_pubkey: [u8; 32]) -> Self {
        Self {
            issuer_pubkey,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Decode a hex bearer token and verify it.
    pub async fn authenticate(&self, bearer: &str) -> Result<Principal, TokenError> {
        let token = SessionToken::decode(bearer)?;
        self.verify(&token).await
    }

    /// Verify a session token.
    ///
    /// A cache hit only counts when the presented claims are exactly the ones
    /// that were verified under this signature.
    pub async fn verify(&self, token: &SessionToken) -> Result<Principal, TokenError> {
        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(&token.signature) {
                if entry.is_fresh() && entry.matches(token) {
                    return Ok(entry.principal.clone());
                }
            }
        }

        let principal = token.verify(&self.issuer_pubkey).map_err(|e| {
            debug!(user = %token.user_id, error = %e, "Session verification failed");
            e
        })?;

        self.cache.write().await.insert(
            token.signature.clone(),
            CachedSession {
                principal: principal.clone(),
                valid_until: token.valid_until,
            },
        );

        debug!(
            user = %principal.user_id,
            role = %principal.role,
            until = %token.valid_until,
            "Session verified"
        );

        Ok(principal)
    }

    /// Evict expired entries from the cache.
    pub async fn purge_expired(&self) {
        let mut cache = self.cache.write().await;
        let before = cache.len();
        cache.retain(|_, entry| entry.is_fresh());
        let removed = before - cache.len();
        if removed > 0 {
            debug!(removed, "Purged expired session cache entries");
        }
    }

    #[cfg(test)]
    pub async fn cached_sessions(&self) -> usize {
        self.cache.read().await.len()
    }
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// The verified caller of a request.
///
/// The token comes from `Authorization: Bearer <token>`, or from the
/// `token` query parameter for clients (browsers opening a WebSocket) that
/// cannot set headers.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Principal);

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let bearer = bearer_from_header(parts)
            .or_else(|| token_from_query(parts))
            .ok_or_else(|| ServerError::Unauthorized("missing session token".into()))?;

        let principal = state.verifier.authenticate(&bearer).await?;
        Ok(Authenticated(principal))
    }
}

fn bearer_from_header(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn token_from_query(parts: &Parts) -> Option<String> {
    parts.uri.query()?.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == "token" && !value.is_empty()).then(|| value.to_string())
    })
}
