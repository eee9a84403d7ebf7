//! Authentication and session management.
//!
//! Team members sign in against the identity provider. The resulting identity
//! is kept server-side in the sled `sessions` tree, keyed by a random nonce,
//! and the browser only holds an HMAC-signed cookie naming that nonce.
//! Provider ID tokens are short-lived; the stored refresh token renews them
//! for as long as the session lasts. Sign-in is disabled unless
//! `ORCA_SESSION_SECRET` is set.

use axum_extra::extract::CookieJar;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

use crate::error::{SiteError, SiteResult};
use crate::local_store::{LocalStore, SESSIONS_TREE};
use crate::remote::{Credentials, Identity, IdentityProvider};

type HmacSha256 = Hmac<Sha256>;

/// Session cookie name
pub const SESSION_COOKIE: &str = "orca_session";

/// Session time-to-live in hours
pub const SESSION_TTL_HOURS: i64 = 24;

/// Renew ID tokens this many seconds before they expire.
pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

// ============================================================================
// Signed Tokens
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub created: i64,
    pub expires: i64,
    pub nonce: String,
}

impl SessionClaims {
    /// Fresh claims lasting `SESSION_TTL_HOURS`.
    pub fn issue(now: i64) -> Self {
        let ttl = SESSION_TTL_HOURS * 3600;
        let nonce: String = rand::thread_rng()
            .sample_iter(&rand::distributions::Alphanumeric)
            .take(24)
            .map(char::from)
            .collect();
        Self {
            created: now,
            expires: now + ttl,
            nonce,
        }
    }
}

fn signature(payload: &str, secret: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(payload.as_bytes());
    Some(hex_encode(mac.finalize().into_bytes().as_slice()))
}

/// `base64(json).hexsig`
pub fn sign_session(claims: &SessionClaims, secret: &[u8]) -> Option<String> {
    let json = serde_json::to_string(claims).ok()?;
    let sig = signature(&json, secret)?;
    Some(format!("{}.{}", base64_encode(&json), sig))
}

/// Claims of a correctly signed, unexpired token.
pub fn verify_session(token: &str, secret: &[u8], now: i64) -> Option<SessionClaims> {
    let (payload, sig) = token.split_once('.')?;
    let json = base64_decode(payload)?;
    let expected = signature(&json, secret)?;

    let sig_bytes = sig.as_bytes();
    let expected_bytes = expected.as_bytes();
    if sig_bytes.len() != expected_bytes.len() || sig_bytes.ct_eq(expected_bytes).unwrap_u8() != 1 {
        return None;
    }

    let claims: SessionClaims = serde_json::from_str(&json).ok()?;
    (now < claims.expires).then_some(claims)
}

// ============================================================================
// Session Records
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub uid: String,
    pub email: String,
    pub id_token: String,
    #[serde(default)]
    pub refresh_token: String,
    /// When `id_token` stops being accepted by the provider.
    #[serde(default)]
    pub token_expires: i64,
    pub expires: i64,
}

impl SessionRecord {
    pub fn identity(&self, now: i64) -> Identity {
        Identity {
            uid: self.uid.clone(),
            email: self.email.clone(),
            credentials: Credentials {
                id_token: self.id_token.clone(),
            },
            expires_in: self.token_expires - now,
            refresh_token: self.refresh_token.clone(),
        }
    }

    pub fn needs_refresh(&self, now: i64) -> bool {
        !self.refresh_token.is_empty() && self.token_expires - now <= TOKEN_REFRESH_MARGIN_SECS
    }
}

/// A live session record and the nonce it is stored under.
#[derive(Debug, Clone)]
pub struct Session {
    pub nonce: String,
    pub record: SessionRecord,
}

#[derive(Clone)]
pub struct SessionStore {
    tree: sled::Tree,
    secret: Vec<u8>,
}

impl SessionStore {
    pub fn open(local: &LocalStore, secret: Vec<u8>) -> SiteResult<Self> {
        Ok(Self {
            tree: local.tree(SESSIONS_TREE)?,
            secret,
        })
    }

    /// Persist `identity` and return the cookie value for it.
    pub fn create(&self, identity: &Identity) -> SiteResult<String> {
        let now = Utc::now().timestamp();
        let claims = SessionClaims::issue(now);
        let record = SessionRecord {
            uid: identity.uid.clone(),
            email: identity.email.clone(),
            id_token: identity.credentials.id_token.clone(),
            refresh_token: identity.refresh_token.clone(),
            token_expires: now + identity.expires_in,
            expires: claims.expires,
        };
        let token = sign_session(&claims, &self.secret).ok_or_else(|| {
            SiteError::Validation("session secret cannot be used as an HMAC key".to_string())
        })?;

        self.tree
            .insert(claims.nonce.as_bytes(), serde_json::to_vec(&record)?)?;
        self.tree.flush()?;
        info!(uid = %identity.uid, "session created");
        Ok(token)
    }

    /// The live session a cookie value names, if any.
    pub fn lookup(&self, token: &str) -> SiteResult<Option<Session>> {
        let now = Utc::now().timestamp();
        let Some(claims) = verify_session(token, &self.secret, now) else {
            return Ok(None);
        };
        let Some(raw) = self.tree.get(claims.nonce.as_bytes())? else {
            debug!("session cookie has no stored record");
            return Ok(None);
        };
        let record: SessionRecord = match serde_json::from_slice(&raw) {
            Ok(r) => r,
            Err(_) => {
                self.tree.remove(claims.nonce.as_bytes())?;
                return Ok(None);
            }
        };
        if record.expires <= now {
            self.tree.remove(claims.nonce.as_bytes())?;
            return Ok(None);
        }
        Ok(Some(Session {
            nonce: claims.nonce,
            record,
        }))
    }

    /// Stored identity for a cookie value, without renewing its token.
    pub fn identity(&self, token: &str) -> SiteResult<Option<Identity>> {
        let now = Utc::now().timestamp();
        Ok(self.lookup(token)?.map(|s| s.record.identity(now)))
    }

    /// Swap in the renewed credentials of `fresh`, keeping the session's
    /// own lifetime and the signed-in email.
    pub fn store_refreshed(&self, session: &Session, fresh: &Identity) -> SiteResult<Identity> {
        let now = Utc::now().timestamp();
        let mut record = session.record.clone();
        record.id_token = fresh.credentials.id_token.clone();
        record.refresh_token = fresh.refresh_token.clone();
        record.token_expires = now + fresh.expires_in;
        self.tree
            .insert(session.nonce.as_bytes(), serde_json::to_vec(&record)?)?;
        self.tree.flush()?;
        debug!(uid = %record.uid, "session token renewed");
        Ok(record.identity(now))
    }

    /// The signed-in identity behind the request's session cookie, renewing
    /// its ID token through `provider` when it is about to expire. A rejected
    /// renewal ends the session; an unreachable provider keeps the old token.
    pub async fn current_identity(
        &self,
        jar: &CookieJar,
        provider: &dyn IdentityProvider,
    ) -> SiteResult<Option<Identity>> {
        let Some(cookie) = jar.get(SESSION_COOKIE) else {
            return Ok(None);
        };
        let Some(session) = self.lookup(cookie.value())? else {
            return Ok(None);
        };
        let now = Utc::now().timestamp();
        if !session.record.needs_refresh(now) {
            return Ok(Some(session.record.identity(now)));
        }
        match provider.refresh(&session.record.refresh_token).await {
            Ok(fresh) => Ok(Some(self.store_refreshed(&session, &fresh)?)),
            Err(e) if e.is_transient() => {
                warn!(error = %e, "token refresh failed, keeping current token");
                Ok(Some(session.record.identity(now)))
            }
            Err(e) => {
                info!(uid = %session.record.uid, error = %e, "token refresh rejected, ending session");
                self.tree.remove(session.nonce.as_bytes())?;
                self.tree.flush()?;
                Ok(None)
            }
        }
    }

    pub fn revoke(&self, token: &str) -> SiteResult<()> {
        if let Some((payload, _)) = token.split_once('.') {
            if let Some(claims) = base64_decode(payload)
                .and_then(|json| serde_json::from_str::<SessionClaims>(&json).ok())
            {
                self.tree.remove(claims.nonce.as_bytes())?;
                self.tree.flush()?;
            }
        }
        Ok(())
    }

    /// Remove expired or unreadable records; returns how many were dropped.
    pub fn purge_expired(&self) -> SiteResult<usize> {
        let now = Utc::now().timestamp();
        let mut removed = 0;
        for item in self.tree.iter() {
            let (key, raw) = item?;
            let expired = serde_json::from_slice::<SessionRecord>(&raw)
                .map(|r| r.expires <= now)
                .unwrap_or(true);
            if expired {
                self.tree.remove(key)?;
                removed += 1;
            }
        }
        if removed > 0 {
            self.tree.flush()?;
            info!(removed, "purged expired sessions");
        }
        Ok(removed)
    }
}

// ============================================================================
// Encoding Helpers
// ============================================================================

/// Encode a string as base64
pub fn base64_encode(s: &str) -> String {
    STANDARD.encode(s.as_bytes())
}

/// Decode a base64 string
pub fn base64_decode(s: &str) -> Option<String> {
    let bytes = STANDARD.decode(s).ok()?;
    String::from_utf8(bytes).ok()
}

/// Encode bytes as hexadecimal
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::memory::MemoryIdentityProvider;
    use axum_extra::extract::cookie::Cookie;

    const SECRET: &[u8] = b"test-secret";

    fn identity(expires_in: i64) -> Identity {
        Identity {
            uid: "uid-1".to_string(),
            email: "lead@orca.space".to_string(),
            credentials: Credentials {
                id_token: "id-token".to_string(),
            },
            expires_in,
            refresh_token: "memory-refresh-uid-1".to_string(),
        }
    }

    fn jar(token: &str) -> CookieJar {
        CookieJar::new().add(Cookie::new(SESSION_COOKIE, token.to_string()))
    }

    fn store() -> SessionStore {
        SessionStore::open(&LocalStore::temporary().unwrap(), SECRET.to_vec()).unwrap()
    }

    #[test]
    fn test_signed_token_round_trip() {
        let claims = SessionClaims::issue(1_000);
        let token = sign_session(&claims, SECRET).unwrap();
        assert_eq!(verify_session(&token, SECRET, 1_001), Some(claims));
    }

    #[test]
    fn test_tampered_or_foreign_tokens_are_rejected() {
        let claims = SessionClaims::issue(1_000);
        let token = sign_session(&claims, SECRET).unwrap();

        assert!(verify_session(&token, b"other-secret", 1_001).is_none());

        let (payload, sig) = token.split_once('.').unwrap();
        let mut forged = sig.to_string();
        forged.replace_range(0..1, if sig.starts_with('0') { "1" } else { "0" });
        assert!(verify_session(&format!("{}.{}", payload, forged), SECRET, 1_001).is_none());

        assert!(verify_session("no-dot-here", SECRET, 1_001).is_none());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let claims = SessionClaims::issue(1_000);
        let expires = 1_000 + SESSION_TTL_HOURS * 3600;
        assert_eq!(claims.expires, expires);
        let token = sign_session(&claims, SECRET).unwrap();
        assert!(verify_session(&token, SECRET, expires - 1).is_some());
        assert!(verify_session(&token, SECRET, expires).is_none());
    }

    #[test]
    fn test_session_outlives_the_id_token() {
        let store = store();
        let token = store.create(&identity(3600)).unwrap();
        let session = store.lookup(&token).unwrap().unwrap();
        assert!(session.record.expires - session.record.token_expires >= 20 * 3600);
    }

    #[test]
    fn test_store_resolves_identity() {
        let store = store();
        let token = store.create(&identity(3600)).unwrap();

        let found = store.identity(&token).unwrap().unwrap();
        assert_eq!(found.uid, "uid-1");
        assert_eq!(found.credentials.id_token, "id-token");

        store.revoke(&token).unwrap();
        assert!(store.identity(&token).unwrap().is_none());
    }

    #[test]
    fn test_purge_drops_expired_records() {
        let store = store();
        let live = store.create(&identity(3600)).unwrap();
        store
            .tree
            .insert(
                "stale",
                serde_json::to_vec(&SessionRecord {
                    uid: "u".to_string(),
                    email: "e".to_string(),
                    id_token: "t".to_string(),
                    refresh_token: String::new(),
                    token_expires: 0,
                    expires: 0,
                })
                .unwrap(),
            )
            .unwrap();
        store.tree.insert("garbage", "not json").unwrap();

        assert_eq!(store.purge_expired().unwrap(), 2);
        assert!(store.identity(&live).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_expiring_token_is_renewed() {
        let store = store();
        let provider = MemoryIdentityProvider::new();
        provider.add_account("lead@orca.space", "pw", "uid-1").await;
        let token = store.create(&identity(30)).unwrap();

        let current = store.current_identity(&jar(&token), &provider).await.unwrap().unwrap();
        assert_eq!(provider.refresh_calls.load(std::sync::atomic::Ordering::Relaxed), 1);
        assert_ne!(current.credentials.id_token, "id-token");
        assert_eq!(current.email, "lead@orca.space");
        assert!(current.expires_in > 3000);

        // the renewed token is stored, so the next request does not refresh
        store.current_identity(&jar(&token), &provider).await.unwrap().unwrap();
        assert_eq!(provider.refresh_calls.load(std::sync::atomic::Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_rejected_renewal_ends_session() {
        let store = store();
        let provider = MemoryIdentityProvider::new();
        provider.add_account("lead@orca.space", "pw", "uid-1").await;
        provider.revoke_refresh("uid-1").await;
        let token = store.create(&identity(0)).unwrap();

        assert!(store.current_identity(&jar(&token), &provider).await.unwrap().is_none());
        assert!(store.lookup(&token).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fresh_token_is_used_as_is() {
        let store = store();
        let provider = MemoryIdentityProvider::new();
        let token = store.create(&identity(3600)).unwrap();

        let current = store.current_identity(&jar(&token), &provider).await.unwrap().unwrap();
        assert_eq!(current.credentials.id_token, "id-token");
        assert_eq!(provider.refresh_calls.load(std::sync::atomic::Ordering::Relaxed), 0);
        assert!(store.current_identity(&CookieJar::new(), &provider).await.unwrap().is_none());
    }
}
