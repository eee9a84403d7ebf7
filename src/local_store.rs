//! Local persistent key/value storage backed by sled.
//!
//! Holds what a browser client would keep in `localStorage`: the edit-mode
//! flag and the pending-edit outbox, plus the server-side session records.
//! Per-browser state is keyed by a [`ClientId`] carried in the
//! `orca_client` cookie, so one visitor never sees another's local state.

use axum_extra::extract::CookieJar;
use rand::Rng;
use std::fmt;
use std::path::Path;

use crate::error::SiteResult;

pub const PREFS_TREE: &str = "prefs";
pub const EDIT_MODE_KEY: &str = "editMode";
pub const OUTBOX_TREE: &str = "pendingSettingsEdits";
pub const SESSIONS_TREE: &str = "sessions";

/// Cookie naming the browser's local state.
pub const CLIENT_COOKIE: &str = "orca_client";

/// Client cookie lifetime in seconds (one year).
pub const CLIENT_COOKIE_MAX_AGE: i64 = 365 * 24 * 3600;

// ============================================================================
// Client Ids
// ============================================================================

/// Opaque random id of one browser.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    const LEN: usize = 32;

    pub fn generate() -> Self {
        let id: String = rand::thread_rng()
            .sample_iter(&rand::distributions::Alphanumeric)
            .take(Self::LEN)
            .map(char::from)
            .collect();
        Self(id)
    }

    /// Accepts only ids this node could have minted.
    pub fn parse(raw: &str) -> Option<Self> {
        (raw.len() == Self::LEN && raw.bytes().all(|b| b.is_ascii_alphanumeric()))
            .then(|| Self(raw.to_string()))
    }

    pub fn from_jar(jar: &CookieJar) -> Option<Self> {
        jar.get(CLIENT_COOKIE).and_then(|c| Self::parse(c.value()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key prefix for this client's entries in a shared tree.
    pub fn key_prefix(&self) -> String {
        format!("{}/", self.0)
    }

    pub fn cookie(&self) -> String {
        format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            CLIENT_COOKIE, self.0, CLIENT_COOKIE_MAX_AGE
        )
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Store
// ============================================================================

#[derive(Clone)]
pub struct LocalStore {
    db: sled::Db,
}

impl LocalStore {
    pub fn open(path: &Path) -> SiteResult<Self> {
        Ok(Self {
            db: sled::open(path)?,
        })
    }

    /// A throwaway database removed when the last handle drops.
    pub fn temporary() -> SiteResult<Self> {
        Ok(Self {
            db: sled::Config::new().temporary(true).open()?,
        })
    }

    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    pub fn tree(&self, name: &str) -> SiteResult<sled::Tree> {
        Ok(self.db.open_tree(name)?)
    }

    fn edit_mode_key(client: &ClientId) -> String {
        format!("{}{}", client.key_prefix(), EDIT_MODE_KEY)
    }

    /// Stored as the strings `"true"` / `"false"`; anything else reads as off.
    pub fn edit_mode(&self, client: &ClientId) -> SiteResult<bool> {
        let prefs = self.tree(PREFS_TREE)?;
        Ok(prefs
            .get(Self::edit_mode_key(client))?
            .map(|v| v.as_ref() == b"true")
            .unwrap_or(false))
    }

    pub fn set_edit_mode(&self, client: &ClientId, enabled: bool) -> SiteResult<()> {
        let prefs = self.tree(PREFS_TREE)?;
        let value: &[u8] = if enabled { b"true" } else { b"false" };
        prefs.insert(Self::edit_mode_key(client), value)?;
        prefs.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_extra::extract::cookie::Cookie;

    #[test]
    fn test_edit_mode_round_trip() {
        let store = LocalStore::temporary().unwrap();
        let client = ClientId::generate();
        assert!(!store.edit_mode(&client).unwrap());

        store.set_edit_mode(&client, true).unwrap();
        assert!(store.edit_mode(&client).unwrap());

        store.set_edit_mode(&client, false).unwrap();
        assert!(!store.edit_mode(&client).unwrap());
    }

    #[test]
    fn test_edit_mode_is_per_client() {
        let store = LocalStore::temporary().unwrap();
        let a = ClientId::generate();
        let b = ClientId::generate();

        store.set_edit_mode(&a, true).unwrap();
        assert!(store.edit_mode(&a).unwrap());
        assert!(!store.edit_mode(&b).unwrap());
    }

    #[test]
    fn test_unexpected_flag_value_reads_as_off() {
        let store = LocalStore::temporary().unwrap();
        let client = ClientId::generate();
        store
            .tree(PREFS_TREE)
            .unwrap()
            .insert(LocalStore::edit_mode_key(&client), "yes")
            .unwrap();
        assert!(!store.edit_mode(&client).unwrap());
    }

    #[test]
    fn test_client_id_parsing() {
        let id = ClientId::generate();
        assert_eq!(ClientId::parse(id.as_str()), Some(id.clone()));
        assert!(ClientId::parse("short").is_none());
        assert!(ClientId::parse(&"a/".repeat(16)).is_none());

        let jar = CookieJar::new().add(Cookie::new(CLIENT_COOKIE, id.as_str().to_string()));
        assert_eq!(ClientId::from_jar(&jar), Some(id));
        assert!(ClientId::from_jar(&CookieJar::new()).is_none());
    }
}
