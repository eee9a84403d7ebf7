//! Runtime configuration read from the environment (and `.env` when present).

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_BIND: &str = "127.0.0.1:3000";
pub const DEFAULT_DB_PATH: &str = ".orca_site_db";
pub const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;
pub const LARGE_MODEL_BYTES: u64 = 20 * 1024 * 1024;

/// Firebase keys the site cannot run against Firebase without.
pub const REQUIRED_FIREBASE_KEYS: &[&str] = &[
    "FIREBASE_API_KEY",
    "FIREBASE_PROJECT_ID",
    "FIREBASE_STORAGE_BUCKET",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Firebase,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirebaseConfig {
    pub api_key: String,
    pub project_id: String,
    pub storage_bucket: String,
}

#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub bind: String,
    pub db_path: PathBuf,
    pub backend: Backend,
    pub firebase: Option<FirebaseConfig>,
    /// HMAC key for session cookies. Admin sign-in is disabled without it.
    pub session_secret: Option<Vec<u8>>,
    pub admin_emails: HashSet<String>,
    pub admin_uids: HashSet<String>,
    pub fetch_timeout: Duration,
    pub upload_timeout: Duration,
    pub max_upload_bytes: u64,
    pub pending_ttl: chrono::Duration,
    pub pending_capacity: usize,
    pub large_model_bytes: u64,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            backend: Backend::Memory,
            firebase: None,
            session_secret: None,
            admin_emails: HashSet::new(),
            admin_uids: HashSet::new(),
            fetch_timeout: Duration::from_secs(10),
            upload_timeout: Duration::from_secs(5 * 60),
            max_upload_bytes: MAX_UPLOAD_BYTES,
            pending_ttl: chrono::Duration::days(30),
            pending_capacity: 32,
            large_model_bytes: LARGE_MODEL_BYTES,
        }
    }
}

/// Look a key up, falling back to its `VITE_`-prefixed spelling.
fn firebase_var(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .or_else(|| lookup(&format!("VITE_{}", key)))
        .filter(|v| !v.trim().is_empty())
}

fn parse_num<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(raw) => {
            let parsed = raw.trim().parse();
            parsed.map_err(|_| ConfigError::Invalid { key, value: raw })
        }
        None => Ok(default),
    }
}

fn parse_list(raw: Option<String>, lowercase: bool) -> HashSet<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| if lowercase { s.to_lowercase() } else { s.to_string() })
        .collect()
}

/// Required Firebase keys absent from the environment.
pub fn missing_firebase_keys(lookup: impl Fn(&str) -> Option<String>) -> Vec<&'static str> {
    REQUIRED_FIREBASE_KEYS
        .iter()
        .copied()
        .filter(|key| firebase_var(&lookup, key).is_none())
        .collect()
}

impl SiteConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = SiteConfig::default();

        let backend = match lookup("ORCA_BACKEND").as_deref().map(str::trim) {
            None | Some("") | Some("firebase") => Backend::Firebase,
            Some("memory") => Backend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "ORCA_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        let firebase = match backend {
            Backend::Firebase => {
                let get = |key: &'static str| firebase_var(&lookup, key).ok_or(ConfigError::Missing(key));
                Some(FirebaseConfig {
                    api_key: get("FIREBASE_API_KEY")?,
                    project_id: get("FIREBASE_PROJECT_ID")?,
                    storage_bucket: get("FIREBASE_STORAGE_BUCKET")?,
                })
            }
            Backend::Memory => None,
        };

        let ttl_days: i64 = parse_num(&lookup, "ORCA_PENDING_TTL_DAYS", 30)?;
        let capacity: usize = parse_num(&lookup, "ORCA_PENDING_CAPACITY", defaults.pending_capacity)?;
        if capacity == 0 {
            return Err(ConfigError::Invalid {
                key: "ORCA_PENDING_CAPACITY",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            bind: lookup("ORCA_BIND").unwrap_or(defaults.bind),
            db_path: lookup("ORCA_DB_PATH").map(PathBuf::from).unwrap_or(defaults.db_path),
            backend,
            firebase,
            session_secret: lookup("ORCA_SESSION_SECRET")
                .filter(|s| !s.is_empty())
                .map(String::into_bytes),
            admin_emails: parse_list(lookup("ORCA_ADMIN_EMAILS"), true),
            admin_uids: parse_list(lookup("ORCA_ADMIN_UIDS"), false),
            fetch_timeout: Duration::from_secs(parse_num(&lookup, "ORCA_FETCH_TIMEOUT_SECS", 10)?),
            upload_timeout: Duration::from_secs(parse_num(&lookup, "ORCA_UPLOAD_TIMEOUT_SECS", 300)?),
            max_upload_bytes: parse_num(&lookup, "ORCA_MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            pending_ttl: chrono::Duration::days(ttl_days),
            pending_capacity: capacity,
            large_model_bytes: parse_num(&lookup, "ORCA_LARGE_MODEL_BYTES", defaults.large_model_bytes)?,
        })
    }

    pub fn auth_enabled(&self) -> bool {
        self.session_secret.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_firebase_backend_requires_keys() {
        let err = SiteConfig::from_lookup(lookup_from(&[("FIREBASE_API_KEY", "k")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("FIREBASE_PROJECT_ID")));
    }

    #[test]
    fn test_vite_prefixed_keys_are_accepted() {
        let config = SiteConfig::from_lookup(lookup_from(&[
            ("VITE_FIREBASE_API_KEY", "k"),
            ("VITE_FIREBASE_PROJECT_ID", "orca"),
            ("FIREBASE_STORAGE_BUCKET", "orca.appspot.com"),
        ]))
        .unwrap();
        let firebase = config.firebase.unwrap();
        assert_eq!(firebase.project_id, "orca");
        assert_eq!(firebase.api_key, "k");
    }

    #[test]
    fn test_memory_backend_defaults() {
        let config = SiteConfig::from_lookup(lookup_from(&[
            ("ORCA_BACKEND", "memory"),
            ("ORCA_ADMIN_EMAILS", "Lead@Orca.space, ops@orca.space,"),
        ]))
        .unwrap();
        assert_eq!(config.backend, Backend::Memory);
        assert!(config.firebase.is_none());
        assert!(!config.auth_enabled());
        assert_eq!(config.max_upload_bytes, 52_428_800);
        assert_eq!(config.upload_timeout, Duration::from_secs(300));
        assert!(config.admin_emails.contains("lead@orca.space"));
        assert_eq!(config.admin_emails.len(), 2);
    }

    #[test]
    fn test_invalid_numbers_are_reported() {
        let err = SiteConfig::from_lookup(lookup_from(&[
            ("ORCA_BACKEND", "memory"),
            ("ORCA_FETCH_TIMEOUT_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "ORCA_FETCH_TIMEOUT_SECS", .. }));
    }

    #[test]
    fn test_missing_keys_listing() {
        let missing = missing_firebase_keys(lookup_from(&[("FIREBASE_API_KEY", "k")]));
        assert_eq!(missing, vec!["FIREBASE_PROJECT_ID", "FIREBASE_STORAGE_BUCKET"]);
    }
}
