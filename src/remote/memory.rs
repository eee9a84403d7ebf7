//! In-memory services for tests and offline development.
//!
//! Failures and delays can be injected so the degrade paths of the sync,
//! reconciliation and upload flows can be driven deterministically.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use super::{
    progress_percent, Credentials, Document, DocumentStore, Identity, IdentityProvider,
    ObjectStorage, ProgressSender, StoredObject,
};
use crate::error::{SiteError, SiteResult};

/// Failure to inject into a fake service call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    Unreachable,
    PermissionDenied,
    Malformed,
    Other(String),
}

impl Failure {
    fn to_error(&self, what: &str) -> SiteError {
        match self {
            Failure::Unreachable => SiteError::Unreachable(format!("{}: network error", what)),
            Failure::PermissionDenied => {
                SiteError::PermissionDenied(format!("{}: missing or insufficient permissions", what))
            }
            Failure::Malformed => SiteError::Malformed(format!("{}: unexpected document shape", what)),
            Failure::Other(reason) => SiteError::Unreachable(reason.clone()),
        }
    }
}

// ============================================================================
// Document Store
// ============================================================================

#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: Mutex<HashMap<String, BTreeMap<String, Document>>>,
    read_failure: Mutex<Option<Failure>>,
    write_failure: Mutex<Option<Failure>>,
    /// Reject writes that carry no credentials, like the hosted store's rules.
    pub require_auth_for_writes: bool,
    pub read_delay: Duration,
    next_id: AtomicU64,
    pub write_calls: AtomicU64,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose writes are rejected unless credentials are supplied.
    pub fn with_write_rules() -> Self {
        Self {
            require_auth_for_writes: true,
            ..Self::default()
        }
    }

    /// A store whose reads stall for `delay` before answering.
    pub fn with_read_delay(delay: Duration) -> Self {
        Self {
            read_delay: delay,
            ..Self::default()
        }
    }

    pub async fn insert(&self, collection: &str, id: &str, fields: Document) {
        self.collections
            .lock()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
    }

    pub async fn document(&self, collection: &str, id: &str) -> Option<Document> {
        self.collections
            .lock()
            .await
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .await
            .get(collection)
            .map(|docs| docs.len())
            .unwrap_or(0)
    }

    pub async fn fail_reads(&self, failure: Option<Failure>) {
        *self.read_failure.lock().await = failure;
    }

    pub async fn fail_writes(&self, failure: Option<Failure>) {
        *self.write_failure.lock().await = failure;
    }

    async fn check_read(&self, what: &str) -> SiteResult<()> {
        if !self.read_delay.is_zero() {
            tokio::time::sleep(self.read_delay).await;
        }
        match self.read_failure.lock().await.as_ref() {
            Some(f) => Err(f.to_error(what)),
            None => Ok(()),
        }
    }

    async fn check_write(&self, what: &str, auth: Option<&Credentials>) -> SiteResult<()> {
        self.write_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(f) = self.write_failure.lock().await.as_ref() {
            return Err(f.to_error(what));
        }
        if self.require_auth_for_writes && auth.is_none() {
            return Err(Failure::PermissionDenied.to_error(what));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn get_document(
        &self,
        collection: &str,
        id: &str,
        _auth: Option<&Credentials>,
    ) -> SiteResult<Option<Document>> {
        self.check_read(&format!("{}/{}", collection, id)).await?;
        Ok(self.document(collection, id).await)
    }

    async fn list_documents(
        &self,
        collection: &str,
        _auth: Option<&Credentials>,
    ) -> SiteResult<Vec<(String, Document)>> {
        self.check_read(collection).await?;
        Ok(self
            .collections
            .lock()
            .await
            .get(collection)
            .map(|docs| docs.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn update_fields(
        &self,
        collection: &str,
        id: &str,
        fields: &Document,
        auth: Option<&Credentials>,
    ) -> SiteResult<()> {
        let what = format!("{}/{}", collection, id);
        self.check_write(&what, auth).await?;
        let mut collections = self.collections.lock().await;
        let doc = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| SiteError::NotFound(what.clone()))?;
        for (k, v) in fields {
            doc.insert(k.clone(), v.clone());
        }
        Ok(())
    }

    async fn merge_fields(
        &self,
        collection: &str,
        id: &str,
        fields: &Document,
        auth: Option<&Credentials>,
    ) -> SiteResult<()> {
        self.check_write(&format!("{}/{}", collection, id), auth).await?;
        let mut collections = self.collections.lock().await;
        let doc = collections
            .entry(collection.to_string())
            .or_default()
            .entry(id.to_string())
            .or_default();
        for (k, v) in fields {
            doc.insert(k.clone(), v.clone());
        }
        Ok(())
    }

    async fn add_document(
        &self,
        collection: &str,
        fields: &Document,
        auth: Option<&Credentials>,
    ) -> SiteResult<String> {
        self.check_write(collection, auth).await?;
        let id = format!("doc-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.insert(collection, &id, fields.clone()).await;
        Ok(id)
    }
}

// ============================================================================
// Object Storage
// ============================================================================

#[derive(Default)]
pub struct MemoryObjectStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    prefix_failures: Mutex<HashMap<String, String>>,
    prefix_delays: Mutex<HashMap<String, Duration>>,
    pub put_calls: AtomicU64,
}

impl MemoryObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every upload under `prefix/` with `reason`.
    pub async fn fail_prefix(&self, prefix: &str, reason: &str) {
        self.prefix_failures
            .lock()
            .await
            .insert(prefix.to_string(), reason.to_string());
    }

    /// Stall every upload under `prefix/` for `delay` before storing it.
    pub async fn delay_prefix(&self, prefix: &str, delay: Duration) {
        self.prefix_delays
            .lock()
            .await
            .insert(prefix.to_string(), delay);
    }

    pub async fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.objects.lock().await.keys().cloned().collect();
        paths.sort();
        paths
    }

    fn prefix_of(path: &str) -> &str {
        path.split('/').next().unwrap_or("")
    }
}

/// Bytes per simulated progress step.
const PROGRESS_STEP: usize = 64 * 1024;

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn put_object(
        &self,
        path: &str,
        data: Vec<u8>,
        _content_type: &str,
        progress: Option<ProgressSender>,
        _auth: Option<&Credentials>,
    ) -> SiteResult<StoredObject> {
        self.put_calls.fetch_add(1, Ordering::Relaxed);
        let prefix = Self::prefix_of(path).to_string();

        let delay = self.prefix_delays.lock().await.get(&prefix).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(reason) = self.prefix_failures.lock().await.get(&prefix) {
            return Err(SiteError::Unreachable(reason.clone()));
        }

        let total = data.len() as u64;
        if let Some(tx) = &progress {
            let mut sent = 0usize;
            while sent < data.len() {
                sent = (sent + PROGRESS_STEP).min(data.len());
                tx.send_replace(progress_percent(sent as u64, total));
            }
            tx.send_replace(100);
        }

        self.objects.lock().await.insert(path.to_string(), data);
        Ok(StoredObject {
            path: path.to_string(),
            download_url: format!("memory://{}", path),
            size: total,
        })
    }
}

// ============================================================================
// Identity Provider
// ============================================================================

pub struct MemoryIdentityProvider {
    /// email -> (password, uid)
    accounts: Mutex<HashMap<String, (String, String)>>,
    revoked: Mutex<HashSet<String>>,
    token_ttl_secs: i64,
    issued: AtomicU64,
    pub refresh_calls: AtomicU64,
}

impl Default for MemoryIdentityProvider {
    fn default() -> Self {
        Self::with_token_ttl(3600)
    }
}

const MEMORY_REFRESH_PREFIX: &str = "memory-refresh-";

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue ID tokens that expire after `secs`.
    pub fn with_token_ttl(secs: i64) -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            revoked: Mutex::new(HashSet::new()),
            token_ttl_secs: secs,
            issued: AtomicU64::new(0),
            refresh_calls: AtomicU64::new(0),
        }
    }

    pub async fn add_account(&self, email: &str, password: &str, uid: &str) {
        self.accounts.lock().await.insert(
            email.to_lowercase(),
            (password.to_string(), uid.to_string()),
        );
    }

    /// Reject every later refresh for `uid`.
    pub async fn revoke_refresh(&self, uid: &str) {
        self.revoked.lock().await.insert(uid.to_string());
    }

    fn issue(&self, uid: &str, email: &str) -> Identity {
        let n = self.issued.fetch_add(1, Ordering::Relaxed) + 1;
        Identity {
            uid: uid.to_string(),
            email: email.to_string(),
            credentials: Credentials {
                id_token: format!("memory-token-{}-{}", uid, n),
            },
            expires_in: self.token_ttl_secs,
            refresh_token: format!("{}{}", MEMORY_REFRESH_PREFIX, uid),
        }
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn sign_in(&self, email: &str, password: &str) -> SiteResult<Identity> {
        let accounts = self.accounts.lock().await;
        match accounts.get(&email.to_lowercase()) {
            Some((expected, uid)) if expected == password => Ok(self.issue(uid, email)),
            _ => Err(SiteError::PermissionDenied("invalid credentials".to_string())),
        }
    }

    async fn refresh(&self, refresh_token: &str) -> SiteResult<Identity> {
        self.refresh_calls.fetch_add(1, Ordering::Relaxed);
        let uid = refresh_token
            .strip_prefix(MEMORY_REFRESH_PREFIX)
            .ok_or_else(|| SiteError::PermissionDenied("refresh token rejected".to_string()))?;
        if self.revoked.lock().await.contains(uid) {
            return Err(SiteError::PermissionDenied("refresh token rejected".to_string()));
        }
        let known = self.accounts.lock().await.values().any(|(_, u)| u == uid);
        if !known {
            return Err(SiteError::PermissionDenied("refresh token rejected".to_string()));
        }
        Ok(self.issue(uid, ""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_update_requires_existing_document() {
        let store = MemoryDocumentStore::new();
        let err = store
            .update_fields("settings", "site", &fields(json!({"tagline": "x"})), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SiteError::NotFound(_)));

        store
            .merge_fields("settings", "site", &fields(json!({"tagline": "x"})), None)
            .await
            .unwrap();
        store
            .update_fields("settings", "site", &fields(json!({"about": "y"})), None)
            .await
            .unwrap();
        let doc = store.document("settings", "site").await.unwrap();
        assert_eq!(doc["tagline"], "x");
        assert_eq!(doc["about"], "y");
    }

    #[tokio::test]
    async fn test_write_rules_reject_anonymous_writes() {
        let store = MemoryDocumentStore::with_write_rules();
        store.insert("settings", "site", Document::new()).await;
        let creds = Credentials {
            id_token: "t".to_string(),
        };

        let anonymous = store
            .update_fields("settings", "site", &fields(json!({"tagline": "x"})), None)
            .await;
        assert!(matches!(anonymous, Err(SiteError::PermissionDenied(_))));

        store
            .update_fields("settings", "site", &fields(json!({"tagline": "x"})), Some(&creds))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_put_object_reports_progress() {
        let storage = MemoryObjectStorage::new();
        let (tx, rx) = tokio::sync::watch::channel(0u8);
        let stored = storage
            .put_object("models/1_a.glb", vec![0u8; 200_000], "model/gltf-binary", Some(tx), None)
            .await
            .unwrap();
        assert_eq!(stored.size, 200_000);
        assert_eq!(*rx.borrow(), 100);
        assert_eq!(storage.paths().await, vec!["models/1_a.glb".to_string()]);
    }

    #[tokio::test]
    async fn test_sign_in_checks_password() {
        let idp = MemoryIdentityProvider::new();
        idp.add_account("Lead@orca.space", "hunter2", "uid-1").await;

        let identity = idp.sign_in("lead@orca.space", "hunter2").await.unwrap();
        assert_eq!(identity.uid, "uid-1");
        assert!(idp.sign_in("lead@orca.space", "wrong").await.is_err());
    }

    #[tokio::test]
    async fn test_refresh_issues_new_token_until_revoked() {
        let idp = MemoryIdentityProvider::new();
        idp.add_account("lead@orca.space", "hunter2", "uid-1").await;
        let first = idp.sign_in("lead@orca.space", "hunter2").await.unwrap();

        let refreshed = idp.refresh(&first.refresh_token).await.unwrap();
        assert_eq!(refreshed.uid, "uid-1");
        assert_ne!(refreshed.credentials, first.credentials);

        idp.revoke_refresh("uid-1").await;
        assert!(idp.refresh(&first.refresh_token).await.is_err());
        assert!(idp.refresh("forged").await.is_err());
    }
}
