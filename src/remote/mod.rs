//! Hosted services the site depends on: a document store, object storage
//! and an identity provider.
//!
//! Each service is a trait with a Firebase REST implementation
//! ([`firebase`]) and an in-memory one ([`memory`]) used by tests and for
//! running the site without network access.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::watch;

use crate::error::SiteResult;

pub mod firebase;
pub mod memory;

/// A document's fields as JSON.
pub type Document = Map<String, Value>;

/// Sender half of an upload progress channel, carrying a 0-100 percentage.
pub type ProgressSender = watch::Sender<u8>;

pub const SETTINGS_COLLECTION: &str = "settings";
pub const SETTINGS_DOC: &str = "site";
pub const PROJECTS_COLLECTION: &str = "projects";
pub const TEAM_MEMBERS_COLLECTION: &str = "teamMembers";

/// Bearer credentials of a signed-in user, passed to every privileged call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub id_token: String,
}

/// A user authenticated by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: String,
    pub email: String,
    pub credentials: Credentials,
    /// Seconds until the provider's ID token expires.
    pub expires_in: i64,
    /// Long-lived token exchanged for a fresh ID token once it expires.
    pub refresh_token: String,
}

/// An object written to storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub path: String,
    pub download_url: String,
    pub size: u64,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn backend_tag(&self) -> &'static str;

    /// `Ok(None)` when the document does not exist.
    async fn get_document(
        &self,
        collection: &str,
        id: &str,
        auth: Option<&Credentials>,
    ) -> SiteResult<Option<Document>>;

    /// Every document of a collection as `(id, fields)`.
    async fn list_documents(
        &self,
        collection: &str,
        auth: Option<&Credentials>,
    ) -> SiteResult<Vec<(String, Document)>>;

    /// Partial update of an existing document; fails with `NotFound` if the
    /// document does not exist.
    async fn update_fields(
        &self,
        collection: &str,
        id: &str,
        fields: &Document,
        auth: Option<&Credentials>,
    ) -> SiteResult<()>;

    /// Partial update that creates the document when it is missing.
    async fn merge_fields(
        &self,
        collection: &str,
        id: &str,
        fields: &Document,
        auth: Option<&Credentials>,
    ) -> SiteResult<()>;

    /// Create a document with a generated id and return the id.
    async fn add_document(
        &self,
        collection: &str,
        fields: &Document,
        auth: Option<&Credentials>,
    ) -> SiteResult<String>;
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    fn backend_tag(&self) -> &'static str;

    /// Store `data` at `path`. When `progress` is given, the percentage of
    /// bytes handed to the service is published as the upload proceeds.
    async fn put_object(
        &self,
        path: &str,
        data: Vec<u8>,
        content_type: &str,
        progress: Option<ProgressSender>,
        auth: Option<&Credentials>,
    ) -> SiteResult<StoredObject>;
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> SiteResult<Identity>;

    /// Exchange `refresh_token` for a new ID token. The returned identity
    /// may leave `email` empty.
    async fn refresh(&self, refresh_token: &str) -> SiteResult<Identity>;
}

/// Percentage of `sent` out of `total`, rounded and clamped to 0-100.
/// Zero-length uploads are complete immediately.
pub fn progress_percent(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (sent as f64 / total as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}
