//! ORCA site library - application state and re-exports.
//!
//! The binary in `main.rs` only builds the router; everything it serves is
//! reachable from here so the flows can be exercised without HTTP.

use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::info;

use chrono::{DateTime, Utc};

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod local_store;
pub mod models;
pub mod outbox;
pub mod reconcile;
pub mod remote;
pub mod roles;
pub mod sync;
pub mod templates;
pub mod upload;

use auth::SessionStore;
use axum_extra::extract::CookieJar;
use config::{Backend, SiteConfig};
use local_store::LocalStore;
use outbox::{OutboxStore, PendingOutbox};
use reconcile::EditReconciler;
use remote::memory::{MemoryDocumentStore, MemoryIdentityProvider, MemoryObjectStorage};
use remote::{
    firebase::{http_client, FirebaseIdentity, FirestoreClient, StorageClient},
    DocumentStore, Identity, IdentityProvider, ObjectStorage, ProgressSender,
};
use roles::{RoleResolver, StaticAllowList};
use sync::{new_view, ContentSync, SiteView};
use upload::{UploadPipeline, UploadPolicy};

// ============================================================================
// Rate Limiting
// ============================================================================

/// Tracks sign-in failures for rate limiting with exponential backoff.
pub struct LoginRateLimit {
    pub failures: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

impl LoginRateLimit {
    pub fn new() -> Self {
        Self {
            failures: 0,
            locked_until: None,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked_until.is_some_and(|until| Utc::now() < until)
    }

    /// After 5 failures, back off exponentially, capped at 64s.
    pub fn record_failure(&mut self) {
        self.failures += 1;
        if self.failures >= 5 {
            let delay_secs = std::cmp::min(1i64 << (self.failures - 5).min(6), 64);
            self.locked_until = Some(Utc::now() + chrono::Duration::seconds(delay_secs));
        }
    }

    pub fn reset(&mut self) {
        self.failures = 0;
        self.locked_until = None;
    }
}

impl Default for LoginRateLimit {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Remote Services
// ============================================================================

pub struct Services {
    pub docs: Arc<dyn DocumentStore>,
    pub objects: Arc<dyn ObjectStorage>,
    pub identity: Arc<dyn IdentityProvider>,
}

impl Services {
    pub fn from_config(config: &SiteConfig) -> SiteResult<Self> {
        match (&config.backend, &config.firebase) {
            (Backend::Firebase, Some(firebase)) => {
                let http = http_client()?;
                Ok(Self {
                    docs: Arc::new(FirestoreClient::new(http.clone(), firebase)),
                    objects: Arc::new(StorageClient::new(http.clone(), firebase)),
                    identity: Arc::new(FirebaseIdentity::new(http, firebase)),
                })
            }
            (Backend::Firebase, None) => Err(SiteError::Validation(
                "firebase backend selected without firebase configuration".to_string(),
            )),
            (Backend::Memory, _) => Ok(Self::memory()),
        }
    }

    /// Empty in-memory services; nobody can sign in.
    pub fn memory() -> Self {
        Self {
            docs: Arc::new(MemoryDocumentStore::new()),
            objects: Arc::new(MemoryObjectStorage::new()),
            identity: Arc::new(MemoryIdentityProvider::new()),
        }
    }
}

// ============================================================================
// Application State
// ============================================================================

/// What a request to `/admin` is allowed to see.
#[derive(Debug, Clone)]
pub enum AdminAccess {
    Anonymous,
    Denied(Identity),
    Granted(Identity),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UploadProgress {
    pub uploading: bool,
    pub percent: u8,
}

pub struct AppState {
    pub config: SiteConfig,
    pub local: LocalStore,
    pub view: SiteView,
    pub docs: Arc<dyn DocumentStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub sync: ContentSync,
    pub reconciler: EditReconciler,
    pub pipeline: UploadPipeline,
    pub roles: RoleResolver,
    pub sessions: Option<SessionStore>,
    pub upload_progress: Mutex<Option<watch::Receiver<u8>>>,
    pub login_rate_limit: Mutex<LoginRateLimit>,
}

impl AppState {
    pub fn new(config: SiteConfig, local: LocalStore, services: Services) -> SiteResult<Self> {
        let outboxes = OutboxStore::open(&local, config.pending_ttl, config.pending_capacity)?;
        outboxes.purge_expired()?;

        let sessions = match &config.session_secret {
            Some(secret) => {
                let store = SessionStore::open(&local, secret.clone())?;
                // Drop sessions left over from previous runs
                store.purge_expired()?;
                Some(store)
            }
            None => None,
        };

        let allow_list = StaticAllowList::new(&config.admin_emails, &config.admin_uids);
        let roles = RoleResolver::standard(allow_list, services.docs.clone());

        Ok(Self {
            sync: ContentSync::new(services.docs.clone(), config.fetch_timeout),
            reconciler: EditReconciler::new(services.docs.clone(), outboxes),
            pipeline: UploadPipeline::new(
                services.docs.clone(),
                services.objects.clone(),
                UploadPolicy::from_config(&config),
            ),
            roles,
            sessions,
            view: new_view(),
            docs: services.docs,
            identity: services.identity,
            local,
            config,
            upload_progress: Mutex::new(None),
            login_rate_limit: Mutex::new(LoginRateLimit::new()),
        })
    }

    pub fn from_config(config: SiteConfig) -> SiteResult<Self> {
        let local = LocalStore::open(&config.db_path)?;
        let services = Services::from_config(&config)?;
        info!(
            backend = services.docs.backend_tag(),
            db = %config.db_path.display(),
            "site state ready"
        );
        Self::new(config, local, services)
    }

    pub async fn refresh(&self) {
        self.sync.refresh(&self.view).await;
    }

    pub fn auth_enabled(&self) -> bool {
        self.sessions.is_some()
    }

    /// The signed-in identity, with its ID token renewed when due.
    pub async fn current_identity(&self, jar: &CookieJar) -> SiteResult<Option<Identity>> {
        match &self.sessions {
            Some(sessions) => sessions.current_identity(jar, self.identity.as_ref()).await,
            None => Ok(None),
        }
    }

    /// Pending edits saved by one browser.
    pub fn outbox(&self, client: &ClientId) -> PendingOutbox {
        self.reconciler.outbox(client)
    }

    pub fn edit_mode(&self, client: &ClientId) -> SiteResult<bool> {
        self.local.edit_mode(client)
    }

    /// Shared settings plus this browser's pending edits.
    pub async fn view_for(&self, client: &ClientId) -> SiteResult<ViewState> {
        let pending = self.outbox(client).pending_patch()?;
        Ok(self.view.read().await.for_client(&pending))
    }

    pub async fn admin_access(&self, jar: &CookieJar) -> SiteResult<AdminAccess> {
        Ok(match self.current_identity(jar).await? {
            None => AdminAccess::Anonymous,
            Some(identity) if self.roles.can_administer(&identity).await => AdminAccess::Granted(identity),
            Some(identity) => AdminAccess::Denied(identity),
        })
    }

    /// Start tracking a new model upload and return the sender to report on.
    pub fn begin_upload(&self) -> ProgressSender {
        let (tx, rx) = watch::channel(0u8);
        *self.upload_progress.lock().unwrap_or_else(|e| e.into_inner()) = Some(rx);
        tx
    }

    /// An upload is in flight while its sender is still alive.
    pub fn upload_progress(&self) -> UploadProgress {
        let guard = self.upload_progress.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(rx) => UploadProgress {
                uploading: rx.has_changed().is_ok(),
                percent: *rx.borrow(),
            },
            None => UploadProgress {
                uploading: false,
                percent: 0,
            },
        }
    }
}

// Re-export commonly used types
pub use error::{ConfigError, SiteError, SiteResult};

pub use models::{
    AssetClass, Notice, NoticeKind, Project, SiteSettings, TeamMember, ViewerQuality, SETTINGS_FIELDS,
};

pub use local_store::ClientId;

pub use outbox::PendingEdit;

pub use reconcile::{EditOutcome, ResyncReport};

pub use sync::{filter_projects, ProjectSource, ViewState};

pub use upload::{AssetPolicy, ProjectSubmission, SelectedFile, SubmissionReport};

pub use auth::{SESSION_COOKIE, SESSION_TTL_HOURS};
