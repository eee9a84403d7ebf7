//! Content sync: resolve the settings and project catalog shown to visitors.
//!
//! Remote reads are single, bounded attempts. Any failure degrades silently
//! to what is already held in memory (settings) or to the built-in sample
//! catalog (projects).

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{SiteError, SiteResult};
use crate::models::{normalize_tags, sample_projects, Notice, NoticeKind, Project, SiteSettings};
use crate::outbox::PendingOutbox;
use crate::remote::{DocumentStore, PROJECTS_COLLECTION, SETTINGS_COLLECTION, SETTINGS_DOC};

pub const PENDING_NOTICE: &str =
    "You have local edits that are not saved to the cloud. Sign in at /admin to sync them.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectSource {
    Remote,
    Sample,
}

/// What the public page renders from.
///
/// The shared view only ever holds defaults overlaid with the remote
/// document. A browser's pending edits are laid over it per request by
/// [`ViewState::for_client`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    pub settings: SiteSettings,
    pub projects: Vec<Project>,
    pub project_source: ProjectSource,
    pub notice: Option<Notice>,
    /// Whether the last settings fetch succeeded.
    #[serde(skip)]
    pub settings_fetched: bool,
    /// Bumped on every settings write from this node.
    #[serde(skip)]
    pub epoch: u64,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            settings: SiteSettings::default(),
            projects: sample_projects(),
            project_source: ProjectSource::Sample,
            notice: None,
            settings_fetched: false,
            epoch: 0,
        }
    }
}

impl ViewState {
    /// Record fields this node has just written remotely.
    pub fn apply_saved(&mut self, fields: &BTreeMap<String, String>) {
        self.settings.merge_from(fields);
        self.epoch += 1;
    }

    /// Publish a settings fetch started at `epoch`. A fetch that raced a
    /// local write is dropped so it cannot roll the written fields back.
    pub fn publish_settings(&mut self, fetch: &SettingsFetch, epoch: u64) -> bool {
        match fetch {
            SettingsFetch::Fetched { .. } if self.epoch != epoch => {
                debug!("settings written during fetch, keeping local copy");
                false
            }
            SettingsFetch::Fetched { .. } => {
                self.settings = fetch.resolve(&self.settings);
                self.settings_fetched = true;
                true
            }
            SettingsFetch::Failed => {
                self.settings_fetched = false;
                false
            }
        }
    }

    /// This view as one browser sees it: its pending edits laid over the
    /// settings, with a sticky notice while any remain. Nothing is laid over
    /// when the last settings fetch failed.
    pub fn for_client(&self, pending: &BTreeMap<String, String>) -> ViewState {
        let mut view = self.clone();
        if self.settings_fetched && !pending.is_empty() {
            view.settings.merge_from(pending);
            view.notice = Some(Notice::sticky(NoticeKind::Warning, PENDING_NOTICE));
        }
        view
    }
}

pub type SiteView = Arc<RwLock<ViewState>>;

pub fn new_view() -> SiteView {
    Arc::new(RwLock::new(ViewState::default()))
}

/// Outcome of one settings fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsFetch {
    Fetched { remote: BTreeMap<String, String> },
    Failed,
}

impl SettingsFetch {
    /// Defaults overlaid with the remote document. Only a failed fetch
    /// falls back to `current`.
    pub fn resolve(&self, current: &SiteSettings) -> SiteSettings {
        match self {
            SettingsFetch::Fetched { remote } => {
                let mut settings = SiteSettings::default();
                settings.merge_from(remote);
                settings
            }
            SettingsFetch::Failed => current.clone(),
        }
    }
}

/// String-valued fields of a settings document; other values are skipped.
fn string_fields(doc: serde_json::Map<String, Value>) -> BTreeMap<String, String> {
    doc.into_iter()
        .filter_map(|(field, value)| match value {
            Value::String(s) => Some((field, s)),
            other => {
                debug!(%field, value = %other, "ignoring non-string settings field");
                None
            }
        })
        .collect()
}

pub struct ContentSync {
    docs: Arc<dyn DocumentStore>,
    fetch_timeout: Duration,
}

impl ContentSync {
    pub fn new(docs: Arc<dyn DocumentStore>, fetch_timeout: Duration) -> Self {
        Self { docs, fetch_timeout }
    }

    async fn bounded<T>(&self, what: &str, fut: impl std::future::Future<Output = SiteResult<T>>) -> SiteResult<T> {
        tokio::time::timeout(self.fetch_timeout, fut)
            .await
            .map_err(|_| SiteError::Timeout(format!("{} fetch timed out", what)))?
    }

    async fn fetch_remote_settings(&self) -> SiteResult<BTreeMap<String, String>> {
        let doc = self
            .bounded(
                "settings",
                self.docs.get_document(SETTINGS_COLLECTION, SETTINGS_DOC, None),
            )
            .await?;
        Ok(doc.map(string_fields).unwrap_or_default())
    }

    pub async fn fetch_settings(&self) -> SettingsFetch {
        match self.fetch_remote_settings().await {
            Ok(remote) => SettingsFetch::Fetched { remote },
            Err(e) => {
                warn!(error = %e, "settings fetch failed, keeping current settings");
                SettingsFetch::Failed
            }
        }
    }

    /// Settings as `outbox`'s browser sees them: defaults, then the remote
    /// document, then its pending edits. A failed fetch keeps `current`.
    pub async fn load_settings(&self, current: &SiteSettings, outbox: &PendingOutbox) -> SiteSettings {
        let fetch = self.fetch_settings().await;
        let mut settings = fetch.resolve(current);
        if matches!(fetch, SettingsFetch::Fetched { .. }) {
            match outbox.pending_patch() {
                Ok(pending) => settings.merge_from(&pending),
                Err(e) => warn!(error = %e, "could not read pending edits"),
            }
        }
        settings
    }

    async fn fetch_projects(&self) -> SiteResult<Vec<Project>> {
        let docs = self
            .bounded("projects", self.docs.list_documents(PROJECTS_COLLECTION, None))
            .await?;
        let mut projects = Vec::with_capacity(docs.len());
        for (id, doc) in docs {
            match serde_json::from_value::<Project>(Value::Object(doc)) {
                Ok(mut project) => {
                    project.id = id;
                    project.tags = normalize_tags(&project.tags);
                    projects.push(project);
                }
                Err(e) => warn!(%id, error = %e, "skipping unreadable project"),
            }
        }
        Ok(projects)
    }

    /// Remote projects when there is at least one, the sample catalog
    /// otherwise (an empty store and an unreachable one look the same).
    pub async fn load_projects(&self) -> (Vec<Project>, ProjectSource) {
        match self.fetch_projects().await {
            Ok(projects) if !projects.is_empty() => (projects, ProjectSource::Remote),
            Ok(_) => {
                debug!("no remote projects, using samples");
                (sample_projects(), ProjectSource::Sample)
            }
            Err(e) => {
                warn!(error = %e, "project fetch failed, using samples");
                (sample_projects(), ProjectSource::Sample)
            }
        }
    }

    /// Fetch settings and projects concurrently and publish them to `view`.
    pub async fn refresh(&self, view: &SiteView) {
        let epoch = view.read().await.epoch;
        let (settings, (projects, source)) = tokio::join!(self.fetch_settings(), self.load_projects());

        let mut state = view.write().await;
        let published = state.publish_settings(&settings, epoch);
        state.projects = projects;
        state.project_source = source;
        info!(
            settings_published = published,
            project_source = ?source,
            projects = state.projects.len(),
            "content refreshed"
        );
    }
}

/// Catalog search: case-insensitive match of `query` in title or
/// description, restricted to `tag` unless it is empty or `"all"`.
pub fn filter_projects<'a>(projects: &'a [Project], query: &str, tag: &str) -> Vec<&'a Project> {
    let query = query.trim().to_lowercase();
    projects
        .iter()
        .filter(|p| {
            query.is_empty()
                || p.title.to_lowercase().contains(&query)
                || p.description.to_lowercase().contains(&query)
        })
        .filter(|p| tag.is_empty() || tag == "all" || p.has_tag(tag))
        .collect()
}

#[cfg(test)]
#[path = "sync_test.rs"]
mod sync_test;
