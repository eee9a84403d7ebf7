//! Edit reconciliation: inline settings edits with a local fallback.
//!
//! An edit is written to the remote `settings/site` document first. A
//! successful write is published to the shared view. When the write fails
//! for any reason the edit is parked in the editing browser's
//! [`PendingOutbox`] and laid over remote settings for that browser only,
//! until it is synced or discarded.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{SiteError, SiteResult};
use crate::local_store::ClientId;
use crate::models::SiteSettings;
use crate::outbox::{OutboxStore, PendingOutbox};
use crate::remote::{Credentials, DocumentStore, SETTINGS_COLLECTION, SETTINGS_DOC};
use crate::sync::SiteView;

pub const SAVED_LOCALLY_NOTICE: &str =
    "Your changes were saved locally. Sign in at /admin as a team member to save them to the cloud.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum EditOutcome {
    Synced,
    SavedLocally { reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResyncReport {
    pub synced: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl ResyncReport {
    pub fn summary(&self) -> String {
        if self.failed.is_empty() {
            format!("Synced {} pending edit(s).", self.synced.len())
        } else {
            let failures: Vec<String> = self
                .failed
                .iter()
                .map(|(field, reason)| format!("{}: {}", field, reason))
                .collect();
            format!(
                "Synced {} pending edit(s); {} still pending: {}",
                self.synced.len(),
                self.failed.len(),
                failures.join(", ")
            )
        }
    }
}

fn single_field(field: &str, value: &str) -> Map<String, Value> {
    let mut doc = Map::new();
    doc.insert(field.to_string(), Value::String(value.to_string()));
    doc
}

fn saved(field: &str, value: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    fields.insert(field.to_string(), value.to_string());
    fields
}

pub struct EditReconciler {
    docs: Arc<dyn DocumentStore>,
    outboxes: OutboxStore,
}

impl EditReconciler {
    pub fn new(docs: Arc<dyn DocumentStore>, outboxes: OutboxStore) -> Self {
        Self { docs, outboxes }
    }

    pub fn outboxes(&self) -> &OutboxStore {
        &self.outboxes
    }

    pub fn outbox(&self, client: &ClientId) -> PendingOutbox {
        self.outboxes.for_client(client)
    }

    /// Persist `value` to `field`, falling back to `client`'s outbox.
    pub async fn edit_field(
        &self,
        view: &SiteView,
        client: &ClientId,
        field: &str,
        value: &str,
        auth: Option<&Credentials>,
    ) -> SiteResult<EditOutcome> {
        if !SiteSettings::is_known_field(field) {
            return Err(SiteError::Validation(format!("unknown settings field {:?}", field)));
        }
        let outbox = self.outbox(client);

        let write = self
            .docs
            .update_fields(SETTINGS_COLLECTION, SETTINGS_DOC, &single_field(field, value), auth)
            .await;

        match write {
            Ok(()) => {
                outbox.clear(field)?;
                view.write().await.apply_saved(&saved(field, value));
                info!(field, "settings field saved");
                Ok(EditOutcome::Synced)
            }
            Err(e) => {
                warn!(field, error = %e, "settings update failed; saved locally instead");
                outbox.record(field, value)?;
                Ok(EditOutcome::SavedLocally {
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Push every pending edit of `client`. Only explicit calls sync;
    /// nothing retries in the background.
    pub async fn resync_pending(
        &self,
        view: &SiteView,
        client: &ClientId,
        auth: Option<&Credentials>,
    ) -> SiteResult<ResyncReport> {
        let outbox = self.outbox(client);
        let mut report = ResyncReport::default();
        for edit in outbox.entries()? {
            let write = self
                .docs
                .merge_fields(
                    SETTINGS_COLLECTION,
                    SETTINGS_DOC,
                    &single_field(&edit.field, &edit.value),
                    auth,
                )
                .await;
            match write {
                Ok(()) => {
                    outbox.clear_synced(&edit.field, edit.version)?;
                    view.write().await.apply_saved(&saved(&edit.field, &edit.value));
                    report.synced.push(edit.field);
                }
                Err(e) => {
                    warn!(field = %edit.field, error = %e, "pending edit still unsynced");
                    report.failed.push((edit.field, e.to_string()));
                }
            }
        }
        info!(
            synced = report.synced.len(),
            failed = report.failed.len(),
            "resync finished"
        );
        Ok(report)
    }

    /// Upsert several fields at once from the admin settings form. Unlike
    /// inline edits a failure is returned to the caller, nothing is stashed.
    pub async fn save_settings(
        &self,
        view: &SiteView,
        client: &ClientId,
        fields: &BTreeMap<String, String>,
        auth: Option<&Credentials>,
    ) -> SiteResult<()> {
        if let Some(unknown) = fields.keys().find(|f| !SiteSettings::is_known_field(f)) {
            return Err(SiteError::Validation(format!("unknown settings field {:?}", unknown)));
        }
        let doc: Map<String, Value> = fields
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        self.docs
            .merge_fields(SETTINGS_COLLECTION, SETTINGS_DOC, &doc, auth)
            .await?;

        let outbox = self.outbox(client);
        for field in fields.keys() {
            outbox.clear(field)?;
        }
        view.write().await.apply_saved(fields);
        info!(fields = fields.len(), "settings form saved");
        Ok(())
    }

    /// Drop `client`'s pending edit for `field`; its pages show the remote
    /// value again.
    pub fn discard_pending(&self, client: &ClientId, field: &str) -> SiteResult<bool> {
        let removed = self.outbox(client).discard(field)?;
        if removed {
            info!(field, "pending edit discarded");
        }
        Ok(removed)
    }

    pub fn discard_all_pending(&self, client: &ClientId) -> SiteResult<usize> {
        self.outbox(client).discard_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local_store::LocalStore;
    use crate::remote::memory::{Failure, MemoryDocumentStore};
    use crate::remote::Document;
    use crate::sync::{new_view, ContentSync, PENDING_NOTICE};
    use std::time::Duration;

    fn creds() -> Credentials {
        Credentials {
            id_token: "team-token".to_string(),
        }
    }

    struct Setup {
        store: Arc<MemoryDocumentStore>,
        reconciler: EditReconciler,
        client: ClientId,
        outbox: PendingOutbox,
    }

    async fn setup() -> Setup {
        let store = Arc::new(MemoryDocumentStore::with_write_rules());
        store.insert("settings", "site", Document::new()).await;
        let local = LocalStore::temporary().unwrap();
        let outboxes = OutboxStore::open(&local, chrono::Duration::days(30), 32).unwrap();
        let reconciler = EditReconciler::new(store.clone(), outboxes);
        let client = ClientId::generate();
        let outbox = reconciler.outbox(&client);
        Setup {
            store,
            reconciler,
            client,
            outbox,
        }
    }

    #[tokio::test]
    async fn test_authorized_edit_syncs() {
        let s = setup().await;
        let view = new_view();

        let outcome = s
            .reconciler
            .edit_field(&view, &s.client, "tagline", "Cleaning orbit", Some(&creds()))
            .await
            .unwrap();

        assert_eq!(outcome, EditOutcome::Synced);
        assert_eq!(s.store.document("settings", "site").await.unwrap()["tagline"], "Cleaning orbit");
        assert!(s.outbox.is_empty().unwrap());
        assert_eq!(view.read().await.settings.get("tagline"), "Cleaning orbit");
    }

    #[tokio::test]
    async fn test_failed_edit_is_stashed_for_its_browser_only() {
        let s = setup().await;
        let view = new_view();
        view.write().await.settings_fetched = true;

        let outcome = s
            .reconciler
            .edit_field(&view, &s.client, "about", "Student team", None)
            .await
            .unwrap();

        assert!(matches!(outcome, EditOutcome::SavedLocally { .. }));
        assert_eq!(s.outbox.pending_patch().unwrap()["about"], "Student team");
        assert!(s.store.document("settings", "site").await.unwrap().get("about").is_none());

        let shared = view.read().await.clone();
        assert_eq!(shared.settings.get("about"), "");
        assert!(shared.notice.is_none());

        let own = shared.for_client(&s.outbox.pending_patch().unwrap());
        assert_eq!(own.settings.get("about"), "Student team");
        assert_eq!(own.notice.unwrap().text, PENDING_NOTICE);

        let other = s.reconciler.outbox(&ClientId::generate());
        assert!(other.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_failures_accumulate_per_field() {
        let s = setup().await;
        s.store.fail_writes(Some(Failure::Unreachable)).await;
        let view = new_view();

        for (field, value) in [("tagline", "A"), ("about", "B"), ("tagline", "C")] {
            s.reconciler
                .edit_field(&view, &s.client, field, value, None)
                .await
                .unwrap();
        }

        let patch = s.outbox.pending_patch().unwrap();
        assert_eq!(patch.len(), 2);
        assert_eq!(patch["tagline"], "C");
        assert_eq!(patch["about"], "B");
    }

    #[tokio::test]
    async fn test_two_offline_hero_edits_keep_only_the_second() {
        let s = setup().await;
        s.store.fail_writes(Some(Failure::Unreachable)).await;
        let view = new_view();

        for value in ["first", "second"] {
            s.reconciler
                .edit_field(&view, &s.client, "heroDesc", value, None)
                .await
                .unwrap();
        }

        let entries = s.outbox.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].field, "heroDesc");
        assert_eq!(entries[0].value, "second");
    }

    #[tokio::test]
    async fn test_successful_write_clears_only_that_field() {
        let s = setup().await;
        let view = new_view();

        for field in ["tagline", "about"] {
            s.reconciler
                .edit_field(&view, &s.client, field, "offline", None)
                .await
                .unwrap();
        }
        s.reconciler
            .edit_field(&view, &s.client, "tagline", "online", Some(&creds()))
            .await
            .unwrap();

        let patch = s.outbox.pending_patch().unwrap();
        assert!(!patch.contains_key("tagline"));
        assert!(patch.contains_key("about"));
    }

    #[tokio::test]
    async fn test_unknown_field_is_rejected_without_side_effects() {
        let s = setup().await;
        let view = new_view();

        let err = s
            .reconciler
            .edit_field(&view, &s.client, "editMode", "true", Some(&creds()))
            .await
            .unwrap_err();
        assert!(matches!(err, SiteError::Validation(_)));
        assert!(s.outbox.is_empty().unwrap());
        assert!(!view.read().await.settings.fields().contains_key("editMode"));
        assert_eq!(s.store.write_calls.load(std::sync::atomic::Ordering::Relaxed), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_edit_survives_a_refresh_in_flight() {
        let store = Arc::new(MemoryDocumentStore::with_read_delay(Duration::from_secs(1)));
        store
            .insert("settings", "site", single_field("tagline", "remote"))
            .await;
        store.fail_writes(Some(Failure::Unreachable)).await;
        let local = LocalStore::temporary().unwrap();
        let outboxes = OutboxStore::open(&local, chrono::Duration::days(30), 32).unwrap();
        let reconciler = EditReconciler::new(store.clone(), outboxes);
        let client = ClientId::generate();
        let sync = ContentSync::new(store, Duration::from_secs(5));
        let view = new_view();

        let (_, outcome) = tokio::join!(sync.refresh(&view), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            reconciler
                .edit_field(&view, &client, "tagline", "local", None)
                .await
                .unwrap()
        });
        assert!(matches!(outcome, EditOutcome::SavedLocally { .. }));

        let shared = view.read().await.clone();
        assert_eq!(shared.settings.get("tagline"), "remote");
        let own = shared.for_client(&reconciler.outbox(&client).pending_patch().unwrap());
        assert_eq!(own.settings.get("tagline"), "local");
    }

    #[tokio::test]
    async fn test_resync_pushes_pending_edits() {
        let s = setup().await;
        let view = new_view();
        s.reconciler.edit_field(&view, &s.client, "tagline", "X", None).await.unwrap();
        s.reconciler.edit_field(&view, &s.client, "heroDesc", "H", None).await.unwrap();

        let report = s
            .reconciler
            .resync_pending(&view, &s.client, Some(&creds()))
            .await
            .unwrap();
        assert_eq!(report.synced.len(), 2);
        assert!(report.failed.is_empty());
        assert!(s.outbox.is_empty().unwrap());
        assert_eq!(view.read().await.settings.get("heroDesc"), "H");

        let doc = s.store.document("settings", "site").await.unwrap();
        assert_eq!(doc["tagline"], "X");
        assert_eq!(doc["heroDesc"], "H");
    }

    #[tokio::test]
    async fn test_resync_without_permission_keeps_entries() {
        let s = setup().await;
        let view = new_view();
        s.reconciler.edit_field(&view, &s.client, "tagline", "X", None).await.unwrap();

        let report = s.reconciler.resync_pending(&view, &s.client, None).await.unwrap();
        assert!(report.synced.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert!(report.summary().contains("tagline"));
        assert_eq!(s.outbox.pending_patch().unwrap()["tagline"], "X");
    }

    #[tokio::test]
    async fn test_settings_form_upserts_and_clears_outbox() {
        let store = Arc::new(MemoryDocumentStore::with_write_rules());
        let local = LocalStore::temporary().unwrap();
        let outboxes = OutboxStore::open(&local, chrono::Duration::days(30), 32).unwrap();
        let reconciler = EditReconciler::new(store.clone(), outboxes);
        let client = ClientId::generate();
        let view = new_view();
        reconciler.edit_field(&view, &client, "tagline", "offline", None).await.unwrap();

        let mut fields = BTreeMap::new();
        fields.insert("tagline".to_string(), "From the form".to_string());
        fields.insert("logo".to_string(), "memory://assets/1_logo_a.png".to_string());
        reconciler
            .save_settings(&view, &client, &fields, Some(&creds()))
            .await
            .unwrap();

        let doc = store.document("settings", "site").await.unwrap();
        assert_eq!(doc["tagline"], "From the form");
        assert_eq!(doc["logo"], "memory://assets/1_logo_a.png");
        assert!(reconciler.outbox(&client).is_empty().unwrap());
        assert_eq!(view.read().await.settings.get("tagline"), "From the form");
    }

    #[tokio::test]
    async fn test_settings_form_failure_is_returned() {
        let s = setup().await;
        let view = new_view();
        let mut fields = BTreeMap::new();
        fields.insert("about".to_string(), "x".to_string());

        let err = s
            .reconciler
            .save_settings(&view, &s.client, &fields, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SiteError::PermissionDenied(_)));
        assert!(s.outbox.is_empty().unwrap());
        assert_eq!(view.read().await.settings.get("about"), "");
    }

    #[tokio::test]
    async fn test_discarded_edit_no_longer_overrides_remote() {
        let s = setup().await;
        let view = new_view();
        s.reconciler.edit_field(&view, &s.client, "tagline", "local", None).await.unwrap();
        s.store
            .update_fields("settings", "site", &single_field("tagline", "remote"), Some(&creds()))
            .await
            .unwrap();

        assert!(s.reconciler.discard_pending(&s.client, "tagline").unwrap());
        let sync = ContentSync::new(s.store.clone(), Duration::from_secs(5));
        sync.refresh(&view).await;

        let own = view.read().await.for_client(&s.outbox.pending_patch().unwrap());
        assert_eq!(own.settings.get("tagline"), "remote");
        assert!(own.notice.is_none());
    }
}
