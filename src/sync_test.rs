//! Tests for content sync against the in-memory document store.

use super::*;
use crate::local_store::{ClientId, LocalStore};
use crate::outbox::OutboxStore;
use crate::models::SETTINGS_FIELDS;
use crate::remote::memory::{Failure, MemoryDocumentStore};
use crate::remote::Document;
use serde_json::json;

// ============================================================================
// Helpers
// ============================================================================

fn doc(value: serde_json::Value) -> Document {
    value.as_object().cloned().unwrap()
}

fn outbox() -> PendingOutbox {
    let store = LocalStore::temporary().unwrap();
    OutboxStore::open(&store, chrono::Duration::days(30), 32)
        .unwrap()
        .for_client(&ClientId::generate())
}

fn sync_with(store: Arc<MemoryDocumentStore>) -> ContentSync {
    ContentSync::new(store, Duration::from_secs(10))
}

fn assert_complete(settings: &SiteSettings) {
    for field in SETTINGS_FIELDS {
        assert!(settings.fields().contains_key(*field), "missing {}", field);
    }
}

// ============================================================================
// Settings
// ============================================================================

#[tokio::test]
async fn test_remote_settings_win_over_defaults() {
    let store = Arc::new(MemoryDocumentStore::new());
    store
        .insert("settings", "site", doc(json!({"tagline": "Cleaning orbit", "siteTitle": "ORCA Labs"})))
        .await;
    let sync = sync_with(store);

    let settings = sync.load_settings(&SiteSettings::default(), &outbox()).await;
    assert_eq!(settings.get("tagline"), "Cleaning orbit");
    assert_eq!(settings.get("siteTitle"), "ORCA Labs");
    assert_complete(&settings);
}

#[tokio::test]
async fn test_every_fetch_outcome_yields_complete_settings() {
    for failure in [None, Some(Failure::Unreachable), Some(Failure::PermissionDenied), Some(Failure::Malformed)] {
        let store = Arc::new(MemoryDocumentStore::new());
        store.insert("settings", "site", doc(json!({"about": "Team"}))).await;
        store.fail_reads(failure.clone()).await;
        let sync = sync_with(store);

        let settings = sync.load_settings(&SiteSettings::default(), &outbox()).await;
        assert_complete(&settings);
        if failure.is_some() {
            assert_eq!(settings, SiteSettings::default());
        } else {
            assert_eq!(settings.get("about"), "Team");
        }
    }
}

#[tokio::test]
async fn test_pending_patch_wins_over_remote() {
    let store = Arc::new(MemoryDocumentStore::new());
    store
        .insert("settings", "site", doc(json!({"tagline": "Y", "about": "Z"})))
        .await;
    let outbox = outbox();
    outbox.record("tagline", "X").unwrap();
    let sync = sync_with(store);

    let settings = sync.load_settings(&SiteSettings::default(), &outbox).await;
    assert_eq!(settings.get("tagline"), "X");
    assert_eq!(settings.get("about"), "Z");
}

#[tokio::test]
async fn test_non_string_fields_are_ignored() {
    let store = Arc::new(MemoryDocumentStore::new());
    store
        .insert("settings", "site", doc(json!({"tagline": 42, "editMode": true, "about": "ok"})))
        .await;
    let sync = sync_with(store);

    let settings = sync.load_settings(&SiteSettings::default(), &outbox()).await;
    assert_eq!(settings.get("tagline"), "");
    assert_eq!(settings.get("about"), "ok");
    assert!(!settings.fields().contains_key("editMode"));
}

#[tokio::test]
async fn test_missing_document_still_applies_pending() {
    let store = Arc::new(MemoryDocumentStore::new());
    let outbox = outbox();
    outbox.record("heroDesc", "Local hero").unwrap();
    let sync = sync_with(store);

    let settings = sync.load_settings(&SiteSettings::default(), &outbox).await;
    assert_eq!(settings.get("heroDesc"), "Local hero");
    assert_complete(&settings);
}

#[tokio::test]
async fn test_failed_fetch_ignores_pending() {
    let store = Arc::new(MemoryDocumentStore::new());
    store.fail_reads(Some(Failure::Unreachable)).await;
    let outbox = outbox();
    outbox.record("heroDesc", "Local hero").unwrap();
    let sync = sync_with(store);

    assert_eq!(sync.fetch_settings().await, SettingsFetch::Failed);
    let mut current = SiteSettings::default();
    current.set("heroDesc", "shown before");
    let settings = sync.load_settings(&current, &outbox).await;
    assert_eq!(settings.get("heroDesc"), "shown before");
}

#[tokio::test]
async fn test_fetch_rebuilds_from_defaults() {
    let store = Arc::new(MemoryDocumentStore::new());
    store.insert("settings", "site", doc(json!({"about": "Team"}))).await;
    let sync = sync_with(store);

    let mut current = SiteSettings::default();
    current.set("tagline", "left over");
    let settings = sync.load_settings(&current, &outbox()).await;
    assert_eq!(settings.get("tagline"), "");
    assert_eq!(settings.get("about"), "Team");
}

#[tokio::test(start_paused = true)]
async fn test_slow_settings_fetch_times_out_to_current() {
    let store = Arc::new(MemoryDocumentStore::with_read_delay(Duration::from_secs(60)));
    store.insert("settings", "site", doc(json!({"about": "late"}))).await;
    let sync = sync_with(store);

    let mut current = SiteSettings::default();
    current.set("about", "current");
    let settings = sync.load_settings(&current, &outbox()).await;
    assert_eq!(settings.get("about"), "current");
}

// ============================================================================
// Projects
// ============================================================================

#[tokio::test]
async fn test_remote_projects_are_used() {
    let store = Arc::new(MemoryDocumentStore::new());
    store
        .insert(
            "projects",
            "p1",
            doc(json!({"title": "Debris map", "description": "Orbit", "tags": ["3D", "3D", "Orbital"]})),
        )
        .await;
    let sync = sync_with(store);

    let (projects, source) = sync.load_projects().await;
    assert_eq!(source, ProjectSource::Remote);
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].id, "p1");
    assert_eq!(projects[0].tags, vec!["3D", "Orbital"]);
}

#[tokio::test]
async fn test_empty_or_failing_store_falls_back_to_samples() {
    let empty = Arc::new(MemoryDocumentStore::new());
    let (projects, source) = sync_with(empty).load_projects().await;
    assert_eq!(source, ProjectSource::Sample);
    assert_eq!(projects, sample_projects());

    let failing = Arc::new(MemoryDocumentStore::new());
    failing.fail_reads(Some(Failure::PermissionDenied)).await;
    let (projects, source) = sync_with(failing).load_projects().await;
    assert_eq!(source, ProjectSource::Sample);
    assert_eq!(projects, sample_projects());
}

#[tokio::test]
async fn test_unreadable_project_is_skipped() {
    let store = Arc::new(MemoryDocumentStore::new());
    store.insert("projects", "bad", doc(json!({"description": "no title"}))).await;
    store.insert("projects", "good", doc(json!({"title": "Recycler"}))).await;
    let sync = sync_with(store);

    let (projects, source) = sync.load_projects().await;
    assert_eq!(source, ProjectSource::Remote);
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].title, "Recycler");
}

// ============================================================================
// Refresh
// ============================================================================

#[tokio::test]
async fn test_pending_edits_stay_with_their_browser() {
    let store = Arc::new(MemoryDocumentStore::new());
    store.insert("settings", "site", doc(json!({"tagline": "Y"}))).await;
    let outbox = outbox();
    outbox.record("tagline", "X").unwrap();
    let sync = sync_with(store);
    let view = new_view();

    sync.refresh(&view).await;
    let shared = view.read().await.clone();
    assert_eq!(shared.settings.get("tagline"), "Y");
    assert!(shared.notice.is_none());

    let own = shared.for_client(&outbox.pending_patch().unwrap());
    assert_eq!(own.settings.get("tagline"), "X");
    let notice = own.notice.as_ref().unwrap();
    assert!(notice.sticky);
    assert_eq!(notice.text, PENDING_NOTICE);

    outbox.discard("tagline").unwrap();
    let own = shared.for_client(&outbox.pending_patch().unwrap());
    assert_eq!(own.settings.get("tagline"), "Y");
    assert!(own.notice.is_none());
}

#[tokio::test]
async fn test_refresh_drops_values_the_remote_lacks() {
    let store = Arc::new(MemoryDocumentStore::new());
    store.insert("settings", "site", Document::new()).await;
    let sync = sync_with(store);
    let view = new_view();
    view.write().await.settings.set("tagline", "discard me");

    sync.refresh(&view).await;
    assert_eq!(view.read().await.settings.get("tagline"), "");
}

#[tokio::test]
async fn test_failed_refresh_keeps_settings_without_overlay() {
    let store = Arc::new(MemoryDocumentStore::new());
    store.insert("settings", "site", doc(json!({"tagline": "Y"}))).await;
    let sync = sync_with(store.clone());
    let view = new_view();
    sync.refresh(&view).await;

    store.fail_reads(Some(Failure::Unreachable)).await;
    sync.refresh(&view).await;
    let shared = view.read().await.clone();
    assert_eq!(shared.settings.get("tagline"), "Y");

    let mut pending = BTreeMap::new();
    pending.insert("tagline".to_string(), "X".to_string());
    let own = shared.for_client(&pending);
    assert_eq!(own.settings.get("tagline"), "Y");
    assert!(own.notice.is_none());
}

#[test]
fn test_fetch_racing_a_local_write_is_not_published() {
    let mut state = ViewState::default();
    let epoch = state.epoch;

    let mut saved = BTreeMap::new();
    saved.insert("tagline".to_string(), "new".to_string());
    state.apply_saved(&saved);

    let mut remote = BTreeMap::new();
    remote.insert("tagline".to_string(), "old".to_string());
    let stale = SettingsFetch::Fetched { remote };
    assert!(!state.publish_settings(&stale, epoch));
    assert_eq!(state.settings.get("tagline"), "new");

    assert!(state.publish_settings(&stale, state.epoch));
    assert_eq!(state.settings.get("tagline"), "old");
}

// ============================================================================
// Filtering
// ============================================================================

#[test]
fn test_filter_projects() {
    let projects = vec![
        Project {
            title: "Debris Map".to_string(),
            description: "Tracking fragments".to_string(),
            tags: vec!["Orbital".to_string()],
            ..Project::default()
        },
        Project {
            title: "Recycler".to_string(),
            description: "Melts debris into feedstock".to_string(),
            tags: vec!["3D".to_string()],
            ..Project::default()
        },
    ];

    assert_eq!(filter_projects(&projects, "", "all").len(), 2);
    assert_eq!(filter_projects(&projects, "DEBRIS", "all").len(), 2);
    assert_eq!(filter_projects(&projects, "debris", "3D")[0].title, "Recycler");
    assert!(filter_projects(&projects, "rocket", "").is_empty());
}
