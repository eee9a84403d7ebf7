//! Pending-edit outbox.
//!
//! Settings edits that could not be written to the remote store are kept
//! here, one entry per field, until a later write of that field succeeds or
//! the entry is discarded. Every browser has its own outbox inside the
//! shared sled tree (keys are `{client}/{field}`). Each outbox is bounded
//! (oldest entries are evicted past `capacity`) and entries expire after
//! `ttl`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::error::SiteResult;
use crate::local_store::{ClientId, LocalStore, OUTBOX_TREE};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingEdit {
    pub field: String,
    pub value: String,
    pub recorded_at: DateTime<Utc>,
    /// Monotonic across the whole tree; a re-recorded field gets a new one.
    pub version: u64,
}

/// The outbox tree, from which per-client outboxes are handed out.
#[derive(Clone)]
pub struct OutboxStore {
    db: sled::Db,
    tree: sled::Tree,
    ttl: chrono::Duration,
    capacity: usize,
}

impl OutboxStore {
    pub fn open(store: &LocalStore, ttl: chrono::Duration, capacity: usize) -> SiteResult<Self> {
        Ok(Self {
            db: store.db().clone(),
            tree: store.tree(OUTBOX_TREE)?,
            ttl,
            capacity: capacity.max(1),
        })
    }

    pub fn for_client(&self, client: &ClientId) -> PendingOutbox {
        PendingOutbox {
            db: self.db.clone(),
            tree: self.tree.clone(),
            prefix: client.key_prefix(),
            ttl: self.ttl,
            capacity: self.capacity,
        }
    }

    /// Drop expired or unreadable entries of every client; returns how many
    /// were removed. Outboxes of browsers that never come back would
    /// otherwise only expire on their next read.
    pub fn purge_expired(&self) -> SiteResult<usize> {
        let now = Utc::now();
        let mut removed = 0;
        for item in self.tree.iter() {
            let (key, bytes) = item?;
            let expired = serde_json::from_slice::<PendingEdit>(&bytes)
                .map(|e| now - e.recorded_at > self.ttl)
                .unwrap_or(true);
            if expired {
                self.tree.remove(key)?;
                removed += 1;
            }
        }
        if removed > 0 {
            self.tree.flush()?;
            info!(removed, "purged expired pending edits");
        }
        Ok(removed)
    }
}

/// One browser's pending edits.
#[derive(Clone)]
pub struct PendingOutbox {
    db: sled::Db,
    tree: sled::Tree,
    prefix: String,
    ttl: chrono::Duration,
    capacity: usize,
}

impl PendingOutbox {
    fn key(&self, field: &str) -> String {
        format!("{}{}", self.prefix, field)
    }

    pub fn record(&self, field: &str, value: &str) -> SiteResult<PendingEdit> {
        self.record_at(field, value, Utc::now())
    }

    /// Stash `value` for `field`, replacing any earlier pending value of the
    /// same field.
    pub fn record_at(&self, field: &str, value: &str, now: DateTime<Utc>) -> SiteResult<PendingEdit> {
        let edit = PendingEdit {
            field: field.to_string(),
            value: value.to_string(),
            recorded_at: now,
            version: self.db.generate_id()?,
        };
        self.tree.insert(self.key(field), serde_json::to_vec(&edit)?)?;
        self.enforce_capacity()?;
        self.tree.flush()?;
        debug!(field, version = edit.version, "recorded pending edit");
        Ok(edit)
    }

    fn enforce_capacity(&self) -> SiteResult<()> {
        let mut entries = self.read_all()?;
        if entries.len() <= self.capacity {
            return Ok(());
        }
        entries.sort_by(|a, b| {
            a.recorded_at
                .cmp(&b.recorded_at)
                .then(a.version.cmp(&b.version))
        });
        let excess = entries.len().saturating_sub(self.capacity);
        for edit in entries.into_iter().take(excess) {
            warn!(field = %edit.field, "pending edit evicted, outbox full");
            self.tree.remove(self.key(&edit.field))?;
        }
        Ok(())
    }

    /// Every stored entry, dropping any that no longer decode.
    fn read_all(&self) -> SiteResult<Vec<PendingEdit>> {
        let mut out = Vec::new();
        for item in self.tree.scan_prefix(self.prefix.as_bytes()) {
            let (key, bytes) = item?;
            match serde_json::from_slice::<PendingEdit>(&bytes) {
                Ok(edit) => out.push(edit),
                Err(e) => {
                    warn!(error = %e, "dropping unreadable pending edit");
                    self.tree.remove(key)?;
                }
            }
        }
        Ok(out)
    }

    pub fn entries(&self) -> SiteResult<Vec<PendingEdit>> {
        self.entries_at(Utc::now())
    }

    /// Live entries, oldest first. Entries past the TTL are evicted.
    pub fn entries_at(&self, now: DateTime<Utc>) -> SiteResult<Vec<PendingEdit>> {
        let mut live = Vec::new();
        for edit in self.read_all()? {
            if now - edit.recorded_at > self.ttl {
                debug!(field = %edit.field, "pending edit expired");
                self.tree.remove(self.key(&edit.field))?;
            } else {
                live.push(edit);
            }
        }
        live.sort_by(|a, b| a.recorded_at.cmp(&b.recorded_at).then(a.version.cmp(&b.version)));
        Ok(live)
    }

    /// The outbox as a field -> value patch to lay over remote settings.
    pub fn pending_patch(&self) -> SiteResult<BTreeMap<String, String>> {
        Ok(self
            .entries()?
            .into_iter()
            .map(|e| (e.field, e.value))
            .collect())
    }

    pub fn is_empty(&self) -> SiteResult<bool> {
        Ok(self.entries()?.is_empty())
    }

    /// Forget the pending value of `field` after it was written remotely.
    pub fn clear(&self, field: &str) -> SiteResult<()> {
        self.tree.remove(self.key(field))?;
        Ok(())
    }

    /// Remove `field` only if it still holds `version`; a newer local edit
    /// recorded while the older one was being synced survives.
    pub fn clear_synced(&self, field: &str, version: u64) -> SiteResult<bool> {
        let key = self.key(field);
        let current = match self.tree.get(&key)? {
            Some(bytes) => bytes,
            None => return Ok(false),
        };
        let matches = serde_json::from_slice::<PendingEdit>(&current)
            .map(|e| e.version == version)
            .unwrap_or(false);
        if !matches {
            return Ok(false);
        }
        let swapped = self
            .tree
            .compare_and_swap(key, Some(current), None as Option<&[u8]>)?;
        Ok(swapped.is_ok())
    }

    /// Drop one pending edit without syncing it.
    pub fn discard(&self, field: &str) -> SiteResult<bool> {
        Ok(self.tree.remove(self.key(field))?.is_some())
    }

    pub fn discard_all(&self) -> SiteResult<usize> {
        let mut count = 0;
        for item in self.tree.scan_prefix(self.prefix.as_bytes()) {
            let (key, _) = item?;
            self.tree.remove(key)?;
            count += 1;
        }
        self.tree.flush()?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(capacity: usize) -> OutboxStore {
        OutboxStore::open(&LocalStore::temporary().unwrap(), chrono::Duration::days(30), capacity).unwrap()
    }

    fn outbox(capacity: usize) -> PendingOutbox {
        store(capacity).for_client(&ClientId::generate())
    }

    #[test]
    fn test_distinct_fields_accumulate() {
        let outbox = outbox(32);
        outbox.record("tagline", "Cleaning orbit").unwrap();
        outbox.record("about", "Student team").unwrap();

        let patch = outbox.pending_patch().unwrap();
        assert_eq!(patch.len(), 2);
        assert_eq!(patch["tagline"], "Cleaning orbit");
        assert_eq!(patch["about"], "Student team");
    }

    #[test]
    fn test_same_field_overwrites() {
        let outbox = outbox(32);
        let first = outbox.record("heroDesc", "first draft").unwrap();
        let second = outbox.record("heroDesc", "second draft").unwrap();
        assert!(second.version > first.version);

        let entries = outbox.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].value, "second draft");
    }

    #[test]
    fn test_clients_do_not_see_each_other() {
        let store = store(32);
        let a = store.for_client(&ClientId::generate());
        let b = store.for_client(&ClientId::generate());

        a.record("tagline", "from a").unwrap();
        b.record("about", "from b").unwrap();

        assert_eq!(a.pending_patch().unwrap().keys().collect::<Vec<_>>(), vec!["tagline"]);
        assert_eq!(b.pending_patch().unwrap().keys().collect::<Vec<_>>(), vec!["about"]);
        assert!(!b.discard("tagline").unwrap());

        assert_eq!(a.discard_all().unwrap(), 1);
        assert_eq!(b.pending_patch().unwrap()["about"], "from b");
    }

    #[test]
    fn test_expired_entries_are_evicted() {
        let outbox = outbox(32);
        let now = Utc::now();
        outbox
            .record_at("tagline", "stale", now - chrono::Duration::days(31))
            .unwrap();
        outbox.record_at("about", "fresh", now).unwrap();

        let entries = outbox.entries_at(now).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].field, "about");
        // eviction is persistent
        assert_eq!(outbox.tree.len(), 1);
    }

    #[test]
    fn test_purge_drops_expired_entries_of_every_client() {
        let store = store(32);
        let gone = store.for_client(&ClientId::generate());
        let active = store.for_client(&ClientId::generate());
        gone.record_at("tagline", "old", Utc::now() - chrono::Duration::days(40))
            .unwrap();
        active.record("about", "recent").unwrap();

        assert_eq!(store.purge_expired().unwrap(), 1);
        assert_eq!(store.tree.len(), 1);
        assert_eq!(active.pending_patch().unwrap()["about"], "recent");
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let outbox = outbox(2);
        let now = Utc::now();
        outbox.record_at("siteTitle", "A", now - chrono::Duration::minutes(3)).unwrap();
        outbox.record_at("tagline", "B", now - chrono::Duration::minutes(2)).unwrap();
        outbox.record_at("about", "C", now - chrono::Duration::minutes(1)).unwrap();

        let patch = outbox.pending_patch().unwrap();
        assert_eq!(patch.len(), 2);
        assert!(!patch.contains_key("siteTitle"));
    }

    #[test]
    fn test_capacity_is_per_client() {
        let store = store(2);
        let a = store.for_client(&ClientId::generate());
        let b = store.for_client(&ClientId::generate());
        a.record("tagline", "1").unwrap();
        a.record("about", "2").unwrap();
        b.record("heroDesc", "3").unwrap();

        assert_eq!(a.entries().unwrap().len(), 2);
        assert_eq!(b.entries().unwrap().len(), 1);
    }

    #[test]
    fn test_re_recording_at_capacity_keeps_others() {
        let outbox = outbox(2);
        outbox.record("tagline", "B").unwrap();
        outbox.record("about", "C").unwrap();
        outbox.record("tagline", "B2").unwrap();

        let patch = outbox.pending_patch().unwrap();
        assert_eq!(patch.len(), 2);
        assert_eq!(patch["tagline"], "B2");
    }

    #[test]
    fn test_clear_synced_respects_newer_edit() {
        let outbox = outbox(32);
        let old = outbox.record("tagline", "old").unwrap();
        outbox.record("tagline", "new").unwrap();

        assert!(!outbox.clear_synced("tagline", old.version).unwrap());
        assert_eq!(outbox.pending_patch().unwrap()["tagline"], "new");

        let current = outbox.entries().unwrap()[0].version;
        assert!(outbox.clear_synced("tagline", current).unwrap());
        assert!(outbox.is_empty().unwrap());
    }

    #[test]
    fn test_discard() {
        let outbox = outbox(32);
        outbox.record("tagline", "x").unwrap();
        outbox.record("about", "y").unwrap();

        assert!(outbox.discard("tagline").unwrap());
        assert!(!outbox.discard("tagline").unwrap());
        assert_eq!(outbox.discard_all().unwrap(), 1);
        assert!(outbox.is_empty().unwrap());
    }

    #[test]
    fn test_unreadable_entries_are_dropped() {
        let outbox = outbox(32);
        outbox.tree.insert(outbox.key("tagline"), "not json").unwrap();
        outbox.record("about", "y").unwrap();

        let entries = outbox.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(outbox.tree.len(), 1);
    }
}
