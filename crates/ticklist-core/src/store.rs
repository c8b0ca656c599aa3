//! Local snapshot persistence
//!
//! The `SnapshotStore` owns the on-disk copy of the snapshot document. It is
//! mutated from two directions: application edits (which stamp the local
//! write time the echo guard depends on) and sync results (which do not).
//! Every mutation persists synchronously, so the next read always sees it.
//!
//! Uses atomic writes (write to temp file, then rename) to prevent
//! corruption. Alongside the snapshot a legacy `tasks.json` mirror of the
//! tasks collection is written for older readers.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::Config;
use crate::error::{StoreError, StoreResult};
use crate::models::{Category, Collection, Record, Task};
use crate::snapshot::{PortableSnapshot, SnapshotDocument};

/// Store handle shared between the application and the sync engine
pub type SharedStore = Arc<Mutex<SnapshotStore>>;

/// A timestamped copy of the snapshot, written at sign-out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupDocument {
    pub snapshot: PortableSnapshot,
    pub timestamp: DateTime<Utc>,
}

/// Durable local store for the snapshot document
pub struct SnapshotStore {
    config: Config,
    snapshot: SnapshotDocument,
}

impl SnapshotStore {
    /// Open the store, creating and seeding a snapshot if none exists
    ///
    /// On first run the snapshot is seeded with the default categories and
    /// persisted immediately. An existing snapshot that somehow lost all its
    /// categories is re-seeded the same way.
    pub fn open(config: Config) -> StoreResult<Self> {
        let path = config.snapshot_path();

        let snapshot = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|source| StoreError::Read {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&content).map_err(|source| StoreError::MalformedSnapshot {
                path: path.clone(),
                source,
            })?
        } else {
            SnapshotDocument::new()
        };

        let mut store = Self { config, snapshot };

        if store.snapshot.categories.is_empty() {
            let seeded = SnapshotDocument::with_default_categories()
                .map_err(|source| StoreError::Encode { source })?;
            store.snapshot.categories = seeded.categories;
            store.save()?;
            debug!("seeded snapshot with default categories");
        } else if !path.exists() {
            store.save()?;
        }

        Ok(store)
    }

    /// Wrap a freshly opened store for sharing
    pub fn open_shared(config: Config) -> StoreResult<SharedStore> {
        Ok(Arc::new(Mutex::new(Self::open(config)?)))
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The current snapshot document
    pub fn snapshot(&self) -> &SnapshotDocument {
        &self.snapshot
    }

    /// Mutable access to the snapshot document
    ///
    /// After modifying, call `save()` to persist changes.
    pub fn snapshot_mut(&mut self) -> &mut SnapshotDocument {
        &mut self.snapshot
    }

    /// Content fingerprint of the current snapshot
    pub fn fingerprint(&self) -> String {
        self.snapshot.fingerprint()
    }

    /// Persist the snapshot and the legacy tasks mirror
    pub fn save(&self) -> StoreResult<()> {
        let json = serde_json::to_vec_pretty(&self.snapshot)
            .map_err(|source| StoreError::Encode { source })?;
        atomic_write(&self.config.snapshot_path(), &json)?;

        let tasks = serde_json::to_vec_pretty(&self.snapshot.tasks)
            .map_err(|source| StoreError::Encode { source })?;
        atomic_write(&self.config.legacy_tasks_path(), &tasks)?;

        Ok(())
    }

    // ==================== Local mutations ====================

    /// Insert or replace a record by id, stamping it as a local write
    ///
    /// A record without an id is assigned one; a record without an
    /// `updatedAt` stamp is given the write time.
    pub fn upsert_record(&mut self, collection: Collection, mut record: Record) -> StoreResult<()> {
        let now = Utc::now();
        let id = record.ensure_id();
        if record.updated_at().is_none() {
            record.touch(now);
        }

        let records = self.snapshot.collection_mut(collection);
        match records.iter_mut().find(|r| r.id() == Some(id.as_str())) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }

        self.snapshot.mark_local_write(collection, now);
        self.save()
    }

    /// Remove a record by id; returns whether anything was removed
    pub fn remove_record(&mut self, collection: Collection, id: &str) -> StoreResult<bool> {
        let records = self.snapshot.collection_mut(collection);
        let before = records.len();
        records.retain(|r| r.id() != Some(id));
        let removed = records.len() != before;

        if removed {
            self.snapshot.mark_local_write(collection, Utc::now());
            self.save()?;
        }
        Ok(removed)
    }

    // ==================== Typed helpers ====================

    /// All categories that deserialize cleanly
    pub fn categories(&self) -> Vec<Category> {
        self.snapshot
            .categories
            .iter()
            .filter_map(|r| r.to_model().ok())
            .collect()
    }

    /// All tasks that deserialize cleanly
    pub fn tasks(&self) -> Vec<Task> {
        self.snapshot
            .tasks
            .iter()
            .filter_map(|r| r.to_model().ok())
            .collect()
    }

    /// Look up a task by id
    pub fn task(&self, id: &str) -> Option<Task> {
        self.snapshot
            .tasks
            .iter()
            .find(|r| r.id() == Some(id))
            .and_then(|r| r.to_model().ok())
    }

    /// Insert or replace a task
    pub fn upsert_task(&mut self, task: &Task) -> StoreResult<()> {
        let record = Record::from_model(task).map_err(|source| StoreError::Encode { source })?;
        self.upsert_record(Collection::Tasks, record)
    }

    /// Insert or replace a category
    pub fn upsert_category(&mut self, category: &Category) -> StoreResult<()> {
        let record =
            Record::from_model(category).map_err(|source| StoreError::Encode { source })?;
        self.upsert_record(Collection::Categories, record)
    }

    /// Remove a category and every task that belonged to it
    pub fn remove_category(&mut self, id: &str) -> StoreResult<bool> {
        let removed = {
            let categories = self.snapshot.collection_mut(Collection::Categories);
            let before = categories.len();
            categories.retain(|r| r.id() != Some(id));
            categories.len() != before
        };

        if removed {
            let now = Utc::now();
            self.snapshot
                .collection_mut(Collection::Tasks)
                .retain(|r| r.get("categoryId").and_then(|v| v.as_str()) != Some(id));
            self.snapshot.mark_local_write(Collection::Categories, now);
            self.snapshot.mark_local_write(Collection::Tasks, now);
            self.save()?;
        }
        Ok(removed)
    }

    // ==================== Remote-origin applications ====================

    /// Replace one collection with the authoritative remote copy
    ///
    /// Used by the initial pull-merge. Does not count as a local write.
    pub fn replace_from_remote(
        &mut self,
        collection: Collection,
        records: Vec<Record>,
    ) -> StoreResult<()> {
        self.snapshot.set_collection(collection, records);
        self.save()
    }

    /// Merge remote records into one collection by the record-level policy
    ///
    /// Used by the change-notification handler. Does not count as a local
    /// write.
    pub fn merge_from_remote(
        &mut self,
        collection: Collection,
        records: Vec<Record>,
    ) -> StoreResult<()> {
        self.snapshot.merge_collection(collection, records);
        self.save()
    }

    /// Record an acknowledged push: fingerprint and completion time
    pub fn record_push(&mut self, fingerprint: String, at: DateTime<Utc>) -> StoreResult<()> {
        self.snapshot.meta.last_synced_hash = Some(fingerprint);
        self.snapshot.meta.last_synced_at = Some(at);
        self.save()
    }

    // ==================== Backup / restore ====================

    /// Export the user-visible snapshot as pretty-printed JSON
    pub fn export_json(&self) -> StoreResult<String> {
        let portable = PortableSnapshot::from(&self.snapshot);
        serde_json::to_string_pretty(&portable).map_err(|source| StoreError::Encode { source })
    }

    /// Replace local state with an exported document
    ///
    /// The input is parsed in full before anything is touched; a malformed
    /// document fails the whole import and leaves local state unchanged.
    pub fn import_json(&mut self, input: &str) -> StoreResult<()> {
        let portable: PortableSnapshot =
            serde_json::from_str(input).map_err(|source| StoreError::MalformedImport { source })?;

        let now = Utc::now();
        self.snapshot.set_collection(Collection::Categories, portable.categories);
        self.snapshot.set_collection(Collection::Tasks, portable.tasks);
        self.snapshot.set_collection(Collection::Boards, portable.boards);
        for collection in Collection::ALL {
            self.snapshot.mark_local_write(collection, now);
        }
        self.save()
    }

    /// Write a timestamped backup of the snapshot to its own slot
    pub fn write_backup(&self, at: DateTime<Utc>) -> StoreResult<PathBuf> {
        let backup = BackupDocument {
            snapshot: PortableSnapshot::from(&self.snapshot),
            timestamp: at,
        };
        let json =
            serde_json::to_vec_pretty(&backup).map_err(|source| StoreError::Encode { source })?;
        let path = self.config.backup_path(&at);
        atomic_write(&path, &json)?;
        Ok(path)
    }
}

/// Write data to a file atomically
///
/// 1. Write to a temporary file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
///
/// This ensures the target file is never left in a partially-written state.
fn atomic_write(path: &Path, data: &[u8]) -> StoreResult<()> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StoreError::CreateDirectory {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    // Create temp file in the same directory (for atomic rename)
    let temp_path = path.with_extension("tmp");

    let mut file = File::create(&temp_path).map_err(|source| StoreError::Write {
        path: temp_path.clone(),
        source,
    })?;

    file.write_all(data).map_err(|source| StoreError::Write {
        path: temp_path.clone(),
        source,
    })?;

    // Sync to disk before rename
    file.sync_all().map_err(|source| StoreError::Write {
        path: temp_path.clone(),
        source,
    })?;

    // Atomic rename
    fs::rename(&temp_path, path).map_err(|source| StoreError::AtomicWrite {
        from: temp_path,
        to: path.to_path_buf(),
        source,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn test_config(temp_dir: &TempDir) -> Config {
        Config {
            data_dir: temp_dir.path().to_path_buf(),
            ..Config::default()
        }
    }

    #[test]
    fn test_open_seeds_and_persists() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);

        let store = SnapshotStore::open(config.clone()).unwrap();
        assert_eq!(store.categories().len(), 4);
        assert!(config.snapshot_path().exists());
        assert!(config.legacy_tasks_path().exists());
    }

    #[test]
    fn test_data_persists_across_reopens() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);

        {
            let mut store = SnapshotStore::open(config.clone()).unwrap();
            let task = Task::new("Buy milk", "home");
            store.upsert_task(&task).unwrap();
        }

        let store = SnapshotStore::open(config).unwrap();
        let tasks = store.tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "Buy milk");
    }

    #[test]
    fn test_malformed_snapshot_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);

        fs::write(config.snapshot_path(), "{not json").unwrap();

        let result = SnapshotStore::open(config);
        assert!(matches!(
            result,
            Err(StoreError::MalformedSnapshot { .. })
        ));
    }

    #[test]
    fn test_upsert_marks_local_write() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = SnapshotStore::open(test_config(&temp_dir)).unwrap();

        assert!(store
            .snapshot()
            .last_local_write_at(Collection::Tasks)
            .is_none());

        store.upsert_task(&Task::new("Buy milk", "home")).unwrap();
        assert!(store
            .snapshot()
            .last_local_write_at(Collection::Tasks)
            .is_some());
    }

    #[test]
    fn test_upsert_assigns_id_and_stamp() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = SnapshotStore::open(test_config(&temp_dir)).unwrap();

        let record = Record::from_value(json!({"title": "bare"})).unwrap();
        store.upsert_record(Collection::Tasks, record).unwrap();

        let records = store.snapshot().collection(Collection::Tasks);
        assert_eq!(records.len(), 1);
        assert!(records[0].id().is_some());
        assert!(records[0].updated_at().is_some());
    }

    #[test]
    fn test_upsert_replaces_by_id() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = SnapshotStore::open(test_config(&temp_dir)).unwrap();

        let mut task = Task::new("Draft", "work");
        store.upsert_task(&task).unwrap();

        task.set_title("Final");
        store.upsert_task(&task).unwrap();

        let tasks = store.tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "Final");
    }

    #[test]
    fn test_remove_record() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = SnapshotStore::open(test_config(&temp_dir)).unwrap();

        let task = Task::new("Temp", "work");
        store.upsert_task(&task).unwrap();

        assert!(store.remove_record(Collection::Tasks, &task.id).unwrap());
        assert!(store.tasks().is_empty());
        assert!(!store.remove_record(Collection::Tasks, &task.id).unwrap());
    }

    #[test]
    fn test_remove_category_drops_its_tasks() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = SnapshotStore::open(test_config(&temp_dir)).unwrap();

        store.upsert_task(&Task::new("In work", "work")).unwrap();
        store.upsert_task(&Task::new("At home", "home")).unwrap();

        assert!(store.remove_category("work").unwrap());
        assert_eq!(store.categories().len(), 3);

        let tasks = store.tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].category_id, "home");
    }

    #[test]
    fn test_replace_from_remote_is_not_a_local_write() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = SnapshotStore::open(test_config(&temp_dir)).unwrap();

        let remote = vec![Record::from_value(json!({"id": "r-1"})).unwrap()];
        store.replace_from_remote(Collection::Tasks, remote).unwrap();

        assert_eq!(store.snapshot().collection(Collection::Tasks).len(), 1);
        assert!(store
            .snapshot()
            .last_local_write_at(Collection::Tasks)
            .is_none());
    }

    #[test]
    fn test_legacy_mirror_tracks_tasks() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);
        let mut store = SnapshotStore::open(config.clone()).unwrap();

        store.upsert_task(&Task::new("Mirrored", "home")).unwrap();

        let mirror = fs::read_to_string(config.legacy_tasks_path()).unwrap();
        let records: Vec<Record> = serde_json::from_str(&mirror).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].get("title").and_then(|v| v.as_str()),
            Some("Mirrored")
        );
    }

    #[test]
    fn test_export_import_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = SnapshotStore::open(test_config(&temp_dir)).unwrap();
        store.upsert_task(&Task::new("Exported", "home")).unwrap();

        let exported = store.export_json().unwrap();
        assert!(exported.contains("Exported"));

        let temp_dir2 = TempDir::new().unwrap();
        let mut other = SnapshotStore::open(test_config(&temp_dir2)).unwrap();
        other.import_json(&exported).unwrap();

        assert_eq!(other.tasks().len(), 1);
        assert_eq!(other.tasks()[0].title, "Exported");
        // Import fully replaces, including the category seed
        assert_eq!(other.categories().len(), 4);
    }

    #[test]
    fn test_import_failure_leaves_state_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = SnapshotStore::open(test_config(&temp_dir)).unwrap();
        store.upsert_task(&Task::new("Keep me", "home")).unwrap();

        let result = store.import_json("{broken");
        assert!(matches!(result, Err(StoreError::MalformedImport { .. })));
        assert_eq!(store.tasks().len(), 1);
        assert_eq!(store.tasks()[0].title, "Keep me");
    }

    #[test]
    fn test_import_counts_as_local_write() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = SnapshotStore::open(test_config(&temp_dir)).unwrap();

        store.import_json(r#"{"tasks": [{"id": "t-1"}]}"#).unwrap();
        for collection in Collection::ALL {
            assert!(store.snapshot().last_local_write_at(collection).is_some());
        }
    }

    #[test]
    fn test_write_backup() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = SnapshotStore::open(test_config(&temp_dir)).unwrap();
        store.upsert_task(&Task::new("Backed up", "home")).unwrap();

        let at = Utc::now();
        let path = store.write_backup(at).unwrap();
        assert!(path.exists());

        let backup: BackupDocument =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(backup.snapshot.tasks.len(), 1);
        assert_eq!(backup.timestamp, at);
    }

    #[test]
    fn test_record_push_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);

        let fingerprint;
        {
            let mut store = SnapshotStore::open(config.clone()).unwrap();
            fingerprint = store.fingerprint();
            store.record_push(fingerprint.clone(), Utc::now()).unwrap();
        }

        let store = SnapshotStore::open(config).unwrap();
        assert_eq!(
            store.snapshot().meta.last_synced_hash.as_deref(),
            Some(fingerprint.as_str())
        );
        assert!(store.snapshot().meta.last_synced_at.is_some());
    }
}
