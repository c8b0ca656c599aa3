//! The local snapshot document
//!
//! One `SnapshotDocument` exists per profile and is the sole source of truth
//! for rendering. It holds every collection plus the sync metadata the engine
//! needs: the time of the last locally-originated write per collection (the
//! echo guard reads this) and the fingerprint of the data last successfully
//! pushed (the no-op push gate reads this).
//!
//! The record-level merge lives here too, as a standalone function, so the
//! policy can be tested without any I/O.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::{Category, Collection, Record};

/// Sync metadata carried alongside the collections
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// Most recent locally-originated write, per collection
    #[serde(default)]
    pub last_local_write_at: HashMap<Collection, DateTime<Utc>>,
    /// Fingerprint of the data last successfully pushed and acknowledged
    #[serde(default)]
    pub last_synced_hash: Option<String>,
    /// When that push completed
    #[serde(default)]
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// The full local state: every collection plus sync metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDocument {
    #[serde(default)]
    pub categories: Vec<Record>,
    #[serde(default)]
    pub tasks: Vec<Record>,
    #[serde(default)]
    pub boards: Vec<Record>,
    #[serde(default)]
    pub meta: SnapshotMeta,
}

/// The user-visible portion of a snapshot, used for export/import and the
/// sign-out backup. Sync metadata is deliberately not portable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortableSnapshot {
    #[serde(default)]
    pub categories: Vec<Record>,
    #[serde(default)]
    pub tasks: Vec<Record>,
    #[serde(default)]
    pub boards: Vec<Record>,
}

impl From<&SnapshotDocument> for PortableSnapshot {
    fn from(doc: &SnapshotDocument) -> Self {
        Self {
            categories: doc.categories.clone(),
            tasks: doc.tasks.clone(),
            boards: doc.boards.clone(),
        }
    }
}

impl SnapshotDocument {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a snapshot seeded with the default categories
    pub fn with_default_categories() -> Result<Self, serde_json::Error> {
        let mut doc = Self::new();
        for category in Category::default_set() {
            doc.categories.push(Record::from_model(&category)?);
        }
        Ok(doc)
    }

    /// Records of one collection
    pub fn collection(&self, collection: Collection) -> &[Record] {
        match collection {
            Collection::Categories => &self.categories,
            Collection::Tasks => &self.tasks,
            Collection::Boards => &self.boards,
        }
    }

    /// Mutable records of one collection
    pub fn collection_mut(&mut self, collection: Collection) -> &mut Vec<Record> {
        match collection {
            Collection::Categories => &mut self.categories,
            Collection::Tasks => &mut self.tasks,
            Collection::Boards => &mut self.boards,
        }
    }

    /// Replace one collection wholesale
    pub fn set_collection(&mut self, collection: Collection, records: Vec<Record>) {
        *self.collection_mut(collection) = records;
    }

    /// Merge remote records into one collection using the record-level policy
    pub fn merge_collection(&mut self, collection: Collection, remote: Vec<Record>) {
        let merged = merge_records(self.collection(collection), &remote);
        self.set_collection(collection, merged);
    }

    /// Record that a locally-originated write touched this collection
    pub fn mark_local_write(&mut self, collection: Collection, at: DateTime<Utc>) {
        self.meta.last_local_write_at.insert(collection, at);
    }

    /// Time of the most recent locally-originated write to this collection
    pub fn last_local_write_at(&self, collection: Collection) -> Option<DateTime<Utc>> {
        self.meta.last_local_write_at.get(&collection).copied()
    }

    /// Content fingerprint over the collections (not the metadata), used to
    /// skip pushes when nothing changed since the last acknowledged one.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for collection in Collection::ALL {
            hasher.update(collection.as_str().as_bytes());
            serde_json::to_writer(&mut hasher, self.collection(collection))
                .expect("collections are always JSON-serializable");
        }
        hex::encode(hasher.finalize())
    }
}

/// Merge two record sequences keyed by `id`.
///
/// The cloud sequence is the base. A local record with no cloud counterpart
/// is kept. When both sides carry the same id, the local record wins ties and
/// greater-or-equal `updatedAt` stamps; the cloud record wins only a strictly
/// greater stamp. A missing stamp compares as the epoch. Records without an
/// id are skipped on both sides. Output order is cloud order followed by
/// new-local records; consumers needing a display order re-derive it from
/// record fields.
pub fn merge_records(local: &[Record], cloud: &[Record]) -> Vec<Record> {
    let mut merged: Vec<Record> = Vec::with_capacity(cloud.len() + local.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in cloud {
        let Some(id) = record.id() else { continue };
        index.insert(id.to_string(), merged.len());
        merged.push(record.clone());
    }

    for record in local {
        let Some(id) = record.id() else { continue };
        match index.get(id) {
            None => merged.push(record.clone()),
            Some(&slot) => {
                if record.updated_at_or_epoch() >= merged[slot].updated_at_or_epoch() {
                    merged[slot] = record.clone();
                }
            }
        }
    }

    merged
}
