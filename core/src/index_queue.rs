/// Search-index queue: pending index updates for content mutations,
/// coalesced per (entity type, id, operation) and drained against a
/// [`SearchIndex`].
use crate::content::ContentItem;
use crate::errors::{IndexError, IndexResult};
use crate::traits::{IndexQueueStore, SearchIndex};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Kind of entity held in the search index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Article,
    Media,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Article => "article",
            EntityType::Media => "media",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "article" => Ok(EntityType::Article),
            "media" => Ok(EntityType::Media),
            _ => Err(format!("Invalid entity type: {}", s)),
        }
    }
}

/// What to do with the entity in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexOperation {
    Update,
    Remove,
}

impl IndexOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexOperation::Update => "update",
            IndexOperation::Remove => "remove",
        }
    }
}

impl fmt::Display for IndexOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "update" => Ok(IndexOperation::Update),
            "remove" => Ok(IndexOperation::Remove),
            _ => Err(format!("Invalid index operation: {}", s)),
        }
    }
}

/// A pending index update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexQueueEntry {
    pub id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub operation: IndexOperation,
    pub added: DateTime<Utc>,
}

impl IndexQueueEntry {
    pub fn new(entity_type: EntityType, entity_id: Uuid, operation: IndexOperation) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_type,
            entity_id,
            operation,
            added: Utc::now(),
        }
    }

    /// Whether both entries describe the same pending work.
    pub fn same_target(&self, other: &IndexQueueEntry) -> bool {
        self.entity_type == other.entity_type
            && self.entity_id == other.entity_id
            && self.operation == other.operation
    }

    /// Whether this entry makes `other` obsolete: same entity, opposite
    /// operation.
    pub fn supersedes(&self, other: &IndexQueueEntry) -> bool {
        self.entity_type == other.entity_type
            && self.entity_id == other.entity_id
            && self.operation != other.operation
    }
}

/// Index operation matching an item's current content.
///
/// Media that is not approved must not be searchable, so it is removed.
pub fn index_operation_for(item: &ContentItem) -> IndexOperation {
    match item.entity_type() {
        EntityType::Article => IndexOperation::Update,
        EntityType::Media if item.is_approved_media() => IndexOperation::Update,
        EntityType::Media => IndexOperation::Remove,
    }
}

/// Outcome of one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexDrainReport {
    pub indexed: usize,
    pub removed: usize,
    pub skipped_missing: usize,
    pub failed: usize,
}

impl IndexDrainReport {
    pub fn processed(&self) -> usize {
        self.indexed + self.removed + self.skipped_missing + self.failed
    }
}

/// Queue of pending search-index updates.
pub struct IndexQueue {
    store: Arc<dyn IndexQueueStore>,
    index: Arc<dyn SearchIndex>,
    drain_lock: Mutex<()>,
}

impl IndexQueue {
    pub fn new(store: Arc<dyn IndexQueueStore>, index: Arc<dyn SearchIndex>) -> Self {
        Self {
            store,
            index,
            drain_lock: Mutex::new(()),
        }
    }

    /// Queue an index update. An identical pending entry is returned
    /// instead of inserting a second one, and a pending entry with the
    /// opposite operation for the same entity is dropped.
    pub async fn enqueue(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
        operation: IndexOperation,
    ) -> IndexResult<IndexQueueEntry> {
        let entry = self
            .store
            .insert_if_absent(IndexQueueEntry::new(entity_type, entity_id, operation))
            .await?;
        debug!(
            "Queued index {} for {} {}",
            entry.operation, entry.entity_type, entry.entity_id
        );
        Ok(entry)
    }

    /// Queue the operation matching `item`. Items that were never persisted
    /// have nothing to index.
    pub async fn enqueue_item(&self, item: &ContentItem) -> IndexResult<Option<IndexQueueEntry>> {
        match item.id {
            Some(id) => Ok(Some(
                self.enqueue(item.entity_type(), id, index_operation_for(item))
                    .await?,
            )),
            None => Ok(None),
        }
    }

    /// Process every pending entry once, oldest first. Each entity has at
    /// most one pending operation, the one queued last.
    ///
    /// Entries that fail stay queued for the next drain.
    pub async fn drain(&self) -> IndexResult<IndexDrainReport> {
        let _guard = self.drain_lock.lock().await;

        let mut entries = self.store.list().await?;
        entries.sort_by(|a, b| a.added.cmp(&b.added));

        let mut report = IndexDrainReport::default();
        for entry in entries {
            match entry.operation {
                IndexOperation::Remove => match self.index.delete_document(&entry.entity_id).await {
                    Ok(()) => {
                        if self.dequeue(&entry).await {
                            report.removed += 1;
                        } else {
                            report.failed += 1;
                        }
                    }
                    Err(e) => {
                        error!(
                            "Failed to remove {} {} from index: {}",
                            entry.entity_type, entry.entity_id, e
                        );
                        report.failed += 1;
                    }
                },
                IndexOperation::Update => {
                    match self
                        .index
                        .index_document(entry.entity_type, &entry.entity_id)
                        .await
                    {
                        Ok(()) => {
                            if self.dequeue(&entry).await {
                                report.indexed += 1;
                            } else {
                                report.failed += 1;
                            }
                        }
                        Err(IndexError::NotFound(msg)) => {
                            warn!(
                                "{} {} no longer exists, dropping index update: {}",
                                entry.entity_type, entry.entity_id, msg
                            );
                            self.dequeue(&entry).await;
                            report.skipped_missing += 1;
                        }
                        Err(e) => {
                            error!(
                                "Failed to index {} {}: {}",
                                entry.entity_type, entry.entity_id, e
                            );
                            report.failed += 1;
                        }
                    }
                }
            }
        }

        if report.processed() > 0 {
            info!(
                "Index queue drained: {} indexed, {} removed, {} missing, {} failed",
                report.indexed, report.removed, report.skipped_missing, report.failed
            );
        }
        Ok(report)
    }

    /// Pending entries, newest first.
    pub async fn entries(&self) -> IndexResult<Vec<IndexQueueEntry>> {
        let mut entries = self.store.list().await?;
        entries.sort_by(|a, b| b.added.cmp(&a.added));
        Ok(entries)
    }

    /// Drop a pending entry without processing it.
    pub async fn remove(&self, id: &Uuid) -> IndexResult<bool> {
        Ok(self.store.remove(id).await?)
    }

    async fn dequeue(&self, entry: &IndexQueueEntry) -> bool {
        match self.store.remove(&entry.id).await {
            Ok(_) => true,
            Err(e) => {
                error!("Failed to dequeue index entry {}: {}", entry.id, e);
                false
            }
        }
    }
}
