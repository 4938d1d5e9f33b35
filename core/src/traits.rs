/// Collaborator traits for the Quill workflow core.
///
/// Everything the engine and the queues need from the outside world is
/// reached through one of these traits: persistence, configuration lookup,
/// full-text indexing and caller identity.
use crate::content::{ContainerRef, ContentItem};
use crate::errors::{IdentityError, IndexResult, StoreResult};
use crate::identity::User;
use crate::index_queue::{EntityType, IndexQueueEntry};
use crate::job_queue::{ActionConfiguration, JobQueueEntry, JobStatus};
use crate::workflow::WorkflowDefinition;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// ContentStore trait - persistence of content items.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Insert a new item. The store assigns the id and sets version 0.
    async fn create(&self, item: &ContentItem) -> StoreResult<ContentItem>;

    /// Replace an item, failing with `VersionConflict` when the stored
    /// version no longer matches `item.version`. Returns the item with its
    /// version incremented.
    async fn update(&self, item: &ContentItem) -> StoreResult<ContentItem>;

    /// Delete an item by id.
    async fn delete(&self, id: &Uuid) -> StoreResult<()>;

    /// Load an item by id (`NotFound` if absent).
    async fn find_by_id(&self, id: &Uuid) -> StoreResult<ContentItem>;

    /// Items currently in `state`, optionally restricted to one container.
    async fn find_by_state(
        &self,
        container: Option<&ContainerRef>,
        state: &str,
    ) -> StoreResult<Vec<ContentItem>>;
}

/// JobQueueStore trait - persistence of plugin job queue entries.
#[async_trait]
pub trait JobQueueStore: Send + Sync {
    async fn insert(&self, entry: &JobQueueEntry) -> StoreResult<()>;

    /// All entries, ordered by execution time (earliest first).
    async fn list_by_execution_time(&self) -> StoreResult<Vec<JobQueueEntry>>;

    async fn find_by_id(&self, id: &Uuid) -> StoreResult<JobQueueEntry>;

    /// Overwrite an entry.
    async fn update(&self, entry: &JobQueueEntry) -> StoreResult<()>;

    /// Atomically move an entry to `to` if its status is one of `from`,
    /// optionally stamping `started`. Returns whether the transition applied.
    async fn transition_status(
        &self,
        id: &Uuid,
        from: &[JobStatus],
        to: JobStatus,
        started: Option<DateTime<Utc>>,
    ) -> StoreResult<bool>;

    async fn delete(&self, id: &Uuid) -> StoreResult<()>;

    /// Delete every COMPLETED entry, returning how many were removed.
    async fn delete_completed(&self) -> StoreResult<usize>;
}

/// IndexQueueStore trait - persistence of pending search-index updates.
#[async_trait]
pub trait IndexQueueStore: Send + Sync {
    /// Insert `entry` unless an entry with the same entity type, entity id
    /// and operation exists, in which case the existing entry is returned.
    /// Inserting drops any pending entry with the opposite operation for the
    /// same entity.
    async fn insert_if_absent(&self, entry: IndexQueueEntry) -> StoreResult<IndexQueueEntry>;

    async fn list(&self) -> StoreResult<Vec<IndexQueueEntry>>;

    /// Remove an entry. Returns false if it was already gone.
    async fn remove(&self, id: &Uuid) -> StoreResult<bool>;
}

/// Source of configured plugin actions.
#[async_trait]
pub trait ActionConfigSource: Send + Sync {
    async fn find_action_configuration(&self, id: &str) -> StoreResult<ActionConfiguration>;
}

/// Resolves the workflow owned by an outlet or catalogue.
#[async_trait]
pub trait WorkflowDirectory: Send + Sync {
    async fn workflow_for(
        &self,
        container: &ContainerRef,
    ) -> StoreResult<Option<Arc<WorkflowDefinition>>>;
}

/// Full-text search engine.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// (Re)index an entity. `IndexError::NotFound` means the entity is gone.
    async fn index_document(&self, entity_type: EntityType, id: &Uuid) -> IndexResult<()>;

    async fn delete_document(&self, id: &Uuid) -> IndexResult<()>;
}

/// Resolves the user on whose behalf an operation runs.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn current_user(&self) -> Result<User, IdentityError>;
}
