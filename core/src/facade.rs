/// Content facade: the entry point for creating, editing, moving and
/// deleting content items.
///
/// Every mutation queues a search-index update so the index follows the
/// store without the caller having to remember it.
use crate::content::ContentItem;
use crate::errors::{ContentResult, WorkflowError};
use crate::index_queue::{IndexOperation, IndexQueue};
use crate::traits::{ContentStore, IdentityResolver};
use crate::workflow_engine::WorkflowEngine;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub struct ContentFacade {
    store: Arc<dyn ContentStore>,
    engine: Arc<WorkflowEngine>,
    index_queue: Arc<IndexQueue>,
}

impl ContentFacade {
    pub fn new(
        store: Arc<dyn ContentStore>,
        engine: Arc<WorkflowEngine>,
        index_queue: Arc<IndexQueue>,
    ) -> Self {
        Self {
            store,
            engine,
            index_queue,
        }
    }

    /// Persist a new item by starting it in its workflow.
    pub async fn create(
        &self,
        item: &ContentItem,
        identity: &dyn IdentityResolver,
    ) -> ContentResult<ContentItem> {
        let created = self.engine.start(item, identity).await?;
        self.index_queue.enqueue_item(&created).await?;
        Ok(created)
    }

    /// Save edits to fields outside the workflow (title, body, status...).
    ///
    /// Workflow state, actors and history are taken from the stored item,
    /// so this can never move an item between states.
    pub async fn update(&self, item: &ContentItem) -> ContentResult<ContentItem> {
        let id = item.id.ok_or_else(|| {
            WorkflowError::TransitionFailed("content item has not been started".to_string())
        })?;
        let stored = self.store.find_by_id(&id).await?;

        let mut edited = item.clone();
        edited.current_state = stored.current_state;
        edited.actors = stored.actors;
        edited.history = stored.history;
        edited.precalculated_current_actor = stored.precalculated_current_actor;
        edited.created = stored.created;
        edited.updated = Some(Utc::now());

        let updated = self.store.update(&edited).await?;
        self.index_queue.enqueue_item(&updated).await?;
        Ok(updated)
    }

    /// Take a workflow step.
    pub async fn step(
        &self,
        item: &ContentItem,
        step_id: &str,
        identity: &dyn IdentityResolver,
    ) -> ContentResult<ContentItem> {
        let moved = self.engine.step(item, step_id, identity).await?;
        self.index_queue.enqueue_item(&moved).await?;
        Ok(moved)
    }

    /// Delete an item and drop it from the search index.
    pub async fn delete(&self, id: &Uuid) -> ContentResult<()> {
        let item = self.store.find_by_id(id).await?;
        self.index_queue
            .enqueue(item.entity_type(), *id, IndexOperation::Remove)
            .await?;
        self.store.delete(id).await?;
        info!("Deleted {} {}", item.kind_name(), id);
        Ok(())
    }

    pub async fn find(&self, id: &Uuid) -> ContentResult<ContentItem> {
        Ok(self.store.find_by_id(id).await?)
    }

    pub fn engine(&self) -> &Arc<WorkflowEngine> {
        &self.engine
    }
}
