/// In-memory implementations of the collaborator traits.
///
/// Used by tests and by the daemon's `memory` storage backend. Version
/// checks, status compare-and-set and coalescing inserts each happen under a
/// single write lock, so they are atomic with respect to concurrent callers.
use crate::content::{ContainerRef, ContentItem};
use crate::errors::{IndexError, IndexResult, StoreError, StoreResult};
use crate::index_queue::{EntityType, IndexQueueEntry};
use crate::job_queue::{ActionConfiguration, JobQueueEntry, JobStatus};
use crate::traits::{
    ActionConfigSource, ContentStore, IndexQueueStore, JobQueueStore, SearchIndex,
    WorkflowDirectory,
};
use crate::workflow::WorkflowDefinition;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Content, job queue and index queue storage held in process memory.
#[derive(Default)]
pub struct InMemoryStore {
    content: RwLock<HashMap<Uuid, ContentItem>>,
    jobs: RwLock<HashMap<Uuid, JobQueueEntry>>,
    index_entries: RwLock<HashMap<Uuid, IndexQueueEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContentStore for InMemoryStore {
    async fn create(&self, item: &ContentItem) -> StoreResult<ContentItem> {
        let mut stored = item.clone();
        let id = Uuid::new_v4();
        stored.id = Some(id);
        stored.version = 0;
        self.content.write().insert(id, stored.clone());
        Ok(stored)
    }

    async fn update(&self, item: &ContentItem) -> StoreResult<ContentItem> {
        let id = item
            .id
            .ok_or_else(|| StoreError::NotFound("content item has no id".to_string()))?;

        let mut content = self.content.write();
        let existing = content
            .get(&id)
            .ok_or_else(|| StoreError::NotFound(format!("content item {}", id)))?;
        if existing.version != item.version {
            return Err(StoreError::VersionConflict {
                id: id.to_string(),
                expected: item.version,
                found: existing.version,
            });
        }

        let mut stored = item.clone();
        stored.version += 1;
        content.insert(id, stored.clone());
        Ok(stored)
    }

    async fn delete(&self, id: &Uuid) -> StoreResult<()> {
        self.content
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("content item {}", id)))
    }

    async fn find_by_id(&self, id: &Uuid) -> StoreResult<ContentItem> {
        self.content
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("content item {}", id)))
    }

    async fn find_by_state(
        &self,
        container: Option<&ContainerRef>,
        state: &str,
    ) -> StoreResult<Vec<ContentItem>> {
        let mut items: Vec<ContentItem> = self
            .content
            .read()
            .values()
            .filter(|item| item.current_state.as_deref() == Some(state))
            .filter(|item| container.map_or(true, |c| &item.container() == c))
            .cloned()
            .collect();
        items.sort_by_key(|item| item.created);
        Ok(items)
    }
}

#[async_trait]
impl JobQueueStore for InMemoryStore {
    async fn insert(&self, entry: &JobQueueEntry) -> StoreResult<()> {
        self.jobs.write().insert(entry.id, entry.clone());
        Ok(())
    }

    async fn list_by_execution_time(&self) -> StoreResult<Vec<JobQueueEntry>> {
        let mut entries: Vec<JobQueueEntry> = self.jobs.read().values().cloned().collect();
        entries.sort_by(|a, b| {
            a.execution_time
                .cmp(&b.execution_time)
                .then(a.added.cmp(&b.added))
        });
        Ok(entries)
    }

    async fn find_by_id(&self, id: &Uuid) -> StoreResult<JobQueueEntry> {
        self.jobs
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("job {}", id)))
    }

    async fn update(&self, entry: &JobQueueEntry) -> StoreResult<()> {
        let mut jobs = self.jobs.write();
        match jobs.get_mut(&entry.id) {
            Some(existing) => {
                *existing = entry.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("job {}", entry.id))),
        }
    }

    async fn transition_status(
        &self,
        id: &Uuid,
        from: &[JobStatus],
        to: JobStatus,
        started: Option<DateTime<Utc>>,
    ) -> StoreResult<bool> {
        let mut jobs = self.jobs.write();
        let Some(entry) = jobs.get_mut(id) else {
            return Ok(false);
        };
        if !from.contains(&entry.status) {
            return Ok(false);
        }
        entry.status = to;
        if started.is_some() {
            entry.started = started;
        }
        Ok(true)
    }

    async fn delete(&self, id: &Uuid) -> StoreResult<()> {
        self.jobs.write().remove(id);
        Ok(())
    }

    async fn delete_completed(&self) -> StoreResult<usize> {
        let mut jobs = self.jobs.write();
        let before = jobs.len();
        jobs.retain(|_, entry| entry.status != JobStatus::Completed);
        Ok(before - jobs.len())
    }
}

#[async_trait]
impl IndexQueueStore for InMemoryStore {
    async fn insert_if_absent(&self, entry: IndexQueueEntry) -> StoreResult<IndexQueueEntry> {
        let mut entries = self.index_entries.write();
        if let Some(existing) = entries.values().find(|e| e.same_target(&entry)) {
            return Ok(existing.clone());
        }
        entries.retain(|_, pending| !entry.supersedes(pending));
        entries.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn list(&self) -> StoreResult<Vec<IndexQueueEntry>> {
        Ok(self.index_entries.read().values().cloned().collect())
    }

    async fn remove(&self, id: &Uuid) -> StoreResult<bool> {
        Ok(self.index_entries.write().remove(id).is_some())
    }
}

/// Action configurations held in memory.
#[derive(Default)]
pub struct InMemoryActionCatalog {
    actions: RwLock<HashMap<String, ActionConfiguration>>,
}

impl InMemoryActionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_configs(configs: impl IntoIterator<Item = ActionConfiguration>) -> Self {
        let catalog = Self::new();
        for config in configs {
            catalog.insert(config);
        }
        catalog
    }

    pub fn insert(&self, config: ActionConfiguration) {
        self.actions.write().insert(config.id.clone(), config);
    }

    pub fn remove(&self, id: &str) -> Option<ActionConfiguration> {
        self.actions.write().remove(id)
    }

    pub fn list(&self) -> Vec<ActionConfiguration> {
        let mut actions: Vec<ActionConfiguration> =
            self.actions.read().values().cloned().collect();
        actions.sort_by(|a, b| a.id.cmp(&b.id));
        actions
    }
}

#[async_trait]
impl ActionConfigSource for InMemoryActionCatalog {
    async fn find_action_configuration(&self, id: &str) -> StoreResult<ActionConfiguration> {
        self.actions
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("action configuration {}", id)))
    }
}

/// Fixed mapping from containers to workflow definitions.
#[derive(Default)]
pub struct StaticWorkflowDirectory {
    workflows: HashMap<String, Arc<WorkflowDefinition>>,
    containers: HashMap<ContainerRef, String>,
}

impl StaticWorkflowDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workflow(mut self, definition: WorkflowDefinition) -> Self {
        self.workflows
            .insert(definition.id.clone(), Arc::new(definition));
        self
    }

    /// Make `container` use the workflow with id `workflow_id`.
    pub fn assign(mut self, container: ContainerRef, workflow_id: impl Into<String>) -> Self {
        self.containers.insert(container, workflow_id.into());
        self
    }

    pub fn workflow(&self, id: &str) -> Option<Arc<WorkflowDefinition>> {
        self.workflows.get(id).cloned()
    }
}

#[async_trait]
impl WorkflowDirectory for StaticWorkflowDirectory {
    async fn workflow_for(
        &self,
        container: &ContainerRef,
    ) -> StoreResult<Option<Arc<WorkflowDefinition>>> {
        Ok(self
            .containers
            .get(container)
            .and_then(|workflow_id| self.workflows.get(workflow_id))
            .cloned())
    }
}

/// What the in-memory search index keeps per entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub id: Uuid,
    pub entity_type: EntityType,
    pub title: String,
    pub state: Option<String>,
    pub text: String,
}

/// Search index over the documents of a [`ContentStore`].
pub struct InMemorySearchIndex {
    content: Arc<dyn ContentStore>,
    documents: DashMap<Uuid, IndexDocument>,
}

impl InMemorySearchIndex {
    pub fn new(content: Arc<dyn ContentStore>) -> Self {
        Self {
            content,
            documents: DashMap::new(),
        }
    }

    pub fn document(&self, id: &Uuid) -> Option<IndexDocument> {
        self.documents.get(id).map(|doc| doc.value().clone())
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Ids of documents whose title or text contains `term`, ignoring case.
    pub fn search(&self, term: &str) -> Vec<Uuid> {
        let term = term.to_lowercase();
        self.documents
            .iter()
            .filter(|doc| {
                doc.title.to_lowercase().contains(&term) || doc.text.to_lowercase().contains(&term)
            })
            .map(|doc| doc.id)
            .collect()
    }
}

#[async_trait]
impl SearchIndex for InMemorySearchIndex {
    async fn index_document(&self, entity_type: EntityType, id: &Uuid) -> IndexResult<()> {
        let item = match self.content.find_by_id(id).await {
            Ok(item) => item,
            Err(StoreError::NotFound(msg)) => return Err(IndexError::NotFound(msg)),
            Err(e) => return Err(IndexError::Store(e)),
        };

        self.documents.insert(
            *id,
            IndexDocument {
                id: *id,
                entity_type,
                title: item.title.clone(),
                state: item.current_state.clone(),
                text: item.text(),
            },
        );
        Ok(())
    }

    async fn delete_document(&self, id: &Uuid) -> IndexResult<()> {
        self.documents.remove(id);
        Ok(())
    }
}
