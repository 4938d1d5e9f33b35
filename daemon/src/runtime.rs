/// Service wiring: builds the store, engine, queues and facade from a
/// configuration and drives the drain loops.
use crate::errors::DaemonResult;
use quill_core::{
    spawn_drain_loops, ContentFacade, ContentStore, DrainLoops, DrainReport, IndexDrainReport,
    IndexQueue, IndexQueueStore, InMemorySearchIndex, InMemoryStore, JobQueueStore, JobScheduler,
    PluginContext, PluginRegistry, QuillConfig, SqliteStore, StorageBackend, WorkflowEngine,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// Every running service of one daemon instance.
pub struct Services {
    pub content: Arc<dyn ContentStore>,
    pub search: Arc<InMemorySearchIndex>,
    pub index_queue: Arc<IndexQueue>,
    pub scheduler: Arc<JobScheduler>,
    pub engine: Arc<WorkflowEngine>,
    pub facade: Arc<ContentFacade>,

    /// Context handed to queued plugin actions; acts as the system user
    pub drain_context: PluginContext,

    /// Kept to close the pool on shutdown
    sqlite: Option<SqliteStore>,
}

impl Services {
    /// Build all services on the backend selected in `config.storage`.
    pub async fn build(config: &QuillConfig) -> DaemonResult<Self> {
        match config.storage.backend {
            StorageBackend::Memory => {
                info!("Using in-memory storage");
                Ok(Self::wire(Arc::new(InMemoryStore::new()), config, None))
            }
            StorageBackend::Sqlite => {
                info!("Using SQLite storage at {}", config.storage.database_path);
                let store =
                    SqliteStore::new(&config.storage.database_path, config.storage.pool_size)
                        .await?;
                store.initialize().await?;
                Ok(Self::wire(Arc::new(store.clone()), config, Some(store)))
            }
        }
    }

    fn wire<S>(store: Arc<S>, config: &QuillConfig, sqlite: Option<SqliteStore>) -> Self
    where
        S: ContentStore + JobQueueStore + IndexQueueStore + 'static,
    {
        let registry = Arc::new(PluginRegistry::with_builtins());
        let search = Arc::new(InMemorySearchIndex::new(store.clone()));
        let index_queue = Arc::new(IndexQueue::new(store.clone(), search.clone()));
        let scheduler = Arc::new(
            JobScheduler::new(
                store.clone(),
                Arc::new(config.action_catalog()),
                registry.clone(),
            )
            .with_max_chain_passes(config.scheduler.max_chain_passes),
        );

        let context =
            PluginContext::new(store.clone(), index_queue.clone()).with_jobs(scheduler.clone());
        let engine = Arc::new(WorkflowEngine::new(
            store.clone(),
            Arc::new(config.workflow_directory()),
            registry,
            context.clone(),
        ));
        let facade = Arc::new(ContentFacade::new(
            store.clone(),
            engine.clone(),
            index_queue.clone(),
        ));
        let drain_context = context
            .with_workflow(engine.clone())
            .with_acting_user(config.scheduler.system_user.clone());

        Self {
            content: store,
            search,
            index_queue,
            scheduler,
            engine,
            facade,
            drain_context,
            sqlite,
        }
    }

    /// Drain the job queue, then the index queue, once.
    pub async fn drain_once(&self) -> DaemonResult<(DrainReport, IndexDrainReport)> {
        let jobs = self.scheduler.drain(&self.drain_context).await?;
        let index = self.index_queue.drain().await?;
        Ok((jobs, index))
    }

    /// Start the periodic drains. They stop when `shutdown` fires.
    pub fn spawn_drain_loops(
        &self,
        config: &QuillConfig,
        shutdown: &broadcast::Sender<()>,
    ) -> DrainLoops {
        spawn_drain_loops(
            self.scheduler.clone(),
            self.index_queue.clone(),
            self.drain_context.clone(),
            &config.scheduler,
            shutdown,
        )
    }

    pub async fn close(&self) {
        if let Some(store) = &self.sqlite {
            store.close().await;
        }
    }
}
