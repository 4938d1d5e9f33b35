// Quill: editorial content workflow engine
// Core library providing the workflow engine, job and index queues, plugins and stores

pub mod config;
pub mod content;
pub mod errors;
pub mod facade;
pub mod identity;
pub mod index_queue;
pub mod job_queue;
pub mod memory_store;
pub mod plugins;
pub mod sqlite_store;
pub mod timers;
pub mod traits;
pub mod workflow;
pub mod workflow_engine;

// Re-export commonly used types
pub use errors::{
    ConfigError, ConfigResult, ContentError, ContentResult, IdentityError, IndexError,
    IndexResult, JobQueueError, JobQueueResult, PluginError, PluginResult, StoreError,
    StoreResult, ValidationFailure, WorkflowError, WorkflowResult,
};

pub use traits::{
    ActionConfigSource, ContentStore, IdentityResolver, IndexQueueStore, JobQueueStore,
    SearchIndex, WorkflowDirectory,
};

pub use content::{
    Actor, ContainerRef, ContentItem, ContentKind, MediaStatus, TransitionRecord,
};

pub use identity::{Anonymous, Role, StaticIdentity, User};

pub use workflow::{
    Permission, PluginRef, Properties, StateId, StepId, WorkflowDefinition, WorkflowState,
    WorkflowStep,
};

pub use workflow_engine::WorkflowEngine;

pub use job_queue::{
    ActionConfiguration, DrainReport, JobQueueEntry, JobRequest, JobScheduler, JobStatus,
};

pub use index_queue::{
    EntityType, IndexDrainReport, IndexOperation, IndexQueue, IndexQueueEntry,
};

pub use facade::ContentFacade;

pub use plugins::{PluginAction, PluginContext, PluginRegistry, TransitionAction, Validator};

pub use memory_store::{
    IndexDocument, InMemoryActionCatalog, InMemorySearchIndex, InMemoryStore,
    StaticWorkflowDirectory,
};

pub use sqlite_store::SqliteStore;

pub use config::{
    ConfigManager, ContainerConfig, LogFormat, LoggingConfig, QuillConfig, SchedulerConfig,
    StorageBackend, StorageConfig,
};

pub use timers::{spawn_drain_loops, DrainLoops};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
