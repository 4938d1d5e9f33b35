/// Plugin capabilities: step validators, post-commit transition actions and
/// queued plugin actions.
///
/// Plugins are looked up by name in a [`PluginRegistry`]. The registry is
/// built once at start-up and handed to the engine and the job scheduler.
use crate::content::ContentItem;
use crate::errors::PluginResult;
use crate::identity::User;
use crate::index_queue::IndexQueue;
use crate::job_queue::{ActionConfiguration, JobScheduler};
use crate::traits::ContentStore;
use crate::workflow::{PluginRef, Properties, WorkflowStep};
use crate::workflow_engine::WorkflowEngine;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

pub mod builtin;
pub mod registry;

pub use registry::PluginRegistry;

/// Pre-commit check attached to a workflow step.
///
/// Any error rejects the transition; its message is reported to the caller.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(
        &self,
        item: &ContentItem,
        step: &WorkflowStep,
        config: &PluginRef,
    ) -> PluginResult<()>;
}

/// Post-commit side effect attached to a workflow step.
#[async_trait]
pub trait TransitionAction: Send + Sync {
    async fn execute(
        &self,
        ctx: &PluginContext,
        item: &ContentItem,
        step: &WorkflowStep,
        config: &PluginRef,
        acting_user: &User,
    ) -> PluginResult<()>;
}

/// Action executed by the job queue against a (type, id) target.
#[async_trait]
pub trait PluginAction: Send + Sync {
    async fn execute(
        &self,
        ctx: &PluginContext,
        target_type: &str,
        target_id: &Uuid,
        config: &ActionConfiguration,
        params: &Properties,
    ) -> PluginResult<()>;
}

/// Services available to plugins while they run.
#[derive(Clone)]
pub struct PluginContext {
    pub content: Arc<dyn ContentStore>,
    pub index_queue: Arc<IndexQueue>,
    pub jobs: Option<Arc<JobScheduler>>,
    pub workflow: Option<Arc<WorkflowEngine>>,

    /// User that automatic actions run as
    pub acting_user: Option<User>,
}

impl PluginContext {
    pub fn new(content: Arc<dyn ContentStore>, index_queue: Arc<IndexQueue>) -> Self {
        Self {
            content,
            index_queue,
            jobs: None,
            workflow: None,
            acting_user: None,
        }
    }

    pub fn with_jobs(mut self, jobs: Arc<JobScheduler>) -> Self {
        self.jobs = Some(jobs);
        self
    }

    pub fn with_workflow(mut self, engine: Arc<WorkflowEngine>) -> Self {
        self.workflow = Some(engine);
        self
    }

    pub fn with_acting_user(mut self, user: User) -> Self {
        self.acting_user = Some(user);
        self
    }
}
