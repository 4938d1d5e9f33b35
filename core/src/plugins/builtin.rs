/// Built-in validators and actions.
use super::{PluginAction, PluginContext, PluginRegistry, TransitionAction, Validator};
use crate::content::ContentItem;
use crate::errors::{PluginError, PluginResult, StoreError, WorkflowError};
use crate::identity::{StaticIdentity, User};
use crate::index_queue::EntityType;
use crate::job_queue::{ActionConfiguration, JobRequest};
use crate::traits::ContentStore;
use crate::workflow::{PluginRef, Properties, WorkflowStep};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Register every built-in plugin under its well-known name.
pub fn register_builtins(registry: &mut PluginRegistry) {
    registry.register_validator("title_required", || {
        Arc::new(TitleRequired) as Arc<dyn Validator>
    });
    registry.register_validator("minimum_word_count", || {
        Arc::new(MinimumWordCount) as Arc<dyn Validator>
    });

    registry.register_transition_action("index_content", || {
        Arc::new(IndexContent) as Arc<dyn TransitionAction>
    });
    registry.register_transition_action("queue_job", || {
        Arc::new(QueueJob) as Arc<dyn TransitionAction>
    });

    registry.register_plugin_action("reindex", || Arc::new(Reindex) as Arc<dyn PluginAction>);
    registry.register_plugin_action("execute_workflow_step", || {
        Arc::new(ExecuteWorkflowStep) as Arc<dyn PluginAction>
    });
    registry.register_plugin_action("log_message", || {
        Arc::new(LogMessage) as Arc<dyn PluginAction>
    });
}

// ============================================================================
// Validators
// ============================================================================

/// Rejects items with a blank title.
pub struct TitleRequired;

#[async_trait]
impl Validator for TitleRequired {
    async fn validate(
        &self,
        item: &ContentItem,
        _step: &WorkflowStep,
        _config: &PluginRef,
    ) -> PluginResult<()> {
        if item.title.trim().is_empty() {
            return Err(PluginError::permanent("a title is required"));
        }
        Ok(())
    }
}

/// Rejects articles shorter than the `minimum` property. Media always passes.
pub struct MinimumWordCount;

#[async_trait]
impl Validator for MinimumWordCount {
    async fn validate(
        &self,
        item: &ContentItem,
        _step: &WorkflowStep,
        config: &PluginRef,
    ) -> PluginResult<()> {
        if item.entity_type() != EntityType::Article {
            return Ok(());
        }

        let minimum: usize = config
            .property("minimum")
            .ok_or_else(|| PluginError::permanent("property 'minimum' is not configured"))?
            .trim()
            .parse()
            .map_err(|_| PluginError::permanent("property 'minimum' is not a number"))?;

        let words = item.word_count();
        if words < minimum {
            return Err(PluginError::permanent(format!(
                "article has {} words, at least {} required",
                words, minimum
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Transition actions
// ============================================================================

/// Queues a search-index update for the item that was just moved.
pub struct IndexContent;

#[async_trait]
impl TransitionAction for IndexContent {
    async fn execute(
        &self,
        ctx: &PluginContext,
        item: &ContentItem,
        _step: &WorkflowStep,
        _config: &PluginRef,
        _acting_user: &User,
    ) -> PluginResult<()> {
        ctx.index_queue
            .enqueue_item(item)
            .await
            .map_err(|e| PluginError::transient(e.to_string()))?;
        Ok(())
    }
}

/// Queues the configured plugin action against the item.
///
/// Properties: `action` (action configuration id), optional `delay_secs`.
pub struct QueueJob;

#[async_trait]
impl TransitionAction for QueueJob {
    async fn execute(
        &self,
        ctx: &PluginContext,
        item: &ContentItem,
        step: &WorkflowStep,
        config: &PluginRef,
        acting_user: &User,
    ) -> PluginResult<()> {
        let jobs = ctx
            .jobs
            .as_ref()
            .ok_or_else(|| PluginError::permanent("job scheduler is not available"))?;
        let action = config
            .property("action")
            .ok_or_else(|| PluginError::permanent("property 'action' is not configured"))?;
        let target = item
            .id
            .ok_or_else(|| PluginError::NotFound("item has not been persisted".to_string()))?;

        let mut request = JobRequest::new(action, item.kind_name(), target)
            .named(config.display_label())
            .with_parameter("initiator", acting_user.id.clone())
            .with_parameter("step", step.id.clone());

        if let Some(delay) = config.property("delay_secs") {
            let secs: i64 = delay
                .trim()
                .parse()
                .map_err(|_| PluginError::permanent("property 'delay_secs' is not a number"))?;
            request = request.not_before(Utc::now() + Duration::seconds(secs));
        }

        jobs.enqueue(request)
            .await
            .map_err(|e| PluginError::permanent(e.to_string()))?;
        Ok(())
    }
}

// ============================================================================
// Plugin actions
// ============================================================================

/// Queues a search-index update for the target item.
pub struct Reindex;

#[async_trait]
impl PluginAction for Reindex {
    async fn execute(
        &self,
        ctx: &PluginContext,
        _target_type: &str,
        target_id: &Uuid,
        _config: &ActionConfiguration,
        _params: &Properties,
    ) -> PluginResult<()> {
        let item = load_item(ctx, target_id).await?;
        ctx.index_queue
            .enqueue_item(&item)
            .await
            .map_err(|e| PluginError::transient(e.to_string()))?;
        Ok(())
    }
}

/// Takes the workflow step named by the `step` property as the system user,
/// provided the target still sits in the step's from-state.
pub struct ExecuteWorkflowStep;

#[async_trait]
impl PluginAction for ExecuteWorkflowStep {
    async fn execute(
        &self,
        ctx: &PluginContext,
        _target_type: &str,
        target_id: &Uuid,
        config: &ActionConfiguration,
        _params: &Properties,
    ) -> PluginResult<()> {
        let engine = ctx
            .workflow
            .as_ref()
            .ok_or_else(|| PluginError::permanent("workflow engine is not available"))?;
        let user = ctx
            .acting_user
            .clone()
            .ok_or_else(|| PluginError::permanent("no system user configured"))?;
        let step_id = config
            .property("step")
            .ok_or_else(|| PluginError::permanent("property 'step' is not configured"))?;

        let item = load_item(ctx, target_id).await?;
        let definition = engine
            .definition_for(&item)
            .await
            .map_err(|e| PluginError::permanent(e.to_string()))?;
        let step = definition.step(step_id).ok_or_else(|| {
            PluginError::permanent(format!("step {} not found in workflow {}", step_id, definition.id))
        })?;

        if item.current_state.as_deref() != Some(step.from_state.as_str()) {
            debug!(
                "Item {} is not in {}, skipping step {}",
                target_id, step.from_state, step_id
            );
            return Ok(());
        }

        engine
            .step(&item, step_id, &StaticIdentity::new(user))
            .await
            .map_err(step_failure)?;
        Ok(())
    }
}

/// A concurrent edit leaves the job for the next drain; anything else will
/// not fix itself.
fn step_failure(err: WorkflowError) -> PluginError {
    if err.is_retryable() {
        PluginError::transient(err.to_string())
    } else {
        PluginError::permanent(err.to_string())
    }
}

/// Writes the `message` property to the log.
pub struct LogMessage;

#[async_trait]
impl PluginAction for LogMessage {
    async fn execute(
        &self,
        _ctx: &PluginContext,
        target_type: &str,
        target_id: &Uuid,
        config: &ActionConfiguration,
        _params: &Properties,
    ) -> PluginResult<()> {
        let message = config.property("message").unwrap_or("");
        info!("[{}] {} {}: {}", config.id, target_type, target_id, message);
        Ok(())
    }
}

async fn load_item(ctx: &PluginContext, id: &Uuid) -> PluginResult<ContentItem> {
    ctx.content.find_by_id(id).await.map_err(|e| match e {
        StoreError::NotFound(msg) => PluginError::NotFound(msg),
        other => PluginError::transient(other.to_string()),
    })
}
