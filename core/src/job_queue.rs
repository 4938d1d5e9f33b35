/// Plugin job queue: deferred invocations of configured plugin actions
/// against a (type, id) target, with retry of transient failures and
/// chaining of follow-up actions.
use crate::errors::{JobQueueError, JobQueueResult, PluginError, PluginResult, StoreError};
use crate::plugins::{PluginContext, PluginRegistry};
use crate::traits::{ActionConfigSource, JobQueueStore};
use crate::workflow::Properties;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Default cap on follow-up passes within one drain.
pub const DEFAULT_MAX_CHAIN_PASSES: usize = 10;

/// A configured plugin action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionConfiguration {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Registry name of the plugin action
    pub plugin: String,

    #[serde(default)]
    pub properties: Properties,

    /// Actions queued against the same target once this one completes
    #[serde(default)]
    pub on_complete: Vec<String>,
}

impl ActionConfiguration {
    pub fn new(id: impl Into<String>, plugin: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: String::new(),
            plugin: plugin.into(),
            properties: Properties::new(),
            on_complete: Vec::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties
            .entry(key.into())
            .or_default()
            .push(value.into());
        self
    }

    pub fn then(mut self, action_id: impl Into<String>) -> Self {
        self.on_complete.push(action_id.into());
        self
    }

    /// First value of a property, if set.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

/// Lifecycle of a job queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Not yet due
    Waiting,
    /// Due, waiting for a drain to pick it up
    Ready,
    /// Claimed by a drain, action running
    Execution,
    /// Finished successfully, reaped at the end of the pass
    Completed,
    /// Failed, retried on the next drain
    Failed,
    /// Failed for good, kept for inspection
    FailedCompleted,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Waiting => "WAITING",
            JobStatus::Ready => "READY",
            JobStatus::Execution => "EXECUTION",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::FailedCompleted => "FAILED_COMPLETED",
        }
    }

    /// Statuses a drain may claim for execution.
    pub fn is_runnable(&self) -> bool {
        matches!(self, JobStatus::Ready | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "WAITING" => Ok(JobStatus::Waiting),
            "READY" => Ok(JobStatus::Ready),
            "EXECUTION" => Ok(JobStatus::Execution),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            "FAILED_COMPLETED" => Ok(JobStatus::FailedCompleted),
            _ => Err(format!("Invalid job status: {}", s)),
        }
    }
}

/// A pending or finished plugin action invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobQueueEntry {
    pub id: Uuid,
    pub name: String,
    pub target_type: String,
    pub target_id: Uuid,
    pub action_id: String,
    pub parameters: Properties,
    pub status: JobStatus,

    /// Not-before time
    pub execution_time: DateTime<Utc>,
    pub added: DateTime<Utc>,
    pub started: Option<DateTime<Utc>>,
    pub finished: Option<DateTime<Utc>>,
}

impl JobQueueEntry {
    /// First value of a parameter, if set.
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

/// Request to queue a plugin action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub name: Option<String>,
    pub target_type: String,
    pub target_id: Uuid,
    pub action_id: String,
    pub parameters: Properties,
    pub not_before: Option<DateTime<Utc>>,
}

impl JobRequest {
    pub fn new(action_id: impl Into<String>, target_type: impl Into<String>, target_id: Uuid) -> Self {
        Self {
            name: None,
            target_type: target_type.into(),
            target_id,
            action_id: action_id.into(),
            parameters: Properties::new(),
            not_before: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters
            .entry(key.into())
            .or_default()
            .push(value.into());
        self
    }

    pub fn with_parameters(mut self, parameters: Properties) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn not_before(mut self, time: DateTime<Utc>) -> Self {
        self.not_before = Some(time);
        self
    }
}

/// Outcome of one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// WAITING entries that became due
    pub promoted: usize,
    /// Entries claimed and run
    pub executed: usize,
    pub completed: usize,
    /// Transient failures, retried next drain
    pub failed: usize,
    pub failed_permanently: usize,
    /// Entries queued by `on_complete` chains
    pub follow_ups: usize,
    /// COMPLETED entries deleted
    pub reaped: usize,
    pub passes: usize,
}

/// Queue of plugin actions waiting to run.
pub struct JobScheduler {
    store: Arc<dyn JobQueueStore>,
    actions: Arc<dyn ActionConfigSource>,
    registry: Arc<PluginRegistry>,
    drain_lock: Mutex<()>,
    max_chain_passes: usize,
}

impl JobScheduler {
    pub fn new(
        store: Arc<dyn JobQueueStore>,
        actions: Arc<dyn ActionConfigSource>,
        registry: Arc<PluginRegistry>,
    ) -> Self {
        Self {
            store,
            actions,
            registry,
            drain_lock: Mutex::new(()),
            max_chain_passes: DEFAULT_MAX_CHAIN_PASSES,
        }
    }

    pub fn with_max_chain_passes(mut self, passes: usize) -> Self {
        self.max_chain_passes = passes.max(1);
        self
    }

    /// Queue a plugin action. Fails with `NotFound` when the action
    /// configuration does not exist.
    pub async fn enqueue(&self, request: JobRequest) -> JobQueueResult<JobQueueEntry> {
        let config = self
            .actions
            .find_action_configuration(&request.action_id)
            .await
            .map_err(map_store_error)?;

        let now = Utc::now();
        let entry = JobQueueEntry {
            id: Uuid::new_v4(),
            name: request.name.unwrap_or_else(|| config.name.clone()),
            target_type: request.target_type,
            target_id: request.target_id,
            action_id: config.id,
            parameters: request.parameters,
            status: JobStatus::Waiting,
            execution_time: request.not_before.unwrap_or(now),
            added: now,
            started: None,
            finished: None,
        };

        self.store.insert(&entry).await?;
        debug!(
            "Queued job {} ({}) for {} {} at {}",
            entry.id, entry.action_id, entry.target_type, entry.target_id, entry.execution_time
        );
        Ok(entry)
    }

    /// Run every due entry.
    pub async fn drain(&self, ctx: &PluginContext) -> JobQueueResult<DrainReport> {
        self.drain_at(ctx, Utc::now()).await
    }

    /// Run every entry due at `now`.
    ///
    /// Passes repeat while completed entries queue follow-ups, up to the
    /// configured cap. Only one drain runs at a time per scheduler.
    pub async fn drain_at(
        &self,
        ctx: &PluginContext,
        now: DateTime<Utc>,
    ) -> JobQueueResult<DrainReport> {
        let _guard = self.drain_lock.lock().await;
        let mut report = DrainReport::default();
        let mut attempted = HashSet::new();

        loop {
            report.passes += 1;
            let follow_ups = self
                .run_pass(ctx, now, &mut attempted, &mut report)
                .await?;

            match self.store.delete_completed().await {
                Ok(reaped) => report.reaped += reaped,
                Err(e) => error!("Failed to reap completed jobs: {}", e),
            }

            if follow_ups == 0 {
                break;
            }
            if report.passes >= self.max_chain_passes {
                warn!(
                    "Job queue drain stopped after {} passes with follow-ups pending",
                    report.passes
                );
                break;
            }
        }

        if report.executed > 0 || report.promoted > 0 {
            info!(
                "Job queue drained: {} executed, {} completed, {} failed, {} failed permanently, {} follow-ups",
                report.executed,
                report.completed,
                report.failed,
                report.failed_permanently,
                report.follow_ups
            );
        }
        Ok(report)
    }

    /// All entries, ordered by execution time.
    pub async fn entries(&self) -> JobQueueResult<Vec<JobQueueEntry>> {
        Ok(self.store.list_by_execution_time().await?)
    }

    /// Put a failed entry back to READY so the next drain runs it.
    pub async fn retry(&self, id: &Uuid) -> JobQueueResult<JobQueueEntry> {
        let entry = self.store.find_by_id(id).await.map_err(map_store_error)?;
        let applied = self
            .store
            .transition_status(
                id,
                &[JobStatus::Failed, JobStatus::FailedCompleted],
                JobStatus::Ready,
                None,
            )
            .await?;
        if !applied {
            return Err(JobQueueError::InvalidState(format!(
                "job {} is {}, only failed jobs can be retried",
                id, entry.status
            )));
        }
        Ok(self.store.find_by_id(id).await.map_err(map_store_error)?)
    }

    /// Delete an entry regardless of its status.
    pub async fn remove(&self, id: &Uuid) -> JobQueueResult<()> {
        self.store.find_by_id(id).await.map_err(map_store_error)?;
        Ok(self.store.delete(id).await?)
    }

    /// One pass over a snapshot of the queue. Entries already run during
    /// this drain are left for the next one.
    async fn run_pass(
        &self,
        ctx: &PluginContext,
        now: DateTime<Utc>,
        attempted: &mut HashSet<Uuid>,
        report: &mut DrainReport,
    ) -> JobQueueResult<usize> {
        let snapshot = self.store.list_by_execution_time().await?;
        let mut follow_ups = 0;

        for mut entry in snapshot {
            if attempted.contains(&entry.id) {
                continue;
            }

            if entry.status == JobStatus::Waiting && entry.execution_time <= now {
                match self
                    .store
                    .transition_status(&entry.id, &[JobStatus::Waiting], JobStatus::Ready, None)
                    .await
                {
                    Ok(true) => {
                        entry.status = JobStatus::Ready;
                        report.promoted += 1;
                    }
                    Ok(false) => continue,
                    Err(e) => {
                        error!("Failed to promote job {}: {}", entry.id, e);
                        continue;
                    }
                }
            }

            if entry.status.is_runnable() {
                attempted.insert(entry.id);
                follow_ups += self.execute_entry(ctx, entry, now, report).await;
            }
        }

        Ok(follow_ups)
    }

    /// Claim and run one entry, returning the number of follow-ups queued.
    async fn execute_entry(
        &self,
        ctx: &PluginContext,
        mut entry: JobQueueEntry,
        now: DateTime<Utc>,
        report: &mut DrainReport,
    ) -> usize {
        let started = Utc::now();
        match self
            .store
            .transition_status(
                &entry.id,
                &[JobStatus::Ready, JobStatus::Failed],
                JobStatus::Execution,
                Some(started),
            )
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                debug!("Job {} claimed elsewhere, skipping", entry.id);
                return 0;
            }
            Err(e) => {
                error!("Failed to claim job {}: {}", entry.id, e);
                return 0;
            }
        }

        entry.status = JobStatus::Execution;
        entry.started = Some(started);
        report.executed += 1;

        let outcome = self.invoke(ctx, &entry).await;
        entry.finished = Some(Utc::now());

        let on_complete = match outcome {
            Ok(config) => {
                entry.status = JobStatus::Completed;
                report.completed += 1;
                debug!("Job {} ({}) completed", entry.id, entry.action_id);
                config.on_complete
            }
            Err(e) if e.is_permanent() => {
                entry.status = JobStatus::FailedCompleted;
                report.failed_permanently += 1;
                error!(
                    "Job {} ({}) failed permanently: {}",
                    entry.id, entry.action_id, e
                );
                Vec::new()
            }
            Err(e) => {
                entry.status = JobStatus::Failed;
                report.failed += 1;
                error!("Job {} ({}) failed: {}", entry.id, entry.action_id, e);
                Vec::new()
            }
        };

        if let Err(e) = self.store.update(&entry).await {
            error!("Failed to record outcome of job {}: {}", entry.id, e);
        }

        let mut queued = 0;
        for action_id in on_complete {
            let request =
                JobRequest::new(action_id.clone(), entry.target_type.clone(), entry.target_id)
                    .with_parameters(entry.parameters.clone())
                    .not_before(now);
            match self.enqueue(request).await {
                Ok(_) => queued += 1,
                Err(e) => error!(
                    "Failed to queue follow-up {} of job {}: {}",
                    action_id, entry.id, e
                ),
            }
        }
        report.follow_ups += queued;
        queued
    }

    async fn invoke(
        &self,
        ctx: &PluginContext,
        entry: &JobQueueEntry,
    ) -> PluginResult<ActionConfiguration> {
        let config = match self.actions.find_action_configuration(&entry.action_id).await {
            Ok(config) => config,
            Err(StoreError::NotFound(_)) => {
                return Err(PluginError::NotFound(format!(
                    "action configuration {}",
                    entry.action_id
                )))
            }
            Err(e) => return Err(PluginError::transient(e.to_string())),
        };

        let plugin = self.registry.plugin_action(&config.plugin).ok_or_else(|| {
            PluginError::NotFound(format!("plugin action {}", config.plugin))
        })?;

        plugin
            .execute(
                ctx,
                &entry.target_type,
                &entry.target_id,
                &config,
                &entry.parameters,
            )
            .await?;
        Ok(config)
    }
}

fn map_store_error(err: StoreError) -> JobQueueError {
    match err {
        StoreError::NotFound(msg) => JobQueueError::NotFound(msg),
        other => JobQueueError::Store(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            JobStatus::Waiting,
            JobStatus::Ready,
            JobStatus::Execution,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::FailedCompleted,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("DONE".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_runnable_statuses() {
        assert!(JobStatus::Ready.is_runnable());
        assert!(JobStatus::Failed.is_runnable());
        assert!(!JobStatus::Waiting.is_runnable());
        assert!(!JobStatus::FailedCompleted.is_runnable());
    }

    #[test]
    fn test_status_serializes_screaming_case() {
        let json = serde_json::to_string(&JobStatus::FailedCompleted).unwrap();
        assert_eq!(json, "\"FAILED_COMPLETED\"");
    }

    #[test]
    fn test_request_builder() {
        let target = Uuid::new_v4();
        let request = JobRequest::new("publish", "article", target)
            .with_parameter("initiator", "ann")
            .named("Publish article");
        assert_eq!(request.parameters["initiator"], vec!["ann".to_string()]);
        assert_eq!(request.name.as_deref(), Some("Publish article"));
        assert!(request.not_before.is_none());
    }

    #[test]
    fn test_action_configuration_chain() {
        let config = ActionConfiguration::new("a", "log_message")
            .with_property("message", "hi")
            .then("b")
            .then("c");
        assert_eq!(config.property("message"), Some("hi"));
        assert_eq!(config.on_complete, vec!["b", "c"]);
    }
}
