/// Periodic background drains of the job queue and the index queue.
use crate::config::SchedulerConfig;
use crate::index_queue::IndexQueue;
use crate::job_queue::JobScheduler;
use crate::plugins::PluginContext;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Handles of the spawned drain loops.
pub struct DrainLoops {
    pub jobs: JoinHandle<()>,
    pub index: JoinHandle<()>,
}

impl DrainLoops {
    /// Wait for both loops to finish after shutdown was signalled.
    pub async fn join(self) {
        if let Err(e) = self.jobs.await {
            tracing::error!("Job queue loop terminated abnormally: {}", e);
        }
        if let Err(e) = self.index.await {
            tracing::error!("Index queue loop terminated abnormally: {}", e);
        }
    }
}

/// Spawn both drain loops. They stop when `shutdown` fires.
pub fn spawn_drain_loops(
    scheduler: Arc<JobScheduler>,
    index_queue: Arc<IndexQueue>,
    ctx: PluginContext,
    config: &SchedulerConfig,
    shutdown: &broadcast::Sender<()>,
) -> DrainLoops {
    DrainLoops {
        jobs: spawn_job_queue_loop(
            scheduler,
            ctx,
            Duration::from_secs(config.job_queue_interval_secs),
            shutdown.subscribe(),
        ),
        index: spawn_index_loop(
            index_queue,
            Duration::from_secs(config.index_interval_secs),
            shutdown.subscribe(),
        ),
    }
}

/// Drain the job queue every `period`.
pub fn spawn_job_queue_loop(
    scheduler: Arc<JobScheduler>,
    ctx: PluginContext,
    period: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::debug!("Job queue loop shutting down");
                    break;
                }
                _ = interval.tick() => {
                    match scheduler.drain(&ctx).await {
                        Ok(report) => tracing::debug!("Job queue drain: {:?}", report),
                        Err(e) => tracing::error!("Job queue drain failed: {}", e),
                    }
                }
            }
        }
    })
}

/// Drain the index queue every `period`.
pub fn spawn_index_loop(
    index_queue: Arc<IndexQueue>,
    period: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::debug!("Index queue loop shutting down");
                    break;
                }
                _ = interval.tick() => {
                    match index_queue.drain().await {
                        Ok(report) => tracing::debug!("Index queue drain: {:?}", report),
                        Err(e) => tracing::error!("Index queue drain failed: {}", e),
                    }
                }
            }
        }
    })
}
