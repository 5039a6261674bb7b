use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::{
    error::Result,
    executor::{FireOutcome, TriggerExecutor},
    queue::JobQueue,
    sweeper::Sweeper,
    types::{Job, JobCall, QueueName},
};

/// Runs one claimed job. This is the job boundary: every error is logged
/// here and goes no further.
pub struct JobRunner {
    executor: TriggerExecutor,
    sweeper: Sweeper,
}

impl JobRunner {
    pub fn new(executor: TriggerExecutor, sweeper: Sweeper) -> Self {
        Self { executor, sweeper }
    }

    pub async fn run(&self, job: Job) {
        let lag_ms = (Utc::now() - job.due_at).num_milliseconds();
        debug!(job_id = job.id, lag_ms, "running job");
        if let Err(e) = self.dispatch(job.call).await {
            error!(job_id = job.id, "job failed: {e}");
        }
    }

    async fn dispatch(&self, call: JobCall) -> Result<()> {
        match call {
            JobCall::FireScheduled(fire) => {
                let outcome = self.executor.fire_scheduled(&fire).await?;
                if let FireOutcome::Skipped(reason) = outcome {
                    debug!(trigger_id = %fire.trigger_id, ?reason, "scheduled firing skipped");
                }
            }
            JobCall::FireTestScheduled { user_id, draft } => {
                self.executor.fire_test_scheduled(&user_id, &draft).await?;
            }
            JobCall::Sweep => {
                self.sweeper.run().await?;
            }
        }
        Ok(())
    }
}

/// Polling loop for one named queue. Jobs run one at a time, in due order.
pub struct QueueWorker {
    name: QueueName,
    queue: Arc<dyn JobQueue>,
    runner: Arc<JobRunner>,
    poll_interval: Duration,
    span: Span,
}

impl QueueWorker {
    /// `span` is the parent of every per-job span this worker opens.
    pub fn new(
        name: QueueName,
        queue: Arc<dyn JobQueue>,
        runner: Arc<JobRunner>,
        poll_interval: Duration,
        span: Span,
    ) -> Self {
        Self {
            name,
            queue,
            runner,
            poll_interval,
            span,
        }
    }

    /// Poll until `shutdown` broadcasts `true` (or its sender goes away).
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(queue = %self.name, "queue worker started");

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.drain().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(queue = %self.name, "queue worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Claim and run every job due now. Returns how many ran.
    pub async fn drain(&self) -> usize {
        let mut ran = 0;
        loop {
            match self.queue.claim_due(self.name, Utc::now()).await {
                Ok(Some(job)) => {
                    let span = info_span!(
                        parent: &self.span,
                        "job",
                        queue = %self.name,
                        job_id = job.id,
                        call = job.call.name(),
                    );
                    self.runner.run(job).instrument(span).await;
                    ran += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    error!(queue = %self.name, "claiming job failed: {e}");
                    break;
                }
            }
        }
        ran
    }
}

/// Wires the queue, executor and sweeper together and spawns one
/// [`QueueWorker`] per requested queue.
pub struct WorkerRuntime {
    queue: Arc<dyn JobQueue>,
    runner: Arc<JobRunner>,
    sweeper: Sweeper,
    poll_interval: Duration,
}

impl WorkerRuntime {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        executor: TriggerExecutor,
        sweeper: Sweeper,
        poll_interval: Duration,
    ) -> Self {
        Self {
            runner: Arc::new(JobRunner::new(executor, sweeper.clone())),
            queue,
            sweeper,
            poll_interval,
        }
    }

    /// Enqueue the first sweep if the archive queue is empty. Returns
    /// whether a sweep was enqueued.
    pub async fn seed_sweep(&self) -> Result<bool> {
        if self.queue.depth(QueueName::Archive).await? > 0 {
            return Ok(false);
        }
        let job = self.sweeper.schedule_next(Utc::now()).await?;
        info!(job_id = job.id, due_at = %job.due_at, "seeded archival sweep");
        Ok(true)
    }

    pub fn worker(&self, name: QueueName) -> QueueWorker {
        QueueWorker::new(
            name,
            Arc::clone(&self.queue),
            Arc::clone(&self.runner),
            self.poll_interval,
            info_span!("worker", queue = %name),
        )
    }

    /// Spawn one polling task per queue in `queues`.
    pub async fn spawn(
        &self,
        queues: &[QueueName],
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        if queues.contains(&QueueName::Archive) {
            if let Err(e) = self.seed_sweep().await {
                warn!("could not seed archival sweep: {e}");
            }
        }
        queues
            .iter()
            .map(|&name| {
                let worker = self.worker(name);
                let shutdown = shutdown.clone();
                tokio::spawn(async move { worker.run(shutdown).await })
            })
            .collect()
    }
}
