//! Task runner: inline and detached build invocations.
//!
//! Detached jobs are sent over an unbounded channel to a dispatcher task,
//! which runs each job concurrently on a `JoinSet` and records its outcome.
//! The spawner never waits on a job; failures surface through commit
//! statuses and the dispatcher's logs.

use futures::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{error, info, warn};

use super::job::{Job, JobId, JobStatus};
use crate::build::{BuildInvocation, BuildOutcome, BuildTask};
use crate::error::{BuildError, SchedulerError};

/// Hands build invocations off for detached execution.
pub trait TaskSpawner: Send + Sync {
    /// Schedules `invocation` and returns without waiting for it.
    fn spawn(&self, invocation: BuildInvocation) -> Result<JobId, SchedulerError>;
}

/// Configuration for the task runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// How long `shutdown` waits for in-flight jobs.
    pub shutdown_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(1800), // 30 minutes
        }
    }
}

impl RunnerConfig {
    /// Sets the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Statistics about detached jobs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunnerStats {
    pub spawned: u64,
    pub completed: u64,
    pub failed: u64,
    pub in_flight: u64,
}

impl RunnerStats {
    /// Returns the number of jobs that finished (completed + failed).
    pub fn finished(&self) -> u64 {
        self.completed + self.failed
    }
}

/// Shared state for tracking runner statistics.
struct SharedStats {
    spawned: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    in_flight: AtomicU64,
}

impl SharedStats {
    fn new() -> Self {
        Self {
            spawned: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
        }
    }

    fn record_spawn(&self) {
        self.spawned.fetch_add(1, Ordering::SeqCst);
    }

    fn record_start(&self) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
    }

    fn record_finish(&self, status: JobStatus) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match status {
            JobStatus::Completed => self.completed.fetch_add(1, Ordering::SeqCst),
            JobStatus::Failed | JobStatus::Panicked => self.failed.fetch_add(1, Ordering::SeqCst),
        };
    }

    fn snapshot(&self) -> RunnerStats {
        RunnerStats {
            spawned: self.spawned.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            in_flight: self.in_flight.load(Ordering::SeqCst),
        }
    }
}

/// Runs build tasks inline (`call`) or detached (`spawn`).
pub struct TaskRunner {
    task: Arc<BuildTask>,
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    dispatcher: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    stats: Arc<SharedStats>,
    config: RunnerConfig,
}

impl TaskRunner {
    /// Creates a runner and starts its dispatcher.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(task: Arc<BuildTask>, config: RunnerConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let stats = Arc::new(SharedStats::new());

        let dispatcher = tokio::spawn(dispatch(
            Arc::clone(&task),
            receiver,
            Arc::clone(&stats),
        ));

        Self {
            task,
            sender: Mutex::new(Some(sender)),
            dispatcher: tokio::sync::Mutex::new(Some(dispatcher)),
            stats,
            config,
        }
    }

    /// Runs a build and waits for its result.
    pub async fn call(&self, invocation: &BuildInvocation) -> Result<BuildOutcome, BuildError> {
        self.task.execute(invocation).await
    }

    /// Runs all builds concurrently and waits until every one has finished.
    ///
    /// Returns the outcomes in input order, or the first error in input order.
    pub async fn call_all(
        &self,
        invocations: &[BuildInvocation],
    ) -> Result<Vec<BuildOutcome>, BuildError> {
        join_all(invocations.iter().map(|invocation| self.call(invocation)))
            .await
            .into_iter()
            .collect()
    }

    /// Returns current job statistics.
    pub fn stats(&self) -> RunnerStats {
        self.stats.snapshot()
    }

    /// Stops accepting jobs and waits for in-flight jobs to finish.
    pub async fn shutdown(&self) -> Result<(), SchedulerError> {
        // Dropping the sender ends the dispatcher once the queue is drained
        self.sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        let Some(handle) = self.dispatcher.lock().await.take() else {
            return Ok(());
        };

        info!(in_flight = self.stats().in_flight, "Waiting for spawned builds to finish");

        match tokio::time::timeout(self.config.shutdown_timeout, handle).await {
            Ok(Ok(())) => {
                info!("Task runner shutdown complete");
                Ok(())
            }
            Ok(Err(e)) => {
                error!(error = %e, "Dispatcher task panicked during shutdown");
                Ok(())
            }
            Err(_) => Err(SchedulerError::ShutdownTimeout(self.config.shutdown_timeout)),
        }
    }
}

impl TaskSpawner for TaskRunner {
    fn spawn(&self, invocation: BuildInvocation) -> Result<JobId, SchedulerError> {
        let job = Job::new(invocation);
        let id = job.id;

        let guard = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let sender = guard.as_ref().ok_or(SchedulerError::ShutDown)?;

        info!(
            job_id = %id,
            project = %job.invocation.project,
            provenance = %job.provenance(),
            "Spawning build"
        );
        sender.send(job).map_err(|_| SchedulerError::ShutDown)?;
        self.stats.record_spawn();

        Ok(id)
    }
}

/// Dispatcher loop: starts every received job and reaps finished ones.
async fn dispatch(
    task: Arc<BuildTask>,
    mut receiver: mpsc::UnboundedReceiver<Job>,
    stats: Arc<SharedStats>,
) {
    let mut running: JoinSet<(JobId, JobStatus)> = JoinSet::new();

    loop {
        tokio::select! {
            job = receiver.recv() => match job {
                Some(job) => {
                    stats.record_start();
                    running.spawn(run_job(Arc::clone(&task), job));
                }
                None => break,
            },
            Some(joined) = running.join_next(), if !running.is_empty() => {
                reap(joined, &stats);
            }
        }
    }

    while let Some(joined) = running.join_next().await {
        reap(joined, &stats);
    }
}

async fn run_job(task: Arc<BuildTask>, job: Job) -> (JobId, JobStatus) {
    let started = Instant::now();
    let result = task.execute(&job.invocation).await;
    let duration_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(outcome) => {
            info!(
                job_id = %job.id,
                artifact = %outcome.artifact,
                provenance = %job.provenance(),
                duration_ms,
                "Spawned build completed"
            );
            (job.id, JobStatus::Completed)
        }
        Err(e) => {
            error!(
                job_id = %job.id,
                project = %job.invocation.project,
                provenance = %job.provenance(),
                duration_ms,
                error = %e,
                "Spawned build failed"
            );
            (job.id, JobStatus::Failed)
        }
    }
}

fn reap(joined: Result<(JobId, JobStatus), JoinError>, stats: &SharedStats) {
    match joined {
        Ok((_, status)) => stats.record_finish(status),
        Err(e) => {
            warn!(error = %e, "Spawned build panicked");
            stats.record_finish(JobStatus::Panicked);
        }
    }
}
