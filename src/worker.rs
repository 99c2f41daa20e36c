//! The deferred-mode execution loop.
//!
//! A [`Worker`] repeatedly claims queued job envelopes from the backend and
//! runs the matching registered body. Each claim is processed to completion
//! before the next one; run several workers (or several processes) for
//! parallelism. Invocations share nothing beyond the backend itself: every
//! job gets its own input and its own progress reporter.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

use crate::backend::{JobBackend, JobEnvelope};
use crate::progress::ProgressReporter;
use crate::registry::SealedRegistry;

/// How long an idle worker sleeps before polling the queue again.
///
/// Polling instead of blocking keeps the backend connection usable by
/// concurrent status writes from in-flight jobs.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Claims and executes queued jobs.
pub struct Worker {
    backend: Arc<dyn JobBackend>,
    registry: SealedRegistry,
    time_limit: Duration,
    poll_interval: Duration,
}

impl Worker {
    /// Creates a worker over the given backend and task set.
    ///
    /// `time_limit` is the hard wall-clock bound for one job; a body that
    /// exceeds it is abandoned and its job recorded as failed.
    pub fn new(backend: Arc<dyn JobBackend>, registry: SealedRegistry, time_limit: Duration) -> Self {
        Self {
            backend,
            registry,
            time_limit,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Overrides the idle poll interval (builder pattern).
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Runs forever, claiming jobs as they arrive.
    ///
    /// Backend errors while claiming are logged and retried after the poll
    /// interval rather than tearing the loop down. Cancel-safe: dropping
    /// the future between jobs loses nothing.
    pub async fn run(&self) {
        info!(tasks = self.registry.len(), "worker started");
        loop {
            match self.backend.claim().await {
                Ok(Some(envelope)) => self.process(envelope).await,
                Ok(None) => sleep(self.poll_interval).await,
                Err(err) => {
                    error!(error = %err, "claim failed");
                    sleep(self.poll_interval).await;
                },
            }
        }
    }

    /// Processes claimed jobs until the queue reads empty once.
    ///
    /// Intended for tests and batch-style runs; the serving path uses
    /// [`run`](Worker::run).
    pub async fn drain(&self) {
        loop {
            match self.backend.claim().await {
                Ok(Some(envelope)) => self.process(envelope).await,
                Ok(None) => return,
                Err(err) => {
                    error!(error = %err, "claim failed");
                    return;
                },
            }
        }
    }

    /// Runs one claimed job to a terminal record.
    ///
    /// Every exit path leaves the job terminal: unknown task names, body
    /// failures, and time-limit overruns all record a failure so pollers
    /// are never stuck on a job nobody is running.
    async fn process(&self, envelope: JobEnvelope) {
        let JobEnvelope {
            job_id,
            task_name,
            input,
            ..
        } = envelope;

        let Some(task) = self.registry.get(&task_name) else {
            warn!(task = %task_name, job_id = %job_id, "claimed job for unregistered task");
            let message = format!("unknown task '{task_name}'");
            if let Err(err) = self.backend.fail(&job_id, &message).await {
                error!(job_id = %job_id, error = %err, "failed to record failure");
            }
            return;
        };

        if let Err(err) = self.backend.mark_started(&job_id).await {
            error!(job_id = %job_id, error = %err, "failed to mark job started");
            return;
        }

        let progress = ProgressReporter::new(self.backend.clone(), job_id.clone());
        let outcome = timeout(self.time_limit, task.run(input, progress)).await;

        let recorded = match outcome {
            Ok(Ok(result)) => {
                info!(task = task.name(), job_id = %job_id, "job finished");
                self.backend.complete(&job_id, result).await
            },
            Ok(Err(failure)) => {
                warn!(task = task.name(), job_id = %job_id, error = %failure, "job failed");
                self.backend.fail(&job_id, failure.message()).await
            },
            Err(_) => {
                let message = format!(
                    "time limit of {}s exceeded",
                    self.time_limit.as_secs()
                );
                warn!(task = task.name(), job_id = %job_id, "{message}");
                self.backend.fail(&job_id, &message).await
            },
        };
        if let Err(err) = recorded {
            error!(job_id = %job_id, error = %err, "failed to record job outcome");
        }
    }
}
