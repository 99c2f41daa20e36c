//! Execution adapter: uniform submission over eager and deferred modes.
//!
//! A [`Dispatcher`] accepts validated input for a registered task and
//! returns a [`Submission`] carrying the job handle and the state known at
//! submission time. In deferred mode the input is queued and the state is
//! `pending`; in eager mode the body runs inline and the state is already
//! terminal (`done` with the result, or `error`).
//!
//! Failures are never surfaced as submission errors in either mode. An
//! eager body failure is recorded on the backend exactly as a worker would
//! record it, and the submission reports the projected `error` label, so
//! callers handle both modes with one code path.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::backend::JobBackend;
use crate::error::BackendError;
use crate::progress::ProgressReporter;
use crate::registry::TaskDescriptor;
use crate::status::project;

/// How submitted tasks are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Run the body inline during submission. No queue required.
    Eager,
    /// Queue the input for an out-of-process worker.
    Deferred,
}

/// What the caller learns at submission time.
///
/// `status` carries the projected label, not the backend's raw state name,
/// so it matches what later polls of the status endpoint will say.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Submission {
    /// Handle for later status polls.
    pub task_id: String,
    /// Projected status label known immediately after submission.
    pub status: String,
    /// Final result, present only when the submission already finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

/// Routes validated submissions to the configured execution mode.
#[derive(Clone)]
pub struct Dispatcher {
    backend: Arc<dyn JobBackend>,
    mode: ExecutionMode,
}

impl Dispatcher {
    /// Creates a dispatcher over the given backend.
    pub fn new(backend: Arc<dyn JobBackend>, mode: ExecutionMode) -> Self {
        Self { backend, mode }
    }

    /// The backend submissions are recorded on.
    pub fn backend(&self) -> &Arc<dyn JobBackend> {
        &self.backend
    }

    /// The configured execution mode.
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Submits validated input for execution.
    ///
    /// Input must already have passed validation against the task's schema.
    ///
    /// # Errors
    ///
    /// Only backend failures (queue unreachable, codec fault) surface here.
    /// Task-body failures are recorded on the job record instead.
    pub async fn submit(
        &self,
        task: &TaskDescriptor,
        input: Value,
    ) -> Result<Submission, BackendError> {
        let job_id = match self.mode {
            ExecutionMode::Deferred => self.backend.enqueue(task.name(), input).await?,
            ExecutionMode::Eager => {
                let job_id = self.backend.insert(task.name(), input.clone()).await?;
                execute_job(&self.backend, task, &job_id, input).await?;
                job_id
            },
        };
        debug!(task = task.name(), job_id = %job_id, mode = ?self.mode, "submitted");

        let view = project(&self.backend.state(&job_id).await?);
        Ok(Submission {
            task_id: job_id,
            status: view.status,
            result: view.result,
        })
    }
}

/// Runs a task body against one job record and records the outcome.
///
/// Shared by the eager path and the worker loop so both record lifecycle
/// transitions identically: started, then success with the result or
/// failure with the body's message.
pub(crate) async fn execute_job(
    backend: &Arc<dyn JobBackend>,
    task: &TaskDescriptor,
    job_id: &str,
    input: Value,
) -> Result<(), BackendError> {
    backend.mark_started(job_id).await?;
    let progress = ProgressReporter::new(backend.clone(), job_id);
    match task.run(input, progress).await {
        Ok(result) => backend.complete(job_id, result).await,
        Err(failure) => {
            warn!(task = task.name(), job_id, error = %failure, "task failed");
            backend.fail(job_id, failure.message()).await
        },
    }
}
