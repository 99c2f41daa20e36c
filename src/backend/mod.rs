//! Queue/state backend trait and implementations.
//!
//! # Architecture
//!
//! [`JobBackend`] is the boundary between the framework core and the
//! execution backend. Backends are dumb: they hold job records, hand
//! queued work to workers, and store the latest progress snapshot.
//! All intelligence -- validation, typed dispatch, status projection,
//! retry policy -- lives above this trait.
//!
//! # Implementations
//!
//! - [`memory::MemoryBackend`] -- thread-safe in-process backend using
//!   `DashMap`, suitable for eager mode, tests, and single-process
//!   deferred mode with in-process workers.
//! - [`redis::RedisBackend`] -- Redis hash-per-job records with a list
//!   queue, for multi-process deployments. Behind the `redis` feature
//!   flag.

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::BackendError;
use crate::status::JobState;

/// A queued unit of work: the task to run and its validated input.
///
/// Envelopes are what travels through the queue; they serialize as
/// JSON (the fixed queue payload encoding).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEnvelope {
    /// The handle correlating this job with status queries.
    pub job_id: String,

    /// Registered task name to look up in the registry.
    pub task_name: String,

    /// The validated input, owned by this single invocation.
    pub input: Value,

    /// When the job was accepted by the backend.
    pub enqueued_at: DateTime<Utc>,
}

/// Execution backend interface: job records, a work queue, and
/// per-invocation progress snapshots.
///
/// # Handles
///
/// Backends generate the handle (a UUIDv4 string) at insertion time.
/// Handles are opaque to callers and expire per backend retention
/// policy.
///
/// # Unknown handles
///
/// [`state`](JobBackend::state) returns [`JobState::Pending`] for
/// handles the backend has no record of -- polling an unknown id must
/// yield a well-formed pending status, never an error.
///
/// # Thread safety
///
/// Implementations must be `Send + Sync`; concurrent invocations
/// never share mutable state beyond what the backend itself
/// synchronizes.
#[async_trait]
pub trait JobBackend: Send + Sync {
    /// Creates a job record in the pending state without queueing it.
    ///
    /// Used by eager mode, where the caller runs the body inline and
    /// records the outcome itself. Returns the new handle.
    async fn insert(&self, task_name: &str, input: Value) -> Result<String, BackendError>;

    /// Creates a job record and places it on the work queue.
    ///
    /// Returns the new handle as soon as the backend accepts the work
    /// item; execution happens later in a worker.
    async fn enqueue(&self, task_name: &str, input: Value) -> Result<String, BackendError>;

    /// Removes and returns the next queued job, if any.
    ///
    /// Non-blocking: returns `Ok(None)` when the queue is empty.
    /// Workers poll this in a loop.
    async fn claim(&self) -> Result<Option<JobEnvelope>, BackendError>;

    /// Marks a job as started (a worker has picked it up).
    async fn mark_started(&self, job_id: &str) -> Result<(), BackendError>;

    /// Overwrites the job's progress snapshot (last write wins).
    ///
    /// Snapshots published after the job reached a terminal state are
    /// ignored.
    async fn put_progress(
        &self,
        job_id: &str,
        snapshot: Map<String, Value>,
    ) -> Result<(), BackendError>;

    /// Records a successful completion with the body's return value.
    async fn complete(&self, job_id: &str, result: Value) -> Result<(), BackendError>;

    /// Records a failure with a human-readable description.
    async fn fail(&self, job_id: &str, message: &str) -> Result<(), BackendError>;

    /// Returns the job's current raw state.
    ///
    /// Unknown handles report [`JobState::Pending`].
    async fn state(&self, job_id: &str) -> Result<JobState, BackendError>;
}
