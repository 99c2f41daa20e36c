//! In-process backend: `DashMap` job records plus a FIFO queue.
//!
//! [`MemoryBackend`] backs eager mode, tests, and single-process
//! deferred deployments where workers run as in-process tasks. It is
//! a dumb record/queue holder; the state transitions it applies are
//! mechanical (pending -> started -> progress -> terminal) with
//! terminal states treated as final.

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::BackendError;
use crate::status::JobState;

use super::{JobBackend, JobEnvelope};

#[derive(Debug)]
struct JobRecord {
    task_name: String,
    state: JobState,
}

/// Thread-safe in-memory job backend.
///
/// Records live in a `DashMap` keyed by handle; queued envelopes sit
/// in a mutex-guarded FIFO. Records are never evicted -- retention is
/// the process lifetime, which is the natural policy for an
/// in-process backend.
///
/// # Examples
///
/// ```
/// use conveyor::backend::memory::MemoryBackend;
///
/// let backend = MemoryBackend::new();
/// assert!(backend.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: DashMap<String, JobRecord>,
    queue: Mutex<VecDeque<JobEnvelope>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of job records held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no job records are held.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the number of envelopes waiting in the queue.
    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    /// Returns the task name a handle was issued for, if known.
    pub fn task_name(&self, job_id: &str) -> Option<String> {
        self.records
            .get(job_id)
            .map(|record| record.task_name.clone())
    }

    fn create_record(&self, task_name: &str) -> String {
        let job_id = Uuid::new_v4().to_string();
        self.records.insert(
            job_id.clone(),
            JobRecord {
                task_name: task_name.to_string(),
                state: JobState::Pending,
            },
        );
        job_id
    }

    fn with_record<R>(
        &self,
        job_id: &str,
        apply: impl FnOnce(&mut JobRecord) -> R,
    ) -> Result<R, BackendError> {
        let mut entry = self
            .records
            .get_mut(job_id)
            .ok_or_else(|| BackendError::Backend {
                message: format!("no job record for {job_id}"),
                source: None,
            })?;
        Ok(apply(entry.value_mut()))
    }
}

fn is_terminal(state: &JobState) -> bool {
    matches!(state, JobState::Success(_) | JobState::Failure(_))
}

#[async_trait]
impl JobBackend for MemoryBackend {
    async fn insert(&self, task_name: &str, _input: Value) -> Result<String, BackendError> {
        Ok(self.create_record(task_name))
    }

    async fn enqueue(&self, task_name: &str, input: Value) -> Result<String, BackendError> {
        let job_id = self.create_record(task_name);
        let envelope = JobEnvelope {
            job_id: job_id.clone(),
            task_name: task_name.to_string(),
            input,
            enqueued_at: Utc::now(),
        };
        self.queue.lock().push_back(envelope);
        Ok(job_id)
    }

    async fn claim(&self) -> Result<Option<JobEnvelope>, BackendError> {
        Ok(self.queue.lock().pop_front())
    }

    async fn mark_started(&self, job_id: &str) -> Result<(), BackendError> {
        self.with_record(job_id, |record| {
            if !is_terminal(&record.state) {
                record.state = JobState::Started;
            }
        })
    }

    async fn put_progress(
        &self,
        job_id: &str,
        snapshot: Map<String, Value>,
    ) -> Result<(), BackendError> {
        self.with_record(job_id, |record| {
            if !is_terminal(&record.state) {
                record.state = JobState::Progress(snapshot);
            }
        })
    }

    async fn complete(&self, job_id: &str, result: Value) -> Result<(), BackendError> {
        self.with_record(job_id, |record| {
            record.state = JobState::Success(result);
        })
    }

    async fn fail(&self, job_id: &str, message: &str) -> Result<(), BackendError> {
        self.with_record(job_id, |record| {
            record.state = JobState::Failure(message.to_string());
        })
    }

    async fn state(&self, job_id: &str) -> Result<JobState, BackendError> {
        // Unknown handles default to pending, matching how most
        // result backends report ids they have no record of.
        Ok(self
            .records
            .get(job_id)
            .map(|record| record.state.clone())
            .unwrap_or(JobState::Pending))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn enqueue_creates_pending_record_and_queues_envelope() {
        let backend = MemoryBackend::new();
        let job_id = backend
            .enqueue("travel-time", json!({"x": 1}))
            .await
            .unwrap();
        assert_eq!(backend.state(&job_id).await.unwrap(), JobState::Pending);
        assert_eq!(backend.queued(), 1);
        assert_eq!(backend.task_name(&job_id).as_deref(), Some("travel-time"));

        let claimed = backend.claim().await.unwrap().unwrap();
        assert_eq!(claimed.job_id, job_id);
        assert_eq!(claimed.task_name, "travel-time");
        assert_eq!(claimed.input, json!({"x": 1}));
        assert_eq!(backend.queued(), 0);
    }

    #[tokio::test]
    async fn insert_does_not_queue() {
        let backend = MemoryBackend::new();
        let job_id = backend.insert("t", json!({})).await.unwrap();
        assert_eq!(backend.queued(), 0);
        assert_eq!(backend.state(&job_id).await.unwrap(), JobState::Pending);
    }

    #[tokio::test]
    async fn claim_returns_none_on_empty_queue() {
        let backend = MemoryBackend::new();
        assert!(backend.claim().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claims_come_out_in_fifo_order() {
        let backend = MemoryBackend::new();
        let first = backend.enqueue("a", json!(1)).await.unwrap();
        let second = backend.enqueue("b", json!(2)).await.unwrap();
        assert_eq!(backend.claim().await.unwrap().unwrap().job_id, first);
        assert_eq!(backend.claim().await.unwrap().unwrap().job_id, second);
    }

    #[tokio::test]
    async fn lifecycle_transitions() {
        let backend = MemoryBackend::new();
        let job_id = backend.enqueue("t", json!({})).await.unwrap();

        backend.mark_started(&job_id).await.unwrap();
        assert_eq!(backend.state(&job_id).await.unwrap(), JobState::Started);

        let mut snapshot = Map::new();
        snapshot.insert("progress".to_string(), json!(30));
        backend.put_progress(&job_id, snapshot).await.unwrap();
        assert!(matches!(
            backend.state(&job_id).await.unwrap(),
            JobState::Progress(_)
        ));

        backend.complete(&job_id, json!({"ok": true})).await.unwrap();
        assert_eq!(
            backend.state(&job_id).await.unwrap(),
            JobState::Success(json!({"ok": true}))
        );
    }

    #[tokio::test]
    async fn progress_snapshots_overwrite_not_accumulate() {
        let backend = MemoryBackend::new();
        let job_id = backend.enqueue("t", json!({})).await.unwrap();
        backend.mark_started(&job_id).await.unwrap();

        let mut first = Map::new();
        first.insert("progress".to_string(), json!(30));
        first.insert("stage".to_string(), json!("warmup"));
        backend.put_progress(&job_id, first).await.unwrap();

        let mut second = Map::new();
        second.insert("progress".to_string(), json!(70));
        second.insert("note".to_string(), json!("x"));
        backend.put_progress(&job_id, second).await.unwrap();

        match backend.state(&job_id).await.unwrap() {
            JobState::Progress(snapshot) => {
                assert_eq!(snapshot["progress"], json!(70));
                assert_eq!(snapshot["note"], json!("x"));
                assert!(!snapshot.contains_key("stage"));
            },
            other => panic!("unexpected state: {other:?}"),
        }
    }

    #[tokio::test]
    async fn progress_after_terminal_state_is_ignored() {
        let backend = MemoryBackend::new();
        let job_id = backend.enqueue("t", json!({})).await.unwrap();
        backend.complete(&job_id, json!(1)).await.unwrap();

        let mut late = Map::new();
        late.insert("progress".to_string(), json!(10));
        backend.put_progress(&job_id, late).await.unwrap();

        assert_eq!(
            backend.state(&job_id).await.unwrap(),
            JobState::Success(json!(1))
        );
    }

    #[tokio::test]
    async fn unknown_handle_reports_pending() {
        let backend = MemoryBackend::new();
        assert_eq!(
            backend.state("no-such-job").await.unwrap(),
            JobState::Pending
        );
    }

    #[tokio::test]
    async fn fail_records_description() {
        let backend = MemoryBackend::new();
        let job_id = backend.enqueue("t", json!({})).await.unwrap();
        backend.fail(&job_id, "upstream exhausted").await.unwrap();
        assert_eq!(
            backend.state(&job_id).await.unwrap(),
            JobState::Failure("upstream exhausted".to_string())
        );
    }
}
