//! Redis job backend for deferred execution.
//!
//! [`RedisBackend`] implements [`JobBackend`] using Redis as both the queue
//! and the state store. Jobs wait in a list; each job's lifecycle lives in a
//! hash keyed by its handle. Writes that must respect the terminal-state
//! guard go through Lua scripts (`redis::Script`) so the check and the
//! update happen in a single round-trip.
//!
//! # Key Schema
//!
//! | Key Pattern | Type | Purpose |
//! |-------------|------|---------|
//! | `{prefix}:job:{job_id}` | Hash | Job lifecycle record |
//! | `{prefix}:queue` | List | Pending job envelopes (FIFO) |
//!
//! Each job hash carries separate fields:
//!
//! | Field | Type | Description |
//! |-------|------|-------------|
//! | `task` | String | Registered task name |
//! | `state` | String | `pending`, `started`, `progress`, `success`, `failure` |
//! | `meta` | String (JSON) | Latest progress snapshot (only in `progress`) |
//! | `result` | String (JSON) | Final result payload (only in `success`) |
//! | `error` | String | Failure message (only in `failure`) |
//! | `enqueued_at` | String (RFC 3339) | Submission timestamp |
//!
//! The backend stores opaque values and never interprets progress snapshots
//! or results; projection into the client-facing shape happens in
//! [`status`](crate::status).
//!
//! # Usage
//!
//! ```rust,no_run
//! use conveyor::backend::redis::RedisBackend;
//!
//! # async fn example() {
//! let backend = RedisBackend::new("redis://127.0.0.1:6379").await.unwrap();
//! # }
//! ```

use std::collections::HashMap;

use ::redis::aio::MultiplexedConnection;
use ::redis::{AsyncCommands, Script};
use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{JobBackend, JobEnvelope};
use crate::error::BackendError;
use crate::status::JobState;

// ---------------------------------------------------------------------------
// Lua script constants
// ---------------------------------------------------------------------------

/// Enqueue: create the job hash and push the envelope in one round-trip.
///
/// KEYS[1] = job hash key, KEYS[2] = queue list key.
/// ARGV[1] = task name, ARGV[2] = enqueued_at (RFC 3339),
/// ARGV[3] = envelope JSON.
/// Returns: 1.
const LUA_ENQUEUE: &str = r#"
redis.call('HSET', KEYS[1], 'task', ARGV[1], 'state', 'pending', 'enqueued_at', ARGV[2])
redis.call('RPUSH', KEYS[2], ARGV[3])
return 1
"#;

/// Guarded start: mark the job running unless it already finished.
///
/// KEYS[1] = job hash key.
/// Returns: 1 on transition, 0 if the job is terminal, -1 if unknown.
const LUA_MARK_STARTED: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return -1
end
local state = redis.call('HGET', KEYS[1], 'state')
if state == 'success' or state == 'failure' then
    return 0
end
redis.call('HSET', KEYS[1], 'state', 'started')
return 1
"#;

/// Guarded progress write: overwrite the snapshot unless the job finished.
///
/// KEYS[1] = job hash key. ARGV[1] = snapshot JSON.
/// Returns: 1 on write, 0 if the job is terminal, -1 if unknown.
const LUA_PUT_PROGRESS: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return -1
end
local state = redis.call('HGET', KEYS[1], 'state')
if state == 'success' or state == 'failure' then
    return 0
end
redis.call('HSET', KEYS[1], 'state', 'progress', 'meta', ARGV[1])
return 1
"#;

/// Success write: record the result and clear any progress snapshot.
///
/// KEYS[1] = job hash key. ARGV[1] = result JSON.
const LUA_COMPLETE: &str = r#"
redis.call('HSET', KEYS[1], 'state', 'success', 'result', ARGV[1])
redis.call('HDEL', KEYS[1], 'meta', 'error')
return 1
"#;

/// Failure write: record the error message and clear any progress snapshot.
///
/// KEYS[1] = job hash key. ARGV[1] = error message.
const LUA_FAIL: &str = r#"
redis.call('HSET', KEYS[1], 'state', 'failure', 'error', ARGV[1])
redis.call('HDEL', KEYS[1], 'meta', 'result')
return 1
"#;

// ---------------------------------------------------------------------------
// RedisBackend struct
// ---------------------------------------------------------------------------

/// Redis-backed job queue and state store.
///
/// # Connection Model
///
/// `RedisBackend` holds a [`MultiplexedConnection`] which is designed to be
/// cloned cheaply -- all clones share the same underlying TCP connection.
/// Each method clones the connection for concurrent safety. This is also
/// why [`claim`](JobBackend::claim) uses `LPOP` rather than `BLPOP`: a
/// blocking command would stall every other user of the shared connection,
/// so the worker polls instead.
///
/// # Examples
///
/// ```rust,no_run
/// use conveyor::backend::redis::RedisBackend;
///
/// # async fn example() {
/// // Connect to local Redis:
/// let backend = RedisBackend::new("redis://127.0.0.1:6379").await.unwrap();
///
/// // With custom prefix for isolation:
/// let backend = RedisBackend::new("redis://127.0.0.1:6379")
///     .await
///     .unwrap()
///     .with_prefix("staging");
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RedisBackend {
    conn: MultiplexedConnection,
    key_prefix: String,
}

impl RedisBackend {
    /// Creates a backend by connecting to Redis at the given URL.
    ///
    /// The URL format is `redis://[:<password>@]<host>:<port>[/<db>]`.
    /// Uses the default key prefix `"conveyor"`. Fails fast if the
    /// connection cannot be established, so a misconfigured deployment
    /// dies at startup rather than on the first submission.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Backend`] if the Redis client cannot be
    /// created or the connection cannot be established.
    pub async fn new(url: &str) -> Result<Self, BackendError> {
        let client = ::redis::Client::open(url)
            .map_err(|e| BackendError::backend(format!("failed to create Redis client: {e}"), e))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BackendError::backend(format!("failed to connect to Redis: {e}"), e))?;
        Ok(Self {
            conn,
            key_prefix: "conveyor".to_string(),
        })
    }

    /// Creates a backend with a pre-built multiplexed connection.
    ///
    /// Useful when the caller manages connection lifecycle or needs custom
    /// connection configuration. Uses the default key prefix `"conveyor"`.
    pub fn with_connection(conn: MultiplexedConnection) -> Self {
        Self {
            conn,
            key_prefix: "conveyor".to_string(),
        }
    }

    /// Sets a custom key prefix (builder pattern).
    ///
    /// Useful for test isolation: each test run can use a unique prefix to
    /// avoid key collisions. The prefix is used in all Redis keys:
    /// `{prefix}:job:{job_id}` and `{prefix}:queue`.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

impl RedisBackend {
    /// Constructs the Redis hash key for a job record.
    fn job_key(&self, job_id: &str) -> String {
        format!("{}:job:{}", self.key_prefix, job_id)
    }

    /// Constructs the Redis list key for the pending-job queue.
    fn queue_key(&self) -> String {
        format!("{}:queue", self.key_prefix)
    }

    /// Creates the hash record for a fresh submission and returns its handle.
    async fn record_pending(&self, task_name: &str, queue_envelope: Option<&JobEnvelope>) -> Result<String, BackendError> {
        match queue_envelope {
            Some(envelope) => {
                let payload =
                    serde_json::to_string(envelope).map_err(BackendError::codec)?;
                let script = Script::new(LUA_ENQUEUE);
                let _: i64 = script
                    .key(self.job_key(&envelope.job_id))
                    .key(self.queue_key())
                    .arg(task_name)
                    .arg(envelope.enqueued_at.to_rfc3339())
                    .arg(&payload)
                    .invoke_async(&mut self.conn.clone())
                    .await
                    .map_err(|e| map_redis_error(e, &envelope.job_id))?;
                Ok(envelope.job_id.clone())
            },
            None => {
                let job_id = uuid::Uuid::new_v4().to_string();
                let enqueued_at = chrono::Utc::now().to_rfc3339();
                let mut conn = self.conn.clone();
                let _: () = conn
                    .hset_multiple(
                        self.job_key(&job_id),
                        &[
                            ("task", task_name),
                            ("state", "pending"),
                            ("enqueued_at", enqueued_at.as_str()),
                        ],
                    )
                    .await
                    .map_err(|e| map_redis_error(e, &job_id))?;
                Ok(job_id)
            },
        }
    }
}

/// Maps a Redis error to a [`BackendError::Backend`].
fn map_redis_error(err: ::redis::RedisError, job_id: &str) -> BackendError {
    BackendError::backend(format!("Redis error for job {job_id}: {err}"), err)
}

/// Reconstructs a [`JobState`] from the raw hash fields.
///
/// An empty hash means the handle is unknown (or expired), which reads as
/// `Pending` so that polling a stale handle degrades gracefully instead of
/// surfacing a storage error.
fn state_from_fields(job_id: &str, fields: HashMap<String, String>) -> Result<JobState, BackendError> {
    let Some(state) = fields.get("state") else {
        return Ok(JobState::Pending);
    };
    match state.as_str() {
        "pending" => Ok(JobState::Pending),
        "started" => Ok(JobState::Started),
        "progress" => {
            let raw = fields.get("meta").map(String::as_str).unwrap_or("{}");
            let snapshot: Map<String, Value> =
                serde_json::from_str(raw).map_err(BackendError::codec)?;
            Ok(JobState::Progress(snapshot))
        },
        "success" => {
            let raw = fields.get("result").ok_or_else(|| BackendError::Backend {
                message: format!("missing result field for job {job_id}"),
                source: None,
            })?;
            let result: Value = serde_json::from_str(raw).map_err(BackendError::codec)?;
            Ok(JobState::Success(result))
        },
        "failure" => Ok(JobState::Failure(
            fields.get("error").cloned().unwrap_or_default(),
        )),
        other => Ok(JobState::Other(other.to_string())),
    }
}

// ---------------------------------------------------------------------------
// JobBackend implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl JobBackend for RedisBackend {
    async fn insert(&self, task_name: &str, _input: Value) -> Result<String, BackendError> {
        self.record_pending(task_name, None).await
    }

    async fn enqueue(&self, task_name: &str, input: Value) -> Result<String, BackendError> {
        let envelope = JobEnvelope {
            job_id: uuid::Uuid::new_v4().to_string(),
            task_name: task_name.to_string(),
            input,
            enqueued_at: chrono::Utc::now(),
        };
        self.record_pending(task_name, Some(&envelope)).await
    }

    async fn claim(&self) -> Result<Option<JobEnvelope>, BackendError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .lpop(self.queue_key(), None)
            .await
            .map_err(|e| map_redis_error(e, "<queue>"))?;
        match raw {
            Some(payload) => {
                let envelope: JobEnvelope =
                    serde_json::from_str(&payload).map_err(BackendError::codec)?;
                Ok(Some(envelope))
            },
            None => Ok(None),
        }
    }

    async fn mark_started(&self, job_id: &str) -> Result<(), BackendError> {
        let script = Script::new(LUA_MARK_STARTED);
        let _: i64 = script
            .key(self.job_key(job_id))
            .invoke_async(&mut self.conn.clone())
            .await
            .map_err(|e| map_redis_error(e, job_id))?;
        // 0 (terminal) and -1 (unknown handle) are deliberate no-ops.
        Ok(())
    }

    async fn put_progress(
        &self,
        job_id: &str,
        snapshot: Map<String, Value>,
    ) -> Result<(), BackendError> {
        let payload =
            serde_json::to_string(&Value::Object(snapshot)).map_err(BackendError::codec)?;
        let script = Script::new(LUA_PUT_PROGRESS);
        let _: i64 = script
            .key(self.job_key(job_id))
            .arg(&payload)
            .invoke_async(&mut self.conn.clone())
            .await
            .map_err(|e| map_redis_error(e, job_id))?;
        Ok(())
    }

    async fn complete(&self, job_id: &str, result: Value) -> Result<(), BackendError> {
        let payload = serde_json::to_string(&result).map_err(BackendError::codec)?;
        let script = Script::new(LUA_COMPLETE);
        let _: i64 = script
            .key(self.job_key(job_id))
            .arg(&payload)
            .invoke_async(&mut self.conn.clone())
            .await
            .map_err(|e| map_redis_error(e, job_id))?;
        Ok(())
    }

    async fn fail(&self, job_id: &str, message: &str) -> Result<(), BackendError> {
        let script = Script::new(LUA_FAIL);
        let _: i64 = script
            .key(self.job_key(job_id))
            .arg(message)
            .invoke_async(&mut self.conn.clone())
            .await
            .map_err(|e| map_redis_error(e, job_id))?;
        Ok(())
    }

    async fn state(&self, job_id: &str) -> Result<JobState, BackendError> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn
            .hgetall(self.job_key(job_id))
            .await
            .map_err(|e| map_redis_error(e, job_id))?;
        state_from_fields(job_id, fields)
    }
}

// ---------------------------------------------------------------------------
// Integration tests -- Redis backend contract tests
// ---------------------------------------------------------------------------

/// Integration tests for [`RedisBackend`] against a real Redis instance.
///
/// These tests require:
/// - A running Redis instance (default: `redis://127.0.0.1:6379`)
/// - Set `REDIS_URL` environment variable to override the connection URL
///
/// Run with:
/// ```bash
/// cargo test --features redis-tests -- redis_ --test-threads=1
/// ```
///
/// Each test uses a unique UUID-based key prefix for isolation, so tests
/// do not interfere with each other and no cleanup is needed.
#[cfg(all(test, feature = "redis-tests"))]
mod integration_tests {
    use super::*;
    use serde_json::json;

    /// Creates a test backend with a unique key prefix for isolation.
    async fn test_backend() -> RedisBackend {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let backend = RedisBackend::new(&url)
            .await
            .expect("Redis connection failed -- is Redis running?");
        backend.with_prefix(format!("test-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn redis_unknown_handle_reads_pending() {
        let backend = test_backend().await;
        let state = backend.state("no-such-job").await.unwrap();
        assert!(matches!(state, JobState::Pending));
    }

    #[tokio::test]
    async fn redis_enqueue_then_claim_round_trips_envelope() {
        let backend = test_backend().await;
        let job_id = backend
            .enqueue("travel_time", json!({"origin": "0.1,51.5"}))
            .await
            .unwrap();

        let envelope = backend.claim().await.unwrap().expect("queued envelope");
        assert_eq!(envelope.job_id, job_id);
        assert_eq!(envelope.task_name, "travel_time");
        assert_eq!(envelope.input, json!({"origin": "0.1,51.5"}));

        // Queue drained.
        assert!(backend.claim().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn redis_claim_preserves_fifo_order() {
        let backend = test_backend().await;
        let first = backend.enqueue("a", json!({})).await.unwrap();
        let second = backend.enqueue("b", json!({})).await.unwrap();

        assert_eq!(backend.claim().await.unwrap().unwrap().job_id, first);
        assert_eq!(backend.claim().await.unwrap().unwrap().job_id, second);
    }

    #[tokio::test]
    async fn redis_lifecycle_pending_started_progress_success() {
        let backend = test_backend().await;
        let job_id = backend.enqueue("t", json!({})).await.unwrap();
        assert!(matches!(
            backend.state(&job_id).await.unwrap(),
            JobState::Pending
        ));

        backend.mark_started(&job_id).await.unwrap();
        assert!(matches!(
            backend.state(&job_id).await.unwrap(),
            JobState::Started
        ));

        let mut snapshot = Map::new();
        snapshot.insert("progress".to_string(), json!(40));
        backend.put_progress(&job_id, snapshot).await.unwrap();
        match backend.state(&job_id).await.unwrap() {
            JobState::Progress(meta) => assert_eq!(meta["progress"], json!(40)),
            other => panic!("expected Progress, got {other:?}"),
        }

        backend.complete(&job_id, json!({"minutes": 12.5})).await.unwrap();
        match backend.state(&job_id).await.unwrap() {
            JobState::Success(result) => assert_eq!(result, json!({"minutes": 12.5})),
            other => panic!("expected Success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn redis_progress_overwrites_previous_snapshot() {
        let backend = test_backend().await;
        let job_id = backend.enqueue("t", json!({})).await.unwrap();

        let mut first = Map::new();
        first.insert("progress".to_string(), json!(10));
        first.insert("leg".to_string(), json!("a-b"));
        backend.put_progress(&job_id, first).await.unwrap();

        let mut second = Map::new();
        second.insert("progress".to_string(), json!(90));
        backend.put_progress(&job_id, second).await.unwrap();

        match backend.state(&job_id).await.unwrap() {
            JobState::Progress(meta) => {
                assert_eq!(meta["progress"], json!(90));
                assert!(!meta.contains_key("leg"), "stale keys must not linger");
            },
            other => panic!("expected Progress, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn redis_terminal_state_ignores_late_writes() {
        let backend = test_backend().await;
        let job_id = backend.enqueue("t", json!({})).await.unwrap();
        backend.fail(&job_id, "timed out").await.unwrap();

        backend.mark_started(&job_id).await.unwrap();
        let mut snapshot = Map::new();
        snapshot.insert("progress".to_string(), json!(50));
        backend.put_progress(&job_id, snapshot).await.unwrap();

        match backend.state(&job_id).await.unwrap() {
            JobState::Failure(msg) => assert_eq!(msg, "timed out"),
            other => panic!("expected Failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn redis_insert_records_without_queueing() {
        let backend = test_backend().await;
        let job_id = backend.insert("t", json!({})).await.unwrap();
        assert!(matches!(
            backend.state(&job_id).await.unwrap(),
            JobState::Pending
        ));
        assert!(backend.claim().await.unwrap().is_none());
    }
}
