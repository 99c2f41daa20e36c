//! Progress reporting for running task bodies.
//!
//! A [`ProgressReporter`] is handed to every task body. Each call replaces
//! the job's progress snapshot wholesale; snapshots never accumulate across
//! calls, so a body that reports `{"leg": "a-b"}` and later just a percent
//! will not leave the stale `leg` key behind.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::backend::JobBackend;
use crate::constants::PROGRESS_KEY;
use crate::error::BackendError;

/// Write-side cap applied to reported percentages.
const PROGRESS_MAX: u8 = 100;

/// Handle through which a task body publishes progress.
///
/// Cloneable and cheap: it holds the job handle and a shared reference to
/// the backend. Both execution modes route through the same backend record,
/// so progress reported during an eager run is observable afterwards just
/// like a deferred one.
///
/// # Examples
///
/// ```no_run
/// use conveyor::progress::ProgressReporter;
/// use conveyor::TaskFailure;
///
/// async fn body(progress: ProgressReporter) -> Result<(), TaskFailure> {
///     progress.report(25).await?;
///     // ... work ...
///     progress.report(100).await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct ProgressReporter {
    backend: Arc<dyn JobBackend>,
    job_id: String,
}

impl ProgressReporter {
    /// Creates a reporter bound to one job record.
    pub fn new(backend: Arc<dyn JobBackend>, job_id: impl Into<String>) -> Self {
        Self {
            backend,
            job_id: job_id.into(),
        }
    }

    /// The handle of the job this reporter writes to.
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Publishes a bare percentage, capped at 100.
    pub async fn report(&self, percent: u8) -> Result<(), BackendError> {
        self.report_with(percent, Map::new()).await
    }

    /// Publishes a percentage together with task-specific metadata.
    ///
    /// The snapshot written is `extra` plus a `progress` key holding the
    /// capped percentage. If `extra` itself carries a `progress` key, the
    /// capped percentage wins.
    pub async fn report_with(
        &self,
        percent: u8,
        extra: Map<String, Value>,
    ) -> Result<(), BackendError> {
        let mut snapshot = extra;
        snapshot.insert(
            PROGRESS_KEY.to_string(),
            Value::from(percent.min(PROGRESS_MAX)),
        );
        self.backend.put_progress(&self.job_id, snapshot).await
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("job_id", &self.job_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::status::JobState;
    use serde_json::json;

    async fn reporter() -> (Arc<MemoryBackend>, ProgressReporter, String) {
        let backend = Arc::new(MemoryBackend::new());
        let job_id = backend.insert("t", json!({})).await.unwrap();
        let reporter = ProgressReporter::new(backend.clone(), job_id.clone());
        (backend, reporter, job_id)
    }

    #[tokio::test]
    async fn report_writes_progress_key() {
        let (backend, reporter, job_id) = reporter().await;
        reporter.report(42).await.unwrap();

        match backend.state(&job_id).await.unwrap() {
            JobState::Progress(meta) => assert_eq!(meta[PROGRESS_KEY], json!(42)),
            other => panic!("expected Progress, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn report_caps_at_one_hundred() {
        let (backend, reporter, job_id) = reporter().await;
        reporter.report(250).await.unwrap();

        match backend.state(&job_id).await.unwrap() {
            JobState::Progress(meta) => assert_eq!(meta[PROGRESS_KEY], json!(100)),
            other => panic!("expected Progress, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn report_with_merges_extra_metadata() {
        let (backend, reporter, job_id) = reporter().await;
        let mut extra = Map::new();
        extra.insert("leg".to_string(), json!("depot-stop1"));
        reporter.report_with(10, extra).await.unwrap();

        match backend.state(&job_id).await.unwrap() {
            JobState::Progress(meta) => {
                assert_eq!(meta[PROGRESS_KEY], json!(10));
                assert_eq!(meta["leg"], json!("depot-stop1"));
            },
            other => panic!("expected Progress, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn capped_percent_wins_over_extra_progress_key() {
        let (backend, reporter, job_id) = reporter().await;
        let mut extra = Map::new();
        extra.insert(PROGRESS_KEY.to_string(), json!("not-a-number"));
        reporter.report_with(55, extra).await.unwrap();

        match backend.state(&job_id).await.unwrap() {
            JobState::Progress(meta) => assert_eq!(meta[PROGRESS_KEY], json!(55)),
            other => panic!("expected Progress, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn snapshots_replace_rather_than_accumulate() {
        let (backend, reporter, job_id) = reporter().await;
        let mut extra = Map::new();
        extra.insert("leg".to_string(), json!("depot-stop1"));
        reporter.report_with(10, extra).await.unwrap();
        reporter.report(80).await.unwrap();

        match backend.state(&job_id).await.unwrap() {
            JobState::Progress(meta) => {
                assert_eq!(meta[PROGRESS_KEY], json!(80));
                assert!(!meta.contains_key("leg"));
            },
            other => panic!("expected Progress, got {other:?}"),
        }
    }
}
