//! Backend-native job states and their projection into the fixed
//! status vocabulary.
//!
//! Backends report execution state in their own vocabulary,
//! [`JobState`]. Clients only ever see the projected [`StatusView`]
//! with four stable labels -- `pending`, `running`, `done`, `error` --
//! plus a lowercase passthrough for states outside the known set.
//! [`project`] is pure and idempotent: polling an unchanged backend
//! state yields a byte-identical status object.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::PROGRESS_KEY;

/// Raw execution state as reported by a queue backend.
///
/// This mirrors the state vocabulary of common result backends:
/// a job is pending until a worker picks it up, started while
/// executing, carries a progress snapshot once the body reports one,
/// and ends in success or failure (with retry treated as a failure
/// variant). Unknown handles are reported as [`JobState::Pending`] by
/// convention -- most backends cannot distinguish an unknown id from
/// a job that has not started yet.
#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    /// Not yet started (or unknown to the backend).
    Pending,

    /// Executing, no progress snapshot published yet.
    Started,

    /// Executing, with the latest progress snapshot. The percentage
    /// lives under the reserved `progress` key; everything else is
    /// caller metadata.
    Progress(Map<String, Value>),

    /// Completed successfully with the body's return value.
    Success(Value),

    /// Completed with a failure description.
    Failure(String),

    /// Scheduled for retry after a failure; the description records
    /// the triggering error.
    Retry(String),

    /// A backend-native state outside the known vocabulary.
    Other(String),
}

/// The projected status object returned to polling clients.
///
/// Serializes as `{"status": ..., "progress"?, "result"?, "error"?,
/// ...extra}` with optional fields omitted when absent and extra
/// snapshot metadata flattened at the top level in stored order.
///
/// # Examples
///
/// ```
/// use conveyor::status::{project, JobState};
/// use serde_json::json;
///
/// let view = project(&JobState::Success(json!({"duration": 42.0})));
/// let json = serde_json::to_value(&view).unwrap();
/// assert_eq!(json["status"], "done");
/// assert_eq!(json["result"]["duration"], 42.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusView {
    /// One of `pending`, `running`, `done`, `error`, or a lowercase
    /// backend-native label.
    pub status: String,

    /// Latest reported percentage in `[0, 100]`, when running with a
    /// snapshot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,

    /// The body's return value, when done.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Failure description, when errored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Snapshot metadata passed through verbatim (every key besides
    /// the reserved progress key).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StatusView {
    fn bare(status: &str) -> Self {
        Self {
            status: status.to_string(),
            progress: None,
            result: None,
            error: None,
            extra: Map::new(),
        }
    }
}

/// Projects a backend-native state onto the fixed status vocabulary.
///
/// The mapping is:
///
/// | raw state            | projected                                   |
/// |----------------------|---------------------------------------------|
/// | `Pending`            | `pending`                                   |
/// | `Started`            | `running`, progress absent                  |
/// | `Progress(snapshot)` | `running` + percentage + extra keys verbatim|
/// | `Success(value)`     | `done` + result verbatim                    |
/// | `Failure(msg)`       | `error` + description                       |
/// | `Retry(msg)`         | `error` + description                       |
/// | `Other(label)`       | lowercased label passthrough                |
///
/// Pure and idempotent: no side effects, and equal inputs produce
/// equal outputs.
pub fn project(state: &JobState) -> StatusView {
    match state {
        JobState::Pending => StatusView::bare("pending"),
        JobState::Started => StatusView::bare("running"),
        JobState::Progress(snapshot) => {
            let mut view = StatusView::bare("running");
            for (key, value) in snapshot {
                if key == PROGRESS_KEY {
                    view.progress = value.as_u64().map(|p| p.min(100) as u8);
                } else {
                    view.extra.insert(key.clone(), value.clone());
                }
            }
            view
        },
        JobState::Success(result) => {
            let mut view = StatusView::bare("done");
            view.result = Some(result.clone());
            view
        },
        JobState::Failure(message) | JobState::Retry(message) => {
            let mut view = StatusView::bare("error");
            view.error = Some(message.clone());
            view
        },
        JobState::Other(label) => StatusView::bare(&label.to_lowercase()),
    }
}
