//! Error types for task execution and backend operations.
//!
//! [`TaskFailure`] is the error a task body returns (or the framework
//! records on its behalf); [`BackendError`] covers raw queue/state
//! backend failures. Validation errors live in [`crate::validate`],
//! configuration errors in [`crate::config`].

use std::fmt;

/// A task body failed.
///
/// Carries a human-readable description that the status projection
/// surfaces verbatim under the `error` field. Task bodies construct
/// these after exhausting their own retries or on unrecoverable
/// faults.
///
/// # Examples
///
/// ```
/// use conveyor::TaskFailure;
///
/// let failure = TaskFailure::new("failed to fetch travel time after 10 attempts");
/// assert!(failure.to_string().contains("10 attempts"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    message: String,
}

impl TaskFailure {
    /// Creates a failure with the given description.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The failure description as recorded on the backend.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TaskFailure {}

impl From<reqwest::Error> for TaskFailure {
    fn from(err: reqwest::Error) -> Self {
        Self::new(format!("upstream request failed: {err}"))
    }
}

impl From<BackendError> for TaskFailure {
    fn from(err: BackendError) -> Self {
        Self::new(err.to_string())
    }
}

/// Errors from the raw queue/state backend.
///
/// These are low-level failures; the dispatcher and worker map them
/// into task failures or HTTP 5xx responses as appropriate.
///
/// # Examples
///
/// ```
/// use conveyor::BackendError;
///
/// let err = BackendError::Backend {
///     message: "connection refused".to_string(),
///     source: None,
/// };
/// assert_eq!(err.to_string(), "backend error: connection refused");
/// ```
#[derive(Debug)]
pub enum BackendError {
    /// Serialized payload could not be encoded or decoded.
    Codec {
        /// Human-readable description of the codec failure.
        message: String,
    },

    /// An I/O or backend-specific error (network failure, timeout).
    Backend {
        /// Human-readable description of the error.
        message: String,
        /// The underlying error, if available. Accessible via
        /// [`std::error::Error::source()`].
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Codec { message } => write!(f, "codec error: {message}"),
            Self::Backend { message, .. } => write!(f, "backend error: {message}"),
        }
    }
}

impl std::error::Error for BackendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Backend {
                source: Some(src), ..
            } => Some(src.as_ref()),
            _ => None,
        }
    }
}

impl BackendError {
    /// Wraps an arbitrary error as a backend failure with context.
    pub fn backend(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Backend {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a codec error from a serde failure.
    pub fn codec(err: serde_json::Error) -> Self {
        Self::Codec {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_failure_display_is_message() {
        let failure = TaskFailure::new("it broke");
        assert_eq!(failure.to_string(), "it broke");
        assert_eq!(failure.message(), "it broke");
    }

    #[test]
    fn backend_error_display() {
        let err = BackendError::Codec {
            message: "bad json".to_string(),
        };
        assert_eq!(err.to_string(), "codec error: bad json");

        let err = BackendError::Backend {
            message: "redis timeout".to_string(),
            source: None,
        };
        assert_eq!(err.to_string(), "backend error: redis timeout");
    }

    #[test]
    fn backend_error_source_propagates() {
        let inner = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        let err = BackendError::backend("queue unavailable", inner);
        let source = std::error::Error::source(&err);
        assert!(source.is_some());
        assert!(source.unwrap().to_string().contains("timed out"));
    }

    #[test]
    fn codec_error_has_no_source() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = BackendError::codec(serde_err);
        assert!(std::error::Error::source(&err).is_none());
    }
}
