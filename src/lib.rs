//! Declarative task execution over HTTP.
//!
//! Register typed task bodies once at startup and get a uniform HTTP
//! surface for free: one submission endpoint per task, a shared status
//! endpoint, schema validation with field-level errors, and progress
//! reporting while a task runs.
//!
//! # Overview
//!
//! A submission flows through the crate in one straight line: the
//! generated endpoint unwraps an optional `payload`/`input` envelope,
//! validates the body against the task's declared schema, and hands it to
//! the execution adapter. In eager mode the body runs inline; in deferred
//! mode it is queued for a separate worker process. Either way the caller
//! gets back a handle and polls `GET /tasks/{task_id}`, where the job's
//! raw backend state is projected onto the fixed vocabulary `pending` /
//! `running` / `done` / `error`.
//!
//! # Module Organization
//!
//! - [`schema`] / [`validate`] - declared input shapes and request validation
//! - [`registry`] - task registration, sealed for read-only sharing
//! - [`dispatch`] - eager/deferred submission with a uniform response
//! - [`progress`] / [`status`] - progress snapshots and status projection
//! - [`backend`] - queue and job-state storage (in-memory and Redis)
//! - [`worker`] - the deferred-mode claim-and-execute loop
//! - [`http`] - the axum router and handlers
//! - [`tasks`] - built-in OSRM routing tasks
//!
//! # Quickstart
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use conveyor::backend::memory::MemoryBackend;
//! use conveyor::http::{self, AppState};
//! use conveyor::tasks::{self, osrm::OsrmClient};
//! use conveyor::{Dispatcher, ExecutionMode, TaskRegistry};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let mut registry = TaskRegistry::new();
//! tasks::register_builtin(&mut registry, Arc::new(OsrmClient::new("http://localhost:5000")))?;
//!
//! let backend = Arc::new(MemoryBackend::new());
//! let state = Arc::new(AppState {
//!     registry: registry.seal(),
//!     dispatcher: Dispatcher::new(backend, ExecutionMode::Eager),
//! });
//! http::serve("127.0.0.1:8000", state).await
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod progress;
pub mod registry;
pub mod schema;
pub mod status;
pub mod tasks;
pub mod validate;
pub mod worker;

// Re-exports for ergonomic access
pub use config::{Config, ConfigError};
pub use dispatch::{Dispatcher, ExecutionMode, Submission};
pub use error::{BackendError, TaskFailure};
pub use progress::ProgressReporter;
pub use registry::{RegistryError, SealedRegistry, TaskRegistry};
pub use schema::{FieldKind, InputSchema, TaskInput};
pub use status::{project, JobState, StatusView};
pub use validate::{unwrap_envelope, validate, Payload, ValidationIssue};
pub use worker::Worker;
