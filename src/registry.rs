//! Task registration and lookup.
//!
//! A [`TaskRegistry`] maps task names to their declared input schemas and
//! type-erased bodies. Registration happens once at startup; the registry is
//! then [sealed](TaskRegistry::seal) and shared read-only between the HTTP
//! layer (route generation, validation) and the execution adapter.
//!
//! Task bodies are written against concrete input/output types. The
//! [`TaskDefinition`] wrapper erases both: the dispatcher hands it raw JSON
//! that already passed schema validation, and receives raw JSON back.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::error::TaskFailure;
use crate::progress::ProgressReporter;
use crate::schema::{InputSchema, TaskInput};

/// Registration failures.
///
/// These are programmer errors surfaced at startup; neither variant can
/// occur once the server is serving traffic.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A task with this name was already registered.
    #[error("task '{0}' is already registered")]
    Duplicate(String),

    /// The name cannot be used as a URL path segment.
    #[error("invalid task name '{0}': must be non-empty and contain no '/'")]
    InvalidName(String),
}

/// A type-erased task body.
///
/// Input arrives as JSON that already passed schema validation; the
/// implementation deserializes it, runs the typed body, and serializes the
/// typed result back to JSON.
#[async_trait]
pub trait DynTaskBody: Send + Sync {
    /// Runs the body against validated input.
    async fn run(&self, input: Value, progress: ProgressReporter) -> Result<Value, TaskFailure>;
}

/// A typed task body awaiting registration.
///
/// Pairs an input type (which declares its own [`InputSchema`]) with an
/// async closure producing a serializable result. The closure returns a
/// boxed future so plain `|input, progress| Box::pin(async move { .. })`
/// closures work without naming the future type.
pub struct TaskDefinition<T, O, F>
where
    T: TaskInput,
    O: Serialize + Send + Sync + 'static,
    F: Fn(T, ProgressReporter) -> Pin<Box<dyn Future<Output = Result<O, TaskFailure>> + Send>>
        + Send
        + Sync,
{
    body: F,
    _phantom: PhantomData<fn(T) -> O>,
}

impl<T, O, F> TaskDefinition<T, O, F>
where
    T: TaskInput,
    O: Serialize + Send + Sync + 'static,
    F: Fn(T, ProgressReporter) -> Pin<Box<dyn Future<Output = Result<O, TaskFailure>> + Send>>
        + Send
        + Sync,
{
    /// Wraps a typed body closure.
    pub fn new(body: F) -> Self {
        Self {
            body,
            _phantom: PhantomData,
        }
    }
}

#[async_trait]
impl<T, O, F> DynTaskBody for TaskDefinition<T, O, F>
where
    T: TaskInput,
    O: Serialize + Send + Sync + 'static,
    F: Fn(T, ProgressReporter) -> Pin<Box<dyn Future<Output = Result<O, TaskFailure>> + Send>>
        + Send
        + Sync,
{
    async fn run(&self, input: Value, progress: ProgressReporter) -> Result<Value, TaskFailure> {
        // Validation ran against the same schema the type declares, so a
        // decode failure here means the schema and the type disagree.
        let typed: T = serde_json::from_value(input)
            .map_err(|e| TaskFailure::new(format!("input decode failed: {e}")))?;
        let result = (self.body)(typed, progress).await?;
        serde_json::to_value(result)
            .map_err(|e| TaskFailure::new(format!("result encode failed: {e}")))
    }
}

/// One registered task: its name, declared input schema, and erased body.
pub struct TaskDescriptor {
    name: String,
    schema: InputSchema,
    body: Box<dyn DynTaskBody>,
}

impl TaskDescriptor {
    /// The task's registered name (also its URL path segment).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The input schema requests are validated against.
    pub fn schema(&self) -> &InputSchema {
        &self.schema
    }

    /// Runs the body against validated input.
    pub async fn run(
        &self,
        input: Value,
        progress: ProgressReporter,
    ) -> Result<Value, TaskFailure> {
        self.body.run(input, progress).await
    }
}

impl fmt::Debug for TaskDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDescriptor")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .finish()
    }
}

/// The set of registered tasks, in registration order.
///
/// # Examples
///
/// ```
/// use conveyor::registry::TaskRegistry;
/// use conveyor::schema::{InputSchema, FieldKind, TaskInput};
/// use conveyor::TaskFailure;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Echo { text: String }
///
/// impl TaskInput for Echo {
///     fn schema() -> InputSchema {
///         InputSchema::new().required("text", FieldKind::string())
///     }
/// }
///
/// let mut registry = TaskRegistry::new();
/// registry
///     .register("echo", |input: Echo, _progress| {
///         Box::pin(async move { Ok::<_, TaskFailure>(input.text) })
///     })
///     .unwrap();
/// let registry = registry.seal();
/// assert!(registry.get("echo").is_some());
/// ```
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: Vec<Arc<TaskDescriptor>>,
}

impl TaskRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a typed task body under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if the name is taken, or
    /// [`RegistryError::InvalidName`] if it cannot form a URL segment.
    pub fn register<T, O, F>(&mut self, name: &str, body: F) -> Result<(), RegistryError>
    where
        T: TaskInput,
        O: Serialize + Send + Sync + 'static,
        F: Fn(T, ProgressReporter) -> Pin<Box<dyn Future<Output = Result<O, TaskFailure>> + Send>>
            + Send
            + Sync
            + 'static,
    {
        if name.is_empty() || name.contains('/') {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        if self.tasks.iter().any(|t| t.name == name) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }
        self.tasks.push(Arc::new(TaskDescriptor {
            name: name.to_string(),
            schema: T::schema(),
            body: Box::new(TaskDefinition::new(body)),
        }));
        Ok(())
    }

    /// Freezes the registry for read-only sharing.
    ///
    /// Routes and validation both read from the sealed registry; there is
    /// no way to add tasks afterwards.
    pub fn seal(self) -> SealedRegistry {
        SealedRegistry {
            tasks: Arc::from(self.tasks),
        }
    }
}

/// An immutable, cheaply cloneable view of the registered tasks.
#[derive(Debug, Clone)]
pub struct SealedRegistry {
    tasks: Arc<[Arc<TaskDescriptor>]>,
}

impl SealedRegistry {
    /// Looks up a task by name.
    pub fn get(&self, name: &str) -> Option<&Arc<TaskDescriptor>> {
        self.tasks.iter().find(|t| t.name == name)
    }

    /// All tasks, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<TaskDescriptor>> {
        self.tasks.iter()
    }

    /// Number of registered tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the registry holds no tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::schema::FieldKind;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Serialize, Deserialize)]
    struct Doubler {
        n: i64,
    }

    impl TaskInput for Doubler {
        fn schema() -> InputSchema {
            InputSchema::new().required("n", FieldKind::integer())
        }
    }

    fn doubler_registry() -> TaskRegistry {
        let mut registry = TaskRegistry::new();
        registry
            .register("double", |input: Doubler, _progress| {
                Box::pin(async move { Ok::<_, TaskFailure>(json!({"doubled": input.n * 2})) })
            })
            .unwrap();
        registry
    }

    fn test_progress() -> ProgressReporter {
        ProgressReporter::new(Arc::new(MemoryBackend::new()), "test-job")
    }

    #[test]
    fn register_rejects_duplicate_names() {
        let mut registry = doubler_registry();
        let err = registry
            .register("double", |input: Doubler, _progress| {
                Box::pin(async move { Ok::<_, TaskFailure>(input.n) })
            })
            .unwrap_err();
        assert_eq!(err, RegistryError::Duplicate("double".to_string()));
    }

    #[test]
    fn register_rejects_names_that_break_routing() {
        let mut registry = TaskRegistry::new();
        for bad in ["", "a/b"] {
            let err = registry
                .register(bad, |input: Doubler, _progress| {
                    Box::pin(async move { Ok::<_, TaskFailure>(input.n) })
                })
                .unwrap_err();
            assert_eq!(err, RegistryError::InvalidName(bad.to_string()));
        }
    }

    #[test]
    fn sealed_registry_preserves_registration_order() {
        let mut registry = TaskRegistry::new();
        for name in ["c", "a", "b"] {
            registry
                .register(name, |input: Doubler, _progress| {
                    Box::pin(async move { Ok::<_, TaskFailure>(input.n) })
                })
                .unwrap();
        }
        let sealed = registry.seal();
        let names: Vec<&str> = sealed.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn lookup_by_name() {
        let sealed = doubler_registry().seal();
        assert!(sealed.get("double").is_some());
        assert!(sealed.get("triple").is_none());
    }

    #[tokio::test]
    async fn erased_body_round_trips_typed_io() {
        let sealed = doubler_registry().seal();
        let task = sealed.get("double").unwrap();
        let out = task.run(json!({"n": 21}), test_progress()).await.unwrap();
        assert_eq!(out, json!({"doubled": 42}));
    }

    #[tokio::test]
    async fn body_failure_carries_message() {
        let mut registry = TaskRegistry::new();
        registry
            .register("boom", |_input: Doubler, _progress| {
                Box::pin(async move { Err::<Value, _>(TaskFailure::new("no route found")) })
            })
            .unwrap();
        let sealed = registry.seal();
        let err = sealed
            .get("boom")
            .unwrap()
            .run(json!({"n": 1}), test_progress())
            .await
            .unwrap_err();
        assert_eq!(err.message(), "no route found");
    }
}
