//! Declarative input shapes for registered tasks.
//!
//! An [`InputSchema`] describes the structure a task's submission
//! payload must have: required fields, their kinds, and optional
//! pattern/range constraints. Schemas are declared once per task (via
//! [`TaskInput::schema`]) and checked by [`crate::validate`] before
//! the payload is deserialized into the task's typed input.
//!
//! Schemas are a startup-time concern: they are built when tasks are
//! registered and never mutated afterwards. An invalid pattern in a
//! declared schema is a programmer error and panics at construction,
//! the same way a duplicate task name does at registration.

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// The declared kind of a schema field, with optional constraints.
#[derive(Debug, Clone)]
pub enum FieldKind {
    /// A JSON string, optionally constrained by a compiled pattern.
    String {
        /// Pattern the whole value must match, if any.
        pattern: Option<Regex>,
    },

    /// A JSON number (integer or float), optionally range-bounded.
    Number {
        /// Inclusive lower bound.
        min: Option<f64>,
        /// Inclusive upper bound.
        max: Option<f64>,
    },

    /// A JSON number that must be an integer, optionally range-bounded.
    Integer {
        /// Inclusive lower bound.
        min: Option<i64>,
        /// Inclusive upper bound.
        max: Option<i64>,
    },

    /// A JSON boolean.
    Bool,

    /// A nested object validated against its own schema.
    Object(InputSchema),

    /// An array whose every element matches the given kind.
    Array(Box<FieldKind>),
}

impl FieldKind {
    /// An unconstrained string field.
    pub fn string() -> Self {
        Self::String { pattern: None }
    }

    /// A string field constrained by a regular expression.
    ///
    /// # Panics
    ///
    /// Panics if `pattern` is not a valid regular expression. Schemas
    /// are declared at startup; a malformed pattern is a programmer
    /// error, not a recoverable condition.
    pub fn string_matching(pattern: &str) -> Self {
        let compiled = match Regex::new(pattern) {
            Ok(re) => re,
            Err(err) => panic!("invalid pattern in task schema: {err}"),
        };
        Self::String {
            pattern: Some(compiled),
        }
    }

    /// An unconstrained number field.
    pub fn number() -> Self {
        Self::Number {
            min: None,
            max: None,
        }
    }

    /// A number field with inclusive bounds (`None` leaves a side open).
    pub fn number_in(min: Option<f64>, max: Option<f64>) -> Self {
        Self::Number { min, max }
    }

    /// An unconstrained integer field.
    pub fn integer() -> Self {
        Self::Integer {
            min: None,
            max: None,
        }
    }

    /// An integer field with inclusive bounds (`None` leaves a side open).
    pub fn integer_in(min: Option<i64>, max: Option<i64>) -> Self {
        Self::Integer { min, max }
    }

    /// A short label for the kind, used in validation messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::String { .. } => "string",
            Self::Number { .. } => "number",
            Self::Integer { .. } => "integer",
            Self::Bool => "boolean",
            Self::Object(_) => "object",
            Self::Array(_) => "array",
        }
    }
}

/// A single named field in an [`InputSchema`].
#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// Field name as it appears in the JSON payload.
    pub name: String,

    /// The field's declared kind and constraints.
    pub kind: FieldKind,

    /// Whether the field must be present. Optional fields are checked
    /// only when present (their defaults are supplied by the typed
    /// input's serde attributes).
    pub required: bool,
}

/// A declarative description of a task's input shape.
///
/// Fields are kept in declaration order so validation issues come out
/// in a deterministic order.
///
/// # Examples
///
/// ```
/// use conveyor::schema::{FieldKind, InputSchema};
///
/// let schema = InputSchema::new()
///     .required("name", FieldKind::string())
///     .optional("retries", FieldKind::integer_in(Some(0), Some(10)));
/// assert_eq!(schema.fields().len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InputSchema {
    fields: Vec<FieldSpec>,
}

impl InputSchema {
    /// Creates an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a required field.
    pub fn required(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind,
            required: true,
        });
        self
    }

    /// Adds an optional field.
    pub fn optional(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind,
            required: false,
        });
        self
    }

    /// The fields in declaration order.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }
}

/// A strongly-typed task input.
///
/// Implementors pair a serde-deserializable struct with the
/// [`InputSchema`] used to validate raw payloads before
/// deserialization. Optional fields with defaults should carry
/// `#[serde(default)]` attributes so the schema can mark them
/// optional.
///
/// # Examples
///
/// ```
/// use conveyor::schema::{FieldKind, InputSchema, TaskInput};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Serialize, Deserialize)]
/// struct Greet {
///     name: String,
/// }
///
/// impl TaskInput for Greet {
///     fn schema() -> InputSchema {
///         InputSchema::new().required("name", FieldKind::string())
///     }
/// }
/// ```
pub trait TaskInput: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The schema raw payloads are validated against.
    fn schema() -> InputSchema;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_preserves_declaration_order() {
        let schema = InputSchema::new()
            .required("b", FieldKind::string())
            .required("a", FieldKind::number())
            .optional("c", FieldKind::Bool);
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn string_matching_compiles_pattern() {
        let kind = FieldKind::string_matching(r"^-?\d+\.\d+,-?\d+\.\d+$");
        match kind {
            FieldKind::String { pattern: Some(re) } => {
                assert!(re.is_match("-122.4194,37.7749"));
                assert!(!re.is_match("not-a-coordinate"));
            },
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    #[should_panic(expected = "invalid pattern")]
    fn string_matching_rejects_bad_pattern() {
        let _ = FieldKind::string_matching("([unclosed");
    }

    #[test]
    fn kind_labels() {
        assert_eq!(FieldKind::string().label(), "string");
        assert_eq!(FieldKind::number().label(), "number");
        assert_eq!(FieldKind::integer().label(), "integer");
        assert_eq!(FieldKind::Bool.label(), "boolean");
        assert_eq!(FieldKind::Object(InputSchema::new()).label(), "object");
        assert_eq!(
            FieldKind::Array(Box::new(FieldKind::string())).label(),
            "array"
        );
    }
}
