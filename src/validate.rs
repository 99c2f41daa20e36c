//! Payload validation: envelope unwrapping and schema checking.
//!
//! Validation is total and side-effect-free. [`unwrap_envelope`]
//! resolves the optional one-level `{"payload": {...}}` /
//! `{"input": {...}}` wrapper into a tagged [`Payload`];
//! [`validate`] checks the unwrapped body against an [`InputSchema`]
//! and produces an ordered list of field-level [`ValidationIssue`]s
//! on failure. Issues name the offending field path and the nature of
//! the violation, mirroring the `detail` list shape clients expect
//! from a 400 response.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::ENVELOPE_KEYS;
use crate::schema::{FieldKind, InputSchema};

/// The result of envelope resolution: either the raw body itself, or
/// the inner mapping found under a conventional envelope key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload<'a> {
    /// The raw body is the task input directly.
    Direct(&'a Value),

    /// The task input was wrapped under an envelope key.
    Enveloped {
        /// The envelope key that matched (`"payload"` or `"input"`).
        key: &'static str,
        /// The inner mapping to validate.
        inner: &'a Value,
    },
}

impl<'a> Payload<'a> {
    /// The value that should be validated and deserialized.
    pub fn body(&self) -> &'a Value {
        match self {
            Self::Direct(value) => value,
            Self::Enveloped { inner, .. } => inner,
        }
    }
}

/// Resolves the optional submission envelope.
///
/// If `raw` is a mapping containing `"payload"` (preferred) or
/// `"input"` whose value is itself a mapping, the inner mapping is
/// selected. Exactly one level of unwrapping is attempted; anything
/// else passes through as [`Payload::Direct`].
///
/// # Examples
///
/// ```
/// use conveyor::validate::{unwrap_envelope, Payload};
/// use serde_json::json;
///
/// let wrapped = json!({"payload": {"name": "x"}, "trace_id": "abc"});
/// let payload = unwrap_envelope(&wrapped);
/// assert_eq!(payload.body(), &json!({"name": "x"}));
///
/// let direct = json!({"name": "x"});
/// assert_eq!(unwrap_envelope(&direct), Payload::Direct(&direct));
/// ```
pub fn unwrap_envelope(raw: &Value) -> Payload<'_> {
    if let Value::Object(map) = raw {
        for key in ENVELOPE_KEYS {
            if let Some(inner @ Value::Object(_)) = map.get(key) {
                return Payload::Enveloped { key, inner };
            }
        }
    }
    Payload::Direct(raw)
}

/// A single field-level validation problem.
///
/// Serializes as `{"loc": [...], "msg": "...", "type": "..."}` --
/// the path to the offending field, a human-readable message, and a
/// stable violation category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Path segments to the offending field (array indices as strings).
    pub loc: Vec<String>,

    /// Human-readable description of the violation.
    pub msg: String,

    /// Stable violation category: `missing`, `type_error`,
    /// `pattern_mismatch`, or `out_of_range`.
    #[serde(rename = "type")]
    pub kind: String,
}

impl ValidationIssue {
    fn missing(loc: Vec<String>) -> Self {
        Self {
            loc,
            msg: "field required".to_string(),
            kind: "missing".to_string(),
        }
    }

    fn type_error(loc: Vec<String>, expected: &str) -> Self {
        Self {
            loc,
            msg: format!("expected {expected}"),
            kind: "type_error".to_string(),
        }
    }

    fn pattern_mismatch(loc: Vec<String>, pattern: &str) -> Self {
        Self {
            loc,
            msg: format!("string does not match pattern {pattern}"),
            kind: "pattern_mismatch".to_string(),
        }
    }

    fn out_of_range(loc: Vec<String>, bounds: String) -> Self {
        Self {
            loc,
            msg: format!("value out of range ({bounds})"),
            kind: "out_of_range".to_string(),
        }
    }
}

/// Validates an unwrapped body against a schema.
///
/// Returns `Ok(())` when the body conforms, or the full ordered list
/// of issues otherwise. Fields are checked in schema declaration
/// order; nested objects and arrays are validated recursively with
/// the path carried into each issue. Unknown extra fields are
/// ignored.
///
/// # Examples
///
/// ```
/// use conveyor::schema::{FieldKind, InputSchema};
/// use conveyor::validate::validate;
/// use serde_json::json;
///
/// let schema = InputSchema::new().required("count", FieldKind::integer());
/// assert!(validate(&schema, &json!({"count": 3})).is_ok());
///
/// let issues = validate(&schema, &json!({})).unwrap_err();
/// assert_eq!(issues[0].loc, vec!["count"]);
/// assert_eq!(issues[0].kind, "missing");
/// ```
pub fn validate(schema: &InputSchema, body: &Value) -> Result<(), Vec<ValidationIssue>> {
    let mut issues = Vec::new();
    check_object(schema, body, &[], &mut issues);
    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

fn check_object(schema: &InputSchema, value: &Value, path: &[String], issues: &mut Vec<ValidationIssue>) {
    let Value::Object(map) = value else {
        issues.push(ValidationIssue::type_error(path.to_vec(), "object"));
        return;
    };

    for field in schema.fields() {
        let mut loc = path.to_vec();
        loc.push(field.name.clone());
        match map.get(&field.name) {
            Some(present) => check_kind(&field.kind, present, &loc, issues),
            None if field.required => issues.push(ValidationIssue::missing(loc)),
            None => {},
        }
    }
}

fn check_kind(kind: &FieldKind, value: &Value, path: &[String], issues: &mut Vec<ValidationIssue>) {
    match kind {
        FieldKind::String { pattern } => match value.as_str() {
            Some(text) => {
                if let Some(re) = pattern {
                    if !re.is_match(text) {
                        issues.push(ValidationIssue::pattern_mismatch(
                            path.to_vec(),
                            re.as_str(),
                        ));
                    }
                }
            },
            None => issues.push(ValidationIssue::type_error(path.to_vec(), kind.label())),
        },
        FieldKind::Number { min, max } => match value.as_f64() {
            Some(number) => {
                let below = min.is_some_and(|lo| number < lo);
                let above = max.is_some_and(|hi| number > hi);
                if below || above {
                    issues.push(ValidationIssue::out_of_range(
                        path.to_vec(),
                        range_bounds(*min, *max),
                    ));
                }
            },
            None => issues.push(ValidationIssue::type_error(path.to_vec(), kind.label())),
        },
        FieldKind::Integer { min, max } => match value.as_i64() {
            Some(number) => {
                let below = min.is_some_and(|lo| number < lo);
                let above = max.is_some_and(|hi| number > hi);
                if below || above {
                    issues.push(ValidationIssue::out_of_range(
                        path.to_vec(),
                        range_bounds(
                            min.map(|v| v as f64),
                            max.map(|v| v as f64),
                        ),
                    ));
                }
            },
            None => issues.push(ValidationIssue::type_error(path.to_vec(), kind.label())),
        },
        FieldKind::Bool => {
            if !value.is_boolean() {
                issues.push(ValidationIssue::type_error(path.to_vec(), kind.label()));
            }
        },
        FieldKind::Object(inner) => check_object(inner, value, path, issues),
        FieldKind::Array(element) => match value.as_array() {
            Some(items) => {
                for (index, item) in items.iter().enumerate() {
                    let mut loc = path.to_vec();
                    loc.push(index.to_string());
                    check_kind(element, item, &loc, issues);
                }
            },
            None => issues.push(ValidationIssue::type_error(path.to_vec(), kind.label())),
        },
    }
}

fn range_bounds(min: Option<f64>, max: Option<f64>) -> String {
    match (min, max) {
        (Some(lo), Some(hi)) => format!("{lo} <= value <= {hi}"),
        (Some(lo), None) => format!("value >= {lo}"),
        (None, Some(hi)) => format!("value <= {hi}"),
        (None, None) => "unbounded".to_string(),
    }
}
