//! Declarative payload schemas with field-level failure hints.
//!
//! Each handler binding carries a [`PayloadSchema`] describing the
//! top-level fields its payload must have. Validation either passes or
//! produces a [`SchemaViolations`] map (`field path → reason`) that is
//! sent back to the peer as the hint of a `validation-failed` error —
//! so clients can see *which* field was wrong, not just that something
//! was.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

// ---------------------------------------------------------------------------
// FieldKind
// ---------------------------------------------------------------------------

/// The JSON type a payload field is expected to have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Object,
    Array,
    /// Any JSON value, including `null`. Use for presence-only checks.
    Any,
}

impl FieldKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
            Self::Any => true,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
            Self::Any => "any",
        }
    }
}

/// The JSON type name of a value, for "expected X, got Y" hints.
fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// SchemaViolations
// ---------------------------------------------------------------------------

/// The per-field hint map produced by a failed validation.
///
/// Keys are field paths, values are human-readable reasons. `BTreeMap`
/// keeps the order deterministic, which keeps error pushes and test
/// assertions stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SchemaViolations(BTreeMap<String, String>);

impl SchemaViolations {
    fn record(&mut self, path: impl Into<String>, reason: impl Into<String>) {
        self.0.insert(path.into(), reason.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// The recorded reason for a field, if any.
    pub fn reason(&self, path: &str) -> Option<&str> {
        self.0.get(path).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for SchemaViolations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (path, reason) in self.iter() {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{path}: {reason}")?;
            first = false;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PayloadSchema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct FieldSpec {
    kind: FieldKind,
    required: bool,
}

/// A declarative description of a payload's expected top-level fields.
///
/// Built once at server configuration time, immutable afterwards:
///
/// ```
/// use tether_protocol::{FieldKind, PayloadSchema};
///
/// let schema = PayloadSchema::new()
///     .required("text", FieldKind::String)
///     .optional("replyTo", FieldKind::String);
///
/// assert!(schema
///     .validate(&serde_json::json!({"text": "hi"}))
///     .is_ok());
/// ```
///
/// An empty schema accepts anything, including a `null` payload.
#[derive(Debug, Clone, Default)]
pub struct PayloadSchema {
    fields: BTreeMap<String, FieldSpec>,
}

impl PayloadSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field that must be present with the given type.
    pub fn required(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.insert(
            name.into(),
            FieldSpec {
                kind,
                required: true,
            },
        );
        self
    }

    /// Adds a field that may be absent, but must have the given type
    /// when present.
    pub fn optional(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.insert(
            name.into(),
            FieldSpec {
                kind,
                required: false,
            },
        );
        self
    }

    /// Validates a payload against this schema.
    ///
    /// All fields are checked before returning, so the violations map
    /// covers every problem at once. Fields not named in the schema are
    /// allowed through untouched.
    pub fn validate(&self, payload: &Value) -> Result<(), SchemaViolations> {
        if self.fields.is_empty() {
            return Ok(());
        }

        let mut violations = SchemaViolations::default();

        let Some(object) = payload.as_object() else {
            violations.record(
                "payload",
                format!("expected an object, got {}", kind_of(payload)),
            );
            return Err(violations);
        };

        for (name, spec) in &self.fields {
            match object.get(name) {
                None => {
                    if spec.required {
                        violations.record(name, "required field is missing");
                    }
                }
                Some(value) => {
                    if !spec.kind.matches(value) {
                        violations.record(
                            name,
                            format!(
                                "expected {}, got {}",
                                spec.kind.name(),
                                kind_of(value)
                            ),
                        );
                    }
                }
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
