//! Validation errors.

use super::path::FieldPath;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Category of a schema violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Required field is absent (or null)
    Missing,
    /// Value has the wrong JSON type
    InvalidType,
    /// String shorter than its minimum length
    TooShort,
    /// String longer than its maximum length
    TooLong,
    /// Number below its lower bound
    TooSmall,
    /// Number above its upper bound
    TooBig,
    /// Number with a fractional part where an integer is required
    NotInteger,
    /// String does not match the required pattern or format
    InvalidFormat,
    /// String is not one of the allowed enum values
    InvalidEnumValue,
    /// Tag field of a tagged union names no known variant
    InvalidTag,
    /// Array has fewer items than required
    TooFewItems,
    /// Array has more items than allowed
    TooManyItems,
    /// Cross-field refinement failed
    Refinement,
    /// Cleaned payload could not be converted into the target type
    Deserialize,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Missing => "missing",
            Self::InvalidType => "invalid_type",
            Self::TooShort => "too_short",
            Self::TooLong => "too_long",
            Self::TooSmall => "too_small",
            Self::TooBig => "too_big",
            Self::NotInteger => "not_integer",
            Self::InvalidFormat => "invalid_format",
            Self::InvalidEnumValue => "invalid_enum_value",
            Self::InvalidTag => "invalid_tag",
            Self::TooFewItems => "too_few_items",
            Self::TooManyItems => "too_many_items",
            Self::Refinement => "refinement",
            Self::Deserialize => "deserialize",
        };
        f.write_str(name)
    }
}

/// A single violated rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// Where in the payload the rule was violated
    pub path: FieldPath,
    /// Which kind of rule
    pub kind: ViolationKind,
    /// Human-readable description
    pub message: String,
}

impl Violation {
    /// Create a violation.
    #[must_use]
    pub fn new(path: FieldPath, kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            path,
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_root() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// A structurally valid response whose body does not match the schema.
///
/// Carries every violation found, in document order, plus the raw payload for
/// diagnostics.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("payload failed validation with {} violation(s)", .violations.len())]
pub struct ValidationError {
    /// Every violated rule
    pub violations: Vec<Violation>,
    /// Optional human-readable summary
    pub summary: Option<String>,
    /// The offending payload
    pub raw: Value,
}

impl ValidationError {
    /// Create an error from collected violations.
    #[must_use]
    pub const fn new(violations: Vec<Violation>, raw: Value) -> Self {
        Self {
            violations,
            summary: None,
            raw,
        }
    }

    /// Attach a summary message.
    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Number of violations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.violations.len()
    }

    /// Whether no violation was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// Display form of every violation path, in order.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.violations.iter().map(|v| v.path.to_string()).collect()
    }

    /// Violations recorded at a given path.
    pub fn at<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a Violation> + 'a {
        let wanted = FieldPath::from(path);
        self.violations.iter().filter(move |v| v.path == wanted)
    }
}

/// Result of running a schema against a payload.
pub type ValidationOutcome<T> = Result<T, ValidationError>;
