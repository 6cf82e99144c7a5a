//! Declarative schemas and the validator that applies them.
//!
//! Screens never trust a payload just because the request succeeded. Every
//! aggregated payload is checked against a [`Schema`] before it reaches the
//! success branch, and a mismatch is reported as a [`ValidationError`] that
//! lists *every* violated rule.
//!
//! # Building schemas
//!
//! ```
//! use marquee_core::{Schema, SchemaValidator};
//! use serde_json::json;
//!
//! let genre: Schema = Schema::object()
//!     .field("id", Schema::integer().min(1.0))
//!     .field("name", Schema::string().min_len(3).max_len(50))
//!     .into();
//!
//! let error = SchemaValidator::validate_value(&genre, &json!({ "id": 0, "name": "Ro" }))
//!     .unwrap_err();
//!
//! assert_eq!(error.paths(), vec!["id", "name"]);
//! ```
//!
//! # Rules
//!
//! - Bounds are inclusive (`min`, `max`, `min_len`, `max_len`) or exclusive
//!   (`gt`, `lt`) exactly as declared.
//! - Object output contains only declared fields; everything else is dropped.
//! - Tagged unions pick a variant by the tag value alone and apply only that
//!   variant's fields.
//! - Refinements run only after every field rule of their object passed, and
//!   report at the path they were declared with.

mod error;
mod path;
mod validator;

pub use error::{ValidationError, ValidationOutcome, Violation, ViolationKind};
pub use path::{FieldPath, PathSegment};
pub use validator::SchemaValidator;

use regex::Regex;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, LazyLock};

/// A declarative description of an acceptable JSON value.
#[derive(Debug, Clone)]
pub enum Schema {
    /// Any value, passed through unchanged
    Any,
    /// `true` or `false`
    Boolean,
    /// String with length/pattern rules
    String(StringSchema),
    /// Number (optionally integral) with bound rules
    Number(NumberSchema),
    /// String restricted to a fixed set of values
    Enum(Vec<String>),
    /// Calendar date string, `YYYY-MM-DD`
    Date,
    /// RFC 3339 date-time string
    DateTime,
    /// Array of homogeneous items
    Array(ArraySchema),
    /// Object with declared fields
    Object(ObjectSchema),
    /// Object whose shape is chosen by a tag field
    TaggedUnion(TaggedUnionSchema),
    /// The inner schema, or `null`
    Nullable(Box<Schema>),
}

impl Schema {
    /// Accept any value.
    #[must_use]
    pub const fn any() -> Self {
        Self::Any
    }

    /// A boolean.
    #[must_use]
    pub const fn boolean() -> Self {
        Self::Boolean
    }

    /// A string; refine with [`StringSchema`] methods.
    #[must_use]
    pub const fn string() -> StringSchema {
        StringSchema::new()
    }

    /// A number; refine with [`NumberSchema`] methods.
    #[must_use]
    pub const fn number() -> NumberSchema {
        NumberSchema::new(false)
    }

    /// An integral number; refine with [`NumberSchema`] methods.
    #[must_use]
    pub const fn integer() -> NumberSchema {
        NumberSchema::new(true)
    }

    /// One of a fixed set of strings.
    #[must_use]
    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Enum(values.into_iter().map(Into::into).collect())
    }

    /// A `YYYY-MM-DD` date string.
    #[must_use]
    pub const fn date() -> Self {
        Self::Date
    }

    /// An RFC 3339 date-time string.
    #[must_use]
    pub const fn datetime() -> Self {
        Self::DateTime
    }

    /// An array whose items match `item`.
    #[must_use]
    pub fn array(item: impl Into<Self>) -> ArraySchema {
        ArraySchema::new(item.into())
    }

    /// An object; declare fields with [`ObjectSchema`] methods.
    #[must_use]
    pub const fn object() -> ObjectSchema {
        ObjectSchema::new()
    }

    /// A tagged union keyed by `tag`.
    #[must_use]
    pub fn tagged_union(tag: impl Into<String>) -> TaggedUnionSchema {
        TaggedUnionSchema::new(tag)
    }

    /// The inner schema, or `null`.
    #[must_use]
    pub fn nullable(inner: impl Into<Self>) -> Self {
        Self::Nullable(Box::new(inner.into()))
    }

    /// Short name of the expected JSON type, used in messages.
    pub(crate) const fn expected(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Boolean => "boolean",
            Self::String(_) | Self::Enum(_) | Self::Date | Self::DateTime => "string",
            Self::Number(n) if n.integer => "integer",
            Self::Number(_) => "number",
            Self::Array(_) => "array",
            Self::Object(_) | Self::TaggedUnion(_) => "object",
            Self::Nullable(inner) => inner.expected(),
        }
    }
}

#[allow(clippy::expect_used)] // Literal pattern, checked by tests
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern should always compile")
});

/// Rules for a string value.
#[derive(Debug, Clone, Default)]
pub struct StringSchema {
    pub(crate) min_len: Option<usize>,
    pub(crate) max_len: Option<usize>,
    pub(crate) patterns: Vec<(Regex, String)>,
}

impl StringSchema {
    const fn new() -> Self {
        Self {
            min_len: None,
            max_len: None,
            patterns: Vec::new(),
        }
    }

    /// Minimum length in characters, inclusive.
    #[must_use]
    pub const fn min_len(mut self, min: usize) -> Self {
        self.min_len = Some(min);
        self
    }

    /// Maximum length in characters, inclusive.
    #[must_use]
    pub const fn max_len(mut self, max: usize) -> Self {
        self.max_len = Some(max);
        self
    }

    /// Require a match of `pattern`; `message` is reported otherwise.
    #[must_use]
    pub fn matches(mut self, pattern: Regex, message: impl Into<String>) -> Self {
        self.patterns.push((pattern, message.into()));
        self
    }

    /// Require an e-mail address.
    #[must_use]
    pub fn email(self) -> Self {
        self.matches(EMAIL.clone(), "Invalid email")
    }
}

/// Rules for a numeric value.
#[derive(Debug, Clone, Default)]
pub struct NumberSchema {
    pub(crate) integer: bool,
    pub(crate) min: Option<f64>,
    pub(crate) gt: Option<f64>,
    pub(crate) max: Option<f64>,
    pub(crate) lt: Option<f64>,
}

impl NumberSchema {
    const fn new(integer: bool) -> Self {
        Self {
            integer,
            min: None,
            gt: None,
            max: None,
            lt: None,
        }
    }

    /// Lower bound, inclusive.
    #[must_use]
    pub const fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    /// Lower bound, exclusive.
    #[must_use]
    pub const fn gt(mut self, bound: f64) -> Self {
        self.gt = Some(bound);
        self
    }

    /// Upper bound, inclusive.
    #[must_use]
    pub const fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    /// Upper bound, exclusive.
    #[must_use]
    pub const fn lt(mut self, bound: f64) -> Self {
        self.lt = Some(bound);
        self
    }

    /// Strictly greater than zero.
    #[must_use]
    pub const fn positive(self) -> Self {
        self.gt(0.0)
    }
}

/// Rules for an array value.
#[derive(Debug, Clone)]
pub struct ArraySchema {
    pub(crate) item: Box<Schema>,
    pub(crate) min_items: Option<usize>,
    pub(crate) max_items: Option<usize>,
}

impl ArraySchema {
    fn new(item: Schema) -> Self {
        Self {
            item: Box::new(item),
            min_items: None,
            max_items: None,
        }
    }

    /// Minimum number of items, inclusive.
    #[must_use]
    pub const fn min_items(mut self, min: usize) -> Self {
        self.min_items = Some(min);
        self
    }

    /// Maximum number of items, inclusive.
    #[must_use]
    pub const fn max_items(mut self, max: usize) -> Self {
        self.max_items = Some(max);
        self
    }
}

/// A declared object member.
#[derive(Debug, Clone)]
pub(crate) struct FieldSchema {
    pub(crate) name: String,
    pub(crate) schema: Schema,
    pub(crate) required: bool,
}

type RefinementCheck = Arc<dyn Fn(&Map<String, Value>) -> bool + Send + Sync>;

/// A cross-field rule evaluated on the cleaned object.
#[derive(Clone)]
pub(crate) struct Refinement {
    pub(crate) path: FieldPath,
    pub(crate) message: String,
    pub(crate) check: RefinementCheck,
}

impl fmt::Debug for Refinement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Refinement")
            .field("path", &self.path)
            .field("message", &self.message)
            .field("check", &"<fn>")
            .finish()
    }
}

/// Rules for an object value.
#[derive(Debug, Clone, Default)]
pub struct ObjectSchema {
    pub(crate) fields: Vec<FieldSchema>,
    pub(crate) refinements: Vec<Refinement>,
}

impl ObjectSchema {
    const fn new() -> Self {
        Self {
            fields: Vec::new(),
            refinements: Vec::new(),
        }
    }

    /// Declare a required field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, schema: impl Into<Schema>) -> Self {
        self.fields.push(FieldSchema {
            name: name.into(),
            schema: schema.into(),
            required: true,
        });
        self
    }

    /// Declare an optional field. Absent and `null` values are both accepted
    /// and omitted from the output.
    #[must_use]
    pub fn optional(mut self, name: impl Into<String>, schema: impl Into<Schema>) -> Self {
        self.fields.push(FieldSchema {
            name: name.into(),
            schema: schema.into(),
            required: false,
        });
        self
    }

    /// Add a cross-field rule, reported at `path` (relative to this object)
    /// when `check` returns false.
    ///
    /// The check sees only declared fields and runs only when every field rule
    /// of this object passed.
    #[must_use]
    pub fn refine<F>(mut self, path: &str, message: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> bool + Send + Sync + 'static,
    {
        self.refinements.push(Refinement {
            path: FieldPath::from(path),
            message: message.into(),
            check: Arc::new(check),
        });
        self
    }

    /// Names of the declared fields, in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

/// An object whose fields depend on the value of a tag field.
#[derive(Debug, Clone)]
pub struct TaggedUnionSchema {
    pub(crate) tag: String,
    pub(crate) variants: Vec<(String, ObjectSchema)>,
}

impl TaggedUnionSchema {
    fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            variants: Vec::new(),
        }
    }

    /// Declare the fields that apply when the tag equals `tag_value`.
    ///
    /// The tag field itself is always emitted and need not be declared.
    #[must_use]
    pub fn variant(mut self, tag_value: impl Into<String>, fields: ObjectSchema) -> Self {
        self.variants.push((tag_value.into(), fields));
        self
    }

    pub(crate) fn find(&self, tag_value: &str) -> Option<&ObjectSchema> {
        self.variants
            .iter()
            .find(|(value, _)| value == tag_value)
            .map(|(_, fields)| fields)
    }

    pub(crate) fn tag_values(&self) -> impl Iterator<Item = &str> {
        self.variants.iter().map(|(value, _)| value.as_str())
    }
}

impl From<StringSchema> for Schema {
    fn from(schema: StringSchema) -> Self {
        Self::String(schema)
    }
}

impl From<NumberSchema> for Schema {
    fn from(schema: NumberSchema) -> Self {
        Self::Number(schema)
    }
}

impl From<ArraySchema> for Schema {
    fn from(schema: ArraySchema) -> Self {
        Self::Array(schema)
    }
}

impl From<ObjectSchema> for Schema {
    fn from(schema: ObjectSchema) -> Self {
        Self::Object(schema)
    }
}

impl From<TaggedUnionSchema> for Schema {
    fn from(schema: TaggedUnionSchema) -> Self {
        Self::TaggedUnion(schema)
    }
}
