//! Applies a [`Schema`] to a JSON payload.

use super::error::{ValidationError, ValidationOutcome, Violation, ViolationKind};
use super::path::FieldPath;
use super::{ArraySchema, NumberSchema, ObjectSchema, Schema, StringSchema, TaggedUnionSchema};
use chrono::{DateTime, NaiveDate};
use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};

/// Validates raw payloads against a [`Schema`].
///
/// Validation never stops at the first failure: the resulting
/// [`ValidationError`] holds one [`Violation`] per violated rule.
///
/// Callers must only validate data of a settled, successful aggregate.
/// Validating pending or failed data is a caller bug, not something this type
/// detects.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator;

impl SchemaValidator {
    /// Validate `raw` and convert the cleaned value into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] listing every violated rule, or a single
    /// [`ViolationKind::Deserialize`] violation if the cleaned value does not
    /// fit `T` (a mismatch between the schema and the target type).
    pub fn validate<T: DeserializeOwned>(schema: &Schema, raw: &Value) -> ValidationOutcome<T> {
        let cleaned = Self::validate_value(schema, raw)?;
        serde_json::from_value(cleaned).map_err(|e| {
            ValidationError::new(
                vec![Violation::new(
                    FieldPath::root(),
                    ViolationKind::Deserialize,
                    e.to_string(),
                )],
                raw.clone(),
            )
        })
    }

    /// Validate `raw`, returning the cleaned value (undeclared fields removed).
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] listing every violated rule.
    pub fn validate_value(schema: &Schema, raw: &Value) -> ValidationOutcome<Value> {
        let mut checker = Checker::default();
        let cleaned = checker.check(schema, raw, &FieldPath::root());

        if checker.violations.is_empty() {
            Ok(cleaned)
        } else {
            Err(ValidationError::new(checker.violations, raw.clone()))
        }
    }

    /// Collect violations without producing output.
    #[must_use]
    pub fn violations(schema: &Schema, raw: &Value) -> Vec<Violation> {
        let mut checker = Checker::default();
        checker.check(schema, raw, &FieldPath::root());
        checker.violations
    }
}

#[derive(Default)]
struct Checker {
    violations: Vec<Violation>,
}

impl Checker {
    fn report(&mut self, path: &FieldPath, kind: ViolationKind, message: impl Into<String>) {
        self.violations
            .push(Violation::new(path.clone(), kind, message));
    }

    fn type_mismatch(&mut self, schema: &Schema, value: &Value, path: &FieldPath) -> Value {
        self.report(
            path,
            ViolationKind::InvalidType,
            format!("Expected {}, received {}", schema.expected(), json_type(value)),
        );
        Value::Null
    }

    /// Check `value`, returning the cleaned value. The cleaned value is only
    /// meaningful when no violation was recorded.
    fn check(&mut self, schema: &Schema, value: &Value, path: &FieldPath) -> Value {
        match (schema, value) {
            (Schema::Any, _) => value.clone(),
            (Schema::Nullable(_), Value::Null) => Value::Null,
            (Schema::Nullable(inner), _) => self.check(inner, value, path),
            (Schema::Boolean, Value::Bool(_)) => value.clone(),
            (Schema::String(rules), Value::String(s)) => {
                self.check_string(rules, s, path);
                value.clone()
            },
            (Schema::Number(rules), Value::Number(n)) => {
                self.check_number(rules, n, path);
                value.clone()
            },
            (Schema::Enum(allowed), Value::String(s)) => {
                if !allowed.iter().any(|a| a == s) {
                    self.report(
                        path,
                        ViolationKind::InvalidEnumValue,
                        format!(
                            "Invalid enum value. Expected {}, received '{s}'",
                            quoted(allowed.iter().map(String::as_str))
                        ),
                    );
                }
                value.clone()
            },
            (Schema::Date, Value::String(s)) => {
                if NaiveDate::parse_from_str(s, "%Y-%m-%d").is_err() {
                    self.report(path, ViolationKind::InvalidFormat, "Invalid date");
                }
                value.clone()
            },
            (Schema::DateTime, Value::String(s)) => {
                if DateTime::parse_from_rfc3339(s).is_err() {
                    self.report(path, ViolationKind::InvalidFormat, "Invalid datetime");
                }
                value.clone()
            },
            (Schema::Array(rules), Value::Array(items)) => self.check_array(rules, items, path),
            (Schema::Object(rules), Value::Object(members)) => {
                Value::Object(self.check_object(rules, members, path))
            },
            (Schema::TaggedUnion(rules), Value::Object(members)) => {
                self.check_union(rules, members, path)
            },
            _ => self.type_mismatch(schema, value, path),
        }
    }

    fn check_string(&mut self, rules: &StringSchema, s: &str, path: &FieldPath) {
        let len = s.chars().count();
        if let Some(min) = rules.min_len.filter(|&min| len < min) {
            self.report(
                path,
                ViolationKind::TooShort,
                format!("String must contain at least {min} character(s)"),
            );
        }
        if let Some(max) = rules.max_len.filter(|&max| len > max) {
            self.report(
                path,
                ViolationKind::TooLong,
                format!("String must contain at most {max} character(s)"),
            );
        }
        for (pattern, message) in &rules.patterns {
            if !pattern.is_match(s) {
                self.report(path, ViolationKind::InvalidFormat, message.clone());
            }
        }
    }

    fn check_number(&mut self, rules: &NumberSchema, number: &Number, path: &FieldPath) {
        // `1.0` is a float on the wire and would not deserialize into an integer field
        if rules.integer && !(number.is_i64() || number.is_u64()) {
            self.report(path, ViolationKind::NotInteger, "Expected integer, received float");
        }
        let n = number.as_f64().unwrap_or(f64::NAN);
        if let Some(min) = rules.min.filter(|&min| n < min) {
            self.report(
                path,
                ViolationKind::TooSmall,
                format!("Number must be greater than or equal to {min}"),
            );
        }
        if let Some(bound) = rules.gt.filter(|&bound| n <= bound) {
            self.report(
                path,
                ViolationKind::TooSmall,
                format!("Number must be greater than {bound}"),
            );
        }
        if let Some(max) = rules.max.filter(|&max| n > max) {
            self.report(
                path,
                ViolationKind::TooBig,
                format!("Number must be less than or equal to {max}"),
            );
        }
        if let Some(bound) = rules.lt.filter(|&bound| n >= bound) {
            self.report(
                path,
                ViolationKind::TooBig,
                format!("Number must be less than {bound}"),
            );
        }
    }

    fn check_array(&mut self, rules: &ArraySchema, items: &[Value], path: &FieldPath) -> Value {
        if let Some(min) = rules.min_items.filter(|&min| items.len() < min) {
            self.report(
                path,
                ViolationKind::TooFewItems,
                format!("Array must contain at least {min} element(s)"),
            );
        }
        if let Some(max) = rules.max_items.filter(|&max| items.len() > max) {
            self.report(
                path,
                ViolationKind::TooManyItems,
                format!("Array must contain at most {max} element(s)"),
            );
        }

        Value::Array(
            items
                .iter()
                .enumerate()
                .map(|(index, item)| self.check(&rules.item, item, &path.index(index)))
                .collect(),
        )
    }

    fn check_object(
        &mut self,
        rules: &ObjectSchema,
        members: &Map<String, Value>,
        path: &FieldPath,
    ) -> Map<String, Value> {
        let before = self.violations.len();
        let mut cleaned = Map::new();

        for field in &rules.fields {
            let field_path = path.key(&field.name);
            match members.get(&field.name) {
                None | Some(Value::Null) if !field.required => {},
                None => self.report(&field_path, ViolationKind::Missing, "Required"),
                Some(Value::Null) if !matches!(field.schema, Schema::Nullable(_) | Schema::Any) => {
                    self.report(&field_path, ViolationKind::Missing, "Required");
                },
                Some(value) => {
                    let checked = self.check(&field.schema, value, &field_path);
                    cleaned.insert(field.name.clone(), checked);
                },
            }
        }

        if self.violations.len() == before {
            for refinement in &rules.refinements {
                if !(refinement.check)(&cleaned) {
                    self.report(
                        &path.join(&refinement.path),
                        ViolationKind::Refinement,
                        refinement.message.clone(),
                    );
                }
            }
        }

        cleaned
    }

    fn check_union(
        &mut self,
        rules: &TaggedUnionSchema,
        members: &Map<String, Value>,
        path: &FieldPath,
    ) -> Value {
        let tag_path = path.key(&rules.tag);
        let expected = quoted(rules.tag_values());

        let tag_value = match members.get(&rules.tag) {
            None | Some(Value::Null) => {
                self.report(
                    &tag_path,
                    ViolationKind::Missing,
                    format!("Required discriminator. Expected {expected}"),
                );
                return Value::Null;
            },
            Some(Value::String(tag_value)) => tag_value,
            Some(other) => {
                self.report(
                    &tag_path,
                    ViolationKind::InvalidTag,
                    format!("Invalid discriminator value. Expected {expected}, received {other}"),
                );
                return Value::Null;
            },
        };

        let Some(variant) = rules.find(tag_value) else {
            self.report(
                &tag_path,
                ViolationKind::InvalidTag,
                format!("Invalid discriminator value. Expected {expected}, received '{tag_value}'"),
            );
            return Value::Null;
        };

        let mut cleaned = self.check_object(variant, members, path);
        cleaned.insert(rules.tag.clone(), Value::String(tag_value.clone()));
        Value::Object(cleaned)
    }
}

const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn quoted<'a>(values: impl Iterator<Item = &'a str>) -> String {
    values
        .map(|v| format!("'{v}'"))
        .collect::<Vec<_>>()
        .join(" | ")
}
