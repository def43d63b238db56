//! Field and record validators, run only on request.
//!
//! [`Record::validate`] runs every field's validators, then the schema's record-level
//! validators, and reports all failures together.

use crate::error::{Error, Result, ValidationErrors, ValidationFailure};
use crate::expr::Expr;
use crate::record::Record;
use crate::value::Value;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

type FieldCheckFn = Arc<dyn Fn(&Value, &Record) -> anyhow::Result<()> + Send + Sync>;
type RecordCheckFn = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

#[derive(Clone)]
pub enum FieldValidator {
    /// Inclusive bounds; either side optional.
    Range {
        min: Option<Value>,
        max: Option<Value>,
    },
    OneOf(Vec<Value>),
    /// Pattern must match at the start of a string value.
    Regex(Regex),
    /// Byte value must start with the prefix.
    BytePrefix(Vec<u8>),
    /// User check; an `Err` is reported with its message.
    Custom(FieldCheckFn),
}

impl FieldValidator {
    pub fn range(min: impl Into<Value>, max: impl Into<Value>) -> Self {
        FieldValidator::Range {
            min: Some(min.into()),
            max: Some(max.into()),
        }
    }

    pub fn at_least(min: impl Into<Value>) -> Self {
        FieldValidator::Range {
            min: Some(min.into()),
            max: None,
        }
    }

    pub fn at_most(max: impl Into<Value>) -> Self {
        FieldValidator::Range {
            min: None,
            max: Some(max.into()),
        }
    }

    pub fn one_of<I, V>(allowed: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        FieldValidator::OneOf(allowed.into_iter().map(Into::into).collect())
    }

    pub fn regex(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(FieldValidator::Regex)
            .map_err(|e| Error::Definition(format!("invalid pattern '{}': {}", pattern, e)))
    }

    pub fn byte_prefix(prefix: impl Into<Vec<u8>>) -> Self {
        FieldValidator::BytePrefix(prefix.into())
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Value, &Record) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        FieldValidator::Custom(Arc::new(f))
    }

    /// Predicate with a fixed failure message.
    pub fn predicate<F>(message: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        let message = message.into();
        FieldValidator::custom(move |value, _| {
            if f(value) {
                Ok(())
            } else {
                Err(anyhow::anyhow!("{}", message))
            }
        })
    }

    pub fn rule(&self) -> &'static str {
        match self {
            FieldValidator::Range { .. } => "range",
            FieldValidator::OneOf(_) => "one_of",
            FieldValidator::Regex(_) => "regex",
            FieldValidator::BytePrefix(_) => "byte_prefix",
            FieldValidator::Custom(_) => "custom",
        }
    }

    pub fn check(&self, field: &str, value: &Value, record: &Record) -> std::result::Result<(), ValidationFailure> {
        let fail = |message: String| ValidationFailure::new(field, self.rule(), message);
        match self {
            FieldValidator::Range { min, max } => {
                if let Some(min) = min {
                    match value.compare(min) {
                        Some(Ordering::Less) => {
                            return Err(fail(format!("{} is below minimum {}", value, min))
                                .with_expected(format!(">= {}", min))
                                .with_actual(value))
                        }
                        None => return Err(fail(format!("{} is not comparable to {}", value.kind(), min))),
                        _ => {}
                    }
                }
                if let Some(max) = max {
                    match value.compare(max) {
                        Some(Ordering::Greater) => {
                            return Err(fail(format!("{} is above maximum {}", value, max))
                                .with_expected(format!("<= {}", max))
                                .with_actual(value))
                        }
                        None => return Err(fail(format!("{} is not comparable to {}", value.kind(), max))),
                        _ => {}
                    }
                }
                Ok(())
            }
            FieldValidator::OneOf(allowed) => {
                if allowed.iter().any(|a| a.loose_eq(value)) {
                    Ok(())
                } else {
                    let list = allowed.iter().map(Value::to_string).collect::<Vec<_>>().join(", ");
                    Err(fail(format!("{} is not one of [{}]", value, list))
                        .with_expected(format!("[{}]", list))
                        .with_actual(value))
                }
            }
            FieldValidator::Regex(re) => match value.as_str() {
                Some(text) if re.find(text).is_some_and(|m| m.start() == 0) => Ok(()),
                Some(text) => Err(fail(format!("'{}' does not match /{}/", text, re.as_str()))
                    .with_expected(re.as_str())
                    .with_actual(text)),
                None => Err(fail(format!("expected a string, found {}", value.kind()))),
            },
            FieldValidator::BytePrefix(prefix) => match value.as_bytes() {
                Some(bytes) if bytes.starts_with(prefix) => Ok(()),
                Some(_) => Err(fail("does not start with the expected bytes".to_string())
                    .with_expected(Value::Bytes(prefix.clone()))
                    .with_actual(value)),
                None => Err(fail(format!("expected bytes, found {}", value.kind()))),
            },
            FieldValidator::Custom(check) => check(value, record).map_err(|e| fail(format!("{:#}", e))),
        }
    }
}

impl fmt::Debug for FieldValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValidator::Range { min, max } => write!(f, "Range({:?}..={:?})", min, max),
            FieldValidator::OneOf(allowed) => write!(f, "OneOf({:?})", allowed),
            FieldValidator::Regex(re) => write!(f, "Regex({})", re.as_str()),
            FieldValidator::BytePrefix(prefix) => write!(f, "BytePrefix({:02x?})", prefix),
            FieldValidator::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// A field compared against an expression over the same record.
#[derive(Debug, Clone)]
pub struct Consistency {
    pub field: String,
    pub equals: Option<Expr>,
    pub greater_than: Option<Expr>,
    pub less_than: Option<Expr>,
}

impl Consistency {
    pub fn new(field: impl Into<String>) -> Self {
        Consistency {
            field: field.into(),
            equals: None,
            greater_than: None,
            less_than: None,
        }
    }

    pub fn equals(mut self, expr: impl Into<Expr>) -> Self {
        self.equals = Some(expr.into());
        self
    }

    pub fn greater_than(mut self, expr: impl Into<Expr>) -> Self {
        self.greater_than = Some(expr.into());
        self
    }

    pub fn less_than(mut self, expr: impl Into<Expr>) -> Self {
        self.less_than = Some(expr.into());
        self
    }

    fn check(&self, record: &Record) -> std::result::Result<(), ValidationFailure> {
        let fail = |message: String| ValidationFailure::new(&self.field, "consistency", message);
        let actual = record
            .get(&self.field)
            .ok_or_else(|| fail(format!("no field '{}'", self.field)))?;
        let eval = |expr: &Expr| expr.evaluate(record).map_err(|e| fail(e.to_string()));
        if let Some(expr) = &self.equals {
            let expected = eval(expr)?;
            if !actual.loose_eq(&expected) {
                return Err(fail(format!("expected {} == {}", self.field, expr))
                    .with_expected(&expected)
                    .with_actual(actual));
            }
        }
        if let Some(expr) = &self.greater_than {
            let bound = eval(expr)?;
            if actual.compare(&bound) != Some(Ordering::Greater) {
                return Err(fail(format!("expected {} > {}", self.field, expr))
                    .with_expected(format!("> {}", bound))
                    .with_actual(actual));
            }
        }
        if let Some(expr) = &self.less_than {
            let bound = eval(expr)?;
            if actual.compare(&bound) != Some(Ordering::Less) {
                return Err(fail(format!("expected {} < {}", self.field, expr))
                    .with_expected(format!("< {}", bound))
                    .with_actual(actual));
            }
        }
        Ok(())
    }
}

#[derive(Clone)]
pub enum RecordValidator {
    Consistency(Consistency),
    /// Predicate over the whole record with a fixed failure message.
    Custom { message: String, check: RecordCheckFn },
}

impl RecordValidator {
    pub fn custom<F>(message: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        RecordValidator::Custom {
            message: message.into(),
            check: Arc::new(f),
        }
    }

    pub fn check(&self, record: &Record) -> std::result::Result<(), ValidationFailure> {
        match self {
            RecordValidator::Consistency(c) => c.check(record),
            RecordValidator::Custom { message, check } => {
                if check(record) {
                    Ok(())
                } else {
                    Err(ValidationFailure::new(record.name(), "custom", message.clone()))
                }
            }
        }
    }
}

impl From<Consistency> for RecordValidator {
    fn from(c: Consistency) -> Self {
        RecordValidator::Consistency(c)
    }
}

impl fmt::Debug for RecordValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordValidator::Consistency(c) => write!(f, "{:?}", c),
            RecordValidator::Custom { message, .. } => write!(f, "Custom({:?})", message),
        }
    }
}

impl Record {
    /// Run field validators in field order, then record validators; every failure is
    /// collected before returning.
    pub fn validate(&self) -> Result<&Self> {
        let mut failures = Vec::new();
        for (name, value) in self.fields() {
            let Some(field) = self.schema().field(name) else {
                continue;
            };
            for validator in &field.def.validators {
                if let Err(failure) = validator.check(name, value, self) {
                    failures.push(failure);
                }
            }
        }
        for validator in self.schema().validators() {
            if let Err(failure) = validator.check(self) {
                failures.push(failure);
            }
        }
        if failures.is_empty() {
            return Ok(self);
        }
        debug!(record = self.name(), failures = failures.len(), "validation failed");
        Err(Error::Validation(ValidationErrors::new(failures)))
    }
}
