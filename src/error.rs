//! Error taxonomy for schema definition, parsing, serialization, sync and validation.

use std::fmt;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("insufficient data{}: expected {expected} bytes, got {actual}", field_suffix(.field))]
    InsufficientData {
        expected: usize,
        actual: usize,
        field: Option<String>,
    },
    #[error("{count} trailing bytes after last field")]
    TrailingData { count: usize },
    #[error("missing required field '{0}'")]
    MissingField(String),
    #[error("cannot serialize '{field}': {reason}")]
    Serialization { field: String, reason: String },
    #[error("cannot resolve '{path}': {reason}")]
    Unresolved { path: String, reason: String },
    #[error("no case of '{field}' matches discriminator {discriminator}")]
    NoMatchingCase { field: String, discriminator: String },
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error("invalid schema: {0}")]
    Definition(String),
    #[error("unsupported checksum algorithm '{0}'")]
    UnsupportedAlgorithm(String),
    #[error("evaluation failed: {0}")]
    Eval(String),
    #[error("field '{field}' expects {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("text encoding of '{field}': {reason}")]
    Encoding { field: String, reason: String },
    #[error("sync of '{target}' failed: {source}")]
    Sync {
        target: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("records nested deeper than {limit} levels")]
    DepthExceeded { limit: usize },
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
}

fn field_suffix(field: &Option<String>) -> String {
    match field {
        Some(name) => format!(" for '{}'", name),
        None => String::new(),
    }
}

/// One failed check. Record-level validators report the field they inspect, or the
/// schema name for free-form predicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub field: String,
    /// Rule kind, e.g. `range`, `one_of`, `regex`, `consistency`, `custom`.
    pub rule: String,
    pub message: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

impl ValidationFailure {
    pub fn new(field: &str, rule: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            rule: rule.to_string(),
            message: message.into(),
            expected: None,
            actual: None,
        }
    }

    pub fn with_expected(mut self, expected: impl fmt::Display) -> Self {
        self.expected = Some(expected.to_string());
        self
    }

    pub fn with_actual(mut self, actual: impl fmt::Display) -> Self {
        self.actual = Some(actual.to_string());
        self
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.field, self.message, self.rule)?;
        if let Some(expected) = &self.expected {
            write!(f, " expected {}", expected)?;
        }
        if let Some(actual) = &self.actual {
            write!(f, " got {}", actual)?;
        }
        Ok(())
    }
}

/// Every failure of one `validate` call, in the order the checks ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors {
    failures: Vec<ValidationFailure>,
}

impl ValidationErrors {
    pub fn new(failures: Vec<ValidationFailure>) -> Self {
        Self { failures }
    }

    pub fn failures(&self) -> &[ValidationFailure] {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Failures reported against `field`.
    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a ValidationFailure> {
        self.failures.iter().filter(move |f| f.field == field)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} validation failure(s)", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "; {}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}
