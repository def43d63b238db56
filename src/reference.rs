//! Field references, resolution scopes and conditions built from them.
//!
//! A [`Ref`] is a path to another field, resolved lazily against a [`Scope`]:
//!
//! - `name` or `header.size`: a field of the current record, then dotted hops into
//!   embedded (bit-)records;
//! - `../name`: one parent hop per `../`, then the remaining path;
//! - `/a/b` or `/a.b`: from the root record of the tree being processed.
//!
//! A scope is a chain of borrowed records. Children never own their parent; the
//! chain only exists while a parse, serialize or size computation is running.

use crate::error::{Error, Result};
use crate::record::Record;
use crate::value::Value;
use std::fmt;
use std::ops::{BitAnd, BitOr};
use std::sync::Arc;

/// Resolution context: the record currently being processed and the chain of
/// records enclosing it.
#[derive(Clone, Copy)]
pub struct Scope<'a> {
    record: &'a Record,
    parent: Option<&'a Scope<'a>>,
    depth: usize,
}

impl<'a> Scope<'a> {
    /// Scope of a top-level record (no parent).
    pub fn root(record: &'a Record) -> Self {
        Scope {
            record,
            parent: None,
            depth: 0,
        }
    }

    /// Scope of a record embedded in this one.
    pub fn child<'b>(&'b self, record: &'b Record) -> Scope<'b> {
        Scope {
            record,
            parent: Some(self),
            depth: self.depth + 1,
        }
    }

    pub fn record(&self) -> &'a Record {
        self.record
    }

    pub fn parent(&self) -> Option<&'a Scope<'a>> {
        self.parent
    }

    /// Nesting level; 0 for a top-level record.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The outermost record of the chain.
    pub fn root_record(&self) -> &'a Record {
        let mut scope = self;
        while let Some(parent) = scope.parent {
            scope = parent;
        }
        scope.record
    }
}

impl fmt::Debug for Scope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("record", &self.record.name())
            .field("depth", &self.depth)
            .finish()
    }
}

/// Lazily-resolved path to another field's current value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ref {
    path: String,
}

impl Ref {
    pub fn new(path: impl Into<String>) -> Self {
        Ref { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Current value at this path. Fields declared but not yet parsed or assigned
    /// resolve to [`Value::Absent`].
    pub fn resolve<'s>(&self, scope: &Scope<'s>) -> Result<&'s Value> {
        let path = self.path.as_str();
        if let Some(absolute) = path.strip_prefix('/') {
            return walk(path, scope.root_record(), absolute.split(['/', '.']));
        }
        if path.starts_with("../") {
            let mut current: &Scope<'s> = scope;
            let mut rest = path;
            while let Some(tail) = rest.strip_prefix("../") {
                current = current.parent().ok_or_else(|| Error::Unresolved {
                    path: path.to_string(),
                    reason: "no parent".to_string(),
                })?;
                rest = tail;
            }
            return walk(path, current.record(), rest.split(['/', '.']));
        }
        walk(path, scope.record(), path.split('.'))
    }

    pub fn equals(&self, value: impl Into<Value>) -> Condition {
        self.compare(CmpOp::Eq, value)
    }

    pub fn not_equals(&self, value: impl Into<Value>) -> Condition {
        self.compare(CmpOp::Ne, value)
    }

    pub fn lt(&self, value: impl Into<Value>) -> Condition {
        self.compare(CmpOp::Lt, value)
    }

    pub fn le(&self, value: impl Into<Value>) -> Condition {
        self.compare(CmpOp::Le, value)
    }

    pub fn gt(&self, value: impl Into<Value>) -> Condition {
        self.compare(CmpOp::Gt, value)
    }

    pub fn ge(&self, value: impl Into<Value>) -> Condition {
        self.compare(CmpOp::Ge, value)
    }

    pub fn compare(&self, op: CmpOp, value: impl Into<Value>) -> Condition {
        Condition::Compare(Comparison {
            reference: self.clone(),
            op,
            value: value.into(),
        })
    }
}

impl From<&str> for Ref {
    fn from(path: &str) -> Self {
        Ref::new(path)
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

fn walk<'s, 'p>(
    path: &str,
    start: &'s Record,
    segments: impl Iterator<Item = &'p str>,
) -> Result<&'s Value> {
    let unresolved = |reason: String| Error::Unresolved {
        path: path.to_string(),
        reason,
    };
    let mut segments = segments.filter(|s| !s.is_empty());
    let first = segments
        .next()
        .ok_or_else(|| unresolved("empty path".to_string()))?;
    let mut current = start
        .get(first)
        .ok_or_else(|| unresolved(format!("no field '{}' in {}", first, start.name())))?;
    let mut previous = first;
    for segment in segments {
        current = match current {
            Value::Record(record) => record
                .get(segment)
                .ok_or_else(|| unresolved(format!("no field '{}' in {}", segment, record.name())))?,
            Value::Bits(bits) => bits
                .get(segment)
                .ok_or_else(|| unresolved(format!("no bit field '{}' in {}", segment, bits.name())))?,
            other => {
                return Err(unresolved(format!(
                    "'{}' is {}, not a record",
                    previous,
                    other.kind()
                )))
            }
        };
        previous = segment;
    }
    Ok(current)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

/// `reference <op> value`, evaluated against the resolved value.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub reference: Ref,
    pub op: CmpOp,
    pub value: Value,
}

impl Comparison {
    pub fn evaluate(&self, scope: &Scope) -> Result<bool> {
        let actual = self.reference.resolve(scope)?;
        match self.op {
            CmpOp::Eq => Ok(actual.loose_eq(&self.value)),
            CmpOp::Ne => Ok(!actual.loose_eq(&self.value)),
            op => {
                let ordering = actual.compare(&self.value).ok_or_else(|| {
                    Error::Eval(format!(
                        "cannot compare {} ({}) {} {}",
                        self.reference,
                        actual.kind(),
                        op.symbol(),
                        self.value.kind()
                    ))
                })?;
                Ok(match op {
                    CmpOp::Lt => ordering.is_lt(),
                    CmpOp::Le => ordering.is_le(),
                    CmpOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                })
            }
        }
    }
}

pub type PredicateFn = Arc<dyn Fn(&Scope) -> anyhow::Result<bool> + Send + Sync>;

/// Condition of a conditional field.
#[derive(Clone)]
pub enum Condition {
    Always,
    /// User predicate over the current scope.
    Predicate(PredicateFn),
    Compare(Comparison),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
}

impl Condition {
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Scope) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Condition::Predicate(Arc::new(f))
    }

    pub fn and(self, other: Condition) -> Condition {
        Condition::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Condition) -> Condition {
        Condition::Or(Box::new(self), Box::new(other))
    }

    pub fn evaluate(&self, scope: &Scope) -> Result<bool> {
        match self {
            Condition::Always => Ok(true),
            Condition::Predicate(f) => f(scope).map_err(|e| Error::Eval(format!("condition: {:#}", e))),
            Condition::Compare(cmp) => cmp.evaluate(scope),
            Condition::And(a, b) => Ok(a.evaluate(scope)? && b.evaluate(scope)?),
            Condition::Or(a, b) => Ok(a.evaluate(scope)? || b.evaluate(scope)?),
        }
    }
}

impl BitAnd for Condition {
    type Output = Condition;

    fn bitand(self, rhs: Condition) -> Condition {
        self.and(rhs)
    }
}

impl BitOr for Condition {
    type Output = Condition;

    fn bitor(self, rhs: Condition) -> Condition {
        self.or(rhs)
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Always => f.write_str("Always"),
            Condition::Predicate(_) => f.write_str("Predicate(..)"),
            Condition::Compare(c) => write!(f, "{} {} {:?}", c.reference, c.op.symbol(), c.value),
            Condition::And(a, b) => write!(f, "({:?} && {:?})", a, b),
            Condition::Or(a, b) => write!(f, "({:?} || {:?})", a, b),
        }
    }
}
