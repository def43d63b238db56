//! Sync rules: recompute derived fields (lengths, counts, checksums) before serializing.
//!
//! Rules run in declaration order, so a later rule sees what an earlier one wrote.

use crate::error::{Error, Result};
use crate::expr::crc32;
use crate::record::Record;
use crate::reference::{Ref, Scope};
use crate::value::{Value, ABSENT};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

type UnaryFn = Arc<dyn Fn(&Value) -> anyhow::Result<Value> + Send + Sync>;
type VariadicFn = Arc<dyn Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync>;
type RecordFn = Arc<dyn Fn(&Record) -> anyhow::Result<Value> + Send + Sync>;

/// How a rule's compute function receives its inputs.
#[derive(Clone)]
enum Compute {
    /// One source value.
    Unary(UnaryFn),
    /// Source values in the order the sources were declared.
    Variadic(VariadicFn),
    /// No sources: the whole record.
    Record(RecordFn),
}

#[derive(Clone)]
pub struct SyncRule {
    target: String,
    sources: Vec<String>,
    compute: Compute,
}

impl SyncRule {
    /// `target = f(source)`.
    pub fn from_field<F>(target: impl Into<String>, source: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        SyncRule {
            target: target.into(),
            sources: vec![source.into()],
            compute: Compute::Unary(Arc::new(f)),
        }
    }

    /// `target = f([source, ...])`.
    pub fn from_fields<I, S, F>(target: impl Into<String>, sources: I, f: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        SyncRule {
            target: target.into(),
            sources: sources.into_iter().map(Into::into).collect(),
            compute: Compute::Variadic(Arc::new(f)),
        }
    }

    /// `target = f(record)`.
    pub fn computed<F>(target: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Record) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        SyncRule {
            target: target.into(),
            sources: Vec::new(),
            compute: Compute::Record(Arc::new(f)),
        }
    }

    /// `target = len(source)` for bytes, strings and lists.
    pub fn length_of(target: impl Into<String>, source: impl Into<String>) -> Self {
        SyncRule::from_field(target, source, |value| {
            value
                .len()
                .map(Value::from)
                .ok_or_else(|| anyhow::anyhow!("{} value has no length", value.kind()))
        })
    }

    /// `target = crc32(source)` over bytes or the UTF-8 of a string.
    pub fn crc32_of(target: impl Into<String>, source: impl Into<String>) -> Self {
        SyncRule::from_field(target, source, |value| match value {
            Value::Bytes(b) => Ok(Value::U32(crc32(b))),
            Value::Str(s) => Ok(Value::U32(crc32(s.as_bytes()))),
            other => anyhow::bail!("cannot checksum a {} value", other.kind()),
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Evaluate the rule against `record` and write the result to the target path.
    pub fn apply(&self, record: &mut Record) -> Result<()> {
        let result = {
            let current: &Record = record;
            let scope = Scope::root(current);
            let inputs = self
                .sources
                .iter()
                .map(|path| Ref::new(path.as_str()).resolve(&scope).cloned())
                .collect::<Result<Vec<Value>>>()?;
            let computed = match &self.compute {
                Compute::Unary(f) => f(inputs.first().unwrap_or(ABSENT)),
                Compute::Variadic(f) => f(&inputs),
                Compute::Record(f) => f(current),
            };
            computed.map_err(|source| Error::Sync {
                target: self.target.clone(),
                source,
            })?
        };
        trace!(record = record.name(), target = %self.target, value = %result, "synced field");
        record.set_path(&self.target, result)
    }
}

impl fmt::Debug for SyncRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncRule")
            .field("target", &self.target)
            .field("sources", &self.sources)
            .finish()
    }
}

impl Record {
    /// Run every sync rule of the schema in declaration order.
    pub fn sync(&mut self) -> Result<&mut Self> {
        let schema = Arc::clone(self.schema());
        for rule in schema.sync_rules() {
            rule.apply(self)?;
        }
        Ok(self)
    }

    /// Run only the sync rules whose target is listed, in declaration order.
    pub fn sync_only(&mut self, targets: &[&str]) -> Result<&mut Self> {
        let schema = Arc::clone(self.schema());
        for rule in schema
            .sync_rules()
            .iter()
            .filter(|rule| targets.contains(&rule.target.as_str()))
        {
            rule.apply(self)?;
        }
        Ok(self)
    }
}
