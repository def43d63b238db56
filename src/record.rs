//! Record instances: parse, serialize, size and field access.

use crate::config::{TrailingData, MAX_NESTING_DEPTH};
use crate::error::{Error, Result};
use crate::reference::{Ref, Scope};
use crate::schema::Schema;
use crate::value::{Value, ABSENT};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Value-holding instance of a [`Schema`].
#[derive(Clone)]
pub struct Record {
    schema: Arc<Schema>,
    values: HashMap<String, Value>,
    /// Bytes consumed at parse time by fields sized by their parse (terminated strings).
    spans: HashMap<String, usize>,
    raw: Option<Vec<u8>>,
    trailing: usize,
}

impl Record {
    /// Fresh instance: each field takes its default, or is absent.
    pub fn new(schema: Arc<Schema>) -> Self {
        let values = schema
            .fields()
            .iter()
            .map(|f| (f.name.clone(), f.def.default_value()))
            .collect();
        Record {
            schema,
            values,
            spans: HashMap::new(),
            raw: None,
            trailing: 0,
        }
    }

    fn blank(schema: Arc<Schema>) -> Self {
        let values = schema
            .fields()
            .iter()
            .map(|f| (f.name.clone(), Value::Absent))
            .collect();
        Record {
            schema,
            values,
            spans: HashMap::new(),
            raw: None,
            trailing: 0,
        }
    }

    /// Parse a top-level record, applying the schema's trailing-data policy.
    pub fn parse(schema: &Arc<Schema>, data: &[u8]) -> Result<Self> {
        Record::parse_with(schema, data, false)
    }

    /// Parse a top-level record; `allow_trailing` accepts leftover bytes regardless of policy.
    pub fn parse_with(schema: &Arc<Schema>, data: &[u8], allow_trailing: bool) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let mut record = Record::parse_fields(schema, &mut cursor, None)?;
        let consumed = cursor.position() as usize;
        let trailing = data.len().saturating_sub(consumed);
        if trailing > 0 && !allow_trailing {
            match schema.trailing_data() {
                TrailingData::Error => return Err(Error::TrailingData { count: trailing }),
                TrailingData::Warn => {
                    warn!(record = schema.name(), trailing, "ignoring trailing bytes after last field")
                }
                TrailingData::Ignore => {}
            }
        }
        debug!(record = schema.name(), consumed, trailing, "parsed record");
        record.raw = Some(data.to_vec());
        record.trailing = trailing;
        Ok(record)
    }

    /// Parse the fields of `schema` at the cursor. Nested records get a scope whose
    /// parent is the enclosing record, so `../` and `/` paths resolve during the parse.
    pub(crate) fn parse_fields(
        schema: &Arc<Schema>,
        r: &mut Cursor<&[u8]>,
        parent: Option<&Scope>,
    ) -> Result<Self> {
        let depth = parent.map_or(0, |p| p.depth() + 1);
        if depth > MAX_NESTING_DEPTH {
            return Err(Error::DepthExceeded {
                limit: MAX_NESTING_DEPTH,
            });
        }
        let mut record = Record::blank(Arc::clone(schema));
        for field in schema.fields() {
            let start = r.position();
            let value = {
                let scope = match parent {
                    Some(p) => p.child(&record),
                    None => Scope::root(&record),
                };
                field.def.parse(&field.name, r, &scope)?
            };
            let consumed = (r.position() - start) as usize;
            trace!(record = schema.name(), field = %field.name, consumed, "parsed field");
            if field.def.measured_by_parse() {
                record.spans.insert(field.name.clone(), consumed);
            }
            record.values.insert(field.name.clone(), value);
        }
        Ok(record)
    }

    /// Encode every field in schema order. Fails on a required field with no value.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.serialize_in(&Scope::root(self), &mut out)?;
        debug!(record = self.name(), len = out.len(), "serialized record");
        Ok(out)
    }

    pub(crate) fn serialize_in(&self, scope: &Scope, w: &mut Vec<u8>) -> Result<()> {
        for field in self.schema.fields() {
            let value = self.values.get(&field.name).unwrap_or(ABSENT);
            if value.is_absent() && field.def.required && field.def.is_active(scope)? {
                return Err(Error::MissingField(field.name.clone()));
            }
            field.def.serialize(&field.name, value, scope, w)?;
        }
        Ok(())
    }

    /// Serialize, optionally running sync rules first and validation before encoding.
    pub fn to_bytes(&mut self, sync: bool, validate: bool) -> Result<Vec<u8>> {
        if sync {
            self.sync()?;
        }
        if validate {
            self.validate()?;
        }
        self.serialize()
    }

    /// Encoded size in bytes of the current values.
    pub fn size(&self) -> Result<usize> {
        self.size_in(&Scope::root(self))
    }

    pub(crate) fn size_in(&self, scope: &Scope) -> Result<usize> {
        self.schema.fields().iter().try_fold(0usize, |total, field| {
            if let Some(span) = self.spans.get(&field.name) {
                return Ok(total + span);
            }
            let value = self.values.get(&field.name).unwrap_or(ABSENT);
            Ok(total + field.def.size(&field.name, value, scope)?)
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    /// Value of a field of this record; `None` if the schema has no such field.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Value at a reference path (`a.b`, `/a/b`; no parent outside a parse).
    pub fn resolve(&self, path: &str) -> Result<&Value> {
        Ref::new(path).resolve(&Scope::root(self))
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        if self.schema.field(name).is_none() {
            return Err(Error::Unresolved {
                path: name.to_string(),
                reason: format!("no field '{}' in {}", name, self.name()),
            });
        }
        self.spans.remove(name);
        self.values.insert(name.to_string(), value.into());
        Ok(())
    }

    /// Assign through a dotted path into embedded records and bit records.
    pub fn set_path(&mut self, path: &str, value: impl Into<Value>) -> Result<()> {
        let Some((head, rest)) = path.split_once('.') else {
            return self.set(path, value);
        };
        let schema_name = self.schema.name().to_string();
        self.spans.remove(head);
        match self.values.get_mut(head) {
            Some(Value::Record(child)) => child.set_path(rest, value),
            Some(Value::Bits(bits)) => bits.set(rest, value),
            Some(other) => Err(Error::Unresolved {
                path: path.to_string(),
                reason: format!("'{}' is {}, not a record", head, other.kind()),
            }),
            None => Err(Error::Unresolved {
                path: path.to_string(),
                reason: format!("no field '{}' in {}", head, schema_name),
            }),
        }
    }

    /// Assign and return the record, for building instances inline.
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Result<Self> {
        self.set(name, value)?;
        Ok(self)
    }

    /// `(name, value)` in schema order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.schema
            .fields()
            .iter()
            .map(move |f| (f.name.as_str(), self.values.get(&f.name).unwrap_or(ABSENT)))
    }

    pub fn to_map(&self) -> Vec<(String, Value)> {
        self.fields()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    /// Input bytes of the last top-level parse, for inspection only.
    pub fn raw(&self) -> Option<&[u8]> {
        self.raw.as_deref()
    }

    /// Bytes left over after the last field on the last top-level parse.
    pub fn trailing_len(&self) -> usize {
        self.trailing
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.schema.name() == other.schema.name() && self.values == other.values
    }
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct(self.name());
        for (name, value) in self.fields() {
            s.field(name, value);
        }
        s.finish()
    }
}
