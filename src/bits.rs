//! Bit-packed records: a fixed number of bytes carved into boolean and unsigned bit groups.
//!
//! The container bytes are read as one little-endian unsigned integer. With
//! [`BitOrder::LsbFirst`] the first declared field occupies the lowest bits; with
//! [`BitOrder::MsbFirst`] it occupies the highest.

use crate::error::{Error, Result};
use crate::value::{Value, ABSENT};
use byteorder::{ByteOrder, LittleEndian};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Largest container handled (bytes).
pub const MAX_BIT_RECORD_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BitOrder {
    /// First field in the least-significant bits.
    #[default]
    LsbFirst,
    /// First field in the most-significant bits.
    MsbFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitKind {
    /// One bit, read as a boolean.
    Flag,
    /// `n` bits, read as an unsigned integer.
    Unsigned(u32),
}

impl BitKind {
    pub fn width(&self) -> u32 {
        match self {
            BitKind::Flag => 1,
            BitKind::Unsigned(n) => *n,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BitField {
    pub name: String,
    pub kind: BitKind,
    pub default: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct BitSchema {
    name: String,
    size: usize,
    order: BitOrder,
    fields: Vec<BitField>,
}

impl BitSchema {
    pub fn builder(name: impl Into<String>) -> BitSchemaBuilder {
        BitSchemaBuilder {
            name: name.into(),
            size: 1,
            order: BitOrder::default(),
            fields: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Container size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn order(&self) -> BitOrder {
        self.order
    }

    pub fn fields(&self) -> &[BitField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&BitField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Bit offset (from the least-significant bit) of every field, in declaration order.
    fn offsets(&self) -> impl Iterator<Item = (&BitField, u32)> {
        let total = (self.size * 8) as u32;
        let order = self.order;
        let mut consumed = 0u32;
        self.fields.iter().map(move |field| {
            let width = field.kind.width();
            let offset = match order {
                BitOrder::LsbFirst => consumed,
                BitOrder::MsbFirst => total - consumed - width,
            };
            consumed += width;
            (field, offset)
        })
    }
}

pub struct BitSchemaBuilder {
    name: String,
    size: usize,
    order: BitOrder,
    fields: Vec<BitField>,
}

impl BitSchemaBuilder {
    pub fn size(mut self, bytes: usize) -> Self {
        self.size = bytes;
        self
    }

    pub fn order(mut self, order: BitOrder) -> Self {
        self.order = order;
        self
    }

    pub fn bit(mut self, name: impl Into<String>) -> Self {
        self.fields.push(BitField {
            name: name.into(),
            kind: BitKind::Flag,
            default: None,
        });
        self
    }

    /// `width` bits read as an unsigned integer; a width of 1 is a boolean, as with [`bit`](Self::bit).
    pub fn bits(mut self, name: impl Into<String>, width: u32) -> Self {
        let kind = if width == 1 {
            BitKind::Flag
        } else {
            BitKind::Unsigned(width)
        };
        self.fields.push(BitField {
            name: name.into(),
            kind,
            default: None,
        });
        self
    }

    /// Default of the most recently added field.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        if let Some(field) = self.fields.last_mut() {
            field.default = Some(value.into());
        }
        self
    }

    /// Checks that the declared widths fill the container exactly.
    pub fn build(self) -> Result<Arc<BitSchema>> {
        if self.size == 0 || self.size > MAX_BIT_RECORD_SIZE {
            return Err(Error::Definition(format!(
                "{}: bit record size must be 1..={} bytes, got {}",
                self.name, MAX_BIT_RECORD_SIZE, self.size
            )));
        }
        let mut total = 0u64;
        for (i, field) in self.fields.iter().enumerate() {
            let width = field.kind.width();
            if width == 0 || width > 64 {
                return Err(Error::Definition(format!(
                    "{}.{}: bit width must be 1..=64, got {}",
                    self.name, field.name, width
                )));
            }
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(Error::Definition(format!(
                    "{}: duplicate bit field '{}'",
                    self.name, field.name
                )));
            }
            total += u64::from(width);
        }
        let expected = (self.size * 8) as u64;
        if total != expected {
            return Err(Error::Definition(format!(
                "{}: bit fields total {} bits, container holds {}",
                self.name, total, expected
            )));
        }
        Ok(Arc::new(BitSchema {
            name: self.name,
            size: self.size,
            order: self.order,
            fields: self.fields,
        }))
    }
}

/// Instance of a [`BitSchema`]: flags hold `Value::Bool`, groups hold `Value::U64`.
#[derive(Clone)]
pub struct BitRecord {
    schema: Arc<BitSchema>,
    values: HashMap<String, Value>,
}

impl BitRecord {
    /// New instance with every field at its default (false / 0 unless declared).
    pub fn new(schema: Arc<BitSchema>) -> Self {
        let values = schema
            .fields
            .iter()
            .map(|f| {
                let value = f.default.clone().unwrap_or(match f.kind {
                    BitKind::Flag => Value::Bool(false),
                    BitKind::Unsigned(_) => Value::U64(0),
                });
                (f.name.clone(), value)
            })
            .collect();
        BitRecord { schema, values }
    }

    pub fn parse(schema: &Arc<BitSchema>, data: &[u8]) -> Result<Self> {
        if data.len() < schema.size {
            return Err(Error::InsufficientData {
                expected: schema.size,
                actual: data.len(),
                field: Some(schema.name.clone()),
            });
        }
        let raw = LittleEndian::read_uint128(data, schema.size);
        let values = schema
            .offsets()
            .map(|(field, offset)| {
                let bits = (raw >> offset) & mask(field.kind.width());
                let value = match field.kind {
                    BitKind::Flag => Value::Bool(bits != 0),
                    BitKind::Unsigned(_) => Value::U64(bits as u64),
                };
                (field.name.clone(), value)
            })
            .collect();
        Ok(BitRecord {
            schema: Arc::clone(schema),
            values,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut raw: u128 = 0;
        for (field, offset) in self.schema.offsets() {
            let value = self.values.get(&field.name).unwrap_or(ABSENT);
            let bits: u128 = match (field.kind, value) {
                (_, Value::Absent) => 0,
                (BitKind::Flag, v) => u128::from(v.as_bool().ok_or_else(|| mismatch(field, "bool", v))?),
                (BitKind::Unsigned(_), v) => {
                    let n = v.as_u64().ok_or_else(|| mismatch(field, "unsigned integer", v))?;
                    u128::from(n)
                }
            };
            raw |= (bits & mask(field.kind.width())) << offset;
        }
        let mut out = vec![0u8; self.schema.size];
        LittleEndian::write_uint128(&mut out, raw, self.schema.size);
        Ok(out)
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn schema(&self) -> &Arc<BitSchema> {
        &self.schema
    }

    pub fn size(&self) -> usize {
        self.schema.size
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn flag(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        if self.schema.field(name).is_none() {
            return Err(Error::Unresolved {
                path: name.to_string(),
                reason: format!("no bit field '{}' in {}", name, self.schema.name),
            });
        }
        self.values.insert(name.to_string(), value.into());
        Ok(())
    }

    /// `(name, value)` in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.schema
            .fields
            .iter()
            .map(move |f| (f.name.as_str(), self.values.get(&f.name).unwrap_or(ABSENT)))
    }
}

fn mask(width: u32) -> u128 {
    if width >= 128 {
        u128::MAX
    } else {
        (1u128 << width) - 1
    }
}

fn mismatch(field: &BitField, expected: &'static str, found: &Value) -> Error {
    Error::TypeMismatch {
        field: field.name.clone(),
        expected,
        found: found.kind(),
    }
}

impl PartialEq for BitRecord {
    fn eq(&self, other: &Self) -> bool {
        self.schema.name == other.schema.name && self.values == other.values
    }
}

impl fmt::Debug for BitRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(&self.schema.name);
        for (name, value) in self.fields() {
            s.field(name, value);
        }
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msb_first_offsets() {
        let schema = BitSchema::builder("S")
            .order(BitOrder::MsbFirst)
            .bit("a")
            .bits("b", 3)
            .bits("c", 4)
            .build()
            .expect("schema");
        let offsets: Vec<u32> = schema.offsets().map(|(_, o)| o).collect();
        assert_eq!(offsets, vec![7, 4, 0]);
    }
}
