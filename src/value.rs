//! Runtime values held by record instances.

use crate::bits::BitRecord;
use crate::record::Record;
use std::cmp::Ordering;
use std::collections::BTreeSet;

pub(crate) const ABSENT: &Value = &Value::Absent;

/// A single field value (scalar or compound).
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// No value: not yet assigned, conditional field switched off, padding, or a
    /// non-required switch with no matching case.
    #[default]
    Absent,
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Bool(bool),
    Float(f32),
    Double(f64),
    Bytes(Vec<u8>),
    Str(String),
    List(Vec<Value>),
    /// Embedded record.
    Record(Record),
    /// Embedded bit-packed record.
    Bits(BitRecord),
    Flags(FlagSet),
    Enum(EnumValue),
}

/// Active flag names of a flags field together with the raw storage integer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FlagSet {
    names: BTreeSet<String>,
    raw: u64,
}

impl FlagSet {
    pub fn new<I, S>(names: I, raw: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            raw,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn raw(&self) -> u64 {
        self.raw
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A declared variant of an enumeration field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValue {
    pub name: String,
    pub value: u64,
}

impl EnumValue {
    pub fn new(name: impl Into<String>, value: u64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

impl Value {
    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    /// Short name of the variant, used in type-mismatch diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Absent => "absent",
            Value::U8(_) => "u8",
            Value::U16(_) => "u16",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::I8(_) => "i8",
            Value::I16(_) => "i16",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::Bool(_) => "bool",
            Value::Float(_) => "f32",
            Value::Double(_) => "f64",
            Value::Bytes(_) => "bytes",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Record(_) => "record",
            Value::Bits(_) => "bit record",
            Value::Flags(_) => "flags",
            Value::Enum(_) => "enum",
        }
    }

    /// Integer view of any integer-like value (integers, bools, enum variants, flag sets).
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Value::U8(x) => Some(i128::from(*x)),
            Value::U16(x) => Some(i128::from(*x)),
            Value::U32(x) => Some(i128::from(*x)),
            Value::U64(x) => Some(i128::from(*x)),
            Value::I8(x) => Some(i128::from(*x)),
            Value::I16(x) => Some(i128::from(*x)),
            Value::I32(x) => Some(i128::from(*x)),
            Value::I64(x) => Some(i128::from(*x)),
            Value::Bool(b) => Some(i128::from(*b)),
            Value::Enum(e) => Some(i128::from(e.value)),
            Value::Flags(f) => Some(i128::from(f.raw)),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.as_i128().and_then(|x| u64::try_from(x).ok())
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_i128().and_then(|x| i64::try_from(x).ok())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(f64::from(*x)),
            Value::Double(x) => Some(*x),
            other => other.as_i128().map(|x| x as f64),
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Value::Float(_) | Value::Double(_))
    }

    /// Truthiness for boolean fields: booleans as-is, integers when non-zero.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            other => other.as_i128().map(|x| x != 0),
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_record_mut(&mut self) -> Option<&mut Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_bits(&self) -> Option<&BitRecord> {
        match self {
            Value::Bits(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_flags(&self) -> Option<&FlagSet> {
        match self {
            Value::Flags(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&EnumValue> {
        match self {
            Value::Enum(e) => Some(e),
            _ => None,
        }
    }

    /// Length of a sized value: bytes, string (UTF-8 byte length) or list.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Bytes(b) => Some(b.len()),
            Value::Str(s) => Some(s.len()),
            Value::List(v) => Some(v.len()),
            _ => None,
        }
    }

    /// Ordering across numeric widths and kinds; `None` when the values are not comparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        if let (Some(a), Some(b)) = (self.as_i128(), other.as_i128()) {
            return Some(a.cmp(&b));
        }
        if let (Some(a), Some(b)) = (self.as_f64(), other.as_f64()) {
            return a.partial_cmp(&b);
        }
        match (self, other) {
            (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Absent, Value::Absent) => Some(Ordering::Equal),
            _ => None,
        }
    }

    /// Equality that ignores integer width (`U8(5)` equals `I64(5)`) and lets an enum
    /// variant match its name.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Enum(e), Value::Str(s)) | (Value::Str(s), Value::Enum(e)) => &e.name == s,
            _ => match self.compare(other) {
                Some(ord) => ord == Ordering::Equal,
                None => self == other,
            },
        }
    }
}

impl From<u8> for Value {
    fn from(x: u8) -> Self {
        Value::U8(x)
    }
}

impl From<u16> for Value {
    fn from(x: u16) -> Self {
        Value::U16(x)
    }
}

impl From<u32> for Value {
    fn from(x: u32) -> Self {
        Value::U32(x)
    }
}

impl From<u64> for Value {
    fn from(x: u64) -> Self {
        Value::U64(x)
    }
}

impl From<usize> for Value {
    fn from(x: usize) -> Self {
        Value::U64(x as u64)
    }
}

impl From<i8> for Value {
    fn from(x: i8) -> Self {
        Value::I8(x)
    }
}

impl From<i16> for Value {
    fn from(x: i16) -> Self {
        Value::I16(x)
    }
}

impl From<i32> for Value {
    fn from(x: i32) -> Self {
        Value::I32(x)
    }
}

impl From<i64> for Value {
    fn from(x: i64) -> Self {
        Value::I64(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f32> for Value {
    fn from(x: f32) -> Self {
        Value::Float(x)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Double(x)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for Value {
    fn from(b: &[u8; N]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Record> for Value {
    fn from(r: Record) -> Self {
        Value::Record(r)
    }
}

impl From<BitRecord> for Value {
    fn from(b: BitRecord) -> Self {
        Value::Bits(b)
    }
}

impl From<FlagSet> for Value {
    fn from(f: FlagSet) -> Self {
        Value::Flags(f)
    }
}

impl From<EnumValue> for Value {
    fn from(e: EnumValue) -> Self {
        Value::Enum(e)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Absent, Into::into)
    }
}
