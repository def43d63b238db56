//! Field descriptors: what a field is on the wire and how it behaves.
//!
//! A [`FieldDef`] is stateless and reusable across schemas; the value of a field lives
//! on the record instance. Parse, serialize and size for every [`TypeSpec`] are in
//! [`crate::codec`].

use crate::bits::BitSchema;
use crate::config::Endianness;
use crate::error::Result;
use crate::reference::{Condition, Ref, Scope};
use crate::schema::Schema;
use crate::text::TextEncoding;
use crate::validate::FieldValidator;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// Fixed-width scalar types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    Bool,
    Float,
    Double,
}

impl BaseType {
    pub fn width(&self) -> usize {
        match self {
            BaseType::U8 | BaseType::I8 | BaseType::Bool => 1,
            BaseType::U16 | BaseType::I16 => 2,
            BaseType::U32 | BaseType::I32 | BaseType::Float => 4,
            BaseType::U64 | BaseType::I64 | BaseType::Double => 8,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BaseType::U8 => "u8",
            BaseType::U16 => "u16",
            BaseType::U32 => "u32",
            BaseType::U64 => "u64",
            BaseType::I8 => "i8",
            BaseType::I16 => "i16",
            BaseType::I32 => "i32",
            BaseType::I64 => "i64",
            BaseType::Bool => "bool",
            BaseType::Float => "f32",
            BaseType::Double => "f64",
        }
    }

    /// Inclusive integer range, `None` for bool and floats.
    pub(crate) fn int_range(&self) -> Option<(i128, i128)> {
        Some(match self {
            BaseType::U8 => (0, i128::from(u8::MAX)),
            BaseType::U16 => (0, i128::from(u16::MAX)),
            BaseType::U32 => (0, i128::from(u32::MAX)),
            BaseType::U64 => (0, i128::from(u64::MAX)),
            BaseType::I8 => (i128::from(i8::MIN), i128::from(i8::MAX)),
            BaseType::I16 => (i128::from(i16::MIN), i128::from(i16::MAX)),
            BaseType::I32 => (i128::from(i32::MIN), i128::from(i32::MAX)),
            BaseType::I64 => (i128::from(i64::MIN), i128::from(i64::MAX)),
            BaseType::Bool | BaseType::Float | BaseType::Double => return None,
        })
    }
}

/// Size of a variable-size field, array count or padding run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SizeSpec {
    Constant(usize),
    FieldRef(Ref),
}

impl SizeSpec {
    /// Current size: the constant, or the referenced field's value as a non-negative integer.
    pub fn resolve(&self, field: &str, scope: &Scope) -> Result<usize> {
        match self {
            SizeSpec::Constant(n) => Ok(*n),
            SizeSpec::FieldRef(r) => {
                let value = r.resolve(scope)?;
                value
                    .as_i128()
                    .and_then(|n| usize::try_from(n).ok())
                    .ok_or_else(|| crate::Error::TypeMismatch {
                        field: format!("{} (size from '{}')", field, r),
                        expected: "non-negative integer",
                        found: value.kind(),
                    })
            }
        }
    }

    pub fn constant(&self) -> Option<usize> {
        match self {
            SizeSpec::Constant(n) => Some(*n),
            SizeSpec::FieldRef(_) => None,
        }
    }
}

impl From<usize> for SizeSpec {
    fn from(n: usize) -> Self {
        SizeSpec::Constant(n)
    }
}

impl From<u32> for SizeSpec {
    fn from(n: u32) -> Self {
        SizeSpec::Constant(n as usize)
    }
}

impl From<i32> for SizeSpec {
    fn from(n: i32) -> Self {
        SizeSpec::Constant(usize::try_from(n).unwrap_or(0))
    }
}

impl From<Ref> for SizeSpec {
    fn from(r: Ref) -> Self {
        SizeSpec::FieldRef(r)
    }
}

pub type DiscriminatorFn = Arc<dyn Fn(&Scope) -> anyhow::Result<Value> + Send + Sync>;

/// Where a switch field reads its discriminator from.
#[derive(Clone)]
pub enum Discriminator {
    Field(Ref),
    Computed(DiscriminatorFn),
}

impl Discriminator {
    pub fn evaluate(&self, scope: &Scope) -> Result<Value> {
        match self {
            Discriminator::Field(r) => r.resolve(scope).cloned(),
            Discriminator::Computed(f) => {
                f(scope).map_err(|e| crate::Error::Eval(format!("discriminator: {:#}", e)))
            }
        }
    }
}

impl fmt::Debug for Discriminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discriminator::Field(r) => write!(f, "Field({})", r),
            Discriminator::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl From<Ref> for Discriminator {
    fn from(r: Ref) -> Self {
        Discriminator::Field(r)
    }
}

impl From<&str> for Discriminator {
    fn from(path: &str) -> Self {
        Discriminator::Field(Ref::new(path))
    }
}

/// Field type specification.
#[derive(Debug, Clone)]
pub enum TypeSpec {
    Base(BaseType),
    FixedBytes(usize),
    Bytes(SizeSpec),
    FixedString {
        len: usize,
        encoding: TextEncoding,
        pad: u8,
    },
    String {
        len: SizeSpec,
        encoding: TextEncoding,
    },
    /// Null-terminated string.
    CString {
        encoding: TextEncoding,
        include_null: bool,
        max_len: Option<usize>,
    },
    Padding {
        len: SizeSpec,
        fill: u8,
    },
    /// Named single-bit flags over an `size`-byte unsigned integer.
    Flags {
        size: usize,
        flags: Vec<(String, u64)>,
    },
    /// Named variants over an `size`-byte unsigned integer.
    Enum {
        size: usize,
        variants: Vec<(String, u64)>,
    },
    Bits(Arc<BitSchema>),
    Struct(Arc<Schema>),
    Array(Box<FieldDef>, SizeSpec),
    Conditional {
        inner: Box<FieldDef>,
        when: Condition,
    },
    Switch {
        discriminator: Discriminator,
        cases: Vec<(Value, FieldDef)>,
        default: Option<Box<FieldDef>>,
    },
}

/// Default of a field: a value, or a producer called each time a record is created.
#[derive(Clone)]
pub enum DefaultValue {
    Value(Value),
    Producer(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl DefaultValue {
    pub fn produce(&self) -> Value {
        match self {
            DefaultValue::Value(v) => v.clone(),
            DefaultValue::Producer(f) => f(),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Value(v) => write!(f, "{:?}", v),
            DefaultValue::Producer(_) => f.write_str("Producer(..)"),
        }
    }
}

/// Field descriptor.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub spec: TypeSpec,
    pub default: Option<DefaultValue>,
    /// Whether a value must exist at serialize time.
    pub required: bool,
    pub validators: Vec<FieldValidator>,
    /// Byte order override; falls back to the record's, then the process default.
    pub endianness: Option<Endianness>,
}

impl FieldDef {
    pub fn new(spec: TypeSpec) -> Self {
        let required = !matches!(spec, TypeSpec::Padding { .. } | TypeSpec::Conditional { .. });
        FieldDef {
            spec,
            default: None,
            required,
            validators: Vec::new(),
            endianness: None,
        }
    }

    pub fn base(base: BaseType) -> Self {
        FieldDef::new(TypeSpec::Base(base))
    }

    pub fn u8() -> Self {
        FieldDef::base(BaseType::U8)
    }

    pub fn u16() -> Self {
        FieldDef::base(BaseType::U16)
    }

    pub fn u32() -> Self {
        FieldDef::base(BaseType::U32)
    }

    pub fn u64() -> Self {
        FieldDef::base(BaseType::U64)
    }

    pub fn i8() -> Self {
        FieldDef::base(BaseType::I8)
    }

    pub fn i16() -> Self {
        FieldDef::base(BaseType::I16)
    }

    pub fn i32() -> Self {
        FieldDef::base(BaseType::I32)
    }

    pub fn i64() -> Self {
        FieldDef::base(BaseType::I64)
    }

    pub fn f32() -> Self {
        FieldDef::base(BaseType::Float)
    }

    pub fn f64() -> Self {
        FieldDef::base(BaseType::Double)
    }

    /// One byte, non-zero reads as true; serializes as 1/0 with absent meaning false.
    pub fn boolean() -> Self {
        FieldDef::base(BaseType::Bool)
    }

    pub fn fixed_bytes(len: usize) -> Self {
        FieldDef::new(TypeSpec::FixedBytes(len))
    }

    pub fn bytes(len: impl Into<SizeSpec>) -> Self {
        FieldDef::new(TypeSpec::Bytes(len.into()))
    }

    /// Fixed-length string, right-padded with NUL (see [`FieldDef::pad`]).
    pub fn fixed_string(len: usize) -> Self {
        FieldDef::new(TypeSpec::FixedString {
            len,
            encoding: TextEncoding::Utf8,
            pad: 0,
        })
    }

    /// String whose byte length comes from another field or a constant.
    pub fn string(len: impl Into<SizeSpec>) -> Self {
        FieldDef::new(TypeSpec::String {
            len: len.into(),
            encoding: TextEncoding::Utf8,
        })
    }

    pub fn cstring() -> Self {
        FieldDef::new(TypeSpec::CString {
            encoding: TextEncoding::Utf8,
            include_null: true,
            max_len: None,
        })
    }

    pub fn padding(len: impl Into<SizeSpec>) -> Self {
        FieldDef::new(TypeSpec::Padding {
            len: len.into(),
            fill: 0,
        })
    }

    pub fn flags<I, S>(size: usize, flags: I) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        FieldDef::new(TypeSpec::Flags {
            size,
            flags: flags.into_iter().map(|(n, b)| (n.into(), b)).collect(),
        })
    }

    pub fn enumeration<I, S>(size: usize, variants: I) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        FieldDef::new(TypeSpec::Enum {
            size,
            variants: variants.into_iter().map(|(n, v)| (n.into(), v)).collect(),
        })
    }

    pub fn bits(schema: Arc<BitSchema>) -> Self {
        FieldDef::new(TypeSpec::Bits(schema))
    }

    pub fn record(schema: Arc<Schema>) -> Self {
        FieldDef::new(TypeSpec::Struct(schema))
    }

    pub fn array(element: impl Into<FieldDef>, count: impl Into<SizeSpec>) -> Self {
        FieldDef::new(TypeSpec::Array(Box::new(element.into()), count.into()))
    }

    /// Present only while `when` holds; otherwise zero bytes and the default value.
    pub fn conditional(inner: impl Into<FieldDef>, when: Condition) -> Self {
        FieldDef::new(TypeSpec::Conditional {
            inner: Box::new(inner.into()),
            when,
        })
    }

    /// Tagged union; add cases with [`FieldDef::case`] and [`FieldDef::default_case`].
    pub fn switch(discriminator: impl Into<Discriminator>) -> Self {
        FieldDef::new(TypeSpec::Switch {
            discriminator: discriminator.into(),
            cases: Vec::new(),
            default: None,
        })
    }

    pub fn switch_with<F>(f: F) -> Self
    where
        F: Fn(&Scope) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        FieldDef::switch(Discriminator::Computed(Arc::new(f)))
    }

    pub fn case(mut self, key: impl Into<Value>, field: impl Into<FieldDef>) -> Self {
        if let TypeSpec::Switch { cases, .. } = &mut self.spec {
            cases.push((key.into(), field.into()));
        }
        self
    }

    pub fn default_case(mut self, field: impl Into<FieldDef>) -> Self {
        if let TypeSpec::Switch { default, .. } = &mut self.spec {
            *default = Some(Box::new(field.into()));
        }
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Value(value.into()));
        self
    }

    pub fn default_with<F>(mut self, producer: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = Some(DefaultValue::Producer(Arc::new(producer)));
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn optional(self) -> Self {
        self.required(false)
    }

    pub fn validator(mut self, validator: FieldValidator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Byte order override. Array elements and the inner field of a conditional
    /// inherit it unless they carry their own.
    pub fn endian(mut self, endianness: Endianness) -> Self {
        self.set_endianness(endianness);
        self
    }

    fn set_endianness(&mut self, endianness: Endianness) {
        self.endianness = Some(endianness);
        if let TypeSpec::Array(inner, _) | TypeSpec::Conditional { inner, .. } = &mut self.spec {
            if inner.endianness.is_none() {
                inner.set_endianness(endianness);
            }
        }
    }

    pub fn big_endian(self) -> Self {
        self.endian(Endianness::Big)
    }

    pub fn little_endian(self) -> Self {
        self.endian(Endianness::Little)
    }

    /// Text encoding of a string field; ignored by other kinds.
    pub fn encoding(mut self, text: TextEncoding) -> Self {
        match &mut self.spec {
            TypeSpec::FixedString { encoding, .. }
            | TypeSpec::String { encoding, .. }
            | TypeSpec::CString { encoding, .. } => *encoding = text,
            _ => {}
        }
        self
    }

    /// Pad byte of a fixed string.
    pub fn pad(mut self, byte: u8) -> Self {
        if let TypeSpec::FixedString { pad, .. } = &mut self.spec {
            *pad = byte;
        }
        self
    }

    /// Fill byte written for padding.
    pub fn fill(mut self, byte: u8) -> Self {
        if let TypeSpec::Padding { fill, .. } = &mut self.spec {
            *fill = byte;
        }
        self
    }

    pub fn include_null(mut self, include: bool) -> Self {
        if let TypeSpec::CString { include_null, .. } = &mut self.spec {
            *include_null = include;
        }
        self
    }

    pub fn max_len(mut self, limit: usize) -> Self {
        if let TypeSpec::CString { max_len, .. } = &mut self.spec {
            *max_len = Some(limit);
        }
        self
    }

    /// Value a fresh record starts with (absent when there is no default).
    pub fn default_value(&self) -> Value {
        self.default
            .as_ref()
            .map_or(Value::Absent, DefaultValue::produce)
    }

    /// Size in bytes when it does not depend on the value or other fields.
    pub fn fixed_size(&self) -> Option<usize> {
        match &self.spec {
            TypeSpec::Base(b) => Some(b.width()),
            TypeSpec::FixedBytes(n) => Some(*n),
            TypeSpec::FixedString { len, .. } => Some(*len),
            TypeSpec::Padding { len, .. } => len.constant(),
            TypeSpec::Flags { size, .. } | TypeSpec::Enum { size, .. } => Some(*size),
            TypeSpec::Bits(schema) => Some(schema.size()),
            TypeSpec::Struct(schema) => schema.fixed_size(),
            TypeSpec::Array(element, count) => Some(count.constant()? * element.fixed_size()?),
            TypeSpec::Bytes(_)
            | TypeSpec::String { .. }
            | TypeSpec::CString { .. }
            | TypeSpec::Conditional { .. }
            | TypeSpec::Switch { .. } => None,
        }
    }

    /// Fields whose size is the byte span consumed at parse time until reassigned.
    pub(crate) fn measured_by_parse(&self) -> bool {
        matches!(self.spec, TypeSpec::CString { .. })
    }

    /// Short description of the field kind, used in diagnostics and dumps.
    pub fn kind(&self) -> String {
        match &self.spec {
            TypeSpec::Base(b) => b.name().to_string(),
            TypeSpec::FixedBytes(n) => format!("bytes({})", n),
            TypeSpec::Bytes(SizeSpec::Constant(n)) => format!("bytes({})", n),
            TypeSpec::Bytes(SizeSpec::FieldRef(r)) => format!("bytes({})", r),
            TypeSpec::FixedString { len, .. } => format!("string({})", len),
            TypeSpec::String { len: SizeSpec::Constant(n), .. } => format!("string({})", n),
            TypeSpec::String { len: SizeSpec::FieldRef(r), .. } => format!("string({})", r),
            TypeSpec::CString { .. } => "cstring".to_string(),
            TypeSpec::Padding { .. } => "padding".to_string(),
            TypeSpec::Flags { size, .. } => format!("flags({})", size),
            TypeSpec::Enum { size, .. } => format!("enum({})", size),
            TypeSpec::Bits(schema) => schema.name().to_string(),
            TypeSpec::Struct(schema) => schema.name().to_string(),
            TypeSpec::Array(element, _) => format!("{}[]", element.kind()),
            TypeSpec::Conditional { inner, .. } => format!("{}?", inner.kind()),
            TypeSpec::Switch { .. } => "switch".to_string(),
        }
    }
}

impl From<BaseType> for FieldDef {
    fn from(base: BaseType) -> Self {
        FieldDef::base(base)
    }
}

impl From<Arc<Schema>> for FieldDef {
    fn from(schema: Arc<Schema>) -> Self {
        FieldDef::record(schema)
    }
}

impl From<&Arc<Schema>> for FieldDef {
    fn from(schema: &Arc<Schema>) -> Self {
        FieldDef::record(Arc::clone(schema))
    }
}

impl From<Arc<BitSchema>> for FieldDef {
    fn from(schema: Arc<BitSchema>) -> Self {
        FieldDef::bits(schema)
    }
}

impl From<&Arc<BitSchema>> for FieldDef {
    fn from(schema: &Arc<BitSchema>) -> Self {
        FieldDef::bits(Arc::clone(schema))
    }
}
