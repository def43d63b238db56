//! Parse, serialize and size of field values, dispatched on [`TypeSpec`].
//!
//! Every operation receives the field name (for diagnostics) and the [`Scope`] of the
//! record that owns the field, which is what references, conditions and switch
//! discriminators resolve against. Multi-byte scalars honour the field's byte order,
//! falling back to the record's and then the process default.

use crate::bits::BitRecord;
use crate::config::{default_byte_order, Endianness};
use crate::error::{Error, Result};
use crate::field::{BaseType, FieldDef, TypeSpec};
use crate::record::Record;
use crate::reference::Scope;
use crate::text::TextEncoding;
use crate::value::{EnumValue, FlagSet, Value};
use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::borrow::Cow;
use std::io::Cursor;

/// Primitive readers and writers for one byte order.
#[derive(Debug, Clone, Copy)]
struct Wire {
    endianness: Endianness,
}

impl Wire {
    fn new(endianness: Endianness) -> Self {
        Wire { endianness }
    }

    fn read_u16(&self, r: &mut Cursor<&[u8]>) -> Result<u16> {
        Ok(match self.endianness {
            Endianness::Big => r.read_u16::<BigEndian>()?,
            Endianness::Little => r.read_u16::<LittleEndian>()?,
        })
    }

    fn read_u32(&self, r: &mut Cursor<&[u8]>) -> Result<u32> {
        Ok(match self.endianness {
            Endianness::Big => r.read_u32::<BigEndian>()?,
            Endianness::Little => r.read_u32::<LittleEndian>()?,
        })
    }

    fn read_u64(&self, r: &mut Cursor<&[u8]>) -> Result<u64> {
        Ok(match self.endianness {
            Endianness::Big => r.read_u64::<BigEndian>()?,
            Endianness::Little => r.read_u64::<LittleEndian>()?,
        })
    }

    fn read_i16(&self, r: &mut Cursor<&[u8]>) -> Result<i16> {
        Ok(match self.endianness {
            Endianness::Big => r.read_i16::<BigEndian>()?,
            Endianness::Little => r.read_i16::<LittleEndian>()?,
        })
    }

    fn read_i32(&self, r: &mut Cursor<&[u8]>) -> Result<i32> {
        Ok(match self.endianness {
            Endianness::Big => r.read_i32::<BigEndian>()?,
            Endianness::Little => r.read_i32::<LittleEndian>()?,
        })
    }

    fn read_i64(&self, r: &mut Cursor<&[u8]>) -> Result<i64> {
        Ok(match self.endianness {
            Endianness::Big => r.read_i64::<BigEndian>()?,
            Endianness::Little => r.read_i64::<LittleEndian>()?,
        })
    }

    fn read_f32(&self, r: &mut Cursor<&[u8]>) -> Result<f32> {
        Ok(match self.endianness {
            Endianness::Big => r.read_f32::<BigEndian>()?,
            Endianness::Little => r.read_f32::<LittleEndian>()?,
        })
    }

    fn read_f64(&self, r: &mut Cursor<&[u8]>) -> Result<f64> {
        Ok(match self.endianness {
            Endianness::Big => r.read_f64::<BigEndian>()?,
            Endianness::Little => r.read_f64::<LittleEndian>()?,
        })
    }

    /// Unsigned integer of `size` bytes (1..=8).
    fn read_uint(&self, data: &[u8]) -> u64 {
        match self.endianness {
            Endianness::Big => BigEndian::read_uint(data, data.len()),
            Endianness::Little => LittleEndian::read_uint(data, data.len()),
        }
    }

    fn write_u16(&self, w: &mut Vec<u8>, v: u16) -> Result<()> {
        match self.endianness {
            Endianness::Big => w.write_u16::<BigEndian>(v)?,
            Endianness::Little => w.write_u16::<LittleEndian>(v)?,
        }
        Ok(())
    }

    fn write_u32(&self, w: &mut Vec<u8>, v: u32) -> Result<()> {
        match self.endianness {
            Endianness::Big => w.write_u32::<BigEndian>(v)?,
            Endianness::Little => w.write_u32::<LittleEndian>(v)?,
        }
        Ok(())
    }

    fn write_u64(&self, w: &mut Vec<u8>, v: u64) -> Result<()> {
        match self.endianness {
            Endianness::Big => w.write_u64::<BigEndian>(v)?,
            Endianness::Little => w.write_u64::<LittleEndian>(v)?,
        }
        Ok(())
    }

    fn write_i16(&self, w: &mut Vec<u8>, v: i16) -> Result<()> {
        match self.endianness {
            Endianness::Big => w.write_i16::<BigEndian>(v)?,
            Endianness::Little => w.write_i16::<LittleEndian>(v)?,
        }
        Ok(())
    }

    fn write_i32(&self, w: &mut Vec<u8>, v: i32) -> Result<()> {
        match self.endianness {
            Endianness::Big => w.write_i32::<BigEndian>(v)?,
            Endianness::Little => w.write_i32::<LittleEndian>(v)?,
        }
        Ok(())
    }

    fn write_i64(&self, w: &mut Vec<u8>, v: i64) -> Result<()> {
        match self.endianness {
            Endianness::Big => w.write_i64::<BigEndian>(v)?,
            Endianness::Little => w.write_i64::<LittleEndian>(v)?,
        }
        Ok(())
    }

    fn write_f32(&self, w: &mut Vec<u8>, v: f32) -> Result<()> {
        match self.endianness {
            Endianness::Big => w.write_f32::<BigEndian>(v)?,
            Endianness::Little => w.write_f32::<LittleEndian>(v)?,
        }
        Ok(())
    }

    fn write_f64(&self, w: &mut Vec<u8>, v: f64) -> Result<()> {
        match self.endianness {
            Endianness::Big => w.write_f64::<BigEndian>(v)?,
            Endianness::Little => w.write_f64::<LittleEndian>(v)?,
        }
        Ok(())
    }

    fn write_uint(&self, w: &mut Vec<u8>, v: u64, size: usize) {
        let mut buf = [0u8; 8];
        match self.endianness {
            Endianness::Big => BigEndian::write_uint(&mut buf[..size], v, size),
            Endianness::Little => LittleEndian::write_uint(&mut buf[..size], v, size),
        }
        w.extend_from_slice(&buf[..size]);
    }
}

/// Bytes left between the cursor and the end of input.
fn remaining(r: &Cursor<&[u8]>) -> usize {
    r.get_ref().len().saturating_sub(r.position() as usize)
}

fn ensure(r: &Cursor<&[u8]>, n: usize, field: &str) -> Result<()> {
    let available = remaining(r);
    if available < n {
        return Err(Error::InsufficientData {
            expected: n,
            actual: available,
            field: Some(field.to_string()),
        });
    }
    Ok(())
}

/// Take exactly `n` bytes or fail without consuming any.
fn take<'b>(r: &mut Cursor<&'b [u8]>, n: usize, field: &str) -> Result<&'b [u8]> {
    ensure(r, n, field)?;
    let data: &'b [u8] = *r.get_ref();
    let start = r.position() as usize;
    r.set_position((start + n) as u64);
    Ok(&data[start..start + n])
}

fn mismatch(field: &str, expected: &'static str, found: &Value) -> Error {
    Error::TypeMismatch {
        field: field.to_string(),
        expected,
        found: found.kind(),
    }
}

fn encoding_error(field: &str) -> impl FnOnce(String) -> Error + '_ {
    move |reason| Error::Encoding {
        field: field.to_string(),
        reason,
    }
}

impl FieldDef {
    /// Byte order for this field inside `scope`.
    pub(crate) fn endianness_in(&self, scope: &Scope) -> Endianness {
        self.endianness
            .or_else(|| scope.record().schema().endianness())
            .unwrap_or_else(default_byte_order)
    }

    /// Whether the field takes part in the layout right now (conditions of
    /// conditional fields hold).
    pub fn is_active(&self, scope: &Scope) -> Result<bool> {
        match &self.spec {
            TypeSpec::Conditional { when, .. } => when.evaluate(scope),
            _ => Ok(true),
        }
    }

    /// Switch case selected by the current discriminator. `Ok(None)` means no case
    /// matched and the field is not required.
    fn select_case(&self, name: &str, scope: &Scope) -> Result<Option<&FieldDef>> {
        let TypeSpec::Switch {
            discriminator,
            cases,
            default,
        } = &self.spec
        else {
            return Ok(None);
        };
        let key = discriminator.evaluate(scope)?;
        if let Some((_, field)) = cases.iter().find(|(k, _)| k.loose_eq(&key)) {
            return Ok(Some(field));
        }
        if let Some(field) = default {
            return Ok(Some(field));
        }
        if self.required {
            return Err(Error::NoMatchingCase {
                field: name.to_string(),
                discriminator: key.to_string(),
            });
        }
        Ok(None)
    }

    /// Read one value of this field from `r`.
    pub fn parse(&self, name: &str, r: &mut Cursor<&[u8]>, scope: &Scope) -> Result<Value> {
        match &self.spec {
            TypeSpec::Base(bt) => decode_base(r, bt, Wire::new(self.endianness_in(scope)), name),
            TypeSpec::FixedBytes(n) => Ok(Value::Bytes(take(r, *n, name)?.to_vec())),
            TypeSpec::Bytes(len) => {
                let n = len.resolve(name, scope)?;
                Ok(Value::Bytes(take(r, n, name)?.to_vec()))
            }
            TypeSpec::FixedString { len, encoding, pad } => {
                let raw = take(r, *len, name)?;
                let end = raw.iter().rposition(|b| b != pad).map_or(0, |i| i + 1);
                let text = encoding.decode(&raw[..end]).map_err(encoding_error(name))?;
                Ok(Value::Str(text))
            }
            TypeSpec::String { len, encoding } => {
                let n = len.resolve(name, scope)?;
                let raw = take(r, n, name)?;
                Ok(Value::Str(encoding.decode(raw).map_err(encoding_error(name))?))
            }
            TypeSpec::CString {
                encoding, max_len, ..
            } => decode_cstring(r, encoding, *max_len, name),
            TypeSpec::Padding { len, .. } => {
                let n = len.resolve(name, scope)?;
                take(r, n, name)?;
                Ok(Value::Absent)
            }
            TypeSpec::Flags { size, flags } => {
                let raw = Wire::new(self.endianness.unwrap_or(Endianness::Little)).read_uint(take(r, *size, name)?);
                let active = flags
                    .iter()
                    .filter(|(_, bit)| raw & bit != 0)
                    .map(|(flag, _)| flag.as_str());
                Ok(Value::Flags(FlagSet::new(active, raw)))
            }
            TypeSpec::Enum { size, variants } => {
                let raw = Wire::new(self.endianness.unwrap_or(Endianness::Little)).read_uint(take(r, *size, name)?);
                Ok(match variants.iter().find(|(_, v)| *v == raw) {
                    Some((variant, v)) => Value::Enum(EnumValue::new(variant.as_str(), *v)),
                    None => Value::U64(raw),
                })
            }
            TypeSpec::Bits(schema) => {
                let raw = take(r, schema.size(), name)?;
                Ok(Value::Bits(BitRecord::parse(schema, raw)?))
            }
            TypeSpec::Struct(schema) => Ok(Value::Record(Record::parse_fields(schema, r, Some(scope))?)),
            TypeSpec::Array(element, count) => {
                let n = count.resolve(name, scope)?;
                let mut items = Vec::with_capacity(n.min(remaining(r)));
                for _ in 0..n {
                    items.push(element.parse(name, r, scope)?);
                }
                Ok(Value::List(items))
            }
            TypeSpec::Conditional { inner, when } => {
                if when.evaluate(scope)? {
                    inner.parse(name, r, scope)
                } else {
                    Ok(self.default_value())
                }
            }
            TypeSpec::Switch { .. } => match self.select_case(name, scope)? {
                Some(case) => case.parse(name, r, scope),
                None => Ok(Value::Absent),
            },
        }
    }

    /// Append the encoding of `value` to `w`. Absent values of fixed-size kinds
    /// encode as zeros so the output matches [`FieldDef::size`].
    pub fn serialize(&self, name: &str, value: &Value, scope: &Scope, w: &mut Vec<u8>) -> Result<()> {
        match &self.spec {
            TypeSpec::Base(bt) => encode_base(w, bt, value, Wire::new(self.endianness_in(scope)), name),
            TypeSpec::FixedBytes(n) => match value {
                Value::Absent => {
                    w.resize(w.len() + n, 0);
                    Ok(())
                }
                other => {
                    w.extend_from_slice(bytes_of(other, name)?);
                    Ok(())
                }
            },
            TypeSpec::Bytes(_) => {
                if !value.is_absent() {
                    w.extend_from_slice(bytes_of(value, name)?);
                }
                Ok(())
            }
            TypeSpec::FixedString { len, encoding, pad } => {
                let encoded = match value {
                    Value::Absent => Vec::new(),
                    other => encode_text(other, encoding, name)?,
                };
                if encoded.len() > *len {
                    return Err(Error::Serialization {
                        field: name.to_string(),
                        reason: format!("string too long: {} bytes > {}", encoded.len(), len),
                    });
                }
                w.extend_from_slice(&encoded);
                w.resize(w.len() + (len - encoded.len()), *pad);
                Ok(())
            }
            TypeSpec::String { encoding, .. } => {
                if !value.is_absent() {
                    w.extend_from_slice(&encode_text(value, encoding, name)?);
                }
                Ok(())
            }
            TypeSpec::CString {
                encoding,
                include_null,
                ..
            } => {
                if !value.is_absent() {
                    w.extend_from_slice(&encode_text(value, encoding, name)?);
                    if *include_null {
                        w.push(0);
                    }
                }
                Ok(())
            }
            TypeSpec::Padding { len, fill } => {
                let n = len.resolve(name, scope)?;
                w.resize(w.len() + n, *fill);
                Ok(())
            }
            TypeSpec::Flags { size, flags } => {
                let raw = flags_raw(value, flags, name)?;
                ensure_fits(raw, *size, name)?;
                Wire::new(self.endianness.unwrap_or(Endianness::Little)).write_uint(w, raw, *size);
                Ok(())
            }
            TypeSpec::Enum { size, variants } => {
                let raw = enum_raw(value, variants, name)?;
                ensure_fits(raw, *size, name)?;
                Wire::new(self.endianness.unwrap_or(Endianness::Little)).write_uint(w, raw, *size);
                Ok(())
            }
            TypeSpec::Bits(schema) => match value {
                Value::Absent => {
                    w.resize(w.len() + schema.size(), 0);
                    Ok(())
                }
                Value::Bits(bits) => {
                    w.extend_from_slice(&bits.to_bytes()?);
                    Ok(())
                }
                other => Err(mismatch(name, "bit record", other)),
            },
            TypeSpec::Struct(schema) => match value {
                Value::Absent => {
                    w.resize(w.len() + schema.fixed_size().unwrap_or(0), 0);
                    Ok(())
                }
                Value::Record(child) => child.serialize_in(&scope.child(child), w),
                other => Err(mismatch(name, "record", other)),
            },
            TypeSpec::Array(element, _) => match value {
                Value::Absent => Ok(()),
                Value::List(items) => {
                    for item in items {
                        element.serialize(name, item, scope, w)?;
                    }
                    Ok(())
                }
                other => Err(mismatch(name, "list", other)),
            },
            TypeSpec::Conditional { inner, when } => {
                if !when.evaluate(scope)? {
                    return Ok(());
                }
                let value = self.value_or_default(value);
                inner.serialize(name, &value, scope, w)
            }
            TypeSpec::Switch { .. } => match self.select_case(name, scope)? {
                Some(case) => case.serialize(name, value, scope, w),
                None => Ok(()),
            },
        }
    }

    /// Encoded size of `value` in bytes; always the length `serialize` would emit.
    pub fn size(&self, name: &str, value: &Value, scope: &Scope) -> Result<usize> {
        match &self.spec {
            TypeSpec::Base(bt) => Ok(bt.width()),
            TypeSpec::FixedBytes(n) => Ok(*n),
            TypeSpec::FixedString { len, .. } => Ok(*len),
            TypeSpec::Bytes(_) | TypeSpec::String { .. } if value.is_absent() => Ok(0),
            TypeSpec::Bytes(len) | TypeSpec::String { len, .. } | TypeSpec::Padding { len, .. } => {
                len.resolve(name, scope)
            }
            TypeSpec::CString {
                encoding,
                include_null,
                ..
            } => match value {
                Value::Absent => Ok(0),
                other => Ok(encode_text(other, encoding, name)?.len() + usize::from(*include_null)),
            },
            TypeSpec::Flags { size, .. } | TypeSpec::Enum { size, .. } => Ok(*size),
            TypeSpec::Bits(schema) => Ok(schema.size()),
            TypeSpec::Struct(schema) => match value {
                Value::Record(child) => child.size_in(&scope.child(child)),
                _ => Ok(schema.fixed_size().unwrap_or(0)),
            },
            TypeSpec::Array(element, _) => match value {
                Value::List(items) => items.iter().try_fold(0usize, |total, item| {
                    Ok(total + element.size(name, item, scope)?)
                }),
                _ => Ok(0),
            },
            TypeSpec::Conditional { inner, when } => {
                if when.evaluate(scope)? {
                    inner.size(name, &self.value_or_default(value), scope)
                } else {
                    Ok(0)
                }
            }
            TypeSpec::Switch { .. } => match self.select_case(name, scope)? {
                Some(case) => case.size(name, value, scope),
                None => Ok(0),
            },
        }
    }

    fn value_or_default<'v>(&self, value: &'v Value) -> Cow<'v, Value> {
        if value.is_absent() {
            Cow::Owned(self.default_value())
        } else {
            Cow::Borrowed(value)
        }
    }
}

fn decode_base(r: &mut Cursor<&[u8]>, bt: &BaseType, wire: Wire, field: &str) -> Result<Value> {
    ensure(r, bt.width(), field)?;
    Ok(match bt {
        BaseType::U8 => Value::U8(r.read_u8()?),
        BaseType::U16 => Value::U16(wire.read_u16(r)?),
        BaseType::U32 => Value::U32(wire.read_u32(r)?),
        BaseType::U64 => Value::U64(wire.read_u64(r)?),
        BaseType::I8 => Value::I8(r.read_i8()?),
        BaseType::I16 => Value::I16(wire.read_i16(r)?),
        BaseType::I32 => Value::I32(wire.read_i32(r)?),
        BaseType::I64 => Value::I64(wire.read_i64(r)?),
        BaseType::Bool => Value::Bool(r.read_u8()? != 0),
        BaseType::Float => Value::Float(wire.read_f32(r)?),
        BaseType::Double => Value::Double(wire.read_f64(r)?),
    })
}

fn encode_base(w: &mut Vec<u8>, bt: &BaseType, v: &Value, wire: Wire, field: &str) -> Result<()> {
    if v.is_absent() {
        w.resize(w.len() + bt.width(), 0);
        return Ok(());
    }
    match bt {
        BaseType::Bool => {
            let b = v.as_bool().ok_or_else(|| mismatch(field, "bool", v))?;
            w.write_u8(u8::from(b))?;
        }
        BaseType::Float => {
            let x = match v {
                Value::Float(x) => *x,
                other => other.as_f64().ok_or_else(|| mismatch(field, "number", v))? as f32,
            };
            wire.write_f32(w, x)?;
        }
        BaseType::Double => {
            let x = v.as_f64().ok_or_else(|| mismatch(field, "number", v))?;
            wire.write_f64(w, x)?;
        }
        int => {
            let n = v.as_i128().ok_or_else(|| mismatch(field, "integer", v))?;
            if let Some((min, max)) = int.int_range() {
                if n < min || n > max {
                    return Err(Error::Serialization {
                        field: field.to_string(),
                        reason: format!("{} out of range for {}", n, int.name()),
                    });
                }
            }
            match int {
                BaseType::U8 => w.write_u8(n as u8)?,
                BaseType::U16 => wire.write_u16(w, n as u16)?,
                BaseType::U32 => wire.write_u32(w, n as u32)?,
                BaseType::U64 => wire.write_u64(w, n as u64)?,
                BaseType::I8 => w.write_i8(n as i8)?,
                BaseType::I16 => wire.write_i16(w, n as i16)?,
                BaseType::I32 => wire.write_i32(w, n as i32)?,
                _ => wire.write_i64(w, n as i64)?,
            }
        }
    }
    Ok(())
}

/// Reads up to the NUL terminator, end of input, or `max_len` bytes, whichever comes first.
fn decode_cstring(
    r: &mut Cursor<&[u8]>,
    encoding: &TextEncoding,
    max_len: Option<usize>,
    field: &str,
) -> Result<Value> {
    let data: &[u8] = *r.get_ref();
    let start = (r.position() as usize).min(data.len());
    let mut text_end = start;
    let mut consumed = 0usize;
    while start + consumed < data.len() && max_len.map_or(true, |limit| consumed < limit) {
        let byte = data[start + consumed];
        consumed += 1;
        if byte == 0 {
            break;
        }
        text_end += 1;
    }
    r.set_position((start + consumed) as u64);
    let text = encoding
        .decode(&data[start..text_end])
        .map_err(encoding_error(field))?;
    Ok(Value::Str(text))
}

fn bytes_of<'v>(value: &'v Value, field: &str) -> Result<&'v [u8]> {
    match value {
        Value::Bytes(b) => Ok(b),
        Value::Str(s) => Ok(s.as_bytes()),
        other => Err(mismatch(field, "bytes", other)),
    }
}

fn encode_text(value: &Value, encoding: &TextEncoding, field: &str) -> Result<Vec<u8>> {
    match value {
        Value::Str(s) => encoding.encode(s).map_err(encoding_error(field)),
        other => Err(mismatch(field, "string", other)),
    }
}

/// Raw integer for a flags field: a flag set, a list of names, or an integer.
fn flags_raw(value: &Value, flags: &[(String, u64)], field: &str) -> Result<u64> {
    match value {
        Value::Absent => Ok(0),
        Value::Flags(set) => Ok(set.raw()),
        Value::List(names) => names.iter().try_fold(0u64, |raw, item| {
            let name = item.as_str().ok_or_else(|| mismatch(field, "flag name", item))?;
            let bit = flags.iter().find(|(f, _)| f == name).map_or(0, |(_, bit)| *bit);
            Ok(raw | bit)
        }),
        other => other.as_u64().ok_or_else(|| mismatch(field, "flags", other)),
    }
}

/// Raw integer for an enum field: a variant, a variant name, or an integer.
fn enum_raw(value: &Value, variants: &[(String, u64)], field: &str) -> Result<u64> {
    match value {
        Value::Absent => Ok(0),
        Value::Enum(e) => Ok(e.value),
        Value::Str(name) => variants
            .iter()
            .find(|(v, _)| v == name)
            .map(|(_, raw)| *raw)
            .ok_or_else(|| Error::Serialization {
                field: field.to_string(),
                reason: format!("unknown variant '{}'", name),
            }),
        other => other.as_u64().ok_or_else(|| mismatch(field, "enum", other)),
    }
}

fn ensure_fits(raw: u64, size: usize, field: &str) -> Result<()> {
    if size < 8 && raw >> (size * 8) != 0 {
        return Err(Error::Serialization {
            field: field.to_string(),
            reason: format!("{:#x} does not fit in {} bytes", raw, size),
        });
    }
    Ok(())
}
