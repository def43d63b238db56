//! Human-readable rendering of values and records: one-line `Display` and a
//! multi-line indented dump.

use crate::bits::BitRecord;
use crate::record::Record;
use crate::value::{EnumValue, FlagSet, Value};
use std::fmt;

fn hex_string(b: &[u8]) -> String {
    b.iter().map(|x| format!("{:02x}", x)).collect::<Vec<_>>().join(" ")
}

/// Raw scalar string; compound values fall back to their one-line form.
pub fn format_scalar_raw(v: &Value) -> String {
    match v {
        Value::Absent => "<absent>".to_string(),
        Value::U8(x) => format!("{}", x),
        Value::U16(x) => format!("{}", x),
        Value::U32(x) => format!("{}", x),
        Value::U64(x) => format!("{}", x),
        Value::I8(x) => format!("{}", x),
        Value::I16(x) => format!("{}", x),
        Value::I32(x) => format!("{}", x),
        Value::I64(x) => format!("{}", x),
        Value::Bool(x) => format!("{}", x),
        Value::Float(x) => format!("{}", x),
        Value::Double(x) => format!("{}", x),
        Value::Bytes(b) => format!("hex({})", hex_string(b)),
        Value::Str(s) => format!("{:?}", s),
        other => other.to_string(),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Record(r) => write!(f, "{}", r),
            Value::Bits(b) => write!(f, "{}", b),
            Value::Flags(flags) => write!(f, "{}", flags),
            Value::Enum(e) => write!(f, "{}", e),
            scalar => f.write_str(&format_scalar_raw(scalar)),
        }
    }
}

impl fmt::Display for FlagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FlagSet{{{}}}={:#x}", self.names().collect::<Vec<_>>().join(", "), self.raw())
    }
}

impl fmt::Display for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.value)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name())?;
        for (i, (name, value)) in self.fields().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        f.write_str(")")
    }
}

impl fmt::Display for BitRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name())?;
        for (i, (name, value)) in self.fields().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        f.write_str(")")
    }
}

/// Format a value for a multi-line dump. Nested records and lists are indented two
/// spaces per level; padding and absent fields are skipped inside records.
pub fn value_to_dump(v: &Value, indent: usize) -> String {
    let pad = "  ".repeat(indent);
    match v {
        Value::Record(record) => record_to_dump(record, indent),
        Value::Bits(bits) => {
            let mut lines = vec![format!("{}{} {{", pad, bits.name())];
            for (name, value) in bits.fields() {
                lines.push(format!("{}  {}: {}", pad, name, format_scalar_raw(value)));
            }
            lines.push(format!("{}}}", pad));
            lines.join("\n")
        }
        Value::List(items) if items.iter().any(|i| matches!(i, Value::Record(_) | Value::Bits(_))) => {
            let mut lines = vec![format!("{}[", pad)];
            for (i, item) in items.iter().enumerate() {
                let sub = value_to_dump(item, indent + 1);
                lines.push(format!("{}  [{}] {}", pad, i, sub.trim_start()));
            }
            lines.push(format!("{}]", pad));
            lines.join("\n")
        }
        other => format!("{}{}", pad, other),
    }
}

/// Multi-line dump of a record tree.
pub fn record_to_dump(record: &Record, indent: usize) -> String {
    let pad = "  ".repeat(indent);
    let mut lines = vec![format!("{}{} {{", pad, record.name())];
    for (name, value) in record.fields() {
        if value.is_absent() {
            continue;
        }
        let sub = value_to_dump(value, indent + 1);
        lines.push(format!("{}  {}: {}", pad, name, sub.trim_start()));
    }
    lines.push(format!("{}}}", pad));
    lines.join("\n")
}

/// First line of [`value_to_dump`], for summaries.
pub fn value_summary_line(v: &Value) -> String {
    let full = value_to_dump(v, 0);
    full.lines().next().map(|s| s.trim().to_string()).unwrap_or_default()
}
