//! Expressions used by record-level consistency checks.
//!
//! Expressions see only the current record: `Expr::value("length")` is a sibling
//! field, never a parent or root path.

use crate::error::{Error, Result};
use crate::record::Record;
use crate::value::Value;
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    fn symbol(&self) -> char {
        match self {
            BinOp::Add => '+',
            BinOp::Sub => '-',
            BinOp::Mul => '*',
            BinOp::Div => '/',
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(Value),
    /// Current value of a sibling field.
    Field(String),
    /// Length of a sibling field's value.
    Len(String),
    Checksum { field: String, algorithm: String },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    pub fn constant(value: impl Into<Value>) -> Self {
        Expr::Const(value.into())
    }

    pub fn value(field: impl Into<String>) -> Self {
        Expr::Field(field.into())
    }

    pub fn len(field: impl Into<String>) -> Self {
        Expr::Len(field.into())
    }

    pub fn checksum(field: impl Into<String>, algorithm: impl Into<String>) -> Self {
        Expr::Checksum {
            field: field.into(),
            algorithm: algorithm.into(),
        }
    }

    pub fn crc32(field: impl Into<String>) -> Self {
        Expr::checksum(field, "crc32")
    }

    pub fn evaluate(&self, record: &Record) -> Result<Value> {
        match self {
            Expr::Const(v) => Ok(v.clone()),
            Expr::Field(name) => field_value(record, name).cloned(),
            Expr::Len(name) => {
                let value = field_value(record, name)?;
                value
                    .len()
                    .map(Value::from)
                    .ok_or_else(|| Error::Eval(format!("'{}' ({}) has no length", name, value.kind())))
            }
            Expr::Checksum { field, algorithm } => {
                let value = field_value(record, field)?;
                let data: &[u8] = match value {
                    Value::Bytes(b) => b,
                    Value::Str(s) => s.as_bytes(),
                    other => {
                        return Err(Error::Eval(format!(
                            "cannot checksum '{}' ({})",
                            field,
                            other.kind()
                        )))
                    }
                };
                if algorithm.eq_ignore_ascii_case("crc32") {
                    Ok(Value::U32(crc32(data)))
                } else {
                    Err(Error::UnsupportedAlgorithm(algorithm.clone()))
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                let l = lhs.evaluate(record)?;
                let r = rhs.evaluate(record)?;
                arithmetic(*op, &l, &r)
            }
        }
    }

    fn binary(self, op: BinOp, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(self),
            rhs: Box::new(rhs),
        }
    }
}

fn field_value<'r>(record: &'r Record, name: &str) -> Result<&'r Value> {
    record.get(name).ok_or_else(|| Error::Unresolved {
        path: name.to_string(),
        reason: format!("no field '{}' in {}", name, record.name()),
    })
}

/// Integer `+ - *` stay integral (checked); a float operand makes the result float;
/// `/` always produces a float.
fn arithmetic(op: BinOp, l: &Value, r: &Value) -> Result<Value> {
    let type_error = || {
        Error::Eval(format!(
            "unsupported operands {} {} {}",
            l.kind(),
            op.symbol(),
            r.kind()
        ))
    };
    if op == BinOp::Div {
        let (a, b) = (l.as_f64().ok_or_else(type_error)?, r.as_f64().ok_or_else(type_error)?);
        if b == 0.0 {
            return Err(Error::Eval("division by zero".to_string()));
        }
        return Ok(Value::Double(a / b));
    }
    if !l.is_float() && !r.is_float() {
        if let (Some(a), Some(b)) = (l.as_i128(), r.as_i128()) {
            let result = match op {
                BinOp::Add => a.checked_add(b),
                BinOp::Sub => a.checked_sub(b),
                _ => a.checked_mul(b),
            };
            return result
                .and_then(|x| i64::try_from(x).ok())
                .map(Value::I64)
                .ok_or_else(|| Error::Eval(format!("integer overflow in {} {} {}", a, op.symbol(), b)));
        }
    }
    let (a, b) = (l.as_f64().ok_or_else(type_error)?, r.as_f64().ok_or_else(type_error)?);
    Ok(Value::Double(match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        _ => a * b,
    }))
}

/// CRC-32 (IEEE 802.3, reflected polynomial 0xEDB88320).
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFF_FFFF;
    for byte in data {
        crc ^= u32::from(*byte);
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB8_8320;
            } else {
                crc >>= 1;
            }
        }
    }
    !crc
}

macro_rules! expr_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Expr {
            fn from(x: $t) -> Self {
                Expr::Const(Value::from(x))
            }
        })*
    };
}

expr_from!(u8, u16, u32, u64, usize, i8, i16, i32, i64, f32, f64);

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Const(v)
    }
}

impl<T: Into<Expr>> Add<T> for Expr {
    type Output = Expr;

    fn add(self, rhs: T) -> Expr {
        self.binary(BinOp::Add, rhs.into())
    }
}

impl<T: Into<Expr>> Sub<T> for Expr {
    type Output = Expr;

    fn sub(self, rhs: T) -> Expr {
        self.binary(BinOp::Sub, rhs.into())
    }
}

impl<T: Into<Expr>> Mul<T> for Expr {
    type Output = Expr;

    fn mul(self, rhs: T) -> Expr {
        self.binary(BinOp::Mul, rhs.into())
    }
}

impl<T: Into<Expr>> Div<T> for Expr {
    type Output = Expr;

    fn div(self, rhs: T) -> Expr {
        self.binary(BinOp::Div, rhs.into())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(v) => write!(f, "{}", v),
            Expr::Field(name) => f.write_str(name),
            Expr::Len(name) => write!(f, "len({})", name),
            Expr::Checksum { field, algorithm } => write!(f, "{}({})", algorithm, field),
            Expr::Binary { op, lhs, rhs } => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
        }
    }
}
