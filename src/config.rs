//! Byte order and record-level policies.
//!
//! Byte order for an integer or float field resolves in this order: the field's own
//! override, the enclosing record's schema option, then the process-wide default held
//! here ([`default_byte_order`], little-endian until [`set_default_byte_order`] is called).

use std::sync::atomic::{AtomicU8, Ordering};

/// Byte order for multi-byte fields (integers, floats, flag and enum storage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    Big,
    #[default]
    Little,
}

impl Endianness {
    /// Network byte order.
    pub const NETWORK: Endianness = Endianness::Big;

    /// Byte order of the target the crate was compiled for.
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            Endianness::Big
        } else {
            Endianness::Little
        }
    }

    fn to_tag(self) -> u8 {
        match self {
            Endianness::Little => 0,
            Endianness::Big => 1,
        }
    }

    fn from_tag(tag: u8) -> Self {
        if tag == 1 {
            Endianness::Big
        } else {
            Endianness::Little
        }
    }
}

static DEFAULT_BYTE_ORDER: AtomicU8 = AtomicU8::new(0);

/// Current process-wide default byte order.
pub fn default_byte_order() -> Endianness {
    Endianness::from_tag(DEFAULT_BYTE_ORDER.load(Ordering::Relaxed))
}

/// Reconfigure the process-wide default byte order. Intended to be called once at
/// start-up; fields with their own override or a record-level byte order ignore it.
pub fn set_default_byte_order(order: Endianness) {
    DEFAULT_BYTE_ORDER.store(order.to_tag(), Ordering::Relaxed);
}

/// What a top-level parse does with bytes left over after the last field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrailingData {
    /// Fail with [`Error::TrailingData`](crate::Error::TrailingData).
    #[default]
    Error,
    /// Succeed, emit a `tracing` warning and record the count on the instance.
    Warn,
    /// Succeed silently.
    Ignore,
}

/// Maximum depth of embedded records accepted while parsing.
pub const MAX_NESTING_DEPTH: usize = 64;
