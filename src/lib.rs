//! # binlayout: declarative binary record layouts
//!
//! Describe a binary record once, as an ordered list of typed fields, and get parsing,
//! serialization, size computation, derived-field sync and validation from that single
//! description.
//!
//! ## Building blocks
//!
//! - **Scalars**: `u8`..`u64`, `i8`..`i64`, `f32`, `f64`, `bool`, with per-field or
//!   per-record byte order ([`Endianness`])
//! - **Byte and text fields**: fixed or referenced length, NUL-terminated strings,
//!   padding, in any [`TextEncoding`]
//! - **Symbolic fields**: bit flags ([`FlagSet`]) and enumerations ([`EnumValue`])
//! - **Composites**: embedded records, arrays, conditional fields and tagged unions
//!   (`switch`), with sizes and conditions that reference other fields through [`Ref`]
//! - **Bit-packed records**: [`BitSchema`] / [`BitRecord`]
//! - **Derived fields**: [`SyncRule`]s recompute lengths, counts and checksums
//! - **Validation**: [`FieldValidator`]s and [`RecordValidator`]s, reported together
//!
//! ## Example schema text
//!
//! ```text
//! bits Control (size = 1, order = msb) {
//!   urgent: bit;
//!   kind: bits(3) = 2;
//!   spare: bits(4);
//! }
//!
//! record Packet (endian = big) {
//!   ctl: Control;
//!   len: u16;
//!   payload: bytes(len);
//!   crc: u32 if ctl.urgent == true;
//! }
//! ```
//!
//! See `tests/` for builder-API examples.

pub mod bits;
pub mod codec;
pub mod config;
pub mod dump;
pub mod error;
pub mod expr;
pub mod field;
pub mod parser;
pub mod record;
pub mod reference;
pub mod schema;
pub mod sync;
pub mod text;
pub mod validate;
pub mod value;

pub use bits::{BitOrder, BitRecord, BitSchema};
pub use config::{default_byte_order, set_default_byte_order, Endianness, TrailingData};
pub use error::{Error, Result, ValidationErrors, ValidationFailure};
pub use expr::{crc32, Expr};
pub use field::{BaseType, Discriminator, FieldDef, SizeSpec, TypeSpec};
pub use parser::{load_schemas, parse_schemas, SchemaSet};
pub use record::Record;
pub use reference::{CmpOp, Condition, Ref, Scope};
pub use schema::{Schema, SchemaBuilder};
pub use sync::SyncRule;
pub use text::TextEncoding;
pub use validate::{Consistency, FieldValidator, RecordValidator};
pub use value::{EnumValue, FlagSet, Value};
