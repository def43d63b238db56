//! Parse schema text into record and bit schemas using PEST.
//!
//! Names must be declared before they are used (as a field type or a parent record).

use crate::bits::{BitOrder, BitSchema};
use crate::config::{Endianness, TrailingData};
use crate::field::{BaseType, FieldDef, SizeSpec, TypeSpec};
use crate::reference::{CmpOp, Condition, Ref};
use crate::schema::Schema;
use crate::text::TextEncoding;
use crate::validate::FieldValidator;
use crate::value::Value;
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser as PestParser;
use std::path::Path;
use std::sync::Arc;

#[derive(PestParser)]
#[grammar = "grammar.pest"]
struct SchemaParser;

/// Schemas declared in one source, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct SchemaSet {
    records: Vec<Arc<Schema>>,
    bits: Vec<Arc<BitSchema>>,
}

impl SchemaSet {
    pub fn record(&self, name: &str) -> Option<&Arc<Schema>> {
        self.records.iter().find(|s| s.name() == name)
    }

    pub fn bits(&self, name: &str) -> Option<&Arc<BitSchema>> {
        self.bits.iter().find(|s| s.name() == name)
    }

    pub fn records(&self) -> &[Arc<Schema>] {
        &self.records
    }

    pub fn bit_schemas(&self) -> &[Arc<BitSchema>] {
        &self.bits
    }

    fn is_declared(&self, name: &str) -> bool {
        self.record(name).is_some() || self.bits(name).is_some()
    }
}

/// Parse schema source text.
pub fn parse_schemas(source: &str) -> Result<SchemaSet, String> {
    let pairs = SchemaParser::parse(Rule::schema_file, source)
        .map_err(|e| format!("Parse error: {}", e))?;
    let pair = pairs.into_iter().next().ok_or("Empty parse")?;
    build_schema_set(pair)
}

/// Read and parse a schema file.
pub fn load_schemas(path: impl AsRef<Path>) -> Result<SchemaSet, String> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    parse_schemas(&source)
}

fn build_schema_set(pair: Pair<Rule>) -> Result<SchemaSet, String> {
    let mut set = SchemaSet::default();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::bits_def => {
                let schema = build_bits(inner)?;
                if set.is_declared(schema.name()) {
                    return Err(format!("Duplicate name: {}", schema.name()));
                }
                set.bits.push(schema);
            }
            Rule::record_def => {
                let schema = build_record(inner, &set)?;
                if set.is_declared(schema.name()) {
                    return Err(format!("Duplicate name: {}", schema.name()));
                }
                set.records.push(schema);
            }
            _ => {}
        }
    }
    Ok(set)
}

fn first_inner(pair: Pair<Rule>) -> Result<Pair<Rule>, String> {
    let rule = pair.as_rule();
    pair.into_inner()
        .next()
        .ok_or_else(|| format!("{:?}: missing element", rule))
}

fn build_bits(pair: Pair<Rule>) -> Result<Arc<BitSchema>, String> {
    let mut inner = pair.into_inner();
    let name = inner.next().ok_or("bits: missing name")?.as_str().to_string();
    let mut builder = BitSchema::builder(name.as_str());
    for part in inner {
        match part.as_rule() {
            Rule::bits_opts => {
                for opt in part.into_inner() {
                    let opt = first_inner(opt)?;
                    match opt.as_rule() {
                        Rule::size_opt => builder = builder.size(parse_usize(first_inner(opt)?)?),
                        Rule::order_opt => {
                            builder = builder.order(match first_inner(opt)?.as_str() {
                                "msb" => BitOrder::MsbFirst,
                                _ => BitOrder::LsbFirst,
                            })
                        }
                        _ => {}
                    }
                }
            }
            Rule::bit_field => {
                let mut it = part.into_inner();
                let field = it.next().ok_or("bit field: name")?.as_str().to_string();
                let kind = first_inner(it.next().ok_or("bit field: type")?)?;
                let width = if kind.as_rule() == Rule::bit_one {
                    1
                } else {
                    u32::try_from(parse_usize(first_inner(kind)?)?).map_err(|e| e.to_string())?
                };
                let is_flag = width == 1;
                builder = builder.bits(field.as_str(), width);
                if let Some(lit) = it.next() {
                    let value = literal_value(lit)?;
                    let typed = if is_flag {
                        value.as_bool().map(Value::Bool)
                    } else {
                        value.as_u64().map(Value::U64)
                    };
                    let typed = typed.ok_or_else(|| format!("{}.{}: invalid default {}", name, field, value))?;
                    builder = builder.default(typed);
                }
            }
            _ => {}
        }
    }
    builder.build().map_err(|e| e.to_string())
}

fn build_record(pair: Pair<Rule>, set: &SchemaSet) -> Result<Arc<Schema>, String> {
    let mut inner = pair.into_inner();
    let name = inner.next().ok_or("record: missing name")?.as_str().to_string();
    let mut builder = Schema::builder(name);
    for part in inner {
        match part.as_rule() {
            Rule::parent_ref => {
                let parent = first_inner(part)?.as_str();
                let schema = set
                    .record(parent)
                    .ok_or_else(|| format!("Unknown parent record: {}", parent))?;
                builder = builder.extend(schema);
            }
            Rule::record_opts => {
                for opt in part.into_inner() {
                    let opt = first_inner(opt)?;
                    match opt.as_rule() {
                        Rule::endian_opt => builder = builder.endian(parse_endian(first_inner(opt)?.as_str())),
                        Rule::trailing_opt => {
                            builder = builder.trailing_data(match first_inner(opt)?.as_str() {
                                "warn" => TrailingData::Warn,
                                "ignore" => TrailingData::Ignore,
                                _ => TrailingData::Error,
                            })
                        }
                        _ => {}
                    }
                }
            }
            Rule::field => {
                let (field, def) = build_field(part, set)?;
                builder = builder.field(field, def);
            }
            _ => {}
        }
    }
    builder.build().map_err(|e| e.to_string())
}

fn build_field(pair: Pair<Rule>, set: &SchemaSet) -> Result<(String, FieldDef), String> {
    let mut inner = pair.into_inner();
    let name = inner.next().ok_or("field: missing name")?.as_str().to_string();
    let mut def = build_type(inner.next().ok_or("field: missing type")?, set)?;
    let mut default = None;
    let mut validators = Vec::new();
    let mut condition = None;
    for part in inner {
        match part.as_rule() {
            Rule::endian_override => def = def.endian(parse_endian(first_inner(part)?.as_str())),
            Rule::default_value => {
                let value = literal_value(first_inner(part)?)?;
                default = Some(typed_literal(&def, value).map_err(|e| format!("{}: {}", name, e))?);
            }
            Rule::constraint => validators.push(build_constraint(first_inner(part)?)?),
            Rule::condition => condition = Some(build_condition(first_inner(part)?)?),
            _ => {}
        }
    }
    let mut def = match condition {
        Some(when) => FieldDef::conditional(def, when),
        None => def,
    };
    if let Some(value) = default {
        def = def.default(value);
    }
    for validator in validators {
        def = def.validator(validator);
    }
    Ok((name, def))
}

fn build_type(pair: Pair<Rule>, set: &SchemaSet) -> Result<FieldDef, String> {
    match pair.as_rule() {
        Rule::type_spec | Rule::scalar_type => build_type(first_inner(pair)?, set),
        Rule::array_type => {
            let mut it = pair.into_inner();
            let element = build_type(it.next().ok_or("array: element type")?, set)?;
            let count = size_arg(it.next().ok_or("array: count")?)?;
            Ok(FieldDef::array(element, count))
        }
        Rule::base_type => Ok(FieldDef::base(base_type(pair.as_str())?)),
        Rule::bytes_type => Ok(match size_arg(first_inner(pair)?)? {
            SizeSpec::Constant(n) => FieldDef::fixed_bytes(n),
            size => FieldDef::bytes(size),
        }),
        Rule::string_type => {
            let mut it = pair.into_inner();
            let mut def = match size_arg(it.next().ok_or("string: size")?)? {
                SizeSpec::Constant(n) => FieldDef::fixed_string(n),
                size => FieldDef::string(size),
            };
            if let Some(label) = it.next() {
                def = def.encoding(encoding_for(label.as_str())?);
            }
            Ok(def)
        }
        Rule::cstring_type => {
            let mut def = FieldDef::cstring();
            for part in pair.into_inner() {
                if part.as_rule() == Rule::dec_int {
                    def = def.max_len(parse_usize(part)?);
                }
            }
            Ok(def)
        }
        Rule::padding_type => Ok(FieldDef::padding(size_arg(first_inner(pair)?)?)),
        Rule::flags_type | Rule::enum_type => {
            let is_flags = pair.as_rule() == Rule::flags_type;
            let mut it = pair.into_inner();
            let size = parse_usize(it.next().ok_or("storage size")?)?;
            let named = it.map(named_value).collect::<Result<Vec<_>, String>>()?;
            Ok(if is_flags {
                FieldDef::flags(size, named)
            } else {
                FieldDef::enumeration(size, named)
            })
        }
        Rule::switch_type => {
            let mut it = pair.into_inner();
            let discriminator = it.next().ok_or("switch: discriminator")?.as_str();
            let mut def = FieldDef::switch(Ref::new(discriminator));
            for case in it {
                let mut c = case.into_inner();
                let key = c.next().ok_or("switch case: key")?;
                let ty = build_type(c.next().ok_or("switch case: type")?, set)?;
                def = if key.as_rule() == Rule::default_key {
                    def.default_case(ty)
                } else {
                    def.case(literal_value(key)?, ty)
                };
            }
            Ok(def)
        }
        Rule::named_type => {
            let name = pair.as_str();
            if let Some(schema) = set.record(name) {
                Ok(FieldDef::record(Arc::clone(schema)))
            } else if let Some(schema) = set.bits(name) {
                Ok(FieldDef::bits(Arc::clone(schema)))
            } else {
                Err(format!("Unknown type: {}", name))
            }
        }
        other => Err(format!("unexpected type element {:?}", other)),
    }
}

fn build_constraint(pair: Pair<Rule>) -> Result<FieldValidator, String> {
    match pair.as_rule() {
        Rule::range_constraint => {
            let mut min = None;
            let mut max = None;
            for bound in pair.into_inner() {
                let rule = bound.as_rule();
                let value = literal_value(first_inner(bound)?)?;
                if rule == Rule::range_min {
                    min = Some(value);
                } else {
                    max = Some(value);
                }
            }
            Ok(FieldValidator::Range { min, max })
        }
        Rule::in_constraint => {
            let allowed = pair
                .into_inner()
                .map(literal_value)
                .collect::<Result<Vec<_>, String>>()?;
            Ok(FieldValidator::OneOf(allowed))
        }
        other => Err(format!("unexpected constraint {:?}", other)),
    }
}

fn build_condition(pair: Pair<Rule>) -> Result<Condition, String> {
    match pair.as_rule() {
        Rule::cond_or | Rule::cond_and => {
            let is_or = pair.as_rule() == Rule::cond_or;
            let mut parts = pair.into_inner();
            let first = build_condition(parts.next().ok_or("empty condition")?)?;
            parts.try_fold(first, |acc, part| {
                let next = build_condition(part)?;
                Ok(if is_or { acc.or(next) } else { acc.and(next) })
            })
        }
        Rule::cond_atom => build_condition(first_inner(pair)?),
        Rule::comparison => {
            let mut it = pair.into_inner();
            let path = it.next().ok_or("comparison: path")?.as_str();
            let op = match it.next().ok_or("comparison: operator")?.as_str() {
                "==" => CmpOp::Eq,
                "!=" => CmpOp::Ne,
                "<" => CmpOp::Lt,
                "<=" => CmpOp::Le,
                ">" => CmpOp::Gt,
                _ => CmpOp::Ge,
            };
            let value = literal_value(it.next().ok_or("comparison: value")?)?;
            Ok(Ref::new(path).compare(op, value))
        }
        other => Err(format!("unexpected condition element {:?}", other)),
    }
}

fn named_value(pair: Pair<Rule>) -> Result<(String, u64), String> {
    let mut it = pair.into_inner();
    let name = it.next().ok_or("named value: name")?.as_str().to_string();
    let value = literal_value(it.next().ok_or("named value: value")?)?;
    let raw = value
        .as_u64()
        .ok_or_else(|| format!("{}: expected a non-negative integer, got {}", name, value))?;
    Ok((name, raw))
}

fn size_arg(pair: Pair<Rule>) -> Result<SizeSpec, String> {
    let inner = first_inner(pair)?;
    match inner.as_rule() {
        Rule::path => Ok(SizeSpec::FieldRef(Ref::new(inner.as_str()))),
        _ => Ok(SizeSpec::Constant(parse_usize(inner)?)),
    }
}

fn parse_endian(s: &str) -> Endianness {
    if s == "big" {
        Endianness::Big
    } else {
        Endianness::Little
    }
}

fn base_type(s: &str) -> Result<BaseType, String> {
    Ok(match s {
        "u8" => BaseType::U8,
        "u16" => BaseType::U16,
        "u32" => BaseType::U32,
        "u64" => BaseType::U64,
        "i8" => BaseType::I8,
        "i16" => BaseType::I16,
        "i32" => BaseType::I32,
        "i64" => BaseType::I64,
        "f32" => BaseType::Float,
        "f64" => BaseType::Double,
        "bool" => BaseType::Bool,
        other => return Err(format!("Unknown base type: {}", other)),
    })
}

fn encoding_for(label: &str) -> Result<TextEncoding, String> {
    let label = label.trim_matches('"');
    TextEncoding::for_label(label).ok_or_else(|| format!("Unknown text encoding: {}", label))
}

fn parse_int(pair: &Pair<Rule>) -> Result<i128, String> {
    let s = pair.as_str();
    let parsed = if let Some(hex) = s.strip_prefix("0x") {
        i128::from_str_radix(hex, 16)
    } else if let Some(bin) = s.strip_prefix("0b") {
        i128::from_str_radix(bin, 2)
    } else {
        s.parse::<i128>()
    };
    parsed.map_err(|e| format!("Invalid integer '{}': {}", s, e))
}

fn parse_usize(pair: Pair<Rule>) -> Result<usize, String> {
    let n = parse_int(&pair)?;
    usize::try_from(n).map_err(|_| format!("Expected a non-negative size, got {}", n))
}

fn literal_value(pair: Pair<Rule>) -> Result<Value, String> {
    match pair.as_rule() {
        Rule::literal | Rule::number => literal_value(first_inner(pair)?),
        Rule::boolean => Ok(Value::Bool(pair.as_str() == "true")),
        Rule::string_lit => Ok(Value::Str(pair.as_str().trim_matches('"').to_string())),
        Rule::float => pair
            .as_str()
            .parse::<f64>()
            .map(Value::Double)
            .map_err(|e| format!("Invalid float '{}': {}", pair.as_str(), e)),
        Rule::hex_int | Rule::bin_int | Rule::dec_int => {
            let n = parse_int(&pair)?;
            if let Ok(x) = i64::try_from(n) {
                Ok(Value::I64(x))
            } else if let Ok(x) = u64::try_from(n) {
                Ok(Value::U64(x))
            } else {
                Err(format!("Integer out of range: {}", n))
            }
        }
        other => Err(format!("unexpected literal element {:?}", other)),
    }
}

/// Literal converted to the value variant of a scalar field.
fn typed_literal(def: &FieldDef, value: Value) -> Result<Value, String> {
    let TypeSpec::Base(bt) = &def.spec else {
        return Ok(value);
    };
    let converted = match bt {
        BaseType::Bool => value.as_bool().map(Value::Bool),
        BaseType::Float => value.as_f64().map(|x| Value::Float(x as f32)),
        BaseType::Double => value.as_f64().map(Value::Double),
        int => value.as_i128().and_then(|n| int_value(*int, n)),
    };
    converted.ok_or_else(|| format!("{} does not fit {}", value, bt.name()))
}

fn int_value(bt: BaseType, n: i128) -> Option<Value> {
    Some(match bt {
        BaseType::U8 => Value::U8(u8::try_from(n).ok()?),
        BaseType::U16 => Value::U16(u16::try_from(n).ok()?),
        BaseType::U32 => Value::U32(u32::try_from(n).ok()?),
        BaseType::U64 => Value::U64(u64::try_from(n).ok()?),
        BaseType::I8 => Value::I8(i8::try_from(n).ok()?),
        BaseType::I16 => Value::I16(i16::try_from(n).ok()?),
        BaseType::I32 => Value::I32(i32::try_from(n).ok()?),
        BaseType::I64 => Value::I64(i64::try_from(n).ok()?),
        BaseType::Bool | BaseType::Float | BaseType::Double => return None,
    })
}
