//! Record schemas: an ordered set of named field descriptors plus record-level options.

use crate::config::{Endianness, TrailingData};
use crate::error::{Error, Result};
use crate::field::{FieldDef, TypeSpec};
use crate::record::Record;
use crate::sync::SyncRule;
use crate::validate::RecordValidator;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// One named field of a schema.
#[derive(Debug, Clone)]
pub struct SchemaField {
    pub name: String,
    pub def: FieldDef,
}

#[derive(Clone, Default)]
pub struct RecordOptions {
    pub endianness: Option<Endianness>,
    pub trailing: TrailingData,
    pub sync_rules: Vec<SyncRule>,
    pub validators: Vec<RecordValidator>,
}

pub struct Schema {
    name: String,
    fields: Vec<SchemaField>,
    by_name: HashMap<String, usize>,
    options: RecordOptions,
}

impl Schema {
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            fields: Vec::new(),
            options: RecordOptions::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.by_name.get(name).map(|&i| &self.fields[i])
    }

    /// Record-level byte order, if declared.
    pub fn endianness(&self) -> Option<Endianness> {
        self.options.endianness
    }

    pub fn trailing_data(&self) -> TrailingData {
        self.options.trailing
    }

    pub fn sync_rules(&self) -> &[SyncRule] {
        &self.options.sync_rules
    }

    pub fn validators(&self) -> &[RecordValidator] {
        &self.options.validators
    }

    pub fn options(&self) -> &RecordOptions {
        &self.options
    }

    /// Total size when every field is fixed-size.
    pub fn fixed_size(&self) -> Option<usize> {
        self.fields
            .iter()
            .try_fold(0usize, |total, f| Some(total + f.def.fixed_size()?))
    }

    /// Fresh instance with defaults applied.
    pub fn new_record(self: &Arc<Self>) -> Record {
        Record::new(Arc::clone(self))
    }

    /// Parse `data` as one top-level record of this schema.
    pub fn parse(self: &Arc<Self>, data: &[u8]) -> Result<Record> {
        Record::parse(self, data)
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("fields", &self.fields.iter().map(|x| x.name.as_str()).collect::<Vec<_>>())
            .field("endianness", &self.options.endianness)
            .field("trailing", &self.options.trailing)
            .finish()
    }
}

impl fmt::Debug for RecordOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordOptions")
            .field("endianness", &self.endianness)
            .field("trailing", &self.trailing)
            .field("sync_rules", &self.sync_rules.len())
            .field("validators", &self.validators.len())
            .finish()
    }
}

pub struct SchemaBuilder {
    name: String,
    fields: Vec<SchemaField>,
    options: RecordOptions,
}

impl SchemaBuilder {
    /// Inherit the fields and options of `parent`; fields added afterwards follow them.
    pub fn extend(mut self, parent: &Schema) -> Self {
        let mut fields = parent.fields.clone();
        fields.append(&mut self.fields);
        self.fields = fields;
        self.options = parent.options.clone();
        self
    }

    pub fn field(mut self, name: impl Into<String>, def: impl Into<FieldDef>) -> Self {
        self.fields.push(SchemaField {
            name: name.into(),
            def: def.into(),
        });
        self
    }

    pub fn endian(mut self, endianness: Endianness) -> Self {
        self.options.endianness = Some(endianness);
        self
    }

    pub fn big_endian(self) -> Self {
        self.endian(Endianness::Big)
    }

    pub fn little_endian(self) -> Self {
        self.endian(Endianness::Little)
    }

    pub fn trailing_data(mut self, policy: TrailingData) -> Self {
        self.options.trailing = policy;
        self
    }

    pub fn sync_rule(mut self, rule: SyncRule) -> Self {
        self.options.sync_rules.push(rule);
        self
    }

    pub fn validator(mut self, validator: RecordValidator) -> Self {
        self.options.validators.push(validator);
        self
    }

    pub fn build(self) -> Result<Arc<Schema>> {
        let mut by_name = HashMap::with_capacity(self.fields.len());
        for (i, field) in self.fields.iter().enumerate() {
            if field.name.is_empty() {
                return Err(Error::Definition(format!("{}: empty field name", self.name)));
            }
            if by_name.insert(field.name.clone(), i).is_some() {
                return Err(Error::Definition(format!(
                    "{}: duplicate field name '{}'",
                    self.name, field.name
                )));
            }
            check_field(&self.name, &field.name, &field.def)?;
        }
        Ok(Arc::new(Schema {
            name: self.name,
            fields: self.fields,
            by_name,
            options: self.options,
        }))
    }
}

/// Declaration-time checks that would otherwise surface as panics or silent
/// corruption at parse time.
fn check_field(schema: &str, name: &str, def: &FieldDef) -> Result<()> {
    let invalid = |reason: String| Error::Definition(format!("{}.{}: {}", schema, name, reason));
    match &def.spec {
        TypeSpec::Flags { size, flags } => {
            check_storage(*size).map_err(invalid)?;
            let mut seen = 0u64;
            for (flag, bit) in flags {
                if *bit == 0 {
                    return Err(invalid(format!("flag '{}' has no bits", flag)));
                }
                if seen & bit != 0 {
                    return Err(invalid(format!("flag '{}' overlaps another flag", flag)));
                }
                if *size < 8 && bit >> (size * 8) != 0 {
                    return Err(invalid(format!("flag '{}' does not fit in {} bytes", flag, size)));
                }
                seen |= bit;
            }
            Ok(())
        }
        TypeSpec::Enum { size, variants } => {
            check_storage(*size).map_err(invalid)?;
            for (i, (variant, _)) in variants.iter().enumerate() {
                if variants[..i].iter().any(|(v, _)| v == variant) {
                    return Err(invalid(format!("duplicate variant '{}'", variant)));
                }
            }
            Ok(())
        }
        TypeSpec::Array(element, _) => check_field(schema, name, element),
        TypeSpec::Conditional { inner, .. } => check_field(schema, name, inner),
        TypeSpec::Switch { cases, default, .. } => {
            for (_, case) in cases {
                check_field(schema, name, case)?;
            }
            match default {
                Some(case) => check_field(schema, name, case),
                None => Ok(()),
            }
        }
        _ => Ok(()),
    }
}

fn check_storage(size: usize) -> std::result::Result<(), String> {
    if (1..=8).contains(&size) {
        Ok(())
    } else {
        Err(format!("storage size must be 1..=8 bytes, got {}", size))
    }
}
