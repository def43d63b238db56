//! Bit-packed records: layout in both bit orders, declaration checks, and embedding.

use binlayout::{BitOrder, BitRecord, BitSchema, Error, FieldDef, Ref, Schema, Value};
use std::sync::Arc;

fn layout(order: BitOrder) -> Arc<BitSchema> {
    BitSchema::builder("Control")
        .size(1)
        .order(order)
        .bit("a")
        .bits("b", 3)
        .bits("c", 4)
        .build()
        .expect("bit schema")
}

#[test]
fn test_lsb_first_roundtrip() {
    let schema = layout(BitOrder::LsbFirst);
    let bits = BitRecord::parse(&schema, &[0b1011_0101]).expect("parse");
    assert_eq!(bits.flag("a"), Some(true));
    assert_eq!(bits.get("b"), Some(&Value::U64(0b010)));
    assert_eq!(bits.get("c"), Some(&Value::U64(0b1011)));
    assert_eq!(bits.to_bytes().expect("to_bytes"), vec![0b1011_0101]);
}

#[test]
fn test_msb_first_roundtrip() {
    let schema = layout(BitOrder::MsbFirst);
    let bits = BitRecord::parse(&schema, &[0b1011_0101]).expect("parse");
    assert_eq!(bits.flag("a"), Some(true));
    assert_eq!(bits.get("b"), Some(&Value::U64(0b011)));
    assert_eq!(bits.get("c"), Some(&Value::U64(0b0101)));
    assert_eq!(bits.to_bytes().expect("to_bytes"), vec![0b1011_0101]);
}

#[test]
fn test_one_bit_group_is_boolean() {
    let schema = BitSchema::builder("Single")
        .size(1)
        .bits("on", 1)
        .bits("rest", 7)
        .build()
        .expect("bit schema");
    let bits = BitRecord::parse(&schema, &[0b0000_0011]).expect("parse");
    assert_eq!(bits.get("on"), Some(&Value::Bool(true)));
    assert_eq!(bits.get("rest"), Some(&Value::U64(1)));
    assert_eq!(bits.to_bytes().expect("to_bytes"), vec![0b0000_0011]);
}

#[test]
fn test_multi_byte_group() {
    let schema = BitSchema::builder("Word")
        .size(2)
        .bits("low", 12)
        .bits("high", 4)
        .build()
        .expect("bit schema");
    let bits = BitRecord::parse(&schema, &[0x34, 0x12]).expect("parse");
    assert_eq!(bits.get("low"), Some(&Value::U64(0x234)));
    assert_eq!(bits.get("high"), Some(&Value::U64(0x1)));
    assert_eq!(bits.to_bytes().expect("to_bytes"), vec![0x34, 0x12]);
}

#[test]
fn test_width_mismatch_rejected_at_declaration() {
    let err = BitSchema::builder("Short")
        .size(1)
        .bit("a")
        .bits("b", 4)
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::Definition(_)));

    let dup = BitSchema::builder("Dup")
        .size(1)
        .bits("x", 4)
        .bits("x", 4)
        .build();
    assert!(matches!(dup, Err(Error::Definition(_))));
}

#[test]
fn test_defaults_set_and_masking() {
    let schema = BitSchema::builder("Flags")
        .size(1)
        .bit("on")
        .default(true)
        .bits("level", 3)
        .default(5u64)
        .bits("spare", 4)
        .build()
        .expect("bit schema");
    let mut bits = BitRecord::new(Arc::clone(&schema));
    assert_eq!(bits.flag("on"), Some(true));
    assert_eq!(bits.get("level"), Some(&Value::U64(5)));
    assert_eq!(bits.to_bytes().expect("to_bytes"), vec![0b0000_1011]);

    bits.set("spare", 0xFFu64).expect("set spare");
    assert_eq!(bits.to_bytes().expect("to_bytes"), vec![0b1111_1011]);
    assert!(matches!(bits.set("missing", 1u8), Err(Error::Unresolved { .. })));
}

#[test]
fn test_short_input() {
    let schema = layout(BitOrder::LsbFirst);
    let err = BitRecord::parse(&schema, &[]).unwrap_err();
    assert!(matches!(err, Error::InsufficientData { expected: 1, actual: 0, .. }));
}

#[test]
fn test_bit_record_inside_record() {
    let control = BitSchema::builder("Control")
        .size(1)
        .order(BitOrder::MsbFirst)
        .bit("urgent")
        .bits("len", 7)
        .build()
        .expect("bit schema");
    let frame = Schema::builder("Frame")
        .field("ctl", &control)
        .field("payload", FieldDef::bytes(Ref::new("ctl.len")))
        .build()
        .expect("schema");

    let record = frame.parse(&[0x82, 0xAA, 0xBB]).expect("parse");
    assert_eq!(record.resolve("ctl.urgent").expect("urgent"), &Value::Bool(true));
    assert_eq!(record.resolve("ctl.len").expect("len"), &Value::U64(2));
    assert_eq!(record.get("payload"), Some(&Value::Bytes(vec![0xAA, 0xBB])));
    assert_eq!(record.serialize().expect("serialize"), vec![0x82, 0xAA, 0xBB]);

    let mut built = frame.new_record();
    built.set("ctl", BitRecord::new(Arc::clone(&control))).expect("ctl");
    built.set_path("ctl.len", 1u64).expect("len");
    built.set("payload", vec![0x55u8]).expect("payload");
    assert_eq!(built.serialize().expect("serialize"), vec![0x01, 0x55]);
}
