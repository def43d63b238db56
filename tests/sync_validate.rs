//! Sync rules, field / record validators and the expression evaluator.

use binlayout::{
    crc32, Consistency, Error, Expr, FieldDef, FieldValidator, Record, RecordValidator, Ref,
    Schema, SyncRule, Value,
};
use std::sync::Arc;

fn framed() -> Arc<Schema> {
    Schema::builder("Framed")
        .big_endian()
        .field("length", FieldDef::u16())
        .field("data", FieldDef::bytes(Ref::new("length")))
        .field("crc", FieldDef::u32())
        .sync_rule(SyncRule::length_of("length", "data"))
        .sync_rule(SyncRule::crc32_of("crc", "data"))
        .build()
        .expect("schema")
}

#[test]
fn test_sync_fills_length_and_checksum() {
    let schema = framed();
    let mut record = schema.new_record();
    record.set("data", b"123456789".to_vec()).expect("data");
    record.sync().expect("sync");

    assert_eq!(record.get("length").and_then(Value::as_u64), Some(9));
    assert_eq!(record.get("crc").and_then(Value::as_u64), Some(0xCBF4_3926));

    let out = record.serialize().expect("serialize");
    assert_eq!(&out[..2], &[0, 9]);
    assert_eq!(&out[11..], &0xCBF4_3926u32.to_be_bytes());
    assert_eq!(schema.parse(&out).expect("parse back").get("data"), record.get("data"));
}

#[test]
fn test_sync_is_idempotent() {
    let schema = framed();
    let mut once = schema.new_record();
    once.set("data", vec![1u8, 2, 3]).expect("data");
    once.sync().expect("sync");
    let mut twice = once.clone();
    twice.sync().expect("sync again");
    assert_eq!(once, twice);
}

#[test]
fn test_sync_only_selected_targets() {
    let schema = framed();
    let mut record = schema.new_record();
    record.set("data", vec![9u8; 4]).expect("data");
    record.sync_only(&["length"]).expect("sync_only");
    assert_eq!(record.get("length").and_then(Value::as_u64), Some(4));
    assert!(record.get("crc").is_some_and(Value::is_absent));
}

#[test]
fn test_sync_custom_rules_and_failure() {
    let schema = Schema::builder("Totals")
        .field("a", FieldDef::u8())
        .field("b", FieldDef::u8())
        .field("sum", FieldDef::u16())
        .field("echo", FieldDef::u8())
        .sync_rule(SyncRule::from_fields("sum", ["a", "b"], |values| {
            let total: u64 = values.iter().filter_map(Value::as_u64).sum();
            Ok(Value::U64(total))
        }))
        .sync_rule(SyncRule::computed("echo", |record| {
            Ok(record.get("a").cloned().unwrap_or_default())
        }))
        .build()
        .expect("schema");
    let mut record = schema
        .new_record()
        .with("a", 200u8)
        .expect("a")
        .with("b", 100u8)
        .expect("b");
    let out = record.to_bytes(true, false).expect("to_bytes");
    assert_eq!(out, vec![200, 100, 0x2C, 0x01, 200]);

    let failing = Schema::builder("Failing")
        .field("n", FieldDef::u8())
        .sync_rule(SyncRule::from_field("n", "n", |_| anyhow::bail!("not today")))
        .build()
        .expect("schema");
    let err = failing.new_record().sync().map(|_| ()).unwrap_err();
    assert!(matches!(err, Error::Sync { ref target, .. } if target == "n"));
}

#[test]
fn test_sync_into_bit_record_path() {
    let flags = binlayout::BitSchema::builder("Flags")
        .size(1)
        .bits("count", 8)
        .build()
        .expect("bits");
    let schema = Schema::builder("Counted")
        .field("flags", &flags)
        .field("items", FieldDef::array(FieldDef::u8(), Ref::new("flags.count")))
        .sync_rule(SyncRule::length_of("flags.count", "items"))
        .build()
        .expect("schema");
    let mut record = schema.new_record();
    record
        .set("flags", binlayout::BitRecord::new(Arc::clone(&flags)))
        .expect("flags");
    record
        .set("items", vec![Value::U8(7), Value::U8(8)])
        .expect("items");
    let out = record.to_bytes(true, false).expect("to_bytes");
    assert_eq!(out, vec![2, 7, 8]);
}

#[test]
fn test_validation_aggregates_failures() {
    let schema = Schema::builder("Checked")
        .field("a", FieldDef::u8().validator(FieldValidator::range(0, 10)))
        .field("b", FieldDef::u8().validator(FieldValidator::one_of([1, 2, 3])))
        .field("c", FieldDef::u8().validator(FieldValidator::at_most(100)))
        .build()
        .expect("schema");
    let record = schema
        .new_record()
        .with("a", 20u8)
        .expect("a")
        .with("b", 5u8)
        .expect("b")
        .with("c", 1u8)
        .expect("c");

    let err = record.validate().map(|_| ()).unwrap_err();
    let Error::Validation(errors) = err else {
        panic!("expected validation error");
    };
    assert_eq!(errors.len(), 2);
    assert_eq!(errors.failures()[0].field, "a");
    assert_eq!(errors.failures()[0].rule, "range");
    assert_eq!(errors.failures()[1].field, "b");
    assert_eq!(errors.for_field("b").count(), 1);
    assert_eq!(errors.failures()[0].actual.as_deref(), Some("20"));
}

#[test]
fn test_validate_passes_and_serializes() {
    let schema = Schema::builder("Ok")
        .field("a", FieldDef::u8().validator(FieldValidator::range(0, 10)))
        .build()
        .expect("schema");
    let mut record = schema.new_record().with("a", 3u8).expect("a");
    assert!(record.validate().is_ok());
    assert_eq!(record.to_bytes(false, true).expect("to_bytes"), vec![3]);

    record.set("a", 11u8).expect("a");
    assert!(matches!(record.to_bytes(false, true), Err(Error::Validation(_))));
}

#[test]
fn test_text_and_byte_validators() {
    let schema = Schema::builder("Labels")
        .field(
            "name",
            FieldDef::cstring().validator(FieldValidator::regex("[a-z]+").expect("regex")),
        )
        .field(
            "magic",
            FieldDef::fixed_bytes(4).validator(FieldValidator::byte_prefix(b"PK".to_vec())),
        )
        .field(
            "even",
            FieldDef::u8().validator(FieldValidator::predicate("must be even", |v| {
                v.as_u64().is_some_and(|n| n % 2 == 0)
            })),
        )
        .build()
        .expect("schema");

    let good = schema.parse(b"abc\0PK\x03\x04\x02").expect("parse");
    assert!(good.validate().is_ok());

    let bad = schema.parse(b"ABC\0ZZ\x03\x04\x03").expect("parse");
    let Err(Error::Validation(errors)) = bad.validate() else {
        panic!("expected validation error");
    };
    let rules: Vec<&str> = errors.failures().iter().map(|f| f.rule.as_str()).collect();
    assert_eq!(rules, ["regex", "byte_prefix", "custom"]);
    assert_eq!(errors.failures()[2].message, "must be even");

    assert!(matches!(FieldValidator::regex("("), Err(Error::Definition(_))));
}

#[test]
fn test_record_level_consistency() {
    let schema = Schema::builder("Consistent")
        .field("length", FieldDef::u8())
        .field("data", FieldDef::bytes(Ref::new("length")))
        .field("limit", FieldDef::u8())
        .validator(Consistency::new("length").equals(Expr::len("data")).into())
        .validator(Consistency::new("limit").greater_than(Expr::value("length") * 2).into())
        .validator(RecordValidator::custom("data must not be empty", |r: &Record| {
            r.get("data").and_then(Value::len).unwrap_or(0) > 0
        }))
        .build()
        .expect("schema");

    let ok = schema.parse(&[2, 1, 2, 5]).expect("parse");
    assert!(ok.validate().is_ok());

    let bad = schema
        .new_record()
        .with("length", 3u8)
        .expect("length")
        .with("data", Vec::<u8>::new())
        .expect("data")
        .with("limit", 1u8)
        .expect("limit");
    let Err(Error::Validation(errors)) = bad.validate() else {
        panic!("expected validation error");
    };
    assert_eq!(errors.len(), 3);
    assert_eq!(errors.failures()[0].rule, "consistency");
    assert_eq!(errors.failures()[0].field, "length");
    assert_eq!(errors.failures()[2].field, "Consistent");
}

#[test]
fn test_expression_arithmetic() {
    let schema = Schema::builder("Expr")
        .field("a", FieldDef::u8())
        .field("b", FieldDef::u8())
        .field("name", FieldDef::cstring())
        .build()
        .expect("schema");
    let record = schema.parse(b"\x07\x02hello\0").expect("parse");

    let sum = (Expr::value("a") + Expr::value("b")) * 3;
    assert_eq!(sum.evaluate(&record).expect("sum"), Value::I64(27));
    assert_eq!(
        (Expr::value("a") - 10).evaluate(&record).expect("sub"),
        Value::I64(-3)
    );
    assert_eq!(
        (Expr::value("a") / Expr::value("b")).evaluate(&record).expect("div"),
        Value::Double(3.5)
    );
    assert_eq!(
        (Expr::value("a") + 0.5).evaluate(&record).expect("float"),
        Value::Double(7.5)
    );
    assert!(matches!(
        (Expr::value("a") / 0).evaluate(&record),
        Err(Error::Eval(_))
    ));
    assert!(matches!(
        (Expr::constant(i64::MAX) + 1).evaluate(&record),
        Err(Error::Eval(_))
    ));

    assert_eq!(Expr::len("name").evaluate(&record).expect("len"), Value::U64(5));
    assert_eq!(
        Expr::crc32("name").evaluate(&record).expect("crc"),
        Value::U32(crc32(b"hello"))
    );
    assert!(matches!(
        Expr::checksum("name", "md5").evaluate(&record),
        Err(Error::UnsupportedAlgorithm(ref name)) if name == "md5"
    ));
}
