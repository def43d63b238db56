//! Integration tests: record engine parse / serialize / size over scalar, byte, text,
//! flag and enum fields.

use binlayout::dump::{record_to_dump, value_summary_line, value_to_dump};
use binlayout::{Endianness, Error, FieldDef, Record, Schema, TrailingData, Value};

fn length_prefixed() -> std::sync::Arc<Schema> {
    Schema::builder("Blob")
        .field("length", FieldDef::u8())
        .field("data", FieldDef::bytes(binlayout::Ref::new("length")))
        .build()
        .expect("schema")
}

#[test]
fn test_byte_order_little_and_big() {
    let little = Schema::builder("Le")
        .little_endian()
        .field("value", FieldDef::u16())
        .build()
        .expect("schema");
    let big = Schema::builder("Be")
        .big_endian()
        .field("value", FieldDef::u16())
        .build()
        .expect("schema");

    let le = little.parse(&[0x01, 0x02]).expect("parse le");
    let be = big.parse(&[0x01, 0x02]).expect("parse be");
    assert_eq!(le.get("value"), Some(&Value::U16(0x0201)));
    assert_eq!(be.get("value"), Some(&Value::U16(0x0102)));
}

#[test]
fn test_field_byte_order_overrides_record() {
    let schema = Schema::builder("Mixed")
        .little_endian()
        .field("a", FieldDef::u32())
        .field("b", FieldDef::u32().big_endian())
        .build()
        .expect("schema");
    let record = schema.parse(&[1, 0, 0, 0, 0, 0, 0, 1]).expect("parse");
    assert_eq!(record.get("a").and_then(Value::as_u64), Some(1));
    assert_eq!(record.get("b").and_then(Value::as_u64), Some(1));
    assert_eq!(record.serialize().expect("serialize"), vec![1, 0, 0, 0, 0, 0, 0, 1]);
}

#[test]
fn test_signed_and_float_fields() {
    let schema = Schema::builder("Numbers")
        .big_endian()
        .field("delta", FieldDef::i16())
        .field("ratio", FieldDef::f32())
        .field("flag", FieldDef::boolean())
        .build()
        .expect("schema");
    let mut data = vec![0xFF, 0xFE];
    data.extend_from_slice(&1.5f32.to_be_bytes());
    data.push(7);

    let record = schema.parse(&data).expect("parse");
    assert_eq!(record.get("delta"), Some(&Value::I16(-2)));
    assert_eq!(record.get("ratio"), Some(&Value::Float(1.5)));
    assert_eq!(record.get("flag"), Some(&Value::Bool(true)));

    let out = record.serialize().expect("serialize");
    assert_eq!(&out[..6], &data[..6]);
    assert_eq!(out[6], 1);
}

#[test]
fn test_float_special_values_roundtrip_bit_exact() {
    let schema = Schema::builder("Specials")
        .little_endian()
        .field("single", FieldDef::f32())
        .field("double", FieldDef::f64())
        .build()
        .expect("schema");
    let singles = [
        f32::INFINITY.to_bits(),
        f32::NEG_INFINITY.to_bits(),
        0x7FC0_0000,
        0x7F80_0001,
    ];
    let doubles = [
        f64::INFINITY.to_bits(),
        f64::NEG_INFINITY.to_bits(),
        0x7FF8_0000_0000_0000,
        0x7FF0_0000_0000_0001,
    ];
    for (single, double) in singles.iter().zip(doubles.iter()) {
        let mut data = single.to_le_bytes().to_vec();
        data.extend_from_slice(&double.to_le_bytes());
        let record = schema.parse(&data).expect("parse");
        assert!(matches!(record.get("single"), Some(Value::Float(x)) if x.to_bits() == *single));
        assert_eq!(
            record.serialize().expect("serialize"),
            data,
            "f32 {:#x} / f64 {:#x}",
            single,
            double
        );
    }
}

#[test]
fn test_variable_length_roundtrip() {
    let schema = length_prefixed();
    let data = [0x05, 0x01, 0x02, 0x03, 0x04, 0x05];
    let record = schema.parse(&data).expect("parse");
    assert_eq!(record.get("length"), Some(&Value::U8(5)));
    assert_eq!(record.get("data"), Some(&Value::Bytes(vec![1, 2, 3, 4, 5])));
    assert_eq!(record.serialize().expect("serialize"), data.to_vec());
    assert_eq!(record.size().expect("size"), 6);
    assert_eq!(record.raw(), Some(&data[..]));
}

#[test]
fn test_size_matches_serialize_for_absent_optional_fields() {
    let schema = Schema::builder("Sparse")
        .field("length", FieldDef::u8())
        .field("data", FieldDef::bytes(binlayout::Ref::new("length")).optional())
        .field("label", FieldDef::string(binlayout::Ref::new("length")).optional())
        .field(
            "items",
            FieldDef::array(FieldDef::u16(), binlayout::Ref::new("length")).optional(),
        )
        .build()
        .expect("schema");
    let record = schema.new_record().with("length", 5u8).expect("length");
    let out = record.serialize().expect("serialize");
    assert_eq!(out, vec![5]);
    assert_eq!(record.size().expect("size"), out.len());
}

#[test]
fn test_serialize_does_not_check_consistency() {
    let schema = length_prefixed();
    let record = schema
        .new_record()
        .with("length", 3u8)
        .expect("length")
        .with("data", vec![1u8, 2, 3, 4, 5])
        .expect("data");
    let out = record.serialize().expect("serialize");
    assert_eq!(out, vec![3, 1, 2, 3, 4, 5]);
}

#[test]
fn test_roundtrip_fixed_layout() {
    let schema = Schema::builder("Fixed")
        .big_endian()
        .field("id", FieldDef::u32())
        .field("tag", FieldDef::fixed_bytes(2))
        .field("name", FieldDef::fixed_string(6))
        .field("score", FieldDef::i64())
        .build()
        .expect("schema");
    assert_eq!(schema.fixed_size(), Some(20));

    let record = schema
        .new_record()
        .with("id", 0xCAFEu32)
        .expect("id")
        .with("tag", b"OK".to_vec())
        .expect("tag")
        .with("name", "node")
        .expect("name")
        .with("score", -42i64)
        .expect("score");
    let first = record.serialize().expect("serialize");
    let again = schema.parse(&first).expect("parse").serialize().expect("reserialize");
    assert_eq!(first, again);
    assert_eq!(first.len(), 20);
}

#[test]
fn test_insufficient_data_names_field() {
    let schema = Schema::builder("Word")
        .field("value", FieldDef::u32())
        .build()
        .expect("schema");
    let err = schema.parse(&[1, 2]).unwrap_err();
    match err {
        Error::InsufficientData {
            expected,
            actual,
            field,
        } => {
            assert_eq!(expected, 4);
            assert_eq!(actual, 2);
            assert_eq!(field.as_deref(), Some("value"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_trailing_data_policies() {
    let strict = Schema::builder("Strict")
        .field("value", FieldDef::u16())
        .build()
        .expect("schema");
    let err = strict.parse(&[1, 2, 3]).unwrap_err();
    assert!(matches!(err, Error::TrailingData { count: 1 }));

    let lenient = Record::parse_with(&strict, &[1, 2, 3], true).expect("allow trailing");
    assert_eq!(lenient.trailing_len(), 1);

    let warn = Schema::builder("Warn")
        .trailing_data(TrailingData::Warn)
        .field("value", FieldDef::u16())
        .build()
        .expect("schema");
    let record = warn.parse(&[1, 2, 3, 4]).expect("warn policy parses");
    assert_eq!(record.trailing_len(), 2);

    let ignore = Schema::builder("Ignore")
        .trailing_data(TrailingData::Ignore)
        .field("value", FieldDef::u16())
        .build()
        .expect("schema");
    assert!(ignore.parse(&[1, 2, 3]).is_ok());
}

#[test]
fn test_missing_required_field() {
    let schema = Schema::builder("Req")
        .field("a", FieldDef::u8())
        .field("b", FieldDef::u8().optional())
        .build()
        .expect("schema");
    let record = schema.new_record();
    let err = record.serialize().unwrap_err();
    assert!(matches!(err, Error::MissingField(ref name) if name == "a"));

    let record = record.with("a", 9u8).expect("set a");
    assert_eq!(record.serialize().expect("serialize"), vec![9, 0]);
}

#[test]
fn test_defaults_and_producers() {
    let schema = Schema::builder("Defaults")
        .field("version", FieldDef::u8().default(2u8))
        .field("stamp", FieldDef::u32().default_with(|| Value::U32(77)))
        .build()
        .expect("schema");
    let record = schema.new_record();
    assert_eq!(record.get("version"), Some(&Value::U8(2)));
    assert_eq!(record.get("stamp"), Some(&Value::U32(77)));
    assert_eq!(record.serialize().expect("serialize"), vec![2, 77, 0, 0, 0]);
}

#[test]
fn test_integer_out_of_range_and_type_mismatch() {
    let schema = Schema::builder("Small")
        .field("a", FieldDef::u8())
        .build()
        .expect("schema");
    let mut record = schema.new_record();
    record.set("a", 300u16).expect("set");
    assert!(matches!(record.serialize().unwrap_err(), Error::Serialization { .. }));

    record.set("a", "text").expect("set");
    assert!(matches!(
        record.serialize().unwrap_err(),
        Error::TypeMismatch { expected: "integer", found: "string", .. }
    ));

    assert!(matches!(record.set("nope", 1u8), Err(Error::Unresolved { .. })));
}

#[test]
fn test_fixed_string_padding_and_overflow() {
    let schema = Schema::builder("Named")
        .field("name", FieldDef::fixed_string(8))
        .build()
        .expect("schema");
    let record = schema.parse(b"abc\0\0\0\0\0").expect("parse");
    assert_eq!(record.get("name").and_then(Value::as_str), Some("abc"));
    assert_eq!(record.serialize().expect("serialize"), b"abc\0\0\0\0\0".to_vec());

    let too_long = schema.new_record().with("name", "far too long").expect("set");
    assert!(matches!(too_long.serialize().unwrap_err(), Error::Serialization { .. }));

    let spaced = Schema::builder("Spaced")
        .field("name", FieldDef::fixed_string(4).pad(b' '))
        .build()
        .expect("schema");
    let record = spaced.new_record().with("name", "ab").expect("set");
    assert_eq!(record.serialize().expect("serialize"), b"ab  ".to_vec());
}

#[test]
fn test_cstring_size_follows_parse_span() {
    let schema = Schema::builder("Greeting")
        .field("text", FieldDef::cstring())
        .field("tail", FieldDef::u8())
        .build()
        .expect("schema");
    let record = schema.parse(b"hi\0\x07").expect("parse");
    assert_eq!(record.get("text").and_then(Value::as_str), Some("hi"));
    assert_eq!(record.get("tail"), Some(&Value::U8(7)));
    assert_eq!(record.size().expect("size"), 4);

    let mut record = record;
    record.set("text", "hello").expect("set");
    assert_eq!(record.size().expect("size"), 7);
    assert_eq!(record.serialize().expect("serialize"), b"hello\0\x07".to_vec());
}

#[test]
fn test_cstring_max_len_stops_early() {
    let schema = Schema::builder("Bounded")
        .field("text", FieldDef::cstring().max_len(3))
        .field("rest", FieldDef::fixed_bytes(2))
        .build()
        .expect("schema");
    let record = schema.parse(b"abcde").expect("parse");
    assert_eq!(record.get("text").and_then(Value::as_str), Some("abc"));
    assert_eq!(record.get("rest"), Some(&Value::Bytes(b"de".to_vec())));
}

#[test]
fn test_cstring_zero_max_len_consumes_nothing() {
    let schema = Schema::builder("Capped")
        .field("text", FieldDef::cstring().max_len(0))
        .field("next", FieldDef::u8())
        .build()
        .expect("schema");
    let record = schema.parse(&[7]).expect("parse");
    assert_eq!(record.get("text").and_then(Value::as_str), Some(""));
    assert_eq!(record.get("next"), Some(&Value::U8(7)));
    assert_eq!(record.size().expect("size"), 1);
}

#[test]
fn test_padding_is_skipped_and_zeroed() {
    let schema = Schema::builder("Padded")
        .field("a", FieldDef::u8())
        .field("pad", FieldDef::padding(2))
        .field("b", FieldDef::u8())
        .build()
        .expect("schema");
    let record = schema.parse(&[1, 9, 9, 2]).expect("parse");
    assert!(record.get("pad").is_some_and(Value::is_absent));
    assert_eq!(record.serialize().expect("serialize"), vec![1, 0, 0, 2]);
}

#[test]
fn test_flags_field() {
    let schema = Schema::builder("Perms")
        .field(
            "mode",
            FieldDef::flags(1, [("read", 0x01), ("write", 0x02), ("exec", 0x04)]),
        )
        .build()
        .expect("schema");
    let record = schema.parse(&[0x05]).expect("parse");
    let flags = record.get("mode").and_then(Value::as_flags).expect("flags");
    assert!(flags.contains("read"));
    assert!(!flags.contains("write"));
    assert!(flags.contains("exec"));
    assert_eq!(flags.raw(), 5);

    let named = schema
        .new_record()
        .with("mode", vec![Value::from("write"), Value::from("exec")])
        .expect("set");
    assert_eq!(named.serialize().expect("serialize"), vec![0x06]);
}

#[test]
fn test_enum_field_with_unknown_value() {
    let schema = Schema::builder("Msg")
        .field("kind", FieldDef::enumeration(2, [("Ping", 1), ("Pong", 2)]))
        .build()
        .expect("schema");
    let pong = schema.parse(&[2, 0]).expect("parse");
    let kind = pong.get("kind").and_then(Value::as_enum).expect("enum");
    assert_eq!(kind.name, "Pong");
    assert_eq!(kind.value, 2);

    let unknown = schema.parse(&[9, 0]).expect("parse unknown");
    assert_eq!(unknown.get("kind"), Some(&Value::U64(9)));

    let by_name = schema.new_record().with("kind", "Ping").expect("set");
    assert_eq!(by_name.serialize().expect("serialize"), vec![1, 0]);
}

#[test]
fn test_schema_rejects_duplicate_fields_and_bad_flags() {
    let dup = Schema::builder("Dup")
        .field("a", FieldDef::u8())
        .field("a", FieldDef::u16())
        .build();
    assert!(matches!(dup, Err(Error::Definition(_))));

    let overlap = Schema::builder("Overlap")
        .field("f", FieldDef::flags(1, [("x", 0x03), ("y", 0x02)]))
        .build();
    assert!(matches!(overlap, Err(Error::Definition(_))));

    let wide = Schema::builder("Wide")
        .field("f", FieldDef::flags(1, [("x", 0x100)]))
        .build();
    assert!(matches!(wide, Err(Error::Definition(_))));
}

#[test]
fn test_record_equality_and_ordered_map() {
    let schema = length_prefixed();
    let a = schema.parse(&[2, 7, 8]).expect("parse");
    let b = schema
        .new_record()
        .with("length", 2u8)
        .expect("length")
        .with("data", vec![7u8, 8])
        .expect("data");
    assert_eq!(a, b);

    let map = a.to_map();
    let names: Vec<&str> = map.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, ["length", "data"]);
    assert_eq!(format!("{}", a), "Blob(length=2, data=hex(07 08))");
}

#[test]
fn test_network_byte_order_constant() {
    assert_eq!(Endianness::NETWORK, Endianness::Big);
    let native = Endianness::native();
    assert!(native == Endianness::Big || native == Endianness::Little);
}

#[test]
fn test_multi_line_dump() {
    let inner = Schema::builder("Inner")
        .field("flag", FieldDef::boolean())
        .build()
        .expect("schema");
    let outer = Schema::builder("Outer")
        .field("length", FieldDef::u8())
        .field("inner", &inner)
        .field("data", FieldDef::bytes(binlayout::Ref::new("length")))
        .build()
        .expect("schema");
    let record = outer.parse(&[2, 1, 0xAB, 0xCD]).expect("parse");

    let dump = record_to_dump(&record, 0);
    let lines: Vec<&str> = dump.lines().collect();
    assert_eq!(
        lines,
        [
            "Outer {",
            "  length: 2",
            "  inner: Inner {",
            "    flag: true",
            "  }",
            "  data: hex(ab cd)",
            "}",
        ]
    );
    let value = Value::Record(record);
    assert_eq!(value_summary_line(&value), "Outer {");
    assert_eq!(value_to_dump(&Value::Str("x".into()), 1), "  \"x\"");
}
