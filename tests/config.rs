//! Process-wide default byte order. Kept in its own test binary because it mutates
//! global state.

use binlayout::{default_byte_order, set_default_byte_order, Endianness, FieldDef, Schema, Value};

#[test]
fn test_default_byte_order_applies_without_overrides() {
    let plain = Schema::builder("Plain")
        .field("value", FieldDef::u16())
        .field("pinned", FieldDef::u16().little_endian())
        .build()
        .expect("schema");
    let pinned_record = Schema::builder("Pinned")
        .little_endian()
        .field("value", FieldDef::u16())
        .build()
        .expect("schema");

    assert_eq!(default_byte_order(), Endianness::Little);
    let record = plain.parse(&[0x01, 0x02, 0x01, 0x02]).expect("parse");
    assert_eq!(record.get("value"), Some(&Value::U16(0x0201)));

    set_default_byte_order(Endianness::Big);
    let record = plain.parse(&[0x01, 0x02, 0x01, 0x02]).expect("parse");
    assert_eq!(record.get("value"), Some(&Value::U16(0x0102)));
    assert_eq!(record.get("pinned"), Some(&Value::U16(0x0201)));
    let record = pinned_record.parse(&[0x01, 0x02]).expect("parse");
    assert_eq!(record.get("value"), Some(&Value::U16(0x0201)));

    set_default_byte_order(Endianness::Little);
    assert_eq!(default_byte_order(), Endianness::Little);
}
