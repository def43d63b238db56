//! Benchmark: parse, serialize, and sync + validate + serialize of a header record
//! declared in schema text.

use binlayout::{parse_schemas, Record, Schema, SyncRule};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;

const SCHEMA: &str = r#"
bits Flags (size = 1, order = msb) {
    urgent: bit;
    kind: bits(3);
    spare: bits(4);
}

record Header (endian = big) {
    magic: u32 = 0xCAFEBABE [in(0xCAFEBABE)];
    version: u8 [1..4];
    flags: Flags;
    length: u16;
    payload: bytes(length);
    crc: u32;
}
"#;

fn header_schema() -> Arc<Schema> {
    let set = parse_schemas(SCHEMA).expect("schema");
    let declared = set.record("Header").expect("Header");
    Schema::builder("SyncedHeader")
        .extend(declared)
        .sync_rule(SyncRule::length_of("length", "payload"))
        .sync_rule(SyncRule::crc32_of("crc", "payload"))
        .build()
        .expect("synced schema")
}

fn sample(schema: &Arc<Schema>) -> Record {
    let mut record = schema.new_record();
    record.set("version", 2u8).expect("version");
    record
        .set("flags", binlayout::BitRecord::new(Arc::clone(flags_schema(schema))))
        .expect("flags");
    record.set("payload", vec![0x5Au8; 256]).expect("payload");
    record.sync().expect("sync");
    record
}

fn flags_schema(schema: &Arc<Schema>) -> &Arc<binlayout::BitSchema> {
    match &schema.field("flags").expect("flags field").def.spec {
        binlayout::TypeSpec::Bits(bits) => bits,
        _ => panic!("flags is not a bit record"),
    }
}

fn bench_parse_serialize(c: &mut Criterion) {
    let schema = header_schema();
    let record = sample(&schema);
    let bytes = record.serialize().expect("serialize");

    c.bench_function("parse", |b| {
        b.iter(|| schema.parse(black_box(&bytes)).expect("parse"))
    });
    c.bench_function("serialize", |b| {
        b.iter(|| black_box(&record).serialize().expect("serialize"))
    });
    c.bench_function("sync_validate_serialize", |b| {
        b.iter(|| {
            let mut r = record.clone();
            r.to_bytes(true, true).expect("to_bytes")
        })
    });
}

criterion_group!(benches, bench_parse_serialize);
criterion_main!(benches);
