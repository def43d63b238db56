//! Record parse fuzz target: arbitrary bytes parsed against a schema that exercises
//! references, conditionals, switches, arrays and bit records. Parsing may fail but
//! must not panic; whatever parses must serialize and size without panicking.
//! Build with: cargo fuzz run record_parse (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
const SCHEMA: &str = r#"
bits Ctl (size = 1, order = msb) { more: bit; kind: bits(3); count: bits(4); }
record Item { len: u8; data: bytes(len); name: cstring(16); }
record Frame (endian = big, trailing = ignore) {
    ctl: Ctl;
    items: Item[ctl.count];
    extra: u32 if ctl.more == true;
    body: switch(ctl.kind) { 0 => u8, 1 => string(4, "utf-16le"), _ => bytes(2) };
}
"#;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let Ok(set) = binlayout::parse_schemas(SCHEMA) else {
        return;
    };
    let Some(schema) = set.record("Frame") else {
        return;
    };
    if let Ok(record) = schema.parse(data) {
        let _ = record.serialize();
        let _ = record.size();
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run record_parse");
}
