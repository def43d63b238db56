//! Schema text fuzz target: arbitrary UTF-8 fed to the schema parser must yield
//! Ok(SchemaSet) or Err(String), never a panic.
//! Build with: cargo fuzz run schema_text (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let s = match std::str::from_utf8(data) {
        Ok(x) => x,
        Err(_) => return,
    };
    let _ = binlayout::parse_schemas(s);
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run schema_text");
}
