//! Text encodings for string fields.
//!
//! UTF-8, ASCII, Latin-1 and UTF-16 are handled directly; any other WHATWG label
//! (Shift_JIS, EUC-JP, windows-1252, ...) goes through `encoding_rs`. Decoding and
//! encoding are strict: malformed or unrepresentable text is an error, never replaced.

use encoding_rs::{Encoding, UTF_16BE, UTF_16LE};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    #[default]
    Utf8,
    Ascii,
    Latin1,
    Utf16Le,
    Utf16Be,
    Other(&'static Encoding),
}

impl TextEncoding {
    /// Look up an encoding by label (`utf-8`, `ascii`, `latin-1`, `utf-16le`, `shift_jis`, ...).
    pub fn for_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "utf-8" | "utf8" => Some(TextEncoding::Utf8),
            "ascii" | "us-ascii" => Some(TextEncoding::Ascii),
            "latin-1" | "latin1" | "iso-8859-1" | "iso8859-1" => Some(TextEncoding::Latin1),
            "utf-16le" | "utf16le" | "utf-16" => Some(TextEncoding::Utf16Le),
            "utf-16be" | "utf16be" => Some(TextEncoding::Utf16Be),
            _ => Encoding::for_label(normalized.as_bytes()).map(TextEncoding::Other),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Ascii => "ascii",
            TextEncoding::Latin1 => "latin-1",
            TextEncoding::Utf16Le => "utf-16le",
            TextEncoding::Utf16Be => "utf-16be",
            TextEncoding::Other(enc) => enc.name(),
        }
    }

    pub fn decode(&self, data: &[u8]) -> Result<String, String> {
        match self {
            TextEncoding::Utf8 => std::str::from_utf8(data)
                .map(str::to_string)
                .map_err(|e| format!("invalid utf-8: {}", e)),
            TextEncoding::Ascii => match data.iter().position(|b| !b.is_ascii()) {
                Some(pos) => Err(format!("non-ascii byte 0x{:02x} at offset {}", data[pos], pos)),
                None => Ok(data.iter().map(|&b| b as char).collect()),
            },
            TextEncoding::Latin1 => Ok(data.iter().map(|&b| b as char).collect()),
            TextEncoding::Utf16Le => decode_with_encoding_rs(data, UTF_16LE),
            TextEncoding::Utf16Be => decode_with_encoding_rs(data, UTF_16BE),
            TextEncoding::Other(enc) => decode_with_encoding_rs(data, enc),
        }
    }

    pub fn encode(&self, text: &str) -> Result<Vec<u8>, String> {
        match self {
            TextEncoding::Utf8 => Ok(text.as_bytes().to_vec()),
            TextEncoding::Ascii => {
                if text.is_ascii() {
                    Ok(text.as_bytes().to_vec())
                } else {
                    Err(format!("'{}' is not ascii", text))
                }
            }
            TextEncoding::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).map_err(|_| format!("'{}' not representable in latin-1", c)))
                .collect(),
            TextEncoding::Utf16Le => Ok(text.encode_utf16().flat_map(u16::to_le_bytes).collect()),
            TextEncoding::Utf16Be => Ok(text.encode_utf16().flat_map(u16::to_be_bytes).collect()),
            TextEncoding::Other(enc) => {
                let (bytes, _, had_errors) = enc.encode(text);
                if had_errors {
                    Err(format!("'{}' not representable in {}", text, enc.name()))
                } else {
                    Ok(bytes.into_owned())
                }
            }
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn decode_with_encoding_rs(data: &[u8], encoding: &'static Encoding) -> Result<String, String> {
    encoding
        .decode_without_bom_handling_and_without_replacement(data)
        .map(|text| text.into_owned())
        .ok_or_else(|| format!("malformed {} text", encoding.name()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin1_is_not_windows_1252() {
        let enc = TextEncoding::for_label("latin-1").expect("label");
        assert_eq!(enc, TextEncoding::Latin1);
        assert_eq!(enc.decode(&[0x80]).expect("decode"), "\u{80}");
    }

    #[test]
    fn utf16_round_trip() {
        let enc = TextEncoding::Utf16Be;
        let bytes = enc.encode("hi").expect("encode");
        assert_eq!(bytes, vec![0, b'h', 0, b'i']);
        assert_eq!(enc.decode(&bytes).expect("decode"), "hi");
    }

    #[test]
    fn strict_utf8() {
        assert!(TextEncoding::Utf8.decode(&[0xff, 0xfe]).is_err());
        assert!(TextEncoding::Ascii.encode("é").is_err());
    }
}
