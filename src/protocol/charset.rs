//! Single-Byte Text Codec
//!
//! The wire carries arbitrary bytes that are interpreted as ISO-8859-1
//! (Latin-1) text. Every byte value maps to the Unicode code point with the
//! same number, so decoding never fails and never has to deal with a
//! character split across two reads.
//!
//! Encoding goes the other way. Characters above U+00FF have no single-byte
//! representation and are written as `?`.

use bytes::{BufMut, Bytes, BytesMut};

/// Byte written in place of characters the charset cannot represent.
pub const REPLACEMENT_BYTE: u8 = b'?';

/// Decodes `bytes` and appends the resulting text to `out`.
///
/// Appending (rather than returning a fresh `String`) lets the connection
/// buffer grow in place across reads.
pub fn decode_into(bytes: &[u8], out: &mut String) {
    out.reserve(bytes.len());
    out.extend(bytes.iter().map(|&b| char::from(b)));
}

/// Decodes `bytes` into a new `String`.
pub fn decode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    decode_into(bytes, &mut out);
    out
}

/// Encodes `text` as one byte per character.
pub fn encode(text: &str) -> Bytes {
    let mut out = BytesMut::with_capacity(text.len());
    for c in text.chars() {
        let byte = u8::try_from(u32::from(c)).unwrap_or(REPLACEMENT_BYTE);
        out.put_u8(byte);
    }
    out.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_ascii() {
        assert_eq!(decode(b"hello;"), "hello;");
    }

    #[test]
    fn test_decode_high_bytes_map_to_latin1() {
        let text = decode(&[0x41, 0xE9, 0xFF]);
        assert_eq!(text, "A\u{e9}\u{ff}");
        assert_eq!(text.chars().count(), 3);
    }

    #[test]
    fn test_decode_into_appends() {
        let mut buf = String::from("he");
        decode_into(b"llo", &mut buf);
        assert_eq!(buf, "hello");
    }

    #[test]
    fn test_encode_is_one_byte_per_char() {
        let bytes = encode("caf\u{e9}");
        assert_eq!(&bytes[..], &[b'c', b'a', b'f', 0xE9]);
    }

    #[test]
    fn test_encode_replaces_unrepresentable() {
        assert_eq!(&encode("a\u{20ac}b")[..], b"a?b");
        assert_eq!(&encode("\u{1f600}")[..], b"?");
    }

    #[test]
    fn test_encode_empty() {
        assert!(encode("").is_empty());
    }

    #[test]
    fn test_every_byte_survives_decode_then_encode() {
        let all: Vec<u8> = (0..=255u8).collect();
        assert_eq!(&encode(&decode(&all))[..], &all[..]);
    }
}
