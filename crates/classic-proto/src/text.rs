//! The 64-byte space-padded string codec.
//!
//! Strings occupy exactly 64 bytes on the wire, right-padded with ASCII
//! space. Decoding strips trailing spaces only — leading and interior spaces
//! are payload. The byte-to-character mapping is ASCII until `FullCP437`
//! negotiates, after which the full CP437 table applies (control-character
//! dialect, so bytes 0x00-0x1F map to the corresponding control characters).
//!
//! Chat reassembly concatenates several raw 64-byte fields before decoding,
//! so the unpadded [`encode_bytes`]/[`decode_bytes`] pair is public alongside
//! the fixed-field [`encode_padded`]/[`decode_padded`] pair.

use std::borrow::Cow;

use codepage_437::{CP437_CONTROL, FromCp437, ToCp437};

use crate::errors::{ProtocolError, Result};

/// Wire size of a string field.
pub const STRING_BYTES: usize = 64;

/// Byte-to-character mapping currently in effect for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    /// Plain ASCII; bytes above 0x7F are a protocol error.
    #[default]
    Ascii,
    /// Code page 437, active once `FullCP437` negotiates.
    Cp437,
}

/// Encode text to raw wire bytes with no length limit applied.
///
/// # Errors
///
/// - `ProtocolError::Encoding` if a character is not representable in
///   `encoding`
pub fn encode_bytes(text: &str, encoding: TextEncoding) -> Result<Vec<u8>> {
    match encoding {
        TextEncoding::Ascii => {
            if !text.is_ascii() {
                return Err(ProtocolError::Encoding("text is not ASCII".to_string()));
            }
            Ok(text.as_bytes().to_vec())
        },
        TextEncoding::Cp437 => {
            let bytes: Cow<'_, [u8]> = text.to_cp437(&CP437_CONTROL).map_err(|_| {
                ProtocolError::Encoding("text is not representable in CP437".to_string())
            })?;
            Ok(bytes.into_owned())
        },
    }
}

/// Decode raw wire bytes, stripping trailing spaces first.
///
/// # Errors
///
/// - `ProtocolError::Encoding` if a byte is outside the ASCII range while
///   `encoding` is ASCII (every byte is valid CP437)
pub fn decode_bytes(bytes: &[u8], encoding: TextEncoding) -> Result<String> {
    let content = strip_padding(bytes);
    match encoding {
        TextEncoding::Ascii => {
            if !content.is_ascii() {
                return Err(ProtocolError::Encoding("byte outside ASCII range".to_string()));
            }
            String::from_utf8(content.to_vec())
                .map_err(|_| ProtocolError::Encoding("byte outside ASCII range".to_string()))
        },
        TextEncoding::Cp437 => Ok(String::from_cp437(content.to_vec(), &CP437_CONTROL)),
    }
}

/// Encode text into a full 64-byte wire field, right-padded with spaces.
///
/// # Errors
///
/// - `ProtocolError::StringTooLong` if the encoded text exceeds 64 bytes
/// - `ProtocolError::Encoding` if a character is not representable
pub fn encode_padded(text: &str, encoding: TextEncoding) -> Result<[u8; STRING_BYTES]> {
    let raw = encode_bytes(text, encoding)?;
    if raw.len() > STRING_BYTES {
        return Err(ProtocolError::StringTooLong(raw.len()));
    }
    Ok(pad_field(&raw))
}

/// Right-pad up to 64 raw bytes into a full wire field. Used directly by chat
/// fragmentation, which splits an already-encoded message.
///
/// Bytes past the first 64 are ignored; callers chunk first.
pub fn pad_field(raw: &[u8]) -> [u8; STRING_BYTES] {
    let len = raw.len().min(STRING_BYTES);
    let mut field = [b' '; STRING_BYTES];
    field[..len].copy_from_slice(&raw[..len]);
    field
}

/// Decode a full 64-byte wire field.
///
/// # Errors
///
/// See [`decode_bytes`].
pub fn decode_padded(field: &[u8; STRING_BYTES], encoding: TextEncoding) -> Result<String> {
    decode_bytes(field, encoding)
}

fn strip_padding(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|&b| b != b' ').map_or(0, |i| i + 1);
    &bytes[..end]
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn ascii_round_trip() {
        let field = encode_padded("Alice", TextEncoding::Ascii).unwrap();
        assert_eq!(field.len(), STRING_BYTES);
        assert_eq!(&field[..5], b"Alice");
        assert!(field[5..].iter().all(|&b| b == b' '));
        assert_eq!(decode_padded(&field, TextEncoding::Ascii).unwrap(), "Alice");
    }

    #[test]
    fn exactly_64_bytes_needs_no_padding() {
        let text = "x".repeat(STRING_BYTES);
        let field = encode_padded(&text, TextEncoding::Ascii).unwrap();
        assert_eq!(&field[..], text.as_bytes());
        assert_eq!(decode_padded(&field, TextEncoding::Ascii).unwrap(), text);
    }

    #[test]
    fn over_64_bytes_is_too_long() {
        let text = "x".repeat(STRING_BYTES + 1);
        assert_eq!(
            encode_padded(&text, TextEncoding::Ascii),
            Err(ProtocolError::StringTooLong(STRING_BYTES + 1))
        );
    }

    #[test]
    fn interior_and_leading_spaces_survive() {
        let field = encode_padded("  a b  ", TextEncoding::Ascii).unwrap();
        assert_eq!(decode_padded(&field, TextEncoding::Ascii).unwrap(), "  a b");
    }

    #[test]
    fn non_ascii_text_rejected_under_ascii() {
        assert!(matches!(
            encode_padded("café", TextEncoding::Ascii),
            Err(ProtocolError::Encoding(_))
        ));
    }

    #[test]
    fn cp437_maps_beyond_ascii() {
        let field = encode_padded("café", TextEncoding::Cp437).unwrap();
        assert_eq!(&field[..4], &[b'c', b'a', b'f', 0x82]);
        assert_eq!(decode_padded(&field, TextEncoding::Cp437).unwrap(), "café");
    }

    #[test]
    fn high_bytes_rejected_under_ascii_decode() {
        let mut field = [b' '; STRING_BYTES];
        field[0] = 0x82;
        assert!(matches!(
            decode_padded(&field, TextEncoding::Ascii),
            Err(ProtocolError::Encoding(_))
        ));
        assert_eq!(decode_padded(&field, TextEncoding::Cp437).unwrap(), "é");
    }

    proptest! {
        #[test]
        fn padded_round_trip_is_rstrip(text in "[ -~]{0,64}") {
            let field = encode_padded(&text, TextEncoding::Ascii).unwrap();
            let decoded = decode_padded(&field, TextEncoding::Ascii).unwrap();
            prop_assert_eq!(decoded, text.trim_end_matches(' '));
        }

        #[test]
        fn raw_round_trip_is_rstrip_cp437(bytes in proptest::collection::vec(any::<u8>(), 0..=128)) {
            let decoded = decode_bytes(&bytes, TextEncoding::Cp437).unwrap();
            let reencoded = encode_bytes(&decoded, TextEncoding::Cp437).unwrap();
            let mut expected = bytes.clone();
            while expected.last() == Some(&b' ') {
                expected.pop();
            }
            prop_assert_eq!(reencoded, expected);
        }
    }
}
