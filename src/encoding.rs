//! Encoding detection and permissive transcoding using chardetng and `encoding_rs`.
//!
//! Decoding never fails: bytes that survive detection but are still not
//! valid UTF-8 are replaced with U+FFFD.

use std::borrow::Cow;

use chardetng::EncodingDetector;
use simdutf8::basic::from_utf8;

/// Check if the given bytes are valid UTF-8.
///
/// Uses SIMD-accelerated validation for performance.
pub fn is_utf8(data: &[u8]) -> bool {
    from_utf8(data).is_ok()
}

/// Check if the data starts with a UTF-8 BOM (Byte Order Mark).
///
/// The UTF-8 BOM is the byte sequence: EF BB BF
pub fn has_utf8_bom(data: &[u8]) -> bool {
    data.starts_with(&[0xEF, 0xBB, 0xBF])
}

/// Skip the UTF-8 BOM if present and return the remaining data.
pub fn skip_bom(data: &[u8]) -> &[u8] {
    if has_utf8_bom(data) { &data[3..] } else { data }
}

/// How a byte buffer was turned into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    /// Valid UTF-8, possibly after removing a BOM.
    Utf8,
    /// Transcoded from the named encoding.
    Transcoded(&'static str),
    /// Mostly UTF-8 with invalid sequences replaced.
    Lossy,
}

/// Decode raw source bytes into UTF-8 text.
///
/// UTF-16 is recognised by its BOM; other legacy encodings (Windows-1252,
/// Latin-1, Windows-1251, ...) are guessed with chardetng.
pub fn decode_text(data: &[u8]) -> (Cow<'_, str>, TextEncoding) {
    if data.starts_with(&[0xFF, 0xFE]) {
        let (decoded, _, _) = encoding_rs::UTF_16LE.decode(data);
        return (Cow::Owned(decoded.into_owned()), TextEncoding::Transcoded("UTF-16LE"));
    }
    if data.starts_with(&[0xFE, 0xFF]) {
        let (decoded, _, _) = encoding_rs::UTF_16BE.decode(data);
        return (Cow::Owned(decoded.into_owned()), TextEncoding::Transcoded("UTF-16BE"));
    }

    let data = skip_bom(data);
    if let Ok(text) = from_utf8(data) {
        return (Cow::Borrowed(text), TextEncoding::Utf8);
    }

    let mut detector = EncodingDetector::new();
    detector.feed(data, true);
    let encoding = detector.guess(None, true);

    if encoding == encoding_rs::UTF_8 {
        return (String::from_utf8_lossy(data), TextEncoding::Lossy);
    }

    let (decoded, _, _) = encoding.decode(data);
    (
        Cow::Owned(decoded.into_owned()),
        TextEncoding::Transcoded(encoding.name()),
    )
}
