//! Input decoding.
//!
//! Raw input bytes are turned into a UTF-8 `String` through `encoding_rs`
//! before the parser sees them. The encoding is chosen in this order:
//!
//! 1. A Byte Order Mark at the start of the input.
//! 2. The caller's encoding hint.
//! 3. The `encoding=` pseudo-attribute of the XML declaration.
//! 4. UTF-8.
//!
//! In recovery mode malformed byte sequences are replaced with U+FFFD and
//! flagged on the result; otherwise they are an error.

use std::fmt;

/// An error that occurs while choosing or applying an input encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingError {
    /// A human-readable description of the encoding error.
    pub message: String,
}

impl EncodingError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for EncodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "encoding error: {}", self.message)
    }
}

impl std::error::Error for EncodingError {}

/// Decoded input text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    /// The input as UTF-8, BOM removed.
    pub text: String,
    /// Canonical name of the encoding that was applied.
    pub encoding: &'static str,
    /// True if malformed sequences were replaced.
    pub lossy: bool,
}

/// Inspects the Byte Order Mark. Returns the encoding and the BOM length.
#[must_use]
pub fn detect_bom(bytes: &[u8]) -> Option<(&'static encoding_rs::Encoding, usize)> {
    encoding_rs::Encoding::for_bom(bytes)
}

/// Looks up an encoding by label (`"utf-8"`, `"ISO-8859-1"`, ...).
///
/// # Errors
///
/// Returns `EncodingError` if `encoding_rs` does not know the label.
pub fn lookup(label: &str) -> Result<&'static encoding_rs::Encoding, EncodingError> {
    encoding_rs::Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| EncodingError::new(format!("unsupported encoding: {label}")))
}

/// Decodes raw input bytes into UTF-8.
///
/// # Errors
///
/// Returns `EncodingError` if `hint` or a declared encoding is unknown, or if
/// the bytes are malformed for the chosen encoding and `recover` is false.
///
/// # Examples
///
/// ```
/// use xmlward::encoding::decode;
///
/// let out = decode(b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><a>caf\xE9</a>", None, false).unwrap();
/// assert!(out.text.ends_with("<a>caf\u{e9}</a>"));
/// assert_eq!(out.encoding, "windows-1252");
/// ```
pub fn decode(bytes: &[u8], hint: Option<&str>, recover: bool) -> Result<Decoded, EncodingError> {
    let (encoding, skip) = match detect_bom(bytes) {
        Some(found) => found,
        None => match hint {
            Some(label) => (lookup(label)?, 0),
            None => match declared_encoding(bytes) {
                Some(label) => (lookup(&label)?, 0),
                None => (encoding_rs::UTF_8, 0),
            },
        },
    };
    let content = &bytes[skip..];

    if encoding == encoding_rs::UTF_8 {
        if let Ok(s) = std::str::from_utf8(content) {
            return Ok(Decoded {
                text: s.to_owned(),
                encoding: encoding.name(),
                lossy: false,
            });
        }
    }

    let (text, had_errors) = encoding.decode_without_bom_handling(content);
    if had_errors && !recover {
        return Err(EncodingError::new(format!(
            "malformed byte sequence for encoding {}",
            encoding.name()
        )));
    }
    Ok(Decoded {
        text: text.into_owned(),
        encoding: encoding.name(),
        lossy: had_errors,
    })
}

/// Reads the `encoding` pseudo-attribute from an XML declaration.
///
/// The declaration must be ASCII-compatible, so the raw bytes are scanned
/// directly. Only the first 200 bytes are considered.
fn declared_encoding(bytes: &[u8]) -> Option<String> {
    let scan = &bytes[..bytes.len().min(200)];
    if !scan.starts_with(b"<?xml") {
        return None;
    }
    let decl_end = scan.windows(2).position(|w| w == b"?>")?;
    let decl = &scan[..decl_end];

    let needle = b"encoding";
    let pos = decl.windows(needle.len()).position(|w| w == needle)?;
    let rest = skip_ascii_whitespace(&decl[pos + needle.len()..]);
    let rest = skip_ascii_whitespace(rest.strip_prefix(b"=")?);

    let quote = *rest.first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }
    let value = &rest[1..];
    let end = value.iter().position(|&b| b == quote)?;
    let value = &value[..end];
    value
        .is_ascii()
        .then(|| String::from_utf8_lossy(value).into_owned())
}

fn skip_ascii_whitespace(bytes: &[u8]) -> &[u8] {
    let skip = bytes
        .iter()
        .take_while(|&&b| matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
        .count();
    &bytes[skip..]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_utf8() {
        let out = decode(b"<root>hello</root>", None, false).unwrap();
        assert_eq!(out.text, "<root>hello</root>");
        assert_eq!(out.encoding, "UTF-8");
        assert!(!out.lossy);
    }

    #[test]
    fn test_utf8_bom_is_stripped() {
        let out = decode(b"\xEF\xBB\xBF<root/>", None, false).unwrap();
        assert_eq!(out.text, "<root/>");
    }

    #[test]
    fn test_utf16le_bom() {
        let out = decode(b"\xFF\xFE<\x00a\x00/\x00>\x00", None, false).unwrap();
        assert_eq!(out.text, "<a/>");
        assert_eq!(out.encoding, "UTF-16LE");
    }

    #[test]
    fn test_bom_beats_hint() {
        let out = decode(b"\xEF\xBB\xBF<a>\xC3\xA9</a>", Some("ISO-8859-1"), false).unwrap();
        assert_eq!(out.text, "<a>\u{e9}</a>");
    }

    #[test]
    fn test_hint_beats_declaration() {
        let bytes = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><a>\xC3\xA9</a>";
        let out = decode(bytes, Some("utf-8"), false).unwrap();
        assert!(out.text.ends_with("<a>\u{e9}</a>"));
    }

    #[test]
    fn test_declaration_used_without_hint() {
        let bytes = b"<?xml version='1.0' encoding='ISO-8859-1'?><a>caf\xE9</a>";
        let out = decode(bytes, None, false).unwrap();
        assert!(out.text.contains("caf\u{e9}"));
    }

    #[test]
    fn test_unknown_hint() {
        let err = decode(b"<a/>", Some("UNKNOWN-ENCODING-42"), true).unwrap_err();
        assert!(err.message.contains("unsupported encoding"));
    }

    #[test]
    fn test_malformed_strict_vs_recover() {
        let bytes: &[u8] = &[b'<', b'a', b'>', 0x80, 0x81, b'<', b'/', b'a', b'>'];
        assert!(decode(bytes, None, false).is_err());
        let out = decode(bytes, None, true).unwrap();
        assert!(out.lossy);
        assert_eq!(out.text, "<a>\u{fffd}\u{fffd}</a>");
    }

    #[test]
    fn test_declared_encoding_absent() {
        assert_eq!(declared_encoding(b"<?xml version=\"1.0\"?><r/>"), None);
        assert_eq!(declared_encoding(b"<r/>"), None);
    }
}
