//! Document-level defaults.

/// Input and output encoding used when the caller names none.
pub const DEFAULT_ENCODING: &str = "utf-8";

/// Returns `name`, or [`DEFAULT_ENCODING`] when absent or empty.
pub(crate) fn encoding_or_default(name: Option<&str>) -> String {
    match name {
        Some(n) if !n.is_empty() => n.to_owned(),
        _ => DEFAULT_ENCODING.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_default() {
        assert_eq!(encoding_or_default(None), "utf-8");
        assert_eq!(encoding_or_default(Some("")), "utf-8");
        assert_eq!(encoding_or_default(Some("ISO-8859-1")), "ISO-8859-1");
    }
}
