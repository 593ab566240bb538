//! Low-level input handling for the XML parser.
//!
//! [`ParserInput`] wraps the decoded input text and tracks position (line,
//! column, byte offset), nesting depth, entity expansion budget and the
//! diagnostics recorded so far. It also provides the lexical primitives the
//! tree builder is written in terms of: peeking, advancing, names, references
//! and quoted values.
//!
//! # Limits
//!
//! - **Depth**: elements nested deeper than [`MAX_DEPTH`] are a fatal error,
//!   even in recovery mode.
//! - **Entity expansions**: at most [`MAX_ENTITY_EXPANSIONS`] references are
//!   expanded per parse, and an entity that references itself is fatal.
//!
//! External entities are never loaded.

use std::collections::{HashMap, HashSet};

use crate::error::{ErrorSeverity, ParseDiagnostic, ParseError, SourceLocation};
use crate::tree::XML_NAMESPACE;

use super::ParseOptions;

/// Maximum element nesting depth.
pub(crate) const MAX_DEPTH: u32 = 256;

/// Maximum number of entity references expanded per parse.
pub(crate) const MAX_ENTITY_EXPANSIONS: u32 = 10_000;

/// Maximum length in bytes of an element or attribute name.
pub(crate) const MAX_NAME_LENGTH: usize = 50_000;

// -------------------------------------------------------------------------
// Character classes (XML 1.0 §2.2, §2.3)
// -------------------------------------------------------------------------

/// Returns `true` if `c` matches the XML 1.0 `Char` production.
pub(crate) fn is_xml_char(c: char) -> bool {
    matches!(c as u32,
        0x09 | 0x0A | 0x0D | 0x20..=0xD7FF | 0xE000..=0xFFFD | 0x0001_0000..=0x0010_FFFF
    )
}

/// Returns `true` if `c` is a `NameStartChar`.
pub(crate) fn is_name_start_char(c: char) -> bool {
    matches!(c,
        ':' | 'A'..='Z' | '_' | 'a'..='z' |
        '\u{C0}'..='\u{D6}' | '\u{D8}'..='\u{F6}' | '\u{F8}'..='\u{2FF}' |
        '\u{370}'..='\u{37D}' | '\u{37F}'..='\u{1FFF}' |
        '\u{200C}'..='\u{200D}' | '\u{2070}'..='\u{218F}' |
        '\u{2C00}'..='\u{2FEF}' | '\u{3001}'..='\u{D7FF}' |
        '\u{F900}'..='\u{FDCF}' | '\u{FDF0}'..='\u{FFFD}' |
        '\u{10000}'..='\u{EFFFF}'
    )
}

/// Returns `true` if `c` is a `NameChar`.
pub(crate) fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || matches!(c,
            '-' | '.' | '0'..='9' | '\u{B7}' |
            '\u{300}'..='\u{36F}' | '\u{203F}'..='\u{2040}'
        )
}

/// Returns `true` if `s` is a non-empty name without colons (an `NCName`).
pub(crate) fn is_ncname(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c != ':' && is_name_start_char(c) => {}
        _ => return false,
    }
    chars.all(|c| c != ':' && is_name_char(c))
}

/// Splits a qualified name into optional prefix and local part.
///
/// `"foo:bar"` → `(Some("foo"), "bar")`, `"bar"` → `(None, "bar")`.
/// A name with an empty prefix or local part is not split.
pub(crate) fn split_name(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((p, l)) if !p.is_empty() && !l.is_empty() && !l.contains(':') => (Some(p), l),
        _ => (None, name),
    }
}

/// Returns `true` for the five predefined entities.
fn builtin_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "apos" => Some('\''),
        "quot" => Some('"'),
        _ => None,
    }
}

// -------------------------------------------------------------------------
// Position checkpointing
// -------------------------------------------------------------------------

/// A snapshot of the input position, used to look ahead at end tags.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SavedPosition {
    pos: usize,
    line: u32,
    column: u32,
}

// -------------------------------------------------------------------------
// ParserInput
// -------------------------------------------------------------------------

/// Entity declarations collected from the internal DTD subset.
#[derive(Debug, Default)]
pub(crate) struct EntityTable {
    /// Internal general entities: name to literal replacement text.
    pub internal: HashMap<String, String>,
    /// General entities declared with SYSTEM or PUBLIC identifiers.
    pub external: HashSet<String>,
}

impl EntityTable {
    /// Records a declaration. The first declaration of a name wins.
    pub fn declare_internal(&mut self, name: String, value: String) {
        if !self.external.contains(&name) {
            self.internal.entry(name).or_insert(value);
        }
    }

    pub fn declare_external(&mut self, name: String) {
        if !self.internal.contains_key(&name) {
            self.external.insert(name);
        }
    }
}

/// Input state shared by every production of the tree builder.
pub(crate) struct ParserInput<'a> {
    input: &'a str,
    pos: usize,
    line: u32,
    column: u32,
    depth: u32,
    entity_expansions: u32,
    /// Names of entities currently being expanded, innermost last.
    expanding: Vec<String>,
    options: ParseOptions,
    pub(crate) diagnostics: Vec<ParseDiagnostic>,
    pub(crate) entities: EntityTable,
}

impl<'a> ParserInput<'a> {
    pub fn new(input: &'a str, options: ParseOptions) -> Self {
        Self {
            input,
            pos: 0,
            line: 1,
            column: 1,
            depth: 0,
            entity_expansions: 0,
            expanding: Vec::new(),
            options,
            diagnostics: Vec::new(),
            entities: EntityTable::default(),
        }
    }

    /// Returns whether recovery mode is enabled.
    pub fn recover(&self) -> bool {
        self.options.contains(ParseOptions::RECOVER)
    }

    pub fn options(&self) -> ParseOptions {
        self.options
    }

    // -- Depth tracking --

    /// Increments the nesting depth. Exceeding [`MAX_DEPTH`] is fatal.
    pub fn increment_depth(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.fatal(format!(
                "maximum nesting depth exceeded ({MAX_DEPTH})"
            )));
        }
        Ok(())
    }

    pub fn decrement_depth(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    // -- Position queries --

    pub fn location(&self) -> SourceLocation {
        SourceLocation {
            line: self.line,
            column: self.column,
            byte_offset: self.pos,
        }
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    pub fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    pub fn save_position(&self) -> SavedPosition {
        SavedPosition {
            pos: self.pos,
            line: self.line,
            column: self.column,
        }
    }

    pub fn restore_position(&mut self, saved: SavedPosition) {
        self.pos = saved.pos;
        self.line = saved.line;
        self.column = saved.column;
    }

    // -- Peek operations --

    pub fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    pub fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.as_bytes().get(self.pos + offset).copied()
    }

    pub fn peek_char(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    // -- Advance operations --

    /// Advances over the next `len` bytes, which must end on a char boundary.
    pub fn advance(&mut self, len: usize) {
        let end = (self.pos + len).min(self.input.len());
        for ch in self.input[self.pos..end].chars() {
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.pos = end;
    }

    pub fn advance_char(&mut self, ch: char) {
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        self.pos += ch.len_utf8();
    }

    pub fn next_byte(&mut self) -> Result<u8, ParseError> {
        let b = self
            .peek()
            .ok_or_else(|| self.fatal("unexpected end of input"))?;
        self.advance(1);
        Ok(b)
    }

    /// Consumes the next character with `\r\n` normalization and `Char`
    /// validation.
    pub fn next_char(&mut self) -> Result<char, ParseError> {
        let ch = self
            .peek_char()
            .ok_or_else(|| self.fatal("unexpected end of input"))?;
        self.advance_char(ch);
        if ch == '\r' {
            if self.peek() == Some(b'\n') {
                self.advance(1);
            }
            return Ok('\n');
        }
        if !is_xml_char(ch) {
            self.recoverable(format!("invalid XML character: U+{:04X}", ch as u32))?;
        }
        Ok(ch)
    }

    // -- Expect operations --

    pub fn expect_byte(&mut self, expected: u8) -> Result<(), ParseError> {
        match self.peek() {
            Some(b) if b == expected => {
                self.advance(1);
                Ok(())
            }
            Some(_) => Err(self.fatal(format!(
                "expected '{}', found '{}'",
                expected as char,
                self.peek_char().unwrap_or('?')
            ))),
            None => Err(self.fatal(format!(
                "expected '{}', found end of input",
                expected as char
            ))),
        }
    }

    pub fn expect_str(&mut self, expected: &str) -> Result<(), ParseError> {
        if self.looking_at(expected) {
            self.advance(expected.len());
            Ok(())
        } else {
            Err(self.fatal(format!("expected '{expected}'")))
        }
    }

    pub fn looking_at(&self, s: &str) -> bool {
        self.remaining().starts_with(s)
    }

    // -- Whitespace --

    /// Skips whitespace. Returns `true` if any was consumed.
    pub fn skip_whitespace(&mut self) -> bool {
        let len = self
            .remaining()
            .bytes()
            .take_while(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
            .count();
        self.advance(len);
        len > 0
    }

    pub fn skip_whitespace_required(&mut self) -> Result<(), ParseError> {
        if !self.skip_whitespace() {
            return Err(self.fatal("whitespace required"));
        }
        Ok(())
    }

    /// Consumes bytes up to (not including) the first byte matching `stop`.
    pub fn take_until(&mut self, stop: impl Fn(char) -> bool) -> &'a str {
        let rest = self.remaining();
        let len = rest.find(stop).unwrap_or(rest.len());
        self.advance(len);
        &rest[..len]
    }

    // -- Names (XML 1.0 §2.3) --

    /// Parses an XML `Name`.
    pub fn parse_name(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        let first = self
            .peek_char()
            .ok_or_else(|| self.fatal("expected name, found end of input"))?;
        if !is_name_start_char(first) {
            return Err(self.fatal(format!("invalid name start character: '{first}'")));
        }
        self.advance_char(first);
        while let Some(ch) = self.peek_char() {
            if !is_name_char(ch) {
                break;
            }
            self.advance_char(ch);
        }
        let len = self.pos - start;
        if len > MAX_NAME_LENGTH {
            return Err(self.fatal(format!(
                "name length ({len}) exceeds maximum ({MAX_NAME_LENGTH})"
            )));
        }
        Ok(self.input[start..self.pos].to_owned())
    }

    // -- References (XML 1.0 §4.1) --

    fn count_expansion(&mut self) -> Result<(), ParseError> {
        self.entity_expansions += 1;
        if self.entity_expansions > MAX_ENTITY_EXPANSIONS {
            return Err(self.fatal(format!(
                "entity expansion limit exceeded ({MAX_ENTITY_EXPANSIONS})"
            )));
        }
        Ok(())
    }

    /// Parses a character or entity reference at `&` and appends its
    /// expansion to `out`.
    ///
    /// Internal entities are expanded as text, recursively. External entities
    /// produce a warning and expand to nothing. An undefined entity is kept
    /// as literal text in recovery mode and is fatal otherwise.
    pub fn parse_reference(&mut self, out: &mut String) -> Result<(), ParseError> {
        self.expect_byte(b'&')?;
        if self.peek() == Some(b'#') {
            self.advance(1);
            let (digits, radix) = if self.peek() == Some(b'x') {
                self.advance(1);
                (self.take_until(|c| !c.is_ascii_hexdigit()), 16)
            } else {
                (self.take_until(|c| !c.is_ascii_digit()), 10)
            };
            self.expect_byte(b';')?;
            let ch = u32::from_str_radix(digits, radix)
                .ok()
                .and_then(char::from_u32)
                .filter(|&c| is_xml_char(c));
            match ch {
                Some(c) => out.push(c),
                None => self.recoverable(format!("invalid character reference &#{digits};"))?,
            }
            return Ok(());
        }

        let name = self.parse_name()?;
        if self.peek() != Some(b';') {
            self.recoverable(format!("entity reference '{name}' is missing ';'"))?;
            out.push('&');
            out.push_str(&name);
            return Ok(());
        }
        self.advance(1);
        self.expand_entity(&name, out)
    }

    fn expand_entity(&mut self, name: &str, out: &mut String) -> Result<(), ParseError> {
        if let Some(c) = builtin_entity(name) {
            out.push(c);
            return Ok(());
        }
        self.count_expansion()?;
        if let Some(value) = self.entities.internal.get(name).cloned() {
            if self.expanding.iter().any(|n| n == name) {
                return Err(self.fatal(format!("entity '{name}' references itself")));
            }
            self.expanding.push(name.to_owned());
            let result = self.expand_text(&value, out);
            self.expanding.pop();
            return result;
        }
        if self.entities.external.contains(name) {
            self.push_diagnostic(
                ErrorSeverity::Warning,
                format!("external entity '{name}' not loaded"),
            );
            return Ok(());
        }
        self.recoverable(format!("entity '{name}' not defined"))?;
        out.push('&');
        out.push_str(name);
        out.push(';');
        Ok(())
    }

    /// Expands character and entity references inside replacement text.
    fn expand_text(&mut self, text: &str, out: &mut String) -> Result<(), ParseError> {
        let mut rest = text;
        while let Some(amp) = rest.find('&') {
            out.push_str(&rest[..amp]);
            rest = &rest[amp + 1..];
            let Some(semi) = rest.find(';') else {
                out.push('&');
                break;
            };
            let reference = &rest[..semi];
            rest = &rest[semi + 1..];
            if let Some(num) = reference.strip_prefix('#') {
                let parsed = match num.strip_prefix('x') {
                    Some(hex) => u32::from_str_radix(hex, 16),
                    None => num.parse::<u32>(),
                };
                match parsed.ok().and_then(char::from_u32).filter(|&c| is_xml_char(c)) {
                    Some(c) => out.push(c),
                    None => {
                        self.recoverable(format!("invalid character reference &{reference};"))?;
                    }
                }
            } else {
                self.expand_entity(reference, out)?;
            }
        }
        out.push_str(rest);
        Ok(())
    }

    // -- Quoted values --

    /// Parses a quoted attribute value with reference expansion and
    /// whitespace normalization (XML 1.0 §3.3.3).
    pub fn parse_attribute_value(&mut self) -> Result<String, ParseError> {
        let quote = self.next_byte()?;
        if quote != b'"' && quote != b'\'' {
            return Err(self.fatal("attribute value must be quoted"));
        }
        let mut value = String::new();
        loop {
            match self.peek() {
                None => return Err(self.fatal("unexpected end of input in attribute value")),
                Some(b) if b == quote => {
                    self.advance(1);
                    break;
                }
                Some(b'&') => self.parse_reference(&mut value)?,
                Some(b'<') => {
                    self.recoverable("'<' not allowed in attribute values")?;
                    self.advance(1);
                    value.push('<');
                }
                Some(_) => {
                    let ch = self.next_char()?;
                    value.push(if matches!(ch, '\n' | '\t') { ' ' } else { ch });
                }
            }
        }
        Ok(value)
    }

    /// Parses a quoted literal without reference expansion.
    pub fn parse_quoted_value(&mut self) -> Result<String, ParseError> {
        let quote = self.next_byte()?;
        if quote != b'"' && quote != b'\'' {
            return Err(self.fatal("expected quoted value"));
        }
        let quote = quote as char;
        let value = self.take_until(|c| c == quote).to_owned();
        self.expect_byte(quote as u8)?;
        Ok(value)
    }

    // -- Errors --

    /// Creates a fatal `ParseError` at the current location.
    pub fn fatal(&self, message: impl Into<String>) -> ParseError {
        let mut err = ParseError::new(message, self.location());
        err.diagnostics.clone_from(&self.diagnostics);
        err
    }

    /// Records a recoverable error, or fails if recovery is off.
    pub fn recoverable(&mut self, message: impl Into<String>) -> Result<(), ParseError> {
        if self.recover() {
            self.push_diagnostic(ErrorSeverity::Error, message.into());
            Ok(())
        } else {
            Err(self.fatal(message))
        }
    }

    /// Appends a diagnostic unless the options suppress its severity.
    pub fn push_diagnostic(&mut self, severity: ErrorSeverity, message: String) {
        let suppressed = match severity {
            ErrorSeverity::Warning => self.options.contains(ParseOptions::NOWARNING),
            ErrorSeverity::Error => self.options.contains(ParseOptions::NOERROR),
            ErrorSeverity::Fatal => false,
        };
        if suppressed {
            return;
        }
        self.diagnostics.push(ParseDiagnostic {
            severity,
            message,
            location: self.location(),
        });
    }
}

// -------------------------------------------------------------------------
// Namespace resolver
// -------------------------------------------------------------------------

/// Namespace scope stack mirroring element nesting.
///
/// Each frame holds the bindings introduced on one element. A `None` prefix
/// is the default namespace; an empty URI un-declares it.
pub(crate) struct NamespaceResolver {
    stack: Vec<Vec<(Option<String>, String)>>,
}

impl NamespaceResolver {
    /// Creates a resolver with only `xml` bound.
    pub fn new() -> Self {
        Self {
            stack: vec![vec![(Some("xml".to_owned()), XML_NAMESPACE.to_owned())]],
        }
    }

    /// Creates a resolver seeded with bindings already in scope, for example
    /// at the node a fragment is parsed against.
    pub fn with_bindings(bindings: impl IntoIterator<Item = (Option<String>, String)>) -> Self {
        let mut resolver = Self::new();
        resolver.stack.push(bindings.into_iter().collect());
        resolver
    }

    pub fn push_scope(&mut self) {
        self.stack.push(Vec::new());
    }

    pub fn pop_scope(&mut self) {
        self.stack.pop();
    }

    pub fn bind(&mut self, prefix: Option<String>, uri: String) {
        if let Some(frame) = self.stack.last_mut() {
            frame.push((prefix, uri));
        }
    }

    /// Resolves a prefix, walking from the innermost scope outwards.
    pub fn resolve(&self, prefix: Option<&str>) -> Option<&str> {
        self.stack
            .iter()
            .rev()
            .flat_map(|frame| frame.iter().rev())
            .find(|(p, _)| p.as_deref() == prefix)
            .and_then(|(_, uri)| (!uri.is_empty()).then_some(uri.as_str()))
    }
}

// -------------------------------------------------------------------------
// Markup productions
// -------------------------------------------------------------------------

/// Parses a comment (`<!-- ... -->`) and returns its content.
pub(crate) fn parse_comment_content(input: &mut ParserInput<'_>) -> Result<String, ParseError> {
    input.expect_str("<!--")?;
    let mut content = String::new();
    loop {
        if input.at_end() {
            return Err(input.fatal("unexpected end of input in comment"));
        }
        if input.looking_at("-->") {
            input.advance(3);
            break;
        }
        if input.looking_at("--") {
            input.recoverable("'--' not allowed inside comments")?;
            content.push_str("--");
            input.advance(2);
        } else {
            content.push(input.next_char()?);
        }
    }
    Ok(content)
}

/// Parses a CDATA section (`<![CDATA[ ... ]]>`) and returns its content.
pub(crate) fn parse_cdata_content(input: &mut ParserInput<'_>) -> Result<String, ParseError> {
    input.expect_str("<![CDATA[")?;
    let body = input.remaining();
    let Some(end) = body.find("]]>") else {
        return Err(input.fatal("unexpected end of input in CDATA section"));
    };
    let content = body[..end].replace("\r\n", "\n").replace('\r', "\n");
    input.advance(end + 3);
    Ok(content)
}

/// Parses a processing instruction and returns `(target, data)`.
pub(crate) fn parse_pi_content(
    input: &mut ParserInput<'_>,
) -> Result<(String, Option<String>), ParseError> {
    input.expect_str("<?")?;
    let target = input.parse_name()?;
    if target.eq_ignore_ascii_case("xml") {
        return Err(input.fatal("XML declaration allowed only at the start of the document"));
    }
    let data = if input.skip_whitespace() {
        let body = input.remaining();
        let Some(end) = body.find("?>") else {
            return Err(input.fatal("unexpected end of input in processing instruction"));
        };
        let data = body[..end].to_owned();
        input.advance(end + 2);
        (!data.is_empty()).then_some(data)
    } else {
        input.expect_str("?>")?;
        None
    };
    Ok((target, data))
}

/// Parsed XML declaration.
#[derive(Debug, Clone)]
pub(crate) struct XmlDeclaration {
    pub version: String,
    pub encoding: Option<String>,
    pub standalone: Option<bool>,
}

/// Parses `<?xml version="1.0" encoding="..." standalone="..."?>`.
pub(crate) fn parse_xml_decl(input: &mut ParserInput<'_>) -> Result<XmlDeclaration, ParseError> {
    input.expect_str("<?xml")?;
    input.skip_whitespace_required()?;

    input.expect_str("version")?;
    input.skip_whitespace();
    input.expect_byte(b'=')?;
    input.skip_whitespace();
    let version = input.parse_quoted_value()?;
    if !is_valid_version_num(&version) {
        input.recoverable(format!("unsupported version '{version}'"))?;
    }

    let had_ws = input.skip_whitespace();
    let encoding = if had_ws && input.looking_at("encoding") {
        input.expect_str("encoding")?;
        input.skip_whitespace();
        input.expect_byte(b'=')?;
        input.skip_whitespace();
        Some(input.parse_quoted_value()?)
    } else {
        None
    };

    let had_ws = input.skip_whitespace() || (encoding.is_none() && had_ws);
    let standalone = if had_ws && input.looking_at("standalone") {
        input.expect_str("standalone")?;
        input.skip_whitespace();
        input.expect_byte(b'=')?;
        input.skip_whitespace();
        match input.parse_quoted_value()?.as_str() {
            "yes" => Some(true),
            "no" => Some(false),
            _ => return Err(input.fatal("standalone accepts only 'yes' or 'no'")),
        }
    } else {
        None
    };

    input.skip_whitespace();
    input.expect_str("?>")?;
    Ok(XmlDeclaration {
        version,
        encoding,
        standalone,
    })
}

fn is_valid_version_num(s: &str) -> bool {
    s.strip_prefix("1.")
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn strict(s: &str) -> ParserInput<'_> {
        ParserInput::new(s, ParseOptions::empty())
    }

    fn lenient(s: &str) -> ParserInput<'_> {
        ParserInput::new(s, ParseOptions::RECOVER)
    }

    #[test]
    fn test_line_column_tracking() {
        let mut input = strict("ab\ncd");
        input.advance(4);
        let loc = input.location();
        assert_eq!((loc.line, loc.column, loc.byte_offset), (2, 2, 4));
    }

    #[test]
    fn test_next_char_cr_normalization() {
        let mut input = strict("\r\nx");
        assert_eq!(input.next_char().unwrap(), '\n');
        assert_eq!(input.next_char().unwrap(), 'x');
    }

    #[test]
    fn test_parse_name() {
        let mut input = strict("svg:rect x");
        assert_eq!(input.parse_name().unwrap(), "svg:rect");
        assert!(strict("1abc").parse_name().is_err());
    }

    #[test]
    fn test_references() {
        let mut input = strict("&lt;&#65;&#x42;");
        let mut out = String::new();
        for _ in 0..3 {
            input.parse_reference(&mut out).unwrap();
        }
        assert_eq!(out, "<AB");
    }

    #[test]
    fn test_undefined_entity_strict_vs_recover() {
        let mut out = String::new();
        assert!(strict("&nope;").parse_reference(&mut out).is_err());

        let mut input = lenient("&nope;");
        input.parse_reference(&mut out).unwrap();
        assert_eq!(out, "&nope;");
        assert_eq!(input.diagnostics.len(), 1);
    }

    #[test]
    fn test_internal_entity_expands_recursively() {
        let mut input = strict("&outer;");
        input
            .entities
            .declare_internal("inner".into(), "in&amp;ner".into());
        input
            .entities
            .declare_internal("outer".into(), "[&inner;]".into());
        let mut out = String::new();
        input.parse_reference(&mut out).unwrap();
        assert_eq!(out, "[in&ner]");
    }

    #[test]
    fn test_self_referencing_entity_is_fatal() {
        let mut input = lenient("&a;");
        input.entities.declare_internal("a".into(), "x&b;".into());
        input.entities.declare_internal("b".into(), "&a;".into());
        let mut out = String::new();
        let err = input.parse_reference(&mut out).unwrap_err();
        assert!(err.message.contains("references itself"));
    }

    #[test]
    fn test_expansion_budget() {
        let mut input = lenient("&l5;");
        input.entities.declare_internal("l0".into(), "ha".into());
        for level in 1..=5 {
            let prev = format!("&l{};", level - 1);
            input
                .entities
                .declare_internal(format!("l{level}"), prev.repeat(10));
        }
        let mut out = String::new();
        let err = input.parse_reference(&mut out).unwrap_err();
        assert!(err.message.contains("expansion limit"));
    }

    #[test]
    fn test_external_entity_is_not_loaded() {
        let mut input = ParserInput::new("&ext;", ParseOptions::RECOVER);
        input.entities.declare_external("ext".into());
        let mut out = String::new();
        input.parse_reference(&mut out).unwrap();
        assert_eq!(out, "");
        assert_eq!(input.diagnostics[0].severity, ErrorSeverity::Warning);
    }

    #[test]
    fn test_nowarning_suppresses_warnings() {
        let mut input = ParserInput::new("", ParseOptions::NOWARNING);
        input.push_diagnostic(ErrorSeverity::Warning, "w".into());
        input.push_diagnostic(ErrorSeverity::Error, "e".into());
        assert_eq!(input.diagnostics.len(), 1);
        assert_eq!(input.diagnostics[0].message, "e");
    }

    #[test]
    fn test_attribute_value_normalization() {
        let mut input = strict("\"a\tb\nc &amp; d\"");
        assert_eq!(input.parse_attribute_value().unwrap(), "a b c & d");
    }

    #[test]
    fn test_depth_limit() {
        let mut input = lenient("");
        for _ in 0..MAX_DEPTH {
            input.increment_depth().unwrap();
        }
        assert!(input.increment_depth().is_err());
    }

    #[test]
    fn test_namespace_resolver_scopes() {
        let mut ns = NamespaceResolver::with_bindings([(Some("p".into()), "urn:p".into())]);
        assert_eq!(ns.resolve(Some("p")), Some("urn:p"));
        assert_eq!(ns.resolve(Some("xml")), Some(XML_NAMESPACE));
        ns.push_scope();
        ns.bind(None, "urn:d".into());
        ns.bind(Some("p".into()), "urn:q".into());
        assert_eq!(ns.resolve(None), Some("urn:d"));
        assert_eq!(ns.resolve(Some("p")), Some("urn:q"));
        ns.push_scope();
        ns.bind(None, String::new());
        assert_eq!(ns.resolve(None), None);
        ns.pop_scope();
        ns.pop_scope();
        assert_eq!(ns.resolve(Some("p")), Some("urn:p"));
    }

    #[test]
    fn test_split_name_and_ncname() {
        assert_eq!(split_name("a:b"), (Some("a"), "b"));
        assert_eq!(split_name("b"), (None, "b"));
        assert_eq!(split_name(":b"), (None, ":b"));
        assert!(is_ncname("svg"));
        assert!(!is_ncname("a:b"));
        assert!(!is_ncname(""));
        assert!(!is_ncname("1x"));
    }

    #[test]
    fn test_markup_helpers() {
        let mut input = strict("<!-- hi --><![CDATA[<x>]]><?go fast?>");
        assert_eq!(parse_comment_content(&mut input).unwrap(), " hi ");
        assert_eq!(parse_cdata_content(&mut input).unwrap(), "<x>");
        assert_eq!(
            parse_pi_content(&mut input).unwrap(),
            ("go".to_string(), Some("fast".to_string()))
        );
        assert!(input.at_end());
    }

    #[test]
    fn test_parse_xml_decl() {
        let mut input = strict("<?xml version=\"1.0\" encoding='UTF-8' standalone=\"yes\"?>");
        let decl = parse_xml_decl(&mut input).unwrap();
        assert_eq!(decl.version, "1.0");
        assert_eq!(decl.encoding.as_deref(), Some("UTF-8"));
        assert_eq!(decl.standalone, Some(true));
    }
}
