//! XML 1.0 parser.
//!
//! A hand-rolled recursive descent parser that builds directly into a
//! [`Tree`]. Two entry points are provided: [`parse_document`] produces a
//! fresh tree, and [`parse_fragment_into`] parses a single element into an
//! existing tree as a parentless subtree.

pub(crate) mod input;
mod xml;

use std::sync::Arc;

use bitflags::bitflags;
use tracing::trace;

use crate::encoding;
use crate::error::{ErrorSeverity, ParseDiagnostic, ParseError, SourceLocation};
use crate::tree::{AllocCounters, DocumentKind, NodeId, Tree};

use input::NamespaceResolver;
use xml::XmlParser;

bitflags! {
    /// Parser option flags.
    ///
    /// The bit values match libxml2's `xmlParserOption`, so option masks can
    /// be passed through unchanged.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ParseOptions: u32 {
        /// Tolerate malformed markup and build a best-effort tree.
        const RECOVER = 1 << 0;
        /// Do not record error diagnostics.
        const NOERROR = 1 << 5;
        /// Do not record warning diagnostics.
        const NOWARNING = 1 << 6;
        /// Drop whitespace-only text nodes.
        const NOBLANKS = 1 << 8;
        /// Never touch the network. External entities are not fetched.
        const NONET = 1 << 11;

        /// The option set used for top-level document parsing.
        const DEFAULT = Self::RECOVER.bits()
            | Self::NONET.bits()
            | Self::NOERROR.bits()
            | Self::NOWARNING.bits();
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// The result of a successful [`parse_fragment_into`].
#[derive(Debug)]
pub struct ParsedFragment {
    /// The parsed element. It has no parent; the caller owns it.
    pub root: NodeId,
    /// Diagnostics recorded while parsing.
    pub diagnostics: Vec<ParseDiagnostic>,
}

/// Parses a complete document into a fresh tree.
///
/// `encoding` overrides the XML declaration but not a Byte Order Mark.
///
/// # Errors
///
/// Returns `ParseError` if the input cannot be decoded, or if it is not
/// well-formed and [`ParseOptions::RECOVER`] is not set, or if no root
/// element could be found at all.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use xmlward::parser::{parse_document, ParseOptions};
///
/// let tree = parse_document(b"<root><child/></root>", None, None, ParseOptions::DEFAULT, Arc::default()).unwrap();
/// let root = tree.root_element().unwrap();
/// assert_eq!(tree.node_name(root), Some("root"));
/// ```
pub fn parse_document(
    bytes: &[u8],
    url: Option<&str>,
    encoding: Option<&str>,
    options: ParseOptions,
    counters: Arc<AllocCounters>,
) -> Result<Tree, ParseError> {
    let (text, mut diagnostics) = decode(bytes, url, encoding, options)?;
    let mut tree = Tree::new(DocumentKind::Xml, counters);
    let parsed = XmlParser::new(&text, options, &mut tree, NamespaceResolver::new())
        .parse_document()
        .map_err(|e| e.with_url(url))?;
    diagnostics.extend(parsed);
    tree.diagnostics = diagnostics;
    trace!(
        nodes = tree.live_count(),
        diagnostics = tree.diagnostics.len(),
        "parsed document"
    );
    Ok(tree)
}

/// Parses one element into `tree` as a parentless subtree.
///
/// Namespace bindings in scope at `context` are visible to the parsed
/// markup. Nothing is attached to the tree; on failure every node created by
/// the parse has already been freed.
///
/// # Errors
///
/// Returns `ParseError` if the input cannot be decoded or does not contain a
/// usable element.
pub fn parse_fragment_into(
    tree: &mut Tree,
    context: Option<NodeId>,
    bytes: &[u8],
    url: Option<&str>,
    encoding: Option<&str>,
    options: ParseOptions,
) -> Result<ParsedFragment, ParseError> {
    let (text, mut diagnostics) = decode(bytes, url, encoding, options)?;
    let bindings = match context {
        Some(id) if tree.is_live(id) => tree
            .in_scope_namespaces(id)
            .into_iter()
            .map(|decl| (decl.prefix, decl.uri))
            .collect(),
        _ => Vec::new(),
    };
    let ns = NamespaceResolver::with_bindings(bindings);
    let (root, parsed) = XmlParser::new(&text, options, tree, ns)
        .parse_fragment()
        .map_err(|e| e.with_url(url))?;
    diagnostics.extend(parsed);
    Ok(ParsedFragment { root, diagnostics })
}

/// Decodes input bytes, reporting a lossy decode as a warning.
fn decode(
    bytes: &[u8],
    url: Option<&str>,
    hint: Option<&str>,
    options: ParseOptions,
) -> Result<(String, Vec<ParseDiagnostic>), ParseError> {
    let recover = options.contains(ParseOptions::RECOVER);
    let decoded = encoding::decode(bytes, hint, recover).map_err(|e| {
        ParseError::new(e.message, SourceLocation::default()).with_url(url)
    })?;
    let mut diagnostics = Vec::new();
    if decoded.lossy && !options.contains(ParseOptions::NOWARNING) {
        diagnostics.push(ParseDiagnostic {
            severity: ErrorSeverity::Warning,
            message: format!("input is not valid {}; bytes replaced", decoded.encoding),
            location: SourceLocation::default(),
        });
    }
    Ok((decoded.text, diagnostics))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn counters() -> Arc<AllocCounters> {
        Arc::new(AllocCounters::default())
    }

    #[test]
    fn test_default_flags() {
        let opts = ParseOptions::default();
        assert!(opts.contains(ParseOptions::RECOVER));
        assert!(opts.contains(ParseOptions::NONET));
        assert!(opts.contains(ParseOptions::NOERROR));
        assert!(opts.contains(ParseOptions::NOWARNING));
        assert!(!opts.contains(ParseOptions::NOBLANKS));
        assert_eq!(opts.bits(), 0x861);
    }

    #[test]
    fn test_parse_document_records_url_on_error() {
        let err = parse_document(
            b"<a><b></a>",
            Some("file:///bad.xml"),
            None,
            ParseOptions::empty(),
            counters(),
        )
        .unwrap_err();
        assert_eq!(err.url.as_deref(), Some("file:///bad.xml"));
    }

    #[test]
    fn test_failed_parse_releases_nodes() {
        let c = counters();
        let result = parse_document(b"<a><b>", None, None, ParseOptions::empty(), Arc::clone(&c));
        assert!(result.is_err());
        assert!(c.snapshot().is_balanced());
    }

    #[test]
    fn test_noerror_suppresses_diagnostics() {
        let tree = parse_document(b"<a><b></a>", None, None, ParseOptions::DEFAULT, counters())
            .unwrap();
        assert!(tree.diagnostics.is_empty());
        let tree = parse_document(b"<a><b></a>", None, None, ParseOptions::RECOVER, counters())
            .unwrap();
        assert!(!tree.diagnostics.is_empty());
    }

    #[test]
    fn test_lossy_decode_warns() {
        let tree = parse_document(b"<a>\xFF</a>", None, None, ParseOptions::RECOVER, counters())
            .unwrap();
        assert_eq!(tree.diagnostics[0].severity, ErrorSeverity::Warning);
        assert!(parse_document(b"<a>\xFF</a>", None, None, ParseOptions::empty(), counters())
            .is_err());
    }

    #[test]
    fn test_encoding_hint() {
        let tree = parse_document(
            b"<a>caf\xE9</a>",
            None,
            Some("ISO-8859-1"),
            ParseOptions::empty(),
            counters(),
        )
        .unwrap();
        let root = tree.root_element().unwrap();
        assert_eq!(tree.text_content(root), "caf\u{e9}");
    }

    #[test]
    fn test_failed_fragment_frees_partial_subtree() {
        let c = counters();
        let mut tree = parse_document(b"<doc/>", None, None, ParseOptions::DEFAULT, Arc::clone(&c))
            .unwrap();
        let live = tree.live_count();
        let doc = tree.root_element();
        let result = parse_fragment_into(
            &mut tree,
            doc,
            b"<root><a><b>text</b><c></root>",
            None,
            None,
            ParseOptions::empty(),
        );
        assert!(result.is_err());
        assert_eq!(tree.live_count(), live);
        assert_eq!(c.snapshot().double_frees, 0);
        tree.release();
        assert!(c.snapshot().is_balanced());
    }

    #[test]
    fn test_fragment_into_inherits_context_namespaces() {
        let mut tree = parse_document(
            b"<doc xmlns:x='urn:x'/>",
            None,
            None,
            ParseOptions::DEFAULT,
            counters(),
        )
        .unwrap();
        let doc = tree.root_element().unwrap();
        let parsed = parse_fragment_into(
            &mut tree,
            Some(doc),
            b"<root><x:item/></root>",
            None,
            None,
            ParseOptions::DEFAULT,
        )
        .unwrap();
        let item = tree.first_child(parsed.root).unwrap();
        assert_eq!(tree.node_namespace(item), Some("urn:x"));

        let plain = parse_fragment_into(
            &mut tree,
            None,
            b"<root><x:item/></root>",
            None,
            None,
            ParseOptions::RECOVER,
        )
        .unwrap();
        let item = tree.first_child(plain.root).unwrap();
        assert_eq!(tree.node_namespace(item), None);
        assert_eq!(plain.diagnostics.len(), 1);
    }
}
