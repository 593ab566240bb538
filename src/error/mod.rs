//! Error types and diagnostics.
//!
//! Failures coming out of the native layer (parser, tree, query primitives)
//! are translated at the document boundary into a small taxonomy:
//!
//! - [`DocumentError::ParseFailure`]: top-level content produced no usable tree.
//! - [`DocumentError::FragmentParseFailure`]: fragment content produced no
//!   node list.
//! - [`NamespaceError`]: a namespace binding was rejected. This is returned as
//!   a plain `Err` value the caller may ignore, never escalated.
//!
//! Absence of a result (empty node sequence, no root element) is never an
//! error.

use std::fmt;

use crate::tree::{NodeId, TreeError};

/// Severity level for a parse diagnostic, matching libxml2's `xmlErrorLevel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorSeverity {
    /// A non-fatal issue that doesn't prevent parsing.
    Warning,
    /// A recoverable error. The tree is usable but the input was malformed.
    Error,
    /// An unrecoverable error. Parsing stopped.
    Fatal,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Fatal => write!(f, "fatal error"),
        }
    }
}

/// Source location within parsed input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceLocation {
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number (in characters, not bytes).
    pub column: u32,
    /// 0-based byte offset from the start of the decoded input.
    pub byte_offset: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A single diagnostic recorded while parsing in recovery mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDiagnostic {
    /// The severity of this diagnostic.
    pub severity: ErrorSeverity,
    /// Human-readable message.
    pub message: String,
    /// Where in the source this occurred.
    pub location: SourceLocation,
}

impl fmt::Display for ParseDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} at {}", self.severity, self.message, self.location)
    }
}

/// The error returned by the native parser when it cannot build a tree.
#[derive(Debug, Clone)]
pub struct ParseError {
    /// The primary error message.
    pub message: String,
    /// Where in the source the fatal error occurred.
    pub location: SourceLocation,
    /// The URL the content was parsed from, if one was supplied.
    pub url: Option<String>,
    /// Diagnostics collected before the fatal error.
    pub diagnostics: Vec<ParseDiagnostic>,
}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            message: message.into(),
            location,
            url: None,
            diagnostics: Vec::new(),
        }
    }

    pub(crate) fn with_url(mut self, url: Option<&str>) -> Self {
        self.url = url.map(str::to_owned);
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.url {
            Some(url) => write!(
                f,
                "parse error in {url} at {}: {}",
                self.location, self.message
            ),
            None => write!(f, "parse error at {}: {}", self.location, self.message),
        }
    }
}

impl std::error::Error for ParseError {}

/// Errors surfaced by [`Document`](crate::Document) operations.
#[derive(Debug, Clone)]
pub enum DocumentError {
    /// Non-empty top-level content could not be turned into a tree.
    ParseFailure(ParseError),
    /// Non-empty fragment content could not be turned into a node list.
    FragmentParseFailure(ParseError),
    /// The handle does not refer to a live node of this document.
    StaleNode(NodeId),
    /// The node still has a parent, so it cannot be tracked as detached.
    StillAttached(NodeId),
    /// The document node itself cannot be detached, tracked or reparented.
    DocumentNode(NodeId),
    /// Attaching the node would make it its own ancestor.
    HierarchyCycle {
        /// The intended parent.
        parent: NodeId,
        /// The node being attached.
        child: NodeId,
    },
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParseFailure(err) => write!(f, "failed to parse xml input: {err}"),
            Self::FragmentParseFailure(err) => {
                write!(f, "failed to parse xml fragment: {err}")
            }
            Self::StaleNode(id) => write!(f, "node {} is not live in this document", id.into_raw()),
            Self::StillAttached(id) => {
                write!(f, "node {} is still attached to a parent", id.into_raw())
            }
            Self::DocumentNode(id) => {
                write!(f, "node {} is the document node", id.into_raw())
            }
            Self::HierarchyCycle { parent, child } => write!(
                f,
                "attaching node {} under node {} would create a cycle",
                child.into_raw(),
                parent.into_raw()
            ),
        }
    }
}

impl std::error::Error for DocumentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ParseFailure(err) | Self::FragmentParseFailure(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TreeError> for DocumentError {
    fn from(err: TreeError) -> Self {
        match err {
            TreeError::Freed(id) | TreeError::DoubleFree(id) | TreeError::OutOfRange(id) => {
                Self::StaleNode(id)
            }
            TreeError::StillAttached(id) => Self::StillAttached(id),
            TreeError::DocumentNode(id) => Self::DocumentNode(id),
            TreeError::Cycle { parent, child } => Self::HierarchyCycle { parent, child },
        }
    }
}

/// A namespace binding rejected by the evaluation context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceError {
    /// The prefix that was being bound.
    pub prefix: String,
    /// The URI that was being bound.
    pub uri: String,
    /// Why the pair was rejected.
    pub reason: &'static str,
}

impl fmt::Display for NamespaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cannot register namespace {:?} -> {:?}: {}",
            self.prefix, self.uri, self.reason
        )
    }
}

impl std::error::Error for NamespaceError {}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_source_location_display() {
        let loc = SourceLocation {
            line: 10,
            column: 5,
            byte_offset: 42,
        };
        assert_eq!(loc.to_string(), "10:5");
    }

    #[test]
    fn test_parse_error_display_with_and_without_url() {
        let err = ParseError::new(
            "unexpected end of input",
            SourceLocation {
                line: 1,
                column: 15,
                byte_offset: 14,
            },
        );
        assert_eq!(
            err.to_string(),
            "parse error at 1:15: unexpected end of input"
        );
        let err = err.with_url(Some("file:///a.xml"));
        assert_eq!(
            err.to_string(),
            "parse error in file:///a.xml at 1:15: unexpected end of input"
        );
    }

    #[test]
    fn test_parse_diagnostic_display() {
        let diag = ParseDiagnostic {
            severity: ErrorSeverity::Warning,
            message: "namespace URI is not absolute".to_string(),
            location: SourceLocation {
                line: 3,
                column: 10,
                byte_offset: 50,
            },
        };
        assert_eq!(
            diag.to_string(),
            "warning: namespace URI is not absolute at 3:10"
        );
    }

    #[test]
    fn test_document_error_source_chain() {
        let err = DocumentError::FragmentParseFailure(ParseError::new(
            "bad",
            SourceLocation::default(),
        ));
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().starts_with("failed to parse xml fragment"));
    }

    #[test]
    fn test_tree_error_translation() {
        let id = NodeId::from_raw(7).unwrap();
        assert!(matches!(
            DocumentError::from(TreeError::DoubleFree(id)),
            DocumentError::StaleNode(n) if n == id
        ));
        assert!(matches!(
            DocumentError::from(TreeError::StillAttached(id)),
            DocumentError::StillAttached(n) if n == id
        ));
    }

    #[test]
    fn test_namespace_error_display() {
        let err = NamespaceError {
            prefix: "x".into(),
            uri: String::new(),
            reason: "namespace URI is empty",
        };
        assert_eq!(
            err.to_string(),
            "cannot register namespace \"x\" -> \"\": namespace URI is empty"
        );
    }
}
