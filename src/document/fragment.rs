//! Fragment building.
//!
//! A fragment is the list of top-level nodes parsed from a markup snippet
//! such as `<a/><b/>text`. The snippet is wrapped in a synthetic `<root>`
//! element so the parser sees one well-formed subtree, then each child is
//! unlinked from the wrapper in order and the now-empty wrapper is freed on
//! the spot. The wrapper is never returned, tracked or reachable afterwards.

use std::collections::BTreeSet;
use std::fmt;

use tracing::debug;

use crate::error::{DocumentError, ParseDiagnostic};
use crate::parser::{parse_fragment_into, ParseOptions};
use crate::tree::{NodeId, Tree};

use super::Document;

/// Name of the synthetic wrapper element.
pub const FRAGMENT_WRAPPER: &str = "root";

/// Identifies a fragment within its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FragmentId(pub(crate) u32);

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fragment#{}", self.0)
    }
}

/// Detached sibling nodes parsed from one snippet, in input order.
///
/// The nodes belong to the document that parsed them. A caller may attach
/// any of them into the tree; whatever is still detached when the fragment
/// is released is handed to the document's tracked set and freed at
/// teardown.
#[derive(Debug)]
pub struct Fragment {
    id: FragmentId,
    children: Vec<NodeId>,
    diagnostics: Vec<ParseDiagnostic>,
}

impl Fragment {
    #[must_use]
    pub fn id(&self) -> FragmentId {
        self.id
    }

    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Diagnostics recorded while parsing the snippet.
    #[must_use]
    pub fn diagnostics(&self) -> &[ParseDiagnostic] {
        &self.diagnostics
    }

    /// Moves every child that is still live and parentless into `tracked`.
    /// Children the caller has attached belong to the tree and are left
    /// alone. Returns how many were handed over.
    pub(crate) fn release(self, tree: &Tree, tracked: &mut BTreeSet<NodeId>) -> usize {
        let mut handed = 0;
        for child in self.children {
            if tree.is_live(child) && tree.parent(child).is_none() && tracked.insert(child) {
                handed += 1;
            }
        }
        handed
    }
}

/// Parses `content` into `tree` and returns it as a fragment.
///
/// `content` must not be empty; the caller handles that case.
pub(crate) fn build(
    tree: &mut Tree,
    id: FragmentId,
    context: Option<NodeId>,
    content: &[u8],
    url: Option<&str>,
    encoding: Option<&str>,
    options: ParseOptions,
) -> Result<Fragment, DocumentError> {
    let open = format!("<{FRAGMENT_WRAPPER}>");
    let close = format!("</{FRAGMENT_WRAPPER}>");
    let mut wrapped = Vec::with_capacity(open.len() + content.len() + close.len());
    wrapped.extend_from_slice(open.as_bytes());
    wrapped.extend_from_slice(content);
    wrapped.extend_from_slice(close.as_bytes());

    let parsed = parse_fragment_into(tree, context, &wrapped, url, encoding, options)
        .map_err(DocumentError::FragmentParseFailure)?;
    let wrapper = parsed.root;

    let children: Vec<NodeId> = tree.children(wrapper).collect();
    for &child in &children {
        tree.unlink(child)?;
    }
    tree.free_node(wrapper)?;

    debug!(%id, children = children.len(), "parsed fragment");
    Ok(Fragment {
        id,
        children,
        diagnostics: parsed.diagnostics,
    })
}

/// Parses a fragment without an existing document.
///
/// A fresh empty document is created to own the nodes and is returned with
/// the fragment. Empty content yields the document and no fragment.
///
/// # Errors
///
/// Returns [`DocumentError::FragmentParseFailure`] if the snippet cannot be
/// parsed.
///
/// # Examples
///
/// ```
/// use xmlward::document::parse_fragment_standalone;
/// use xmlward::parser::ParseOptions;
///
/// let (doc, id) = parse_fragment_standalone(b"<a/>tail", None, ParseOptions::DEFAULT).unwrap();
/// let fragment = doc.fragment(id.unwrap()).unwrap();
/// assert_eq!(fragment.len(), 2);
/// ```
pub fn parse_fragment_standalone(
    content: &[u8],
    url: Option<&str>,
    options: ParseOptions,
) -> Result<(Document, Option<FragmentId>), DocumentError> {
    let mut doc = Document::create_empty(None, None);
    let id = doc.parse_fragment(content, url, options)?;
    Ok((doc, id))
}
