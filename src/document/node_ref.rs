//! Borrowing node views.

use std::fmt;

use crate::tree::{Attribute, NodeId, NodeKind};

use super::Document;

/// A read-only view of one live node, borrowed from its [`Document`].
///
/// A `NodeRef` owns nothing. It cannot outlive the document it came from,
/// and since every mutation needs `&mut Document`, the node it points at
/// stays live for as long as the view exists.
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    doc: &'a Document,
    id: NodeId,
}

impl<'a> NodeRef<'a> {
    /// Only called with handles the document has verified as live.
    pub(crate) fn new(doc: &'a Document, id: NodeId) -> Self {
        Self { doc, id }
    }

    /// The underlying handle, for passing back to mutating
    /// [`Document`] methods.
    #[must_use]
    pub fn id(self) -> NodeId {
        self.id
    }

    #[must_use]
    pub fn kind(self) -> &'a NodeKind {
        &self.doc.tree().node(self.id).kind
    }

    #[must_use]
    pub fn is_element(self) -> bool {
        matches!(self.kind(), NodeKind::Element { .. })
    }

    /// Local name of an element, target of a PI.
    #[must_use]
    pub fn name(self) -> Option<&'a str> {
        self.doc.tree().node_name(self.id)
    }

    #[must_use]
    pub fn qualified_name(self) -> Option<String> {
        self.doc.tree().qualified_name(self.id)
    }

    #[must_use]
    pub fn namespace(self) -> Option<&'a str> {
        self.doc.tree().node_namespace(self.id)
    }

    /// Concatenated descendant text.
    #[must_use]
    pub fn text_content(self) -> String {
        self.doc.tree().text_content(self.id)
    }

    #[must_use]
    pub fn attributes(self) -> &'a [Attribute] {
        self.doc.tree().attributes(self.id)
    }

    #[must_use]
    pub fn attribute(self, name: &str) -> Option<&'a str> {
        self.doc.tree().attribute(self.id, name)
    }

    #[must_use]
    pub fn parent(self) -> Option<Self> {
        self.doc.tree().parent(self.id).map(|id| Self::new(self.doc, id))
    }

    #[must_use]
    pub fn first_child(self) -> Option<Self> {
        self.doc
            .tree()
            .first_child(self.id)
            .map(|id| Self::new(self.doc, id))
    }

    #[must_use]
    pub fn next_sibling(self) -> Option<Self> {
        self.doc
            .tree()
            .next_sibling(self.id)
            .map(|id| Self::new(self.doc, id))
    }

    pub fn children(self) -> impl Iterator<Item = NodeRef<'a>> {
        let doc = self.doc;
        doc.tree().children(self.id).map(move |id| Self::new(doc, id))
    }

    /// Element children only.
    pub fn child_elements(self) -> impl Iterator<Item = NodeRef<'a>> {
        self.children().filter(|n| n.is_element())
    }
}

impl PartialEq for NodeRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.doc, other.doc) && self.id == other.id
    }
}

impl Eq for NodeRef<'_> {}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id)
            .field("kind", &self.kind().type_name())
            .field("name", &self.qualified_name())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_navigation() {
        let doc = Document::parse_str("<r a='1'><x>hi</x><y/></r>").unwrap();
        let root = doc.root().unwrap();
        assert_eq!(root.name(), Some("r"));
        assert_eq!(root.attribute("a"), Some("1"));
        let names: Vec<_> = root.child_elements().filter_map(NodeRef::name).collect();
        assert_eq!(names, vec!["x", "y"]);

        let x = root.first_child().unwrap();
        assert_eq!(x.text_content(), "hi");
        assert_eq!(x.parent(), Some(root));
        assert_eq!(x.next_sibling().and_then(NodeRef::name), Some("y"));
        assert_eq!(x.first_child().unwrap().kind().type_name(), "text");
    }
}
