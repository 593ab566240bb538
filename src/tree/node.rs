//! Node payload definitions.
//!
//! `NodeKind` carries the node-type-specific payload. Navigation links live in
//! [`NodeData`](super::NodeData), not here.

/// The kind of a node and its associated data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// The document node. There is exactly one per tree and it is never
    /// detached or freed on its own.
    Document,

    /// An element node, e.g. `<svg:rect x="1">`.
    Element {
        /// The local name (`rect` for `svg:rect`).
        name: String,
        /// Namespace prefix, if the name was written with one.
        prefix: Option<String>,
        /// Namespace URI after resolution, if any.
        namespace: Option<String>,
        /// Attributes in source order (namespace declarations excluded).
        attributes: Vec<Attribute>,
        /// Namespace declarations made on this element.
        namespace_decls: Vec<NamespaceDecl>,
    },

    /// Character data.
    Text {
        /// Decoded text, character and entity references already resolved.
        content: String,
    },

    /// A CDATA section.
    CData {
        /// Raw section content.
        content: String,
    },

    /// A comment.
    Comment {
        /// Comment text without the delimiters.
        content: String,
    },

    /// A processing instruction, e.g. `<?target data?>`.
    ProcessingInstruction {
        /// The PI target.
        target: String,
        /// The PI data, if any.
        data: Option<String>,
    },

    /// A document type declaration.
    DocumentType {
        /// The root element name declared in the DOCTYPE.
        name: String,
        /// The SYSTEM identifier, if any.
        system_id: Option<String>,
        /// The PUBLIC identifier, if any.
        public_id: Option<String>,
    },
}

impl NodeKind {
    /// Builds an un-namespaced element payload with no attributes.
    #[must_use]
    pub fn element(name: impl Into<String>) -> Self {
        Self::Element {
            name: name.into(),
            prefix: None,
            namespace: None,
            attributes: Vec::new(),
            namespace_decls: Vec::new(),
        }
    }

    /// Builds a text payload.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    /// Short lowercase name of the node type, used in logs and the CLI.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Element { .. } => "element",
            Self::Text { .. } => "text",
            Self::CData { .. } => "cdata",
            Self::Comment { .. } => "comment",
            Self::ProcessingInstruction { .. } => "pi",
            Self::DocumentType { .. } => "doctype",
        }
    }
}

/// An attribute on an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Local name (`lang` for `xml:lang`).
    pub name: String,
    /// Namespace prefix, if any.
    pub prefix: Option<String>,
    /// Namespace URI after resolution, if any.
    pub namespace: Option<String>,
    /// Normalized, entity-expanded value.
    pub value: String,
}

impl Attribute {
    /// Returns `prefix:name`, or just `name` when unprefixed.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{p}:{}", self.name),
            None => self.name.clone(),
        }
    }
}

/// A namespace binding declared with `xmlns` or `xmlns:prefix`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceDecl {
    /// The bound prefix; `None` for the default namespace.
    pub prefix: Option<String>,
    /// The namespace URI. Empty un-declares the default namespace.
    pub uri: String,
}
