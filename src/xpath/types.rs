//! `XPath` 1.0 value types.
//!
//! The four `XPath` data types are boolean, number, string and node-set.
//! Node-sets hold [`XPathNode`] items: either a heap node or an attribute of
//! an element. Attributes are stored inline on their element and have no
//! [`NodeId`] of their own.

use std::cmp::Ordering;
use std::fmt;

use crate::tree::{NodeId, NodeKind, Tree};

/// One member of a node-set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XPathNode {
    /// A node on the tree heap.
    Node(NodeId),
    /// The `index`th attribute of element `owner`.
    Attribute { owner: NodeId, index: usize },
}

impl XPathNode {
    /// The heap node, or `None` for an attribute.
    #[must_use]
    pub fn node_id(self) -> Option<NodeId> {
        match self {
            Self::Node(id) => Some(id),
            Self::Attribute { .. } => None,
        }
    }

    /// The `XPath` string-value of this item.
    #[must_use]
    pub fn string_value(self, tree: &Tree) -> String {
        match self {
            Self::Node(id) => tree.text_content(id),
            Self::Attribute { owner, index } => tree
                .attributes(owner)
                .get(index)
                .map(|a| a.value.clone())
                .unwrap_or_default(),
        }
    }

    /// Compares two items in document order. An element's attributes come
    /// after the element and before its children.
    #[must_use]
    pub fn document_order(self, other: Self, tree: &Tree) -> Ordering {
        match (self, other) {
            (Self::Node(a), Self::Node(b)) => tree.document_order(a, b),
            (Self::Node(a), Self::Attribute { owner, .. }) => {
                if a == owner {
                    Ordering::Less
                } else {
                    tree.document_order(a, owner)
                }
            }
            (Self::Attribute { owner, .. }, Self::Node(b)) => {
                if owner == b {
                    Ordering::Greater
                } else {
                    tree.document_order(owner, b)
                }
            }
            (
                Self::Attribute { owner: a, index: i },
                Self::Attribute { owner: b, index: j },
            ) => {
                if a == b {
                    i.cmp(&j)
                } else {
                    tree.document_order(a, b)
                }
            }
        }
    }
}

/// Sorts a node-set into document order and removes duplicates.
pub(crate) fn sort_document_order(nodes: &mut Vec<XPathNode>, tree: &Tree) {
    nodes.sort_by(|a, b| a.document_order(*b, tree));
    nodes.dedup();
}

/// An `XPath` 1.0 value.
#[derive(Debug, Clone, PartialEq)]
pub enum XPathValue {
    Boolean(bool),
    Number(f64),
    String(String),
    /// Items in document order, without duplicates.
    NodeSet(Vec<XPathNode>),
}

impl XPathValue {
    /// `boolean()` conversion.
    #[must_use]
    pub fn to_boolean(&self) -> bool {
        match self {
            Self::Boolean(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::String(s) => !s.is_empty(),
            Self::NodeSet(nodes) => !nodes.is_empty(),
        }
    }

    /// `number()` conversion. A node-set converts through the string-value
    /// of its first item.
    #[must_use]
    pub fn to_number(&self, tree: &Tree) -> f64 {
        match self {
            Self::Boolean(b) => f64::from(u8::from(*b)),
            Self::Number(n) => *n,
            Self::String(s) => parse_number(s),
            Self::NodeSet(_) => parse_number(&self.to_xpath_string(tree)),
        }
    }

    /// `string()` conversion.
    #[must_use]
    pub fn to_xpath_string(&self, tree: &Tree) -> String {
        match self {
            Self::Boolean(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::String(s) => s.clone(),
            Self::NodeSet(nodes) => nodes
                .first()
                .map(|n| n.string_value(tree))
                .unwrap_or_default(),
        }
    }

    /// The value's type name as used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Boolean(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::NodeSet(_) => "node-set",
        }
    }
}

/// Formats a number the way `string()` does: no exponent, integers without
/// a decimal point, `NaN`, `Infinity`, `-Infinity`.
#[must_use]
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_owned()
    } else if n.is_infinite() {
        (if n > 0.0 { "Infinity" } else { "-Infinity" }).to_owned()
    } else if n == 0.0 {
        "0".to_owned()
    } else {
        #[allow(clippy::float_cmp)]
        let integral = n.fract() == 0.0;
        if integral {
            format!("{n:.0}")
        } else {
            format!("{n}")
        }
    }
}

/// Parses a string the way `number()` does. Accepts optional surrounding
/// whitespace, an optional leading `-`, digits and at most one `.`.
/// Anything else is `NaN`.
#[must_use]
pub fn parse_number(s: &str) -> f64 {
    let trimmed = s.trim_matches([' ', '\t', '\r', '\n']);
    let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
    let valid = !digits.is_empty()
        && digits != "."
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.matches('.').count() <= 1;
    if valid {
        trimmed.parse().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

/// The local name of a node or attribute, as `local-name()` reports it.
pub(crate) fn local_name(item: XPathNode, tree: &Tree) -> String {
    match item {
        XPathNode::Node(id) => match &tree.node(id).kind {
            NodeKind::Element { name, .. } => name.clone(),
            NodeKind::ProcessingInstruction { target, .. } => target.clone(),
            _ => String::new(),
        },
        XPathNode::Attribute { owner, index } => tree
            .attributes(owner)
            .get(index)
            .map(|a| a.name.clone())
            .unwrap_or_default(),
    }
}

/// The qualified name of a node or attribute, as `name()` reports it.
pub(crate) fn qualified_name(item: XPathNode, tree: &Tree) -> String {
    match item {
        XPathNode::Node(id) => match &tree.node(id).kind {
            NodeKind::Element { .. } => tree.qualified_name(id).unwrap_or_default(),
            NodeKind::ProcessingInstruction { target, .. } => target.clone(),
            _ => String::new(),
        },
        XPathNode::Attribute { owner, index } => tree
            .attributes(owner)
            .get(index)
            .map(crate::tree::Attribute::qualified_name)
            .unwrap_or_default(),
    }
}

/// The namespace URI of a node or attribute, as `namespace-uri()` reports
/// it.
pub(crate) fn namespace_uri(item: XPathNode, tree: &Tree) -> String {
    match item {
        XPathNode::Node(id) => tree.node_namespace(id).unwrap_or_default().to_owned(),
        XPathNode::Attribute { owner, index } => tree
            .attributes(owner)
            .get(index)
            .and_then(|a| a.namespace.clone())
            .unwrap_or_default(),
    }
}

/// An error raised while compiling or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XPathError {
    /// The expression text is malformed.
    Syntax { message: String, position: usize },
    /// A function outside the core library.
    UndefinedFunction { name: String },
    /// A core function called with the wrong number of arguments.
    InvalidArgCount {
        function: String,
        expected: &'static str,
        found: usize,
    },
    /// A `$name` with no binding in the evaluation context.
    UndefinedVariable { name: String },
    /// A name test used a prefix that is not registered.
    UndefinedPrefix { prefix: String },
    /// An operand had the wrong type, e.g. a union of a number.
    TypeError {
        expected: &'static str,
        found: &'static str,
    },
    /// The context node is not a live node of the tree being queried.
    InvalidContext { node: NodeId },
    /// The evaluation context was released by a teardown.
    ContextReleased,
}

impl fmt::Display for XPathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax { message, position } => {
                write!(f, "invalid expression at offset {position}: {message}")
            }
            Self::UndefinedFunction { name } => write!(f, "undefined function: {name}()"),
            Self::InvalidArgCount {
                function,
                expected,
                found,
            } => write!(
                f,
                "{function}() takes {expected} argument(s), {found} given"
            ),
            Self::UndefinedVariable { name } => write!(f, "undefined variable: ${name}"),
            Self::UndefinedPrefix { prefix } => {
                write!(f, "undefined namespace prefix: {prefix}")
            }
            Self::TypeError { expected, found } => {
                write!(f, "type error: expected {expected}, found {found}")
            }
            Self::InvalidContext { node } => {
                write!(f, "context node {node} is not a live node")
            }
            Self::ContextReleased => f.write_str("evaluation context has been released"),
        }
    }
}

impl std::error::Error for XPathError {}
