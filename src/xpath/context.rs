//! Evaluation contexts and result objects.
//!
//! Both are native resources counted in the tree's [`AllocCounters`]: an
//! [`EvalContext`] or [`XPathObject`] is counted as created when built and as
//! freed when dropped or passed to `free`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::NamespaceError;
use crate::parser::input::is_ncname;
use crate::tree::{AllocCounters, NodeId, Tree, XML_NAMESPACE};

use super::types::{XPathNode, XPathValue};

/// Persistent evaluation state: namespace bindings, variable bindings and
/// the current context node.
#[derive(Debug)]
pub struct EvalContext {
    namespaces: HashMap<String, String>,
    variables: HashMap<String, XPathValue>,
    node: Option<NodeId>,
    counters: Arc<AllocCounters>,
}

impl EvalContext {
    /// Creates a context for queries over `tree`. The context node starts
    /// out as the document node.
    #[must_use]
    pub fn new(tree: &Tree) -> Self {
        let counters = Arc::clone(tree.counters());
        counters.context_created();
        Self {
            namespaces: HashMap::new(),
            variables: HashMap::new(),
            node: Some(tree.root()),
            counters,
        }
    }

    /// Binds `prefix` to `uri` for prefixed name tests.
    ///
    /// Registering the same pair again has no effect; registering a new URI
    /// for a bound prefix replaces the old one.
    ///
    /// # Errors
    ///
    /// Rejects an empty prefix, a prefix that is not an `NCName`, the
    /// reserved `xmlns` prefix, rebinding `xml` to anything but the XML
    /// namespace, and a URI that is empty or contains whitespace.
    pub fn register_ns(&mut self, prefix: &str, uri: &str) -> Result<(), NamespaceError> {
        let reject = |reason| {
            Err(NamespaceError {
                prefix: prefix.to_owned(),
                uri: uri.to_owned(),
                reason,
            })
        };
        if prefix.is_empty() {
            return reject("empty prefix");
        }
        if !is_ncname(prefix) {
            return reject("prefix is not an NCName");
        }
        if prefix == "xmlns" {
            return reject("the xmlns prefix is reserved");
        }
        if prefix == "xml" && uri != XML_NAMESPACE {
            return reject("the xml prefix cannot be rebound");
        }
        if uri.is_empty() {
            return reject("empty namespace URI");
        }
        if uri.chars().any(char::is_whitespace) {
            return reject("namespace URI contains whitespace");
        }
        self.namespaces.insert(prefix.to_owned(), uri.to_owned());
        Ok(())
    }

    /// Resolves a prefix. `xml` is always bound.
    #[must_use]
    pub fn namespace(&self, prefix: &str) -> Option<&str> {
        match self.namespaces.get(prefix) {
            Some(uri) => Some(uri),
            None if prefix == "xml" => Some(XML_NAMESPACE),
            None => None,
        }
    }

    /// Binds `$name`.
    pub fn set_variable(&mut self, name: impl Into<String>, value: XPathValue) {
        self.variables.insert(name.into(), value);
    }

    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&XPathValue> {
        self.variables.get(name)
    }

    /// Sets the context node for the next evaluation.
    pub fn set_node(&mut self, node: Option<NodeId>) {
        self.node = node;
    }

    #[must_use]
    pub fn node(&self) -> Option<NodeId> {
        self.node
    }

    /// Frees the context.
    pub fn free(self) {}
}

impl Drop for EvalContext {
    fn drop(&mut self) {
        self.counters.context_freed();
    }
}

/// The result of one evaluation.
#[derive(Debug)]
pub struct XPathObject {
    value: XPathValue,
    counters: Arc<AllocCounters>,
}

impl XPathObject {
    pub(crate) fn new(value: XPathValue, counters: &Arc<AllocCounters>) -> Self {
        counters.result_created();
        Self {
            value,
            counters: Arc::clone(counters),
        }
    }

    #[must_use]
    pub fn value(&self) -> &XPathValue {
        &self.value
    }

    /// The heap nodes of a node-set result, in document order. Attribute
    /// items and non-node-set results yield nothing.
    #[must_use]
    pub fn node_ids(&self) -> Vec<NodeId> {
        match &self.value {
            XPathValue::NodeSet(items) => {
                items.iter().copied().filter_map(XPathNode::node_id).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Frees the result.
    pub fn free(self) {}
}

impl Drop for XPathObject {
    fn drop(&mut self) {
        self.counters.result_freed();
    }
}
