//! The query engine bound to one document.
//!
//! A [`QueryEngine`] owns one persistent [`EvalContext`] and at most one
//! retained [`XPathObject`], the result of the most recent evaluation. Each
//! evaluation frees the previously retained result before storing its own,
//! so repeated querying never accumulates result objects.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use xmlward::parser::{parse_document, ParseOptions};
//! use xmlward::query::QueryEngine;
//! use xmlward::xpath::compile;
//!
//! let tree = parse_document(b"<r><a/><a/></r>", None, None, ParseOptions::DEFAULT, Arc::default())
//!     .unwrap();
//! let mut engine = QueryEngine::bind(&tree);
//! let expr = compile("//a").unwrap();
//! let hits = engine.evaluate(tree.root_element(), &expr, &tree).unwrap();
//! assert_eq!(hits.len(), 2);
//! engine.teardown();
//! ```

use tracing::{debug, trace};

use crate::error::NamespaceError;
use crate::tree::{NodeId, Tree};
use crate::xpath::{compiled_eval, CompiledExpr, EvalContext, XPathError, XPathObject, XPathValue};

/// One evaluation context plus the most recent result.
#[derive(Debug)]
pub struct QueryEngine {
    context: Option<EvalContext>,
    retained: Option<XPathObject>,
}

impl QueryEngine {
    /// Creates the engine's evaluation context over `tree`.
    #[must_use]
    pub fn bind(tree: &Tree) -> Self {
        Self {
            context: Some(EvalContext::new(tree)),
            retained: None,
        }
    }

    /// Registers a prefix for use in later expressions.
    ///
    /// # Errors
    ///
    /// Returns [`NamespaceError`] if the pair is rejected or the engine has
    /// been torn down.
    pub fn register_namespace(&mut self, prefix: &str, uri: &str) -> Result<(), NamespaceError> {
        let Some(context) = self.context.as_mut() else {
            return Err(NamespaceError {
                prefix: prefix.to_owned(),
                uri: uri.to_owned(),
                reason: "evaluation context has been released",
            });
        };
        context.register_ns(prefix, uri)
    }

    /// Evaluates `expr` at `context` and returns the matched nodes in
    /// document order.
    ///
    /// An absent context node returns an empty sequence without touching the
    /// retained result. Results that are not node-sets, and attribute
    /// matches, contribute no nodes; use
    /// [`evaluate_value`](Self::evaluate_value) for those.
    ///
    /// # Errors
    ///
    /// Returns [`XPathError`] if evaluation fails or the engine has been
    /// torn down.
    pub fn evaluate(
        &mut self,
        context: Option<NodeId>,
        expr: &CompiledExpr,
        tree: &Tree,
    ) -> Result<Vec<NodeId>, XPathError> {
        let Some(node) = context else {
            return Ok(Vec::new());
        };
        let result = self.run(node, expr, tree)?;
        Ok(result.node_ids())
    }

    /// Evaluates `expr` at `context` and returns its full value.
    ///
    /// An absent context node yields an empty node-set.
    ///
    /// # Errors
    ///
    /// Same as [`evaluate`](Self::evaluate).
    pub fn evaluate_value(
        &mut self,
        context: Option<NodeId>,
        expr: &CompiledExpr,
        tree: &Tree,
    ) -> Result<XPathValue, XPathError> {
        let Some(node) = context else {
            return Ok(XPathValue::NodeSet(Vec::new()));
        };
        let result = self.run(node, expr, tree)?;
        Ok(result.value().clone())
    }

    fn run(
        &mut self,
        node: NodeId,
        expr: &CompiledExpr,
        tree: &Tree,
    ) -> Result<&XPathObject, XPathError> {
        let context = self.context.as_mut().ok_or(XPathError::ContextReleased)?;
        if let Some(previous) = self.retained.take() {
            previous.free();
        }
        context.set_node(Some(node));
        trace!(expr = expr.source(), node = node.into_raw(), "evaluating");
        let result = compiled_eval(expr, context, tree)?;
        Ok(self.retained.insert(result))
    }

    /// The result of the most recent successful evaluation.
    #[must_use]
    pub fn retained(&self) -> Option<&XPathObject> {
        self.retained.as_ref()
    }

    /// Frees the retained result and the evaluation context. Idempotent.
    pub fn teardown(&mut self) {
        if let Some(result) = self.retained.take() {
            result.free();
        }
        if let Some(context) = self.context.take() {
            context.free();
            debug!("query engine torn down");
        }
    }

    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.context.is_none()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::parser::{parse_document, ParseOptions};
    use crate::xpath::compile;

    fn doc(xml: &str) -> Tree {
        parse_document(xml.as_bytes(), None, None, ParseOptions::DEFAULT, Arc::default()).unwrap()
    }

    #[test]
    fn test_one_result_retained() {
        let tree = doc("<r><a><b/></a><a><b/><b/></a></r>");
        let counters = Arc::clone(tree.counters());
        let mut engine = QueryEngine::bind(&tree);
        let expr = compile("b").unwrap();
        let parents: Vec<NodeId> = tree.children(tree.root_element().unwrap()).collect();

        let first = engine.evaluate(Some(parents[0]), &expr, &tree).unwrap();
        assert_eq!(first.len(), 1);
        let second = engine.evaluate(Some(parents[1]), &expr, &tree).unwrap();
        assert_eq!(second.len(), 2);
        assert!(second.iter().all(|b| tree.parent(*b) == Some(parents[1])));

        let snap = counters.snapshot();
        assert_eq!(snap.results_created, 2);
        assert_eq!(snap.live_results(), 1);

        engine.teardown();
        assert!(engine.is_torn_down());
        assert_eq!(counters.snapshot().live_results(), 0);
    }

    #[test]
    fn test_absent_context_keeps_retained_result() {
        let tree = doc("<r><a/></r>");
        let mut engine = QueryEngine::bind(&tree);
        let expr = compile("//a").unwrap();
        engine.evaluate(Some(tree.root()), &expr, &tree).unwrap();
        assert!(engine.evaluate(None, &expr, &tree).unwrap().is_empty());
        assert_eq!(engine.retained().unwrap().node_ids().len(), 1);
        assert_eq!(tree.counters().snapshot().results_created, 1);
    }

    #[test]
    fn test_no_match_and_scalar_results() {
        let tree = doc("<r><a/><a/></r>");
        let mut engine = QueryEngine::bind(&tree);
        let root = tree.root_element();
        assert!(engine
            .evaluate(root, &compile("missing").unwrap(), &tree)
            .unwrap()
            .is_empty());
        assert!(engine
            .evaluate(root, &compile("count(a)").unwrap(), &tree)
            .unwrap()
            .is_empty());
        assert_eq!(
            engine
                .evaluate_value(root, &compile("count(a)").unwrap(), &tree)
                .unwrap(),
            XPathValue::Number(2.0)
        );
    }

    #[test]
    fn test_register_namespace_is_idempotent() {
        let tree = doc("<r xmlns:x='urn:x'><x:a/></r>");
        let mut engine = QueryEngine::bind(&tree);
        let expr = compile("//p:a").unwrap();
        engine.register_namespace("p", "urn:x").unwrap();
        let once = engine.evaluate(Some(tree.root()), &expr, &tree).unwrap();
        engine.register_namespace("p", "urn:x").unwrap();
        let twice = engine.evaluate(Some(tree.root()), &expr, &tree).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once.len(), 1);
        assert!(engine.register_namespace("p", "bad uri").is_err());
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let tree = doc("<r/>");
        let counters = Arc::clone(tree.counters());
        let mut engine = QueryEngine::bind(&tree);
        engine.teardown();
        engine.teardown();
        let snap = counters.snapshot();
        assert_eq!(snap.contexts_created, 1);
        assert_eq!(snap.contexts_freed, 1);

        let expr = compile("/r").unwrap();
        assert_eq!(
            engine.evaluate(Some(tree.root()), &expr, &tree).unwrap_err(),
            XPathError::ContextReleased
        );
        assert!(engine.register_namespace("p", "urn:p").is_err());
    }
}
