//! `XPath` 1.0 query language implementation.
//!
//! This module provides an implementation of the `XPath` 1.0 specification
//! (<https://www.w3.org/TR/xpath-10/>) over a [`Tree`]: expressions are
//! compiled once into a [`CompiledExpr`] and evaluated any number of times
//! through an [`EvalContext`], producing an [`XPathObject`].
//!
//! Contexts and result objects are counted in the tree's allocation
//! counters, so a caller that leaks either shows up as unbalanced.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use xmlward::parser::{parse_document, ParseOptions};
//! use xmlward::xpath::{compile, compiled_eval, EvalContext};
//!
//! let tree = parse_document(
//!     b"<root><a>1</a><b>2</b></root>",
//!     None,
//!     None,
//!     ParseOptions::DEFAULT,
//!     Arc::default(),
//! )
//! .unwrap();
//! let expr = compile("/root/*").unwrap();
//! let ctx = EvalContext::new(&tree);
//! let result = compiled_eval(&expr, &ctx, &tree).unwrap();
//! assert_eq!(result.node_ids().len(), 2);
//! ```
//!
//! # Known Limitations
//!
//! - The `namespace::` axis is always empty; namespace nodes are not
//!   materialized.
//!
//! # Submodules
//!
//! - [`ast`]: Abstract syntax tree types for parsed `XPath` expressions.
//! - [`lexer`]: Tokenizer for `XPath` expression strings.
//! - [`types`]: `XPath` value types and conversions.
//! - [`parser`]: Recursive descent parser producing [`CompiledExpr`].
//! - [`context`]: Evaluation contexts and result objects.
//! - [`eval`]: Expression evaluator against a tree.

pub mod ast;
pub mod context;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod types;

pub use context::{EvalContext, XPathObject};
pub use eval::compiled_eval;
pub use parser::{compile, CompiledExpr, MAX_EXPR_DEPTH};
pub use types::{XPathError, XPathNode, XPathValue};

use crate::tree::{NodeId, Tree};

/// Compiles and evaluates an expression in one call, at `context_node`.
///
/// The temporary context and result object are freed before returning. For
/// repeated queries, compile once and use [`compiled_eval`].
///
/// # Errors
///
/// Returns [`XPathError`] if the expression is malformed or evaluation fails.
pub fn evaluate(
    tree: &Tree,
    context_node: NodeId,
    expression: &str,
) -> Result<XPathValue, XPathError> {
    let expr = compile(expression)?;
    let mut ctx = EvalContext::new(tree);
    ctx.set_node(Some(context_node));
    let result = compiled_eval(&expr, &ctx, tree)?;
    Ok(result.value().clone())
}
