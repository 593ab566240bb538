//! # xmlward
//!
//! XML documents whose nodes are freed explicitly and accounted for exactly
//! once. A [`Document`] owns an explicit-free node heap, the nodes detached
//! from it, the fragments parsed into it and an `XPath` 1.0 query engine
//! bound to it; tearing the document down frees all of it in a fixed order.
//!
//! ## Quick Start
//!
//! ```
//! use xmlward::{Document, ParseOptions};
//!
//! let mut doc = Document::parse_str("<root><child/></root>").unwrap();
//! assert_eq!(doc.root().and_then(|r| r.name()), Some("root"));
//!
//! // Detach a node: the document tracks it and frees it at teardown.
//! let child = doc.query("/root/child").unwrap()[0].id();
//! doc.unlink(child).unwrap();
//!
//! // Parse a forest of siblings into detached nodes.
//! let frag = doc.parse_fragment(b"<a/><b/>text", None, ParseOptions::DEFAULT).unwrap();
//! assert_eq!(doc.fragment(frag.unwrap()).unwrap().len(), 3);
//!
//! let report = doc.teardown();
//! assert!(report.counters.is_balanced());
//! ```
//!
//! ## Layers
//!
//! - [`tree`], [`parser`] and [`xpath`] are the native engine: a node heap
//!   with explicit frees and allocation counters, an XML parser building
//!   into it, and compiled `XPath` evaluation.
//! - [`query`] and [`document`] manage ownership on top of it.

pub mod document;
pub mod encoding;
pub mod error;
pub mod parser;
pub mod query;
pub mod tree;
pub mod xpath;

// Re-export primary types at the crate root for convenience.
pub use document::{Document, Fragment, FragmentId, NodeRef, TeardownReport};
pub use error::{DocumentError, NamespaceError, ParseError};
pub use parser::ParseOptions;
pub use tree::{NodeId, Tree};
