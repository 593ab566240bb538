//! Documents: node ownership, fragments, queries and teardown.
//!
//! A [`Document`] owns one [`Tree`], one [`QueryEngine`] bound to it, the
//! set of nodes that were detached but not yet freed, and the fragments it
//! parsed. Every node handle that ever leaves the tree is accounted for in
//! exactly one place: attached somewhere in the tree, in the tracked set, or
//! already freed.
//!
//! # Teardown
//!
//! [`Document::teardown`] runs in a fixed order:
//!
//! 1. Fragments are released. Their still-detached children join the
//!    tracked set.
//! 2. Every tracked node is freed once, together with its subtree.
//! 3. The query engine frees its retained result and its context.
//! 4. The tree is released. Anything still live at that point was created
//!    and never attached nor tracked; it is swept and reported as dangling.
//!
//! Dropping a document without calling `teardown` performs the same steps.
//!
//! # Examples
//!
//! ```
//! use xmlward::Document;
//!
//! let mut doc = Document::parse_str("<root><child/></root>").unwrap();
//! let hits = doc.query("/root/child").unwrap();
//! assert_eq!(hits.len(), 1);
//! assert_eq!(hits[0].name(), Some("child"));
//!
//! let report = doc.teardown();
//! assert!(report.counters.is_balanced());
//! ```

mod fragment;
mod node_ref;
mod options;
mod profile;

pub use fragment::{parse_fragment_standalone, Fragment, FragmentId, FRAGMENT_WRAPPER};
pub use node_ref::NodeRef;
pub use options::DEFAULT_ENCODING;
pub use profile::{OpProfile, OpStats};

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, trace, warn};

use crate::error::{DocumentError, NamespaceError, ParseDiagnostic};
use crate::parser::{input::split_name, parse_document, ParseOptions};
use crate::query::QueryEngine;
use crate::tree::{AllocCounters, CounterSnapshot, DocumentKind, NodeId, NodeKind, Tree, TreeError};
use crate::xpath::{compile, CompiledExpr, XPathError, XPathValue};

/// What [`Document::teardown`] freed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeardownReport {
    /// Fragments released.
    pub fragments: usize,
    /// Distinct tracked handles freed.
    pub tracked_roots: usize,
    /// Nodes freed through the tracked set, subtrees included.
    pub tracked_nodes: usize,
    /// Nodes freed with the tree, the document node included.
    pub tree_nodes: usize,
    /// Nodes that were neither attached nor tracked.
    pub dangling: usize,
    /// Allocation counters after teardown.
    pub counters: CounterSnapshot,
}

/// An XML document and everything it owns.
#[derive(Debug)]
pub struct Document {
    tree: Tree,
    engine: QueryEngine,
    tracked: BTreeSet<NodeId>,
    fragments: Vec<Fragment>,
    next_fragment: u32,
    input_encoding: String,
    output_encoding: String,
    input_len: usize,
    source_url: Option<String>,
    profile: OpProfile,
    torn_down: bool,
}

impl Document {
    fn from_tree(
        tree: Tree,
        input_len: usize,
        input_encoding: Option<&str>,
        output_encoding: Option<&str>,
    ) -> Self {
        let engine = QueryEngine::bind(&tree);
        Self {
            tree,
            engine,
            tracked: BTreeSet::new(),
            fragments: Vec::new(),
            next_fragment: 0,
            input_encoding: options::encoding_or_default(input_encoding),
            output_encoding: options::encoding_or_default(output_encoding),
            input_len,
            source_url: None,
            profile: OpProfile::new(),
            torn_down: false,
        }
    }

    /// Parses `content` into a new document.
    ///
    /// Empty content is not an error: it produces an empty document, exactly
    /// as [`create_empty`](Self::create_empty) would. `input_encoding` is
    /// passed to the parser only when given; either encoding defaults to
    /// [`DEFAULT_ENCODING`] in the document's metadata.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::ParseFailure`] when non-empty content does
    /// not yield a usable tree.
    pub fn parse(
        content: &[u8],
        url: Option<&str>,
        input_encoding: Option<&str>,
        output_encoding: Option<&str>,
        options: ParseOptions,
    ) -> Result<Self, DocumentError> {
        Self::parse_with_counters(
            content,
            url,
            input_encoding,
            output_encoding,
            options,
            Arc::default(),
        )
    }

    /// Like [`parse`](Self::parse), with allocation counters supplied by the
    /// caller. Several documents may share one set of counters.
    ///
    /// # Errors
    ///
    /// Same as [`parse`](Self::parse).
    pub fn parse_with_counters(
        content: &[u8],
        url: Option<&str>,
        input_encoding: Option<&str>,
        output_encoding: Option<&str>,
        options: ParseOptions,
        counters: Arc<AllocCounters>,
    ) -> Result<Self, DocumentError> {
        let started = Instant::now();
        let tree = if content.is_empty() {
            Tree::new(DocumentKind::Xml, counters)
        } else {
            parse_document(content, url, input_encoding, options, counters)
                .map_err(DocumentError::ParseFailure)?
        };
        let mut doc = Self::from_tree(tree, content.len(), input_encoding, output_encoding);
        doc.source_url = url.map(str::to_owned);
        doc.profile.record("parse", started.elapsed());
        debug!(
            url = url.unwrap_or("-"),
            bytes = content.len(),
            nodes = doc.tree.live_count(),
            "document parsed"
        );
        Ok(doc)
    }

    /// Parses a string with [`ParseOptions::DEFAULT`] and default encodings.
    ///
    /// # Errors
    ///
    /// Same as [`parse`](Self::parse).
    pub fn parse_str(content: &str) -> Result<Self, DocumentError> {
        Self::parse(content.as_bytes(), None, None, None, ParseOptions::DEFAULT)
    }

    /// Creates a document holding only a document node.
    #[must_use]
    pub fn create_empty(input_encoding: Option<&str>, output_encoding: Option<&str>) -> Self {
        let tree = Tree::new(DocumentKind::Xml, Arc::default());
        Self::from_tree(tree, 0, input_encoding, output_encoding)
    }

    /// Creates an empty document flagged as HTML.
    #[must_use]
    pub fn create_empty_html(input_encoding: Option<&str>, output_encoding: Option<&str>) -> Self {
        let tree = Tree::new(DocumentKind::Html, Arc::default());
        Self::from_tree(tree, 0, input_encoding, output_encoding)
    }

    // --- Metadata ---

    #[must_use]
    pub fn input_encoding(&self) -> &str {
        &self.input_encoding
    }

    #[must_use]
    pub fn output_encoding(&self) -> &str {
        &self.output_encoding
    }

    #[must_use]
    pub fn kind(&self) -> DocumentKind {
        self.tree.kind()
    }

    /// Length in bytes of the content this document was parsed from.
    #[must_use]
    pub fn input_len(&self) -> usize {
        self.input_len
    }

    #[must_use]
    pub fn source_url(&self) -> Option<&str> {
        self.source_url.as_deref()
    }

    /// Parser diagnostics, fragment parses included.
    #[must_use]
    pub fn diagnostics(&self) -> &[ParseDiagnostic] {
        &self.tree.diagnostics
    }

    /// Read access to the underlying tree.
    #[must_use]
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// The allocation counters shared with the tree.
    #[must_use]
    pub fn counters(&self) -> Arc<AllocCounters> {
        Arc::clone(self.tree.counters())
    }

    #[must_use]
    pub fn profile(&self) -> &OpProfile {
        &self.profile
    }

    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    #[must_use]
    pub fn is_tracked(&self, id: NodeId) -> bool {
        self.tracked.contains(&id)
    }

    #[must_use]
    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    // --- Node access ---

    /// The root element, looked up afresh on every call.
    #[must_use]
    pub fn root(&self) -> Option<NodeRef<'_>> {
        self.tree.root_element().map(|id| NodeRef::new(self, id))
    }

    /// A view of `id`, or `None` if it is not live in this document.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<NodeRef<'_>> {
        self.tree.is_live(id).then(|| NodeRef::new(self, id))
    }

    // --- Node creation ---
    //
    // Created nodes are detached and untracked. Attach them with
    // `append_child`/`insert_before`, or hand them to `track_detached`.
    // Otherwise they are swept as dangling at teardown, and the report and
    // log say so.

    /// Creates a detached element. A `prefix:local` tag keeps its prefix but
    /// is not bound to a namespace.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        let started = Instant::now();
        let (prefix, local) = split_name(tag);
        let kind = NodeKind::Element {
            name: local.to_owned(),
            prefix: prefix.map(str::to_owned),
            namespace: None,
            attributes: Vec::new(),
            namespace_decls: Vec::new(),
        };
        let id = self.tree.create_node(kind);
        self.profile.record("create_element", started.elapsed());
        id
    }

    /// Creates a detached text node.
    pub fn create_text(&mut self, data: &str) -> NodeId {
        self.create("create_text", NodeKind::text(data))
    }

    /// Creates a detached CDATA section.
    pub fn create_cdata(&mut self, data: &str) -> NodeId {
        self.create(
            "create_cdata",
            NodeKind::CData {
                content: data.to_owned(),
            },
        )
    }

    /// Creates a detached comment.
    pub fn create_comment(&mut self, data: &str) -> NodeId {
        self.create(
            "create_comment",
            NodeKind::Comment {
                content: data.to_owned(),
            },
        )
    }

    fn create(&mut self, op: &'static str, kind: NodeKind) -> NodeId {
        let tree = &mut self.tree;
        self.profile.time(op, || tree.create_node(kind))
    }

    // --- Mutation ---

    /// Appends a detached node under `parent`. A tracked node stops being
    /// tracked once attached.
    ///
    /// # Errors
    ///
    /// Fails if either handle is stale, if `child` is the document node or
    /// still attached, or if the move would create a cycle.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DocumentError> {
        let started = Instant::now();
        self.tree.append_child(parent, child)?;
        self.tracked.remove(&child);
        self.profile.record("append_child", started.elapsed());
        Ok(())
    }

    /// Inserts a detached node before `reference`. A tracked node stops
    /// being tracked once attached.
    ///
    /// # Errors
    ///
    /// Same as [`append_child`](Self::append_child), and
    /// [`DocumentError::DocumentNode`] when `reference` has no parent.
    pub fn insert_before(
        &mut self,
        reference: NodeId,
        new_child: NodeId,
    ) -> Result<(), DocumentError> {
        let started = Instant::now();
        self.tree.insert_before(reference, new_child)?;
        self.tracked.remove(&new_child);
        self.profile.record("insert_before", started.elapsed());
        Ok(())
    }

    /// Detaches `id` from its parent and tracks it for freeing at teardown.
    ///
    /// # Errors
    ///
    /// Fails if `id` is stale or is the document node.
    pub fn unlink(&mut self, id: NodeId) -> Result<(), DocumentError> {
        let started = Instant::now();
        self.tree.check(id)?;
        if id == self.tree.root() {
            return Err(DocumentError::DocumentNode(id));
        }
        self.tree.unlink(id)?;
        self.tracked.insert(id);
        self.profile.record("unlink", started.elapsed());
        Ok(())
    }

    /// Registers a detached node to be freed at teardown. Tracking the same
    /// node twice has no further effect.
    ///
    /// # Errors
    ///
    /// Fails for a stale handle, the document node, or a node that still has
    /// a parent.
    pub fn track_detached(&mut self, id: NodeId) -> Result<(), DocumentError> {
        self.tree.check(id)?;
        if id == self.tree.root() {
            return Err(DocumentError::DocumentNode(id));
        }
        if self.tree.parent(id).is_some() {
            return Err(DocumentError::StillAttached(id));
        }
        if self.tracked.insert(id) {
            trace!(node = id.into_raw(), "tracking detached node");
        }
        Ok(())
    }

    // --- Fragments ---

    /// Parses a snippet of sibling nodes into a new fragment of this
    /// document, using the root element (if any) as namespace context.
    ///
    /// Empty content returns `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::FragmentParseFailure`] if the snippet cannot
    /// be parsed. No fragment is recorded and no node is left behind.
    pub fn parse_fragment(
        &mut self,
        content: &[u8],
        url: Option<&str>,
        options: ParseOptions,
    ) -> Result<Option<FragmentId>, DocumentError> {
        if content.is_empty() {
            return Ok(None);
        }
        let started = Instant::now();
        let id = FragmentId(self.next_fragment);
        let context = self.tree.root_element();
        let fragment = fragment::build(
            &mut self.tree,
            id,
            context,
            content,
            url,
            Some(self.input_encoding.as_str()),
            options,
        )?;
        self.next_fragment += 1;
        self.tree
            .diagnostics
            .extend(fragment.diagnostics().iter().cloned());
        self.fragments.push(fragment);
        self.profile.record("parse_fragment", started.elapsed());
        Ok(Some(id))
    }

    #[must_use]
    pub fn fragment(&self, id: FragmentId) -> Option<&Fragment> {
        self.fragments.iter().find(|f| f.id() == id)
    }

    /// Views of a fragment's children that are still live.
    #[must_use]
    pub fn fragment_nodes(&self, id: FragmentId) -> Vec<NodeRef<'_>> {
        self.fragment(id)
            .map(|f| f.children().iter().filter_map(|&c| self.node(c)).collect())
            .unwrap_or_default()
    }

    /// Releases a fragment now instead of at teardown. Its detached children
    /// join the tracked set. Returns false for an unknown id.
    pub fn remove_fragment(&mut self, id: FragmentId) -> bool {
        let Some(pos) = self.fragments.iter().position(|f| f.id() == id) else {
            return false;
        };
        let fragment = self.fragments.remove(pos);
        let handed = fragment.release(&self.tree, &mut self.tracked);
        debug!(%id, handed, "fragment removed");
        true
    }

    // --- Queries ---

    /// Binds a prefix for later expressions.
    ///
    /// # Errors
    ///
    /// Returns [`NamespaceError`] if the pair is rejected. The document is
    /// unaffected; the caller decides whether that matters.
    pub fn register_namespace(&mut self, prefix: &str, uri: &str) -> Result<(), NamespaceError> {
        let engine = &mut self.engine;
        self.profile
            .time("register_namespace", || engine.register_namespace(prefix, uri))
    }

    /// Evaluates a compiled expression at `context` and returns the matched
    /// nodes in document order. An absent context yields no nodes.
    ///
    /// # Errors
    ///
    /// Returns [`XPathError`] if evaluation fails.
    pub fn evaluate(
        &mut self,
        context: Option<NodeId>,
        expr: &CompiledExpr,
    ) -> Result<Vec<NodeId>, XPathError> {
        let (engine, tree) = (&mut self.engine, &self.tree);
        self.profile
            .time("evaluate", || engine.evaluate(context, expr, tree))
    }

    /// Evaluates a compiled expression and returns its full value.
    ///
    /// # Errors
    ///
    /// Returns [`XPathError`] if evaluation fails.
    pub fn evaluate_value(
        &mut self,
        context: Option<NodeId>,
        expr: &CompiledExpr,
    ) -> Result<XPathValue, XPathError> {
        let (engine, tree) = (&mut self.engine, &self.tree);
        self.profile
            .time("evaluate_value", || engine.evaluate_value(context, expr, tree))
    }

    /// Compiles `expression` and evaluates it at the document node.
    ///
    /// # Errors
    ///
    /// Returns [`XPathError`] if the expression is malformed or evaluation
    /// fails.
    pub fn query(&mut self, expression: &str) -> Result<Vec<NodeRef<'_>>, XPathError> {
        let expr = compile(expression)?;
        let ids = self.evaluate(Some(self.tree.root()), &expr)?;
        let doc = &*self;
        Ok(ids.into_iter().map(|id| NodeRef::new(doc, id)).collect())
    }

    // --- Teardown ---

    /// Frees everything the document owns, in order. See the module
    /// documentation.
    pub fn teardown(mut self) -> TeardownReport {
        self.release()
    }

    fn release(&mut self) -> TeardownReport {
        self.torn_down = true;

        let fragments = std::mem::take(&mut self.fragments);
        let fragment_count = fragments.len();
        for fragment in fragments {
            fragment.release(&self.tree, &mut self.tracked);
        }

        let mut tracked_roots = 0;
        let mut tracked_nodes = 0;
        for id in std::mem::take(&mut self.tracked) {
            match self.tree.free_node(id) {
                Ok(n) => {
                    tracked_roots += 1;
                    tracked_nodes += n;
                }
                // Reattached behind our back; the tree frees it.
                Err(TreeError::StillAttached(_)) => {}
                Err(err) => warn!(node = id.into_raw(), %err, "tracked node not freed"),
            }
        }

        self.engine.teardown();

        let released = self.tree.release();
        if released.dangling > 0 {
            warn!(
                dangling = released.dangling,
                "nodes created but never attached or tracked were swept"
            );
        }

        let report = TeardownReport {
            fragments: fragment_count,
            tracked_roots,
            tracked_nodes,
            tree_nodes: released.reachable,
            dangling: released.dangling,
            counters: self.tree.counters().snapshot(),
        };
        debug!(
            fragments = report.fragments,
            tracked = report.tracked_nodes,
            tree = report.tree_nodes,
            dangling = report.dangling,
            balanced = report.counters.is_balanced(),
            "document torn down"
        );
        if !self.profile.is_empty() {
            debug!(profile = %self.profile, "operation profile");
        }
        report
    }
}

impl Drop for Document {
    fn drop(&mut self) {
        if !self.torn_down {
            self.release();
        }
    }
}
