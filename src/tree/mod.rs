//! Explicit-free node heap.
//!
//! Nodes live in a `Vec` of slots owned by the [`Tree`] and are referenced by
//! [`NodeId`], a newtype over `NonZeroU32`. Unlike a plain arena, nodes are
//! released explicitly: [`Tree::free_node`] turns a detached subtree's slots
//! into tombstones, and a later free of the same handle is reported as
//! [`TreeError::DoubleFree`] instead of corrupting anything. Slots are never
//! reused, so a stale handle can never alias a newer node.
//!
//! # Architecture
//!
//! All navigation links (parent, `first_child`, `last_child`, `next_sibling`,
//! `prev_sibling`) are slot indices. The tree tracks nothing about ownership
//! beyond parent links: a node with no parent is either the document node, a
//! detached node someone else has promised to free, or a leak. Deciding which
//! is the caller's job; [`Tree::release`] reclaims whatever is left and
//! reports how much of it was never attached anywhere.

mod counters;
mod node;

pub use counters::{AllocCounters, CounterSnapshot};
pub use node::{Attribute, NamespaceDecl, NodeKind};

use std::cmp::Ordering;
use std::fmt;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
use std::sync::Arc;

use crate::error::ParseDiagnostic;

/// Namespace URI permanently bound to the `xml` prefix.
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Source of tree tags. Tag 0 is never issued.
static NEXT_TREE_TAG: AtomicU32 = AtomicU32::new(1);

/// A typed index into a tree's node heap.
///
/// A handle carries the slot number and the tag of the tree that issued it,
/// so a handle from one document is never mistaken for a node of another.
/// `Option<NodeId>` has the same size as `NodeId`. A handle stays valid only
/// while its slot is live; after the node is freed every access through the
/// owning document reports it as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    tree: u32,
    slot: NonZeroU32,
}

impl NodeId {
    /// Creates a `NodeId` for slot `index` of the tree tagged `tree`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is 0.
    #[allow(clippy::expect_used, clippy::cast_possible_truncation)]
    fn from_index(tree: u32, index: usize) -> Self {
        Self {
            tree,
            slot: NonZeroU32::new(index as u32).expect("NodeId index must be non-zero"),
        }
    }

    fn as_index(self) -> usize {
        self.slot.get() as usize
    }

    /// Returns the raw slot number. Always non-zero.
    #[must_use]
    pub fn into_raw(self) -> u32 {
        self.slot.get()
    }

    /// Creates a `NodeId` from a raw slot number, if non-zero.
    ///
    /// The handle belongs to no tree: every tree reports it as out of range.
    #[must_use]
    pub fn from_raw(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(|slot| Self { tree: 0, slot })
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.slot)
    }
}

/// Whether a tree was created as an XML or an HTML document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DocumentKind {
    /// An XML document.
    #[default]
    Xml,
    /// An HTML document. Only empty HTML documents can be created.
    Html,
}

/// Storage for a single live node.
#[derive(Debug, Clone)]
pub struct NodeData {
    /// What kind of node this is and its payload.
    pub kind: NodeKind,
    /// Parent node, if any.
    pub parent: Option<NodeId>,
    /// First child node.
    pub first_child: Option<NodeId>,
    /// Last child node (for O(1) append).
    pub last_child: Option<NodeId>,
    /// Next sibling.
    pub next_sibling: Option<NodeId>,
    /// Previous sibling.
    pub prev_sibling: Option<NodeId>,
}

impl NodeData {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            first_child: None,
            last_child: None,
            next_sibling: None,
            prev_sibling: None,
        }
    }
}

#[derive(Debug)]
enum Slot {
    /// Index 0, never handed out.
    Reserved,
    Live(NodeData),
    Freed,
}

/// Errors from heap operations on a [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeError {
    /// The handle refers to a slot that has been freed.
    Freed(NodeId),
    /// A free was attempted on a slot that is already freed.
    DoubleFree(NodeId),
    /// The handle does not refer to any slot of this tree.
    OutOfRange(NodeId),
    /// The node still has a parent.
    StillAttached(NodeId),
    /// The operation is not allowed on the document node.
    DocumentNode(NodeId),
    /// Attaching `child` under `parent` would make `child` its own ancestor.
    Cycle {
        /// The intended parent.
        parent: NodeId,
        /// The node being attached.
        child: NodeId,
    },
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Freed(id) => write!(f, "node {id} has been freed"),
            Self::DoubleFree(id) => write!(f, "node {id} freed twice"),
            Self::OutOfRange(id) => write!(f, "node {id} does not belong to this tree"),
            Self::StillAttached(id) => write!(f, "node {id} is still attached"),
            Self::DocumentNode(id) => write!(f, "node {id} is the document node"),
            Self::Cycle { parent, child } => {
                write!(f, "node {child} is an ancestor of node {parent}")
            }
        }
    }
}

impl std::error::Error for TreeError {}

/// Outcome of [`Tree::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReleaseReport {
    /// Nodes freed because they were reachable from the document node.
    pub reachable: usize,
    /// Nodes that were live but reachable from nowhere.
    pub dangling: usize,
}

/// The node heap of one document.
///
/// Read access goes through `&Tree`, mutation through `&mut Tree`. Accessors
/// such as [`node`](Tree::node) panic on a handle that is not live; callers
/// holding handles from outside should validate them with
/// [`check`](Tree::check) first.
#[derive(Debug)]
pub struct Tree {
    tag: u32,
    slots: Vec<Slot>,
    root: NodeId,
    kind: DocumentKind,
    live: usize,
    released: bool,
    counters: Arc<AllocCounters>,
    /// XML version from the XML declaration (e.g., "1.0").
    pub version: Option<String>,
    /// Encoding named by the XML declaration, if any.
    pub declared_encoding: Option<String>,
    /// Standalone flag from the XML declaration.
    pub standalone: Option<bool>,
    /// Diagnostics collected during parsing.
    pub diagnostics: Vec<ParseDiagnostic>,
}

impl Tree {
    /// Creates a tree holding only a document node.
    #[must_use]
    pub fn new(kind: DocumentKind, counters: Arc<AllocCounters>) -> Self {
        let mut slots = Vec::with_capacity(64);
        slots.push(Slot::Reserved);
        slots.push(Slot::Live(NodeData::new(NodeKind::Document)));
        counters.node_allocated();
        let tag = NEXT_TREE_TAG.fetch_add(1, AtomicOrdering::Relaxed);
        Self {
            tag,
            slots,
            root: NodeId::from_index(tag, 1),
            kind,
            live: 1,
            released: false,
            counters,
            version: None,
            declared_encoding: None,
            standalone: None,
            diagnostics: Vec::new(),
        }
    }

    /// Returns the document node.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Returns whether this tree is an XML or HTML document.
    #[must_use]
    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    /// Returns the shared allocation counters.
    #[must_use]
    pub fn counters(&self) -> &Arc<AllocCounters> {
        &self.counters
    }

    /// Number of live slots, including the document node.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Returns true once [`release`](Tree::release) has run.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Returns the first element child of the document node.
    #[must_use]
    pub fn root_element(&self) -> Option<NodeId> {
        if self.released {
            return None;
        }
        self.children(self.root)
            .find(|&id| matches!(self.node(id).kind, NodeKind::Element { .. }))
    }

    // --- Slot access ---

    fn slot(&self, id: NodeId) -> Option<&Slot> {
        if id.tree == self.tag {
            self.slots.get(id.as_index())
        } else {
            None
        }
    }

    /// Verifies that `id` refers to a live node of this tree.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::OutOfRange`] if the handle was issued by another
    /// tree or the slot never existed, and [`TreeError::Freed`] if it has
    /// been freed.
    pub fn check(&self, id: NodeId) -> Result<(), TreeError> {
        match self.slot(id) {
            Some(Slot::Live(_)) => Ok(()),
            Some(Slot::Freed) => Err(TreeError::Freed(id)),
            Some(Slot::Reserved) | None => Err(TreeError::OutOfRange(id)),
        }
    }

    /// Returns true if `id` refers to a live node of this tree.
    #[must_use]
    pub fn is_live(&self, id: NodeId) -> bool {
        self.check(id).is_ok()
    }

    /// Returns the node data if `id` is live.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&NodeData> {
        match self.slot(id) {
            Some(Slot::Live(data)) => Some(data),
            _ => None,
        }
    }

    /// Returns the node data for a live node.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not live in this tree.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &NodeData {
        match self.slot(id) {
            Some(Slot::Live(data)) => data,
            _ => panic!("node {id} is not live"),
        }
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut NodeData {
        assert_eq!(id.tree, self.tag, "node {id} belongs to another tree");
        match &mut self.slots[id.as_index()] {
            Slot::Live(data) => data,
            _ => panic!("node {id} is not live"),
        }
    }

    // --- Node properties ---

    /// Returns the local name of an element or the target of a PI.
    #[must_use]
    pub fn node_name(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Element { name, .. }
            | NodeKind::ProcessingInstruction { target: name, .. }
            | NodeKind::DocumentType { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Returns `prefix:name` for elements, the plain name otherwise.
    #[must_use]
    pub fn qualified_name(&self, id: NodeId) -> Option<String> {
        match &self.node(id).kind {
            NodeKind::Element {
                name,
                prefix: Some(p),
                ..
            } => Some(format!("{p}:{name}")),
            _ => self.node_name(id).map(str::to_owned),
        }
    }

    /// Returns the namespace URI of an element, if any.
    #[must_use]
    pub fn node_namespace(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Element { namespace, .. } => namespace.as_deref(),
            _ => None,
        }
    }

    /// Returns the namespace prefix of an element, if any.
    #[must_use]
    pub fn node_prefix(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Element { prefix, .. } => prefix.as_deref(),
            _ => None,
        }
    }

    /// Returns the content of a text, CDATA, comment or PI node.
    #[must_use]
    pub fn node_text(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Text { content }
            | NodeKind::Comment { content }
            | NodeKind::CData { content } => Some(content),
            NodeKind::ProcessingInstruction { data, .. } => data.as_deref(),
            _ => None,
        }
    }

    /// Returns the concatenated text of a node and all its descendants.
    #[must_use]
    pub fn text_content(&self, id: NodeId) -> String {
        match &self.node(id).kind {
            NodeKind::Text { content }
            | NodeKind::CData { content }
            | NodeKind::Comment { content } => content.clone(),
            NodeKind::ProcessingInstruction { data, .. } => data.clone().unwrap_or_default(),
            _ => {
                let mut buf = String::new();
                for d in self.descendants(id) {
                    if let NodeKind::Text { content } | NodeKind::CData { content } =
                        &self.node(d).kind
                    {
                        buf.push_str(content);
                    }
                }
                buf
            }
        }
    }

    /// Returns the attributes of an element, or an empty slice.
    #[must_use]
    pub fn attributes(&self, id: NodeId) -> &[Attribute] {
        match &self.node(id).kind {
            NodeKind::Element { attributes, .. } => attributes,
            _ => &[],
        }
    }

    /// Returns an attribute value by qualified name (`href`, `xlink:href`).
    #[must_use]
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attributes(id)
            .iter()
            .find(|a| {
                let (prefix, local) = match name.split_once(':') {
                    Some((p, l)) => (Some(p), l),
                    None => (None, name),
                };
                a.name == local && a.prefix.as_deref() == prefix
            })
            .map(|a| a.value.as_str())
    }

    /// Returns an attribute value by local name and namespace URI.
    #[must_use]
    pub fn attribute_ns(&self, id: NodeId, local: &str, namespace: Option<&str>) -> Option<&str> {
        self.attributes(id)
            .iter()
            .find(|a| a.name == local && a.namespace.as_deref() == namespace)
            .map(|a| a.value.as_str())
    }

    /// Collects the namespace bindings in scope at `id`, nearest first.
    ///
    /// Each prefix appears once, bound to the URI of its nearest declaration.
    /// The `xml` prefix is always included.
    #[must_use]
    pub fn in_scope_namespaces(&self, id: NodeId) -> Vec<NamespaceDecl> {
        let mut seen: Vec<NamespaceDecl> = Vec::new();
        for anc in self.ancestors(id) {
            if let NodeKind::Element {
                namespace_decls, ..
            } = &self.node(anc).kind
            {
                for decl in namespace_decls {
                    if !seen.iter().any(|s| s.prefix == decl.prefix) {
                        seen.push(decl.clone());
                    }
                }
            }
        }
        if !seen.iter().any(|s| s.prefix.as_deref() == Some("xml")) {
            seen.push(NamespaceDecl {
                prefix: Some("xml".to_owned()),
                uri: XML_NAMESPACE.to_owned(),
            });
        }
        seen
    }

    // --- Navigation ---

    /// Returns the parent of a node.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Returns the first child of a node.
    #[must_use]
    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).first_child
    }

    /// Returns the last child of a node.
    #[must_use]
    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).last_child
    }

    /// Returns the next sibling of a node.
    #[must_use]
    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).next_sibling
    }

    /// Returns the previous sibling of a node.
    #[must_use]
    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).prev_sibling
    }

    /// Returns an iterator over the children of a node.
    pub fn children(&self, id: NodeId) -> Children<'_> {
        Children {
            tree: self,
            next: self.node(id).first_child,
        }
    }

    /// Returns an iterator over a node and its ancestors, walking up.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: Some(id),
        }
    }

    /// Returns a depth-first iterator over the descendants of a node.
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        Descendants {
            tree: self,
            root: id,
            next: self.first_child(id),
        }
    }

    /// Returns true if `ancestor` is `id` or one of its ancestors.
    #[must_use]
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, id: NodeId) -> bool {
        self.ancestors(id).any(|a| a == ancestor)
    }

    /// Compares two live nodes by position in tree order.
    ///
    /// Nodes under different top-level ancestors (for example two detached
    /// subtrees) are ordered by the slot number of those ancestors, so the
    /// result is total and stable but carries no document meaning.
    #[must_use]
    pub fn document_order(&self, a: NodeId, b: NodeId) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        let mut path_a: Vec<NodeId> = self.ancestors(a).collect();
        let mut path_b: Vec<NodeId> = self.ancestors(b).collect();
        path_a.reverse();
        path_b.reverse();
        if path_a[0] != path_b[0] {
            return path_a[0].cmp(&path_b[0]);
        }
        let common = path_a
            .iter()
            .zip(&path_b)
            .take_while(|(x, y)| x == y)
            .count();
        if common == path_a.len() {
            return Ordering::Less;
        }
        if common == path_b.len() {
            return Ordering::Greater;
        }
        let (sa, sb) = (path_a[common], path_b[common]);
        let mut cur = self.next_sibling(sa);
        while let Some(s) = cur {
            if s == sb {
                return Ordering::Less;
            }
            cur = self.next_sibling(s);
        }
        Ordering::Greater
    }

    // --- Mutation ---

    /// Allocates a new, parentless node and returns its handle.
    pub fn create_node(&mut self, kind: NodeKind) -> NodeId {
        let index = self.slots.len();
        self.slots.push(Slot::Live(NodeData::new(kind)));
        self.live += 1;
        self.counters.node_allocated();
        NodeId::from_index(self.tag, index)
    }

    fn check_attachable(&self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        self.check(parent)?;
        self.check(child)?;
        if child == self.root {
            return Err(TreeError::DocumentNode(child));
        }
        if self.node(child).parent.is_some() {
            return Err(TreeError::StillAttached(child));
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(TreeError::Cycle { parent, child });
        }
        Ok(())
    }

    /// Appends a parentless node to the end of `parent`'s children.
    ///
    /// # Errors
    ///
    /// Fails if either handle is not live, if `child` is the document node or
    /// still attached, or if `child` is `parent` or one of its ancestors.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        self.check_attachable(parent, child)?;
        self.node_mut(child).parent = Some(parent);
        if let Some(last) = self.node(parent).last_child {
            self.node_mut(last).next_sibling = Some(child);
            self.node_mut(child).prev_sibling = Some(last);
            self.node_mut(parent).last_child = Some(child);
        } else {
            let p = self.node_mut(parent);
            p.first_child = Some(child);
            p.last_child = Some(child);
        }
        Ok(())
    }

    /// Inserts a parentless node immediately before `reference`.
    ///
    /// # Errors
    ///
    /// Same as [`append_child`](Tree::append_child), plus
    /// [`TreeError::DocumentNode`] when `reference` has no parent.
    pub fn insert_before(&mut self, reference: NodeId, new_child: NodeId) -> Result<(), TreeError> {
        self.check(reference)?;
        let parent = self
            .node(reference)
            .parent
            .ok_or(TreeError::DocumentNode(reference))?;
        self.check_attachable(parent, new_child)?;

        self.node_mut(new_child).parent = Some(parent);
        if let Some(prev) = self.node(reference).prev_sibling {
            self.node_mut(prev).next_sibling = Some(new_child);
            self.node_mut(new_child).prev_sibling = Some(prev);
        } else {
            self.node_mut(parent).first_child = Some(new_child);
        }
        self.node_mut(new_child).next_sibling = Some(reference);
        self.node_mut(reference).prev_sibling = Some(new_child);
        Ok(())
    }

    /// Makes a parentless node the first child of `parent`.
    ///
    /// # Errors
    ///
    /// Same as [`append_child`](Tree::append_child).
    pub fn prepend_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        self.check(parent)?;
        match self.first_child(parent) {
            Some(first) => self.insert_before(first, child),
            None => self.append_child(parent, child),
        }
    }

    /// Detaches a node from its parent. The node stays allocated.
    ///
    /// Unlinking a parentless node is a no-op.
    ///
    /// # Errors
    ///
    /// Fails if `id` is not live.
    pub fn unlink(&mut self, id: NodeId) -> Result<(), TreeError> {
        self.check(id)?;
        let Some(parent) = self.node(id).parent else {
            return Ok(());
        };
        let prev = self.node(id).prev_sibling;
        let next = self.node(id).next_sibling;
        match prev {
            Some(p) => self.node_mut(p).next_sibling = next,
            None => self.node_mut(parent).first_child = next,
        }
        match next {
            Some(n) => self.node_mut(n).prev_sibling = prev,
            None => self.node_mut(parent).last_child = prev,
        }
        let node = self.node_mut(id);
        node.parent = None;
        node.prev_sibling = None;
        node.next_sibling = None;
        Ok(())
    }

    /// Frees a detached node and its whole subtree. Returns the number of
    /// slots freed.
    ///
    /// # Errors
    ///
    /// - [`TreeError::DoubleFree`] if the slot was already freed. The attempt
    ///   is counted and nothing else happens.
    /// - [`TreeError::StillAttached`] if the node has a parent.
    /// - [`TreeError::DocumentNode`] for the document node, which is only
    ///   freed by [`release`](Tree::release).
    pub fn free_node(&mut self, id: NodeId) -> Result<usize, TreeError> {
        match self.check(id) {
            Err(TreeError::Freed(_)) => {
                self.counters.double_free_attempted();
                return Err(TreeError::DoubleFree(id));
            }
            Err(e) => return Err(e),
            Ok(()) => {}
        }
        if id == self.root {
            return Err(TreeError::DocumentNode(id));
        }
        if self.node(id).parent.is_some() {
            return Err(TreeError::StillAttached(id));
        }
        Ok(self.free_subtree(id))
    }

    fn free_subtree(&mut self, id: NodeId) -> usize {
        let mut doomed: Vec<NodeId> = vec![id];
        doomed.extend(self.descendants(id));
        for &n in &doomed {
            self.slots[n.as_index()] = Slot::Freed;
        }
        self.live -= doomed.len();
        self.counters.nodes_freed(doomed.len());
        doomed.len()
    }

    /// Frees every remaining node. Idempotent.
    ///
    /// The document node's subtree is freed first. Anything still live after
    /// that was never attached to the document nor freed by its owner, and is
    /// reclaimed as dangling.
    pub fn release(&mut self) -> ReleaseReport {
        if self.released {
            return ReleaseReport::default();
        }
        self.released = true;
        let reachable = self.free_subtree(self.root);
        let mut dangling = 0;
        for slot in &mut self.slots {
            if matches!(slot, Slot::Live(_)) {
                *slot = Slot::Freed;
                dangling += 1;
            }
        }
        if dangling > 0 {
            self.live -= dangling;
            self.counters.nodes_freed(dangling);
            self.counters.dangling_swept(dangling);
        }
        ReleaseReport {
            reachable,
            dangling,
        }
    }
}

impl Drop for Tree {
    fn drop(&mut self) {
        self.release();
    }
}

// --- Iterators ---

/// Iterator over the children of a node.
pub struct Children<'a> {
    tree: &'a Tree,
    next: Option<NodeId>,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.tree.node(current).next_sibling;
        Some(current)
    }
}

/// Iterator over a node and its ancestors.
pub struct Ancestors<'a> {
    tree: &'a Tree,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.tree.node(current).parent;
        Some(current)
    }
}

/// Depth-first iterator over the descendants of a node.
pub struct Descendants<'a> {
    tree: &'a Tree,
    root: NodeId,
    next: Option<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;

        if let Some(child) = self.tree.first_child(current) {
            self.next = Some(child);
            return Some(current);
        }
        if let Some(sibling) = self.tree.next_sibling(current) {
            self.next = Some(sibling);
            return Some(current);
        }

        let mut ancestor = self.tree.parent(current);
        while let Some(anc) = ancestor {
            if anc == self.root {
                self.next = None;
                return Some(current);
            }
            if let Some(sibling) = self.tree.next_sibling(anc) {
                self.next = Some(sibling);
                return Some(current);
            }
            ancestor = self.tree.parent(anc);
        }

        self.next = None;
        Some(current)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn new_tree() -> Tree {
        Tree::new(DocumentKind::Xml, Arc::default())
    }

    fn elem(tree: &mut Tree, name: &str) -> NodeId {
        tree.create_node(NodeKind::element(name))
    }

    #[test]
    fn test_new_tree_has_document_node() {
        let tree = new_tree();
        assert!(matches!(tree.node(tree.root()).kind, NodeKind::Document));
        assert_eq!(tree.live_count(), 1);
        assert_eq!(tree.root_element(), None);
        assert_eq!(tree.counters().snapshot().nodes_allocated, 1);
    }

    #[test]
    fn test_append_and_navigate() {
        let mut tree = new_tree();
        let root = tree.root();
        let a = elem(&mut tree, "a");
        let b = elem(&mut tree, "b");
        let c = elem(&mut tree, "c");
        tree.append_child(root, a).unwrap();
        tree.append_child(a, b).unwrap();
        tree.append_child(a, c).unwrap();

        assert_eq!(tree.root_element(), Some(a));
        assert_eq!(tree.children(a).collect::<Vec<_>>(), vec![b, c]);
        assert_eq!(tree.next_sibling(b), Some(c));
        assert_eq!(tree.prev_sibling(c), Some(b));
        assert_eq!(tree.ancestors(c).collect::<Vec<_>>(), vec![c, a, root]);
        assert_eq!(tree.descendants(root).collect::<Vec<_>>(), vec![a, b, c]);
    }

    #[test]
    fn test_descendants_of_detached_subtree_stop_at_root() {
        let mut tree = new_tree();
        let a = elem(&mut tree, "a");
        let b = elem(&mut tree, "b");
        let sibling = elem(&mut tree, "s");
        let parent = elem(&mut tree, "p");
        tree.append_child(parent, a).unwrap();
        tree.append_child(parent, sibling).unwrap();
        tree.append_child(a, b).unwrap();
        assert_eq!(tree.descendants(a).collect::<Vec<_>>(), vec![b]);
    }

    #[test]
    fn test_insert_before_and_prepend() {
        let mut tree = new_tree();
        let p = elem(&mut tree, "p");
        let a = elem(&mut tree, "a");
        let b = elem(&mut tree, "b");
        let c = elem(&mut tree, "c");
        tree.append_child(p, c).unwrap();
        tree.insert_before(c, b).unwrap();
        tree.prepend_child(p, a).unwrap();
        assert_eq!(tree.children(p).collect::<Vec<_>>(), vec![a, b, c]);
        assert_eq!(tree.first_child(p), Some(a));
        assert_eq!(tree.last_child(p), Some(c));
    }

    #[test]
    fn test_attach_rejects_attached_child() {
        let mut tree = new_tree();
        let p = elem(&mut tree, "p");
        let q = elem(&mut tree, "q");
        let a = elem(&mut tree, "a");
        tree.append_child(p, a).unwrap();
        assert_eq!(tree.append_child(q, a), Err(TreeError::StillAttached(a)));
    }

    #[test]
    fn test_attach_rejects_cycle() {
        let mut tree = new_tree();
        let a = elem(&mut tree, "a");
        let b = elem(&mut tree, "b");
        tree.append_child(a, b).unwrap();
        assert_eq!(
            tree.append_child(b, a),
            Err(TreeError::Cycle {
                parent: b,
                child: a
            })
        );
        assert_eq!(
            tree.append_child(a, a),
            Err(TreeError::Cycle {
                parent: a,
                child: a
            })
        );
    }

    #[test]
    fn test_attach_rejects_document_node() {
        let mut tree = new_tree();
        let root = tree.root();
        let a = elem(&mut tree, "a");
        assert_eq!(tree.append_child(a, root), Err(TreeError::DocumentNode(root)));
    }

    #[test]
    fn test_unlink_middle_child() {
        let mut tree = new_tree();
        let p = elem(&mut tree, "p");
        let a = elem(&mut tree, "a");
        let b = elem(&mut tree, "b");
        let c = elem(&mut tree, "c");
        for n in [a, b, c] {
            tree.append_child(p, n).unwrap();
        }
        tree.unlink(b).unwrap();
        assert_eq!(tree.children(p).collect::<Vec<_>>(), vec![a, c]);
        assert_eq!(tree.parent(b), None);
        assert_eq!(tree.next_sibling(b), None);
        assert_eq!(tree.prev_sibling(c), Some(a));
        // unlinking again is a no-op
        tree.unlink(b).unwrap();
    }

    #[test]
    fn test_free_subtree_counts_and_tombstones() {
        let mut tree = new_tree();
        let a = elem(&mut tree, "a");
        let b = elem(&mut tree, "b");
        let t = tree.create_node(NodeKind::text("x"));
        tree.append_child(a, b).unwrap();
        tree.append_child(b, t).unwrap();

        assert_eq!(tree.free_node(a), Ok(3));
        assert_eq!(tree.check(b), Err(TreeError::Freed(b)));
        assert_eq!(tree.live_count(), 1);
        assert_eq!(tree.counters().snapshot().nodes_freed, 3);
    }

    #[test]
    fn test_double_free_is_reported_not_repeated() {
        let mut tree = new_tree();
        let a = elem(&mut tree, "a");
        tree.free_node(a).unwrap();
        assert_eq!(tree.free_node(a), Err(TreeError::DoubleFree(a)));
        let snap = tree.counters().snapshot();
        assert_eq!(snap.nodes_freed, 1);
        assert_eq!(snap.double_frees, 1);
    }

    #[test]
    fn test_free_rejects_attached_and_document_node() {
        let mut tree = new_tree();
        let root = tree.root();
        let a = elem(&mut tree, "a");
        tree.append_child(root, a).unwrap();
        assert_eq!(tree.free_node(a), Err(TreeError::StillAttached(a)));
        assert_eq!(tree.free_node(root), Err(TreeError::DocumentNode(root)));
    }

    #[test]
    fn test_out_of_range_handle() {
        let tree = new_tree();
        let bogus = NodeId::from_raw(99).unwrap();
        assert_eq!(tree.check(bogus), Err(TreeError::OutOfRange(bogus)));
        assert!(tree.get(bogus).is_none());
    }

    #[test]
    fn test_handle_from_another_tree_is_rejected() {
        let mut first = new_tree();
        let mut second = new_tree();
        let a = elem(&mut first, "a");
        let b = elem(&mut second, "b");
        // Same slot number, different trees.
        assert_eq!(a.into_raw(), b.into_raw());
        assert_ne!(a, b);
        assert_eq!(first.check(b), Err(TreeError::OutOfRange(b)));
        assert!(first.get(b).is_none());
        assert_eq!(first.unlink(b), Err(TreeError::OutOfRange(b)));
        assert_eq!(first.free_node(b), Err(TreeError::OutOfRange(b)));
        let root = first.root();
        assert_eq!(first.append_child(root, b), Err(TreeError::OutOfRange(b)));
        assert!(first.is_live(a));
    }

    #[test]
    fn test_release_sweeps_dangling_once() {
        let counters: Arc<AllocCounters> = Arc::default();
        let mut tree = Tree::new(DocumentKind::Xml, Arc::clone(&counters));
        let root = tree.root();
        let a = elem(&mut tree, "a");
        tree.append_child(root, a).unwrap();
        let _orphan = elem(&mut tree, "orphan");

        let report = tree.release();
        assert_eq!(
            report,
            ReleaseReport {
                reachable: 2,
                dangling: 1
            }
        );
        assert_eq!(tree.release(), ReleaseReport::default());
        drop(tree);

        let snap = counters.snapshot();
        assert!(snap.is_balanced());
        assert_eq!(snap.dangling_swept, 1);
    }

    #[test]
    fn test_drop_releases() {
        let counters: Arc<AllocCounters> = Arc::default();
        {
            let mut tree = Tree::new(DocumentKind::Xml, Arc::clone(&counters));
            let root = tree.root();
            let a = elem(&mut tree, "a");
            tree.append_child(root, a).unwrap();
        }
        assert!(counters.snapshot().is_balanced());
    }

    #[test]
    fn test_document_order_after_move() {
        let mut tree = new_tree();
        let root = tree.root();
        let r = elem(&mut tree, "r");
        tree.append_child(root, r).unwrap();
        let late = elem(&mut tree, "late");
        let early = elem(&mut tree, "early");
        tree.append_child(r, early).unwrap();
        tree.append_child(r, late).unwrap();
        // `late` has the lower slot but comes second in the tree
        assert_eq!(tree.document_order(early, late), Ordering::Less);
        assert_eq!(tree.document_order(r, late), Ordering::Less);
        assert_eq!(tree.document_order(late, root), Ordering::Greater);
    }

    #[test]
    fn test_text_content_concatenates() {
        let mut tree = new_tree();
        let p = elem(&mut tree, "p");
        let i = elem(&mut tree, "i");
        let t1 = tree.create_node(NodeKind::text("Hello "));
        let t2 = tree.create_node(NodeKind::text("world"));
        tree.append_child(p, t1).unwrap();
        tree.append_child(p, i).unwrap();
        tree.append_child(i, t2).unwrap();
        assert_eq!(tree.text_content(p), "Hello world");
        assert_eq!(tree.node_text(t1), Some("Hello "));
    }

    #[test]
    fn test_attribute_lookup_by_qname_and_ns() {
        let mut tree = new_tree();
        let a = tree.create_node(NodeKind::Element {
            name: "a".into(),
            prefix: None,
            namespace: None,
            attributes: vec![
                Attribute {
                    name: "href".into(),
                    prefix: Some("xlink".into()),
                    namespace: Some("http://www.w3.org/1999/xlink".into()),
                    value: "#t".into(),
                },
                Attribute {
                    name: "id".into(),
                    prefix: None,
                    namespace: None,
                    value: "n1".into(),
                },
            ],
            namespace_decls: vec![],
        });
        assert_eq!(tree.attribute(a, "xlink:href"), Some("#t"));
        assert_eq!(tree.attribute(a, "href"), None);
        assert_eq!(tree.attribute(a, "id"), Some("n1"));
        assert_eq!(
            tree.attribute_ns(a, "href", Some("http://www.w3.org/1999/xlink")),
            Some("#t")
        );
    }

    #[test]
    fn test_in_scope_namespaces_nearest_wins() {
        let mut tree = new_tree();
        let outer = tree.create_node(NodeKind::Element {
            name: "o".into(),
            prefix: None,
            namespace: None,
            attributes: vec![],
            namespace_decls: vec![
                NamespaceDecl {
                    prefix: Some("p".into()),
                    uri: "urn:outer".into(),
                },
                NamespaceDecl {
                    prefix: None,
                    uri: "urn:default".into(),
                },
            ],
        });
        let inner = tree.create_node(NodeKind::Element {
            name: "i".into(),
            prefix: None,
            namespace: None,
            attributes: vec![],
            namespace_decls: vec![NamespaceDecl {
                prefix: Some("p".into()),
                uri: "urn:inner".into(),
            }],
        });
        tree.append_child(outer, inner).unwrap();
        let scope = tree.in_scope_namespaces(inner);
        let p = scope
            .iter()
            .find(|d| d.prefix.as_deref() == Some("p"))
            .unwrap();
        assert_eq!(p.uri, "urn:inner");
        assert!(scope.iter().any(|d| d.prefix.is_none() && d.uri == "urn:default"));
        assert!(scope.iter().any(|d| d.prefix.as_deref() == Some("xml")));
    }
}
