//! `XPath` 1.0 evaluator.
//!
//! Walks a compiled [`Expr`] against a [`Tree`]. Every intermediate node-set
//! is kept in document order without duplicates, using the tree's real
//! structure rather than allocation order, so nodes that were moved after
//! parsing still sort correctly.
//!
//! # Functions
//!
//! The full core library is available: `last`, `position`, `count`, `id`,
//! `local-name`, `namespace-uri`, `name`, `string`, `concat`,
//! `starts-with`, `contains`, `substring-before`, `substring-after`,
//! `substring`, `string-length`, `normalize-space`, `translate`, `boolean`,
//! `not`, `true`, `false`, `lang`, `number`, `sum`, `floor`, `ceiling` and
//! `round`. `id()` looks up `xml:id` attributes.

use std::collections::HashSet;
use std::iter;

use crate::tree::{NodeId, NodeKind, Tree, XML_NAMESPACE};

use super::ast::{Axis, BinaryOp, Expr, LocationPath, NodeTest, PathStart, Step};
use super::context::{EvalContext, XPathObject};
use super::parser::CompiledExpr;
use super::types::{
    local_name, namespace_uri, parse_number, qualified_name, sort_document_order, XPathError,
    XPathNode, XPathValue,
};

/// Evaluates `expr` at the context node held by `ctx`.
///
/// A context without a node evaluates at the document node.
///
/// # Errors
///
/// Returns [`XPathError::InvalidContext`] if the context node is not live in
/// `tree`, and any evaluation error such as an unregistered prefix or an
/// undefined variable.
pub fn compiled_eval(
    expr: &CompiledExpr,
    ctx: &EvalContext,
    tree: &Tree,
) -> Result<XPathObject, XPathError> {
    let node = ctx.node().unwrap_or_else(|| tree.root());
    tree.check(node)
        .map_err(|_| XPathError::InvalidContext { node })?;
    let focus = Focus {
        item: XPathNode::Node(node),
        position: 1,
        size: 1,
    };
    let value = Evaluator { tree, ctx }.expr(expr.expr(), focus)?;
    Ok(XPathObject::new(value, tree.counters()))
}

/// The context item with its proximity position and the context size.
#[derive(Debug, Clone, Copy)]
struct Focus {
    item: XPathNode,
    position: usize,
    size: usize,
}

struct Evaluator<'a> {
    tree: &'a Tree,
    ctx: &'a EvalContext,
}

#[allow(clippy::cast_precision_loss)]
fn count(n: usize) -> f64 {
    n as f64
}

impl Evaluator<'_> {
    fn expr(&self, expr: &Expr, focus: Focus) -> Result<XPathValue, XPathError> {
        match expr {
            Expr::Number(n) => Ok(XPathValue::Number(*n)),
            Expr::Literal(s) => Ok(XPathValue::String(s.clone())),
            Expr::Variable(name) => self.ctx.variable(name).cloned().ok_or_else(|| {
                XPathError::UndefinedVariable { name: name.clone() }
            }),
            Expr::Binary { op, left, right } => self.binary(*op, left, right, focus),
            Expr::Negate(inner) => Ok(XPathValue::Number(-self.number(inner, focus)?)),
            Expr::Function { name, args } => self.function(name, args, focus),
            Expr::Union(left, right) => {
                let mut nodes = self.node_set(left, focus)?;
                nodes.extend(self.node_set(right, focus)?);
                sort_document_order(&mut nodes, self.tree);
                Ok(XPathValue::NodeSet(nodes))
            }
            Expr::Filter {
                primary,
                predicates,
            } => {
                let mut nodes = self.node_set(primary, focus)?;
                for predicate in predicates {
                    nodes = self.filter(nodes, predicate)?;
                }
                Ok(XPathValue::NodeSet(nodes))
            }
            Expr::Path(path) => self.path(path, focus).map(XPathValue::NodeSet),
        }
    }

    fn node_set(&self, expr: &Expr, focus: Focus) -> Result<Vec<XPathNode>, XPathError> {
        match self.expr(expr, focus)? {
            XPathValue::NodeSet(nodes) => Ok(nodes),
            other => Err(XPathError::TypeError {
                expected: "node-set",
                found: other.type_name(),
            }),
        }
    }

    fn number(&self, expr: &Expr, focus: Focus) -> Result<f64, XPathError> {
        Ok(self.expr(expr, focus)?.to_number(self.tree))
    }

    fn string(&self, expr: &Expr, focus: Focus) -> Result<String, XPathError> {
        Ok(self.expr(expr, focus)?.to_xpath_string(self.tree))
    }

    fn boolean(&self, expr: &Expr, focus: Focus) -> Result<bool, XPathError> {
        Ok(self.expr(expr, focus)?.to_boolean())
    }

    // --- Operators ---

    fn binary(
        &self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        focus: Focus,
    ) -> Result<XPathValue, XPathError> {
        let value = match op {
            BinaryOp::Or => XPathValue::Boolean(
                self.boolean(left, focus)? || self.boolean(right, focus)?,
            ),
            BinaryOp::And => XPathValue::Boolean(
                self.boolean(left, focus)? && self.boolean(right, focus)?,
            ),
            op if op.is_comparison() => {
                let l = self.expr(left, focus)?;
                let r = self.expr(right, focus)?;
                XPathValue::Boolean(self.compare(op, &l, &r))
            }
            op => {
                let a = self.number(left, focus)?;
                let b = self.number(right, focus)?;
                XPathValue::Number(match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    _ => a % b,
                })
            }
        };
        Ok(value)
    }

    /// Comparison with node-set semantics: a node-set compares true if any
    /// member's string-value does.
    fn compare(&self, op: BinaryOp, l: &XPathValue, r: &XPathValue) -> bool {
        let tree = self.tree;
        let as_string = |n: &XPathNode| XPathValue::String(n.string_value(tree));
        match (l, r) {
            (XPathValue::NodeSet(a), XPathValue::NodeSet(b)) => {
                let right: Vec<XPathValue> = b.iter().map(as_string).collect();
                a.iter().any(|x| {
                    let x = as_string(x);
                    right.iter().any(|y| compare_scalars(op, &x, y, tree))
                })
            }
            (XPathValue::NodeSet(a), XPathValue::Boolean(_)) => {
                compare_scalars(op, &XPathValue::Boolean(!a.is_empty()), r, tree)
            }
            (XPathValue::Boolean(_), XPathValue::NodeSet(b)) => {
                compare_scalars(op, l, &XPathValue::Boolean(!b.is_empty()), tree)
            }
            (XPathValue::NodeSet(a), _) => {
                a.iter().any(|x| compare_scalars(op, &as_string(x), r, tree))
            }
            (_, XPathValue::NodeSet(b)) => {
                b.iter().any(|y| compare_scalars(op, l, &as_string(y), tree))
            }
            _ => compare_scalars(op, l, r, tree),
        }
    }

    // --- Location paths ---

    fn path(&self, path: &LocationPath, focus: Focus) -> Result<Vec<XPathNode>, XPathError> {
        let mut current = match &path.start {
            PathStart::Context => vec![focus.item],
            // The document node, even when the context is a detached subtree.
            PathStart::Root => vec![XPathNode::Node(self.tree.root())],
            PathStart::Expr(expr) => self.node_set(expr, focus)?,
        };
        for step in &path.steps {
            current = self.step(step, &current)?;
        }
        Ok(current)
    }

    /// The top of the subtree containing `item`: the document node, or for a
    /// detached subtree its parentless top node.
    fn root_of(&self, item: XPathNode) -> NodeId {
        let id = owner(item);
        self.tree.ancestors(id).last().unwrap_or(id)
    }

    fn step(&self, step: &Step, input: &[XPathNode]) -> Result<Vec<XPathNode>, XPathError> {
        let namespace = match &step.test {
            NodeTest::AnyIn(prefix)
            | NodeTest::Name {
                prefix: Some(prefix),
                ..
            } => Some(self.resolve(prefix)?),
            _ => None,
        };

        let mut out = Vec::new();
        for &item in input {
            let mut selected: Vec<XPathNode> = self
                .axis(step.axis, item)
                .into_iter()
                .filter(|&c| self.matches(&step.test, namespace, step.axis, c))
                .collect();
            for predicate in &step.predicates {
                selected = self.filter(selected, predicate)?;
            }
            out.extend(selected);
        }
        if input.len() > 1 || step.axis.is_reverse() {
            sort_document_order(&mut out, self.tree);
        }
        Ok(out)
    }

    fn resolve(&self, prefix: &str) -> Result<&str, XPathError> {
        self.ctx
            .namespace(prefix)
            .ok_or_else(|| XPathError::UndefinedPrefix {
                prefix: prefix.to_owned(),
            })
    }

    /// Applies one predicate, with proximity positions in the order `items`
    /// are given.
    fn filter(&self, items: Vec<XPathNode>, predicate: &Expr) -> Result<Vec<XPathNode>, XPathError> {
        let size = items.len();
        let mut kept = Vec::with_capacity(size);
        for (i, item) in items.into_iter().enumerate() {
            let focus = Focus {
                item,
                position: i + 1,
                size,
            };
            #[allow(clippy::float_cmp)]
            let keep = match self.expr(predicate, focus)? {
                XPathValue::Number(n) => n == count(i + 1),
                other => other.to_boolean(),
            };
            if keep {
                kept.push(item);
            }
        }
        Ok(kept)
    }

    /// Items along `axis` from `item`, in axis order (reverse axes nearest
    /// first).
    fn axis(&self, axis: Axis, item: XPathNode) -> Vec<XPathNode> {
        let tree = self.tree;
        let is_attr = matches!(item, XPathNode::Attribute { .. });
        let id = owner(item);

        match axis {
            Axis::SelfAxis => vec![item],
            Axis::Namespace => Vec::new(),
            Axis::Attribute => {
                if is_attr {
                    Vec::new()
                } else {
                    (0..tree.attributes(id).len())
                        .map(|index| XPathNode::Attribute { owner: id, index })
                        .collect()
                }
            }
            Axis::Child if !is_attr => nodes(tree.children(id)),
            Axis::Descendant if !is_attr => nodes(tree.descendants(id)),
            Axis::DescendantOrSelf if !is_attr => {
                nodes(iter::once(id).chain(tree.descendants(id)))
            }
            Axis::DescendantOrSelf => vec![item],
            Axis::Child | Axis::Descendant => Vec::new(),
            Axis::Parent if is_attr => vec![XPathNode::Node(id)],
            Axis::Parent => nodes(tree.parent(id).into_iter()),
            Axis::Ancestor if is_attr => nodes(tree.ancestors(id)),
            Axis::Ancestor => nodes(tree.ancestors(id).skip(1)),
            Axis::AncestorOrSelf if is_attr => {
                let mut out = vec![item];
                out.extend(tree.ancestors(id).map(XPathNode::Node));
                out
            }
            Axis::AncestorOrSelf => nodes(tree.ancestors(id)),
            Axis::FollowingSibling | Axis::PrecedingSibling if is_attr => Vec::new(),
            Axis::FollowingSibling => nodes(iter::successors(tree.next_sibling(id), |&n| {
                tree.next_sibling(n)
            })),
            Axis::PrecedingSibling => nodes(iter::successors(tree.prev_sibling(id), |&n| {
                tree.prev_sibling(n)
            })),
            Axis::Following => {
                let mut out = Vec::new();
                if is_attr {
                    out.extend(tree.descendants(id).map(XPathNode::Node));
                }
                for anc in tree.ancestors(id) {
                    for sib in iter::successors(tree.next_sibling(anc), |&n| tree.next_sibling(n)) {
                        out.push(XPathNode::Node(sib));
                        out.extend(tree.descendants(sib).map(XPathNode::Node));
                    }
                }
                out
            }
            Axis::Preceding => {
                let mut out = Vec::new();
                for anc in tree.ancestors(id) {
                    for sib in iter::successors(tree.prev_sibling(anc), |&n| tree.prev_sibling(n)) {
                        let start = out.len();
                        out.push(XPathNode::Node(sib));
                        out.extend(tree.descendants(sib).map(XPathNode::Node));
                        out[start..].reverse();
                    }
                }
                out
            }
        }
    }

    fn matches(
        &self,
        test: &NodeTest,
        namespace: Option<&str>,
        axis: Axis,
        item: XPathNode,
    ) -> bool {
        match item {
            XPathNode::Attribute { owner, index } => {
                let Some(attr) = self.tree.attributes(owner).get(index) else {
                    return false;
                };
                match test {
                    NodeTest::Node => true,
                    NodeTest::Any => axis == Axis::Attribute,
                    NodeTest::AnyIn(_) => {
                        axis == Axis::Attribute && attr.namespace.as_deref() == namespace
                    }
                    NodeTest::Name { local, .. } => {
                        axis == Axis::Attribute
                            && attr.name == *local
                            && attr.namespace.as_deref() == namespace
                    }
                    _ => false,
                }
            }
            XPathNode::Node(id) => {
                let kind = &self.tree.node(id).kind;
                match (test, kind) {
                    (_, NodeKind::DocumentType { .. }) => false,
                    (NodeTest::Node, _)
                    | (NodeTest::Text, NodeKind::Text { .. } | NodeKind::CData { .. })
                    | (NodeTest::Comment, NodeKind::Comment { .. })
                    | (NodeTest::Any, NodeKind::Element { .. }) => true,
                    (NodeTest::ProcessingInstruction(want), NodeKind::ProcessingInstruction { target, .. }) => {
                        want.as_ref().map_or(true, |w| w == target)
                    }
                    (NodeTest::AnyIn(_), NodeKind::Element { namespace: ns, .. }) => {
                        ns.as_deref() == namespace
                    }
                    (NodeTest::Name { local, .. }, NodeKind::Element { name, namespace: ns, .. }) => {
                        name == local && ns.as_deref() == namespace
                    }
                    _ => false,
                }
            }
        }
    }

    // --- Core function library ---

    /// The single node argument of a name function, or the context item.
    fn node_arg(&self, args: &[Expr], focus: Focus) -> Result<Option<XPathNode>, XPathError> {
        match args.first() {
            Some(arg) => Ok(self.node_set(arg, focus)?.first().copied()),
            None => Ok(Some(focus.item)),
        }
    }

    /// The string argument, or the context item's string-value.
    fn string_or_context(&self, args: &[Expr], focus: Focus) -> Result<String, XPathError> {
        match args.first() {
            Some(arg) => self.string(arg, focus),
            None => Ok(focus.item.string_value(self.tree)),
        }
    }

    fn function(&self, name: &str, args: &[Expr], focus: Focus) -> Result<XPathValue, XPathError> {
        use XPathValue::{Boolean, Number, String as Str};

        let tree = self.tree;
        let value = match name {
            "last" => Number(count(focus.size)),
            "position" => Number(count(focus.position)),
            "count" => Number(count(self.node_set(&args[0], focus)?.len())),
            "id" => XPathValue::NodeSet(self.id(&args[0], focus)?),
            "local-name" => Str(self
                .node_arg(args, focus)?
                .map(|n| local_name(n, tree))
                .unwrap_or_default()),
            "namespace-uri" => Str(self
                .node_arg(args, focus)?
                .map(|n| namespace_uri(n, tree))
                .unwrap_or_default()),
            "name" => Str(self
                .node_arg(args, focus)?
                .map(|n| qualified_name(n, tree))
                .unwrap_or_default()),
            "string" => Str(self.string_or_context(args, focus)?),
            "concat" => {
                let mut out = String::new();
                for arg in args {
                    out.push_str(&self.string(arg, focus)?);
                }
                Str(out)
            }
            "starts-with" => {
                Boolean(self.string(&args[0], focus)?.starts_with(&self.string(&args[1], focus)?))
            }
            "contains" => {
                Boolean(self.string(&args[0], focus)?.contains(&self.string(&args[1], focus)?))
            }
            "substring-before" => {
                let s = self.string(&args[0], focus)?;
                let t = self.string(&args[1], focus)?;
                Str(s.find(&t).map(|i| s[..i].to_owned()).unwrap_or_default())
            }
            "substring-after" => {
                let s = self.string(&args[0], focus)?;
                let t = self.string(&args[1], focus)?;
                Str(s
                    .find(&t)
                    .map(|i| s[i + t.len()..].to_owned())
                    .unwrap_or_default())
            }
            "substring" => {
                let s = self.string(&args[0], focus)?;
                let start = round(self.number(&args[1], focus)?);
                let len = match args.get(2) {
                    Some(arg) => round(self.number(arg, focus)?),
                    None => f64::INFINITY,
                };
                Str(s
                    .chars()
                    .enumerate()
                    .filter(|(i, _)| {
                        let p = count(i + 1);
                        p >= start && p < start + len
                    })
                    .map(|(_, c)| c)
                    .collect())
            }
            "string-length" => Number(count(self.string_or_context(args, focus)?.chars().count())),
            "normalize-space" => {
                let s = self.string_or_context(args, focus)?;
                Str(s
                    .split([' ', '\t', '\r', '\n'])
                    .filter(|w| !w.is_empty())
                    .collect::<Vec<_>>()
                    .join(" "))
            }
            "translate" => {
                let s = self.string(&args[0], focus)?;
                let from: Vec<char> = self.string(&args[1], focus)?.chars().collect();
                let to: Vec<char> = self.string(&args[2], focus)?.chars().collect();
                Str(s
                    .chars()
                    .filter_map(|c| match from.iter().position(|&f| f == c) {
                        Some(i) => to.get(i).copied(),
                        None => Some(c),
                    })
                    .collect())
            }
            "boolean" => Boolean(self.boolean(&args[0], focus)?),
            "not" => Boolean(!self.boolean(&args[0], focus)?),
            "true" => Boolean(true),
            "false" => Boolean(false),
            "lang" => {
                let want = self.string(&args[0], focus)?;
                Boolean(self.lang(owner(focus.item)).is_some_and(|lang| lang_matches(lang, &want)))
            }
            "number" => Number(match args.first() {
                Some(arg) => self.number(arg, focus)?,
                None => parse_number(&focus.item.string_value(tree)),
            }),
            "sum" => Number(
                self.node_set(&args[0], focus)?
                    .iter()
                    .map(|n| parse_number(&n.string_value(tree)))
                    .sum(),
            ),
            "floor" => Number(self.number(&args[0], focus)?.floor()),
            "ceiling" => Number(self.number(&args[0], focus)?.ceil()),
            "round" => Number(round(self.number(&args[0], focus)?)),
            _ => {
                return Err(XPathError::UndefinedFunction {
                    name: name.to_owned(),
                })
            }
        };
        Ok(value)
    }

    /// `id()`: elements in the context's tree whose `xml:id` is one of the
    /// whitespace-separated tokens of the argument.
    fn id(&self, arg: &Expr, focus: Focus) -> Result<Vec<XPathNode>, XPathError> {
        let tree = self.tree;
        let text = match self.expr(arg, focus)? {
            XPathValue::NodeSet(nodes) => nodes
                .iter()
                .map(|n| n.string_value(tree))
                .collect::<Vec<_>>()
                .join(" "),
            other => other.to_xpath_string(tree),
        };
        let wanted: HashSet<&str> = text.split_whitespace().collect();
        if wanted.is_empty() {
            return Ok(Vec::new());
        }
        let root = self.root_of(focus.item);
        Ok(iter::once(root)
            .chain(tree.descendants(root))
            .filter(|&id| {
                tree.attribute_ns(id, "id", Some(XML_NAMESPACE))
                    .is_some_and(|v| wanted.contains(v))
            })
            .map(XPathNode::Node)
            .collect())
    }

    /// The nearest `xml:lang` on `id` or its ancestors.
    fn lang(&self, id: NodeId) -> Option<&str> {
        self.tree
            .ancestors(id)
            .find_map(|a| self.tree.attribute_ns(a, "lang", Some(XML_NAMESPACE)))
    }
}

fn nodes(it: impl Iterator<Item = NodeId>) -> Vec<XPathNode> {
    it.map(XPathNode::Node).collect()
}

fn owner(item: XPathNode) -> NodeId {
    match item {
        XPathNode::Node(id) | XPathNode::Attribute { owner: id, .. } => id,
    }
}

/// `round()`: nearest integer, halves toward positive infinity.
fn round(n: f64) -> f64 {
    if n.is_nan() || n.is_infinite() {
        n
    } else if (-0.5..0.0).contains(&n) {
        -0.0
    } else {
        (n + 0.5).floor()
    }
}

fn lang_matches(lang: &str, want: &str) -> bool {
    lang.eq_ignore_ascii_case(want)
        || (lang.len() > want.len()
            && lang.as_bytes()[want.len()] == b'-'
            && lang[..want.len()].eq_ignore_ascii_case(want))
}

#[allow(clippy::float_cmp)]
fn compare_scalars(op: BinaryOp, l: &XPathValue, r: &XPathValue, tree: &Tree) -> bool {
    match op {
        BinaryOp::Eq | BinaryOp::Neq => {
            let equal = if matches!(l, XPathValue::Boolean(_)) || matches!(r, XPathValue::Boolean(_)) {
                l.to_boolean() == r.to_boolean()
            } else if matches!(l, XPathValue::Number(_)) || matches!(r, XPathValue::Number(_)) {
                l.to_number(tree) == r.to_number(tree)
            } else {
                l.to_xpath_string(tree) == r.to_xpath_string(tree)
            };
            equal == (op == BinaryOp::Eq)
        }
        _ => {
            let (a, b) = (l.to_number(tree), r.to_number(tree));
            match op {
                BinaryOp::Lt => a < b,
                BinaryOp::Lte => a <= b,
                BinaryOp::Gt => a > b,
                _ => a >= b,
            }
        }
    }
}
