//! Recursive descent tree builder for XML 1.0.
//!
//! Builds nodes directly into a [`Tree`]. A document parse fills the tree's
//! document node; a fragment parse produces one parentless element whose
//! subtree the caller takes ownership of.

use tracing::warn;

use crate::error::{ErrorSeverity, ParseDiagnostic, ParseError};
use crate::tree::{Attribute, NamespaceDecl, NodeId, NodeKind, Tree, XML_NAMESPACE};

use super::input::{
    is_name_start_char, is_xml_char, parse_cdata_content, parse_comment_content,
    parse_pi_content, parse_xml_decl, split_name, NamespaceResolver, ParserInput,
};
use super::ParseOptions;

/// The reserved namespace for `xmlns` attributes themselves.
const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

/// The core XML parser.
pub(crate) struct XmlParser<'a, 't> {
    input: ParserInput<'a>,
    tree: &'t mut Tree,
    ns: NamespaceResolver,
    /// Qualified names of the elements currently open, outermost first.
    open: Vec<String>,
    /// Parentless root of a fragment parse.
    detached_root: Option<NodeId>,
}

impl<'a, 't> XmlParser<'a, 't> {
    pub fn new(
        text: &'a str,
        options: ParseOptions,
        tree: &'t mut Tree,
        ns: NamespaceResolver,
    ) -> Self {
        Self {
            input: ParserInput::new(text, options),
            tree,
            ns,
            open: Vec::new(),
            detached_root: None,
        }
    }

    /// Parses a complete document into the tree's document node.
    pub fn parse_document(mut self) -> Result<Vec<ParseDiagnostic>, ParseError> {
        let root = self.tree.root();
        if self.input.at_end() {
            return Err(self.input.fatal("document is empty"));
        }

        if self.looking_at_xml_decl() {
            let decl = parse_xml_decl(&mut self.input)?;
            self.tree.version = Some(decl.version);
            self.tree.declared_encoding = decl.encoding;
            self.tree.standalone = decl.standalone;
        }

        self.parse_misc(root)?;
        if self.input.looking_at("<!DOCTYPE") {
            self.parse_doctype(root)?;
            self.parse_misc(root)?;
        }

        let starts_element = self.input.peek() == Some(b'<')
            && self.input.remaining()[1..]
                .chars()
                .next()
                .is_some_and(is_name_start_char);
        if !starts_element {
            // No usable tree without a root element, even when recovering.
            return Err(self.input.fatal("start tag expected, '<' not found"));
        }
        self.parse_element(Some(root))?;

        if let Err(err) = self.parse_misc(root) {
            if !self.input.recover() {
                return Err(err);
            }
            self.input
                .push_diagnostic(ErrorSeverity::Error, err.message);
        }
        self.input.skip_whitespace();
        if !self.input.at_end() {
            self.input
                .recoverable("extra content at the end of the document")?;
        }
        Ok(self.input.diagnostics)
    }

    /// Parses exactly one element as a parentless subtree.
    ///
    /// On failure every node created by this parse is freed again.
    pub fn parse_fragment(mut self) -> Result<(NodeId, Vec<ParseDiagnostic>), ParseError> {
        match self.parse_fragment_inner() {
            Ok(root) => Ok((root, self.input.diagnostics)),
            Err(err) => {
                if let Some(root) = self.detached_root.take() {
                    let freed = self.tree.unlink(root).and_then(|()| self.tree.free_node(root));
                    if let Err(cleanup) = freed {
                        warn!(node = root.into_raw(), %cleanup, "partial fragment not freed");
                    }
                }
                Err(err)
            }
        }
    }

    fn parse_fragment_inner(&mut self) -> Result<NodeId, ParseError> {
        self.input.skip_whitespace();
        if self.input.peek() != Some(b'<') {
            return Err(self.input.fatal("start tag expected, '<' not found"));
        }
        let root = self.parse_element(None)?;
        self.input.skip_whitespace();
        if !self.input.at_end() {
            self.input
                .recoverable("extra content at the end of the fragment")?;
        }
        Ok(root)
    }

    fn looking_at_xml_decl(&self) -> bool {
        self.input.looking_at("<?xml")
            && matches!(self.input.peek_at(5), Some(b' ' | b'\t' | b'\r' | b'\n'))
    }

    fn attach(&mut self, parent: NodeId, child: NodeId) -> Result<(), ParseError> {
        self.tree
            .append_child(parent, child)
            .map_err(|e| self.input.fatal(e.to_string()))
    }

    // --- Misc (comments, PIs, whitespace) ---

    fn parse_misc(&mut self, parent: NodeId) -> Result<(), ParseError> {
        loop {
            self.input.skip_whitespace();
            if self.input.looking_at("<!--") {
                self.parse_comment(parent)?;
            } else if self.input.looking_at("<?") {
                self.parse_processing_instruction(parent)?;
            } else {
                return Ok(());
            }
        }
    }

    // --- DOCTYPE ---

    fn parse_doctype(&mut self, parent: NodeId) -> Result<(), ParseError> {
        self.input.expect_str("<!DOCTYPE")?;
        self.input.skip_whitespace_required()?;
        let name = self.input.parse_name()?;
        self.input.skip_whitespace();

        let (public_id, system_id) = self.parse_external_id()?;
        self.input.skip_whitespace();

        if self.input.peek() == Some(b'[') {
            self.input.advance(1);
            self.parse_internal_subset()?;
            self.input.skip_whitespace();
        }
        self.input.expect_byte(b'>')?;

        let id = self.tree.create_node(NodeKind::DocumentType {
            name,
            system_id,
            public_id,
        });
        self.attach(parent, id)
    }

    /// Parses an optional `SYSTEM "..."` or `PUBLIC "..." "..."`.
    fn parse_external_id(&mut self) -> Result<(Option<String>, Option<String>), ParseError> {
        if self.input.looking_at("SYSTEM") {
            self.input.expect_str("SYSTEM")?;
            self.input.skip_whitespace_required()?;
            return Ok((None, Some(self.input.parse_quoted_value()?)));
        }
        if self.input.looking_at("PUBLIC") {
            self.input.expect_str("PUBLIC")?;
            self.input.skip_whitespace_required()?;
            let public_id = self.input.parse_quoted_value()?;
            self.input.skip_whitespace();
            let system_id = match self.input.peek() {
                Some(b'"' | b'\'') => Some(self.input.parse_quoted_value()?),
                _ => None,
            };
            return Ok((Some(public_id), system_id));
        }
        Ok((None, None))
    }

    /// Parses the internal subset up to and including the closing `]`.
    ///
    /// General entity declarations are recorded; every other declaration is
    /// skipped.
    fn parse_internal_subset(&mut self) -> Result<(), ParseError> {
        loop {
            self.input.skip_whitespace();
            if self.input.at_end() {
                return Err(self.input.fatal("unexpected end of input in internal subset"));
            }
            if self.input.peek() == Some(b']') {
                self.input.advance(1);
                return Ok(());
            }
            if self.input.looking_at("<!ENTITY") {
                self.parse_entity_decl()?;
            } else if self.input.looking_at("<!--") {
                parse_comment_content(&mut self.input)?;
            } else if self.input.looking_at("<?") {
                parse_pi_content(&mut self.input)?;
            } else if self.input.looking_at("<!") {
                self.skip_markup_decl()?;
            } else if self.input.peek() == Some(b'%') {
                self.input.advance(1);
                self.input.parse_name()?;
                self.input.expect_byte(b';')?;
            } else {
                return Err(self.input.fatal("malformed internal subset"));
            }
        }
    }

    fn parse_entity_decl(&mut self) -> Result<(), ParseError> {
        self.input.expect_str("<!ENTITY")?;
        self.input.skip_whitespace_required()?;
        let parameter = self.input.peek() == Some(b'%');
        if parameter {
            self.input.advance(1);
            self.input.skip_whitespace_required()?;
        }
        let name = self.input.parse_name()?;
        self.input.skip_whitespace_required()?;

        if matches!(self.input.peek(), Some(b'"' | b'\'')) {
            let value = self.input.parse_quoted_value()?;
            if !parameter {
                self.input.entities.declare_internal(name, value);
            }
        } else {
            let (public_id, system_id) = self.parse_external_id()?;
            if public_id.is_none() && system_id.is_none() {
                return Err(self.input.fatal(format!(
                    "entity '{name}' has neither a value nor an external identifier"
                )));
            }
            self.input.skip_whitespace();
            if self.input.looking_at("NDATA") {
                self.input.expect_str("NDATA")?;
                self.input.skip_whitespace_required()?;
                self.input.parse_name()?;
            }
            if !parameter {
                self.input.entities.declare_external(name);
            }
        }
        self.input.skip_whitespace();
        self.input.expect_byte(b'>')
    }

    /// Skips `<!ELEMENT ...>`, `<!ATTLIST ...>` and similar, honouring quotes.
    fn skip_markup_decl(&mut self) -> Result<(), ParseError> {
        self.input.advance(2);
        loop {
            match self.input.peek() {
                None => return Err(self.input.fatal("unexpected end of input in declaration")),
                Some(b'>') => {
                    self.input.advance(1);
                    return Ok(());
                }
                Some(b'"' | b'\'') => {
                    self.input.parse_quoted_value()?;
                }
                Some(_) => {
                    self.input.next_char()?;
                }
            }
        }
    }

    // --- Elements ---

    fn parse_element(&mut self, parent: Option<NodeId>) -> Result<NodeId, ParseError> {
        self.input.increment_depth()?;
        self.input.expect_byte(b'<')?;
        let qname = self.input.parse_name()?;

        let mut raw = Vec::new();
        loop {
            let had_ws = self.input.skip_whitespace();
            match self.input.peek() {
                Some(b'>') => break,
                Some(b'/') if self.input.peek_at(1) == Some(b'>') => break,
                None => return Err(self.input.fatal("unexpected end of input in start tag")),
                _ => {}
            }
            if !had_ws {
                self.input
                    .recoverable("whitespace required between attributes")?;
            }
            raw.push(self.parse_attribute()?);
        }

        self.ns.push_scope();
        let namespace_decls = self.bind_namespaces(&mut raw)?;
        let (name, prefix, namespace) = self.resolve_name(qname.clone(), true);
        let attributes = self.resolve_attributes(raw)?;

        let id = self.tree.create_node(NodeKind::Element {
            name,
            prefix,
            namespace,
            attributes,
            namespace_decls,
        });
        match parent {
            Some(p) => self.attach(p, id)?,
            None => self.detached_root = Some(id),
        }

        if self.input.looking_at("/>") {
            self.input.advance(2);
        } else {
            self.input.expect_byte(b'>')?;
            self.open.push(qname);
            self.parse_content(id)?;
            self.close_element()?;
            self.open.pop();
        }

        self.ns.pop_scope();
        self.input.decrement_depth();
        Ok(id)
    }

    /// Handles whatever ended the content of the innermost open element.
    fn close_element(&mut self) -> Result<(), ParseError> {
        let current = self.open.last().cloned().unwrap_or_default();
        if self.input.at_end() {
            return self
                .input
                .recoverable(format!("premature end of data in tag {current}"));
        }
        match self.peek_end_tag_name() {
            Some(end) if end == current => self.consume_end_tag(),
            // An ancestor's end tag: leave it for that ancestor.
            Some(end) => {
                self.input.push_diagnostic(
                    ErrorSeverity::Error,
                    format!("opening and ending tag mismatch: {current} and {end}"),
                );
                Ok(())
            }
            None => Err(self.input.fatal("malformed end tag")),
        }
    }

    fn peek_end_tag_name(&mut self) -> Option<String> {
        let saved = self.input.save_position();
        self.input.advance(2);
        let name = self.input.parse_name().ok();
        self.input.restore_position(saved);
        name
    }

    fn consume_end_tag(&mut self) -> Result<(), ParseError> {
        self.input.expect_str("</")?;
        self.input.parse_name()?;
        self.input.skip_whitespace();
        if self.input.peek() == Some(b'>') {
            self.input.advance(1);
            Ok(())
        } else {
            self.input.recoverable("expected '>' at the end of an end tag")
        }
    }

    fn parse_attribute(&mut self) -> Result<(String, String), ParseError> {
        let name = self.input.parse_name()?;
        self.input.skip_whitespace();
        self.input.expect_byte(b'=')?;
        self.input.skip_whitespace();
        let value = self.input.parse_attribute_value()?;
        Ok((name, value))
    }

    /// Moves `xmlns` and `xmlns:*` attributes out of `raw` into the current
    /// scope and returns them as declarations.
    fn bind_namespaces(
        &mut self,
        raw: &mut Vec<(String, String)>,
    ) -> Result<Vec<NamespaceDecl>, ParseError> {
        let mut decls = Vec::new();
        let mut kept = Vec::with_capacity(raw.len());
        for (qname, value) in raw.drain(..) {
            if qname == "xmlns" {
                if value == XML_NAMESPACE || value == XMLNS_NAMESPACE {
                    self.input.recoverable(format!(
                        "{value} cannot be the default namespace"
                    ))?;
                    continue;
                }
                self.ns.bind(None, value.clone());
                decls.push(NamespaceDecl {
                    prefix: None,
                    uri: value,
                });
            } else if let Some(prefix) = qname.strip_prefix("xmlns:") {
                let is_xml = prefix == "xml";
                if prefix == "xmlns"
                    || value.is_empty()
                    || value == XMLNS_NAMESPACE
                    || is_xml != (value == XML_NAMESPACE)
                {
                    self.input.recoverable(format!(
                        "invalid namespace declaration xmlns:{prefix}=\"{value}\""
                    ))?;
                    continue;
                }
                if is_xml {
                    continue;
                }
                self.ns.bind(Some(prefix.to_owned()), value.clone());
                decls.push(NamespaceDecl {
                    prefix: Some(prefix.to_owned()),
                    uri: value,
                });
            } else {
                kept.push((qname, value));
            }
        }
        *raw = kept;
        Ok(decls)
    }

    /// Splits and resolves a qualified name into `(local, prefix, namespace)`.
    ///
    /// An undefined prefix is reported and leaves the whole qualified name as
    /// an un-namespaced local name. Unprefixed attributes never take the
    /// default namespace.
    fn resolve_name(
        &mut self,
        qname: String,
        is_element: bool,
    ) -> (String, Option<String>, Option<String>) {
        if let (Some(prefix), local) = split_name(&qname) {
            if let Some(uri) = self.ns.resolve(Some(prefix)) {
                return (local.to_owned(), Some(prefix.to_owned()), Some(uri.to_owned()));
            }
            let message = format!("namespace prefix {prefix} on {local} is not defined");
            self.input.push_diagnostic(ErrorSeverity::Error, message);
            return (qname, None, None);
        }
        let namespace = if is_element {
            self.ns.resolve(None).map(str::to_owned)
        } else {
            None
        };
        (qname, None, namespace)
    }

    fn resolve_attributes(
        &mut self,
        raw: Vec<(String, String)>,
    ) -> Result<Vec<Attribute>, ParseError> {
        let mut attributes: Vec<Attribute> = Vec::with_capacity(raw.len());
        for (qname, value) in raw {
            let (name, prefix, namespace) = self.resolve_name(qname, false);
            let duplicate = attributes.iter().any(|a| {
                a.name == name
                    && match (&a.namespace, &namespace) {
                        (Some(x), Some(y)) => x == y,
                        (None, None) => a.prefix == prefix,
                        _ => false,
                    }
            });
            if duplicate {
                let shown = match &prefix {
                    Some(p) => format!("{p}:{name}"),
                    None => name.clone(),
                };
                self.input
                    .recoverable(format!("attribute {shown} redefined"))?;
                continue;
            }
            attributes.push(Attribute {
                name,
                prefix,
                namespace,
                value,
            });
        }
        Ok(attributes)
    }

    // --- Content ---

    fn parse_content(&mut self, parent: NodeId) -> Result<(), ParseError> {
        loop {
            if self.input.at_end() {
                return Ok(());
            }
            if self.input.looking_at("</") {
                match self.peek_end_tag_name() {
                    Some(end) if self.open.last() == Some(&end) => return Ok(()),
                    Some(end) if self.input.recover() && self.open.contains(&end) => {
                        return Ok(());
                    }
                    Some(end) => {
                        let current = self.open.last().cloned().unwrap_or_default();
                        self.input.recoverable(format!(
                            "opening and ending tag mismatch: {current} and {end}"
                        ))?;
                        self.consume_end_tag()?;
                    }
                    None => {
                        self.input.recoverable("malformed end tag")?;
                        self.input.take_until(|c| c == '>');
                        if !self.input.at_end() {
                            self.input.advance(1);
                        }
                    }
                }
                continue;
            }

            if self.input.looking_at("<![CDATA[") {
                let content = parse_cdata_content(&mut self.input)?;
                let id = self.tree.create_node(NodeKind::CData { content });
                self.attach(parent, id)?;
            } else if self.input.looking_at("<!--") {
                self.parse_comment(parent)?;
            } else if self.input.looking_at("<?") {
                self.parse_processing_instruction(parent)?;
            } else if self.input.peek() == Some(b'<') {
                let starts_name = self.input.remaining()[1..]
                    .chars()
                    .next()
                    .is_some_and(is_name_start_char);
                if starts_name {
                    self.parse_element(Some(parent))?;
                } else {
                    self.input
                        .recoverable("'<' is not followed by a tag name")?;
                    self.input.advance(1);
                    self.append_text(parent, "<".to_owned())?;
                }
            } else {
                self.parse_char_data(parent)?;
            }
        }
    }

    fn parse_char_data(&mut self, parent: NodeId) -> Result<(), ParseError> {
        let mut text = String::new();
        loop {
            let chunk = self
                .input
                .take_until(|c| matches!(c, '<' | '&' | '\r'));
            if let Some(bad) = chunk.chars().find(|&c| !is_xml_char(c)) {
                self.input
                    .recoverable(format!("invalid XML character: U+{:04X}", bad as u32))?;
            }
            text.push_str(chunk);
            match self.input.peek() {
                Some(b'&') => self.input.parse_reference(&mut text)?,
                Some(b'\r') => text.push(self.input.next_char()?),
                _ => break,
            }
        }
        self.append_text(parent, text)
    }

    fn append_text(&mut self, parent: NodeId, text: String) -> Result<(), ParseError> {
        if text.is_empty() {
            return Ok(());
        }
        if self.input.options().contains(ParseOptions::NOBLANKS)
            && text.chars().all(|c| matches!(c, ' ' | '\t' | '\n' | '\r'))
        {
            return Ok(());
        }
        // Merge with a preceding text node so recovered '<' stays contiguous.
        if let Some(last) = self.tree.last_child(parent) {
            if let NodeKind::Text { content } = &mut self.tree.node_mut(last).kind {
                content.push_str(&text);
                return Ok(());
            }
        }
        let id = self.tree.create_node(NodeKind::Text { content: text });
        self.attach(parent, id)
    }

    fn parse_comment(&mut self, parent: NodeId) -> Result<(), ParseError> {
        let content = parse_comment_content(&mut self.input)?;
        let id = self.tree.create_node(NodeKind::Comment { content });
        self.attach(parent, id)
    }

    fn parse_processing_instruction(&mut self, parent: NodeId) -> Result<(), ParseError> {
        let (target, data) = parse_pi_content(&mut self.input)?;
        let id = self
            .tree
            .create_node(NodeKind::ProcessingInstruction { target, data });
        self.attach(parent, id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::tree::{AllocCounters, DocumentKind};

    fn parse_with(input: &str, options: ParseOptions) -> Result<Tree, ParseError> {
        let mut tree = Tree::new(DocumentKind::Xml, Arc::default());
        let diagnostics =
            XmlParser::new(input, options, &mut tree, NamespaceResolver::new()).parse_document()?;
        tree.diagnostics = diagnostics;
        Ok(tree)
    }

    fn parse(input: &str) -> Tree {
        parse_with(input, ParseOptions::empty()).unwrap()
    }

    fn recover(input: &str) -> Tree {
        parse_with(input, ParseOptions::RECOVER).unwrap()
    }

    fn child_names(tree: &Tree, id: NodeId) -> Vec<String> {
        tree.children(id)
            .filter_map(|c| tree.qualified_name(c))
            .collect()
    }

    #[test]
    fn test_parse_nested_elements_and_text() {
        let tree = parse("<?xml version=\"1.0\"?><root><a>one</a><b x='1'/>tail</root>");
        let root = tree.root_element().unwrap();
        assert_eq!(tree.node_name(root), Some("root"));
        assert_eq!(child_names(&tree, root), vec!["a", "b"]);
        assert_eq!(tree.text_content(root), "onetail");
        let b = tree.children(root).nth(1).unwrap();
        assert_eq!(tree.attribute(b, "x"), Some("1"));
        assert_eq!(tree.version.as_deref(), Some("1.0"));
    }

    #[test]
    fn test_comments_pis_cdata() {
        let tree = parse("<!--pre--><r><![CDATA[<raw>]]><?pi data?><!--c--></r>");
        let top: Vec<&str> = tree
            .children(tree.root())
            .map(|c| tree.node(c).kind.type_name())
            .collect();
        assert_eq!(top, vec!["comment", "element"]);
        let r = tree.root_element().unwrap();
        let kinds: Vec<&str> = tree
            .children(r)
            .map(|c| tree.node(c).kind.type_name())
            .collect();
        assert_eq!(kinds, vec!["cdata", "pi", "comment"]);
        assert_eq!(tree.text_content(r), "<raw>");
    }

    #[test]
    fn test_namespaces_resolved() {
        let tree = parse(
            "<r xmlns='urn:d' xmlns:s='urn:s'><s:a s:k='v' k='w'/><b xmlns=''/></r>",
        );
        let r = tree.root_element().unwrap();
        assert_eq!(tree.node_namespace(r), Some("urn:d"));
        let a = tree.first_child(r).unwrap();
        assert_eq!(tree.node_namespace(a), Some("urn:s"));
        assert_eq!(tree.node_prefix(a), Some("s"));
        assert_eq!(tree.attribute_ns(a, "k", Some("urn:s")), Some("v"));
        assert_eq!(tree.attribute_ns(a, "k", None), Some("w"));
        let b = tree.last_child(r).unwrap();
        assert_eq!(tree.node_namespace(b), None);
    }

    #[test]
    fn test_undefined_prefix_leaves_name_unnamespaced() {
        let tree = parse("<r><p:a/></r>");
        let a = tree.first_child(tree.root_element().unwrap()).unwrap();
        assert_eq!(tree.node_name(a), Some("p:a"));
        assert_eq!(tree.node_namespace(a), None);
        assert_eq!(tree.diagnostics.len(), 1);
    }

    #[test]
    fn test_internal_entities_from_doctype() {
        let tree = parse(
            "<!DOCTYPE r [<!ENTITY who \"world\"><!ELEMENT r ANY><!ENTITY ext SYSTEM \"x.ent\">]>\
             <r>hello &who;&ext;</r>",
        );
        let r = tree.root_element().unwrap();
        assert_eq!(tree.text_content(r), "hello world");
        let doctype = tree.first_child(tree.root()).unwrap();
        assert!(matches!(
            &tree.node(doctype).kind,
            NodeKind::DocumentType { name, .. } if name == "r"
        ));
    }

    #[test]
    fn test_mismatched_end_tag_strict_fails() {
        assert!(parse_with("<a><b></a>", ParseOptions::empty()).is_err());
    }

    #[test]
    fn test_mismatched_end_tag_closes_up_to_ancestor() {
        let tree = recover("<a><b><c>x</a>");
        let a = tree.root_element().unwrap();
        assert_eq!(child_names(&tree, a), vec!["b"]);
        let b = tree.first_child(a).unwrap();
        assert_eq!(child_names(&tree, b), vec!["c"]);
        assert!(!tree.diagnostics.is_empty());
    }

    #[test]
    fn test_stray_end_tag_is_ignored() {
        let tree = recover("<a>1</x>2</a>");
        let a = tree.root_element().unwrap();
        assert_eq!(tree.text_content(a), "12");
    }

    #[test]
    fn test_unclosed_elements_closed_at_eof() {
        let tree = recover("<a><b>text");
        let a = tree.root_element().unwrap();
        assert_eq!(tree.text_content(a), "text");
    }

    #[test]
    fn test_trailing_content_ignored_in_recovery() {
        assert!(parse_with("<a/><b/>", ParseOptions::empty()).is_err());
        let tree = recover("<a/><b/>");
        assert_eq!(tree.children(tree.root()).count(), 1);
    }

    #[test]
    fn test_missing_root_fails_even_in_recovery() {
        assert!(parse_with("just text", ParseOptions::RECOVER).is_err());
        assert!(parse_with("<!-- only a comment -->", ParseOptions::RECOVER).is_err());
    }

    #[test]
    fn test_depth_limit_is_fatal_in_recovery() {
        let deep = "<a>".repeat(300);
        assert!(parse_with(&deep, ParseOptions::RECOVER).is_err());
    }

    #[test]
    fn test_noblanks_drops_whitespace_text() {
        let tree = parse_with("<a>\n  <b/>\n</a>", ParseOptions::NOBLANKS).unwrap();
        let a = tree.root_element().unwrap();
        assert_eq!(tree.children(a).count(), 1);
    }

    #[test]
    fn test_duplicate_attribute() {
        assert!(parse_with("<a x='1' x='2'/>", ParseOptions::empty()).is_err());
        let tree = recover("<a x='1' x='2'/>");
        let a = tree.root_element().unwrap();
        assert_eq!(tree.attributes(a).len(), 1);
        assert_eq!(tree.attribute(a, "x"), Some("1"));
    }

    #[test]
    fn test_fragment_uses_seeded_namespaces() {
        let mut tree = Tree::new(DocumentKind::Xml, Arc::default());
        let ns = NamespaceResolver::with_bindings([(Some("s".to_owned()), "urn:s".to_owned())]);
        let (root, _) = XmlParser::new("<root><s:a/>text</root>", ParseOptions::RECOVER, &mut tree, ns)
            .parse_fragment()
            .unwrap();
        assert_eq!(tree.parent(root), None);
        let a = tree.first_child(root).unwrap();
        assert_eq!(tree.node_namespace(a), Some("urn:s"));
    }

    #[test]
    fn test_failed_fragment_frees_partial_nodes() {
        let counters = Arc::new(AllocCounters::default());
        let mut tree = Tree::new(DocumentKind::Xml, Arc::clone(&counters));
        let result = XmlParser::new(
            "<root><a>&#xFFFFFFFF;",
            ParseOptions::empty(),
            &mut tree,
            NamespaceResolver::new(),
        )
        .parse_fragment();
        assert!(result.is_err());
        assert_eq!(tree.live_count(), 1);
        drop(tree);
        assert!(counters.snapshot().is_balanced());
    }
}
