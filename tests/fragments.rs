//! Fragment parsing against documents.

#![allow(clippy::unwrap_used)]

use pretty_assertions::assert_eq;
use xmlward::document::parse_fragment_standalone;
use xmlward::tree::NodeKind;
use xmlward::{Document, DocumentError, ParseOptions};

#[test]
fn test_siblings_keep_input_order() {
    let mut doc = Document::parse_str("<r/>").unwrap();
    let id = doc
        .parse_fragment(b"<a/><b/>text", None, ParseOptions::DEFAULT)
        .unwrap()
        .unwrap();
    let nodes = doc.fragment_nodes(id);
    let described: Vec<(&str, String)> = nodes
        .iter()
        .map(|n| (n.kind().type_name(), n.qualified_name().unwrap_or_else(|| n.text_content())))
        .collect();
    assert_eq!(
        described,
        vec![
            ("element", "a".to_owned()),
            ("element", "b".to_owned()),
            ("text", "text".to_owned()),
        ]
    );
    for n in &nodes {
        assert!(n.parent().is_none());
        assert!(n.next_sibling().is_none());
    }
}

#[test]
fn test_synthetic_wrapper_never_escapes() {
    let mut doc = Document::parse_str("<r/>").unwrap();
    let before = doc.tree().live_count();
    let id = doc
        .parse_fragment(b"<root/>x", None, ParseOptions::DEFAULT)
        .unwrap()
        .unwrap();
    // Only the two parsed nodes were added: the wrapper is already freed.
    assert_eq!(doc.tree().live_count(), before + 2);
    assert_eq!(doc.fragment(id).unwrap().len(), 2);
    assert_eq!(doc.tracked_count(), 0);
    let report = doc.teardown();
    assert_eq!(report.tracked_roots, 2);
    assert!(report.counters.is_balanced());
}

#[test]
fn test_fragment_sees_root_namespaces() {
    let mut doc = Document::parse_str("<r xmlns:p='urn:p'/>").unwrap();
    let id = doc
        .parse_fragment(b"<p:item/>", None, ParseOptions::DEFAULT)
        .unwrap()
        .unwrap();
    let item = doc.fragment_nodes(id)[0];
    assert_eq!(item.namespace(), Some("urn:p"));
    assert_eq!(item.name(), Some("item"));
}

#[test]
fn test_failed_fragment_records_nothing() {
    let mut doc = Document::parse_str("<r/>").unwrap();
    let counters = doc.counters();
    let before = doc.tree().live_count();
    let err = doc
        .parse_fragment(b"<a><b></a>", None, ParseOptions::empty())
        .unwrap_err();
    assert!(matches!(err, DocumentError::FragmentParseFailure(_)));
    assert_eq!(doc.fragment_count(), 0);
    assert_eq!(doc.tree().live_count(), before);
    drop(doc);
    assert!(counters.snapshot().is_balanced());
}

#[test]
fn test_attached_fragment_nodes_stay_in_the_tree() {
    let mut doc = Document::parse_str("<r/>").unwrap();
    let r = doc.root().unwrap().id();
    let id = doc
        .parse_fragment(b"<a/><b/>", None, ParseOptions::DEFAULT)
        .unwrap()
        .unwrap();
    let a = doc.fragment(id).unwrap().children()[0];
    doc.append_child(r, a).unwrap();

    assert!(doc.remove_fragment(id));
    assert_eq!(doc.tracked_count(), 1);
    assert_eq!(doc.query("/r/a").unwrap().len(), 1);

    let report = doc.teardown();
    assert_eq!(report.tracked_roots, 1);
    assert!(report.counters.is_balanced());
}

#[test]
fn test_standalone_fragment_owns_a_fresh_document() {
    let (doc, id) = parse_fragment_standalone(b"<x/><!--c-->", None, ParseOptions::DEFAULT).unwrap();
    assert!(doc.root().is_none());
    let kinds: Vec<bool> = doc
        .fragment_nodes(id.unwrap())
        .iter()
        .map(|n| matches!(n.kind(), NodeKind::Comment { .. }))
        .collect();
    assert_eq!(kinds, vec![false, true]);

    let (doc, id) = parse_fragment_standalone(b"", None, ParseOptions::DEFAULT).unwrap();
    assert!(id.is_none());
    assert!(doc.teardown().counters.is_balanced());
}

#[test]
fn test_many_fragments_teardown_cleanly() {
    let mut doc = Document::parse_str("<r/>").unwrap();
    for i in 0..20 {
        let snippet = format!("<n i='{i}'/>{i}");
        doc.parse_fragment(snippet.as_bytes(), None, ParseOptions::DEFAULT)
            .unwrap();
    }
    assert_eq!(doc.fragment_count(), 20);
    let report = doc.teardown();
    assert_eq!(report.fragments, 20);
    assert_eq!(report.tracked_roots, 40);
    assert!(report.counters.is_balanced());
}
