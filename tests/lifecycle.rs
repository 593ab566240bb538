//! Document lifecycle: every node is freed exactly once, whatever path it
//! took through the document.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use pretty_assertions::assert_eq;
use xmlward::tree::AllocCounters;
use xmlward::{Document, DocumentError, ParseOptions};

fn parse_counted(xml: &str, counters: &Arc<AllocCounters>) -> Document {
    Document::parse_with_counters(
        xml.as_bytes(),
        None,
        None,
        None,
        ParseOptions::DEFAULT,
        Arc::clone(counters),
    )
    .unwrap()
}

#[test]
fn test_teardown_of_untouched_document_is_balanced() {
    let counters = Arc::new(AllocCounters::default());
    let doc = parse_counted("<a><b>text</b><!-- c --><?pi d?></a>", &counters);
    let live = doc.tree().live_count();
    let report = doc.teardown();
    assert_eq!(report.tree_nodes, live);
    assert_eq!(report.tracked_nodes, 0);
    assert!(counters.snapshot().is_balanced());
}

#[test]
fn test_root_matches_document_element() {
    for xml in ["<root/>", "<?xml version='1.0'?><!-- x --><top a='1'/>", "<p:e xmlns:p='urn:p'/>"] {
        let doc = Document::parse_str(xml).unwrap();
        let root = doc.root().unwrap();
        let expected = xml
            .rsplit('<')
            .next()
            .and_then(|t| t.split([' ', '/', '>']).next())
            .unwrap();
        assert_eq!(root.qualified_name().as_deref(), Some(expected));
    }
}

#[test]
fn test_empty_input_gives_rootless_document() {
    let doc = Document::parse(b"", Some("file:///empty.xml"), None, None, ParseOptions::DEFAULT)
        .unwrap();
    assert!(doc.root().is_none());
    assert!(doc.teardown().counters.is_balanced());
}

#[test]
fn test_unlinked_node_is_freed_exactly_once() {
    let counters = Arc::new(AllocCounters::default());
    let mut doc = parse_counted("<r><a><x/><y/></a><b/></r>", &counters);
    let a = doc.query("/r/a").unwrap()[0].id();
    doc.unlink(a).unwrap();
    // Unlinking a second time is harmless: the node is already parentless.
    doc.unlink(a).unwrap();
    doc.track_detached(a).unwrap();
    assert_eq!(doc.tracked_count(), 1);

    let report = doc.teardown();
    assert_eq!(report.tracked_roots, 1);
    assert_eq!(report.tracked_nodes, 3);
    let snap = counters.snapshot();
    assert_eq!(snap.double_frees, 0);
    assert!(snap.is_balanced());
}

#[test]
fn test_reattached_node_is_freed_with_the_tree() {
    let counters = Arc::new(AllocCounters::default());
    let mut doc = parse_counted("<r><a/><b/></r>", &counters);
    let a = doc.query("/r/a").unwrap()[0].id();
    let b = doc.query("/r/b").unwrap()[0].id();
    doc.unlink(a).unwrap();
    doc.append_child(b, a).unwrap();
    assert!(!doc.is_tracked(a));
    assert_eq!(doc.query("/r/b/a").unwrap().len(), 1);

    let report = doc.teardown();
    assert_eq!(report.tracked_nodes, 0);
    assert!(counters.snapshot().is_balanced());
}

#[test]
fn test_created_nodes_can_be_attached_or_tracked() {
    let counters = Arc::new(AllocCounters::default());
    let mut doc = parse_counted("<r/>", &counters);
    let r = doc.root().unwrap().id();

    let e = doc.create_element("item");
    let t = doc.create_text("hello");
    doc.append_child(e, t).unwrap();
    doc.append_child(r, e).unwrap();

    let c = doc.create_cdata("<raw>");
    doc.insert_before(e, c).unwrap();

    let spare = doc.create_comment("spare");
    doc.track_detached(spare).unwrap();

    assert_eq!(doc.root().unwrap().text_content(), "<raw>hello");
    let report = doc.teardown();
    assert_eq!(report.tracked_nodes, 1);
    assert_eq!(report.dangling, 0);
    assert!(counters.snapshot().is_balanced());
}

#[test]
fn test_moves_that_would_corrupt_the_tree_are_refused() {
    let mut doc = Document::parse_str("<r><a><b/></a></r>").unwrap();
    let a = doc.query("//a").unwrap()[0].id();
    let b = doc.query("//b").unwrap()[0].id();
    let document_node = doc.tree().root();

    assert!(matches!(
        doc.append_child(b, a),
        Err(DocumentError::StillAttached(_))
    ));
    doc.unlink(a).unwrap();
    let err = doc.append_child(b, a).unwrap_err();
    assert!(matches!(err, DocumentError::HierarchyCycle { .. }));
    assert!(matches!(
        doc.append_child(a, document_node),
        Err(DocumentError::DocumentNode(_))
    ));
    assert!(doc.teardown().counters.is_balanced());
}

#[test]
fn test_stale_handles_are_reported() {
    let mut doc = Document::parse_str("<r/>").unwrap();
    let mut other = Document::parse_str("<x><y/><z/></x>").unwrap();
    let foreign = other.query("//z").unwrap()[0].id();
    assert!(doc.node(foreign).is_none());
    assert!(matches!(
        doc.track_detached(foreign),
        Err(DocumentError::StaleNode(_))
    ));
}

#[test]
fn test_handles_from_another_document_are_refused() {
    let mut doc = Document::parse_str("<a><x/><y/></a>").unwrap();
    let mut other = Document::parse_str("<b><p/><q/></b>").unwrap();
    let own_y = doc.query("/a/y").unwrap()[0].id();
    let foreign_q = other.query("/b/q").unwrap()[0].id();
    // The foreign handle names the same slot as one of this document's nodes.
    assert_eq!(foreign_q.into_raw(), own_y.into_raw());

    assert!(doc.node(foreign_q).is_none());
    assert!(matches!(doc.unlink(foreign_q), Err(DocumentError::StaleNode(_))));
    assert!(matches!(
        doc.track_detached(foreign_q),
        Err(DocumentError::StaleNode(_))
    ));
    let a = doc.root().unwrap().id();
    assert!(matches!(
        doc.append_child(a, foreign_q),
        Err(DocumentError::StaleNode(_))
    ));
    let any = xmlward::xpath::compile(".").unwrap();
    assert!(matches!(
        doc.evaluate(Some(foreign_q), &any),
        Err(xmlward::xpath::XPathError::InvalidContext { .. })
    ));

    assert_eq!(doc.tracked_count(), 0);
    let names: Vec<_> = doc
        .query("/a/*")
        .unwrap()
        .iter()
        .filter_map(|n| n.qualified_name())
        .collect();
    assert_eq!(names, vec!["x", "y"]);
    assert!(doc.teardown().counters.is_balanced());
    assert!(other.teardown().counters.is_balanced());
}
