#![allow(clippy::expect_used)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::fmt::Write;
use xmlward::xpath::compile;
use xmlward::{Document, ParseOptions};

// ---------------------------------------------------------------------------
// Document generators
// ---------------------------------------------------------------------------

/// Generates a catalog with `n` books.
fn make_catalog(n: usize) -> String {
    let mut xml = String::from("<?xml version=\"1.0\"?>\n<catalog>\n");
    for i in 0..n {
        let _ = writeln!(
            xml,
            "  <book id=\"bk{i}\"><title>Title {i}</title>\
             <author>Author {i}</author>\
             <price>{}.99</price></book>",
            10 + i % 50
        );
    }
    xml.push_str("</catalog>\n");
    xml
}

/// Generates a snippet of `n` sibling elements separated by text.
fn make_fragment(n: usize) -> String {
    let mut xml = String::new();
    for i in 0..n {
        let _ = write!(xml, "<item n=\"{i}\"/>sep");
    }
    xml
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_parse_and_teardown(c: &mut Criterion) {
    let xml = make_catalog(1000);
    c.bench_function("parse_teardown_1000", |b| {
        b.iter(|| {
            let doc = Document::parse(
                black_box(xml.as_bytes()),
                None,
                None,
                None,
                ParseOptions::DEFAULT,
            )
            .expect("parse");
            black_box(doc.teardown())
        });
    });
}

fn bench_compiled_query_reuse(c: &mut Criterion) {
    let xml = make_catalog(100);
    let mut doc = Document::parse_str(&xml).expect("parse");
    let books: Vec<_> = doc
        .query("//book")
        .expect("query")
        .iter()
        .map(|n| n.id())
        .collect();
    let expr = compile("title[contains(., '1')]").expect("compile");
    c.bench_function("compiled_query_reuse", |b| {
        b.iter(|| {
            for &book in &books {
                black_box(doc.evaluate(Some(book), &expr).expect("evaluate"));
            }
        });
    });
}

fn bench_xpath_complex(c: &mut Criterion) {
    let xml = make_catalog(1000);
    let mut doc = Document::parse_str(&xml).expect("parse");
    let root = Some(doc.tree().root());
    let expr = compile("//book[price > 30 and starts-with(author, 'Author 1')]/title")
        .expect("compile");
    c.bench_function("xpath_complex", |b| {
        b.iter(|| black_box(doc.evaluate(root, &expr).expect("evaluate")));
    });
}

fn bench_fragment_parse(c: &mut Criterion) {
    let snippet = make_fragment(50);
    c.bench_function("fragment_50", |b| {
        b.iter(|| {
            let mut doc = Document::parse_str("<r/>").expect("parse");
            doc.parse_fragment(black_box(snippet.as_bytes()), None, ParseOptions::DEFAULT)
                .expect("fragment");
            black_box(doc.teardown())
        });
    });
}

// ---------------------------------------------------------------------------
// Criterion groups and main
// ---------------------------------------------------------------------------

criterion_group!(lifecycle, bench_parse_and_teardown, bench_fragment_parse);
criterion_group!(queries, bench_compiled_query_reuse, bench_xpath_complex);
criterion_main!(lifecycle, queries);
