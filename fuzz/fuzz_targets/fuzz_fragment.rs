#![no_main]
use libfuzzer_sys::fuzz_target;
use xmlward::{Document, ParseOptions};

fuzz_target!(|data: &[u8]| {
    let Ok(mut doc) = Document::parse_str("<root xmlns:p=\"urn:p\"/>") else {
        return;
    };
    let _ = doc.parse_fragment(data, None, ParseOptions::DEFAULT);
    let _ = doc.parse_fragment(data, None, ParseOptions::empty());
    // Fragments, failed or not, never leak their wrapper or their nodes.
    assert!(doc.teardown().counters.is_balanced());
});
