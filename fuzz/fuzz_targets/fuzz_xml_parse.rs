#![no_main]
use libfuzzer_sys::fuzz_target;
use xmlward::{Document, ParseOptions};

fuzz_target!(|data: &[u8]| {
    // Strict and recovering parses must never panic, and whatever tree
    // comes out must tear down without a leak or a double free.
    for options in [ParseOptions::empty(), ParseOptions::DEFAULT] {
        if let Ok(doc) = Document::parse(data, None, None, None, options) {
            assert!(doc.teardown().counters.is_balanced());
        }
    }
});
