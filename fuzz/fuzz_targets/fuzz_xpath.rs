#![no_main]
use libfuzzer_sys::fuzz_target;
use xmlward::xpath::compile;
use xmlward::Document;

fuzz_target!(|data: &[u8]| {
    if let Ok(expr) = std::str::from_utf8(data) {
        if let Ok(mut doc) =
            Document::parse_str("<root xmlns:p=\"urn:p\"><child attr=\"val\">text</child><p:x/></root>")
        {
            let _ = doc.register_namespace("p", "urn:p");
            // Compiling and evaluating should never panic on any expression.
            if let Ok(compiled) = compile(expr) {
                let root = doc.root().map(|r| r.id());
                let _ = doc.evaluate_value(root, &compiled);
            }
        }
    }
});
