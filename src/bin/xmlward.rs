//! Command-line front end.
//!
//! Parses XML files into documents, optionally parses fragments into them,
//! runs `XPath` queries, and prints what teardown freed. Set `RUST_LOG` (for
//! example `RUST_LOG=xmlward=debug`) to see the lifecycle logs.

use std::fs;
use std::io::{self, Read};
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use xmlward::xpath::{compile, XPathNode, XPathValue};
use xmlward::xpath::types::format_number;
use xmlward::{Document, ParseOptions};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// xmlward -- parse XML, query it with XPath, and account for every node.
#[derive(Parser, Debug)]
#[command(name = "xmlward", version, about, long_about = None)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// XML files to process (use `-` for stdin).
    #[arg(required = true)]
    files: Vec<String>,

    /// Print parser diagnostics.
    #[arg(long)]
    verbose: bool,

    // -- Parsing options ---------------------------------------------------
    /// Fail on malformed markup instead of recovering.
    #[arg(long)]
    strict: bool,

    /// Remove blank (whitespace-only) text nodes.
    #[arg(long)]
    noblanks: bool,

    /// Input encoding, overriding the XML declaration.
    #[arg(long, value_name = "ENCODING")]
    encoding: Option<String>,

    // -- Queries -----------------------------------------------------------
    /// Bind a namespace prefix for queries, as `prefix=uri`. Repeatable.
    #[arg(long = "ns", value_name = "PREFIX=URI")]
    namespaces: Vec<String>,

    /// Evaluate an XPath expression at the document node. Repeatable.
    #[allow(clippy::doc_markdown)]
    #[arg(long, value_name = "EXPR")]
    xpath: Vec<String>,

    /// Parse a fragment into each document and list its nodes.
    #[arg(long, value_name = "MARKUP")]
    fragment: Option<String>,

    // -- Reporting ---------------------------------------------------------
    /// Print per-operation call counts and timings.
    #[arg(long)]
    profile: bool,

    /// Print what teardown freed.
    #[arg(long)]
    report: bool,
}

// ---------------------------------------------------------------------------
// Exit codes
// ---------------------------------------------------------------------------

const EXIT_SUCCESS: u8 = 0;
const EXIT_PARSE_ERROR: u8 = 1;
const EXIT_QUERY_ERROR: u8 = 2;
const EXIT_LEAK: u8 = 3;

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("xmlward=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let mut worst_exit = EXIT_SUCCESS;
    for file in &cli.files {
        worst_exit = worst_exit.max(process_file(&cli, file));
    }
    ExitCode::from(worst_exit)
}

fn parse_options(cli: &Cli) -> ParseOptions {
    let mut options = ParseOptions::DEFAULT;
    if cli.strict {
        options.remove(ParseOptions::RECOVER);
    }
    if cli.verbose {
        options.remove(ParseOptions::NOERROR | ParseOptions::NOWARNING);
    }
    if cli.noblanks {
        options.insert(ParseOptions::NOBLANKS);
    }
    options
}

/// Processes a single input file and returns an exit code.
fn process_file(cli: &Cli, filename: &str) -> u8 {
    let input = match read_input(filename) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("{filename}: failed to read: {e}");
            return EXIT_PARSE_ERROR;
        }
    };

    let options = parse_options(cli);
    let url = (filename != "-").then_some(filename);
    let mut doc = match Document::parse(&input, url, cli.encoding.as_deref(), None, options) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("{filename}: {e}");
            return EXIT_PARSE_ERROR;
        }
    };

    let mut exit_code = EXIT_SUCCESS;

    for binding in &cli.namespaces {
        let Some((prefix, uri)) = binding.split_once('=') else {
            eprintln!("{filename}: namespace binding must be PREFIX=URI: {binding}");
            exit_code = EXIT_QUERY_ERROR;
            continue;
        };
        if let Err(e) = doc.register_namespace(prefix, uri) {
            eprintln!("{filename}: {e}");
            exit_code = EXIT_QUERY_ERROR;
        }
    }

    if let Some(markup) = &cli.fragment {
        match doc.parse_fragment(markup.as_bytes(), url, options) {
            Ok(Some(id)) => {
                for node in doc.fragment_nodes(id) {
                    println!("{filename}: fragment {}", describe(node));
                }
            }
            Ok(None) => {}
            Err(e) => {
                eprintln!("{filename}: {e}");
                exit_code = EXIT_PARSE_ERROR;
            }
        }
    }

    for expr in &cli.xpath {
        if let Err(msg) = run_query(&mut doc, expr) {
            eprintln!("{filename}: {msg}");
            exit_code = exit_code.max(EXIT_QUERY_ERROR);
        }
    }

    if cli.verbose {
        for diag in doc.diagnostics() {
            eprintln!("{filename}: {diag}");
        }
    }
    if cli.profile {
        eprint!("{}", doc.profile());
    }

    let report = doc.teardown();
    if cli.report {
        eprintln!(
            "{filename}: freed {} tree nodes, {} tracked nodes, {} fragments; {} dangling",
            report.tree_nodes, report.tracked_nodes, report.fragments, report.dangling
        );
    }
    if !report.counters.is_balanced() {
        eprintln!("{filename}: allocation counters unbalanced: {:?}", report.counters);
        exit_code = exit_code.max(EXIT_LEAK);
    }
    exit_code
}

/// Reads input from a file or stdin (when filename is `-`).
fn read_input(filename: &str) -> io::Result<Vec<u8>> {
    if filename == "-" {
        let mut buf = Vec::new();
        io::stdin().read_to_end(&mut buf)?;
        Ok(buf)
    } else {
        fs::read(filename)
    }
}

fn run_query(doc: &mut Document, expression: &str) -> Result<(), String> {
    let expr = compile(expression).map_err(|e| e.to_string())?;
    let context = Some(doc.tree().root());
    let value = doc
        .evaluate_value(context, &expr)
        .map_err(|e| e.to_string())?;
    match value {
        XPathValue::NodeSet(items) => {
            for item in items {
                match item {
                    XPathNode::Node(id) => {
                        if let Some(node) = doc.node(id) {
                            println!("{}", describe(node));
                        }
                    }
                    XPathNode::Attribute { owner, index } => {
                        if let Some(attr) = doc.tree().attributes(owner).get(index) {
                            println!("attribute {}={:?}", attr.qualified_name(), attr.value);
                        }
                    }
                }
            }
        }
        XPathValue::Boolean(b) => println!("{b}"),
        XPathValue::Number(n) => println!("{}", format_number(n)),
        XPathValue::String(s) => println!("{s}"),
    }
    Ok(())
}

fn describe(node: xmlward::NodeRef<'_>) -> String {
    let kind = node.kind().type_name();
    match node.qualified_name() {
        Some(name) => format!("{kind} {name}"),
        None => format!("{kind} {:?}", node.text_content()),
    }
}
