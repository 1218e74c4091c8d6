//! Command-line front end: verify input text against a grammar.
//!
//! Exit codes: 0 = input accepted, 1 = input rejected, 2 = error (bad
//! grammar, unresolved link, resource limit, I/O).

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bnfcheck::{InputStream, Limits, Session, VerificationResult};

#[derive(Parser, Debug)]
#[command(
    name = "bnfcheck",
    version,
    about = "Verify text against a BNF/ABNF grammar",
    long_about = "Parses one or more grammar files (each carrying a !syntax tag, optionally \
                  connected by !import directives), links them, and verifies the input text \
                  against the chosen start symbol. A single trailing newline on the input is \
                  ignored."
)]
struct Cli {
    /// Grammar files to link, in any order
    #[arg(required = true)]
    grammars: Vec<PathBuf>,

    /// Start symbol to verify against
    #[arg(short, long)]
    symbol: String,

    /// File holding the input text; standard input when omitted
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Emit the verification result as JSON
    #[arg(long)]
    json: bool,

    /// Maximum rule nesting depth
    #[arg(long, default_value_t = 256)]
    max_depth: usize,

    /// Wall-clock limit for verification, in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("bnfcheck: error: {err}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let limits = Limits {
        max_depth: cli.max_depth,
        timeout: cli.timeout_ms.map(Duration::from_millis),
    };

    let mut session = Session::with_limits(limits);
    for path in &cli.grammars {
        let source = fs::read_to_string(path)
            .map_err(|e| format!("cannot read grammar {}: {e}", path.display()))?;
        session.add_grammar(&source, &origin_label(path))?;
    }
    let linked = session.link()?;

    let raw = match &cli.input {
        Some(path) => fs::read_to_string(path)
            .map_err(|e| format!("cannot read input {}: {e}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let input = strip_trailing_newline(&raw);

    let result = linked.verify(&cli.symbol, input)?;
    info!(symbol = %cli.symbol, accepted = result.accepted, "done");

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        report(&cli.symbol, input, &result);
    }

    Ok(if result.accepted {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn report(symbol: &str, input: &str, result: &VerificationResult) {
    if result.accepted {
        println!("accepted: input matches \"{symbol}\" ({} characters)", result.consumed);
        return;
    }

    println!("rejected: input does not match \"{symbol}\"");
    if let Some(offset) = result.failure_position {
        let stream = InputStream::new(input);
        let (line, column) = stream.line_col(offset);
        println!("  deepest failure at line {line}, column {column} (offset {offset})");
        let context = failure_context(&stream, offset);
        if !context.is_empty() {
            println!("  unmatched input starts with {context:?}");
        }
        if !result.failure_trace.is_empty() {
            println!("  while matching: {}", result.failure_trace.join(" > "));
        }
    }
}

fn failure_context(stream: &InputStream, offset: usize) -> String {
    stream.slice(offset, 12).iter().collect()
}

fn origin_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn strip_trailing_newline(text: &str) -> &str {
    let text = text.strip_suffix('\n').unwrap_or(text);
    text.strip_suffix('\r').unwrap_or(text)
}
