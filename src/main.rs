//! phraser - build-time HTML template processor

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use phraser::pipeline::DEFAULT_MAX_INCLUDE_DEPTH;
use phraser::{Phraser, SimplifyOptions};

#[derive(Parser)]
#[command(name = "phraser")]
#[command(version, about = "Resolve includes, inline assets and substitute variables in HTML", long_about = None)]
#[command(after_help = "EXAMPLES:
    phraser index.html dist/index.html    Write the simplified page to a file
    phraser https://example.com/page.html Print the result with build notes as HTML comments")]
struct Cli {
    /// Root document (path or URL)
    #[arg(value_name = "INPUT")]
    input: String,

    /// Output file; prints to standard output when omitted
    #[arg(value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Directory that relative include, script and stylesheet paths resolve against
    #[arg(long, value_name = "DIR")]
    base_dir: Option<PathBuf>,

    /// Maximum number of include passes
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_INCLUDE_DEPTH)]
    max_include_depth: usize,

    /// Only log warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Log per-element decisions
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let default_level = if cli.quiet {
        "warn"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let options = SimplifyOptions {
        output: cli.output,
        base_dir: cli.base_dir,
        max_include_depth: cli.max_include_depth,
        ..SimplifyOptions::new(cli.input)
    };

    match Phraser::new(options).simplify() {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
