//! Pipeline Orchestrator
//!
//! Runs one simplification: load the root document, resolve includes, inline scripts, inline
//! stylesheets, substitute variables, emit.
//!
//! ## Key Invariants
//!
//! 1. **Fixed order**: `Start → Loaded → IncludesResolved → ScriptsSimplified →
//!    StylesSimplified → VariablesResolved → Emitted`, no retries or branches.
//! 2. **Only the root is fatal**: a missing or unfetchable root aborts the run; every other
//!    failure becomes a [`Diagnostic`] and the run completes.
//! 3. **Re-parse after includes**: the document is rebuilt from its serialized form once
//!    includes are resolved, so later stages see spliced content as ordinary elements.
//! 4. **Timed stages**: each completed stage is logged with its duration and recorded in the
//!    report.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::assets::AssetSimplifier;
use crate::conduit::Conduit;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::document::Document;
use crate::error::{FetchError, PhraserError, Result};
use crate::fetch::{read_local, Fetcher};
use crate::include::IncludeResolver;
use crate::link::is_remote;
use crate::variables::Variables;

pub const DEFAULT_MAX_INCLUDE_DEPTH: usize = 32;
pub const DEFAULT_COMPRESS_LINE_BREAK: usize = 8000;

// ═══════════════════════════════════════════════════════════════════════════════
// OPTIONS AND REPORT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimplifyOptions {
    /// Path or URL of the root document.
    pub input: String,
    /// Destination file. `None` prints to standard output.
    pub output: Option<PathBuf>,
    /// Directory relative local references resolve against. `None` is the working directory.
    pub base_dir: Option<PathBuf>,
    pub max_include_depth: usize,
    /// Line width for `compress` scripts.
    pub compress_line_break: usize,
}

impl Default for SimplifyOptions {
    fn default() -> Self {
        Self {
            input: String::new(),
            output: None,
            base_dir: None,
            max_include_depth: DEFAULT_MAX_INCLUDE_DEPTH,
            compress_line_break: DEFAULT_COMPRESS_LINE_BREAK,
        }
    }
}

impl SimplifyOptions {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Start,
    Loaded,
    IncludesResolved,
    ScriptsSimplified,
    StylesSimplified,
    VariablesResolved,
    Emitted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Start => "Start",
            Self::Loaded => "Loading",
            Self::IncludesResolved => "Include resolving",
            Self::ScriptsSimplified => "Script simplifying",
            Self::StylesSimplified => "Stylesheet simplifying",
            Self::VariablesResolved => "Variables simplifying",
            Self::Emitted => "Emitting",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTiming {
    /// The state reached when the stage finished.
    pub stage: Stage,
    pub elapsed: Duration,
}

impl fmt::Display for StageTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} completed in {}ms.", self.stage, self.elapsed.as_millis())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimplifyReport {
    pub html: String,
    pub diagnostics: Vec<Diagnostic>,
    pub timings: Vec<StageTiming>,
    pub include_passes: usize,
    pub total: Duration,
}

impl SimplifyReport {
    pub fn timing(&self, stage: Stage) -> Option<Duration> {
        self.timings
            .iter()
            .find(|timing| timing.stage == stage)
            .map(|timing| timing.elapsed)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ORCHESTRATOR
// ═══════════════════════════════════════════════════════════════════════════════

pub struct Phraser {
    options: SimplifyOptions,
    conduit: Conduit,
}

impl Phraser {
    /// Orchestrator using the HTTP conduit.
    pub fn new(options: SimplifyOptions) -> Self {
        Self {
            options,
            conduit: Conduit::new(),
        }
    }

    pub fn with_conduit(mut self, conduit: Conduit) -> Self {
        self.conduit = conduit;
        self
    }

    pub fn options(&self) -> &SimplifyOptions {
        &self.options
    }

    pub fn conduit(&self) -> &Conduit {
        &self.conduit
    }

    /// Run every stage up to `VariablesResolved` without emitting.
    pub fn render(&self) -> Result<SimplifyReport> {
        let started = Instant::now();
        info!("The simplifying started.");

        let mut diagnostics = Diagnostics::new();
        let mut timings = Vec::new();
        let fetcher = Fetcher::new(&self.conduit, self.options.base_dir.as_deref());

        let clock = Instant::now();
        info!("Reading the html file...");
        let source = self.load(&fetcher)?;
        let mut doc = Document::parse(&source);
        timings.push(finish(Stage::Loaded, clock));

        let clock = Instant::now();
        let includes = IncludeResolver::new(&fetcher, self.options.max_include_depth)
            .resolve(&mut doc, &mut diagnostics)
            .map_err(PhraserError::Serialize)?;
        doc.reparse().map_err(PhraserError::Serialize)?;
        timings.push(finish(Stage::IncludesResolved, clock));

        let simplifier = AssetSimplifier::new(&fetcher, self.options.compress_line_break);

        let clock = Instant::now();
        info!("Script simplifying started.");
        simplifier.simplify_scripts(&doc, &mut diagnostics);
        timings.push(finish(Stage::ScriptsSimplified, clock));

        let clock = Instant::now();
        info!("Stylesheet simplifying started.");
        simplifier.simplify_stylesheets(&doc, &mut diagnostics);
        timings.push(finish(Stage::StylesSimplified, clock));

        let clock = Instant::now();
        info!("Variables simplifying started.");
        let variables = Variables::extract(&doc, &mut diagnostics);
        let serialized = doc.html().map_err(PhraserError::Serialize)?;
        let html = variables.substitute(&serialized);
        timings.push(finish(Stage::VariablesResolved, clock));

        Ok(SimplifyReport {
            html,
            diagnostics: diagnostics.into_vec(),
            timings,
            include_passes: includes.passes,
            total: started.elapsed(),
        })
    }

    /// Render, then write the result to the output file or standard output.
    pub fn simplify(&self) -> Result<SimplifyReport> {
        let started = Instant::now();
        let mut report = self.render()?;

        let clock = Instant::now();
        match &self.options.output {
            Some(path) => write_output(path, &report.html)?,
            None => {
                let console = console_output(&report, started.elapsed());
                let stdout = io::stdout();
                let mut handle = stdout.lock();
                handle
                    .write_all(console.as_bytes())
                    .and_then(|_| handle.flush())
                    .map_err(PhraserError::Stdout)?;
            }
        }
        report.timings.push(finish(Stage::Emitted, clock));

        report.total = started.elapsed();
        info!("Simplifying completed in {}ms.", report.total.as_millis());
        Ok(report)
    }

    fn load(&self, fetcher: &Fetcher<'_>) -> Result<String> {
        let input = &self.options.input;

        if is_remote(input) {
            return fetcher.fetch(input).map_err(|source| PhraserError::RootFetch {
                reference: input.clone(),
                source,
            });
        }

        read_local(Path::new(input)).map_err(|error| match error {
            FetchError::NotFound(_) => PhraserError::SourceNotFound(input.clone()),
            source => PhraserError::RootFetch {
                reference: input.clone(),
                source,
            },
        })
    }
}

fn finish(stage: Stage, clock: Instant) -> StageTiming {
    let timing = StageTiming {
        stage,
        elapsed: clock.elapsed(),
    };
    info!("{}", timing);
    timing
}

/// Replace `path` with `html`, one trailing newline.
fn write_output(path: &Path, html: &str) -> Result<()> {
    let io_error = |source: io::Error| PhraserError::Io {
        path: path.to_path_buf(),
        source,
    };

    if path.exists() {
        fs::remove_file(path).map_err(io_error)?;
    }

    let body = html.trim_end_matches(['\r', '\n']);
    let mut file = fs::File::create(path).map_err(io_error)?;
    if !body.is_empty() {
        file.write_all(body.as_bytes())
            .and_then(|_| file.write_all(b"\n"))
            .map_err(io_error)?;
    }
    Ok(())
}

/// The document framed by its build messages as HTML comments: diagnostics and stage timings
/// before, total time after.
pub fn console_output(report: &SimplifyReport, total: Duration) -> String {
    let mut out = String::new();
    for diagnostic in &report.diagnostics {
        out.push_str(&comment(&diagnostic.message));
    }
    for timing in &report.timings {
        out.push_str(&comment(&timing.to_string()));
    }
    out.push_str(&report.html);
    out.push('\n');
    out.push_str(&comment(&format!(
        "Simplifying completed in {}ms.",
        total.as_millis()
    )));
    out
}

/// `<!-- text -->` on its own line, with `--` defused so the comment cannot close early.
fn comment(text: &str) -> String {
    format!("<!-- {} -->\n", text.replace("--", "- -"))
}
