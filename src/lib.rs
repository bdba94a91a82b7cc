//! # phraser
//!
//! Build-time HTML template processor. One run ("simplify") takes a root document and:
//!
//! 1. expands `<link property="include" href="...">` markers until none are left,
//! 2. inlines `<script src>` elements, minifying them on `compile`/`compress`,
//! 3. turns `<link rel="stylesheet">` into `<style>`, minifying on `compile`,
//! 4. removes `<meta variable name content datatype>` declarations and replaces
//!    `{{$name}}` placeholders with their values,
//! 5. writes the result to a file or prints it.
//!
//! ## Pipeline Invariants
//!
//! 1. **Best effort**: only a missing or unfetchable root document aborts a run. Every other
//!    failure is a [`Diagnostic`], logged through `tracing` and returned in the
//!    [`SimplifyReport`]; the element it concerns is left in the output.
//!
//! 2. **Termination**: include expansion is cycle-checked per branch and capped by
//!    `max_include_depth`.
//!
//! 3. **Static opt-out**: a `static` flag on a script or stylesheet is stripped and the asset
//!    is never fetched.
//!
//! 4. **Typed variables**: one type per name, single-pass substitution, unknown placeholders
//!    kept verbatim.
//!
//! 5. **Explicit plumbing**: remote access goes through a [`Conduit`] owned by the
//!    [`Phraser`] value. Nothing is process-global.

pub mod assets;
pub mod conduit;
pub mod diagnostics;
pub mod document;
pub mod error;
pub mod fetch;
pub mod include;
pub mod link;
pub mod minify;
pub mod pipeline;
pub mod variables;

#[cfg(test)]
mod test_support;

pub use conduit::{Conduit, DownloadHandler, HandlerRegistry, HttpDownloader, ResponseHandler};
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
pub use error::{FetchError, PhraserError, Result};
pub use link::is_remote;
pub use pipeline::{Phraser, SimplifyOptions, SimplifyReport, Stage, StageTiming};
pub use variables::{DataType, VariableValue, Variables};
