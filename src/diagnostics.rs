//! Structured diagnostics collected during a run.
//!
//! Per-element failures never abort the pipeline. Each one is logged through `tracing` at the
//! moment it happens and kept in a [`Diagnostics`] list that is returned with the final
//! document, so callers decide how to surface them.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiagnosticKind {
    /// Remote fetch failed; the reference stays unexpanded.
    TransportFailure,
    /// Local path does not exist; the reference stays unresolved.
    LocalMissing,
    /// Reference looked like a URL but could not be parsed.
    MalformedReference,
    /// Local path exists but could not be read.
    ReadFailure,
    /// Include chain regenerates itself, or the pass limit was reached.
    CyclicInclude,
    /// The script minifier rejected its input.
    MinifierError,
    /// A variable name was declared again with a different datatype.
    ConflictingVariable,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::TransportFailure => "transport failure",
            Self::LocalMissing => "missing file",
            Self::MalformedReference => "malformed reference",
            Self::ReadFailure => "read failure",
            Self::CyclicInclude => "cyclic include",
            Self::MinifierError => "minifier error",
            Self::ConflictingVariable => "conflicting variable",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// The `href`, `src` or variable name the diagnostic is about.
    pub reference: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// Ordered list of diagnostics for one run.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic and emit it as a warning.
    pub fn push(&mut self, kind: DiagnosticKind, reference: &str, message: impl Into<String>) {
        let diagnostic = Diagnostic {
            kind,
            reference: reference.to_string(),
            message: message.into(),
        };
        tracing::warn!(kind = %diagnostic.kind, reference, "{}", diagnostic.message);
        self.entries.push(diagnostic);
    }

    /// Record the failure of a fetch for `reference`.
    pub fn push_fetch_error(&mut self, reference: &str, error: &FetchError) {
        let kind = match error {
            FetchError::Transport { .. }
            | FetchError::Status { .. }
            | FetchError::NoHandler(_)
            | FetchError::Handler(_) => DiagnosticKind::TransportFailure,
            FetchError::Malformed { .. } => DiagnosticKind::MalformedReference,
            FetchError::NotFound(_) => DiagnosticKind::LocalMissing,
            FetchError::Read { .. } => DiagnosticKind::ReadFailure,
        };
        self.push(kind, reference, error.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(move |d| d.kind == kind)
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}
