//! Error types for phraser runs.
//!
//! `PhraserError` is the only error that reaches the orchestrator's caller and aborts a run.
//! `FetchError` describes why a single reference could not be resolved; outside of the root
//! document it is always downgraded into a [`crate::diagnostics::Diagnostic`].

use std::path::PathBuf;

use thiserror::Error;

/// Fatal errors: the run stops and the process exits with failure.
#[derive(Error, Debug)]
pub enum PhraserError {
    #[error("The requested file was not found '{0}'!")]
    SourceNotFound(String),

    #[error("Failed to fetch the root document '{reference}': {source}")]
    RootFetch {
        reference: String,
        #[source]
        source: FetchError,
    },

    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize the document: {0}")]
    Serialize(#[source] std::io::Error),

    #[error("Failed to print the result: {0}")]
    Stdout(#[source] std::io::Error),
}

/// Why a reference (include, script, stylesheet or root) produced no content.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("transport failure for '{url}': {message}")]
    Transport { url: String, message: String },

    #[error("'{url}' answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("malformed reference '{reference}': {message}")]
    Malformed { reference: String, message: String },

    #[error("The requested file was not found '{}'!", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read '{}': {message}", path.display())]
    Read { path: PathBuf, message: String },

    #[error("no response handler registered for {0}")]
    NoHandler(&'static str),

    #[error("response handler failed: {0}")]
    Handler(String),
}

pub type Result<T> = std::result::Result<T, PhraserError>;
