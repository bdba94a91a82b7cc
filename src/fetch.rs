//! Resource Fetcher
//!
//! Resolves a reference string (an `href` or `src`) to raw text. Remote references go through
//! the [`Conduit`]; local references are read from disk relative to the configured base
//! directory. Every outcome is an explicit `Result`, callers decide what a failure means.

use std::fs;
use std::path::{Path, PathBuf};

use reqwest::Url;
use tracing::debug;

use crate::conduit::Conduit;
use crate::error::FetchError;
use crate::link::is_remote;

/// A reference after classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Remote(Url),
    Local(PathBuf),
}

pub type FetchOutcome = Result<String, FetchError>;

pub struct Fetcher<'a> {
    conduit: &'a Conduit,
    base_dir: Option<&'a Path>,
}

impl<'a> Fetcher<'a> {
    pub fn new(conduit: &'a Conduit, base_dir: Option<&'a Path>) -> Self {
        Self { conduit, base_dir }
    }

    /// Classify `reference` as remote or local.
    ///
    /// A remote-looking reference that is not a parseable URL is `FetchError::Malformed`.
    pub fn classify(&self, reference: &str) -> Result<Reference, FetchError> {
        if is_remote(reference) {
            return Url::parse(reference)
                .map(Reference::Remote)
                .map_err(|e| FetchError::Malformed {
                    reference: reference.to_string(),
                    message: e.to_string(),
                });
        }

        let path = Path::new(reference);
        let resolved = match self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        };
        Ok(Reference::Local(resolved))
    }

    pub fn fetch(&self, reference: &str) -> FetchOutcome {
        match self.classify(reference)? {
            Reference::Remote(url) => {
                debug!("Downloading '{}'", url);
                self.conduit.query_url(&url)
            }
            Reference::Local(path) => {
                debug!("Reading '{}'", path.display());
                read_local(&path)
            }
        }
    }
}

/// Read a local file, normalizing line endings to `\n` with every line terminated.
pub fn read_local(path: &Path) -> FetchOutcome {
    if !path.exists() {
        return Err(FetchError::NotFound(path.to_path_buf()));
    }

    fs::read_to_string(path)
        .map(|text| normalize_lines(&text))
        .map_err(|e| FetchError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

pub fn normalize_lines(text: &str) -> String {
    let mut normalized = String::with_capacity(text.len() + 1);
    for line in text.lines() {
        normalized.push_str(line);
        normalized.push('\n');
    }
    normalized
}
