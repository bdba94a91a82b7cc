//! Include Resolver
//!
//! Expands `<link property="include" href="...">` markers into the content they reference.
//!
//! ## Invariants
//!
//! 1. **Fixed point**: markers are expanded in passes. After each pass the document is
//!    serialized and re-parsed, so markers that arrived with included content are found by
//!    the next scan. Resolution ends on the first pass that expands nothing; that pass is
//!    counted in [`IncludeReport::passes`].
//! 2. **No-op on plain documents**: a document without markers is left untouched.
//! 3. **Failures stay visible**: a marker that cannot be expanded (missing file, transport
//!    failure, malformed URL, cycle) stays in the output and is never retried.
//! 4. **Termination**: every spliced block is bracketed by boundary comments naming its
//!    origin. A marker whose `href` already appears among its enclosing origins is a cycle.
//!    The pass count is additionally capped by `max_depth`.

use std::io;

use markup5ever_rcdom::NodeData;
use tracing::{debug, info};

use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::document::{Document, Element};
use crate::fetch::Fetcher;

const OPEN_PREFIX: &str = "phraser-include:";
const CLOSE_PREFIX: &str = "/phraser-include:";

/// Marks markers that failed so later passes skip them. Stripped before returning.
const UNRESOLVED_ATTR: &str = "data-phraser-unresolved";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IncludeReport {
    /// Scans performed, including the final one that expanded nothing.
    pub passes: usize,
    /// Markers replaced by content.
    pub resolved: usize,
    /// Markers left in place.
    pub unresolved: usize,
}

struct Marker {
    element: Element,
    href: String,
    /// Hrefs of the included blocks enclosing this marker, outermost first.
    chain: Vec<String>,
}

pub struct IncludeResolver<'a> {
    fetcher: &'a Fetcher<'a>,
    max_depth: usize,
}

impl<'a> IncludeResolver<'a> {
    pub fn new(fetcher: &'a Fetcher<'a>, max_depth: usize) -> Self {
        Self { fetcher, max_depth }
    }

    pub fn resolve(
        &self,
        doc: &mut Document,
        diagnostics: &mut Diagnostics,
    ) -> io::Result<IncludeReport> {
        info!("Checking for the including files...");

        let mut report = IncludeReport::default();
        let mut origins: Vec<String> = Vec::new();

        loop {
            report.passes += 1;
            let markers = scan(doc, &origins);
            if markers.is_empty() {
                break;
            }

            if report.passes > self.max_depth {
                for marker in &markers {
                    diagnostics.push(
                        DiagnosticKind::CyclicInclude,
                        &marker.href,
                        format!(
                            "Include depth limit of {} reached at '{}'!",
                            self.max_depth, marker.href
                        ),
                    );
                    marker.element.set_attr(UNRESOLVED_ATTR, "");
                    report.unresolved += 1;
                }
                break;
            }

            debug!("Include pass {} found {} marker(s)", report.passes, markers.len());
            let mut expanded = 0;

            for marker in markers {
                if marker.chain.contains(&marker.href) {
                    let mut cycle = marker.chain.clone();
                    cycle.push(marker.href.clone());
                    diagnostics.push(
                        DiagnosticKind::CyclicInclude,
                        &marker.href,
                        format!("Include cycle detected: {}", cycle.join(" -> ")),
                    );
                    marker.element.set_attr(UNRESOLVED_ATTR, "");
                    report.unresolved += 1;
                    continue;
                }

                match self.fetcher.fetch(&marker.href) {
                    Ok(content) => {
                        let id = origins.len();
                        origins.push(marker.href.clone());
                        let spliced = format!(
                            "<!--{}{}-->{}<!--{}{}-->",
                            OPEN_PREFIX, id, content, CLOSE_PREFIX, id
                        );
                        let raw = doc.create_raw(&spliced);
                        if marker.element.replace_with(raw) {
                            expanded += 1;
                            report.resolved += 1;
                        }
                    }
                    Err(error) => {
                        diagnostics.push_fetch_error(&marker.href, &error);
                        marker.element.set_attr(UNRESOLVED_ATTR, "");
                        report.unresolved += 1;
                    }
                }
            }

            if expanded == 0 {
                break;
            }
            doc.reparse()?;
        }

        doc.remove_comments(|text| text.starts_with(OPEN_PREFIX) || text.starts_with(CLOSE_PREFIX));
        for link in doc.select("link") {
            link.remove_attr(UNRESOLVED_ATTR);
        }

        Ok(report)
    }
}

/// Include markers still eligible for expansion, in document order, with their ancestry.
fn scan(doc: &Document, origins: &[String]) -> Vec<Marker> {
    let mut open: Vec<usize> = Vec::new();
    let mut markers = Vec::new();

    for node in doc.nodes() {
        match &node.data {
            NodeData::Comment { contents } => {
                if let Some(id) = boundary_id(contents, CLOSE_PREFIX) {
                    if let Some(position) = open.iter().rposition(|&o| o == id) {
                        open.truncate(position);
                    }
                } else if let Some(id) = boundary_id(contents, OPEN_PREFIX) {
                    open.push(id);
                }
            }
            NodeData::Element { name, .. } if name.local.as_ref() == "link" => {
                let element = Element::new(node.clone());
                if !is_include_marker(&element) || element.has_attr(UNRESOLVED_ATTR) {
                    continue;
                }
                let href = element.attr("href").unwrap_or_default();
                let chain = open
                    .iter()
                    .filter_map(|&id| origins.get(id).cloned())
                    .collect();
                markers.push(Marker {
                    element,
                    href,
                    chain,
                });
            }
            _ => {}
        }
    }

    markers
}

fn boundary_id(comment: &str, prefix: &str) -> Option<usize> {
    comment.strip_prefix(prefix)?.parse().ok()
}

/// `<link property="include" href="...">`, property compared ignoring case.
pub fn is_include_marker(element: &Element) -> bool {
    element.attr_is("property", "include") && element.has_attr("href")
}
