//! Asset Simplifier
//!
//! Inlines external scripts and stylesheets, minifying them on request.
//!
//! ## Key Invariants
//!
//! 1. Scripts are processed before stylesheets, each in document order.
//! 2. A `static` flag is stripped and nothing else happens: no fetch, `src`/`href` kept.
//! 3. A failed fetch records a diagnostic and leaves the element exactly as it was.
//! 4. `compress` takes precedence over `compile` on scripts.

use tracing::debug;

use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::document::{Document, Element};
use crate::fetch::Fetcher;
use crate::minify::{minify_css, minify_script, ScriptMode};

/// Counts for one asset pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssetReport {
    pub inlined: usize,
    pub kept_static: usize,
    pub failed: usize,
}

pub struct AssetSimplifier<'a> {
    fetcher: &'a Fetcher<'a>,
    line_break: usize,
}

impl<'a> AssetSimplifier<'a> {
    pub fn new(fetcher: &'a Fetcher<'a>, line_break: usize) -> Self {
        Self {
            fetcher,
            line_break,
        }
    }

    /// Inline every `<script src>` element.
    pub fn simplify_scripts(&self, doc: &Document, diagnostics: &mut Diagnostics) -> AssetReport {
        let mut report = AssetReport::default();

        for script in doc.select("script") {
            let Some(src) = script.attr("src") else {
                continue;
            };

            if script.has_attr("static") {
                debug!("Keeping static script '{}'", src);
                script.remove_attr("static");
                report.kept_static += 1;
                continue;
            }

            let content = match self.fetcher.fetch(&src) {
                Ok(content) => content,
                Err(error) => {
                    diagnostics.push_fetch_error(&src, &error);
                    report.failed += 1;
                    continue;
                }
            };

            let compiled = self.compile_script(&script, &src, content, diagnostics);
            script.empty();
            script.append_text(&compiled);
            report.inlined += 1;
        }

        report
    }

    fn compile_script(
        &self,
        script: &Element,
        src: &str,
        content: String,
        diagnostics: &mut Diagnostics,
    ) -> String {
        let mode = if script.has_attr("compress") {
            Some(ScriptMode::Compress)
        } else if script.has_attr("compile") {
            Some(ScriptMode::Compile)
        } else {
            None
        };

        let Some(mode) = mode else {
            debug!("Inlining script '{}' verbatim", src);
            script.remove_attr("src");
            return content;
        };

        debug!("Minifying script '{}' ({:?})", src, mode);
        let module = script.attr_is("type", "module");
        let compiled = match minify_script(&content, module, mode, self.line_break) {
            Ok(code) => code,
            Err(messages) => {
                for message in messages {
                    diagnostics.push(
                        DiagnosticKind::MinifierError,
                        src,
                        format!("{}: {}", src, message),
                    );
                }
                content
            }
        };

        script.remove_attr("src");
        script.remove_attr("compile");
        script.remove_attr("compress");
        compiled
    }

    /// Replace every `<link rel="stylesheet" href>` with an inline `<style>`.
    pub fn simplify_stylesheets(&self, doc: &Document, diagnostics: &mut Diagnostics) -> AssetReport {
        let mut report = AssetReport::default();

        for link in doc.select("link") {
            if !is_stylesheet(&link) {
                continue;
            }
            let href = link.attr("href").unwrap_or_default();

            if link.has_attr("static") {
                debug!("Keeping static stylesheet '{}'", href);
                link.remove_attr("static");
                report.kept_static += 1;
                continue;
            }

            let content = match self.fetcher.fetch(&href) {
                Ok(content) => content,
                Err(error) => {
                    diagnostics.push_fetch_error(&href, &error);
                    report.failed += 1;
                    continue;
                }
            };

            let compiled = if link.has_attr("compile") {
                debug!("Minifying stylesheet '{}'", href);
                minify_css(&content)
            } else {
                content
            };

            let style = doc.create_element("style");
            for (name, value) in link.attributes() {
                if !matches!(name.as_str(), "href" | "rel" | "compile") {
                    style.set_attr(&name, &value);
                }
            }
            style.append_text(&compiled);

            if link.replace_with(style.handle().clone()) {
                report.inlined += 1;
            }
        }

        report
    }
}

/// `<link>` with `href` and `rel="stylesheet"` (case-insensitive).
pub fn is_stylesheet(link: &Element) -> bool {
    link.has_attr("href") && link.attr_is("rel", "stylesheet")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conduit::Conduit;
    use crate::test_support::{Site, StaticDownloader};

    fn simplify(html: &str, site: &Site, conduit: &Conduit) -> (String, AssetReport, AssetReport, Diagnostics) {
        let fetcher = Fetcher::new(conduit, Some(site.root()));
        let simplifier = AssetSimplifier::new(&fetcher, 8000);
        let doc = Document::parse(html);
        let mut diagnostics = Diagnostics::new();
        let scripts = simplifier.simplify_scripts(&doc, &mut diagnostics);
        let styles = simplifier.simplify_stylesheets(&doc, &mut diagnostics);
        (doc.html().unwrap(), scripts, styles, diagnostics)
    }

    #[test]
    fn test_plain_script_is_inlined_verbatim() {
        let site = Site::new();
        site.write("app.js", "var a = 1;  // keep\n");
        let conduit = Conduit::with_downloader(StaticDownloader::new());

        let (html, scripts, _, diagnostics) =
            simplify(r#"<body><script src="app.js" defer></script></body>"#, &site, &conduit);
        assert_eq!(scripts.inlined, 1);
        assert!(diagnostics.is_empty());
        assert!(html.contains("<script defer=\"\">var a = 1;  // keep\n</script>"));
    }

    #[test]
    fn test_compile_strips_flags() {
        let site = Site::new();
        site.write("app.js", "function hello(name) {\n  // say it\n  return 'hello ' + name;\n}\nwindow.hello = hello;\n");
        let conduit = Conduit::with_downloader(StaticDownloader::new());

        let (html, _, _, diagnostics) =
            simplify(r#"<script src="app.js" compile></script>"#, &site, &conduit);
        assert!(diagnostics.is_empty());
        assert!(html.contains("<script>"));
        assert!(!html.contains("src="));
        assert!(!html.contains("compile"));
        assert!(!html.contains("say it"));
        assert!(html.contains("name"));
    }

    #[test]
    fn test_compress_wins_over_compile() {
        let site = Site::new();
        site.write("app.js", "(function () { var localCounter = window.start; window.done(localCounter + localCounter); })();\n");
        let conduit = Conduit::with_downloader(StaticDownloader::new());

        let (html, _, _, _) =
            simplify(r#"<script src="app.js" compile compress></script>"#, &site, &conduit);
        assert!(!html.contains("localCounter"));
        assert!(!html.contains("compile"));
        assert!(!html.contains("compress"));
    }

    #[test]
    fn test_minifier_error_falls_back_to_source() {
        let site = Site::new();
        site.write("broken.js", "function (\n");
        let conduit = Conduit::with_downloader(StaticDownloader::new());

        let (html, scripts, _, diagnostics) =
            simplify(r#"<script src="broken.js" compress></script>"#, &site, &conduit);
        assert_eq!(scripts.inlined, 1);
        let errors: Vec<_> = diagnostics.of_kind(DiagnosticKind::MinifierError).collect();
        assert!(!errors.is_empty());
        assert!(errors[0].message.starts_with("broken.js: "));
        assert!(html.contains("<script>function (\n</script>"));
    }

    #[test]
    fn test_static_assets_are_not_fetched() {
        let site = Site::new();
        let downloader = StaticDownloader::new();
        let requests = downloader.requests();
        let conduit = Conduit::with_downloader(downloader);

        let (html, scripts, styles, diagnostics) = simplify(
            r#"<head><link rel="stylesheet" href="https://cdn.example.com/s.css" static></head><body><script src="https://cdn.example.com/s.js" static></script></body>"#,
            &site,
            &conduit,
        );
        assert!(requests.borrow().is_empty());
        assert!(diagnostics.is_empty());
        assert_eq!(scripts.kept_static, 1);
        assert_eq!(styles.kept_static, 1);
        assert!(html.contains(r#"<script src="https://cdn.example.com/s.js"></script>"#));
        assert!(html.contains(r#"<link rel="stylesheet" href="https://cdn.example.com/s.css">"#));
    }

    #[test]
    fn test_failed_fetch_leaves_element() {
        let site = Site::new();
        let conduit = Conduit::with_downloader(StaticDownloader::new());

        let (html, scripts, styles, diagnostics) = simplify(
            r#"<head><link rel="stylesheet" href="gone.css"></head><body><script src="https://cdn.example.com/gone.js" compress></script></body>"#,
            &site,
            &conduit,
        );
        assert_eq!(scripts.failed, 1);
        assert_eq!(styles.failed, 1);
        assert_eq!(diagnostics.of_kind(DiagnosticKind::LocalMissing).count(), 1);
        assert_eq!(diagnostics.of_kind(DiagnosticKind::TransportFailure).count(), 1);
        assert!(html.contains(r#"<script src="https://cdn.example.com/gone.js" compress=""></script>"#));
        assert!(html.contains(r#"<link rel="stylesheet" href="gone.css">"#));
    }

    #[test]
    fn test_scripts_without_src_are_ignored() {
        let site = Site::new();
        let conduit = Conduit::with_downloader(StaticDownloader::new());
        let (html, scripts, _, _) = simplify("<script>inline()</script>", &site, &conduit);
        assert_eq!(scripts, AssetReport::default());
        assert!(html.contains("<script>inline()</script>"));
    }

    #[test]
    fn test_stylesheet_becomes_style_with_remaining_attributes() {
        let site = Site::new();
        site.write("theme.css", "body {\n  color: red;\n}\n");
        let conduit = Conduit::with_downloader(StaticDownloader::new());

        let (html, _, styles, _) = simplify(
            r#"<head><link rel="StyleSheet" href="theme.css" media="screen" compile></head>"#,
            &site,
            &conduit,
        );
        assert_eq!(styles.inlined, 1);
        assert!(html.contains(r#"<style media="screen">body{color:red}</style>"#));
        assert!(!html.contains("<link"));
    }

    #[test]
    fn test_stylesheet_without_compile_is_verbatim() {
        let site = Site::new();
        let conduit = Conduit::with_downloader(
            StaticDownloader::new().with("https://cdn.example.com/a.css", "a { b: c; }\n"),
        );
        let (html, _, _, _) = simplify(
            r#"<head><link rel="stylesheet" href="https://cdn.example.com/a.css"></head>"#,
            &site,
            &conduit,
        );
        assert!(html.contains("<style>a { b: c; }\n</style>"));
    }

    #[test]
    fn test_non_stylesheet_links_are_ignored() {
        let site = Site::new();
        let downloader = StaticDownloader::new();
        let requests = downloader.requests();
        let conduit = Conduit::with_downloader(downloader);
        let (html, _, styles, _) = simplify(
            r#"<head><link rel="icon" href="https://cdn.example.com/favicon.ico"></head>"#,
            &site,
            &conduit,
        );
        assert_eq!(styles, AssetReport::default());
        assert!(requests.borrow().is_empty());
        assert!(html.contains("favicon.ico"));
    }
}
