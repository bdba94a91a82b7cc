//! # Document Model
//!
//! Thin layer over `html5ever` + `markup5ever_rcdom` giving the pipeline the handful of tree
//! operations it needs: parse, query by tag in document order, attribute edits, node
//! replacement, and serialization.
//!
//! ## Raw content
//!
//! html5ever escapes text nodes on serialization except inside raw-text elements (`script`,
//! `style`, ...). Include markers can sit anywhere, so spliced markup is stored in a side
//! table and the tree only holds an opaque token text node. [`Document::html`] swaps every
//! token for its content, and [`Document::reparse`] turns that text back into a tree where the
//! spliced markup is queryable like the rest of the document.
//!
//! ## Templates
//!
//! The tree builder parks `<template>` content in a separate fragment that neither the
//! serializer nor a child walk reaches. [`Document::parse`] moves it under the template element
//! so it is selected, rewritten and serialized like any other subtree.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use html5ever::serialize::{serialize, SerializeOpts};
use html5ever::{namespace_url, ns, parse_document, Attribute, LocalName, ParseOpts, QualName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom, SerializableHandle};
use tendril::{StrTendril, TendrilSink};

/// Delimiter around raw-content tokens; a Unicode noncharacter never produced by real markup.
const RAW_DELIMITER: char = '\u{FDD0}';

pub struct Document {
    dom: RcDom,
    raw: HashMap<String, String>,
}

impl Document {
    pub fn parse(html: &str) -> Self {
        let dom = parse_document(RcDom::default(), ParseOpts::default()).one(html);
        hoist_template_contents(&dom.document);
        Self {
            dom,
            raw: HashMap::new(),
        }
    }

    /// Serialize the tree, splicing raw content back in place of its tokens.
    pub fn html(&self) -> std::io::Result<String> {
        let mut bytes = Vec::new();
        let document: SerializableHandle = self.dom.document.clone().into();
        serialize(&mut bytes, &document, SerializeOpts::default())?;

        let mut html = String::from_utf8_lossy(&bytes).into_owned();
        for (token, content) in &self.raw {
            html = html.replace(token.as_str(), content);
        }
        Ok(html)
    }

    /// Re-parse from the serialized form, normalizing structure after raw splices.
    pub fn reparse(&mut self) -> std::io::Result<()> {
        let html = self.html()?;
        *self = Self::parse(&html);
        Ok(())
    }

    /// Elements with the given local name, in document order.
    pub fn select(&self, tag: &str) -> Vec<Element> {
        self.nodes()
            .into_iter()
            .filter(|node| match &node.data {
                NodeData::Element { name, .. } => name.local.as_ref() == tag,
                _ => false,
            })
            .map(Element::new)
            .collect()
    }

    /// Every node below the document root, depth-first in document order.
    pub fn nodes(&self) -> Vec<Handle> {
        let mut nodes = Vec::new();
        for child in self.dom.document.children.borrow().iter() {
            collect_preorder(child, &mut nodes);
        }
        nodes
    }

    /// Detach every comment node whose text satisfies `predicate`.
    pub fn remove_comments<F>(&self, predicate: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        let doomed: Vec<Handle> = self
            .nodes()
            .into_iter()
            .filter(|node| match &node.data {
                NodeData::Comment { contents } => predicate(&**contents),
                _ => false,
            })
            .collect();

        for node in &doomed {
            detach(node);
        }
        doomed.len()
    }

    /// A new, parentless element in the HTML namespace.
    pub fn create_element(&self, tag: &str) -> Element {
        Element::new(Node::new(NodeData::Element {
            name: QualName::new(None, ns!(html), LocalName::from(tag)),
            attrs: RefCell::new(Vec::new()),
            template_contents: RefCell::new(None),
            mathml_annotation_xml_integration_point: false,
        }))
    }

    /// A node that serializes to `content` verbatim, wherever it is placed.
    pub fn create_raw(&mut self, content: &str) -> Handle {
        let token = format!("{}phraser-raw-{}{}", RAW_DELIMITER, self.raw.len(), RAW_DELIMITER);
        self.raw.insert(token.clone(), content.to_string());
        text_node(&token)
    }
}

/// Handle to an element node.
#[derive(Clone)]
pub struct Element {
    handle: Handle,
}

impl Element {
    pub(crate) fn new(handle: Handle) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn tag(&self) -> String {
        match &self.handle.data {
            NodeData::Element { name, .. } => name.local.to_string(),
            _ => String::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<String> {
        match &self.handle.data {
            NodeData::Element { attrs, .. } => attrs
                .borrow()
                .iter()
                .find(|attr| attr.name.local.as_ref() == name)
                .map(|attr| attr.value.to_string()),
            _ => None,
        }
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    /// True when the attribute is present and equals `value` ignoring ASCII case.
    pub fn attr_is(&self, name: &str, value: &str) -> bool {
        self.attr(name)
            .map(|actual| actual.eq_ignore_ascii_case(value))
            .unwrap_or(false)
    }

    /// All attributes as `(name, value)` pairs in source order.
    pub fn attributes(&self) -> Vec<(String, String)> {
        match &self.handle.data {
            NodeData::Element { attrs, .. } => attrs
                .borrow()
                .iter()
                .map(|attr| (attr.name.local.to_string(), attr.value.to_string()))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn set_attr(&self, name: &str, value: &str) {
        if let NodeData::Element { attrs, .. } = &self.handle.data {
            let mut attrs = attrs.borrow_mut();
            if let Some(attr) = attrs.iter_mut().find(|a| a.name.local.as_ref() == name) {
                attr.value = StrTendril::from(value);
                return;
            }
            attrs.push(Attribute {
                name: QualName::new(None, ns!(), LocalName::from(name)),
                value: StrTendril::from(value),
            });
        }
    }

    pub fn remove_attr(&self, name: &str) {
        if let NodeData::Element { attrs, .. } = &self.handle.data {
            attrs.borrow_mut().retain(|a| a.name.local.as_ref() != name);
        }
    }

    /// Remove all children.
    pub fn empty(&self) {
        for child in self.handle.children.borrow_mut().drain(..) {
            child.parent.set(None);
        }
    }

    pub fn append(&self, child: Handle) {
        child.parent.set(Some(Rc::downgrade(&self.handle)));
        self.handle.children.borrow_mut().push(child);
    }

    /// Append a text child. Inside `script` and `style` it serializes unescaped.
    pub fn append_text(&self, text: &str) {
        self.append(text_node(text));
    }

    /// Concatenated text of the direct text children.
    pub fn text(&self) -> String {
        self.handle
            .children
            .borrow()
            .iter()
            .filter_map(|child| match &child.data {
                NodeData::Text { contents } => Some(contents.borrow().to_string()),
                _ => None,
            })
            .collect()
    }

    /// Put `replacement` where this element is. Returns false for a detached element.
    pub fn replace_with(&self, replacement: Handle) -> bool {
        let parent = match parent_of(&self.handle) {
            Some(parent) => parent,
            None => return false,
        };

        let mut children = parent.children.borrow_mut();
        match children.iter().position(|c| Rc::ptr_eq(c, &self.handle)) {
            Some(index) => {
                replacement.parent.set(Some(Rc::downgrade(&parent)));
                self.handle.parent.set(None);
                children[index] = replacement;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self) {
        detach(&self.handle);
    }
}

fn text_node(text: &str) -> Handle {
    Node::new(NodeData::Text {
        contents: RefCell::new(StrTendril::from(text)),
    })
}

fn parent_of(handle: &Handle) -> Option<Handle> {
    let weak = handle.parent.take();
    let parent = weak.as_ref().and_then(|w| w.upgrade());
    handle.parent.set(weak);
    parent
}

fn detach(handle: &Handle) {
    if let Some(parent) = parent_of(handle) {
        parent
            .children
            .borrow_mut()
            .retain(|child| !Rc::ptr_eq(child, handle));
    }
    handle.parent.set(None);
}

fn hoist_template_contents(handle: &Handle) {
    if let NodeData::Element {
        template_contents, ..
    } = &handle.data
    {
        if let Some(fragment) = template_contents.borrow_mut().take() {
            let moved: Vec<Handle> = fragment.children.borrow_mut().drain(..).collect();
            let mut children = handle.children.borrow_mut();
            for child in moved {
                child.parent.set(Some(Rc::downgrade(handle)));
                children.push(child);
            }
        }
    }
    for child in handle.children.borrow().iter() {
        hoist_template_contents(child);
    }
}

fn collect_preorder(handle: &Handle, nodes: &mut Vec<Handle>) {
    nodes.push(handle.clone());
    for child in handle.children.borrow().iter() {
        collect_preorder(child, nodes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_serialize() {
        let doc = Document::parse("<html><head><title>T</title></head><body><p>Hello</p></body></html>");
        let html = doc.html().unwrap();
        assert!(html.contains("<title>T</title>"));
        assert!(html.contains("<p>Hello</p>"));
    }

    #[test]
    fn test_select_in_document_order() {
        let doc = Document::parse(
            r#"<head><link rel="a"></head><body><div><link rel="b"></div><link rel="c"></body>"#,
        );
        let rels: Vec<_> = doc
            .select("link")
            .iter()
            .filter_map(|l| l.attr("rel"))
            .collect();
        assert_eq!(rels, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_attribute_edits() {
        let doc = Document::parse(r#"<body><script src="a.js" static></script></body>"#);
        let script = &doc.select("script")[0];
        assert!(script.has_attr("static"));
        assert_eq!(script.attr("static").as_deref(), Some(""));

        script.remove_attr("static");
        script.set_attr("src", "b.js");
        script.set_attr("defer", "");
        assert_eq!(
            script.attributes(),
            vec![
                ("src".to_string(), "b.js".to_string()),
                ("defer".to_string(), String::new())
            ]
        );
        assert!(doc.html().unwrap().contains(r#"<script src="b.js" defer="">"#));
    }

    #[test]
    fn test_attr_is_ignores_case() {
        let doc = Document::parse(r#"<link rel="StyleSheet" href="a.css">"#);
        let link = &doc.select("link")[0];
        assert!(link.attr_is("rel", "stylesheet"));
        assert!(!link.attr_is("rel", "icon"));
        assert!(!link.attr_is("type", "text/css"));
    }

    #[test]
    fn test_script_text_is_not_escaped() {
        let doc = Document::parse("<body><script></script></body>");
        let script = &doc.select("script")[0];
        script.append_text("if (a < b && c > d) {}");
        assert!(doc
            .html()
            .unwrap()
            .contains("<script>if (a < b && c > d) {}</script>"));
    }

    #[test]
    fn test_raw_splice_and_reparse() {
        let mut doc = Document::parse(r#"<body><link property="include" href="x"></body>"#);
        let marker = doc.select("link")[0].clone();
        let raw = doc.create_raw("<section id=\"s\"><em>hi</em></section>");
        assert!(marker.replace_with(raw));

        assert!(doc.select("link").is_empty());
        assert!(doc.select("section").is_empty());
        assert!(doc.html().unwrap().contains("<section id=\"s\"><em>hi</em></section>"));

        doc.reparse().unwrap();
        let sections = doc.select("section");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].attr("id").as_deref(), Some("s"));
    }

    #[test]
    fn test_replace_with_new_element() {
        let doc = Document::parse(r#"<head><link rel="stylesheet" href="a.css" media="print"></head>"#);
        let link = doc.select("link")[0].clone();
        let style = doc.create_element("style");
        style.set_attr("media", "print");
        style.append_text("p{color:red}");
        assert!(link.replace_with(style.handle().clone()));

        let html = doc.html().unwrap();
        assert!(html.contains(r#"<style media="print">p{color:red}</style>"#));
        assert!(!html.contains("<link"));
    }

    #[test]
    fn test_remove_and_empty() {
        let doc = Document::parse(r#"<head><meta name="a"></head><body><p>x<b>y</b></p></body>"#);
        doc.select("meta")[0].remove();
        doc.select("p")[0].empty();
        let html = doc.html().unwrap();
        assert!(!html.contains("<meta"));
        assert!(html.contains("<p></p>"));
    }

    #[test]
    fn test_template_content_survives_reparse() {
        let mut doc = Document::parse(
            r#"<body><template id="row"><p>kept</p><template><b>inner</b></template></template></body>"#,
        );
        assert_eq!(doc.select("p").len(), 1);
        assert_eq!(doc.select("b").len(), 1);

        doc.reparse().unwrap();
        let html = doc.html().unwrap();
        assert!(html.contains(
            r#"<template id="row"><p>kept</p><template><b>inner</b></template></template>"#
        ));
        assert_eq!(doc.select("p")[0].text(), "kept");
    }

    #[test]
    fn test_remove_comments() {
        let doc = Document::parse("<body><!--keep--><p>a</p><!--drop:1--></body>");
        let removed = doc.remove_comments(|text| text.starts_with("drop:"));
        assert_eq!(removed, 1);
        let html = doc.html().unwrap();
        assert!(html.contains("<!--keep-->"));
        assert!(!html.contains("drop:1"));
    }
}
