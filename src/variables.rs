//! Variable Substitutor
//!
//! `<meta variable name="..." content="..." datatype="...">` declares a typed value that
//! replaces every `{{$name}}` placeholder in the serialized document.
//!
//! ## Key Invariants
//!
//! 1. Every declaration marker is removed from the document, whether or not it parsed.
//! 2. One name has one type. Redeclaring with the same type overwrites; redeclaring with a
//!    different type is rejected and the first declaration stays.
//! 3. Substitution is a single pass: substituted text is never scanned again, and unknown
//!    placeholders are left verbatim.

use std::fmt;

use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::document::Document;

lazy_static! {
    static ref PLACEHOLDER_RE: Regex = Regex::new(r"\{\{\$([^}]*)\}\}").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum VariableValue {
    String(String),
    Integer(i32),
    Boolean(bool),
}

impl VariableValue {
    pub fn data_type(&self) -> DataType {
        match self {
            Self::String(_) => DataType::String,
            Self::Integer(_) => DataType::Integer,
            Self::Boolean(_) => DataType::Boolean,
        }
    }
}

impl fmt::Display for VariableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(value) => f.write_str(value),
            Self::Integer(value) => write!(f, "{}", value),
            Self::Boolean(value) => write!(f, "{}", value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataType {
    String,
    Integer,
    Boolean,
}

impl DataType {
    /// Resolve a `datatype` attribute. Absent or unrecognized values mean string.
    pub fn from_attr(datatype: Option<&str>) -> Self {
        match datatype.map(str::to_ascii_lowercase).as_deref() {
            Some("integer" | "int") => Self::Integer,
            Some("boolean" | "bool") => Self::Boolean,
            _ => Self::String,
        }
    }

    /// Parse `content` as this type. Only integers can fail.
    pub fn parse(self, content: &str) -> Option<VariableValue> {
        match self {
            Self::String => Some(VariableValue::String(content.to_string())),
            Self::Integer => content.parse().ok().map(VariableValue::Integer),
            Self::Boolean => Some(VariableValue::Boolean(content.eq_ignore_ascii_case("true"))),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
        })
    }
}

/// Declared variables in first-declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variables {
    values: IndexMap<String, VariableValue>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect and remove every declaration marker in `doc`.
    pub fn extract(doc: &Document, diagnostics: &mut Diagnostics) -> Self {
        let mut variables = Self::new();

        for meta in doc.select("meta") {
            if !(meta.has_attr("variable") && meta.has_attr("name") && meta.has_attr("content")) {
                continue;
            }

            let name = meta.attr("name").unwrap_or_default();
            let content = meta.attr("content").unwrap_or_default();
            let data_type = DataType::from_attr(meta.attr("datatype").as_deref());

            if let Some(value) = data_type.parse(&content) {
                variables.declare(&name, value, diagnostics);
            }
            meta.remove();
        }

        variables
    }

    /// Store `value` under `name`. Returns false when an earlier declaration of another type
    /// keeps the name.
    pub fn declare(&mut self, name: &str, value: VariableValue, diagnostics: &mut Diagnostics) -> bool {
        if let Some(existing) = self.values.get(name) {
            if existing.data_type() != value.data_type() {
                diagnostics.push(
                    DiagnosticKind::ConflictingVariable,
                    name,
                    format!(
                        "Variable '{}' is already declared as {}; the {} declaration is ignored",
                        name,
                        existing.data_type(),
                        value.data_type()
                    ),
                );
                return false;
            }
        }

        debug!("Variable '{}' = {:?}", name, value);
        self.values.insert(name.to_string(), value);
        true
    }

    pub fn get(&self, name: &str) -> Option<&VariableValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &VariableValue)> {
        self.values.iter()
    }

    /// Replace every `{{$name}}` with its value.
    pub fn substitute(&self, html: &str) -> String {
        if self.values.is_empty() {
            return html.to_string();
        }

        PLACEHOLDER_RE
            .replace_all(html, |caps: &Captures| match self.values.get(&caps[1]) {
                Some(value) => value.to_string(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(html: &str) -> (Document, Variables, Diagnostics) {
        let doc = Document::parse(html);
        let mut diagnostics = Diagnostics::new();
        let variables = Variables::extract(&doc, &mut diagnostics);
        (doc, variables, diagnostics)
    }

    #[test]
    fn test_data_type_from_attr() {
        assert_eq!(DataType::from_attr(None), DataType::String);
        assert_eq!(DataType::from_attr(Some("INT")), DataType::Integer);
        assert_eq!(DataType::from_attr(Some("Integer")), DataType::Integer);
        assert_eq!(DataType::from_attr(Some("bool")), DataType::Boolean);
        assert_eq!(DataType::from_attr(Some("BOOLEAN")), DataType::Boolean);
        assert_eq!(DataType::from_attr(Some("str")), DataType::String);
        assert_eq!(DataType::from_attr(Some("float")), DataType::String);
    }

    #[test]
    fn test_parse_values() {
        assert_eq!(DataType::Integer.parse("-42"), Some(VariableValue::Integer(-42)));
        assert_eq!(DataType::Integer.parse("+7"), Some(VariableValue::Integer(7)));
        assert_eq!(DataType::Integer.parse("five"), None);
        assert_eq!(DataType::Integer.parse("99999999999"), None);
        assert_eq!(DataType::Boolean.parse("TRUE"), Some(VariableValue::Boolean(true)));
        assert_eq!(DataType::Boolean.parse("yes"), Some(VariableValue::Boolean(false)));
    }

    #[test]
    fn test_extract_removes_markers() {
        let (doc, variables, diagnostics) = extract(
            r#"<head><meta variable name="title" content="Home"><meta variable name="n" content="x" datatype="int"><meta name="description" content="kept"></head>"#,
        );
        assert!(diagnostics.is_empty());
        assert_eq!(variables.len(), 1);
        assert_eq!(variables.get("title"), Some(&VariableValue::String("Home".into())));
        assert_eq!(variables.get("n"), None);

        let metas = doc.select("meta");
        assert_eq!(metas.len(), 1);
        assert_eq!(metas[0].attr("name").as_deref(), Some("description"));
    }

    #[test]
    fn test_incomplete_markers_are_kept() {
        let (doc, variables, _) = extract(r#"<head><meta variable name="only-name"></head>"#);
        assert!(variables.is_empty());
        assert_eq!(doc.select("meta").len(), 1);
    }

    #[test]
    fn test_same_type_redeclaration_overwrites() {
        let (_, variables, diagnostics) = extract(
            r#"<meta variable name="v" content="1" datatype="int"><meta variable name="v" content="2" datatype="integer">"#,
        );
        assert!(diagnostics.is_empty());
        assert_eq!(variables.get("v"), Some(&VariableValue::Integer(2)));
    }

    #[test]
    fn test_cross_type_redeclaration_is_rejected() {
        let (doc, variables, diagnostics) = extract(
            r#"<meta variable name="v" content="1" datatype="int"><meta variable name="v" content="true" datatype="bool">"#,
        );
        assert_eq!(variables.get("v"), Some(&VariableValue::Integer(1)));
        assert_eq!(diagnostics.of_kind(DiagnosticKind::ConflictingVariable).count(), 1);
        assert!(doc.select("meta").is_empty());
    }

    #[test]
    fn test_substitute_single_pass() {
        let mut variables = Variables::new();
        let mut diagnostics = Diagnostics::new();
        variables.declare("a", VariableValue::String("{{$b}}".into()), &mut diagnostics);
        variables.declare("b", VariableValue::Integer(3), &mut diagnostics);
        variables.declare("c", VariableValue::Boolean(false), &mut diagnostics);

        assert_eq!(
            variables.substitute("<p>{{$a}} {{$b}} {{$c}} {{$missing}} {{ $a }}</p>"),
            "<p>{{$b}} 3 false {{$missing}} {{ $a }}</p>"
        );
    }

    #[test]
    fn test_substitute_without_variables_is_identity() {
        let variables = Variables::new();
        assert_eq!(variables.substitute("<p>{{$x}}</p>"), "<p>{{$x}}</p>");
    }

    #[test]
    fn test_substitute_inside_attributes() {
        let (doc, variables, _) = extract(
            r#"<head><meta variable name="link" content="/about"></head><body><a href="{{$link}}">{{$link}}</a></body>"#,
        );
        let html = variables.substitute(&doc.html().unwrap());
        assert!(html.contains(r#"<a href="/about">/about</a>"#));
    }
}
