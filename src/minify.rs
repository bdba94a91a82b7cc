//! Script and stylesheet minification.
//!
//! Scripts go through oxc (parse, minify, minified codegen). Stylesheets are re-emitted from
//! the cssparser token stream with insignificant whitespace and comments removed.

use std::fmt::Write;

use cssparser::{ParseError, Parser as CssParser, ParserInput, ToCss, Token};
use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_minifier::{CompressOptions, MangleOptions, Minifier, MinifierOptions};
use oxc_parser::Parser;
use oxc_span::SourceType;
use serde::{Deserialize, Serialize};

type CssParseError<'i> = ParseError<'i, ()>;

// ═══════════════════════════════════════════════════════════════════════════════
// SCRIPTS
// ═══════════════════════════════════════════════════════════════════════════════

/// How a script is minified. `Compress` wins when an element carries both flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScriptMode {
    /// Compression only, identifiers kept, no line cap.
    Compile,
    /// Compression and identifier mangling, lines wrapped at the configured width.
    Compress,
}

/// Minify `source`. On parse failure the parser's messages are returned instead.
pub fn minify_script(
    source: &str,
    module: bool,
    mode: ScriptMode,
    line_break: usize,
) -> Result<String, Vec<String>> {
    let allocator = Allocator::default();
    let source_type = SourceType::default().with_module(module);
    let parsed = Parser::new(&allocator, source, source_type).parse();

    if !parsed.errors.is_empty() || parsed.panicked {
        let mut messages: Vec<String> = parsed.errors.iter().map(|e| e.to_string()).collect();
        if messages.is_empty() {
            messages.push("unrecoverable parse error".to_string());
        }
        return Err(messages);
    }

    let mut program = parsed.program;
    let options = MinifierOptions {
        mangle: match mode {
            ScriptMode::Compile => None,
            ScriptMode::Compress => Some(MangleOptions::default()),
        },
        compress: Some(CompressOptions::default()),
        ..MinifierOptions::default()
    };
    let minified = Minifier::new(options).minify(&allocator, &mut program);

    let code = Codegen::new()
        .with_options(CodegenOptions::minify())
        .with_scoping(minified.scoping)
        .build(&program)
        .code;
    let code = code.trim_end();

    Ok(match mode {
        ScriptMode::Compile => code.to_string(),
        ScriptMode::Compress => wrap_lines(code, line_break),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lexical {
    Code,
    Quoted(char),
    Template,
    Regex { in_class: bool },
    BlockComment,
    LineComment,
}

/// Insert a newline after the first `;` or `}` found in code once the current line has
/// reached `width` characters. Separators inside strings, templates, regex literals and
/// comments are never used.
pub fn wrap_lines(code: &str, width: usize) -> String {
    if width == 0 {
        return code.to_string();
    }

    let chars: Vec<char> = code.chars().collect();
    let mut out = String::with_capacity(code.len() + code.len() / width + 1);
    let mut state = Lexical::Code;
    // Brace depth of each open `${` substitution, innermost last.
    let mut substitutions: Vec<usize> = Vec::new();
    let mut depth = 0usize;
    let mut line_len = 0usize;
    let mut last_significant: Option<char> = None;
    let mut word = String::new();
    let mut in_word = false;

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        out.push(c);
        line_len = if c == '\n' { 0 } else { line_len + 1 };

        match state {
            Lexical::Quoted(quote) => {
                if c == '\\' {
                    if let Some(escaped) = next {
                        out.push(escaped);
                        line_len += 1;
                        i += 1;
                    }
                } else if c == quote || c == '\n' {
                    state = Lexical::Code;
                    last_significant = Some(quote);
                }
            }
            Lexical::Template => {
                if c == '\\' {
                    if let Some(escaped) = next {
                        out.push(escaped);
                        line_len += 1;
                        i += 1;
                    }
                } else if c == '`' {
                    state = Lexical::Code;
                    last_significant = Some('`');
                } else if c == '$' && next == Some('{') {
                    out.push('{');
                    line_len += 1;
                    i += 1;
                    substitutions.push(depth);
                    depth += 1;
                    state = Lexical::Code;
                    last_significant = Some('{');
                }
            }
            Lexical::Regex { in_class } => {
                if c == '\\' {
                    if let Some(escaped) = next {
                        out.push(escaped);
                        line_len += 1;
                        i += 1;
                    }
                } else if c == '[' {
                    state = Lexical::Regex { in_class: true };
                } else if c == ']' && in_class {
                    state = Lexical::Regex { in_class: false };
                } else if c == '/' && !in_class {
                    state = Lexical::Code;
                    last_significant = Some(')');
                }
            }
            Lexical::BlockComment => {
                if c == '*' && next == Some('/') {
                    out.push('/');
                    line_len += 1;
                    i += 1;
                    state = Lexical::Code;
                }
            }
            Lexical::LineComment => {
                if c == '\n' {
                    state = Lexical::Code;
                }
            }
            Lexical::Code => {
                match c {
                    '"' | '\'' => state = Lexical::Quoted(c),
                    '`' => state = Lexical::Template,
                    '/' if next == Some('*') => state = Lexical::BlockComment,
                    '/' if next == Some('/') => state = Lexical::LineComment,
                    '/' if regex_may_start(last_significant, &word) => {
                        state = Lexical::Regex { in_class: false }
                    }
                    '{' => depth += 1,
                    '}' => {
                        depth = depth.saturating_sub(1);
                        if substitutions.last() == Some(&depth) {
                            substitutions.pop();
                            state = Lexical::Template;
                        }
                    }
                    _ => {}
                }

                if is_identifier_char(c) {
                    if !in_word {
                        word.clear();
                    }
                    word.push(c);
                    in_word = true;
                } else {
                    in_word = false;
                    if !c.is_whitespace() {
                        word.clear();
                    }
                }
                if !c.is_whitespace() && state == Lexical::Code {
                    last_significant = Some(c);
                }

                if state == Lexical::Code
                    && substitutions.is_empty()
                    && (c == ';' || c == '}')
                    && line_len >= width
                    && next.is_some()
                    && next != Some('\n')
                {
                    out.push('\n');
                    line_len = 0;
                }
            }
        }
        i += 1;
    }

    out
}

/// Whether a `/` in code position opens a regex literal rather than dividing.
fn regex_may_start(previous: Option<char>, word: &str) -> bool {
    const KEYWORDS: &[&str] = &[
        "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case",
        "do", "else", "yield", "await",
    ];

    match previous {
        None => true,
        Some(c) if is_identifier_char(c) => KEYWORDS.contains(&word),
        Some(c) => !matches!(c, ')' | ']' | '}' | '"' | '\'' | '`'),
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

// ═══════════════════════════════════════════════════════════════════════════════
// STYLESHEETS
// ═══════════════════════════════════════════════════════════════════════════════

/// Minify a stylesheet. Comments are dropped except `/*! ... */`, whitespace collapses to a
/// single space and disappears around `{ } ; , >` and after `:`, and the last `;` of each
/// block is removed. Inside declaration blocks the space before `:` goes too; in selectors it
/// stays, since `a :hover` and `a:hover` differ.
pub fn minify_css(css: &str) -> String {
    let mut output = String::with_capacity(css.len());
    let mut input = ParserInput::new(css);
    let mut parser = CssParser::new(&mut input);

    minify_css_tokens(&mut parser, &mut output, false);
    output
}

/// At-rules whose block holds rules rather than declarations.
const NESTED_RULE_AT_RULES: &[&str] = &[
    "media",
    "supports",
    "document",
    "-moz-document",
    "layer",
    "container",
    "scope",
    "starting-style",
];

/// `declarations` is set while walking the body of a style rule (or of an at-rule such as
/// `@font-face` that takes declarations), where no selector can appear.
fn minify_css_tokens(parser: &mut CssParser, output: &mut String, declarations: bool) {
    let mut pending_space = false;
    let mut prelude_start = true;
    let mut nested_rules = false;

    while let Ok(token) = parser.next_including_whitespace_and_comments() {
        let token = token.clone();
        match &token {
            Token::WhiteSpace(_) => {
                pending_space = true;
                continue;
            }
            Token::Comment(text) if !text.starts_with('!') => {
                pending_space = true;
                continue;
            }
            _ => {}
        }

        if prelude_start {
            nested_rules = matches!(
                &token,
                Token::AtKeyword(name)
                    if NESTED_RULE_AT_RULES.contains(&name.to_ascii_lowercase().as_str())
            );
            prelude_start = false;
        }

        let colon_in_declaration = declarations && matches!(token, Token::Colon);
        if pending_space
            && !output.is_empty()
            && !ends_tight(output)
            && !is_tight(&token)
            && !colon_in_declaration
        {
            output.push(' ');
        }
        pending_space = false;
        if matches!(token, Token::Semicolon) {
            prelude_start = true;
        }

        let closing = match &token {
            Token::Function(_) | Token::ParenthesisBlock => Some(')'),
            Token::SquareBracketBlock => Some(']'),
            Token::CurlyBracketBlock => Some('}'),
            _ => None,
        };

        if let Token::Comment(text) = &token {
            let _ = write!(output, "/*{}*/", text);
        } else {
            let _ = token.to_css(output);
        }

        if let Some(closing) = closing {
            let nested_declarations = if closing == '}' {
                !nested_rules
            } else {
                declarations
            };
            let _ = parser.parse_nested_block(|nested| {
                minify_css_tokens(nested, output, nested_declarations);
                Ok::<_, CssParseError>(())
            });
            if closing == '}' {
                if output.ends_with(';') {
                    output.pop();
                }
                prelude_start = true;
            }
            output.push(closing);
        }
    }
}

fn ends_tight(output: &str) -> bool {
    output.ends_with("*/")
        || matches!(
            output.chars().last(),
            Some('{' | '}' | ';' | ',' | '>' | ':')
        )
}

fn is_tight(token: &Token) -> bool {
    matches!(
        token,
        Token::CurlyBracketBlock
            | Token::CloseCurlyBracket
            | Token::Semicolon
            | Token::Comma
            | Token::Delim('>')
    )
}
