//! Format-specific text extraction for fetched repository files.
//!
//! Every extractor returns an [`Extraction`]: either the parsed digest or a
//! lower-fidelity fallback together with the reason. Extraction never fails
//! and every result is bounded in characters, so one bad file cannot abort
//! a batch or blow the prompt budget.
//!
//! | Extension | Extractor | Cap |
//! |-----------|-----------|-----|
//! | `.py` | syntax-tree digest (imports, classes, functions, docstrings) | 8000 |
//! | `.md`, `.txt` | markup stripping and blank-line collapsing | 8000 |
//! | `.ipynb` | markdown and code cells in order | 8000 |
//! | `.json`, `.yaml`, `.yml` | parse and pretty re-serialize | 5000 |
//! | other | raw head | 5000 |

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tree_sitter::{Node, Parser};

/// Cap for raw-head fallbacks and structured data.
pub const RAW_LIMIT: usize = 5000;
/// Cap for source digests, markup, and notebooks.
pub const DIGEST_LIMIT: usize = 8000;

/// Outcome of extracting one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Parsed(String),
    Fallback { text: String, reason: String },
}

impl Extraction {
    pub fn text(&self) -> &str {
        match self {
            Extraction::Parsed(text) => text,
            Extraction::Fallback { text, .. } => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Extraction::Parsed(text) => text,
            Extraction::Fallback { text, .. } => text,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Extraction::Fallback { .. })
    }

    fn fallback(text: impl Into<String>, reason: impl Into<String>) -> Self {
        Extraction::Fallback {
            text: text.into(),
            reason: reason.into(),
        }
    }
}

/// Extractor family chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    PythonSource,
    Markup,
    Notebook,
    Structured,
    Raw,
}

impl Format {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            ".py" => Format::PythonSource,
            ".md" | ".txt" => Format::Markup,
            ".ipynb" => Format::Notebook,
            ".json" | ".yaml" | ".yml" => Format::Structured,
            _ => Format::Raw,
        }
    }
}

/// Extracts bounded plain text from raw file content.
pub fn extract(extension: &str, raw: &str) -> Extraction {
    match Format::from_extension(extension) {
        Format::PythonSource => extract_python(raw),
        Format::Markup => extract_markup(raw),
        Format::Notebook => extract_notebook(raw),
        Format::Structured => extract_structured(raw),
        Format::Raw => Extraction::Parsed(truncate_chars(raw, RAW_LIMIT).to_string()),
    }
}

/// First `max` characters of `s`, never splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ============ Python source ============

#[derive(Default)]
struct PythonDigest {
    imports: Vec<String>,
    classes: Vec<String>,
    functions: Vec<String>,
    docstrings: Vec<(String, String)>,
}

impl PythonDigest {
    fn record_doc(&mut self, name: &str, doc: String) {
        match self.docstrings.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = doc,
            None => self.docstrings.push((name.to_string(), doc)),
        }
    }

    fn render(&self) -> String {
        let mut sections = Vec::new();
        if !self.imports.is_empty() {
            sections.push(format!("## Imports:\n{}", bullet_list(&self.imports)));
        }
        if !self.classes.is_empty() {
            sections.push(format!("## Classes:\n{}", bullet_list(&self.classes)));
        }
        if !self.functions.is_empty() {
            sections.push(format!("## Functions:\n{}", bullet_list(&self.functions)));
        }
        let documented: Vec<&(String, String)> = self
            .docstrings
            .iter()
            .filter(|(_, doc)| !doc.is_empty())
            .collect();
        if !documented.is_empty() {
            sections.push("## Docstrings:\n".to_string());
            for (name, doc) in documented {
                sections.push(format!("### {}\n{}\n", name, doc));
            }
        }
        sections.join("\n")
    }
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|i| format!("- {}", i))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Digest of a Python module, or its comment-stripped text on syntax errors.
pub fn extract_python(raw: &str) -> Extraction {
    let mut parser = Parser::new();
    if let Err(e) = parser.set_language(&tree_sitter_python::LANGUAGE.into()) {
        return python_fallback(raw, format!("python grammar unavailable: {}", e));
    }
    let Some(tree) = parser.parse(raw, None) else {
        return python_fallback(raw, "parser returned no tree");
    };
    let root = tree.root_node();
    if root.has_error() {
        return python_fallback(raw, "syntax error");
    }

    let src = raw.as_bytes();
    let mut digest = PythonDigest::default();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        match node.kind() {
            "import_statement" => {
                let mut cursor = node.walk();
                for name in node.children_by_field_name("name", &mut cursor) {
                    let target = match name.kind() {
                        "aliased_import" => name.child_by_field_name("name").unwrap_or(name),
                        _ => name,
                    };
                    digest.imports.push(node_text(target, src));
                }
            }
            "import_from_statement" => {
                if let Some(module) = node.child_by_field_name("module_name") {
                    if let Some(name) = module_name(module, src) {
                        digest.imports.push(name);
                    }
                }
            }
            "future_import_statement" => digest.imports.push("__future__".to_string()),
            "function_definition" | "class_definition" => {
                if let Some(name) = node.child_by_field_name("name") {
                    let name = node_text(name, src);
                    let doc = docstring(node, src).unwrap_or_default();
                    if node.kind() == "class_definition" {
                        digest.classes.push(name.clone());
                    } else {
                        digest.functions.push(name.clone());
                    }
                    digest.record_doc(&name, doc);
                }
            }
            _ => {}
        }
        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }

    let rendered = digest.render();
    if rendered.is_empty() {
        return python_fallback(raw, "no definitions found");
    }
    Extraction::Parsed(truncate_chars(&rendered, DIGEST_LIMIT).to_string())
}

fn python_fallback(raw: &str, reason: impl Into<String>) -> Extraction {
    let stripped = strip_comment_lines(raw);
    Extraction::fallback(truncate_chars(&stripped, DIGEST_LIMIT), reason)
}

fn node_text(node: Node, src: &[u8]) -> String {
    node.utf8_text(src).unwrap_or_default().to_string()
}

// `from .pkg import x` reports `pkg`; a bare `from . import x` has no module.
fn module_name(node: Node, src: &[u8]) -> Option<String> {
    match node.kind() {
        "relative_import" => {
            let mut cursor = node.walk();
            let dotted = node
                .named_children(&mut cursor)
                .find(|c| c.kind() == "dotted_name");
            dotted.map(|d| node_text(d, src))
        }
        _ => Some(node_text(node, src)),
    }
}

fn docstring(def: Node, src: &[u8]) -> Option<String> {
    let body = def.child_by_field_name("body")?;
    let mut cursor = body.walk();
    let first = body
        .named_children(&mut cursor)
        .find(|c| c.kind() != "comment")?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let literal = first.named_child(0)?;
    if literal.kind() != "string" {
        return None;
    }
    Some(clean_docstring(literal.utf8_text(src).ok()?))
}

/// Strips prefixes and quotes, then removes common indentation.
fn clean_docstring(literal: &str) -> String {
    let body = literal.trim_start_matches(|c: char| "rRuUbBfF".contains(c));
    let body = ["\"\"\"", "'''", "\"", "'"]
        .iter()
        .find_map(|q| body.strip_prefix(q).and_then(|b| b.strip_suffix(q)))
        .unwrap_or(body);

    let mut lines = body.lines();
    let first = lines.next().unwrap_or("").trim().to_string();
    let rest: Vec<&str> = lines.collect();
    let indent = rest
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| indent_width(l))
        .min()
        .unwrap_or(0);

    let mut out = vec![first];
    for line in rest {
        let cut = indent.min(indent_width(line));
        out.push(line[cut..].trim_end().to_string());
    }
    out.join("\n").trim().to_string()
}

// Only spaces and tabs count, so the cut always lands on a char boundary.
fn indent_width(line: &str) -> usize {
    line.len() - line.trim_start_matches([' ', '\t']).len()
}

/// Drops lines that hold only a `#` comment.
pub fn strip_comment_lines(raw: &str) -> String {
    raw.lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n")
}

// ============ Markup ============

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static BLANK_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Removes embedded tags and collapses runs of blank lines.
pub fn extract_markup(raw: &str) -> Extraction {
    let stripped = TAG_RE.replace_all(raw, "");
    let collapsed = BLANK_RUN_RE.replace_all(&stripped, "\n\n");
    Extraction::Parsed(truncate_chars(collapsed.trim(), DIGEST_LIMIT).to_string())
}

// ============ Notebook ============

#[derive(Deserialize)]
struct Notebook {
    cells: Vec<Cell>,
}

#[derive(Deserialize)]
struct Cell {
    cell_type: String,
    #[serde(default)]
    source: CellSource,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CellSource {
    Text(String),
    Lines(Vec<String>),
}

impl Default for CellSource {
    fn default() -> Self {
        CellSource::Text(String::new())
    }
}

impl CellSource {
    fn joined(&self) -> String {
        match self {
            CellSource::Text(s) => s.clone(),
            CellSource::Lines(lines) => lines.concat(),
        }
    }
}

/// Markdown and code cells in document order, each labelled by type.
pub fn extract_notebook(raw: &str) -> Extraction {
    let notebook: Notebook = match serde_json::from_str(raw) {
        Ok(nb) => nb,
        Err(e) => {
            return Extraction::fallback(
                truncate_chars(raw, RAW_LIMIT),
                format!("malformed notebook: {}", e),
            )
        }
    };

    let cells: Vec<String> = notebook
        .cells
        .iter()
        .filter_map(|cell| match cell.cell_type.as_str() {
            "markdown" => Some(format!("## Markdown Cell:\n{}", cell.source.joined())),
            "code" => Some(format!("## Code Cell:\n{}", cell.source.joined())),
            _ => None,
        })
        .collect();
    Extraction::Parsed(truncate_chars(&cells.join("\n\n"), DIGEST_LIMIT).to_string())
}

// ============ Structured data ============

/// JSON first, then YAML, then the raw head. Parsed data is pretty-printed.
pub fn extract_structured(raw: &str) -> Extraction {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) {
        if let Ok(pretty) = serde_json::to_string_pretty(&value) {
            return Extraction::Parsed(truncate_chars(&pretty, RAW_LIMIT).to_string());
        }
    }
    match serde_yaml::from_str::<serde_yaml::Value>(raw) {
        Ok(value) => match serde_yaml::to_string(&value) {
            Ok(pretty) => Extraction::Parsed(truncate_chars(&pretty, RAW_LIMIT).to_string()),
            Err(e) => Extraction::fallback(truncate_chars(raw, RAW_LIMIT), e.to_string()),
        },
        Err(e) => Extraction::fallback(
            truncate_chars(raw, RAW_LIMIT),
            format!("neither JSON nor YAML: {}", e),
        ),
    }
}
