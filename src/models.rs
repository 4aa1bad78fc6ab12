//! Core data models used throughout repo-lens.
//!
//! These types represent the repository files, query analysis, and parsed
//! excerpts that flow through the indexing and answering pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One file in the remote repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Slash-separated path, unique within a snapshot.
    pub path: String,
    /// Lower-cased suffix including the leading dot (`".py"`), or `""`.
    #[serde(rename = "ext", default)]
    pub extension: String,
    pub size_kb: f64,
    #[serde(rename = "url")]
    pub content_url: String,
    /// Ancestor folder keys joined in traversal order (`"src/"`).
    #[serde(default)]
    pub folder: String,
}

impl FileDescriptor {
    /// Builds a descriptor from a remote path, deriving extension and folder.
    pub fn new(path: impl Into<String>, size_kb: f64, content_url: impl Into<String>) -> Self {
        let path = path.into();
        let extension = extension_of(&path);
        let folder = folder_of(&path);
        Self {
            path,
            extension,
            size_kb,
            content_url: content_url.into(),
            folder,
        }
    }

    /// Case-insensitive identity used by the selection bookkeeping.
    pub fn key(&self) -> String {
        self.path.to_lowercase()
    }

    /// Final path segment.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Lower-cased extension of the final path segment, including the dot.
///
/// Mirrors the usual "split at the last dot" rule: dotfiles such as
/// `.gitignore` have no extension.
pub fn extension_of(path: &str) -> String {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rfind('.') {
        Some(0) | None => String::new(),
        Some(idx) => name[idx..].to_lowercase(),
    }
}

/// Folder prefix of a path with a trailing slash, `""` at the root.
pub fn folder_of(path: &str) -> String {
    match path.rfind('/') {
        Some(idx) => path[..=idx].to_string(),
        None => String::new(),
    }
}

/// What kind of information the user is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    FunctionUsage,
    TypeLookup,
    PipelineFlow,
    DirectoryQuestion,
    ArchitectureSummary,
    #[default]
    HighLevelSummary,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::FunctionUsage => "function_usage",
            Intent::TypeLookup => "type_lookup",
            Intent::PipelineFlow => "pipeline_flow",
            Intent::DirectoryQuestion => "directory_question",
            Intent::ArchitectureSummary => "architecture_summary",
            Intent::HighLevelSummary => "high_level_summary",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured targets pulled out of an utterance. `None` means "not detected".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Targets {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
}

impl Targets {
    pub fn is_empty(&self) -> bool {
        self.function.is_none() && self.directory.is_none() && self.variable.is_none()
    }

    /// Present targets only, keyed by name, for prompts and logs.
    pub fn to_map(&self) -> BTreeMap<&'static str, &str> {
        let mut map = BTreeMap::new();
        if let Some(f) = &self.function {
            map.insert("function", f.as_str());
        }
        if let Some(d) = &self.directory {
            map.insert("directory", d.as_str());
        }
        if let Some(v) = &self.variable {
            map.insert("variable", v.as_str());
        }
        map
    }
}

impl fmt::Display for Targets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .to_map()
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// Result of classifying one utterance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryAnalysis {
    pub intent: Intent,
    pub keywords: Vec<String>,
    pub targets: Targets,
}

/// Bounded plain-text digest of one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedFile {
    pub path: String,
    pub extension: String,
    pub parsed_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One entry of the conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}
