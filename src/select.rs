//! Query-aware relevance selection.
//!
//! Given the flattened repository listing, the analysis of the latest
//! question, and the selection carried over from earlier turns, decides which
//! files get fetched and parsed this turn.
//!
//! # Decision order per file
//!
//! 1. Already selected (case-insensitive path) → skipped, not re-evaluated.
//! 2. Larger than `max_size_kb` → unselected. Nothing overrides this.
//! 3. Selected when any of these hold:
//!    important name substring, query keyword substring, important
//!    extension, or the intent-specific boost.
//! 4. Otherwise unselected.
//!
//! [`select_files`] is pure: it returns a [`SelectionDelta`] and the session
//! merges it with [`SelectionState::apply`].

use std::collections::HashSet;

use crate::config::SelectionConfig;
use crate::models::{FileDescriptor, Intent, QueryAnalysis};

/// Files selected so far in a session plus the running unselected log.
#[derive(Debug, Clone, Default)]
pub struct SelectionState {
    selected: Vec<FileDescriptor>,
    keys: HashSet<String>,
    unselected: Vec<String>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selected files in insertion order.
    pub fn selected_files(&self) -> &[FileDescriptor] {
        &self.selected
    }

    /// Paths evaluated and not selected, across all turns.
    pub fn unselected_files(&self) -> &[String] {
        &self.unselected
    }

    pub fn is_selected(&self, path: &str) -> bool {
        self.keys.contains(&path.to_lowercase())
    }

    /// Merges a delta. Paths already selected are ignored.
    pub fn apply(&mut self, delta: SelectionDelta) {
        for file in delta.selected {
            if self.keys.insert(file.key()) {
                self.selected.push(file);
            }
        }
        self.unselected.extend(delta.unselected);
    }
}

/// Outcome of one selector run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionDelta {
    pub selected: Vec<FileDescriptor>,
    pub unselected: Vec<String>,
    /// Files skipped because an earlier turn already selected them.
    pub carried_over: usize,
    pub status: String,
}

/// Why a file was selected, for debug logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    ImportantName,
    Keyword,
    ImportantExtension,
    IntentBoost,
}

/// Why a file was left out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    TooLarge,
    NoMatch,
}

/// Per-file verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Selected(Reason),
    Unselected(Rejection),
}

/// Classifies one file against the policy and the query analysis.
pub fn evaluate(
    file: &FileDescriptor,
    analysis: &QueryAnalysis,
    policy: &SelectionConfig,
) -> Verdict {
    if file.size_kb > policy.max_size_kb {
        return Verdict::Unselected(Rejection::TooLarge);
    }

    let path = file.path.to_lowercase();
    let ext = file.extension.to_lowercase();

    if policy
        .important_names
        .iter()
        .any(|name| path.contains(name.as_str()))
    {
        return Verdict::Selected(Reason::ImportantName);
    }
    if matches_keyword(&path, &analysis.keywords) {
        return Verdict::Selected(Reason::Keyword);
    }
    if policy.important_ext.iter().any(|e| *e == ext) {
        return Verdict::Selected(Reason::ImportantExtension);
    }
    if intent_boost(&path, &ext, analysis, policy) {
        return Verdict::Selected(Reason::IntentBoost);
    }
    Verdict::Unselected(Rejection::NoMatch)
}

fn matches_keyword(path: &str, keywords: &[String]) -> bool {
    keywords
        .iter()
        .any(|k| !k.is_empty() && path.contains(&k.to_lowercase()))
}

fn contains_target(path: &str, target: Option<&String>) -> bool {
    target.is_some_and(|t| !t.is_empty() && path.contains(&t.to_lowercase()))
}

fn intent_boost(path: &str, ext: &str, analysis: &QueryAnalysis, policy: &SelectionConfig) -> bool {
    let targets = &analysis.targets;
    match analysis.intent {
        Intent::FunctionUsage => {
            contains_target(path, targets.function.as_ref())
                || matches_keyword(path, &analysis.keywords)
        }
        Intent::TypeLookup => {
            contains_target(path, targets.variable.as_ref())
                || matches_keyword(path, &analysis.keywords)
        }
        Intent::DirectoryQuestion => targets.directory.as_ref().is_some_and(|dir| {
            let dir = dir.trim_start_matches('/').to_lowercase();
            !dir.is_empty() && path.starts_with(&dir)
        }),
        Intent::PipelineFlow => policy
            .pipeline_markers
            .iter()
            .any(|m| path.contains(m.as_str())),
        Intent::ArchitectureSummary => {
            path.matches('/').count() <= 1 && ext == policy.primary_ext.to_lowercase()
        }
        Intent::HighLevelSummary => matches_keyword(path, &analysis.keywords),
    }
}

/// Runs the selector over `files` against the carried-over `state`.
///
/// `files` is `None` when the session has no repository tree; that is a
/// no-op with a diagnostic status rather than an error.
pub fn select_files(
    files: Option<&[FileDescriptor]>,
    analysis: &QueryAnalysis,
    policy: &SelectionConfig,
    state: &SelectionState,
) -> SelectionDelta {
    let Some(files) = files else {
        return SelectionDelta {
            status: "No repository tree available.".to_string(),
            ..SelectionDelta::default()
        };
    };

    let mut delta = SelectionDelta::default();
    let mut seen: HashSet<String> = HashSet::new();

    for file in files {
        let key = file.key();
        if state.is_selected(&key) || seen.contains(&key) {
            delta.carried_over += 1;
            continue;
        }
        match evaluate(file, analysis, policy) {
            Verdict::Selected(reason) => {
                tracing::debug!(path = %file.path, ?reason, "selected");
                seen.insert(key);
                delta.selected.push(file.clone());
            }
            Verdict::Unselected(rejection) => {
                tracing::debug!(path = %file.path, ?rejection, "unselected");
                delta.unselected.push(file.path.clone());
            }
        }
    }

    delta.status = format!(
        "Selected {} new files ({} already selected, {} unselected) for intent {}.",
        delta.selected.len(),
        delta.carried_over,
        delta.unselected.len(),
        analysis.intent
    );
    delta
}
