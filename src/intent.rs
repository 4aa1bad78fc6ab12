//! Heuristic query analysis: intent label, keywords, and targets.
//!
//! Intent detection walks [`INTENT_TABLE`] in order and returns the first
//! intent with a pattern found anywhere in the lower-cased utterance, so the
//! table order is the priority order. Everything here is pure.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{Intent, QueryAnalysis, Targets};

/// Ordered (intent, patterns) table. Earlier rows win.
pub static INTENT_TABLE: Lazy<Vec<(Intent, Vec<Regex>)>> = Lazy::new(|| {
    let rows: [(Intent, &[&str]); 5] = [
        (
            Intent::FunctionUsage,
            &[
                r"where.*function",
                r"usage of",
                r"where is .* used",
                r"who calls",
                r"find usages",
            ],
        ),
        (
            Intent::TypeLookup,
            &[r"type of", r"what.*type", r"datatype of"],
        ),
        (
            Intent::PipelineFlow,
            &[
                r"pipeline",
                r"flow",
                r"process flow",
                r"execution flow",
                r"data flow",
            ],
        ),
        (
            Intent::DirectoryQuestion,
            &[
                r"what'?s inside",
                r"what is inside",
                r"show.*directory",
                r"explain.*directory",
                r"what does .* folder",
            ],
        ),
        (
            Intent::ArchitectureSummary,
            &[r"architecture", r"overall structure", r"design"],
        ),
    ];
    rows.iter()
        .map(|(intent, patterns)| {
            let compiled = patterns
                .iter()
                .map(|p| Regex::new(p).expect("static intent pattern"))
                .collect();
            (*intent, compiled)
        })
        .collect()
});

const STOP_WORDS: &[&str] = &["the", "a", "to", "in", "and", "where", "what"];
const MAX_KEYWORDS: usize = 5;

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").unwrap());
static CALL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)\s*\(").unwrap());
static NAME_BEFORE_FUNCTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b([A-Za-z_][A-Za-z0-9_]*)\s+function\b").unwrap());
static NAME_AFTER_FUNCTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bfunction\s+([A-Za-z_][A-Za-z0-9_]*)").unwrap());
static DIRECTORY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z0-9_.\-/]+/").unwrap());
static VARIABLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)type of ([A-Za-z_][A-Za-z0-9_]*)").unwrap());

/// Classifies the utterance. Returns the fallback intent when nothing matches.
pub fn detect_intent(query: &str) -> Intent {
    let lowered = query.to_lowercase();
    INTENT_TABLE
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|p| p.is_match(&lowered)))
        .map(|(intent, _)| *intent)
        .unwrap_or(Intent::HighLevelSummary)
}

fn is_keyword(token: &str) -> bool {
    token.len() > 2 && !STOP_WORDS.contains(&token)
}

/// Up to five lower-cased, non-stop-word tokens longer than two characters.
pub fn extract_keywords(query: &str) -> Vec<String> {
    TOKEN_RE
        .find_iter(query)
        .map(|m| m.as_str().to_lowercase())
        .filter(|t| is_keyword(t))
        .take(MAX_KEYWORDS)
        .collect()
}

/// Pulls function, directory, and variable targets out of the utterance.
pub fn extract_targets(query: &str) -> Targets {
    Targets {
        function: extract_function(query),
        directory: extract_directory(query),
        variable: VARIABLE_RE
            .captures(query)
            .map(|c| c[1].to_string()),
    }
}

fn extract_function(query: &str) -> Option<String> {
    if let Some(c) = CALL_RE.captures(query) {
        return Some(c[1].to_string());
    }
    let named = |re: &Regex| {
        re.captures_iter(query)
            .map(|c| c[1].to_string())
            .find(|name| {
                let lowered = name.to_lowercase();
                is_keyword(&lowered) && lowered != "function"
            })
    };
    named(&NAME_BEFORE_FUNCTION_RE).or_else(|| named(&NAME_AFTER_FUNCTION_RE))
}

fn extract_directory(query: &str) -> Option<String> {
    DIRECTORY_RE
        .find_iter(query)
        .map(|m| m.as_str())
        .find(|token| token[..token.len() - 1].contains('/'))
        .map(str::to_string)
}

/// Full analysis of the latest utterance, if any.
pub fn analyze(query: Option<&str>) -> QueryAnalysis {
    match query {
        Some(q) if !q.trim().is_empty() => QueryAnalysis {
            intent: detect_intent(q),
            keywords: extract_keywords(q),
            targets: extract_targets(q),
        },
        _ => QueryAnalysis::default(),
    }
}
