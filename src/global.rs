//! One-time repository overview generated right after indexing.
//!
//! A handful of entry-point files (README, setup scripts, `main`, configs)
//! are sampled for their first lines, the head of the file listing is
//! rendered, and the model is asked for a short architectural overview. The
//! result is stored once per session and reused by every answer.

use futures::future::join_all;
use std::time::Duration;

use crate::config::ContextConfig;
use crate::llm::LanguageModel;
use crate::models::FileDescriptor;
use crate::traits::{ContentSource, FetchError};

/// Path substrings that mark a file as worth sampling for the overview.
pub const SAMPLE_MARKERS: [&str; 7] = [
    "readme",
    "setup",
    "main",
    "app",
    "requirements",
    "scripts",
    "configs",
];

pub const NO_TREE: &str = "No repo structure available";
pub const NO_MODEL: &str = "Global context unavailable: language model not configured.";

const SYSTEM_PROMPT: &str = "You are an expert GitHub repository summarizer. \
You explain which functions and modules are present in a repository and how \
they connect to each other, in plain language a newcomer can follow.";

/// The first `limit` files whose lower-cased path contains a sample marker.
pub fn sample_files(files: &[FileDescriptor], limit: usize) -> Vec<&FileDescriptor> {
    files
        .iter()
        .filter(|f| {
            let path = f.path.to_lowercase();
            SAMPLE_MARKERS.iter().any(|m| path.contains(m))
        })
        .take(limit)
        .collect()
}

/// `- path (ext, size KB)` for the first `limit` files.
pub fn structure_listing(files: &[FileDescriptor], limit: usize) -> String {
    files
        .iter()
        .take(limit)
        .map(|f| format!("- {} ({}, {} KB)", f.path, f.extension, f.size_kb))
        .collect::<Vec<_>>()
        .join("\n")
}

fn head_lines(text: &str, lines: usize) -> String {
    text.lines().take(lines).collect::<Vec<_>>().join("\n")
}

/// Fetches the head of every sampled file; failures become inline notes.
pub async fn file_headers(
    source: &dyn ContentSource,
    samples: &[&FileDescriptor],
    lines: usize,
    timeout: Duration,
) -> Vec<String> {
    let fetches = samples.iter().map(|file| async move {
        let outcome = match tokio::time::timeout(timeout, source.fetch(&file.content_url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(timeout)),
        };
        match outcome {
            Ok(text) => format!("{}:\n{}\n", file.path, head_lines(&text, lines)),
            Err(e) => format!("{}: <Error in fetching snippet: {}>", file.path, e),
        }
    });
    join_all(fetches).await
}

/// The overview request sent to the model, as `(system, user)`.
pub fn build_prompt(listing: &str, headers: &[String], tree_limit: usize) -> (String, String) {
    let headers = if headers.is_empty() {
        "No key files found.".to_string()
    } else {
        headers.join("\n")
    };
    let user = format!(
        "Below is a summary of a GitHub repository structure and small snippets from key files.\n\n\
         ### File Structure (first {tree_limit} files):\n{listing}\n\n\
         ### Key File Headers:\n{headers}\n\n\
         Please describe in 5-8 sentences:\n\
         1. The overall purpose of this repository.\n\
         2. The main components or modules and their likely roles.\n\
         3. How these modules might interact logically (e.g., data -> model -> evaluation).\n\
         4. Which parts appear to be core, supporting, or documentation."
    );
    (SYSTEM_PROMPT.to_string(), user)
}

/// Builds the session's global context. Never fails; problems are reported
/// in the returned text.
pub async fn generate_global_context(
    files: Option<&[FileDescriptor]>,
    source: &dyn ContentSource,
    model: Option<&dyn LanguageModel>,
    config: &ContextConfig,
    fetch_timeout: Duration,
) -> String {
    let Some(files) = files.filter(|f| !f.is_empty()) else {
        tracing::warn!("no repository tree for global context");
        return NO_TREE.to_string();
    };
    let Some(model) = model else {
        return NO_MODEL.to_string();
    };

    let samples = sample_files(files, config.global_sample_files);
    tracing::info!(samples = samples.len(), "building global context");
    let headers = file_headers(source, &samples, config.snippet_lines, fetch_timeout).await;
    let listing = structure_listing(files, config.global_tree_files);
    let (system, user) = build_prompt(&listing, &headers, config.global_tree_files);

    match model.complete(&system, &user).await {
        Ok(summary) => {
            tracing::info!(chars = summary.len(), "global context created");
            summary.trim().to_string()
        }
        Err(e) => {
            tracing::warn!(error = %e, "global context generation failed");
            format!("<Global context unavailable: {}>", e)
        }
    }
}
