//! Concurrent content fetching and extraction for selected files.
//!
//! Fetches run through a bounded, order-preserving `buffered` stream. Each
//! call has its own timeout, and the batch as a whole stops at the per-turn
//! deadline:
//!
//! ```text
//! selected ──▶ stream::iter ──▶ buffered(concurrency) ──▶ extract ──▶ ParseDelta
//!                                  │ timeout per call
//!                                  └ timeout_at turn deadline → deferred
//! ```
//!
//! A failed fetch still yields a [`ParsedFile`] carrying a placeholder, so the
//! answer prompt can say which files could not be read. Deferred files are
//! simply absent from the delta and get picked up on the next turn.

use futures::stream::{self, StreamExt};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::FetchConfig;
use crate::extract::{self, Extraction};
use crate::models::{FileDescriptor, ParsedFile};
use crate::traits::{ContentSource, FetchError};

/// Outcome of one fetch-and-parse batch.
#[derive(Debug, Clone, Default)]
pub struct ParseDelta {
    /// One entry per finished file, in selection order.
    pub parsed: Vec<ParsedFile>,
    /// Files whose fetch failed and carry a placeholder.
    pub failed: usize,
    /// Files whose extractor fell back to lower-fidelity text.
    pub fallbacks: usize,
    /// Paths not reached before the turn deadline.
    pub deferred: Vec<String>,
}

impl ParseDelta {
    pub fn status(&self) -> String {
        let mut status = format!("Fetched & parsed {} files.", self.parsed.len());
        if self.failed > 0 {
            status.push_str(&format!(" {} failed to fetch.", self.failed));
        }
        if !self.deferred.is_empty() {
            status.push_str(&format!(
                " {} deferred to the next question.",
                self.deferred.len()
            ));
        }
        status
    }
}

/// Placeholder text recorded for a file whose content could not be fetched.
pub fn failed_placeholder(path: &str) -> String {
    format!("<Failed to fetch content for {}>", path)
}

/// Selected files that have no parsed entry yet, in selection order.
pub fn pending_files<'a>(
    selected: &'a [FileDescriptor],
    parsed: &[ParsedFile],
) -> Vec<&'a FileDescriptor> {
    selected
        .iter()
        .filter(|f| !parsed.iter().any(|p| p.path.eq_ignore_ascii_case(&f.path)))
        .collect()
}

/// Fetches and extracts `files` with bounded concurrency.
pub async fn fetch_and_parse(
    source: &dyn ContentSource,
    files: &[&FileDescriptor],
    config: &FetchConfig,
) -> ParseDelta {
    let mut delta = ParseDelta::default();
    if files.is_empty() {
        return delta;
    }

    let per_call = Duration::from_secs(config.timeout_secs);
    let deadline = Instant::now() + Duration::from_secs(config.turn_deadline_secs);
    tracing::info!(files = files.len(), concurrency = config.concurrency, "fetching content");

    let results = stream::iter(files.iter().copied().map(|file| async move {
        let outcome = match tokio::time::timeout(per_call, source.fetch(&file.content_url)).await
        {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(per_call)),
        };
        (file, outcome)
    }))
    .buffered(config.concurrency.max(1));
    let mut results = std::pin::pin!(results);

    let mut finished = 0;
    loop {
        match tokio::time::timeout_at(deadline, results.next()).await {
            Ok(Some((file, outcome))) => {
                finished += 1;
                let entry = parse_outcome(file, outcome, &mut delta);
                delta.parsed.push(entry);
            }
            Ok(None) => break,
            Err(_) => {
                delta.deferred = files[finished..].iter().map(|f| f.path.clone()).collect();
                tracing::warn!(
                    deferred = delta.deferred.len(),
                    "turn deadline reached, remaining files deferred"
                );
                break;
            }
        }
    }

    tracing::info!(
        parsed = delta.parsed.len(),
        failed = delta.failed,
        fallbacks = delta.fallbacks,
        "fetch complete"
    );
    delta
}

fn parse_outcome(
    file: &FileDescriptor,
    outcome: Result<String, FetchError>,
    delta: &mut ParseDelta,
) -> ParsedFile {
    let parsed_text = match outcome {
        Ok(raw) => match extract::extract(&file.extension, &raw) {
            Extraction::Parsed(text) => text,
            Extraction::Fallback { text, reason } => {
                tracing::debug!(path = %file.path, %reason, "extractor fell back");
                delta.fallbacks += 1;
                text
            }
        },
        Err(e) => {
            tracing::warn!(path = %file.path, error = %e, "fetch failed");
            delta.failed += 1;
            failed_placeholder(&file.path)
        }
    };
    ParsedFile {
        path: file.path.clone(),
        extension: file.extension.clone(),
        parsed_text,
    }
}
