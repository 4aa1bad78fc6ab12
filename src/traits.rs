//! Capability traits for the remote collaborators of a session.
//!
//! The pipeline only talks to the outside world through these seams, so
//! tests and alternative hosting backends can plug in their own
//! implementations. [`crate::github::GitHubClient`] implements both.
//!
//! ```text
//! ┌──────────────┐  list_files()  ┌──────────────┐
//! │  TreeSource  │───────────────▶│   Session    │
//! └──────────────┘                │  (indexing)  │
//! ┌──────────────┐  fetch(url)    │  (per turn)  │
//! │ContentSource │───────────────▶│              │
//! └──────────────┘                └──────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use repo_lens::traits::{ContentSource, FetchError};
//!
//! pub struct StaticContent(String);
//!
//! #[async_trait]
//! impl ContentSource for StaticContent {
//!     async fn fetch(&self, _url: &str) -> Result<String, FetchError> {
//!         Ok(self.0.clone())
//!     }
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::models::FileDescriptor;

// ═══════════════════════════════════════════════════════════════════════
// Repository identifiers
// ═══════════════════════════════════════════════════════════════════════

/// `owner/name` of a hosted repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl FromStr for RepoId {
    type Err = anyhow::Error;

    /// Accepts `https://github.com/owner/repo[.git][/...]`,
    /// `github.com/owner/repo`, or plain `owner/repo`.
    fn from_str(url: &str) -> Result<Self> {
        let trimmed = url.trim();
        let rest = trimmed
            .strip_prefix("https://")
            .or_else(|| trimmed.strip_prefix("http://"))
            .unwrap_or(trimmed);
        let rest = rest.strip_prefix("www.").unwrap_or(rest);
        let rest = rest.strip_prefix("github.com/").unwrap_or(rest);

        let mut parts = rest.split('/').filter(|p| !p.is_empty());
        match (parts.next(), parts.next()) {
            (Some(owner), Some(name)) => {
                let name = name.strip_suffix(".git").unwrap_or(name);
                if owner.contains(':') || owner.contains('.') || name.is_empty() {
                    anyhow::bail!("Not a GitHub repository URL: '{}'", url);
                }
                Ok(RepoId {
                    owner: owner.to_string(),
                    name: name.to_string(),
                })
            }
            _ => anyhow::bail!(
                "Not a GitHub repository URL: '{}'. Expected https://github.com/<owner>/<repo>",
                url
            ),
        }
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Tree listing
// ═══════════════════════════════════════════════════════════════════════

/// Lists every file of a repository at a branch.
#[async_trait]
pub trait TreeSource: Send + Sync {
    /// Returns the flat listing, already filtered by the exclusion policy.
    ///
    /// Any failure aborts indexing; callers never use a partial tree.
    async fn list_files(&self, repo: &RepoId, branch: &str) -> Result<Vec<FileDescriptor>>;
}

// ═══════════════════════════════════════════════════════════════════════
// Content fetch
// ═══════════════════════════════════════════════════════════════════════

/// Why a single content fetch produced no text.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("empty content from {0}")]
    Empty(String),
}

/// Retrieves the raw text behind a file's content locator.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repo_urls() {
        let expected = RepoId {
            owner: "kXborg".to_string(),
            name: "vlms".to_string(),
        };
        for url in [
            "https://github.com/kXborg/vlms",
            "https://github.com/kXborg/vlms/",
            "https://github.com/kXborg/vlms.git",
            "https://github.com/kXborg/vlms/tree/main/src",
            "http://www.github.com/kXborg/vlms",
            "github.com/kXborg/vlms",
            "kXborg/vlms",
        ] {
            assert_eq!(url.parse::<RepoId>().unwrap(), expected, "{}", url);
        }
        assert_eq!(expected.to_string(), "kXborg/vlms");
    }

    #[test]
    fn test_reject_non_repo_urls() {
        assert!("https://github.com/onlyowner".parse::<RepoId>().is_err());
        assert!("".parse::<RepoId>().is_err());
        assert!("https://gitlab.com/a/b".parse::<RepoId>().is_err());
    }

    #[test]
    fn test_fetch_error_messages() {
        let err = FetchError::Status {
            status: 404,
            url: "https://raw/x".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 404 from https://raw/x");
        let err = FetchError::Timeout(Duration::from_secs(2));
        assert_eq!(err.to_string(), "timed out after 2s");
    }
}
