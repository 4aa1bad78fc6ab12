//! GitHub tree listing and content retrieval.
//!
//! Walks the repository with the Contents API and resolves file content from
//! `raw.githubusercontent.com`. Implements both [`TreeSource`] and
//! [`ContentSource`].
//!
//! # Configuration
//!
//! ```toml
//! [github]
//! api_base = "https://api.github.com/repos/"
//! raw_base = "https://raw.githubusercontent.com/"
//! branch = "main"
//! token_env = "GITHUB_TOKEN"
//! exclude_globs = ["**/fixtures/**"]
//! ```
//!
//! # Authentication
//!
//! When the variable named by `token_env` is set, every request carries
//! `Authorization: Token <value>`, which lifts the anonymous rate limit.
//!
//! # Content payloads
//!
//! Raw URLs return the file verbatim. Blob API URLs return JSON with a
//! base64 `content` field; those are decoded transparently.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use futures::future::{BoxFuture, FutureExt};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use std::time::Duration;

use crate::config::{FetchConfig, GithubConfig};
use crate::models::FileDescriptor;
use crate::traits::{ContentSource, FetchError, RepoId, TreeSource};

const USER_AGENT: &str = concat!("repo-lens/", env!("CARGO_PKG_VERSION"));

/// HTTP client for one GitHub host configuration.
pub struct GitHubClient {
    client: reqwest::Client,
    config: GithubConfig,
    token: Option<String>,
    excludes: GlobSet,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContentsResponse {
    Listing(Vec<ContentEntry>),
    Single(ContentEntry),
}

#[derive(Debug, Deserialize)]
struct ContentEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: u64,
}

#[derive(Debug, Deserialize)]
struct BlobPayload {
    content: String,
    #[serde(default)]
    encoding: String,
}

impl GitHubClient {
    /// Create a client. Reads the token from `config.token_env` if present.
    pub fn new(config: &GithubConfig, fetch: &FetchConfig) -> Result<Self> {
        let timeout = Duration::from_secs(fetch.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        let token = std::env::var(&config.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty());
        Ok(Self {
            client,
            config: config.clone(),
            token,
            excludes: build_globset(&config.exclude_globs)?,
            timeout,
        })
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        match &self.token {
            Some(token) => request.header("Authorization", format!("Token {}", token)),
            None => request,
        }
    }

    /// True when a path is dropped from listings.
    pub fn is_excluded(&self, path: &str) -> bool {
        self.config
            .exclude_ext
            .iter()
            .any(|ext| path.ends_with(ext.as_str()))
            || self.excludes.is_match(path)
    }

    // Directories are listed depth-first in API order.
    fn list_dir<'a>(
        &'a self,
        repo: &'a RepoId,
        path: String,
        branch: &'a str,
    ) -> BoxFuture<'a, Result<Vec<ContentEntry>>> {
        async move {
            let url = format!(
                "{}{}/{}/contents/{}?ref={}",
                self.config.api_base,
                repo.owner,
                repo.name,
                encode_path(&path),
                urlencoding::encode(branch)
            );
            let response = self
                .get(&url)
                .header("Accept", "application/vnd.github+json")
                .send()
                .await
                .with_context(|| format!("Failed to list {}", url))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                bail!("GitHub API error {}: {}", status, body.trim());
            }

            let entries = match response.json::<ContentsResponse>().await? {
                ContentsResponse::Listing(entries) => entries,
                ContentsResponse::Single(entry) => vec![entry],
            };

            let mut files = Vec::new();
            for entry in entries {
                match entry.kind.as_str() {
                    "dir" => files.extend(self.list_dir(repo, entry.path, branch).await?),
                    "file" => files.push(entry),
                    _ => {}
                }
            }
            Ok(files)
        }
        .boxed()
    }

    fn raw_url(&self, repo: &RepoId, branch: &str, path: &str) -> String {
        format!(
            "{}{}/{}/{}/{}",
            self.config.raw_base,
            repo.owner,
            repo.name,
            encode_path(branch),
            encode_path(path)
        )
    }

    fn transport(&self, url: &str, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            return FetchError::Timeout(self.timeout);
        }
        FetchError::Transport {
            url: url.to_string(),
            message: e.without_url().to_string(),
        }
    }
}

#[async_trait]
impl TreeSource for GitHubClient {
    async fn list_files(&self, repo: &RepoId, branch: &str) -> Result<Vec<FileDescriptor>> {
        tracing::info!(repo = %repo, branch, "fetching directory tree");
        let entries = self.list_dir(repo, String::new(), branch).await?;
        let total = entries.len();

        let files: Vec<FileDescriptor> = entries
            .into_iter()
            .filter(|e| !self.is_excluded(&e.path))
            .map(|e| {
                let url = self.raw_url(repo, branch, &e.path);
                FileDescriptor::new(e.path, size_kb(e.size), url)
            })
            .collect();

        tracing::info!(
            repo = %repo,
            listed = total,
            kept = files.len(),
            "repository metadata tree created"
        );
        Ok(files)
    }
}

#[async_trait]
impl ContentSource for GitHubClient {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = self.get(url).send().await.map_err(|e| self.transport(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await.map_err(|e| self.transport(url, e))?;
        let text = decode_blob_payload(&body);
        if text.trim().is_empty() {
            return Err(FetchError::Empty(url.to_string()));
        }
        Ok(text)
    }
}

/// Percent-encodes each `/`-separated segment of a repository path.
pub fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Bytes to kilobytes, rounded to two decimals.
pub fn size_kb(bytes: u64) -> f64 {
    (bytes as f64 / 1024.0 * 100.0).round() / 100.0
}

/// Decodes a blob API payload; any other body is returned unchanged.
pub fn decode_blob_payload(body: &str) -> String {
    if !body.trim_start().starts_with('{') {
        return body.to_string();
    }
    match serde_json::from_str::<BlobPayload>(body) {
        Ok(blob) if blob.encoding == "base64" => {
            let compact: String = blob
                .content
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect();
            match base64::engine::general_purpose::STANDARD.decode(compact) {
                Ok(bytes) => String::from_utf8_lossy(&bytes).replace('\0', ""),
                Err(_) => body.to_string(),
            }
        }
        _ => body.to_string(),
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(
            Glob::new(pattern).with_context(|| format!("Invalid glob pattern: '{}'", pattern))?,
        );
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_with(exclude_globs: Vec<String>) -> GitHubClient {
        let config = GithubConfig {
            exclude_globs,
            ..GithubConfig::default()
        };
        GitHubClient::new(&config, &FetchConfig::default()).unwrap()
    }

    #[test]
    fn test_size_kb_rounding() {
        assert_eq!(size_kb(0), 0.0);
        assert_eq!(size_kb(1024), 1.0);
        assert_eq!(size_kb(1536), 1.5);
        assert_eq!(size_kb(1000), 0.98);
    }

    #[test]
    fn test_exclusions() {
        let client = client_with(vec!["**/fixtures/**".to_string()]);
        assert!(client.is_excluded("assets/logo.png"));
        assert!(client.is_excluded(".gitignore"));
        assert!(client.is_excluded("docs/paper.pdf"));
        assert!(client.is_excluded("tests/fixtures/case.json"));
        assert!(!client.is_excluded("src/main.py"));
        assert!(!client.is_excluded("README.md"));
    }

    #[test]
    fn test_decode_blob_payload() {
        let encoded = base64::engine::general_purpose::STANDARD.encode("print('hi')\n");
        let body = format!(
            r#"{{"content": "{}\n", "encoding": "base64", "sha": "abc"}}"#,
            encoded
        );
        assert_eq!(decode_blob_payload(&body), "print('hi')\n");
        assert_eq!(decode_blob_payload("plain text"), "plain text");
        assert_eq!(
            decode_blob_payload(r#"{"name": "pkg"}"#),
            r#"{"name": "pkg"}"#
        );
    }

    #[test]
    fn test_raw_url() {
        let client = client_with(vec![]);
        let repo: RepoId = "octo/demo".parse().unwrap();
        assert_eq!(
            client.raw_url(&repo, "main", "src/app.py"),
            "https://raw.githubusercontent.com/octo/demo/main/src/app.py"
        );
    }

    #[test]
    fn test_paths_are_percent_encoded() {
        assert_eq!(encode_path("src/app.py"), "src/app.py");
        assert_eq!(encode_path("docs/C# notes?.md"), "docs/C%23%20notes%3F.md");

        let client = client_with(vec![]);
        let repo: RepoId = "octo/demo".parse().unwrap();
        assert_eq!(
            client.raw_url(&repo, "main", "notes/#1 plan.md"),
            "https://raw.githubusercontent.com/octo/demo/main/notes/%231%20plan.md"
        );
    }
}
