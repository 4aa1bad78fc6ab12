//! Conversation session: indexing once, answering many times.
//!
//! A [`Session`] owns a [`SessionState`] and the remote collaborators. Each
//! pipeline stage is a free function that reads the state and returns a
//! delta; only the session writes to the state.
//!
//! ```text
//! index(url):  list_files ─▶ RepositoryTree ─▶ global context
//!
//! ask(q):      analyze ─▶ select_files ─▶ fetch_and_parse ─▶ answer
//!                 │            │                 │              │
//!                 ▼            ▼                 ▼              ▼
//!              intent,     selection.apply   parsed_files   messages,
//!              keywords,                     (new only)     summary
//!              targets
//! ```
//!
//! Diagnostics ("no tree", "no model", fetch failures) are appended to the
//! conversation as system messages and never panic.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::answer::{self, AnswerContext, Outcome};
use crate::config::Config;
use crate::fetch;
use crate::global;
use crate::intent;
use crate::llm::LanguageModel;
use crate::models::{FileDescriptor, Intent, Message, ParsedFile, QueryAnalysis, Role, Targets};
use crate::select::{self, SelectionState};
use crate::traits::{ContentSource, RepoId, TreeSource};
use crate::tree::RepositoryTree;

/// Everything a session knows. Mutated only by [`Session`].
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub messages: Vec<Message>,
    pub url: Option<String>,
    pub repo_tree: Option<RepositoryTree>,
    pub global_context: Option<String>,
    pub selection: SelectionState,
    pub parsed_files: Vec<ParsedFile>,
    pub intent: Intent,
    pub keywords: Vec<String>,
    pub targets: Targets,
    pub summary: Option<String>,
}

impl SessionState {
    pub fn selected_files(&self) -> &[FileDescriptor] {
        self.selection.selected_files()
    }

    pub fn unselected_files(&self) -> &[String] {
        self.selection.unselected_files()
    }

    /// Latest user utterance, if any.
    pub fn latest_question(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    /// One line per field: collection sizes and truncated scalars.
    pub fn describe(&self) -> String {
        let tree = match &self.repo_tree {
            Some(tree) => format!("{} files", tree.file_count()),
            None => "none".to_string(),
        };
        [
            format!("messages: {}", self.messages.len()),
            format!("url: {}", self.url.as_deref().unwrap_or("none")),
            format!("repo_tree: {}", tree),
            format!(
                "global_context: {}",
                preview(self.global_context.as_deref().unwrap_or("none"))
            ),
            format!("selected_files: {}", self.selected_files().len()),
            format!("unselected_files: {}", self.unselected_files().len()),
            format!("parsed_files: {}", self.parsed_files.len()),
            format!("intent: {}", self.intent),
            format!("keywords: [{}]", self.keywords.join(", ")),
            format!("targets: {}", self.targets),
            format!(
                "summary: {}",
                preview(self.summary.as_deref().unwrap_or("none"))
            ),
        ]
        .join("\n")
    }

    fn note(&mut self, text: impl Into<String>) {
        let text = text.into();
        tracing::debug!(message = %text, "session note");
        self.messages.push(Message::system(text));
    }

    fn analysis(&self) -> QueryAnalysis {
        QueryAnalysis {
            intent: self.intent,
            keywords: self.keywords.clone(),
            targets: self.targets.clone(),
        }
    }
}

fn preview(text: &str) -> String {
    const MAX: usize = 80;
    let single_line = text.replace('\n', " ");
    let head = crate::extract::truncate_chars(&single_line, MAX);
    if head.len() < single_line.len() {
        format!("{}...", head)
    } else {
        head.to_string()
    }
}

/// One indexed repository and its conversation.
pub struct Session {
    id: Uuid,
    config: Config,
    state: SessionState,
    trees: Arc<dyn TreeSource>,
    content: Arc<dyn ContentSource>,
    model: Option<Arc<dyn LanguageModel>>,
}

impl Session {
    pub fn new(
        config: Config,
        trees: Arc<dyn TreeSource>,
        content: Arc<dyn ContentSource>,
        model: Option<Arc<dyn LanguageModel>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            state: SessionState::default(),
            trees,
            content,
            model,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fetches the tree and builds the global context.
    ///
    /// A listing failure leaves the session without a tree and returns the
    /// error; later questions then report that no tree is available.
    pub async fn index(&mut self, url: &str) -> Result<()> {
        let url = url.trim();
        if url.is_empty() {
            self.state.note("No repository URL provided.");
            anyhow::bail!("No repository URL provided.");
        }

        let repo: RepoId = url.parse()?;
        self.state.url = Some(url.to_string());
        tracing::info!(session = %self.id, repo = %repo, "indexing repository");

        let branch = self.config.github.branch.clone();
        let files = match self
            .trees
            .list_files(&repo, &branch)
            .await
            .with_context(|| format!("Failed to fetch repository tree for {}", repo))
        {
            Ok(files) => files,
            Err(e) => {
                self.state.note(format!("{:#}", e));
                return Err(e);
            }
        };

        let tree = RepositoryTree::from_files(files);
        self.state
            .note(format!("Fetched metadata tree for: {} ({} files)", url, tree.file_count()));
        let flattened = tree.flatten();
        self.state.repo_tree = Some(tree);

        let global_context = global::generate_global_context(
            Some(flattened.as_slice()),
            self.content.as_ref(),
            self.model.as_deref(),
            &self.config.context,
            Duration::from_secs(self.config.fetch.timeout_secs),
        )
        .await;
        self.state.global_context = Some(global_context);

        tracing::debug!(state = %self.state.describe(), "indexing complete");
        Ok(())
    }

    /// Runs one question through selection, fetching, and answering.
    ///
    /// Returns the answer, or the diagnostic shown instead of one. A model
    /// failure is returned as an error; the session stays usable.
    pub async fn ask(&mut self, question: &str) -> Result<String> {
        let question = question.trim();
        if !question.is_empty() {
            self.state.messages.push(Message::user(question));
        }

        let analysis = intent::analyze(self.state.latest_question());
        tracing::info!(
            intent = %analysis.intent,
            keywords = ?analysis.keywords,
            targets = %analysis.targets,
            "query analyzed"
        );
        self.state.intent = analysis.intent;
        self.state.keywords = analysis.keywords;
        self.state.targets = analysis.targets;

        self.select();
        self.fetch_pending().await;
        let reply = self.summarize().await;

        tracing::debug!(state = %self.state.describe(), "turn complete");
        reply
    }

    fn select(&mut self) {
        let files = self.state.repo_tree.as_ref().map(RepositoryTree::flatten);
        let delta = select::select_files(
            files.as_deref(),
            &self.state.analysis(),
            &self.config.selection,
            &self.state.selection,
        );
        tracing::info!(
            selected = delta.selected.len(),
            carried_over = delta.carried_over,
            unselected = delta.unselected.len(),
            "selection complete"
        );
        self.state.note(delta.status.clone());
        self.state.selection.apply(delta);
    }

    async fn fetch_pending(&mut self) {
        if self.state.selected_files().is_empty() {
            self.state.note("No files selected for parsing.");
            return;
        }

        let pending =
            fetch::pending_files(self.state.selection.selected_files(), &self.state.parsed_files);
        if pending.is_empty() {
            return;
        }
        let delta =
            fetch::fetch_and_parse(self.content.as_ref(), &pending, &self.config.fetch).await;

        let status = delta.status();
        self.state.parsed_files.extend(delta.parsed);
        self.state.note(status);
    }

    async fn summarize(&mut self) -> Result<String> {
        let analysis = self.state.analysis();
        let ctx = AnswerContext {
            question: self.state.latest_question(),
            analysis: &analysis,
            global_context: self.state.global_context.as_deref().unwrap_or(""),
            selected: self.state.selection.selected_files(),
            parsed: &self.state.parsed_files,
        };

        match answer::answer(self.model.as_deref(), &ctx, &self.config.context).await {
            Ok(Outcome::Answered(text)) => {
                self.state.messages.push(Message::assistant(text.clone()));
                self.state.summary = Some(text.clone());
                Ok(text)
            }
            Ok(Outcome::NoModel) => {
                self.state.note(answer::NO_MODEL);
                Ok(answer::NO_MODEL.to_string())
            }
            Err(e) => {
                tracing::warn!(error = %e, "answer generation failed");
                self.state.note(format!("Failed to generate answer: {:#}", e));
                Err(e)
            }
        }
    }
}
