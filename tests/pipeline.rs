use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use repo_lens::answer;
use repo_lens::config::Config;
use repo_lens::global;
use repo_lens::llm::LanguageModel;
use repo_lens::models::{FileDescriptor, Intent, Role};
use repo_lens::session::Session;
use repo_lens::traits::{ContentSource, FetchError, RepoId, TreeSource};

// ═══════════════════════════════════════════════════════════════════════
// Fakes
// ═══════════════════════════════════════════════════════════════════════

struct StaticTree {
    files: Vec<FileDescriptor>,
}

#[async_trait]
impl TreeSource for StaticTree {
    async fn list_files(&self, _repo: &RepoId, _branch: &str) -> Result<Vec<FileDescriptor>> {
        Ok(self.files.clone())
    }
}

struct BrokenTree;

#[async_trait]
impl TreeSource for BrokenTree {
    async fn list_files(&self, repo: &RepoId, _branch: &str) -> Result<Vec<FileDescriptor>> {
        bail!("GitHub API error 404 Not Found: {} does not exist", repo)
    }
}

struct MemoryContent {
    bodies: HashMap<String, String>,
    fetches: AtomicUsize,
}

impl MemoryContent {
    fn new(pairs: &[(&str, &str)]) -> Self {
        Self {
            bodies: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            fetches: AtomicUsize::new(0),
        }
    }

    fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentSource for MemoryContent {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.bodies.get(url).cloned().ok_or(FetchError::Status {
            status: 404,
            url: url.to_string(),
        })
    }
}

/// Replies with a fixed answer and records every user prompt.
struct RecordingModel {
    reply: String,
    prompts: Mutex<Vec<String>>,
}

impl RecordingModel {
    fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for RecordingModel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn complete(&self, _system: &str, user: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(user.to_string());
        Ok(self.reply.clone())
    }
}

struct FailingModel;

#[async_trait]
impl LanguageModel for FailingModel {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
        bail!("Gemini API error 503 Service Unavailable: overloaded")
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Fixtures
// ═══════════════════════════════════════════════════════════════════════

const REPO: &str = "https://github.com/octo/demo";

fn fd(path: &str, size_kb: f64) -> FileDescriptor {
    FileDescriptor::new(path, size_kb, path)
}

fn demo_files() -> Vec<FileDescriptor> {
    vec![
        fd("README.md", 1.0),
        fd("src/main.py", 2.0),
        fd("src/big_data.csv", 900.0),
    ]
}

fn demo_content() -> MemoryContent {
    MemoryContent::new(&[
        ("README.md", "# Demo\n\nA tiny demo project."),
        (
            "src/main.py",
            "import os\n\ndef preprocess(x):\n    \"\"\"Normalize input.\"\"\"\n    return x\n\ndef main():\n    preprocess(1)\n",
        ),
        ("src/big_data.csv", "a,b\n1,2\n"),
    ])
}

fn session_with(
    files: Vec<FileDescriptor>,
    content: Arc<MemoryContent>,
    model: Option<Arc<dyn LanguageModel>>,
) -> Session {
    Session::new(
        Config::default(),
        Arc::new(StaticTree { files }),
        content,
        model,
    )
}

fn selected_paths(session: &Session) -> Vec<String> {
    session
        .state()
        .selected_files()
        .iter()
        .map(|f| f.path.clone())
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════
// Scenarios
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_architecture_question_end_to_end() {
    let content = Arc::new(demo_content());
    let model = Arc::new(RecordingModel::new("It is a demo."));
    let mut session = session_with(demo_files(), content.clone(), Some(model.clone()));

    session.index(REPO).await.unwrap();
    assert_eq!(session.state().url.as_deref(), Some(REPO));
    assert_eq!(session.state().global_context.as_deref(), Some("It is a demo."));

    let reply = session.ask("explain the architecture").await.unwrap();
    assert_eq!(reply, "It is a demo.");

    let state = session.state();
    assert_eq!(state.intent, Intent::ArchitectureSummary);
    assert_eq!(selected_paths(&session), ["README.md", "src/main.py"]);
    assert_eq!(state.unselected_files(), ["src/big_data.csv".to_string()]);
    assert_eq!(state.parsed_files.len(), 2);
    assert!(state.parsed_files[1].parsed_text.contains("preprocess"));
    assert_eq!(state.summary.as_deref(), Some("It is a demo."));
    let last = state.messages.last().unwrap();
    assert_eq!(last.role, Role::Assistant);

    let prompts = model.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[0].contains("- src/big_data.csv (.csv, 900 KB)"));
    let answer_prompt = &prompts[1];
    assert!(answer_prompt.contains("User Query:\nexplain the architecture"));
    assert!(answer_prompt.contains("Global Repository Context:\nIt is a demo."));
    assert!(answer_prompt.contains("### File: README.md"));
    assert!(answer_prompt.contains("### File: src/main.py"));
    assert!(!answer_prompt.contains("a,b"));
}

#[tokio::test]
async fn test_second_turn_reuses_selection_and_parsed_files() {
    let content = Arc::new(demo_content());
    let model = Arc::new(RecordingModel::new("ok"));
    let mut session = session_with(demo_files(), content.clone(), Some(model.clone()));

    session.index(REPO).await.unwrap();
    session.ask("explain the architecture").await.unwrap();
    let fetches_after_first = content.fetch_count();

    session
        .ask("Where is the preprocess function used?")
        .await
        .unwrap();

    let state = session.state();
    assert_eq!(state.intent, Intent::FunctionUsage);
    assert_eq!(state.targets.function.as_deref(), Some("preprocess"));
    assert_eq!(selected_paths(&session), ["README.md", "src/main.py"]);
    assert_eq!(state.parsed_files.len(), 2);
    assert_eq!(content.fetch_count(), fetches_after_first);
    // The oversized file is evaluated again and logged again.
    assert_eq!(state.unselected_files().len(), 2);
    assert!(state
        .messages
        .iter()
        .any(|m| m.content.starts_with("Selected 0 new files (2 already selected, 1 unselected)")));
}

#[tokio::test]
async fn test_new_files_become_eligible_on_later_turns() {
    let files = vec![
        fd("README.md", 1.0),
        fd("docs/guide.rst", 3.0),
        fd("scripts/train_loop.sh", 1.0),
    ];
    let content = Arc::new(MemoryContent::new(&[
        ("README.md", "# Demo"),
        ("docs/guide.rst", "Guide"),
        ("scripts/train_loop.sh", "python train.py"),
    ]));
    let model = Arc::new(RecordingModel::new("ok"));
    let mut session = session_with(files, content, Some(model));
    session.index(REPO).await.unwrap();

    session.ask("give me an overview").await.unwrap();
    assert_eq!(selected_paths(&session), ["README.md"]);

    session.ask("describe the pipeline").await.unwrap();
    assert_eq!(
        selected_paths(&session),
        ["README.md", "scripts/train_loop.sh"]
    );
    assert_eq!(session.state().parsed_files.len(), 2);
    assert_eq!(
        session.state().parsed_files[1].parsed_text,
        "python train.py"
    );
}

#[tokio::test]
async fn test_fetch_failure_is_recorded_and_turn_continues() {
    let content = Arc::new(MemoryContent::new(&[("README.md", "# Demo")]));
    let model = Arc::new(RecordingModel::new("partial answer"));
    let mut session = session_with(demo_files(), content, Some(model.clone()));
    session.index(REPO).await.unwrap();

    let reply = session.ask("explain the architecture").await.unwrap();
    assert_eq!(reply, "partial answer");

    let parsed = &session.state().parsed_files;
    assert_eq!(parsed.len(), 2);
    assert_eq!(
        parsed[1].parsed_text,
        "<Failed to fetch content for src/main.py>"
    );
    let prompts = model.prompts();
    assert!(prompts[1].contains("<Failed to fetch content for src/main.py>"));
    assert!(session
        .state()
        .messages
        .iter()
        .any(|m| m.content.contains("1 failed to fetch")));
}

#[tokio::test]
async fn test_without_model_reports_diagnostics() {
    let content = Arc::new(demo_content());
    let mut session = session_with(demo_files(), content, None);

    session.index(REPO).await.unwrap();
    assert_eq!(
        session.state().global_context.as_deref(),
        Some(global::NO_MODEL)
    );

    let reply = session.ask("explain the architecture").await.unwrap();
    assert_eq!(reply, answer::NO_MODEL);
    assert_eq!(session.state().summary, None);
    assert_eq!(session.state().parsed_files.len(), 2);
}

#[tokio::test]
async fn test_tree_failure_aborts_indexing() {
    let content = Arc::new(demo_content());
    let mut session = Session::new(Config::default(), Arc::new(BrokenTree), content, None);

    let err = session.index(REPO).await.unwrap_err();
    assert!(format!("{:#}", err).contains("GitHub API error 404"));
    assert!(session.state().repo_tree.is_none());

    let reply = session.ask("explain the architecture").await.unwrap();
    assert_eq!(reply, answer::NO_MODEL);
    let messages: Vec<&str> = session
        .state()
        .messages
        .iter()
        .map(|m| m.content.as_str())
        .collect();
    assert!(messages.contains(&"No repository tree available."));
    assert!(messages.contains(&"No files selected for parsing."));
}

#[tokio::test]
async fn test_model_failure_fails_turn_but_keeps_session() {
    let content = Arc::new(demo_content());
    let mut session = session_with(demo_files(), content, Some(Arc::new(FailingModel)));

    session.index(REPO).await.unwrap();
    assert!(session
        .state()
        .global_context
        .as_deref()
        .unwrap()
        .starts_with("<Global context unavailable:"));

    assert!(session.ask("explain the architecture").await.is_err());
    assert_eq!(session.state().parsed_files.len(), 2);
    assert!(session
        .state()
        .messages
        .iter()
        .any(|m| m.content.starts_with("Failed to generate answer")));

    assert!(session.ask("what is the data flow").await.is_err());
    assert_eq!(session.state().intent, Intent::PipelineFlow);
}

#[tokio::test]
async fn test_rejects_non_github_url() {
    let content = Arc::new(demo_content());
    let mut session = session_with(demo_files(), content, None);
    assert!(session.index("https://gitlab.com/octo/demo").await.is_err());
    assert!(session.index("   ").await.is_err());
    assert_eq!(
        session.state().messages.last().unwrap().content,
        "No repository URL provided."
    );
}

#[tokio::test]
async fn test_describe_summarizes_state() {
    let content = Arc::new(demo_content());
    let model = Arc::new(RecordingModel::new("ok"));
    let mut session = session_with(demo_files(), content, Some(model));
    session.index(REPO).await.unwrap();
    session.ask("explain the architecture").await.unwrap();

    let description = session.state().describe();
    assert!(description.contains("repo_tree: 3 files"));
    assert!(description.contains("selected_files: 2"));
    assert!(description.contains("unselected_files: 1"));
    assert!(description.contains("intent: architecture_summary"));
    assert!(description.contains("keywords: [explain, architecture]"));
}
