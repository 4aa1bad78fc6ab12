//! # repo-lens CLI (`lens`)
//!
//! Indexes one GitHub repository, then answers questions about it read from
//! standard input until `exit`, `quit`, or end of input.
//!
//! ## Usage
//!
//! ```bash
//! lens [--config FILE] [--branch NAME] [-v] <repo_url>
//! ```
//!
//! ## Examples
//!
//! ```bash
//! # Interactive session against the default branch
//! lens https://github.com/owner/repo
//!
//! # Custom config, another branch, info logging on stderr
//! lens --config ./lens.toml --branch dev -v owner/repo
//!
//! # Scripted questions
//! printf 'explain the architecture\nexit\n' | lens owner/repo
//! ```
//!
//! Answers go to stdout; logs and diagnostics go to stderr.

use anyhow::Result;
use clap::{CommandFactory, Parser};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use repo_lens::config::{self, Config};
use repo_lens::github::GitHubClient;
use repo_lens::llm;
use repo_lens::session::Session;

/// repo-lens: ask questions about a GitHub repository.
///
/// Relevant files are selected per question, digested, and passed to a
/// language model together with a one-time overview of the repository.
#[derive(Parser)]
#[command(
    name = "lens",
    about = "Ask natural-language questions about a GitHub repository",
    version
)]
struct Cli {
    /// Repository URL (`https://github.com/owner/repo` or `owner/repo`).
    repo_url: Option<String>,

    /// Path to configuration file (TOML). Built-in defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Branch to index; overrides `github.branch`.
    #[arg(long)]
    branch: Option<String>,

    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "repo_lens=warn",
        1 => "repo_lens=info",
        _ => "repo_lens=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn is_exit(line: &str) -> bool {
    matches!(line.to_lowercase().as_str(), "exit" | "quit")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let Some(repo_url) = cli.repo_url.clone() else {
        eprintln!("{}", Cli::command().render_usage());
        std::process::exit(1);
    };

    init_tracing(cli.verbose);

    let mut cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => Config::default(),
    };
    if let Some(branch) = cli.branch {
        cfg.github.branch = branch;
    }

    let github = Arc::new(GitHubClient::new(&cfg.github, &cfg.fetch)?);
    let model = llm::create_model(&cfg.llm)?;
    let mut session = Session::new(cfg, github.clone(), github, model);

    eprintln!("Indexing {} ...", repo_url);
    session.index(&repo_url).await?;
    eprintln!(
        "Indexed {} files. Ask a question, or type 'exit' to quit.",
        session
            .state()
            .repo_tree
            .as_ref()
            .map(|t| t.file_count())
            .unwrap_or(0)
    );

    let interactive = atty::is(atty::Stream::Stdin);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if interactive {
            print!("> ");
            std::io::stdout().flush()?;
        }
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if is_exit(question) {
            break;
        }

        match session.ask(question).await {
            Ok(answer) => println!("{}\n", answer),
            Err(e) => eprintln!("Error: {:#}", e),
        }
    }

    Ok(())
}
