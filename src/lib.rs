//! # repo-lens
//!
//! Ask natural-language questions about a remote GitHub repository.
//!
//! repo-lens indexes a repository's file tree once, then answers each
//! question by picking the files relevant to it, extracting bounded digests
//! from them, and handing the assembled context to a language model. Files
//! chosen in an earlier turn are never fetched or parsed again.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ TreeSource  │──▶│ Repository  │──▶│   Global     │   (once)
//! │  (GitHub)   │   │    Tree     │   │   context    │
//! └─────────────┘   └──────┬──────┘   └──────┬───────┘
//!                          │ flatten         │
//!        question          ▼                 ▼
//!   ┌──────────┐    ┌─────────────┐   ┌──────────────┐   ┌──────────┐
//!   │  Intent  │───▶│  Selector   │──▶│ Fetch+Extract│──▶│  Answer  │
//!   └──────────┘    └─────────────┘   └──────────────┘   └──────────┘
//!                    SelectionState     parsed_files       LLM call
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export GOOGLE_API_KEY=...
//! lens https://github.com/owner/repo
//! > explain the architecture
//! > Where is the preprocess function used?
//! > exit
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`tree`] | Ordered repository tree and flattening |
//! | [`intent`] | Intent, keyword, and target extraction |
//! | [`select`] | Query-aware relevance selection |
//! | [`traits`] | Tree and content source seams |
//! | [`github`] | GitHub Contents API client |
//! | [`fetch`] | Concurrent fetch and extraction |
//! | [`extract`] | Per-format text extraction |
//! | [`llm`] | Language model providers |
//! | [`global`] | One-time repository overview |
//! | [`answer`] | Prompt assembly and answering |
//! | [`session`] | Session state and turn orchestration |

pub mod answer;
pub mod config;
pub mod extract;
pub mod fetch;
pub mod github;
pub mod global;
pub mod intent;
pub mod llm;
pub mod models;
pub mod select;
pub mod session;
pub mod traits;
pub mod tree;
