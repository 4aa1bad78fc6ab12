//! Prompt assembly and the per-turn answer.
//!
//! Combines the global context, a capped number of parsed excerpts, a preview
//! of selected paths, and the query analysis into one `(system, user)` pair.
//! The model is invoked exactly once per turn.

use anyhow::Result;

use crate::config::ContextConfig;
use crate::llm::LanguageModel;
use crate::models::{FileDescriptor, Intent, ParsedFile, QueryAnalysis};

pub const DEFAULT_QUESTION: &str = "Provide a summary of this repository.";
pub const NO_MODEL: &str = "Language model not configured, cannot summarize.";

const SYSTEM_PROMPT: &str = "You are an expert software engineer and code analysis assistant.
You receive:
- A high-level repository context
- A list of selected relevant files
- Parsed content from those files
- The user's question
You must provide a precise, technically accurate answer.

Requirements:
- Use the parsed files and global context as primary ground truth.
- If the user asks about a function, variable, directory, or pipeline, focus on those elements specifically.
- When describing locations, mention file names and, if available, the roles or responsibilities of those files.
- If information is not present in the provided context, say so explicitly instead of hallucinating.";

/// Everything the assembler reads for one turn.
#[derive(Debug, Clone, Copy)]
pub struct AnswerContext<'a> {
    pub question: Option<&'a str>,
    pub analysis: &'a QueryAnalysis,
    pub global_context: &'a str,
    pub selected: &'a [FileDescriptor],
    pub parsed: &'a [ParsedFile],
}

/// Result of an answer attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Answered(String),
    /// No model is bound; nothing was invoked.
    NoModel,
}

/// Per-intent focus line appended to the user prompt.
pub fn intent_instruction(intent: Intent) -> &'static str {
    match intent {
        Intent::FunctionUsage => "Explain where the function is defined and where it is used.",
        Intent::TypeLookup => "Infer the variable type and show where it is defined or assigned.",
        Intent::PipelineFlow => "Describe the logical execution flow and the main entry points.",
        Intent::DirectoryQuestion => "Describe the purpose and contents of the directory.",
        Intent::ArchitectureSummary | Intent::HighLevelSummary => {
            "Explain the architecture and the major components."
        }
    }
}

pub fn system_prompt() -> &'static str {
    SYSTEM_PROMPT
}

/// Renders the user prompt.
pub fn build_user_prompt(ctx: &AnswerContext<'_>, config: &ContextConfig) -> String {
    let question = ctx
        .question
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .unwrap_or(DEFAULT_QUESTION);

    let preview = ctx
        .selected
        .iter()
        .take(config.preview_limit)
        .map(|f| format!("- {}", f.path))
        .collect::<Vec<_>>()
        .join("\n");

    let excerpts = ctx
        .parsed
        .iter()
        .take(config.max_parsed_files)
        .map(|p| format!("### File: {}\n{}\n", p.path, p.parsed_text))
        .collect::<Vec<_>>()
        .join("\n");

    let keywords = format!("[{}]", ctx.analysis.keywords.join(", "));

    format!(
        "User Query:\n{question}\n\n\
         Detected Intent: {intent}\n\
         Keywords: {keywords}\n\
         Targets: {targets}\n\n\
         Global Repository Context:\n{global}\n\n\
         Selected Files (preview):\n{preview}\n\n\
         Parsed File Content (truncated to {limit} files):\n{excerpts}\n\n\
         Now, based on the above information, answer the user's question as clearly and concretely as possible.\n\
         {focus}\n\
         If something cannot be determined from the provided context, clearly state the limitation.",
        intent = ctx.analysis.intent,
        targets = ctx.analysis.targets,
        global = ctx.global_context,
        limit = config.max_parsed_files,
        focus = intent_instruction(ctx.analysis.intent),
    )
}

/// Asks the model once. Model errors propagate to the caller.
pub async fn answer(
    model: Option<&dyn LanguageModel>,
    ctx: &AnswerContext<'_>,
    config: &ContextConfig,
) -> Result<Outcome> {
    let Some(model) = model else {
        return Ok(Outcome::NoModel);
    };

    let user = build_user_prompt(ctx, config);
    tracing::info!(model = model.name(), prompt_chars = user.len(), "requesting answer");
    let text = model.complete(SYSTEM_PROMPT, &user).await?;
    Ok(Outcome::Answered(text))
}
