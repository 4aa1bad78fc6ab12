use anyhow::{Context, Result};
use globset::Glob;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GithubConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_raw_base")]
    pub raw_base: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Environment variable holding the API token, if any.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_exclude_ext")]
    pub exclude_ext: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            raw_base: default_raw_base(),
            branch: default_branch(),
            token_env: default_token_env(),
            exclude_ext: default_exclude_ext(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.github.com/repos/".to_string()
}
fn default_raw_base() -> String {
    "https://raw.githubusercontent.com/".to_string()
}
fn default_branch() -> String {
    "main".to_string()
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}
fn default_exclude_ext() -> Vec<String> {
    [
        ".gif",
        ".jpg",
        ".jpeg",
        ".png",
        ".mp4",
        ".gitignore",
        ".git",
        ".pdf",
        ".vscode",
        ".docker",
        ".docstr",
        ".docstr.yaml",
        ".github",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Relevance selector policy.
#[derive(Debug, Deserialize, Clone)]
pub struct SelectionConfig {
    #[serde(default = "default_max_size_kb")]
    pub max_size_kb: f64,
    #[serde(default = "default_important_names")]
    pub important_names: Vec<String>,
    #[serde(default = "default_important_ext")]
    pub important_ext: Vec<String>,
    #[serde(default = "default_primary_ext")]
    pub primary_ext: String,
    #[serde(default = "default_pipeline_markers")]
    pub pipeline_markers: Vec<String>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            max_size_kb: default_max_size_kb(),
            important_names: default_important_names(),
            important_ext: default_important_ext(),
            primary_ext: default_primary_ext(),
            pipeline_markers: default_pipeline_markers(),
        }
    }
}

fn default_max_size_kb() -> f64 {
    500.0
}
fn default_important_names() -> Vec<String> {
    ["readme", "setup", "main", "__init__", "app", "model", "config"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_important_ext() -> Vec<String> {
    [".py", ".ipynb", ".md", ".json", ".yaml", ".toml"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_primary_ext() -> String {
    ".py".to_string()
}
fn default_pipeline_markers() -> Vec<String> {
    ["train", "main", "pipeline", "runner", "engine"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContextConfig {
    /// Parsed files placed in the answer prompt.
    #[serde(default = "default_max_parsed_files")]
    pub max_parsed_files: usize,
    /// Selected paths listed in the answer prompt.
    #[serde(default = "default_preview_limit")]
    pub preview_limit: usize,
    #[serde(default = "default_global_sample_files")]
    pub global_sample_files: usize,
    #[serde(default = "default_global_tree_files")]
    pub global_tree_files: usize,
    #[serde(default = "default_snippet_lines")]
    pub snippet_lines: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_parsed_files: default_max_parsed_files(),
            preview_limit: default_preview_limit(),
            global_sample_files: default_global_sample_files(),
            global_tree_files: default_global_tree_files(),
            snippet_lines: default_snippet_lines(),
        }
    }
}

fn default_max_parsed_files() -> usize {
    8
}
fn default_preview_limit() -> usize {
    20
}
fn default_global_sample_files() -> usize {
    5
}
fn default_global_tree_files() -> usize {
    60
}
fn default_snippet_lines() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_turn_deadline_secs")]
    pub turn_deadline_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            timeout_secs: default_fetch_timeout_secs(),
            turn_deadline_secs: default_turn_deadline_secs(),
        }
    }
}

fn default_concurrency() -> usize {
    8
}
fn default_fetch_timeout_secs() -> u64 {
    20
}
fn default_turn_deadline_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Overrides the provider's API endpoint.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            temperature: default_temperature(),
            base_url: None,
            timeout_secs: default_llm_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "gemini".to_string()
}
fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    3
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate selection
    if config.selection.max_size_kb <= 0.0 {
        anyhow::bail!("selection.max_size_kb must be > 0");
    }

    // Validate context
    if config.context.max_parsed_files < 1 {
        anyhow::bail!("context.max_parsed_files must be >= 1");
    }

    // Validate fetch
    if config.fetch.concurrency < 1 {
        anyhow::bail!("fetch.concurrency must be >= 1");
    }
    if config.fetch.timeout_secs == 0 || config.fetch.turn_deadline_secs == 0 {
        anyhow::bail!("fetch.timeout_secs and fetch.turn_deadline_secs must be > 0");
    }

    for pattern in &config.github.exclude_globs {
        Glob::new(pattern)
            .with_context(|| format!("Invalid github.exclude_globs pattern: '{}'", pattern))?;
    }

    // Validate llm
    if !(0.0..=2.0).contains(&config.llm.temperature) {
        anyhow::bail!("llm.temperature must be in [0.0, 2.0]");
    }

    match config.llm.provider.as_str() {
        "disabled" | "gemini" | "openai" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be disabled, gemini, or openai.",
            other
        ),
    }

    if config.llm.is_enabled() && config.llm.model.trim().is_empty() {
        anyhow::bail!(
            "llm.model must be specified when provider is '{}'",
            config.llm.provider
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let file = write_config("");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.selection.max_size_kb, 500.0);
        assert_eq!(config.context.max_parsed_files, 8);
        assert_eq!(config.context.preview_limit, 20);
        assert_eq!(config.github.branch, "main");
        assert_eq!(config.llm.provider, "gemini");
        assert!(config.github.exclude_ext.contains(&".pdf".to_string()));
    }

    #[test]
    fn test_partial_sections_merge_with_defaults() {
        let file = write_config(
            r#"
            [selection]
            max_size_kb = 250

            [llm]
            provider = "disabled"
            "#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.selection.max_size_kb, 250.0);
        assert_eq!(config.selection.primary_ext, ".py");
        assert!(!config.llm.is_enabled());
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let file = write_config("[llm]\nprovider = \"carrier-pigeon\"\n");
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("Unknown llm provider"));
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let file = write_config("[fetch]\nconcurrency = 0\n");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_rejects_bad_glob() {
        let file = write_config("[github]\nexclude_globs = [\"src/[\"]\n");
        let err = load_config(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("exclude_globs"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
