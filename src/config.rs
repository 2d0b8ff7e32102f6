use serde::Deserialize;
use std::path::PathBuf;

// --- Hardcoded internal constants ---

/// Maximum body characters fed into a summary prompt.
pub const PROMPT_BODY_CHARS: usize = 1_500;
/// Number of issues printed in the terminal preview.
pub const PREVIEW_ROWS: usize = 20;
/// Issues requested per GitHub page.
pub const GITHUB_PER_PAGE: usize = 100;

pub const DEFAULT_PROMPT_TEMPLATE: &str = "Summarize the core of the GitHub issue below in one sentence \
(at most 30 words). Reply with the summary only.\n\
Title: {title}\n\
Labels: {labels}\n\
Body:\n\
{body}\n";

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub llm: LlmConfig,
    pub github: GithubConfig,
    pub filter: FilterConfig,
    pub report: ReportConfig,
    /// Log level used when neither `-v` nor `RUST_LOG` is given.
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Location of the SQLite file backing the durable tier.
    pub db_path: PathBuf,
    /// Item cap of the in-memory tier (LRU beyond this).
    pub max_memory_items: u64,
    /// Durable entries older than this many seconds are removed by cleanup.
    pub cleanup_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub enabled: bool,
    pub api_key_env: String,
    /// OpenAI-compatible API base. `/v1` is appended when missing.
    pub base_url: String,
    pub model: String,
    pub timeout_ms: u64,
    /// Maximum simultaneous LLM calls across a batch.
    pub concurrency: usize,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Retries for transient transport errors before falling back.
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// Placeholders: `{title}`, `{body}`, `{labels}`.
    pub prompt_template: String,
    pub max_prompt_chars: usize,
    pub max_summary_chars: usize,
    pub fallback_max_chars: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    pub api_base: String,
    pub max_items: usize,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Issues mentioning any of these in title or body are treated as done.
    pub done_keywords: Vec<String>,
    /// Issues carrying any of these labels are dropped.
    pub noise_labels: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub output_dir: PathBuf,
    /// Only the first N issues are summarized and rendered in the table.
    pub max_rows: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid repository {0:?}, expected owner/repo")]
    InvalidRepo(String),
    #[error("--concurrency must be at least 1")]
    ZeroConcurrency,
}

// --- Defaults ---

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(".cache/cache.db"),
            max_memory_items: 1_000,
            cleanup_interval_secs: 3_600,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key_env: "OPENAI_API_KEY".into(),
            base_url: "https://api.deepseek.com/v1".into(),
            model: "deepseek-chat".into(),
            timeout_ms: 20_000,
            concurrency: 10,
            max_tokens: 60,
            temperature: 0.3,
            max_retries: 2,
            retry_backoff_ms: 500,
            prompt_template: DEFAULT_PROMPT_TEMPLATE.into(),
            max_prompt_chars: 2_000,
            max_summary_chars: 200,
            fallback_max_chars: 60,
        }
    }
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".into(),
            max_items: 10_000,
            timeout_ms: 30_000,
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            done_keywords: ["done", "fixed", "resolved", "closed", "completed", "已解决"]
                .into_iter()
                .map(String::from)
                .collect(),
            noise_labels: [
                "wontfix",
                "invalid",
                "duplicate",
                "help wanted",
                "good first issue",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            max_rows: 100,
        }
    }
}

// --- Methods ---

impl Config {
    /// Load the config file (if any), then apply environment overrides.
    pub fn load() -> Self {
        let mut config = Self::load_file();
        config.apply_env(|name| std::env::var(name).ok());
        config
    }

    fn config_path() -> PathBuf {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(|d| PathBuf::from(d).join("issue-digest").join("config.toml"))
            .or_else(|| dirs::config_dir().map(|d| d.join("issue-digest").join("config.toml")))
            .unwrap_or_else(|| PathBuf::from("~/.config/issue-digest/config.toml"))
    }

    fn load_file() -> Self {
        let config_path = Self::config_path();

        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(contents) => match toml::from_str(&contents) {
                    Ok(config) => return config,
                    Err(e) => {
                        eprintln!(
                            "[issue-digest] Failed to parse {}: {e}",
                            config_path.display()
                        );
                    }
                },
                Err(e) => {
                    eprintln!(
                        "[issue-digest] Failed to read {}: {e}",
                        config_path.display()
                    );
                }
            }
        }

        Config::default()
    }

    /// Apply the recognized environment overrides. Unparsable numbers are ignored.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(path) = var("CACHE_DB_PATH").filter(|v| !v.is_empty()) {
            self.cache.db_path = PathBuf::from(path);
        }
        if let Some(n) = var("CACHE_MAX_MEMORY_ITEMS").and_then(|v| v.trim().parse().ok()) {
            self.cache.max_memory_items = n;
        }
        if let Some(n) = var("CACHE_CLEANUP_INTERVAL").and_then(|v| v.trim().parse().ok()) {
            self.cache.cleanup_interval_secs = n;
        }
        if let Some(n) = var("LLM_CONCURRENCY").and_then(|v| v.trim().parse().ok()) {
            self.llm.concurrency = n;
        }
        if let Some(url) = var("OPENAI_BASE_URL").filter(|v| !v.is_empty()) {
            self.llm.base_url = url;
        }
        if let Some(model) = var("MODEL_NAME").filter(|v| !v.is_empty()) {
            self.llm.model = model;
        }
        if let Some(list) = var("DONE_KEYWORDS") {
            self.filter.done_keywords = split_list(&list);
        }
        if let Some(list) = var("NOISE_LABELS") {
            self.filter.noise_labels = split_list(&list);
        }
        if let Some(level) = var("LOG_LEVEL").filter(|v| !v.is_empty()) {
            self.log_level = Some(level);
        }
    }
}

/// Split a comma-separated list, accepting the full-width comma too.
fn split_list(raw: &str) -> Vec<String> {
    raw.split([',', '，'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.cache.max_memory_items, 1_000);
        assert_eq!(config.cache.cleanup_interval_secs, 3_600);
        assert_eq!(config.llm.concurrency, 10);
        assert_eq!(config.report.max_rows, 100);
        assert!(config.llm.prompt_template.contains("{title}"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("CACHE_DB_PATH", "/tmp/x.db"),
            ("CACHE_MAX_MEMORY_ITEMS", "5"),
            ("CACHE_CLEANUP_INTERVAL", "60"),
            ("LLM_CONCURRENCY", "2"),
            ("MODEL_NAME", "gpt-4o-mini"),
            ("NOISE_LABELS", "spam， stale"),
        ]));
        assert_eq!(config.cache.db_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.cache.max_memory_items, 5);
        assert_eq!(config.cache.cleanup_interval_secs, 60);
        assert_eq!(config.llm.concurrency, 2);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.filter.noise_labels, vec!["spam", "stale"]);
    }

    #[test]
    fn test_env_bad_number_ignored() {
        let mut config = Config::default();
        config.apply_env(env(&[("CACHE_MAX_MEMORY_ITEMS", "lots")]));
        assert_eq!(config.cache.max_memory_items, 1_000);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [llm]
            model = "local-model"
            concurrency = 3

            [cache]
            max_memory_items = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.llm.model, "local-model");
        assert_eq!(config.llm.concurrency, 3);
        assert_eq!(config.llm.timeout_ms, 20_000);
        assert_eq!(config.cache.max_memory_items, 10);
        assert_eq!(config.cache.cleanup_interval_secs, 3_600);
    }
}
