//! One-sentence issue summaries with a deterministic local fallback.

use std::sync::Arc;

use crate::cache::{CacheKey, CacheStore, CacheTier, Origin, SqliteTier};
use crate::config::LlmConfig;
use crate::issue::Issue;
use crate::llm::{
    build_summary_prompt, complete_with_retry, normalize_summary, template_markers,
    validate_summary, CompletionClient, QualityIssue, RetryPolicy,
};

/// Why a summary came from the fallback path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FallbackReason {
    #[error("no LLM credential configured")]
    NoCredential,
    #[error("LLM call failed: {0}")]
    Transport(String),
    #[error("LLM output rejected: {0}")]
    Quality(#[from] QualityIssue),
    #[error("summarization task did not complete: {0}")]
    NotRun(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummarySource {
    Llm,
    Fallback(FallbackReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryResult {
    pub issue_id: u64,
    pub summary_text: String,
    pub source: SummarySource,
    /// True only for LLM output that passed validation.
    pub quality_ok: bool,
    /// Served from either cache tier rather than a fresh LLM call.
    pub from_cache: bool,
}

impl SummaryResult {
    fn llm(issue_id: u64, summary_text: String, from_cache: bool) -> Self {
        Self {
            issue_id,
            summary_text,
            source: SummarySource::Llm,
            quality_ok: true,
            from_cache,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.source, SummarySource::Fallback(_))
    }
}

pub struct Summarizer<D = SqliteTier> {
    client: Option<Arc<dyn CompletionClient>>,
    cache: CacheStore<D>,
    config: LlmConfig,
    markers: Vec<String>,
}

impl<D: CacheTier + 'static> Summarizer<D> {
    /// `client: None` puts the summarizer in fallback-only mode; cached LLM
    /// summaries from earlier runs are still served.
    pub fn new(
        client: Option<Arc<dyn CompletionClient>>,
        cache: CacheStore<D>,
        config: LlmConfig,
    ) -> Self {
        let markers = template_markers(&config.prompt_template);
        Self {
            client,
            cache,
            config,
            markers,
        }
    }

    pub fn cache(&self) -> &CacheStore<D> {
        &self.cache
    }

    pub fn cache_key(&self, issue: &Issue) -> CacheKey {
        CacheKey::for_summary(issue, &self.config.model, &self.config.prompt_template)
    }

    /// Cached summary for `issue`, if either tier has one.
    pub async fn cached(&self, issue: &Issue) -> Option<SummaryResult> {
        let value = self.cache.get(&self.cache_key(issue)).await?;
        Some(SummaryResult::llm(issue.number, value, true))
    }

    /// Summarize one issue. Never fails: any LLM or quality problem yields
    /// the fallback summary instead.
    pub async fn summarize(&self, issue: &Issue) -> SummaryResult {
        let key = self.cache_key(issue);

        let Some(client) = self.client.as_deref() else {
            if let Some(value) = self.cache.get(&key).await {
                return SummaryResult::llm(issue.number, value, true);
            }
            return self.fallback(issue, FallbackReason::NoCredential);
        };

        match self
            .cache
            .get_or_try_insert_with(&key, self.request_summary(client, issue))
            .await
        {
            Ok(fetched) => {
                let from_cache = fetched.origin != Origin::Computed;
                SummaryResult::llm(issue.number, fetched.value, from_cache)
            }
            Err(reason) => {
                tracing::warn!("Issue #{}: {reason}, using fallback summary", issue.number);
                self.fallback(issue, (*reason).clone())
            }
        }
    }

    /// Build the fallback result for `issue`.
    pub fn fallback(&self, issue: &Issue, reason: FallbackReason) -> SummaryResult {
        SummaryResult {
            issue_id: issue.number,
            summary_text: fallback_summary(issue, self.config.fallback_max_chars),
            source: SummarySource::Fallback(reason),
            quality_ok: false,
            from_cache: false,
        }
    }

    async fn request_summary(
        &self,
        client: &dyn CompletionClient,
        issue: &Issue,
    ) -> Result<String, FallbackReason> {
        let prompt = build_summary_prompt(
            &self.config.prompt_template,
            issue,
            self.config.max_prompt_chars,
        );
        let policy = RetryPolicy::from_config(&self.config);

        let raw = complete_with_retry(client, &prompt, policy)
            .await
            .map_err(|e| FallbackReason::Transport(e.to_string()))?;

        let summary = normalize_summary(&raw);
        validate_summary(&summary, &self.markers, self.config.max_summary_chars)?;
        tracing::debug!("Issue #{}: LLM summary accepted", issue.number);
        Ok(summary)
    }
}

/// Deterministic local summary: the title plus the first sentence of the
/// body, shortened on a word boundary to `max_chars`.
pub fn fallback_summary(issue: &Issue, max_chars: usize) -> String {
    let title = collapse_whitespace(&issue.title);
    let text = match first_sentence(&issue.body) {
        Some(sentence) if !title.is_empty() => format!("{title}: {sentence}"),
        Some(sentence) => sentence,
        None => title,
    };
    shorten(&text, max_chars)
}

fn first_sentence(body: &str) -> Option<String> {
    let line = body
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with("```"))?;

    let end = line
        .char_indices()
        .find(|(_, c)| matches!(c, '.' | '!' | '?' | '。' | '！' | '？'))
        .map(|(idx, c)| idx + c.len_utf8())
        .unwrap_or(line.len());

    let sentence = collapse_whitespace(&line[..end]);
    (!sentence.is_empty()).then_some(sentence)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Drop whole words from the end until `text` plus an ellipsis fits in
/// `max_chars`. A single word that is too long is hard-cut.
fn shorten(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let budget = max_chars.saturating_sub(1);

    let mut out = String::new();
    for word in text.split(' ') {
        let extra = if out.is_empty() { 0 } else { 1 };
        if out.chars().count() + extra + word.chars().count() > budget {
            break;
        }
        if extra == 1 {
            out.push(' ');
        }
        out.push_str(word);
    }

    if out.is_empty() {
        out = text.chars().take(budget).collect();
    }
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::issue::make_issue;
    use crate::llm::LlmError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FixedReply {
        reply: String,
        calls: AtomicUsize,
    }

    impl FixedReply {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.into(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl CompletionClient for FixedReply {
        async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(self.reply.clone())
        }
    }

    fn llm_config() -> LlmConfig {
        LlmConfig {
            timeout_ms: 200,
            max_retries: 0,
            retry_backoff_ms: 1,
            ..LlmConfig::default()
        }
    }

    fn summarizer(client: Option<Arc<dyn CompletionClient>>) -> Summarizer {
        let cache = CacheStore::with_durable(SqliteTier::in_memory().unwrap(), &CacheConfig::default());
        Summarizer::new(client, cache, llm_config())
    }

    #[test]
    fn test_fallback_title_and_first_sentence() {
        let issue = make_issue(1, "Crash on start", "It segfaults. Then it reboots.");
        assert_eq!(fallback_summary(&issue, 60), "Crash on start: It segfaults.");
    }

    #[test]
    fn test_fallback_skips_headings() {
        let issue = make_issue(1, "Crash", "## Steps\n\nRun   it twice! Then wait.");
        assert_eq!(fallback_summary(&issue, 60), "Crash: Run it twice!");
    }

    #[test]
    fn test_fallback_empty_body() {
        let issue = make_issue(1, "Crash on start", "");
        assert_eq!(fallback_summary(&issue, 60), "Crash on start");
    }

    #[test]
    fn test_fallback_shortens_on_word_boundary() {
        let issue = make_issue(
            1,
            "Rendering glitch",
            "The sidebar flickers whenever the window is resized quickly on Wayland sessions.",
        );
        let summary = fallback_summary(&issue, 40);
        assert!(summary.chars().count() <= 40);
        assert!(summary.ends_with('…'));
        assert_eq!(summary, "Rendering glitch: The sidebar flickers…");
    }

    #[test]
    fn test_fallback_hard_cuts_single_long_word() {
        let issue = make_issue(1, &"x".repeat(100), "");
        let summary = fallback_summary(&issue, 10);
        assert_eq!(summary.chars().count(), 10);
        assert!(summary.ends_with('…'));
    }

    #[test]
    fn test_fallback_is_deterministic() {
        let issue = make_issue(7, "Slow startup", "Takes 10s to boot. Used to be 1s.");
        let runs: Vec<_> = (0..5).map(|_| fallback_summary(&issue, 60)).collect();
        assert!(runs.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn test_llm_summary_accepted() {
        let client = FixedReply::new("Summary: The parser crashes on empty input.");
        let summarizer = summarizer(Some(client.clone()));
        let issue = make_issue(1, "Parser crash", "Empty input crashes it.");

        let result = summarizer.summarize(&issue).await;
        assert_eq!(result.source, SummarySource::Llm);
        assert_eq!(result.summary_text, "The parser crashes on empty input.");
        assert!(result.quality_ok);
        assert!(!result.from_cache);
    }

    #[tokio::test]
    async fn test_second_call_hits_cache() {
        let client = FixedReply::new("The parser crashes on empty input.");
        let summarizer = summarizer(Some(client.clone()));
        let issue = make_issue(1, "Parser crash", "Empty input crashes it.");

        let first = summarizer.summarize(&issue).await;
        let second = summarizer.summarize(&issue).await;

        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.summary_text, second.summary_text);
        assert!(second.from_cache);
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_share_one_call() {
        let client = FixedReply::new("The parser crashes on empty input.");
        let summarizer = Arc::new(summarizer(Some(client.clone())));
        let issue = make_issue(1, "Parser crash", "Empty input crashes it.");

        let tasks: Vec<_> = (0..5)
            .map(|_| {
                let summarizer = Arc::clone(&summarizer);
                let issue = issue.clone();
                tokio::spawn(async move { summarizer.summarize(&issue).await })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap().source, SummarySource::Llm);
        }
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_template_echo_falls_back_and_is_not_cached() {
        let client = FixedReply::new("Title: Parser crash");
        let summarizer = summarizer(Some(client.clone()));
        let issue = make_issue(1, "Parser crash", "Empty input crashes it.");

        let result = summarizer.summarize(&issue).await;
        assert!(matches!(
            result.source,
            SummarySource::Fallback(FallbackReason::Quality(QualityIssue::TemplateEcho(_)))
        ));
        assert!(!result.quality_ok);
        assert_eq!(result.summary_text, "Parser crash: Empty input crashes it.");
        assert!(summarizer.cached(&issue).await.is_none());
    }

    #[tokio::test]
    async fn test_no_credential_uses_fallback() {
        let summarizer = summarizer(None);
        let issue = make_issue(1, "Parser crash", "Empty input crashes it.");

        let result = summarizer.summarize(&issue).await;
        assert_eq!(
            result.source,
            SummarySource::Fallback(FallbackReason::NoCredential)
        );
    }

    #[tokio::test]
    async fn test_no_credential_still_serves_cache() {
        let summarizer = summarizer(None);
        let issue = make_issue(1, "Parser crash", "Empty input crashes it.");
        summarizer
            .cache()
            .put(&summarizer.cache_key(&issue), "Cached summary.".into())
            .await;

        let result = summarizer.summarize(&issue).await;
        assert_eq!(result.source, SummarySource::Llm);
        assert_eq!(result.summary_text, "Cached summary.");
        assert!(result.from_cache);
    }
}
