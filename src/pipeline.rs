use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::cache::{CacheTier, SqliteTier};
use crate::executor::RateLimitedExecutor;
use crate::issue::Issue;
use crate::summarizer::{FallbackReason, Summarizer, SummaryResult};

/// An issue paired with its summary.
#[derive(Debug, Clone)]
pub struct AnnotatedIssue {
    pub issue: Issue,
    pub summary: SummaryResult,
}

/// Batch driver: serves cache hits directly and fans the misses out through
/// the rate-limited executor.
pub struct Pipeline<D = SqliteTier> {
    summarizer: Arc<Summarizer<D>>,
    executor: RateLimitedExecutor,
}

impl<D: CacheTier + 'static> Pipeline<D> {
    pub fn new(summarizer: Arc<Summarizer<D>>, concurrency: usize) -> Self {
        Self {
            summarizer,
            executor: RateLimitedExecutor::new(concurrency),
        }
    }

    /// Cancelling this token aborts the batch: unstarted summaries are
    /// replaced by fallbacks, running LLM calls finish.
    pub fn cancel_token(&self) -> CancellationToken {
        self.executor.cancel_token()
    }

    /// Summarize `issues`. The output has one entry per input, in input order.
    pub async fn process(&self, issues: Vec<Issue>) -> Vec<AnnotatedIssue> {
        let mut results: Vec<Option<SummaryResult>> = vec![None; issues.len()];
        let mut pending = Vec::new();

        for (idx, issue) in issues.iter().enumerate() {
            if let Some(hit) = self.summarizer.cached(issue).await {
                tracing::debug!("Issue #{}: cache hit", issue.number);
                results[idx] = Some(hit);
                continue;
            }
            let summarizer = Arc::clone(&self.summarizer);
            let issue = issue.clone();
            let handle = self
                .executor
                .submit(async move { summarizer.summarize(&issue).await });
            pending.push((idx, handle));
        }

        let hits = issues.len() - pending.len();
        tracing::info!(
            "Summarizing {} issue(s): {hits} cached, {} queued (concurrency {})",
            issues.len(),
            pending.len(),
            self.executor.limit()
        );

        let (indices, handles): (Vec<_>, Vec<_>) = pending.into_iter().unzip();
        let outcomes = RateLimitedExecutor::await_all(handles).await;
        for (idx, outcome) in indices.into_iter().zip(outcomes) {
            let summary = match outcome {
                Ok(summary) => summary,
                Err(e) => {
                    tracing::warn!("Issue #{}: {e}, using fallback summary", issues[idx].number);
                    self.summarizer
                        .fallback(&issues[idx], FallbackReason::NotRun(e.to_string()))
                }
            };
            results[idx] = Some(summary);
        }

        issues
            .into_iter()
            .zip(results)
            .map(|(issue, summary)| {
                let summary = summary.unwrap_or_else(|| {
                    self.summarizer.fallback(
                        &issue,
                        FallbackReason::NotRun("no result recorded".into()),
                    )
                });
                AnnotatedIssue { issue, summary }
            })
            .collect()
    }
}
