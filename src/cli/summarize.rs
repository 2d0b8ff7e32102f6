use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use tokio_util::sync::CancellationToken;

use crate::cache::CacheStore;
use crate::config::{Config, ConfigError};
use crate::github::{validate_repo, GithubClient};
use crate::llm::{CompletionClient, LlmClient};
use crate::pipeline::Pipeline;
use crate::report;
use crate::summarizer::Summarizer;

#[derive(Args)]
pub(crate) struct SummarizeArgs {
    /// Repository in owner/repo form
    pub repo: String,

    /// GitHub token (falls back to the GH_TOKEN env var)
    #[arg(long)]
    pub token: Option<String>,

    /// Output directory (default: output/)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Maximum simultaneous LLM calls
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Skip the LLM and use local fallback summaries
    #[arg(long)]
    pub no_llm: bool,
}

pub(crate) async fn summarize(args: SummarizeArgs, mut config: Config) -> anyhow::Result<()> {
    validate_repo(&args.repo)?;
    if let Some(n) = args.concurrency {
        if n == 0 {
            return Err(ConfigError::ZeroConcurrency.into());
        }
        config.llm.concurrency = n;
    }
    if args.no_llm {
        config.llm.enabled = false;
    }
    let output_dir = args
        .output_dir
        .unwrap_or_else(|| config.report.output_dir.clone());
    let token = args
        .token
        .or_else(|| std::env::var("GH_TOKEN").ok());

    let cache = CacheStore::open(&config.cache);
    let shutdown = CancellationToken::new();
    let cleanup = cache.spawn_cleanup(shutdown.clone());

    let github = GithubClient::new(&config.github, token)?;
    let issues = github.fetch_issues(&args.repo, &config.filter).await?;

    let client = LlmClient::from_config(&config.llm)
        .map(|c| Arc::new(c) as Arc<dyn CompletionClient>);
    let summarizer = Arc::new(Summarizer::new(client, cache, config.llm.clone()));
    let pipeline = Pipeline::new(summarizer, config.llm.concurrency);

    let cancel = pipeline.cancel_token();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing in-flight summaries");
            cancel.cancel();
        }
    });

    let head = issues
        .iter()
        .take(config.report.max_rows)
        .cloned()
        .collect();
    let annotated = pipeline.process(head).await;
    ctrl_c.abort();

    let fallbacks = annotated.iter().filter(|a| a.summary.is_fallback()).count();
    let cached = annotated.iter().filter(|a| a.summary.from_cache).count();
    tracing::info!(
        "Summaries: {} total, {cached} from cache, {fallbacks} fallback",
        annotated.len()
    );

    let overview = report::overview(&args.repo, &issues);
    let table = report::render_table(&annotated);
    let markdown = report::render_markdown(&args.repo, &overview, &table);
    let paths = report::save_outputs(&output_dir, &markdown, &issues)?;

    report::write_preview(&mut std::io::stdout().lock(), &args.repo, &issues)?;
    println!(
        "Done: {} and {} written",
        paths.summary.display(),
        paths.issues.display()
    );

    shutdown.cancel();
    let _ = cleanup.await;
    Ok(())
}
