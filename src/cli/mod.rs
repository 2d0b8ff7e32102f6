use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

mod cache;
mod summarize;

#[derive(Parser)]
#[command(
    name = "issue-digest",
    version,
    about = "Summarize the open issues of a GitHub repository"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log to file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, filter and summarize the open issues of a repository
    Summarize(summarize::SummarizeArgs),
    /// Inspect or maintain the summary cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Clone, Copy)]
pub(crate) enum CacheAction {
    /// Remove every cached summary
    Clear,
    /// Remove durable entries older than the cleanup interval
    Cleanup,
    /// Show entry counts for both tiers
    Stats,
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load();

    init_tracing(cli.verbose, cli.log_file, config.log_level.as_deref())?;

    match cli.command {
        Commands::Summarize(args) => summarize::summarize(args, config).await?,
        Commands::Cache { action } => cache::run(action, &config).await?,
    }

    Ok(())
}

fn init_tracing(
    verbose: u8,
    log_file: Option<PathBuf>,
    config_level: Option<&str>,
) -> anyhow::Result<()> {
    let level = match verbose {
        0 => config_level.unwrap_or("warn"),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if let Some(log_path) = log_file {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(file)
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    Ok(())
}
