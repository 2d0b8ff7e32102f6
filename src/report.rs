//! Markdown digest and output files.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::PREVIEW_ROWS;
use crate::issue::{Issue, IssueType, Priority};
use crate::llm::truncate_chars;
use crate::pipeline::AnnotatedIssue;

const TABLE_HEADER: &str = "| #Issue | Type | Priority | Title | Summary | Labels | Created | Link |\n\
| --- | --- | --- | --- | --- | --- | --- | --- |";
const PREVIEW_TITLE_CHARS: usize = 30;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to write report: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize issues: {0}")]
    Json(#[from] serde_json::Error),
}

/// Files written by [`save_outputs`].
#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub summary: PathBuf,
    pub issues: PathBuf,
}

/// One-sentence overview of the filtered issue set.
pub fn overview(repo: &str, issues: &[Issue]) -> String {
    let total = issues.len();
    let bugs = issues
        .iter()
        .filter(|i| i.issue_type == IssueType::Bug)
        .count();
    let features = issues
        .iter()
        .filter(|i| i.issue_type == IssueType::FeatureRequest)
        .count();

    let avg = if total == 0 {
        Priority::P2
    } else {
        let sum: u32 = issues.iter().map(|i| i.priority.score()).sum();
        Priority::from_score((sum as f64 / total as f64).round() as u32)
    };

    let latest = issues
        .iter()
        .map(|i| i.updated_at)
        .max()
        .map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "N/A".to_string());

    format!(
        "{repo} has **{total}** open issue(s) ({bugs} bug(s) / {features} feature request(s)), \
         average priority {avg}, last updated {latest}."
    )
}

/// Markdown table with one row per annotated issue.
pub fn render_table(rows: &[AnnotatedIssue]) -> String {
    let mut out = String::from(TABLE_HEADER);
    for AnnotatedIssue { issue, summary } in rows {
        let labels = issue
            .labels
            .iter()
            .take(3)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&format!(
            "\n| {} | {} | {} | {} | {} | {} | {} | [link]({}) |",
            issue.number,
            issue.issue_type,
            issue.priority,
            escape_cell(&issue.title),
            escape_cell(&summary.summary_text),
            escape_cell(&labels),
            issue.created_at.date_naive(),
            issue.html_url,
        ));
    }
    out
}

pub fn render_markdown(repo: &str, overview: &str, table: &str) -> String {
    format!("# {repo} issue digest\n\n{overview}\n\n{table}\n")
}

/// Write `summary.md` and `filtered_issues.json` under `dir`.
pub fn save_outputs(dir: &Path, markdown: &str, issues: &[Issue]) -> Result<ReportPaths, ReportError> {
    std::fs::create_dir_all(dir)?;

    let summary = dir.join("summary.md");
    std::fs::write(&summary, markdown)?;

    let issues_path = dir.join("filtered_issues.json");
    std::fs::write(&issues_path, serde_json::to_string_pretty(issues)?)?;

    tracing::info!("Report written to {}", dir.display());
    Ok(ReportPaths {
        summary,
        issues: issues_path,
    })
}

/// Compact terminal preview of the first issues.
pub fn write_preview(out: &mut impl Write, repo: &str, issues: &[Issue]) -> std::io::Result<()> {
    let shown = issues.len().min(PREVIEW_ROWS);
    writeln!(out, "{repo} (first {shown} of {})", issues.len())?;
    writeln!(out, "{:>7}  {:<15}  {:<8}  Title", "#Issue", "Type", "Priority")?;
    for issue in &issues[..shown] {
        let title = issue.title.split_whitespace().collect::<Vec<_>>().join(" ");
        writeln!(
            out,
            "{:>7}  {:<15}  {:<8}  {}",
            issue.number,
            issue.issue_type.as_str(),
            issue.priority.to_string(),
            truncate_chars(&title, PREVIEW_TITLE_CHARS)
        )?;
    }
    Ok(())
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
        .replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
}
