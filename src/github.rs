use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::config::{ConfigError, FilterConfig, GithubConfig, GITHUB_PER_PAGE};
use crate::issue::{should_include, Issue, IssueType, Priority};

/// Below this many remaining requests the fetcher waits for the reset.
const RATE_LIMIT_FLOOR: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum GithubError {
    #[error("GitHub rate limit exceeded, resets at {reset_at}")]
    RateLimit { reset_at: i64 },
    #[error("repository {0} not found")]
    RepoNotFound(String),
    #[error("GitHub token invalid or lacks permission: {0}")]
    Token(String),
    #[error("GitHub request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("GitHub API error ({status}): {body}")]
    Api { status: u16, body: String },
}

#[derive(Deserialize)]
struct RawIssue {
    number: u64,
    title: String,
    body: Option<String>,
    #[serde(default)]
    labels: Vec<RawLabel>,
    #[serde(default)]
    assignees: Vec<RawUser>,
    state: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    html_url: String,
    pull_request: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct RawLabel {
    name: String,
}

#[derive(Deserialize)]
struct RawUser {
    login: String,
}

impl RawIssue {
    fn into_issue(self) -> Issue {
        let mut labels: Vec<String> = Vec::with_capacity(self.labels.len());
        for label in self.labels {
            if !labels.contains(&label.name) {
                labels.push(label.name);
            }
        }

        Issue {
            number: self.number,
            title: self.title,
            body: self.body.unwrap_or_default(),
            labels,
            assignees: self.assignees.into_iter().map(|a| a.login).collect(),
            state: self.state,
            created_at: self.created_at,
            updated_at: self.updated_at,
            html_url: self.html_url,
            issue_type: IssueType::Other,
            priority: Priority::P2,
        }
    }
}

pub struct GithubClient {
    client: Client,
    api_base: String,
    token: Option<String>,
    max_items: usize,
}

impl GithubClient {
    pub fn new(config: &GithubConfig, token: Option<String>) -> Result<Self, GithubError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
            max_items: config.max_items,
        })
    }

    /// Fetch open issues of `repo` (`owner/name`), classified and filtered,
    /// newest update first. Pull requests are skipped.
    pub async fn fetch_issues(
        &self,
        repo: &str,
        filter: &FilterConfig,
    ) -> Result<Vec<Issue>, GithubError> {
        let url = format!("{}/repos/{repo}/issues", self.api_base);
        let mut issues = Vec::new();
        let mut page = 1usize;

        // Whole pages are kept, so the result may overshoot `max_items` by
        // less than one page.
        while issues.len() < self.max_items {
            let mut request = self
                .client
                .get(&url)
                .header(ACCEPT, "application/vnd.github+json")
                .header(USER_AGENT, concat!("issue-digest/", env!("CARGO_PKG_VERSION")))
                .query(&[
                    ("state", "open"),
                    ("sort", "updated"),
                    ("direction", "desc"),
                ])
                .query(&[("per_page", GITHUB_PER_PAGE), ("page", page)]);
            if let Some(ref token) = self.token {
                request = request.header(AUTHORIZATION, format!("Bearer {token}"));
            }

            let resp = request.send().await?;
            let status = resp.status();
            let headers = resp.headers().clone();

            match status {
                StatusCode::NOT_FOUND => return Err(GithubError::RepoNotFound(repo.to_string())),
                StatusCode::UNPROCESSABLE_ENTITY => {
                    tracing::info!("No more issues (422), stopping");
                    break;
                }
                StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
                    let body = resp.text().await.unwrap_or_default();
                    return Err(classify_forbidden(&headers, body));
                }
                StatusCode::UNAUTHORIZED => {
                    let body = resp.text().await.unwrap_or_default();
                    return Err(GithubError::Token(body));
                }
                s if !s.is_success() => {
                    let body = resp.text().await.unwrap_or_default();
                    return Err(GithubError::Api {
                        status: s.as_u16(),
                        body,
                    });
                }
                _ => {}
            }

            let batch: Vec<RawIssue> = resp.json().await?;
            if batch.is_empty() {
                break;
            }

            issues.extend(
                batch
                    .into_iter()
                    .filter(|raw| raw.pull_request.is_none())
                    .map(|raw| raw.into_issue().classify())
                    .filter(|issue| should_include(issue, filter)),
            );
            tracing::debug!("Fetched page {page}, {} issue(s) kept so far", issues.len());

            if let Some(wait) = rate_limit_wait(&headers, Utc::now().timestamp()) {
                tracing::warn!("GitHub rate limit low, sleeping {}s", wait.as_secs());
                tokio::time::sleep(wait).await;
            }
            page += 1;
        }

        tracing::info!("Fetched {} issue(s) after filtering", issues.len());
        Ok(issues)
    }
}

fn header_num(headers: &HeaderMap, name: &str) -> Option<i64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

fn classify_forbidden(headers: &HeaderMap, body: String) -> GithubError {
    match (
        header_num(headers, "x-ratelimit-remaining"),
        header_num(headers, "x-ratelimit-reset"),
    ) {
        (Some(0), reset) => GithubError::RateLimit {
            reset_at: reset.unwrap_or_default(),
        },
        _ => GithubError::Token(body),
    }
}

/// How long to wait before the next page, if the remaining quota is low.
fn rate_limit_wait(headers: &HeaderMap, now: i64) -> Option<Duration> {
    let remaining = header_num(headers, "x-ratelimit-remaining")?;
    let reset = header_num(headers, "x-ratelimit-reset")?;
    if remaining >= RATE_LIMIT_FLOOR as i64 || reset <= 0 {
        return None;
    }
    let secs = (reset - now).max(0) as u64 + 1;
    Some(Duration::from_secs(secs))
}

/// Reject repository targets not shaped `owner/repo`.
pub fn validate_repo(repo: &str) -> Result<(), ConfigError> {
    if is_valid_repo(repo) {
        Ok(())
    } else {
        Err(ConfigError::InvalidRepo(repo.to_string()))
    }
}

fn is_valid_repo(repo: &str) -> bool {
    let mut parts = repo.split('/');
    let valid_part = |p: &str| {
        !p.is_empty()
            && p
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    };
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(owner), Some(name), None) if valid_part(owner) && valid_part(name)
    )
}
