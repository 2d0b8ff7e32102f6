use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::FilterConfig;

/// An open GitHub issue, immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub assignees: Vec<String>,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub html_url: String,
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub priority: Priority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum IssueType {
    Bug,
    Enhancement,
    #[serde(rename = "Feature Request")]
    FeatureRequest,
    Documentation,
    Performance,
    Security,
    Question,
    #[default]
    Other,
}

impl IssueType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bug => "Bug",
            Self::Enhancement => "Enhancement",
            Self::FeatureRequest => "Feature Request",
            Self::Documentation => "Documentation",
            Self::Performance => "Performance",
            Self::Security => "Security",
            Self::Question => "Question",
            Self::Other => "Other",
        }
    }
}

impl std::fmt::Display for IssueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub enum Priority {
    P0,
    P1,
    #[default]
    P2,
}

impl Priority {
    /// Numeric score used for averaging (P0 = 0).
    pub fn score(self) -> u32 {
        match self {
            Self::P0 => 0,
            Self::P1 => 1,
            Self::P2 => 2,
        }
    }

    pub fn from_score(score: u32) -> Self {
        match score {
            0 => Self::P0,
            1 => Self::P1,
            _ => Self::P2,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::P0 => f.write_str("P0"),
            Self::P1 => f.write_str("P1"),
            Self::P2 => f.write_str("P2"),
        }
    }
}

static TYPE_RULES: LazyLock<Vec<(IssueType, Regex)>> = LazyLock::new(|| {
    [
        (IssueType::Bug, r"(?i)\b(bug|fix)\b"),
        (IssueType::Enhancement, r"(?i)\b(enhancement|improve)\b"),
        (IssueType::FeatureRequest, r"(?i)\b(feat|feature)\b"),
        (IssueType::Documentation, r"(?i)\bdocs?\b"),
        (IssueType::Performance, r"(?i)\b(perf|performance)\b"),
        (IssueType::Security, r"(?i)\bsecurity\b"),
        (IssueType::Question, r"(?i)\b(question|how to)\b"),
    ]
    .into_iter()
    .map(|(kind, pattern)| (kind, Regex::new(pattern).unwrap()))
    .collect()
});

static PRIORITY_RULES: LazyLock<Vec<(Priority, &'static [&'static str], Regex)>> =
    LazyLock::new(|| {
        [
            (Priority::P0, &["priority/critical", "critical"][..]),
            (Priority::P1, &["priority/major", "major"][..]),
            (Priority::P2, &["priority/minor", "minor"][..]),
        ]
        .into_iter()
        .map(|(priority, words)| {
            let alternation = words
                .iter()
                .map(|w| regex::escape(w))
                .collect::<Vec<_>>()
                .join("|");
            let re = Regex::new(&format!(r"(?i)\b({alternation})\b")).unwrap();
            (priority, words, re)
        })
        .collect()
    });

impl Issue {
    /// Title and body joined, the text classification and filtering look at.
    pub fn text(&self) -> String {
        format!("{} {}", self.title, self.body)
    }

    /// Infer type and priority from title, body and labels.
    pub fn classify(mut self) -> Self {
        let text = self.text();

        self.issue_type = TYPE_RULES
            .iter()
            .find(|(_, re)| re.is_match(&text))
            .map(|(kind, _)| *kind)
            .unwrap_or(IssueType::Other);

        self.priority = PRIORITY_RULES
            .iter()
            .find(|(_, words, re)| {
                re.is_match(&text)
                    || words
                        .iter()
                        .any(|w| self.labels.iter().any(|l| l.as_str() == *w))
            })
            .map(|(priority, _, _)| *priority)
            .unwrap_or_default();

        self
    }
}

/// Whether an issue belongs in the digest: open, unassigned, not already
/// done, and free of noise labels.
pub fn should_include(issue: &Issue, filter: &FilterConfig) -> bool {
    if issue.state != "open" {
        return false;
    }
    if !issue.assignees.is_empty() {
        return false;
    }

    let content = issue.text().to_lowercase();
    if filter
        .done_keywords
        .iter()
        .any(|kw| content.contains(&kw.to_lowercase()))
    {
        return false;
    }

    !issue.labels.iter().any(|label| {
        filter
            .noise_labels
            .iter()
            .any(|noise| noise.eq_ignore_ascii_case(label))
    })
}

#[cfg(test)]
pub(crate) fn make_issue(number: u64, title: &str, body: &str) -> Issue {
    let ts = DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc);
    Issue {
        number,
        title: title.into(),
        body: body.into(),
        labels: vec![],
        assignees: vec![],
        state: "open".into(),
        created_at: ts,
        updated_at: ts,
        html_url: format!("https://github.com/owner/repo/issues/{number}"),
        issue_type: IssueType::Other,
        priority: Priority::P2,
    }
}
