/// Why an LLM reply was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QualityIssue {
    #[error("empty summary")]
    Empty,
    #[error("summary too long ({chars} > {max} chars)")]
    TooLong { chars: usize, max: usize },
    #[error("summary echoes the prompt template ({0:?})")]
    TemplateEcho(String),
}

/// Reduce a raw reply to a single clean sentence: first content line, list
/// markers, quotes and a leading `Summary:` label removed, whitespace collapsed.
pub fn normalize_summary(raw: &str) -> String {
    let line = raw
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with("```"))
        .unwrap_or("");

    let line = strip_list_marker(line);
    let line = strip_label(line);
    let line = line.trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '“' | '”' | '「' | '」'));

    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Check a normalized summary against the quality rules.
pub fn validate_summary(
    summary: &str,
    markers: &[String],
    max_chars: usize,
) -> Result<(), QualityIssue> {
    if summary.trim().is_empty() {
        return Err(QualityIssue::Empty);
    }

    let chars = summary.chars().count();
    if chars > max_chars {
        return Err(QualityIssue::TooLong {
            chars,
            max: max_chars,
        });
    }

    if let Some(marker) = markers.iter().find(|m| summary.contains(m.as_str())) {
        return Err(QualityIssue::TemplateEcho(marker.clone()));
    }

    Ok(())
}

fn strip_list_marker(line: &str) -> &str {
    let line = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .unwrap_or(line)
        .trim();
    strip_numeric_prefix(line).trim()
}

fn strip_numeric_prefix(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut i = 0;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }

    if i > 0 && i + 1 < bytes.len() && bytes[i] == b'.' && bytes[i + 1] == b' ' {
        &line[i + 2..]
    } else {
        line
    }
}

fn strip_label(line: &str) -> &str {
    for label in ["summary:", "summary：", "摘要：", "摘要:"] {
        if line.len() >= label.len()
            && line.is_char_boundary(label.len())
            && line[..label.len()].eq_ignore_ascii_case(label)
        {
            return line[label.len()..].trim();
        }
    }
    line
}
