use crate::config::PROMPT_BODY_CHARS;
use crate::issue::Issue;

/// Render the summary prompt for `issue`, keeping the whole prompt within
/// `max_prompt_chars` by shortening the body first.
pub fn build_summary_prompt(template: &str, issue: &Issue, max_prompt_chars: usize) -> String {
    let title = issue.title.trim();
    let labels = if issue.labels.is_empty() {
        "none".to_string()
    } else {
        issue.labels.join(", ")
    };

    let fixed_len = render(template, title, &labels, "").chars().count();
    let body_budget = max_prompt_chars
        .saturating_sub(fixed_len)
        .min(PROMPT_BODY_CHARS);
    let body = truncate_chars(issue.body.trim(), body_budget);

    let prompt = render(template, title, &labels, body);
    truncate_chars(&prompt, max_prompt_chars).to_string()
}

/// Literal fragments of the template that a well-behaved reply never
/// contains: the text before each placeholder and the placeholder-free lines.
pub fn template_markers(template: &str) -> Vec<String> {
    let mut markers: Vec<String> = template
        .lines()
        .map(|line| match line.find('{') {
            Some(pos) => line[..pos].trim(),
            None => line.trim(),
        })
        .filter(|fragment| fragment.chars().count() >= 4)
        .map(String::from)
        .collect();
    markers.extend(["{title}", "{body}", "{labels}"].map(String::from));
    markers.dedup();
    markers
}

/// Single-pass placeholder substitution, so text inside an issue that looks
/// like a placeholder is never expanded.
fn render(template: &str, title: &str, labels: &str, body: &str) -> String {
    let mut out = String::with_capacity(template.len() + title.len() + body.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start..];
        let (value, consumed) = if after.starts_with("{title}") {
            (Some(title), "{title}".len())
        } else if after.starts_with("{body}") {
            (Some(body), "{body}".len())
        } else if after.starts_with("{labels}") {
            (Some(labels), "{labels}".len())
        } else {
            (None, 1)
        };
        match value {
            Some(v) => out.push_str(v),
            None => out.push('{'),
        }
        rest = &after[consumed..];
    }
    out.push_str(rest);
    out
}

pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
