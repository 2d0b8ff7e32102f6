mod client;
mod prompt;
mod response;

pub use client::{complete_with_retry, CompletionClient, LlmClient, LlmError, RetryPolicy};
pub use prompt::{build_summary_prompt, template_markers};
pub(crate) use prompt::truncate_chars;
pub use response::{normalize_summary, validate_summary, QualityIssue};
