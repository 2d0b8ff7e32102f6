pub mod cache;
pub mod cli;
pub mod config;
pub mod executor;
pub mod github;
pub mod issue;
pub mod llm;
pub mod pipeline;
pub mod report;
pub mod summarizer;
