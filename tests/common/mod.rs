#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use issue_digest::cache::{CacheStore, SqliteTier};
use issue_digest::config::{CacheConfig, LlmConfig};
use issue_digest::issue::{Issue, IssueType, Priority};
use issue_digest::llm::{CompletionClient, LlmError};
use issue_digest::summarizer::Summarizer;

pub fn make_issue(number: u64, title: &str, body: &str) -> Issue {
    let ts = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
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

/// Replies "Summary of <title>." after a short delay. Titles listed in
/// `hang_on` never get a reply.
#[derive(Default)]
pub struct MockClient {
    pub calls: AtomicUsize,
    current: AtomicUsize,
    pub peak: AtomicUsize,
    hang_on: HashSet<String>,
}

impl MockClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn hanging_on(titles: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            hang_on: titles.iter().map(|t| t.to_string()).collect(),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionClient for MockClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let title = prompt
            .lines()
            .find_map(|l| l.strip_prefix("Title: "))
            .unwrap_or("?")
            .to_string();

        if self.hang_on.contains(&title) {
            std::future::pending::<()>().await;
        }

        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);

        Ok(format!("Summary of {title}."))
    }
}

pub fn llm_config() -> LlmConfig {
    LlmConfig {
        timeout_ms: 150,
        max_retries: 0,
        retry_backoff_ms: 1,
        ..LlmConfig::default()
    }
}

pub fn cache_config(dir: &std::path::Path) -> CacheConfig {
    CacheConfig {
        db_path: dir.join("cache.db"),
        ..CacheConfig::default()
    }
}

pub fn summarizer(client: Arc<MockClient>, cache: CacheStore<SqliteTier>) -> Arc<Summarizer> {
    Arc::new(Summarizer::new(Some(client), cache, llm_config()))
}

/// Collects formatted tracing output for assertions.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Route this thread's tracing events (debug and up) into the buffer
    /// until the guard is dropped.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// A canned HTTP response served by [`HttpStub`].
pub struct StubResponse {
    status: u16,
    headers: Vec<(&'static str, String)>,
    body: String,
}

impl StubResponse {
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: vec![],
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    fn render(&self) -> String {
        let mut head = format!(
            "HTTP/1.1 {} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n",
            self.status,
            self.body.len()
        );
        for (name, value) in &self.headers {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
        format!("{head}\r\n{}", self.body)
    }
}

/// Minimal HTTP/1.1 server on 127.0.0.1 answering one request per
/// connection with the scripted responses, in order. Once the script runs
/// out every request gets a 500.
pub struct HttpStub {
    pub base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl HttpStub {
    pub async fn start(responses: Vec<StubResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);

        tokio::spawn(async move {
            let mut responses = responses.into_iter();
            while let Ok((mut stream, _)) = listener.accept().await {
                let request = read_request(&mut stream).await;
                log.lock().unwrap().push(request);
                let response = responses
                    .next()
                    .unwrap_or_else(|| StubResponse::json(500, r#"{"error":"script exhausted"}"#));
                let _ = stream.write_all(response.render().as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            requests,
        }
    }

    /// Raw requests received so far (request line, headers and body).
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn hits(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

async fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let body_len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + body_len {
                break;
            }
        }
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
