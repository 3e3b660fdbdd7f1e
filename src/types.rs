// Type definitions shared by the crawler and research layers

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tag stamped on every result produced by the job-based crawl backend
pub const PROVIDER_TAG: &str = "webcrawlerapi";

/// Content is cut to this many characters before it leaves the client
pub const MAX_CONTENT_CHARS: usize = 3000;

/// Anything shorter than this (after trimming) is not worth handing to a caller
pub const MIN_USEFUL_CONTENT_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeMode {
    Markdown,
}

impl std::fmt::Display for ScrapeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScrapeMode::Markdown => write!(f, "markdown"),
        }
    }
}

/// A single request to scrape one absolute URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlRequest {
    target_url: Url,
    scrape_mode: ScrapeMode,
    item_limit: u32,
}

impl CrawlRequest {
    /// Build a markdown crawl request, validating the URL and the item limit
    pub fn new(target_url: &str, item_limit: u32) -> Result<Self, CrawlError> {
        let target_url = parse_absolute_url(target_url).ok_or_else(|| {
            CrawlError::InvalidRequest(format!("not an absolute http(s) URL: {}", target_url))
        })?;

        if item_limit == 0 {
            return Err(CrawlError::InvalidRequest(
                "item limit must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            target_url,
            scrape_mode: ScrapeMode::Markdown,
            item_limit,
        })
    }

    pub fn target_url(&self) -> &Url {
        &self.target_url
    }

    pub fn scrape_mode(&self) -> ScrapeMode {
        self.scrape_mode
    }

    pub fn item_limit(&self) -> u32 {
        self.item_limit
    }
}

/// Parse `input` as an absolute http/https URL with a host
pub fn parse_absolute_url(input: &str) -> Option<Url> {
    Url::parse(input.trim())
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
}

/// Lifecycle of a remote crawl job as seen by one poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
    /// Client-side: the wall-clock budget ran out before a terminal status
    Timeout,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed | JobStatus::Timeout)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Done => write!(f, "done"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Timeout => write!(f, "timeout"),
        }
    }
}

/// Handle returned by a successful submit, consumed by the poll loop
#[derive(Debug, Clone)]
pub struct CrawlJob {
    pub job_id: String,
    pub target_url: Url,
    pub submitted_at: DateTime<Utc>,
    pub status: JobStatus,
}

pub type JobHandle = CrawlJob;

impl CrawlJob {
    pub fn new(job_id: impl Into<String>, target_url: Url) -> Self {
        Self {
            job_id: job_id.into(),
            target_url,
            submitted_at: Utc::now(),
            status: JobStatus::Pending,
        }
    }
}

/// Why a result carries no usable content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The service reported the job as failed
    RemoteJobFailed,
    /// No terminal status within the wall-clock budget
    Timeout,
    /// The job item listed no content URL (or the job had no items)
    NoContentUrl,
    /// The content URL could not be fetched or returned nothing
    ContentUnavailable,
    /// Content was fetched but is below the usefulness threshold
    ContentTooShort,
}

impl FailureKind {
    /// Whether trying the same URL again later could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::Timeout | FailureKind::ContentUnavailable)
    }
}

/// Normalized outcome of crawling one remote job item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlResult {
    pub source_url: String,
    pub title: String,
    pub content: String,
    pub success: bool,
    pub provider_tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl CrawlResult {
    /// Build a result from fetched content, applying truncation and the
    /// usefulness threshold. Empty content is reported as unavailable.
    pub fn from_content(
        source_url: impl Into<String>,
        title: impl Into<String>,
        content: &str,
    ) -> Self {
        let content = truncate_chars(content, MAX_CONTENT_CHARS);
        let useful_len = content.trim().chars().count();

        let failure = if useful_len == 0 {
            Some((FailureKind::ContentUnavailable, "No content retrieved".to_string()))
        } else if useful_len < MIN_USEFUL_CONTENT_CHARS {
            Some((
                FailureKind::ContentTooShort,
                format!(
                    "Content too short ({} chars, need {})",
                    useful_len, MIN_USEFUL_CONTENT_CHARS
                ),
            ))
        } else {
            None
        };

        let (failure, error_message) = match failure {
            Some((kind, message)) => (Some(kind), Some(message)),
            None => (None, None),
        };

        Self {
            source_url: source_url.into(),
            title: title.into(),
            success: failure.is_none(),
            content,
            provider_tag: PROVIDER_TAG.to_string(),
            error_message,
            failure,
        }
    }

    /// Build a synthetic failure result with no content
    pub fn failure(
        source_url: impl Into<String>,
        title: impl Into<String>,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            title: title.into(),
            content: String::new(),
            success: false,
            provider_tag: PROVIDER_TAG.to_string(),
            error_message: Some(message.into()),
            failure: Some(kind),
        }
    }

    /// Host part of the source URL, used for per-domain statistics
    pub fn domain(&self) -> Option<String> {
        Url::parse(&self.source_url)
            .ok()
            .and_then(|url| url.host_str().map(String::from))
    }
}

/// Cut `text` to at most `max` characters without splitting a code point
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

/// Errors surfaced by the crawl job client
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error("Payment required: crawl quota exhausted for key {key_hint}")]
    QuotaExhausted { key_hint: String },

    #[error("Invalid crawl request: {0}")]
    InvalidRequest(String),

    #[error("Crawl transport error: {0}")]
    Transport(String),

    #[error("No crawler API key configured")]
    MissingCredential,
}

impl CrawlError {
    /// Quota errors are retryable with another key, transport errors with time
    pub fn is_retryable(&self) -> bool {
        matches!(self, CrawlError::QuotaExhausted { .. } | CrawlError::Transport(_))
    }
}

pub type CrawlOutcome<T> = std::result::Result<T, CrawlError>;

/// Mask a secret down to its last four characters for logs and reports
pub fn key_hint(key: &str) -> String {
    let count = key.chars().count();
    if count > 4 {
        let tail: String = key.chars().skip(count - 4).collect();
        format!("••••{}", tail)
    } else {
        "••••".to_string()
    }
}

/// Convenience for config values expressed in whole seconds
pub fn secs(value: u64) -> Duration {
    Duration::from_secs(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crawl_request_validation() {
        let request = CrawlRequest::new("https://example.com/x", 1).unwrap();
        assert_eq!(request.target_url().as_str(), "https://example.com/x");
        assert_eq!(request.scrape_mode(), ScrapeMode::Markdown);
        assert_eq!(request.item_limit(), 1);

        assert!(matches!(
            CrawlRequest::new("example.com/x", 1),
            Err(CrawlError::InvalidRequest(_))
        ));
        assert!(matches!(
            CrawlRequest::new("ftp://example.com/file", 1),
            Err(CrawlError::InvalidRequest(_))
        ));
        assert!(matches!(
            CrawlRequest::new("https://example.com", 0),
            Err(CrawlError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_parse_absolute_url() {
        assert!(parse_absolute_url("https://example.com/x").is_some());
        assert!(parse_absolute_url("  http://example.com  ").is_some());
        assert!(parse_absolute_url("restaurant in dekalb").is_none());
        assert!(parse_absolute_url("mailto:someone@example.com").is_none());
    }

    #[test]
    fn test_result_success_requires_useful_content() {
        let long = "hello world ".repeat(10);
        let ok = CrawlResult::from_content("https://example.com", "Example", &long);
        assert!(ok.success);
        assert_eq!(ok.failure, None);
        assert_eq!(ok.provider_tag, PROVIDER_TAG);

        let short = CrawlResult::from_content("https://example.com", "Example", "tiny page");
        assert!(!short.success);
        assert_eq!(short.failure, Some(FailureKind::ContentTooShort));

        let padded = format!("{}{}", " ".repeat(100), "x".repeat(10));
        let padded = CrawlResult::from_content("https://example.com", "Example", &padded);
        assert!(!padded.success);

        let empty = CrawlResult::from_content("https://example.com", "Example", "");
        assert_eq!(empty.failure, Some(FailureKind::ContentUnavailable));
    }

    #[test]
    fn test_result_content_is_truncated() {
        let huge = "é".repeat(MAX_CONTENT_CHARS + 500);
        let result = CrawlResult::from_content("https://example.com", "Example", &huge);
        assert!(result.success);
        assert_eq!(result.content.chars().count(), MAX_CONTENT_CHARS);
    }

    #[test]
    fn test_key_hint_masks_secret() {
        assert_eq!(key_hint("abcdef123456"), "••••3456");
        assert_eq!(key_hint("abc"), "••••");
    }

    #[test]
    fn test_domain_extraction() {
        let result = CrawlResult::failure(
            "https://en.wikipedia.org/wiki/Chicago",
            "Error",
            FailureKind::RemoteJobFailed,
            "boom",
        );
        assert_eq!(result.domain().as_deref(), Some("en.wikipedia.org"));
        assert!(!result.success);
        assert!(result.content.is_empty());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(CrawlError::QuotaExhausted { key_hint: "••••0001".to_string() }.is_retryable());
        assert!(CrawlError::Transport("reset".to_string()).is_retryable());
        assert!(!CrawlError::InvalidRequest("bad".to_string()).is_retryable());
        assert!(FailureKind::Timeout.is_retryable());
        assert!(!FailureKind::RemoteJobFailed.is_retryable());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Done.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Timeout.is_terminal());
    }
}
