//! Crawl Job Client
//!
//! Talks to a job-based crawling service in three steps:
//!
//! 1. **Submit**: `POST /v1/crawl` creates a scrape job and returns its id
//! 2. **Poll**: `GET /v1/job/{id}` every poll interval until the job is
//!    `done`/`failed` or the wall-clock budget runs out
//! 3. **Fetch**: each finished job item points at a content URL, fetched with
//!    a plain unauthenticated GET
//!
//! "No content" is never an error: it comes back as a result with
//! `success = false` or as an empty list. Errors are reserved for transport
//! and authentication problems.

use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use super::candidates::derive_candidates;
use super::wire::{ErrorBody, JobItem, JobSnapshot, RemoteStatus, SubmitRequest, SubmitResponse};
use crate::config::CrawlerConfig;
use crate::credentials::CredentialProvider;
use crate::types::{
    key_hint, parse_absolute_url, truncate_chars, CrawlError, CrawlJob, CrawlOutcome,
    CrawlRequest, CrawlResult, FailureKind, JobHandle, JobStatus, MAX_CONTENT_CHARS,
};

/// Four bytes per character covers any UTF-8 text up to `MAX_CONTENT_CHARS`
const MAX_CONTENT_BYTES: usize = MAX_CONTENT_CHARS * 4;

/// Status polls that fail this way are retried on the next tick
enum PollError {
    Transient(String),
    Fatal(CrawlError),
}

pub struct CrawlJobClient {
    http: Client,
    config: CrawlerConfig,
    credentials: Arc<dyn CredentialProvider>,
}

impl CrawlJobClient {
    /// Fails only when the credential provider has no usable token
    pub fn new(
        config: CrawlerConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> CrawlOutcome<Self> {
        if credentials.bearer_token().is_none() {
            return Err(CrawlError::MissingCredential);
        }

        let http = Client::builder()
            .user_agent(concat!("faceless-crawler/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CrawlError::Transport(format!("failed to build HTTP client: {}", e)))?;

        info!(base_url = %config.base_url, "Crawl job client initialized");
        Ok(Self {
            http,
            config,
            credentials,
        })
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }

    /// Whether the credential provider still has a usable token
    pub fn has_credential(&self) -> bool {
        self.credentials.bearer_token().is_some()
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn token(&self) -> CrawlOutcome<String> {
        self.credentials
            .bearer_token()
            .ok_or(CrawlError::MissingCredential)
    }

    /// Create a crawl job for `request`
    pub async fn submit(&self, request: &CrawlRequest) -> CrawlOutcome<JobHandle> {
        let token = self.token()?;
        let body = SubmitRequest {
            url: request.target_url().as_str(),
            scrape_type: request.scrape_mode(),
            items_limit: request.item_limit(),
        };

        debug!(url = %request.target_url(), "Submitting crawl job");

        let response = self
            .http
            .post(self.endpoint("/v1/crawl"))
            .bearer_auth(&token)
            .timeout(self.config.submit_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| CrawlError::Transport(format!("crawl request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CrawlError::Transport(format!("failed to read crawl response: {}", e)))?;

        if !status.is_success() {
            let error = classify_failure(status, &text, &token);
            warn!(url = %request.target_url(), status = status.as_u16(), error = %error, "Crawl submit rejected");
            return Err(error);
        }

        let submitted: SubmitResponse = serde_json::from_str(&text).map_err(|e| {
            CrawlError::Transport(format!("unreadable crawl response: {}", e))
        })?;

        let job_id = submitted
            .id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                CrawlError::Transport("No job ID returned from crawl request".to_string())
            })?;

        info!(job_id = %job_id, url = %request.target_url(), "Crawl job submitted");
        Ok(CrawlJob::new(job_id, request.target_url().clone()))
    }

    /// Poll `handle` until it finishes or `max_wait` elapses.
    ///
    /// Returns one result per remote job item, or exactly one synthetic
    /// failure result when the job failed, timed out, or produced no items.
    pub async fn await_completion(
        &self,
        handle: JobHandle,
        max_wait: Duration,
    ) -> CrawlOutcome<Vec<CrawlResult>> {
        let mut job = handle;
        let started = Instant::now();
        let source_url = job.target_url.to_string();

        loop {
            let remaining = max_wait.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                break;
            }

            match timeout(remaining, self.poll_status(&job.job_id)).await {
                Ok(Ok(snapshot)) => {
                    job.status = snapshot.status.into();
                    match snapshot.status {
                        RemoteStatus::Done => {
                            info!(
                                job_id = %job.job_id,
                                items = snapshot.job_items.len(),
                                elapsed_ms = started.elapsed().as_millis() as u64,
                                "Crawl job done"
                            );
                            return Ok(self.collect_items(&job, snapshot.job_items).await);
                        }
                        RemoteStatus::Failed => {
                            let message = snapshot
                                .error_message
                                .filter(|m| !m.trim().is_empty())
                                .unwrap_or_else(|| "Job failed".to_string());
                            warn!(job_id = %job.job_id, error = %message, "Crawl job failed remotely");
                            return Ok(vec![CrawlResult::failure(
                                source_url,
                                "Error",
                                FailureKind::RemoteJobFailed,
                                message,
                            )]);
                        }
                        RemoteStatus::Pending
                        | RemoteStatus::Running
                        | RemoteStatus::InProgress
                        | RemoteStatus::Unknown => {
                            debug!(job_id = %job.job_id, status = %job.status, "Job still processing, waiting");
                        }
                    }
                }
                Ok(Err(PollError::Transient(e))) => {
                    warn!(job_id = %job.job_id, error = %e, "Error checking job status");
                }
                Ok(Err(PollError::Fatal(e))) => return Err(e),
                Err(_) => {
                    warn!(job_id = %job.job_id, "Job status request outlived the wait budget");
                }
            }

            let remaining = max_wait.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                break;
            }
            sleep(self.config.poll_interval.min(remaining)).await;
        }

        job.status = JobStatus::Timeout;
        warn!(
            job_id = %job.job_id,
            status = %job.status,
            max_wait_secs = max_wait.as_secs_f64(),
            "Crawl job timed out"
        );
        Ok(vec![CrawlResult::failure(
            source_url,
            "Timeout",
            FailureKind::Timeout,
            format!("Job timeout after {} seconds", max_wait.as_secs()),
        )])
    }

    async fn poll_status(&self, job_id: &str) -> Result<JobSnapshot, PollError> {
        let token = self.token().map_err(PollError::Fatal)?;

        let response = self
            .http
            .get(self.endpoint(&format!("/v1/job/{}", urlencoding::encode(job_id))))
            .bearer_auth(&token)
            .timeout(self.config.status_timeout)
            .send()
            .await
            .map_err(|e| PollError::Transient(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| PollError::Transient(e.to_string()))?;

        if !status.is_success() {
            return Err(PollError::Fatal(classify_failure(status, &text, &token)));
        }

        serde_json::from_str(&text).map_err(|e| {
            PollError::Fatal(CrawlError::Transport(format!("unreadable job status: {}", e)))
        })
    }

    async fn collect_items(&self, job: &CrawlJob, items: Vec<JobItem>) -> Vec<CrawlResult> {
        if items.is_empty() {
            return vec![CrawlResult::failure(
                job.target_url.as_str(),
                "Untitled",
                FailureKind::NoContentUrl,
                "Job finished without items",
            )];
        }

        let mut results = Vec::with_capacity(items.len());
        for item in items {
            let source_url = item
                .original_url
                .clone()
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| job.target_url.to_string());

            let result = match item.content_url() {
                Some(content_url) => {
                    let content = self.fetch_content(content_url).await;
                    CrawlResult::from_content(source_url, item.title(), &content)
                }
                None => CrawlResult::failure(
                    source_url,
                    item.title(),
                    FailureKind::NoContentUrl,
                    "Job item has no content URL",
                ),
            };
            results.push(result);
        }
        results
    }

    /// Unauthenticated GET; any failure degrades to empty content. Reading
    /// stops once enough bytes for `MAX_CONTENT_CHARS` characters arrived.
    async fn fetch_content(&self, url: &str) -> String {
        let mut response = match self
            .http
            .get(url)
            .timeout(self.config.content_timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %url, error = %e, "Content fetch failed");
                return String::new();
            }
        };

        if !response.status().is_success() {
            warn!(url = %url, status = response.status().as_u16(), "Content fetch returned an error status");
            return String::new();
        }

        let mut body: Vec<u8> = Vec::new();
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    body.extend_from_slice(&chunk);
                    if body.len() >= MAX_CONTENT_BYTES {
                        debug!(url = %url, bytes = body.len(), "Content cap reached, not reading further");
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(url = %url, error = %e, "Content body unreadable");
                    return String::new();
                }
            }
        }

        body.truncate(MAX_CONTENT_BYTES);
        String::from_utf8_lossy(&body).into_owned()
    }

    /// Submit `url` and wait for it with the configured budget
    pub async fn crawl_url(&self, url: &str) -> CrawlOutcome<Vec<CrawlResult>> {
        let request = CrawlRequest::new(url, self.config.items_limit)?;
        let handle = self.submit(&request).await?;
        self.await_completion(handle, self.config.max_wait).await
    }

    /// Crawl `query` (an absolute URL, or free text turned into candidate
    /// URLs) and return up to `max_results` successful results.
    pub async fn search_and_scrape(
        &self,
        query: &str,
        max_results: usize,
    ) -> CrawlOutcome<Vec<CrawlResult>> {
        info!(query = %query, max_results, "Searching");

        if max_results == 0 {
            return Ok(Vec::new());
        }

        if let Some(url) = parse_absolute_url(query) {
            let results = match self.crawl_url(url.as_str()).await {
                Ok(results) => results,
                Err(e @ CrawlError::QuotaExhausted { .. }) => {
                    self.rotate_after_quota().await;
                    return Err(e);
                }
                Err(e) => return Err(e),
            };
            return Ok(keep_successful(results, max_results));
        }

        let candidates = derive_candidates(query);
        debug!(count = candidates.len(), "Derived candidate URLs");

        let mut collected = Vec::new();
        for candidate in candidates {
            match self.crawl_url(&candidate).await {
                Ok(results) => {
                    let remaining = max_results - collected.len();
                    collected.extend(keep_successful(results, remaining));
                }
                Err(e @ CrawlError::QuotaExhausted { .. }) => {
                    if self.rotate_after_quota().await {
                        continue;
                    }
                    return Err(e);
                }
                Err(e) => {
                    warn!(url = %candidate, error = %e, "Failed to crawl candidate");
                    continue;
                }
            }

            if collected.len() >= max_results {
                break;
            }
        }

        info!(query = %query, results = collected.len(), "Search finished");
        Ok(collected)
    }

    /// Signal the exhausted key to the credential provider
    async fn rotate_after_quota(&self) -> bool {
        let Some(token) = self.credentials.bearer_token() else {
            return false;
        };
        info!(key = %key_hint(&token), "Attempting API key rotation");
        self.credentials.rotate(&token).await
    }
}

fn keep_successful(results: Vec<CrawlResult>, limit: usize) -> Vec<CrawlResult> {
    results
        .into_iter()
        .filter(|r| {
            if !r.success {
                debug!(url = %r.source_url, error = ?r.error_message, "Dropping unsuccessful result");
            }
            r.success
        })
        .take(limit)
        .collect()
}

/// Map a non-2xx response to the error taxonomy. Only the documented
/// `error_message` field is read from the body; anything else is opaque.
fn classify_failure(status: StatusCode, body: &str, token: &str) -> CrawlError {
    let snippet = truncate_chars(body.trim(), 200);

    if status == StatusCode::PAYMENT_REQUIRED {
        CrawlError::QuotaExhausted {
            key_hint: key_hint(token),
        }
    } else if status.is_client_error() {
        let message = serde_json::from_str::<ErrorBody>(body)
            .map(|b| b.error_message)
            .unwrap_or_else(|_| format!("HTTP {}: {}", status.as_u16(), snippet));
        CrawlError::InvalidRequest(message)
    } else {
        CrawlError::Transport(format!("HTTP {}: {}", status.as_u16(), snippet))
    }
}
