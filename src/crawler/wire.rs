// Request/response bodies of the job-based crawl service

use serde::{Deserialize, Serialize};

use crate::types::{JobStatus, ScrapeMode};

#[derive(Debug, Serialize)]
pub(crate) struct SubmitRequest<'a> {
    pub url: &'a str,
    pub scrape_type: ScrapeMode,
    pub items_limit: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitResponse {
    #[serde(default)]
    pub id: Option<String>,
}

/// Status strings the service is known to send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum RemoteStatus {
    Pending,
    Running,
    InProgress,
    Done,
    Failed,
    #[serde(other)]
    Unknown,
}

impl From<RemoteStatus> for JobStatus {
    fn from(status: RemoteStatus) -> Self {
        match status {
            RemoteStatus::Pending | RemoteStatus::Unknown => JobStatus::Pending,
            RemoteStatus::Running | RemoteStatus::InProgress => JobStatus::Running,
            RemoteStatus::Done => JobStatus::Done,
            RemoteStatus::Failed => JobStatus::Failed,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct JobSnapshot {
    pub status: RemoteStatus,
    #[serde(default)]
    pub job_items: Vec<JobItem>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct JobItem {
    #[serde(default, alias = "page_title")]
    pub title: Option<String>,
    #[serde(default)]
    pub original_url: Option<String>,
    #[serde(default)]
    pub clean_content_url: Option<String>,
    #[serde(default)]
    pub raw_content_url: Option<String>,
    #[serde(default)]
    pub markdown_content_url: Option<String>,
}

impl JobItem {
    /// clean → raw → markdown, first non-empty wins
    pub fn content_url(&self) -> Option<&str> {
        [
            &self.clean_content_url,
            &self.raw_content_url,
            &self.markdown_content_url,
        ]
        .into_iter()
        .filter_map(|url| url.as_deref())
        .map(str::trim)
        .find(|url| !url.is_empty())
    }

    pub fn title(&self) -> &str {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or("Untitled")
    }
}

/// Error body some 4xx responses carry
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub error_message: String,
}
