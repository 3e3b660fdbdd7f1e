// Faceless Crawler - job-based web crawl client and research pipeline

pub mod config;
pub mod types;
pub mod credentials; // API key ring with rotation on quota exhaustion
pub mod crawler;     // Submit/poll/fetch client for the crawl service
pub mod research;

// Re-exports for convenience
pub use config::Config;
pub use crawler::CrawlJobClient;
pub use types::{CrawlError, CrawlRequest, CrawlResult, FailureKind, JobStatus};
