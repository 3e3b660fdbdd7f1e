use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::research::web_search::DEFAULT_SEARCH_URL;
use crate::types::secs;

pub const DEFAULT_CRAWLER_BASE_URL: &str = "https://api.webcrawlerapi.com";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub credentials: CredentialsConfig,
    pub llm: LLMConfig,
    pub search: SearchConfig,
}

/// Endpoint and timing knobs for the crawl job client
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    pub base_url: String,
    pub poll_interval: Duration,
    pub max_wait: Duration,
    pub submit_timeout: Duration,
    pub status_timeout: Duration,
    pub content_timeout: Duration,
    pub items_limit: u32,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CRAWLER_BASE_URL.to_string(),
            poll_interval: secs(2),
            max_wait: secs(60),
            submit_timeout: secs(30),
            status_timeout: secs(10),
            content_timeout: secs(10),
            items_limit: 1,
        }
    }
}

impl CrawlerConfig {
    /// Same timings, different endpoint (handy for local mocks)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Poll interval, wait budget and items limit must all be non-zero
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            anyhow::bail!("CRAWL_POLL_INTERVAL_SECS must be at least 1");
        }
        if self.max_wait.is_zero() {
            anyhow::bail!("CRAWL_MAX_WAIT_SECS must be at least 1");
        }
        if self.items_limit == 0 {
            anyhow::bail!("CRAWL_ITEMS_LIMIT must be at least 1");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsConfig {
    pub crawler_api_key: String,
    pub crawler_backup_keys: Vec<String>,
    /// Directory for the encrypted key ring; rotation is in-memory only when unset
    pub keyring_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LLMConfig {
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub model: String,
}

/// Web search used to discover research seeds
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    pub enabled: bool,
    pub url: String,
    pub timeout: Duration,
}

impl LLMConfig {
    pub fn is_configured(&self) -> bool {
        !self.openai_api_key.trim().is_empty()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let crawler_api_key = env::var("WEBCRAWLER_API_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .context("WEBCRAWLER_API_KEY must be set")?;

        let crawler = CrawlerConfig {
            base_url: env::var("WEBCRAWLER_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_CRAWLER_BASE_URL.to_string()),
            poll_interval: secs(env_number("CRAWL_POLL_INTERVAL_SECS", 2)?),
            max_wait: secs(env_number("CRAWL_MAX_WAIT_SECS", 60)?),
            submit_timeout: secs(env_number("CRAWL_SUBMIT_TIMEOUT_SECS", 30)?),
            status_timeout: secs(env_number("CRAWL_STATUS_TIMEOUT_SECS", 10)?),
            content_timeout: secs(env_number("CRAWL_CONTENT_TIMEOUT_SECS", 10)?),
            items_limit: items_limit(env_number("CRAWL_ITEMS_LIMIT", 1)?)?,
        };
        crawler.validate().context("Invalid crawler configuration")?;

        Ok(Self {
            crawler,
            credentials: CredentialsConfig {
                crawler_api_key,
                crawler_backup_keys: split_list(
                    &env::var("WEBCRAWLER_BACKUP_KEYS").unwrap_or_default(),
                ),
                keyring_dir: env::var("KEYRING_DIR").ok().map(PathBuf::from),
            },
            llm: LLMConfig {
                openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
                openai_base_url: env::var("OPENAI_BASE_URL")
                    .unwrap_or_else(|_| DEFAULT_OPENAI_BASE_URL.to_string()),
                model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4".to_string()),
            },
            search: SearchConfig {
                enabled: env::var("WEB_SEARCH_ENABLED")
                    .map(|v| !matches!(v.trim().to_lowercase().as_str(), "0" | "false" | "no"))
                    .unwrap_or(true),
                url: env::var("WEB_SEARCH_URL")
                    .unwrap_or_else(|_| DEFAULT_SEARCH_URL.to_string()),
                timeout: secs(env_number("WEB_SEARCH_TIMEOUT_SECS", 15)?),
            },
        })
    }
}

fn env_number(name: &str, default: u64) -> Result<u64> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a whole number, got {:?}", name, raw)),
        Err(_) => Ok(default),
    }
}

fn items_limit(raw: u64) -> Result<u32> {
    u32::try_from(raw).with_context(|| format!("CRAWL_ITEMS_LIMIT is out of range: {}", raw))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
