//! Research Module
//!
//! Sequential orchestration around the crawl client: pick seeds for a query,
//! crawl them one after another, analyze whatever content came back.
//!
//! Seeds come from the first source that yields anything: a web search, then
//! URLs suggested by the analyst, then a fixed list of well-known pages.
//!
//! Everything the agent uses is handed to it at construction time; there is
//! no shared global crawler.

pub mod analyst;
pub mod web_search;

pub use analyst::{basic_analysis, Analysis, ContentAnalyst, OpenAiAnalyst};
pub use web_search::WebSearch;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::crawler::{derive_candidates, CrawlJobClient};
use crate::types::{parse_absolute_url, CrawlError, CrawlResult};

#[derive(Debug, Error)]
pub enum ResearchError {
    #[error("Crawl failed: {0}")]
    Crawl(#[from] CrawlError),

    #[error("No web content found for: {0}")]
    NoContent(String),

    #[error("Analysis failed: {0}")]
    Analysis(String),

    #[error("Web search failed: {0}")]
    Search(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderStats {
    pub total_sources: usize,
    pub providers_used: Vec<String>,
    pub unique_domains: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResearchReport {
    pub query: String,
    pub analysis: Analysis,
    pub sources: Vec<CrawlResult>,
    pub generated_at: DateTime<Utc>,
    pub stats: ProviderStats,
}

pub struct ResearchAgent {
    client: CrawlJobClient,
    analyst: Option<Arc<dyn ContentAnalyst>>,
    web_search: Option<WebSearch>,
}

impl ResearchAgent {
    pub fn new(client: CrawlJobClient, analyst: Option<Arc<dyn ContentAnalyst>>) -> Self {
        Self {
            client,
            analyst,
            web_search: None,
        }
    }

    pub fn with_web_search(mut self, web_search: WebSearch) -> Self {
        self.web_search = Some(web_search);
        self
    }

    pub fn client(&self) -> &CrawlJobClient {
        &self.client
    }

    /// Crawl up to `depth` seeds for `query`, keeping up to `breadth`
    /// results per seed, then analyze the collected content.
    pub async fn conduct_research(
        &self,
        query: &str,
        depth: usize,
        breadth: usize,
    ) -> Result<ResearchReport, ResearchError> {
        let seeds = self.discover_seeds(query, depth).await;
        self.research_with_seeds(query, &seeds, breadth).await
    }

    /// Seeds for `query`: an absolute URL is its own seed; otherwise web
    /// search, analyst suggestions and the built-in list are tried in turn.
    pub async fn discover_seeds(&self, query: &str, depth: usize) -> Vec<String> {
        let query = query.trim();
        if query.is_empty() || depth == 0 {
            return Vec::new();
        }
        if parse_absolute_url(query).is_some() {
            return vec![query.to_string()];
        }

        if let Some(search) = &self.web_search {
            match search.search_urls(query, depth).await {
                Ok(urls) if !urls.is_empty() => {
                    info!(found = urls.len(), "Using web search seeds");
                    return urls;
                }
                Ok(_) => info!("Web search found nothing, trying fallbacks"),
                Err(e) => warn!(error = %e, "Web search failed, trying fallbacks"),
            }
        }

        if let Some(analyst) = &self.analyst {
            match analyst.suggest_sources(query, depth).await {
                Ok(urls) if !urls.is_empty() => {
                    info!(found = urls.len(), "Using analyst-suggested seeds");
                    return urls.into_iter().take(depth).collect();
                }
                Ok(_) => info!("Analyst suggested no sources"),
                Err(e) => warn!(error = %e, "Source suggestion failed"),
            }
        }

        research_seeds(query, depth)
    }

    /// Crawl `seeds` in order and build the report. A quota error only ends
    /// the run once the credential provider has no usable key left.
    pub async fn research_with_seeds(
        &self,
        query: &str,
        seeds: &[String],
        breadth: usize,
    ) -> Result<ResearchReport, ResearchError> {
        info!(query = %query, seeds = seeds.len(), breadth, "Starting research");

        let mut sources: Vec<CrawlResult> = Vec::new();
        for (i, seed) in seeds.iter().enumerate() {
            info!(step = i + 1, of = seeds.len(), seed = %seed, "Researching seed");
            match self.client.search_and_scrape(seed, breadth).await {
                Ok(results) => {
                    for result in results {
                        if sources.iter().any(|s| s.source_url == result.source_url) {
                            continue;
                        }
                        sources.push(result);
                    }
                }
                Err(e @ CrawlError::QuotaExhausted { .. }) if self.client.has_credential() => {
                    warn!(seed = %seed, error = %e, "Quota hit, continuing with rotated key");
                }
                Err(e @ CrawlError::QuotaExhausted { .. }) | Err(e @ CrawlError::MissingCredential) => {
                    return Err(e.into());
                }
                Err(e) => warn!(seed = %seed, error = %e, "Seed failed, continuing"),
            }
        }

        if sources.is_empty() {
            return Err(ResearchError::NoContent(query.to_string()));
        }

        let analysis = match &self.analyst {
            Some(analyst) => match analyst.analyze(query, &sources).await {
                Ok(analysis) => analysis,
                Err(e) => {
                    warn!(error = %e, "Analyst failed, using basic analysis");
                    basic_analysis(query, &sources)
                }
            },
            None => basic_analysis(query, &sources),
        };

        let stats = provider_stats(&sources);
        info!(
            query = %query,
            sources = stats.total_sources,
            domains = stats.unique_domains,
            "Research completed"
        );

        Ok(ResearchReport {
            query: query.to_string(),
            analysis,
            sources,
            generated_at: Utc::now(),
            stats,
        })
    }
}

fn provider_stats(sources: &[CrawlResult]) -> ProviderStats {
    let providers: BTreeSet<String> = sources.iter().map(|s| s.provider_tag.clone()).collect();
    let domains: BTreeSet<String> = sources.iter().filter_map(CrawlResult::domain).collect();
    ProviderStats {
        total_sources: sources.len(),
        providers_used: providers.into_iter().collect(),
        unique_domains: domains.len(),
    }
}

/// Built-in seeds: the query itself first (a URL is crawled directly, free
/// text expands into candidates), then well-known local and review pages the
/// candidate list does not already cover. At most `depth`.
pub fn research_seeds(query: &str, depth: usize) -> Vec<String> {
    let query = query.trim();
    if query.is_empty() || depth == 0 {
        return Vec::new();
    }

    let mut seeds = vec![query.to_string()];
    if parse_absolute_url(query).is_some() {
        return seeds;
    }

    let covered = derive_candidates(query);
    for url in local_sources(query) {
        if seeds.len() == depth {
            break;
        }
        if !covered.iter().any(|c| c == url) && !seeds.iter().any(|s| s == url) {
            seeds.push(url.to_string());
        }
    }
    seeds.truncate(depth);
    seeds
}

fn local_sources(query: &str) -> Vec<&'static str> {
    let words: Vec<String> = query.split_whitespace().map(|w| w.to_lowercase()).collect();
    let has = |targets: &[&str]| words.iter().any(|w| targets.contains(&w.as_str()));

    let dekalb = has(&["dekalb"]);
    let mut urls = Vec::new();

    if dekalb {
        urls.extend([
            "https://www.cityofdekalb.com",
            "https://www.niu.edu",
            "https://en.wikipedia.org/wiki/DeKalb,_Illinois",
            "https://www.dekalbcounty.org",
        ]);
    }

    if has(&["restaurant", "restaurants", "food", "cafe", "dining"]) {
        if dekalb {
            urls.extend([
                "https://www.niu.edu/dining",
                "https://www.tripadvisor.com/Restaurants-g36890-DeKalb_Illinois.html",
                "https://www.yelp.com/dekalb-il",
            ]);
        } else {
            urls.extend(["https://www.yelp.com", "https://www.tripadvisor.com"]);
        }
    }

    if has(&["chicago"]) {
        urls.extend([
            "https://www.chicago.gov",
            "https://en.wikipedia.org/wiki/Chicago",
            "https://www.choosechicago.com",
        ]);
    }

    urls
}
