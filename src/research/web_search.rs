// Seed discovery through the DuckDuckGo HTML endpoint (no API key needed)

use reqwest::{Client, Url};
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, info};

use super::ResearchError;
use crate::types::parse_absolute_url;

pub const DEFAULT_SEARCH_URL: &str = "https://html.duckduckgo.com/html/";

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub struct WebSearch {
    http: Client,
    endpoint: String,
}

impl WebSearch {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ResearchError> {
        let http = Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ResearchError::Search(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    /// Up to `limit` result URLs for `query`, in ranking order
    pub async fn search_urls(&self, query: &str, limit: usize) -> Result<Vec<String>, ResearchError> {
        info!(query = %query, limit, "Searching web for seeds");

        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| ResearchError::Search(format!("web search failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResearchError::Search(format!(
                "web search returned HTTP {}",
                status.as_u16()
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| ResearchError::Search(format!("unreadable search page: {}", e)))?;

        let urls = result_links(&html, limit)?;
        debug!(found = urls.len(), "Parsed search results");
        Ok(urls)
    }
}

/// Extract result targets from a DuckDuckGo HTML results page. Redirect
/// links (`/l/?uddg=...`) are unwrapped to the page they point at.
pub fn result_links(html: &str, limit: usize) -> Result<Vec<String>, ResearchError> {
    let selector = Selector::parse("a.result__a")
        .map_err(|e| ResearchError::Search(format!("bad result selector: {:?}", e)))?;
    let document = Html::parse_document(html);

    let mut urls: Vec<String> = Vec::new();
    for href in document
        .select(&selector)
        .filter_map(|link| link.value().attr("href"))
    {
        if urls.len() == limit {
            break;
        }
        if let Some(url) = unwrap_redirect(href) {
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
    }
    Ok(urls)
}

fn unwrap_redirect(href: &str) -> Option<String> {
    let href = href.trim();
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.to_string()
    };

    let url = Url::parse(&absolute).ok()?;
    let target = url
        .query_pairs()
        .find(|(key, _)| key == "uddg")
        .map(|(_, value)| value.into_owned())
        .unwrap_or(absolute);

    parse_absolute_url(&target).map(|u| u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    const RESULTS_PAGE: &str = r#"
        <html><body>
          <div class="result results_links">
            <div class="result__body">
              <h2 class="result__title">
                <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fen.wikipedia.org%2Fwiki%2FDeKalb%2C_Illinois&amp;rut=abc">DeKalb, Illinois</a>
              </h2>
            </div>
          </div>
          <div class="result"><a class="result__a" href="https://www.niu.edu/">NIU</a></div>
          <div class="result"><a class="result__a" href="https://www.niu.edu/">NIU again</a></div>
          <div class="result"><a class="result__a" href="javascript:void(0)">Ad</a></div>
          <div class="result"><a class="result__a" href="https://www.cityofdekalb.com/">City</a></div>
        </body></html>
    "#;

    #[test]
    fn test_result_links_unwraps_and_dedupes() {
        let urls = result_links(RESULTS_PAGE, 5).unwrap();
        assert_eq!(
            urls,
            vec![
                "https://en.wikipedia.org/wiki/DeKalb,_Illinois".to_string(),
                "https://www.niu.edu/".to_string(),
                "https://www.cityofdekalb.com/".to_string(),
            ]
        );
        assert_eq!(result_links(RESULTS_PAGE, 1).unwrap().len(), 1);
        assert!(result_links("<html></html>", 3).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_urls_queries_endpoint() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/html/")
            .match_query(Matcher::UrlEncoded("q".into(), "restaurants in dekalb".into()))
            .with_status(200)
            .with_body(RESULTS_PAGE)
            .expect(1)
            .create_async()
            .await;

        let search = WebSearch::new(format!("{}/html/", server.url()), Duration::from_secs(5)).unwrap();
        let urls = search.search_urls("restaurants in dekalb", 2).await.unwrap();

        assert_eq!(urls.len(), 2);
        assert_eq!(urls[1], "https://www.niu.edu/");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_search_error_status() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/html/")
            .match_query(Matcher::Any)
            .with_status(403)
            .create_async()
            .await;

        let search = WebSearch::new(format!("{}/html/", server.url()), Duration::from_secs(5)).unwrap();
        let err = search.search_urls("anything", 3).await.unwrap_err();
        assert!(matches!(err, ResearchError::Search(ref m) if m.contains("403")));
    }
}
