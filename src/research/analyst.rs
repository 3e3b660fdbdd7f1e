// Content analysis for research reports
// OpenAI-compatible chat completions when a key is configured, a
// deterministic summary otherwise.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use super::ResearchError;
use crate::config::LLMConfig;
use crate::types::{parse_absolute_url, truncate_chars, CrawlResult};

/// Combined source text sent to the model is capped at this many characters
pub const MAX_ANALYSIS_INPUT_CHARS: usize = 8000;

const SOURCES_PROMPT: &str = "You are a web research assistant. Generate URLs for publicly available information sources: Wikipedia articles, government websites (.gov domains), educational institutions (.edu domains), news and media sites, business directories and official websites. Only suggest URLs for publicly available information. Return URLs only, one per line.";

const SYSTEM_PROMPT: &str = "You are a professional research analyst. Analyze the provided web content and create a comprehensive report. Focus on key facts and findings, historical information, current status, and specific details relevant to the query. Be factual and cite specific information from the sources.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub executive_summary: String,
    #[serde(default)]
    pub key_findings: Vec<String>,
    #[serde(default)]
    pub specific_details: String,
    #[serde(default)]
    pub sources_summary: String,
}

#[async_trait]
pub trait ContentAnalyst: Send + Sync {
    async fn analyze(&self, query: &str, sources: &[CrawlResult]) -> Result<Analysis, ResearchError>;

    /// Public pages worth crawling for `query`, used when web search finds nothing
    async fn suggest_sources(&self, _query: &str, _count: usize) -> Result<Vec<String>, ResearchError> {
        Ok(Vec::new())
    }
}

/// Analyst backed by an OpenAI-compatible `/chat/completions` endpoint
pub struct OpenAiAnalyst {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatErrorResponse {
    error: ChatError,
}

#[derive(Deserialize)]
struct ChatError {
    message: String,
}

impl OpenAiAnalyst {
    pub fn new(api_key: &str, base_url: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    /// `None` when no API key is configured
    pub fn from_config(config: &LLMConfig) -> Option<Self> {
        if !config.is_configured() {
            return None;
        }
        Some(Self::new(
            &config.openai_api_key,
            &config.openai_base_url,
            &config.model,
        ))
    }

    fn user_prompt(query: &str, sources: &[CrawlResult]) -> String {
        format!(
            "Research Query: {}\n\n\
             Analyze this web content and provide a comprehensive analysis:\n\n\
             {}\n\n\
             Provide:\n\
             1. Executive Summary (2-3 paragraphs)\n\
             2. Key Findings (bullet points)\n\
             3. Specific Details (relevant facts from sources)\n\
             4. Sources Summary (what sources were most valuable)\n\n\
             Format as JSON with keys: executive_summary, key_findings, specific_details, sources_summary",
            query,
            combined_source_text(sources)
        )
    }

    async fn complete(&self, system: &str, user: &str, max_tokens: u32) -> Result<String, ResearchError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            max_tokens,
            temperature: 0.3,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ResearchError::Analysis(format!("analysis request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ChatErrorResponse>(&error_text)
                .map(|e| e.error.message)
                .unwrap_or(error_text);
            return Err(ResearchError::Analysis(format!(
                "analysis API error ({}): {}",
                status, message
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| ResearchError::Analysis(format!("failed to parse analysis response: {}", e)))?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ResearchError::Analysis("analysis returned no content".to_string()))
    }
}

#[async_trait]
impl ContentAnalyst for OpenAiAnalyst {
    async fn analyze(&self, query: &str, sources: &[CrawlResult]) -> Result<Analysis, ResearchError> {
        let prompt = Self::user_prompt(query, sources);
        info!(model = %self.model, sources = sources.len(), "Requesting content analysis");

        let content = self.complete(SYSTEM_PROMPT, &prompt, 1500).await?;
        debug!(len = content.len(), "Received analysis");
        Ok(parse_analysis(&content, sources.len()))
    }

    async fn suggest_sources(&self, query: &str, count: usize) -> Result<Vec<String>, ResearchError> {
        let cleaned = match query.replace("deep research", "").trim() {
            "" => query.trim().to_string(),
            trimmed => trimmed.to_string(),
        };
        let prompt = format!(
            "Find {} public information sources about: \"{}\"\n\n\
             Generate real URLs for Wikipedia articles if they exist, government or \
             educational websites, news articles or press releases, business directories \
             or professional sites, and public records or official sources.\n\n\
             Return only valid URLs, one per line.",
            count, cleaned
        );

        info!(model = %self.model, query = %cleaned, count, "Requesting source suggestions");
        let text = self.complete(SOURCES_PROMPT, &prompt, 300).await?;
        Ok(parse_suggested_urls(&text, count))
    }
}

/// One URL per line; a refusal yields nothing
pub fn parse_suggested_urls(text: &str, count: usize) -> Vec<String> {
    let lowered = text.to_lowercase();
    if ["sorry", "can't assist", "cannot"].iter().any(|p| lowered.contains(p)) {
        warn!("Model declined to suggest sources");
        return Vec::new();
    }

    let mut urls: Vec<String> = Vec::new();
    for line in text.lines() {
        let candidate = line
            .trim()
            .trim_start_matches(|c: char| c.is_ascii_digit() || matches!(c, '.' | '-' | '*' | ' '));
        if let Some(url) = parse_absolute_url(candidate) {
            let url = url.to_string();
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
    }
    urls.truncate(count);
    urls
}

/// `Source/URL/Content` blocks joined by blank lines, capped for the prompt
pub fn combined_source_text(sources: &[CrawlResult]) -> String {
    let combined = sources
        .iter()
        .map(|s| format!("Source: {}\nURL: {}\nContent: {}", s.title, s.source_url, s.content))
        .collect::<Vec<_>>()
        .join("\n\n");
    truncate_chars(&combined, MAX_ANALYSIS_INPUT_CHARS)
}

/// Read the model's JSON answer; prose answers are folded into the same shape
pub fn parse_analysis(text: &str, source_count: usize) -> Analysis {
    let trimmed = text.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    if let Ok(analysis) = serde_json::from_str::<Analysis>(unfenced) {
        return analysis;
    }

    let details: String = unfenced.chars().skip(500).take(500).collect();
    Analysis {
        executive_summary: truncate_chars(unfenced, 500),
        key_findings: vec!["Analysis completed with real web data".to_string()],
        specific_details: if details.is_empty() {
            "See executive summary".to_string()
        } else {
            details
        },
        sources_summary: format!("Analyzed {} web sources", source_count),
    }
}

/// Analysis built from the sources alone, no model involved
pub fn basic_analysis(query: &str, sources: &[CrawlResult]) -> Analysis {
    let total_chars: usize = sources.iter().map(|s| s.content.chars().count()).sum();
    let titles: Vec<&str> = sources.iter().map(|s| s.title.as_str()).collect();
    let domains: BTreeSet<String> = sources.iter().filter_map(CrawlResult::domain).collect();

    let mut shown = titles.iter().take(3).copied().collect::<Vec<_>>().join(", ");
    if titles.len() > 3 {
        shown.push_str("...");
    }

    Analysis {
        executive_summary: format!(
            "Research completed for: {}. Found {} relevant sources. Total content analyzed: {} characters.",
            query,
            sources.len(),
            total_chars
        ),
        key_findings: vec![
            format!("Successfully scraped {} web sources", sources.len()),
            format!("Sources include: {}", shown),
            format!("Total content length: {} characters", total_chars),
        ],
        specific_details: format!("Found content from {} unique domains", domains.len()),
        sources_summary: format!("Successfully analyzed {} web sources", sources.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn source(url: &str, title: &str) -> CrawlResult {
        CrawlResult::from_content(url, title, &"content ".repeat(20))
    }

    #[test]
    fn test_parse_json_analysis() {
        let text = r#"```json
{"executive_summary":"DeKalb has many diners.","key_findings":["Lots of pizza"],"specific_details":"Near NIU","sources_summary":"Two sources"}
```"#;
        let analysis = parse_analysis(text, 2);
        assert_eq!(analysis.executive_summary, "DeKalb has many diners.");
        assert_eq!(analysis.key_findings, vec!["Lots of pizza".to_string()]);
    }

    #[test]
    fn test_parse_prose_falls_back() {
        let analysis = parse_analysis("Just a short prose answer.", 4);
        assert_eq!(analysis.executive_summary, "Just a short prose answer.");
        assert_eq!(analysis.specific_details, "See executive summary");
        assert_eq!(analysis.sources_summary, "Analyzed 4 web sources");
    }

    #[test]
    fn test_basic_analysis_counts_domains() {
        let sources = vec![
            source("https://en.wikipedia.org/wiki/Chicago", "Chicago"),
            source("https://en.wikipedia.org/wiki/DeKalb", "DeKalb"),
            source("https://www.chicago.gov/", "City"),
            source("https://www.niu.edu/dining", "Dining"),
        ];
        let analysis = basic_analysis("chicago food", &sources);
        assert!(analysis.executive_summary.contains("Found 4 relevant sources"));
        assert_eq!(analysis.key_findings[1], "Sources include: Chicago, DeKalb, City...");
        assert_eq!(analysis.specific_details, "Found content from 3 unique domains");
    }

    #[test]
    fn test_combined_text_is_capped() {
        let sources: Vec<_> = (0..10)
            .map(|i| CrawlResult::from_content(format!("https://example.com/{}", i), "Page", &"y".repeat(3000)))
            .collect();
        assert_eq!(combined_source_text(&sources).chars().count(), MAX_ANALYSIS_INPUT_CHARS);
    }

    #[test]
    fn test_from_config_requires_key() {
        let config = LLMConfig {
            openai_api_key: " ".to_string(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4".to_string(),
        };
        assert!(OpenAiAnalyst::from_config(&config).is_none());
    }

    #[tokio::test]
    async fn test_openai_analyst_roundtrip() {
        let mut server = Server::new_async().await;
        let answer = json!({
            "executive_summary": "Summary",
            "key_findings": ["One", "Two"],
            "specific_details": "Details",
            "sources_summary": "Sources"
        })
        .to_string();
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::PartialJson(json!({ "model": "gpt-4", "max_tokens": 1500 })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "choices": [{ "message": { "role": "assistant", "content": answer } }] }).to_string())
            .expect(1)
            .create_async()
            .await;

        let analyst = OpenAiAnalyst::new("sk-test", &server.url(), "gpt-4");
        let analysis = analyst
            .analyze("chicago", &[source("https://www.chicago.gov/", "City")])
            .await
            .unwrap();

        assert_eq!(analysis.executive_summary, "Summary");
        assert_eq!(analysis.key_findings.len(), 2);
        mock.assert_async().await;
    }

    #[test]
    fn test_parse_suggested_urls() {
        let text = "1. https://en.wikipedia.org/wiki/Chicago\n- https://www.chicago.gov/\nnot a url\nhttps://www.chicago.gov/";
        assert_eq!(
            parse_suggested_urls(text, 5),
            vec![
                "https://en.wikipedia.org/wiki/Chicago".to_string(),
                "https://www.chicago.gov/".to_string(),
            ]
        );
        assert_eq!(parse_suggested_urls(text, 1).len(), 1);
        assert!(parse_suggested_urls("Sorry, I can't assist with that.", 3).is_empty());
    }

    #[tokio::test]
    async fn test_suggest_sources_uses_chat_completions() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::PartialJson(json!({ "max_tokens": 300 })))
            .with_status(200)
            .with_body(
                json!({ "choices": [{ "message": {
                    "content": "https://www.niu.edu/\nhttps://www.cityofdekalb.com/"
                } }] })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let analyst = OpenAiAnalyst::new("sk-test", &server.url(), "gpt-4");
        let urls = analyst.suggest_sources("deep research dekalb", 3).await.unwrap();
        assert_eq!(urls, vec!["https://www.niu.edu/".to_string(), "https://www.cityofdekalb.com/".to_string()]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_openai_analyst_surfaces_api_errors() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body(r#"{"error":{"message":"Rate limit reached"}}"#)
            .create_async()
            .await;

        let analyst = OpenAiAnalyst::new("sk-test", &server.url(), "gpt-4");
        let err = analyst.analyze("chicago", &[]).await.unwrap_err();
        assert!(err.to_string().contains("Rate limit reached"));
    }
}
