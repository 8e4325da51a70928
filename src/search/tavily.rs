//! Tavily search provider.
//!
//! Thin `reqwest` client for the Tavily REST API. Result fields map
//! one-to-one onto [`SearchResult`]; a missing `raw_content` stays `None`
//! and is handled downstream by the source aggregator.

use crate::search::SearchProvider;
use crate::types::{ResearchError, Result, SearchError, SearchResponse, SearchResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

const DEFAULT_BASE_URL: &str = "https://api.tavily.com";

/// Hosted web-search provider backed by the Tavily API.
pub struct TavilyProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    max_results: usize,
    include_raw_content: bool,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    raw_content: Option<String>,
}

impl TavilyProvider {
    /// Create a provider with an explicit API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_results: 5,
            include_raw_content: true,
        }
    }

    /// Create a provider from `TAVILY_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("TAVILY_API_KEY").map_err(|_| {
            ResearchError::Configuration("TAVILY_API_KEY is not set".to_string())
        })?;
        Ok(Self::new(api_key))
    }

    /// Point the provider at a different endpoint (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Cap results per query.
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Ask Tavily for full page content alongside snippets.
    pub fn with_raw_content(mut self, include: bool) -> Self {
        self.include_raw_content = include;
        self
    }
}

#[async_trait]
impl SearchProvider for TavilyProvider {
    async fn search(&self, query: &str) -> std::result::Result<SearchResponse, SearchError> {
        let body = json!({
            "api_key": self.api_key,
            "query": query,
            "max_results": self.max_results,
            "include_raw_content": self.include_raw_content,
            "search_depth": "advanced",
        });

        let response = self
            .http
            .post(format!("{}/search", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(SearchError::Provider(format!(
                "tavily returned {}: {}",
                status,
                detail.chars().take(200).collect::<String>()
            )));
        }

        let payload: TavilyResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Decode(e.to_string()))?;

        let results = payload
            .results
            .into_iter()
            .map(|r| SearchResult {
                title: r.title,
                url: r.url,
                content: r.content,
                score: r.score,
                raw_content: r.raw_content,
            })
            .collect();

        Ok(SearchResponse {
            query: query.to_string(),
            results,
        })
    }

    fn name(&self) -> &str {
        "tavily"
    }
}
