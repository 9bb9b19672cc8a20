//! Web search provider — Brave Search JSON API.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::ProviderError;

const BRAVE_SEARCH_URL: &str = "https://api.search.brave.com/res/v1/web/search";

/// One search result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Run a query, returning up to `max_results` hits. An unavailable
    /// backend returns an empty list, not an error the caller must route.
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, ProviderError>;
}

/// Brave Search client. Without an API key every query resolves to an
/// empty result set so dependent flows degrade instead of failing.
pub struct BraveSearch {
    client: reqwest::Client,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: BraveWeb,
}

#[derive(Deserialize, Default)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Deserialize)]
struct BraveResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    url: String,
}

impl BraveSearch {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }
}

#[async_trait]
impl SearchProvider for BraveSearch {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, ProviderError> {
        let Some(api_key) = &self.api_key else {
            debug!("Search skipped: no API key configured");
            return Ok(Vec::new());
        };

        let resp = self
            .client
            .get(BRAVE_SEARCH_URL)
            .header("X-Subscription-Token", api_key)
            .query(&[
                ("q", query.to_string()),
                ("count", max_results.to_string()),
                ("country", "in".to_string()),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed {
                provider: "brave-search",
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(ProviderError::RequestFailed {
                provider: "brave-search",
                reason: format!("status {}", resp.status()),
            });
        }

        let body: BraveResponse =
            resp.json().await.map_err(|e| ProviderError::InvalidResponse {
                provider: "brave-search",
                reason: e.to_string(),
            })?;

        Ok(body
            .web
            .results
            .into_iter()
            .take(max_results)
            .map(|r| SearchHit {
                title: r.title,
                snippet: r.description,
                url: r.url,
            })
            .collect())
    }
}
