//! Web search providers and multi-provider pooling
//!
//! A [`SearchHub`] fans one query out to every configured
//! [`SearchProvider`], bounds each call with a timeout, and pools the results
//! deduplicated by URL. A provider failure is logged and counted; it never
//! fails the query as a whole.

/// Heuristic source credibility scoring.
pub mod credibility;
/// DuckDuckGo provider backed by daedra.
pub mod duckduckgo;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

pub use credibility::{CredibilityConfig, CredibilityScorer};
pub use duckduckgo::DuckDuckGoProvider;

/// A raw search hit before credibility and relevance scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCandidate {
    pub url: String,
    pub title: String,
    pub snippet: String,
    pub published_at: Option<DateTime<Utc>>,
    pub author: Option<String>,
    /// Provider that returned the hit
    pub provider: String,
    /// Zero-based position in the provider's result list
    pub rank: usize,
}

/// Typed failure of a single provider call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("search timed out after {0:?}")]
    Timeout(Duration),

    #[error("rate limited by {0}")]
    RateLimited(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Run one query. `timeout` is advisory; the hub enforces it regardless.
    async fn search(
        &self,
        query: &str,
        num_results: usize,
        timeout: Option<Duration>,
    ) -> std::result::Result<Vec<SourceCandidate>, ProviderError>;
}

/// Search settings from `[search]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Ceiling for a single provider call
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: f64,

    /// Results requested per query per provider
    #[serde(default = "default_results_per_query")]
    pub results_per_query: usize,

    /// Named providers, e.g. `[search.providers.duckduckgo]`
    #[serde(default = "default_providers")]
    pub providers: std::collections::HashMap<String, SearchProviderConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SearchProviderConfig {
    Duckduckgo {
        #[serde(default = "default_true")]
        enabled: bool,
    },
}

impl SearchProviderConfig {
    pub fn enabled(&self) -> bool {
        match self {
            SearchProviderConfig::Duckduckgo { enabled } => *enabled,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_call_timeout_secs() -> f64 {
    15.0
}

fn default_results_per_query() -> usize {
    8
}

fn default_providers() -> std::collections::HashMap<String, SearchProviderConfig> {
    let mut providers = std::collections::HashMap::new();
    providers.insert(
        "duckduckgo".to_string(),
        SearchProviderConfig::Duckduckgo { enabled: true },
    );
    providers
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: default_call_timeout_secs(),
            results_per_query: default_results_per_query(),
            providers: default_providers(),
        }
    }
}

/// Pooled result of one query across all providers.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub candidates: Vec<SourceCandidate>,
    pub providers_queried: usize,
    pub failures: usize,
}

impl SearchOutcome {
    /// Every provider that was asked failed.
    pub fn is_total_failure(&self) -> bool {
        self.providers_queried > 0 && self.failures == self.providers_queried
    }
}

/// Fans queries out to all providers and pools the hits.
pub struct SearchHub {
    providers: Vec<Arc<dyn SearchProvider>>,
    call_ceiling: Duration,
}

impl SearchHub {
    pub fn new(call_ceiling: Duration) -> Self {
        Self {
            providers: Vec::new(),
            call_ceiling,
        }
    }

    /// Build the hub from `[search]`, registering every enabled provider.
    pub fn from_config(config: &SearchConfig) -> Self {
        let mut hub = Self::new(crate::research::budget::secs_to_duration(config.call_timeout_secs));
        let mut names: Vec<&String> = config.providers.keys().collect();
        names.sort();
        for name in names {
            let provider = &config.providers[name];
            if !provider.enabled() {
                continue;
            }
            match provider {
                SearchProviderConfig::Duckduckgo { .. } => {
                    hub.register(Arc::new(DuckDuckGoProvider::new()));
                }
            }
        }
        hub
    }

    pub fn with_provider(mut self, provider: Arc<dyn SearchProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn register(&mut self, provider: Arc<dyn SearchProvider>) {
        self.providers.push(provider);
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn call_ceiling(&self) -> Duration {
        self.call_ceiling
    }

    /// Query every provider concurrently within `budget` (capped by the call
    /// ceiling) and return the hits deduplicated by URL in provider order.
    pub async fn search(&self, query: &str, num_results: usize, budget: Duration) -> SearchOutcome {
        let timeout = budget.min(self.call_ceiling);
        let mut outcome = SearchOutcome {
            providers_queried: self.providers.len(),
            ..Default::default()
        };

        if timeout.is_zero() {
            outcome.failures = outcome.providers_queried;
            return outcome;
        }

        let calls = self.providers.iter().map(|provider| async move {
            let result =
                match tokio::time::timeout(timeout, provider.search(query, num_results, Some(timeout)))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout(timeout)),
                };
            (provider.name().to_string(), result)
        });

        let mut seen = HashSet::new();
        for (name, result) in join_all(calls).await {
            match result {
                Ok(candidates) => {
                    for candidate in candidates {
                        if seen.insert(normalize_url(&candidate.url)) {
                            outcome.candidates.push(candidate);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(provider = %name, query = %query, error = %e, "Search provider failed");
                    outcome.failures += 1;
                }
            }
        }

        outcome
    }
}

/// Key used for URL deduplication: lowercase, no fragment, no trailing slash.
pub fn normalize_url(raw: &str) -> String {
    match url::Url::parse(raw.trim()) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            let host = parsed
                .host_str()
                .map(|h| h.trim_start_matches("www.").to_lowercase())
                .unwrap_or_default();
            let path = parsed.path().trim_end_matches('/');
            match parsed.query() {
                Some(q) => format!("{}{}?{}", host, path, q),
                None => format!("{}{}", host, path),
            }
        }
        Err(_) => raw.trim().trim_end_matches('/').to_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProvider {
        name: &'static str,
        urls: Vec<&'static str>,
    }

    #[async_trait]
    impl SearchProvider for FixedProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn search(
            &self,
            _query: &str,
            _num_results: usize,
            _timeout: Option<Duration>,
        ) -> std::result::Result<Vec<SourceCandidate>, ProviderError> {
            Ok(self
                .urls
                .iter()
                .enumerate()
                .map(|(rank, url)| SourceCandidate {
                    url: url.to_string(),
                    title: format!("Result {}", rank),
                    snippet: String::new(),
                    published_at: None,
                    author: None,
                    provider: self.name.to_string(),
                    rank,
                })
                .collect())
        }
    }

    struct DownProvider;

    #[async_trait]
    impl SearchProvider for DownProvider {
        fn name(&self) -> &str {
            "down"
        }

        async fn search(
            &self,
            _query: &str,
            _num_results: usize,
            _timeout: Option<Duration>,
        ) -> std::result::Result<Vec<SourceCandidate>, ProviderError> {
            Err(ProviderError::Unavailable("503".to_string()))
        }
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url("https://www.Reuters.com/markets/acme/"),
            "reuters.com/markets/acme"
        );
        assert_eq!(
            normalize_url("https://reuters.com/markets/acme#top"),
            "reuters.com/markets/acme"
        );
    }

    #[tokio::test]
    async fn test_hub_pools_and_dedupes_by_url() {
        let hub = SearchHub::new(Duration::from_secs(5))
            .with_provider(Arc::new(FixedProvider {
                name: "a",
                urls: vec!["https://reuters.com/x", "https://ft.com/y"],
            }))
            .with_provider(Arc::new(FixedProvider {
                name: "b",
                urls: vec!["https://www.reuters.com/x/", "https://wsj.com/z"],
            }));

        let outcome = hub.search("acme", 10, Duration::from_secs(5)).await;
        let urls: Vec<&str> = outcome.candidates.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://reuters.com/x", "https://ft.com/y", "https://wsj.com/z"]
        );
        assert_eq!(outcome.failures, 0);
    }

    #[tokio::test]
    async fn test_hub_recovers_from_provider_failure() {
        let hub = SearchHub::new(Duration::from_secs(5))
            .with_provider(Arc::new(DownProvider))
            .with_provider(Arc::new(FixedProvider {
                name: "a",
                urls: vec!["https://reuters.com/x"],
            }));

        let outcome = hub.search("acme", 10, Duration::from_secs(5)).await;
        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.failures, 1);
        assert!(!outcome.is_total_failure());
    }

    #[tokio::test]
    async fn test_hub_zero_budget_counts_as_total_failure() {
        let hub = SearchHub::new(Duration::from_secs(5)).with_provider(Arc::new(DownProvider));
        let outcome = hub.search("acme", 10, Duration::ZERO).await;
        assert!(outcome.candidates.is_empty());
        assert!(outcome.is_total_failure());
    }

    #[test]
    fn test_default_config_registers_duckduckgo() {
        let hub = SearchHub::from_config(&SearchConfig::default());
        assert_eq!(hub.provider_names(), vec!["duckduckgo".to_string()]);
    }

    #[test]
    fn test_disabled_provider_is_skipped() {
        let mut config = SearchConfig::default();
        config.providers.insert(
            "duckduckgo".to_string(),
            SearchProviderConfig::Duckduckgo { enabled: false },
        );
        assert!(SearchHub::from_config(&config).is_empty());
    }
}
