//! DuckDuckGo search provider using daedra
//!
//! daedra performs the HTML search and result extraction; this module maps
//! its hits into [`SourceCandidate`]s and its errors into [`ProviderError`]s.

use crate::search::{ProviderError, SearchProvider, SourceCandidate};
use async_trait::async_trait;
use std::time::Duration;

/// Web search provider powered by daedra
pub struct DuckDuckGoProvider;

impl DuckDuckGoProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DuckDuckGoProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoProvider {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    async fn search(
        &self,
        query: &str,
        num_results: usize,
        _timeout: Option<Duration>,
    ) -> std::result::Result<Vec<SourceCandidate>, ProviderError> {
        if query.trim().is_empty() {
            return Err(ProviderError::InvalidResponse("empty query".to_string()));
        }

        let search_args = daedra::SearchArgs {
            query: query.to_string(),
            options: Some(daedra::SearchOptions {
                num_results,
                ..Default::default()
            }),
        };

        match daedra::tools::search::perform_search(&search_args).await {
            Ok(response) => Ok(response
                .data
                .iter()
                .enumerate()
                .map(|(rank, r)| SourceCandidate {
                    url: r.url.to_string(),
                    title: r.title.to_string(),
                    snippet: r.description.to_string(),
                    published_at: None,
                    author: None,
                    provider: "duckduckgo".to_string(),
                    rank,
                })
                .collect()),
            Err(e) => Err(classify_error(&e.to_string())),
        }
    }
}

fn classify_error(message: &str) -> ProviderError {
    let lower = message.to_lowercase();
    if lower.contains("rate") || lower.contains("429") {
        ProviderError::RateLimited(format!("duckduckgo: {}", message))
    } else {
        ProviderError::Unavailable(format!("duckduckgo: {}", message))
    }
}
