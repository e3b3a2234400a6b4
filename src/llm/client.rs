//! LLM client abstraction used for source analysis and narrative generation
//!
//! Every call carries an explicit model tier, token ceiling, temperature and
//! timeout. Callers never see a raw timeout error: [`invoke_with_timeout`]
//! folds the call into a [`CallOutcome`] that is consumed with plain branching.

use crate::research::budget::ExecutionProfile;
use crate::types::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Cost/quality tier of the model used for a call, cheapest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Fast,
    Balanced,
    Deep,
}

impl ModelTier {
    /// One tier up, saturating at `Deep`.
    pub fn richer(self) -> Self {
        match self {
            ModelTier::Fast => ModelTier::Balanced,
            ModelTier::Balanced | ModelTier::Deep => ModelTier::Deep,
        }
    }

    /// One tier down, saturating at `Fast`.
    pub fn cheaper(self) -> Self {
        match self {
            ModelTier::Deep => ModelTier::Balanced,
            ModelTier::Balanced | ModelTier::Fast => ModelTier::Fast,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ModelTier::Fast => "fast",
            ModelTier::Balanced => "balanced",
            ModelTier::Deep => "deep",
        }
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelTier {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "balanced" => Ok(Self::Balanced),
            "deep" => Ok(Self::Deep),
            other => Err(AppError::InvalidInput(format!("Unknown model tier: {}", other))),
        }
    }
}

/// Model identifiers per tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierModels {
    #[serde(default = "default_fast_model")]
    pub fast: String,
    #[serde(default = "default_balanced_model")]
    pub balanced: String,
    #[serde(default = "default_deep_model")]
    pub deep: String,
}

fn default_fast_model() -> String {
    "llama3.2:1b".to_string()
}

fn default_balanced_model() -> String {
    "llama3.2:3b".to_string()
}

fn default_deep_model() -> String {
    "llama3.1:8b".to_string()
}

impl Default for TierModels {
    fn default() -> Self {
        Self {
            fast: default_fast_model(),
            balanced: default_balanced_model(),
            deep: default_deep_model(),
        }
    }
}

impl TierModels {
    pub fn get(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Fast => &self.fast,
            ModelTier::Balanced => &self.balanced,
            ModelTier::Deep => &self.deep,
        }
    }
}

/// A single text-generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct LLMRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub model_tier: ModelTier,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl LLMRequest {
    /// Build a request whose knobs come from a selected execution profile.
    pub fn from_profile(prompt: impl Into<String>, profile: &ExecutionProfile) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            model_tier: profile.model_tier,
            max_tokens: profile.max_tokens,
            temperature: profile.temperature,
            timeout: profile.timeout(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Generic LLM client trait for provider abstraction
///
/// Implementations only perform the call; timeouts are enforced by
/// [`invoke_with_timeout`].
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Generate a completion for the request
    async fn invoke(&self, request: &LLMRequest) -> Result<String>;

    /// Model identifier used for a tier
    fn model_for(&self, tier: ModelTier) -> &str;

    /// Provider name for logs
    fn provider_name(&self) -> &str;
}

/// Result of an external call with an explicit timeout.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome<T> {
    Ok(T),
    TimedOut,
    Failed(String),
}

impl<T> CallOutcome<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, CallOutcome::Ok(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            CallOutcome::Ok(value) => Some(value),
            CallOutcome::TimedOut | CallOutcome::Failed(_) => None,
        }
    }
}

/// Run a request under its own timeout. A zero timeout is an immediate `TimedOut`.
pub async fn invoke_with_timeout(client: &dyn LLMClient, request: &LLMRequest) -> CallOutcome<String> {
    if request.timeout.is_zero() {
        return CallOutcome::TimedOut;
    }

    match tokio::time::timeout(request.timeout, client.invoke(request)).await {
        Ok(Ok(text)) => CallOutcome::Ok(text),
        Ok(Err(e)) => CallOutcome::Failed(e.to_string()),
        Err(_) => {
            tracing::debug!(
                provider = client.provider_name(),
                tier = %request.model_tier,
                timeout_ms = request.timeout.as_millis() as u64,
                "LLM call timed out"
            );
            CallOutcome::TimedOut
        }
    }
}

/// Provider enum for runtime selection
#[derive(Debug, Clone)]
pub enum Provider {
    /// Ollama local LLM provider
    ///
    /// # Example
    /// ```rust,ignore
    /// let provider = Provider::Ollama {
    ///     base_url: "http://localhost:11434".to_string(),
    ///     models: TierModels::default(),
    /// };
    /// ```
    Ollama { base_url: String, models: TierModels },
}

impl Provider {
    /// Create a client instance for this provider
    ///
    /// # Errors
    ///
    /// Returns an error if the provider's feature is not compiled in or the
    /// endpoint cannot be parsed.
    pub fn create_client(&self) -> Result<Arc<dyn LLMClient>> {
        match self {
            #[cfg(feature = "ollama")]
            Provider::Ollama { base_url, models } => Ok(Arc::new(
                super::ollama::OllamaClient::new(base_url, models.clone())?,
            )),

            #[cfg(not(feature = "ollama"))]
            Provider::Ollama { .. } => Err(AppError::Configuration(
                "Ollama support is not compiled in; rebuild with the `ollama` feature".to_string(),
            )),
        }
    }

    /// Get a human-readable name for this provider
    pub fn name(&self) -> &'static str {
        match self {
            Provider::Ollama { .. } => "Ollama",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowClient(Duration);

    #[async_trait]
    impl LLMClient for SlowClient {
        async fn invoke(&self, _request: &LLMRequest) -> Result<String> {
            tokio::time::sleep(self.0).await;
            Ok("done".to_string())
        }

        fn model_for(&self, _tier: ModelTier) -> &str {
            "slow"
        }

        fn provider_name(&self) -> &str {
            "slow"
        }
    }

    struct BrokenClient;

    #[async_trait]
    impl LLMClient for BrokenClient {
        async fn invoke(&self, _request: &LLMRequest) -> Result<String> {
            Err(AppError::LLM("malformed output".to_string()))
        }

        fn model_for(&self, _tier: ModelTier) -> &str {
            "broken"
        }

        fn provider_name(&self) -> &str {
            "broken"
        }
    }

    fn request(timeout: Duration) -> LLMRequest {
        LLMRequest {
            prompt: "hello".to_string(),
            system: None,
            model_tier: ModelTier::Fast,
            max_tokens: 64,
            temperature: 0.2,
            timeout,
        }
    }

    #[test]
    fn test_tier_ordering_and_steps() {
        assert!(ModelTier::Fast < ModelTier::Balanced);
        assert!(ModelTier::Balanced < ModelTier::Deep);
        assert_eq!(ModelTier::Deep.richer(), ModelTier::Deep);
        assert_eq!(ModelTier::Fast.cheaper(), ModelTier::Fast);
        assert_eq!(ModelTier::Balanced.richer(), ModelTier::Deep);
    }

    #[test]
    fn test_tier_models_lookup() {
        let models = TierModels::default();
        assert_eq!(models.get(ModelTier::Fast), "llama3.2:1b");
        assert_eq!(models.get(ModelTier::Deep), "llama3.1:8b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_with_timeout_times_out() {
        let client = SlowClient(Duration::from_secs(30));
        let outcome = invoke_with_timeout(&client, &request(Duration::from_secs(2))).await;
        assert_eq!(outcome, CallOutcome::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_with_timeout_succeeds() {
        let client = SlowClient(Duration::from_millis(10));
        let outcome = invoke_with_timeout(&client, &request(Duration::from_secs(2))).await;
        assert_eq!(outcome, CallOutcome::Ok("done".to_string()));
    }

    #[tokio::test]
    async fn test_invoke_with_zero_timeout_is_immediate() {
        let client = SlowClient(Duration::from_secs(30));
        let outcome = invoke_with_timeout(&client, &request(Duration::ZERO)).await;
        assert_eq!(outcome, CallOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_invoke_failure_is_captured() {
        let outcome = invoke_with_timeout(&BrokenClient, &request(Duration::from_secs(1))).await;
        assert!(matches!(outcome, CallOutcome::Failed(msg) if msg.contains("malformed")));
    }
}
