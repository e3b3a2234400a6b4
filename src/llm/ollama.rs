use crate::llm::client::{LLMClient, LLMRequest, ModelTier, TierModels};
use crate::types::{AppError, Result};
use async_trait::async_trait;
use ollama_rs::{
    generation::chat::{request::ChatMessageRequest, ChatMessage},
    models::ModelOptions,
    Ollama,
};

const DEFAULT_PORT: u16 = 11434;

pub struct OllamaClient {
    client: Ollama,
    models: TierModels,
}

impl OllamaClient {
    pub fn new(base_url: &str, models: TierModels) -> Result<Self> {
        let (host, port) = split_base_url(base_url)?;
        Ok(Self {
            client: Ollama::new(host, port),
            models,
        })
    }
}

/// Split `http://host:port` into the scheme+host and port that `Ollama::new` expects.
fn split_base_url(base_url: &str) -> Result<(String, u16)> {
    let parsed = url::Url::parse(base_url)
        .map_err(|e| AppError::Configuration(format!("Invalid Ollama URL '{}': {}", base_url, e)))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| AppError::Configuration(format!("Ollama URL '{}' has no host", base_url)))?;
    let port = parsed.port().unwrap_or(DEFAULT_PORT);
    Ok((format!("{}://{}", parsed.scheme(), host), port))
}

#[async_trait]
impl LLMClient for OllamaClient {
    async fn invoke(&self, request: &LLMRequest) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage::system(system.clone()));
        }
        messages.push(ChatMessage::user(request.prompt.clone()));

        let options = ModelOptions::default()
            .temperature(request.temperature)
            .num_predict(request.max_tokens as i32);

        let chat_request =
            ChatMessageRequest::new(self.models.get(request.model_tier).to_string(), messages)
                .options(options);

        let response = self
            .client
            .send_chat_messages(chat_request)
            .await
            .map_err(|e| AppError::LLM(format!("Ollama error: {}", e)))?;

        Ok(response.message.content)
    }

    fn model_for(&self, tier: ModelTier) -> &str {
        self.models.get(tier)
    }

    fn provider_name(&self) -> &str {
        "ollama"
    }
}
