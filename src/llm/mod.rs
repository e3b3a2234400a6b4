//! LLM Provider Clients and Abstractions
//!
//! The research engine talks to text generation through one trait,
//! [`LLMClient`], so providers can be swapped (or faked in tests) without
//! touching orchestration code.
//!
//! # Architecture
//!
//! - [`LLMClient`] - The core trait that all providers implement
//! - [`LLMRequest`] - Prompt plus model tier, token ceiling, temperature and timeout
//! - [`CallOutcome`] - `Ok | TimedOut | Failed`, returned by [`invoke_with_timeout`]
//! - [`Provider`] - Runtime provider selection and client construction
//!
//! # Supported Providers
//!
//! Enable providers via Cargo features:
//! - `ollama` - Local Ollama server (default)
//!
//! # Example
//!
//! ```ignore
//! use deepdive::llm::{invoke_with_timeout, LLMRequest, ModelTier, Provider, TierModels};
//!
//! let client = Provider::Ollama {
//!     base_url: "http://localhost:11434".to_string(),
//!     models: TierModels::default(),
//! }
//! .create_client()?;
//!
//! let outcome = invoke_with_timeout(client.as_ref(), &request).await;
//! ```

/// Core LLM client trait, request and outcome types.
pub mod client;

#[cfg(feature = "ollama")]
pub mod ollama;

pub use client::{
    invoke_with_timeout, CallOutcome, LLMClient, LLMRequest, ModelTier, Provider, TierModels,
};
