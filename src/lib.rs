//! # deepdive - research orchestration engine
//!
//! Given a topic (typically a company or ticker), deepdive plans a set of
//! typed research subtasks, runs them under bounded concurrency against
//! pluggable web-search and LLM providers, stops each task once its evidence
//! is confident enough, and merges the partial results into one
//! credibility-ranked synthesis within a wall-clock budget.
//!
//! ## Overview
//!
//! deepdive can be used in two ways:
//!
//! 1. **As a command line tool** - Run the `deepdive` binary
//! 2. **As a library** - Embed [`OrchestrationDriver`] in your own Rust project
//!
//! ## Quick Start (Library Usage)
//!
//! ```rust,ignore
//! use deepdive::{DeepdiveConfig, OrchestrationDriver, RunRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DeepdiveConfig::load_or_default("deepdive.toml")?;
//!     let driver = OrchestrationDriver::from_config(&config)?;
//!
//!     let result = driver
//!         .run_research(RunRequest::new("Acme Corp").focus(["earnings"]))
//!         .await;
//!     println!("{}", serde_json::to_string_pretty(&result)?);
//!     Ok(())
//! }
//! ```
//!
//! ### Custom collaborators
//!
//! ```rust,ignore
//! use deepdive::{OrchestrationDriver, SearchHub};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let search = SearchHub::new(Duration::from_secs(10)).with_provider(Arc::new(MySearch));
//! let driver = OrchestrationDriver::new(Arc::new(search), Arc::new(MyLlm));
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `ollama` | Ollama LLM client (default) |
//!
//! ## Modules
//!
//! - [`research`] - Planning, subagents, coordination, synthesis and the run driver
//! - [`search`] - Search provider trait, fan-out hub and credibility scoring
//! - [`llm`] - LLM client trait, model tiers and provider factory
//! - [`types`] - Tasks, reports, citations and error types
//! - [`utils`] - TOML configuration with hot reload
//! - [`cli`] - Command line parsing and output

/// Command line parsing and output.
pub mod cli;
/// LLM client abstractions and providers.
pub mod llm;
/// The research orchestration engine.
pub mod research;
/// Search providers and source credibility.
pub mod search;
/// Shared domain and error types.
pub mod types;
/// Configuration loading.
pub mod utils;

pub use llm::{LLMClient, LLMRequest, ModelTier, Provider};
pub use research::{
    ConcurrencyCoordinator, OrchestrationDriver, ResultSynthesizer, RunRequest, RunResult,
    RunStatus, Subagent, TaskCoordinator, TaskPlanner,
};
pub use search::{SearchHub, SearchProvider};
pub use types::{AppError, ResearchDepth, ResearchTask, Result, TaskStatus, TaskType};
pub use utils::toml_config::{ConfigManager, DeepdiveConfig};
