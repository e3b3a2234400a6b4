//! Init command implementation
//!
//! Writes a starter `deepdive.toml` with every table spelled out at its
//! default value.

use super::output::Output;
use crate::utils::toml_config::{DeepdiveConfig, DEFAULT_CONFIG_FILE};
use std::fs;
use std::path::PathBuf;

/// Result of the init operation
#[derive(Debug, PartialEq)]
pub enum InitResult {
    /// Initialization completed successfully
    Success,
    /// deepdive.toml already exists
    AlreadyExists,
    /// An error occurred during initialization
    Error(String),
}

/// Configuration for the init command
pub struct InitConfig {
    /// Directory to initialize
    pub path: PathBuf,
    /// Overwrite existing files
    pub force: bool,
    /// Ollama endpoint written into `[llm]`
    pub ollama_url: String,
}

/// Run the init command
pub fn run(config: InitConfig, output: &Output) -> InitResult {
    output.banner();
    output.header("Initializing deepdive");

    let config_path = config.path.join(DEFAULT_CONFIG_FILE);
    if config_path.exists() && !config.force {
        output.warning(&format!("{} already exists!", DEFAULT_CONFIG_FILE));
        output.hint("Use --force to overwrite existing files");
        return InitResult::AlreadyExists;
    }

    if let Err(e) = fs::create_dir_all(&config.path) {
        output.error(&format!("Failed to create {}: {}", config.path.display(), e));
        return InitResult::Error(e.to_string());
    }

    let content = generate_config(&config.ollama_url);
    // Never write a file we could not load back
    if let Err(e) = DeepdiveConfig::parse(&content) {
        output.error(&format!("Generated configuration is invalid: {}", e));
        return InitResult::Error(e.to_string());
    }

    if let Err(e) = fs::write(&config_path, content) {
        output.error(&format!("Failed to write {}: {}", DEFAULT_CONFIG_FILE, e));
        return InitResult::Error(e.to_string());
    }
    output.created("config", &config_path.display().to_string());

    output.hint("Next steps:");
    output.command("ollama pull llama3.2:3b");
    output.command("deepdive research \"Acme Corp\" --focus earnings");

    InitResult::Success
}

fn generate_config(ollama_url: &str) -> String {
    format!(
        r#"# deepdive configuration
# Every table is optional; omitted keys use the values shown here.

[logging]
level = "info"      # overridden by RUST_LOG
format = "pretty"   # or "json"

[research]
max_concurrent_agents = 4
inner_concurrency = 2
default_depth = "standard"        # basic | standard | comprehensive | exhaustive
default_time_budget_secs = 120.0
target_confidence = 0.8
min_sources = 3
smoothing = {{ type = "mean" }}     # or {{ type = "recency_weighted", alpha = 0.3 }}
emergency_floor_secs = 10.0
emergency_confidence = 0.3
search_phase_ratio = 0.2
search_phase_cap_secs = 60.0
analysis_phase_ratio = 0.7
parallel_enabled = true
parallel_min_budget_secs = 30.0
batch_threshold_secs = 6.0
min_source_credibility = 0.2

[budget]
fast_below_secs = 15.0
balanced_below_secs = 45.0
high_confidence = 0.75
large_content_chars = 6000
fast = {{ max_tokens = 512, timeout_secs = 8.0 }}
balanced = {{ max_tokens = 1024, timeout_secs = 20.0 }}
deep = {{ max_tokens = 2048, timeout_secs = 45.0 }}

[search]
call_timeout_secs = 15.0
results_per_query = 8

[search.providers.duckduckgo]
type = "duckduckgo"
enabled = true

[llm]
type = "ollama"
base_url = "{ollama_url}"

[llm.models]
fast = "llama3.2:1b"
balanced = "llama3.2:3b"
deep = "llama3.1:8b"

[synthesis]
narrative_timeout_secs = 20.0
citation_floor = 0.4
narrative_tier = "balanced"
narrative_max_tokens = 600

[credibility]
default_score = 0.5

[credibility.domains]
# "example.com" = 0.7

# Extra personas, or overrides of the built-in ones
# [personas.income_seeker]
# description = "Dividend focus"
# focus_areas = ["dividend", "payout ratio", "cash flow"]
"#
    )
}
