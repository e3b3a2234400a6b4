//! TOML-based configuration for deepdive
//!
//! This module provides declarative configuration for the research engine,
//! search providers, the LLM backend and personas via a TOML file
//! (`deepdive.toml`). Every table is optional and falls back to defaults.
//!
//! # Hot Reloading
//!
//! Configuration changes are detected and applied at runtime.
//! Use `ConfigManager` for thread-safe access to the current configuration.

use arc_swap::ArcSwap;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::llm::{Provider, TierModels};
use crate::research::budget::BudgetConfig;
use crate::research::confidence::SmoothingPolicy;
use crate::research::driver::ResearchConfig;
use crate::research::personas::PersonaConfig;
use crate::research::synthesizer::SynthesisConfig;
use crate::search::{CredibilityConfig, SearchConfig};
use crate::types::ResearchDepth;

/// Default configuration file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "deepdive.toml";

/// Root configuration structure loaded from deepdive.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeepdiveConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub research: ResearchConfig,

    #[serde(default)]
    pub budget: BudgetConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub synthesis: SynthesisConfig,

    /// Named personas, merged over the built-in table
    #[serde(default)]
    pub personas: HashMap<String, PersonaConfig>,

    #[serde(default)]
    pub credibility: CredibilityConfig,
}

// ============= Logging Configuration =============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

// ============= LLM Configuration =============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    #[default]
    Ollama,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default, rename = "type")]
    pub provider: LlmProviderKind,

    #[serde(default = "default_ollama_url")]
    pub base_url: String,

    /// Model id per tier
    #[serde(default)]
    pub models: TierModels,
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProviderKind::default(),
            base_url: default_ollama_url(),
            models: TierModels::default(),
        }
    }
}

impl LlmConfig {
    pub fn provider(&self) -> Provider {
        match self.provider {
            LlmProviderKind::Ollama => Provider::Ollama {
                base_url: self.base_url.clone(),
                models: self.models.clone(),
            },
        }
    }
}

// ============= Configuration Loading & Validation =============

/// Configuration warnings that don't prevent operation but may indicate issues
#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub kind: ConfigWarningKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigWarningKind {
    NoSearchProviders,
    EmptyPersona,
    SequentialOnly,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Errors that can occur during configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Watch error: {0}")]
    WatchError(#[from] notify::Error),
}

impl From<ConfigError> for crate::types::AppError {
    fn from(e: ConfigError) -> Self {
        crate::types::AppError::Configuration(e.to_string())
    }
}

fn check_unit(name: &str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::ValidationError(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )));
    }
    Ok(())
}

fn check_ratio(name: &str, value: f64) -> Result<(), ConfigError> {
    if !(value > 0.0 && value <= 1.0) {
        return Err(ConfigError::ValidationError(format!(
            "{} must be within (0, 1], got {}",
            name, value
        )));
    }
    Ok(())
}

fn check_positive(name: &str, value: f64) -> Result<(), ConfigError> {
    if !(value.is_finite() && value > 0.0) {
        return Err(ConfigError::ValidationError(format!(
            "{} must be a positive number of seconds, got {}",
            name, value
        )));
    }
    Ok(())
}

impl DeepdiveConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::FileNotFound(path)) => {
                info!("No configuration at {:?}, using defaults", path);
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Parse and validate TOML text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: DeepdiveConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate value ranges and cross-field ordering
    pub fn validate(&self) -> Result<(), ConfigError> {
        let research = &self.research;
        if research.max_concurrent_agents == 0 {
            return Err(ConfigError::ValidationError(
                "research.max_concurrent_agents must be at least 1".to_string(),
            ));
        }
        if research.inner_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "research.inner_concurrency must be at least 1".to_string(),
            ));
        }
        check_positive("research.default_time_budget_secs", research.default_time_budget_secs)?;
        check_unit("research.target_confidence", research.target_confidence)?;
        check_unit("research.emergency_confidence", research.emergency_confidence)?;
        check_unit("research.min_source_credibility", research.min_source_credibility)?;
        check_ratio("research.search_phase_ratio", research.search_phase_ratio)?;
        check_ratio("research.analysis_phase_ratio", research.analysis_phase_ratio)?;
        if research.emergency_floor_secs < 0.0 || research.search_phase_cap_secs < 0.0 {
            return Err(ConfigError::ValidationError(
                "research phase floors and caps must not be negative".to_string(),
            ));
        }
        if let SmoothingPolicy::RecencyWeighted { alpha } = research.smoothing {
            check_ratio("research.smoothing.alpha", alpha)?;
        }

        let smallest = ResearchDepth::Basic.profile().max_sources;
        if research.min_sources > smallest {
            return Err(ConfigError::ValidationError(format!(
                "research.min_sources ({}) exceeds the smallest depth's max sources ({})",
                research.min_sources, smallest
            )));
        }

        let budget = &self.budget;
        check_unit("budget.high_confidence", budget.high_confidence)?;
        if budget.fast_below_secs > budget.balanced_below_secs {
            return Err(ConfigError::ValidationError(
                "budget.fast_below_secs must not exceed budget.balanced_below_secs".to_string(),
            ));
        }
        if budget.fast.max_tokens > budget.balanced.max_tokens
            || budget.balanced.max_tokens > budget.deep.max_tokens
        {
            return Err(ConfigError::ValidationError(
                "budget tiers must be ordered fast <= balanced <= deep by max_tokens".to_string(),
            ));
        }
        for (name, tier) in [("fast", budget.fast), ("balanced", budget.balanced), ("deep", budget.deep)] {
            check_positive(&format!("budget.{}.timeout_secs", name), tier.timeout_secs)?;
        }

        check_positive("search.call_timeout_secs", self.search.call_timeout_secs)?;
        if self.search.results_per_query == 0 {
            return Err(ConfigError::ValidationError(
                "search.results_per_query must be at least 1".to_string(),
            ));
        }

        if url::Url::parse(&self.llm.base_url).is_err() {
            return Err(ConfigError::ValidationError(format!(
                "llm.base_url is not a valid URL: {}",
                self.llm.base_url
            )));
        }

        check_positive("synthesis.narrative_timeout_secs", self.synthesis.narrative_timeout_secs)?;
        check_unit("synthesis.citation_floor", self.synthesis.citation_floor)?;

        check_unit("credibility.default_score", self.credibility.default_score)?;
        for (domain, score) in &self.credibility.domains {
            check_unit(&format!("credibility.domains.{}", domain), *score)?;
        }

        Ok(())
    }

    /// Validate, then collect non-fatal warnings
    pub fn validate_with_warnings(&self) -> Result<Vec<ConfigWarning>, ConfigError> {
        self.validate()?;

        let mut warnings = Vec::new();
        if !self.search.providers.values().any(|p| p.enabled()) {
            warnings.push(ConfigWarning {
                kind: ConfigWarningKind::NoSearchProviders,
                message: "No search provider is enabled; every run will fail at planning".to_string(),
            });
        }

        let mut empty: Vec<&String> = self
            .personas
            .iter()
            .filter(|(_, p)| p.focus_areas.is_empty())
            .map(|(name, _)| name)
            .collect();
        empty.sort();
        for name in empty {
            warnings.push(ConfigWarning {
                kind: ConfigWarningKind::EmptyPersona,
                message: format!("Persona '{}' has no focus areas", name),
            });
        }

        if !self.research.parallel_enabled
            || self.research.default_time_budget_secs < self.research.parallel_min_budget_secs
        {
            warnings.push(ConfigWarning {
                kind: ConfigWarningKind::SequentialOnly,
                message: "Default runs will execute sequentially".to_string(),
            });
        }

        Ok(warnings)
    }
}

// ============= Hot Reloading Configuration Manager =============

/// Thread-safe configuration manager with hot reloading support
pub struct ConfigManager {
    config: Arc<ArcSwap<DeepdiveConfig>>,
    config_path: PathBuf,
    watcher: RwLock<Option<RecommendedWatcher>>,
}

impl ConfigManager {
    /// Create a new configuration manager and load the initial config.
    /// A missing file yields the defaults; the path is still watched.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        // Absolute path for reliable file watching
        let path = path.as_ref();
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(ConfigError::ReadError)?
                .join(path)
        };

        let config = DeepdiveConfig::load_or_default(&path)?;

        Ok(Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            config_path: path,
            watcher: RwLock::new(None),
        })
    }

    /// Create a config manager directly from a config (useful for testing).
    /// Reloads read from `deepdive.toml` in the working directory.
    pub fn from_config(config: DeepdiveConfig) -> Self {
        Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            config_path: PathBuf::from(DEFAULT_CONFIG_FILE),
            watcher: RwLock::new(None),
        }
    }

    /// Get the current configuration (lockless read)
    pub fn config(&self) -> Arc<DeepdiveConfig> {
        self.config.load_full()
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Reload the configuration from disk. On error the previous config stays.
    pub fn reload(&self) -> Result<(), ConfigError> {
        info!("Reloading configuration from {:?}", self.config_path);

        let new_config = DeepdiveConfig::load(&self.config_path)?;
        self.config.store(Arc::new(new_config));

        info!("Configuration reloaded successfully");
        Ok(())
    }

    /// Start watching the config file for changes. Requires a Tokio runtime.
    pub fn start_watching(&self) -> Result<(), ConfigError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let file_name = self.config_path.file_name().map(|n| n.to_os_string());

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
            Ok(event) => {
                let touches_config = match &file_name {
                    Some(name) => event.paths.iter().any(|p| p.file_name() == Some(name.as_os_str())),
                    None => true,
                };
                if touches_config && (event.kind.is_modify() || event.kind.is_create()) {
                    let _ = tx.send(());
                }
            }
            Err(e) => {
                error!("Config watcher error: {:?}", e);
            }
        })?;

        if let Some(parent) = self.config_path.parent() {
            watcher.watch(parent, RecursiveMode::NonRecursive)?;
        }
        *self.watcher.write() = Some(watcher);

        let config_path = self.config_path.clone();
        let config_arc = Arc::clone(&self.config);
        tokio::spawn(async move {
            let debounce = Duration::from_millis(500);
            let mut last_reload: Option<tokio::time::Instant> = None;

            while rx.recv().await.is_some() {
                if last_reload.is_some_and(|t| t.elapsed() < debounce) {
                    continue;
                }

                // Let the writer finish
                tokio::time::sleep(Duration::from_millis(100)).await;

                match DeepdiveConfig::load(&config_path) {
                    Ok(new_config) => {
                        config_arc.store(Arc::new(new_config));
                        info!("Configuration hot-reloaded successfully");
                        last_reload = Some(tokio::time::Instant::now());
                    }
                    Err(e) => {
                        warn!("Failed to hot-reload config: {}. Keeping previous config.", e);
                    }
                }
            }
        });

        info!("Configuration hot-reload watcher started");
        Ok(())
    }

    /// Stop watching for configuration changes
    pub fn stop_watching(&self) {
        *self.watcher.write() = None;
        info!("Configuration hot-reload watcher stopped");
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.read().is_some()
    }
}

impl Clone for ConfigManager {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            config_path: self.config_path.clone(),
            watcher: RwLock::new(None), // Watcher is not cloned
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ModelTier;
    use crate::search::SearchProviderConfig;

    fn create_test_config() -> String {
        r#"
[logging]
level = "debug"
format = "json"

[research]
max_concurrent_agents = 2
default_depth = "comprehensive"
target_confidence = 0.7
smoothing = { type = "recency_weighted", alpha = 0.4 }

[budget]
fast_below_secs = 10.0

[budget.deep]
max_tokens = 4096
timeout_secs = 60.0

[search]
call_timeout_secs = 5.0

[search.providers.duckduckgo]
type = "duckduckgo"
enabled = true

[llm]
type = "ollama"
base_url = "http://gpu-box:11434"

[llm.models]
deep = "qwen2.5:14b"

[synthesis]
narrative_tier = "deep"

[personas.income_seeker]
description = "Dividend focus"
focus_areas = ["dividend", "cash flow"]

[credibility]
default_score = 0.45

[credibility.domains]
"example.com" = 0.8
"#
        .to_string()
    }

    #[test]
    fn test_parse_config() {
        let config = DeepdiveConfig::parse(&create_test_config()).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.research.max_concurrent_agents, 2);
        assert_eq!(config.research.default_depth, ResearchDepth::Comprehensive);
        assert_eq!(
            config.research.smoothing,
            SmoothingPolicy::RecencyWeighted { alpha: 0.4 }
        );
        assert_eq!(config.budget.deep.max_tokens, 4096);
        assert_eq!(config.budget.balanced_below_secs, 45.0);
        assert_eq!(config.llm.models.deep, "qwen2.5:14b");
        assert_eq!(config.llm.models.fast, "llama3.2:1b");
        assert_eq!(config.synthesis.narrative_tier, ModelTier::Deep);
        assert_eq!(config.personas["income_seeker"].focus_areas.len(), 2);
        assert_eq!(config.credibility.domains["example.com"], 0.8);
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = DeepdiveConfig::parse("").unwrap();
        assert_eq!(config, DeepdiveConfig::default());
        assert_eq!(config.research.max_concurrent_agents, 4);
        assert_eq!(config.research.emergency_confidence, 0.3);
        assert_eq!(config.search.results_per_query, 8);
        assert!(matches!(
            config.search.providers.get("duckduckgo"),
            Some(SearchProviderConfig::Duckduckgo { enabled: true })
        ));
    }

    #[test]
    fn test_validation_rejects_zero_concurrency() {
        let result = DeepdiveConfig::parse("[research]\nmax_concurrent_agents = 0\n");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validation_rejects_out_of_range_confidence() {
        let result = DeepdiveConfig::parse("[research]\ntarget_confidence = 1.5\n");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validation_rejects_unordered_tiers() {
        let toml = "[budget.fast]\nmax_tokens = 4096\ntimeout_secs = 5.0\n";
        assert!(matches!(
            DeepdiveConfig::parse(toml),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validation_rejects_min_sources_above_depth() {
        let result = DeepdiveConfig::parse("[research]\nmin_sources = 11\n");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_bad_toml_is_parse_error() {
        assert!(matches!(
            DeepdiveConfig::parse("[research\n"),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_warnings() {
        let toml = r#"
[research]
parallel_enabled = false

[search.providers.duckduckgo]
type = "duckduckgo"
enabled = false

[personas.empty]
focus_areas = []
"#;
        let config = DeepdiveConfig::parse(toml).unwrap();
        let kinds: Vec<ConfigWarningKind> = config
            .validate_with_warnings()
            .unwrap()
            .into_iter()
            .map(|w| w.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                ConfigWarningKind::NoSearchProviders,
                ConfigWarningKind::EmptyPersona,
                ConfigWarningKind::SequentialOnly
            ]
        );
    }

    #[test]
    fn test_llm_provider_from_config() {
        let config = DeepdiveConfig::default();
        match config.llm.provider() {
            Provider::Ollama { base_url, models } => {
                assert_eq!(base_url, "http://localhost:11434");
                assert_eq!(models, TierModels::default());
            }
        }
    }

    #[test]
    fn test_config_manager_from_config() {
        let mut config = DeepdiveConfig::default();
        config.research.max_concurrent_agents = 7;
        let manager = ConfigManager::from_config(config);
        assert_eq!(manager.config().research.max_concurrent_agents, 7);
        assert!(!manager.is_watching());
    }
}
