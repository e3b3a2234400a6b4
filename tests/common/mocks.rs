//! Mock collaborators for testing.
//!
//! Fake LLM clients, search providers, subagents and coordinators shared by
//! the integration tests so no test needs a network or a model server.

#![allow(dead_code)]

use async_trait::async_trait;
use deepdive::llm::{LLMClient, LLMRequest, ModelTier};
use deepdive::research::{SubagentRegistry, Subagent, TaskCoordinator};
use deepdive::search::{ProviderError, SearchHub, SearchProvider, SourceCandidate};
use deepdive::types::{
    AppError, Result, ResearchTask, SentimentDirection, SentimentSignal, SourceRecord, SubagentReport,
    TaskType,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Analysis JSON returned for every source by default.
pub const BULLISH_ANALYSIS: &str = r#"{
    "insights": ["Revenue grew 12% year over year"],
    "risks": ["Customer concentration"],
    "opportunities": ["Expansion into Asia"],
    "sentiment": {"direction": "bullish", "confidence": 0.9},
    "relevance": 0.9
}"#;

pub const NARRATIVE: &str = "Acme Corp shows steady growth with manageable risks.";

/// Mock LLM client with a call counter and peak in-flight tracking.
///
/// Requests whose system prompt asks for JSON get the analysis payload;
/// everything else gets the narrative.
pub struct MockLLMClient {
    analysis: String,
    narrative: String,
    should_fail: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockLLMClient {
    pub fn new() -> Self {
        Self::with_analysis(BULLISH_ANALYSIS)
    }

    pub fn with_analysis(analysis: &str) -> Self {
        Self {
            analysis: analysis.to_string(),
            narrative: NARRATIVE.to_string(),
            should_fail: false,
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Every call returns an error.
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::new()
        }
    }

    /// Every call sleeps for `delay` first.
    pub fn slow(delay: Duration) -> Self {
        Self::new().delayed(delay)
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most calls ever running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for MockLLMClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLMClient for MockLLMClient {
    async fn invoke(&self, request: &LLMRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.should_fail {
            return Err(AppError::LLM("Mock LLM failure".to_string()));
        }
        let wants_json = request
            .system
            .as_deref()
            .is_some_and(|system| system.contains("JSON"));
        Ok(if wants_json {
            self.analysis.clone()
        } else {
            self.narrative.clone()
        })
    }

    fn model_for(&self, tier: ModelTier) -> &str {
        tier.as_str()
    }

    fn provider_name(&self) -> &str {
        "mock"
    }
}

/// Mock search provider returning a fixed list of hits for every query.
pub struct MockSearchProvider {
    hits: Vec<SourceCandidate>,
    should_fail: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockSearchProvider {
    /// One hit per URL, titled after the topic so relevance scoring has terms to match.
    pub fn new(urls: &[&str]) -> Self {
        let hits = urls
            .iter()
            .enumerate()
            .map(|(rank, url)| SourceCandidate {
                url: url.to_string(),
                title: format!("Acme Corp earnings report {}", rank + 1),
                snippet: "Acme Corp reported quarterly earnings and revenue growth.".to_string(),
                published_at: None,
                author: None,
                provider: "mock".to_string(),
                rank,
            })
            .collect();
        Self {
            hits,
            should_fail: false,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Five hits on well-known financial domains.
    pub fn financial() -> Self {
        Self::new(&[
            "https://www.reuters.com/markets/acme-earnings",
            "https://www.bloomberg.com/news/acme-quarter",
            "https://www.wsj.com/articles/acme-growth",
            "https://www.ft.com/content/acme-outlook",
            "https://www.cnbc.com/acme-guidance",
        ])
    }

    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::new(&[])
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::financial()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchProvider for MockSearchProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn search(
        &self,
        _query: &str,
        num_results: usize,
        _timeout: Option<Duration>,
    ) -> std::result::Result<Vec<SourceCandidate>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.should_fail {
            return Err(ProviderError::Unavailable("mock outage".to_string()));
        }
        Ok(self.hits.iter().take(num_results).cloned().collect())
    }
}

pub fn hub_with(provider: Arc<MockSearchProvider>) -> Arc<SearchHub> {
    Arc::new(SearchHub::new(Duration::from_secs(15)).with_provider(provider))
}

/// Subagent that always errors.
pub struct FailingSubagent(pub TaskType);

#[async_trait]
impl Subagent for FailingSubagent {
    fn task_type(&self) -> TaskType {
        self.0
    }

    async fn execute(&self, task: &ResearchTask) -> Result<SubagentReport> {
        Err(AppError::TaskFailure(format!("{} agent is down", task.task_type)))
    }
}

/// Subagent that panics mid-task.
pub struct PanickingSubagent(pub TaskType);

#[async_trait]
impl Subagent for PanickingSubagent {
    fn task_type(&self) -> TaskType {
        self.0
    }

    async fn execute(&self, _task: &ResearchTask) -> Result<SubagentReport> {
        panic!("subagent blew up");
    }
}

/// Subagent that sleeps, then returns a canned report while tracking how
/// many instances run at once.
pub struct SleepySubagent {
    pub task_type: TaskType,
    pub delay: Duration,
    pub report: SubagentReport,
    pub in_flight: Arc<AtomicUsize>,
    pub max_in_flight: Arc<AtomicUsize>,
}

impl SleepySubagent {
    pub fn new(task_type: TaskType, delay: Duration, report: SubagentReport) -> Self {
        Self {
            task_type,
            delay,
            report,
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Share in-flight counters with another instance.
    pub fn sharing(mut self, other: &SleepySubagent) -> Self {
        self.in_flight = Arc::clone(&other.in_flight);
        self.max_in_flight = Arc::clone(&other.max_in_flight);
        self
    }
}

#[async_trait]
impl Subagent for SleepySubagent {
    fn task_type(&self) -> TaskType {
        self.task_type
    }

    async fn execute(&self, _task: &ResearchTask) -> Result<SubagentReport> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(self.report.clone())
    }
}

/// Coordinator that always reports a fault of its own.
pub struct FaultyCoordinator;

#[async_trait]
impl TaskCoordinator for FaultyCoordinator {
    async fn execute(
        &self,
        _tasks: Vec<ResearchTask>,
        _max_concurrent: usize,
    ) -> Result<HashMap<String, ResearchTask>> {
        Err(AppError::Coordinator("worker pool unavailable".to_string()))
    }
}

pub fn registry_of(agents: Vec<Arc<dyn Subagent>>) -> Arc<SubagentRegistry> {
    let mut registry = SubagentRegistry::new();
    for agent in agents {
        registry.register(agent);
    }
    Arc::new(registry)
}

pub fn source(url: &str, credibility: f64, direction: SentimentDirection, confidence: f64) -> SourceRecord {
    SourceRecord {
        url: url.to_string(),
        title: format!("Source at {}", url),
        content: String::new(),
        published_at: None,
        author: None,
        credibility,
        relevance: 0.8,
        sentiment: SentimentSignal::new(direction, confidence),
    }
}

/// A report carrying the given sources, insights and task-level sentiment.
pub fn report(sources: Vec<SourceRecord>, insights: &[&str], sentiment: SentimentSignal) -> SubagentReport {
    let avg_credibility = if sources.is_empty() {
        0.0
    } else {
        sources.iter().map(|s| s.credibility).sum::<f64>() / sources.len() as f64
    };
    SubagentReport {
        insights: insights.iter().map(|s| s.to_string()).collect(),
        sources,
        sentiment,
        avg_credibility,
        ..Default::default()
    }
}
