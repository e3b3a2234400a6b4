//! Specialised research subagents
//!
//! A subagent owns one [`ResearchTask`] end to end: it turns topic and focus
//! into a small set of queries, pools and prioritises the hits within a time
//! slice, then analyses the kept sources one by one while a private
//! [`ConfidenceTracker`] decides when enough evidence has been gathered.
//! When the per-source time is small the analysis runs as an ordered batch
//! with its own, smaller concurrency bound.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::llm::{invoke_with_timeout, CallOutcome, LLMClient, LLMRequest, ModelTier};
use crate::research::budget::{secs_to_duration, AdaptiveBudgetSelector, Deadline};
use crate::research::confidence::{ConfidenceThresholds, ConfidenceTracker, SmoothingPolicy};
use crate::research::synthesizer::{aggregate_sentiment, dedup_preserving_order};
use crate::search::{normalize_url, CredibilityScorer, SearchHub, SourceCandidate};
use crate::types::{
    clamp_unit, AppError, CallStats, ResearchTask, Result, SentimentDirection, SentimentSignal,
    SourceRecord, SubagentReport, TaskType,
};

/// One research capability per task type.
#[async_trait]
pub trait Subagent: Send + Sync {
    fn task_type(&self) -> TaskType;

    /// Run the task. Recoverable problems (failed searches, timed out or
    /// unparseable analyses) shape the report; only unrecoverable faults
    /// return `Err`, which fails the enclosing task.
    async fn execute(&self, task: &ResearchTask) -> Result<SubagentReport>;
}

/// External collaborators handed to every subagent.
#[derive(Clone)]
pub struct Capabilities {
    pub search: Arc<SearchHub>,
    pub llm: Arc<dyn LLMClient>,
    pub scorer: Arc<CredibilityScorer>,
    pub selector: Arc<AdaptiveBudgetSelector>,
}

/// Run-scoped knobs shared by the subagents of one run.
#[derive(Debug, Clone)]
pub struct SubagentSettings {
    /// Wall-clock limit for the whole task
    pub deadline: Deadline,
    /// Baseline complexity handed to the budget selector
    pub complexity: f64,
    pub queries_per_task: usize,
    pub results_per_query: usize,
    /// Thresholds for the per-task tracker; `max_sources` also caps kept sources
    pub thresholds: ConfidenceThresholds,
    pub smoothing: SmoothingPolicy,
    /// Inner bound for batched per-source analysis
    pub inner_concurrency: usize,
    /// Per-source seconds below which analysis is batched
    pub batch_threshold_secs: f64,
    pub min_source_credibility: f64,
    /// Share of the remaining task time spent searching
    pub search_share: f64,
}

impl Default for SubagentSettings {
    fn default() -> Self {
        Self {
            deadline: Deadline::from_secs(120.0),
            complexity: 0.5,
            queries_per_task: 2,
            results_per_query: 8,
            thresholds: ConfidenceThresholds::default(),
            smoothing: SmoothingPolicy::default(),
            inner_concurrency: 2,
            batch_threshold_secs: 6.0,
            min_source_credibility: 0.2,
            search_share: 0.25,
        }
    }
}

// ============= Queries =============

fn query_suffixes(task_type: TaskType) -> &'static [&'static str] {
    match task_type {
        TaskType::Fundamental => &[
            "earnings revenue results",
            "valuation financial statements",
            "profit margins guidance",
            "balance sheet cash flow",
        ],
        TaskType::Technical => &[
            "stock price trend",
            "technical analysis support resistance",
            "trading volume momentum",
            "moving average chart",
        ],
        TaskType::Sentiment => &[
            "latest news",
            "analyst ratings",
            "investor sentiment",
            "social media discussion",
        ],
        TaskType::Competitive => &[
            "competitors market share",
            "industry landscape",
            "competitive advantage moat",
            "peer comparison",
        ],
    }
}

/// Up to `limit` distinct queries: one per focus area first, then type
/// templates.
pub fn build_queries(task: &ResearchTask, limit: usize) -> Vec<String> {
    let topic = task.topic.trim();
    let candidates = task
        .focus_areas
        .iter()
        .map(|focus| format!("{} {}", topic, focus.trim()))
        .chain(
            query_suffixes(task.task_type)
                .iter()
                .map(|suffix| format!("{} {}", topic, suffix)),
        );

    let mut seen = HashSet::new();
    let mut queries = Vec::new();
    for query in candidates {
        if queries.len() >= limit {
            break;
        }
        if seen.insert(query.to_lowercase()) {
            queries.push(query);
        }
    }
    queries
}

// ============= Source prioritisation =============

/// A candidate with its credibility and relevance scores.
#[derive(Debug, Clone)]
pub struct ScoredSource {
    pub candidate: SourceCandidate,
    pub credibility: f64,
    pub relevance: f64,
}

impl ScoredSource {
    pub fn priority(&self) -> f64 {
        0.6 * self.credibility + 0.4 * self.relevance
    }
}

fn query_terms(topic: &str, focus_areas: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    std::iter::once(topic)
        .chain(focus_areas.iter().map(String::as_str))
        .flat_map(|text| text.split(|c: char| !c.is_alphanumeric()))
        .map(str::to_lowercase)
        .filter(|term| term.len() > 2 && seen.insert(term.clone()))
        .collect()
}

/// Provider rank blended with query-term overlap in title and snippet.
pub fn relevance(candidate: &SourceCandidate, terms: &[String]) -> f64 {
    let rank_score = 1.0 - (candidate.rank.min(10) as f64 / 10.0) * 0.5;
    let overlap = if terms.is_empty() {
        0.5
    } else {
        let text = format!("{} {}", candidate.title, candidate.snippet).to_lowercase();
        terms.iter().filter(|t| text.contains(t.as_str())).count() as f64 / terms.len() as f64
    };
    clamp_unit(0.5 * rank_score + 0.5 * overlap)
}

/// Score, drop sources under `min_credibility`, and keep the best `limit`.
pub fn prioritize(
    scorer: &CredibilityScorer,
    candidates: Vec<SourceCandidate>,
    topic: &str,
    focus_areas: &[String],
    min_credibility: f64,
    limit: usize,
) -> Vec<ScoredSource> {
    let terms = query_terms(topic, focus_areas);
    let mut scored: Vec<ScoredSource> = candidates
        .into_iter()
        .map(|candidate| {
            let credibility = scorer.score(&candidate.url, candidate.published_at);
            let relevance = relevance(&candidate, &terms);
            ScoredSource {
                candidate,
                credibility,
                relevance,
            }
        })
        .filter(|s| s.credibility >= min_credibility)
        .collect();

    scored.sort_by(|a, b| {
        b.priority()
            .partial_cmp(&a.priority())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(limit);
    scored
}

// ============= Analysis =============

/// Structured reading of one source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceAnalysis {
    pub insights: Vec<String>,
    pub risks: Vec<String>,
    pub opportunities: Vec<String>,
    pub sentiment: SentimentSignal,
    pub relevance: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAnalysis {
    insights: Vec<String>,
    risks: Vec<String>,
    opportunities: Vec<String>,
    sentiment: Option<RawSentiment>,
    relevance: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawSentiment {
    #[serde(default)]
    direction: String,
    #[serde(default)]
    confidence: f64,
}

fn clean(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse model output as JSON between the first `{` and the last `}`.
/// Returns `None` when no valid object is found.
pub fn parse_analysis(text: &str) -> Option<SourceAnalysis> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    let raw: RawAnalysis = serde_json::from_str(&text[start..=end]).ok()?;
    let sentiment = raw
        .sentiment
        .map(|s| SentimentSignal::new(SentimentDirection::parse_lenient(&s.direction), s.confidence))
        .unwrap_or_default();

    Some(SourceAnalysis {
        insights: clean(raw.insights),
        risks: clean(raw.risks),
        opportunities: clean(raw.opportunities),
        sentiment,
        relevance: raw.relevance.map(clamp_unit),
    })
}

fn system_prompt(task_type: TaskType) -> String {
    let role = match task_type {
        TaskType::Fundamental => "a fundamental equity analyst focused on financial health and valuation",
        TaskType::Technical => "a technical analyst focused on price action, trends and momentum",
        TaskType::Sentiment => "a market sentiment analyst focused on news flow and investor mood",
        TaskType::Competitive => "a strategy analyst focused on competitive positioning",
    };
    format!(
        "You are {}. Answer with a single JSON object only: \
         {{\"insights\": [..], \"risks\": [..], \"opportunities\": [..], \
         \"sentiment\": {{\"direction\": \"bullish|bearish|neutral\", \"confidence\": 0.0-1.0}}, \
         \"relevance\": 0.0-1.0}}",
        role
    )
}

fn analysis_prompt(topic: &str, candidate: &SourceCandidate) -> String {
    format!(
        "Topic: {}\nSource: {}\nURL: {}\n\n{}\n\nExtract the key insights, risks and opportunities for the topic.",
        topic, candidate.title, candidate.url, candidate.snippet
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Ok,
    TimedOut,
    Failed,
}

/// One source after its analysis call.
#[derive(Debug, Clone)]
pub struct AnalyzedSource {
    pub record: SourceRecord,
    /// `None` when the call failed or its output did not parse
    pub analysis: Option<SourceAnalysis>,
    pub tier: ModelTier,
    pub status: CallStatus,
}

/// Analyse one source with a profile chosen for the time left.
pub async fn analyze_source(
    caps: &Capabilities,
    task_type: TaskType,
    topic: &str,
    source: &ScoredSource,
    complexity: f64,
    current_confidence: f64,
    remaining: Duration,
) -> AnalyzedSource {
    let candidate = &source.candidate;
    let content_size = candidate.title.len() + candidate.snippet.len();
    let profile = caps.selector.select_profile(
        task_type,
        remaining.as_secs_f64(),
        complexity,
        content_size,
        current_confidence,
    );
    let request = LLMRequest::from_profile(analysis_prompt(topic, candidate), &profile)
        .with_system(system_prompt(task_type));

    let (analysis, status) = match invoke_with_timeout(caps.llm.as_ref(), &request).await {
        CallOutcome::Ok(text) => {
            let parsed = parse_analysis(&text);
            if parsed.is_none() {
                tracing::debug!(url = %candidate.url, "Analysis output did not parse");
            }
            (parsed, CallStatus::Ok)
        }
        CallOutcome::TimedOut => (None, CallStatus::TimedOut),
        CallOutcome::Failed(e) => {
            tracing::debug!(url = %candidate.url, error = %e, "Analysis call failed");
            (None, CallStatus::Failed)
        }
    };

    let mut record = SourceRecord {
        url: candidate.url.clone(),
        title: candidate.title.clone(),
        content: candidate.snippet.clone(),
        published_at: candidate.published_at,
        author: candidate.author.clone(),
        credibility: source.credibility,
        relevance: source.relevance,
        sentiment: SentimentSignal::default(),
    };
    if let Some(analysis) = &analysis {
        record.sentiment = analysis.sentiment;
        if let Some(relevance) = analysis.relevance {
            record.relevance = relevance;
        }
    }

    AnalyzedSource {
        record,
        analysis,
        tier: profile.model_tier,
        status,
    }
}

/// Settings for one analysis loop.
#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    pub task_type: TaskType,
    pub topic: String,
    pub complexity: f64,
    pub inner_concurrency: usize,
    pub batch_threshold_secs: f64,
}

/// Everything an analysis loop produced.
#[derive(Debug, Clone, Default)]
pub struct AnalysisRun {
    pub records: Vec<SourceRecord>,
    pub insights: Vec<String>,
    pub risks: Vec<String>,
    pub opportunities: Vec<String>,
    pub sentiments: Vec<SentimentSignal>,
    pub calls: CallStats,
    pub early_terminated: bool,
    pub termination_reason: Option<String>,
    pub batched: bool,
}

impl AnalysisRun {
    /// Fold one analysed source in. Returns true when the tracker says stop.
    fn absorb(&mut self, analyzed: AnalyzedSource, tracker: &mut ConfidenceTracker) -> bool {
        match analyzed.status {
            CallStatus::Ok => self.calls.ok += 1,
            CallStatus::TimedOut => self.calls.timed_out += 1,
            CallStatus::Failed => self.calls.failed += 1,
        }
        match analyzed.tier {
            ModelTier::Fast => self.calls.fast_profiles += 1,
            ModelTier::Balanced => self.calls.balanced_profiles += 1,
            ModelTier::Deep => self.calls.deep_profiles += 1,
        }

        let AnalyzedSource { record, analysis, .. } = analyzed;
        let mut stop = false;
        if let Some(analysis) = analysis {
            let decision = tracker.update(&analysis.sentiment, record.credibility);
            self.termination_reason = Some(decision.reason.to_string());
            stop = !decision.should_continue;
            self.insights.extend(analysis.insights);
            self.risks.extend(analysis.risks);
            self.opportunities.extend(analysis.opportunities);
            self.sentiments.push(analysis.sentiment);
        }
        self.records.push(record);
        stop
    }

    pub fn avg_credibility(&self) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        self.records.iter().map(|r| r.credibility).sum::<f64>() / self.records.len() as f64
    }

    /// Shape the loop output into a task report.
    pub fn into_report(self, confidence: f64, queries_issued: usize, sources_considered: usize) -> SubagentReport {
        let avg_credibility = self.avg_credibility();
        let sentiment = if self.sentiments.is_empty() {
            SentimentSignal::default()
        } else {
            let aggregate = aggregate_sentiment(&self.sentiments);
            SentimentSignal::new(aggregate.direction, aggregate.confidence)
        };
        SubagentReport {
            insights: dedup_preserving_order(self.insights, usize::MAX),
            risks: dedup_preserving_order(self.risks, usize::MAX),
            opportunities: dedup_preserving_order(self.opportunities, usize::MAX),
            sources: self.records,
            sentiment,
            avg_credibility,
            confidence,
            early_terminated: self.early_terminated,
            termination_reason: self.termination_reason,
            queries_issued,
            sources_considered,
            calls: self.calls,
            batched: self.batched,
        }
    }
}

/// Running confidence readable from inside the batch stream.
struct SharedConfidence(AtomicU64);

impl SharedConfidence {
    fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn set(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Analyse `sources` in priority order, feeding each parsed result to
/// `tracker` until it says stop or the deadline passes.
///
/// When the time per source falls below `batch_threshold_secs` and the inner
/// bound allows it, up to `inner_concurrency` analyses run at once; results
/// are still consumed in order, so the stop decision is the same one a
/// sequential pass would reach.
pub async fn analyze_sources(
    caps: &Capabilities,
    settings: &AnalysisSettings,
    sources: Vec<ScoredSource>,
    tracker: &mut ConfidenceTracker,
    deadline: Deadline,
) -> AnalysisRun {
    let mut run = AnalysisRun::default();
    let total = sources.len();
    if total == 0 {
        return run;
    }

    let per_source_secs = deadline.remaining_secs() / total as f64;
    let batched = settings.inner_concurrency > 1 && per_source_secs < settings.batch_threshold_secs;
    run.batched = batched;
    let mut processed = 0;

    if batched {
        let shared = Arc::new(SharedConfidence::new(tracker.confidence()));
        let reader = Arc::clone(&shared);
        let caps_owned = caps.clone();
        let task_type = settings.task_type;
        let topic = settings.topic.clone();
        let complexity = settings.complexity;

        let mut analyses = stream::iter(sources)
            .map(move |source| {
                let caps = caps_owned.clone();
                let topic = topic.clone();
                let confidence = reader.get();
                let remaining = deadline.remaining();
                async move {
                    analyze_source(&caps, task_type, &topic, &source, complexity, confidence, remaining).await
                }
            })
            .buffered(settings.inner_concurrency);

        while let Some(analyzed) = analyses.next().await {
            processed += 1;
            let stop = run.absorb(analyzed, tracker);
            shared.set(tracker.confidence());
            if stop || deadline.is_expired() {
                break;
            }
        }
    } else {
        for source in &sources {
            if deadline.is_expired() {
                break;
            }
            let analyzed = analyze_source(
                caps,
                settings.task_type,
                &settings.topic,
                source,
                settings.complexity,
                tracker.confidence(),
                deadline.remaining(),
            )
            .await;
            processed += 1;
            if run.absorb(analyzed, tracker) {
                break;
            }
        }
    }

    run.early_terminated = tracker.is_stopped() && processed < total;
    if processed < total && !tracker.is_stopped() {
        run.termination_reason = Some("time_budget_exhausted".to_string());
    }
    run
}

// ============= Subagents =============

/// Search, prioritise, analyse for one task type.
pub struct SpecializedSubagent {
    task_type: TaskType,
    caps: Capabilities,
    settings: SubagentSettings,
}

impl SpecializedSubagent {
    pub fn new(task_type: TaskType, caps: Capabilities, settings: SubagentSettings) -> Self {
        Self {
            task_type,
            caps,
            settings,
        }
    }

    async fn gather(&self, task: &ResearchTask) -> (Vec<SourceCandidate>, usize) {
        let deadline = self.settings.deadline;
        let slice = deadline.child(secs_to_duration(
            deadline.remaining_secs() * clamp_unit(self.settings.search_share),
        ));

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        let mut issued = 0;
        for query in build_queries(task, self.settings.queries_per_task.max(1)) {
            if slice.is_expired() {
                tracing::debug!(task_id = %task.id, "Search slice spent, skipping remaining queries");
                break;
            }
            let outcome = self
                .caps
                .search
                .search(&query, self.settings.results_per_query, slice.remaining())
                .await;
            issued += 1;
            for candidate in outcome.candidates {
                if seen.insert(normalize_url(&candidate.url)) {
                    candidates.push(candidate);
                }
            }
        }
        (candidates, issued)
    }
}

#[async_trait]
impl Subagent for SpecializedSubagent {
    fn task_type(&self) -> TaskType {
        self.task_type
    }

    async fn execute(&self, task: &ResearchTask) -> Result<SubagentReport> {
        if task.topic.trim().is_empty() {
            return Err(AppError::InvalidInput(format!("Task '{}' has an empty topic", task.id)));
        }
        if task.task_type != self.task_type {
            return Err(AppError::TaskFailure(format!(
                "{} subagent cannot run {} task '{}'",
                self.task_type, task.task_type, task.id
            )));
        }

        tracing::info!(task_id = %task.id, task_type = %task.task_type, "Subagent started");

        let (candidates, queries_issued) = self.gather(task).await;
        let sources_considered = candidates.len();
        let kept = prioritize(
            &self.caps.scorer,
            candidates,
            &task.topic,
            &task.focus_areas,
            self.settings.min_source_credibility,
            self.settings.thresholds.max_sources,
        );

        let mut tracker = ConfidenceTracker::new(self.settings.thresholds, self.settings.smoothing);
        let analysis = AnalysisSettings {
            task_type: self.task_type,
            topic: task.topic.clone(),
            complexity: self.settings.complexity,
            inner_concurrency: self.settings.inner_concurrency,
            batch_threshold_secs: self.settings.batch_threshold_secs,
        };
        let run = analyze_sources(&self.caps, &analysis, kept, &mut tracker, self.settings.deadline).await;

        let report = run.into_report(tracker.confidence(), queries_issued, sources_considered);
        tracing::info!(
            task_id = %task.id,
            task_type = %task.task_type,
            queries = report.queries_issued,
            sources = report.sources.len(),
            confidence = report.confidence,
            early_terminated = report.early_terminated,
            "Subagent finished"
        );
        Ok(report)
    }
}

/// Task type -> subagent lookup.
#[derive(Clone, Default)]
pub struct SubagentRegistry {
    agents: HashMap<TaskType, Arc<dyn Subagent>>,
}

impl SubagentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One [`SpecializedSubagent`] per task type sharing `caps` and `settings`.
    pub fn standard(caps: Capabilities, settings: SubagentSettings) -> Self {
        let mut registry = Self::new();
        for task_type in TaskType::ALL {
            registry.register(Arc::new(SpecializedSubagent::new(
                task_type,
                caps.clone(),
                settings.clone(),
            )));
        }
        registry
    }

    /// Register (or replace) the subagent for its task type.
    pub fn register(&mut self, agent: Arc<dyn Subagent>) {
        self.agents.insert(agent.task_type(), agent);
    }

    pub fn with_override(mut self, agent: Arc<dyn Subagent>) -> Self {
        self.register(agent);
        self
    }

    pub fn get(&self, task_type: TaskType) -> Option<Arc<dyn Subagent>> {
        self.agents.get(&task_type).cloned()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
