//! Top-level research run state machine
//!
//! ```text
//! Planning -> Searching -> Analyzing -> Synthesizing -> Completed
//!     |           |
//!     v           v
//!   Failed   EmergencyPartial
//! ```
//!
//! Parallel mode fans the planned tasks out through a [`TaskCoordinator`];
//! searching and analysing happen inside each task. Sequential mode runs the
//! phases in strict order against a phase budget and bails out with an
//! emergency partial result when too little time is left after searching.
//! A coordinator fault falls back once to sequential mode.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::Instant;
use uuid::Uuid;

use crate::llm::LLMClient;
use crate::research::budget::{
    secs_to_duration, AdaptiveBudgetSelector, BudgetConfig, Deadline, PhaseAllocation,
};
use crate::research::confidence::{ConfidenceThresholds, ConfidenceTracker, SmoothingPolicy};
use crate::research::coordinator::{ConcurrencyCoordinator, TaskCoordinator};
use crate::research::personas::PersonaCatalog;
use crate::research::planner::TaskPlanner;
use crate::research::subagent::{
    analyze_sources, build_queries, prioritize, AnalysisSettings, Capabilities, Subagent,
    SubagentRegistry, SubagentSettings,
};
use crate::research::synthesizer::{
    build_citations, ResultSynthesizer, SynthesisConfig, SEQUENTIAL_CREDIBILITY_FLOOR,
};
use crate::search::{normalize_url, CredibilityConfig, CredibilityScorer, ProviderError, SearchHub};
use crate::types::{
    AppError, CallStats, Citation, DepthProfile, ResearchDepth, ResearchTask, Result, SourceRecord,
    SynthesisResult, TaskStatus, TaskType,
};
use crate::utils::toml_config::DeepdiveConfig;

// ============= Configuration =============

/// `[research]` settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Outer bound: subagents running at once
    #[serde(default = "default_max_concurrent_agents")]
    pub max_concurrent_agents: usize,

    /// Inner bound: analyses in flight within one task
    #[serde(default = "default_inner_concurrency")]
    pub inner_concurrency: usize,

    #[serde(default)]
    pub default_depth: ResearchDepth,

    #[serde(default = "default_time_budget_secs")]
    pub default_time_budget_secs: f64,

    #[serde(default = "default_target_confidence")]
    pub target_confidence: f64,

    #[serde(default = "default_min_sources")]
    pub min_sources: usize,

    #[serde(default)]
    pub smoothing: SmoothingPolicy,

    /// Seconds left after searching below which a run returns early
    #[serde(default = "default_emergency_floor_secs")]
    pub emergency_floor_secs: f64,

    #[serde(default = "default_emergency_confidence")]
    pub emergency_confidence: f64,

    #[serde(default = "default_search_phase_ratio")]
    pub search_phase_ratio: f64,

    #[serde(default = "default_search_phase_cap_secs")]
    pub search_phase_cap_secs: f64,

    #[serde(default = "default_analysis_phase_ratio")]
    pub analysis_phase_ratio: f64,

    #[serde(default = "default_true")]
    pub parallel_enabled: bool,

    /// Budgets shorter than this run sequentially
    #[serde(default = "default_parallel_min_budget_secs")]
    pub parallel_min_budget_secs: f64,

    #[serde(default = "default_batch_threshold_secs")]
    pub batch_threshold_secs: f64,

    #[serde(default = "default_min_source_credibility")]
    pub min_source_credibility: f64,
}

fn default_max_concurrent_agents() -> usize {
    4
}

fn default_inner_concurrency() -> usize {
    2
}

fn default_time_budget_secs() -> f64 {
    120.0
}

fn default_target_confidence() -> f64 {
    0.8
}

fn default_min_sources() -> usize {
    3
}

fn default_emergency_floor_secs() -> f64 {
    10.0
}

fn default_emergency_confidence() -> f64 {
    0.3
}

fn default_search_phase_ratio() -> f64 {
    0.2
}

fn default_search_phase_cap_secs() -> f64 {
    60.0
}

fn default_analysis_phase_ratio() -> f64 {
    0.7
}

fn default_true() -> bool {
    true
}

fn default_parallel_min_budget_secs() -> f64 {
    30.0
}

fn default_batch_threshold_secs() -> f64 {
    6.0
}

fn default_min_source_credibility() -> f64 {
    0.2
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_agents: default_max_concurrent_agents(),
            inner_concurrency: default_inner_concurrency(),
            default_depth: ResearchDepth::default(),
            default_time_budget_secs: default_time_budget_secs(),
            target_confidence: default_target_confidence(),
            min_sources: default_min_sources(),
            smoothing: SmoothingPolicy::default(),
            emergency_floor_secs: default_emergency_floor_secs(),
            emergency_confidence: default_emergency_confidence(),
            search_phase_ratio: default_search_phase_ratio(),
            search_phase_cap_secs: default_search_phase_cap_secs(),
            analysis_phase_ratio: default_analysis_phase_ratio(),
            parallel_enabled: true,
            parallel_min_budget_secs: default_parallel_min_budget_secs(),
            batch_threshold_secs: default_batch_threshold_secs(),
            min_source_credibility: default_min_source_credibility(),
        }
    }
}

// ============= Request / Result =============

/// Inbound research request. Unset fields fall back to `[research]` defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunRequest {
    pub topic: String,
    pub session_id: Option<String>,
    pub depth: Option<ResearchDepth>,
    pub focus_areas: Option<Vec<String>>,
    pub persona: Option<String>,
    pub timeframe: Option<String>,
    pub time_budget_secs: Option<f64>,
    pub target_confidence: Option<f64>,
}

impl RunRequest {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Default::default()
        }
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn depth(mut self, depth: ResearchDepth) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn focus<I, S>(mut self, areas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.focus_areas = Some(areas.into_iter().map(Into::into).collect());
        self
    }

    pub fn persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }

    pub fn timeframe(mut self, timeframe: impl Into<String>) -> Self {
        self.timeframe = Some(timeframe.into());
        self
    }

    pub fn time_budget(mut self, secs: f64) -> Self {
        self.time_budget_secs = Some(secs);
        self
    }

    pub fn target_confidence(mut self, confidence: f64) -> Self {
        self.target_confidence = Some(confidence);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Error,
    PartialSuccess,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Error => "error",
            RunStatus::PartialSuccess => "partial_success",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Parallel,
    Sequential,
    Emergency,
}

impl ExecutionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionMode::Parallel => "parallel",
            ExecutionMode::Sequential => "sequential",
            ExecutionMode::Emergency => "emergency",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Planning,
    Searching,
    Analyzing,
    Synthesizing,
    Completed,
    Failed,
    EmergencyPartial,
}

impl RunPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            RunPhase::Planning => "planning",
            RunPhase::Searching => "searching",
            RunPhase::Analyzing => "analyzing",
            RunPhase::Synthesizing => "synthesizing",
            RunPhase::Completed => "completed",
            RunPhase::Failed => "failed",
            RunPhase::EmergencyPartial => "emergency_partial",
        }
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseTiming {
    pub phase: RunPhase,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Findings {
    pub synthesis: Option<SynthesisResult>,
    pub confidence_score: f64,
    pub early_terminated: bool,
    pub termination_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationMetrics {
    pub tasks_planned: usize,
    pub tasks_completed: usize,
    pub tasks_failed: usize,
    pub early_terminations: usize,
    /// Tasks whose analysis ran as an ordered concurrent batch
    pub batched_tasks: usize,
    pub sources_found: usize,
    pub sources_analyzed: usize,
    pub calls: CallStats,
    pub coordinator_fallback: bool,
    pub max_concurrency: usize,
    pub allocation: PhaseAllocation,
    pub phase_timings: Vec<PhaseTiming>,
}

impl Default for OptimizationMetrics {
    fn default() -> Self {
        Self {
            tasks_planned: 0,
            tasks_completed: 0,
            tasks_failed: 0,
            early_terminations: 0,
            batched_tasks: 0,
            sources_found: 0,
            sources_analyzed: 0,
            calls: CallStats::default(),
            coordinator_fallback: false,
            max_concurrency: 0,
            allocation: PhaseAllocation::allocate(0.0, 0.0, 0.0, 0.0),
            phase_timings: Vec::new(),
        }
    }
}

/// Structured outcome of a run. Every run ends in one of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub status: RunStatus,
    pub mode: ExecutionMode,
    pub session_id: String,
    pub topic: String,
    pub depth: ResearchDepth,
    pub timeframe: Option<String>,
    /// Terminal state of the run
    pub phase: RunPhase,
    pub findings: Findings,
    pub sources_analyzed: usize,
    pub citations: Vec<Citation>,
    pub execution_time_ms: u64,
    pub optimization_metrics: OptimizationMetrics,
    pub error: Option<String>,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}

// ============= Run bookkeeping =============

/// What one execution path produced.
struct RunOutcome {
    status: RunStatus,
    mode: ExecutionMode,
    synthesis: Option<SynthesisResult>,
    citations: Vec<Citation>,
    confidence: f64,
    early_terminated: bool,
    termination_reason: Option<String>,
    sources_analyzed: usize,
    error: Option<String>,
}

impl RunOutcome {
    fn error(mode: ExecutionMode, message: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Error,
            mode,
            synthesis: None,
            citations: Vec::new(),
            confidence: 0.0,
            early_terminated: false,
            termination_reason: None,
            sources_analyzed: 0,
            error: Some(message.into()),
        }
    }
}

struct RunState {
    session_id: String,
    started: Instant,
    phase: RunPhase,
    phase_started: Instant,
    metrics: OptimizationMetrics,
}

impl RunState {
    fn new(session_id: String) -> Self {
        let now = Instant::now();
        Self {
            session_id,
            started: now,
            phase: RunPhase::Planning,
            phase_started: now,
            metrics: OptimizationMetrics::default(),
        }
    }

    fn enter(&mut self, next: RunPhase) {
        let now = Instant::now();
        self.metrics.phase_timings.push(PhaseTiming {
            phase: self.phase,
            elapsed_ms: now.duration_since(self.phase_started).as_millis() as u64,
        });
        tracing::info!(
            session_id = %self.session_id,
            from = %self.phase,
            phase = %next,
            elapsed_ms = now.duration_since(self.started).as_millis() as u64,
            "Research phase transition"
        );
        self.phase = next;
        self.phase_started = now;
    }
}

// ============= Driver =============

pub struct OrchestrationDriver {
    search: Arc<SearchHub>,
    llm: Arc<dyn LLMClient>,
    scorer: Arc<CredibilityScorer>,
    selector: Arc<AdaptiveBudgetSelector>,
    personas: PersonaCatalog,
    config: ResearchConfig,
    synthesis: SynthesisConfig,
    results_per_query: usize,
    overrides: Vec<Arc<dyn Subagent>>,
    coordinator: Option<Arc<dyn TaskCoordinator>>,
}

impl OrchestrationDriver {
    pub fn new(search: Arc<SearchHub>, llm: Arc<dyn LLMClient>) -> Self {
        Self {
            search,
            llm,
            scorer: Arc::new(CredibilityScorer::default()),
            selector: Arc::new(AdaptiveBudgetSelector::default()),
            personas: PersonaCatalog::builtin(),
            config: ResearchConfig::default(),
            synthesis: SynthesisConfig::default(),
            results_per_query: 8,
            overrides: Vec::new(),
            coordinator: None,
        }
    }

    /// Wire search, LLM and every tunable from a loaded configuration.
    pub fn from_config(config: &DeepdiveConfig) -> Result<Self> {
        let search = Arc::new(SearchHub::from_config(&config.search));
        let llm = config.llm.provider().create_client()?;
        Ok(Self::new(search, llm)
            .with_research_config(config.research.clone())
            .with_budget_config(config.budget.clone())
            .with_synthesis_config(config.synthesis.clone())
            .with_credibility_config(config.credibility.clone())
            .with_personas(PersonaCatalog::from_config(&config.personas))
            .with_results_per_query(config.search.results_per_query))
    }

    pub fn with_research_config(mut self, config: ResearchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_budget_config(mut self, config: BudgetConfig) -> Self {
        self.selector = Arc::new(AdaptiveBudgetSelector::new(config));
        self
    }

    pub fn with_synthesis_config(mut self, config: SynthesisConfig) -> Self {
        self.synthesis = config;
        self
    }

    pub fn with_credibility_config(mut self, config: CredibilityConfig) -> Self {
        self.scorer = Arc::new(CredibilityScorer::new(config));
        self
    }

    pub fn with_personas(mut self, personas: PersonaCatalog) -> Self {
        self.personas = personas;
        self
    }

    pub fn with_results_per_query(mut self, results: usize) -> Self {
        self.results_per_query = results.max(1);
        self
    }

    /// Replace the built-in subagent for the agent's task type.
    pub fn with_subagent(mut self, agent: Arc<dyn Subagent>) -> Self {
        self.overrides.push(agent);
        self
    }

    /// Replace the coordinator used in parallel mode.
    pub fn with_coordinator(mut self, coordinator: Arc<dyn TaskCoordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    pub fn personas(&self) -> &PersonaCatalog {
        &self.personas
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            search: Arc::clone(&self.search),
            llm: Arc::clone(&self.llm),
            scorer: Arc::clone(&self.scorer),
            selector: Arc::clone(&self.selector),
        }
    }

    fn synthesizer(&self) -> ResultSynthesizer {
        ResultSynthesizer::new(Arc::clone(&self.llm), self.synthesis.clone())
    }

    fn resolve_focus(&self, request: &RunRequest) -> Vec<String> {
        if let Some(areas) = request.focus_areas.as_ref().filter(|a| !a.is_empty()) {
            return areas.clone();
        }
        match request.persona.as_deref() {
            Some(name) => match self.personas.get(name) {
                Some(persona) => persona.focus_areas.clone(),
                None => {
                    tracing::warn!(persona = %name, "Unknown persona, continuing without focus areas");
                    Vec::new()
                }
            },
            None => Vec::new(),
        }
    }

    /// Run one research request. Never fails: every outcome, including
    /// invalid input and double failure, is reported in the [`RunResult`].
    pub async fn run_research(&self, request: RunRequest) -> RunResult {
        let session_id = request
            .session_id
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let depth = request.depth.unwrap_or(self.config.default_depth);
        let topic = request.topic.trim().to_string();

        tracing::info!(session_id = %session_id, topic = %topic, depth = %depth, "Research run started");

        let mut state = RunState::new(session_id.clone());
        let outcome = self.drive(&request, &topic, depth, &mut state).await;

        let final_phase = match (outcome.status, outcome.mode) {
            (RunStatus::Error, _) => RunPhase::Failed,
            (_, ExecutionMode::Emergency) => RunPhase::EmergencyPartial,
            _ => RunPhase::Completed,
        };
        state.enter(final_phase);

        let execution_time_ms = state.started.elapsed().as_millis() as u64;
        match outcome.status {
            RunStatus::Error => tracing::error!(
                session_id = %session_id,
                error = outcome.error.as_deref().unwrap_or("unknown"),
                elapsed_ms = execution_time_ms,
                "Research run failed"
            ),
            status => tracing::info!(
                session_id = %session_id,
                status = ?status,
                mode = ?outcome.mode,
                confidence = outcome.confidence,
                elapsed_ms = execution_time_ms,
                "Research run finished"
            ),
        }

        RunResult {
            status: outcome.status,
            mode: outcome.mode,
            session_id,
            topic,
            depth,
            timeframe: request.timeframe.clone(),
            phase: final_phase,
            findings: Findings {
                synthesis: outcome.synthesis,
                confidence_score: outcome.confidence,
                early_terminated: outcome.early_terminated,
                termination_reason: outcome.termination_reason,
            },
            sources_analyzed: outcome.sources_analyzed,
            citations: outcome.citations,
            execution_time_ms,
            optimization_metrics: state.metrics,
            error: outcome.error,
        }
    }

    async fn drive(
        &self,
        request: &RunRequest,
        topic: &str,
        depth: ResearchDepth,
        state: &mut RunState,
    ) -> RunOutcome {
        let budget_secs = request
            .time_budget_secs
            .unwrap_or(self.config.default_time_budget_secs);
        let target = request
            .target_confidence
            .unwrap_or(self.config.target_confidence);
        let parallel = self.config.parallel_enabled && budget_secs >= self.config.parallel_min_budget_secs;
        let planned_mode = if parallel {
            ExecutionMode::Parallel
        } else {
            ExecutionMode::Sequential
        };

        if topic.is_empty() {
            return RunOutcome::error(planned_mode, AppError::InvalidInput("topic must not be empty".into()).to_string());
        }
        if !budget_secs.is_finite() || budget_secs <= 0.0 {
            return RunOutcome::error(
                planned_mode,
                AppError::InvalidInput(format!("time budget must be positive, got {}", budget_secs)).to_string(),
            );
        }
        if !(0.0..=1.0).contains(&target) {
            return RunOutcome::error(
                planned_mode,
                AppError::InvalidInput(format!("target confidence must be within [0, 1], got {}", target))
                    .to_string(),
            );
        }
        if self.search.is_empty() {
            return RunOutcome::error(planned_mode, AppError::NoProvidersConfigured.to_string());
        }

        let deadline = Deadline::from_secs(budget_secs);
        let profile = depth.profile();
        let focus = self.resolve_focus(request);
        let mut tasks = TaskPlanner::generate_tasks(topic, &state.session_id, &focus);
        if let Some(timeframe) = request.timeframe.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            for task in &mut tasks {
                task.topic = format!("{} {}", task.topic, timeframe);
            }
        }

        let allocation = PhaseAllocation::allocate(
            budget_secs,
            self.config.search_phase_ratio,
            self.config.search_phase_cap_secs,
            self.config.analysis_phase_ratio,
        );
        state.metrics.tasks_planned = tasks.len();
        state.metrics.allocation = allocation;
        tracing::info!(
            session_id = %state.session_id,
            tasks = tasks.len(),
            mode = ?planned_mode,
            budget_secs,
            "Planned research tasks"
        );

        let plan = RunPlan {
            topic,
            profile,
            target,
            deadline,
            allocation,
        };

        if !parallel {
            return match self.run_sequential(&plan, &tasks, false, state).await {
                Ok(outcome) => outcome,
                Err(e) => RunOutcome::error(ExecutionMode::Sequential, e.to_string()),
            };
        }

        match self.run_parallel(&plan, tasks.clone(), state).await {
            Ok(outcome) => outcome,
            Err(fault) => {
                tracing::warn!(
                    session_id = %state.session_id,
                    error = %fault,
                    "Coordinator fault, falling back to sequential execution"
                );
                state.metrics.coordinator_fallback = true;
                match self.run_sequential(&plan, &tasks, true, state).await {
                    Ok(outcome) => outcome,
                    Err(second) => RunOutcome::error(
                        ExecutionMode::Sequential,
                        format!("{}; sequential fallback failed: {}", fault, second),
                    ),
                }
            }
        }
    }

    async fn run_parallel(
        &self,
        plan: &RunPlan<'_>,
        tasks: Vec<ResearchTask>,
        state: &mut RunState,
    ) -> Result<RunOutcome> {
        let task_count = tasks.len().max(1);
        let per_task_sources = plan
            .profile
            .max_sources
            .div_ceil(task_count)
            .max(self.config.min_sources);
        let queries_per_task = plan.profile.max_searches.div_ceil(2).max(1);
        let task_secs = (plan.deadline.remaining_secs() - plan.allocation.synthesis_secs).max(0.0);

        let settings = SubagentSettings {
            deadline: plan.deadline.child(secs_to_duration(task_secs)),
            complexity: plan.profile.analysis_depth.complexity(),
            queries_per_task,
            results_per_query: self.results_per_query,
            thresholds: ConfidenceThresholds {
                target: plan.target,
                min_sources: self.config.min_sources,
                max_sources: per_task_sources,
            },
            smoothing: self.config.smoothing,
            inner_concurrency: self.config.inner_concurrency.max(1),
            batch_threshold_secs: self.config.batch_threshold_secs,
            min_source_credibility: self.config.min_source_credibility,
            search_share: self.config.search_phase_ratio,
        };

        let coordinator: Arc<dyn TaskCoordinator> = match &self.coordinator {
            Some(coordinator) => Arc::clone(coordinator),
            None => {
                let mut registry = SubagentRegistry::standard(self.capabilities(), settings);
                for agent in &self.overrides {
                    registry.register(Arc::clone(agent));
                }
                Arc::new(ConcurrencyCoordinator::new(Arc::new(registry)))
            }
        };

        state.metrics.max_concurrency = self.config.max_concurrent_agents.min(tasks.len());
        state.enter(RunPhase::Searching);
        let results = coordinator
            .execute(tasks, self.config.max_concurrent_agents)
            .await?;

        let mut ordered: Vec<&ResearchTask> = results.values().collect();
        ordered.sort_by(|a, b| a.priority.cmp(&b.priority));

        let mut termination_reason = None;
        let mut sources_analyzed = 0;
        for task in &ordered {
            match task.status() {
                TaskStatus::Completed => state.metrics.tasks_completed += 1,
                TaskStatus::Failed => {
                    state.metrics.tasks_failed += 1;
                    tracing::warn!(
                        session_id = %state.session_id,
                        task_id = %task.id,
                        error = task.error().unwrap_or("unknown"),
                        "Task failed, excluded from synthesis"
                    );
                }
                TaskStatus::Pending | TaskStatus::Running => {}
            }
            if let Some(report) = task.result() {
                state.metrics.sources_found += report.sources_considered;
                sources_analyzed += report.sources.len();
                state.metrics.calls.merge(&report.calls);
                if report.batched {
                    state.metrics.batched_tasks += 1;
                }
                if report.early_terminated {
                    state.metrics.early_terminations += 1;
                    if termination_reason.is_none() {
                        termination_reason = report.termination_reason.clone();
                    }
                }
            }
        }
        state.metrics.sources_analyzed = sources_analyzed;

        state.enter(RunPhase::Synthesizing);
        let synthesis = self
            .synthesizer()
            .synthesize_parallel(plan.topic, &results, &plan.deadline)
            .await;

        let status = if state.metrics.tasks_completed == 0 || sources_analyzed == 0 {
            RunStatus::PartialSuccess
        } else {
            RunStatus::Success
        };

        Ok(RunOutcome {
            status,
            mode: ExecutionMode::Parallel,
            citations: synthesis.citations.clone(),
            confidence: synthesis.confidence_score,
            early_terminated: state.metrics.early_terminations > 0,
            termination_reason,
            sources_analyzed,
            synthesis: Some(synthesis),
            error: None,
        })
    }

    /// Strict phase order over one pooled source list. As a fallback, a total
    /// search outage is an error; as the primary mode it yields a partial
    /// result.
    async fn run_sequential(
        &self,
        plan: &RunPlan<'_>,
        tasks: &[ResearchTask],
        fallback: bool,
        state: &mut RunState,
    ) -> Result<RunOutcome> {
        let queries = sequential_queries(tasks, plan.profile.max_searches);
        let focus: Vec<String> = tasks
            .iter()
            .flat_map(|t| t.focus_areas.iter().cloned())
            .collect();

        state.enter(RunPhase::Searching);
        let search_deadline = plan.deadline.child(secs_to_duration(plan.allocation.search_secs));
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        let mut issued = 0;
        let mut outages = 0;
        for query in &queries {
            if search_deadline.is_expired() {
                tracing::debug!(session_id = %state.session_id, "Search phase budget spent");
                break;
            }
            let outcome = self
                .search
                .search(query, self.results_per_query, search_deadline.remaining())
                .await;
            issued += 1;
            if outcome.is_total_failure() {
                outages += 1;
            }
            for candidate in outcome.candidates {
                if seen.insert(normalize_url(&candidate.url)) {
                    candidates.push(candidate);
                }
            }
        }
        state.metrics.sources_found = candidates.len();

        if fallback && issued > 0 && outages == issued {
            return Err(AppError::Provider(ProviderError::Unavailable(
                "every search provider failed during sequential fallback".to_string(),
            )));
        }

        if plan.deadline.remaining_secs() < self.config.emergency_floor_secs {
            tracing::warn!(
                session_id = %state.session_id,
                remaining_secs = plan.deadline.remaining_secs(),
                sources = candidates.len(),
                "Time budget nearly spent after search, returning partial result"
            );
            let sources: Vec<SourceRecord> = prioritize(
                &self.scorer,
                candidates,
                plan.topic,
                &focus,
                0.0,
                plan.profile.max_sources,
            )
            .into_iter()
            .map(|s| SourceRecord {
                url: s.candidate.url,
                title: s.candidate.title,
                content: s.candidate.snippet,
                published_at: s.candidate.published_at,
                author: s.candidate.author,
                credibility: s.credibility,
                relevance: s.relevance,
                sentiment: Default::default(),
            })
            .collect();

            return Ok(RunOutcome {
                status: RunStatus::PartialSuccess,
                mode: ExecutionMode::Emergency,
                synthesis: None,
                citations: build_citations(&sources, self.synthesis.citation_floor),
                confidence: self.config.emergency_confidence,
                early_terminated: true,
                termination_reason: Some("emergency_time_budget".to_string()),
                sources_analyzed: 0,
                error: None,
            });
        }

        state.enter(RunPhase::Analyzing);
        let kept = prioritize(
            &self.scorer,
            candidates,
            plan.topic,
            &focus,
            SEQUENTIAL_CREDIBILITY_FLOOR,
            plan.profile.max_sources,
        );
        let analysis_deadline = plan.deadline.child(secs_to_duration(
            plan.deadline.remaining_secs() * self.config.analysis_phase_ratio,
        ));
        let mut tracker = ConfidenceTracker::new(
            ConfidenceThresholds {
                target: plan.target,
                min_sources: self.config.min_sources,
                max_sources: plan.profile.max_sources,
            },
            self.config.smoothing,
        );
        let settings = AnalysisSettings {
            task_type: TaskType::Fundamental,
            topic: plan.topic.to_string(),
            complexity: plan.profile.analysis_depth.complexity(),
            inner_concurrency: 1,
            batch_threshold_secs: 0.0,
        };
        let run = analyze_sources(&self.capabilities(), &settings, kept, &mut tracker, analysis_deadline).await;

        state.metrics.calls.merge(&run.calls);
        state.metrics.sources_analyzed = run.records.len();
        if run.early_terminated {
            state.metrics.early_terminations += 1;
        }
        let findings = run.into_report(tracker.confidence(), issued, state.metrics.sources_found);

        state.enter(RunPhase::Synthesizing);
        let synthesis = self
            .synthesizer()
            .synthesize_sequential(plan.topic, &findings, &plan.deadline)
            .await;

        let status = if findings.sources.is_empty() {
            RunStatus::PartialSuccess
        } else {
            RunStatus::Success
        };

        Ok(RunOutcome {
            status,
            mode: ExecutionMode::Sequential,
            citations: synthesis.citations.clone(),
            confidence: synthesis.confidence_score,
            early_terminated: findings.early_terminated,
            termination_reason: findings.termination_reason.clone(),
            sources_analyzed: findings.sources.len(),
            synthesis: Some(synthesis),
            error: None,
        })
    }
}

/// Fixed inputs of one run shared by both execution paths.
struct RunPlan<'a> {
    topic: &'a str,
    profile: DepthProfile,
    target: f64,
    deadline: Deadline,
    allocation: PhaseAllocation,
}

/// Queries for the sequential path, spread across tasks, at most `max_searches`.
fn sequential_queries(tasks: &[ResearchTask], max_searches: usize) -> Vec<String> {
    let per_task = max_searches.div_ceil(tasks.len().max(1)).max(1);
    let mut seen = HashSet::new();
    tasks
        .iter()
        .flat_map(|task| build_queries(task, per_task))
        .filter(|q| seen.insert(q.to_lowercase()))
        .take(max_searches.max(1))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_queries_spread_across_tasks() {
        let tasks = TaskPlanner::generate_tasks("Acme", "s", &[]);
        let queries = sequential_queries(&tasks, 4);
        assert_eq!(queries.len(), 4);
        assert!(queries.iter().all(|q| q.starts_with("Acme ")));
    }

    #[test]
    fn test_request_builder() {
        let request = RunRequest::new("Acme")
            .depth(ResearchDepth::Basic)
            .focus(["earnings"])
            .time_budget(60.0)
            .target_confidence(0.7);
        assert_eq!(request.depth, Some(ResearchDepth::Basic));
        assert_eq!(request.focus_areas, Some(vec!["earnings".to_string()]));
        assert_eq!(request.time_budget_secs, Some(60.0));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&RunStatus::PartialSuccess).unwrap();
        assert_eq!(json, "\"partial_success\"");
        assert_eq!(RunPhase::EmergencyPartial.to_string(), "emergency_partial");
    }
}
