use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::search::ProviderError;

// ============= Task Types =============

/// Kind of specialised research a subagent performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Fundamental,
    Technical,
    Sentiment,
    Competitive,
}

impl TaskType {
    /// All task types in priority order.
    pub const ALL: [TaskType; 4] = [
        TaskType::Fundamental,
        TaskType::Technical,
        TaskType::Sentiment,
        TaskType::Competitive,
    ];

    /// Fixed ordering index, 1 is scheduled first.
    pub fn priority(self) -> u8 {
        match self {
            TaskType::Fundamental => 1,
            TaskType::Technical => 2,
            TaskType::Sentiment => 3,
            TaskType::Competitive => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Fundamental => "fundamental",
            TaskType::Technical => "technical",
            TaskType::Sentiment => "sentiment",
            TaskType::Competitive => "competitive",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "fundamental" => Ok(Self::Fundamental),
            "technical" => Ok(Self::Technical),
            "sentiment" => Ok(Self::Sentiment),
            "competitive" => Ok(Self::Competitive),
            other => Err(AppError::InvalidInput(format!("Unknown task type: {}", other))),
        }
    }
}

/// Lifecycle of a [`ResearchTask`]. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
        )
    }
}

/// One unit of specialised research work.
///
/// Created by the planner in `Pending` state. Only the coordinator drives
/// it through `start`, `complete` and `fail`; once terminal it is read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchTask {
    pub id: String,
    pub task_type: TaskType,
    pub topic: String,
    pub focus_areas: Vec<String>,
    pub priority: u8,
    status: TaskStatus,
    pub created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    result: Option<SubagentReport>,
    error: Option<String>,
}

impl ResearchTask {
    pub fn new(
        id: impl Into<String>,
        task_type: TaskType,
        topic: impl Into<String>,
        focus_areas: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            task_type,
            topic: topic.into(),
            focus_areas,
            priority: task_type.priority(),
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn result(&self) -> Option<&SubagentReport> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Pending -> Running.
    pub fn start(&mut self) -> Result<()> {
        self.transition(TaskStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Running -> Completed, attaching the subagent report.
    pub fn complete(&mut self, report: SubagentReport) -> Result<()> {
        self.transition(TaskStatus::Completed)?;
        self.completed_at = Some(Utc::now());
        self.result = Some(report);
        Ok(())
    }

    /// Running -> Failed, recording the captured error.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<()> {
        self.transition(TaskStatus::Failed)?;
        self.completed_at = Some(Utc::now());
        self.error = Some(error.into());
        Ok(())
    }

    /// Duration between start and completion, if both are known.
    pub fn duration_ms(&self) -> Option<u64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds().max(0) as u64),
            _ => None,
        }
    }

    fn transition(&mut self, next: TaskStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::Internal(format!(
                "Task '{}' cannot move from {:?} to {:?}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }
}

// ============= Source Types =============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentDirection {
    Bullish,
    Bearish,
    #[default]
    Neutral,
}

impl SentimentDirection {
    /// Signed weight used when aggregating: bullish +1, bearish -1.
    pub fn sign(self) -> f64 {
        match self {
            SentimentDirection::Bullish => 1.0,
            SentimentDirection::Bearish => -1.0,
            SentimentDirection::Neutral => 0.0,
        }
    }

    /// Lenient parse used on model output; anything unrecognised is neutral.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "bullish" | "positive" => SentimentDirection::Bullish,
            "bearish" | "negative" => SentimentDirection::Bearish,
            _ => SentimentDirection::Neutral,
        }
    }
}

impl fmt::Display for SentimentDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SentimentDirection::Bullish => "bullish",
            SentimentDirection::Bearish => "bearish",
            SentimentDirection::Neutral => "neutral",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SentimentSignal {
    pub direction: SentimentDirection,
    /// Confidence in [0, 1]
    pub confidence: f64,
}

impl SentimentSignal {
    pub fn new(direction: SentimentDirection, confidence: f64) -> Self {
        Self {
            direction,
            confidence: clamp_unit(confidence),
        }
    }
}

/// An external document treated as evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    pub url: String,
    pub title: String,
    pub content: String,
    pub published_at: Option<DateTime<Utc>>,
    pub author: Option<String>,
    /// Trust estimate in [0, 1]
    pub credibility: f64,
    /// Relevance to the task in [0, 1]
    pub relevance: f64,
    pub sentiment: SentimentSignal,
}

impl SourceRecord {
    /// Host of the source URL without a leading `www.`.
    pub fn domain(&self) -> Option<String> {
        crate::search::credibility::domain_of(&self.url)
    }
}

/// Output of one subagent for one task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubagentReport {
    pub insights: Vec<String>,
    pub risks: Vec<String>,
    pub opportunities: Vec<String>,
    pub sources: Vec<SourceRecord>,
    pub sentiment: SentimentSignal,
    pub avg_credibility: f64,
    /// Running confidence when the subagent stopped pulling sources
    pub confidence: f64,
    pub early_terminated: bool,
    pub termination_reason: Option<String>,
    pub queries_issued: usize,
    pub sources_considered: usize,
    #[serde(default)]
    pub calls: CallStats,
    /// Sources were analysed as an ordered concurrent batch
    #[serde(default)]
    pub batched: bool,
}

impl SubagentReport {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty() && self.insights.is_empty()
    }
}

/// Counters for outbound analysis calls and the profiles chosen for them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallStats {
    pub ok: usize,
    pub timed_out: usize,
    pub failed: usize,
    pub fast_profiles: usize,
    pub balanced_profiles: usize,
    pub deep_profiles: usize,
}

impl CallStats {
    pub fn merge(&mut self, other: &CallStats) {
        self.ok += other.ok;
        self.timed_out += other.timed_out;
        self.failed += other.failed;
        self.fast_profiles += other.fast_profiles;
        self.balanced_profiles += other.balanced_profiles;
        self.deep_profiles += other.deep_profiles;
    }

    pub fn total(&self) -> usize {
        self.ok + self.timed_out + self.failed
    }
}

// ============= Synthesis Types =============

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregateSentiment {
    pub direction: SentimentDirection,
    pub score: f64,
    pub confidence: f64,
    pub consensus: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub id: usize,
    pub title: String,
    pub url: String,
    pub credibility: f64,
    pub published_at: Option<DateTime<Utc>>,
}

/// Final merged output of a research run. Built once by the synthesizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub key_insights: Vec<String>,
    pub risk_assessment: Vec<String>,
    pub opportunities: Vec<String>,
    pub sentiment: AggregateSentiment,
    pub citations: Vec<Citation>,
    pub confidence_score: f64,
    pub narrative: String,
    /// True when the narrative came from the template, not the model
    pub narrative_fallback: bool,
}

// ============= Research Depth =============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResearchDepth {
    Basic,
    #[default]
    Standard,
    Comprehensive,
    Exhaustive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisDepth {
    Shallow,
    Standard,
    Deep,
    Exhaustive,
}

impl AnalysisDepth {
    /// Baseline complexity handed to the budget selector.
    pub fn complexity(self) -> f64 {
        match self {
            AnalysisDepth::Shallow => 0.3,
            AnalysisDepth::Standard => 0.5,
            AnalysisDepth::Deep => 0.7,
            AnalysisDepth::Exhaustive => 0.9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthProfile {
    pub max_sources: usize,
    pub max_searches: usize,
    pub analysis_depth: AnalysisDepth,
}

impl ResearchDepth {
    pub fn profile(self) -> DepthProfile {
        match self {
            ResearchDepth::Basic => DepthProfile {
                max_sources: 10,
                max_searches: 2,
                analysis_depth: AnalysisDepth::Shallow,
            },
            ResearchDepth::Standard => DepthProfile {
                max_sources: 20,
                max_searches: 4,
                analysis_depth: AnalysisDepth::Standard,
            },
            ResearchDepth::Comprehensive => DepthProfile {
                max_sources: 35,
                max_searches: 6,
                analysis_depth: AnalysisDepth::Deep,
            },
            ResearchDepth::Exhaustive => DepthProfile {
                max_sources: 50,
                max_searches: 10,
                analysis_depth: AnalysisDepth::Exhaustive,
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResearchDepth::Basic => "basic",
            ResearchDepth::Standard => "standard",
            ResearchDepth::Comprehensive => "comprehensive",
            ResearchDepth::Exhaustive => "exhaustive",
        }
    }
}

impl fmt::Display for ResearchDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResearchDepth {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "standard" => Ok(Self::Standard),
            "comprehensive" => Ok(Self::Comprehensive),
            "exhaustive" => Ok(Self::Exhaustive),
            other => Err(AppError::InvalidInput(format!(
                "Unknown depth: {}. Use one of: basic, standard, comprehensive, exhaustive",
                other
            ))),
        }
    }
}

/// Clamp to [0, 1], mapping NaN to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

// ============= Error Types =============

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("LLM error: {0}")]
    LLM(String),

    #[error("Search provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("No search providers configured")]
    NoProvidersConfigured,

    #[error("Task failed: {0}")]
    TaskFailure(String),

    #[error("Coordinator fault: {0}")]
    Coordinator(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions_are_forward_only() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Running));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Completed));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Failed));
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Running));
        assert!(!TaskStatus::Failed.can_transition_to(TaskStatus::Completed));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Completed));
    }

    #[test]
    fn test_task_lifecycle_timestamps() {
        let mut task = ResearchTask::new("s-fundamental", TaskType::Fundamental, "Acme", vec![]);
        assert_eq!(task.status(), TaskStatus::Pending);

        task.start().unwrap();
        task.complete(SubagentReport::default()).unwrap();

        assert_eq!(task.status(), TaskStatus::Completed);
        let started = task.started_at().unwrap();
        let completed = task.completed_at().unwrap();
        assert!(started >= task.created_at);
        assert!(completed >= started);
        assert!(task.result().is_some());
    }

    #[test]
    fn test_terminal_task_rejects_further_transitions() {
        let mut task = ResearchTask::new("s-sentiment", TaskType::Sentiment, "Acme", vec![]);
        task.start().unwrap();
        task.fail("boom").unwrap();

        assert!(task.start().is_err());
        assert!(task.complete(SubagentReport::default()).is_err());
        assert_eq!(task.status(), TaskStatus::Failed);
        assert_eq!(task.error(), Some("boom"));
    }

    #[test]
    fn test_cannot_complete_without_starting() {
        let mut task = ResearchTask::new("s-technical", TaskType::Technical, "Acme", vec![]);
        assert!(task.complete(SubagentReport::default()).is_err());
        assert_eq!(task.status(), TaskStatus::Pending);
    }

    #[test]
    fn test_depth_parsing_and_profiles() {
        assert_eq!("Basic".parse::<ResearchDepth>().unwrap(), ResearchDepth::Basic);
        assert!("bogus".parse::<ResearchDepth>().is_err());

        let basic = ResearchDepth::Basic.profile();
        let exhaustive = ResearchDepth::Exhaustive.profile();
        assert!(basic.max_sources < exhaustive.max_sources);
        assert!(basic.max_searches < exhaustive.max_searches);
    }

    #[test]
    fn test_sentiment_direction_lenient_parse() {
        assert_eq!(SentimentDirection::parse_lenient("Bullish"), SentimentDirection::Bullish);
        assert_eq!(SentimentDirection::parse_lenient(" negative "), SentimentDirection::Bearish);
        assert_eq!(SentimentDirection::parse_lenient("mixed"), SentimentDirection::Neutral);
    }

    #[test]
    fn test_clamp_unit() {
        assert_eq!(clamp_unit(1.7), 1.0);
        assert_eq!(clamp_unit(-0.2), 0.0);
        assert_eq!(clamp_unit(f64::NAN), 0.0);
    }
}
