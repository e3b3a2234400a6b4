//! Adaptive execution budgeting
//!
//! [`AdaptiveBudgetSelector`] picks the model tier, token ceiling,
//! temperature and timeout for the next analysis call from how much time is
//! left. [`PhaseAllocation`] splits a run budget across phases and
//! [`Deadline`] tracks wall-clock time against a budget.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

use crate::llm::ModelTier;
use crate::types::{clamp_unit, TaskType};

/// Cost/quality configuration for one analysis call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExecutionProfile {
    pub model_tier: ModelTier,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: f64,
}

impl ExecutionProfile {
    pub fn timeout(&self) -> Duration {
        secs_to_duration(self.timeout_secs)
    }
}

/// Seconds to a `Duration`, mapping NaN and negatives to zero and
/// saturating on overflow.
pub fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Token ceiling and timeout for one model tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierBudget {
    pub max_tokens: u32,
    pub timeout_secs: f64,
}

/// `[budget]` settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Below this many seconds left only the fast tier is allowed
    #[serde(default = "default_fast_below_secs")]
    pub fast_below_secs: f64,

    /// Below this many seconds left the deep tier is not allowed
    #[serde(default = "default_balanced_below_secs")]
    pub balanced_below_secs: f64,

    /// Confidence at which the selector steps down one tier
    #[serde(default = "default_high_confidence")]
    pub high_confidence: f64,

    /// Content longer than this (chars) asks for one tier more
    #[serde(default = "default_large_content_chars")]
    pub large_content_chars: usize,

    #[serde(default = "default_fast_tier")]
    pub fast: TierBudget,

    #[serde(default = "default_balanced_tier")]
    pub balanced: TierBudget,

    #[serde(default = "default_deep_tier")]
    pub deep: TierBudget,
}

fn default_fast_below_secs() -> f64 {
    15.0
}

fn default_balanced_below_secs() -> f64 {
    45.0
}

fn default_high_confidence() -> f64 {
    0.75
}

fn default_large_content_chars() -> usize {
    6000
}

fn default_fast_tier() -> TierBudget {
    TierBudget {
        max_tokens: 512,
        timeout_secs: 8.0,
    }
}

fn default_balanced_tier() -> TierBudget {
    TierBudget {
        max_tokens: 1024,
        timeout_secs: 20.0,
    }
}

fn default_deep_tier() -> TierBudget {
    TierBudget {
        max_tokens: 2048,
        timeout_secs: 45.0,
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            fast_below_secs: default_fast_below_secs(),
            balanced_below_secs: default_balanced_below_secs(),
            high_confidence: default_high_confidence(),
            large_content_chars: default_large_content_chars(),
            fast: default_fast_tier(),
            balanced: default_balanced_tier(),
            deep: default_deep_tier(),
        }
    }
}

impl BudgetConfig {
    pub fn tier(&self, tier: ModelTier) -> TierBudget {
        match tier {
            ModelTier::Fast => self.fast,
            ModelTier::Balanced => self.balanced,
            ModelTier::Deep => self.deep,
        }
    }
}

const MIN_TOKENS: u32 = 128;

/// Chooses an [`ExecutionProfile`] per analysis call.
#[derive(Debug, Clone, Default)]
pub struct AdaptiveBudgetSelector {
    config: BudgetConfig,
}

impl AdaptiveBudgetSelector {
    pub fn new(config: BudgetConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    /// Richest tier the remaining time can pay for.
    pub fn time_ceiling(&self, remaining_secs: f64) -> ModelTier {
        if remaining_secs.is_nan() || remaining_secs < self.config.fast_below_secs {
            ModelTier::Fast
        } else if remaining_secs < self.config.balanced_below_secs {
            ModelTier::Balanced
        } else {
            ModelTier::Deep
        }
    }

    /// Pick the profile for the next call.
    ///
    /// Complexity and content size push the tier up, high confidence pushes
    /// it down, and the result is capped by what the remaining time allows.
    /// The timeout never exceeds `remaining_secs`.
    pub fn select_profile(
        &self,
        task_type: TaskType,
        remaining_secs: f64,
        complexity: f64,
        content_size: usize,
        current_confidence: f64,
    ) -> ExecutionProfile {
        let remaining = if remaining_secs.is_nan() {
            0.0
        } else {
            remaining_secs.max(0.0)
        };
        let complexity = clamp_unit(complexity);
        let confidence = clamp_unit(current_confidence);

        let mut desired = if complexity >= 0.7 {
            ModelTier::Deep
        } else if complexity >= 0.4 {
            ModelTier::Balanced
        } else {
            ModelTier::Fast
        };
        if content_size > self.config.large_content_chars {
            desired = desired.richer();
        }
        if confidence >= self.config.high_confidence {
            desired = desired.cheaper();
        }

        let tier = desired.min(self.time_ceiling(remaining));
        let budget = self.config.tier(tier);

        let scaled = (budget.max_tokens as f64 * (1.0 - 0.5 * confidence)).round() as u32;
        let max_tokens = scaled.max(MIN_TOKENS.min(budget.max_tokens));

        let timeout_secs = budget.timeout_secs.max(0.0).min(remaining);

        let profile = ExecutionProfile {
            model_tier: tier,
            max_tokens,
            temperature: temperature_for(task_type),
            timeout_secs,
        };
        tracing::debug!(
            task_type = %task_type,
            remaining_secs = remaining,
            complexity,
            confidence,
            tier = %profile.model_tier,
            timeout_secs = profile.timeout_secs,
            "Selected execution profile"
        );
        profile
    }
}

/// Sampling temperature per task type; factual work runs colder.
pub fn temperature_for(task_type: TaskType) -> f32 {
    match task_type {
        TaskType::Fundamental => 0.1,
        TaskType::Technical => 0.2,
        TaskType::Sentiment => 0.3,
        TaskType::Competitive => 0.4,
    }
}

/// Time split of a sequential run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseAllocation {
    pub total_secs: f64,
    pub search_secs: f64,
    pub analysis_secs: f64,
    pub synthesis_secs: f64,
}

impl PhaseAllocation {
    /// Search gets `search_ratio` of the total up to `search_cap_secs`,
    /// analysis gets `analysis_ratio` of what is left, synthesis the rest.
    pub fn allocate(total_secs: f64, search_ratio: f64, search_cap_secs: f64, analysis_ratio: f64) -> Self {
        let total = if total_secs.is_nan() { 0.0 } else { total_secs.max(0.0) };
        let search = (total * clamp_unit(search_ratio)).min(search_cap_secs.max(0.0));
        let analysis = (total - search) * clamp_unit(analysis_ratio);
        let synthesis = (total - search - analysis).max(0.0);
        Self {
            total_secs: total,
            search_secs: search,
            analysis_secs: analysis,
            synthesis_secs: synthesis,
        }
    }

    pub fn allocated_secs(&self) -> f64 {
        self.search_secs + self.analysis_secs + self.synthesis_secs
    }
}

/// Wall-clock budget measured on the Tokio clock.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn new(budget: Duration) -> Self {
        Self {
            start: Instant::now(),
            budget,
        }
    }

    pub fn from_secs(secs: f64) -> Self {
        Self::new(secs_to_duration(secs))
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.elapsed())
    }

    pub fn remaining_secs(&self) -> f64 {
        self.remaining().as_secs_f64()
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// A deadline starting now that never outlives this one.
    pub fn child(&self, budget: Duration) -> Deadline {
        Deadline::new(budget.min(self.remaining()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn selector() -> AdaptiveBudgetSelector {
        AdaptiveBudgetSelector::default()
    }

    #[rstest]
    #[case(0.0)]
    #[case(0.5)]
    #[case(3.0)]
    #[case(14.9)]
    #[case(30.0)]
    #[case(44.0)]
    #[case(120.0)]
    #[case(10_000.0)]
    fn test_timeout_never_exceeds_remaining(#[case] remaining: f64) {
        for task_type in TaskType::ALL {
            for complexity in [0.0, 0.3, 0.5, 0.9, 1.0] {
                for confidence in [0.0, 0.5, 0.9] {
                    for size in [0, 1000, 50_000] {
                        let profile = selector().select_profile(task_type, remaining, complexity, size, confidence);
                        assert!(profile.timeout_secs <= remaining);
                        assert!(profile.timeout_secs >= 0.0);
                    }
                }
            }
        }
    }

    #[test]
    fn test_negative_and_nan_remaining_give_zero_timeout() {
        let s = selector();
        assert_eq!(s.select_profile(TaskType::Technical, -5.0, 0.5, 0, 0.0).timeout_secs, 0.0);
        assert_eq!(s.select_profile(TaskType::Technical, f64::NAN, 0.5, 0, 0.0).timeout_secs, 0.0);
    }

    #[test]
    fn test_less_time_is_never_richer() {
        let s = selector();
        let mut previous = ModelTier::Deep;
        for remaining in [300.0, 60.0, 44.0, 20.0, 14.0, 2.0] {
            let tier = s.select_profile(TaskType::Fundamental, remaining, 1.0, 10_000, 0.0).model_tier;
            assert!(tier <= previous);
            previous = tier;
        }
        assert_eq!(previous, ModelTier::Fast);
    }

    #[test]
    fn test_complexity_raises_tier_when_time_allows() {
        let s = selector();
        let low = s.select_profile(TaskType::Fundamental, 300.0, 0.2, 0, 0.0);
        let mid = s.select_profile(TaskType::Fundamental, 300.0, 0.5, 0, 0.0);
        let high = s.select_profile(TaskType::Fundamental, 300.0, 0.9, 0, 0.0);
        assert_eq!(low.model_tier, ModelTier::Fast);
        assert_eq!(mid.model_tier, ModelTier::Balanced);
        assert_eq!(high.model_tier, ModelTier::Deep);

        let capped = s.select_profile(TaskType::Fundamental, 20.0, 0.9, 0, 0.0);
        assert_eq!(capped.model_tier, ModelTier::Balanced);
    }

    #[test]
    fn test_high_confidence_is_cheaper() {
        let s = selector();
        let unsure = s.select_profile(TaskType::Sentiment, 300.0, 0.9, 0, 0.1);
        let sure = s.select_profile(TaskType::Sentiment, 300.0, 0.9, 0, 0.9);
        assert!(sure.model_tier < unsure.model_tier);
        assert!(sure.max_tokens < unsure.max_tokens);
    }

    #[test]
    fn test_large_content_asks_for_more() {
        let s = selector();
        let small = s.select_profile(TaskType::Competitive, 300.0, 0.2, 100, 0.0);
        let large = s.select_profile(TaskType::Competitive, 300.0, 0.2, 20_000, 0.0);
        assert_eq!(small.model_tier, ModelTier::Fast);
        assert_eq!(large.model_tier, ModelTier::Balanced);
    }

    #[test]
    fn test_temperature_by_task_type() {
        let s = selector();
        let fundamental = s.select_profile(TaskType::Fundamental, 60.0, 0.5, 0, 0.0);
        let competitive = s.select_profile(TaskType::Competitive, 60.0, 0.5, 0, 0.0);
        assert!(fundamental.temperature < competitive.temperature);
    }

    #[test]
    fn test_phase_allocation_fits_total() {
        let allocation = PhaseAllocation::allocate(120.0, 0.2, 60.0, 0.7);
        assert!((allocation.search_secs - 24.0).abs() < 1e-9);
        assert!((allocation.analysis_secs - 67.2).abs() < 1e-9);
        assert!(allocation.allocated_secs() <= 120.0 + 1e-9);

        let capped = PhaseAllocation::allocate(1000.0, 0.2, 60.0, 0.7);
        assert!((capped.search_secs - 60.0).abs() < 1e-9);
        assert!(capped.allocated_secs() <= 1000.0 + 1e-9);
    }

    #[test]
    fn test_secs_to_duration_edges() {
        assert_eq!(secs_to_duration(f64::NAN), Duration::ZERO);
        assert_eq!(secs_to_duration(-1.0), Duration::ZERO);
        assert_eq!(secs_to_duration(f64::INFINITY), Duration::MAX);
        assert_eq!(secs_to_duration(1.5), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_tracks_paused_clock() {
        let deadline = Deadline::from_secs(10.0);
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!((deadline.remaining_secs() - 6.0).abs() < 0.01);

        let child = deadline.child(Duration::from_secs(30));
        assert!(child.budget() <= Duration::from_secs(6));
        assert!(child.budget() > Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(7)).await;
        assert!(deadline.is_expired());
        assert!(child.is_expired());
    }
}
