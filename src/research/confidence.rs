//! Sequential-sampling confidence tracking
//!
//! A [`ConfidenceTracker`] is private to one task (or one sequential analysis
//! loop). Each analysed source contributes `sentiment confidence x credibility`
//! as evidence. Once the minimum number of sources has been seen the tracker
//! decides whether pulling more sources is still worth it. The decision flips
//! from continue to stop at most once and never flips back.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{clamp_unit, SentimentSignal};

/// How evidence is folded into the running confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SmoothingPolicy {
    /// Plain mean of all evidence seen
    #[default]
    Mean,
    /// Exponential moving average; `alpha` weights the newest source
    RecencyWeighted { alpha: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceThresholds {
    pub target: f64,
    pub min_sources: usize,
    pub max_sources: usize,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            target: 0.8,
            min_sources: 3,
            max_sources: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    MinSourcesNotReached,
    ConfidenceBelowTarget,
    MaxSourcesReached,
    TargetConfidenceReached,
}

impl TerminationReason {
    pub fn as_str(self) -> &'static str {
        match self {
            TerminationReason::MinSourcesNotReached => "min_sources_not_reached",
            TerminationReason::ConfidenceBelowTarget => "confidence_below_target",
            TerminationReason::MaxSourcesReached => "max_sources_reached",
            TerminationReason::TargetConfidenceReached => "target_confidence_reached",
        }
    }

    /// True for the reasons that end sampling.
    pub fn is_stop(self) -> bool {
        matches!(
            self,
            TerminationReason::MaxSourcesReached | TerminationReason::TargetConfidenceReached
        )
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceDecision {
    pub confidence: f64,
    pub should_continue: bool,
    pub reason: TerminationReason,
}

#[derive(Debug, Clone)]
pub struct ConfidenceTracker {
    thresholds: ConfidenceThresholds,
    policy: SmoothingPolicy,
    confidence: f64,
    evidence_sum: f64,
    sources_processed: usize,
    stopped: Option<TerminationReason>,
}

impl ConfidenceTracker {
    pub fn new(thresholds: ConfidenceThresholds, policy: SmoothingPolicy) -> Self {
        let thresholds = ConfidenceThresholds {
            target: clamp_unit(thresholds.target),
            min_sources: thresholds.min_sources,
            max_sources: thresholds.max_sources.max(thresholds.min_sources).max(1),
        };
        Self {
            thresholds,
            policy,
            confidence: 0.0,
            evidence_sum: 0.0,
            sources_processed: 0,
            stopped: None,
        }
    }

    pub fn thresholds(&self) -> ConfidenceThresholds {
        self.thresholds
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn sources_processed(&self) -> usize {
        self.sources_processed
    }

    pub fn stop_reason(&self) -> Option<TerminationReason> {
        self.stopped
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.is_some()
    }

    /// Fold one analysed source into the running estimate and decide whether
    /// the caller should keep pulling sources.
    pub fn update(&mut self, sentiment: &SentimentSignal, credibility: f64) -> ConfidenceDecision {
        let evidence = clamp_unit(sentiment.confidence) * clamp_unit(credibility);
        self.sources_processed += 1;
        self.evidence_sum += evidence;

        self.confidence = match self.policy {
            SmoothingPolicy::Mean => self.evidence_sum / self.sources_processed as f64,
            SmoothingPolicy::RecencyWeighted { alpha } => {
                if self.sources_processed == 1 {
                    evidence
                } else {
                    let alpha = clamp_unit(alpha);
                    alpha * evidence + (1.0 - alpha) * self.confidence
                }
            }
        };

        if let Some(reason) = self.stopped {
            return self.decision(false, reason);
        }

        if self.sources_processed < self.thresholds.min_sources {
            return self.decision(true, TerminationReason::MinSourcesNotReached);
        }

        let stop = if self.sources_processed >= self.thresholds.max_sources {
            Some(TerminationReason::MaxSourcesReached)
        } else if self.confidence >= self.thresholds.target {
            Some(TerminationReason::TargetConfidenceReached)
        } else {
            None
        };

        match stop {
            Some(reason) => {
                tracing::debug!(
                    reason = %reason,
                    confidence = self.confidence,
                    sources = self.sources_processed,
                    "Confidence tracker stopping"
                );
                self.stopped = Some(reason);
                self.decision(false, reason)
            }
            None => self.decision(true, TerminationReason::ConfidenceBelowTarget),
        }
    }

    fn decision(&self, should_continue: bool, reason: TerminationReason) -> ConfidenceDecision {
        ConfidenceDecision {
            confidence: self.confidence,
            should_continue,
            reason,
        }
    }
}
