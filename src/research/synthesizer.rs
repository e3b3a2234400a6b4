//! Result synthesis
//!
//! Merges task reports (parallel mode) or one flat source pool (sequential
//! mode) into a single [`SynthesisResult`]: deduplicated and capped findings,
//! a confidence-weighted aggregate sentiment, ranked citations and a
//! narrative. The narrative comes from the LLM under a timeout and falls back
//! to a template, so synthesis never blocks on it.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::llm::{invoke_with_timeout, CallOutcome, LLMClient, LLMRequest, ModelTier};
use crate::research::budget::{secs_to_duration, Deadline};
use crate::search::normalize_url;
use crate::types::{
    AggregateSentiment, Citation, ResearchTask, SentimentDirection, SentimentSignal, SourceRecord,
    SubagentReport, SynthesisResult, TaskStatus,
};

pub const MAX_INSIGHTS: usize = 10;
pub const MAX_RISKS: usize = 8;
pub const MAX_OPPORTUNITIES: usize = 8;
pub const MAX_CITATIONS: usize = 10;

/// |score| above which the aggregate sentiment leaves neutral
pub const SENTIMENT_THRESHOLD: f64 = 0.2;
/// Overall confidence when no task contributed credibility scores
pub const DEFAULT_CONFIDENCE: f64 = 0.5;
/// Credibility a source needs to enter sequential synthesis
pub const SEQUENTIAL_CREDIBILITY_FLOOR: f64 = 0.5;

/// `[synthesis]` settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Ceiling for the narrative call
    #[serde(default = "default_narrative_timeout_secs")]
    pub narrative_timeout_secs: f64,

    /// Sources under this credibility are not cited unless none qualify
    #[serde(default = "default_citation_floor")]
    pub citation_floor: f64,

    #[serde(default = "default_narrative_tier")]
    pub narrative_tier: ModelTier,

    #[serde(default = "default_narrative_max_tokens")]
    pub narrative_max_tokens: u32,
}

fn default_narrative_timeout_secs() -> f64 {
    20.0
}

fn default_citation_floor() -> f64 {
    0.4
}

fn default_narrative_tier() -> ModelTier {
    ModelTier::Balanced
}

fn default_narrative_max_tokens() -> u32 {
    600
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            narrative_timeout_secs: default_narrative_timeout_secs(),
            citation_floor: default_citation_floor(),
            narrative_tier: default_narrative_tier(),
            narrative_max_tokens: default_narrative_max_tokens(),
        }
    }
}

/// Drop repeats (trimmed, case-insensitive) keeping first-seen order, then cap.
pub fn dedup_preserving_order<I>(items: I, cap: usize) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty() && seen.insert(item.to_lowercase()))
        .take(cap)
        .collect()
}

/// Signed, confidence-weighted mean over `signals`.
///
/// Bullish counts +1, bearish -1, neutral 0. Scores beyond
/// ±[`SENTIMENT_THRESHOLD`] pick a direction, consensus is `1 - |score|` and
/// confidence is the mean input confidence.
pub fn aggregate_sentiment(signals: &[SentimentSignal]) -> AggregateSentiment {
    if signals.is_empty() {
        return AggregateSentiment {
            direction: SentimentDirection::Neutral,
            score: 0.0,
            confidence: 0.0,
            consensus: 1.0,
        };
    }

    let n = signals.len() as f64;
    let score = signals
        .iter()
        .map(|s| s.direction.sign() * s.confidence)
        .sum::<f64>()
        / n;
    let confidence = signals.iter().map(|s| s.confidence).sum::<f64>() / n;

    let direction = if score > SENTIMENT_THRESHOLD {
        SentimentDirection::Bullish
    } else if score < -SENTIMENT_THRESHOLD {
        SentimentDirection::Bearish
    } else {
        SentimentDirection::Neutral
    };

    AggregateSentiment {
        direction,
        score,
        confidence,
        consensus: 1.0 - score.abs(),
    }
}

/// First [`MAX_CITATIONS`] sources at or above `floor`, or the first ones
/// overall when none qualify, numbered from 1.
pub fn build_citations(sources: &[SourceRecord], floor: f64) -> Vec<Citation> {
    let qualified: Vec<&SourceRecord> = sources.iter().filter(|s| s.credibility >= floor).collect();
    let chosen: Vec<&SourceRecord> = if qualified.is_empty() {
        sources.iter().collect()
    } else {
        qualified
    };

    chosen
        .into_iter()
        .take(MAX_CITATIONS)
        .enumerate()
        .map(|(i, source)| Citation {
            id: i + 1,
            title: source.title.clone(),
            url: source.url.clone(),
            credibility: source.credibility,
            published_at: source.published_at,
        })
        .collect()
}

fn dedup_sources<'a, I>(sources: I) -> Vec<SourceRecord>
where
    I: IntoIterator<Item = &'a SourceRecord>,
{
    let mut seen = HashSet::new();
    sources
        .into_iter()
        .filter(|s| seen.insert(normalize_url(&s.url)))
        .cloned()
        .collect()
}

/// Findings pooled before the narrative is written.
struct Pooled {
    insights: Vec<String>,
    risks: Vec<String>,
    opportunities: Vec<String>,
    sentiment: AggregateSentiment,
    citations: Vec<Citation>,
    confidence: f64,
}

pub struct ResultSynthesizer {
    llm: Arc<dyn LLMClient>,
    config: SynthesisConfig,
}

impl ResultSynthesizer {
    pub fn new(llm: Arc<dyn LLMClient>, config: SynthesisConfig) -> Self {
        Self { llm, config }
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    /// Merge completed task reports. Failed and unfinished tasks contribute
    /// nothing.
    pub async fn synthesize_parallel(
        &self,
        topic: &str,
        tasks: &HashMap<String, ResearchTask>,
        deadline: &Deadline,
    ) -> SynthesisResult {
        let mut completed: Vec<&ResearchTask> = tasks
            .values()
            .filter(|t| t.status() == TaskStatus::Completed)
            .collect();
        completed.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        let reports: Vec<&SubagentReport> = completed.iter().filter_map(|t| t.result()).collect();

        let sources = dedup_sources(reports.iter().flat_map(|r| r.sources.iter()));
        let signals: Vec<SentimentSignal> = reports
            .iter()
            .filter(|r| !r.sources.is_empty())
            .map(|r| r.sentiment)
            .collect();

        let credibilities: Vec<f64> = reports
            .iter()
            .filter(|r| !r.sources.is_empty())
            .map(|r| r.avg_credibility)
            .collect();
        let confidence = if credibilities.is_empty() {
            DEFAULT_CONFIDENCE
        } else {
            credibilities.iter().sum::<f64>() / credibilities.len() as f64
        };

        let pooled = Pooled {
            insights: dedup_preserving_order(
                reports.iter().flat_map(|r| r.insights.iter().cloned()),
                MAX_INSIGHTS,
            ),
            risks: dedup_preserving_order(reports.iter().flat_map(|r| r.risks.iter().cloned()), MAX_RISKS),
            opportunities: dedup_preserving_order(
                reports.iter().flat_map(|r| r.opportunities.iter().cloned()),
                MAX_OPPORTUNITIES,
            ),
            sentiment: aggregate_sentiment(&signals),
            citations: build_citations(&sources, self.config.citation_floor),
            confidence,
        };

        tracing::info!(
            tasks = tasks.len(),
            completed = completed.len(),
            sources = sources.len(),
            confidence = pooled.confidence,
            "Synthesizing parallel results"
        );
        self.finish(topic, pooled, deadline).await
    }

    /// Synthesize one flat pool of already credibility-filtered sources.
    ///
    /// Confidence is the mean of a source-count factor, the mean credibility
    /// and a domain-diversity factor.
    pub async fn synthesize_sequential(
        &self,
        topic: &str,
        findings: &SubagentReport,
        deadline: &Deadline,
    ) -> SynthesisResult {
        let sources = dedup_sources(findings.sources.iter());
        let signals: Vec<SentimentSignal> = sources
            .iter()
            .map(|s| s.sentiment)
            .filter(|s| s.confidence > 0.0)
            .collect();

        let pooled = Pooled {
            insights: dedup_preserving_order(findings.insights.iter().cloned(), MAX_INSIGHTS),
            risks: dedup_preserving_order(findings.risks.iter().cloned(), MAX_RISKS),
            opportunities: dedup_preserving_order(findings.opportunities.iter().cloned(), MAX_OPPORTUNITIES),
            sentiment: aggregate_sentiment(&signals),
            citations: build_citations(&sources, self.config.citation_floor),
            confidence: sequential_confidence(&sources),
        };

        tracing::info!(
            sources = sources.len(),
            confidence = pooled.confidence,
            "Synthesizing sequential results"
        );
        self.finish(topic, pooled, deadline).await
    }

    async fn finish(&self, topic: &str, pooled: Pooled, deadline: &Deadline) -> SynthesisResult {
        let (narrative, narrative_fallback) = match self.narrate(topic, &pooled, deadline).await {
            Some(text) => (text, false),
            None => (template_narrative(topic, &pooled), true),
        };

        SynthesisResult {
            key_insights: pooled.insights,
            risk_assessment: pooled.risks,
            opportunities: pooled.opportunities,
            sentiment: pooled.sentiment,
            citations: pooled.citations,
            confidence_score: pooled.confidence,
            narrative,
            narrative_fallback,
        }
    }

    async fn narrate(&self, topic: &str, pooled: &Pooled, deadline: &Deadline) -> Option<String> {
        let timeout = secs_to_duration(self.config.narrative_timeout_secs).min(deadline.remaining());
        let request = LLMRequest {
            prompt: narrative_prompt(topic, pooled),
            system: Some(
                "You are a research editor. Write a concise, balanced summary in plain prose.".to_string(),
            ),
            model_tier: self.config.narrative_tier,
            max_tokens: self.config.narrative_max_tokens,
            temperature: 0.3,
            timeout,
        };

        match invoke_with_timeout(self.llm.as_ref(), &request).await {
            CallOutcome::Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            CallOutcome::Ok(_) => {
                tracing::warn!(topic = %topic, "Narrative was empty, using template");
                None
            }
            CallOutcome::TimedOut => {
                tracing::warn!(topic = %topic, timeout_ms = timeout.as_millis() as u64, "Narrative timed out, using template");
                None
            }
            CallOutcome::Failed(e) => {
                tracing::warn!(topic = %topic, error = %e, "Narrative generation failed, using template");
                None
            }
        }
    }
}

/// Mean of min(n/10, 1), mean credibility and min(domains/5, 1).
pub fn sequential_confidence(sources: &[SourceRecord]) -> f64 {
    if sources.is_empty() {
        return 0.0;
    }
    let count = (sources.len() as f64 / 10.0).min(1.0);
    let credibility = sources.iter().map(|s| s.credibility).sum::<f64>() / sources.len() as f64;
    let domains: HashSet<String> = sources.iter().filter_map(|s| s.domain()).collect();
    let diversity = (domains.len() as f64 / 5.0).min(1.0);
    (count + credibility + diversity) / 3.0
}

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return "- none".to_string();
    }
    items.iter().map(|i| format!("- {}", i)).collect::<Vec<_>>().join("\n")
}

fn narrative_prompt(topic: &str, pooled: &Pooled) -> String {
    format!(
        "Topic: {}\n\nKey insights:\n{}\n\nRisks:\n{}\n\nOpportunities:\n{}\n\n\
         Overall sentiment: {} (score {:.2}, consensus {:.2})\n\n\
         Write a short narrative summary of these findings.",
        topic,
        bullet_list(&pooled.insights),
        bullet_list(&pooled.risks),
        bullet_list(&pooled.opportunities),
        pooled.sentiment.direction,
        pooled.sentiment.score,
        pooled.sentiment.consensus,
    )
}

fn template_narrative(topic: &str, pooled: &Pooled) -> String {
    format!(
        "Research on {} found {} key insights, {} risks and {} opportunities across {} cited sources; \
         overall sentiment is {} with {:.0}% confidence.",
        topic,
        pooled.insights.len(),
        pooled.risks.len(),
        pooled.opportunities.len(),
        pooled.citations.len(),
        pooled.sentiment.direction,
        pooled.confidence * 100.0
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(direction: SentimentDirection, confidence: f64) -> SentimentSignal {
        SentimentSignal::new(direction, confidence)
    }

    fn source(url: &str, credibility: f64) -> SourceRecord {
        SourceRecord {
            url: url.to_string(),
            title: url.to_string(),
            content: String::new(),
            published_at: None,
            author: None,
            credibility,
            relevance: 0.5,
            sentiment: SentimentSignal::default(),
        }
    }

    #[test]
    fn test_mixed_sentiment_is_neutral() {
        let aggregate = aggregate_sentiment(&[
            signal(SentimentDirection::Bullish, 0.8),
            signal(SentimentDirection::Bearish, 0.4),
            signal(SentimentDirection::Neutral, 0.5),
        ]);
        assert!((aggregate.score - 0.4 / 3.0).abs() < 1e-9);
        assert_eq!(aggregate.direction, SentimentDirection::Neutral);
        assert!((aggregate.consensus - (1.0 - 0.4 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_strong_sentiment_picks_direction() {
        let bullish = aggregate_sentiment(&[signal(SentimentDirection::Bullish, 0.9)]);
        assert_eq!(bullish.direction, SentimentDirection::Bullish);
        let bearish = aggregate_sentiment(&[
            signal(SentimentDirection::Bearish, 0.9),
            signal(SentimentDirection::Bearish, 0.5),
        ]);
        assert_eq!(bearish.direction, SentimentDirection::Bearish);
    }

    #[test]
    fn test_empty_sentiment_is_neutral() {
        let aggregate = aggregate_sentiment(&[]);
        assert_eq!(aggregate.direction, SentimentDirection::Neutral);
        assert_eq!(aggregate.score, 0.0);
    }

    #[test]
    fn test_dedup_keeps_first_seen_order() {
        let items = vec!["b", "a", "b", "c", "a", "B "].into_iter().map(String::from);
        assert_eq!(dedup_preserving_order(items, 10), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_citations_fall_back_when_none_pass_floor() {
        let sources = vec![source("https://a.com/1", 0.1), source("https://b.com/2", 0.2)];
        let citations = build_citations(&sources, 0.4);
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].id, 1);
        assert_eq!(citations[1].id, 2);
    }

    #[test]
    fn test_citations_skip_sources_under_floor() {
        let sources = vec![
            source("https://a.com/1", 0.1),
            source("https://b.com/2", 0.9),
            source("https://c.com/3", 0.6),
        ];
        let urls: Vec<String> = build_citations(&sources, 0.4).into_iter().map(|c| c.url).collect();
        assert_eq!(urls, vec!["https://b.com/2", "https://c.com/3"]);
    }

    #[test]
    fn test_sequential_confidence_factors() {
        let sources: Vec<SourceRecord> = (0..10)
            .map(|i| source(&format!("https://site{}.com/a", i % 5), 0.8))
            .collect();
        assert!((sequential_confidence(&sources) - (1.0 + 0.8 + 1.0) / 3.0).abs() < 1e-9);

        let few = vec![source("https://a.com/1", 0.6), source("https://a.com/2", 0.6)];
        assert!((sequential_confidence(&few) - (0.2 + 0.6 + 0.2) / 3.0).abs() < 1e-9);
        assert_eq!(sequential_confidence(&[]), 0.0);
    }
}
