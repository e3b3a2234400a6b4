//! Result synthesizer tests over hand-built task maps.

mod common;

use common::mocks::*;
use deepdive::llm::LLMClient;
use deepdive::research::{Deadline, ResultSynthesizer, SynthesisConfig};
use deepdive::types::{
    ResearchTask, SentimentDirection, SentimentSignal, SubagentReport, TaskType,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn synthesizer(llm: MockLLMClient) -> ResultSynthesizer {
    let llm: Arc<dyn LLMClient> = Arc::new(llm);
    ResultSynthesizer::new(llm, SynthesisConfig::default())
}

fn completed(task_type: TaskType, report: SubagentReport) -> ResearchTask {
    let mut task = ResearchTask::new(format!("s-{}", task_type), task_type, "Acme Corp", vec![]);
    task.start().unwrap();
    task.complete(report).unwrap();
    task
}

fn failed(task_type: TaskType) -> ResearchTask {
    let mut task = ResearchTask::new(format!("s-{}", task_type), task_type, "Acme Corp", vec![]);
    task.start().unwrap();
    task.fail("provider exploded").unwrap();
    task
}

fn task_map(tasks: Vec<ResearchTask>) -> HashMap<String, ResearchTask> {
    tasks.into_iter().map(|t| (t.id.clone(), t)).collect()
}

fn neutral() -> SentimentSignal {
    SentimentSignal::new(SentimentDirection::Neutral, 0.5)
}

#[tokio::test]
async fn test_pooled_lists_are_capped() {
    let make = |prefix: &str| {
        let sources = (0..15)
            .map(|i| {
                source(
                    &format!("https://{}.example.com/{}", prefix, i),
                    0.9,
                    SentimentDirection::Bullish,
                    0.7,
                )
            })
            .collect();
        let mut report = report(sources, &[], neutral());
        report.insights = (0..20).map(|i| format!("{} insight {}", prefix, i)).collect();
        report.risks = (0..20).map(|i| format!("{} risk {}", prefix, i)).collect();
        report.opportunities = (0..20).map(|i| format!("{} opportunity {}", prefix, i)).collect();
        report
    };
    let tasks = task_map(vec![
        completed(TaskType::Fundamental, make("fund")),
        completed(TaskType::Sentiment, make("sent")),
    ]);

    let result = synthesizer(MockLLMClient::new())
        .synthesize_parallel("Acme Corp", &tasks, &Deadline::from_secs(30.0))
        .await;

    assert_eq!(result.key_insights.len(), 10);
    assert_eq!(result.risk_assessment.len(), 8);
    assert_eq!(result.opportunities.len(), 8);
    assert_eq!(result.citations.len(), 10);
    // Highest-priority task fills the lists first
    assert_eq!(result.key_insights[0], "fund insight 0");
    let ids: Vec<usize> = result.citations.iter().map(|c| c.id).collect();
    assert_eq!(ids, (1..=10).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_repeated_insight_appears_once_in_first_seen_order() {
    let insights = ["Margins expanded", "margins expanded ", "Debt fell", "Margins expanded"];
    let fundamental = report(
        vec![source("https://reuters.com/a", 0.9, SentimentDirection::Bullish, 0.8)],
        &insights,
        neutral(),
    );
    let sentiment = report(
        vec![source("https://reuters.com/b", 0.9, SentimentDirection::Bullish, 0.8)],
        &["Debt fell", "Analysts upgraded"],
        neutral(),
    );
    let tasks = task_map(vec![
        completed(TaskType::Sentiment, sentiment),
        completed(TaskType::Fundamental, fundamental),
    ]);

    let result = synthesizer(MockLLMClient::new())
        .synthesize_parallel("Acme Corp", &tasks, &Deadline::from_secs(30.0))
        .await;

    assert_eq!(
        result.key_insights,
        vec!["Margins expanded", "Debt fell", "Analysts upgraded"]
    );
}

#[tokio::test]
async fn test_failed_task_contributes_nothing() {
    let good = report(
        vec![source("https://reuters.com/a", 0.8, SentimentDirection::Bullish, 0.9)],
        &["Solid quarter"],
        SentimentSignal::new(SentimentDirection::Bullish, 0.9),
    );
    let tasks = task_map(vec![completed(TaskType::Fundamental, good), failed(TaskType::Sentiment)]);

    let result = synthesizer(MockLLMClient::new())
        .synthesize_parallel("Acme Corp", &tasks, &Deadline::from_secs(30.0))
        .await;

    assert_eq!(result.key_insights, vec!["Solid quarter"]);
    assert_eq!(result.citations.len(), 1);
    assert!((result.confidence_score - 0.8).abs() < 1e-9);
    assert_eq!(result.sentiment.direction, SentimentDirection::Bullish);
}

#[tokio::test]
async fn test_mixed_task_sentiment_is_neutral_with_high_consensus() {
    let with_sentiment = |url: &str, direction, confidence| {
        report(
            vec![source(url, 0.9, direction, confidence)],
            &[],
            SentimentSignal::new(direction, confidence),
        )
    };
    let tasks = task_map(vec![
        completed(
            TaskType::Fundamental,
            with_sentiment("https://a.com/1", SentimentDirection::Bullish, 0.8),
        ),
        completed(
            TaskType::Technical,
            with_sentiment("https://b.com/1", SentimentDirection::Bearish, 0.4),
        ),
        completed(
            TaskType::Sentiment,
            with_sentiment("https://c.com/1", SentimentDirection::Neutral, 0.5),
        ),
    ]);

    let result = synthesizer(MockLLMClient::new())
        .synthesize_parallel("Acme Corp", &tasks, &Deadline::from_secs(30.0))
        .await;

    assert_eq!(result.sentiment.direction, SentimentDirection::Neutral);
    assert!((result.sentiment.score - 0.4 / 3.0).abs() < 1e-6);
    assert!((result.sentiment.consensus - (1.0 - 0.4 / 3.0)).abs() < 1e-6);
}

#[tokio::test]
async fn test_no_completed_tasks_uses_default_confidence() {
    let tasks = task_map(vec![failed(TaskType::Fundamental), failed(TaskType::Sentiment)]);

    let result = synthesizer(MockLLMClient::new())
        .synthesize_parallel("Acme Corp", &tasks, &Deadline::from_secs(30.0))
        .await;

    assert!(result.key_insights.is_empty());
    assert!(result.citations.is_empty());
    assert_eq!(result.confidence_score, 0.5);
    assert_eq!(result.sentiment.direction, SentimentDirection::Neutral);
}

#[tokio::test(start_paused = true)]
async fn test_slow_narrative_falls_back_to_template() {
    let good = report(
        vec![source("https://reuters.com/a", 0.9, SentimentDirection::Bullish, 0.9)],
        &["Solid quarter"],
        SentimentSignal::new(SentimentDirection::Bullish, 0.9),
    );
    let tasks = task_map(vec![completed(TaskType::Fundamental, good)]);

    let result = synthesizer(MockLLMClient::slow(Duration::from_secs(60)))
        .synthesize_parallel("Acme Corp", &tasks, &Deadline::from_secs(120.0))
        .await;

    assert!(result.narrative_fallback);
    assert!(result.narrative.contains("Acme Corp"));
    assert_eq!(result.key_insights, vec!["Solid quarter"]);
}

#[tokio::test]
async fn test_expired_deadline_skips_narrative_call() {
    let llm = Arc::new(MockLLMClient::new());
    let client: Arc<dyn LLMClient> = Arc::clone(&llm) as Arc<dyn LLMClient>;
    let synthesizer = ResultSynthesizer::new(client, SynthesisConfig::default());

    let result = synthesizer
        .synthesize_parallel("Acme Corp", &HashMap::new(), &Deadline::from_secs(0.0))
        .await;

    assert!(result.narrative_fallback);
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_sequential_synthesis_uses_source_sentiment() {
    let findings = report(
        vec![
            source("https://reuters.com/a", 0.9, SentimentDirection::Bullish, 0.9),
            source("https://bloomberg.com/b", 0.9, SentimentDirection::Bullish, 0.7),
            source("https://www.reuters.com/a/", 0.9, SentimentDirection::Bullish, 0.9),
        ],
        &["Solid quarter", "solid quarter"],
        neutral(),
    );

    let result = synthesizer(MockLLMClient::new())
        .synthesize_sequential("Acme Corp", &findings, &Deadline::from_secs(30.0))
        .await;

    assert_eq!(result.key_insights, vec!["Solid quarter"]);
    // Duplicate URL collapses
    assert_eq!(result.citations.len(), 2);
    assert_eq!(result.sentiment.direction, SentimentDirection::Bullish);
    assert!(result.confidence_score > 0.0 && result.confidence_score <= 1.0);
    assert_eq!(result.narrative, NARRATIVE);
}
