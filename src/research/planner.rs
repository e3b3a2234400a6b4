//! Task planning: topic + focus areas -> typed research subtasks.

use crate::types::{ResearchTask, TaskType};

const FUNDAMENTAL_KEYWORDS: &[&str] = &[
    "fundamental",
    "earnings",
    "revenue",
    "valuation",
    "financial",
    "financials",
    "profit",
    "margin",
    "cash flow",
    "balance sheet",
    "dividend",
    "growth",
];

const TECHNICAL_KEYWORDS: &[&str] = &[
    "technical",
    "chart",
    "price action",
    "momentum",
    "trend",
    "indicator",
    "support",
    "resistance",
    "volume",
    "moving average",
    "rsi",
    "macd",
    "volatility",
];

const SENTIMENT_KEYWORDS: &[&str] = &[
    "sentiment",
    "news",
    "social",
    "analyst",
    "opinion",
    "rating",
    "buzz",
    "media",
];

const COMPETITIVE_KEYWORDS: &[&str] = &[
    "competitive",
    "competition",
    "competitor",
    "market share",
    "industry",
    "peer",
    "landscape",
    "positioning",
    "moat",
];

/// Number of supplied focus areas a task falls back to when none match.
const FALLBACK_FOCUS_COUNT: usize = 3;

pub fn keywords_for(task_type: TaskType) -> &'static [&'static str] {
    match task_type {
        TaskType::Fundamental => FUNDAMENTAL_KEYWORDS,
        TaskType::Technical => TECHNICAL_KEYWORDS,
        TaskType::Sentiment => SENTIMENT_KEYWORDS,
        TaskType::Competitive => COMPETITIVE_KEYWORDS,
    }
}

/// Whole-word (or simple plural) keyword match, case-insensitive.
fn focus_matches(focus: &str, keyword: &str) -> bool {
    let words: Vec<String> = focus
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();
    let haystack = format!(" {} ", words.join(" "));
    haystack.contains(&format!(" {} ", keyword)) || haystack.contains(&format!(" {}s ", keyword))
}

fn matching_focus(task_type: TaskType, focus_areas: &[String]) -> Vec<String> {
    let keywords = keywords_for(task_type);
    focus_areas
        .iter()
        .filter(|focus| keywords.iter().any(|kw| focus_matches(focus, kw)))
        .cloned()
        .collect()
}

/// Turns a topic and focus areas into typed subtasks.
pub struct TaskPlanner;

impl TaskPlanner {
    /// Plan the subtasks for a run.
    ///
    /// Fundamental and sentiment tasks are always emitted. Technical and
    /// competitive tasks only appear when a focus area matches their keyword
    /// set. Each task's focus is the matching subset, or the first three
    /// supplied focus areas when nothing matches. Output is ordered by
    /// priority and is deterministic for identical input.
    pub fn generate_tasks(topic: &str, session_id: &str, focus_areas: &[String]) -> Vec<ResearchTask> {
        let focus_areas: Vec<String> = focus_areas
            .iter()
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect();

        TaskType::ALL
            .iter()
            .copied()
            .filter_map(|task_type| {
                let matched = matching_focus(task_type, &focus_areas);
                let always = matches!(task_type, TaskType::Fundamental | TaskType::Sentiment);
                if !always && matched.is_empty() {
                    return None;
                }

                let focus = if matched.is_empty() {
                    focus_areas.iter().take(FALLBACK_FOCUS_COUNT).cloned().collect()
                } else {
                    matched
                };

                Some(ResearchTask::new(
                    format!("{}-{}", session_id, task_type),
                    task_type,
                    topic.trim(),
                    focus,
                ))
            })
            .collect()
    }
}
