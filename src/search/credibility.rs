use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::clamp_unit;

/// Government, regulators and exchanges
const OFFICIAL_SUFFIXES: &[&str] = &[".gov", ".gov.uk", ".europa.eu", ".int"];
const OFFICIAL_DOMAINS: &[&str] = &["sec.gov", "federalreserve.gov", "ecb.europa.eu", "nasdaq.com", "nyse.com"];

const FINANCIAL_PRESS: &[&str] = &[
    "reuters.com",
    "bloomberg.com",
    "wsj.com",
    "ft.com",
    "economist.com",
    "barrons.com",
    "cnbc.com",
    "marketwatch.com",
];

const ACADEMIC_SUFFIXES: &[&str] = &[".edu", ".ac.uk"];

const GENERAL_NEWS: &[&str] = &[
    "apnews.com",
    "bbc.co.uk",
    "bbc.com",
    "nytimes.com",
    "theguardian.com",
    "forbes.com",
    "businessinsider.com",
    "finance.yahoo.com",
];

const SOCIAL: &[&str] = &[
    "reddit.com",
    "twitter.com",
    "x.com",
    "stocktwits.com",
    "facebook.com",
    "medium.com",
    "substack.com",
];

/// `[credibility]` settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredibilityConfig {
    /// Score for domains not in any tier
    #[serde(default = "default_score")]
    pub default_score: f64,

    /// Per-domain overrides, e.g. `"example.com" = 0.7`
    #[serde(default)]
    pub domains: HashMap<String, f64>,
}

fn default_score() -> f64 {
    0.5
}

impl Default for CredibilityConfig {
    fn default() -> Self {
        Self {
            default_score: default_score(),
            domains: HashMap::new(),
        }
    }
}

/// Domain-tier credibility heuristic with a small recency adjustment.
#[derive(Debug, Clone, Default)]
pub struct CredibilityScorer {
    config: CredibilityConfig,
}

impl CredibilityScorer {
    pub fn new(config: CredibilityConfig) -> Self {
        Self { config }
    }

    /// Score a source in [0, 1] from its URL and optional publish date.
    pub fn score(&self, url: &str, published_at: Option<DateTime<Utc>>) -> f64 {
        let base = match domain_of(url) {
            Some(domain) => self.domain_score(&domain),
            None => self.config.default_score * 0.5,
        };
        clamp_unit(base + recency_adjustment(published_at))
    }

    fn domain_score(&self, domain: &str) -> f64 {
        if let Some(score) = lookup(&self.config.domains, domain) {
            return score;
        }
        if OFFICIAL_DOMAINS.iter().any(|d| matches_domain(domain, d))
            || OFFICIAL_SUFFIXES.iter().any(|s| domain.ends_with(s))
        {
            return 0.95;
        }
        if FINANCIAL_PRESS.iter().any(|d| matches_domain(domain, d)) {
            return 0.9;
        }
        if ACADEMIC_SUFFIXES.iter().any(|s| domain.ends_with(s)) {
            return 0.85;
        }
        if GENERAL_NEWS.iter().any(|d| matches_domain(domain, d)) {
            return 0.75;
        }
        if SOCIAL.iter().any(|d| matches_domain(domain, d)) {
            return 0.3;
        }
        self.config.default_score
    }
}

/// Most specific matching override: exact host first, then the longest suffix.
fn lookup(overrides: &HashMap<String, f64>, domain: &str) -> Option<f64> {
    overrides
        .iter()
        .filter(|(d, _)| matches_domain(domain, d))
        .max_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| b.cmp(a)))
        .map(|(_, score)| clamp_unit(*score))
}

/// `domain` equals `target` or is a subdomain of it.
fn matches_domain(domain: &str, target: &str) -> bool {
    domain == target || domain.ends_with(&format!(".{}", target))
}

fn recency_adjustment(published_at: Option<DateTime<Utc>>) -> f64 {
    let Some(published) = published_at else {
        return 0.0;
    };
    let age_days = (Utc::now() - published).num_days();
    match age_days {
        d if d < 0 => 0.0,
        0..=30 => 0.05,
        31..=365 => 0.0,
        _ => -0.1,
    }
}

/// Lowercased host of `url` without a leading `www.`.
pub fn domain_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some(host.trim_start_matches("www.").to_string())
}
