//! Investor personas: read-only name -> default focus areas lookup.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// `[personas.<name>]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaConfig {
    #[serde(default)]
    pub description: Option<String>,
    pub focus_areas: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Persona {
    pub name: String,
    pub description: String,
    pub focus_areas: Vec<String>,
}

const BUILTIN: &[(&str, &str, &[&str])] = &[
    (
        "value_investor",
        "Looks for durable businesses trading below intrinsic value",
        &["valuation", "earnings", "cash flow", "balance sheet", "dividend"],
    ),
    (
        "growth_investor",
        "Prioritises revenue expansion and market opportunity",
        &["revenue growth", "market share", "margin", "industry"],
    ),
    (
        "momentum_trader",
        "Follows price trends and shifts in market attention",
        &["momentum", "price action", "volume", "trend", "news"],
    ),
    (
        "contrarian",
        "Looks for mispricing where sentiment has overshot",
        &["sentiment", "analyst rating", "valuation", "social"],
    ),
    (
        "competitive_strategist",
        "Weighs positioning against peers and the wider industry",
        &["competitive", "market share", "moat", "peer", "industry landscape"],
    ),
];

fn normalize(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c == ' ' { '_' } else { c })
        .collect()
}

#[derive(Debug, Clone)]
pub struct PersonaCatalog {
    personas: BTreeMap<String, Persona>,
}

impl Default for PersonaCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PersonaCatalog {
    pub fn builtin() -> Self {
        let personas = BUILTIN
            .iter()
            .map(|(name, description, focus)| {
                (
                    name.to_string(),
                    Persona {
                        name: name.to_string(),
                        description: description.to_string(),
                        focus_areas: focus.iter().map(|f| f.to_string()).collect(),
                    },
                )
            })
            .collect();
        Self { personas }
    }

    /// Built-ins with configured personas added or replacing them by name.
    pub fn from_config(overrides: &HashMap<String, PersonaConfig>) -> Self {
        let mut catalog = Self::builtin();
        for (name, config) in overrides {
            let key = normalize(name);
            let description = config
                .description
                .clone()
                .or_else(|| catalog.personas.get(&key).map(|p| p.description.clone()))
                .unwrap_or_default();
            catalog.personas.insert(
                key.clone(),
                Persona {
                    name: key,
                    description,
                    focus_areas: config.focus_areas.clone(),
                },
            );
        }
        catalog
    }

    /// Case-insensitive lookup; `-` and spaces match `_`.
    pub fn get(&self, name: &str) -> Option<&Persona> {
        self.personas.get(&normalize(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Persona> {
        self.personas.values()
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }
}
