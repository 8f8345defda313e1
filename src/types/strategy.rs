//! Per-turn strategy derived from the risk snapshot.

use serde::{Deserialize, Serialize};

/// Check-worthiness complexity of the input text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityLevel {
    Simple,
    Medium,
    Complex,
}

impl ComplexityLevel {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "simple" => ComplexityLevel::Simple,
            "complex" => ComplexityLevel::Complex,
            _ => ComplexityLevel::Medium,
        }
    }
}

/// Knobs controlling fan-out and caps of the downstream stages.
///
/// Computed once from the risk snapshot and propagated unchanged through
/// the rest of the turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub max_claims: usize,
    pub complexity_level: ComplexityLevel,
    #[serde(default)]
    pub complexity_reason: String,
    pub evidence_per_claim: usize,
    #[serde(default)]
    pub risk_level: String,
    #[serde(default)]
    pub risk_reason: String,
    pub summary_target_min: usize,
    pub summary_target_max: usize,
    pub enable_summarization: bool,
    #[serde(default = "default_true")]
    pub is_news: bool,
    #[serde(default = "default_news_confidence")]
    pub news_confidence: f64,
    #[serde(default = "default_text_type")]
    pub detected_text_type: String,
    #[serde(default)]
    pub news_reason: String,
}

fn default_true() -> bool {
    true
}

fn default_news_confidence() -> f64 {
    0.5
}

fn default_text_type() -> String {
    "news".to_string()
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            max_claims: 5,
            complexity_level: ComplexityLevel::Medium,
            complexity_reason: String::new(),
            evidence_per_claim: 5,
            risk_level: "medium".to_string(),
            risk_reason: String::new(),
            summary_target_min: 1,
            summary_target_max: 5,
            enable_summarization: true,
            is_news: true,
            news_confidence: 0.5,
            detected_text_type: "news".to_string(),
            news_reason: String::new(),
        }
    }
}
