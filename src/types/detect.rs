//! Risk snapshot output.

use serde::{Deserialize, Serialize};

use super::strategy::StrategyConfig;

/// Qualitative verdict of the risk snapshot stage.
///
/// Wider than the report's four-label set: the snapshot may also answer
/// `high_risk` before any evidence has been seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectLabel {
    Credible,
    Suspicious,
    HighRisk,
    NeedsContext,
    LikelyMisinformation,
}

impl DetectLabel {
    /// Normalize a raw LM label (English or Chinese) to the closed set.
    /// Unknown values map to `NeedsContext`.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "credible" => DetectLabel::Credible,
            "suspicious" => DetectLabel::Suspicious,
            "high_risk" => DetectLabel::HighRisk,
            "needs_context" => DetectLabel::NeedsContext,
            "likely_misinformation" => DetectLabel::LikelyMisinformation,
            _ => match raw.trim() {
                "可信" => DetectLabel::Credible,
                "可疑" => DetectLabel::Suspicious,
                "高风险" => DetectLabel::HighRisk,
                "需要补充语境" => DetectLabel::NeedsContext,
                "疑似不实信息" | "疑似不实" | "不实信息" => {
                    DetectLabel::LikelyMisinformation
                }
                _ => DetectLabel::NeedsContext,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectLabel::Credible => "credible",
            DetectLabel::Suspicious => "suspicious",
            DetectLabel::HighRisk => "high_risk",
            DetectLabel::NeedsContext => "needs_context",
            DetectLabel::LikelyMisinformation => "likely_misinformation",
        }
    }
}

impl std::fmt::Display for DetectLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the risk snapshot stage, with the downstream strategy attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectResult {
    pub label: DetectLabel,
    pub confidence: f64,
    pub score: i64,
    pub reasons: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<StrategyConfig>,
    #[serde(default)]
    pub truncated: bool,
}
