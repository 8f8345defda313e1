//! Evidence rows and the closed stance vocabulary.

use serde::{Deserialize, Serialize};

/// Relation of an evidence item to its claim.
///
/// Every stance field leaving any stage is one of these three values;
/// Chinese synonyms from LM output are normalized before construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stance {
    Support,
    Refute,
    Insufficient,
}

impl Stance {
    /// Normalize a raw LM stance string (English or Chinese) to the closed
    /// set. Anything unrecognized collapses to `Insufficient`.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "support" => Stance::Support,
            "refute" => Stance::Refute,
            "insufficient" => Stance::Insufficient,
            _ => match raw.trim() {
                "支持" => Stance::Support,
                "反对" | "反驳" => Stance::Refute,
                "证据不足" | "不足" | "不确定" | "中立" => Stance::Insufficient,
                _ => Stance::Insufficient,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stance::Support => "support",
            Stance::Refute => "refute",
            Stance::Insufficient => "insufficient",
        }
    }
}

impl std::fmt::Display for Stance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an evidence row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    LocalKb,
    WebLive,
    WebSummary,
}

/// One evidence row attached to a claim.
///
/// Created by the search stage (`e1..`), rewritten by summarization
/// (`s1..`, `source_type = web_summary`, `source_urls` filled), and
/// annotated by alignment (stance/rationale/confidence).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub evidence_id: String,
    pub claim_id: String,
    pub title: String,
    pub source: String,
    pub url: String,
    pub published_at: String,
    pub summary: String,
    pub stance: Stance,
    pub source_weight: f64,
    pub source_type: SourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieved_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_authoritative: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment_rationale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment_confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_urls: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stance_normalize_english() {
        assert_eq!(Stance::normalize("Support"), Stance::Support);
        assert_eq!(Stance::normalize(" refute "), Stance::Refute);
        assert_eq!(Stance::normalize("insufficient"), Stance::Insufficient);
    }

    #[test]
    fn test_stance_normalize_chinese_synonyms() {
        assert_eq!(Stance::normalize("支持"), Stance::Support);
        assert_eq!(Stance::normalize("反驳"), Stance::Refute);
        assert_eq!(Stance::normalize("证据不足"), Stance::Insufficient);
        assert_eq!(Stance::normalize("中立"), Stance::Insufficient);
    }

    #[test]
    fn test_stance_normalize_unknown_defaults_insufficient() {
        assert_eq!(Stance::normalize("definitely true"), Stance::Insufficient);
        assert_eq!(Stance::normalize(""), Stance::Insufficient);
    }

    #[test]
    fn test_stance_serde_lowercase() {
        let json = serde_json::to_string(&Stance::Refute).unwrap();
        assert_eq!(json, "\"refute\"");
        let back: Stance = serde_json::from_str("\"support\"").unwrap();
        assert_eq!(back, Stance::Support);
    }
}
