//! Comprehensive report: per-claim verdicts plus the overall risk rating.

use serde::{Deserialize, Serialize};

use super::claim::ClaimItem;
use super::evidence::{EvidenceItem, Stance};

/// Severity band derived from the numeric risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Qualitative verdict of the report (four-label set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLabel {
    Credible,
    NeedsContext,
    Suspicious,
    LikelyMisinformation,
}

impl RiskLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLabel::Credible => "credible",
            RiskLabel::NeedsContext => "needs_context",
            RiskLabel::Suspicious => "suspicious",
            RiskLabel::LikelyMisinformation => "likely_misinformation",
        }
    }
}

impl std::fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Topical scenario the input belongs to, keyword-voted over the claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    Health,
    Governance,
    Security,
    Media,
    Technology,
    Education,
    General,
}

impl Scenario {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::Health => "health",
            Scenario::Governance => "governance",
            Scenario::Security => "security",
            Scenario::Media => "media",
            Scenario::Technology => "technology",
            Scenario::Education => "education",
            Scenario::General => "general",
        }
    }
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a risk score to its (level, label) band.
///
/// Bands: >=75 low/credible, 55..=74 medium/needs_context,
/// 35..=54 high/suspicious, <35 critical/likely_misinformation.
pub fn score_band(score: i64) -> (RiskLevel, RiskLabel) {
    if score >= 75 {
        (RiskLevel::Low, RiskLabel::Credible)
    } else if score >= 55 {
        (RiskLevel::Medium, RiskLabel::NeedsContext)
    } else if score >= 35 {
        (RiskLevel::High, RiskLabel::Suspicious)
    } else {
        (RiskLevel::Critical, RiskLabel::LikelyMisinformation)
    }
}

/// Per-claim slice of the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimReport {
    pub claim: ClaimItem,
    pub evidences: Vec<EvidenceItem>,
    pub final_stance: Stance,
    pub notes: Vec<String>,
}

/// The full report payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub risk_score: i64,
    pub risk_level: RiskLevel,
    pub risk_label: RiskLabel,
    pub detected_scenario: Scenario,
    pub evidence_domains: Vec<String>,
    pub summary: String,
    pub suspicious_points: Vec<String>,
    pub claim_reports: Vec<ClaimReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_band_edges() {
        assert_eq!(score_band(100), (RiskLevel::Low, RiskLabel::Credible));
        assert_eq!(score_band(75), (RiskLevel::Low, RiskLabel::Credible));
        assert_eq!(score_band(74), (RiskLevel::Medium, RiskLabel::NeedsContext));
        assert_eq!(score_band(55), (RiskLevel::Medium, RiskLabel::NeedsContext));
        assert_eq!(score_band(54), (RiskLevel::High, RiskLabel::Suspicious));
        assert_eq!(score_band(35), (RiskLevel::High, RiskLabel::Suspicious));
        assert_eq!(
            score_band(34),
            (RiskLevel::Critical, RiskLabel::LikelyMisinformation)
        );
        assert_eq!(
            score_band(0),
            (RiskLevel::Critical, RiskLabel::LikelyMisinformation)
        );
    }
}
