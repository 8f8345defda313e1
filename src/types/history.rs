//! History record views returned by the history API.

use serde::{Deserialize, Serialize};

/// Compact row for history listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: String,
    pub created_at: String,
    pub input_preview: String,
    pub risk_label: String,
    pub risk_score: i64,
    pub detected_scenario: String,
    pub evidence_domains: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback_status: Option<String>,
}

/// Full record detail. `report`, `detect_data`, `simulation` and `content`
/// are stored as raw JSON so that old rows written by earlier payload
/// shapes still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryDetail {
    pub id: String,
    pub created_at: String,
    pub input_text: String,
    pub risk_label: String,
    pub risk_score: i64,
    pub detected_scenario: String,
    pub evidence_domains: Vec<String>,
    pub report: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detect_data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback_note: Option<String>,
}
