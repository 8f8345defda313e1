//! Opinion simulation payloads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One possible narrative branch public opinion might take.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeItem {
    pub title: String,
    pub stance: String,
    pub probability: f64,
    pub trigger_keywords: Vec<String>,
    pub sample_message: String,
}

/// Hour-indexed projection of how far the content spreads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineItem {
    pub hour: i64,
    pub event: String,
    pub expected_reach: String,
}

/// One recommended action, keyed by priority and dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    /// urgent / high / medium
    pub priority: String,
    /// official / media / platform / user
    pub category: String,
    pub action: String,
    pub timeline: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responsible: Option<String>,
}

/// Final suggestion block: summary plus the action list.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SuggestionData {
    pub summary: String,
    #[serde(default)]
    pub actions: Vec<ActionItem>,
}

/// Full simulation result across the four sub-stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulateResponse {
    pub emotion_distribution: BTreeMap<String, f64>,
    pub stance_distribution: BTreeMap<String, f64>,
    pub narratives: Vec<NarrativeItem>,
    pub flashpoints: Vec<String>,
    pub suggestion: SuggestionData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline: Option<Vec<TimelineItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion_drivers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stance_drivers: Option<Vec<String>>,
}
