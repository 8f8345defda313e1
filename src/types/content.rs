//! Response-content generation payloads (clarifications, FAQ, scripts).

use serde::{Deserialize, Serialize};

/// Clarification piece in three lengths.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClarificationContent {
    pub short: String,
    pub medium: String,
    pub long: String,
}

/// One FAQ entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaqItem {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub category: String,
}

/// Platform-specific posting script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformScript {
    pub platform: String,
    pub content: String,
    #[serde(default)]
    pub tips: Vec<String>,
}

/// Generated response content bound to a report (and optionally a
/// simulation). Persistable onto a history record as an additive field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBundle {
    pub clarification: ClarificationContent,
    pub faq: Vec<FaqItem>,
    pub platform_scripts: Vec<PlatformScript>,
    pub generated_at: String,
    #[serde(default)]
    pub based_on: serde_json::Value,
}
