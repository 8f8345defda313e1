//! Verifiable claims extracted from input text.

use serde::{Deserialize, Serialize};

/// One atomic, independently verifiable claim.
///
/// `claim_id` is stable within a task (`c1`, `c2`, ...) and acts as the
/// index every downstream stage keys on. Claims are immutable once the
/// claims stage has produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimItem {
    pub claim_id: String,
    pub claim_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub source_sentence: String,
}

impl ClaimItem {
    /// Catch-all claim used when rule extraction yields nothing: the whole
    /// trimmed input as a single claim.
    pub fn catch_all(text: &str) -> Self {
        let trimmed = text.trim().to_string();
        Self {
            claim_id: "c1".to_string(),
            claim_text: trimmed.clone(),
            entity: None,
            time: None,
            location: None,
            value: None,
            source_sentence: trimmed,
        }
    }
}
