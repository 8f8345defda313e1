//! Cross-stage plumbing: evidence assembly per claim, and the bounded
//! summarize + align fan-out.
//!
//! Fan-out order is unspecified, but results are re-assembled in stable
//! claim order so the final payload is a pure function of the result set.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde_json::json;

use crate::config::{self, DEFAULT_ALIGN_PARALLEL_WORKERS, DEFAULT_CLAIM_PARALLEL_WORKERS, DEFAULT_WEB_RETRIEVAL_TOPK};
use crate::stages::align::align_claim_with_evidence;
use crate::stages::summarize::summarize_evidence_for_claim;
use crate::stages::web_search::{infer_web_stance, search_web_evidence};
use crate::types::{ClaimItem, EvidenceItem, SourceType, Stance, StrategyConfig};

fn claim_workers() -> usize {
    config::int_var(
        "CLAIM_PARALLEL_WORKERS",
        DEFAULT_CLAIM_PARALLEL_WORKERS as i64,
        1,
        16,
    ) as usize
}

fn align_workers() -> usize {
    config::int_var(
        "ALIGN_PARALLEL_WORKERS",
        DEFAULT_ALIGN_PARALLEL_WORKERS as i64,
        1,
        16,
    ) as usize
}

/// Placeholder row inserted when search is disabled or recalls nothing, so
/// downstream stages always see at least one row per claim.
fn placeholder_evidence(claim: &ClaimItem, evidence_idx: usize, retrieved_at: &str) -> EvidenceItem {
    let preview: String = claim.claim_text.chars().take(80).collect();
    EvidenceItem {
        evidence_id: format!("e{evidence_idx}"),
        claim_id: claim.claim_id.clone(),
        title: "未找到可信证据候选".to_string(),
        source: "web-search".to_string(),
        url: "https://example.com/no-evidence".to_string(),
        published_at: Utc::now().format("%Y-%m-%d").to_string(),
        summary: format!("该主张暂无可用联网证据：{preview}"),
        stance: Stance::Insufficient,
        source_weight: 0.2,
        source_type: SourceType::WebLive,
        retrieved_at: Some(retrieved_at.to_string()),
        domain: Some("general".to_string()),
        is_authoritative: Some(false),
        raw_snippet: None,
        alignment_rationale: None,
        alignment_confidence: None,
        source_urls: None,
    }
}

/// Retrieve evidence for every claim, assigning stable `e<N>` ids in claim
/// order.
pub async fn retrieve_evidence(
    claims: &[ClaimItem],
    strategy: Option<&StrategyConfig>,
) -> Vec<EvidenceItem> {
    let web_top_k = strategy.map(|s| s.evidence_per_claim).unwrap_or_else(|| {
        config::int_var(
            "WEB_RETRIEVAL_TOPK",
            DEFAULT_WEB_RETRIEVAL_TOPK as i64,
            1,
            25,
        ) as usize
    });
    let retrieved_at = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();

    // Searches run concurrently per claim; ids are assigned afterwards in
    // claim order so the output is deterministic for a given result set.
    let ranked_per_claim: Vec<_> = stream::iter(claims.iter().cloned())
        .map(|claim: ClaimItem| {
            Box::pin(async move {
                let ranked = search_web_evidence(&claim.claim_text, web_top_k).await;
                (claim, ranked)
            })
        })
        .buffered(claim_workers())
        .collect()
        .await;

    let mut evidences = Vec::new();
    let mut evidence_idx = 1usize;
    for (claim, ranked) in ranked_per_claim {
        if ranked.is_empty() {
            evidences.push(placeholder_evidence(&claim, evidence_idx, &retrieved_at));
            evidence_idx += 1;
            continue;
        }
        for candidate in ranked {
            let stance = infer_web_stance(&claim.claim_text, &candidate);
            evidences.push(EvidenceItem {
                evidence_id: format!("e{evidence_idx}"),
                claim_id: claim.claim_id.clone(),
                title: candidate.title,
                source: candidate.source,
                url: candidate.url,
                published_at: candidate.published_at,
                summary: candidate.summary,
                stance,
                source_weight: candidate.relevance,
                source_type: SourceType::WebLive,
                retrieved_at: Some(retrieved_at.clone()),
                domain: Some(candidate.domain),
                is_authoritative: Some(candidate.is_authoritative),
                raw_snippet: Some(candidate.raw_snippet),
                alignment_rationale: None,
                alignment_confidence: None,
                source_urls: None,
            });
            evidence_idx += 1;
        }
    }

    evidences
}

/// Summarize and align the evidence of every claim.
///
/// Per claim: merge retrieved rows into summary rows, then align each
/// summary row with the claim. Both fan-outs are bounded by their worker
/// pools; output preserves claim order.
pub async fn align_evidences(
    claims: &[ClaimItem],
    evidences: &[EvidenceItem],
    strategy: Option<&StrategyConfig>,
) -> Vec<EvidenceItem> {
    let mut by_claim: std::collections::BTreeMap<&str, Vec<EvidenceItem>> =
        std::collections::BTreeMap::new();
    for item in evidences {
        by_claim
            .entry(item.claim_id.as_str())
            .or_default()
            .push(item.clone());
    }

    let per_claim: Vec<_> = stream::iter(claims.iter().cloned())
        .map(|claim: ClaimItem| {
            let related = by_claim.remove(claim.claim_id.as_str()).unwrap_or_default();
            Box::pin(async move {
                if related.is_empty() {
                    return Vec::new();
                }
                let summarized =
                    summarize_evidence_for_claim(&claim.claim_text, related, strategy).await;
                align_evidence_rows(&claim.claim_text, summarized).await
            })
        })
        .buffered(claim_workers())
        .collect()
        .await;

    per_claim.into_iter().flatten().collect()
}

/// Align every evidence row of one claim, bounded by the align pool.
async fn align_evidence_rows(claim_text: &str, rows: Vec<EvidenceItem>) -> Vec<EvidenceItem> {
    stream::iter(rows.into_iter())
        .map(|mut item| async move {
            let aligned = align_claim_with_evidence(claim_text, &item).await;
            item.stance = aligned.stance;
            item.alignment_confidence = Some(aligned.confidence);
            item.alignment_rationale = Some(aligned.rationale);
            item
        })
        .buffered(align_workers())
        .collect()
        .await
}

/// Stance tally used by dispatcher progress messages.
pub fn stance_counts(evidences: &[EvidenceItem]) -> serde_json::Value {
    let count = |s: Stance| evidences.iter().filter(|e| e.stance == s).count();
    json!({
        "support": count(Stance::Support),
        "refute": count(Stance::Refute),
        "insufficient": count(Stance::Insufficient),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim(id: &str, text: &str) -> ClaimItem {
        ClaimItem {
            claim_id: id.to_string(),
            claim_text: text.to_string(),
            entity: None,
            time: None,
            location: None,
            value: None,
            source_sentence: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_placeholder_when_search_disabled() {
        // Web retrieval defaults to disabled in tests.
        let claims = vec![claim("c1", "主张一"), claim("c2", "主张二")];
        let evidences = retrieve_evidence(&claims, None).await;
        assert_eq!(evidences.len(), 2);
        assert_eq!(evidences[0].evidence_id, "e1");
        assert_eq!(evidences[0].claim_id, "c1");
        assert_eq!(evidences[0].stance, Stance::Insufficient);
        assert_eq!(evidences[1].evidence_id, "e2");
        assert_eq!(evidences[1].claim_id, "c2");
    }

    #[tokio::test]
    async fn test_align_annotates_every_row() {
        let claims = vec![claim("c1", "疫苗 安全 数据")];
        let evidences = retrieve_evidence(&claims, None).await;
        let aligned = align_evidences(&claims, &evidences, None).await;
        assert_eq!(aligned.len(), 1);
        assert!(aligned[0].alignment_confidence.is_some());
        assert!(aligned[0].alignment_rationale.is_some());
    }

    #[tokio::test]
    async fn test_align_keeps_claim_order() {
        let claims = vec![claim("c1", "主张一"), claim("c2", "主张二")];
        let evidences = retrieve_evidence(&claims, None).await;
        let aligned = align_evidences(&claims, &evidences, None).await;
        assert_eq!(aligned[0].claim_id, "c1");
        assert_eq!(aligned[1].claim_id, "c2");
    }

    #[tokio::test]
    async fn test_stance_counts() {
        let claims = vec![claim("c1", "主张一")];
        let evidences = retrieve_evidence(&claims, None).await;
        let counts = stance_counts(&evidences);
        assert_eq!(counts["insufficient"], 1);
    }
}
