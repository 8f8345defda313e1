//! Evidence summarization: merge many retrieved rows per claim into a few
//! information-complete summary rows.
//!
//! Pass-through on every failure mode: summarization disabled, single-row
//! input, LM failure, or an LM payload that yields no valid summary row.

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::{self, LlmSettings, DEFAULT_SUMMARY_INPUT_LIMIT};
use crate::llm::{self, trace};
use crate::types::{EvidenceItem, SourceType, Stance, StrategyConfig};

fn summary_enabled() -> bool {
    config::bool_var("EVIDENCE_SUMMARY_ENABLED", false)
}

fn summary_input_limit() -> usize {
    config::int_var(
        "EVIDENCE_SUMMARY_INPUT_LIMIT",
        DEFAULT_SUMMARY_INPUT_LIMIT as i64,
        2,
        30,
    ) as usize
}

/// Summarize the evidence list of one claim. Returns the input unchanged
/// whenever merging is not possible or not worthwhile.
pub async fn summarize_evidence_for_claim(
    claim_text: &str,
    evidences: Vec<EvidenceItem>,
    strategy: Option<&StrategyConfig>,
) -> Vec<EvidenceItem> {
    if evidences.len() <= 1 {
        return evidences;
    }

    let target_min = strategy.map(|s| s.summary_target_min).unwrap_or(1);
    let target_max = strategy
        .map(|s| s.summary_target_max)
        .unwrap_or_else(|| evidences.len().min(5))
        .min(evidences.len());
    if target_max < 1 {
        return evidences;
    }
    if let Some(s) = strategy {
        if !s.enable_summarization {
            return evidences;
        }
    }
    if !summary_enabled() {
        return evidences;
    }

    let rows: Vec<EvidenceItem> = evidences
        .iter()
        .take(summary_input_limit())
        .cloned()
        .collect();
    info!(
        input = rows.len(),
        target_min, target_max, "证据摘要：开始处理 claim"
    );

    let Some(payload) = call_summary_llm(claim_text, &rows, target_min, target_max).await else {
        warn!("证据摘要：LLM摘要失败，回退原始证据");
        return evidences;
    };

    let summarized = build_summary_evidences(&payload, &rows, target_max);
    if summarized.is_empty() {
        warn!("证据摘要：所有摘要构建失败，回退原始证据");
        return evidences;
    }

    info!(
        output = summarized.len(),
        compression = format!("{:.2}", summarized.len() as f64 / rows.len() as f64),
        "证据摘要：处理完成"
    );
    summarized
}

async fn call_summary_llm(
    claim_text: &str,
    rows: &[EvidenceItem],
    target_min: usize,
    target_max: usize,
) -> Option<Value> {
    let settings = LlmSettings::for_stage("EVIDENCE_SUMMARY_LLM_MODEL");
    let prompt = format!(
        "你是事实核验中的证据归纳引擎。请将同一主张对应的多条检索证据进行聚合，\
         输出更少但信息完整的证据摘要。\n\
         要求：\n\
         1）只输出严格JSON。\n\
         2）输出 {target_min} 至 {target_max} 条摘要（根据证据质量自主决定数量）。\n\
         3）每条摘要必须包含：summary_text、stance_hint(支持/反对/证据不足)、\
         confidence(0~1)、source_indices。\n\
         4）summary_text 用中文，简洁、可核查，不得编造。\n\
         5）source_indices 必须引用输入证据下标（从0开始）。\n\
         6）如果证据质量低或信息重复，可以输出更少的摘要。\n\
         输出格式：{{\"summaries\":[{{\"summary_text\":\"\",\"stance_hint\":\"支持\",\
         \"confidence\":0.7,\"source_indices\":[0,2]}}]}}"
    );

    let simplified: Vec<Value> = rows
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            json!({
                "idx": idx,
                "title": item.title,
                "source": item.source,
                "url": item.url,
                "published_at": item.published_at,
                "summary": item.summary,
                "stance": item.stance,
                "score": item.source_weight,
            })
        })
        .collect();

    let opts = llm::CallOptions::new(settings, "evidence_summary", "DEBUG_EVIDENCE_SUMMARY")
        .temperature(0.1);
    llm::call_json(
        "你是严谨的证据归纳助手，只返回JSON。",
        &format!(
            "{prompt}\n\n主张：\n{claim_text}\n\n证据列表：\n{}",
            serde_json::to_string(&simplified).unwrap_or_default()
        ),
        &opts,
    )
    .await
}

/// Rebuild evidence rows from the LM summary payload. Invalid entries are
/// skipped; every valid row becomes `s<N>` with `web_summary` source type.
fn build_summary_evidences(
    payload: &Value,
    rows: &[EvidenceItem],
    max_items: usize,
) -> Vec<EvidenceItem> {
    let Some(summaries) = payload.get("summaries").and_then(Value::as_array) else {
        warn!("证据摘要：payload 中无有效 summaries 字段，回退原始证据");
        return Vec::new();
    };

    let mut result = Vec::new();
    for (pos, item) in summaries.iter().take(max_items).enumerate() {
        let Some(obj) = item.as_object() else {
            warn!(index = pos, "证据摘要：summaries 条目不是对象，跳过");
            continue;
        };

        let summary_text = obj
            .get("summary_text")
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim()
            .to_string();
        let stance = Stance::normalize(
            obj.get("stance_hint").and_then(Value::as_str).unwrap_or(""),
        );
        let confidence = obj
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(0.5)
            .clamp(0.0, 1.0);

        let source_rows: Vec<&EvidenceItem> = obj
            .get("source_indices")
            .and_then(Value::as_array)
            .map(|indices| {
                indices
                    .iter()
                    .filter_map(Value::as_i64)
                    .filter(|i| *i >= 0 && (*i as usize) < rows.len())
                    .map(|i| &rows[i as usize])
                    .collect()
            })
            .unwrap_or_default();
        if source_rows.is_empty() {
            warn!(index = pos, "证据摘要：source_indices 无效，跳过");
            continue;
        }

        let base = source_rows[0];
        let avg_weight = source_rows.iter().map(|r| r.source_weight).sum::<f64>()
            / source_rows.len() as f64;
        let merged_weight =
            ((avg_weight * confidence.max(0.3)).clamp(0.0, 1.0) * 10_000.0).round() / 10_000.0;

        // First occurrence wins; insertion order preserved.
        let mut seen_urls = std::collections::HashSet::new();
        let merged_urls: Vec<String> = source_rows
            .iter()
            .map(|r| r.url.clone())
            .filter(|u| !u.is_empty() && seen_urls.insert(u.clone()))
            .collect();
        let mut seen_sources = std::collections::HashSet::new();
        let merged_sources: Vec<String> = source_rows
            .iter()
            .map(|r| r.source.clone())
            .filter(|s| !s.is_empty() && seen_sources.insert(s.clone()))
            .collect();

        let raw_snippet: String = merged_urls.join(" | ").chars().take(1200).collect();
        let source_urls: Vec<String> = merged_urls.into_iter().take(10).collect();
        let source_label: String = merged_sources.join(" + ").chars().take(180).collect();

        let idx = result.len() + 1;
        trace::record(
            "DEBUG_EVIDENCE_SUMMARY",
            "evidence_summary",
            "built",
            json!({"evidence_id": format!("s{idx}"), "source_urls": source_urls.len()}),
        );

        result.push(EvidenceItem {
            evidence_id: format!("s{idx}"),
            claim_id: base.claim_id.clone(),
            title: format!("综合证据摘要 {idx}"),
            source: if source_label.is_empty() {
                "web-summary".to_string()
            } else {
                source_label
            },
            url: base.url.clone(),
            published_at: base.published_at.clone(),
            summary: if summary_text.is_empty() {
                base.summary.clone()
            } else {
                summary_text
            },
            stance,
            source_weight: merged_weight,
            source_type: SourceType::WebSummary,
            retrieved_at: base.retrieved_at.clone(),
            domain: base.domain.clone(),
            is_authoritative: Some(
                source_rows
                    .iter()
                    .all(|r| r.is_authoritative.unwrap_or(false)),
            ),
            raw_snippet: Some(raw_snippet),
            alignment_rationale: None,
            alignment_confidence: None,
            source_urls: Some(source_urls),
        });
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evidence(id: &str, url: &str, weight: f64) -> EvidenceItem {
        EvidenceItem {
            evidence_id: id.to_string(),
            claim_id: "c1".to_string(),
            title: format!("标题 {id}"),
            source: format!("source-{id}"),
            url: url.to_string(),
            published_at: "2026-01-01".to_string(),
            summary: format!("摘要 {id}"),
            stance: Stance::Insufficient,
            source_weight: weight,
            source_type: SourceType::WebLive,
            retrieved_at: None,
            domain: Some("general".to_string()),
            is_authoritative: Some(true),
            raw_snippet: None,
            alignment_rationale: None,
            alignment_confidence: None,
            source_urls: None,
        }
    }

    #[tokio::test]
    async fn test_single_row_passes_through() {
        let rows = vec![evidence("e1", "https://a.example.com", 0.8)];
        let result = summarize_evidence_for_claim("主张", rows.clone(), None).await;
        assert_eq!(result, rows);
    }

    #[tokio::test]
    async fn test_empty_passes_through() {
        let result = summarize_evidence_for_claim("主张", Vec::new(), None).await;
        assert!(result.is_empty());
    }

    #[test]
    fn test_build_summary_merges_fields() {
        let rows = vec![
            evidence("e1", "https://a.example.com", 0.8),
            evidence("e2", "https://b.example.com", 0.6),
            evidence("e3", "https://a.example.com", 0.4),
        ];
        let payload = json!({"summaries": [{
            "summary_text": "合并后的摘要",
            "stance_hint": "支持",
            "confidence": 0.9,
            "source_indices": [0, 1, 2],
        }]});
        let result = build_summary_evidences(&payload, &rows, 5);
        assert_eq!(result.len(), 1);
        let merged = &result[0];
        assert_eq!(merged.evidence_id, "s1");
        assert_eq!(merged.source_type, SourceType::WebSummary);
        assert_eq!(merged.stance, Stance::Support);
        // Shared URL contributes once, insertion order kept.
        assert_eq!(
            merged.source_urls.as_deref(),
            Some(&["https://a.example.com".to_string(), "https://b.example.com".to_string()][..])
        );
        // avg(0.8, 0.6, 0.4) * 0.9 = 0.54
        assert!((merged.source_weight - 0.54).abs() < 1e-9);
        assert_eq!(merged.url, "https://a.example.com");
    }

    #[test]
    fn test_build_summary_skips_invalid_indices() {
        let rows = vec![
            evidence("e1", "https://a.example.com", 0.8),
            evidence("e2", "https://b.example.com", 0.6),
        ];
        let payload = json!({"summaries": [
            {"summary_text": "无效", "stance_hint": "支持", "confidence": 0.9, "source_indices": [9]},
            {"summary_text": "有效", "stance_hint": "反对", "confidence": 0.5, "source_indices": [1]},
        ]});
        let result = build_summary_evidences(&payload, &rows, 5);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].summary, "有效");
        assert_eq!(result[0].stance, Stance::Refute);
        assert_eq!(result[0].evidence_id, "s1");
    }

    #[test]
    fn test_confidence_floor_in_weight() {
        let rows = vec![
            evidence("e1", "https://a.example.com", 1.0),
            evidence("e2", "https://b.example.com", 1.0),
        ];
        let payload = json!({"summaries": [{
            "summary_text": "低置信摘要",
            "stance_hint": "证据不足",
            "confidence": 0.1,
            "source_indices": [0, 1],
        }]});
        let result = build_summary_evidences(&payload, &rows, 5);
        // avg(1.0) * max(0.3, 0.1) = 0.3
        assert!((result[0].source_weight - 0.3).abs() < 1e-9);
    }
}
