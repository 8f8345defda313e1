//! Evidence alignment: the stance judgment between one claim and one
//! evidence row.
//!
//! The rule ladder is ordered; the first rule that fires wins:
//! risk+refute -> refute, official+overlap -> support, low overlap ->
//! insufficient, inherit retrieval stance, default insufficient.

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::{self, LlmSettings};
use crate::llm::{self, trace};
use crate::stages::retrieval::tokenize;
use crate::types::{EvidenceItem, Stance};

/// Outcome of aligning one (claim, evidence) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentResult {
    pub stance: Stance,
    pub confidence: f64,
    pub rationale: String,
}

const RISK_TERMS: [&str; 12] = [
    "shocking", "internal", "inside", "100", "must", "share", "rumor", "miracle",
    "震惊", "内部消息", "必须转发", "旧闻翻炒",
];

const OFFICIAL_TERMS: [&str; 9] = [
    "official", "statement", "bulletin", "guidance", "notice",
    "通报", "公告", "官方", "权威",
];

const REFUTE_TERMS: [&str; 8] = [
    "myth", "misconception", "fact-check", "misleading", "rumor-control",
    "辟谣", "谣言", "断章取义",
];

/// Align one claim with one evidence row: LM path when enabled, rule path
/// otherwise or on LM failure.
pub async fn align_claim_with_evidence(
    claim_text: &str,
    evidence: &EvidenceItem,
) -> AlignmentResult {
    trace::record(
        "DEBUG_ALIGNMENT",
        "alignment",
        "input",
        json!({
            "claim_text": claim_text.chars().take(200).collect::<String>(),
            "evidence_id": evidence.evidence_id,
            "evidence_stance": evidence.stance,
            "evidence_source_weight": evidence.source_weight,
        }),
    );

    if config::stage_llm_enabled("ALIGNMENT_LLM_ENABLED") {
        info!("证据对齐：LLM模式已启用，开始尝试LLM对齐");
        if let Some(result) = align_with_llm(claim_text, evidence).await {
            info!(
                stance = %result.stance,
                confidence = result.confidence,
                "证据对齐：LLM对齐成功"
            );
            trace::record(
                "DEBUG_ALIGNMENT",
                "alignment",
                "llm_output",
                json!({"path": "llm", "stance": result.stance, "confidence": result.confidence}),
            );
            return result;
        }
        warn!("证据对齐：LLM对齐失败，已回退规则对齐");
    }

    let result = align_rule_based(claim_text, evidence);
    trace::record(
        "DEBUG_ALIGNMENT",
        "alignment",
        "rule_output",
        json!({"path": "rule", "stance": result.stance, "confidence": result.confidence}),
    );
    result
}

async fn align_with_llm(claim_text: &str, evidence: &EvidenceItem) -> Option<AlignmentResult> {
    let settings = LlmSettings::for_stage("ALIGNMENT_LLM_MODEL");
    let prompt = "你是证据对齐引擎。请根据 主张 与 证据 判断关系，并只返回严格 JSON。\n\
                  输出结构：{\"stance\":\"支持|反对|证据不足\",\"confidence\":0~1,\"rationale\":\"中文解释\"}\n\
                  要求：\n\
                  1）只输出 JSON，不要额外文本。\n\
                  2）当证据不足时必须返回 证据不足。\n\
                  3）rationale 用简洁中文说明主要依据。";

    let opts = llm::CallOptions::new(settings, "alignment", "DEBUG_ALIGNMENT");
    let parsed = llm::call_json(
        "你是严谨的事实核验助手。",
        &format!(
            "{prompt}\n\n主张:\n{claim_text}\n\n证据标题:\n{}\n\n证据总结:\n{}\n\n证据源:{}, 权重:{}",
            evidence.title, evidence.summary, evidence.source, evidence.source_weight
        ),
        &opts,
    )
    .await?;

    normalize_llm_result(&parsed)
}

fn normalize_llm_result(payload: &Value) -> Option<AlignmentResult> {
    let stance_raw = payload.get("stance").and_then(Value::as_str)?;
    let stance = Stance::normalize(stance_raw);

    let confidence = payload
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(0.5)
        .clamp(0.0, 1.0);
    let rationale = payload
        .get("rationale")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("模型未提供理由，已回退默认说明。")
        .to_string();

    Some(AlignmentResult {
        stance,
        confidence: (confidence * 100.0).round() / 100.0,
        rationale,
    })
}

/// Rule ladder. Overlap and source weight combine into the base score
/// (0.55 / 0.45); the ordering of the rules is normative.
pub fn align_rule_based(claim_text: &str, evidence: &EvidenceItem) -> AlignmentResult {
    let evidence_text = format!("{} {}", evidence.title, evidence.summary).to_lowercase();

    let claim_tokens = tokenize(claim_text);
    let evidence_tokens = tokenize(&evidence_text);
    let overlap_ratio = if claim_tokens.is_empty() {
        0.0
    } else {
        claim_tokens.intersection(&evidence_tokens).count() as f64 / claim_tokens.len() as f64
    };

    let token_hit = |tokens: &std::collections::HashSet<String>, terms: &[&str]| {
        terms.iter().any(|t| tokens.contains(*t))
    };
    let has_risk = token_hit(&claim_tokens, &RISK_TERMS);
    let has_official = token_hit(&evidence_tokens, &OFFICIAL_TERMS);
    let has_refute = token_hit(&evidence_tokens, &REFUTE_TERMS);

    let score = ((overlap_ratio * 0.55 + evidence.source_weight * 0.45).clamp(0.0, 1.0) * 100.0)
        .round()
        / 100.0;

    let result = if has_risk && has_refute {
        AlignmentResult {
            stance: Stance::Refute,
            confidence: score.max(0.55),
            rationale: "主张含高风险传播话术，且证据来自辟谣或误导说明来源，倾向反驳。".to_string(),
        }
    } else if has_official && overlap_ratio >= 0.15 {
        AlignmentResult {
            stance: Stance::Support,
            confidence: score.max(0.5),
            rationale: "证据来自官方通报或权威说明，且与主张关键词存在匹配，倾向支持。".to_string(),
        }
    } else if overlap_ratio < 0.08 {
        AlignmentResult {
            stance: Stance::Insufficient,
            confidence: score.min(0.5),
            rationale: "主张与证据关键词重合较低，当前证据不足以直接判断。".to_string(),
        }
    } else if matches!(evidence.stance, Stance::Support | Stance::Refute) {
        AlignmentResult {
            stance: evidence.stance,
            confidence: score.max(0.45),
            rationale: "检索来源与关键词匹配可用，沿用检索阶段立场并给出中等置信度。".to_string(),
        }
    } else {
        AlignmentResult {
            stance: Stance::Insufficient,
            confidence: score.min(0.55),
            rationale: "证据与主张存在部分相关，但不足以构成明确支持或反驳。".to_string(),
        }
    };

    trace::record(
        "DEBUG_ALIGNMENT",
        "alignment",
        "rule_calculation",
        json!({
            "overlap_ratio": overlap_ratio,
            "source_weight": evidence.source_weight,
            "base_score": score,
            "has_risk": has_risk,
            "has_official": has_official,
            "has_refute": has_refute,
            "result_stance": result.stance,
            "result_confidence": result.confidence,
        }),
    );

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceType;

    fn evidence(title: &str, summary: &str, stance: Stance, weight: f64) -> EvidenceItem {
        EvidenceItem {
            evidence_id: "e1".to_string(),
            claim_id: "c1".to_string(),
            title: title.to_string(),
            source: "test".to_string(),
            url: "https://example.com".to_string(),
            published_at: "2026-01-01".to_string(),
            summary: summary.to_string(),
            stance,
            source_weight: weight,
            source_type: SourceType::WebLive,
            retrieved_at: None,
            domain: None,
            is_authoritative: None,
            raw_snippet: None,
            alignment_rationale: None,
            alignment_confidence: None,
            source_urls: None,
        }
    }

    #[test]
    fn test_risk_plus_refute_wins_first() {
        let ev = evidence("官方辟谣专栏", "该消息为谣言", Stance::Support, 0.9);
        let result = align_rule_based("震惊 内部消息 必须转发", &ev);
        assert_eq!(result.stance, Stance::Refute);
        assert!(result.confidence >= 0.55);
    }

    #[test]
    fn test_official_support_requires_overlap() {
        let ev = evidence(
            "官方通报 疫苗 安全 数据",
            "权威 公告 确认 疫苗 安全 数据 属实",
            Stance::Insufficient,
            0.9,
        );
        let result = align_rule_based("疫苗 安全 数据", &ev);
        assert_eq!(result.stance, Stance::Support);
        assert!(result.confidence >= 0.5);
    }

    #[test]
    fn test_low_overlap_insufficient() {
        let ev = evidence("完全无关的主题", "别的领域内容", Stance::Support, 0.2);
        let result = align_rule_based("疫苗 安全 数据", &ev);
        assert_eq!(result.stance, Stance::Insufficient);
        assert!(result.confidence <= 0.5);
    }

    #[test]
    fn test_inherits_retrieval_stance() {
        // Enough overlap to clear the low-overlap rule, no official terms.
        let ev = evidence(
            "疫苗 安全 数据 讨论",
            "疫苗 安全 数据 的一些分析",
            Stance::Refute,
            0.5,
        );
        let result = align_rule_based("疫苗 安全 数据", &ev);
        assert_eq!(result.stance, Stance::Refute);
        assert!(result.confidence >= 0.45);
    }

    #[test]
    fn test_default_insufficient_capped() {
        let ev = evidence(
            "疫苗 安全 数据 介绍",
            "疫苗 安全 数据 的相关内容",
            Stance::Insufficient,
            0.9,
        );
        let result = align_rule_based("疫苗 安全 数据", &ev);
        assert_eq!(result.stance, Stance::Insufficient);
        assert!(result.confidence <= 0.55);
    }

    #[test]
    fn test_llm_normalization_clamps_confidence() {
        let payload = json!({"stance": "支持", "confidence": 3.2, "rationale": "依据充分"});
        let result = normalize_llm_result(&payload).unwrap();
        assert_eq!(result.stance, Stance::Support);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.rationale, "依据充分");
    }
}
