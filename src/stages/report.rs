//! Report stage: walk the per-claim stances into a score, band it, and
//! assemble the final report. An optional LM pass replaces the summary and
//! suspicious points and adds per-claim conclusions; the deterministic
//! template is the fallback.

use std::collections::BTreeMap;

use serde_json::{json, Value};
use tracing::info;

use crate::config::{self, LlmSettings};
use crate::llm::{self, trace};
use crate::stages::retrieval::detect_scenario;
use crate::types::{
    score_band, ClaimItem, ClaimReport, EvidenceItem, Report, Scenario, Stance,
};

/// Build the report from claims and already-aligned evidence.
pub async fn build_report(
    claims: &[ClaimItem],
    evidences: &[EvidenceItem],
    original_text: &str,
) -> Report {
    let mut by_claim: BTreeMap<&str, Vec<EvidenceItem>> = BTreeMap::new();
    for item in evidences {
        by_claim
            .entry(item.claim_id.as_str())
            .or_default()
            .push(item.clone());
    }

    let mut score: i64 = 55;
    let mut suspicious_points = Vec::new();
    let mut claim_reports = Vec::new();

    for claim in claims {
        let aligned = by_claim.remove(claim.claim_id.as_str()).unwrap_or_default();

        // Weighted stance vote: weight * max(0.2, alignment confidence).
        let mut weighted: BTreeMap<Stance, f64> = BTreeMap::new();
        let mut rationales = Vec::new();
        for item in &aligned {
            let confidence = item.alignment_confidence.unwrap_or(0.5);
            *weighted.entry(item.stance).or_insert(0.0) +=
                item.source_weight * confidence.max(0.2);
            if let Some(rationale) = &item.alignment_rationale {
                rationales.push(rationale.clone());
            }
        }
        let stance = weighted
            .iter()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(s, _)| *s)
            .unwrap_or(Stance::Insufficient);

        let mut notes = vec![
            format!("主立场：{stance}"),
            format!("证据数量：{}", aligned.len()),
        ];
        if let Some(first) = rationales.first() {
            notes.push(format!("对齐结论：{first}"));
        }

        match stance {
            Stance::Refute => {
                score -= 12;
                suspicious_points.push(format!("{} 被证据反驳", claim.claim_id));
            }
            Stance::Support => {
                score += 6;
            }
            Stance::Insufficient => {
                score -= 4;
                suspicious_points.push(format!("{} 证据不足以形成明确支持", claim.claim_id));
            }
        }

        claim_reports.push(ClaimReport {
            claim: claim.clone(),
            evidences: aligned,
            final_stance: stance,
            notes,
        });
    }

    let score = score.clamp(0, 100);
    let (risk_level, risk_label) = score_band(score);

    let scenario = if claims.is_empty() {
        Scenario::General
    } else {
        let text_for_scenario: String = claims
            .iter()
            .take(3)
            .map(|c| c.claim_text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        detect_scenario(&text_for_scenario)
    };

    let mut domain_set: Vec<String> = evidences
        .iter()
        .filter_map(|e| e.domain.clone())
        .filter(|d| !d.is_empty())
        .collect();
    domain_set.sort();
    domain_set.dedup();

    let (summary, suspicious_points, claim_reports) = match generate_with_llm(
        original_text,
        claims,
        &claim_reports,
        score,
        scenario,
    )
    .await
    {
        Some(overlay) => apply_llm_overlay(overlay, claim_reports, suspicious_points, claims, evidences),
        None => {
            let fallback = fallback_report(claims, &claim_reports, score);
            (
                fallback.0,
                if fallback.1.is_empty() {
                    suspicious_points
                } else {
                    fallback.1
                },
                merge_conclusions(claim_reports, &fallback.2),
            )
        }
    };

    let suspicious_points = if suspicious_points.is_empty() {
        vec!["暂未发现关键矛盾点，建议持续监测。".to_string()]
    } else {
        suspicious_points
    };

    Report {
        risk_score: score,
        risk_level,
        risk_label,
        detected_scenario: scenario,
        evidence_domains: domain_set,
        summary,
        suspicious_points,
        claim_reports,
    }
}

// ============================================================================
// LM overlay
// ============================================================================

struct LlmOverlay {
    summary: String,
    suspicious_points: Vec<String>,
    claim_conclusions: BTreeMap<String, String>,
    risk_reasoning: String,
}

async fn generate_with_llm(
    original_text: &str,
    claims: &[ClaimItem],
    claim_reports: &[ClaimReport],
    risk_score: i64,
    scenario: Scenario,
) -> Option<LlmOverlay> {
    if !config::stage_llm_enabled("REPORT_LLM_ENABLED") {
        trace::record(
            "DEBUG_REPORT",
            "report",
            "input",
            json!({"path": "rule_fallback", "reason": "llm_disabled", "risk_score": risk_score}),
        );
        return None;
    }

    let mut lines = Vec::new();
    for cr in claim_reports {
        lines.push(format!("\n### 主张 {}", cr.claim.claim_id));
        lines.push(format!("内容: {}", cr.claim.claim_text));
        if let Some(entity) = &cr.claim.entity {
            lines.push(format!("实体: {entity}"));
        }
        if let Some(time) = &cr.claim.time {
            lines.push(format!("时间: {time}"));
        }
        lines.push(format!("最终立场: {}", cr.final_stance));
        lines.push(format!("证据数量: {}", cr.evidences.len()));
        for ev in cr.evidences.iter().take(3) {
            let conf = ev
                .alignment_confidence
                .map(|c| format!("{c:.2}"))
                .unwrap_or_else(|| "N/A".to_string());
            let title: String = ev.title.chars().take(50).collect();
            lines.push(format!("  - [{}] {title} (置信度: {conf})", ev.stance));
        }
    }

    let text_preview: String = original_text.chars().take(800).collect();
    let prompt = format!(
        "你是事实核查专家，基于以下信息生成综合报告。\n\n\
         【原始文本】\n{text_preview}\n\n\
         【提取的主张】({} 条)\n{}\n\n\
         【分析结果】\n- 场景类型: {scenario}\n- 初始风险分数: {risk_score}\n\n\
         【输出要求】\n\
         1. summary: 综合摘要（80-150字），结合原始文本语气，突出关键发现，判断是否存在\
         \u{201c}旧闻新炒\u{201d}、\u{201c}时间错位\u{201d}、\u{201c}数据夸大\u{201d}等问题\n\
         2. suspicious_points: 2-4个可疑点\n\
         3. claim_conclusions: 每条主张的结论（30-50字）\n\
         4. risk_reasoning: 风险评级理由（50字以内）\n\n\
         输出严格 JSON 格式：\n\
         {{\"summary\": \"...\", \"suspicious_points\": [\"...\"], \
         \"claim_conclusions\": [{{\"claim_id\": \"c1\", \"conclusion\": \"...\"}}], \
         \"risk_reasoning\": \"...\"}}",
        claims.len(),
        lines.join("\n"),
    );

    let mut settings = LlmSettings::for_stage("REPORT_LLM_MODEL");
    settings.timeout_secs = config::float_var("REPORT_TIMEOUT_SEC", 30.0, 1.0, 600.0);
    let opts = llm::CallOptions::new(settings, "report", "DEBUG_REPORT")
        .temperature(0.5)
        .max_tokens(4000)
        .plain_response();
    let parsed = llm::call_json(
        "你是事实核查专家，擅长分析新闻文本的可信度并生成专业报告。输出必须为严格的 JSON 格式。",
        &prompt,
        &opts,
    )
    .await?;

    let summary = parsed
        .get("summary")
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim()
        .to_string();
    let suspicious_points: Vec<String> = parsed
        .get("suspicious_points")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .filter(|s| !s.is_empty())
                .take(4)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let mut claim_conclusions = BTreeMap::new();
    if let Some(items) = parsed.get("claim_conclusions").and_then(Value::as_array) {
        for item in items {
            let id = item.get("claim_id").and_then(Value::as_str).unwrap_or("");
            let conclusion = item
                .get("conclusion")
                .and_then(Value::as_str)
                .unwrap_or("")
                .trim();
            if !id.is_empty() && !conclusion.is_empty() {
                claim_conclusions.insert(id.to_string(), conclusion.to_string());
            }
        }
    }
    let risk_reasoning = parsed
        .get("risk_reasoning")
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim()
        .to_string();

    info!("[Report] LLM report generation succeeded");
    Some(LlmOverlay {
        summary,
        suspicious_points,
        claim_conclusions,
        risk_reasoning,
    })
}

fn apply_llm_overlay(
    overlay: LlmOverlay,
    mut claim_reports: Vec<ClaimReport>,
    rule_points: Vec<String>,
    claims: &[ClaimItem],
    evidences: &[EvidenceItem],
) -> (String, Vec<String>, Vec<ClaimReport>) {
    for cr in &mut claim_reports {
        if let Some(conclusion) = overlay.claim_conclusions.get(&cr.claim.claim_id) {
            if !conclusion.is_empty() {
                cr.notes.insert(0, conclusion.clone());
            }
        }
    }

    let mut summary = overlay.summary;
    if summary.is_empty() {
        summary = format!(
            "已处理 {} 条主张，匹配 {} 条证据。",
            claims.len(),
            evidences.len()
        );
    } else if !overlay.risk_reasoning.is_empty() {
        summary = format!("{summary} {}", overlay.risk_reasoning);
    }

    let points = if overlay.suspicious_points.is_empty() {
        rule_points
    } else {
        overlay.suspicious_points
    };

    (summary, points, claim_reports)
}

// ============================================================================
// Rule fallback
// ============================================================================

/// Deterministic fallback keyed on the numeric score.
fn fallback_report(
    claims: &[ClaimItem],
    claim_reports: &[ClaimReport],
    risk_score: i64,
) -> (String, Vec<String>, BTreeMap<String, String>) {
    let support_count = claim_reports
        .iter()
        .filter(|cr| cr.final_stance == Stance::Support)
        .count();
    let refute_count = claim_reports
        .iter()
        .filter(|cr| cr.final_stance == Stance::Refute)
        .count();
    let insufficient_count = claim_reports
        .iter()
        .filter(|cr| cr.final_stance == Stance::Insufficient)
        .count();

    let summary = if risk_score >= 75 {
        format!(
            "经核查，该内容可信度较高。共分析 {} 条主张，其中 {support_count} 条获证据支持，未发现明显矛盾。证据充分，主张与证据一致，无明显风险点。",
            claims.len()
        )
    } else if risk_score >= 55 {
        format!(
            "经核查，该内容需要补充语境。共分析 {} 条主张，{insufficient_count} 条证据不足，建议进一步核实。部分主张证据不足，存在信息不完整的情况。",
            claims.len()
        )
    } else if risk_score >= 35 {
        format!(
            "经核查，该内容存在可疑之处。共分析 {} 条主张，{refute_count} 条被证据反驳，需谨慎对待。部分主张与证据矛盾，存在虚假信息风险。",
            claims.len()
        )
    } else {
        format!(
            "经核查，该内容存在较高风险。共分析 {} 条主张，{refute_count} 条被证据反驳，建议核实来源。多条主张与证据矛盾，虚假信息风险较高。",
            claims.len()
        )
    };

    let mut suspicious_points = Vec::new();
    for cr in claim_reports {
        match cr.final_stance {
            Stance::Refute => {
                suspicious_points.push(format!("{} 被证据直接反驳", cr.claim.claim_id))
            }
            Stance::Insufficient => {
                suspicious_points.push(format!("{} 缺乏有效证据支持", cr.claim.claim_id))
            }
            Stance::Support => {}
        }
    }
    if suspicious_points.is_empty() {
        suspicious_points.push("暂未发现明显矛盾点，建议持续关注。".to_string());
    }
    suspicious_points.truncate(4);

    let mut conclusions = BTreeMap::new();
    for cr in claim_reports {
        let conclusion = match cr.final_stance {
            Stance::Refute => "该主张与证据存在矛盾，建议谨慎采信。",
            Stance::Support => "该主张获得证据支持，可信度较高。",
            Stance::Insufficient => "该主张证据不足，需进一步核实。",
        };
        conclusions.insert(cr.claim.claim_id.clone(), conclusion.to_string());
    }

    trace::record(
        "DEBUG_REPORT",
        "report",
        "fallback_output",
        json!({
            "path": "rule",
            "support_count": support_count,
            "refute_count": refute_count,
            "insufficient_count": insufficient_count,
        }),
    );

    (summary, suspicious_points, conclusions)
}

fn merge_conclusions(
    mut claim_reports: Vec<ClaimReport>,
    conclusions: &BTreeMap<String, String>,
) -> Vec<ClaimReport> {
    for cr in &mut claim_reports {
        if let Some(conclusion) = conclusions.get(&cr.claim.claim_id) {
            cr.notes.insert(0, conclusion.clone());
        }
    }
    claim_reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RiskLabel, RiskLevel, SourceType};

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

    fn aligned_evidence(claim_id: &str, stance: Stance, confidence: f64) -> EvidenceItem {
        EvidenceItem {
            evidence_id: "e1".to_string(),
            claim_id: claim_id.to_string(),
            title: "证据".to_string(),
            source: "test".to_string(),
            url: "https://example.com".to_string(),
            published_at: "2026-01-01".to_string(),
            summary: "证据摘要".to_string(),
            stance,
            source_weight: 0.8,
            source_type: SourceType::WebSummary,
            retrieved_at: None,
            domain: Some("media".to_string()),
            is_authoritative: None,
            raw_snippet: None,
            alignment_rationale: Some("对齐理由".to_string()),
            alignment_confidence: Some(confidence),
            source_urls: None,
        }
    }

    #[tokio::test]
    async fn test_score_walk_and_bands() {
        // Two refuted claims: 55 - 12 - 12 = 31 -> critical band.
        let claims = vec![claim("c1", "主张一"), claim("c2", "主张二")];
        let evidences = vec![
            aligned_evidence("c1", Stance::Refute, 0.9),
            aligned_evidence("c2", Stance::Refute, 0.9),
        ];
        let report = build_report(&claims, &evidences, "原文").await;
        assert_eq!(report.risk_score, 31);
        assert_eq!(report.risk_level, RiskLevel::Critical);
        assert_eq!(report.risk_label, RiskLabel::LikelyMisinformation);
        assert_eq!(report.suspicious_points.len(), 2);
        assert!(report.suspicious_points[0].contains("c1"));
    }

    #[tokio::test]
    async fn test_support_raises_score() {
        let claims = vec![claim("c1", "主张一")];
        let evidences = vec![aligned_evidence("c1", Stance::Support, 0.9)];
        let report = build_report(&claims, &evidences, "原文").await;
        assert_eq!(report.risk_score, 61);
        assert_eq!(report.risk_level, RiskLevel::Medium);
        assert_eq!(report.risk_label, RiskLabel::NeedsContext);
        // Support contributes no suspicious point; the fallback fills in.
        assert!(!report.suspicious_points.is_empty());
    }

    #[tokio::test]
    async fn test_claim_without_evidence_counts_insufficient() {
        let claims = vec![claim("c1", "主张一")];
        let report = build_report(&claims, &[], "原文").await;
        assert_eq!(report.risk_score, 51);
        assert_eq!(report.claim_reports[0].final_stance, Stance::Insufficient);
        assert!(report
            .suspicious_points
            .iter()
            .any(|p| p.contains("c1")));
    }

    #[tokio::test]
    async fn test_domains_sorted_unique() {
        let claims = vec![claim("c1", "主张一")];
        let mut e1 = aligned_evidence("c1", Stance::Support, 0.9);
        e1.domain = Some("media".to_string());
        let mut e2 = aligned_evidence("c1", Stance::Support, 0.9);
        e2.domain = Some("health".to_string());
        let mut e3 = aligned_evidence("c1", Stance::Support, 0.9);
        e3.domain = Some("media".to_string());
        let report = build_report(&claims, &[e1, e2, e3], "原文").await;
        assert_eq!(report.evidence_domains, vec!["health", "media"]);
    }

    #[tokio::test]
    async fn test_scenario_voted_from_claims() {
        let claims = vec![claim("c1", "某医院疫苗疫情感染率数据")];
        let report = build_report(&claims, &[], "原文").await;
        assert_eq!(report.detected_scenario, Scenario::Health);
    }

    #[tokio::test]
    async fn test_fallback_notes_prepend_conclusion() {
        let claims = vec![claim("c1", "主张一")];
        let evidences = vec![aligned_evidence("c1", Stance::Refute, 0.9)];
        let report = build_report(&claims, &evidences, "原文").await;
        assert!(report.claim_reports[0].notes[0].contains("谨慎采信"));
    }
}
