//! Response-content generation: clarification drafts in three lengths, an
//! FAQ, and per-platform posting scripts, all bound to a report and an
//! optional simulation result.

use chrono::Utc;
use serde_json::{json, Value};
use tracing::info;

use crate::config::{self, LlmSettings};
use crate::llm;
use crate::types::{
    ClarificationContent, ContentBundle, FaqItem, PlatformScript, Report, SimulateResponse,
};

/// Generate the full content bundle. LM path when enabled, deterministic
/// fallback otherwise.
pub async fn generate_full_content(
    input_text: &str,
    report: &Report,
    simulation: Option<&SimulateResponse>,
    style: &str,
) -> ContentBundle {
    if config::stage_llm_enabled("CONTENT_LLM_ENABLED") {
        if let Some(bundle) = generate_with_llm(input_text, report, simulation, style).await {
            info!("[Content] LLM content generation succeeded");
            return bundle;
        }
    }
    fallback_content(report, style)
}

async fn generate_with_llm(
    input_text: &str,
    report: &Report,
    simulation: Option<&SimulateResponse>,
    style: &str,
) -> Option<ContentBundle> {
    let settings = LlmSettings::for_stage("CONTENT_LLM_MODEL");
    let preview: String = input_text.chars().take(600).collect();
    let suggestion_summary = simulation
        .map(|s| s.suggestion.summary.as_str())
        .unwrap_or("");
    let prompt = format!(
        "你是舆情应对内容撰写专家。基于核查报告生成应对内容，语气风格：{style}。\n\n\
         【原始文本】\n{preview}\n\n\
         【核查结论】风险标签 {}，风险分数 {}，摘要：{}\n\
         【可疑点】{}\n\
         【预演建议】{suggestion_summary}\n\n\
         【输出要求】\n\
         1. clarification: 澄清稿三个版本 short(80字内)/medium(200字内)/long(500字内)\n\
         2. faq: 3-5 条常见问题与回答\n\
         3. platform_scripts: weibo/wechat 两个平台的发布话术，各带 1-2 条 tips\n\n\
         输出严格 JSON 格式：\n\
         {{\"clarification\": {{\"short\": \"...\", \"medium\": \"...\", \"long\": \"...\"}}, \
         \"faq\": [{{\"question\": \"...\", \"answer\": \"...\", \"category\": \"general\"}}], \
         \"platform_scripts\": [{{\"platform\": \"weibo\", \"content\": \"...\", \"tips\": [\"...\"]}}]}}",
        report.risk_label,
        report.risk_score,
        report.summary,
        report.suspicious_points.join(" / "),
    );

    let opts = llm::CallOptions::new(settings, "content", "DEBUG_CONTENT").temperature(0.4);
    let parsed = llm::call_json(
        "你是严谨的舆情应对内容助手，只返回JSON。",
        &prompt,
        &opts,
    )
    .await?;

    let clarification = parsed.get("clarification").and_then(|c| {
        Some(ClarificationContent {
            short: c.get("short").and_then(Value::as_str)?.to_string(),
            medium: c.get("medium").and_then(Value::as_str).unwrap_or("").to_string(),
            long: c.get("long").and_then(Value::as_str).unwrap_or("").to_string(),
        })
    })?;

    let faq: Vec<FaqItem> = parsed
        .get("faq")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    Some(FaqItem {
                        question: item.get("question").and_then(Value::as_str)?.to_string(),
                        answer: item.get("answer").and_then(Value::as_str)?.to_string(),
                        category: item
                            .get("category")
                            .and_then(Value::as_str)
                            .unwrap_or("general")
                            .to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let platform_scripts: Vec<PlatformScript> = parsed
        .get("platform_scripts")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    Some(PlatformScript {
                        platform: item.get("platform").and_then(Value::as_str)?.to_string(),
                        content: item.get("content").and_then(Value::as_str)?.to_string(),
                        tips: item
                            .get("tips")
                            .and_then(Value::as_array)
                            .map(|tips| {
                                tips.iter()
                                    .filter_map(Value::as_str)
                                    .map(str::to_string)
                                    .collect()
                            })
                            .unwrap_or_default(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Some(ContentBundle {
        clarification,
        faq,
        platform_scripts,
        generated_at: Utc::now().to_rfc3339(),
        based_on: json!({
            "risk_level": report.risk_level,
            "risk_label": report.risk_label,
            "style": style,
            "with_simulation": simulation.is_some(),
        }),
    })
}

/// Deterministic bundle keyed on the report verdict.
fn fallback_content(report: &Report, style: &str) -> ContentBundle {
    let label = report.risk_label;
    let verdict_line = format!(
        "经核查，该内容判定为【{label}】（风险分数 {}）。{}",
        report.risk_score, report.summary
    );
    let points = if report.suspicious_points.is_empty() {
        "暂无".to_string()
    } else {
        report.suspicious_points.join("；")
    };

    let short = verdict_line.clone();
    let medium = format!("{verdict_line}\n主要可疑点：{points}。请以权威来源为准，勿轻信转发。");
    let long = format!(
        "{verdict_line}\n\n主要可疑点：{points}。\n\n建议处理方式：\
         1）优先查证官方通报与权威媒体报道；\
         2）不转发未经证实的细节；\
         3）如发现进一步证据，可补充检索后更新结论。"
    );

    let faq = vec![
        FaqItem {
            question: "这条信息可信吗？".to_string(),
            answer: format!("当前核查结论为【{label}】，建议结合权威来源综合判断。"),
            category: "general".to_string(),
        },
        FaqItem {
            question: "为什么会得出这个结论？".to_string(),
            answer: format!("结论来自主张级证据对齐：{points}。"),
            category: "general".to_string(),
        },
        FaqItem {
            question: "我应该怎么做？".to_string(),
            answer: "不确定时先不转发，优先等待并查证官方渠道的说明。".to_string(),
            category: "action".to_string(),
        },
    ];

    let platform_scripts = vec![
        PlatformScript {
            platform: "weibo".to_string(),
            content: format!("【核查速报】{verdict_line}"),
            tips: vec!["先给结论，证据链接放评论区置顶".to_string()],
        },
        PlatformScript {
            platform: "wechat".to_string(),
            content: format!("{verdict_line}\n\n详细证据与来源见正文。"),
            tips: vec!["补充来源与时间线，避免只给结论".to_string()],
        },
    ];

    ContentBundle {
        clarification: ClarificationContent { short, medium, long },
        faq,
        platform_scripts,
        generated_at: Utc::now().to_rfc3339(),
        based_on: json!({
            "risk_level": report.risk_level,
            "risk_label": report.risk_label,
            "style": style,
            "path": "rule",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Scenario;

    fn report(score: i64) -> Report {
        let (risk_level, risk_label) = crate::types::score_band(score);
        Report {
            risk_score: score,
            risk_level,
            risk_label,
            detected_scenario: Scenario::General,
            evidence_domains: vec!["media".to_string()],
            summary: "测试摘要。".to_string(),
            suspicious_points: vec!["c1 被证据反驳".to_string()],
            claim_reports: Vec::new(),
        }
    }

    #[test]
    fn test_fallback_has_three_clarification_lengths() {
        let bundle = fallback_content(&report(40), "formal");
        assert!(!bundle.clarification.short.is_empty());
        assert!(bundle.clarification.medium.len() > bundle.clarification.short.len());
        assert!(bundle.clarification.long.len() > bundle.clarification.medium.len());
        assert_eq!(bundle.faq.len(), 3);
        assert_eq!(bundle.platform_scripts.len(), 2);
    }

    #[test]
    fn test_fallback_carries_report_verdict() {
        let bundle = fallback_content(&report(20), "short");
        assert!(bundle.clarification.short.contains("likely_misinformation"));
        assert_eq!(bundle.based_on["risk_label"], "likely_misinformation");
    }

    #[tokio::test]
    async fn test_generate_defaults_to_fallback_without_llm() {
        let bundle = generate_full_content("原文", &report(50), None, "formal").await;
        assert_eq!(bundle.based_on["path"], "rule");
    }
}
