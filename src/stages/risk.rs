//! Risk snapshot stage: the first, cheap verdict on the input text.
//!
//! Score semantics here are risk-ness: 0 = safe, 100 = extremely risky.
//! The attached strategy drives every downstream stage of the turn.

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::{self, LlmSettings};
use crate::llm::{self, trace};
use crate::stages::complexity;
use crate::types::{DetectLabel, DetectResult};

const RISK_KEYWORDS: [&str; 6] = [
    "shocking",
    "internal source",
    "100% true",
    "share immediately",
    "before deleted",
    "cure all diseases",
];

const TRUST_KEYWORDS: [&str; 5] = [
    "official statement",
    "source",
    "reporter",
    "published at",
    "data",
];

/// Run the risk snapshot: LM when enabled, rule scorer otherwise.
pub async fn detect_risk_snapshot(text: &str) -> DetectResult {
    trace::record(
        "DEBUG_RISK_SNAPSHOT",
        "risk_snapshot",
        "input",
        json!({"text": text}),
    );

    if config::stage_llm_enabled("RISK_LLM_ENABLED") {
        info!("风险快照：LLM模式已启用，开始尝试LLM判定");
        if let Some(result) = detect_with_llm(text).await {
            info!(label = %result.label, score = result.score, "风险快照：LLM判定成功");
            trace::record(
                "DEBUG_RISK_SNAPSHOT",
                "risk_snapshot",
                "output",
                json!({"path": "llm", "label": result.label.as_str(), "score": result.score}),
            );
            return result;
        }
        warn!("风险快照：LLM判定失败，已回退规则评分");
    } else {
        info!("风险快照：LLM模式未启用，使用规则评分");
    }

    let result = score_text(text).await;
    trace::record(
        "DEBUG_RISK_SNAPSHOT",
        "risk_snapshot",
        "output",
        json!({"path": "rule", "label": result.label.as_str(), "score": result.score}),
    );
    result
}

async fn detect_with_llm(text: &str) -> Option<DetectResult> {
    let settings = LlmSettings::for_stage("RISK_LLM_MODEL");
    let prompt = "你是风险快照判定器。请根据输入文本输出严格JSON：\
                  {\"label\":\"可信|可疑|高风险|需要补充语境|疑似不实信息\",\
                  \"score\":0-100,\"confidence\":0-1,\"reasons\":[\"中文理由1\",\"中文理由2\"]}。\
                  不要输出任何额外说明。";
    let opts = llm::CallOptions::new(settings, "risk_snapshot", "DEBUG_RISK_SNAPSHOT");
    let parsed = llm::call_json(
        "你是严谨的风险评估助手，只返回JSON。",
        &format!("{prompt}\n\n待分析文本：\n{text}"),
        &opts,
    )
    .await?;

    normalize_llm_result(&parsed, text).await
}

async fn normalize_llm_result(payload: &Value, text: &str) -> Option<DetectResult> {
    let label_raw = payload.get("label").and_then(Value::as_str)?;
    let label = DetectLabel::normalize(label_raw);

    let score = payload
        .get("score")
        .and_then(Value::as_f64)
        .unwrap_or(50.0)
        .clamp(0.0, 100.0) as i64;
    let confidence = payload
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(0.5)
        .clamp(0.0, 1.0);

    let mut reasons: Vec<String> = payload
        .get("reasons")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if reasons.is_empty() {
        reasons.push("模型未返回理由，建议人工复核。".to_string());
    }
    reasons.truncate(5);

    let strategy = complexity::infer_strategy(text, score).await;
    Some(DetectResult {
        label,
        confidence: (confidence * 100.0).round() / 100.0,
        score,
        reasons,
        strategy: Some(strategy),
        truncated: false,
    })
}

/// Rule scorer: keyword hits move the score from the 50 baseline, links
/// pull it down, and the total clamps to [0, 100].
pub fn score_text_risk_only(text: &str) -> (DetectLabel, f64, i64, Vec<String>) {
    let mut value: i64 = 50;
    let mut reasons = Vec::new();

    for word in RISK_KEYWORDS {
        if text.contains(word) {
            value += 12;
            reasons.push(format!("命中高风险词：{word}"));
        }
    }
    for word in TRUST_KEYWORDS {
        if text.contains(word) {
            value -= 6;
            reasons.push(format!("命中可信线索词：{word}"));
        }
    }
    if text.contains("http://") || text.contains("https://") {
        value -= 8;
        reasons.push("包含可追溯链接".to_string());
    }

    value = value.clamp(0, 100);

    let label = if value <= 30 {
        DetectLabel::Credible
    } else if value <= 60 {
        DetectLabel::Suspicious
    } else {
        DetectLabel::HighRisk
    };

    let confidence = ((value - 50).abs() as f64 / 50.0 * 100.0).round() / 100.0;
    if reasons.is_empty() {
        reasons.push("未发现明显风险或可信信号，建议人工复核".to_string());
    }

    (label, confidence, value, reasons)
}

/// Full rule path with strategy attached.
pub async fn score_text(text: &str) -> DetectResult {
    let (label, confidence, score, reasons) = score_text_risk_only(text);
    let strategy = complexity::infer_strategy(text, score).await;
    DetectResult {
        label,
        confidence,
        score,
        reasons,
        strategy: Some(strategy),
        truncated: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_keywords_raise_score() {
        let (label, _, score, reasons) =
            score_text_risk_only("shocking news, 100% true, share immediately");
        assert!(score > 60);
        assert_eq!(label, DetectLabel::HighRisk);
        assert!(reasons.iter().any(|r| r.contains("高风险词")));
    }

    #[test]
    fn test_trust_signals_lower_score() {
        let (label, _, score, _) = score_text_risk_only(
            "official statement published at https://example.gov with data from reporter",
        );
        assert!(score < 50);
        assert_eq!(label, DetectLabel::Credible);
    }

    #[test]
    fn test_neutral_text_suspicious_band() {
        let (label, confidence, score, reasons) = score_text_risk_only("平平无奇的一句话");
        assert_eq!(score, 50);
        assert_eq!(label, DetectLabel::Suspicious);
        assert_eq!(confidence, 0.0);
        assert!(reasons[0].contains("人工复核"));
    }

    #[tokio::test]
    async fn test_score_text_attaches_strategy() {
        let result = score_text("网传某事件100%真实，内部人士称必须立刻转发。").await;
        assert!(result.strategy.is_some());
        assert!(result.score <= 100);
    }
}
