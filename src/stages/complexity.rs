//! Text complexity analysis, news-gate detection, and strategy inference.
//!
//! The strategy decides claim caps and evidence fan-out for the whole turn.
//! An LM meta-analysis is used when `COMPLEXITY_LLM_ENABLED`; the rule
//! scorer below is the normative fallback.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::info;

use crate::config::{self, LlmSettings};
use crate::llm;
use crate::types::{ComplexityLevel, StrategyConfig};

fn fallback_re() -> Regex {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\b\B").unwrap()
}

macro_rules! lazy_re {
    ($name:ident, $pattern:expr) => {
        static $name: LazyLock<Regex> =
            LazyLock::new(|| Regex::new($pattern).unwrap_or_else(|_| fallback_re()));
    };
}

lazy_re!(SENTENCE_SPLIT_RE, r"[。！？!?\n]+");
lazy_re!(
    ENTITY_SUFFIX_RE,
    r"[一-龥]{2,8}(?:公司|集团|银行|医院|政府|部门|机构|平台|人士|表示|称|宣布|通报)"
);
lazy_re!(ENTITY_VERB_RE, r"[一-龥]{2,4}(?:说|指出|认为|透露|介绍)");
lazy_re!(
    ENTITY_STRIP_RE,
    r"(公司|集团|银行|医院|政府|部门|机构|平台|人士|表示|称|宣布|通报|说|指出|认为|透露|介绍)$"
);
lazy_re!(DATE_REF_RE, r"\d{4}[-/年]\d{1,2}[-/月]\d{1,2}[日]?");
lazy_re!(RELATIVE_TIME_RE, r"昨天|今天|明天|上周|下周|本月|上月|前天|后天");
lazy_re!(NUMBER_REF_RE, r"\d+(?:\.\d+)?[%％]|[\d,]+(?:万|亿|千|百)|\d+个(?:月|年|天)");
lazy_re!(TRANSITION_RE, r"然而|但是|另一方面|此外|与此同时|另外|首先|其次|最后");
lazy_re!(
    EVENT_RE,
    r"发生|出现|导致|引起|造成|爆发|宣布|发布|启动|推出|调查|查处|逮捕|拘留"
);
lazy_re!(NEWS_TIME_RE, r"\d{4}[-/年]\d{1,2}[-/月]\d{1,2}[日]?|\d{1,2}月\d{1,2}日|今天|昨日|昨晚");
lazy_re!(NEWS_SOURCE_RE, r"在[一-龥]{2,10}|于[一-龥]{2,10}|警方|记者|报道|通报|发布|表示|称");
lazy_re!(OPINION_RE, r"评论员|观点|我认为|我觉得|应该|必须");
lazy_re!(AD_RE, r"优惠|下单|购买|点击|立即|限时");

/// Outcome of the text meta-analysis.
#[derive(Debug, Clone)]
pub struct TextMeta {
    pub level: ComplexityLevel,
    pub reason: String,
    pub max_claims: usize,
    pub is_news: bool,
    pub news_confidence: f64,
    pub detected_text_type: String,
    pub news_reason: String,
}

const MAX_CLAIMS_LIMIT: usize = 10;

/// Rule path: weighted structural signals decide the complexity band.
pub fn analyze_complexity_rule_based(text: &str) -> (ComplexityLevel, String, usize) {
    let sentences: Vec<&str> = SENTENCE_SPLIT_RE
        .split(text)
        .map(str::trim)
        .filter(|s| s.chars().count() > 5)
        .collect();
    let sentence_count = sentences.len();
    let avg_sentence_len = if sentence_count == 0 {
        0.0
    } else {
        sentences.iter().map(|s| s.chars().count()).sum::<usize>() as f64 / sentence_count as f64
    };

    let mut entities: std::collections::HashSet<String> = std::collections::HashSet::new();
    for m in ENTITY_SUFFIX_RE
        .find_iter(text)
        .chain(ENTITY_VERB_RE.find_iter(text))
    {
        entities.insert(ENTITY_STRIP_RE.replace(m.as_str(), "").into_owned());
    }
    let entity_count = entities.len();

    let time_refs = DATE_REF_RE.find_iter(text).count() as f64
        + RELATIVE_TIME_RE.find_iter(text).count() as f64 * 0.5;
    let number_refs = NUMBER_REF_RE.find_iter(text).count();
    let transition_count = TRANSITION_RE.find_iter(text).count();
    let event_count = EVENT_RE.find_iter(text).count();

    let mut score = sentence_count.min(6) as f64 * 0.15
        + entity_count.saturating_sub(1) as f64 * 0.6
        + time_refs * 1.2
        + transition_count as f64 * 0.8
        + event_count.min(4) as f64 * 0.6;
    if avg_sentence_len > 100.0 {
        score += 0.5;
    }

    if score >= 5.0 {
        (
            ComplexityLevel::Complex,
            format!(
                "复杂文本(实体{entity_count}个/时间线{}个/转折{transition_count}个/事件{event_count}个)",
                time_refs as i64
            ),
            8.min(MAX_CLAIMS_LIMIT),
        )
    } else if score >= 2.0 {
        (
            ComplexityLevel::Medium,
            format!("中等文本(实体{entity_count}个/数据{number_refs}个)"),
            5.min(MAX_CLAIMS_LIMIT),
        )
    } else {
        (
            ComplexityLevel::Simple,
            "简单文本(单主题叙事)".to_string(),
            3.min(MAX_CLAIMS_LIMIT),
        )
    }
}

/// Rule path of the news gate: is this text a news report at all?
pub fn detect_news_type_rule_based(text: &str) -> (bool, f64, String, String) {
    let t = text.trim();
    if t.is_empty() {
        return (false, 0.3, "other".to_string(), "文本为空".to_string());
    }

    let mut score: i64 = 0;
    if NEWS_TIME_RE.is_match(t) {
        score += 2;
    }
    if NEWS_SOURCE_RE.is_match(t) {
        score += 2;
    }
    if OPINION_RE.is_match(t) {
        score -= 2;
    }
    if AD_RE.is_match(t) {
        score -= 3;
    }
    if t.chars().count() >= 120 {
        score += 1;
    }

    if score >= 3 {
        (
            true,
            0.8,
            "news".to_string(),
            "包含明显新闻要素（时间/来源/事件）".to_string(),
        )
    } else if score <= -2 {
        let detected = if AD_RE.is_match(t) { "ad" } else { "opinion" };
        (
            false,
            0.75,
            detected.to_string(),
            "文本更接近广告/观点表达，不是新闻报道".to_string(),
        )
    } else {
        (
            false,
            0.6,
            "other".to_string(),
            "新闻特征不足，建议补充来源与事件信息".to_string(),
        )
    }
}

/// LM meta-analysis of complexity + news gate. `None` when disabled or the
/// call fails.
pub async fn analyze_meta_with_llm(text: &str) -> Option<TextMeta> {
    if !config::bool_var("COMPLEXITY_LLM_ENABLED", false) {
        return None;
    }

    let settings = LlmSettings::for_stage("COMPLEXITY_LLM_MODEL");
    let prompt = format!(
        "你是文本元分析器。分析输入文本的核查复杂度与新闻体裁，输出严格JSON。\n\
         判断标准：\n\
         1. simple: 单一主题、单一实体、连贯叙述 → 2-3条主张\n\
         2. medium: 2-3个关键实体、有时间线或多事件 → 4-5条主张\n\
         3. complex: 多实体(>3)、多时间线、多转折、多独立事件 → 6-8条主张\n\
         注意：纯数据(百分比、金额)不增加复杂度，只有额外的独立实体/事件/时间线才增加。\n\
         同时判断文本是否为新闻体裁（news/opinion/chat/ad/other）。\n\
         输出格式：{{\"complexity\":{{\"level\":\"simple|medium|complex\",\"max_claims\":2-8,\
         \"reason\":\"中文理由\"}},\"news_gate\":{{\"is_news\":true|false,\"confidence\":0-1,\
         \"detected_type\":\"news|opinion|chat|ad|other\",\"reason\":\"中文理由\"}}}}"
    );
    let preview: String = text.chars().take(2000).collect();
    let opts = llm::CallOptions::new(settings, "complexity", "DEBUG_COMPLEXITY");
    let parsed = llm::call_json(
        "你是严谨的文本分析助手，只返回JSON。",
        &format!("{prompt}\n\n待分析文本：\n{preview}"),
        &opts,
    )
    .await?;

    let complexity = parsed.get("complexity").cloned().unwrap_or(Value::Null);
    let gate = parsed.get("news_gate").cloned().unwrap_or(Value::Null);

    let level = ComplexityLevel::parse(
        complexity
            .get("level")
            .and_then(Value::as_str)
            .unwrap_or("medium"),
    );
    let max_claims = complexity
        .get("max_claims")
        .and_then(Value::as_i64)
        .unwrap_or(5)
        .clamp(2, 8.min(MAX_CLAIMS_LIMIT as i64)) as usize;
    let reason = complexity
        .get("reason")
        .and_then(Value::as_str)
        .unwrap_or("LLM判定")
        .to_string();

    let is_news = gate.get("is_news").and_then(Value::as_bool).unwrap_or(true);
    let news_confidence = gate
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(0.5)
        .clamp(0.0, 1.0);
    let detected_raw = gate
        .get("detected_type")
        .and_then(Value::as_str)
        .unwrap_or("news")
        .trim()
        .to_lowercase();
    let detected_text_type = match detected_raw.as_str() {
        "news" | "opinion" | "chat" | "ad" | "other" => detected_raw,
        _ => "other".to_string(),
    };
    let news_reason = gate
        .get("reason")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or("LLM判定")
        .to_string();

    info!(
        level = ?level,
        max_claims,
        is_news,
        text_type = %detected_text_type,
        "文本元分析：LLM判定成功"
    );

    Some(TextMeta {
        level,
        reason,
        max_claims,
        is_news,
        news_confidence,
        detected_text_type,
        news_reason,
    })
}

/// Full meta analysis: LM first, rule fallback.
pub async fn analyze_meta(text: &str) -> TextMeta {
    if let Some(meta) = analyze_meta_with_llm(text).await {
        return meta;
    }

    let (level, reason, max_claims) = analyze_complexity_rule_based(text);
    let (is_news, news_confidence, detected_text_type, news_reason) =
        detect_news_type_rule_based(text);
    TextMeta {
        level,
        reason,
        max_claims,
        is_news,
        news_confidence,
        detected_text_type,
        news_reason,
    }
}

/// Build the per-turn strategy from complexity and the risk score.
///
/// Evidence fan-out scales with risk: >=65 → 10 per claim, >=45 → 7,
/// >=25 → 5, else 3. Summary target caps at 5.
pub fn build_strategy(meta: &TextMeta, score: i64) -> StrategyConfig {
    let (evidence_per_claim, risk_level, risk_reason) = if score >= 65 {
        (10, "critical", format!("高风险(score={score})，最大证据检索"))
    } else if score >= 45 {
        (7, "high", format!("中高风险(score={score})，深度证据检索"))
    } else if score >= 25 {
        (5, "medium", format!("中低风险(score={score})，标准证据检索"))
    } else {
        (3, "low", format!("低风险(score={score})，快速证据检索"))
    };

    StrategyConfig {
        max_claims: meta.max_claims,
        complexity_level: meta.level,
        complexity_reason: meta.reason.clone(),
        evidence_per_claim,
        risk_level: risk_level.to_string(),
        risk_reason,
        summary_target_min: 1,
        summary_target_max: evidence_per_claim.min(5),
        enable_summarization: true,
        is_news: meta.is_news,
        news_confidence: meta.news_confidence,
        detected_text_type: meta.detected_text_type.clone(),
        news_reason: meta.news_reason.clone(),
    }
}

/// Rule-only strategy inference used by the rule risk scorer.
pub async fn infer_strategy(text: &str, score: i64) -> StrategyConfig {
    let meta = analyze_meta(text).await;
    build_strategy(&meta, score)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_text_small_cap() {
        let (level, _, max_claims) = analyze_complexity_rule_based("一句很普通的话。");
        assert_eq!(level, ComplexityLevel::Simple);
        assert_eq!(max_claims, 3);
    }

    #[test]
    fn test_complex_text_raises_cap() {
        let text = "2026年1月3日，某集团宣布收购。然而市场部门指出风险。2026年2月1日，监管机构发布调查通报。\
                    另一方面，某银行表示将跟进。此外，昨天又爆发新的争议事件，导致股价下跌。";
        let (level, reason, max_claims) = analyze_complexity_rule_based(text);
        assert_eq!(level, ComplexityLevel::Complex);
        assert_eq!(max_claims, 8);
        assert!(reason.contains("复杂文本"));
    }

    #[test]
    fn test_news_gate_positive() {
        let (is_news, conf, kind, _) =
            detect_news_type_rule_based("2月25日，警方通报称某地发生一起案件，记者从现场了解到更多细节。");
        assert!(is_news);
        assert!(conf >= 0.8);
        assert_eq!(kind, "news");
    }

    #[test]
    fn test_news_gate_ad() {
        let (is_news, _, kind, _) =
            detect_news_type_rule_based("限时优惠！立即下单购买，点击链接抢购！");
        assert!(!is_news);
        assert_eq!(kind, "ad");
    }

    #[test]
    fn test_strategy_bands() {
        let meta = TextMeta {
            level: ComplexityLevel::Medium,
            reason: String::new(),
            max_claims: 5,
            is_news: true,
            news_confidence: 0.5,
            detected_text_type: "news".to_string(),
            news_reason: String::new(),
        };
        assert_eq!(build_strategy(&meta, 80).evidence_per_claim, 10);
        assert_eq!(build_strategy(&meta, 50).evidence_per_claim, 7);
        assert_eq!(build_strategy(&meta, 30).evidence_per_claim, 5);
        assert_eq!(build_strategy(&meta, 10).evidence_per_claim, 3);
        assert_eq!(build_strategy(&meta, 80).summary_target_max, 5);
        assert_eq!(build_strategy(&meta, 10).summary_target_max, 3);
    }
}
