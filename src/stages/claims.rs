//! Claim extraction stage.
//!
//! Two LM paths (single-call default, three-step claimify) and a rule
//! fallback. Post-processing is shared: normalize fields, drop
//! non-verifiable rows, dedup, re-index `c1..cN`, cap at `max_claims`.

use std::sync::LazyLock;

use chrono::{NaiveDate, Utc};
use regex::Regex;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::{self, LlmSettings};
use crate::types::ClaimItem;

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

lazy_re!(SENTENCE_SPLIT_RE, r"[。！？!?;；\n]+");
lazy_re!(WHITESPACE_RE, r"\s+");
lazy_re!(TIME_RE, r"\b(20\d{2}[-/]\d{1,2}[-/]\d{1,2})\b");
lazy_re!(VALUE_RE, r"\d+(\.\d+)?%|\b\d+(\.\d+)?\b");
lazy_re!(LATIN_ENTITY_RE, r"\b([A-Z][a-z]+(?:\s+[A-Z][a-z]+)*)\b");
lazy_re!(CJK_ENTITY_RE, r"([一-龥]{2,12})(?:表示|称|发布|通报|指出)");
lazy_re!(LATIN_LOCATION_RE, r"(?i)\b(?:in|at)\s+([A-Za-z][A-Za-z\- ]{1,40})\b");
lazy_re!(CJK_LOCATION_RE, r"在([一-龥]{2,12})");
lazy_re!(DEDUP_KEY_RE, r"[^a-z0-9一-龥]+");

const RISK_TERMS: [&str; 8] = [
    "震惊",
    "内部消息",
    "必须转发",
    "100%",
    "包治百病",
    "shocking",
    "internal source",
    "must share",
];

const OPINION_TERMS: [&str; 7] = [
    "i think",
    "maybe",
    "perhaps",
    "感觉",
    "我觉得",
    "可能吧",
    "太离谱了",
];

/// Entry point: LM preferred (default or claimify method), rule fallback.
pub async fn extract_claims(text: &str, max_claims: Option<usize>) -> Vec<ClaimItem> {
    let effective_max = max_claims.unwrap_or_else(config::claim_max_items);

    if config::bool_var("LLM_ENABLED", false) {
        let method = config::var("CLAIM_METHOD").unwrap_or_default().to_lowercase();
        if method == "claimify" {
            info!("Claim抽取：已启用 Claimify 模式");
            let claims = extract_with_claimify(text, effective_max).await;
            if !claims.is_empty() {
                info!(count = claims.len(), "Claim抽取：Claimify 模式抽取成功");
                return claims;
            }
            warn!("Claim抽取：Claimify 模式抽取失败，已回退规则抽取");
        } else {
            info!("Claim抽取：LLM模式已启用 (Default)，开始尝试LLM抽取");
            let claims = extract_with_llm(text, effective_max).await;
            if !claims.is_empty() {
                info!(count = claims.len(), "Claim抽取：LLM抽取成功");
                return claims;
            }
            warn!("Claim抽取：LLM抽取失败，已回退规则抽取");
        }
    } else {
        info!("Claim抽取：LLM模式未启用，使用规则抽取");
    }

    let claims = extract_claims_rule_based(text, Some(effective_max));
    info!(count = claims.len(), "Claim抽取：规则抽取完成");
    claims
}

/// Rule fallback: sentence split, filters, field extraction, shared
/// post-processing. Never returns an empty list.
pub fn extract_claims_rule_based(text: &str, max_claims: Option<usize>) -> Vec<ClaimItem> {
    let effective_max = max_claims.unwrap_or_else(config::claim_max_items);

    let mut raw_claims = Vec::new();
    for (idx, raw) in SENTENCE_SPLIT_RE.split(text).enumerate() {
        let sentence = raw.trim();
        if sentence.chars().count() < 8 || looks_non_verifiable(sentence) {
            continue;
        }
        raw_claims.push(ClaimItem {
            claim_id: format!("c{}", idx + 1),
            claim_text: normalize_claim_text(sentence),
            entity: extract_entity(sentence),
            time: extract_time(sentence).and_then(|t| normalize_time(&t)),
            location: extract_location(sentence),
            value: extract_value(sentence),
            source_sentence: sentence.to_string(),
        });
    }

    let claims = post_process_claims(raw_claims, effective_max);
    if claims.is_empty() {
        return vec![ClaimItem::catch_all(text)];
    }
    claims
}

// ============================================================================
// LM paths
// ============================================================================

async fn extract_with_llm(text: &str, max_items: usize) -> Vec<ClaimItem> {
    let settings = LlmSettings::for_stage("EXTRACTION_LLM_MODEL");
    let current_date = Utc::now().format("%Y-%m-%d");
    let prompt = format!(
        "## 角色设定\n\
         你是一个专业的核查分析师。任务是从提供的文本中抽取核心的\u{201c}可核查事实主张 (Verifiable Claims)\u{201d}。\n\
         当前参考日期：{current_date} (用于推断'昨天'、'上周'等相对时间)\n\n\
         ## 核心原则\n\
         1. 原子化：将复合句拆解为独立事实。\n\
         2. 指代消解：将\u{201c}他/她/它\u{201d}替换为具体实体名，确保Claim独立可读。\n\
         3. 客观性：仅提取对客观世界的陈述，过滤主观评价、情绪宣泄和模糊推测。\n\n\
         ## 输出约束\n\
         1. 格式：严格 JSON，无 Markdown，无注释。\n\
         2. 结构：{{\"claims\": [{{\"claim_text\": \"...\", \"entity\": \"...\", \"time\": \"...\", \
         \"location\": \"...\", \"value\": \"...\", \"source_sentence\": \"...\"}}]}}\n\
         3. 数量：Top-{max_items} 条最有核查价值的主张。\n\
         4. 字段规范：time 格式 YYYY-MM-DD，无法推断则留空；value 仅提取关键数值/百分比。"
    );

    let opts = crate::llm::CallOptions::new(settings, "claims", "DEBUG_CLAIMS");
    let Some(parsed) = crate::llm::call_json(
        "你是信息抽取引擎，只返回严格JSON。",
        &format!("{prompt}\n\n待处理文本：\n{text}"),
        &opts,
    )
    .await
    else {
        return Vec::new();
    };

    claims_from_json(&parsed, max_items)
}

/// Claimify: selection+disambiguation, then decomposition, then
/// ranking/merge. Merged claims inherit metadata from the first source
/// index of the decomposed list.
async fn extract_with_claimify(text: &str, max_items: usize) -> Vec<ClaimItem> {
    let settings = LlmSettings::for_stage("EXTRACTION_LLM_MODEL");
    let current_date = Utc::now().format("%Y-%m-%d");

    // Step 1: selection + disambiguation.
    info!("Claimify Step 1: 筛选与消歧");
    let step1_prompt = format!(
        "## 角色：Claimify 预处理专家\n\
         任务：对输入文本进行【筛选】和【消歧】，输出独立的、包含可核查事实的句子列表。\n\
         参考日期：{current_date}\n\n\
         ## 处理规则\n\
         1. 筛选：保留具体的事件、数据、声明、行为描述；丢弃纯观点、模糊预测、无事实元数据。\n\
         2. 消歧：将代词替换为具体实体；相对时间转换为具体日期；指代不清则丢弃。\n\n\
         ## 输出格式\n\
         严格 JSON: `{{\"sentences\": [\"重写后的句子1\", \"重写后的句子2\"]}}`"
    );
    let opts = crate::llm::CallOptions::new(settings.clone(), "claimify", "DEBUG_CLAIMS")
        .temperature(0.1);
    let step1 = crate::llm::call_json(
        "你是 Claimify 预处理专家，只返回严格JSON。",
        &format!("{step1_prompt}\n\n待处理文本：\n{text}"),
        &opts,
    )
    .await;
    let sentences: Vec<String> = step1
        .as_ref()
        .and_then(|v| v.get("sentences"))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if sentences.is_empty() {
        warn!("Claimify Step 1: 未提取到有效句子");
        return Vec::new();
    }
    info!(count = sentences.len(), "Claimify Step 1: 提取到核心句子");

    // Step 2: decomposition, uncapped.
    info!("Claimify Step 2: 原子化拆解与字段提取");
    let sentences_json = serde_json::to_string(&sentences).unwrap_or_default();
    let step2_prompt = "## 角色：Claimify 事实抽取专家\n\
         任务：将给定的句子列表拆解为原子化的【可核查事实主张】。\n\n\
         ## 处理规则\n\
         1. 拆解：一句多事实时拆分为多条，每条独立可验证。\n\
         2. 字段：claim_text、source_sentence、entity、time (YYYY-MM-DD)、value。\n\n\
         ## 输出格式\n\
         严格 JSON: `{\"claims\": [{\"claim_text\": \"...\", \"entity\": \"...\", \"time\": \"...\", \
         \"value\": \"...\", \"source_sentence\": \"...\"}]}`";
    let step2 = crate::llm::call_json(
        "你是 Claimify 事实抽取专家，只返回严格JSON。",
        &format!("{step2_prompt}\n\n待处理句子列表：\n{sentences_json}"),
        &opts,
    )
    .await;
    let candidates: Vec<Value> = step2
        .as_ref()
        .and_then(|v| v.get("claims"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    if candidates.is_empty() {
        warn!("Claimify Step 2: 未提取到有效主张");
        return Vec::new();
    }

    // Step 3: ranking + merge, only worthwhile with multiple candidates.
    let final_payload = if candidates.len() > 1 {
        info!(count = candidates.len(), "Claimify Step 3: 候选主张价值重排序");
        rank_and_merge(&candidates, max_items, &opts).await
    } else {
        info!("候选主张较少，跳过 Step 3 重排序");
        json!({"claims": candidates})
    };

    claims_from_json(&final_payload, max_items)
}

async fn rank_and_merge(
    candidates: &[Value],
    max_items: usize,
    opts: &crate::llm::CallOptions,
) -> Value {
    let simplified: Vec<Value> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| {
            json!({"id": i, "claim": c.get("claim_text").and_then(Value::as_str).unwrap_or("")})
        })
        .collect();
    let candidates_json = serde_json::to_string_pretty(&simplified).unwrap_or_default();
    let prompt = format!(
        "## 角色：Claimify 价值评估专家\n\
         任务：对候选主张列表进行【去重合并】与【价值排序】，输出 Top-N 条最具核查价值的主张。\n\n\
         ## 处理流程\n\
         1. 去重与合并：语义高度重复的主张合并为一条更完整的主张；被包含的只留详细版。\n\
         2. 价值评估：优先保留含具体数据/时间/实体的主张；降权主观评价与元数据。\n\n\
         ## 输出要求\n\
         1. 输出最终 Top-{max_items} 条主张。\n\
         2. 合并后的主张用 source_indices 记录来源原始ID列表。\n\
         3. 格式：严格 JSON: `{{\"claims\": [{{\"claim_text\": \"...\", \"source_indices\": [0, 2]}}]}}`"
    );

    let truncated = || json!({"claims": candidates[..candidates.len().min(max_items)].to_vec()});

    let Some(parsed) = crate::llm::call_json(
        "你是 Claimify 价值评估专家，只返回严格JSON。",
        &format!("{prompt}\n\n候选列表：\n{candidates_json}"),
        opts,
    )
    .await
    else {
        return truncated();
    };

    let Some(merged) = parsed.get("claims").and_then(Value::as_array) else {
        return truncated();
    };

    // Rebuild each merged claim on top of its first valid source candidate
    // so entity/time/location survive the merge.
    let mut final_claims = Vec::new();
    for item in merged {
        let text = item.get("claim_text").and_then(Value::as_str).unwrap_or("");
        let base_idx = item
            .get("source_indices")
            .and_then(Value::as_array)
            .and_then(|indices| {
                indices
                    .iter()
                    .filter_map(Value::as_i64)
                    .find(|i| *i >= 0 && (*i as usize) < candidates.len())
            });
        let mut claim = base_idx
            .map(|i| candidates[i as usize].clone())
            .unwrap_or_else(|| json!({}));
        claim["claim_text"] = Value::String(text.to_string());
        final_claims.push(claim);
    }

    if final_claims.is_empty() {
        return truncated();
    }
    json!({"claims": final_claims})
}

/// Build claims from an LM payload; tolerates both object rows and bare
/// string rows, then runs the shared post-processing.
fn claims_from_json(payload: &Value, max_items: usize) -> Vec<ClaimItem> {
    let rows = payload
        .get("claims")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut claims = Vec::new();
    for (idx, row) in rows.iter().enumerate() {
        let (claim_text, source_sentence, entity, time, location, value) = match row {
            Value::String(s) => {
                let text = normalize_claim_text(s);
                (
                    text.clone(),
                    text.clone(),
                    extract_entity(&text),
                    extract_time(&text),
                    extract_location(&text),
                    extract_value(&text),
                )
            }
            Value::Object(_) => {
                let claim_text = normalize_claim_text(
                    row.get("claim_text").and_then(Value::as_str).unwrap_or(""),
                );
                let source_sentence = row
                    .get("source_sentence")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| claim_text.clone());
                let field = |key: &str| {
                    row.get(key)
                        .and_then(Value::as_str)
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                };
                (
                    claim_text,
                    source_sentence.clone(),
                    field("entity").or_else(|| extract_entity(&source_sentence)),
                    field("time").or_else(|| extract_time(&source_sentence)),
                    field("location").or_else(|| extract_location(&source_sentence)),
                    field("value").or_else(|| extract_value(&source_sentence)),
                )
            }
            _ => continue,
        };

        if claim_text.is_empty() || looks_non_verifiable(&claim_text) {
            continue;
        }

        claims.push(ClaimItem {
            claim_id: format!("c{}", idx + 1),
            claim_text,
            entity: entity.map(|e| normalize_short_field(&e)),
            time: time.and_then(|t| normalize_time(&t)),
            location: location.map(|l| normalize_short_field(&l)),
            value: value.and_then(|v| normalize_value(&v)),
            source_sentence,
        });
    }

    post_process_claims(claims, max_items)
}

// ============================================================================
// Shared post-processing
// ============================================================================

/// Score by check-worthiness, drop below the minimum, sort, dedup,
/// re-index, cap.
fn post_process_claims(claims: Vec<ClaimItem>, max_items: usize) -> Vec<ClaimItem> {
    if claims.is_empty() {
        return Vec::new();
    }

    let min_score = config::claim_min_score();
    let mut scored: Vec<(f64, ClaimItem)> = claims
        .iter()
        .map(|c| (claim_score(c), c.clone()))
        .filter(|(score, _)| *score >= min_score)
        .collect();

    if scored.is_empty() {
        scored = claims.into_iter().map(|c| (claim_score(&c), c)).collect();
    }

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    let ranked: Vec<ClaimItem> = scored.into_iter().map(|(_, c)| c).collect();

    let mut deduped = dedupe_and_reindex(ranked);
    deduped.truncate(max_items);
    deduped
}

/// Check-worthiness: structured fields and risk phrasing raise the score,
/// over-long text lowers it slightly.
fn claim_score(claim: &ClaimItem) -> f64 {
    let mut score: f64 = 0.0;
    if claim.entity.is_some() {
        score += 0.25;
    }
    if claim.time.is_some() {
        score += 0.25;
    }
    if claim.value.is_some() {
        score += 0.25;
    }
    if claim.location.is_some() {
        score += 0.1;
    }
    if contains_risk_terms(&claim.claim_text) {
        score += 0.15;
    }
    if claim.claim_text.chars().count() > 120 {
        score -= 0.08;
    }
    (score.clamp(0.0, 1.0) * 10_000.0).round() / 10_000.0
}

fn contains_risk_terms(text: &str) -> bool {
    let lowered = text.to_lowercase();
    RISK_TERMS
        .iter()
        .any(|t| lowered.contains(*t) || text.contains(*t))
}

fn dedupe_and_reindex(claims: Vec<ClaimItem>) -> Vec<ClaimItem> {
    let mut seen = std::collections::HashSet::new();
    let mut cleaned: Vec<ClaimItem> = Vec::new();
    for claim in claims {
        let key = DEDUP_KEY_RE
            .replace_all(&claim.claim_text.to_lowercase(), "")
            .into_owned();
        if key.is_empty() || !seen.insert(key) {
            continue;
        }
        cleaned.push(claim);
    }
    for (idx, claim) in cleaned.iter_mut().enumerate() {
        claim.claim_id = format!("c{}", idx + 1);
    }
    cleaned
}

// ============================================================================
// Field extraction / normalization
// ============================================================================

fn normalize_claim_text(value: &str) -> String {
    let collapsed = WHITESPACE_RE.replace_all(value.trim(), " ");
    collapsed.chars().take(220).collect()
}

fn normalize_short_field(value: &str) -> String {
    let collapsed = WHITESPACE_RE.replace_all(value.trim(), " ");
    collapsed.chars().take(80).collect()
}

fn normalize_value(value: &str) -> Option<String> {
    VALUE_RE.find(value).map(|m| m.as_str().to_string())
}

/// Normalize a time string to YYYY-MM-DD; `None` when unparsable.
fn normalize_time(value: &str) -> Option<String> {
    let text = value.trim().replace('/', "-");
    if text.is_empty() {
        return None;
    }
    for fmt in ["%Y-%m-%d", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(parsed) = NaiveDate::parse_from_str(&text, fmt) {
            return Some(parsed.format("%Y-%m-%d").to_string());
        }
        if let Ok(parsed) = chrono::NaiveDateTime::parse_from_str(&text, fmt) {
            return Some(parsed.format("%Y-%m-%d").to_string());
        }
    }
    None
}

fn extract_time(text: &str) -> Option<String> {
    TIME_RE.captures(text).map(|c| c[1].to_string())
}

fn extract_value(text: &str) -> Option<String> {
    VALUE_RE.find(text).map(|m| m.as_str().to_string())
}

fn extract_entity(text: &str) -> Option<String> {
    if let Some(c) = LATIN_ENTITY_RE.captures(text) {
        return Some(c[1].to_string());
    }
    CJK_ENTITY_RE.captures(text).map(|c| c[1].to_string())
}

fn extract_location(text: &str) -> Option<String> {
    if let Some(c) = LATIN_LOCATION_RE.captures(text) {
        return Some(c[1].trim().to_string());
    }
    CJK_LOCATION_RE.captures(text).map(|c| c[1].to_string())
}

/// First-person opinion with no number or time is not verifiable.
fn looks_non_verifiable(text: &str) -> bool {
    let lowered = text.to_lowercase();
    if OPINION_TERMS.iter().any(|t| lowered.contains(*t)) {
        return !VALUE_RE.is_match(text) && extract_time(text).is_none();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_extraction_splits_sentences() {
        let text = "某医院2026-01-02宣布感染率下降20%。官方通报称数据属实。短句。";
        let claims = extract_claims_rule_based(text, Some(8));
        assert!(!claims.is_empty());
        assert_eq!(claims[0].claim_id, "c1");
        // First claim should be the information-dense one.
        assert!(claims[0].value.is_some() || claims[0].time.is_some());
    }

    #[test]
    fn test_rule_extraction_catch_all_on_empty() {
        let claims = extract_claims_rule_based("短。", Some(8));
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].claim_id, "c1");
        assert_eq!(claims[0].claim_text, "短。");
    }

    #[test]
    fn test_non_verifiable_opinion_filtered() {
        assert!(looks_non_verifiable("我觉得这件事不太对劲"));
        // Opinion phrasing with a number is still verifiable.
        assert!(!looks_non_verifiable("我觉得跌了20%不正常"));
    }

    #[test]
    fn test_dedup_and_reindex() {
        let make = |id: &str, text: &str| ClaimItem {
            claim_id: id.to_string(),
            claim_text: text.to_string(),
            entity: None,
            time: None,
            location: None,
            value: None,
            source_sentence: text.to_string(),
        };
        let claims = vec![
            make("c9", "股价暴跌了"),
            make("c7", "股价暴跌了！"),
            make("c3", "官方发布澄清"),
        ];
        let result = dedupe_and_reindex(claims);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].claim_id, "c1");
        assert_eq!(result[1].claim_id, "c2");
    }

    #[test]
    fn test_claim_score_weights() {
        let full = ClaimItem {
            claim_id: "c1".to_string(),
            claim_text: "震惊！某公司宣布数据".to_string(),
            entity: Some("某公司".to_string()),
            time: Some("2026-01-01".to_string()),
            location: Some("北京".to_string()),
            value: Some("20%".to_string()),
            source_sentence: String::new(),
        };
        assert_eq!(claim_score(&full), 1.0);

        let bare = ClaimItem {
            claim_id: "c1".to_string(),
            claim_text: "一句没有信息量的话".to_string(),
            entity: None,
            time: None,
            location: None,
            value: None,
            source_sentence: String::new(),
        };
        assert_eq!(claim_score(&bare), 0.0);
    }

    #[test]
    fn test_normalize_time_formats() {
        assert_eq!(normalize_time("2026/01/05"), Some("2026-01-05".to_string()));
        assert_eq!(
            normalize_time("2026-01-05 10:30:00"),
            Some("2026-01-05".to_string())
        );
        assert_eq!(normalize_time("last week"), None);
    }

    #[test]
    fn test_claims_from_json_accepts_string_rows() {
        let payload = json!({"claims": ["某地2026-03-01发生地震，震级5.2", "官方通报无人员伤亡情况"]});
        let claims = claims_from_json(&payload, 8);
        assert!(!claims.is_empty());
        assert!(claims.iter().all(|c| c.claim_id.starts_with('c')));
    }

    #[test]
    fn test_claims_from_json_caps_at_max() {
        let rows: Vec<Value> = (0..15)
            .map(|i| json!({"claim_text": format!("事件{i}于2026-01-0{}发生，涉及金额{}万", (i % 9) + 1, i + 1)}))
            .collect();
        let claims = claims_from_json(&json!({"claims": rows}), 5);
        assert!(claims.len() <= 5);
    }
}
