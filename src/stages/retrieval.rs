//! Retrieval scoring primitives: tokenization, scenario detection,
//! domain and freshness weights.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{NaiveDate, Utc};
use regex::Regex;

use crate::types::Scenario;

static LATIN_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z0-9][a-z0-9\-]{2,}").unwrap_or_else(|_| fallback_re()));
static CJK_CHUNK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[一-龥]{2,}").unwrap_or_else(|_| fallback_re()));

fn fallback_re() -> Regex {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\b\B").unwrap()
}

/// Tokenize mixed Chinese/Latin text: Latin words of >=3 chars plus CJK
/// chunks and their sliding bigrams.
pub fn tokenize(text: &str) -> HashSet<String> {
    let lowered = text.to_lowercase();
    let mut tokens: HashSet<String> = LATIN_TOKEN_RE
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect();

    for chunk in CJK_CHUNK_RE.find_iter(text) {
        let chars: Vec<char> = chunk.as_str().chars().collect();
        tokens.insert(chunk.as_str().to_string());
        if chars.len() > 2 {
            for window in chars.windows(2) {
                tokens.insert(window.iter().collect());
            }
        }
    }

    tokens
}

/// Share of claim tokens covered by the evidence tokens.
pub fn token_overlap_ratio(claim_tokens: &HashSet<String>, evidence_tokens: &HashSet<String>) -> f64 {
    if claim_tokens.is_empty() {
        return 0.0;
    }
    claim_tokens.intersection(evidence_tokens).count() as f64 / claim_tokens.len() as f64
}

const SCENARIO_KEYWORDS: [(Scenario, &[&str]); 6] = [
    (
        Scenario::Health,
        &["health", "vaccine", "infection", "outbreak", "医院", "疫苗", "疫情", "感染率", "卫健"],
    ),
    (
        Scenario::Governance,
        &["government", "policy", "official", "政务", "通报", "公告", "网信办", "治理"],
    ),
    (
        Scenario::Security,
        &["security", "fraud", "crime", "公安", "网安", "诈骗", "安全"],
    ),
    (
        Scenario::Media,
        &["rumor", "fact-check", "media", "谣言", "辟谣", "断章取义", "旧闻"],
    ),
    (
        Scenario::Technology,
        &["app", "platform", "ai", "芯片", "算力", "平台", "工信"],
    ),
    (
        Scenario::Education,
        &["school", "student", "campus", "教育", "校园", "大学生"],
    ),
];

/// Keyword-vote the scenario for a piece of claim text.
pub fn detect_scenario(claim_text: &str) -> Scenario {
    let lowered = claim_text.to_lowercase();
    let mut best = (Scenario::General, 0usize);
    for (scenario, keywords) in SCENARIO_KEYWORDS {
        let score = keywords
            .iter()
            .filter(|kw| {
                if kw.is_ascii() {
                    lowered.contains(*kw)
                } else {
                    claim_text.contains(*kw)
                }
            })
            .count();
        if score > best.1 {
            best = (scenario, score);
        }
    }
    best.0
}

/// Source-authority weight by URL host.
pub fn domain_weight(url: &str) -> f64 {
    let host = url
        .split("//")
        .nth(1)
        .unwrap_or(url)
        .split('/')
        .next()
        .unwrap_or("")
        .to_lowercase();
    if host.ends_with(".gov.cn") || host.ends_with(".gov") {
        0.96
    } else if host.contains("who.int") {
        0.94
    } else if host.contains("cdc.gov") {
        0.93
    } else if host.contains("reuters.com") {
        0.88
    } else {
        0.72
    }
}

/// Freshness weight by age buckets: <=30d 1.0, <=180d 0.9, <=365d 0.8,
/// older 0.65. Unparsable dates score 0.7.
pub fn freshness_weight(published_at: &str) -> f64 {
    let Ok(published) = NaiveDate::parse_from_str(published_at, "%Y-%m-%d") else {
        return 0.7;
    };
    let days = (Utc::now().date_naive() - published).num_days();
    if days <= 30 {
        1.0
    } else if days <= 180 {
        0.9
    } else if days <= 365 {
        0.8
    } else {
        0.65
    }
}

/// Topical domain of a claim, used to label evidence rows.
pub fn infer_claim_domain(claim_text: &str) -> String {
    let lowered = claim_text.to_lowercase();
    let hit = |terms: &[&str]| {
        terms
            .iter()
            .any(|t| lowered.contains(*t) || claim_text.contains(*t))
    };
    if hit(&["疫苗", "疫情", "infection", "health", "医院"]) {
        "health"
    } else if hit(&["公安", "诈骗", "security", "crime"]) {
        "security"
    } else if hit(&["网信办", "gov", "政策", "official", "公告"]) {
        "governance"
    } else if hit(&["平台", "工信", "ai", "芯片", "technology"]) {
        "technology"
    } else {
        "general"
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_mixed_text() {
        let tokens = tokenize("WHO 发布疫苗通报 update-2");
        assert!(tokens.contains("who"));
        assert!(tokens.contains("update-2"));
        assert!(tokens.contains("疫苗"));
        // Sliding bigrams of longer CJK chunks.
        assert!(tokens.contains("发布"));
    }

    #[test]
    fn test_overlap_ratio() {
        let a = tokenize("疫苗 安全 数据");
        let b = tokenize("疫苗 数据 报告");
        let ratio = token_overlap_ratio(&a, &b);
        assert!(ratio > 0.0 && ratio <= 1.0);
        assert_eq!(token_overlap_ratio(&HashSet::new(), &b), 0.0);
    }

    #[test]
    fn test_scenario_detection() {
        assert_eq!(detect_scenario("某医院疫苗出现感染率问题"), Scenario::Health);
        assert_eq!(detect_scenario("网信办发布治理公告"), Scenario::Governance);
        assert_eq!(detect_scenario("今天天气不错"), Scenario::General);
    }

    #[test]
    fn test_domain_weights() {
        assert_eq!(domain_weight("https://www.moh.gov.cn/notice"), 0.96);
        assert_eq!(domain_weight("https://who.int/item"), 0.94);
        assert_eq!(domain_weight("https://cdc.gov/page"), 0.93);
        assert_eq!(domain_weight("https://reuters.com/article"), 0.88);
        assert_eq!(domain_weight("https://blog.example.com/post"), 0.72);
    }

    #[test]
    fn test_freshness_weight_buckets() {
        let today = Utc::now().date_naive();
        let recent = today - chrono::Duration::days(10);
        let old = today - chrono::Duration::days(400);
        assert_eq!(freshness_weight(&recent.format("%Y-%m-%d").to_string()), 1.0);
        assert_eq!(freshness_weight(&old.format("%Y-%m-%d").to_string()), 0.65);
        assert_eq!(freshness_weight("not a date"), 0.7);
    }
}
