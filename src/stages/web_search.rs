//! Live web evidence retrieval.
//!
//! Each provider adapter normalizes its wire format into
//! [`RawSearchItem`]; ranking, domain filtering, and the heuristic stance
//! are provider-independent. Search failures degrade to an empty list, and
//! the pipeline inserts a placeholder row so every claim keeps at least one
//! evidence row downstream.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config;
use crate::config::{DEFAULT_WEB_RETRIEVAL_TIMEOUT_SECS, DEFAULT_WEB_RETRIEVAL_TOPK};
use crate::llm::trace;
use crate::stages::retrieval::{domain_weight, freshness_weight, infer_claim_domain, token_overlap_ratio, tokenize};
use crate::types::Stance;

/// Normalized output of one provider hit.
#[derive(Debug, Clone, Default)]
pub struct RawSearchItem {
    pub title: String,
    pub url: String,
    pub summary: String,
    pub score: f64,
    pub published_at: String,
    pub raw_snippet: String,
}

/// Ranked, filtered candidate ready to become an evidence row.
#[derive(Debug, Clone)]
pub struct WebEvidenceCandidate {
    pub title: String,
    pub source: String,
    pub url: String,
    pub published_at: String,
    pub summary: String,
    pub relevance: f64,
    pub raw_snippet: String,
    pub domain: String,
    pub is_authoritative: bool,
}

/// One web-search back-end: `(query, top_k, timeout) -> raw items`.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        timeout: Duration,
    ) -> Result<Vec<RawSearchItem>, String>;
}

pub fn web_retrieval_enabled() -> bool {
    config::bool_var("WEB_RETRIEVAL_ENABLED", false)
}

pub fn web_retrieval_topk() -> usize {
    config::int_var(
        "WEB_RETRIEVAL_TOPK",
        DEFAULT_WEB_RETRIEVAL_TOPK as i64,
        1,
        25,
    ) as usize
}

fn provider_for_config() -> Box<dyn SearchProvider> {
    match config::var("WEB_SEARCH_PROVIDER")
        .unwrap_or_default()
        .to_lowercase()
        .as_str()
    {
        "serpapi" => Box::new(SerpApiProvider),
        "tavily" => Box::new(TavilyProvider),
        "searxng" => Box::new(SearxngProvider),
        "bocha" => Box::new(BochaProvider),
        _ => Box::new(BaiduProvider),
    }
}

/// Search the configured provider for one claim and rank the results.
pub async fn search_web_evidence(claim_text: &str, top_k: usize) -> Vec<WebEvidenceCandidate> {
    if !web_retrieval_enabled() {
        return Vec::new();
    }

    let provider = provider_for_config();
    let timeout = Duration::from_secs_f64(config::float_var(
        "WEB_RETRIEVAL_TIMEOUT_SEC",
        DEFAULT_WEB_RETRIEVAL_TIMEOUT_SECS,
        1.0,
        120.0,
    ));

    let raw_items = match provider.search(claim_text, top_k, timeout).await {
        Ok(items) => items,
        Err(e) => {
            warn!(provider = provider.name(), error = %e, "联网检索失败");
            return Vec::new();
        }
    };

    let results = rank_candidates(claim_text, raw_items, top_k);
    if results.is_empty() {
        info!(query = %truncate(claim_text, 80), "联网检索未召回可用结果");
    } else {
        info!(
            query = %truncate(claim_text, 80),
            recalled = results.len(),
            "联网检索完成"
        );
    }
    results
}

/// Apply the allowed-domain filter, compute relevance, sort and cap.
pub fn rank_candidates(
    claim_text: &str,
    raw_items: Vec<RawSearchItem>,
    top_k: usize,
) -> Vec<WebEvidenceCandidate> {
    let allowed = allowed_domains();
    let claim_tokens = tokenize(claim_text);

    let mut results = Vec::new();
    for item in raw_items {
        let url = item.url.trim();
        let title = item.title.trim();
        if url.is_empty() || title.is_empty() {
            continue;
        }

        let host = extract_host(url);
        if !allowed.is_empty() && !in_allowed_domains(&host, &allowed) {
            continue;
        }

        let published = normalize_date(item.published_at.trim());
        let overlap = token_overlap_ratio(
            &claim_tokens,
            &tokenize(&format!("{title} {}", item.summary)),
        );
        let relevance = overlap * 0.55
            + item.score * 0.2
            + domain_weight(url) * 0.15
            + freshness_weight(&published) * 0.1;
        let relevance = ((relevance.clamp(0.0, 1.0)) * 10_000.0).round() / 10_000.0;

        results.push(WebEvidenceCandidate {
            title: title.to_string(),
            source: host,
            url: url.to_string(),
            published_at: published,
            summary: item.summary.trim().to_string(),
            relevance,
            raw_snippet: if item.raw_snippet.trim().is_empty() {
                item.summary.trim().to_string()
            } else {
                item.raw_snippet.trim().to_string()
            },
            domain: infer_claim_domain(claim_text),
            is_authoritative: domain_weight(url) >= 0.88,
        });
    }

    results.sort_by(|a, b| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(top_k);
    results
}

/// Heuristic stance before alignment runs. Rumor-control wording refutes;
/// official wording with enough relevance supports; otherwise insufficient.
pub fn infer_web_stance(claim_text: &str, evidence: &WebEvidenceCandidate) -> Stance {
    let lowered = claim_text.to_lowercase();
    let combined = format!("{} {}", evidence.title, evidence.summary).to_lowercase();

    let refute_terms = ["辟谣", "谣言", "misleading", "fact-check", "myth", "misconception"];
    let support_terms = ["official", "bulletin", "公告", "通报", "权威", "guidance"];
    let risk_terms = ["震惊", "内部消息", "必须转发", "miracle", "must share", "internal source"];

    let has = |haystack: &str, terms: &[&str]| terms.iter().any(|t| haystack.contains(t));

    if has(&combined, &refute_terms) {
        return Stance::Refute;
    }
    if has(&lowered, &risk_terms) && (has(&combined, &refute_terms) || has(&combined, &support_terms)) {
        return Stance::Refute;
    }
    if evidence.relevance >= 0.5 && has(&combined, &support_terms) {
        return Stance::Support;
    }
    Stance::Insufficient
}

// ============================================================================
// Provider adapters
// ============================================================================

fn search_client() -> &'static reqwest::Client {
    static CLIENT: std::sync::OnceLock<reqwest::Client> = std::sync::OnceLock::new();
    CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default()
    })
}

async fn post_json(
    url: &str,
    payload: &Value,
    timeout: Duration,
    bearer: Option<&str>,
) -> Result<Value, String> {
    trace::record(
        "DEBUG_WEB_RETRIEVAL",
        "web_search",
        "request",
        json!({"method": "POST", "url": url, "request_body": payload}),
    );

    let mut request = search_client().post(url).timeout(timeout).json(payload);
    if let Some(key) = bearer {
        request = request.bearer_auth(key);
    }
    let response = request.send().await.map_err(|e| e.to_string())?;
    if !response.status().is_success() {
        let status = response.status();
        trace::record(
            "DEBUG_WEB_RETRIEVAL",
            "web_search",
            "error",
            json!({"url": url, "error": status.to_string()}),
        );
        return Err(format!("status {status}"));
    }
    let body: Value = response.json().await.map_err(|e| e.to_string())?;
    trace::record(
        "DEBUG_WEB_RETRIEVAL",
        "web_search",
        "response",
        json!({"url": url, "response_body": body}),
    );
    Ok(body)
}

async fn get_json(url: &str, timeout: Duration) -> Result<Value, String> {
    trace::record(
        "DEBUG_WEB_RETRIEVAL",
        "web_search",
        "request",
        json!({"method": "GET", "url": url}),
    );
    let response = search_client()
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| e.to_string())?;
    if !response.status().is_success() {
        return Err(format!("status {}", response.status()));
    }
    let body: Value = response.json().await.map_err(|e| e.to_string())?;
    trace::record(
        "DEBUG_WEB_RETRIEVAL",
        "web_search",
        "response",
        json!({"url": url, "response_body": body}),
    );
    Ok(body)
}

fn item_str(item: &Value, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|k| item.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// Baidu-compatible web search API (default provider).
pub struct BaiduProvider;

#[async_trait]
impl SearchProvider for BaiduProvider {
    fn name(&self) -> &'static str {
        "baidu"
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        timeout: Duration,
    ) -> Result<Vec<RawSearchItem>, String> {
        let Some(api_key) = config::var("BAIDU_API_KEY") else {
            return Ok(Vec::new());
        };
        let endpoint = config::var("BAIDU_ENDPOINT")
            .unwrap_or_else(|| "https://api.qnaigc.com/v1/search/web".to_string());
        let time_filter = config::var("BAIDU_TIME_FILTER").unwrap_or_else(|| "year".to_string());

        let mut payload = json!({
            "query": query,
            "max_results": top_k.max(1),
            "search_type": "web",
            "time_filter": time_filter,
        });
        if let Some(sites) = config::var("BAIDU_SITE_FILTER") {
            let filters: Vec<&str> = sites.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
            if !filters.is_empty() {
                payload["site_filter"] = json!(filters);
            }
        }

        let body = post_json(&endpoint, &payload, timeout, Some(&api_key)).await?;

        // Common shapes: {results: [...]}, {data: {results: [...]}}, {data: [...]}.
        let results = body
            .get("results")
            .or_else(|| body.get("data").and_then(|d| d.get("results")))
            .or_else(|| body.get("data"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(results
            .iter()
            .filter(|v| v.is_object())
            .map(|item| RawSearchItem {
                title: item_str(item, &["title", "name"]),
                url: item_str(item, &["url", "link"]),
                summary: item_str(item, &["snippet", "content"]),
                score: item.get("score").and_then(Value::as_f64).unwrap_or(0.5),
                published_at: item_str(item, &["published_at", "date"]),
                raw_snippet: item_str(item, &["snippet", "content"]),
            })
            .collect())
    }
}

/// Tavily search API.
pub struct TavilyProvider;

#[async_trait]
impl SearchProvider for TavilyProvider {
    fn name(&self) -> &'static str {
        "tavily"
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        timeout: Duration,
    ) -> Result<Vec<RawSearchItem>, String> {
        let Some(api_key) = config::var("TAVILY_API_KEY") else {
            return Ok(Vec::new());
        };
        let endpoint = config::var("TAVILY_ENDPOINT")
            .unwrap_or_else(|| "https://api.tavily.com/search".to_string());
        let payload = json!({
            "api_key": api_key,
            "query": query,
            "max_results": top_k.max(1),
            "search_depth": "basic",
        });
        let body = post_json(&endpoint, &payload, timeout, None).await?;

        Ok(body
            .get("results")
            .and_then(Value::as_array)
            .map(|results| {
                results
                    .iter()
                    .map(|item| RawSearchItem {
                        title: item_str(item, &["title"]),
                        url: item_str(item, &["url"]),
                        summary: item_str(item, &["content"]),
                        score: item.get("score").and_then(Value::as_f64).unwrap_or(0.4),
                        published_at: item_str(item, &["published_date"]),
                        raw_snippet: item_str(item, &["content"]),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// SerpAPI Google results.
pub struct SerpApiProvider;

#[async_trait]
impl SearchProvider for SerpApiProvider {
    fn name(&self) -> &'static str {
        "serpapi"
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        timeout: Duration,
    ) -> Result<Vec<RawSearchItem>, String> {
        let Some(api_key) = config::var("SERPAPI_API_KEY") else {
            return Ok(Vec::new());
        };
        let endpoint = config::var("SERPAPI_ENDPOINT")
            .unwrap_or_else(|| "https://serpapi.com/search.json".to_string());
        let url = format!(
            "{endpoint}?q={}&api_key={api_key}&engine=google&num={}",
            urlencode(query),
            top_k.max(1)
        );
        let body = get_json(&url, timeout).await?;

        Ok(body
            .get("organic_results")
            .and_then(Value::as_array)
            .map(|results| {
                results
                    .iter()
                    .map(|item| RawSearchItem {
                        title: item_str(item, &["title"]),
                        url: item_str(item, &["link"]),
                        summary: item_str(item, &["snippet"]),
                        score: 0.55,
                        published_at: item_str(item, &["date"]),
                        raw_snippet: item_str(item, &["snippet"]),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Self-hosted SearXNG instance.
pub struct SearxngProvider;

#[async_trait]
impl SearchProvider for SearxngProvider {
    fn name(&self) -> &'static str {
        "searxng"
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        timeout: Duration,
    ) -> Result<Vec<RawSearchItem>, String> {
        let endpoint = config::var("SEARXNG_ENDPOINT")
            .unwrap_or_else(|| "https://searx.be/search".to_string());
        let engines = config::var("SEARXNG_ENGINES")
            .unwrap_or_else(|| "google,bing,duckduckgo".to_string());
        let language = config::var("SEARXNG_LANGUAGE").unwrap_or_else(|| "zh-CN".to_string());

        let mut url = format!(
            "{endpoint}?q={}&format=json&engines={}&language={}",
            urlencode(query),
            urlencode(&engines),
            urlencode(&language)
        );
        if let Some(categories) = config::var("SEARXNG_CATEGORIES") {
            url.push_str(&format!("&categories={}", urlencode(&categories)));
        }
        let body = get_json(&url, timeout).await?;

        let engine_score = |engine: &str| match engine {
            "google" => 0.55,
            "bing" => 0.50,
            "duckduckgo" => 0.45,
            "wikipedia" => 0.60,
            _ => 0.40,
        };

        Ok(body
            .get("results")
            .and_then(Value::as_array)
            .map(|results| {
                results
                    .iter()
                    .take(top_k)
                    .filter(|v| v.is_object())
                    .map(|item| {
                        let engine = item_str(item, &["engine"]).to_lowercase();
                        RawSearchItem {
                            title: item_str(item, &["title"]),
                            url: item_str(item, &["url"]),
                            summary: item_str(item, &["content"]),
                            score: engine_score(&engine),
                            published_at: item_str(item, &["publishedDate"]),
                            raw_snippet: item_str(item, &["content"]),
                        }
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Bocha web search API.
pub struct BochaProvider;

#[async_trait]
impl SearchProvider for BochaProvider {
    fn name(&self) -> &'static str {
        "bocha"
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        timeout: Duration,
    ) -> Result<Vec<RawSearchItem>, String> {
        let Some(api_key) = config::var("BOCHA_API_KEY") else {
            warn!("博查搜索：BOCHA_API_KEY 为空，跳过");
            return Ok(Vec::new());
        };
        let endpoint = config::var("BOCHA_ENDPOINT")
            .unwrap_or_else(|| "https://api.bochaai.com/v1/web-search".to_string());
        let freshness = config::var("BOCHA_FRESHNESS").unwrap_or_else(|| "oneYear".to_string());
        let summary = config::bool_var("BOCHA_SUMMARY", true);

        let payload = json!({
            "query": query,
            "count": top_k.clamp(1, 25),
            "summary": summary,
            "freshness": freshness,
        });
        let body = post_json(&endpoint, &payload, timeout, Some(&api_key)).await?;

        if let Some(code) = body.get("code").and_then(Value::as_i64) {
            if code != 200 {
                warn!(code, "博查搜索返回错误");
                return Ok(Vec::new());
            }
        }

        let data = body.get("data").unwrap_or(&body);
        let results = data
            .get("webPages")
            .and_then(|w| w.get("value"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(results
            .iter()
            .filter(|v| v.is_object())
            .map(|item| RawSearchItem {
                title: item_str(item, &["name", "title"]),
                url: item_str(item, &["url"]),
                summary: item_str(item, &["summary", "snippet"]),
                score: 0.55,
                published_at: item_str(item, &["datePublished", "dateLastCrawled"]),
                raw_snippet: item_str(item, &["snippet"]),
            })
            .collect())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn allowed_domains() -> HashSet<String> {
    config::var("WEB_ALLOWED_DOMAINS")
        .map(|raw| {
            raw.split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn in_allowed_domains(host: &str, allowed: &HashSet<String>) -> bool {
    allowed
        .iter()
        .any(|domain| host == domain || host.ends_with(&format!(".{domain}")))
}

fn extract_host(url: &str) -> String {
    let host = url
        .split("//")
        .nth(1)
        .unwrap_or(url)
        .split('/')
        .next()
        .unwrap_or("")
        .to_lowercase();
    host.strip_prefix("www.").unwrap_or(&host).to_string()
}

fn normalize_date(raw: &str) -> String {
    let today = || Utc::now().format("%Y-%m-%d").to_string();
    if raw.is_empty() {
        return today();
    }
    let head: String = raw.chars().take(19).collect();
    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(parsed) = NaiveDate::parse_from_str(&head, fmt) {
            return parsed.format("%Y-%m-%d").to_string();
        }
    }
    today()
}

fn urlencode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str, url: &str, summary: &str, score: f64) -> RawSearchItem {
        RawSearchItem {
            title: title.to_string(),
            url: url.to_string(),
            summary: summary.to_string(),
            score,
            published_at: Utc::now().format("%Y-%m-%d").to_string(),
            raw_snippet: summary.to_string(),
        }
    }

    #[test]
    fn test_rank_drops_incomplete_rows() {
        let ranked = rank_candidates(
            "疫苗安全",
            vec![
                item("", "https://a.example.com", "无标题", 0.5),
                item("有效结果", "https://b.example.com", "疫苗安全相关说明", 0.5),
            ],
            5,
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].title, "有效结果");
    }

    #[test]
    fn test_rank_prefers_authoritative_fresh_sources() {
        let ranked = rank_candidates(
            "疫苗安全数据",
            vec![
                item("疫苗安全数据通报", "https://nhc.gov.cn/a", "疫苗安全数据的官方通报", 0.5),
                item("疫苗安全数据讨论", "https://blog.example.com/b", "疫苗安全数据的网友讨论", 0.5),
            ],
            5,
        );
        assert_eq!(ranked.len(), 2);
        assert!(ranked[0].url.contains("gov.cn"));
        assert!(ranked[0].is_authoritative);
        assert!(!ranked[1].is_authoritative);
    }

    #[test]
    fn test_stance_refute_on_rumor_control() {
        let candidate = WebEvidenceCandidate {
            title: "官方辟谣：该消息不实".to_string(),
            source: "example.gov.cn".to_string(),
            url: "https://example.gov.cn/x".to_string(),
            published_at: "2026-01-01".to_string(),
            summary: "经核实为谣言".to_string(),
            relevance: 0.4,
            raw_snippet: String::new(),
            domain: "general".to_string(),
            is_authoritative: true,
        };
        assert_eq!(infer_web_stance("震惊消息必须转发", &candidate), Stance::Refute);
    }

    #[test]
    fn test_stance_support_needs_relevance_and_official_terms() {
        let mut candidate = WebEvidenceCandidate {
            title: "官方公告".to_string(),
            source: "example.com".to_string(),
            url: "https://example.com/x".to_string(),
            published_at: "2026-01-01".to_string(),
            summary: "official bulletin 确认相关信息".to_string(),
            relevance: 0.6,
            raw_snippet: String::new(),
            domain: "general".to_string(),
            is_authoritative: false,
        };
        assert_eq!(infer_web_stance("某信息", &candidate), Stance::Support);
        candidate.relevance = 0.3;
        assert_eq!(infer_web_stance("某信息", &candidate), Stance::Insufficient);
    }

    #[test]
    fn test_host_extraction() {
        assert_eq!(extract_host("https://www.reuters.com/article"), "reuters.com");
        assert_eq!(extract_host("http://nhc.gov.cn/a/b"), "nhc.gov.cn");
    }

    #[test]
    fn test_normalize_date_variants() {
        assert_eq!(normalize_date("2026/01/05"), "2026-01-05");
        assert_eq!(normalize_date("2026-01-05T10:00:00Z"), "2026-01-05");
        let today = Utc::now().format("%Y-%m-%d").to_string();
        assert_eq!(normalize_date(""), today);
    }
}
