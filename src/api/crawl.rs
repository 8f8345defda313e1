//! News URL crawling: fetch, strip page chrome, then extract the article
//! with an LM call (heuristics as fallback).

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde_json::Value;
use tracing::{error, info};

use crate::config::LlmSettings;
use crate::llm;

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

lazy_re!(
    CHROME_RE,
    r"(?is)<(script|style|head|nav|footer|iframe)[^>]*>.*?</(script|style|head|nav|footer|iframe)>"
);
lazy_re!(COMMENT_RE, r"(?s)<!--.*?-->");
lazy_re!(TAG_RE, r"<[^>]+>");
lazy_re!(TITLE_RE, r"(?is)<title[^>]*>(.*?)</title>");
lazy_re!(WS_RE, r"\s+");

/// Result of one crawl.
#[derive(Debug, Clone)]
pub struct CrawledNews {
    pub title: String,
    pub content: String,
    pub publish_date: String,
    pub source_url: String,
    pub success: bool,
    pub error_msg: String,
}

impl CrawledNews {
    fn failure(url: &str, error_msg: String) -> Self {
        Self {
            title: String::new(),
            content: String::new(),
            publish_date: String::new(),
            source_url: url.to_string(),
            success: false,
            error_msg,
        }
    }
}

/// Fetch a URL and extract title / body / publish date.
pub async fn crawl_news_url(url: &str) -> CrawledNews {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .user_agent(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
             Chrome/120.0.0.0 Safari/537.36",
        )
        .build()
        .unwrap_or_default();

    let response = match client
        .get(url)
        .timeout(Duration::from_secs(15))
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => {
            error!(url, error = %e, "抓取 URL 失败");
            return CrawledNews::failure(url, e.to_string());
        }
    };
    if !response.status().is_success() {
        let status = response.status();
        error!(url, %status, "抓取 URL 返回错误状态");
        return CrawledNews::failure(url, format!("status {status}"));
    }
    let html = match response.text().await {
        Ok(text) => text,
        Err(e) => return CrawledNews::failure(url, e.to_string()),
    };

    let cleaned = preprocess_html(&html);
    extract_news(url, &html, &cleaned).await
}

/// Drop scripts, styles and page chrome; keep readable text.
fn preprocess_html(html: &str) -> String {
    let stripped = CHROME_RE.replace_all(html, "");
    let stripped = COMMENT_RE.replace_all(&stripped, "");
    let text = TAG_RE.replace_all(&stripped, " ");
    let collapsed = WS_RE.replace_all(&text, " ");
    collapsed.trim().chars().take(12_000).collect()
}

async fn extract_news(url: &str, raw_html: &str, cleaned: &str) -> CrawledNews {
    // LM structured extraction when available.
    let settings = LlmSettings::for_stage("LLM_MODEL");
    if !settings.api_key.is_empty() {
        let prompt = format!(
            "你是新闻结构化提取器。从以下网页文本中提取新闻标题、正文与发布日期，\
             输出严格JSON：{{\"title\":\"...\",\"content\":\"...\",\"publish_date\":\"YYYY-MM-DD或空\"}}。\n\n\
             网页文本：\n{}",
            cleaned.chars().take(6000).collect::<String>()
        );
        let opts = llm::CallOptions::new(settings, "news_crawler", "DEBUG_WEB_RETRIEVAL");
        if let Some(parsed) = llm::call_json("你是严谨的新闻提取助手，只返回JSON。", &prompt, &opts).await
        {
            let field = |key: &str| {
                parsed
                    .get(key)
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .trim()
                    .to_string()
            };
            let title = field("title");
            let content = field("content");
            if !content.is_empty() {
                info!(url, "URL 提取：LLM结构化提取成功");
                return CrawledNews {
                    title,
                    content,
                    publish_date: field("publish_date"),
                    source_url: url.to_string(),
                    success: true,
                    error_msg: String::new(),
                };
            }
        }
    }

    // Heuristic fallback: <title> plus the cleaned text.
    let title = TITLE_RE
        .captures(raw_html)
        .map(|c| WS_RE.replace_all(c[1].trim(), " ").into_owned())
        .unwrap_or_default();
    if cleaned.is_empty() {
        return CrawledNews::failure(url, "empty page content".to_string());
    }
    CrawledNews {
        title,
        content: cleaned.chars().take(8000).collect(),
        publish_date: String::new(),
        source_url: url.to_string(),
        success: true,
        error_msg: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_strips_chrome() {
        let html = "<html><head><title>标题</title></head><body>\
                    <script>alert(1)</script><nav>menu</nav>\
                    <p>正文第一段。</p><p>正文第二段。</p>\
                    <!-- comment --></body></html>";
        let cleaned = preprocess_html(html);
        assert!(cleaned.contains("正文第一段"));
        assert!(!cleaned.contains("alert"));
        assert!(!cleaned.contains("menu"));
        assert!(!cleaned.contains("comment"));
    }

    #[test]
    fn test_title_extraction() {
        let html = "<html><head><title> 新闻标题 </title></head><body>x</body></html>";
        let captured = TITLE_RE.captures(html).map(|c| c[1].trim().to_string());
        assert_eq!(captured.as_deref(), Some("新闻标题"));
    }
}
