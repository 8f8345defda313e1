//! Natural-language intent classification.
//!
//! Rule patterns cover the common phrasings; anything unmatched is
//! `unknown` and the parser turns it into a clarify prompt.

use std::sync::LazyLock;

use regex::Regex;

/// Recognized natural-language intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Why,
    Compare,
    DeepDive,
    Content,
    MoreEvidence,
    List,
    Analyze,
    ClaimsOnly,
    EvidenceOnly,
    Help,
    Unknown,
}

static INTENT_PATTERNS: LazyLock<Vec<(Intent, Vec<Regex>)>> = LazyLock::new(|| {
    let compile = |patterns: &[&str]| -> Vec<Regex> {
        patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
    };
    vec![
        (
            Intent::Why,
            compile(&[
                r"为什么.*判定",
                r"为什么.*风险",
                r"怎么得出的.*结论",
                r"判定依据.*是什么",
                r"判定.*原因",
                r"为什么.*结论",
                r"解释.*判定",
                r"解释.*风险",
                r"风险.*来源",
                r"结论.*依据",
            ]),
        ),
        (
            Intent::Compare,
            compile(&[
                r"对比.*上次",
                r"比较.*两条记录",
                r"和之前.*对比",
                r"对比.*历史",
                r"比较.*两次",
                r"历史.*对比",
                r"对比分析",
            ]),
        ),
        (
            Intent::DeepDive,
            compile(&[
                r"深入.*分析",
                r"详细.*证据",
                r"证据.*来源",
                r"深入.*证据",
                r"详细.*分析",
                r"展开.*分析",
                r"详细说明",
                r"更详细",
                r"深入看看",
            ]),
        ),
        (
            Intent::Content,
            compile(&[
                r"生成.*应对",
                r"写.*澄清",
                r"应对.*内容",
                r"澄清.*稿",
                r"生成.*声明",
                r"写.*声明",
                r"公关.*稿",
                r"回应.*内容",
            ]),
        ),
        (
            Intent::ClaimsOnly,
            compile(&[r"只.*提取主张", r"仅.*提取主张", r"提取.*主张", r"抽取.*主张"]),
        ),
        (
            Intent::EvidenceOnly,
            compile(&[r"帮我.*检索证据", r"检索证据", r"搜集.*证据"]),
        ),
        (
            Intent::MoreEvidence,
            compile(&[
                r"补充.*证据",
                r"更多.*证据",
                r"再找.*证据",
                r"搜索.*证据",
                r"补充检索",
                r"更多来源",
            ]),
        ),
        (
            Intent::List,
            compile(&[
                r"历史记录",
                r"查看历史",
                r"最近.*记录",
                r"列出.*记录",
                r"有哪些记录",
                r"记录列表",
            ]),
        ),
        (
            Intent::Analyze,
            compile(&[
                r"分析.*文本",
                r"检测.*新闻",
                r"验证.*信息",
                r"核查.*内容",
                r"帮我.*分析",
                r"分析一下",
                r"检测一下",
                r"核查一下",
            ]),
        ),
        (
            Intent::Help,
            compile(&[
                r"怎么用",
                r"帮助",
                r"使用.*方法",
                r"功能.*介绍",
                r"有什么.*功能",
                r"能做什么",
                r"支持.*命令",
            ]),
        ),
    ]
});

/// Classify free text into an intent; first matching pattern wins.
pub fn classify_intent(text: &str) -> Intent {
    let t = text.trim();
    if t.is_empty() {
        return Intent::Help;
    }
    for (intent, patterns) in INTENT_PATTERNS.iter() {
        if patterns.iter().any(|p| p.is_match(t)) {
            return *intent;
        }
    }
    Intent::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_why_patterns() {
        assert_eq!(classify_intent("为什么判定为高风险"), Intent::Why);
        assert_eq!(classify_intent("解释一下这个风险结论"), Intent::Why);
    }

    #[test]
    fn test_evidence_and_claims_patterns() {
        assert_eq!(classify_intent("帮我检索证据：某地发生了某事"), Intent::EvidenceOnly);
        assert_eq!(classify_intent("只帮我提取主张：某新闻内容"), Intent::ClaimsOnly);
        assert_eq!(classify_intent("补充一些证据"), Intent::MoreEvidence);
    }

    #[test]
    fn test_list_and_help_patterns() {
        assert_eq!(classify_intent("查看历史记录"), Intent::List);
        assert_eq!(classify_intent("这个怎么用"), Intent::Help);
        assert_eq!(classify_intent(""), Intent::Help);
    }

    #[test]
    fn test_unknown() {
        assert_eq!(classify_intent("今天天气怎么样"), Intent::Unknown);
    }
}
