//! Opinion simulation: four sequential sub-stages, each LM-backed with a
//! deterministic rule fallback.
//!
//! Sub-stages: emotion/stance distributions, narrative branches,
//! flashpoints + timeline, and the structured suggestion. The streaming
//! variant yields one block per completed sub-stage so the SSE framer can
//! flush between LM calls.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::info;

use crate::config::{
    self, LlmSettings, DEFAULT_SIMULATION_MAX_NARRATIVES, DEFAULT_SIMULATION_MAX_RETRIES,
    DEFAULT_SIMULATION_RETRY_DELAY_SECS, DEFAULT_SIMULATION_TIMEOUT_SECS,
};
use crate::llm::{self, trace};
use crate::types::{
    ActionItem, ClaimItem, EvidenceItem, NarrativeItem, Report, SimulateResponse, Stance,
    SuggestionData, TimelineItem,
};

/// Inputs shared by all sub-stages.
pub struct SimulationInput<'a> {
    pub text: &'a str,
    pub claims: Option<&'a [ClaimItem]>,
    pub evidences: Option<&'a [EvidenceItem]>,
    pub report: Option<&'a Report>,
    pub time_window_hours: i64,
    pub platform: &'a str,
    pub comments: &'a [String],
}

/// One completed sub-stage, as yielded by the streaming variant.
#[derive(Debug, Clone)]
pub struct SimulationBlock {
    pub stage: &'static str,
    pub data: Value,
}

fn max_narratives() -> usize {
    config::int_var(
        "SIMULATION_MAX_NARRATIVES",
        DEFAULT_SIMULATION_MAX_NARRATIVES as i64,
        1,
        10,
    ) as usize
}

fn call_options() -> llm::CallOptions {
    let mut settings = LlmSettings::for_stage("SIMULATION_LLM_MODEL");
    settings.timeout_secs = config::float_var(
        "SIMULATION_TIMEOUT_SEC",
        DEFAULT_SIMULATION_TIMEOUT_SECS,
        1.0,
        600.0,
    );
    let retries = config::int_var(
        "SIMULATION_MAX_RETRIES",
        DEFAULT_SIMULATION_MAX_RETRIES as i64,
        1,
        10,
    ) as usize;
    let delay = config::int_var(
        "SIMULATION_RETRY_DELAY",
        DEFAULT_SIMULATION_RETRY_DELAY_SECS as i64,
        0,
        60,
    ) as u64;
    llm::CallOptions::new(settings, "simulation", "DEBUG_SIMULATION")
        .temperature(0.7)
        .max_tokens(3000)
        .plain_response()
        .retries(retries, Duration::from_secs(delay))
}

async fn call_llm(prompt: &str, step: &str) -> Option<Value> {
    if !config::stage_llm_enabled("SIMULATION_LLM_ENABLED") {
        info!(step, "[Simulation] LLM not enabled, using rule fallback");
        return None;
    }
    let opts = call_options();
    let result = llm::call_json(
        "你是舆情分析专家，擅长预测舆论走向和传播风险。输出必须为严格的 JSON 格式，不要包含任何解释性文字。",
        prompt,
        &opts,
    )
    .await;
    if result.is_none() {
        trace::record(
            "DEBUG_SIMULATION",
            "simulation",
            "llm_all_retries_failed",
            json!({"step": step}),
        );
    }
    result
}

const RISK_LABEL_ZH: [(&str, &str); 5] = [
    ("credible", "可信"),
    ("suspicious", "可疑"),
    ("high_risk", "高风险"),
    ("needs_context", "需要补充语境"),
    ("likely_misinformation", "疑似不实信息"),
];

fn zh_risk_label(label: &str) -> &str {
    RISK_LABEL_ZH
        .iter()
        .find(|(en, _)| *en == label)
        .map(|(_, zh)| *zh)
        .unwrap_or(label)
}

fn build_context_summary(input: &SimulationInput<'_>) -> String {
    let mut parts = Vec::new();
    let preview: String = input.text.chars().take(500).collect();
    parts.push(format!("【待传播内容】\n{preview}"));

    if let Some(claims) = input.claims {
        parts.push(format!("\n【关键主张】({} 条)", claims.len()));
        for (i, c) in claims.iter().take(3).enumerate() {
            let text: String = c.claim_text.chars().take(100).collect();
            parts.push(format!("{}. {text}", i + 1));
        }
    }

    if let Some(evidences) = input.evidences {
        let count = |s: Stance| evidences.iter().filter(|e| e.stance == s).count();
        parts.push(format!(
            "\n【证据情况】支持:{} / 反驳:{} / 不足:{}",
            count(Stance::Support),
            count(Stance::Refute),
            count(Stance::Insufficient)
        ));
    }

    if let Some(report) = input.report {
        parts.push(format!(
            "\n【风险评级】{}（分数:{}）",
            zh_risk_label(report.risk_label.as_str()),
            report.risk_score
        ));
        if !report.suspicious_points.is_empty() {
            parts.push(format!(
                "【可疑点】{}",
                report.suspicious_points[..report.suspicious_points.len().min(3)].join(" / ")
            ));
        }
    }

    parts.join("\n")
}

// ============================================================================
// Step 1: emotion & stance
// ============================================================================

#[derive(Debug, Clone)]
struct EmotionResult {
    emotion_distribution: BTreeMap<String, f64>,
    stance_distribution: BTreeMap<String, f64>,
    emotion_drivers: Vec<String>,
    stance_drivers: Vec<String>,
}

async fn analyze_emotion_stance(input: &SimulationInput<'_>) -> EmotionResult {
    let risk_label = input
        .report
        .map(|r| zh_risk_label(r.risk_label.as_str()))
        .unwrap_or("未知");
    let preview: String = input.text.chars().take(300).collect();
    let comments_json =
        serde_json::to_string(&input.comments[..input.comments.len().min(5)]).unwrap_or_default();
    let prompt = format!(
        "请分析以下内容在社交平台传播时可能引发的情绪分布和立场分化。\n\n\
         平台: {}\n内容预览: {preview}\n风险等级: {risk_label}\n已有评论: {comments_json}\n\n\
         分析要求：\n\
         1. 情绪分布：预测愤怒、恐惧、悲伤、惊讶、中性五种情绪的占比（总和=1）\n\
         2. 立场分布：预测支持、质疑、中立三种立场的占比（总和=1）\n\n\
         输出严格 JSON 格式：\n\
         {{\"emotion_distribution\": {{\"anger\": 0.0, \"fear\": 0.0, \"sadness\": 0.0, \
         \"surprise\": 0.0, \"neutral\": 0.0}}, \
         \"stance_distribution\": {{\"support\": 0.0, \"doubt\": 0.0, \"neutral\": 0.0}}, \
         \"emotion_drivers\": [\"...\"], \"stance_drivers\": [\"...\"]}}",
        input.platform
    );

    if let Some(result) = call_llm(&prompt, "step1_emotion").await {
        let distribution = |key: &str| -> BTreeMap<String, f64> {
            result
                .get(key)
                .and_then(Value::as_object)
                .map(|m| {
                    m.iter()
                        .filter_map(|(k, v)| v.as_f64().map(|f| (k.clone(), f)))
                        .collect()
                })
                .unwrap_or_default()
        };
        let drivers = |key: &str| -> Vec<String> {
            result
                .get(key)
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        };
        return EmotionResult {
            emotion_distribution: distribution("emotion_distribution"),
            stance_distribution: distribution("stance_distribution"),
            emotion_drivers: drivers("emotion_drivers"),
            stance_drivers: drivers("stance_drivers"),
        };
    }

    fallback_emotion_stance(input)
}

fn fallback_emotion_stance(input: &SimulationInput<'_>) -> EmotionResult {
    let lowered = input.text.to_lowercase();
    let trigger_words = ["震惊", "shocking", "breaking", "紧急", "urgent", "必转", "惊天", "曝光"];
    let triggered = trigger_words
        .iter()
        .any(|w| lowered.contains(w) || input.text.contains(w));

    let (anger, fear, sadness, surprise, neutral) = if triggered {
        (0.30, 0.25, 0.10, 0.25, 0.20)
    } else {
        (0.15, 0.15, 0.10, 0.20, 0.40)
    };

    let mut support = 0.25;
    let mut doubt = 0.45;
    let neutral_stance = 0.30;
    if input.report.map(|r| r.risk_score >= 70).unwrap_or(false) {
        doubt = 0.55;
        support = 0.20;
    }
    if input
        .comments
        .iter()
        .any(|c| c.contains("官方") || c.contains("通报"))
    {
        support = 0.40;
        doubt = 0.35;
    }

    EmotionResult {
        emotion_distribution: BTreeMap::from([
            ("anger".to_string(), anger),
            ("fear".to_string(), fear),
            ("sadness".to_string(), sadness),
            ("surprise".to_string(), surprise),
            ("neutral".to_string(), neutral),
        ]),
        stance_distribution: BTreeMap::from([
            ("support".to_string(), support),
            ("doubt".to_string(), doubt),
            ("neutral".to_string(), neutral_stance),
        ]),
        emotion_drivers: vec!["内容包含情绪触发词".to_string()],
        stance_drivers: vec!["风险评级影响用户信任度".to_string()],
    }
}

// ============================================================================
// Step 2: narratives
// ============================================================================

async fn generate_narratives(
    context: &str,
    emotion: &EmotionResult,
    input: &SimulationInput<'_>,
) -> Vec<NarrativeItem> {
    let cap = max_narratives();
    let risk_label = input
        .report
        .map(|r| zh_risk_label(r.risk_label.as_str()))
        .unwrap_or("未知");
    let prompt = format!(
        "基于以下信息，预测未来 {} 小时内舆论可能出现的 {cap} 条叙事分支。\n\n{context}\n\n\
         当前情绪分布: {}\n当前立场分布: {}\n风险等级: {risk_label}\n\n\
         叙事分支要求：\n\
         1. 每条分支代表一种可能的舆论走向\n\
         2. 包含：标题、立场倾向、发生概率(0-1)、触发关键词、代表性言论\n\
         3. 概率总和不超过 1.0\n\n\
         输出严格 JSON 格式：\n\
         {{\"narratives\": [{{\"title\": \"...\", \"stance\": \"support|doubt|neutral|mixed\", \
         \"probability\": 0.0, \"trigger_keywords\": [\"...\"], \"sample_message\": \"...\"}}]}}",
        input.time_window_hours,
        serde_json::to_string(&emotion.emotion_distribution).unwrap_or_default(),
        serde_json::to_string(&emotion.stance_distribution).unwrap_or_default(),
    );

    if let Some(result) = call_llm(&prompt, "step2_narrative").await {
        if let Some(items) = result.get("narratives").and_then(Value::as_array) {
            let narratives: Vec<NarrativeItem> = items
                .iter()
                .take(cap)
                .enumerate()
                .map(|(i, n)| {
                    let keywords: Vec<String> = match n.get("trigger_keywords") {
                        Some(Value::String(s)) => s
                            .replace(',', "，")
                            .split('，')
                            .map(str::trim)
                            .filter(|k| !k.is_empty())
                            .map(str::to_string)
                            .collect(),
                        Some(Value::Array(items)) => items
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::trim)
                            .filter(|k| !k.is_empty())
                            .map(str::to_string)
                            .collect(),
                        _ => Vec::new(),
                    };
                    NarrativeItem {
                        title: n
                            .get("title")
                            .and_then(Value::as_str)
                            .unwrap_or(&format!("叙事分支 {}", i + 1))
                            .to_string(),
                        stance: n
                            .get("stance")
                            .and_then(Value::as_str)
                            .unwrap_or("neutral")
                            .to_string(),
                        probability: n
                            .get("probability")
                            .and_then(Value::as_f64)
                            .unwrap_or(0.25)
                            .clamp(0.0, 1.0),
                        trigger_keywords: keywords.into_iter().take(5).collect(),
                        sample_message: n
                            .get("sample_message")
                            .and_then(Value::as_str)
                            .unwrap_or("")
                            .to_string(),
                    }
                })
                .collect();
            if !narratives.is_empty() {
                return narratives;
            }
        }
    }

    fallback_narratives(input.report)
}

fn fallback_narratives(report: Option<&Report>) -> Vec<NarrativeItem> {
    let risk = report.map(|r| r.risk_score).unwrap_or(50);

    vec![
        NarrativeItem {
            title: "情绪化转发导致快速扩散".to_string(),
            stance: "doubt".to_string(),
            probability: if risk >= 60 { 0.40 } else { 0.25 },
            trigger_keywords: vec!["震惊".to_string(), "必转".to_string(), "内部消息".to_string()],
            sample_message: "用户倾向于先转发后核验，扩散速度快于澄清速度。".to_string(),
        },
        NarrativeItem {
            title: "官方澄清扭转舆论走向".to_string(),
            stance: "support".to_string(),
            probability: 0.35,
            trigger_keywords: vec![
                "官方通报".to_string(),
                "完整证据".to_string(),
                "权威来源".to_string(),
            ],
            sample_message: "官方发布带证据的澄清后，讨论热度逐渐回落。".to_string(),
        },
        NarrativeItem {
            title: "观点分化形成持续争议".to_string(),
            stance: "mixed".to_string(),
            probability: 0.25,
            trigger_keywords: vec![
                "剪辑片段".to_string(),
                "语境争议".to_string(),
                "断章取义".to_string(),
            ],
            sample_message: "不同阵营围绕不完整证据持续争论，真相被淹没。".to_string(),
        },
    ]
}

// ============================================================================
// Step 3: flashpoints + timeline
// ============================================================================

async fn identify_flashpoints(
    context: &str,
    narratives: &[NarrativeItem],
    input: &SimulationInput<'_>,
) -> (Vec<String>, Vec<TimelineItem>) {
    let narratives_json = serde_json::to_string(
        &narratives
            .iter()
            .map(|n| json!({"title": n.title, "probability": n.probability}))
            .collect::<Vec<_>>(),
    )
    .unwrap_or_default();
    let prompt = format!(
        "基于以下信息，识别未来 {} 小时内可能出现的高风险引爆点。\n\n{context}\n\n\
         可能的叙事分支:\n{narratives_json}\n\n平台: {}\n\n\
         引爆点要求：\n\
         1. 识别 2-4 个可能引发舆论爆发的关键节点\n\
         2. 考虑：KOL 介入、媒体跟进、官方回应、证据反转等\n\n\
         输出严格 JSON 格式：\n\
         {{\"flashpoints\": [{{\"description\": \"...\", \"estimated_time\": \"...\", \
         \"risk_level\": \"low|medium|high|critical\", \"trigger_condition\": \"...\"}}], \
         \"timeline\": [{{\"hour\": 1, \"event\": \"...\", \"expected_reach\": \"...\"}}]}}",
        input.time_window_hours, input.platform
    );

    if let Some(result) = call_llm(&prompt, "step3_flashpoint").await {
        let flashpoints: Vec<String> = result
            .get("flashpoints")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|fp| fp.get("description").and_then(Value::as_str))
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let timeline: Vec<TimelineItem> = result
            .get("timeline")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|t| {
                        Some(TimelineItem {
                            hour: t.get("hour").and_then(Value::as_i64)?,
                            event: t.get("event").and_then(Value::as_str)?.to_string(),
                            expected_reach: t
                                .get("expected_reach")
                                .and_then(Value::as_str)
                                .unwrap_or("")
                                .to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        if !flashpoints.is_empty() {
            return (flashpoints, timeline);
        }
    }

    fallback_flashpoints(input.platform, input.time_window_hours)
}

fn fallback_flashpoints(platform: &str, time_window_hours: i64) -> (Vec<String>, Vec<TimelineItem>) {
    let flashpoints = vec![
        format!("{platform} 平台出现断章取义片段传播"),
        format!("前 {} 小时谣言扩散放大风险较高", time_window_hours / 3),
        "KOL 转发可能引发二次传播高峰".to_string(),
    ];
    let timeline = vec![
        TimelineItem {
            hour: 1,
            event: "初始发布，小范围传播".to_string(),
            expected_reach: "百级".to_string(),
        },
        TimelineItem {
            hour: 6,
            event: "情绪发酵，转发加速".to_string(),
            expected_reach: "万级".to_string(),
        },
        TimelineItem {
            hour: 12,
            event: "媒体跟进或官方回应".to_string(),
            expected_reach: "十万级".to_string(),
        },
    ];
    (flashpoints, timeline)
}

// ============================================================================
// Step 4: suggestion
// ============================================================================

async fn generate_suggestion(
    context: &str,
    narratives: &[NarrativeItem],
    flashpoints: &[String],
    input: &SimulationInput<'_>,
) -> SuggestionData {
    let scenario = input
        .report
        .map(|r| r.detected_scenario.as_str())
        .unwrap_or("general");
    let risk_score = input.report.map(|r| r.risk_score).unwrap_or(50);
    let titles: Vec<&str> = narratives.iter().map(|n| n.title.as_str()).collect();
    let prompt = format!(
        "你是舆情应对专家，基于以下分析生成结构化应对建议。\n\n\
         【上下文】\n{context}\n\n\
         【分析结果】\n- 风险分数: {risk_score}\n- 场景类型: {scenario}\n\
         - 主要叙事: {}\n- 引爆点: {}\n\n\
         【输出要求】\n\
         1. 按优先级（urgent/high/medium）分类行动项\n\
         2. 按维度（official/media/platform/user）分类行动项\n\
         3. 每项包含：具体行动、建议时间、责任方\n\
         4. 综合摘要不超过 80 字\n\
         5. 总共 4-6 条行动项\n\n\
         输出严格 JSON 格式，字段名必须完全一致：\n\
         {{\"summary\": \"...\", \"actions\": [{{\"priority\": \"urgent|high|medium\", \
         \"category\": \"official|media|platform|user\", \"action\": \"...\", \
         \"timeline\": \"...\", \"responsible\": \"...\"}}]}}",
        serde_json::to_string(&titles).unwrap_or_default(),
        serde_json::to_string(&flashpoints[..flashpoints.len().min(3)]).unwrap_or_default(),
    );

    if let Some(result) = call_llm(&prompt, "step4_suggestion").await {
        let summary = result
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let actions: Vec<ActionItem> = result
            .get("actions")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .take(6)
                    .map(|item| {
                        // Tolerate common field-name drift in the action text.
                        let action_text = ["action", "coordinated_action", "action_item", "description"]
                            .iter()
                            .filter_map(|k| item.get(*k).and_then(Value::as_str))
                            .find(|s| !s.is_empty())
                            .unwrap_or("")
                            .to_string();
                        ActionItem {
                            priority: item
                                .get("priority")
                                .and_then(Value::as_str)
                                .unwrap_or("medium")
                                .to_string(),
                            category: item
                                .get("category")
                                .and_then(Value::as_str)
                                .unwrap_or("official")
                                .to_string(),
                            action: action_text,
                            timeline: item
                                .get("timeline")
                                .and_then(Value::as_str)
                                .unwrap_or("")
                                .to_string(),
                            responsible: item
                                .get("responsible")
                                .and_then(Value::as_str)
                                .map(str::to_string),
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
        if !summary.is_empty() || !actions.is_empty() {
            return SuggestionData { summary, actions };
        }
    }

    fallback_suggestion(input.report, scenario)
}

fn fallback_suggestion(report: Option<&Report>, scenario: &str) -> SuggestionData {
    let risk_score = report.map(|r| r.risk_score).unwrap_or(50);

    let (mut actions, summary) = if risk_score >= 70 {
        (
            vec![
                ActionItem {
                    priority: "urgent".to_string(),
                    category: "official".to_string(),
                    action: "发布带完整证据链的官方澄清声明".to_string(),
                    timeline: "立即".to_string(),
                    responsible: Some("公关部".to_string()),
                },
                ActionItem {
                    priority: "urgent".to_string(),
                    category: "platform".to_string(),
                    action: "联系平台置顶权威来源，申请谣言标注".to_string(),
                    timeline: "1小时内".to_string(),
                    responsible: Some("运营部".to_string()),
                },
                ActionItem {
                    priority: "high".to_string(),
                    category: "user".to_string(),
                    action: "开通评论区官方回复通道，发布 FAQ".to_string(),
                    timeline: "2小时内".to_string(),
                    responsible: Some("客服部".to_string()),
                },
                ActionItem {
                    priority: "high".to_string(),
                    category: "media".to_string(),
                    action: "准备新闻通稿，联系核心媒体跟进报道".to_string(),
                    timeline: "4小时内".to_string(),
                    responsible: Some("公关部".to_string()),
                },
            ],
            "高风险舆情，需立即启动危机公关，优先官方澄清和平台协调。".to_string(),
        )
    } else if risk_score >= 40 {
        (
            vec![
                ActionItem {
                    priority: "high".to_string(),
                    category: "official".to_string(),
                    action: "准备澄清素材和补充说明".to_string(),
                    timeline: "4小时内".to_string(),
                    responsible: Some("公关部".to_string()),
                },
                ActionItem {
                    priority: "medium".to_string(),
                    category: "platform".to_string(),
                    action: "监测传播态势，必要时申请内容标注".to_string(),
                    timeline: "持续".to_string(),
                    responsible: Some("运营部".to_string()),
                },
                ActionItem {
                    priority: "medium".to_string(),
                    category: "user".to_string(),
                    action: "关注用户反馈，准备常见问题回复".to_string(),
                    timeline: "24小时内".to_string(),
                    responsible: Some("客服部".to_string()),
                },
            ],
            "中等风险，建议主动准备应对素材，密切关注舆情走向。".to_string(),
        )
    } else {
        (
            vec![
                ActionItem {
                    priority: "medium".to_string(),
                    category: "official".to_string(),
                    action: "持续监测舆情动态".to_string(),
                    timeline: "每日".to_string(),
                    responsible: Some("运营部".to_string()),
                },
                ActionItem {
                    priority: "medium".to_string(),
                    category: "user".to_string(),
                    action: "保持信息透明，及时回应用户疑问".to_string(),
                    timeline: "按需".to_string(),
                    responsible: Some("客服部".to_string()),
                },
            ],
            "风险较低，建议持续监测并保持信息透明。".to_string(),
        )
    };

    actions.extend(scenario_actions(scenario, risk_score));
    SuggestionData { summary, actions }
}

fn scenario_actions(scenario: &str, risk_score: i64) -> Vec<ActionItem> {
    let priority = if risk_score >= 50 { "high" } else { "medium" };
    let action = match scenario {
        "health" => Some(("official", "联系专业机构或专家背书，增强权威性", "24小时内", "公关部")),
        "governance" => Some(("official", "准备政策依据和官方文件引用", "12小时内", "法务部")),
        "security" => Some(("platform", "评估信息泄露风险，必要时报警处理", "立即", "安全部")),
        "technology" => Some(("official", "准备技术说明文档，邀请行业专家解读", "24小时内", "技术部")),
        _ => None,
    };
    action
        .map(|(category, text, timeline, responsible)| {
            vec![ActionItem {
                priority: if scenario == "technology" {
                    "medium".to_string()
                } else {
                    priority.to_string()
                },
                category: category.to_string(),
                action: text.to_string(),
                timeline: timeline.to_string(),
                responsible: Some(responsible.to_string()),
            }]
        })
        .unwrap_or_default()
}

// ============================================================================
// Entry points
// ============================================================================

/// Run the full simulation and return the aggregate result.
pub async fn simulate_opinion(input: SimulationInput<'_>) -> SimulateResponse {
    let mut response = SimulateResponse {
        emotion_distribution: BTreeMap::new(),
        stance_distribution: BTreeMap::new(),
        narratives: Vec::new(),
        flashpoints: Vec::new(),
        suggestion: SuggestionData::default(),
        timeline: None,
        emotion_drivers: None,
        stance_drivers: None,
    };
    for block in run_stream(&input).await {
        merge_block(&mut response, &block);
    }
    response
}

/// Run the simulation sub-stages sequentially, collecting one block per
/// stage. The dispatcher emits each block over SSE as it arrives.
pub async fn run_stream(input: &SimulationInput<'_>) -> Vec<SimulationBlock> {
    let context = build_context_summary(input);
    let mut blocks = Vec::with_capacity(4);

    info!("[Simulation] Step 1: Emotion & Stance Analysis");
    let emotion = analyze_emotion_stance(input).await;
    blocks.push(SimulationBlock {
        stage: "emotion",
        data: json!({
            "emotion_distribution": emotion.emotion_distribution,
            "stance_distribution": emotion.stance_distribution,
            "emotion_drivers": emotion.emotion_drivers,
            "stance_drivers": emotion.stance_drivers,
        }),
    });

    info!("[Simulation] Step 2: Narrative Generation");
    let narratives = generate_narratives(&context, &emotion, input).await;
    blocks.push(SimulationBlock {
        stage: "narratives",
        data: json!({"narratives": narratives}),
    });

    info!("[Simulation] Step 3: Flashpoint Identification");
    let (flashpoints, timeline) = identify_flashpoints(&context, &narratives, input).await;
    blocks.push(SimulationBlock {
        stage: "flashpoints",
        data: json!({"flashpoints": flashpoints, "timeline": timeline}),
    });

    info!("[Simulation] Step 4: Suggestion Generation");
    let suggestion = generate_suggestion(&context, &narratives, &flashpoints, input).await;
    blocks.push(SimulationBlock {
        stage: "suggestion",
        data: json!({"suggestion": suggestion}),
    });

    blocks
}

/// Fold one streamed block into the aggregate response.
pub fn merge_block(response: &mut SimulateResponse, block: &SimulationBlock) {
    fn from_value<T: serde::de::DeserializeOwned>(v: &Value) -> Option<T> {
        serde_json::from_value(v.clone()).ok()
    }
    match block.stage {
        "emotion" => {
            if let Some(map) = block.data.get("emotion_distribution").and_then(from_value) {
                response.emotion_distribution = map;
            }
            if let Some(map) = block.data.get("stance_distribution").and_then(from_value) {
                response.stance_distribution = map;
            }
            response.emotion_drivers = block.data.get("emotion_drivers").and_then(from_value);
            response.stance_drivers = block.data.get("stance_drivers").and_then(from_value);
        }
        "narratives" => {
            if let Some(items) = block.data.get("narratives").and_then(from_value) {
                response.narratives = items;
            }
        }
        "flashpoints" => {
            if let Some(items) = block.data.get("flashpoints").and_then(from_value) {
                response.flashpoints = items;
            }
            response.timeline = block.data.get("timeline").and_then(from_value);
        }
        "suggestion" => {
            if let Some(suggestion) = block.data.get("suggestion").and_then(from_value) {
                response.suggestion = suggestion;
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(text: &str) -> SimulationInput<'_> {
        SimulationInput {
            text,
            claims: None,
            evidences: None,
            report: None,
            time_window_hours: 24,
            platform: "general",
            comments: &[],
        }
    }

    #[test]
    fn test_fallback_emotion_triggered_words() {
        let quiet = fallback_emotion_stance(&input("一条普通消息"));
        assert_eq!(quiet.emotion_distribution["neutral"], 0.40);

        let hot = fallback_emotion_stance(&input("震惊！必转！"));
        assert_eq!(hot.emotion_distribution["anger"], 0.30);
        assert_eq!(hot.emotion_distribution["neutral"], 0.20);
    }

    #[test]
    fn test_fallback_narratives_probability_by_risk() {
        let low = fallback_narratives(None);
        assert_eq!(low[0].probability, 0.25);
        let total: f64 = low.iter().map(|n| n.probability).sum();
        assert!(total <= 1.0 + 1e-9);
    }

    #[test]
    fn test_fallback_flashpoints_deterministic() {
        let (fp1, tl1) = fallback_flashpoints("weibo", 24);
        let (fp2, tl2) = fallback_flashpoints("weibo", 24);
        assert_eq!(fp1, fp2);
        assert_eq!(tl1, tl2);
        assert!(fp1[0].contains("weibo"));
        assert_eq!(tl1[0].hour, 1);
    }

    #[test]
    fn test_fallback_suggestion_scales_with_risk() {
        let high = fallback_suggestion(None, "general");
        assert!(high.actions.len() >= 2);

        let health = fallback_suggestion(None, "health");
        assert!(health
            .actions
            .iter()
            .any(|a| a.action.contains("专家背书")));
    }

    #[tokio::test]
    async fn test_stream_yields_four_blocks_in_order() {
        let blocks = run_stream(&input("测试文本")).await;
        let stages: Vec<&str> = blocks.iter().map(|b| b.stage).collect();
        assert_eq!(stages, vec!["emotion", "narratives", "flashpoints", "suggestion"]);
    }

    #[tokio::test]
    async fn test_merge_blocks_rebuilds_response() {
        let sim_input = input("测试文本");
        let blocks = run_stream(&sim_input).await;
        let mut response = simulate_opinion(sim_input).await;
        // Rebuilding from the same blocks reproduces the aggregate.
        let mut rebuilt = SimulateResponse {
            emotion_distribution: BTreeMap::new(),
            stance_distribution: BTreeMap::new(),
            narratives: Vec::new(),
            flashpoints: Vec::new(),
            suggestion: SuggestionData::default(),
            timeline: None,
            emotion_drivers: None,
            stance_drivers: None,
        };
        for block in &blocks {
            merge_block(&mut rebuilt, block);
        }
        response.timeline = rebuilt.timeline.clone();
        assert_eq!(rebuilt.flashpoints, response.flashpoints);
        assert_eq!(rebuilt.suggestion.summary, response.suggestion.summary);
    }
}
