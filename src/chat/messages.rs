//! Assistant message builders for the record-centric tools.
//!
//! These tools answer from the history store without touching the LM, so
//! they produce a single structured message each. Missing records resolve
//! to a uniform "not found" message; lookups never fail the turn.

use serde_json::{json, Value};

use crate::store::HistoryStore;
use crate::types::{ChatAction, ChatMessage, ChatReference};

fn history_link() -> ChatAction {
    ChatAction::link("打开历史记录", "/history")
}

fn record_not_found(record_id: &str) -> ChatMessage {
    ChatMessage::assistant(format!("未找到历史记录：{record_id}。"))
        .with_actions(vec![history_link()])
}

fn record_reference(record: &crate::types::HistoryDetail) -> ChatReference {
    ChatReference {
        title: format!("历史记录：{}", record.id),
        href: "/history".to_string(),
        description: Some(format!(
            "风险: {}（{}） · 时间: {}",
            record.risk_label, record.risk_score, record.created_at
        )),
    }
}

/// `/help` and unmatched short inputs.
pub fn build_help_message() -> ChatMessage {
    ChatMessage::assistant(
        "当前对话工作台已启用后端工具白名单编排。\n\n\
         可用命令：\n\
         - /analyze <待分析文本>：发起全链路分析\n\
         - /load_history <record_id>：加载历史记录到前端上下文（仅命令）\n\
         - /why <record_id>：解释为什么给出该风险/结论（支持自然语言：\u{201c}为什么判定高风险\u{201d}）\n\
         - /list [N]：列出最近 N 条历史记录的 record_id（默认 10，例如 /list 20）\n\
         - /more_evidence：基于当前上下文，给出补充证据的下一步动作\n\
         - /rewrite [short|neutral|friendly]：改写解释版本（仅命令）\n\
         - /compare <record_id_1> <record_id_2>：对比两条历史记录的分析结果\n\
         - /deep_dive <record_id> [focus] [claim_index]：深入分析某一焦点领域\n\
           - focus 可选：general（默认）/evidence/claims/timeline/sources\n\n\
         - /claims_only <文本>：仅提取主张\n\
         - /evidence_only <文本>：仅检索证据（复用会话主张）\n\
         - /align_only [record_id]：仅做证据对齐\n\
         - /report_only [record_id]：仅生成报告\n\
         - /simulate [record_id]：仅执行舆情预演\n\
         - /content_generate [style=...]：仅生成应对内容\n\n\
         - /content [style=... detail=brief|full force=true|false reuse_only=true|false]：CLI 友好应对内容\n\
         - /content_show clarification short|medium|long：查看澄清稿指定版本\n\
         - /content_show faq 1-5：查看 FAQ 区间\n\
         - /content_show scripts weibo,wechat：查看指定平台话术\n\n\
         标注「仅命令」的工具不支持自然语言，其他工具均支持自然语言表达。\n\n\
         record_id 来源：分析完成后会写入历史记录；也可以用 /list 查询后再 /load_history <record_id>。\n\n\
         你也可以直接粘贴长文本（系统会先询问你要完整分析还是单技能处理）。",
    )
    .with_actions(vec![
        ChatAction::link("检测结果", "/result"),
        history_link(),
    ])
}

/// Disambiguation prompt when the intent of a pasted text is unclear.
pub fn build_intent_clarify_message(raw_text: &str) -> ChatMessage {
    let mut preview: String = raw_text.trim().chars().take(180).collect();
    if raw_text.trim().chars().count() > 180 {
        preview.push_str("...");
    }
    ChatMessage::assistant(format!(
        "我收到一段文本，但当前意图还不够明确。\n\n\
         你希望我怎么处理这段内容？\n\
         - 做完整分析（风险快照->主张->证据->对齐->报告）\n\
         - 或直接选择单技能（主张/证据/对齐/报告/预演/应对内容）\n\n\
         文本预览：{preview}"
    ))
    .with_actions(vec![
        ChatAction::command("完整分析", format!("/analyze {preview}")),
        ChatAction::command("仅提取主张", format!("/claims_only {preview}")),
        ChatAction::command("仅检索证据", format!("/evidence_only {preview}")),
        ChatAction::command("仅证据对齐", "/align_only"),
        ChatAction::command("仅生成报告", "/report_only"),
        ChatAction::command("仅舆情预演", "/simulate"),
        ChatAction::command("仅应对内容", "/content_generate"),
        ChatAction::command("查看帮助", "/help"),
    ])
    .with_meta(json!({"intent": "clarify", "input_preview": preview}))
}

/// Usage hint for `/why` without a resolvable record id.
pub fn build_why_usage_message() -> ChatMessage {
    ChatMessage::assistant(
        "用法：/why <record_id>\n\n\
         - 先使用 /list 查看最近的 record_id\n\
         - 或先 /load_history <record_id> 加载到前端上下文后再追问\n",
    )
    .with_actions(vec![
        ChatAction::command("列出最近记录（/list）", "/list"),
        history_link(),
    ])
}

/// `/list [N]`.
pub fn run_list(store: &HistoryStore, limit: i64) -> ChatMessage {
    let rows = store.list(limit).unwrap_or_default();

    if rows.is_empty() {
        return ChatMessage::assistant(
            "暂无可用的历史记录。\n\n\
             你可以先发送 `/analyze <待分析文本>` 生成一次分析；或稍后再试。",
        )
        .with_actions(vec![
            ChatAction::command("示例：开始分析", "/analyze 网传某事件100%真实，内部人士称..."),
            history_link(),
        ]);
    }

    let mut lines = vec![format!("最近 {} 条历史记录（可用于 /load_history）：", rows.len())];
    for (idx, row) in rows.iter().enumerate() {
        lines.push(format!(
            "{}. {} · {} · {}({})",
            idx + 1,
            row.id,
            row.created_at,
            row.risk_label,
            row.risk_score
        ));
        if !row.input_preview.is_empty() {
            lines.push(format!("   摘要: {}", row.input_preview));
        }
    }
    lines.push(String::new());
    lines.push(format!("用法：/load_history <record_id>（例如：/load_history {}）", rows[0].id));

    ChatMessage::assistant(lines.join("\n")).with_actions(vec![
        ChatAction::command("加载最新记录到前端", format!("/load_history {}", rows[0].id)),
        history_link(),
    ])
}

/// `/load_history <record_id>`.
pub fn run_load_history(store: &HistoryStore, record_id: &str) -> ChatMessage {
    let Some(record) = store.get(record_id).ok().flatten() else {
        return record_not_found(record_id);
    };

    ChatMessage::assistant(
        "已定位到历史记录。你可以点击下方命令，将其加载到前端上下文，然后到结果页查看模块化结果。",
    )
    .with_actions(vec![
        ChatAction::command("加载到前端上下文", format!("/load_history {}", record.id)),
        ChatAction::link("打开检测结果", "/result"),
    ])
    .with_references(vec![record_reference(&record)])
    .with_meta(json!({"record_id": record.id}))
}

/// `/more_evidence`.
pub fn run_more_evidence(store: &HistoryStore, record_id: &str) -> ChatMessage {
    let Some(record) = store.get(record_id).ok().flatten() else {
        return record_not_found(record_id);
    };

    ChatMessage::assistant(
        "补充证据建议：\n\
         - 点击下方按钮重试【证据检索】阶段，以获取更多候选证据\n\
         - 若证据已更新，可再重试【综合报告】阶段刷新结论\n",
    )
    .with_actions(vec![
        ChatAction::command("重试证据检索（/retry evidence）", "/retry evidence"),
        ChatAction::command("重试综合报告（/retry report）", "/retry report"),
        ChatAction::link("打开检测结果", "/result"),
    ])
    .with_references(vec![record_reference(&record)])
    .with_meta(json!({"record_id": record.id}))
}

/// `/rewrite [style]`.
pub fn run_rewrite(store: &HistoryStore, record_id: &str, style: &str) -> ChatMessage {
    let Some(record) = store.get(record_id).ok().flatten() else {
        return record_not_found(record_id);
    };

    let style = match style {
        "neutral" | "friendly" => style,
        _ => "short",
    };

    let reasons: Vec<String> = record
        .detect_data
        .as_ref()
        .and_then(|d| d.get("reasons"))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .take(3)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let suspicious_points: Vec<String> = record
        .report
        .get("suspicious_points")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .take(3)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let risk_label = &record.risk_label;
    let risk_score = record.risk_score;

    let content = match style {
        "friendly" => format!(
            "改写（亲切版）：目前的辅助判断是【{risk_label}】（score={risk_score}）。\n\
             我主要参考了风险快照的触发原因，以及报告里整理的可疑点/证据对齐结果。\n{}\
             如果你希望我再多找一些证据，可以直接输入 /more_evidence。",
            if suspicious_points.is_empty() {
                String::new()
            } else {
                format!("你可以重点留意：\n- {}\n", suspicious_points.join("\n- "))
            }
        ),
        "neutral" => format!(
            "改写（中性版）：综合判断为【{risk_label}】（score={risk_score}）。\n\
             依据来源：风险快照触发原因 + 报告可疑点 + 主张-证据对齐结果。\n{}{}",
            if reasons.is_empty() {
                String::new()
            } else {
                format!("风险快照原因（节选）：\n- {}\n", reasons.join("\n- "))
            },
            if suspicious_points.is_empty() {
                String::new()
            } else {
                format!("报告可疑点（节选）：\n- {}\n", suspicious_points.join("\n- "))
            }
        ),
        _ => format!(
            "改写（短版）：结论为【{risk_label}】（score={risk_score}）。\n{}{}\
             （提示：可用 /more_evidence 或 /retry evidence 补充证据）",
            if reasons.is_empty() {
                String::new()
            } else {
                format!("风险快照原因：{}\n", reasons.join("；"))
            },
            if suspicious_points.is_empty() {
                String::new()
            } else {
                format!("可疑点：{}\n", suspicious_points.join("；"))
            }
        ),
    };

    ChatMessage::assistant(content)
        .with_actions(vec![
            ChatAction::command("补充证据（/more_evidence）", "/more_evidence"),
            ChatAction::link("打开检测结果", "/result"),
        ])
        .with_references(vec![record_reference(&record)])
        .with_meta(json!({"record_id": record.id, "style": style}))
}

/// `/why <record_id>`: explain the verdict from the stored snapshot/report.
pub fn run_why(store: &HistoryStore, record_id: &str) -> ChatMessage {
    let Some(record) = store.get(record_id).ok().flatten() else {
        return record_not_found(record_id);
    };

    let detect = record.detect_data.clone().unwrap_or(Value::Null);
    let report = &record.report;

    let reasons: Vec<String> = detect
        .get("reasons")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .take(5)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let suspicious_points: Vec<String> = report
        .get("suspicious_points")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .take(5)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let claim_reports = report
        .get("claim_reports")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut refs = vec![record_reference(&record)];
    let mut seen_urls = std::collections::HashSet::new();
    'outer: for row in claim_reports.iter().take(3) {
        for ev in row
            .get("evidences")
            .and_then(Value::as_array)
            .map(|a| a.iter().take(3).collect::<Vec<_>>())
            .unwrap_or_default()
        {
            let url = ev.get("url").and_then(Value::as_str).unwrap_or("");
            if !url.starts_with("http") || !seen_urls.insert(url.to_string()) {
                continue;
            }
            let title = ev.get("title").and_then(Value::as_str).unwrap_or(url);
            refs.push(ChatReference {
                title: title.chars().take(80).collect(),
                href: url.to_string(),
                description: Some(format!(
                    "证据立场: {} · 置信度: {}",
                    ev.get("stance").and_then(Value::as_str).unwrap_or("?"),
                    ev.get("alignment_confidence")
                        .and_then(Value::as_f64)
                        .map(|c| format!("{c:.2}"))
                        .unwrap_or_else(|| "N/A".to_string())
                )),
            });
            if refs.len() >= 8 {
                break 'outer;
            }
        }
    }

    let mut lines = vec![
        "解释：本结论来自风险快照 + 报告阶段对主张与证据的综合判断。".to_string(),
        String::new(),
        format!(
            "- 风险快照：{}（score={}）",
            detect
                .get("label")
                .and_then(Value::as_str)
                .unwrap_or(&record.risk_label),
            detect
                .get("score")
                .and_then(Value::as_i64)
                .unwrap_or(record.risk_score)
        ),
    ];
    if !reasons.is_empty() {
        lines.push("  - 触发原因：".to_string());
        for r in &reasons {
            lines.push(format!("    - {r}"));
        }
    }
    lines.push(format!(
        "- 综合报告：{}（score={}）",
        report
            .get("risk_label")
            .and_then(Value::as_str)
            .unwrap_or(&record.risk_label),
        report
            .get("risk_score")
            .and_then(Value::as_i64)
            .unwrap_or(record.risk_score)
    ));
    if !suspicious_points.is_empty() {
        lines.push("  - 可疑点摘要：".to_string());
        for p in &suspicious_points {
            lines.push(format!("    - {p}"));
        }
    }
    if !claim_reports.is_empty() {
        lines.push("  - 主张级证据对齐（节选）：".to_string());
        for row in claim_reports.iter().take(3) {
            let claim_text = row
                .get("claim")
                .and_then(|c| c.get("claim_text"))
                .and_then(Value::as_str)
                .unwrap_or("");
            let stance = row
                .get("final_stance")
                .and_then(Value::as_str)
                .unwrap_or("");
            let preview: String = claim_text.chars().take(60).collect();
            lines.push(format!("    - 主张：{preview}… → 结论：{stance}"));
        }
    }
    lines.push(String::new());
    lines.push("提示：你可以先加载该 record_id 到前端上下文，再打开结果页查看完整模块化结果与证据链。".to_string());

    let risk_score = report
        .get("risk_score")
        .and_then(Value::as_i64)
        .unwrap_or(record.risk_score);

    let mut actions = vec![
        ChatAction::command("加载到前端上下文", format!("/load_history {}", record.id)),
        ChatAction::command("补充证据（/more_evidence）", "/more_evidence"),
    ];
    if risk_score >= 70 {
        actions.push(ChatAction::link("生成应对内容", "/content"));
        actions.push(ChatAction::command(
            "深入分析证据",
            format!("/deep_dive {} evidence", record.id),
        ));
    } else {
        actions.push(ChatAction::command(
            "查看证据来源",
            format!("/deep_dive {} sources", record.id),
        ));
        actions.push(ChatAction::command("对比历史记录", "/list"));
    }
    actions.extend([
        ChatAction::command("改写为短版（/rewrite short）", "/rewrite short"),
        ChatAction::link("打开检测结果", "/result"),
        history_link(),
    ]);

    ChatMessage::assistant(lines.join("\n"))
        .with_actions(actions)
        .with_references(refs)
        .with_meta(json!({"record_id": record.id}))
}

/// `/compare <id1> <id2>`.
pub fn run_compare(store: &HistoryStore, record_id_1: &str, record_id_2: &str) -> ChatMessage {
    let record_1 = store.get(record_id_1).ok().flatten();
    let record_2 = store.get(record_id_2).ok().flatten();

    let mut errors = Vec::new();
    if record_1.is_none() {
        errors.push(format!("未找到历史记录 1：{record_id_1}"));
    }
    if record_2.is_none() {
        errors.push(format!("未找到历史记录 2：{record_id_2}"));
    }
    if !errors.is_empty() {
        return ChatMessage::assistant(errors.join("\n")).with_actions(vec![history_link()]);
    }
    let (Some(record_1), Some(record_2)) = (record_1, record_2) else {
        return ChatMessage::assistant("历史记录读取失败").with_actions(vec![history_link()]);
    };

    let describe = |label: &str, record: &crate::types::HistoryDetail| -> Vec<String> {
        vec![
            format!("【{label}】"),
            format!("- record_id: {}", record.id),
            format!("- 报告风险: {} (score={})", record.risk_label, record.risk_score),
            format!("- 场景: {}", record.detected_scenario),
            format!(
                "- 主张数: {}",
                record
                    .report
                    .get("claim_reports")
                    .and_then(Value::as_array)
                    .map(|a| a.len())
                    .unwrap_or(0)
            ),
            String::new(),
        ]
    };

    let mut lines = vec!["=== 对比分析 ===".to_string(), String::new()];
    lines.extend(describe("记录 1", &record_1));
    lines.extend(describe("记录 2", &record_2));

    let score_diff = record_1.risk_score - record_2.risk_score;
    if score_diff > 10 {
        lines.push(format!("风险差异：记录 1 风险更高 (差值: +{score_diff})"));
    } else if score_diff < -10 {
        lines.push(format!("风险差异：记录 2 风险更高 (差值: {score_diff})"));
    } else {
        lines.push(format!("风险差异：两者接近 (差值: {score_diff})"));
    }

    ChatMessage::assistant(lines.join("\n"))
        .with_actions(vec![
            ChatAction::command("加载记录 1", format!("/load_history {}", record_1.id)),
            ChatAction::command("加载记录 2", format!("/load_history {}", record_2.id)),
            ChatAction::command("深入分析记录 1", format!("/deep_dive {}", record_1.id)),
            history_link(),
        ])
        .with_references(vec![record_reference(&record_1), record_reference(&record_2)])
        .with_meta(json!({"record_id_1": record_1.id, "record_id_2": record_2.id}))
}

/// `/deep_dive <record_id> [focus] [claim_index]`.
pub fn run_deep_dive(
    store: &HistoryStore,
    record_id: &str,
    focus: &str,
    claim_index: Option<usize>,
) -> ChatMessage {
    let Some(record) = store.get(record_id).ok().flatten() else {
        return record_not_found(record_id);
    };

    let report = &record.report;
    let claim_reports = report
        .get("claim_reports")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut lines = vec![
        format!("=== 深入分析 ({focus}) ==="),
        format!("record_id: {}", record.id),
        String::new(),
    ];

    if matches!(focus, "general" | "evidence") {
        let mut stance_counts = std::collections::BTreeMap::from([
            ("support", 0usize),
            ("refute", 0usize),
            ("insufficient", 0usize),
        ]);
        let mut source_urls = std::collections::HashSet::new();
        let mut total = 0usize;
        for cr in &claim_reports {
            for ev in cr
                .get("evidences")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
            {
                total += 1;
                if let Some(stance) = ev.get("stance").and_then(Value::as_str) {
                    if let Some(count) = stance_counts.get_mut(stance) {
                        *count += 1;
                    }
                }
                if let Some(url) = ev.get("url").and_then(Value::as_str) {
                    if url.starts_with("http") {
                        source_urls.insert(url.to_string());
                    }
                }
            }
        }
        lines.push("【证据深度分析】".to_string());
        lines.push(format!("- 对齐证据总数: {total}"));
        lines.push("- 证据立场分布:".to_string());
        lines.push(format!("  - 支持: {}", stance_counts["support"]));
        lines.push(format!("  - 反对: {}", stance_counts["refute"]));
        lines.push(format!("  - 证据不足: {}", stance_counts["insufficient"]));
        lines.push(format!("- 来源链接数: {}", source_urls.len()));
        lines.push(String::new());
    }

    if matches!(focus, "general" | "claims") && !claim_reports.is_empty() {
        lines.push("【主张分析】".to_string());
        let targets: Vec<(usize, &Value)> = match claim_index {
            Some(idx) if idx < claim_reports.len() => vec![(idx, &claim_reports[idx])],
            _ => claim_reports.iter().enumerate().collect(),
        };
        if claim_index.is_some() && targets.len() == 1 {
            lines.push(format!("- 聚焦主张 #{}", targets[0].0));
        }
        for (idx, cr) in targets {
            let claim_text: String = cr
                .get("claim")
                .and_then(|c| c.get("claim_text"))
                .and_then(Value::as_str)
                .unwrap_or("")
                .chars()
                .take(80)
                .collect();
            let stance = cr
                .get("final_stance")
                .and_then(Value::as_str)
                .unwrap_or("未知");
            let count = cr
                .get("evidences")
                .and_then(Value::as_array)
                .map(|a| a.len())
                .unwrap_or(0);
            lines.push(format!("  主张 {idx}: {claim_text}…"));
            lines.push(format!("    - 结论: {stance}"));
            lines.push(format!("    - 证据数: {count}"));
        }
        lines.push(String::new());
    }

    if matches!(focus, "general" | "timeline") {
        lines.push("【时间线】".to_string());
        lines.push(format!("- 创建时间: {}", record.created_at));
        if let Some(reasons) = record
            .detect_data
            .as_ref()
            .and_then(|d| d.get("reasons"))
            .and_then(Value::as_array)
        {
            lines.push("- 风险快照触发原因:".to_string());
            for r in reasons.iter().filter_map(Value::as_str).take(3) {
                lines.push(format!("  - {r}"));
            }
        }
        lines.push(String::new());
    }

    if matches!(focus, "general" | "sources") {
        lines.push("【来源追溯】".to_string());
        let mut seen = std::collections::HashSet::new();
        'sources: for cr in &claim_reports {
            for ev in cr
                .get("evidences")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
            {
                let url = ev.get("url").and_then(Value::as_str).unwrap_or("");
                if !url.starts_with("http") || !seen.insert(url.to_string()) {
                    continue;
                }
                let title: String = ev
                    .get("title")
                    .and_then(Value::as_str)
                    .unwrap_or(url)
                    .chars()
                    .take(60)
                    .collect();
                lines.push(format!("  - [{title}]({url})"));
                if seen.len() >= 10 {
                    break 'sources;
                }
            }
        }
        lines.push(String::new());
    }

    ChatMessage::assistant(lines.join("\n"))
        .with_actions(vec![
            ChatAction::command("为什么这样判定", format!("/why {}", record.id)),
            ChatAction::command("补充证据", "/more_evidence"),
            ChatAction::command("深入证据", format!("/deep_dive {} evidence", record.id)),
            ChatAction::command("深入主张", format!("/deep_dive {} claims", record.id)),
            ChatAction::link("打开检测结果", "/result"),
        ])
        .with_references(vec![record_reference(&record)])
        .with_meta(json!({"record_id": record.id, "focus": focus}))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> HistoryStore {
        HistoryStore::set_db_path_for_tests(
            crate::store::db::test_db_dir().join("history.db"),
        );
        HistoryStore::new()
    }

    fn seed_record(store: &HistoryStore) -> String {
        store
            .save_report(
                "测试输入",
                &json!({
                    "risk_score": 43,
                    "risk_level": "high",
                    "risk_label": "suspicious",
                    "detected_scenario": "general",
                    "evidence_domains": ["media"],
                    "summary": "摘要",
                    "suspicious_points": ["c1 被证据反驳"],
                    "claim_reports": [{
                        "claim": {"claim_id": "c1", "claim_text": "主张文本", "source_sentence": "主张文本"},
                        "evidences": [{
                            "evidence_id": "s1", "claim_id": "c1", "title": "证据标题",
                            "source": "src", "url": "https://example.com/e",
                            "published_at": "2026-01-01", "summary": "x",
                            "stance": "refute", "source_weight": 0.8,
                            "source_type": "web_summary", "alignment_confidence": 0.7,
                        }],
                        "final_stance": "refute",
                        "notes": [],
                    }],
                }),
                Some(&json!({"label": "suspicious", "score": 60, "confidence": 0.2, "reasons": ["命中高风险词"]})),
                None,
            )
            .unwrap()
    }

    #[test]
    fn test_help_lists_commands() {
        let msg = build_help_message();
        assert!(msg.content.contains("/analyze"));
        assert!(msg.content.contains("/claims_only"));
        assert!(msg.content.contains("/content_show"));
    }

    #[test]
    fn test_why_usage_message() {
        let msg = build_why_usage_message();
        assert!(msg.content.contains("用法：/why"));
    }

    #[test]
    fn test_why_renders_reasons_and_claims() {
        let store = store();
        let id = seed_record(&store);
        let msg = run_why(&store, &id);
        assert!(msg.content.contains("风险快照"));
        assert!(msg.content.contains("命中高风险词"));
        assert!(msg.content.contains("主张级证据对齐"));
        assert!(msg.references.len() >= 2);
    }

    #[test]
    fn test_why_missing_record() {
        let store = store();
        let msg = run_why(&store, "rec_missing");
        assert!(msg.content.contains("未找到历史记录"));
    }

    #[test]
    fn test_compare_reports_score_diff() {
        let store = store();
        let id1 = seed_record(&store);
        let id2 = seed_record(&store);
        let msg = run_compare(&store, &id1, &id2);
        assert!(msg.content.contains("对比分析"));
        assert!(msg.content.contains("两者接近"));
    }

    #[test]
    fn test_deep_dive_evidence_focus() {
        let store = store();
        let id = seed_record(&store);
        let msg = run_deep_dive(&store, &id, "evidence", None);
        assert!(msg.content.contains("证据深度分析"));
        assert!(msg.content.contains("反对: 1"));
    }

    #[test]
    fn test_rewrite_styles() {
        let store = store();
        let id = seed_record(&store);
        let short = run_rewrite(&store, &id, "short");
        assert!(short.content.contains("改写（短版）"));
        let neutral = run_rewrite(&store, &id, "neutral");
        assert!(neutral.content.contains("改写（中性版）"));
        let weird = run_rewrite(&store, &id, "weird");
        assert!(weird.content.contains("改写（短版）"));
    }
}
