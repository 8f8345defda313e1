//! Analysis history store.
//!
//! Records are append-only: scalar fields freeze at insert; feedback,
//! simulation and content attach additively afterwards. Lookups tolerate
//! absence (a session may point at a deleted record).

use rusqlite::{params, OptionalExtension};
use serde_json::Value;
use uuid::Uuid;

use crate::types::{HistoryDetail, HistoryItem};

use super::db::{now_utc, with_connection, DbLocation, StoreError};

pub(crate) static HISTORY_DB: DbLocation =
    DbLocation::new("HISTORY_DB_PATH", "data/history/history.db", "history.db");

pub(crate) const SCHEMA: [&str; 1] = ["CREATE TABLE IF NOT EXISTS analysis_history (
        id TEXT PRIMARY KEY,
        created_at TEXT NOT NULL,
        input_text TEXT NOT NULL,
        risk_label TEXT NOT NULL,
        risk_score INTEGER NOT NULL,
        detected_scenario TEXT NOT NULL,
        evidence_domains TEXT NOT NULL,
        report_json TEXT NOT NULL,
        detect_json TEXT,
        simulation_json TEXT,
        content_json TEXT,
        feedback_status TEXT,
        feedback_note TEXT
    )"];

/// Handle to the analysis history store.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistoryStore;

impl HistoryStore {
    pub fn new() -> Self {
        Self
    }

    /// Test hook: point the store at a throwaway database.
    pub fn set_db_path_for_tests(path: std::path::PathBuf) {
        HISTORY_DB.set_path(path);
    }

    /// Insert a record and return its id.
    pub fn save_report(
        &self,
        input_text: &str,
        report: &Value,
        detect_data: Option<&Value>,
        simulation: Option<&Value>,
    ) -> Result<String, StoreError> {
        let record_id = Uuid::new_v4().to_string();
        let now = now_utc();

        let risk_label = report
            .get("risk_label")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let risk_score = report.get("risk_score").and_then(Value::as_i64).unwrap_or(0);
        let detected_scenario = report
            .get("detected_scenario")
            .and_then(Value::as_str)
            .unwrap_or("general")
            .to_string();
        let evidence_domains = serde_json::to_string(
            report
                .get("evidence_domains")
                .unwrap_or(&Value::Array(Vec::new())),
        )?;
        let report_json = serde_json::to_string(report)?;
        let detect_json = detect_data.map(serde_json::to_string).transpose()?;
        let simulation_json = simulation.map(serde_json::to_string).transpose()?;

        with_connection(&HISTORY_DB, &SCHEMA, |conn| {
            conn.execute(
                "INSERT INTO analysis_history (
                    id, created_at, input_text, risk_label, risk_score,
                    detected_scenario, evidence_domains, report_json,
                    detect_json, simulation_json
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    record_id,
                    now,
                    input_text,
                    risk_label,
                    risk_score,
                    detected_scenario,
                    evidence_domains,
                    report_json,
                    detect_json,
                    simulation_json
                ],
            )?;
            Ok(())
        })?;

        Ok(record_id)
    }

    pub fn list(&self, limit: i64) -> Result<Vec<HistoryItem>, StoreError> {
        with_connection(&HISTORY_DB, &SCHEMA, |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, created_at, input_text, risk_label, risk_score,
                        detected_scenario, evidence_domains, feedback_status
                 FROM analysis_history ORDER BY created_at DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], |row| {
                Ok(HistoryItem {
                    id: row.get(0)?,
                    created_at: row.get(1)?,
                    input_preview: {
                        let text: String = row.get(2)?;
                        text.chars().take(120).collect()
                    },
                    risk_label: row.get(3)?,
                    risk_score: row.get(4)?,
                    detected_scenario: row.get(5)?,
                    evidence_domains: {
                        let raw: String = row.get(6)?;
                        serde_json::from_str(&raw).unwrap_or_default()
                    },
                    feedback_status: row.get(7)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
        })
    }

    pub fn get(&self, record_id: &str) -> Result<Option<HistoryDetail>, StoreError> {
        with_connection(&HISTORY_DB, &SCHEMA, |conn| {
            let detail = conn
                .query_row(
                    "SELECT id, created_at, input_text, risk_label, risk_score,
                            detected_scenario, evidence_domains, report_json,
                            detect_json, simulation_json, content_json,
                            feedback_status, feedback_note
                     FROM analysis_history WHERE id = ?1",
                    params![record_id],
                    |row| {
                        let evidence_domains: String = row.get(6)?;
                        let report_json: String = row.get(7)?;
                        let detect_json: Option<String> = row.get(8)?;
                        let simulation_json: Option<String> = row.get(9)?;
                        let content_json: Option<String> = row.get(10)?;
                        Ok(HistoryDetail {
                            id: row.get(0)?,
                            created_at: row.get(1)?,
                            input_text: row.get(2)?,
                            risk_label: row.get(3)?,
                            risk_score: row.get(4)?,
                            detected_scenario: row.get(5)?,
                            evidence_domains: serde_json::from_str(&evidence_domains)
                                .unwrap_or_default(),
                            report: serde_json::from_str(&report_json)
                                .unwrap_or(Value::Null),
                            detect_data: detect_json
                                .and_then(|s| serde_json::from_str(&s).ok()),
                            simulation: simulation_json
                                .and_then(|s| serde_json::from_str(&s).ok()),
                            content: content_json
                                .and_then(|s| serde_json::from_str(&s).ok()),
                            feedback_status: row.get(11)?,
                            feedback_note: row.get(12)?,
                        })
                    },
                )
                .optional()?;
            Ok(detail)
        })
    }

    /// Attach feedback. Returns false for a missing record.
    pub fn save_feedback(
        &self,
        record_id: &str,
        status: &str,
        note: Option<&str>,
    ) -> Result<bool, StoreError> {
        with_connection(&HISTORY_DB, &SCHEMA, |conn| {
            let changed = conn.execute(
                "UPDATE analysis_history SET feedback_status = ?1, feedback_note = ?2 WHERE id = ?3",
                params![status, note.unwrap_or(""), record_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Attach a simulation result. Returns false for a missing record.
    pub fn update_simulation(&self, record_id: &str, simulation: &Value) -> Result<bool, StoreError> {
        let simulation_json = serde_json::to_string(simulation)?;
        with_connection(&HISTORY_DB, &SCHEMA, |conn| {
            let changed = conn.execute(
                "UPDATE analysis_history SET simulation_json = ?1 WHERE id = ?2",
                params![simulation_json, record_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Attach generated response content. Returns false for a missing record.
    pub fn update_content(&self, record_id: &str, content: &Value) -> Result<bool, StoreError> {
        let content_json = serde_json::to_string(content)?;
        with_connection(&HISTORY_DB, &SCHEMA, |conn| {
            let changed = conn.execute(
                "UPDATE analysis_history SET content_json = ?1 WHERE id = ?2",
                params![content_json, record_id],
            )?;
            Ok(changed > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> HistoryStore {
        HistoryStore::set_db_path_for_tests(crate::store::db::test_db_dir().join("history.db"));
        HistoryStore::new()
    }

    fn sample_report() -> Value {
        json!({
            "risk_score": 43,
            "risk_level": "high",
            "risk_label": "suspicious",
            "detected_scenario": "general",
            "evidence_domains": ["media"],
            "summary": "测试摘要",
            "suspicious_points": ["c1 被证据反驳"],
            "claim_reports": [],
        })
    }

    #[test]
    fn test_save_and_get_roundtrip() {
        let store = store();
        let id = store
            .save_report("输入文本", &sample_report(), None, None)
            .unwrap();
        let detail = store.get(&id).unwrap().unwrap();
        assert_eq!(detail.risk_label, "suspicious");
        assert_eq!(detail.risk_score, 43);
        assert_eq!(detail.evidence_domains, vec!["media"]);
        assert!(detail.feedback_status.is_none());
    }

    #[test]
    fn test_missing_record_is_none() {
        let store = store();
        assert!(store.get("no-such-id").unwrap().is_none());
    }

    #[test]
    fn test_feedback_and_simulation_are_additive() {
        let store = store();
        let id = store
            .save_report("输入文本", &sample_report(), None, None)
            .unwrap();

        assert!(store.save_feedback(&id, "inaccurate", Some("备注")).unwrap());
        assert!(store
            .update_simulation(&id, &json!({"flashpoints": ["x"]}))
            .unwrap());
        assert!(store
            .update_content(&id, &json!({"clarification": {"short": "s"}}))
            .unwrap());

        let detail = store.get(&id).unwrap().unwrap();
        // Frozen scalars untouched, additive fields attached.
        assert_eq!(detail.risk_score, 43);
        assert_eq!(detail.feedback_status.as_deref(), Some("inaccurate"));
        assert!(detail.simulation.is_some());
        assert!(detail.content.is_some());
    }

    #[test]
    fn test_feedback_on_missing_record_is_false() {
        let store = store();
        assert!(!store.save_feedback("missing", "accurate", None).unwrap());
    }

    #[test]
    fn test_list_previews_input() {
        let store = store();
        let long_input = "长".repeat(300);
        let id = store
            .save_report(&long_input, &sample_report(), None, None)
            .unwrap();
        let items = store.list(50).unwrap();
        let item = items.iter().find(|i| i.id == id).unwrap();
        assert_eq!(item.input_preview.chars().count(), 120);
    }
}
