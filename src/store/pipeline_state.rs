//! Pipeline task + phase snapshot store.
//!
//! Shares the history store's database path and fallback policy. Writes
//! are UPSERTs on `(task_id, phase)`: the latest write wins, and the task
//! row's phase map follows the last snapshot status.

use std::collections::BTreeMap;

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde_json::Value;

use crate::config::{self, DEFAULT_PHASE_STALE_SECS};
use crate::types::{Phase, PhaseSnapshot, PhaseStatus, PipelineTask};

use super::db::{now_utc, with_connection, StoreError};
use super::history::{HISTORY_DB, SCHEMA as HISTORY_SCHEMA};

const SCHEMA: [&str; 3] = [
    HISTORY_SCHEMA[0],
    "CREATE TABLE IF NOT EXISTS pipeline_tasks (
        task_id TEXT PRIMARY KEY,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        input_text TEXT NOT NULL,
        phases_json TEXT NOT NULL,
        meta_json TEXT
    )",
    "CREATE TABLE IF NOT EXISTS pipeline_phase_snapshots (
        task_id TEXT NOT NULL,
        phase TEXT NOT NULL,
        status TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        duration_ms INTEGER,
        error_message TEXT,
        payload_json TEXT,
        PRIMARY KEY (task_id, phase)
    )",
];

/// Arguments of one snapshot upsert.
#[derive(Debug, Clone)]
pub struct PhaseUpsert<'a> {
    pub task_id: &'a str,
    pub input_text: &'a str,
    pub phases: &'a BTreeMap<Phase, PhaseStatus>,
    pub phase: Phase,
    pub status: PhaseStatus,
    pub duration_ms: Option<i64>,
    pub error_message: Option<&'a str>,
    pub payload: Option<&'a Value>,
    pub meta: Option<&'a Value>,
}

/// Handle to the pipeline state store.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineStateStore;

impl PipelineStateStore {
    pub fn new() -> Self {
        Self
    }

    /// Idempotent write: the same `(task_id, phase)` keeps a single row
    /// equal to the last write. Returns the write timestamp.
    pub fn upsert_phase_snapshot(&self, upsert: &PhaseUpsert<'_>) -> Result<String, StoreError> {
        let now = now_utc();
        let phases_json = serde_json::to_string(upsert.phases)?;
        let meta_json = upsert.meta.map(serde_json::to_string).transpose()?;
        let payload_json = upsert.payload.map(serde_json::to_string).transpose()?;

        with_connection(&HISTORY_DB, &SCHEMA, |conn| {
            conn.execute(
                "INSERT INTO pipeline_tasks (task_id, created_at, updated_at, input_text, phases_json, meta_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(task_id) DO UPDATE SET
                   updated_at = excluded.updated_at,
                   input_text = excluded.input_text,
                   phases_json = excluded.phases_json,
                   meta_json = COALESCE(excluded.meta_json, pipeline_tasks.meta_json)",
                params![upsert.task_id, now, now, upsert.input_text, phases_json, meta_json],
            )?;

            conn.execute(
                "INSERT INTO pipeline_phase_snapshots (
                    task_id, phase, status, updated_at, duration_ms, error_message, payload_json
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(task_id, phase) DO UPDATE SET
                   status = excluded.status,
                   updated_at = excluded.updated_at,
                   duration_ms = excluded.duration_ms,
                   error_message = excluded.error_message,
                   payload_json = excluded.payload_json",
                params![
                    upsert.task_id,
                    upsert.phase.as_str(),
                    upsert.status.as_str(),
                    now,
                    upsert.duration_ms,
                    upsert.error_message,
                    payload_json
                ],
            )?;
            Ok(())
        })?;

        Ok(now)
    }

    /// Load the most recently updated task with its snapshots. `running`
    /// snapshots older than the staleness threshold read back as `failed`
    /// (a cancelled turn may have left them behind).
    pub fn load_latest_task(&self) -> Result<Option<PipelineTask>, StoreError> {
        let row = with_connection(&HISTORY_DB, &SCHEMA, |conn| {
            conn.query_row(
                "SELECT task_id, input_text, phases_json, meta_json, updated_at
                 FROM pipeline_tasks ORDER BY updated_at DESC LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()
            .map_err(StoreError::from)
        })?;

        let Some((task_id, input_text, phases_json, meta_json, updated_at)) = row else {
            return Ok(None);
        };
        let snapshots = self.load_snapshots(&task_id)?;

        Ok(Some(recover_stale_running(PipelineTask {
            task_id,
            input_text,
            phases: serde_json::from_str(&phases_json).unwrap_or_default(),
            meta: meta_json
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or(Value::Null),
            updated_at,
            snapshots,
        })))
    }

    /// Latest payload of one `(task_id, phase)`, if a snapshot exists.
    pub fn get_phase_payload(
        &self,
        task_id: &str,
        phase: Phase,
    ) -> Result<Option<Value>, StoreError> {
        with_connection(&HISTORY_DB, &SCHEMA, |conn| {
            let payload = conn
                .query_row(
                    "SELECT payload_json FROM pipeline_phase_snapshots
                     WHERE task_id = ?1 AND phase = ?2",
                    params![task_id, phase.as_str()],
                    |row| row.get::<_, Option<String>>(0),
                )
                .optional()?;
            Ok(payload
                .flatten()
                .and_then(|s| serde_json::from_str(&s).ok()))
        })
    }

    /// All snapshots of one task.
    pub fn load_snapshots(&self, task_id: &str) -> Result<Vec<PhaseSnapshot>, StoreError> {
        with_connection(&HISTORY_DB, &SCHEMA, |conn| {
            let mut stmt = conn.prepare(
                "SELECT phase, status, updated_at, duration_ms, error_message, payload_json
                 FROM pipeline_phase_snapshots WHERE task_id = ?1",
            )?;
            let rows = stmt.query_map(params![task_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                ))
            })?;
            let mut snapshots = Vec::new();
            for row in rows {
                let (phase, status, updated_at, duration_ms, error_message, payload_json) = row?;
                let (Some(phase), Some(status)) =
                    (Phase::parse(&phase), PhaseStatus::parse(&status))
                else {
                    continue;
                };
                snapshots.push(PhaseSnapshot {
                    phase,
                    status,
                    updated_at,
                    duration_ms,
                    error_message,
                    payload: payload_json.and_then(|s| serde_json::from_str(&s).ok()),
                });
            }
            Ok(snapshots)
        })
    }

    /// Task row lookup.
    pub fn load_task(&self, task_id: &str) -> Result<Option<(String, Value)>, StoreError> {
        with_connection(&HISTORY_DB, &SCHEMA, |conn| {
            let row = conn
                .query_row(
                    "SELECT input_text, meta_json FROM pipeline_tasks WHERE task_id = ?1",
                    params![task_id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, Option<String>>(1)?,
                        ))
                    },
                )
                .optional()?;
            Ok(row.map(|(input_text, meta_json)| {
                (
                    input_text,
                    meta_json
                        .and_then(|s| serde_json::from_str(&s).ok())
                        .unwrap_or(Value::Null),
                )
            }))
        })
    }
}

/// Treat over-age `running` snapshots as failed on read.
fn recover_stale_running(mut task: PipelineTask) -> PipelineTask {
    let threshold = config::int_var("PHASE_STALE_SECS", DEFAULT_PHASE_STALE_SECS, 1, 86_400);
    let now = Utc::now();

    for snapshot in &mut task.snapshots {
        if snapshot.status != PhaseStatus::Running {
            continue;
        }
        let age = chrono::NaiveDateTime::parse_from_str(&snapshot.updated_at, "%Y-%m-%dT%H:%M:%SZ")
            .map(|ts| (now - ts.and_utc()).num_seconds())
            .unwrap_or(i64::MAX);
        if age > threshold {
            snapshot.status = PhaseStatus::Failed;
            task.phases.insert(snapshot.phase, PhaseStatus::Failed);
        }
    }
    task
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::history::HistoryStore;
    use crate::types::idle_phases;
    use serde_json::json;

    fn store() -> PipelineStateStore {
        HistoryStore::set_db_path_for_tests(crate::store::db::test_db_dir().join("history.db"));
        PipelineStateStore::new()
    }

    #[test]
    fn test_upsert_law_last_write_wins() {
        let store = store();
        let mut phases = idle_phases();
        phases.insert(Phase::Detect, PhaseStatus::Running);

        let upsert_running = PhaseUpsert {
            task_id: "task-upsert",
            input_text: "文本",
            phases: &phases,
            phase: Phase::Detect,
            status: PhaseStatus::Running,
            duration_ms: None,
            error_message: None,
            payload: None,
            meta: None,
        };
        store.upsert_phase_snapshot(&upsert_running).unwrap();

        phases.insert(Phase::Detect, PhaseStatus::Done);
        let payload = json!({"label": "suspicious"});
        let upsert_done = PhaseUpsert {
            task_id: "task-upsert",
            input_text: "文本",
            phases: &phases,
            phase: Phase::Detect,
            status: PhaseStatus::Done,
            duration_ms: Some(1200),
            error_message: None,
            payload: Some(&payload),
            meta: None,
        };
        store.upsert_phase_snapshot(&upsert_done).unwrap();

        let snapshots = store.load_snapshots("task-upsert").unwrap();
        let detect_snaps: Vec<_> = snapshots
            .iter()
            .filter(|s| s.phase == Phase::Detect)
            .collect();
        assert_eq!(detect_snaps.len(), 1);
        assert_eq!(detect_snaps[0].status, PhaseStatus::Done);
        assert_eq!(detect_snaps[0].duration_ms, Some(1200));
        assert_eq!(detect_snaps[0].payload.as_ref().unwrap()["label"], "suspicious");
    }

    #[test]
    fn test_phase_payload_lookup() {
        let store = store();
        let phases = idle_phases();
        let payload = json!({"count": 3});
        store
            .upsert_phase_snapshot(&PhaseUpsert {
                task_id: "task-payload",
                input_text: "文本",
                phases: &phases,
                phase: Phase::Claims,
                status: PhaseStatus::Done,
                duration_ms: None,
                error_message: None,
                payload: Some(&payload),
                meta: None,
            })
            .unwrap();

        let loaded = store
            .get_phase_payload("task-payload", Phase::Claims)
            .unwrap()
            .unwrap();
        assert_eq!(loaded["count"], 3);
        assert!(store
            .get_phase_payload("task-payload", Phase::Report)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_task_meta_survives_null_updates() {
        let store = store();
        let phases = idle_phases();
        let meta = json!({"source": "chat"});
        store
            .upsert_phase_snapshot(&PhaseUpsert {
                task_id: "task-meta",
                input_text: "文本",
                phases: &phases,
                phase: Phase::Detect,
                status: PhaseStatus::Running,
                duration_ms: None,
                error_message: None,
                payload: None,
                meta: Some(&meta),
            })
            .unwrap();
        // Second write carries no meta; COALESCE keeps the original.
        store
            .upsert_phase_snapshot(&PhaseUpsert {
                task_id: "task-meta",
                input_text: "文本",
                phases: &phases,
                phase: Phase::Detect,
                status: PhaseStatus::Done,
                duration_ms: None,
                error_message: None,
                payload: None,
                meta: None,
            })
            .unwrap();

        let (_, loaded_meta) = store.load_task("task-meta").unwrap().unwrap();
        assert_eq!(loaded_meta["source"], "chat");
    }
}
