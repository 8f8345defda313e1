//! SQLite-backed stores.
//!
//! Three stores share one policy: connect to the active database path per
//! operation, create tables idempotently, and on a disk I/O error fall back
//! once to a tempdir path for the rest of the process (logged once).
//! Persistence failures never surface to clients unless both paths fail.

pub mod db;
pub mod history;
pub mod pipeline_state;
pub mod sessions;

pub use db::StoreError;
pub use history::HistoryStore;
pub use pipeline_state::PipelineStateStore;
pub use sessions::SessionStore;
