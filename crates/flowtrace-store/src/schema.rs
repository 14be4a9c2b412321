//! Table definitions and storage timestamp format.
//!
//! Five logical concerns, four tables: observers, associations (NULL
//! `terminated_at` means currently active), runs, and the readiness queue
//! (NULL `sink_run_id` means not yet consumed).

use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;

use crate::error::Result;

/// Idempotent DDL for coordinator tables.
pub const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS observers (
    observer_id TEXT PRIMARY KEY,
    model_name TEXT NOT NULL,
    model_namespace TEXT NOT NULL DEFAULT 'ROOT',
    model_dataset_props TEXT NOT NULL DEFAULT 'NA',
    model_zone_tag INTEGER NOT NULL DEFAULT 1,
    display_name TEXT,
    description TEXT,
    observer_config TEXT,
    status INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    status_updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_observers_key
    ON observers (model_namespace, model_name, model_dataset_props, model_zone_tag);

CREATE TABLE IF NOT EXISTS associations (
    rel_id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL REFERENCES observers(observer_id),
    sink_id TEXT NOT NULL REFERENCES observers(observer_id),
    created_at TEXT NOT NULL,
    terminated_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_associations_source ON associations (source_id);
CREATE INDEX IF NOT EXISTS idx_associations_sink ON associations (sink_id);

CREATE TABLE IF NOT EXISTS observer_runs (
    run_id TEXT PRIMARY KEY,
    observer_id TEXT NOT NULL REFERENCES observers(observer_id),
    status INTEGER NOT NULL,
    start_dt TEXT NOT NULL,
    end_dt TEXT,
    record_count INTEGER,
    batch_run_id TEXT,
    partition_key TEXT,
    ext_job_run_key TEXT,
    ext_job_run_log_link TEXT,
    ext_etl_proc_key TEXT,
    ext_etl_proc_log_link TEXT,
    breadcrumb TEXT,
    observer_config TEXT
);

CREATE INDEX IF NOT EXISTS idx_runs_observer_status ON observer_runs (observer_id, status);

CREATE TABLE IF NOT EXISTS readiness_queue (
    queue_id INTEGER PRIMARY KEY AUTOINCREMENT,
    rel_id TEXT NOT NULL REFERENCES associations(rel_id),
    source_run_id TEXT NOT NULL REFERENCES observer_runs(run_id),
    sink_run_id TEXT,
    source_ready_at TEXT NOT NULL,
    sink_started_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_queue_unconsumed
    ON readiness_queue (rel_id) WHERE sink_run_id IS NULL;
";

/// Create coordinator tables if they do not exist.
///
/// # Errors
///
/// Returns [`StoreError::Sqlite`](crate::StoreError::Sqlite) if DDL
/// execution fails.
pub fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch(CREATE_TABLES)?;
    Ok(())
}

/// Current UTC time in the storage format.
///
/// RFC-3339 with fixed-width microseconds, so `ORDER BY` on timestamp
/// columns sorts chronologically.
#[must_use]
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
