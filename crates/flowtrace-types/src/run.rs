//! Run model types.
//!
//! A run is one execution attempt of an observer. Runs are inserted in
//! `started` status and finish in one of the two terminal states; the
//! logical `ready` precursor exists in the status space for other schema
//! consumers but is never written by this coordinator.

use serde::{Deserialize, Serialize};

use crate::ids::{ObserverId, RunId};

/// Run state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Terminal: the run failed.
    Error,
    /// Created, not yet started (reserved; never written here).
    Ready,
    /// Actively executing.
    Started,
    /// Terminal: the run completed successfully.
    Success,
}

impl RunStatus {
    /// Numeric code persisted to the store.
    #[must_use]
    pub fn as_code(self) -> i64 {
        match self {
            Self::Error => 0,
            Self::Ready => 1,
            Self::Started => 2,
            Self::Success => 3,
        }
    }

    /// Decode a stored status code. Returns `None` for unknown codes.
    #[must_use]
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Error),
            1 => Some(Self::Ready),
            2 => Some(Self::Started),
            3 => Some(Self::Success),
            _ => None,
        }
    }

    /// True for `error` and `success`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Error | Self::Success)
    }

    /// True for `ready` and `started`.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Ready | Self::Started)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Error => "error",
            Self::Ready => "ready",
            Self::Started => "started",
            Self::Success => "success",
        };
        f.write_str(s)
    }
}

/// Terminal outcome requested by a finish call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishStatus {
    Error,
    Success,
}

impl FinishStatus {
    /// Parse the wire-format status string. Returns `None` for unknown values.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "error" => Some(Self::Error),
            "success" => Some(Self::Success),
            _ => None,
        }
    }

    /// The run status this outcome maps to.
    #[must_use]
    pub fn as_run_status(self) -> RunStatus {
        match self {
            Self::Error => RunStatus::Error,
            Self::Success => RunStatus::Success,
        }
    }
}

impl std::fmt::Display for FinishStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Error => "error",
            Self::Success => "success",
        };
        f.write_str(s)
    }
}

/// A stored run record.
///
/// Timestamps are RFC-3339 UTC strings as persisted by the store.
/// `observer_config` is the owning observer's config snapshotted at start
/// time, not a live reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub observer_id: ObserverId,
    pub status: RunStatus,
    pub start_dt: String,
    pub end_dt: Option<String>,
    pub record_count: Option<i64>,
    pub batch_run_id: Option<String>,
    pub partition_key: Option<String>,
    pub ext_job_run_key: Option<String>,
    pub ext_job_run_log_link: Option<String>,
    pub ext_etl_proc_key: Option<String>,
    pub ext_etl_proc_log_link: Option<String>,
    pub breadcrumb: Option<String>,
    pub observer_config: Option<String>,
}

/// Optional metadata attached to a run at start time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breadcrumb: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext_job_run_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext_job_run_log_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext_etl_proc_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext_etl_proc_log_link: Option<String>,
}

impl StartOptions {
    /// Options with no metadata set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the free-form breadcrumb.
    #[must_use]
    pub fn breadcrumb(mut self, breadcrumb: impl Into<String>) -> Self {
        self.breadcrumb = Some(breadcrumb.into());
        self
    }

    /// Set the external job correlation key.
    #[must_use]
    pub fn ext_job_run_key(mut self, key: impl Into<String>) -> Self {
        self.ext_job_run_key = Some(key.into());
        self
    }

    /// Set the external job log link.
    #[must_use]
    pub fn ext_job_run_log_link(mut self, link: impl Into<String>) -> Self {
        self.ext_job_run_log_link = Some(link.into());
        self
    }

    /// Set the external ETL process correlation key.
    #[must_use]
    pub fn ext_etl_proc_key(mut self, key: impl Into<String>) -> Self {
        self.ext_etl_proc_key = Some(key.into());
        self
    }

    /// Set the external ETL process log link.
    #[must_use]
    pub fn ext_etl_proc_log_link(mut self, link: impl Into<String>) -> Self {
        self.ext_etl_proc_log_link = Some(link.into());
        self
    }
}

/// Partial update applied to a run by a finish call.
///
/// Only fields that are `Some` are written; the terminal status and end
/// timestamp are always written by finish itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext_job_run_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext_job_run_log_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext_etl_proc_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext_etl_proc_log_link: Option<String>,
}

impl FinishUpdate {
    /// Update with no metadata set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the record count produced by the run.
    #[must_use]
    pub fn record_count(mut self, count: i64) -> Self {
        self.record_count = Some(count);
        self
    }

    /// Set the batch run id.
    #[must_use]
    pub fn batch_run_id(mut self, id: impl Into<String>) -> Self {
        self.batch_run_id = Some(id.into());
        self
    }

    /// Set the partition key metadata.
    #[must_use]
    pub fn partition_key(mut self, key: impl Into<String>) -> Self {
        self.partition_key = Some(key.into());
        self
    }

    /// Set the external job correlation key.
    #[must_use]
    pub fn ext_job_run_key(mut self, key: impl Into<String>) -> Self {
        self.ext_job_run_key = Some(key.into());
        self
    }

    /// Set the external job log link.
    #[must_use]
    pub fn ext_job_run_log_link(mut self, link: impl Into<String>) -> Self {
        self.ext_job_run_log_link = Some(link.into());
        self
    }

    /// Set the external ETL process correlation key.
    #[must_use]
    pub fn ext_etl_proc_key(mut self, key: impl Into<String>) -> Self {
        self.ext_etl_proc_key = Some(key.into());
        self
    }

    /// Set the external ETL process log link.
    #[must_use]
    pub fn ext_etl_proc_log_link(mut self, link: impl Into<String>) -> Self {
        self.ext_etl_proc_log_link = Some(link.into());
        self
    }
}
