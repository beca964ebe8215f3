//! Background sync job model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::Store;

/// A unique identifier for a job, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    /// Create a new unique job ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Linear job lifecycle: `queued -> running -> succeeded | failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Whether `self -> next` is a legal step of the state machine.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Running) | (Self::Running, Self::Succeeded | Self::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown job status '{other}'")),
        }
    }
}

/// Which storefronts a job touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreScope {
    AppStore,
    GooglePlay,
    #[default]
    Both,
}

impl StoreScope {
    pub fn stores(self) -> Vec<Store> {
        match self {
            Self::AppStore => vec![Store::AppStore],
            Self::GooglePlay => vec![Store::GooglePlay],
            Self::Both => Store::ALL.to_vec(),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AppStore => "app_store",
            Self::GooglePlay => "google_play",
            Self::Both => "both",
        }
    }
}

impl FromStr for StoreScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "app_store" => Ok(Self::AppStore),
            "google_play" => Ok(Self::GooglePlay),
            "both" => Ok(Self::Both),
            other => Err(format!("unknown store scope '{other}'")),
        }
    }
}

/// What a preflight job should do once snapshots are refreshed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPayload {
    /// Compute the sync workload after refreshing
    #[serde(default = "default_true")]
    pub compute_workload: bool,
    /// Source of truth for the workload; both directions when unset
    #[serde(default)]
    pub source_store: Option<Store>,
}

const fn default_true() -> bool {
    true
}

impl Default for JobPayload {
    fn default() -> Self {
        Self {
            compute_workload: true,
            source_store: None,
        }
    }
}

/// Request to create a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub app_id: String,
    pub scope: StoreScope,
    pub payload: JobPayload,
}

/// A persisted background job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncJob {
    pub id: JobId,
    pub app_id: String,
    pub scope: StoreScope,
    pub status: JobStatus,
    pub payload: JobPayload,
    pub summary: Option<serde_json::Value>,
    pub error: Option<String>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
}

/// One line of a job's execution log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobLogLine {
    /// Timestamp (Unix ms)
    pub at: i64,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_parse() {
        let id = JobId::new();
        let parsed: JobId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn status_machine_is_linear() {
        use JobStatus::{Failed, Queued, Running, Succeeded};

        assert!(Queued.can_transition_to(Running));
        assert!(Running.can_transition_to(Succeeded));
        assert!(Running.can_transition_to(Failed));

        assert!(!Queued.can_transition_to(Succeeded));
        assert!(!Running.can_transition_to(Queued));
        assert!(!Succeeded.can_transition_to(Running));
        assert!(!Failed.can_transition_to(Failed));
    }

    #[test]
    fn payload_defaults_to_computing_workload() {
        let payload: JobPayload = serde_json::from_str("{}").unwrap();
        assert!(payload.compute_workload);
        assert_eq!(payload.source_store, None);
    }

    #[test]
    fn scope_expands_to_stores() {
        assert_eq!(StoreScope::Both.stores().len(), 2);
        assert_eq!(StoreScope::GooglePlay.stores(), vec![Store::GooglePlay]);
    }
}
