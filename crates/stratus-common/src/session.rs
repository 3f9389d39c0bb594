use serde::{Deserialize, Serialize};

use crate::error::SlotError;
use crate::slots::{parse_slots, ResourceSlotRecord};

/// Lifecycle states of a compute session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Scheduled,
    Pulling,
    Preparing,
    Running,
    Restarting,
    RunningDegraded,
    Terminating,
    Terminated,
    Error,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Scheduled => "scheduled",
            SessionStatus::Pulling => "pulling",
            SessionStatus::Preparing => "preparing",
            SessionStatus::Running => "running",
            SessionStatus::Restarting => "restarting",
            SessionStatus::RunningDegraded => "running_degraded",
            SessionStatus::Terminating => "terminating",
            SessionStatus::Terminated => "terminated",
            SessionStatus::Error => "error",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Some(SessionStatus::Pending),
            "scheduled" => Some(SessionStatus::Scheduled),
            "pulling" => Some(SessionStatus::Pulling),
            "preparing" => Some(SessionStatus::Preparing),
            "running" => Some(SessionStatus::Running),
            "restarting" => Some(SessionStatus::Restarting),
            "running_degraded" => Some(SessionStatus::RunningDegraded),
            "terminating" => Some(SessionStatus::Terminating),
            "terminated" => Some(SessionStatus::Terminated),
            "error" => Some(SessionStatus::Error),
            "cancelled" => Some(SessionStatus::Cancelled),
            _ => None,
        }
    }

    /// Statuses that hold agent and keypair resources. Pending sessions have
    /// nothing allocated yet; errored and finished ones have released it.
    pub fn occupies_resources(self) -> bool {
        matches!(
            self,
            SessionStatus::Scheduled
                | SessionStatus::Pulling
                | SessionStatus::Preparing
                | SessionStatus::Running
                | SessionStatus::Restarting
                | SessionStatus::RunningDegraded
                | SessionStatus::Terminating
        )
    }

    /// Whether a terminate request is accepted in this state.
    pub fn can_terminate(self) -> bool {
        !matches!(
            self,
            SessionStatus::Terminating | SessionStatus::Terminated | SessionStatus::Cancelled
        )
    }

    pub fn is_finished(self) -> bool {
        matches!(self, SessionStatus::Terminated | SessionStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    Interactive,
    Batch,
}

impl SessionType {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionType::Interactive => "interactive",
            SessionType::Batch => "batch",
        }
    }
}

impl Default for SessionType {
    fn default() -> Self {
        SessionType::Interactive
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterMode {
    SingleNode,
    MultiNode,
}

impl ClusterMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ClusterMode::SingleNode => "single_node",
            ClusterMode::MultiNode => "multi_node",
        }
    }
}

impl Default for ClusterMode {
    fn default() -> Self {
        ClusterMode::SingleNode
    }
}

/// One compute session, stored under `/stratus/sessions/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub name: String,

    /// Owning credential.
    pub access_key: String,

    pub status: SessionStatus,

    #[serde(default)]
    pub session_type: SessionType,

    #[serde(default)]
    pub cluster_mode: ClusterMode,

    #[serde(default = "default_cluster_size")]
    pub cluster_size: u32,

    #[serde(default)]
    pub image: String,

    /// Assigned agent; `None` while pending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,

    /// JSON-encoded slots held by this session while it occupies resources.
    pub occupied_slots: String,

    #[serde(default)]
    pub created_at_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminated_at_ms: Option<u64>,

    /// Human-readable detail for error and cancellation states.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_info: Option<String>,
}

fn default_cluster_size() -> u32 {
    1
}

impl SessionRecord {
    pub fn occupied(&self) -> Result<ResourceSlotRecord, SlotError> {
        parse_slots(&self.occupied_slots)
    }

    /// Wall-clock lifetime: creation to termination, or to `now_ms` while
    /// the session is still around.
    pub fn elapsed_text(&self, now_ms: u64) -> String {
        let end = self.terminated_at_ms.unwrap_or(now_ms);
        format_elapsed(self.created_at_ms, end)
    }
}

/// Render a duration the way the backend prints timedeltas:
/// `H:MM:SS`, prefixed with `N day(s), ` past 24 hours.
pub fn format_elapsed(start_ms: u64, end_ms: u64) -> String {
    let total_secs = end_ms.saturating_sub(start_ms) / 1000;
    let days = total_secs / 86_400;
    let hours = (total_secs % 86_400) / 3_600;
    let minutes = (total_secs % 3_600) / 60;
    let seconds = total_secs % 60;
    if days == 1 {
        format!("1 day, {hours}:{minutes:02}:{seconds:02}")
    } else if days > 1 {
        format!("{days} days, {hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{hours}:{minutes:02}:{seconds:02}")
    }
}
