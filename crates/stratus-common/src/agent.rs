use serde::{Deserialize, Serialize};

use crate::error::SlotError;
use crate::slots::{parse_slots, ResourceSlotRecord};

/// Liveness of a compute agent as judged by heartbeat bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Alive,
    Lost,
    Restarting,
    Terminated,
}

impl AgentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentStatus::Alive => "alive",
            AgentStatus::Lost => "lost",
            AgentStatus::Restarting => "restarting",
            AgentStatus::Terminated => "terminated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "alive" => Some(AgentStatus::Alive),
            "lost" => Some(AgentStatus::Lost),
            "restarting" => Some(AgentStatus::Restarting),
            "terminated" => Some(AgentStatus::Terminated),
            _ => None,
        }
    }
}

/// One compute agent, stored under `/stratus/agents/{id}`.
///
/// Slot mappings stay JSON-encoded in the stored record (the wire form
/// agents report); views decode them through the slot parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: String,
    pub status: AgentStatus,
    pub addr: String,

    #[serde(default)]
    pub region: String,

    #[serde(default = "default_scaling_group")]
    pub scaling_group: String,

    /// Operator-controlled gate: a live agent can still be excluded from
    /// placement.
    #[serde(default = "default_true")]
    pub schedulable: bool,

    #[serde(default)]
    pub architecture: String,

    /// JSON-encoded total capacity, e.g. `{"cpu":"8","mem":"34359738368"}`.
    pub available_slots: String,

    /// JSON-encoded in-use amounts, same vocabulary.
    pub occupied_slots: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default)]
    pub first_contact_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lost_at_ms: Option<u64>,

    /// Live utilization sampled by the agent itself.
    #[serde(default)]
    pub cpu_cur_pct: f64,

    #[serde(default)]
    pub mem_cur_bytes: u64,
}

fn default_scaling_group() -> String {
    "default".to_string()
}

fn default_true() -> bool {
    true
}

impl AgentRecord {
    pub fn available(&self) -> Result<ResourceSlotRecord, SlotError> {
        parse_slots(&self.available_slots)
    }

    pub fn occupied(&self) -> Result<ResourceSlotRecord, SlotError> {
        parse_slots(&self.occupied_slots)
    }
}
