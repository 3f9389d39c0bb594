use serde::{Deserialize, Serialize};

use crate::capacity::Capacity;
use crate::error::SlotError;
use crate::slots::{parse_slots, ResourceKind, ResourceSlotRecord};

/// How a policy treats slot kinds it does not name: capped at zero, or
/// uncapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultForUnspecified {
    Limited,
    Unlimited,
}

impl Default for DefaultForUnspecified {
    fn default() -> Self {
        DefaultForUnspecified::Limited
    }
}

/// A named resource policy, stored under `/stratus/policies/{name}`.
///
/// Limit fields use `0` as the stored "no cap" sentinel; display goes
/// through the unlimited normalizer, never raw.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcePolicyRecord {
    pub name: String,

    #[serde(default)]
    pub default_for_unspecified: DefaultForUnspecified,

    /// JSON-encoded slot caps, e.g. `{"cpu":"16","mem":"Infinity"}`.
    pub total_resource_slots: String,

    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_sessions: u32,

    #[serde(default = "default_max_containers")]
    pub max_containers_per_session: u32,

    /// Seconds; `0` means no lifetime cap.
    #[serde(default)]
    pub max_session_lifetime: u64,

    /// Seconds of idleness before reaping; `0` disables.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,

    /// `0` means unlimited folders.
    #[serde(default)]
    pub max_vfolder_count: u32,

    /// Bytes; `0` means unlimited.
    #[serde(default)]
    pub max_vfolder_size: u64,

    #[serde(default)]
    pub allowed_vfolder_hosts: Vec<String>,
}

fn default_max_concurrent() -> u32 {
    30
}

fn default_max_containers() -> u32 {
    1
}

fn default_idle_timeout() -> u64 {
    600
}

impl ResourcePolicyRecord {
    pub fn total_slots(&self) -> Result<ResourceSlotRecord, SlotError> {
        parse_slots(&self.total_resource_slots)
    }

    /// The quantity assigned to slot kinds the policy leaves unspecified.
    pub fn fill_value(&self) -> Capacity {
        match self.default_for_unspecified {
            DefaultForUnspecified::Limited => Capacity::Finite(0.0),
            DefaultForUnspecified::Unlimited => Capacity::Unlimited,
        }
    }

    /// The policy's caps completed against the kinds the cluster knows:
    /// named kinds keep their cap, unnamed ones get the fill value.
    pub fn effective_limits(
        &self,
        known: &[ResourceKind],
    ) -> Result<ResourceSlotRecord, SlotError> {
        Ok(self.total_slots()?.filled(known, self.fill_value()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_policy(default_for_unspecified: DefaultForUnspecified) -> ResourcePolicyRecord {
        ResourcePolicyRecord {
            name: "student".into(),
            default_for_unspecified,
            total_resource_slots: r#"{"cpu":"4","mem":"8589934592"}"#.into(),
            max_concurrent_sessions: 5,
            max_containers_per_session: 1,
            max_session_lifetime: 0,
            idle_timeout: 600,
            max_vfolder_count: 10,
            max_vfolder_size: 0,
            allowed_vfolder_hosts: vec!["local".into()],
        }
    }

    #[test]
    fn unspecified_kinds_fill_per_policy_default() {
        let known = [ResourceKind::Cpu, ResourceKind::Mem, ResourceKind::CudaDevice];

        let limited = make_policy(DefaultForUnspecified::Limited);
        let slots = limited.effective_limits(&known).unwrap();
        assert_eq!(slots.get(&ResourceKind::Cpu), Some(Capacity::Finite(4.0)));
        assert_eq!(
            slots.get(&ResourceKind::CudaDevice),
            Some(Capacity::Finite(0.0))
        );

        let unlimited = make_policy(DefaultForUnspecified::Unlimited);
        let slots = unlimited.effective_limits(&known).unwrap();
        assert_eq!(slots.get(&ResourceKind::CudaDevice), Some(Capacity::Unlimited));
        // named caps are never widened by the fill
        assert_eq!(slots.get(&ResourceKind::Cpu), Some(Capacity::Finite(4.0)));
    }

    #[test]
    fn serde_defaults_match_column_defaults() {
        let raw = r#"{"name":"default","total_resource_slots":"{}"}"#;
        let p: ResourcePolicyRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(p.default_for_unspecified, DefaultForUnspecified::Limited);
        assert_eq!(p.max_concurrent_sessions, 30);
        assert_eq!(p.max_containers_per_session, 1);
        assert_eq!(p.idle_timeout, 600);
        assert_eq!(p.max_session_lifetime, 0);
    }
}
