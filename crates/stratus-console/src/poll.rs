use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::RwLock;

use stratus_common::{
    usage_rows, AgentRecord, AgentStatus, ResourceKind, ResourceSlotRecord, SessionRecord,
    UsageRow,
};
use stratus_meta::MetaStore;

use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct CountByStatus {
    pub total: u64,
    pub by_status: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupUsage {
    pub name: String,
    pub agents: u64,
    pub schedulable_agents: u64,
    pub usage: Vec<UsageRow>,
}

/// The dashboard overview: entity counts plus aggregate slot usage,
/// cluster-wide and per scaling group.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterSummary {
    pub generated_at_ms: u64,
    pub agents: CountByStatus,
    pub sessions: CountByStatus,
    pub usage: Vec<UsageRow>,
    pub scaling_groups: Vec<GroupUsage>,
}

/// Snapshot refreshed by the poller and read by handlers. Staleness is
/// bounded by the poll interval; a failed refresh keeps the previous
/// snapshot in place.
pub struct SummaryCache {
    snapshot: RwLock<Option<ClusterSummary>>,
    groups: DashMap<String, GroupUsage>,
}

impl SummaryCache {
    pub fn new() -> Self {
        SummaryCache {
            snapshot: RwLock::new(None),
            groups: DashMap::new(),
        }
    }

    pub async fn snapshot(&self) -> Option<ClusterSummary> {
        self.snapshot.read().await.clone()
    }

    pub fn group(&self, name: &str) -> Option<GroupUsage> {
        self.groups.get(name).map(|g| g.value().clone())
    }

    pub async fn replace(&self, summary: ClusterSummary) {
        self.groups.clear();
        for group in &summary.scaling_groups {
            self.groups.insert(group.name.clone(), group.clone());
        }
        *self.snapshot.write().await = Some(summary);
    }
}

impl Default for SummaryCache {
    fn default() -> Self {
        Self::new()
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Slot kinds the cluster currently advertises: the union over live
/// agents' capacity records.
pub(crate) fn known_slot_kinds(agents: &[AgentRecord]) -> Vec<ResourceKind> {
    let mut kinds: Vec<ResourceKind> = Vec::new();
    for agent in agents {
        if agent.status != AgentStatus::Alive {
            continue;
        }
        if let Ok(available) = agent.available() {
            for kind in available.kinds() {
                if !kinds.contains(kind) {
                    kinds.push(kind.clone());
                }
            }
        }
    }
    kinds.sort();
    kinds
}

pub(crate) async fn list_agents(store: &dyn MetaStore) -> anyhow::Result<Vec<AgentRecord>> {
    let raw = store.list_prefix("/stratus/agents/").await?;
    let mut agents = Vec::new();
    for (_k, v, _rev) in raw {
        if let Ok(rec) = serde_json::from_slice::<AgentRecord>(&v) {
            agents.push(rec);
        }
    }
    Ok(agents)
}

pub(crate) async fn list_sessions(store: &dyn MetaStore) -> anyhow::Result<Vec<SessionRecord>> {
    let raw = store.list_prefix("/stratus/sessions/").await?;
    let mut sessions = Vec::new();
    for (_k, v, _rev) in raw {
        if let Ok(rec) = serde_json::from_slice::<SessionRecord>(&v) {
            sessions.push(rec);
        }
    }
    Ok(sessions)
}

pub async fn build_cluster_summary(store: &dyn MetaStore) -> anyhow::Result<ClusterSummary> {
    let agents = list_agents(store).await?;
    let sessions = list_sessions(store).await?;

    let mut agent_counts = BTreeMap::new();
    for agent in &agents {
        *agent_counts
            .entry(agent.status.as_str().to_string())
            .or_insert(0u64) += 1;
    }

    let mut session_counts = BTreeMap::new();
    for session in &sessions {
        *session_counts
            .entry(session.status.as_str().to_string())
            .or_insert(0u64) += 1;
    }

    // Aggregate capacity and occupancy over live agents, cluster-wide and
    // per scaling group.
    let mut occupied = ResourceSlotRecord::new();
    let mut available = ResourceSlotRecord::new();
    let mut by_group: BTreeMap<String, (u64, u64, ResourceSlotRecord, ResourceSlotRecord)> =
        BTreeMap::new();

    for agent in &agents {
        if agent.status != AgentStatus::Alive {
            continue;
        }
        let entry = by_group
            .entry(agent.scaling_group.clone())
            .or_insert_with(|| {
                (0, 0, ResourceSlotRecord::new(), ResourceSlotRecord::new())
            });
        entry.0 += 1;
        if agent.schedulable {
            entry.1 += 1;
        }
        if let Ok(oc) = agent.occupied() {
            occupied.merge_add(&oc);
            entry.2.merge_add(&oc);
        }
        if let Ok(av) = agent.available() {
            available.merge_add(&av);
            entry.3.merge_add(&av);
        }
    }

    let scaling_groups = by_group
        .into_iter()
        .map(|(name, (agents, schedulable, oc, av))| GroupUsage {
            name,
            agents,
            schedulable_agents: schedulable,
            usage: usage_rows(&oc, &av),
        })
        .collect();

    Ok(ClusterSummary {
        generated_at_ms: now_ms(),
        agents: CountByStatus {
            total: agents.len() as u64,
            by_status: agent_counts,
        },
        sessions: CountByStatus {
            total: sessions.len() as u64,
            by_status: session_counts,
        },
        usage: usage_rows(&occupied, &available),
        scaling_groups,
    })
}

/// Background refresher: one task, fixed interval, warn-and-keep-going.
pub async fn summary_poll_loop(st: AppState) -> anyhow::Result<()> {
    loop {
        match build_cluster_summary(st.store.as_ref()).await {
            Ok(summary) => {
                st.summary.replace(summary).await;
                st.metrics.summary_refreshes.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                st.metrics
                    .summary_refresh_failures
                    .fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error=%e, "summary refresh failed, keeping previous snapshot");
            }
        }
        tokio::time::sleep(Duration::from_secs(st.poll_interval_secs)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratus_common::AgentStatus;
    use stratus_meta::MemoryMetaStore;

    fn make_agent(id: &str, group: &str, status: AgentStatus, schedulable: bool) -> AgentRecord {
        AgentRecord {
            id: id.into(),
            status,
            addr: format!("10.0.0.1:600{}", id.len()),
            region: "local".into(),
            scaling_group: group.into(),
            schedulable,
            architecture: "x86_64".into(),
            available_slots: r#"{"cpu":"8","mem":"34359738368","cuda.device":"2"}"#.into(),
            occupied_slots: r#"{"cpu":"2","mem":"4294967296"}"#.into(),
            version: Some("24.03".into()),
            first_contact_ms: 1_000,
            lost_at_ms: None,
            cpu_cur_pct: 12.5,
            mem_cur_bytes: 1 << 30,
        }
    }

    fn make_session(id: &str, status: stratus_common::SessionStatus) -> SessionRecord {
        SessionRecord {
            id: id.into(),
            name: format!("sess-{id}"),
            access_key: "AKTEST".into(),
            status,
            session_type: Default::default(),
            cluster_mode: Default::default(),
            cluster_size: 1,
            image: "python:3.11".into(),
            agent: Some("a1".into()),
            occupied_slots: r#"{"cpu":"1"}"#.into(),
            created_at_ms: 1_000,
            terminated_at_ms: None,
            status_info: None,
        }
    }

    async fn seed(store: &MemoryMetaStore) {
        for agent in [
            make_agent("a1", "default", AgentStatus::Alive, true),
            make_agent("a2", "gpu", AgentStatus::Alive, false),
            make_agent("a3", "default", AgentStatus::Lost, true),
        ] {
            store
                .put(
                    &format!("/stratus/agents/{}", agent.id),
                    serde_json::to_vec(&agent).unwrap(),
                    None,
                )
                .await
                .unwrap();
        }
        for session in [
            make_session("s1", stratus_common::SessionStatus::Running),
            make_session("s2", stratus_common::SessionStatus::Pending),
            make_session("s3", stratus_common::SessionStatus::Terminated),
        ] {
            store
                .put(
                    &format!("/stratus/sessions/{}", session.id),
                    serde_json::to_vec(&session).unwrap(),
                    None,
                )
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn summary_counts_and_aggregates() {
        let store = MemoryMetaStore::new();
        seed(&store).await;

        let summary = build_cluster_summary(&store).await.unwrap();
        assert_eq!(summary.agents.total, 3);
        assert_eq!(summary.agents.by_status.get("alive"), Some(&2));
        assert_eq!(summary.agents.by_status.get("lost"), Some(&1));
        assert_eq!(summary.sessions.total, 3);
        assert_eq!(summary.sessions.by_status.get("running"), Some(&1));

        // lost agent is excluded from capacity
        let cpu = summary
            .usage
            .iter()
            .find(|row| row.key == "cpu")
            .expect("cpu row");
        assert_eq!(cpu.capacity_text, "16");
        assert_eq!(cpu.used_text, "4");
        assert_eq!(cpu.usage.percent_text, "25.00");

        assert_eq!(summary.scaling_groups.len(), 2);
        let default_group = &summary.scaling_groups[0];
        assert_eq!(default_group.name, "default");
        assert_eq!(default_group.agents, 1);
        assert_eq!(default_group.schedulable_agents, 1);
        let gpu_group = &summary.scaling_groups[1];
        assert_eq!(gpu_group.schedulable_agents, 0);
    }

    #[tokio::test]
    async fn cache_replace_and_group_lookup() {
        let store = MemoryMetaStore::new();
        seed(&store).await;
        let summary = build_cluster_summary(&store).await.unwrap();

        let cache = SummaryCache::new();
        assert!(cache.snapshot().await.is_none());
        cache.replace(summary).await;
        assert!(cache.snapshot().await.is_some());
        assert!(cache.group("gpu").is_some());
        assert!(cache.group("missing").is_none());
    }

    #[tokio::test]
    async fn known_kinds_union_over_live_agents() {
        let mut a = make_agent("a1", "default", AgentStatus::Alive, true);
        a.available_slots = r#"{"cpu":"8","mem":"1024"}"#.into();
        let mut b = make_agent("a2", "default", AgentStatus::Alive, true);
        b.available_slots = r#"{"cuda.device":"4","cpu":"16"}"#.into();
        let mut lost = make_agent("a3", "default", AgentStatus::Lost, true);
        lost.available_slots = r#"{"tpu.device":"1"}"#.into();

        let kinds = known_slot_kinds(&[a, b, lost]);
        assert_eq!(
            kinds,
            vec![ResourceKind::Cpu, ResourceKind::Mem, ResourceKind::CudaDevice]
        );
    }
}
