use std::collections::BTreeMap;

use axum::{extract::State, response::IntoResponse, Extension, Json};
use serde_json::json;

use stratus_common::auth::{require_role, AuthContext, Role};
use stratus_common::{AgentRecord, KeypairRecord, ResourceSlotRecord, SessionRecord};
use stratus_meta::MetaStore;

use crate::handlers::store_error;
use crate::poll::list_sessions;
use crate::state::AppState;

/// Rebuild the derived occupancy bookkeeping from the sessions that
/// actually hold resources: per-keypair concurrency counters and
/// per-agent occupied slots. Corrections go in with compare-and-swap;
/// records that move underneath the sweep are reported, not retried.
pub async fn recalculate_usage(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> impl IntoResponse {
    if let Some(resp) = require_role(&ctx, Role::Admin) {
        return resp;
    }

    let sessions = match list_sessions(st.store.as_ref()).await {
        Ok(sessions) => sessions,
        Err(e) => return store_error(e),
    };

    let mut expected_concurrency: BTreeMap<String, u32> = BTreeMap::new();
    let mut expected_occupied: BTreeMap<String, ResourceSlotRecord> = BTreeMap::new();
    let mut considered = 0u64;

    for session in &sessions {
        if !session.status.occupies_resources() {
            continue;
        }
        considered += 1;
        *expected_concurrency
            .entry(session.access_key.clone())
            .or_insert(0) += 1;
        if let (Some(agent), Ok(slots)) = (&session.agent, session.occupied()) {
            expected_occupied
                .entry(agent.clone())
                .or_default()
                .merge_add(&slots);
        }
    }

    let mut keypairs_fixed = 0u64;
    let mut agents_fixed = 0u64;
    let mut conflicts = 0u64;

    let raw_keypairs = match st.store.list_prefix("/stratus/keypairs/").await {
        Ok(raw) => raw,
        Err(e) => return store_error(e),
    };
    for (key, value, revision) in raw_keypairs {
        let Ok(mut rec) = serde_json::from_slice::<KeypairRecord>(&value) else {
            continue;
        };
        let expected = expected_concurrency
            .get(&rec.access_key)
            .copied()
            .unwrap_or(0);
        if rec.concurrency_used == expected {
            continue;
        }
        rec.concurrency_used = expected;
        let Ok(encoded) = serde_json::to_vec(&rec) else {
            continue;
        };
        match st.store.compare_and_swap(&key, revision, encoded).await {
            Ok((true, _rev)) => keypairs_fixed += 1,
            Ok((false, _rev)) => conflicts += 1,
            Err(e) => return store_error(e),
        }
    }

    let raw_agents = match st.store.list_prefix("/stratus/agents/").await {
        Ok(raw) => raw,
        Err(e) => return store_error(e),
    };
    for (key, value, revision) in raw_agents {
        let Ok(mut rec) = serde_json::from_slice::<AgentRecord>(&value) else {
            continue;
        };
        let expected = expected_occupied.remove(&rec.id).unwrap_or_default();
        if rec.occupied().ok().as_ref() == Some(&expected) {
            continue;
        }
        rec.occupied_slots = expected.to_json_string();
        let Ok(encoded) = serde_json::to_vec(&rec) else {
            continue;
        };
        match st.store.compare_and_swap(&key, revision, encoded).await {
            Ok((true, _rev)) => agents_fixed += 1,
            Ok((false, _rev)) => conflicts += 1,
            Err(e) => return store_error(e),
        }
    }

    tracing::info!(
        keypairs_fixed,
        agents_fixed,
        conflicts,
        "usage recalculation finished"
    );

    Json(json!({
        "sessions_considered": considered,
        "keypairs_fixed": keypairs_fixed,
        "agents_fixed": agents_fixed,
        "conflicts": conflicts,
    }))
    .into_response()
}

/// Drop finished session records. Running history stays; only terminal
/// states are swept.
pub async fn purge_terminated_sessions(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> impl IntoResponse {
    if let Some(resp) = require_role(&ctx, Role::Admin) {
        return resp;
    }

    let raw = match st.store.list_prefix("/stratus/sessions/").await {
        Ok(raw) => raw,
        Err(e) => return store_error(e),
    };

    let mut purged = 0u64;
    for (key, value, _rev) in raw {
        // a record that does not decode is left alone rather than swept
        let Ok(rec) = serde_json::from_slice::<SessionRecord>(&value) else {
            tracing::warn!(key = %key, "skipping undecodable session record");
            continue;
        };
        if !rec.status.is_finished() {
            continue;
        }
        match st.store.delete(&key).await {
            Ok(_rev) => purged += 1,
            Err(e) => return store_error(e),
        }
    }

    tracing::info!(purged, "terminated sessions purged");
    Json(json!({ "purged": purged })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_state;
    use axum::http::StatusCode;
    use stratus_common::{AgentStatus, SessionStatus};
    use stratus_meta::MemoryMetaStore;

    fn ctx(role: Role) -> AuthContext {
        AuthContext {
            principal: "test".into(),
            role,
        }
    }

    fn make_session(id: &str, status: SessionStatus, agent: &str) -> SessionRecord {
        SessionRecord {
            id: id.into(),
            name: id.into(),
            access_key: "AKIAMAINT0000000TEST".into(),
            status,
            session_type: Default::default(),
            cluster_mode: Default::default(),
            cluster_size: 1,
            image: "python:3.11".into(),
            agent: Some(agent.into()),
            occupied_slots: r#"{"cpu":"2","mem":"4294967296"}"#.into(),
            created_at_ms: 0,
            terminated_at_ms: None,
            status_info: None,
        }
    }

    async fn put(store: &MemoryMetaStore, key: &str, value: &impl serde::Serialize) {
        store
            .put(key, serde_json::to_vec(value).unwrap(), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn recalculation_repairs_drifted_counters() {
        let store = MemoryMetaStore::new();

        put(
            &store,
            "/stratus/sessions/s1",
            &make_session("s1", SessionStatus::Running, "a1"),
        )
        .await;
        put(
            &store,
            "/stratus/sessions/s2",
            &make_session("s2", SessionStatus::Terminated, "a1"),
        )
        .await;

        let agent = AgentRecord {
            id: "a1".into(),
            status: AgentStatus::Alive,
            addr: "10.0.0.7:6001".into(),
            region: String::new(),
            scaling_group: "default".into(),
            schedulable: true,
            architecture: "x86_64".into(),
            available_slots: r#"{"cpu":"8","mem":"34359738368"}"#.into(),
            // drifted: says 6 cpus, sessions only hold 2
            occupied_slots: r#"{"cpu":"6"}"#.into(),
            version: None,
            first_contact_ms: 0,
            lost_at_ms: None,
            cpu_cur_pct: 0.0,
            mem_cur_bytes: 0,
        };
        put(&store, "/stratus/agents/a1", &agent).await;

        let keypair = KeypairRecord {
            access_key: "AKIAMAINT0000000TEST".into(),
            secret_key: "sk".into(),
            user_id: "dev@example.com".into(),
            is_active: true,
            is_admin: false,
            resource_policy: "default".into(),
            rate_limit: 10_000,
            num_queries: 0,
            concurrency_used: 5,
            created_at_ms: 0,
        };
        put(&store, "/stratus/keypairs/AKIAMAINT0000000TEST", &keypair).await;

        let st = test_state(store);
        let resp = recalculate_usage(State(st.clone()), Extension(ctx(Role::Admin)))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let (value, _rev) = st
            .store
            .get("/stratus/keypairs/AKIAMAINT0000000TEST")
            .await
            .unwrap()
            .unwrap();
        let stored: KeypairRecord = serde_json::from_slice(&value).unwrap();
        assert_eq!(stored.concurrency_used, 1);

        let (value, _rev) = st.store.get("/stratus/agents/a1").await.unwrap().unwrap();
        let stored: AgentRecord = serde_json::from_slice(&value).unwrap();
        let occupied = stored.occupied().unwrap();
        assert_eq!(
            occupied.amount(&stratus_common::ResourceKind::Cpu),
            2.0
        );
        assert_eq!(
            occupied.amount(&stratus_common::ResourceKind::Mem),
            4294967296.0
        );
    }

    #[tokio::test]
    async fn purge_drops_only_finished_sessions() {
        let store = MemoryMetaStore::new();
        put(
            &store,
            "/stratus/sessions/s1",
            &make_session("s1", SessionStatus::Running, "a1"),
        )
        .await;
        put(
            &store,
            "/stratus/sessions/s2",
            &make_session("s2", SessionStatus::Terminated, "a1"),
        )
        .await;
        put(
            &store,
            "/stratus/sessions/s3",
            &make_session("s3", SessionStatus::Cancelled, "a1"),
        )
        .await;

        let st = test_state(store);
        let resp = purge_terminated_sessions(State(st.clone()), Extension(ctx(Role::Admin)))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        assert!(st.store.get("/stratus/sessions/s1").await.unwrap().is_some());
        assert!(st.store.get("/stratus/sessions/s2").await.unwrap().is_none());
        assert!(st.store.get("/stratus/sessions/s3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn maintenance_requires_admin() {
        let st = test_state(MemoryMetaStore::new());
        let resp = recalculate_usage(State(st), Extension(ctx(Role::Operator)))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
