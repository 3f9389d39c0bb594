use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use stratus_common::auth::{require_role, AuthContext, Role};
use stratus_common::{display_binary_size, usage_rows, AgentRecord, AgentStatus, UsageRow};
use stratus_meta::MetaStore;

use crate::export;
use crate::handlers::{error_response, rfc3339_ms, store_error};
use crate::poll::list_agents;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AgentListQuery {
    pub status: Option<String>,
    pub format: Option<String>,
}

/// Grid row for the agents view. Slot mappings are decoded out of the
/// stored wire form; a record with a corrupt mapping still renders, with
/// empty usage.
#[derive(Debug, Clone, Serialize)]
pub struct AgentView {
    pub id: String,
    pub status: AgentStatus,
    pub addr: String,
    pub region: String,
    pub scaling_group: String,
    pub schedulable: bool,
    pub architecture: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub first_contact: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lost_at: Option<String>,
    pub cpu_cur_pct: f64,
    pub mem_cur: String,
    pub usage: Vec<UsageRow>,
}

impl AgentView {
    pub(crate) fn from_record(rec: &AgentRecord) -> Self {
        let occupied = rec.occupied().unwrap_or_default();
        let available = rec.available().unwrap_or_default();
        AgentView {
            id: rec.id.clone(),
            status: rec.status,
            addr: rec.addr.clone(),
            region: rec.region.clone(),
            scaling_group: rec.scaling_group.clone(),
            schedulable: rec.schedulable,
            architecture: rec.architecture.clone(),
            version: rec.version.clone(),
            first_contact: rfc3339_ms(rec.first_contact_ms),
            lost_at: rec.lost_at_ms.map(rfc3339_ms),
            cpu_cur_pct: rec.cpu_cur_pct,
            mem_cur: display_binary_size(rec.mem_cur_bytes),
            usage: usage_rows(&occupied, &available),
        }
    }
}

pub async fn agents_list(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(params): Query<AgentListQuery>,
) -> impl IntoResponse {
    if let Some(resp) = require_role(&ctx, Role::Viewer) {
        return resp;
    }

    let wanted = match params.status.as_deref() {
        Some(raw) => match AgentStatus::parse(raw) {
            Some(status) => Some(status),
            None => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    "invalid_status",
                    &format!("unknown agent status '{raw}'"),
                );
            }
        },
        None => None,
    };

    let agents = match list_agents(st.store.as_ref()).await {
        Ok(agents) => agents,
        Err(e) => return store_error(e),
    };

    let views: Vec<AgentView> = agents
        .iter()
        .filter(|a| wanted.map_or(true, |s| a.status == s))
        .map(AgentView::from_record)
        .collect();

    if params.format.as_deref() == Some("csv") {
        st.metrics
            .csv_exports
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        return export::csv_response("agents.csv", export::agents_csv(&views));
    }

    Json(json!({ "agents": views, "total": views.len() })).into_response()
}

pub async fn agent_detail(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if let Some(resp) = require_role(&ctx, Role::Viewer) {
        return resp;
    }

    match st.store.get(&format!("/stratus/agents/{id}")).await {
        Ok(Some((value, _rev))) => match serde_json::from_slice::<AgentRecord>(&value) {
            Ok(rec) => (StatusCode::OK, Json(AgentView::from_record(&rec))).into_response(),
            Err(e) => error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "decode_error",
                &format!("stored agent record is invalid: {e}"),
            ),
        },
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            "agent_not_found",
            &format!("agent '{id}' is not registered"),
        ),
        Err(e) => store_error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_state;
    use stratus_meta::MemoryMetaStore;

    fn make_agent(id: &str, status: AgentStatus) -> AgentRecord {
        AgentRecord {
            id: id.into(),
            status,
            addr: "10.0.0.7:6001".into(),
            region: "local".into(),
            scaling_group: "default".into(),
            schedulable: true,
            architecture: "aarch64".into(),
            available_slots: r#"{"cpu":"4","mem":"8589934592"}"#.into(),
            occupied_slots: r#"{"cpu":"1","mem":"1073741824"}"#.into(),
            version: None,
            first_contact_ms: 1_700_000_000_000,
            lost_at_ms: None,
            cpu_cur_pct: 3.25,
            mem_cur_bytes: 2_147_483_648,
        }
    }

    fn ctx() -> AuthContext {
        AuthContext {
            principal: "test".into(),
            role: Role::Viewer,
        }
    }

    #[test]
    fn view_decodes_slot_columns() {
        let view = AgentView::from_record(&make_agent("a1", AgentStatus::Alive));
        assert_eq!(view.mem_cur, "2 GiB");
        let mem = view.usage.iter().find(|r| r.key == "mem").unwrap();
        assert_eq!(mem.capacity_text, "8.0");
        assert_eq!(mem.usage.percent_text, "12.50");
    }

    #[test]
    fn view_survives_corrupt_slot_mapping() {
        let mut rec = make_agent("a1", AgentStatus::Alive);
        rec.occupied_slots = "{not json".into();
        let view = AgentView::from_record(&rec);
        // capacity still renders, occupancy reads zero
        let cpu = view.usage.iter().find(|r| r.key == "cpu").unwrap();
        assert_eq!(cpu.used_text, "0");
        assert_eq!(cpu.capacity_text, "4");
    }

    #[tokio::test]
    async fn list_rejects_unknown_status_filter() {
        let st = test_state(MemoryMetaStore::new());
        let resp = agents_list(
            State(st),
            Extension(ctx()),
            Query(AgentListQuery {
                status: Some("zombie".into()),
                format: None,
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let store = MemoryMetaStore::new();
        for agent in [
            make_agent("a1", AgentStatus::Alive),
            make_agent("a2", AgentStatus::Lost),
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

        let st = test_state(store);
        let resp = agents_list(
            State(st.clone()),
            Extension(ctx()),
            Query(AgentListQuery {
                status: Some("lost".into()),
                format: None,
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let missing = agent_detail(State(st), Extension(ctx()), Path("a9".into()))
            .await
            .into_response();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
