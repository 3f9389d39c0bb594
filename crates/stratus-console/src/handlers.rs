use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use stratus_common::auth::{require_role, AuthContext, Role};

use crate::poll::build_cluster_summary;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Helpers shared by every handler module
// ---------------------------------------------------------------------------

pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[derive(Serialize)]
pub(crate) struct ErrorDetail {
    code: String,
    message: String,
    request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

#[derive(Serialize)]
pub(crate) struct ErrorResponse {
    error: ErrorDetail,
}

pub(crate) fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    error_response_with(status, code, message, None)
}

pub(crate) fn error_response_with(
    status: StatusCode,
    code: &str,
    message: &str,
    details: Option<serde_json::Value>,
) -> Response {
    let body = ErrorResponse {
        error: ErrorDetail {
            code: code.to_string(),
            message: message.to_string(),
            request_id: format!("req_{}", Uuid::new_v4()),
            details,
        },
    };
    (status, Json(body)).into_response()
}

pub(crate) fn store_error(e: anyhow::Error) -> Response {
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "store_error",
        &format!("metadata store error: {e}"),
    )
}

/// Render a millisecond timestamp for view columns; the zero sentinel
/// renders empty.
pub(crate) fn rfc3339_ms(ts_ms: u64) -> String {
    if ts_ms == 0 {
        return String::new();
    }
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(ts_ms as i64)
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Liveness and identity
// ---------------------------------------------------------------------------

pub async fn healthz() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

pub async fn whoami(Extension(ctx): Extension<AuthContext>) -> impl IntoResponse {
    Json(json!({
        "principal": ctx.principal,
        "role": ctx.role.as_str(),
    }))
}

// ---------------------------------------------------------------------------
// Cluster summary
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub scaling_group: Option<String>,
}

/// The overview the dashboard polls. Served from the poller's cache; a
/// cold cache (first request racing the first poll cycle) is filled
/// synchronously instead of failing.
pub async fn summary(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(params): Query<SummaryQuery>,
) -> impl IntoResponse {
    if let Some(resp) = require_role(&ctx, Role::Viewer) {
        return resp;
    }

    if let Some(group) = params.scaling_group {
        if let Some(usage) = st.summary.group(&group) {
            return (StatusCode::OK, Json(usage)).into_response();
        }
        // cold cache: fill it synchronously, same as the overview path,
        // before concluding the group does not exist
        match build_cluster_summary(st.store.as_ref()).await {
            Ok(fresh) => st.summary.replace(fresh).await,
            Err(e) => return store_error(e),
        }
        return match st.summary.group(&group) {
            Some(usage) => (StatusCode::OK, Json(usage)).into_response(),
            None => error_response(
                StatusCode::NOT_FOUND,
                "scaling_group_not_found",
                &format!("no summary for scaling group '{group}'"),
            ),
        };
    }

    if let Some(snapshot) = st.summary.snapshot().await {
        return (StatusCode::OK, Json(snapshot)).into_response();
    }

    match build_cluster_summary(st.store.as_ref()).await {
        Ok(fresh) => {
            st.summary.replace(fresh.clone()).await;
            (StatusCode::OK, Json(fresh)).into_response()
        }
        Err(e) => store_error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_state;
    use stratus_common::{AgentRecord, AgentStatus};
    use stratus_meta::{MemoryMetaStore, MetaStore};

    fn ctx() -> AuthContext {
        AuthContext {
            principal: "test".into(),
            role: Role::Viewer,
        }
    }

    fn make_agent(id: &str, group: &str) -> AgentRecord {
        AgentRecord {
            id: id.into(),
            status: AgentStatus::Alive,
            addr: "10.0.0.9:6001".into(),
            region: "local".into(),
            scaling_group: group.into(),
            schedulable: true,
            architecture: "x86_64".into(),
            available_slots: r#"{"cpu":"8","mem":"8589934592"}"#.into(),
            occupied_slots: r#"{"cpu":"2"}"#.into(),
            version: None,
            first_contact_ms: 0,
            lost_at_ms: None,
            cpu_cur_pct: 0.0,
            mem_cur_bytes: 0,
        }
    }

    async fn seed_agent(store: &MemoryMetaStore, agent: &AgentRecord) {
        store
            .put(
                &format!("/stratus/agents/{}", agent.id),
                serde_json::to_vec(agent).unwrap(),
                None,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn group_summary_fills_cold_cache() {
        let store = MemoryMetaStore::new();
        seed_agent(&store, &make_agent("a1", "gpu")).await;
        let st = test_state(store);
        // no poll cycle has run yet
        assert!(st.summary.snapshot().await.is_none());

        let resp = summary(
            State(st.clone()),
            Extension(ctx()),
            Query(SummaryQuery {
                scaling_group: Some("gpu".into()),
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(st.summary.group("gpu").is_some());
    }

    #[tokio::test]
    async fn unknown_group_is_not_found_after_fill() {
        let store = MemoryMetaStore::new();
        seed_agent(&store, &make_agent("a1", "default")).await;
        let st = test_state(store);

        let resp = summary(
            State(st),
            Extension(ctx()),
            Query(SummaryQuery {
                scaling_group: Some("ghost".into()),
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn zero_timestamp_renders_empty() {
        assert_eq!(rfc3339_ms(0), "");
        assert!(rfc3339_ms(1_700_000_000_000).starts_with("2023-11-14T"));
    }
}
