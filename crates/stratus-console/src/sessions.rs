use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use stratus_common::auth::{require_role, AuthContext, Role};
use stratus_common::{
    display_slot_amount, ClusterMode, SessionRecord, SessionStatus, SessionType, SlotUnit,
};
use stratus_meta::MetaStore;

use crate::export;
use crate::handlers::{error_response, error_response_with, now_ms, rfc3339_ms, store_error};
use crate::poll::list_sessions;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SessionListQuery {
    pub status: Option<String>,
    pub access_key: Option<String>,
    pub format: Option<String>,
}

/// One line of a session's resource allocation, rendered in the unit of
/// its slot kind. Byte amounts arrive GiB-converted, so the unit rides
/// along for consumers that append a suffix.
#[derive(Debug, Clone, Serialize)]
pub struct AllocationEntry {
    pub key: String,
    pub label: String,
    pub amount_text: String,
    pub unit: SlotUnit,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: String,
    pub name: String,
    pub access_key: String,
    pub status: SessionStatus,
    pub session_type: SessionType,
    pub cluster_mode: ClusterMode,
    pub cluster_size: u32,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminated_at: Option<String>,
    pub elapsed: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_info: Option<String>,
    pub allocation: Vec<AllocationEntry>,
}

impl SessionView {
    pub(crate) fn from_record(rec: &SessionRecord, now_ms: u64) -> Self {
        let occupied = rec.occupied().unwrap_or_default();
        let allocation = occupied
            .kinds()
            .map(|kind| {
                let unit = kind.unit();
                AllocationEntry {
                    key: kind.as_str().to_string(),
                    label: kind.label().to_string(),
                    amount_text: display_slot_amount(occupied.amount(kind), unit),
                    unit,
                }
            })
            .collect();

        SessionView {
            id: rec.id.clone(),
            name: rec.name.clone(),
            access_key: rec.access_key.clone(),
            status: rec.status,
            session_type: rec.session_type,
            cluster_mode: rec.cluster_mode,
            cluster_size: rec.cluster_size,
            image: rec.image.clone(),
            agent: rec.agent.clone(),
            created_at: rfc3339_ms(rec.created_at_ms),
            terminated_at: rec.terminated_at_ms.map(rfc3339_ms),
            elapsed: rec.elapsed_text(now_ms),
            status_info: rec.status_info.clone(),
            allocation,
        }
    }
}

pub async fn sessions_list(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(params): Query<SessionListQuery>,
) -> impl IntoResponse {
    if let Some(resp) = require_role(&ctx, Role::Viewer) {
        return resp;
    }

    let wanted = match params.status.as_deref() {
        Some(raw) => match SessionStatus::parse(raw) {
            Some(status) => Some(status),
            None => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    "invalid_status",
                    &format!("unknown session status '{raw}'"),
                );
            }
        },
        None => None,
    };

    let sessions = match list_sessions(st.store.as_ref()).await {
        Ok(sessions) => sessions,
        Err(e) => return store_error(e),
    };

    let now = now_ms();
    let views: Vec<SessionView> = sessions
        .iter()
        .filter(|s| wanted.map_or(true, |w| s.status == w))
        .filter(|s| {
            params
                .access_key
                .as_deref()
                .map_or(true, |ak| s.access_key == ak)
        })
        .map(|s| SessionView::from_record(s, now))
        .collect();

    if params.format.as_deref() == Some("csv") {
        st.metrics
            .csv_exports
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        return export::csv_response("sessions.csv", export::sessions_csv(&views));
    }

    Json(json!({ "sessions": views, "total": views.len() })).into_response()
}

pub async fn session_detail(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if let Some(resp) = require_role(&ctx, Role::Viewer) {
        return resp;
    }

    match st.store.get(&format!("/stratus/sessions/{id}")).await {
        Ok(Some((value, _rev))) => match serde_json::from_slice::<SessionRecord>(&value) {
            Ok(rec) => {
                (StatusCode::OK, Json(SessionView::from_record(&rec, now_ms()))).into_response()
            }
            Err(e) => error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "decode_error",
                &format!("stored session record is invalid: {e}"),
            ),
        },
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            "session_not_found",
            &format!("session '{id}' does not exist"),
        ),
        Err(e) => store_error(e),
    }
}

/// Request termination. The record moves to `terminating`; the compute
/// plane is responsible for the terminal transition, so `terminated_at`
/// is not stamped here.
pub async fn session_terminate(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if let Some(resp) = require_role(&ctx, Role::Operator) {
        return resp;
    }

    let key = format!("/stratus/sessions/{id}");
    let (value, revision) = match st.store.get(&key).await {
        Ok(Some(found)) => found,
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                "session_not_found",
                &format!("session '{id}' does not exist"),
            );
        }
        Err(e) => return store_error(e),
    };

    let mut rec: SessionRecord = match serde_json::from_slice(&value) {
        Ok(rec) => rec,
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "decode_error",
                &format!("stored session record is invalid: {e}"),
            );
        }
    };

    if !rec.status.can_terminate() {
        return error_response_with(
            StatusCode::CONFLICT,
            "not_terminable",
            &format!("session '{id}' is already {}", rec.status.as_str()),
            Some(json!({ "status": rec.status.as_str() })),
        );
    }

    rec.status = SessionStatus::Terminating;
    rec.status_info = Some(format!("termination requested by {}", ctx.principal));

    let encoded = match serde_json::to_vec(&rec) {
        Ok(encoded) => encoded,
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "encode_error",
                &e.to_string(),
            );
        }
    };

    match st.store.compare_and_swap(&key, revision, encoded).await {
        Ok((true, _rev)) => {
            (StatusCode::OK, Json(SessionView::from_record(&rec, now_ms()))).into_response()
        }
        Ok((false, current)) => error_response_with(
            StatusCode::CONFLICT,
            "conflict",
            "session changed underneath the request, retry",
            Some(json!({ "current_revision": current })),
        ),
        Err(e) => store_error(e),
    }
}
