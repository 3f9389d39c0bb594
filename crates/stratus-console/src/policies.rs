use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use stratus_common::auth::{require_role, AuthContext, Role};
use stratus_common::{
    display_binary_size, display_capacity, mark_if_unlimited, parse_slots,
    DefaultForUnspecified, ResourcePolicyRecord, SlotUnit, UNLIMITED_SYMBOL,
};
use stratus_meta::MetaStore;

use crate::handlers::{error_response, error_response_with, store_error};
use crate::keypairs::list_keypairs;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct SlotCapEntry {
    pub key: String,
    pub label: String,
    pub cap_text: String,
    pub unit: SlotUnit,
}

/// Policy as the grids render it: every limit field paired with its
/// sentinel-aware display text, plus the store revision the update
/// flow must echo back.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyView {
    pub name: String,
    pub default_for_unspecified: DefaultForUnspecified,
    pub slot_caps: Vec<SlotCapEntry>,
    pub max_concurrent_sessions: u32,
    pub max_concurrent_sessions_text: String,
    pub max_containers_per_session: u32,
    pub max_session_lifetime: u64,
    pub max_session_lifetime_text: String,
    pub idle_timeout: u64,
    pub idle_timeout_text: String,
    pub max_vfolder_count: u32,
    pub max_vfolder_count_text: String,
    pub max_vfolder_size: u64,
    pub max_vfolder_size_text: String,
    pub allowed_vfolder_hosts: Vec<String>,
    pub revision: u64,
}

impl PolicyView {
    fn from_record(rec: &ResourcePolicyRecord, revision: u64) -> Self {
        let slot_caps = match rec.total_slots() {
            Ok(slots) => slots
                .iter()
                .map(|(kind, cap)| {
                    let unit = kind.unit();
                    SlotCapEntry {
                        key: kind.as_str().to_string(),
                        label: kind.label().to_string(),
                        cap_text: display_capacity(*cap, unit),
                        unit,
                    }
                })
                .collect(),
            Err(_) => Vec::new(),
        };

        PolicyView {
            name: rec.name.clone(),
            default_for_unspecified: rec.default_for_unspecified,
            slot_caps,
            max_concurrent_sessions: rec.max_concurrent_sessions,
            max_concurrent_sessions_text: mark_if_unlimited(f64::from(rec.max_concurrent_sessions)),
            max_containers_per_session: rec.max_containers_per_session,
            max_session_lifetime: rec.max_session_lifetime,
            max_session_lifetime_text: mark_if_unlimited(rec.max_session_lifetime as f64),
            idle_timeout: rec.idle_timeout,
            idle_timeout_text: mark_if_unlimited(rec.idle_timeout as f64),
            max_vfolder_count: rec.max_vfolder_count,
            max_vfolder_count_text: mark_if_unlimited(f64::from(rec.max_vfolder_count)),
            max_vfolder_size: rec.max_vfolder_size,
            max_vfolder_size_text: if rec.max_vfolder_size == 0 {
                UNLIMITED_SYMBOL.to_string()
            } else {
                display_binary_size(rec.max_vfolder_size)
            },
            allowed_vfolder_hosts: rec.allowed_vfolder_hosts.clone(),
            revision,
        }
    }
}

pub(crate) async fn list_policies(
    store: &dyn MetaStore,
) -> anyhow::Result<Vec<(ResourcePolicyRecord, u64)>> {
    let raw = store.list_prefix("/stratus/policies/").await?;
    let mut policies = Vec::new();
    for (_k, v, rev) in raw {
        if let Ok(rec) = serde_json::from_slice::<ResourcePolicyRecord>(&v) {
            policies.push((rec, rev));
        }
    }
    Ok(policies)
}

pub async fn policies_list(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> impl IntoResponse {
    if let Some(resp) = require_role(&ctx, Role::Viewer) {
        return resp;
    }

    let policies = match list_policies(st.store.as_ref()).await {
        Ok(policies) => policies,
        Err(e) => return store_error(e),
    };

    let views: Vec<PolicyView> = policies
        .iter()
        .map(|(rec, rev)| PolicyView::from_record(rec, *rev))
        .collect();
    Json(json!({ "policies": views, "total": views.len() })).into_response()
}

pub async fn policy_detail(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    if let Some(resp) = require_role(&ctx, Role::Viewer) {
        return resp;
    }

    match st.store.get(&format!("/stratus/policies/{name}")).await {
        Ok(Some((value, revision))) => {
            match serde_json::from_slice::<ResourcePolicyRecord>(&value) {
                Ok(rec) => {
                    (StatusCode::OK, Json(PolicyView::from_record(&rec, revision))).into_response()
                }
                Err(e) => error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "decode_error",
                    &format!("stored policy record is invalid: {e}"),
                ),
            }
        }
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            "policy_not_found",
            &format!("no policy named '{name}'"),
        ),
        Err(e) => store_error(e),
    }
}

fn validate_policy(rec: &ResourcePolicyRecord) -> Result<(), String> {
    if rec.name.trim().is_empty() {
        return Err("policy name must not be empty".to_string());
    }
    if let Err(e) = parse_slots(&rec.total_resource_slots) {
        return Err(format!("total_resource_slots does not parse: {e}"));
    }
    Ok(())
}

pub async fn policy_create(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(rec): Json<ResourcePolicyRecord>,
) -> impl IntoResponse {
    if let Some(resp) = require_role(&ctx, Role::Admin) {
        return resp;
    }

    if let Err(msg) = validate_policy(&rec) {
        return error_response(StatusCode::BAD_REQUEST, "invalid_policy", &msg);
    }

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

    match st
        .store
        .compare_and_swap(&format!("/stratus/policies/{}", rec.name), 0, encoded)
        .await
    {
        Ok((true, revision)) => {
            (StatusCode::CREATED, Json(PolicyView::from_record(&rec, revision))).into_response()
        }
        Ok((false, _rev)) => error_response(
            StatusCode::CONFLICT,
            "policy_exists",
            &format!("policy '{}' already exists", rec.name),
        ),
        Err(e) => store_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdatePolicyRequest {
    /// Revision the client read; the write only lands if it still holds.
    pub revision: u64,
    #[serde(flatten)]
    pub policy: ResourcePolicyRecord,
}

pub async fn policy_update(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(name): Path<String>,
    Json(req): Json<UpdatePolicyRequest>,
) -> impl IntoResponse {
    if let Some(resp) = require_role(&ctx, Role::Admin) {
        return resp;
    }

    if req.policy.name != name {
        return error_response(
            StatusCode::BAD_REQUEST,
            "name_mismatch",
            &format!("body names policy '{}', path names '{name}'", req.policy.name),
        );
    }
    if let Err(msg) = validate_policy(&req.policy) {
        return error_response(StatusCode::BAD_REQUEST, "invalid_policy", &msg);
    }

    let encoded = match serde_json::to_vec(&req.policy) {
        Ok(encoded) => encoded,
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "encode_error",
                &e.to_string(),
            );
        }
    };

    match st
        .store
        .compare_and_swap(&format!("/stratus/policies/{name}"), req.revision, encoded)
        .await
    {
        Ok((true, revision)) => {
            (StatusCode::OK, Json(PolicyView::from_record(&req.policy, revision))).into_response()
        }
        Ok((false, current)) => error_response_with(
            StatusCode::CONFLICT,
            "conflict",
            "policy changed since it was read, fetch it again",
            Some(json!({ "current_revision": current })),
        ),
        Err(e) => store_error(e),
    }
}

pub async fn policy_delete(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    if let Some(resp) = require_role(&ctx, Role::Admin) {
        return resp;
    }

    // A policy still referenced by keypairs must not disappear.
    let keypairs = match list_keypairs(st.store.as_ref()).await {
        Ok(keypairs) => keypairs,
        Err(e) => return store_error(e),
    };
    let referencing = keypairs
        .iter()
        .filter(|kp| kp.resource_policy == name)
        .count();
    if referencing > 0 {
        return error_response_with(
            StatusCode::CONFLICT,
            "policy_in_use",
            &format!("policy '{name}' is referenced by {referencing} keypair(s)"),
            Some(json!({ "referencing_keypairs": referencing })),
        );
    }

    let key = format!("/stratus/policies/{name}");
    match st.store.get(&key).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                "policy_not_found",
                &format!("no policy named '{name}'"),
            );
        }
        Err(e) => return store_error(e),
    }

    match st.store.delete(&key).await {
        Ok(_rev) => Json(json!({ "deleted": true, "name": name })).into_response(),
        Err(e) => store_error(e),
    }
}
