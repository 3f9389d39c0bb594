use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::Serialize;
use serde_json::json;

use stratus_common::auth::{require_role, AuthContext, Role};
use stratus_common::{
    display_capacity, display_slot_amount, mark_if_unlimited, Capacity, KeypairRecord,
    ResourcePolicyRecord, ResourceSlotRecord, SlotUnit,
};
use stratus_meta::MetaStore;

use crate::handlers::{error_response, error_response_with, store_error};
use crate::poll::{known_slot_kinds, list_agents, list_sessions};
use crate::state::AppState;

/// One slot kind of the quota report: the policy cap, what the keypair's
/// live sessions hold, and what is left.
#[derive(Debug, Clone, Serialize)]
pub struct QuotaRow {
    pub key: String,
    pub label: String,
    pub limit_text: String,
    pub occupied_text: String,
    pub remaining_text: String,
    pub unit: SlotUnit,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConcurrencyReport {
    pub limit: u32,
    pub limit_text: String,
    pub used: u32,
    pub remaining_text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeypairUsageReport {
    pub access_key: String,
    pub policy: String,
    pub concurrency: ConcurrencyReport,
    pub slots: Vec<QuotaRow>,
}

pub(crate) fn build_usage_report(
    keypair: &KeypairRecord,
    policy: &ResourcePolicyRecord,
    limits: &ResourceSlotRecord,
    occupied: &ResourceSlotRecord,
) -> KeypairUsageReport {
    let remaining = limits.remaining_after(occupied);
    let slots = limits
        .iter()
        .map(|(kind, cap)| {
            let unit = kind.unit();
            QuotaRow {
                key: kind.as_str().to_string(),
                label: kind.label().to_string(),
                limit_text: display_capacity(*cap, unit),
                occupied_text: display_slot_amount(occupied.amount(kind), unit),
                remaining_text: display_capacity(
                    remaining.get(kind).unwrap_or(Capacity::Finite(0.0)),
                    unit,
                ),
                unit,
            }
        })
        .collect();

    let concurrency_limit = Capacity::from_limit(f64::from(policy.max_concurrent_sessions));
    KeypairUsageReport {
        access_key: keypair.access_key.clone(),
        policy: policy.name.clone(),
        concurrency: ConcurrencyReport {
            limit: policy.max_concurrent_sessions,
            limit_text: mark_if_unlimited(f64::from(policy.max_concurrent_sessions)),
            used: keypair.concurrency_used,
            remaining_text: display_capacity(
                concurrency_limit.sub_clamped(f64::from(keypair.concurrency_used)),
                SlotUnit::Count,
            ),
        },
        slots,
    }
}

/// Quota report for one keypair: the policy's caps completed over the
/// kinds the cluster advertises, against the sum of what the keypair's
/// resource-holding sessions occupy.
pub async fn keypair_usage(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(access_key): Path<String>,
) -> impl IntoResponse {
    if let Some(resp) = require_role(&ctx, Role::Viewer) {
        return resp;
    }

    let keypair: KeypairRecord = match st
        .store
        .get(&format!("/stratus/keypairs/{access_key}"))
        .await
    {
        Ok(Some((value, _rev))) => match serde_json::from_slice(&value) {
            Ok(rec) => rec,
            Err(e) => {
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "decode_error",
                    &format!("stored keypair record is invalid: {e}"),
                );
            }
        },
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                "keypair_not_found",
                &format!("no keypair with access key '{access_key}'"),
            );
        }
        Err(e) => return store_error(e),
    };

    let policy: ResourcePolicyRecord = match st
        .store
        .get(&format!("/stratus/policies/{}", keypair.resource_policy))
        .await
    {
        Ok(Some((value, _rev))) => match serde_json::from_slice(&value) {
            Ok(rec) => rec,
            Err(e) => {
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "decode_error",
                    &format!("stored policy record is invalid: {e}"),
                );
            }
        },
        Ok(None) => {
            return error_response_with(
                StatusCode::NOT_FOUND,
                "policy_not_found",
                &format!(
                    "keypair '{access_key}' references missing policy '{}'",
                    keypair.resource_policy
                ),
                Some(json!({ "policy": keypair.resource_policy })),
            );
        }
        Err(e) => return store_error(e),
    };

    let agents = match list_agents(st.store.as_ref()).await {
        Ok(agents) => agents,
        Err(e) => return store_error(e),
    };
    let known = known_slot_kinds(&agents);

    let limits = match policy.effective_limits(&known) {
        Ok(limits) => limits,
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "invalid_policy",
                &format!("policy '{}' has an unparsable slot mapping: {e}", policy.name),
            );
        }
    };

    let sessions = match list_sessions(st.store.as_ref()).await {
        Ok(sessions) => sessions,
        Err(e) => return store_error(e),
    };

    let mut occupied = ResourceSlotRecord::new();
    for session in &sessions {
        if session.access_key != access_key || !session.status.occupies_resources() {
            continue;
        }
        if let Ok(slots) = session.occupied() {
            occupied.merge_add(&slots);
        }
    }

    (
        StatusCode::OK,
        Json(build_usage_report(&keypair, &policy, &limits, &occupied)),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratus_common::{DefaultForUnspecified, ResourceKind};

    fn make_keypair(concurrency_used: u32) -> KeypairRecord {
        KeypairRecord {
            access_key: "AKIATESTTESTTEST0001".into(),
            secret_key: "sk".into(),
            user_id: "dev@example.com".into(),
            is_active: true,
            is_admin: false,
            resource_policy: "student".into(),
            rate_limit: 10_000,
            num_queries: 0,
            concurrency_used,
            created_at_ms: 0,
        }
    }

    fn make_policy() -> ResourcePolicyRecord {
        ResourcePolicyRecord {
            name: "student".into(),
            default_for_unspecified: DefaultForUnspecified::Limited,
            total_resource_slots: r#"{"cpu":"8","mem":"17179869184"}"#.into(),
            max_concurrent_sessions: 5,
            max_containers_per_session: 1,
            max_session_lifetime: 0,
            idle_timeout: 600,
            max_vfolder_count: 0,
            max_vfolder_size: 0,
            allowed_vfolder_hosts: vec![],
        }
    }

    #[test]
    fn report_subtracts_occupancy_from_limits() {
        let keypair = make_keypair(2);
        let policy = make_policy();
        let known = [ResourceKind::Cpu, ResourceKind::Mem, ResourceKind::CudaDevice];
        let limits = policy.effective_limits(&known).unwrap();
        let occupied = stratus_common::parse_slots(r#"{"cpu":"3","mem":"4294967296"}"#).unwrap();

        let report = build_usage_report(&keypair, &policy, &limits, &occupied);

        let cpu = report.slots.iter().find(|r| r.key == "cpu").unwrap();
        assert_eq!(cpu.limit_text, "8");
        assert_eq!(cpu.occupied_text, "3");
        assert_eq!(cpu.remaining_text, "5");

        let mem = report.slots.iter().find(|r| r.key == "mem").unwrap();
        assert_eq!(mem.limit_text, "16.0");
        assert_eq!(mem.remaining_text, "12.0");

        // unspecified kind under a Limited policy caps at zero
        let gpu = report.slots.iter().find(|r| r.key == "cuda.device").unwrap();
        assert_eq!(gpu.limit_text, "0");
        assert_eq!(gpu.remaining_text, "0");

        assert_eq!(report.concurrency.limit_text, "5");
        assert_eq!(report.concurrency.remaining_text, "3");
    }

    #[test]
    fn zero_concurrency_limit_reads_unlimited() {
        let keypair = make_keypair(7);
        let mut policy = make_policy();
        policy.max_concurrent_sessions = 0;
        let limits = ResourceSlotRecord::new();
        let occupied = ResourceSlotRecord::new();

        let report = build_usage_report(&keypair, &policy, &limits, &occupied);
        assert_eq!(report.concurrency.limit_text, "∞");
        assert_eq!(report.concurrency.remaining_text, "∞");
    }
}
