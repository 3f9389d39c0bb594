use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;

use stratus_common::auth::{require_role, AuthContext, Role};
use stratus_common::KeypairRecord;
use stratus_meta::MetaStore;

use crate::handlers::{error_response, error_response_with, now_ms, rfc3339_ms, store_error};
use crate::state::AppState;

const AK_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const SK_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

fn random_string(charset: &[u8], len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| charset[rng.gen_range(0..charset.len())] as char)
        .collect()
}

pub(crate) fn generate_keypair() -> (String, String) {
    (
        format!("AKIA{}", random_string(AK_CHARSET, 16)),
        random_string(SK_CHARSET, 40),
    )
}

/// Grid row. The secret never appears here; the detail endpoint serves
/// it to operators only.
#[derive(Debug, Clone, Serialize)]
pub struct KeypairView {
    pub access_key: String,
    pub user_id: String,
    pub is_active: bool,
    pub is_admin: bool,
    pub resource_policy: String,
    pub rate_limit: u32,
    pub num_queries: u64,
    pub concurrency_used: u32,
    pub created_at: String,
}

impl KeypairView {
    fn from_record(rec: &KeypairRecord) -> Self {
        KeypairView {
            access_key: rec.access_key.clone(),
            user_id: rec.user_id.clone(),
            is_active: rec.is_active,
            is_admin: rec.is_admin,
            resource_policy: rec.resource_policy.clone(),
            rate_limit: rec.rate_limit,
            num_queries: rec.num_queries,
            concurrency_used: rec.concurrency_used,
            created_at: rfc3339_ms(rec.created_at_ms),
        }
    }
}

pub(crate) async fn list_keypairs(store: &dyn MetaStore) -> anyhow::Result<Vec<KeypairRecord>> {
    let raw = store.list_prefix("/stratus/keypairs/").await?;
    let mut keypairs = Vec::new();
    for (_k, v, _rev) in raw {
        if let Ok(rec) = serde_json::from_slice::<KeypairRecord>(&v) {
            keypairs.push(rec);
        }
    }
    Ok(keypairs)
}

#[derive(Debug, Deserialize)]
pub struct KeypairListQuery {
    pub active: Option<bool>,
}

pub async fn keypairs_list(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(q): Query<KeypairListQuery>,
) -> impl IntoResponse {
    if let Some(resp) = require_role(&ctx, Role::Viewer) {
        return resp;
    }

    let mut keypairs = match list_keypairs(st.store.as_ref()).await {
        Ok(keypairs) => keypairs,
        Err(e) => return store_error(e),
    };
    if let Some(active) = q.active {
        keypairs.retain(|kp| kp.is_active == active);
    }

    let views: Vec<KeypairView> = keypairs.iter().map(KeypairView::from_record).collect();
    Json(json!({ "keypairs": views, "total": views.len() })).into_response()
}

#[derive(Debug, Deserialize)]
pub struct CreateKeypairRequest {
    pub user_id: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub resource_policy: Option<String>,
    #[serde(default)]
    pub rate_limit: Option<u32>,
}

pub async fn keypair_create(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(req): Json<CreateKeypairRequest>,
) -> impl IntoResponse {
    if let Some(resp) = require_role(&ctx, Role::Operator) {
        return resp;
    }

    if req.user_id.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "invalid_user_id",
            "user_id must not be empty",
        );
    }

    // Create-only CAS; on the unlikely access-key collision, roll again.
    for _ in 0..3 {
        let (access_key, secret_key) = generate_keypair();
        let rec = KeypairRecord {
            access_key: access_key.clone(),
            secret_key,
            user_id: req.user_id.clone(),
            is_active: true,
            is_admin: req.is_admin,
            resource_policy: req.resource_policy.clone().unwrap_or_else(|| "default".to_string()),
            rate_limit: req.rate_limit.unwrap_or(10_000),
            num_queries: 0,
            concurrency_used: 0,
            created_at_ms: now_ms(),
        };

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
            .compare_and_swap(&format!("/stratus/keypairs/{access_key}"), 0, encoded)
            .await
        {
            Ok((true, _rev)) => return (StatusCode::CREATED, Json(rec)).into_response(),
            Ok((false, _rev)) => continue,
            Err(e) => return store_error(e),
        }
    }

    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "key_generation_failed",
        "could not allocate a fresh access key",
    )
}

pub async fn keypair_detail(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(access_key): Path<String>,
) -> impl IntoResponse {
    if let Some(resp) = require_role(&ctx, Role::Viewer) {
        return resp;
    }

    match st.store.get(&format!("/stratus/keypairs/{access_key}")).await {
        Ok(Some((value, _rev))) => match serde_json::from_slice::<KeypairRecord>(&value) {
            // the secret only goes out to operators; viewers get the
            // same shape the grid serves
            Ok(rec) if ctx.role.allows(Role::Operator) => {
                (StatusCode::OK, Json(rec)).into_response()
            }
            Ok(rec) => (StatusCode::OK, Json(KeypairView::from_record(&rec))).into_response(),
            Err(e) => error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "decode_error",
                &format!("stored keypair record is invalid: {e}"),
            ),
        },
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            "keypair_not_found",
            &format!("no keypair with access key '{access_key}'"),
        ),
        Err(e) => store_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct PatchKeypairRequest {
    pub is_active: Option<bool>,
    pub is_admin: Option<bool>,
    pub rate_limit: Option<u32>,
    pub resource_policy: Option<String>,
}

pub async fn keypair_patch(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(access_key): Path<String>,
    Json(req): Json<PatchKeypairRequest>,
) -> impl IntoResponse {
    if let Some(resp) = require_role(&ctx, Role::Operator) {
        return resp;
    }

    let key = format!("/stratus/keypairs/{access_key}");
    let (value, revision) = match st.store.get(&key).await {
        Ok(Some(found)) => found,
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                "keypair_not_found",
                &format!("no keypair with access key '{access_key}'"),
            );
        }
        Err(e) => return store_error(e),
    };

    let mut rec: KeypairRecord = match serde_json::from_slice(&value) {
        Ok(rec) => rec,
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "decode_error",
                &format!("stored keypair record is invalid: {e}"),
            );
        }
    };

    if let Some(active) = req.is_active {
        rec.is_active = active;
    }
    if let Some(admin) = req.is_admin {
        rec.is_admin = admin;
    }
    if let Some(limit) = req.rate_limit {
        rec.rate_limit = limit;
    }
    if let Some(policy) = req.resource_policy {
        rec.resource_policy = policy;
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

    match st.store.compare_and_swap(&key, revision, encoded).await {
        Ok((true, _rev)) => (StatusCode::OK, Json(KeypairView::from_record(&rec))).into_response(),
        Ok((false, current)) => error_response_with(
            StatusCode::CONFLICT,
            "conflict",
            "keypair changed underneath the request, retry",
            Some(json!({ "current_revision": current })),
        ),
        Err(e) => store_error(e),
    }
}

pub async fn keypair_delete(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(access_key): Path<String>,
) -> impl IntoResponse {
    if let Some(resp) = require_role(&ctx, Role::Operator) {
        return resp;
    }

    let key = format!("/stratus/keypairs/{access_key}");
    match st.store.get(&key).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                "keypair_not_found",
                &format!("no keypair with access key '{access_key}'"),
            );
        }
        Err(e) => return store_error(e),
    }

    match st.store.delete(&key).await {
        Ok(_rev) => Json(json!({ "deleted": true, "access_key": access_key })).into_response(),
        Err(e) => store_error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_state;
    use stratus_meta::MemoryMetaStore;

    fn ctx(role: Role) -> AuthContext {
        AuthContext {
            principal: "test".into(),
            role,
        }
    }

    #[test]
    fn generated_keys_have_expected_shape() {
        let (ak, sk) = generate_keypair();
        assert!(ak.starts_with("AKIA"));
        assert_eq!(ak.len(), 20);
        assert_eq!(sk.len(), 40);
        assert!(ak.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn create_then_patch_then_delete() {
        let st = test_state(MemoryMetaStore::new());

        let resp = keypair_create(
            State(st.clone()),
            Extension(ctx(Role::Operator)),
            Json(CreateKeypairRequest {
                user_id: "dev@example.com".into(),
                is_admin: false,
                resource_policy: None,
                rate_limit: None,
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let keypairs = list_keypairs(st.store.as_ref()).await.unwrap();
        assert_eq!(keypairs.len(), 1);
        let ak = keypairs[0].access_key.clone();
        assert_eq!(keypairs[0].resource_policy, "default");

        let resp = keypair_patch(
            State(st.clone()),
            Extension(ctx(Role::Operator)),
            Path(ak.clone()),
            Json(PatchKeypairRequest {
                is_active: Some(false),
                is_admin: None,
                rate_limit: Some(50),
                resource_policy: None,
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let (value, _rev) = st
            .store
            .get(&format!("/stratus/keypairs/{ak}"))
            .await
            .unwrap()
            .unwrap();
        let stored: KeypairRecord = serde_json::from_slice(&value).unwrap();
        assert!(!stored.is_active);
        assert_eq!(stored.rate_limit, 50);
        assert_eq!(stored.user_id, "dev@example.com");

        let resp = keypair_delete(
            State(st.clone()),
            Extension(ctx(Role::Operator)),
            Path(ak.clone()),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(st
            .store
            .get(&format!("/stratus/keypairs/{ak}"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn create_rejects_empty_user() {
        let st = test_state(MemoryMetaStore::new());
        let resp = keypair_create(
            State(st),
            Extension(ctx(Role::Operator)),
            Json(CreateKeypairRequest {
                user_id: "  ".into(),
                is_admin: false,
                resource_policy: None,
                rate_limit: None,
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_missing_keypair_is_not_found() {
        let st = test_state(MemoryMetaStore::new());
        let resp = keypair_delete(
            State(st),
            Extension(ctx(Role::Operator)),
            Path("AKIAMISSING000000000".into()),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn detail_hides_secret_from_viewers() {
        let st = test_state(MemoryMetaStore::new());
        keypair_create(
            State(st.clone()),
            Extension(ctx(Role::Operator)),
            Json(CreateKeypairRequest {
                user_id: "dev@example.com".into(),
                is_admin: false,
                resource_policy: None,
                rate_limit: None,
            }),
        )
        .await
        .into_response();
        let ak = list_keypairs(st.store.as_ref()).await.unwrap()[0]
            .access_key
            .clone();

        let resp = keypair_detail(
            State(st.clone()),
            Extension(ctx(Role::Viewer)),
            Path(ak.clone()),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let view: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(view.get("secret_key").is_none());
        assert_eq!(view["access_key"], json!(ak));

        let resp = keypair_detail(State(st), Extension(ctx(Role::Operator)), Path(ak))
            .await
            .into_response();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let full: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(full["secret_key"].as_str().unwrap().len(), 40);
    }
}
