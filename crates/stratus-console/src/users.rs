use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use stratus_common::auth::{require_role, AuthContext, Role};
use stratus_common::{AccountRole, UserRecord, UserSettings};
use stratus_meta::MetaStore;

use crate::handlers::{error_response, error_response_with, rfc3339_ms, store_error};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    pub user_id: String,
    pub email: String,
    pub full_name: String,
    pub role: AccountRole,
    pub is_active: bool,
    pub created_at: String,
}

impl UserView {
    fn from_record(rec: &UserRecord) -> Self {
        UserView {
            user_id: rec.user_id.clone(),
            email: rec.email.clone(),
            full_name: rec.full_name.clone(),
            role: rec.role,
            is_active: rec.is_active,
            created_at: rfc3339_ms(rec.created_at_ms),
        }
    }
}

pub async fn users_list(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> impl IntoResponse {
    if let Some(resp) = require_role(&ctx, Role::Viewer) {
        return resp;
    }

    let raw = match st.store.list_prefix("/stratus/users/").await {
        Ok(raw) => raw,
        Err(e) => return store_error(e),
    };

    let mut views = Vec::new();
    for (_k, v, _rev) in raw {
        if let Ok(rec) = serde_json::from_slice::<UserRecord>(&v) {
            views.push(UserView::from_record(&rec));
        }
    }
    Json(json!({ "users": views, "total": views.len() })).into_response()
}

pub async fn user_detail(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    if let Some(resp) = require_role(&ctx, Role::Viewer) {
        return resp;
    }

    match st.store.get(&format!("/stratus/users/{user_id}")).await {
        Ok(Some((value, _rev))) => match serde_json::from_slice::<UserRecord>(&value) {
            Ok(rec) => (StatusCode::OK, Json(UserView::from_record(&rec))).into_response(),
            Err(e) => error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "decode_error",
                &format!("stored user record is invalid: {e}"),
            ),
        },
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            "user_not_found",
            &format!("no user '{user_id}'"),
        ),
        Err(e) => store_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct PatchUserRequest {
    pub full_name: Option<String>,
    pub role: Option<AccountRole>,
    pub is_active: Option<bool>,
}

pub async fn user_patch(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(user_id): Path<String>,
    Json(req): Json<PatchUserRequest>,
) -> impl IntoResponse {
    if let Some(resp) = require_role(&ctx, Role::Admin) {
        return resp;
    }

    let key = format!("/stratus/users/{user_id}");
    let (value, revision) = match st.store.get(&key).await {
        Ok(Some(found)) => found,
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                "user_not_found",
                &format!("no user '{user_id}'"),
            );
        }
        Err(e) => return store_error(e),
    };

    let mut rec: UserRecord = match serde_json::from_slice(&value) {
        Ok(rec) => rec,
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "decode_error",
                &format!("stored user record is invalid: {e}"),
            );
        }
    };

    if let Some(full_name) = req.full_name {
        rec.full_name = full_name;
    }
    if let Some(role) = req.role {
        rec.role = role;
    }
    if let Some(active) = req.is_active {
        rec.is_active = active;
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
        Ok((true, _rev)) => (StatusCode::OK, Json(UserView::from_record(&rec))).into_response(),
        Ok((false, current)) => error_response_with(
            StatusCode::CONFLICT,
            "conflict",
            "user changed underneath the request, retry",
            Some(json!({ "current_revision": current })),
        ),
        Err(e) => store_error(e),
    }
}

async fn load_settings(st: &AppState, user_id: &str) -> Result<UserSettings, axum::response::Response> {
    match st
        .store
        .get(&format!("/stratus/user_settings/{user_id}"))
        .await
    {
        Ok(Some((value, _rev))) => match serde_json::from_slice(&value) {
            Ok(settings) => Ok(settings),
            Err(e) => Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "decode_error",
                &format!("stored settings are invalid: {e}"),
            )),
        },
        // No record yet: every account starts from the defaults.
        Ok(None) => Ok(UserSettings::default()),
        Err(e) => Err(store_error(e)),
    }
}

pub async fn user_settings_get(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    if let Some(resp) = require_role(&ctx, Role::Viewer) {
        return resp;
    }

    match load_settings(&st, &user_id).await {
        Ok(settings) => (StatusCode::OK, Json(settings)).into_response(),
        Err(resp) => resp,
    }
}

#[derive(Debug, Deserialize)]
pub struct PatchSettingsRequest {
    pub desktop_notification: Option<bool>,
    pub compact_sidebar: Option<bool>,
    pub language: Option<String>,
    pub auto_logout: Option<bool>,
    pub polling_interval_secs: Option<u64>,
}

pub async fn user_settings_put(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(user_id): Path<String>,
    Json(req): Json<PatchSettingsRequest>,
) -> impl IntoResponse {
    if let Some(resp) = require_role(&ctx, Role::Operator) {
        return resp;
    }

    if let Some(0) = req.polling_interval_secs {
        return error_response(
            StatusCode::BAD_REQUEST,
            "invalid_interval",
            "polling_interval_secs must be at least 1",
        );
    }

    let mut settings = match load_settings(&st, &user_id).await {
        Ok(settings) => settings,
        Err(resp) => return resp,
    };

    if let Some(v) = req.desktop_notification {
        settings.desktop_notification = v;
    }
    if let Some(v) = req.compact_sidebar {
        settings.compact_sidebar = v;
    }
    if let Some(v) = req.language {
        settings.language = v;
    }
    if let Some(v) = req.auto_logout {
        settings.auto_logout = v;
    }
    if let Some(v) = req.polling_interval_secs {
        settings.polling_interval_secs = v;
    }

    let encoded = match serde_json::to_vec(&settings) {
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
        .put(&format!("/stratus/user_settings/{user_id}"), encoded, None)
        .await
    {
        Ok(_rev) => (StatusCode::OK, Json(settings)).into_response(),
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

    fn make_user(user_id: &str) -> UserRecord {
        UserRecord {
            user_id: user_id.into(),
            email: format!("{user_id}@example.com"),
            full_name: "Dev Example".into(),
            role: AccountRole::User,
            is_active: true,
            created_at_ms: 1_700_000_000_000,
        }
    }

    #[tokio::test]
    async fn patch_updates_only_named_fields() {
        let st = test_state(MemoryMetaStore::new());
        let user = make_user("u-1");
        st.store
            .put(
                "/stratus/users/u-1",
                serde_json::to_vec(&user).unwrap(),
                None,
            )
            .await
            .unwrap();

        let resp = user_patch(
            State(st.clone()),
            Extension(ctx(Role::Admin)),
            Path("u-1".into()),
            Json(PatchUserRequest {
                full_name: None,
                role: Some(AccountRole::Monitor),
                is_active: None,
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let (value, _rev) = st.store.get("/stratus/users/u-1").await.unwrap().unwrap();
        let stored: UserRecord = serde_json::from_slice(&value).unwrap();
        assert_eq!(stored.role, AccountRole::Monitor);
        assert_eq!(stored.full_name, "Dev Example");
        assert!(stored.is_active);
    }

    #[tokio::test]
    async fn settings_default_then_partial_update() {
        let st = test_state(MemoryMetaStore::new());

        let resp = user_settings_get(
            State(st.clone()),
            Extension(ctx(Role::Viewer)),
            Path("u-1".into()),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = user_settings_put(
            State(st.clone()),
            Extension(ctx(Role::Operator)),
            Path("u-1".into()),
            Json(PatchSettingsRequest {
                desktop_notification: None,
                compact_sidebar: Some(true),
                language: None,
                auto_logout: None,
                polling_interval_secs: Some(30),
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let (value, _rev) = st
            .store
            .get("/stratus/user_settings/u-1")
            .await
            .unwrap()
            .unwrap();
        let stored: UserSettings = serde_json::from_slice(&value).unwrap();
        assert!(stored.compact_sidebar);
        assert!(stored.desktop_notification);
        assert_eq!(stored.language, "en");
        assert_eq!(stored.polling_interval_secs, 30);
    }

    #[tokio::test]
    async fn settings_reject_zero_interval() {
        let st = test_state(MemoryMetaStore::new());
        let resp = user_settings_put(
            State(st),
            Extension(ctx(Role::Operator)),
            Path("u-1".into()),
            Json(PatchSettingsRequest {
                desktop_notification: None,
                compact_sidebar: None,
                language: None,
                auto_logout: None,
                polling_interval_secs: Some(0),
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
