use serde::{Deserialize, Serialize};

/// Console account role. Distinct from the API-token roles: this is what
/// the account record says, not what a bearer token grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountRole {
    Superadmin,
    Admin,
    User,
    Monitor,
}

impl Default for AccountRole {
    fn default() -> Self {
        AccountRole::User
    }
}

/// One console account, stored under `/stratus/users/{user_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    pub email: String,

    #[serde(default)]
    pub full_name: String,

    #[serde(default)]
    pub role: AccountRole,

    #[serde(default = "default_true")]
    pub is_active: bool,

    #[serde(default)]
    pub created_at_ms: u64,
}

fn default_true() -> bool {
    true
}

/// Per-account console preferences, stored under
/// `/stratus/user_settings/{user_id}` so the account listing never
/// sweeps them up. Updates are partial: absent fields keep their
/// previous values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    #[serde(default = "default_true")]
    pub desktop_notification: bool,

    #[serde(default)]
    pub compact_sidebar: bool,

    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default)]
    pub auto_logout: bool,

    /// Seconds between console grid refreshes.
    #[serde(default = "default_polling_interval")]
    pub polling_interval_secs: u64,
}

impl Default for UserSettings {
    fn default() -> Self {
        UserSettings {
            desktop_notification: true,
            compact_sidebar: false,
            language: default_language(),
            auto_logout: false,
            polling_interval_secs: default_polling_interval(),
        }
    }
}

fn default_language() -> String {
    "en".to_string()
}

fn default_polling_interval() -> u64 {
    15
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_defaults_fill_missing_fields() {
        let s: UserSettings = serde_json::from_str(r#"{"compact_sidebar":true}"#).unwrap();
        assert!(s.desktop_notification);
        assert!(s.compact_sidebar);
        assert_eq!(s.language, "en");
        assert_eq!(s.polling_interval_secs, 15);
    }

    #[test]
    fn account_role_defaults_to_user() {
        let raw = r#"{"user_id":"u-1","email":"dev@example.com"}"#;
        let u: UserRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(u.role, AccountRole::User);
        assert!(u.is_active);
    }
}
