use serde::{Deserialize, Serialize};

/// One API credential, stored under `/stratus/keypairs/{access_key}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeypairRecord {
    pub access_key: String,
    pub secret_key: String,

    /// Owning user id (email form).
    pub user_id: String,

    #[serde(default = "default_true")]
    pub is_active: bool,

    #[serde(default)]
    pub is_admin: bool,

    /// Name of the resource policy applied to this credential.
    #[serde(default = "default_policy")]
    pub resource_policy: String,

    /// API calls allowed per rate window.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,

    #[serde(default)]
    pub num_queries: u64,

    /// Sessions currently counted against the concurrency limit.
    /// Maintained by the session lifecycle and repaired by the
    /// recalculation maintenance action.
    #[serde(default)]
    pub concurrency_used: u32,

    #[serde(default)]
    pub created_at_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_policy() -> String {
    "default".to_string()
}

fn default_rate_limit() -> u32 {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_sparse_records() {
        let raw = r#"{
            "access_key": "AKEXAMPLE00000000000",
            "secret_key": "sk-secret",
            "user_id": "dev@example.com"
        }"#;
        let kp: KeypairRecord = serde_json::from_str(raw).unwrap();
        assert!(kp.is_active);
        assert!(!kp.is_admin);
        assert_eq!(kp.resource_policy, "default");
        assert_eq!(kp.rate_limit, 10_000);
        assert_eq!(kp.concurrency_used, 0);
    }
}
