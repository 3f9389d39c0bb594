use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{header, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tokio::sync::Mutex;

/// Privilege levels for console tokens, weakest first. Viewers read the
/// grids, operators drive session and credential lifecycle, admins edit
/// policies, manage accounts, and run maintenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    Viewer,
    Operator,
    Admin,
}

impl Role {
    pub fn allows(self, required: Role) -> bool {
        self >= required
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Operator => "operator",
            Role::Admin => "admin",
        }
    }

    /// The weakest role a request needs before any handler-level check:
    /// reads are viewer territory, anything that mutates starts at
    /// operator. Handlers raise the bar where they need to.
    pub fn floor_for(method: &Method) -> Role {
        if method == Method::GET || method == Method::HEAD {
            Role::Viewer
        } else {
            Role::Operator
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "viewer" => Ok(Role::Viewer),
            "operator" => Ok(Role::Operator),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// Identity resolved by the middleware, handed to handlers as a request
/// extension.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub principal: String,
    pub role: Role,
}

/// Fixed one-minute windows, one per token. A window resets on the first
/// request past its minute; partial windows never carry over.
#[derive(Debug)]
pub struct RateLimiter {
    per_minute: u64,
    windows: Mutex<HashMap<String, Window>>,
}

#[derive(Debug)]
struct Window {
    opened: Instant,
    count: u64,
}

impl RateLimiter {
    pub fn new(per_minute: u64) -> Self {
        RateLimiter {
            per_minute,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Count one request against `token`. A `per_minute` of zero means no
    /// limit at all.
    pub async fn admit(&self, token: &str) -> bool {
        if self.per_minute == 0 {
            return true;
        }
        let mut windows = self.windows.lock().await;
        let now = Instant::now();
        let window = windows.entry(token.to_string()).or_insert(Window {
            opened: now,
            count: 0,
        });
        if now.duration_since(window.opened) >= Duration::from_secs(60) {
            window.opened = now;
            window.count = 0;
        }
        if window.count >= self.per_minute {
            return false;
        }
        window.count += 1;
        true
    }
}

/// The console's token table plus its limiter. Without a table the
/// console runs open and every request acts as admin; that mode is for
/// single-user setups only.
#[derive(Clone)]
pub struct AuthConfig {
    enabled: bool,
    tokens: Arc<HashMap<String, Role>>,
    limiter: Arc<RateLimiter>,
}

impl AuthConfig {
    pub fn disabled() -> Self {
        AuthConfig {
            enabled: false,
            tokens: Arc::new(HashMap::new()),
            limiter: Arc::new(RateLimiter::new(0)),
        }
    }

    pub fn with_tokens<I>(entries: I, per_minute: u64) -> Self
    where
        I: IntoIterator<Item = (String, Role)>,
    {
        AuthConfig {
            enabled: true,
            tokens: Arc::new(entries.into_iter().collect()),
            limiter: Arc::new(RateLimiter::new(per_minute)),
        }
    }

    /// `STRATUS_AUTH_TOKENS` is a comma-separated `token:role` list;
    /// entries that do not parse are skipped with a warning.
    /// `STRATUS_AUTH_RATE_LIMIT_PER_MINUTE` caps each token (default 120,
    /// 0 disables the limiter).
    pub fn from_env() -> Self {
        let Ok(raw) = std::env::var("STRATUS_AUTH_TOKENS") else {
            tracing::warn!("auth disabled: STRATUS_AUTH_TOKENS not set");
            return AuthConfig::disabled();
        };

        let mut entries = Vec::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            match entry.split_once(':') {
                Some((token, role)) => match role.parse::<Role>() {
                    Ok(role) => entries.push((token.to_string(), role)),
                    Err(e) => tracing::warn!(entry, "skipping token entry: {e}"),
                },
                None => tracing::warn!(entry, "skipping token entry: expected token:role"),
            }
        }

        let per_minute = std::env::var("STRATUS_AUTH_RATE_LIMIT_PER_MINUTE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(120);

        AuthConfig::with_tokens(entries, per_minute)
    }
}

/// Layered over every protected route. Resolves the presented token to a
/// role, applies the per-token rate limit and the method floor, and
/// stashes an [`AuthContext`] for handlers to refine.
pub async fn auth_middleware<S>(
    State(state): State<S>,
    mut req: Request<Body>,
    next: Next,
) -> Response
where
    S: AsRef<AuthConfig> + Clone + Send + Sync + 'static,
{
    let auth = state.as_ref();

    if !auth.enabled {
        req.extensions_mut().insert(AuthContext {
            principal: "local".into(),
            role: Role::Admin,
        });
        return next.run(req).await;
    }

    let Some(token) = presented_token(&req) else {
        return auth_error(StatusCode::UNAUTHORIZED, "missing bearer token");
    };
    let Some(role) = auth.tokens.get(&token).copied() else {
        return auth_error(StatusCode::FORBIDDEN, "unknown token");
    };
    if !auth.limiter.admit(&token).await {
        return auth_error(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded");
    }
    if !role.allows(Role::floor_for(req.method())) {
        return auth_error(StatusCode::FORBIDDEN, "token is read-only");
    }

    req.extensions_mut().insert(AuthContext {
        principal: token,
        role,
    });
    next.run(req).await
}

fn presented_token(req: &Request<Body>) -> Option<String> {
    let bearer = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match bearer {
        Some(token) => Some(token.to_string()),
        None => req
            .headers()
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    }
}

/// `None` when `ctx` is strong enough, otherwise the 403 to return.
pub fn require_role(ctx: &AuthContext, required: Role) -> Option<Response> {
    if ctx.role.allows(required) {
        None
    } else {
        Some(auth_error(StatusCode::FORBIDDEN, "insufficient role"))
    }
}

fn auth_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": { "message": message } }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_order_by_privilege() {
        assert!(Role::Admin.allows(Role::Viewer));
        assert!(Role::Admin.allows(Role::Admin));
        assert!(Role::Operator.allows(Role::Viewer));
        assert!(!Role::Operator.allows(Role::Admin));
        assert!(Role::Viewer.allows(Role::Viewer));
        assert!(!Role::Viewer.allows(Role::Operator));
    }

    #[test]
    fn role_parsing_is_case_insensitive() {
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("viewer".parse::<Role>().unwrap(), Role::Viewer);
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn method_floor_guards_mutations() {
        assert_eq!(Role::floor_for(&Method::GET), Role::Viewer);
        assert_eq!(Role::floor_for(&Method::HEAD), Role::Viewer);
        assert_eq!(Role::floor_for(&Method::POST), Role::Operator);
        assert_eq!(Role::floor_for(&Method::DELETE), Role::Operator);
    }

    #[tokio::test]
    async fn limiter_caps_each_token_per_window() {
        let limiter = RateLimiter::new(2);
        assert!(limiter.admit("a").await);
        assert!(limiter.admit("a").await);
        assert!(!limiter.admit("a").await);
        // other tokens have their own window
        assert!(limiter.admit("b").await);
    }

    #[tokio::test]
    async fn zero_limit_admits_everything() {
        let limiter = RateLimiter::new(0);
        for _ in 0..500 {
            assert!(limiter.admit("a").await);
        }
    }
}
