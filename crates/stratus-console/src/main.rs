mod agents;
mod args;
mod export;
mod handlers;
mod keypairs;
mod maintenance;
mod metrics;
mod policies;
mod poll;
mod sessions;
mod state;
mod usage_report;
mod users;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use clap::Parser;

use stratus_common::auth::{auth_middleware, AuthConfig};
use stratus_common::telemetry::{OtlpSettings, Telemetry};
use stratus_meta::{EtcdMetaStore, MemoryMetaStore, MetaStore};

use crate::args::Args;
use crate::handlers::{healthz, summary, whoami};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let otlp = args.otlp_endpoint.clone().map(|endpoint| OtlpSettings {
        endpoint,
        token: args.otlp_token.clone(),
    });
    let telemetry = Telemetry::init("stratus-console", otlp);

    let store: Arc<dyn MetaStore> = if args.etcd_endpoint.is_empty() {
        tracing::warn!("ETCD_ENDPOINT not set, using the in-process store (not durable)");
        Arc::new(MemoryMetaStore::new())
    } else {
        Arc::new(EtcdMetaStore::connect(std::slice::from_ref(&args.etcd_endpoint)).await?)
    };

    let auth = AuthConfig::from_env();

    let st = AppState {
        store,
        metrics: Arc::new(metrics::Metrics::default()),
        summary: Arc::new(poll::SummaryCache::new()),
        auth,
        poll_interval_secs: args.poll_interval_secs,
    };

    let poller_state = st.clone();
    tokio::spawn(async move {
        if let Err(e) = poll::summary_poll_loop(poller_state).await {
            tracing::error!(error=%e, "summary poll loop exited");
        }
    });

    let protected_routes = Router::new()
        .route("/whoami", get(whoami))
        .route("/summary", get(summary))
        .route("/agents", get(agents::agents_list))
        .route("/agents/:id", get(agents::agent_detail))
        .route("/sessions", get(sessions::sessions_list))
        .route("/sessions/:id", get(sessions::session_detail))
        .route("/sessions/:id/terminate", post(sessions::session_terminate))
        .route(
            "/keypairs",
            get(keypairs::keypairs_list).post(keypairs::keypair_create),
        )
        .route(
            "/keypairs/:access_key",
            get(keypairs::keypair_detail)
                .patch(keypairs::keypair_patch)
                .delete(keypairs::keypair_delete),
        )
        .route("/keypairs/:access_key/usage", get(usage_report::keypair_usage))
        .route(
            "/resource-policies",
            get(policies::policies_list).post(policies::policy_create),
        )
        .route(
            "/resource-policies/:name",
            get(policies::policy_detail)
                .put(policies::policy_update)
                .delete(policies::policy_delete),
        )
        .route("/users", get(users::users_list))
        .route("/users/:user_id", get(users::user_detail).patch(users::user_patch))
        .route(
            "/users/:user_id/settings",
            get(users::user_settings_get).put(users::user_settings_put),
        )
        .route(
            "/maintenance/recalculate-usage",
            post(maintenance::recalculate_usage),
        )
        .route(
            "/maintenance/purge-terminated-sessions",
            post(maintenance::purge_terminated_sessions),
        )
        .layer(middleware::from_fn_with_state(
            st.clone(),
            auth_middleware::<AppState>,
        ))
        .with_state(st.clone());

    let api_routes = Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics::metrics_handler))
        .with_state(st.clone())
        .merge(protected_routes);

    let app = Router::new().nest("/api", api_routes).layer(
        middleware::from_fn_with_state(st.clone(), metrics::track_requests),
    );

    let listener = tokio::net::TcpListener::bind(&args.listen_addr).await?;
    tracing::info!(addr = %args.listen_addr, "stratus console listening");
    axum::serve(listener, app).await?;

    telemetry.shutdown();
    Ok(())
}
