use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::state::AppState;

/// Counters for the console's own surface. Exposition is the plain
/// Prometheus text format; the set is fixed, so there is no registry.
#[derive(Debug, Default)]
pub struct Metrics {
    pub requests: AtomicU64,
    pub inflight: AtomicU64,
    pub client_errors: AtomicU64,
    pub server_errors: AtomicU64,
    pub csv_exports: AtomicU64,
    pub summary_refreshes: AtomicU64,
    pub summary_refresh_failures: AtomicU64,
}

impl Metrics {
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (name, value) in [
            ("stratus_console_requests_total", &self.requests),
            ("stratus_console_requests_inflight", &self.inflight),
            ("stratus_console_client_errors_total", &self.client_errors),
            ("stratus_console_server_errors_total", &self.server_errors),
            ("stratus_console_csv_exports_total", &self.csv_exports),
            (
                "stratus_console_summary_refreshes_total",
                &self.summary_refreshes,
            ),
            (
                "stratus_console_summary_refresh_failures_total",
                &self.summary_refresh_failures,
            ),
        ] {
            out.push_str(name);
            out.push(' ');
            out.push_str(&value.load(Ordering::Relaxed).to_string());
            out.push('\n');
        }
        out
    }
}

pub async fn metrics_handler(State(st): State<AppState>) -> impl IntoResponse {
    st.metrics.render()
}

/// Outermost layer: counts every request, classifies error responses, and
/// logs the served line with its latency.
pub async fn track_requests(State(st): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    st.metrics.inflight.fetch_add(1, Ordering::Relaxed);
    let resp = next.run(req).await;
    st.metrics.inflight.fetch_sub(1, Ordering::Relaxed);
    st.metrics.requests.fetch_add(1, Ordering::Relaxed);

    let status = resp.status();
    if status.is_server_error() {
        st.metrics.server_errors.fetch_add(1, Ordering::Relaxed);
    } else if status.is_client_error() {
        st.metrics.client_errors.fetch_add(1, Ordering::Relaxed);
    }

    tracing::debug!(
        %method,
        path = %path,
        status = status.as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request served"
    );
    resp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_lists_every_counter() {
        let m = Metrics::default();
        m.requests.fetch_add(3, Ordering::Relaxed);
        m.csv_exports.fetch_add(1, Ordering::Relaxed);

        let text = m.render();
        assert!(text.contains("stratus_console_requests_total 3"));
        assert!(text.contains("stratus_console_csv_exports_total 1"));
        assert!(text.contains("stratus_console_summary_refreshes_total 0"));
        assert_eq!(text.lines().count(), 7);
    }
}
