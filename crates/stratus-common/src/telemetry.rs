use std::collections::HashMap;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::{SpanExporter, WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::trace::TracerProvider;
use opentelemetry_sdk::Resource;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Where to ship spans, if anywhere. The exporter speaks OTLP/HTTP and
/// appends `/v1/traces` to the endpoint.
#[derive(Debug, Clone)]
pub struct OtlpSettings {
    pub endpoint: String,
    pub token: Option<String>,
}

/// Handle for the installed tracing stack. Holds the exporting provider,
/// if one was built, so spans flush on shutdown.
pub struct Telemetry {
    provider: Option<TracerProvider>,
}

impl Telemetry {
    /// Install the global subscriber: env-filtered fmt output, plus an
    /// OTLP span pipeline when `otlp` is given. A failed exporter build
    /// degrades to local output instead of aborting startup.
    pub fn init(service_name: &str, otlp: Option<OtlpSettings>) -> Telemetry {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let fmt_layer = tracing_subscriber::fmt::layer();

        let provider = otlp.and_then(|settings| {
            let mut headers = HashMap::new();
            if let Some(token) = settings.token.as_deref().filter(|t| !t.is_empty()) {
                headers.insert("Authorization".to_string(), format!("Bearer {token}"));
            }
            let exporter = SpanExporter::builder()
                .with_http()
                .with_endpoint(settings.endpoint.as_str())
                .with_headers(headers)
                .build();
            match exporter {
                Ok(exporter) => Some(
                    TracerProvider::builder()
                        .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
                        .with_resource(Resource::new([KeyValue::new(
                            "service.name",
                            service_name.to_string(),
                        )]))
                        .build(),
                ),
                Err(err) => {
                    eprintln!("otlp exporter unavailable ({err}), spans stay local");
                    None
                }
            }
        });

        match &provider {
            Some(provider) => {
                let otel_layer = tracing_opentelemetry::layer()
                    .with_tracer(provider.tracer(service_name.to_string()));
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer)
                    .with(otel_layer)
                    .init();
                tracing::info!(service_name, "span export enabled");
            }
            None => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer)
                    .init();
            }
        }

        Telemetry { provider }
    }

    /// Flush and drop the span pipeline. A no-op without OTLP.
    pub fn shutdown(self) {
        if let Some(provider) = self.provider {
            let _ = provider.shutdown();
        }
    }
}
