//! Observability wiring for the binary.
//!
//! A fmt layer (plain or JSON lines) is always installed; an OpenTelemetry
//! OTLP span exporter is added when an endpoint is configured. The provider
//! handle is returned so `main` can flush spans before the process exits —
//! the runs are short-lived, so relying on batch-export timing would drop
//! the tail of every run.

use anyhow::{Context, Result};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace as sdktrace;
use opentelemetry_sdk::Resource;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Handle over the installed telemetry stack.
pub struct Telemetry {
    provider: Option<sdktrace::TracerProvider>,
}

impl Telemetry {
    /// Flush and shut down the span exporter, if one was installed.
    pub fn shutdown(self) {
        if let Some(provider) = self.provider {
            if let Err(err) = provider.shutdown() {
                eprintln!("runner-checkout: failed to flush spans: {err}");
            }
        }
    }
}

/// Install the global subscriber: env-filtered fmt layer plus an optional
/// OTLP layer.
pub fn init(json: bool, otlp_endpoint: Option<&str>) -> Result<Telemetry> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let provider = otlp_endpoint
        .map(|endpoint| {
            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint)
                .build()
                .context("failed to build OTLP span exporter")?;
            Ok::<_, anyhow::Error>(
                sdktrace::TracerProvider::builder()
                    .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
                    .with_resource(Resource::new(vec![KeyValue::new(
                        "service.name",
                        "runner-checkout",
                    )]))
                    .build(),
            )
        })
        .transpose()?;

    let otel_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("runner-checkout")));

    let (plain_layer, json_layer) = if json {
        (None, Some(tracing_subscriber::fmt::layer().json()))
    } else {
        (Some(tracing_subscriber::fmt::layer().with_target(false)), None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(plain_layer)
        .with(json_layer)
        .with(otel_layer)
        .init();

    Ok(Telemetry { provider })
}
