//! Log output for custodyctl
//!
//! Logs go to stderr so table and JSON output on stdout stays pipeable.
//! `RUST_LOG` wins over `--debug`/`--quiet`. With `--otel` (telemetry
//! feature) spans are also shipped to `OTEL_EXPORTER_OTLP_ENDPOINT`.

use anyhow::{anyhow, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "telemetry")]
const SERVICE_NAME: &str = "custodyctl";

#[derive(Debug, Clone, Default)]
pub struct TracingConfig {
    pub debug: bool,
    pub quiet: bool,
    /// Needs the `telemetry` feature; ignored otherwise
    pub otel: bool,
}

impl TracingConfig {
    fn default_level(&self) -> &'static str {
        match (self.debug, self.quiet) {
            (true, _) => "debug",
            (false, true) => "warn",
            (false, false) => "info",
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.default_level()))
    }

    /// Install the global subscriber. Fails if one is already set.
    pub fn init(&self) -> Result<()> {
        let console = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(self.debug)
            .compact();

        let registry = tracing_subscriber::registry()
            .with(self.filter())
            .with(console);

        #[cfg(feature = "telemetry")]
        if self.otel {
            let (layer, endpoint) = otel::layer()?;
            registry.with(layer).try_init().map_err(|err| anyhow!(err))?;
            tracing::info!(%endpoint, service = SERVICE_NAME, "exporting spans over OTLP");
            return Ok(());
        }

        registry.try_init().map_err(|err| anyhow!(err))
    }
}

#[cfg(feature = "telemetry")]
mod otel {
    use anyhow::{anyhow, Result};
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::trace::{Tracer, TracerProvider};
    use tracing_opentelemetry::OpenTelemetryLayer;
    use tracing_subscriber::registry::LookupSpan;

    use super::SERVICE_NAME;

    pub(super) fn layer<S>() -> Result<(OpenTelemetryLayer<S, Tracer>, String)>
    where
        S: tracing::Subscriber + for<'span> LookupSpan<'span>,
    {
        let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
            .unwrap_or_else(|_| "http://localhost:4317".to_string());
        let service =
            std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| SERVICE_NAME.to_string());

        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(&endpoint)
            .build()
            .map_err(|e| anyhow!("OTLP exporter for {endpoint}: {e}"))?;

        let provider = TracerProvider::builder()
            .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
            .with_resource(opentelemetry_sdk::Resource::new(vec![KeyValue::new(
                "service.name",
                service,
            )]))
            .build();
        let tracer = provider.tracer(SERVICE_NAME);
        // Provider must stay registered for the batch exporter to run
        let _ = opentelemetry::global::set_tracer_provider(provider);

        Ok((tracing_opentelemetry::layer().with_tracer(tracer), endpoint))
    }
}

/// Flush spans still queued for export.
pub fn shutdown_otel() {
    #[cfg(feature = "telemetry")]
    opentelemetry::global::shutdown_tracer_provider();
}
