//! `tracing` subscriber setup.
//!
//! A `fmt` + `EnvFilter` subscriber is always installed, so structured logs
//! exist even without the `telemetry` feature. With the `telemetry` feature
//! enabled, an OTLP trace exporter is layered on top, configured from the
//! standard `OTEL_EXPORTER_OTLP_*` environment variables.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Installs the global `tracing` subscriber. Call once at startup.
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer();

    #[cfg(feature = "telemetry")]
    {
        if let Some(otel_layer) = otel::layer() {
            Registry::default()
                .with(env_filter)
                .with(fmt_layer)
                .with(otel_layer)
                .init();
            return;
        }
    }

    Registry::default().with(env_filter).with(fmt_layer).init();
}

#[cfg(feature = "telemetry")]
mod otel {
    use std::env;

    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_sdk::trace::SdkTracerProvider;
    use tracing_opentelemetry::OpenTelemetryLayer;

    /// Builds an OTLP tracing layer if `OTEL_EXPORTER_OTLP_ENDPOINT` (or a
    /// related `OTEL_*` variable) is configured, otherwise returns `None` so
    /// `init` falls back to plain `fmt` logging.
    pub fn layer<S>() -> Option<OpenTelemetryLayer<S, opentelemetry_sdk::trace::Tracer>>
    where
        S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    {
        let configured = env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok()
            || env::var("OTEL_EXPORTER_OTLP_HEADERS").is_ok();
        if !configured {
            return None;
        }
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .build()
            .ok()?;
        let provider = SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .build();
        let tracer = provider.tracer(env!("CARGO_PKG_NAME"));
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    }
}
