//! # Telemetry
//!
//! Structured logging through `tracing`, with optional OpenTelemetry export.
//!
//! Logs always go to stderr so stdout carries nothing but transcripts. When
//! `OTEL_EXPORTER_OTLP_ENDPOINT` is set, scenario and step spans are also
//! exported over OTLP/gRPC.
//!
//! ## Environment
//!
//! - `RUST_LOG`: log filter (default `info`)
//! - `OTEL_SERVICE_NAME`: service name on exported spans (default `ui-harness`)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: collector URL, e.g. `http://localhost:4317`
//! - `OTEL_TRACES_SAMPLER_ARG`: sampling ratio between 0.0 and 1.0
//!
//! [`shutdown_telemetry`] must run before exit, otherwise batched spans are lost.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::runtime::Tokio;
use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler, Tracer, TracerProvider};
use opentelemetry_sdk::{trace as sdktrace, Resource};
use tracing::Level;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const SERVICE_NAME: &str = "ui-harness";

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    /// OTLP collector; `None` means console logging only.
    pub otlp_endpoint: Option<String>,
    pub sampling_ratio: f64,
    pub log_level: Level,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: SERVICE_NAME.to_string(),
            otlp_endpoint: None,
            sampling_ratio: 1.0,
            log_level: Level::INFO,
        }
    }
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(name) = lookup("OTEL_SERVICE_NAME").filter(|s| !s.is_empty()) {
            config.service_name = name;
        }
        config.otlp_endpoint = lookup("OTEL_EXPORTER_OTLP_ENDPOINT").filter(|s| !s.is_empty());
        if let Some(ratio) = lookup("OTEL_TRACES_SAMPLER_ARG").and_then(|r| r.parse::<f64>().ok()) {
            config.sampling_ratio = ratio.clamp(0.0, 1.0);
        }

        config
    }

    /// `--verbose` raises the default level; `RUST_LOG` still wins.
    pub fn verbose(mut self, verbose: bool) -> Self {
        if verbose {
            self.log_level = Level::DEBUG;
        }
        self
    }
}

// ============================================================================
// INITIALIZATION
// ============================================================================

/// Installs the global subscriber. Returns the tracer when OTLP export is on.
pub fn init_telemetry(config: TelemetryConfig) -> anyhow::Result<Option<Tracer>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    match &config.otlp_endpoint {
        Some(endpoint) => {
            let tracer = init_otlp_tracer(&config.service_name, endpoint, config.sampling_ratio)?;
            tracing_subscriber::registry()
                .with(env_filter)
                .with(OpenTelemetryLayer::new(tracer.clone()))
                .with(console_layer())
                .try_init()?;

            tracing::info!(
                service_name = %config.service_name,
                endpoint = %endpoint,
                sampling_ratio = config.sampling_ratio,
                "OTLP span export enabled"
            );
            Ok(Some(tracer))
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer())
                .try_init()?;
            Ok(None)
        }
    }
}

/// Compact lines on stderr. Generic over the subscriber so each branch of
/// [`init_telemetry`] gets a layer typed for its own stack.
fn console_layer<S>() -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
}

fn sampler_for(ratio: f64) -> Sampler {
    if ratio >= 1.0 {
        Sampler::AlwaysOn
    } else if ratio <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::TraceIdRatioBased(ratio)
    }
}

fn init_otlp_tracer(
    service_name: &str,
    endpoint: &str,
    sampling_ratio: f64,
) -> anyhow::Result<Tracer> {
    let tracer_provider = TracerProvider::builder()
        .with_batch_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint)
                .build_span_exporter()?,
            Tokio,
        )
        .with_config(
            sdktrace::Config::default()
                .with_sampler(sampler_for(sampling_ratio))
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(Resource::new(vec![KeyValue::new(
                    "service.name",
                    service_name.to_string(),
                )])),
        )
        .build();

    let tracer = tracer_provider.tracer(service_name.to_string());
    global::set_tracer_provider(tracer_provider);

    Ok(tracer)
}

/// Flushes pending spans.
pub fn shutdown_telemetry() {
    global::shutdown_tracer_provider();
}
