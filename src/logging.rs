use crate::config::{LogFormat, LogSettings};
use crate::errors::Error;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{Tracer, TracerProvider};
use opentelemetry_sdk::{trace, Resource};
use std::env;
use tracing::info;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry};

const SERVICE_NAME: &str = "cctl";

/// Create a tracing_subscriber layer which exports traces to the given OTLP endpoint.
/// In addition to the tracing_subscriber layer, it also returns a TracerProvider which should be
/// kept in scope in order for the exporter to stay alive. Dropping that will cause the exporter
/// to silenty stop sending traces
fn setup_otlp_layer(
    endpoint: &str,
) -> Result<(TracerProvider, OpenTelemetryLayer<Registry, Tracer>), Error> {
    let otlp_exporter = opentelemetry_otlp::new_exporter()
        .http()
        .with_endpoint(endpoint)
        .build_span_exporter()?;

    let provider = TracerProvider::builder()
        .with_simple_exporter(otlp_exporter)
        .with_config(
            trace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", SERVICE_NAME),
                KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            ])),
        )
        .build();

    let tracer = provider.tracer(SERVICE_NAME);
    let layer = tracing_opentelemetry::layer().with_tracer(tracer);

    Ok((provider, layer))
}

/// `RUST_LOG` when set, otherwise `info` (or `debug` with `--debug`).
fn env_filter(debug: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "info" }))
}

/// Install the global subscriber. Logs go to stderr so command output on
/// stdout stays machine readable.
pub fn setup_tracing(settings: &LogSettings) -> Result<Option<TracerProvider>, Error> {
    let console_layer = match settings.format {
        LogFormat::Console => tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_filter(env_filter(settings.debug))
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(env_filter(settings.debug))
            .boxed(),
    };

    let subscriber = Registry::default();
    let mut layers = Vec::new();

    let mut provider = None;
    let endpoint = env::var("OTLP_ENDPOINT").ok().filter(|e| !e.is_empty());
    if let Some(endpoint) = &endpoint {
        let (tracer_provider, exporter_layer) = setup_otlp_layer(endpoint)?;
        layers.push(
            exporter_layer
                .with_filter(env_filter(settings.debug))
                .boxed(),
        );
        provider = Some(tracer_provider);
    }
    layers.push(console_layer);
    tracing::subscriber::set_global_default(subscriber.with(layers))?;

    if let Some(endpoint) = endpoint {
        info!(%endpoint, "Exporting traces over OTLP");
    }
    Ok(provider)
}
