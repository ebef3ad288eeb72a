use tracing_subscriber::{fmt, EnvFilter};

const OTLP_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

pub fn init_logging(default_level: &str) {
    if tracing::dispatcher::has_been_set() {
        return;
    }

    fmt()
        .with_env_filter(env_filter(default_level))
        .with_writer(std::io::stderr)
        .init();
}

/// Installs the stderr subscriber and, when `OTEL_EXPORTER_OTLP_ENDPOINT` is
/// set, an OTLP span exporter tagged with `service`.
#[cfg(feature = "otel")]
pub fn init_tracing(service: &str, default_level: &str) {
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::{runtime, trace, Resource};
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    if tracing::dispatcher::has_been_set() {
        return;
    }

    let endpoint = match std::env::var(OTLP_ENDPOINT_ENV) {
        Ok(endpoint) if !endpoint.trim().is_empty() => endpoint,
        _ => return init_logging(default_level),
    };

    let installed = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint.clone()),
        )
        .with_trace_config(trace::config().with_resource(Resource::new(vec![KeyValue::new(
            "service.name",
            service.to_string(),
        )])))
        .install_batch(runtime::Tokio);

    match installed {
        Ok(tracer) => {
            tracing_subscriber::registry()
                .with(env_filter(default_level))
                .with(fmt::layer().with_writer(std::io::stderr))
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .init();
            tracing::info!(service, endpoint = %endpoint, "otlp tracing enabled");
        }
        Err(err) => {
            init_logging(default_level);
            tracing::warn!(service, error = %err, "failed to install otlp pipeline");
        }
    }
}

#[cfg(not(feature = "otel"))]
pub fn init_tracing(_service: &str, default_level: &str) {
    let _ = OTLP_ENDPOINT_ENV;
    init_logging(default_level);
}

pub fn shutdown_tracer_provider() {
    #[cfg(feature = "otel")]
    opentelemetry::global::shutdown_tracer_provider();
}
