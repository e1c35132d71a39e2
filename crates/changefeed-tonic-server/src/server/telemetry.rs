//! Log output and optional OpenTelemetry export.
//!
//! Console logging through `tracing_subscriber::fmt` is always on and
//! filtered by `RUST_LOG` (default `info`). The `tracing` and `metrics`
//! features add span and metric pipelines; `stdout` and `honeycomb` pick
//! where they are exported and may be combined.
//!
//! ```bash
//! cargo run -p changefeed-tonic-server --features tracing,metrics,stdout
//! ```
//!
//! Honeycomb export reads `HONEYCOMB_API_KEY`, `HONEYCOMB_DATASET`,
//! `HONEYCOMB_ENDPOINT` and `HONEYCOMB_COMPRESSION`.

#[cfg(all(
    any(feature = "honeycomb", feature = "stdout"),
    not(any(feature = "tracing", feature = "metrics"))
))]
compile_error!("Exporters require at least one of the 'tracing' or 'metrics' features.");

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry_semantic_conventions as semvcns;

#[cfg(feature = "metrics")]
use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::metrics as sdkmetrics;
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

#[cfg(feature = "tracing")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "tracing")]
use opentelemetry_sdk::trace as sdktrace;

const SERVICE_NAME: &str = "changefeed";

#[cfg(all(feature = "honeycomb", any(feature = "metrics", feature = "tracing")))]
const EXPORT_TIMEOUT: core::time::Duration = core::time::Duration::from_secs(10);

#[cfg(any(feature = "stdout", feature = "honeycomb"))]
const EXPORT_INTERVAL: core::time::Duration = core::time::Duration::from_secs(5);

pub struct TelemetryProviders {
    #[cfg(feature = "tracing")]
    pub tracer_provider: sdktrace::SdkTracerProvider,
    #[cfg(feature = "metrics")]
    pub meter_provider: sdkmetrics::SdkMeterProvider,
}

pub fn init_telemetry() -> anyhow::Result<TelemetryProviders> {
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true)
                .pretty(),
        );

    #[cfg(any(feature = "metrics", feature = "tracing"))]
    let scope = InstrumentationScope::builder(SERVICE_NAME)
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semvcns::SCHEMA_URL)
        .build();

    #[cfg(feature = "tracing")]
    let tracer_provider = init_tracer()?;
    #[cfg(feature = "tracing")]
    let registry = {
        opentelemetry::global::set_text_map_propagator(
            opentelemetry_sdk::propagation::TraceContextPropagator::new(),
        );
        opentelemetry::global::set_tracer_provider(tracer_provider.clone());
        registry.with(
            tracing_opentelemetry::layer()
                .with_tracer(tracer_provider.tracer_with_scope(scope.clone()))
                .with_error_records_to_exceptions(true),
        )
    };

    #[cfg(feature = "metrics")]
    let meter_provider = init_metrics()?;
    #[cfg(feature = "metrics")]
    let registry = {
        opentelemetry::global::set_meter_provider(meter_provider.clone());
        let meter = opentelemetry::global::meter_with_scope(scope);
        let _ = METRICS.set(FeedMetrics::new(&meter));
        registry.with(tracing_opentelemetry::MetricsLayer::new(
            meter_provider.clone(),
        ))
    };

    registry.init();

    Ok(TelemetryProviders {
        #[cfg(feature = "tracing")]
        tracer_provider,
        #[cfg(feature = "metrics")]
        meter_provider,
    })
}

#[cfg(any(feature = "metrics", feature = "tracing"))]
fn resource() -> opentelemetry_sdk::Resource {
    opentelemetry_sdk::Resource::builder()
        .with_service_name(SERVICE_NAME)
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

/// Connection settings shared by the Honeycomb span and metric exporters.
#[cfg(all(feature = "honeycomb", any(feature = "metrics", feature = "tracing")))]
struct Honeycomb {
    metadata: tonic::metadata::MetadataMap,
    endpoint: String,
    compression: opentelemetry_otlp::Compression,
}

#[cfg(all(feature = "honeycomb", any(feature = "metrics", feature = "tracing")))]
impl Honeycomb {
    fn from_env() -> anyhow::Result<Self> {
        use anyhow::Context;
        use core::str::FromStr;

        let var = |name: &str| std::env::var(name).with_context(|| format!("missing `{name}`"));

        let mut metadata = tonic::metadata::MetadataMap::new();
        metadata.insert(
            "x-honeycomb-team",
            var("HONEYCOMB_API_KEY")?.parse().context("invalid API key")?,
        );
        metadata.insert(
            "x-honeycomb-dataset",
            var("HONEYCOMB_DATASET")?.parse().context("invalid dataset")?,
        );
        let compression = opentelemetry_otlp::Compression::from_str(
            &var("HONEYCOMB_COMPRESSION")?.to_ascii_lowercase(),
        )?;

        Ok(Self {
            metadata,
            endpoint: var("HONEYCOMB_ENDPOINT")?,
            compression,
        })
    }

    /// Applies the connection settings to an OTLP tonic exporter builder.
    fn configure<B>(self, builder: B) -> B
    where
        B: opentelemetry_otlp::WithExportConfig + opentelemetry_otlp::WithTonicConfig,
    {
        builder
            .with_tls_config(tonic::transport::ClientTlsConfig::new().with_native_roots())
            .with_metadata(self.metadata)
            .with_compression(self.compression)
            .with_timeout(EXPORT_TIMEOUT)
            .with_endpoint(self.endpoint)
            .with_protocol(opentelemetry_otlp::Protocol::Grpc)
    }
}

#[cfg(feature = "metrics")]
fn init_metrics() -> anyhow::Result<sdkmetrics::SdkMeterProvider> {
    let builder = sdkmetrics::SdkMeterProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = builder.with_reader(
        sdkmetrics::PeriodicReader::builder(opentelemetry_stdout::MetricExporter::default())
            .with_interval(EXPORT_INTERVAL)
            .build(),
    );

    #[cfg(feature = "honeycomb")]
    let builder = {
        use anyhow::Context;

        let exporter = Honeycomb::from_env()?
            .configure(opentelemetry_otlp::MetricExporter::builder().with_tonic())
            .with_temporality(sdkmetrics::Temporality::Delta)
            .build()
            .context("failed to build metrics exporter")?;
        builder.with_periodic_exporter(exporter)
    };

    Ok(builder.build())
}

#[cfg(all(feature = "tracing", any(feature = "stdout", feature = "honeycomb")))]
fn batched<E: opentelemetry_sdk::trace::SpanExporter + Send + Sync + 'static>(
    exporter: E,
) -> sdktrace::BatchSpanProcessor {
    sdktrace::BatchSpanProcessor::builder(exporter)
        .with_batch_config(
            sdktrace::BatchConfigBuilder::default()
                .with_scheduled_delay(EXPORT_INTERVAL)
                .with_max_queue_size(2048)
                .build(),
        )
        .build()
}

#[cfg(feature = "tracing")]
fn init_tracer() -> anyhow::Result<sdktrace::SdkTracerProvider> {
    let builder = sdktrace::SdkTracerProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder =
        builder.with_span_processor(batched(opentelemetry_stdout::SpanExporter::default()));

    #[cfg(feature = "honeycomb")]
    let builder = {
        use anyhow::Context;

        let exporter = Honeycomb::from_env()?
            .configure(opentelemetry_otlp::SpanExporter::builder().with_tonic())
            .build()
            .context("failed to build tracer exporter")?;
        builder.with_span_processor(batched(exporter))
    };

    Ok(builder.build())
}

#[cfg(feature = "metrics")]
static METRICS: OnceLock<FeedMetrics> = OnceLock::new();

#[cfg(feature = "metrics")]
struct FeedMetrics {
    subscriptions: Counter<u64>,
    subscribers_active: UpDownCounter<i64>,
    broadcasts: Counter<u64>,
    dropped_messages: Counter<u64>,
    poll_errors: Counter<u64>,
    poll_duration_ms: Histogram<f64>,
}

#[cfg(feature = "metrics")]
impl FeedMetrics {
    fn new(meter: &Meter) -> Self {
        let counter = |name: &'static str, description: &'static str| {
            meter.u64_counter(name).with_description(description).build()
        };
        Self {
            subscriptions: counter("subscriptions", "Total Subscribe calls"),
            subscribers_active: meter
                .i64_up_down_counter("subscribers_active")
                .with_description("Connected subscribers")
                .build(),
            broadcasts: counter("broadcasts", "Record updates fanned out to subscribers"),
            dropped_messages: counter(
                "dropped_messages",
                "Messages skipped for subscribers with a full buffer",
            ),
            poll_errors: counter("poll_errors", "Failed change stream polls"),
            poll_duration_ms: meter
                .f64_histogram("poll_duration")
                .with_unit("ms")
                .with_description("Time to read all shards and enrich their records")
                .build(),
        }
    }
}

/// No-op until [`init_telemetry`] installs the handles.
#[cfg(feature = "metrics")]
fn record(update: impl FnOnce(&FeedMetrics)) {
    if let Some(metrics) = METRICS.get() {
        update(metrics);
    }
}

pub fn increment_subscriptions() {
    #[cfg(feature = "metrics")]
    record(|m| m.subscriptions.add(1, &[]));
}

pub fn adjust_subscribers_active(_delta: i64) {
    #[cfg(feature = "metrics")]
    record(|m| m.subscribers_active.add(_delta, &[]));
}

pub fn increment_broadcasts() {
    #[cfg(feature = "metrics")]
    record(|m| m.broadcasts.add(1, &[]));
}

pub fn increment_dropped_messages(_count: u64) {
    #[cfg(feature = "metrics")]
    record(|m| m.dropped_messages.add(_count, &[]));
}

pub fn increment_poll_errors() {
    #[cfg(feature = "metrics")]
    record(|m| m.poll_errors.add(1, &[]));
}

pub fn record_poll_duration(_duration_ms: f64) {
    #[cfg(feature = "metrics")]
    record(|m| m.poll_duration_ms.record(_duration_ms, &[]));
}
