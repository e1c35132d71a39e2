#![doc = include_str!("../README.md")]

mod server;

use anyhow::Context;
use changefeed_tonic_core::{
    changefeed::{Pipeline, TopologyAssembler, frontend::HealthChecker, stream::TokioClock},
    proto::{FILE_DESCRIPTOR_SET, change_feed_server::ChangeFeedServer},
};
use clap::Parser;
use futures::Stream;
use server::config::{CliArgs, ServerConfig};
use server::probe::GrpcHealthProbe;
use server::service::handler::FeedService;
use server::streaming::{
    coordinator::{ingest_loop, ping_loop, poll_loop, retention_loop},
    registry::SubscriberRegistry,
};
use server::telemetry::{TelemetryProviders, init_telemetry};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::server::NamedService;
use tonic::transport::server::Connected;
use tonic::{codec::CompressionEncoding, transport::Server};
use tonic_health::server::HealthReporter;
use tonic_reflection::server::Builder;
use tonic_web::GrpcWebLayer;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry()?;

    let assembly = TopologyAssembler::new()
        .assemble(&config.params)
        .context("failed to assemble the pipeline topology")?;
    let pipeline = Pipeline::launch_with_clock(assembly, Arc::new(TokioClock::new()))?;

    if config.uds {
        #[cfg(unix)]
        {
            use tokio::net::UnixListener;
            use tokio_stream::wrappers::UnixListenerStream;
            let uds_path = config.server_addr.clone();
            let uds = UnixListener::bind(&uds_path)?;
            let incoming = UnixListenerStream::new(uds);
            log_startup_info(&uds_path, &config);
            let res = run_server_with_incoming(providers, incoming, pipeline, config).await;
            // Best effort: a panic may leave the socket file behind.
            let _ = std::fs::remove_file(&uds_path);
            res
        }
        #[cfg(not(unix))]
        {
            anyhow::bail!("Unix domain sockets are not supported on this platform");
        }
    } else {
        let tcp_path = config.server_addr.clone();
        let tcp = TcpListener::bind(&tcp_path).await?;
        let incoming = TcpListenerStream::new(tcp);
        log_startup_info(&tcp_path, &config);
        run_server_with_incoming(providers, incoming, pipeline, config).await
    }
}

/// Spawns the poller, pinger, retention, synthetic ingest and frontend health
/// checker tasks.
fn spawn_background_tasks(
    pipeline: &Pipeline,
    registry: &Arc<SubscriberRegistry>,
    config: &ServerConfig,
    shutdown: &CancellationToken,
) -> anyhow::Result<()> {
    tokio::spawn(poll_loop(
        pipeline.worker()?,
        Arc::clone(registry),
        config.poll_interval,
        shutdown.clone(),
    ));
    tokio::spawn(ping_loop(
        Arc::clone(registry),
        config.ping_interval,
        shutdown.clone(),
    ));

    tokio::spawn(retention_loop(
        Arc::clone(pipeline.stream()),
        config.retention_check,
        shutdown.clone(),
    ));

    if let Some(period) = config.ingest_interval {
        tokio::spawn(ingest_loop(pipeline.ingest()?, period, shutdown.clone()));
    }

    // This process registers as the pool's replicas and probes itself the
    // way the load balancer would.
    if let Some(uri) = config.probe_uri() {
        let probe = GrpcHealthProbe::new(<ChangeFeedServer<FeedService> as NamedService>::NAME);
        for target in pipeline.start_replicas() {
            probe.insert(target, uri.clone());
        }
        let checker = HealthChecker::new(Arc::clone(pipeline.frontend().target_group()), probe);
        tokio::spawn(checker.run(shutdown.clone()));
    }
    Ok(())
}

async fn run_server_with_incoming<I, IO, IE>(
    providers: TelemetryProviders,
    incoming: I,
    pipeline: Pipeline,
    config: ServerConfig,
) -> anyhow::Result<()>
where
    I: Stream<Item = Result<IO, IE>>,
    IO: AsyncRead + AsyncWrite + Connected + Unpin + Send + 'static,
    IE: Into<tower::BoxError>,
{
    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<ChangeFeedServer<FeedService>>()
        .await;

    let shutdown = CancellationToken::new();
    let registry = Arc::new(SubscriberRegistry::new(config.subscriber_buffer));
    let service = FeedService::new(Arc::clone(&registry), shutdown.clone());
    spawn_background_tasks(&pipeline, &registry, &config, &shutdown)?;

    let reflection = Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    Server::builder()
        .accept_http1(true)
        .http2_adaptive_window(Some(true))
        .layer(
            ServiceBuilder::new()
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                )
                .layer(GrpcWebLayer::new()),
        )
        .add_service(health_service.clone())
        .add_service(reflection)
        .add_service(build_feed_service(service.clone()))
        .serve_with_incoming_shutdown(
            incoming,
            shutdown_signal(service, health_reporter, providers),
        )
        .await?;

    #[cfg(feature = "tracing")]
    tracing::info!("Service shut down successfully");
    Ok(())
}

fn log_startup_info(_addr: &str, _config: &ServerConfig) {
    if cfg!(debug_assertions) {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Starting change feed on {} with full config: {:#?}",
            _addr,
            _config
        );
    } else {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Starting change feed on {} polling every {:?}",
            _addr,
            _config.poll_interval
        );
    }
}

fn build_feed_service(service: FeedService) -> ChangeFeedServer<FeedService> {
    ChangeFeedServer::new(service)
        .send_compressed(CompressionEncoding::Zstd)
        .send_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Deflate)
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
        .accept_compressed(CompressionEncoding::Deflate)
}

async fn shutdown_signal(
    service: FeedService,
    health_reporter: HealthReporter,
    providers: TelemetryProviders,
) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::error!("Failed to install SIGTERM handler: {}", _e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(_e) = signal::ctrl_c().await {
            #[cfg(feature = "tracing")]
            tracing::error!("Failed to install Ctrl+C handler: {}", _e);
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received SIGTERM signal");
        },
    }

    #[cfg(feature = "tracing")]
    tracing::info!("Shutdown signal received, terminating gracefully...");

    // 1. Publish the status
    health_reporter
        .set_not_serving::<ChangeFeedServer<FeedService>>()
        .await;

    // 2. Stop the background tasks and end open streams
    service.shutdown();

    #[cfg(feature = "tracing")]
    {
        if let Err(err) = providers.tracer_provider.force_flush() {
            eprintln!("Error flushing traces: {:#?}", err);
        }
        if let Err(err) = providers.tracer_provider.shutdown() {
            eprintln!("Error shutting down tracer: {:#?}", err);
        }
    }

    #[cfg(feature = "metrics")]
    {
        if let Err(err) = providers.meter_provider.force_flush() {
            eprintln!("Error flushing metrics: {:#?}", err);
        }
        if let Err(err) = providers.meter_provider.shutdown() {
            eprintln!("Error shutting down meter: {:#?}", err);
        }
    }
    #[cfg(not(any(feature = "tracing", feature = "metrics")))]
    let _ = providers;
}
