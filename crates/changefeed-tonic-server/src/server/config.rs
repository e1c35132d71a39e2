use anyhow::bail;
use changefeed_tonic_core::changefeed::{AssemblyParams, health::HealthyCodes};
use clap::Parser;
use core::time::Duration;

/// Runtime configuration for the `changefeed-tonic-server` binary.
///
/// The worker process assembles the pipeline topology from the same inputs
/// as the synth CLI, runs it in process, and streams every captured change to
/// its gRPC subscribers. All values are parsed from CLI arguments or
/// environment variables.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "changefeed-tonic-server",
    version,
    about = "A gRPC service streaming record changes to subscribers"
)]
pub struct CliArgs {
    /// TLS certificate reference of the frontend. Assembly fails without it.
    ///
    /// Environment variable: `CERT_ARN`
    #[arg(long, env = "CERT_ARN")]
    pub cert_arn: Option<String>,

    /// How often every shard of the change stream is read.
    ///
    /// Environment variable: `POLL_INTERVAL_MS`
    #[arg(long, env = "POLL_INTERVAL_MS", default_value_t = 1_000)]
    pub poll_interval_ms: u64,

    /// How often a keep-alive is sent to every subscriber.
    ///
    /// Environment variable: `PING_INTERVAL_SECS`
    #[arg(long, env = "PING_INTERVAL_SECS", default_value_t = 10)]
    pub ping_interval_secs: u64,

    /// Capacity of each subscriber's message buffer. A subscriber that falls
    /// this far behind misses messages until it catches up.
    ///
    /// Environment variable: `SUBSCRIBER_BUFFER`
    #[arg(long, env = "SUBSCRIBER_BUFFER", default_value_t = 128)]
    pub subscriber_buffer: usize,

    /// How often change records past the stream's retention window are
    /// dropped.
    ///
    /// Environment variable: `RETENTION_CHECK_SECS`
    #[arg(long, env = "RETENTION_CHECK_SECS", default_value_t = 60)]
    pub retention_check_secs: u64,

    /// Interval of synthetic writes through the ingest function. `0`
    /// disables them.
    ///
    /// Environment variable: `INGEST_INTERVAL_MS`
    #[arg(long, env = "INGEST_INTERVAL_MS", default_value_t = 0)]
    pub ingest_interval_ms: u64,

    /// gRPC codes the frontend counts as healthy, e.g. `0-99` or `0,3,5`.
    ///
    /// Environment variable: `HEALTHY_CODES`
    #[arg(long, env = "HEALTHY_CODES")]
    pub healthy_codes: Option<String>,

    /// Address to listen on (TCP or Unix socket path; use --uds for Unix socket).
    ///
    /// Example: "0.0.0.0:50051" or "/tmp/tonic-uds.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:50051"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub params: AssemblyParams,
    pub poll_interval: Duration,
    pub ping_interval: Duration,
    pub subscriber_buffer: usize,
    pub retention_check: Duration,
    pub ingest_interval: Option<Duration>,
    pub server_addr: String,
    pub uds: bool,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.poll_interval_ms == 0 {
            bail!("POLL_INTERVAL_MS must be greater than 0");
        }

        if args.ping_interval_secs == 0 {
            bail!("PING_INTERVAL_SECS must be greater than 0");
        }

        if args.retention_check_secs == 0 {
            bail!("RETENTION_CHECK_SECS must be greater than 0");
        }

        if args.subscriber_buffer == 0 {
            bail!("SUBSCRIBER_BUFFER must be greater than 0");
        }

        let mut params = AssemblyParams::new(args.cert_arn);
        if let Some(codes) = args.healthy_codes {
            params.health_check.healthy_codes = codes.parse::<HealthyCodes>()?;
        }

        Ok(Self {
            params,
            poll_interval: Duration::from_millis(args.poll_interval_ms),
            ping_interval: Duration::from_secs(args.ping_interval_secs),
            subscriber_buffer: args.subscriber_buffer,
            retention_check: Duration::from_secs(args.retention_check_secs),
            ingest_interval: (args.ingest_interval_ms > 0)
                .then(|| Duration::from_millis(args.ingest_interval_ms)),
            server_addr: args.server_addr,
            uds: args.uds,
        })
    }
}

impl ServerConfig {
    /// Address the local health checker dials to reach this process.
    pub fn probe_uri(&self) -> Option<String> {
        if self.uds {
            return None;
        }
        let addr = match self.server_addr.strip_prefix("0.0.0.0:") {
            Some(port) => format!("127.0.0.1:{port}"),
            None => self.server_addr.clone(),
        };
        Some(format!("http://{addr}"))
    }
}
