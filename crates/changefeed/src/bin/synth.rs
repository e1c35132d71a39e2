//! Assembles the pipeline topology and prints it as JSON.
//!
//! Nothing is created: the plan is the ordered list of resources a platform
//! provisioner would be asked for. Exits non-zero with a diagnostic when a
//! precondition such as `CERT_ARN` is missing.

use anyhow::bail;
use changefeed::{
    AssemblyParams, TopologyAssembler,
    health::{HealthCheckPolicy, HealthyCodes},
};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "changefeed-synth",
    version,
    about = "Assembles the change-capture pipeline and prints its topology"
)]
struct CliArgs {
    /// TLS certificate reference for the gRPC frontend.
    ///
    /// Environment variable: `CERT_ARN`
    #[arg(long, env = "CERT_ARN")]
    cert_arn: Option<String>,

    /// Name of the deployment.
    #[arg(long, env = "STACK_NAME", default_value_t = String::from("ChangefeedStack"))]
    stack_name: String,

    /// Directory function code and container build paths are resolved
    /// against.
    #[arg(long, env = "DEPLOYMENT_ROOT", default_value = ".")]
    deployment_root: PathBuf,

    /// Worker replicas. Unset leaves the platform default.
    ///
    /// Environment variable: `WORKER_REPLICAS`
    #[arg(long, env = "WORKER_REPLICAS")]
    worker_replicas: Option<u32>,

    /// Shards of the change stream.
    #[arg(long, env = "STREAM_SHARDS", default_value_t = 1)]
    stream_shards: u32,

    /// gRPC codes counted as healthy, e.g. `0-99` or `0,3,5`.
    ///
    /// Environment variable: `HEALTHY_CODES`
    #[arg(long, env = "HEALTHY_CODES")]
    healthy_codes: Option<String>,

    /// Print compact JSON.
    #[arg(long, default_value_t = false)]
    compact: bool,
}

impl TryFrom<CliArgs> for AssemblyParams {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.stream_shards == 0 {
            bail!("STREAM_SHARDS must be greater than 0");
        }

        let mut health_check = HealthCheckPolicy::default();
        if let Some(codes) = args.healthy_codes {
            health_check.healthy_codes = codes.parse::<HealthyCodes>()?;
        }

        Ok(Self {
            stack_name: args.stack_name,
            certificate_arn: args.cert_arn,
            deployment_root: args.deployment_root,
            worker_replicas: args.worker_replicas,
            stream_shards: args.stream_shards,
            health_check,
        })
    }
}

#[derive(Serialize)]
struct Synthesis<'a> {
    #[serde(flatten)]
    assembly: &'a changefeed::Assembly,
    plan: &'a [changefeed::topology::ProvisionedResource],
}

fn init_tracing() {
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::{EnvFilter, fmt};

    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_span_events(FmtSpan::NONE)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .pretty()
        .init();
}

fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let compact = args.compact;
    let params = AssemblyParams::try_from(args)?;

    init_tracing();

    let mut assembler = TopologyAssembler::new();
    let assembly = assembler.assemble(&params)?;
    let synthesis = Synthesis {
        assembly: &assembly,
        plan: assembler.provisioner().log(),
    };

    let json = if compact {
        serde_json::to_string(&synthesis)?
    } else {
        serde_json::to_string_pretty(&synthesis)?
    };
    println!("{json}");
    Ok(())
}
