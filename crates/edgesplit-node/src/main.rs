//! EdgeSplit node binary.
//!
//! ```bash
//! # Edge/cloud host: sample eno1 every second, serve GET /status on :8004
//! RUST_LOG=info cargo run --bin edgesplit-node -- monitor --interface eno1
//!
//! # Print one status line from the local segments and exit
//! cargo run --bin edgesplit-node -- status
//!
//! # Profile the demo model and write the boundary manifest
//! cargo run --bin edgesplit-node -- profile --manifest demo.manifest --report demo.cbor
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use edgesplit_pipeline::demo::DemoRepository;
use edgesplit_pipeline::{persist_profile, profile_model};
use edgesplit_telemetry::{StatusService, TelemetryHandle};
use edgesplit_types::config::{
    CounterDirection, MonitorConfig, ProfilerConfig, SegmentConfig, StatusServerConfig,
};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name    = "edgesplit-node",
    version = env!("CARGO_PKG_VERSION"),
    about   = "EdgeSplit: split-point profiling and bandwidth telemetry"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the bandwidth monitor and the status endpoint until Ctrl-C.
    Monitor(MonitorArgs),

    /// Print one status line read from the local segments, then exit.
    Status(SegmentArgs),

    /// Profile the built-in demo model and persist its boundary manifest.
    Profile(ProfileArgs),
}

#[derive(Args)]
struct SegmentArgs {
    /// Directory holding the shared segments.
    #[arg(long, env = "EDGESPLIT_SHM_DIR", default_value = "/dev/shm")]
    shm_dir: PathBuf,

    /// Key of the bandwidth segment written by the monitor.
    #[arg(long, env = "EDGESPLIT_BANDWIDTH_KEY", default_value_t = 6652)]
    bandwidth_key: u32,

    /// Key of the externally produced system-metrics segment.
    #[arg(long, env = "EDGESPLIT_METRICS_KEY", default_value_t = 1991)]
    metrics_key: u32,
}

impl SegmentArgs {
    fn to_config(&self) -> SegmentConfig {
        SegmentConfig {
            shm_dir: self.shm_dir.clone(),
            bandwidth_key: self.bandwidth_key,
            metrics_key: self.metrics_key,
            ..SegmentConfig::default()
        }
    }
}

#[derive(Args)]
struct MonitorArgs {
    /// Network interface to sample.
    #[arg(long, env = "EDGESPLIT_INTERFACE", default_value = "eno1")]
    interface: String,

    /// Assumed link capacity in Mbps; samples are headroom under it.
    #[arg(long, env = "EDGESPLIT_LINK_CAPACITY_MBPS", default_value_t = 1000.0)]
    capacity_mbps: f64,

    /// Counter feeding the sample: received, transmitted or both.
    #[arg(long, env = "EDGESPLIT_DIRECTION", default_value = "received")]
    direction: CounterDirection,

    /// Sampling period in milliseconds.
    #[arg(long, env = "EDGESPLIT_SAMPLE_INTERVAL_MS", default_value_t = 1000)]
    sample_interval_ms: u64,

    /// Smoothing window length.
    #[arg(long, env = "EDGESPLIT_WINDOW", default_value_t = 10)]
    window: usize,

    /// Address for the status endpoint.
    #[arg(long, env = "EDGESPLIT_LISTEN", default_value = "0.0.0.0:8004")]
    listen: SocketAddr,

    #[command(flatten)]
    segments: SegmentArgs,
}

#[derive(Args)]
struct ProfileArgs {
    /// Output path of the text boundary manifest.
    #[arg(long, default_value = "boundaries.manifest")]
    manifest: PathBuf,

    /// Output path of the CBOR profile report.
    #[arg(long, default_value = "profile.cbor")]
    report: PathBuf,

    /// Absolute tolerance for the decomposition check.
    #[arg(long, default_value_t = 1e-5)]
    abs_tolerance: f32,

    /// Relative tolerance for the decomposition check.
    #[arg(long, default_value_t = 1e-4)]
    rel_tolerance: f32,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    // Default log level: INFO. Override with RUST_LOG=edgesplit_telemetry=debug etc.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Monitor(args) => run_monitor(args).await,
        Command::Status(args)  => run_status(args),
        Command::Profile(args) => run_profile(args),
    }
}

// ── Monitor mode ──────────────────────────────────────────────────────────────

async fn run_monitor(args: MonitorArgs) -> Result<()> {
    let monitor = MonitorConfig {
        interface: args.interface,
        assumed_link_capacity_mbps: args.capacity_mbps,
        sample_interval: Duration::from_millis(args.sample_interval_ms),
        window_len: args.window,
        direction: args.direction,
    };
    let segments = args.segments.to_config();
    let server = StatusServerConfig { listen_addr: args.listen };

    let handle = TelemetryHandle::start(&monitor, &segments, &server)
        .await
        .context("telemetry startup failed")?;
    info!(addr = %handle.local_addr(), "monitoring; press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C, shutting down");
    handle.shutdown().await;
    Ok(())
}

// ── Status mode ───────────────────────────────────────────────────────────────

fn run_status(args: SegmentArgs) -> Result<()> {
    let service = StatusService::open(&args.to_config()).context("cannot open segments")?;
    println!("{}", service.get_status());
    Ok(())
}

// ── Profile mode ──────────────────────────────────────────────────────────────

fn run_profile(args: ProfileArgs) -> Result<()> {
    let repo = DemoRepository;
    let profiler = ProfilerConfig {
        abs_tolerance: args.abs_tolerance,
        rel_tolerance: args.rel_tolerance,
    };

    let report = profile_model(&repo, &repo.graph_config(), &profiler, &repo.sample_input())
        .context("profiling failed")?;
    persist_profile(&report, &args.manifest, &args.report)
        .with_context(|| format!("cannot write {}", args.manifest.display()))?;

    for candidate in &report.candidates {
        info!(
            boundary = candidate.boundary,
            shape = %candidate.shape,
            transfer_size = candidate.transfer_size,
            "candidate"
        );
    }
    info!(
        model = %report.model_name,
        stages = report.num_stages,
        candidates = report.candidates.len(),
        manifest = %args.manifest.display(),
        report = %args.report.display(),
        "profile written"
    );
    Ok(())
}
