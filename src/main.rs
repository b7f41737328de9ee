//! Canne - smart white cane runtime
//!
//! Runs the sensing pipeline against simulated or replayed devices, with
//! speech and vibration rendered to the log.
//!
//! # Usage
//!
//! ```bash
//! # Simulated range sensor and camera
//! cargo run --release
//!
//! # Deterministic simulation for one minute
//! cargo run --release -- --seed 42 --run-for 60
//!
//! # Replay a recorded range trace, range-only
//! cargo run --release -- --replay walk.csv --no-vision
//!
//! # Show the effective configuration
//! cargo run --release -- --print-config
//! ```
//!
//! # Environment Variables
//!
//! - `CANNE_CONFIG`: Path to a TOML config file (default: ./canne.toml)
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use canne::acquisition::{ReplayRangeSource, SimulatedRangeSource, SimulatedVisionSource};
use canne::feedback::{LogAudioOutput, LogHapticOutput};
use canne::{CanneConfig, Coordinator, CoordinatorStats, Devices};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "canne")]
#[command(about = "Canne sensor fusion and alert arbitration engine")]
#[command(version)]
struct CliArgs {
    /// Path to a TOML config file (overrides CANNE_CONFIG and ./canne.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Replay a CSV of `offset_ms,distance_cm` rows instead of simulating the range sensor
    #[arg(long, value_name = "CSV")]
    replay: Option<PathBuf>,

    /// Seed for the simulated devices (random when omitted)
    #[arg(long)]
    seed: Option<u64>,

    /// Run range-only, without the camera
    #[arg(long)]
    no_vision: bool,

    /// Stop after this many seconds instead of waiting for Ctrl+C
    #[arg(long, value_name = "SECS")]
    run_for: Option<u64>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "CANNE_LOG_JSON")]
    log_json: bool,
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

fn load_config(args: &CliArgs) -> Result<CanneConfig> {
    let mut config = match &args.config {
        Some(path) => CanneConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => CanneConfig::load(),
    };
    if args.no_vision {
        config.vision.enabled = false;
    }
    Ok(config)
}

fn build_devices(args: &CliArgs, config: &CanneConfig) -> Result<Devices> {
    let audio = LogAudioOutput::new();
    let haptic = LogHapticOutput::new();

    let devices = match &args.replay {
        Some(path) => {
            let source = ReplayRangeSource::load(path)
                .with_context(|| format!("Failed to read replay file {}", path.display()))?;
            info!("📥 Range: replay of {} ({} rows)", path.display(), source.remaining());
            Devices::new(source, audio, haptic)
        }
        None => {
            info!("📥 Range: simulated ultrasonic sensor");
            Devices::new(SimulatedRangeSource::new(args.seed), audio, haptic)
        }
    };

    if config.vision.enabled {
        info!("📷 Vision: simulated object detector");
        // Offset the seed so both simulators do not share a stream
        Ok(devices.with_vision(SimulatedVisionSource::new(args.seed.map(|s| s.wrapping_add(1)))))
    } else {
        info!("📷 Vision: disabled");
        Ok(devices)
    }
}

fn log_final_stats(stats: &CoordinatorStats) {
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  Session summary");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  Range cycles:        {}", stats.range_cycles);
    info!("  Range read errors:   {}", stats.range_read_errors);
    info!("  Unavailable spells:  {}", stats.range_unavailable_episodes);
    info!("  Vision cycles:       {}", stats.vision_cycles);
    info!("  Vision failures:     {}", stats.vision_failures);
    info!("  Evaluations:         {}", stats.evaluations);
    info!("  Commands issued:     {}", stats.commands_issued);
    info!(
        "  Feedback rendered:   {} ({} preempted, {} rejected, {} abandoned)",
        stats.queue.dispatched, stats.queue.preempted, stats.queue.rejected, stats.queue.abandoned
    );
    match serde_json::to_string(stats) {
        Ok(json) => info!(target: "canne::stats", "{}", json),
        Err(e) => warn!("Failed to serialize final stats: {}", e),
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_json);

    let config = load_config(&args)?;

    if args.print_config {
        println!("{}", config.to_toml().context("Failed to render config")?);
        return Ok(());
    }

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  {} - smart cane feedback engine", config.device.name);
    info!(
        "  Danger < {} cm | Warning < {} cm | Language: {:?}",
        config.range.danger_distance_cm, config.range.warning_distance_cm, config.device.language
    );
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("");

    let devices = build_devices(&args, &config)?;
    let mut coordinator = Coordinator::new(devices);
    coordinator
        .start(config)
        .await
        .context("Failed to start coordinator")?;

    match args.run_for {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                    info!("⏱️  Run duration of {}s elapsed, shutting down...", secs);
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("🛑 Received Ctrl+C, initiating shutdown...");
                }
            }
        }
        None => {
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl+C")?;
            info!("🛑 Received Ctrl+C, initiating shutdown...");
        }
    }

    let stats = coordinator.stop().await;
    log_final_stats(&stats);

    info!("");
    info!("✓ Canne shutdown complete");
    Ok(())
}
