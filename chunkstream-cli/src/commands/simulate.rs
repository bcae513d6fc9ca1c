//! Simulate command - stream a headless world around a moving observer.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chunkstream::app::StreamingApp;
use chunkstream::chunk::EntityKind;
use chunkstream::config::StreamingConfig;
use chunkstream::generation::Generator;
use chunkstream::pool::{HeadlessView, PoolRegistry};
use chunkstream::scheduler::{SchedulerSnapshot, TaskKind};
use chunkstream::streaming::{SharedObserver, StreamingStats};
use clap::Args;
use tracing::info;

use super::load_config;
use crate::error::CliError;

/// Arguments for the simulate command.
#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Configuration file
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Number of observer steps to run
    #[arg(long, default_value_t = 40)]
    pub ticks: u64,

    /// Distance the observer moves along +x per step, in world units
    /// (defaults to half a chunk)
    #[arg(long)]
    pub speed: Option<f32>,

    /// Load radius in chunks
    #[arg(long)]
    pub radius: Option<f32>,

    /// Maximum concurrently running tasks
    #[arg(long)]
    pub max_tasks: Option<usize>,

    /// World seed
    #[arg(long)]
    pub seed: Option<String>,

    /// Also write the log to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl SimulateArgs {
    /// Applies command-line overrides on top of the loaded config.
    fn resolve_config(&self) -> Result<StreamingConfig, CliError> {
        let mut config = load_config(self.config.as_deref())?;
        if let Some(radius) = self.radius {
            config = config.with_load_radius(radius);
        }
        if let Some(max) = self.max_tasks {
            config = config.with_max_concurrent_tasks(max);
        }
        if let Some(seed) = &self.seed {
            config = config.with_seed(seed.clone());
        }
        config.validate()?;
        Ok(config)
    }
}

/// Run the simulate command.
pub fn run(args: SimulateArgs) -> Result<(), CliError> {
    let config = args.resolve_config()?;
    let runtime = tokio::runtime::Runtime::new().map_err(CliError::Runtime)?;

    // Set up signal handler for graceful shutdown
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        println!();
        println!("Received shutdown signal, stopping...");
        flag.store(true, Ordering::SeqCst);
    })
    .map_err(|e| CliError::Signal(e.to_string()))?;

    runtime.block_on(simulate(config, &args, &interrupted))
}

async fn simulate(
    config: StreamingConfig,
    args: &SimulateArgs,
    interrupted: &AtomicBool,
) -> Result<(), CliError> {
    let chunk_size = config.world.chunk_size as f32;
    let speed = args.speed.unwrap_or(chunk_size / 2.0);
    let step_interval = config.streaming.tick_interval;

    let pools = headless_pools(&config)?;
    let generator = Generator::standard(config.world.clone());

    println!("Chunkstream Simulation v{}", env!("CARGO_PKG_VERSION"));
    println!("=========================");
    println!();
    println!("Seed:        {}", config.world.seed);
    println!("Chunk size:  {} (resolution {})", config.world.chunk_size, config.world.resolution);
    println!("Load radius: {} chunks", config.streaming.load_radius);
    println!("Max tasks:   {}", config.scheduler.max_concurrent_tasks);
    println!("Passes:      {}", generator.pass_names().join(", "));
    println!("Speed:       {} units per {} ms", speed, step_interval.as_millis());
    println!();
    println!("Press Ctrl+C to stop early");
    println!();

    let observer = Arc::new(SharedObserver::at([chunk_size / 2.0, 0.0, chunk_size / 2.0]));
    let app = StreamingApp::start(config, pools, generator, observer.clone())?;

    let mut steps = 0;
    while steps < args.ticks && !interrupted.load(Ordering::SeqCst) {
        tokio::time::sleep(step_interval.max(Duration::from_millis(1))).await;
        observer.translate([speed, 0.0, 0.0]);
        steps += 1;
        print_step(steps, &app.stats(), &app.scheduler().snapshot());
    }

    info!(steps, "Simulation finished, shutting down");
    let snapshot = app.scheduler().snapshot();
    let world = Arc::clone(app.world());
    let final_stats = app.shutdown().await?;

    println!();
    println!("Session Summary");
    println!("───────────────");
    println!("  Steps:        {}", steps);
    println!("  Ticks:        {}", final_stats.ticks);
    println!(
        "  Tasks:        {} submitted, {} deduplicated, {} started",
        snapshot.submitted, snapshot.deduplicated, snapshot.started
    );
    println!(
        "  Outcomes:     {} completed, {} cancelled, {} faulted",
        snapshot.completed, snapshot.cancelled, snapshot.faulted
    );
    for (kind, stats) in world.pools().stats() {
        println!(
            "  Pool {:<8} {} active after teardown",
            format!("{}:", kind),
            stats.active
        );
    }
    Ok(())
}

/// One pool per entity kind the standard generator produces.
fn headless_pools(config: &StreamingConfig) -> Result<PoolRegistry, CliError> {
    let prewarm = config.pools.prewarm;
    let registry = PoolRegistry::new()
        .with_pool(EntityKind::TERRAIN, vec![HeadlessView::prototype()], prewarm)?
        .with_pool(EntityKind::TREE, vec![HeadlessView::prototype()], prewarm)?;
    Ok(registry)
}

fn print_step(step: u64, stats: &StreamingStats, snapshot: &SchedulerSnapshot) {
    let center = stats
        .center
        .map(|c| c.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "[{:>4}] center {:<10} resident {:>4} | loading {:>3} unloading {:>3} building {:>3} | running {:>3} pending {:>4} (load {:>3} build {:>3}) | stored {:>4} instances {:>5}",
        step,
        center,
        stats.resident,
        stats.loading,
        stats.unloading,
        stats.building,
        snapshot.running,
        snapshot.pending,
        snapshot.pending_of(TaskKind::Load),
        snapshot.pending_of(TaskKind::Build),
        stats.stored,
        stats.instances
    );
}
