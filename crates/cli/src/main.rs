mod cli;
mod config;
mod simulation;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use frametask_core::Config;
use frametask_scheduler::Scheduler;

use crate::cli::CliArgs;
use crate::config::ScenarioConfig;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    frametask_core::load_dotenv();
    let args = CliArgs::parse();

    let config = match args.profile.as_deref() {
        Some(profile) => Config::for_profile(profile),
        None => Config::from_env(),
    };
    config.log_summary();

    let mut scenario = ScenarioConfig::load(args.scenario.as_deref())
        .context("failed to load scenario")?;
    scenario.apply_args(&args);
    scenario.validate()?;

    let scheduler_config = scenario.resolve_scheduler(config.scheduler.clone(), &args);
    let scheduler = Scheduler::new(scheduler_config).context("failed to start scheduler")?;

    let report = simulation::run(&scheduler, &scenario, args.snapshot.as_deref())?;
    let metrics = scheduler.metrics();

    println!(
        "{} frames, avg {:.2}ms, max {:.2}ms, {} groups finished, {} invocations",
        report.frames,
        report.avg_frame_ms,
        report.max_frame_ms,
        metrics.groups_finished,
        metrics.invocations_executed
    );

    if let Some(path) = args.metrics.as_deref() {
        let output = serde_json::json!({
            "config": config.summary(),
            "report": report,
            "scheduler": metrics,
        });
        frametask_core::write_json(path, &output)
            .with_context(|| format!("failed to write metrics: {}", path.display()))?;
        info!("Wrote metrics to {}", path.display());
    }

    Ok(())
}
