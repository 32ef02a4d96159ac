use std::path::PathBuf;

use clap::Parser;

/// Frame loop simulator for the frametask scheduler.
///
/// Runs a fixed number of frames, each with dependent physics, animation and
/// render stages, next-frame and main-thread work, and a long-running
/// streaming task across all frames.
#[derive(Parser, Debug)]
#[command(name = "frame-sim", about = "Drive a simulated frame loop on the frametask scheduler")]
pub struct CliArgs {
    /// Scenario file (TOML). Flags below override its values.
    #[arg(long)]
    pub scenario: Option<PathBuf>,

    /// Config profile (overrides FRAMETASK_PROFILE)
    #[arg(long, env = "FRAMETASK_PROFILE")]
    pub profile: Option<String>,

    /// Number of frames to simulate
    #[arg(long)]
    pub frames: Option<u32>,

    /// Short-task worker threads (0 = one per spare CPU)
    #[arg(long)]
    pub short_workers: Option<usize>,

    /// Long-task worker threads
    #[arg(long)]
    pub long_workers: Option<usize>,

    /// Physics tasks per frame
    #[arg(long)]
    pub tasks_per_frame: Option<u32>,

    /// Invocations of the animation task per frame
    #[arg(long)]
    pub multiplicity: Option<u32>,

    /// Write a DGML snapshot of the first frame's task graph to this path
    #[arg(long)]
    pub snapshot: Option<PathBuf>,

    /// Write run report and scheduler metrics as JSON to this path
    #[arg(long)]
    pub metrics: Option<PathBuf>,
}
