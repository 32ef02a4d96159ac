use std::path::Path;

use anyhow::{Context, Result};
use frametask_core::SchedulerConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cli::CliArgs;

/// Workload of one simulation run, loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Frames to simulate
    #[serde(default = "default_frames")]
    pub frames: u32,

    /// Independent physics tasks per frame
    #[serde(default = "default_tasks_per_frame")]
    pub tasks_per_frame: u32,

    /// Invocations of the animation task per frame
    #[serde(default = "default_multiplicity")]
    pub multiplicity: u32,

    /// Busy time of one unit of work, in microseconds
    #[serde(default = "default_work_us")]
    pub work_us: u64,

    /// Items the render stage splits with parallel-for
    #[serde(default = "default_render_items")]
    pub render_items: u32,

    /// Main-thread UI tasks per frame
    #[serde(default = "default_main_thread_tasks")]
    pub main_thread_tasks: u32,

    /// Keep a cooperative long-running streaming task alive across frames
    #[serde(default = "default_streaming")]
    pub streaming: bool,

    /// Scheduler settings; when absent they come from the environment
    #[serde(default)]
    pub scheduler: Option<SchedulerConfig>,
}

fn default_frames() -> u32 {
    60
}

fn default_tasks_per_frame() -> u32 {
    16
}

fn default_multiplicity() -> u32 {
    64
}

fn default_work_us() -> u64 {
    200
}

fn default_render_items() -> u32 {
    4096
}

fn default_main_thread_tasks() -> u32 {
    2
}

fn default_streaming() -> bool {
    true
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            frames: default_frames(),
            tasks_per_frame: default_tasks_per_frame(),
            multiplicity: default_multiplicity(),
            work_us: default_work_us(),
            render_items: default_render_items(),
            main_thread_tasks: default_main_thread_tasks(),
            streaming: default_streaming(),
            scheduler: None,
        }
    }
}

impl ScenarioConfig {
    /// Load a scenario file, or the built-in scenario when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            debug!("No scenario file, using defaults");
            return Ok(Self::default());
        };
        debug!(?path, "Loading scenario");
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario: {}", path.display()))?;
        let scenario: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse scenario: {}", path.display()))?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Apply command line overrides.
    pub fn apply_args(&mut self, args: &CliArgs) {
        if let Some(frames) = args.frames {
            self.frames = frames;
        }
        if let Some(tasks) = args.tasks_per_frame {
            self.tasks_per_frame = tasks;
        }
        if let Some(multiplicity) = args.multiplicity {
            self.multiplicity = multiplicity;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.multiplicity == 0 {
            anyhow::bail!("multiplicity must be at least 1");
        }
        Ok(())
    }

    /// Scheduler settings: the scenario's, else `fallback`, then CLI worker overrides.
    pub fn resolve_scheduler(&self, fallback: SchedulerConfig, args: &CliArgs) -> SchedulerConfig {
        let mut config = self.scheduler.clone().unwrap_or(fallback);
        if let Some(short) = args.short_workers {
            config.short_worker_threads = short;
        }
        if let Some(long) = args.long_workers {
            config.long_worker_threads = long;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn test_default_scenario() {
        let scenario = ScenarioConfig::default();
        assert_eq!(scenario.frames, 60);
        assert_eq!(scenario.multiplicity, 64);
        assert!(scenario.streaming);
        assert!(scenario.scheduler.is_none());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let scenario: ScenarioConfig = toml::from_str(
            r#"
            frames = 5
            streaming = false

            [scheduler]
            short_worker_threads = 3
            "#,
        )
        .unwrap();
        assert_eq!(scenario.frames, 5);
        assert!(!scenario.streaming);
        assert_eq!(scenario.tasks_per_frame, 16);
        let scheduler = scenario.scheduler.unwrap();
        assert_eq!(scheduler.short_worker_threads, 3);
        assert_eq!(scheduler.long_worker_threads, 2);
    }

    #[test]
    fn test_args_override_scenario() {
        let args = CliArgs::parse_from([
            "frame-sim",
            "--frames",
            "3",
            "--multiplicity",
            "8",
            "--long-workers",
            "4",
        ]);
        let mut scenario = ScenarioConfig::default();
        scenario.apply_args(&args);
        assert_eq!(scenario.frames, 3);
        assert_eq!(scenario.multiplicity, 8);

        let config = scenario.resolve_scheduler(SchedulerConfig::default(), &args);
        assert_eq!(config.long_worker_threads, 4);
        assert_eq!(config.short_worker_threads, 0);
    }

    #[test]
    fn test_missing_scenario_file_is_error() {
        let result = ScenarioConfig::load(Some(Path::new("/nonexistent/scenario.toml")));
        assert!(result.is_err());
    }
}
