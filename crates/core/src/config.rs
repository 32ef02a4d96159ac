use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Prefix shared by every scheduler variable.
const ENV_PREFIX: &str = "FRAMETASK";

/// Reads `FRAMETASK_*` variables for one profile: `{PROFILE}_FRAMETASK_{KEY}`
/// wins over `FRAMETASK_{KEY}`. Empty values count as unset.
struct ProfiledEnv<'a> {
    profile: &'a str,
}

impl ProfiledEnv<'_> {
    fn lookup(&self, key: &str) -> Option<String> {
        let key = format!("{ENV_PREFIX}_{key}");
        let read = |name: &str| env::var(name).ok().filter(|v| !v.trim().is_empty());
        if !self.profile.is_empty() {
            if let Some(value) = read(&format!("{}_{}", self.profile, key)) {
                return Some(value);
            }
        }
        read(&key)
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.lookup(key).unwrap_or_else(|| default.to_string())
    }

    /// Unparsable values fall back to `default` with a warning.
    fn parse<T: FromStr + fmt::Display>(&self, key: &str, default: T) -> T {
        match self.lookup(key) {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!("Ignoring {}_{}={:?}, using {}", ENV_PREFIX, key, raw, default);
                default
            }),
            None => default,
        }
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub scheduler: SchedulerConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `FRAMETASK_PROFILE`. When set (e.g. `EDITOR`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env::var("FRAMETASK_PROFILE").unwrap_or_default().to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            scheduler: SchedulerConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  scheduler:   short_workers={}, long_workers={}, max_help_depth={}, main_thread_budget={}ms",
            self.scheduler.resolved_short_worker_threads(),
            self.scheduler.long_worker_threads,
            self.scheduler.max_help_depth,
            self.scheduler.main_thread_budget_ms,
        );
    }

    /// Summary view for reports and diagnostics output.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "scheduler": {
                "short_worker_threads": self.scheduler.resolved_short_worker_threads(),
                "long_worker_threads": self.scheduler.long_worker_threads,
                "max_help_depth": self.scheduler.max_help_depth,
                "main_thread_budget_ms": self.scheduler.main_thread_budget_ms,
                "thread_name_prefix": self.scheduler.thread_name_prefix,
            },
        })
    }
}

// ── Scheduler ─────────────────────────────────────────────────

/// Worker pool and frame budget settings for the task scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Threads draining the frame queues. 0 = derive from available parallelism.
    #[serde(default)]
    pub short_worker_threads: usize,
    /// Threads draining the long-running queues.
    #[serde(default = "default_long_workers")]
    pub long_worker_threads: usize,
    /// Nesting depth beyond which a waiting thread only helps with tasks that never wait themselves.
    #[serde(default = "default_max_help_depth")]
    pub max_help_depth: u32,
    /// Time slice per frame for `SomeFrameMainThread` work.
    #[serde(default = "default_main_thread_budget_ms")]
    pub main_thread_budget_ms: u64,
    /// Worker thread name prefix.
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,
}

fn default_long_workers() -> usize { 2 }
fn default_max_help_depth() -> u32 { 8 }
fn default_main_thread_budget_ms() -> u64 { 2 }
fn default_thread_name_prefix() -> String { "frametask".to_string() }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            short_worker_threads: 0,
            long_worker_threads: default_long_workers(),
            max_help_depth: default_max_help_depth(),
            main_thread_budget_ms: default_main_thread_budget_ms(),
            thread_name_prefix: default_thread_name_prefix(),
        }
    }
}

impl SchedulerConfig {
    fn from_env_profiled(profile: &str) -> Self {
        let env = ProfiledEnv { profile };
        Self {
            short_worker_threads: env.parse("SHORT_WORKERS", 0),
            long_worker_threads: env.parse("LONG_WORKERS", default_long_workers()),
            max_help_depth: env.parse("MAX_HELP_DEPTH", default_max_help_depth()),
            main_thread_budget_ms: env.parse("MAIN_THREAD_BUDGET_MS", default_main_thread_budget_ms()),
            thread_name_prefix: env.string("THREAD_PREFIX", &default_thread_name_prefix()),
        }
    }

    /// Resolve the short-task worker count (0 means one less than the
    /// available cores, clamped to 2..=32, leaving room for the main thread).
    pub fn resolved_short_worker_threads(&self) -> usize {
        Self::resolve_short(self.short_worker_threads)
    }

    /// Resolve an explicit short-task worker count the same way the config value is resolved.
    pub fn resolve_short(requested: usize) -> usize {
        if requested == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get().saturating_sub(1))
                .unwrap_or(4)
                .clamp(2, 32)
        } else {
            requested
        }
    }

    /// Reject settings the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_help_depth == 0 {
            return Err(CoreError::InvalidConfig(
                "max_help_depth must be at least 1".to_string(),
            ));
        }
        if self.thread_name_prefix.trim().is_empty() {
            return Err(CoreError::InvalidConfig(
                "thread_name_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Write any serializable value as pretty JSON.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CoreError> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_config_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.short_worker_threads, 0);
        assert_eq!(config.long_worker_threads, 2);
        assert_eq!(config.max_help_depth, 8);
        assert_eq!(config.main_thread_budget_ms, 2);
        assert_eq!(config.thread_name_prefix, "frametask");
    }

    #[test]
    fn resolved_short_workers() {
        let mut config = SchedulerConfig::default();
        // 0 means auto-detect
        let auto = config.resolved_short_worker_threads();
        assert!((2..=32).contains(&auto));

        config.short_worker_threads = 6;
        assert_eq!(config.resolved_short_worker_threads(), 6);
    }

    #[test]
    fn deserialize_fills_missing_fields() {
        let config: SchedulerConfig =
            serde_json::from_str(r#"{ "short_worker_threads": 3 }"#).unwrap();
        assert_eq!(config.short_worker_threads, 3);
        assert_eq!(config.long_worker_threads, 2);
        assert_eq!(config.max_help_depth, 8);
    }

    #[test]
    fn validate_rejects_zero_help_depth() {
        let config = SchedulerConfig {
            max_help_depth: 0,
            ..SchedulerConfig::default()
        };
        assert!(matches!(config.validate(), Err(CoreError::InvalidConfig(_))));
        assert!(SchedulerConfig::default().validate().is_ok());
    }

    #[test]
    fn profiled_env_prefers_prefixed_key() {
        env::set_var("FTTEST_FRAMETASK_LONG_WORKERS", "5");
        env::set_var("FRAMETASK_MAX_HELP_DEPTH", "3");
        let config = Config::for_profile("fttest");
        assert_eq!(config.profile, "FTTEST");
        assert_eq!(config.scheduler.long_worker_threads, 5);
        assert_eq!(config.scheduler.max_help_depth, 3);
        env::remove_var("FTTEST_FRAMETASK_LONG_WORKERS");
        env::remove_var("FRAMETASK_MAX_HELP_DEPTH");
    }

    #[test]
    fn unparsable_env_value_falls_back_to_default() {
        env::set_var("FTBAD_FRAMETASK_SHORT_WORKERS", "many");
        env::set_var("FTBAD_FRAMETASK_THREAD_PREFIX", "  ");
        let env = ProfiledEnv { profile: "FTBAD" };
        assert_eq!(env.parse("SHORT_WORKERS", 7usize), 7);
        assert_eq!(env.string("THREAD_PREFIX", "frame"), "frame");
        env::remove_var("FTBAD_FRAMETASK_SHORT_WORKERS");
        env::remove_var("FTBAD_FRAMETASK_THREAD_PREFIX");
    }

    #[test]
    fn profile_label_defaults() {
        let config = Config::for_profile("");
        assert_eq!(config.profile_label(), "default");
        assert_eq!(config.summary()["profile"], "default");
    }
}
