use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{Priority, WorkerThreadType};

/// Totals for every finished scheduling of tasks sharing one name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    /// Finished schedulings.
    pub runs: u64,
    /// Invocations that actually ran; skipped ones of canceled tasks are not counted.
    pub invocations: u64,
    /// Wall time summed over all invocations.
    pub total_time: Duration,
    /// Longest single scheduling, its invocations summed.
    pub max_run_time: Duration,
}

impl TaskStats {
    pub fn avg_run_time(&self) -> Duration {
        divide(self.total_time, self.runs)
    }

    /// Average cost of one invocation, which is what sizes multiplicity and bins.
    pub fn avg_invocation_time(&self) -> Duration {
        divide(self.total_time, self.invocations)
    }
}

fn divide(total: Duration, count: u64) -> Duration {
    if count == 0 {
        return Duration::ZERO;
    }
    let nanos = total.as_nanos() / u128::from(count);
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Scheduler operational metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerMetrics {
    /// Finished tasks by name.
    pub tasks: HashMap<String, TaskStats>,
    /// Total invocations run, across all multiplicities.
    pub invocations_executed: u64,
    /// Tasks removed before they started.
    pub tasks_canceled: u64,
    /// Invocations that panicked.
    pub tasks_panicked: u64,
    pub groups_finished: u64,
    pub frames_finished: u64,
    pub last_frame_finished: Option<DateTime<Utc>>,
    /// Queue depth per priority at snapshot time.
    pub queue_depths: HashMap<Priority, usize>,
    /// Allocated workers per pool at snapshot time.
    pub worker_threads: HashMap<WorkerThreadType, usize>,
}

impl SchedulerMetrics {
    /// Record one finished scheduling of a task that ran `invocations` times
    /// for `run_time` in total.
    pub fn record_task(&mut self, task_name: &str, invocations: u32, run_time: Duration) {
        let stats = self.tasks.entry(task_name.to_string()).or_default();
        stats.runs += 1;
        stats.invocations += u64::from(invocations);
        stats.total_time = stats.total_time.saturating_add(run_time);
        stats.max_run_time = stats.max_run_time.max(run_time);
    }

    pub fn record_frame(&mut self) {
        self.frames_finished += 1;
        self.last_frame_finished = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_single_task() {
        let mut m = SchedulerMetrics::default();
        m.record_task("physics", 1, Duration::from_millis(100));

        let stats = m.tasks["physics"];
        assert_eq!(stats.runs, 1);
        assert_eq!(stats.invocations, 1);
        assert_eq!(stats.avg_run_time(), Duration::from_millis(100));
        assert_eq!(stats.max_run_time, Duration::from_millis(100));
    }

    #[test]
    fn multiplicity_averages_per_invocation() {
        let mut m = SchedulerMetrics::default();
        m.record_task("animation", 8, Duration::from_millis(80));
        m.record_task("animation", 2, Duration::from_millis(40));

        let stats = m.tasks["animation"];
        assert_eq!(stats.runs, 2);
        assert_eq!(stats.invocations, 10);
        assert_eq!(stats.avg_run_time(), Duration::from_millis(60));
        assert_eq!(stats.avg_invocation_time(), Duration::from_millis(12));
        assert_eq!(stats.max_run_time, Duration::from_millis(80));
    }

    #[test]
    fn canceled_run_without_invocations_has_zero_average() {
        let mut m = SchedulerMetrics::default();
        m.record_task("stream", 0, Duration::ZERO);
        assert_eq!(m.tasks["stream"].avg_invocation_time(), Duration::ZERO);
        assert_eq!(TaskStats::default().avg_run_time(), Duration::ZERO);
    }

    #[test]
    fn record_frame_stamps_time() {
        let mut m = SchedulerMetrics::default();
        assert!(m.last_frame_finished.is_none());
        m.record_frame();
        m.record_frame();
        assert_eq!(m.frames_finished, 2);
        assert!(m.last_frame_finished.is_some());
    }

    #[test]
    fn metrics_serialize_to_json() {
        let mut m = SchedulerMetrics::default();
        m.record_task("physics", 4, Duration::from_millis(3));
        m.queue_depths.insert(Priority::ThisFrame, 4);
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["tasks"]["physics"]["runs"], 1);
        assert_eq!(json["tasks"]["physics"]["invocations"], 4);
        assert_eq!(json["queue_depths"]["ThisFrame"], 4);
    }
}
