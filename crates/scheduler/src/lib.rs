//! Cooperative multi-priority task scheduler for frame-based applications.
//!
//! Work is grouped into [`TaskGroupId`] groups that carry a [`Priority`] and
//! may depend on other groups. Short-task workers drain frame-bound
//! priorities, long-task workers drain long-running ones, and the thread
//! that created the [`Scheduler`] runs main-thread work inside
//! [`SchedulerHandle::finish_frame_tasks`]. Threads that wait on a group run
//! other ready tasks instead of idling.

mod dependency;
pub mod error;
pub mod group;
pub mod metrics;
mod queue;
pub mod runner;
pub mod snapshot;
pub mod task;
pub mod types;

pub use error::SchedulerError;
pub use frametask_core::SchedulerConfig;
pub use group::{GroupFinishedCallback, GroupPhase, TaskGroupId};
pub use metrics::{SchedulerMetrics, TaskStats};
pub use runner::{Scheduler, SchedulerHandle};
pub use snapshot::DgmlGraph;
pub use task::{Task, TaskContext, TaskFinishedCallback, TaskState, TaskWork};
pub use types::{
    CancelOutcome, OnTaskRunning, ParallelForParams, Priority, TaskNesting, WorkerThreadType,
};
