use serde::{Deserialize, Serialize};

/// Task execution priority. Declaration order is drain order: within a
/// worker class, lower variants are always taken first.
///
/// Besides ordering, each value encodes *when* relative to the current frame
/// the work must be done, see [`Priority::is_this_frame`] and
/// [`SchedulerHandle::finish_frame_tasks`](crate::SchedulerHandle::finish_frame_tasks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub enum Priority {
    /// Must be finished this frame, taken before anything else.
    EarlyThisFrame = 0,
    /// Must be finished this frame.
    ThisFrame = 1,
    /// Must be finished this frame, taken last.
    LateThisFrame = 2,
    /// Becomes `EarlyThisFrame` at the next frame boundary.
    EarlyNextFrame = 3,
    /// Becomes `ThisFrame` at the next frame boundary.
    NextFrame = 4,
    /// Becomes `LateThisFrame` at the next frame boundary.
    LateNextFrame = 5,
    /// Long-task pool, taken before `LongRunning`.
    LongRunningHighPriority = 6,
    /// Long-task pool. No frame deadline.
    LongRunning = 7,
    /// Executed by `finish_frame_tasks` on the main thread, every frame.
    ThisFrameMainThread = 8,
    /// Executed on the main thread within the per-frame main-thread budget.
    SomeFrameMainThread = 9,
}

impl Priority {
    pub const COUNT: usize = 10;

    pub const ALL: [Priority; Priority::COUNT] = [
        Priority::EarlyThisFrame,
        Priority::ThisFrame,
        Priority::LateThisFrame,
        Priority::EarlyNextFrame,
        Priority::NextFrame,
        Priority::LateNextFrame,
        Priority::LongRunningHighPriority,
        Priority::LongRunning,
        Priority::ThisFrameMainThread,
        Priority::SomeFrameMainThread,
    ];

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// Work that the next `finish_frame_tasks` call waits for.
    pub fn is_this_frame(self) -> bool {
        matches!(
            self,
            Priority::EarlyThisFrame
                | Priority::ThisFrame
                | Priority::LateThisFrame
                | Priority::ThisFrameMainThread
        )
    }

    pub fn is_next_frame(self) -> bool {
        matches!(
            self,
            Priority::EarlyNextFrame | Priority::NextFrame | Priority::LateNextFrame
        )
    }

    pub fn is_main_thread(self) -> bool {
        matches!(
            self,
            Priority::ThisFrameMainThread | Priority::SomeFrameMainThread
        )
    }

    /// The this-frame counterpart a next-frame priority turns into at a frame boundary.
    pub fn promoted(self) -> Priority {
        match self {
            Priority::EarlyNextFrame => Priority::EarlyThisFrame,
            Priority::NextFrame => Priority::ThisFrame,
            Priority::LateNextFrame => Priority::LateThisFrame,
            other => other,
        }
    }

    /// The pool whose workers drain this priority. `None` for main-thread work.
    pub fn worker_class(self) -> Option<WorkerThreadType> {
        match self {
            Priority::LongRunningHighPriority | Priority::LongRunning => {
                Some(WorkerThreadType::LongTasks)
            }
            Priority::ThisFrameMainThread | Priority::SomeFrameMainThread => None,
            _ => Some(WorkerThreadType::ShortTasks),
        }
    }
}

/// Queues drained by short-task workers, in drain order.
pub(crate) const SHORT_TASK_PRIORITIES: &[Priority] = &[
    Priority::EarlyThisFrame,
    Priority::ThisFrame,
    Priority::LateThisFrame,
    Priority::EarlyNextFrame,
    Priority::NextFrame,
    Priority::LateNextFrame,
];

/// Queues drained by long-task workers, in drain order.
pub(crate) const LONG_TASK_PRIORITIES: &[Priority] =
    &[Priority::LongRunningHighPriority, Priority::LongRunning];

/// What the main thread may pick up while it waits.
pub(crate) const MAIN_THREAD_HELP_PRIORITIES: &[Priority] = &[
    Priority::ThisFrameMainThread,
    Priority::EarlyThisFrame,
    Priority::ThisFrame,
    Priority::LateThisFrame,
    Priority::EarlyNextFrame,
    Priority::NextFrame,
    Priority::LateNextFrame,
    Priority::SomeFrameMainThread,
];

/// What `finish_frame_tasks` helps with while draining the frame.
pub(crate) const FRAME_DRAIN_PRIORITIES: &[Priority] = &[
    Priority::ThisFrameMainThread,
    Priority::EarlyThisFrame,
    Priority::ThisFrame,
    Priority::LateThisFrame,
];

/// Latency class of a worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkerThreadType {
    /// Many threads, frame-bound work expected to finish quickly.
    ShortTasks,
    /// Few threads, work that may run for several frames.
    LongTasks,
}

impl WorkerThreadType {
    pub(crate) fn priorities(self) -> &'static [Priority] {
        match self {
            WorkerThreadType::ShortTasks => SHORT_TASK_PRIORITIES,
            WorkerThreadType::LongTasks => LONG_TASK_PRIORITIES,
        }
    }

    pub(crate) fn label(self) -> &'static str {
        match self {
            WorkerThreadType::ShortTasks => "short",
            WorkerThreadType::LongTasks => "long",
        }
    }
}

/// Whether a task may block on other tasks from inside its work.
///
/// `Never` tasks are safe to run on a thread that is itself waiting, since
/// they cannot start another wait. Tasks that wait must be `Maybe`; the pool
/// relies on sizing headroom for those rather than proving deadlock freedom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TaskNesting {
    #[default]
    Never,
    Maybe,
}

/// What a cancel call does when the task is already executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnTaskRunning {
    /// Block (helping with other work) until the running task returns.
    WaitTillFinished,
    /// Set the cancel flag and return immediately.
    ReturnWithoutBlocking,
}

/// Result of a cancellation request.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CancelOutcome {
    /// Removed before it started; the work never ran.
    Canceled,
    /// Nothing left to cancel.
    AlreadyFinished,
    /// Already executing; the cancel flag is set and the call did not wait.
    StillRunning,
    /// Already executing; the call waited until it returned.
    RanToCompletion,
}

impl CancelOutcome {
    /// True when no work ran past the cancellation request.
    pub fn is_success(self) -> bool {
        matches!(self, CancelOutcome::Canceled | CancelOutcome::AlreadyFinished)
    }
}

/// Splitting parameters for [`SchedulerHandle::parallel_for_indexed`](crate::SchedulerHandle::parallel_for_indexed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelForParams {
    /// Smallest number of items one invocation handles.
    pub bin_size: u32,
    /// Upper bound of invocations per short-task worker.
    pub max_tasks_per_thread: u32,
}

impl Default for ParallelForParams {
    fn default() -> Self {
        Self {
            bin_size: 256,
            max_tasks_per_thread: 2,
        }
    }
}
