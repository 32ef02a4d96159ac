use crate::group::TaskGroupId;

/// Misuse of the scheduler API. These are programmer errors: the call is
/// rejected and nothing is changed.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Task group {0} not found or already finished")]
    GroupNotFound(TaskGroupId),
    #[error("Task group {0} was already started")]
    GroupAlreadyStarted(TaskGroupId),
    #[error("Task group {0} cannot depend on itself")]
    SelfDependency(TaskGroupId),
    #[error("Task '{0}' is already scheduled")]
    TaskAlreadyScheduled(String),
    #[error("Task multiplicity must be at least 1")]
    InvalidMultiplicity,
    #[error("Frame tasks must be finished on the thread that created the scheduler")]
    NotMainThread,
    #[error("Parallel for over {0} items exceeds the u32 index range")]
    TooManyItems(usize),
    #[error("Scheduler shut down before the work finished")]
    ShuttingDown,
    #[error("Invalid scheduler config: {0}")]
    Config(#[from] frametask_core::CoreError),
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}
