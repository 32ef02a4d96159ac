use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::error::SchedulerError;
use crate::group::TaskGroupId;
use crate::runner::SchedulerHandle;
use crate::types::TaskNesting;

/// The work a [`Task`] performs.
///
/// A task with multiplicity N gets `execute_at(i, ..)` called once for every
/// `i` in `0..N`, possibly concurrently on different threads. The default
/// `execute_at` forwards to `execute`, so single-shot work only implements
/// `execute`.
///
/// Closures `Fn(&TaskContext)` implement this trait.
pub trait TaskWork: Send + Sync + 'static {
    /// Run the work once.
    fn execute(&self, ctx: &TaskContext<'_>);

    /// Run invocation `invocation` of a task with multiplicity.
    fn execute_at(&self, invocation: u32, ctx: &TaskContext<'_>) {
        let _ = invocation;
        self.execute(ctx);
    }
}

impl<F> TaskWork for F
where
    F: Fn(&TaskContext<'_>) + Send + Sync + 'static,
{
    fn execute(&self, ctx: &TaskContext<'_>) {
        self(ctx)
    }
}

/// Handed to [`TaskWork`] for the duration of one invocation.
pub struct TaskContext<'a> {
    task: &'a Task,
    invocation: u32,
    scheduler: &'a SchedulerHandle,
}

impl<'a> TaskContext<'a> {
    /// Poll this from long-running work to stop early after a cancel request.
    pub fn has_been_canceled(&self) -> bool {
        self.task.has_been_canceled()
    }

    /// Index of the current invocation, `0..multiplicity`.
    pub fn invocation(&self) -> u32 {
        self.invocation
    }

    pub fn multiplicity(&self) -> u32 {
        self.task.multiplicity()
    }

    pub fn task_name(&self) -> String {
        self.task.name()
    }

    /// The scheduler running this task, for nested groups.
    /// Work that waits on other groups must be configured with [`TaskNesting::Maybe`].
    pub fn scheduler(&self) -> &'a SchedulerHandle {
        self.scheduler
    }
}

/// Lifecycle of a task within one scheduling.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskState {
    /// Never added to a group.
    Idle = 0,
    /// Added to a group that has not been dispatched yet.
    Pending = 1,
    /// Sitting in a ready queue, no invocation started.
    Queued = 2,
    /// At least one invocation started.
    Running = 3,
    /// All invocations done, or canceled before starting. Can be scheduled again.
    Finished = 4,
}

impl TaskState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => TaskState::Idle,
            1 => TaskState::Pending,
            2 => TaskState::Queued,
            3 => TaskState::Running,
            _ => TaskState::Finished,
        }
    }
}

/// Called once per scheduling when the task finishes or is canceled.
pub type TaskFinishedCallback = Arc<dyn Fn(&Arc<Task>) + Send + Sync>;

struct TaskConfig {
    name: String,
    nesting: TaskNesting,
    on_finished: Option<TaskFinishedCallback>,
}

/// A unit of schedulable work, shared between the issuer and the scheduler.
pub struct Task {
    config: RwLock<TaskConfig>,
    multiplicity: AtomicU32,
    state: AtomicU8,
    canceled: AtomicBool,
    /// Next invocation index to hand out. Only advanced under the queue lock.
    next_invocation: AtomicU32,
    /// Invocations not yet completed or skipped.
    outstanding: AtomicU32,
    /// Wall time summed over the invocations of the current scheduling.
    run_nanos: AtomicU64,
    /// Invocations of the current scheduling that actually ran.
    invocations_run: AtomicU32,
    /// Group of the current scheduling. Only changed under the group lock.
    owner: Mutex<TaskGroupId>,
    work: Box<dyn TaskWork>,
}

impl Task {
    pub fn new(name: impl Into<String>, work: impl TaskWork) -> Arc<Self> {
        Arc::new(Self {
            config: RwLock::new(TaskConfig {
                name: name.into(),
                nesting: TaskNesting::Never,
                on_finished: None,
            }),
            multiplicity: AtomicU32::new(1),
            state: AtomicU8::new(TaskState::Idle as u8),
            canceled: AtomicBool::new(false),
            next_invocation: AtomicU32::new(0),
            outstanding: AtomicU32::new(0),
            run_nanos: AtomicU64::new(0),
            invocations_run: AtomicU32::new(0),
            owner: Mutex::new(TaskGroupId::INVALID),
            work: Box::new(work),
        })
    }

    /// Build a task from a closure.
    pub fn from_fn<F>(name: impl Into<String>, f: F) -> Arc<Self>
    where
        F: Fn(&TaskContext<'_>) + Send + Sync + 'static,
    {
        Self::new(name, f)
    }

    /// Set name, nesting policy and completion callback. Only allowed while
    /// the task is not scheduled.
    pub fn configure(
        &self,
        name: impl Into<String>,
        nesting: TaskNesting,
        on_finished: Option<TaskFinishedCallback>,
    ) -> Result<(), SchedulerError> {
        self.ensure_configurable()?;
        let mut config = self.config.write();
        config.name = name.into();
        config.nesting = nesting;
        config.on_finished = on_finished;
        Ok(())
    }

    /// Number of independent invocations. Only allowed while the task is not scheduled.
    pub fn set_multiplicity(&self, multiplicity: u32) -> Result<(), SchedulerError> {
        if multiplicity == 0 {
            return Err(SchedulerError::InvalidMultiplicity);
        }
        self.ensure_configurable()?;
        self.multiplicity.store(multiplicity, Ordering::Release);
        Ok(())
    }

    pub fn name(&self) -> String {
        self.config.read().name.clone()
    }

    pub fn nesting(&self) -> TaskNesting {
        self.config.read().nesting
    }

    pub fn multiplicity(&self) -> u32 {
        self.multiplicity.load(Ordering::Acquire)
    }

    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// True once every invocation ran, or the task was canceled before starting.
    pub fn is_task_finished(&self) -> bool {
        self.state() == TaskState::Finished
    }

    pub fn has_been_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    fn ensure_configurable(&self) -> Result<(), SchedulerError> {
        match self.state() {
            TaskState::Idle | TaskState::Finished => Ok(()),
            _ => Err(SchedulerError::TaskAlreadyScheduled(self.name())),
        }
    }

    /// Claim the task for `owner` and reset the per-scheduling counters.
    pub(crate) fn prepare_for_group(&self, owner: TaskGroupId) -> Result<(), SchedulerError> {
        let claimed = self.transition(TaskState::Idle, TaskState::Pending)
            || self.transition(TaskState::Finished, TaskState::Pending);
        if !claimed {
            return Err(SchedulerError::TaskAlreadyScheduled(self.name()));
        }
        self.canceled.store(false, Ordering::Release);
        self.next_invocation.store(0, Ordering::Release);
        self.outstanding.store(self.multiplicity(), Ordering::Release);
        self.run_nanos.store(0, Ordering::Release);
        self.invocations_run.store(0, Ordering::Release);
        *self.owner.lock() = owner;
        Ok(())
    }

    /// The group this task was last added to.
    pub(crate) fn owner(&self) -> TaskGroupId {
        *self.owner.lock()
    }

    pub(crate) fn transition(&self, from: TaskState, to: TaskState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn mark_canceled(&self) {
        self.canceled.store(true, Ordering::Release);
    }

    /// Hand out the next invocation index. Caller holds the queue lock.
    pub(crate) fn claim_invocation(&self) -> Option<u32> {
        let next = self.next_invocation.load(Ordering::Acquire);
        if next >= self.multiplicity() {
            return None;
        }
        self.next_invocation.store(next + 1, Ordering::Release);
        Some(next)
    }

    pub(crate) fn has_unclaimed_invocations(&self) -> bool {
        self.next_invocation.load(Ordering::Acquire) < self.multiplicity()
    }

    /// Give up every invocation not handed out yet. Caller holds the queue lock.
    pub(crate) fn skip_unclaimed(&self) -> u32 {
        let multiplicity = self.multiplicity();
        let next = self.next_invocation.swap(multiplicity, Ordering::AcqRel);
        multiplicity.saturating_sub(next)
    }

    /// Returns true when this call completed the last outstanding invocation.
    pub(crate) fn complete_invocations(&self, count: u32) -> bool {
        if count == 0 {
            return false;
        }
        let previous = self.outstanding.fetch_sub(count, Ordering::AcqRel);
        debug_assert!(previous >= count, "invocation accounting underflow");
        previous == count
    }

    pub(crate) fn record_invocation(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.run_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.invocations_run.fetch_add(1, Ordering::Relaxed);
    }

    /// Invocations run and their summed wall time for the current scheduling.
    pub(crate) fn run_stats(&self) -> (u32, Duration) {
        (
            self.invocations_run.load(Ordering::Relaxed),
            Duration::from_nanos(self.run_nanos.load(Ordering::Relaxed)),
        )
    }

    pub(crate) fn invoke(&self, invocation: u32, scheduler: &SchedulerHandle) {
        let ctx = TaskContext {
            task: self,
            invocation,
            scheduler,
        };
        self.work.execute_at(invocation, &ctx);
    }

    /// Mark finished and run the completion callback on this thread.
    pub(crate) fn finish(self: &Arc<Self>) {
        self.state.store(TaskState::Finished as u8, Ordering::Release);
        self.notify_finished();
    }

    pub(crate) fn notify_finished(self: &Arc<Self>) {
        let callback = self.config.read().on_finished.clone();
        if let Some(callback) = callback {
            callback(self);
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name())
            .field("nesting", &self.nesting())
            .field("multiplicity", &self.multiplicity())
            .field("state", &self.state())
            .field("canceled", &self.has_been_canceled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn noop() -> Arc<Task> {
        Task::from_fn("noop", |_| {})
    }

    #[test]
    fn new_task_defaults() {
        let task = noop();
        assert_eq!(task.name(), "noop");
        assert_eq!(task.nesting(), TaskNesting::Never);
        assert_eq!(task.multiplicity(), 1);
        assert_eq!(task.state(), TaskState::Idle);
        assert!(!task.is_task_finished());
        assert!(!task.has_been_canceled());
    }

    #[test]
    fn configure_rejected_once_scheduled() {
        let task = noop();
        task.configure("renamed", TaskNesting::Maybe, None).unwrap();
        assert_eq!(task.name(), "renamed");

        task.prepare_for_group(TaskGroupId::INVALID).unwrap();
        assert!(matches!(
            task.configure("again", TaskNesting::Never, None),
            Err(SchedulerError::TaskAlreadyScheduled(_))
        ));
        assert!(matches!(
            task.set_multiplicity(4),
            Err(SchedulerError::TaskAlreadyScheduled(_))
        ));
        assert_eq!(task.name(), "renamed");
    }

    #[test]
    fn zero_multiplicity_rejected() {
        let task = noop();
        assert!(matches!(
            task.set_multiplicity(0),
            Err(SchedulerError::InvalidMultiplicity)
        ));
        assert_eq!(task.multiplicity(), 1);
    }

    #[test]
    fn task_cannot_join_two_groups() {
        let task = noop();
        task.prepare_for_group(TaskGroupId::INVALID).unwrap();
        assert!(task.prepare_for_group(TaskGroupId::INVALID).is_err());
    }

    #[test]
    fn invocations_claimed_once_each() {
        let task = noop();
        task.set_multiplicity(3).unwrap();
        task.prepare_for_group(TaskGroupId::INVALID).unwrap();

        assert_eq!(task.claim_invocation(), Some(0));
        assert_eq!(task.claim_invocation(), Some(1));
        assert!(task.has_unclaimed_invocations());
        assert_eq!(task.claim_invocation(), Some(2));
        assert_eq!(task.claim_invocation(), None);
        assert!(!task.has_unclaimed_invocations());

        assert!(!task.complete_invocations(1));
        assert!(!task.complete_invocations(1));
        assert!(task.complete_invocations(1));
    }

    #[test]
    fn skipping_counts_unclaimed_invocations() {
        let task = noop();
        task.set_multiplicity(10).unwrap();
        task.prepare_for_group(TaskGroupId::INVALID).unwrap();
        task.claim_invocation();
        task.claim_invocation();

        assert_eq!(task.skip_unclaimed(), 8);
        assert_eq!(task.claim_invocation(), None);
        assert!(!task.complete_invocations(8));
        assert!(task.complete_invocations(2));
    }

    #[test]
    fn finished_task_can_be_rescheduled() {
        let finished = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&finished);
        let task = noop();
        task.configure(
            "reused",
            TaskNesting::Never,
            Some(Arc::new(move |_: &Arc<Task>| {
                counter.fetch_add(1, Ordering::Relaxed);
            })),
        )
        .unwrap();

        task.prepare_for_group(TaskGroupId::INVALID).unwrap();
        task.mark_canceled();
        task.finish();
        assert!(task.is_task_finished());
        assert_eq!(finished.load(Ordering::Relaxed), 1);

        task.prepare_for_group(TaskGroupId::INVALID).unwrap();
        assert_eq!(task.state(), TaskState::Pending);
        assert!(!task.has_been_canceled());
    }
}
