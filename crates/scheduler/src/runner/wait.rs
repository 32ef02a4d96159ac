use std::sync::atomic::Ordering;
use std::time::Duration;

use tracing::debug;

use crate::group::TaskGroupId;
use crate::types::{
    Priority, WorkerThreadType, LONG_TASK_PRIORITIES, MAIN_THREAD_HELP_PRIORITIES,
    SHORT_TASK_PRIORITIES,
};

use super::core::{SchedulerHandle, HELP_DEPTH};

/// Re-check interval for conditions nobody signals.
const CONDITION_POLL: Duration = Duration::from_millis(1);

/// Tracks how deeply helping waits nest on this thread.
struct HelpScope {
    depth: u32,
}

impl HelpScope {
    fn enter() -> Self {
        let depth = HELP_DEPTH.with(|d| {
            let depth = d.get().saturating_add(1);
            d.set(depth);
            depth
        });
        Self { depth }
    }
}

impl Drop for HelpScope {
    fn drop(&mut self) {
        HELP_DEPTH.with(|d| d.set(self.depth - 1));
    }
}

impl SchedulerHandle {
    /// Block until the group finished, running other ready tasks meanwhile.
    ///
    /// Callable from any thread, including from inside a task configured with
    /// [`TaskNesting::Maybe`](crate::TaskNesting::Maybe). Returns early once
    /// the scheduler shuts down, since queued work is dropped then.
    pub fn wait_for_group(&self, group: TaskGroupId) {
        if self.is_task_group_finished(group) {
            return;
        }
        self.help_until(self.help_priorities(), || self.is_task_group_finished(group), None);
    }

    /// Block until `condition` holds, running other ready tasks meanwhile.
    /// The condition is re-checked whenever scheduler state moves and at
    /// least every millisecond.
    pub fn wait_for_condition(&self, condition: impl Fn() -> bool) {
        if condition() {
            return;
        }
        self.help_until(self.help_priorities(), condition, Some(CONDITION_POLL));
    }

    /// Queues the calling thread may take work from while it waits.
    fn help_priorities(&self) -> &'static [Priority] {
        match self.current_thread_worker_type() {
            Some(WorkerThreadType::ShortTasks) => SHORT_TASK_PRIORITIES,
            Some(WorkerThreadType::LongTasks) => LONG_TASK_PRIORITIES,
            None if self.is_main_thread() => MAIN_THREAD_HELP_PRIORITIES,
            None => SHORT_TASK_PRIORITIES,
        }
    }

    /// Help with `priorities` until `done` returns true.
    ///
    /// Past the configured nesting depth only tasks that never wait are
    /// taken, which bounds stack growth. Gives up after shutdown started:
    /// the workers that would run the awaited work are gone.
    pub(super) fn help_until(
        &self,
        priorities: &[Priority],
        done: impl Fn() -> bool,
        poll: Option<Duration>,
    ) {
        let scope = HelpScope::enter();
        let never_only = scope.depth > self.inner.config.max_help_depth;

        loop {
            let seen = self.inner.queues.lock().epoch;
            if done() {
                return;
            }
            if self.inner.shutdown.load(Ordering::Acquire) {
                debug!("Wait abandoned, scheduler is shutting down");
                return;
            }

            let mut queues = self.inner.queues.lock();
            if let Some(claim) = queues.claim(priorities, never_only) {
                drop(queues);
                self.run_claim(claim);
                continue;
            }
            // anything that happened since `seen` may already satisfy `done`
            if queues.epoch != seen {
                continue;
            }
            match poll {
                Some(timeout) => {
                    self.inner.signal.wait_for(&mut queues, timeout);
                }
                None => self.inner.signal.wait(&mut queues),
            }
        }
    }
}
