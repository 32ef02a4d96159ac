use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::MutexGuard;
use tracing::{debug, error};

use crate::group::{GroupPhase, GroupTable, TaskGroupId};
use crate::queue::{Claim, WorkItem};
use crate::task::{Task, TaskState};

use super::core::SchedulerHandle;

impl SchedulerHandle {
    /// Bump the queue epoch and wake every sleeping thread.
    pub(super) fn wake_all(&self) {
        let mut queues = self.inner.queues.lock();
        queues.bump();
        self.inner.signal.notify_all();
    }

    /// Push the tasks of a ready group to its priority queue.
    /// Returns true when the group had no task left to run and must be finished by the caller.
    fn dispatch_locked(&self, groups: &mut GroupTable, id: TaskGroupId) -> bool {
        let Some(group) = groups.get_mut(id) else {
            return false;
        };
        group.phase = GroupPhase::Running;
        let priority = group.priority;

        let mut live = 0;
        {
            let mut queues = self.inner.queues.lock();
            for task in &group.tasks {
                // tasks canceled while pending are finished, and may since
                // have been added to another group
                if task.owner() == id && task.transition(TaskState::Pending, TaskState::Queued) {
                    queues.push(
                        priority,
                        WorkItem {
                            task: Arc::clone(task),
                            group: id,
                        },
                    );
                    live += 1;
                }
            }
            if live > 0 {
                queues.bump();
                self.inner.signal.notify_all();
            }
        }
        group.remaining_tasks = live;
        let empty = live == 0;
        if empty {
            group.phase = GroupPhase::Finishing;
        }

        if priority.is_this_frame() {
            groups.this_frame_pending += 1;
        }
        debug!("Dispatched group {} at {:?} with {} tasks", id, priority, live);
        empty
    }

    /// Dispatch a group that just became ready, releasing the group lock
    /// before any completion work runs.
    pub(super) fn dispatch(&self, mut groups: MutexGuard<'_, GroupTable>, id: TaskGroupId) {
        let empty = self.dispatch_locked(&mut groups, id);
        drop(groups);
        if empty {
            self.finish_group(id);
        }
    }

    /// Run the completion callback, retire the group and dispatch every
    /// dependent it released. Empty dependents finish in the same pass.
    pub(super) fn finish_group(&self, id: TaskGroupId) {
        let mut worklist = vec![id];
        while let Some(id) = worklist.pop() {
            let callback = self.inner.groups.lock().take_callback(id);
            if let Some(callback) = callback {
                if panic::catch_unwind(AssertUnwindSafe(|| callback(id))).is_err() {
                    error!("Completion callback of group {} panicked", id);
                }
            }

            {
                let mut groups = self.inner.groups.lock();
                for next in groups.complete(id) {
                    if self.dispatch_locked(&mut groups, next) {
                        worklist.push(next);
                    }
                }
            }
            self.inner.metrics.write().groups_finished += 1;
            debug!("Group {} finished", id);
        }
        self.wake_all();
    }

    /// Execute what a thread claimed from the queues.
    pub(super) fn run_claim(&self, claim: Claim) {
        match claim {
            Claim::Run {
                task,
                group,
                invocation,
            } => {
                let started = Instant::now();
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| task.invoke(invocation, self)));
                task.record_invocation(started.elapsed());
                self.inner.invocations.fetch_add(1, Ordering::Relaxed);
                if outcome.is_err() {
                    error!("Task '{}' panicked in invocation {}", task.name(), invocation);
                    self.inner.metrics.write().tasks_panicked += 1;
                }
                if task.complete_invocations(1) {
                    self.finish_task(&task, group);
                }
            }
            Claim::Skipped {
                task,
                group,
                skipped,
            } => {
                debug!("Skipped {} invocations of canceled task '{}'", skipped, task.name());
                if task.complete_invocations(skipped) {
                    self.finish_task(&task, group);
                }
            }
        }
    }

    fn finish_task(&self, task: &Arc<Task>, group: TaskGroupId) {
        let (invocations, run_time) = task.run_stats();
        self.inner
            .metrics
            .write()
            .record_task(&task.name(), invocations, run_time);
        task.finish();
        self.tasks_done(group, 1);
    }

    /// Account for finished tasks of `group`, finishing it if they were the last.
    pub(super) fn tasks_done(&self, group: TaskGroupId, count: usize) {
        let finishing = self.inner.groups.lock().tasks_finished(group, count);
        if finishing {
            self.finish_group(group);
        }
    }
}
