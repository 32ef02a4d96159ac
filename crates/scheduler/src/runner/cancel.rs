use std::sync::Arc;

use tracing::{debug, warn};

use crate::group::TaskGroupId;
use crate::task::{Task, TaskState};
use crate::types::{CancelOutcome, OnTaskRunning};

use super::core::SchedulerHandle;

impl SchedulerHandle {
    /// Cancel a task.
    ///
    /// A task that has not started is removed and counts as finished for its
    /// group. A running task only gets its cancel flag set; its work decides
    /// whether to stop early.
    pub fn cancel_task(&self, task: &Arc<Task>, on_running: OnTaskRunning) -> CancelOutcome {
        self.cancel_owned(task, None, on_running)
    }

    /// Cancel `task`, but only while it still belongs to `owner` when one is given.
    fn cancel_owned(
        &self,
        task: &Arc<Task>,
        owner: Option<TaskGroupId>,
        on_running: OnTaskRunning,
    ) -> CancelOutcome {
        let owned = || owner.map_or(true, |owner| task.owner() == owner);
        loop {
            match task.state() {
                TaskState::Idle | TaskState::Finished => return CancelOutcome::AlreadyFinished,
                TaskState::Pending => {
                    let canceled = {
                        // re-adding to a group and dispatch both hold this lock
                        let _groups = self.inner.groups.lock();
                        if !owned() {
                            return CancelOutcome::AlreadyFinished;
                        }
                        task.transition(TaskState::Pending, TaskState::Finished)
                    };
                    if canceled {
                        self.task_canceled(task);
                        return CancelOutcome::Canceled;
                    }
                }
                TaskState::Queued => {
                    let removed = {
                        let _groups = self.inner.groups.lock();
                        if !owned() {
                            return CancelOutcome::AlreadyFinished;
                        }
                        self.inner.queues.lock().remove_queued(task)
                    };
                    if let Some(item) = removed {
                        self.task_canceled(task);
                        self.tasks_done(item.group, 1);
                        return CancelOutcome::Canceled;
                    }
                }
                TaskState::Running => {
                    if !owned() {
                        return CancelOutcome::AlreadyFinished;
                    }
                    task.mark_canceled();
                    return match on_running {
                        OnTaskRunning::ReturnWithoutBlocking => CancelOutcome::StillRunning,
                        OnTaskRunning::WaitTillFinished => {
                            warn!("Task '{}' is already running, waiting for it to return", task.name());
                            self.wait_for_condition(|| task.is_task_finished());
                            CancelOutcome::RanToCompletion
                        }
                    };
                }
            }
            // lost a race with a worker, look again
        }
    }

    /// Cancel every task of a group. Succeeds only if none of them was running.
    ///
    /// Dependents of a canceled group still run once it finished.
    pub fn cancel_group(&self, group: TaskGroupId, on_running: OnTaskRunning) -> CancelOutcome {
        let tasks = match self.inner.groups.lock().get(group) {
            Some(g) => g.tasks.clone(),
            None => return CancelOutcome::AlreadyFinished,
        };

        let mut canceled_any = false;
        let mut running = Vec::new();
        for task in &tasks {
            match self.cancel_owned(task, Some(group), OnTaskRunning::ReturnWithoutBlocking) {
                CancelOutcome::Canceled => canceled_any = true,
                CancelOutcome::StillRunning => running.push(Arc::clone(task)),
                CancelOutcome::AlreadyFinished | CancelOutcome::RanToCompletion => {}
            }
        }
        debug!(
            "Canceled group {}: {} tasks, {} still running",
            group,
            tasks.len(),
            running.len()
        );

        if running.is_empty() {
            return if canceled_any {
                CancelOutcome::Canceled
            } else {
                CancelOutcome::AlreadyFinished
            };
        }
        match on_running {
            OnTaskRunning::ReturnWithoutBlocking => CancelOutcome::StillRunning,
            OnTaskRunning::WaitTillFinished => {
                warn!(
                    "Group {} has {} running tasks, waiting for them to return",
                    group,
                    running.len()
                );
                self.wait_for_condition(|| running.iter().all(|t| t.is_task_finished()));
                CancelOutcome::RanToCompletion
            }
        }
    }

    fn task_canceled(&self, task: &Arc<Task>) {
        task.mark_canceled();
        task.notify_finished();
        self.inner.metrics.write().tasks_canceled += 1;
        debug!("Task '{}' canceled before it started", task.name());
    }
}
