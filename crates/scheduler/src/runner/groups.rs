use std::sync::Arc;

use tracing::debug;

use crate::error::SchedulerError;
use crate::group::{GroupFinishedCallback, TaskGroupId};
use crate::task::Task;
use crate::types::Priority;

use super::core::SchedulerHandle;

impl SchedulerHandle {
    /// Create an empty group. Tasks and dependencies can be attached until
    /// [`start_task_group`](Self::start_task_group) is called.
    pub fn create_task_group(
        &self,
        priority: Priority,
        on_finished: Option<GroupFinishedCallback>,
    ) -> TaskGroupId {
        self.inner.groups.lock().create(priority, on_finished)
    }

    /// Attach a task. Fails if the group was started or the task is still
    /// scheduled elsewhere.
    pub fn add_task_to_group(&self, group: TaskGroupId, task: &Arc<Task>) -> Result<(), SchedulerError> {
        self.inner.groups.lock().add_task(group, Arc::clone(task))
    }

    /// `dependent` will not be dispatched before `dependency` finished.
    /// A dependency that already finished (or a stale handle) is ignored.
    pub fn add_task_group_dependency(
        &self,
        dependent: TaskGroupId,
        dependency: TaskGroupId,
    ) -> Result<(), SchedulerError> {
        self.inner
            .groups
            .lock()
            .add_dependency(dependent, dependency)
    }

    /// Seal the group. It is dispatched as soon as all its dependencies finished.
    pub fn start_task_group(&self, group: TaskGroupId) -> Result<(), SchedulerError> {
        let mut groups = self.inner.groups.lock();
        if groups.start(group)? {
            self.dispatch(groups, group);
        } else {
            debug!("Group {} waits for its dependencies", group);
        }
        Ok(())
    }

    /// Create, fill and start a one-task group in a single step.
    pub fn start_single_task(
        &self,
        task: &Arc<Task>,
        priority: Priority,
        dependency: Option<TaskGroupId>,
    ) -> Result<TaskGroupId, SchedulerError> {
        let mut groups = self.inner.groups.lock();
        let id = groups.create(priority, None);
        if let Err(e) = groups.add_task(id, Arc::clone(task)) {
            groups.recycle(id);
            return Err(e);
        }
        if let Some(dependency) = dependency {
            groups.add_dependency(id, dependency)?;
        }
        if groups.start(id)? {
            self.dispatch(groups, id);
        }
        Ok(id)
    }

    /// True once the group finished. Stale and invalid handles are finished.
    pub fn is_task_group_finished(&self, group: TaskGroupId) -> bool {
        self.inner.groups.lock().is_finished(group)
    }
}
