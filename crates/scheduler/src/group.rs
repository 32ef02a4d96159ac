//! Task group storage.
//!
//! Groups live in generation-tagged slots. A slot's generation is bumped when
//! its group finishes, so every handle to the old group reads as finished and
//! can never alias the group that reuses the slot.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::SchedulerError;
use crate::task::Task;
use crate::types::Priority;

/// Handle to one task group instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TaskGroupId {
    index: u32,
    generation: u32,
}

impl TaskGroupId {
    /// Never refers to a live group; always reported as finished.
    pub const INVALID: TaskGroupId = TaskGroupId {
        index: u32::MAX,
        generation: 0,
    };

    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl Default for TaskGroupId {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for TaskGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

/// Called once when a group finished, before waiters are released.
pub type GroupFinishedCallback = Box<dyn FnOnce(TaskGroupId) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GroupPhase {
    /// Tasks and dependencies may still be attached.
    Created,
    /// Started, waiting for predecessors.
    Waiting,
    /// Tasks dispatched to the ready queues.
    Running,
    /// All tasks done, completion callback running.
    Finishing,
}

pub(crate) struct TaskGroup {
    pub priority: Priority,
    pub phase: GroupPhase,
    pub tasks: Vec<Arc<Task>>,
    /// Groups that wait for this one.
    pub dependents: Vec<TaskGroupId>,
    /// Groups this one waited for at registration time (diagnostics only).
    pub predecessors: Vec<TaskGroupId>,
    pub remaining_dependencies: usize,
    pub remaining_tasks: usize,
    pub on_finished: Option<GroupFinishedCallback>,
}

struct GroupSlot {
    generation: u32,
    group: Option<TaskGroup>,
}

/// All live groups. Guarded by the scheduler's group lock.
pub(crate) struct GroupTable {
    slots: Vec<GroupSlot>,
    free: Vec<u32>,
    /// Dispatched, unfinished groups with a this-frame priority.
    pub(crate) this_frame_pending: usize,
}

impl GroupTable {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            this_frame_pending: 0,
        }
    }

    pub fn create(
        &mut self,
        priority: Priority,
        on_finished: Option<GroupFinishedCallback>,
    ) -> TaskGroupId {
        let group = TaskGroup {
            priority,
            phase: GroupPhase::Created,
            tasks: Vec::new(),
            dependents: Vec::new(),
            predecessors: Vec::new(),
            remaining_dependencies: 0,
            remaining_tasks: 0,
            on_finished,
        };

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(GroupSlot {
                    generation: 1,
                    group: None,
                });
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.group = Some(group);
        TaskGroupId {
            index,
            generation: slot.generation,
        }
    }

    pub fn get(&self, id: TaskGroupId) -> Option<&TaskGroup> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.group.as_ref()
    }

    pub fn get_mut(&mut self, id: TaskGroupId) -> Option<&mut TaskGroup> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.group.as_mut()
    }

    /// Stale, recycled and invalid handles all count as finished.
    pub fn is_finished(&self, id: TaskGroupId) -> bool {
        self.get(id).is_none()
    }

    pub fn add_task(&mut self, id: TaskGroupId, task: Arc<Task>) -> Result<(), SchedulerError> {
        let group = self.get_mut(id).ok_or(SchedulerError::GroupNotFound(id))?;
        if group.phase != GroupPhase::Created {
            return Err(SchedulerError::GroupAlreadyStarted(id));
        }
        task.prepare_for_group(id)?;
        group.tasks.push(task);
        Ok(())
    }

    /// Mark the group started. Returns true when it can be dispatched right away.
    pub fn start(&mut self, id: TaskGroupId) -> Result<bool, SchedulerError> {
        let group = self.get_mut(id).ok_or(SchedulerError::GroupNotFound(id))?;
        if group.phase != GroupPhase::Created {
            return Err(SchedulerError::GroupAlreadyStarted(id));
        }
        group.phase = GroupPhase::Waiting;
        Ok(group.remaining_dependencies == 0)
    }

    /// Account for `count` finished tasks. Returns true when the group has no
    /// task left and moved to `Finishing`.
    pub fn tasks_finished(&mut self, id: TaskGroupId, count: usize) -> bool {
        let Some(group) = self.get_mut(id) else {
            return false;
        };
        debug_assert!(group.remaining_tasks >= count, "task accounting underflow");
        group.remaining_tasks = group.remaining_tasks.saturating_sub(count);
        if group.remaining_tasks == 0 && group.phase == GroupPhase::Running {
            group.phase = GroupPhase::Finishing;
            return true;
        }
        false
    }

    pub fn take_callback(&mut self, id: TaskGroupId) -> Option<GroupFinishedCallback> {
        self.get_mut(id).and_then(|g| g.on_finished.take())
    }

    /// Free the slot of a finished group. The generation bump invalidates
    /// every outstanding handle.
    pub(crate) fn recycle(&mut self, id: TaskGroupId) -> Option<TaskGroup> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let group = slot.group.take()?;
        slot.generation = slot.generation.wrapping_add(1).max(1);
        self.free.push(id.index);
        Some(group)
    }

    /// Live groups in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (TaskGroupId, &TaskGroup)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.group.as_ref().map(|group| {
                (
                    TaskGroupId {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    group,
                )
            })
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (TaskGroupId, &mut TaskGroup)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.group.as_mut().map(|group| {
                (
                    TaskGroupId {
                        index: index as u32,
                        generation,
                    },
                    group,
                )
            })
        })
    }

    pub fn live_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(name: &str) -> Arc<Task> {
        Task::from_fn(name, |_| {})
    }

    #[test]
    fn create_returns_distinct_handles() {
        let mut table = GroupTable::new();
        let a = table.create(Priority::ThisFrame, None);
        let b = table.create(Priority::NextFrame, None);
        assert_ne!(a, b);
        assert!(!table.is_finished(a));
        assert_eq!(table.get(b).unwrap().priority, Priority::NextFrame);
        assert_eq!(table.live_count(), 2);
    }

    #[test]
    fn recycled_slot_never_aliases_stale_handle() {
        let mut table = GroupTable::new();
        let old = table.create(Priority::ThisFrame, None);
        table.recycle(old).unwrap();
        assert!(table.is_finished(old));

        let new = table.create(Priority::ThisFrame, None);
        assert_eq!(new.index(), old.index());
        assert_ne!(new.generation(), old.generation());
        assert!(table.is_finished(old));
        assert!(!table.is_finished(new));
        assert!(table.get(old).is_none());
    }

    #[test]
    fn invalid_handle_is_finished() {
        let table = GroupTable::new();
        assert!(table.is_finished(TaskGroupId::INVALID));
        assert!(!TaskGroupId::default().is_valid());
    }

    #[test]
    fn tasks_rejected_after_start() {
        let mut table = GroupTable::new();
        let id = table.create(Priority::ThisFrame, None);
        table.add_task(id, task("a")).unwrap();
        assert!(table.start(id).unwrap());
        assert!(matches!(
            table.add_task(id, task("b")),
            Err(SchedulerError::GroupAlreadyStarted(_))
        ));
        assert!(matches!(
            table.start(id),
            Err(SchedulerError::GroupAlreadyStarted(_))
        ));
    }

    #[test]
    fn add_task_to_stale_group_fails() {
        let mut table = GroupTable::new();
        let id = table.create(Priority::ThisFrame, None);
        table.recycle(id);
        assert!(matches!(
            table.add_task(id, task("late")),
            Err(SchedulerError::GroupNotFound(_))
        ));
    }

    #[test]
    fn tasks_finished_moves_running_group_to_finishing() {
        let mut table = GroupTable::new();
        let id = table.create(Priority::ThisFrame, None);
        {
            let group = table.get_mut(id).unwrap();
            group.phase = GroupPhase::Running;
            group.remaining_tasks = 2;
        }
        assert!(!table.tasks_finished(id, 1));
        assert!(table.tasks_finished(id, 1));
        assert_eq!(table.get(id).unwrap().phase, GroupPhase::Finishing);
    }

    #[test]
    fn display_shows_index_and_generation() {
        let mut table = GroupTable::new();
        let id = table.create(Priority::ThisFrame, None);
        assert_eq!(id.to_string(), "#0.1");
    }
}
