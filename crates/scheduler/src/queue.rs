//! Ready queues, one FIFO per priority.
//!
//! A task with multiplicity stays at its queue position until its last
//! invocation was handed out, so several threads can fan out over it.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::group::TaskGroupId;
use crate::task::{Task, TaskState};
use crate::types::{Priority, TaskNesting};

pub(crate) struct WorkItem {
    pub task: Arc<Task>,
    pub group: TaskGroupId,
}

/// What a thread got from the queues.
pub(crate) enum Claim {
    /// Run one invocation.
    Run {
        task: Arc<Task>,
        group: TaskGroupId,
        invocation: u32,
    },
    /// A canceled multiplicity task gave up its unclaimed invocations.
    Skipped {
        task: Arc<Task>,
        group: TaskGroupId,
        skipped: u32,
    },
}

pub(crate) struct ReadyQueues {
    queues: [VecDeque<WorkItem>; Priority::COUNT],
    /// Bumped on every event a waiting thread may care about.
    pub epoch: u64,
}

impl ReadyQueues {
    pub fn new() -> Self {
        Self {
            queues: std::array::from_fn(|_| VecDeque::new()),
            epoch: 0,
        }
    }

    pub fn push(&mut self, priority: Priority, item: WorkItem) {
        self.queues[priority.index()].push_back(item);
    }

    pub fn bump(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
    }

    pub fn len(&self, priority: Priority) -> usize {
        self.queues[priority.index()].len()
    }

    /// Take one invocation from the first non-empty queue in `priorities`.
    ///
    /// With `never_only`, tasks that may wait themselves are passed over.
    pub fn claim(&mut self, priorities: &[Priority], never_only: bool) -> Option<Claim> {
        for priority in priorities {
            let queue = &mut self.queues[priority.index()];
            let position = if never_only {
                queue
                    .iter()
                    .position(|item| item.task.nesting() == TaskNesting::Never)
            } else if queue.is_empty() {
                None
            } else {
                Some(0)
            };
            let Some(position) = position else {
                continue;
            };

            let item = &queue[position];
            if item.task.has_been_canceled() && item.task.state() == TaskState::Running {
                let skipped = item.task.skip_unclaimed();
                let item = queue.remove(position)?;
                return Some(Claim::Skipped {
                    task: item.task,
                    group: item.group,
                    skipped,
                });
            }

            let Some(invocation) = item.task.claim_invocation() else {
                // exhausted items are removed on their last claim
                queue.remove(position);
                continue;
            };
            if invocation == 0 {
                item.task.transition(TaskState::Queued, TaskState::Running);
            }

            let (task, group) = if item.task.has_unclaimed_invocations() {
                (Arc::clone(&item.task), item.group)
            } else {
                let item = queue.remove(position)?;
                (item.task, item.group)
            };
            return Some(Claim::Run {
                task,
                group,
                invocation,
            });
        }
        None
    }

    /// Remove a task that has not started yet. Caller must have observed it as queued.
    pub fn remove_queued(&mut self, task: &Arc<Task>) -> Option<WorkItem> {
        for queue in self.queues.iter_mut() {
            let Some(position) = queue.iter().position(|item| Arc::ptr_eq(&item.task, task)) else {
                continue;
            };
            if !task.transition(TaskState::Queued, TaskState::Finished) {
                return None;
            }
            return queue.remove(position);
        }
        None
    }

    /// Move every next-frame item to its this-frame queue, keeping FIFO order.
    pub fn promote_next_frame(&mut self) -> usize {
        let mut moved = 0;
        for priority in Priority::ALL.iter().filter(|p| p.is_next_frame()) {
            let items = std::mem::take(&mut self.queues[priority.index()]);
            moved += items.len();
            self.queues[priority.promoted().index()].extend(items);
        }
        moved
    }

    pub fn depths(&self) -> Vec<(Priority, usize)> {
        Priority::ALL.iter().map(|p| (*p, self.len(*p))).collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::group::GroupTable;

    use super::*;

    fn queued(name: &str, multiplicity: u32) -> Arc<Task> {
        let task = Task::from_fn(name, |_| {});
        task.set_multiplicity(multiplicity).unwrap();
        task.prepare_for_group(TaskGroupId::INVALID).unwrap();
        assert!(task.transition(TaskState::Pending, TaskState::Queued));
        task
    }

    fn group() -> TaskGroupId {
        GroupTable::new().create(Priority::ThisFrame, None)
    }

    fn run_name(claim: Option<Claim>) -> Option<(String, u32)> {
        match claim? {
            Claim::Run { task, invocation, .. } => Some((task.name(), invocation)),
            Claim::Skipped { .. } => None,
        }
    }

    #[test]
    fn fifo_within_priority() {
        let mut queues = ReadyQueues::new();
        let g = group();
        queues.push(Priority::ThisFrame, WorkItem { task: queued("a", 1), group: g });
        queues.push(Priority::ThisFrame, WorkItem { task: queued("b", 1), group: g });

        let prios = [Priority::ThisFrame];
        assert_eq!(run_name(queues.claim(&prios, false)), Some(("a".into(), 0)));
        assert_eq!(run_name(queues.claim(&prios, false)), Some(("b".into(), 0)));
        assert!(queues.claim(&prios, false).is_none());
    }

    #[test]
    fn higher_priority_first() {
        let mut queues = ReadyQueues::new();
        let g = group();
        queues.push(Priority::LateThisFrame, WorkItem { task: queued("late", 1), group: g });
        queues.push(Priority::EarlyThisFrame, WorkItem { task: queued("early", 1), group: g });

        let prios = [Priority::EarlyThisFrame, Priority::ThisFrame, Priority::LateThisFrame];
        assert_eq!(run_name(queues.claim(&prios, false)).unwrap().0, "early");
        assert_eq!(run_name(queues.claim(&prios, false)).unwrap().0, "late");
    }

    #[test]
    fn multiplicity_stays_queued_until_last_invocation() {
        let mut queues = ReadyQueues::new();
        let task = queued("fan", 3);
        queues.push(Priority::ThisFrame, WorkItem { task: Arc::clone(&task), group: group() });

        let prios = [Priority::ThisFrame];
        for expected in 0..3 {
            assert_eq!(run_name(queues.claim(&prios, false)).unwrap().1, expected);
        }
        assert_eq!(queues.len(Priority::ThisFrame), 0);
        assert_eq!(task.state(), TaskState::Running);
    }

    #[test]
    fn never_only_skips_tasks_that_may_wait() {
        let mut queues = ReadyQueues::new();
        let g = group();
        let waiting = Task::from_fn("nested", |_| {});
        waiting
            .configure("nested", TaskNesting::Maybe, None)
            .unwrap();
        waiting.prepare_for_group(TaskGroupId::INVALID).unwrap();
        waiting.transition(TaskState::Pending, TaskState::Queued);
        queues.push(Priority::ThisFrame, WorkItem { task: waiting, group: g });
        queues.push(Priority::ThisFrame, WorkItem { task: queued("leaf", 1), group: g });

        let prios = [Priority::ThisFrame];
        assert_eq!(run_name(queues.claim(&prios, true)).unwrap().0, "leaf");
        assert!(queues.claim(&prios, true).is_none());
        assert_eq!(run_name(queues.claim(&prios, false)).unwrap().0, "nested");
    }

    #[test]
    fn canceled_running_multiplicity_skips_rest() {
        let mut queues = ReadyQueues::new();
        let task = queued("fan", 5);
        queues.push(Priority::ThisFrame, WorkItem { task: Arc::clone(&task), group: group() });

        let prios = [Priority::ThisFrame];
        assert!(run_name(queues.claim(&prios, false)).is_some());
        task.mark_canceled();
        match queues.claim(&prios, false) {
            Some(Claim::Skipped { skipped, .. }) => assert_eq!(skipped, 4),
            _ => panic!("expected skipped claim"),
        }
        assert_eq!(queues.len(Priority::ThisFrame), 0);
    }

    #[test]
    fn remove_queued_only_before_start() {
        let mut queues = ReadyQueues::new();
        let task = queued("victim", 1);
        queues.push(Priority::NextFrame, WorkItem { task: Arc::clone(&task), group: group() });

        assert!(queues.remove_queued(&task).is_some());
        assert_eq!(task.state(), TaskState::Finished);
        assert_eq!(queues.len(Priority::NextFrame), 0);
        assert!(queues.remove_queued(&task).is_none());
    }

    #[test]
    fn promotion_appends_behind_this_frame_work() {
        let mut queues = ReadyQueues::new();
        let g = group();
        queues.push(Priority::ThisFrame, WorkItem { task: queued("current", 1), group: g });
        queues.push(Priority::NextFrame, WorkItem { task: queued("next", 1), group: g });
        queues.push(Priority::LateNextFrame, WorkItem { task: queued("late-next", 1), group: g });

        assert_eq!(queues.promote_next_frame(), 2);
        assert_eq!(queues.len(Priority::NextFrame), 0);
        assert_eq!(queues.len(Priority::ThisFrame), 2);
        assert_eq!(queues.len(Priority::LateThisFrame), 1);

        let prios = [Priority::ThisFrame];
        assert_eq!(run_name(queues.claim(&prios, false)).unwrap().0, "current");
        assert_eq!(run_name(queues.claim(&prios, false)).unwrap().0, "next");
    }
}
