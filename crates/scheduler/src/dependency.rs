//! Dependency tracking between task groups.
//!
//! Each group counts its unresolved predecessors. The count only ever grows
//! for predecessors that are still alive, so every increment is matched by
//! exactly one decrement when that predecessor finishes.

use crate::error::SchedulerError;
use crate::group::{GroupPhase, GroupTable, TaskGroupId};

impl GroupTable {
    /// Make `dependent` wait for `dependency`.
    ///
    /// Depending on a group that already finished is a no-op.
    pub fn add_dependency(
        &mut self,
        dependent: TaskGroupId,
        dependency: TaskGroupId,
    ) -> Result<(), SchedulerError> {
        if dependent == dependency {
            return Err(SchedulerError::SelfDependency(dependent));
        }
        match self.get(dependent) {
            None => return Err(SchedulerError::GroupNotFound(dependent)),
            Some(group) if group.phase != GroupPhase::Created => {
                return Err(SchedulerError::GroupAlreadyStarted(dependent));
            }
            Some(_) => {}
        }

        let Some(predecessor) = self.get_mut(dependency) else {
            return Ok(());
        };
        if predecessor.dependents.contains(&dependent) {
            return Ok(());
        }
        predecessor.dependents.push(dependent);

        if let Some(group) = self.get_mut(dependent) {
            group.remaining_dependencies += 1;
            group.predecessors.push(dependency);
        }
        Ok(())
    }

    /// Retire a finished group and resolve its edges. Returns the dependents
    /// that became ready to dispatch.
    pub fn complete(&mut self, id: TaskGroupId) -> Vec<TaskGroupId> {
        let Some(group) = self.recycle(id) else {
            return Vec::new();
        };
        if group.priority.is_this_frame() {
            self.this_frame_pending = self.this_frame_pending.saturating_sub(1);
        }

        let mut ready = Vec::new();
        for dependent in group.dependents {
            let Some(next) = self.get_mut(dependent) else {
                continue;
            };
            next.remaining_dependencies = next.remaining_dependencies.saturating_sub(1);
            if next.remaining_dependencies == 0 && next.phase == GroupPhase::Waiting {
                ready.push(dependent);
            }
        }
        ready
    }
}

#[cfg(test)]
mod tests {
    use crate::types::Priority;

    use super::*;

    fn running(table: &mut GroupTable, id: TaskGroupId) {
        table.get_mut(id).unwrap().phase = GroupPhase::Running;
    }

    #[test]
    fn dependency_counts_live_predecessors() {
        let mut table = GroupTable::new();
        let a = table.create(Priority::ThisFrame, None);
        let b = table.create(Priority::ThisFrame, None);
        let c = table.create(Priority::ThisFrame, None);

        table.add_dependency(c, a).unwrap();
        table.add_dependency(c, b).unwrap();
        // duplicate edge is ignored
        table.add_dependency(c, a).unwrap();
        assert_eq!(table.get(c).unwrap().remaining_dependencies, 2);

        assert!(!table.start(c).unwrap());
        running(&mut table, a);
        running(&mut table, b);
        assert!(table.complete(a).is_empty());
        assert_eq!(table.complete(b), vec![c]);
    }

    #[test]
    fn dependency_on_finished_group_is_noop() {
        let mut table = GroupTable::new();
        let done = table.create(Priority::ThisFrame, None);
        running(&mut table, done);
        table.complete(done);

        let next = table.create(Priority::ThisFrame, None);
        table.add_dependency(next, done).unwrap();
        assert_eq!(table.get(next).unwrap().remaining_dependencies, 0);
        assert!(table.start(next).unwrap());
    }

    #[test]
    fn self_dependency_rejected() {
        let mut table = GroupTable::new();
        let a = table.create(Priority::ThisFrame, None);
        assert!(matches!(
            table.add_dependency(a, a),
            Err(SchedulerError::SelfDependency(_))
        ));
    }

    #[test]
    fn dependency_after_start_rejected() {
        let mut table = GroupTable::new();
        let a = table.create(Priority::ThisFrame, None);
        let b = table.create(Priority::ThisFrame, None);
        table.start(b).unwrap();
        assert!(matches!(
            table.add_dependency(b, a),
            Err(SchedulerError::GroupAlreadyStarted(_))
        ));
    }

    #[test]
    fn unstarted_dependent_is_not_released() {
        let mut table = GroupTable::new();
        let a = table.create(Priority::ThisFrame, None);
        let b = table.create(Priority::ThisFrame, None);
        table.add_dependency(b, a).unwrap();
        running(&mut table, a);

        // b reaches zero before it was started; start dispatches it directly
        assert!(table.complete(a).is_empty());
        assert!(table.start(b).unwrap());
    }

    #[test]
    fn completing_this_frame_group_lowers_pending_count() {
        let mut table = GroupTable::new();
        let a = table.create(Priority::LateThisFrame, None);
        running(&mut table, a);
        table.this_frame_pending = 1;
        table.complete(a);
        assert_eq!(table.this_frame_pending, 0);
    }
}
