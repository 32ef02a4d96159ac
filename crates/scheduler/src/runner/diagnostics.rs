use std::collections::HashMap;

use crate::group::GroupPhase;
use crate::snapshot::DgmlGraph;
use crate::task::TaskState;

use super::core::SchedulerHandle;

fn phase_color(phase: GroupPhase) -> &'static str {
    match phase {
        GroupPhase::Created => "#FFFFFF",
        GroupPhase::Waiting => "#FFF4C0",
        GroupPhase::Running => "#C8E6C9",
        GroupPhase::Finishing => "#D0D0D0",
    }
}

fn state_color(state: TaskState) -> Option<&'static str> {
    match state {
        TaskState::Running => Some("#81C784"),
        TaskState::Finished => Some("#E0E0E0"),
        _ => None,
    }
}

impl SchedulerHandle {
    /// Append every live group, its tasks and the dependency edges to `graph`.
    ///
    /// Finished groups are gone from the table and do not appear.
    pub fn write_state_snapshot_to_dgml(&self, graph: &mut DgmlGraph) {
        let groups = self.inner.groups.lock();

        let mut nodes = HashMap::new();
        for (id, group) in groups.iter() {
            let node = graph.add_group(
                format!(
                    "Group {} {:?} {:?} ({}/{} predecessors pending)",
                    id,
                    group.priority,
                    group.phase,
                    group.remaining_dependencies,
                    group.predecessors.len()
                ),
                Some(phase_color(group.phase)),
            );
            nodes.insert(id, node);

            for task in group.tasks.iter().filter(|task| task.owner() == id) {
                let state = task.state();
                let mut label = format!("{} [{:?}]", task.name(), state);
                if task.multiplicity() > 1 {
                    label.push_str(&format!(" x{}", task.multiplicity()));
                }
                if task.has_been_canceled() {
                    label.push_str(" canceled");
                }
                let member = graph.add_node(label, state_color(state));
                graph.add_to_group(node, member);
            }
        }

        for (id, group) in groups.iter() {
            for dependent in &group.dependents {
                if let (Some(&from), Some(&to)) = (nodes.get(&id), nodes.get(dependent)) {
                    graph.add_link(from, to, Some("then"));
                }
            }
        }
    }
}
