use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::SchedulerError;
use crate::group::GroupPhase;
use crate::queue::Claim;
use crate::types::{Priority, FRAME_DRAIN_PRIORITIES};

use super::core::SchedulerHandle;

impl SchedulerHandle {
    /// Close the current frame. Main thread only.
    ///
    /// 1. Runs every queued `ThisFrameMainThread` task on the calling thread.
    /// 2. Runs `SomeFrameMainThread` tasks until the per-frame budget is used
    ///    (at least one, if any is queued).
    /// 3. Helps with this-frame work until every dispatched this-frame group finished.
    /// 4. Promotes next-frame groups and queued work to the matching this-frame priority.
    pub fn finish_frame_tasks(&self) -> Result<(), SchedulerError> {
        if !self.is_main_thread() {
            return Err(SchedulerError::NotMainThread);
        }
        let started = Instant::now();

        let mut main_thread_runs = 0usize;
        while let Some(claim) = self.claim_one(Priority::ThisFrameMainThread) {
            self.run_claim(claim);
            main_thread_runs += 1;
        }

        let budget = Duration::from_millis(self.inner.config.main_thread_budget_ms);
        let budget_start = Instant::now();
        let mut deferred_runs = 0usize;
        while let Some(claim) = self.claim_one(Priority::SomeFrameMainThread) {
            self.run_claim(claim);
            deferred_runs += 1;
            if budget_start.elapsed() >= budget {
                break;
            }
        }

        self.help_until(
            FRAME_DRAIN_PRIORITIES,
            || self.inner.groups.lock().this_frame_pending == 0,
            None,
        );

        let (promoted_groups, promoted_items) = self.promote_next_frame();
        self.inner.metrics.write().record_frame();

        debug!(
            "Frame finished in {:?}: {} main-thread, {} deferred, promoted {} groups ({} queued)",
            started.elapsed(),
            main_thread_runs,
            deferred_runs,
            promoted_groups,
            promoted_items
        );
        Ok(())
    }

    fn claim_one(&self, priority: Priority) -> Option<Claim> {
        self.inner.queues.lock().claim(&[priority], false)
    }

    /// Next-frame work becomes this-frame work. Groups not dispatched yet keep
    /// their priority and are promoted at a later frame boundary.
    fn promote_next_frame(&self) -> (usize, usize) {
        let mut groups = self.inner.groups.lock();
        let mut promoted = 0;
        for (_, group) in groups.iter_mut() {
            if group.phase == GroupPhase::Running && group.priority.is_next_frame() {
                group.priority = group.priority.promoted();
                promoted += 1;
            }
        }
        groups.this_frame_pending += promoted;
        let moved = self.inner.queues.lock().promote_next_frame();
        drop(groups);

        if moved > 0 {
            self.wake_all();
        }
        (promoted, moved)
    }
}
