use std::cell::Cell;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use frametask_core::SchedulerConfig;
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::info;

use crate::error::SchedulerError;
use crate::group::GroupTable;
use crate::metrics::SchedulerMetrics;
use crate::queue::ReadyQueues;
use crate::types::WorkerThreadType;

use super::pool::WorkerPools;

thread_local! {
    /// Scheduler id and pool class of the current thread, if it is a worker.
    pub(super) static WORKER_IDENTITY: Cell<Option<(u64, WorkerThreadType)>> = const { Cell::new(None) };
    /// Nesting depth of helping waits on the current thread.
    pub(super) static HELP_DEPTH: Cell<u32> = const { Cell::new(0) };
}

pub(crate) struct Inner {
    pub(super) id: u64,
    pub(super) config: SchedulerConfig,
    /// Lock order: `groups` before `queues`.
    pub(super) groups: Mutex<GroupTable>,
    pub(super) queues: Mutex<ReadyQueues>,
    /// Paired with `queues`; signaled whenever the queue epoch moves.
    pub(super) signal: Condvar,
    pub(super) pools: Mutex<WorkerPools>,
    pub(super) shutdown: AtomicBool,
    pub(super) main_thread: ThreadId,
    pub(super) metrics: RwLock<SchedulerMetrics>,
    pub(super) invocations: AtomicU64,
}

/// Cloneable access to a running scheduler. Everything except construction
/// and shutdown lives here; tasks reach it through
/// [`TaskContext::scheduler`](crate::TaskContext::scheduler).
#[derive(Clone)]
pub struct SchedulerHandle {
    pub(super) inner: Arc<Inner>,
}

/// Owns the worker pools. Dropping it stops and joins every worker.
///
/// The thread that constructs the scheduler is its main thread: only that
/// thread may call [`SchedulerHandle::finish_frame_tasks`], and only it runs
/// main-thread priorities.
pub struct Scheduler {
    handle: SchedulerHandle,
}

impl Scheduler {
    /// Create a scheduler and spawn both worker pools.
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);

        config.validate()?;
        let short = config.resolved_short_worker_threads();
        let long = config.long_worker_threads;

        let inner = Arc::new(Inner {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            config,
            groups: Mutex::new(GroupTable::new()),
            queues: Mutex::new(ReadyQueues::new()),
            signal: Condvar::new(),
            pools: Mutex::new(WorkerPools::new()),
            shutdown: AtomicBool::new(false),
            main_thread: thread::current().id(),
            metrics: RwLock::new(SchedulerMetrics::default()),
            invocations: AtomicU64::new(0),
        });
        let scheduler = Self {
            handle: SchedulerHandle { inner },
        };
        // on error the partially spawned pools are torn down by Drop
        scheduler.handle.set_worker_thread_count(short, long)?;

        info!(
            "Scheduler started with {} short and {} long workers",
            scheduler.num_allocated_worker_threads(WorkerThreadType::ShortTasks),
            scheduler.num_allocated_worker_threads(WorkerThreadType::LongTasks),
        );
        Ok(scheduler)
    }

    /// Create a scheduler with default settings.
    pub fn with_defaults() -> Result<Self, SchedulerError> {
        Self::new(SchedulerConfig::default())
    }

    /// A handle that can be moved to other threads or stored in tasks.
    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }
}

impl Deref for Scheduler {
    type Target = SchedulerHandle;

    fn deref(&self) -> &SchedulerHandle {
        &self.handle
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.handle.shutdown_pools();
    }
}

impl SchedulerHandle {
    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// True on the thread that constructed the scheduler.
    pub fn is_main_thread(&self) -> bool {
        thread::current().id() == self.inner.main_thread
    }

    /// Pool class of the calling thread, `None` if it is not one of this scheduler's workers.
    pub fn current_thread_worker_type(&self) -> Option<WorkerThreadType> {
        WORKER_IDENTITY
            .with(|identity| identity.get())
            .filter(|(id, _)| *id == self.inner.id)
            .map(|(_, class)| class)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    /// Snapshot of the scheduler metrics.
    pub fn metrics(&self) -> SchedulerMetrics {
        let mut metrics = self.inner.metrics.read().clone();
        metrics.invocations_executed = self.inner.invocations.load(Ordering::Relaxed);
        let depths = self.inner.queues.lock().depths();
        metrics.queue_depths = depths.into_iter().collect();
        for class in [WorkerThreadType::ShortTasks, WorkerThreadType::LongTasks] {
            metrics
                .worker_threads
                .insert(class, self.num_allocated_worker_threads(class));
        }
        metrics
    }

    /// Number of groups created and not yet finished.
    pub fn live_group_count(&self) -> usize {
        self.inner.groups.lock().live_count()
    }
}
