use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use frametask_core::SchedulerConfig;
use tracing::{debug, info};

use crate::error::SchedulerError;
use crate::types::WorkerThreadType;

use super::core::{SchedulerHandle, WORKER_IDENTITY};

struct Worker {
    /// Set to let this worker exit after its current invocation.
    retire: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// One pool of identically-classed worker threads.
pub(crate) struct WorkerPool {
    class: WorkerThreadType,
    active: Vec<Worker>,
    /// Retired workers that may still be finishing an invocation.
    retired: Vec<JoinHandle<()>>,
    spawned: usize,
}

impl WorkerPool {
    fn new(class: WorkerThreadType) -> Self {
        Self {
            class,
            active: Vec::new(),
            retired: Vec::new(),
            spawned: 0,
        }
    }

    /// Join retired workers that already exited.
    fn reap_retired(&mut self) {
        let (done, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.retired)
            .into_iter()
            .partition(|thread| thread.is_finished());
        for thread in done {
            let _ = thread.join();
        }
        self.retired = pending;
    }

    fn drain(&mut self) -> Vec<JoinHandle<()>> {
        let mut threads: Vec<_> = self.active.drain(..).map(|w| w.thread).collect();
        threads.append(&mut self.retired);
        threads
    }
}

pub(crate) struct WorkerPools {
    short: WorkerPool,
    long: WorkerPool,
}

impl WorkerPools {
    pub fn new() -> Self {
        Self {
            short: WorkerPool::new(WorkerThreadType::ShortTasks),
            long: WorkerPool::new(WorkerThreadType::LongTasks),
        }
    }

    fn pool(&self, class: WorkerThreadType) -> &WorkerPool {
        match class {
            WorkerThreadType::ShortTasks => &self.short,
            WorkerThreadType::LongTasks => &self.long,
        }
    }
}

impl SchedulerHandle {
    /// Resize both pools. `0` for short workers means "pick from the CPU
    /// count", `0` for long workers means the configured default. Each pool
    /// keeps at least one thread.
    ///
    /// Surplus workers finish the invocation they are running and exit;
    /// already queued work is not affected.
    pub fn set_worker_thread_count(&self, short: usize, long: usize) -> Result<(), SchedulerError> {
        let short = SchedulerConfig::resolve_short(short);
        let long = if long == 0 {
            self.inner.config.long_worker_threads.max(1)
        } else {
            long
        };

        let result = {
            let mut guard = self.inner.pools.lock();
            let pools = &mut *guard;
            match self.resize(&mut pools.short, short) {
                Ok(()) => self.resize(&mut pools.long, long),
                Err(e) => Err(e),
            }
        };
        // wake workers so retired ones notice
        self.wake_all();
        result?;

        info!("Worker pools resized to {} short and {} long", short, long);
        Ok(())
    }

    pub fn num_allocated_worker_threads(&self, class: WorkerThreadType) -> usize {
        self.inner.pools.lock().pool(class).active.len()
    }

    fn resize(&self, pool: &mut WorkerPool, target: usize) -> Result<(), SchedulerError> {
        pool.reap_retired();

        while pool.active.len() > target {
            let Some(worker) = pool.active.pop() else {
                break;
            };
            worker.retire.store(true, Ordering::Release);
            pool.retired.push(worker.thread);
        }

        while pool.active.len() < target {
            let retire = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&retire);
            let handle = self.clone();
            let class = pool.class;
            let name = format!(
                "{}-{}-{}",
                self.inner.config.thread_name_prefix,
                class.label(),
                pool.spawned
            );
            let thread = thread::Builder::new()
                .name(name)
                .spawn(move || handle.worker_loop(class, &flag))?;
            pool.spawned += 1;
            pool.active.push(Worker { retire, thread });
        }
        Ok(())
    }

    fn worker_loop(&self, class: WorkerThreadType, retire: &AtomicBool) {
        WORKER_IDENTITY.with(|identity| identity.set(Some((self.inner.id, class))));
        debug!("Worker {:?} started", thread::current().name());

        let priorities = class.priorities();
        loop {
            let claim = {
                let mut queues = self.inner.queues.lock();
                loop {
                    if self.inner.shutdown.load(Ordering::Acquire) || retire.load(Ordering::Acquire) {
                        break None;
                    }
                    if let Some(claim) = queues.claim(priorities, false) {
                        break Some(claim);
                    }
                    self.inner.signal.wait(&mut queues);
                }
            };
            match claim {
                Some(claim) => self.run_claim(claim),
                None => break,
            }
        }

        WORKER_IDENTITY.with(|identity| identity.set(None));
        debug!("Worker {:?} exited", thread::current().name());
    }

    /// Stop every worker and join them. Work still queued is dropped.
    pub(super) fn shutdown_pools(&self) {
        if self.inner.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        self.wake_all();

        let threads = {
            let mut pools = self.inner.pools.lock();
            let mut threads = pools.short.drain();
            threads.extend(pools.long.drain());
            threads
        };
        let current = thread::current().id();
        let count = threads.len();
        for thread in threads {
            // a worker dropping the last owner cannot join itself
            if thread.thread().id() != current {
                let _ = thread.join();
            }
        }
        info!("Scheduler stopped, joined {} workers", count);
    }
}
