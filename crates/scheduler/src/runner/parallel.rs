use std::ops::Range;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::SchedulerError;
use crate::task::{Task, TaskContext, TaskWork};
use crate::types::{ParallelForParams, Priority, WorkerThreadType};

use super::core::SchedulerHandle;

/// How a loop over `len` items is cut into invocations.
#[derive(Debug, Clone, Copy)]
struct Split {
    invocations: u32,
    chunk: u32,
}

/// One multiplicity task covering `start..end`, `chunk` items per invocation.
struct RangeWork<F> {
    start: u32,
    end: u32,
    chunk: u32,
    body: F,
}

impl<F> TaskWork for RangeWork<F>
where
    F: Fn(Range<u32>) + Send + Sync + 'static,
{
    fn execute(&self, _ctx: &TaskContext<'_>) {
        (self.body)(self.start..self.end);
    }

    fn execute_at(&self, invocation: u32, _ctx: &TaskContext<'_>) {
        let begin = u64::from(self.start) + u64::from(invocation) * u64::from(self.chunk);
        let end = (begin + u64::from(self.chunk)).min(u64::from(self.end));
        if begin < end {
            // both bounds are <= self.end
            (self.body)(begin as u32..end as u32);
        }
    }
}

/// Items of one invocation; `base` is the index of the first one.
struct Slice<T> {
    base: u32,
    items: Mutex<Vec<T>>,
}

/// One multiplicity task, invocation `i` owning slice `i`.
struct SliceWork<T, F> {
    slices: Arc<Vec<Slice<T>>>,
    body: F,
}

impl<T, F> SliceWork<T, F>
where
    F: Fn(u32, &mut [T]),
{
    fn run(&self, slice: &Slice<T>) {
        let mut items = slice.items.lock();
        if !items.is_empty() {
            (self.body)(slice.base, items.as_mut_slice());
        }
    }
}

impl<T, F> TaskWork for SliceWork<T, F>
where
    T: Send + 'static,
    F: Fn(u32, &mut [T]) + Send + Sync + 'static,
{
    fn execute(&self, _ctx: &TaskContext<'_>) {
        for slice in self.slices.iter() {
            self.run(slice);
        }
    }

    fn execute_at(&self, invocation: u32, _ctx: &TaskContext<'_>) {
        if let Some(slice) = self.slices.get(invocation as usize) {
            self.run(slice);
        }
    }
}

impl SchedulerHandle {
    /// Run `body` over `range`, split into contiguous sub-ranges that run in
    /// parallel, and wait for all of them.
    ///
    /// Ranges no larger than one bin run inline. Otherwise the number of
    /// sub-ranges is the bin count, capped at `max_tasks_per_thread` per
    /// short-task worker. Sub-ranges are disjoint and cover `range` exactly.
    /// When called from a task, that task must be [`TaskNesting::Maybe`](crate::TaskNesting::Maybe).
    pub fn parallel_for_indexed<F>(
        &self,
        range: Range<u32>,
        params: ParallelForParams,
        name: &str,
        body: F,
    ) -> Result<(), SchedulerError>
    where
        F: Fn(Range<u32>) + Send + Sync + 'static,
    {
        let len = range.end.saturating_sub(range.start);
        if len == 0 {
            return Ok(());
        }
        let Some(split) = self.split(len, &params) else {
            body(range);
            return Ok(());
        };

        let task = Task::new(
            name,
            RangeWork {
                start: range.start,
                end: range.end,
                chunk: split.chunk,
                body,
            },
        );
        self.run_split(&task, split, len)
    }

    /// Run `body` over contiguous slices of `items` in parallel and hand the
    /// items back in their original order once every slice is done.
    ///
    /// `body` receives the index of the slice's first element. Slicing
    /// follows the same rules as [`parallel_for_indexed`](Self::parallel_for_indexed).
    pub fn parallel_for<T, F>(
        &self,
        items: Vec<T>,
        params: ParallelForParams,
        name: &str,
        body: F,
    ) -> Result<Vec<T>, SchedulerError>
    where
        T: Send + 'static,
        F: Fn(u32, &mut [T]) + Send + Sync + 'static,
    {
        let len = u32::try_from(items.len()).map_err(|_| SchedulerError::TooManyItems(items.len()))?;
        let mut items = items;
        if len == 0 {
            return Ok(items);
        }
        let Some(split) = self.split(len, &params) else {
            body(0, items.as_mut_slice());
            return Ok(items);
        };

        let mut rest = items.into_iter();
        let slices: Arc<Vec<Slice<T>>> = Arc::new(
            (0..split.invocations)
                .map(|i| Slice {
                    base: i.saturating_mul(split.chunk),
                    items: Mutex::new(rest.by_ref().take(split.chunk as usize).collect()),
                })
                .collect(),
        );
        let task = Task::new(
            name,
            SliceWork {
                slices: Arc::clone(&slices),
                body,
            },
        );
        self.run_split(&task, split, len)?;

        Ok(slices
            .iter()
            .flat_map(|slice| std::mem::take(&mut *slice.items.lock()))
            .collect())
    }

    /// Like [`parallel_for`](Self::parallel_for), calling `body` once per element.
    pub fn parallel_for_single<T, F>(
        &self,
        items: Vec<T>,
        params: ParallelForParams,
        name: &str,
        body: F,
    ) -> Result<Vec<T>, SchedulerError>
    where
        T: Send + 'static,
        F: Fn(&mut T) + Send + Sync + 'static,
    {
        self.parallel_for(items, params, name, move |_, slice: &mut [T]| {
            slice.iter_mut().for_each(&body);
        })
    }

    /// Like [`parallel_for_single`](Self::parallel_for_single), also passing
    /// each element's index.
    pub fn parallel_for_single_index<T, F>(
        &self,
        items: Vec<T>,
        params: ParallelForParams,
        name: &str,
        body: F,
    ) -> Result<Vec<T>, SchedulerError>
    where
        T: Send + 'static,
        F: Fn(u32, &mut T) + Send + Sync + 'static,
    {
        self.parallel_for(items, params, name, move |base, slice: &mut [T]| {
            for (offset, item) in slice.iter_mut().enumerate() {
                // offset < chunk, which fits in u32
                body(base + offset as u32, item);
            }
        })
    }

    /// `None` when `len` fits in one bin and runs inline.
    fn split(&self, len: u32, params: &ParallelForParams) -> Option<Split> {
        let bin_size = params.bin_size.max(1);
        if len <= bin_size {
            return None;
        }
        let bins = len.div_ceil(bin_size);
        let workers = u32::try_from(self.num_allocated_worker_threads(WorkerThreadType::ShortTasks))
            .unwrap_or(u32::MAX)
            .max(1);
        let cap = workers.saturating_mul(params.max_tasks_per_thread.max(1));
        let invocations = bins.min(cap);
        Some(Split {
            invocations,
            chunk: len.div_ceil(invocations),
        })
    }

    /// Run `task` as one this-frame group with the split's multiplicity and wait for it.
    fn run_split(&self, task: &Arc<Task>, split: Split, len: u32) -> Result<(), SchedulerError> {
        task.set_multiplicity(split.invocations)?;
        debug!(
            "Parallel for '{}' over {} items in {} slices of {}",
            task.name(),
            len,
            split.invocations,
            split.chunk
        );

        let group = self.start_single_task(task, Priority::ThisFrame, None)?;
        self.wait_for_group(group);
        if self.is_task_group_finished(group) {
            Ok(())
        } else {
            Err(SchedulerError::ShuttingDown)
        }
    }
}
