//! Scheduler facade -- owns the worker pools, the group table and the ready queues.
//!
//! Split into focused submodules:
//! - `core`: Scheduler / SchedulerHandle, construction, shutdown, accessors
//! - `pool`: short/long worker pools, the worker loop and resizing
//! - `groups`: group creation, dependencies and start
//! - `execution`: dispatch to the queues, running invocations, completion
//! - `wait`: blocking waits that help with other ready work
//! - `cancel`: task and group cancellation
//! - `frame`: frame boundary (main-thread work, drain, next-frame promotion)
//! - `parallel`: range and array splitting on top of multiplicity
//! - `diagnostics`: DGML state snapshots

mod cancel;
mod core;
mod diagnostics;
mod execution;
mod frame;
mod groups;
mod parallel;
mod pool;
mod wait;

pub use self::core::{Scheduler, SchedulerHandle};
