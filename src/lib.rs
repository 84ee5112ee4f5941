//! # prios
//!
//! A priority task scheduler with an alarm clock, for a small single-CPU
//! kernel.
//!
//! * Tasks have a [`Priority`]. The most urgent Ready task always runs, and
//!   tasks of equal priority share the CPU in time slices.
//! * Tasks can sleep until a given timer tick without burning CPU time.
//! * Tasks live in fixed-size [`TaskBlock`]s, handed out by a
//!   [`BlockAllocator`] such as [`BlockPool`].
//!
//! On bare-metal Arm it drives a Cortex-M CPU, using SysTick for the tick
//! and PendSV for task switches. On an ordinary operating system each task
//! is a thread, and only one of them runs at a time.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

#![cfg_attr(target_os = "none", no_std)]

#[macro_use]
mod fmt;

mod alarm;
mod arch;
mod block;
mod error;
mod scheduler;
mod sync;
mod task;
mod wait_list;

#[cfg(all(target_os = "none", target_arch = "arm"))]
pub use arch::start_systick;
pub use block::{BLOCK_SIZE, BlockAllocator, BlockPool, MIN_STACK_SIZE, TaskBlock};
pub use error::Error;
pub use scheduler::{Config, MAX_TASKS, Scheduler, Stats};
pub use sync::Semaphore;
pub use task::{NAME_LEN, Priority, Status, TaskEntryFn, TaskId, TaskInfo, TaskName, TaskRef};

/// Get the current time in ticks
///
/// Returns zero if no scheduler has been initialised.
pub fn now() -> u64 {
    Scheduler::get_scheduler().map_or(0, Scheduler::now)
}

/// Get the ID of the running task
///
/// Returns an invalid ID if no scheduler has been initialised. Unlike
/// [`Scheduler::tid`] this skips the sanity checks, so it is safe to call
/// from a log timestamp in the middle of a task switch.
pub fn task_id() -> TaskId {
    Scheduler::get_scheduler().map_or(TaskId::invalid(), Scheduler::current_id)
}

// End of File
