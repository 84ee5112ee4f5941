//! Shared helpers for the integration tests
//!
//! Every test boots its own scheduler on the hosted port. The test thread
//! becomes the "main" task, so assertions made there fail the test as
//! usual. Tasks record what they see into a per-test [`Events`] log, which
//! the test checks afterwards.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

#![allow(dead_code)]

use std::sync::Mutex;

use prios::{BlockPool, Priority, Scheduler};

/// Boot a scheduler with `N` task blocks, one of which goes to the idle task
pub fn boot<const N: usize>() -> &'static Scheduler {
    let pool: &'static BlockPool<N> = Box::leak(Box::default());
    let scheduler: &'static Scheduler = Box::leak(Box::new(Scheduler::new(pool)));
    scheduler.init();
    scheduler.start().expect("no block for the idle task");
    scheduler
}

/// Shorthand for a priority that is known to be valid
pub fn prio(value: u8) -> Priority {
    Priority::new(value).expect("priority out of range")
}

/// Deliver `count` timer interrupts from the running task
pub fn ticks(scheduler: &'static Scheduler, count: u64) {
    for _ in 0..count {
        scheduler.interrupt(Scheduler::timer_interrupt);
    }
}

/// An ordered log of things that happened
pub struct Events<T>(Mutex<Vec<T>>);

impl<T: Clone> Events<T> {
    pub const fn new() -> Events<T> {
        Events(Mutex::new(Vec::new()))
    }

    pub fn push(&self, event: T) {
        self.0.lock().unwrap().push(event);
    }

    pub fn get(&self) -> Vec<T> {
        self.0.lock().unwrap().clone()
    }
}

impl Events<String> {
    /// Record the running task's name
    pub fn push_name(&self, scheduler: &Scheduler) {
        self.push(scheduler.name().to_string());
    }
}

// End of File
