//! The alarm clock
//!
//! Sleeping tasks wait on the sleep queue, ordered by the tick they want to
//! wake at. The timer interrupt wakes them with [`Scheduler::wake_due`],
//! so a sleeping task costs nothing until it is due.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::{Scheduler, arch::Port, scheduler::TaskTable, task::Priority};

/// Sleep queue order: earlier wake tick first, then higher priority
fn wakes_before(tasks: &TaskTable, a: usize, b: usize) -> bool {
    let (a, b) = (tasks.get(a), tasks.get(b));
    a.wake_tick < b.wake_tick || (a.wake_tick == b.wake_tick && a.priority > b.priority)
}

impl Scheduler {
    /// Block the running task until tick `wake_tick`
    ///
    /// Does nothing if called by the idle task. A tick that has already
    /// passed wakes at the next timer interrupt.
    pub fn sleep_until(&self, wake_tick: u64) {
        let old = self.cpu().disable_interrupts();
        let sleeping = {
            // SAFETY: masked, and the borrow ends before we block
            let state = unsafe { self.state() };
            if state.current_is_idle() {
                false
            } else {
                assert!(
                    !self.cpu().in_interrupt(),
                    "sleep_until() called from an interrupt handler"
                );
                let slot = state.current;
                state.current_task_mut().wake_tick = wake_tick;
                state
                    .sleeping
                    .insert_ordered(&mut state.tasks, slot, wakes_before);
                trace!("{} sleeps until {}", state.current_task().id(), wake_tick);
                true
            }
        };
        if sleeping {
            self.block();
        }
        self.cpu().set_interrupt_level(old);
    }

    /// Wake every sleeping task whose wake tick is `now` or earlier
    ///
    /// If one of them outranks the running task, we yield to it: straight
    /// away in ordinary code, or as the handler returns in an interrupt.
    pub fn wake_due(&self, now: u64) {
        let mut woken: Option<Priority> = None;
        self.with_state(|state| {
            while let Some(slot) = state.sleeping.front() {
                let task = state.tasks.get(slot);
                if task.wake_tick > now {
                    break;
                }
                let priority = task.priority;
                trace!("Waking {} at {}", task.id(), now);
                state.sleeping.remove(&mut state.tasks, slot);
                state.make_ready(slot);
                woken = woken.max(Some(priority));
            }
        });
        if let Some(priority) = woken {
            self.preempt_for(priority);
        }
    }

    /// Get the number of timer ticks since the scheduler started
    pub fn now(&self) -> u64 {
        self.with_state(|state| state.ticks)
    }

    /// How many ticks have gone by since `then`, which came from [`now`](Self::now)?
    pub fn elapsed(&self, then: u64) -> u64 {
        self.now().saturating_sub(then)
    }

    /// Sleep for `ticks` timer ticks. Zero or fewer returns straight away.
    ///
    /// Interrupts must be enabled.
    pub fn sleep(&self, ticks: i64) {
        if ticks <= 0 {
            return;
        }
        assert!(
            self.cpu().interrupts_enabled(),
            "sleep() called with interrupts masked"
        );
        let start = self.now();
        self.sleep_until(start.saturating_add(ticks as u64));
    }

    /// Sleep for about `ms` milliseconds
    ///
    /// The time is rounded down to whole ticks. Anything shorter than a tick
    /// just yields.
    pub fn sleep_ms(&self, ms: u64) {
        let ticks = ms.saturating_mul(u64::from(self.config().tick_hz)) / 1000;
        if ticks > 0 {
            self.sleep(i64::try_from(ticks).unwrap_or(i64::MAX));
        } else {
            self.yield_now();
        }
    }
}


// End of File
