//! Holds the [`Semaphore`] type

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

use core::cell::UnsafeCell;

use crate::{
    Scheduler,
    arch::Port,
    scheduler::by_priority,
    wait_list::{Membership, WaitList},
};

/// A counting semaphore
///
/// Waiters queue by priority, first come first served among equals. The
/// waiters are threaded through the scheduler's task table, so a semaphore
/// must only ever be used with one [`Scheduler`].
pub struct Semaphore {
    inner: UnsafeCell<Inner>,
}

struct Inner {
    value: u32,
    waiters: WaitList,
}

/// SAFETY: the contents are only touched with interrupts masked, on one CPU.
unsafe impl Sync for Semaphore {}

impl Semaphore {
    /// Create a semaphore holding `value`
    pub const fn new(value: u32) -> Semaphore {
        Semaphore {
            inner: UnsafeCell::new(Inner {
                value,
                waiters: WaitList::new(Membership::Waiting),
            }),
        }
    }

    /// Wait for the value to be positive, then decrement it
    ///
    /// Must not be called from an interrupt handler.
    pub fn down(&self, scheduler: &Scheduler) {
        assert!(
            !scheduler.cpu().in_interrupt(),
            "Semaphore::down() called from an interrupt handler"
        );
        let old = scheduler.cpu().disable_interrupts();
        loop {
            {
                // SAFETY: masked, and both borrows end before we block
                let state = unsafe { scheduler.state() };
                let inner = unsafe { &mut *self.inner.get() };
                if inner.value > 0 {
                    inner.value -= 1;
                    break;
                }
                let slot = state.current;
                inner
                    .waiters
                    .insert_ordered(&mut state.tasks, slot, by_priority);
            }
            scheduler.block();
        }
        scheduler.cpu().set_interrupt_level(old);
    }

    /// Decrement the value if it is positive, without waiting
    pub fn try_down(&self, scheduler: &Scheduler) -> bool {
        scheduler.with_state(|_| {
            // SAFETY: with_state masks interrupts
            let inner = unsafe { &mut *self.inner.get() };
            if inner.value > 0 {
                inner.value -= 1;
                true
            } else {
                false
            }
        })
    }

    /// Increment the value, waking the most urgent waiter
    ///
    /// If that waiter outranks the caller, the caller yields to it (or, in an
    /// interrupt handler, yields as the handler returns). May be called from
    /// an interrupt handler.
    pub fn up(&self, scheduler: &Scheduler) {
        let woken = scheduler.with_state(|state| {
            // SAFETY: with_state masks interrupts
            let inner = unsafe { &mut *self.inner.get() };
            inner.value += 1;
            inner.waiters.pop_front(&mut state.tasks).map(|slot| {
                state.make_ready(slot);
                state.tasks.get(slot).priority
            })
        });
        if let Some(priority) = woken {
            scheduler.preempt_for(priority);
        }
    }

    /// Get the current value
    pub fn value(&self, scheduler: &Scheduler) -> u32 {
        // SAFETY: with_state masks interrupts
        scheduler.with_state(|_| unsafe { (*self.inner.get()).value })
    }
}

// End of File
