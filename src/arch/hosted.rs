//! A port that runs the scheduler on top of an ordinary operating system
//!
//! Every task is an OS thread, but only one of them may execute at a time:
//! the one holding the CPU "baton". A context switch hands the baton to the
//! next task's thread and then waits for it to come back. The interrupt mask
//! and the "in an interrupt handler" flag are just state on the emulated CPU.
//!
//! When a task dies its thread unwinds out of the task and finishes. The
//! unwinding runs the destructors of anything the task still held, while
//! the next task is already running. The thread is joined, and its baton
//! slot reused, once the scheduler reaps the task.
//!
//! There is no timer hardware here. Code that wants a tick calls
//! [`Scheduler::interrupt`](crate::Scheduler::interrupt) itself, and the idle
//! task delivers one timer interrupt each time it waits.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{
    cell::Cell,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, Condvar, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
};

use super::{IntrLevel, Launch, Port};

/// Saved state of a task: which baton its thread waits on
#[derive(Copy, Clone, Debug, Default)]
pub struct Context {
    baton: Option<usize>,
}

thread_local! {
    /// Set on threads we spawned to run a task
    static TASK_THREAD: Cell<bool> = const { Cell::new(false) };
}

/// Unwinds a dead task's thread back to where we spawned it
struct Retired;

/// Passed between task threads. Whoever holds it is the running task.
struct Baton {
    held: Mutex<bool>,
    wake: Condvar,
    /// For a task that has never run, how to start its thread
    launch: Mutex<Option<Launch>>,
    /// The thread running the task, once it has started
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Baton {
    fn new(held: bool, launch: Option<Launch>) -> Baton {
        Baton {
            held: Mutex::new(held),
            wake: Condvar::new(),
            launch: Mutex::new(launch),
            thread: Mutex::new(None),
        }
    }

    /// Hand the baton to this baton's thread
    fn give(&self) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        *held = true;
        self.wake.notify_one();
    }

    /// Drop the baton
    fn drop_it(&self) {
        *self.held.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }

    /// Block the calling thread until someone gives it the baton
    fn wait(&self) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        while !*held {
            held = self
                .wake
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// An emulated single-core CPU
pub struct Cpu {
    interrupts_enabled: AtomicBool,
    in_interrupt: AtomicBool,
    /// Indexed by [`Context::baton`]. `None` marks a free slot.
    batons: Mutex<Vec<Option<Arc<Baton>>>>,
}

impl Cpu {
    /// Create a CPU with interrupts masked, as at reset
    pub const fn new() -> Cpu {
        Cpu {
            interrupts_enabled: AtomicBool::new(false),
            in_interrupt: AtomicBool::new(false),
            batons: Mutex::new(Vec::new()),
        }
    }

    /// Register a new baton, returning its index
    fn add_baton(&self, baton: Baton) -> usize {
        let mut batons = self.batons.lock().unwrap_or_else(PoisonError::into_inner);
        let baton = Some(Arc::new(baton));
        match batons.iter().position(Option::is_none) {
            Some(index) => {
                batons[index] = baton;
                index
            }
            None => {
                batons.push(baton);
                batons.len() - 1
            }
        }
    }

    /// How many task threads have been started and not yet joined
    #[cfg(test)]
    pub(crate) fn task_threads(&self) -> usize {
        let batons = self.batons.lock().unwrap_or_else(PoisonError::into_inner);
        batons
            .iter()
            .flatten()
            .filter(|baton| {
                baton
                    .thread
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .is_some()
            })
            .count()
    }

    /// How many baton slots exist, free or not
    #[cfg(test)]
    pub(crate) fn baton_slots(&self) -> usize {
        self.batons
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Find the baton a context waits on
    fn baton(&self, ctx: &Context) -> Arc<Baton> {
        let Some(index) = ctx.baton else {
            panic!("switched to a context that was never initialised");
        };
        let batons = self.batons.lock().unwrap_or_else(PoisonError::into_inner);
        match batons.get(index) {
            Some(Some(baton)) => baton.clone(),
            _ => panic!("switched to a context that was released"),
        }
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Cpu::new()
    }
}

impl Port for Cpu {
    fn interrupts_enabled(&self) -> bool {
        self.interrupts_enabled.load(Ordering::SeqCst)
    }

    fn disable_interrupts(&self) -> IntrLevel {
        if self.interrupts_enabled.swap(false, Ordering::SeqCst) {
            IntrLevel::On
        } else {
            IntrLevel::Off
        }
    }

    fn set_interrupt_level(&self, level: IntrLevel) {
        self.interrupts_enabled
            .store(level == IntrLevel::On, Ordering::SeqCst);
    }

    fn in_interrupt(&self) -> bool {
        self.in_interrupt.load(Ordering::SeqCst)
    }

    fn begin_interrupt(&self) {
        assert!(
            !self.in_interrupt.swap(true, Ordering::SeqCst),
            "nested interrupt"
        );
    }

    fn end_interrupt(&self) {
        self.in_interrupt.store(false, Ordering::SeqCst);
    }

    unsafe fn adopt_boot_context(&self, ctx: &mut Context) {
        ctx.baton = Some(self.add_baton(Baton::new(true, None)));
    }

    unsafe fn init_context(&self, ctx: &mut Context, _stack_top: *mut u32, launch: Launch) {
        // The thread gets an OS stack; the block's stack area goes unused
        ctx.baton = Some(self.add_baton(Baton::new(false, Some(launch))));
    }

    unsafe fn switch(&self, from: Option<*mut Context>, to: *const Context) {
        // SAFETY: the caller promises both contexts are valid
        let to_baton = self.baton(unsafe { &*to });
        let from_baton = from.map(|ctx| self.baton(unsafe { &*ctx }));

        if let Some(baton) = &from_baton {
            baton.drop_it();
        }

        let launch = to_baton
            .launch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(launch) = launch {
            let baton = to_baton.clone();
            let thread = std::thread::Builder::new()
                .name("prios-task".into())
                .spawn(move || {
                    TASK_THREAD.set(true);
                    baton.wait();
                    let run = AssertUnwindSafe(|| -> () {
                        (launch.entry)(launch.args[0], launch.args[1])
                    });
                    if let Err(payload) = panic::catch_unwind(run) {
                        if !payload.is::<Retired>() {
                            // The task panicked holding the baton, so nothing
                            // else can ever run
                            std::process::abort();
                        }
                    }
                })
                .unwrap_or_else(|e| panic!("cannot start task thread: {e}"));
            *to_baton
                .thread
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(thread);
        }

        to_baton.give();

        match from_baton {
            Some(baton) => baton.wait(),
            // Nobody will ever switch back to us
            None if TASK_THREAD.get() => panic::resume_unwind(Box::new(Retired)),
            // The boot thread has nowhere to unwind to
            None => loop {
                std::thread::park();
            },
        }
    }

    unsafe fn release_context(&self, ctx: &mut Context) {
        let Some(index) = ctx.baton.take() else {
            return;
        };
        let baton = self
            .batons
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(index)
            .and_then(Option::take);
        let thread = baton.and_then(|baton| {
            let mut thread = baton.thread.lock().unwrap_or_else(PoisonError::into_inner);
            thread.take()
        });
        if let Some(thread) = thread {
            // It gave up the baton for good, so it is only unwinding now
            if thread.join().is_err() {
                panic!("task thread did not retire cleanly");
            }
        }
    }

    fn wait_for_interrupt(&self) {
        self.enable_interrupts();
        std::thread::yield_now();
    }
}

// End of File
