//! An example where an urgent task waits for a lazy one
//!
//! The lazy task grinds away at low priority. Every few ticks it hands some
//! work over through a semaphore, and the urgent task preempts it at once.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

#![no_std]
#![no_main]

use prios::{BlockPool, Priority, Scheduler, Semaphore};

use prios_demos::SYSTICKS_PER_SCHED_TICK;

static POOL: BlockPool<3> = BlockPool::new();

static SCHEDULER: Scheduler = Scheduler::new(&POOL);

static WORK: Semaphore = Semaphore::new(0);

#[cortex_m_rt::entry]
fn main() -> ! {
    let mut cp = cortex_m::Peripherals::take().unwrap();
    defmt::info!("Hello!");
    SCHEDULER.init();
    prios::start_systick(cp.SYST, &mut cp.SCB, SYSTICKS_PER_SCHED_TICK);
    SCHEDULER.start().unwrap();

    let urgent = Priority::new(50).unwrap();
    let lazy = Priority::new(10).unwrap();
    SCHEDULER.create("urgent", urgent, consumer, 0).unwrap();
    SCHEDULER.create("lazy", lazy, producer, 0).unwrap();

    SCHEDULER.sleep(200);
    SCHEDULER.print_stats();
    semihosting::process::exit(0);
}

/// Waits for work and reports when it got it
fn consumer(scheduler: &'static Scheduler, _arg: usize) {
    loop {
        WORK.down(scheduler);
        defmt::info!("Got work at {=u64}", scheduler.now());
    }
}

/// Busy-waits for a few ticks at a time, then produces some work
fn producer(scheduler: &'static Scheduler, _arg: usize) {
    loop {
        let start = scheduler.now();
        while scheduler.elapsed(start) < 7 {
            cortex_m::asm::nop();
        }
        defmt::info!("Handing over work");
        WORK.up(scheduler);
        defmt::info!("Back to work");
    }
}

// End of File
