//! A simple example showing how to use prios
//!
//! It starts three tasks, each of which periodically prints a defmt log and
//! then sleeps. After a while the boot task prints the tick accounting and
//! exits QEMU.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

#![no_std]
#![no_main]

use prios::{BlockPool, Priority, Scheduler};

use prios_demos::SYSTICKS_PER_SCHED_TICK;

/// One block each for idle, rabbits, hamsters and cats
static POOL: BlockPool<4> = BlockPool::new();

static SCHEDULER: Scheduler = Scheduler::new(&POOL);

#[cortex_m_rt::entry]
fn main() -> ! {
    let mut cp = cortex_m::Peripherals::take().unwrap();
    defmt::info!("Hello!");
    SCHEDULER.init();
    prios::start_systick(cp.SYST, &mut cp.SCB, SYSTICKS_PER_SCHED_TICK);
    SCHEDULER.start().unwrap();

    SCHEDULER.create("rabbits", Priority::DEFAULT, animal, 5).unwrap();
    SCHEDULER.create("hamsters", Priority::DEFAULT, animal, 10).unwrap();
    SCHEDULER.create("cats", Priority::DEFAULT, animal, 3).unwrap();

    SCHEDULER.sleep(100);
    SCHEDULER.print_stats();
    semihosting::process::exit(0);
}

/// Our animal task, which wakes up every `period` ticks
fn animal(scheduler: &'static Scheduler, period: usize) {
    loop {
        defmt::info!("{}! (back in {=usize})", scheduler.name().as_str(), period);
        scheduler.sleep(period as i64);
    }
}

// End of File
