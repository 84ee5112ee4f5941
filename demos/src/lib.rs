//! Common panic/fault/timestamp handlers for the demos

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

#![no_std]

use defmt_semihosting as _;

/// How many SysTick clocks make one scheduler tick
///
/// QEMU's MPS2-AN385 runs at 25 MHz, so this is 100 Hz.
pub const SYSTICKS_PER_SCHED_TICK: u32 = 250_000;

/// Called when a panic occurs.
///
/// Logs the panic to defmt and then crashes the CPU.
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    defmt::println!("PANIC: {}", defmt::Debug2Format(info));
    cortex_m::asm::udf();
}

/// Called when a HardFault occurs.
///
/// Logs the fault to defmt and then crashes the CPU.
#[cortex_m_rt::exception]
unsafe fn HardFault(info: &cortex_m_rt::ExceptionFrame) -> ! {
    defmt::println!("FAULT: {}", defmt::Debug2Format(info));
    cortex_m::asm::udf();
}

// Log scheduler ticks and the running task in the defmt logs
defmt::timestamp!("{=u64:010} {}", prios::now(), prios::task_id());

// End of File
