//! The CPU-specific parts of the scheduler
//!
//! Everything above this module only ever talks to the CPU through the
//! [`Port`] trait. Bare-metal Arm builds get the Cortex-M port. Every hosted
//! target gets a port that emulates the CPU with one OS thread per task,
//! which is what the test suite runs on.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

#[cfg(all(target_os = "none", target_arch = "arm"))]
mod cortex_m;
#[cfg(all(target_os = "none", target_arch = "arm"))]
pub use self::cortex_m::{Context, Cpu, start_systick};

#[cfg(not(target_os = "none"))]
mod hosted;
#[cfg(not(target_os = "none"))]
pub use self::hosted::{Context, Cpu};

#[cfg(all(target_os = "none", not(target_arch = "arm")))]
compile_error!("prios only supports bare-metal Arm targets, or hosted targets");

/// Whether maskable interrupts are enabled
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IntrLevel {
    /// Interrupts are masked
    Off,
    /// Interrupts are enabled
    On,
}

/// What a brand new task executes first
///
/// The port arranges for `entry(args[0], args[1])` to be called, with
/// interrupts in whatever state the switch left them, on the task's own
/// stack.
#[derive(Copy, Clone)]
pub struct Launch {
    /// The function to start in
    pub entry: extern "C-unwind" fn(usize, usize) -> !,
    /// Its arguments
    pub args: [usize; 2],
}

/// The services a CPU port provides to the scheduler
pub trait Port {
    /// Are interrupts currently enabled?
    fn interrupts_enabled(&self) -> bool;

    /// Mask interrupts, returning the previous level
    fn disable_interrupts(&self) -> IntrLevel;

    /// Set the interrupt level, usually to one that
    /// [`disable_interrupts`](Port::disable_interrupts) returned
    fn set_interrupt_level(&self, level: IntrLevel);

    /// Unmask interrupts
    fn enable_interrupts(&self) {
        self.set_interrupt_level(IntrLevel::On);
    }

    /// Are we running an interrupt handler?
    fn in_interrupt(&self) -> bool;

    /// Called as an interrupt handler starts, with interrupts masked
    fn begin_interrupt(&self) {}

    /// Called as an interrupt handler finishes, with interrupts masked
    fn end_interrupt(&self) {}

    /// Turn whatever is currently executing into a task, saving into `ctx`
    /// when it is first switched away from
    ///
    /// # Safety
    ///
    /// Call once, from the boot context, with interrupts masked.
    unsafe fn adopt_boot_context(&self, ctx: &mut Context);

    /// Prepare `ctx` so that switching to it runs `launch` on the stack whose
    /// top is `stack_top`
    ///
    /// # Safety
    ///
    /// `stack_top` must be the top of a stack that nothing else uses, with at
    /// least [`MIN_STACK_SIZE`](crate::MIN_STACK_SIZE) bytes below it.
    unsafe fn init_context(&self, ctx: &mut Context, stack_top: *mut u32, launch: Launch);

    /// Save the running context into `from` and resume `to`
    ///
    /// Returns when something switches back to `from`. If `from` is `None`
    /// the outgoing context is abandoned and this never returns. In an
    /// interrupt handler the switch takes effect as the handler returns.
    ///
    /// # Safety
    ///
    /// Interrupts must be masked. Both contexts must stay valid until the
    /// switch has happened, and `to` must be a context that was saved by a
    /// switch, adopted, or initialised.
    unsafe fn switch(&self, from: Option<*mut Context>, to: *const Context);

    /// Free anything the port holds for `ctx`, whose task has gone
    ///
    /// # Safety
    ///
    /// Nothing may switch to `ctx` again, and the task must already have
    /// switched away from it for the last time.
    unsafe fn release_context(&self, _ctx: &mut Context) {}

    /// Enable interrupts and sleep until one arrives
    ///
    /// Call with interrupts masked. An interrupt that becomes pending in
    /// between is not lost.
    fn wait_for_interrupt(&self);
}

// End of File
