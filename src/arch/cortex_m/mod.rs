//! A port for Arm Cortex-M microcontrollers
//!
//! Tasks run in Thread mode on the Process Stack. Exception handlers run on
//! the Main Stack, which [`Port::adopt_boot_context`] moves to a dedicated
//! handler stack.
//!
//! A switch is performed by the PendSV handler. The scheduler writes the
//! outgoing and incoming contexts into [`SWITCH`] and pends PendSV. In Thread
//! mode we then briefly unmask interrupts so the exception is taken on the
//! spot. In Handler mode the switch happens when the handler returns, since
//! PendSV runs at the lowest priority.
//!
//! SysTick and PendSV both run at the lowest priority. Any other interrupt
//! that calls into the scheduler must do the same, so that scheduler
//! interrupts never nest.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

use core::{
    ptr::null_mut,
    sync::atomic::{AtomicPtr, Ordering},
};

use cortex_m::{
    interrupt,
    peripheral::{
        SCB, SYST,
        scb::{SystemHandler, VectActive},
        syst::SystClkSource,
    },
    register::{control, primask, psp},
};

use super::{IntrLevel, Launch, Port};
use crate::Scheduler;

mod stack;
mod stack_pusher;

#[cfg(all(
    arm_abi = "eabi",
    any(arm_architecture = "v6-m", arm_architecture = "v8-m.base")
))]
mod eabi_v6;

#[cfg(all(
    arm_abi = "eabi",
    not(any(arm_architecture = "v6-m", arm_architecture = "v8-m.base"))
))]
mod eabi;

#[cfg(arm_abi = "eabihf")]
mod eabihf;

use stack::Stack;
use stack_pusher::StackPusher;

/// How big the exception handler stack is
const HANDLER_STACK_SIZE: usize = 2048;

/// The stack every exception handler runs on
static HANDLER_STACK: Stack<HANDLER_STACK_SIZE> = Stack::new();

/// The value of the Processor Status Register when a task starts
///
/// The only bit we need to set is the T bit, to indicate that the
/// task should run in Thumb mode (the only supported mode on M-profile)
const DEFAULT_XPSR: u32 = 1 << 24;

/// Return to Thread mode, on the Process Stack, with no FPU state
const EXC_RETURN_THREAD_PSP: u32 = 0xFFFF_FFFD;

/// Saved state of a task: its stack pointer
///
/// Everything else is on the task's stack. The hardware stacks R0-R3, R12,
/// LR, PC and xPSR on exception entry, and PendSV stacks R4-R11 and
/// EXC_RETURN (and S16-S31, if the task used the FPU) underneath them.
#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct Context {
    sp: *mut u32,
}

impl Context {
    /// The offset, in bytes, to the `sp` field
    pub(crate) const SP_OFFSET: usize = core::mem::offset_of!(Context, sp);
}

impl Default for Context {
    fn default() -> Self {
        Context { sp: null_mut() }
    }
}

/// The switch the next PendSV should perform
#[repr(C)]
pub(crate) struct SwitchRecord {
    /// Where to save the running task, or null to discard it
    from: AtomicPtr<Context>,
    /// Which task to resume
    to: AtomicPtr<Context>,
}

impl SwitchRecord {
    /// The offset, in bytes, to the `from` field
    pub(crate) const FROM_OFFSET: usize = core::mem::offset_of!(SwitchRecord, from);

    /// The offset, in bytes, to the `to` field
    pub(crate) const TO_OFFSET: usize = core::mem::offset_of!(SwitchRecord, to);
}

/// Read by the PendSV handler, which has no other way to find its arguments
pub(crate) static SWITCH: SwitchRecord = SwitchRecord {
    from: AtomicPtr::new(null_mut()),
    to: AtomicPtr::new(null_mut()),
};

/// The Cortex-M CPU we are running on
pub struct Cpu {
    _private: (),
}

impl Cpu {
    /// Get a handle to the CPU
    pub const fn new() -> Cpu {
        Cpu { _private: () }
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Cpu::new()
    }
}

impl Port for Cpu {
    fn interrupts_enabled(&self) -> bool {
        primask::read().is_active()
    }

    fn disable_interrupts(&self) -> IntrLevel {
        let level = if self.interrupts_enabled() {
            IntrLevel::On
        } else {
            IntrLevel::Off
        };
        interrupt::disable();
        level
    }

    fn set_interrupt_level(&self, level: IntrLevel) {
        match level {
            // SAFETY: we are not inside a critical section that relies on the
            // mask, or our caller would not be asking for this
            IntrLevel::On => unsafe { interrupt::enable() },
            IntrLevel::Off => interrupt::disable(),
        }
    }

    fn in_interrupt(&self) -> bool {
        SCB::vect_active() != VectActive::ThreadMode
    }

    unsafe fn adopt_boot_context(&self, _ctx: &mut Context) {
        // Keep running on the stack we booted on, but call it the PSP. The
        // first switch away from us saves our SP into `ctx`.
        unsafe {
            psp::write(cortex_m::register::msp::read());
            let mut control = control::read();
            control.set_spsel(control::Spsel::Psp);
            control::write(control);
            cortex_m::asm::isb();
            // Nothing is using the MSP now
            core::arch::asm!(
                "msr msp, {top}",
                top = in(reg) HANDLER_STACK.top(),
                options(nomem, nostack, preserves_flags)
            );
        }
        debug!("handler stack @ {=usize:08x}", HANDLER_STACK.top() as usize);
    }

    unsafe fn init_context(&self, ctx: &mut Context, stack_top: *mut u32, launch: Launch) {
        // SAFETY: the caller promises at least MIN_STACK_SIZE bytes, which is
        // far more than this frame
        let mut stack_pusher = unsafe { StackPusher::new(stack_top) };

        // Standard Arm exception frame

        // xPSR
        stack_pusher.push(DEFAULT_XPSR);
        // PC, without the Thumb bit, as the frame holds an address
        stack_pusher.push(launch.entry as usize as u32 & !1);
        // LR. The entry function never returns.
        stack_pusher.push(0);
        // R12
        stack_pusher.push(0);
        // R3, R2
        stack_pusher.push_zeros(2);
        // R1, R0
        stack_pusher.push(launch.args[1] as u32);
        stack_pusher.push(launch.args[0] as u32);

        // Additional task state we persist

        // EXC_RETURN, checked by PendSV for FPU status. This copy does not
        // have the FPU bit set, so we don't need to push an Extended Frame
        // above, or the other 16 FPU registers, into the initial state.
        stack_pusher.push(EXC_RETURN_THREAD_PSP);

        // R4 - R11
        stack_pusher.push_zeros(8);

        trace!(
            "initial frame is {=usize} bytes, below {=usize:08x}",
            stack_pusher.used(),
            stack_top as usize
        );

        ctx.sp = stack_pusher.finish();
    }

    unsafe fn switch(&self, from: Option<*mut Context>, to: *const Context) {
        SWITCH
            .from
            .store(from.unwrap_or(null_mut()), Ordering::Relaxed);
        SWITCH.to.store(to.cast_mut(), Ordering::Relaxed);
        SCB::set_pendsv();

        if !self.in_interrupt() {
            // Open a window for PendSV. It is taken before the isb completes,
            // and we come back here when someone switches back to us.
            cortex_m::asm::dsb();
            // SAFETY: the scheduler state is consistent across a switch
            unsafe { interrupt::enable() };
            cortex_m::asm::isb();
            interrupt::disable();
        }
    }

    fn wait_for_interrupt(&self) {
        // WFI wakes up on a pending interrupt even while PRIMASK masks it, so
        // nothing is lost between here and the enable
        cortex_m::asm::wfi();
        // SAFETY: the idle task holds no state across this point
        unsafe { interrupt::enable() };
        cortex_m::asm::isb();
    }
}

/// Start the scheduler tick
///
/// Sets SysTick and PendSV to the lowest priority and starts SysTick
/// counting down from `reload` on the core clock. Every time it reaches zero
/// the crate's SysTick handler delivers [`Scheduler::timer_interrupt`].
///
/// Call this after [`Scheduler::init`], as the handler needs the scheduler.
pub fn start_systick(mut syst: SYST, scb: &mut SCB, reload: u32) {
    // SAFETY: making exceptions *less* urgent cannot break any critical
    // section that relies on priorities
    unsafe {
        scb.set_priority(SystemHandler::PendSV, 0xFF);
        scb.set_priority(SystemHandler::SysTick, 0xFF);
    }

    syst.set_reload(reload);
    syst.set_clock_source(SystClkSource::Core);
    syst.clear_current();
    syst.enable_counter();
    syst.enable_interrupt();
    info!("SysTick running, reload {=u32}", reload);
}

/// SysTick Handler
#[unsafe(no_mangle)]
extern "C" fn SysTick() {
    if let Some(scheduler) = Scheduler::get_scheduler() {
        scheduler.interrupt(Scheduler::timer_interrupt);
    }
}

// End of File
