//! Armv7-M EABI code

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

use super::{Context, SWITCH, SwitchRecord};

/// PendSV Handler for Armv7-M or Armv8-M Mainline EABI
///
/// This is the task switch code. It is called by hardware when the PendSV bit
/// is set and all other interrupts have finished.
///
/// On entry, we will find that PC, LR, R12, R3, R2, R1 and R0 will have been
/// pushed onto the PSP. We thus push the remaining registers (which are as
/// the running task left them) into the context named by `SWITCH.from`, and
/// then restore the registers from the context named by `SWITCH.to`. Exiting
/// from this function will cause the hardware to restore PC, LR, R12, R3, R2,
/// R1, and R0 from the new task's PSP, and so the new task will resume.
///
/// It is a naked function because we do not want the compiler pushing
/// anything else to the stack and re-using registers containing precious task
/// state.
#[unsafe(no_mangle)]
#[unsafe(naked)]
unsafe extern "C" fn PendSV() {
    // NOTE: This code must NOT touch r4-r11. It can ONLY touch r0-r3 and r12,
    // because those registers were stacked by the hardware on exception entry.

    core::arch::naked_asm!(r#"
    // r1 = the address of the switch record
    ldr     r1, ={switch}

    // r2 = the context to save into
    ldr     r2, [r1, {from_offset}]

    // if there is nowhere to save the outgoing task, skip the stacking
    cmp     r2, #0
    beq     1f

    //
    // Stack the outgoing task
    //
    // r1 holds the switch record's address
    // r2 holds the outgoing context's address
    //

    // r0 = the outgoing task stack pointer
    mrs     r0, psp

    // Push the additional state into stack at r0
    stmdb   r0!, {{ r4 - r11, lr }}

    // save the stack pointer (in r0) to the context
    str     r0, [r2, {sp_offset}]

    //
    // Unstack the incoming task
    //
    // r1 holds the switch record's address
    //

    1:

    // r2 = the incoming context
    ldr     r2, [r1, {to_offset}]

    // r0 = the stack pointer from the context
    ldr     r0, [r2, {sp_offset}]

    // Pop the additional state from it
    ldmia   r0!, {{ r4 - r11, lr }}

    // Set the task stack pointer
    msr     psp, r0

    // A repeated PendSV now saves and restores the task we just resumed
    str     r2, [r1, {from_offset}]

    //
    // return to the task
    //

    bx       lr
    "#,
    switch = sym SWITCH,
    from_offset = const SwitchRecord::FROM_OFFSET,
    to_offset = const SwitchRecord::TO_OFFSET,
    sp_offset = const Context::SP_OFFSET,
    );
}

// End of File
