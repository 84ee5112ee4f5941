//! Armv6-M EABI code

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

use super::{Context, SWITCH, SwitchRecord};

/// PendSV Handler for Armv6-M or Armv8-M Baseline EABI
///
/// This is the task switch code. It is called by hardware when the PendSV bit
/// is set and all other interrupts have finished. It uses only the Armv6-M
/// subset instructions.
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

    // r12 = the handler stack pointer
    mov     r12, sp

    // if there is nowhere to save the outgoing task, skip the stacking
    cmp     r2, #0
    beq     1f

    //
    // Stack the outgoing task
    //
    // r1 holds the switch record's address
    // r2 holds the outgoing context's address
    //

    // sp = the outgoing task stack pointer
    mrs     r0, psp
    mov     sp, r0

    // Push the additional state into stack at sp
    push    {{ lr }}
    push    {{ r4 - r7 }}
    mov     r4, r8
    mov     r5, r9
    mov     r6, r10
    mov     r7, r11
    push    {{ r4 - r7 }}

    // save the adjusted stack pointer to the context
    mov     r0, sp
    str     r0, [r2, {sp_offset}]

    //
    // Unstack the incoming task
    //
    // r1 holds the switch record's address
    //

    1:

    // r2 = the incoming context
    ldr     r2, [r1, {to_offset}]

    // sp = the stack pointer from the context
    ldr     r0, [r2, {sp_offset}]
    mov     sp, r0

    // Pop the additional state from it
    pop     {{ r4 - r7 }}
    mov     r8, r4
    mov     r9, r5
    mov     r10, r6
    mov     r11, r7
    pop     {{ r4 - r7 }}
    pop     {{ r0 }}
    mov     lr, r0

    // psp = the adjusted task stack pointer
    mov     r0, sp
    msr     psp, r0

    // restore the handler stack pointer from r12
    mov     sp, r12

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
