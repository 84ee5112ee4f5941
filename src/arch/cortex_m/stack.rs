//! Holds the [`Stack`] type, used for the exception handler stack

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

use core::cell::UnsafeCell;

/// A stack of `LEN` bytes that lives outside any task block
///
/// The value of `LEN` must be a multiple of 8, which is checked with an
/// assert.
///
/// We align stacks on 8-byte boundaries, as required by AAPCS.
#[repr(C, align(8))]
pub(super) struct Stack<const LEN: usize> {
    /// The memory reserved for the stack
    contents: UnsafeCell<[u8; LEN]>,
}

impl<const LEN: usize> Stack<LEN> {
    /// Create a new stack
    pub(super) const fn new() -> Self {
        assert!(LEN.is_multiple_of(8));
        Self {
            contents: UnsafeCell::new([0u8; LEN]),
        }
    }

    /// Get the top of the stack
    pub(super) const fn top(&self) -> *mut u32 {
        // SAFETY: Pointing one past this object is allowed, as this is full
        // descending stack and we never write to the 'top' address - only
        // below it
        unsafe { self.contents.get().add(1) as *mut u32 }
    }
}

/// SAFETY: Only the CPU touches the contents, through the stack pointer we
/// hand it once at start-up.
unsafe impl<const LEN: usize> Sync for Stack<LEN> {}

// End of File
