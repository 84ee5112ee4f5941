//! Holds the [`StackPusher`] type and methods

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

/// Builds the frame a brand new task is resumed from, one word at a time,
/// on a full-descending Arm EABI stack
pub(super) struct StackPusher {
    sp: *mut u32,
    pushed: usize,
}

impl StackPusher {
    /// Start pushing below `stack_top`
    ///
    /// It will not write to the given pointer, but it will write immediately
    /// below it, because this is a Full Descending stack.
    ///
    /// # Safety
    ///
    /// There must be enough free space below the given pointer to accept all
    /// the items you are going to push.
    pub(super) unsafe fn new(stack_top: *mut u32) -> StackPusher {
        StackPusher {
            sp: stack_top,
            pushed: 0,
        }
    }

    /// Push one word, moving the stack pointer down
    pub(super) fn push(&mut self, value: u32) {
        // SAFETY: `new` was promised room for everything we push
        unsafe {
            self.sp = self.sp.offset(-1);
            self.sp.write_volatile(value);
        }
        self.pushed += 1;
    }

    /// Push `count` zero words
    pub(super) fn push_zeros(&mut self, count: usize) {
        for _ in 0..count {
            self.push(0);
        }
    }

    /// How many bytes have we used?
    pub(super) fn used(&self) -> usize {
        self.pushed * core::mem::size_of::<u32>()
    }

    /// Finish, returning the stack pointer to resume from
    pub(super) fn finish(self) -> *mut u32 {
        self.sp
    }
}

// End of File
