//! Holds the [`TaskBlock`] type, and the allocators that hand them out

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

use core::{
    cell::UnsafeCell,
    ptr::NonNull,
    sync::atomic::{AtomicU32, Ordering},
};

use crate::task::Task;

/// The size of a task block, in bytes
pub const BLOCK_SIZE: usize = 4096;

/// The smallest stack we are prepared to leave above the task metadata
pub const MIN_STACK_SIZE: usize = 1024;

const _: () = assert!(core::mem::size_of::<Task>() + MIN_STACK_SIZE <= BLOCK_SIZE);
const _: () = assert!(core::mem::align_of::<Task>() <= 8);

/// The memory backing one task
///
/// The task metadata lives at the bottom of the block. The rest is a full
/// descending stack whose top is the end of the block.
///
/// We align blocks on 8-byte boundaries, as required by AAPCS.
#[repr(C, align(8))]
pub struct TaskBlock {
    /// The memory reserved for the task
    contents: UnsafeCell<[u8; BLOCK_SIZE]>,
}

impl TaskBlock {
    /// Create a new, zeroed, block
    pub const fn new() -> Self {
        Self {
            contents: UnsafeCell::new([0u8; BLOCK_SIZE]),
        }
    }

    /// Where the task metadata goes
    pub(crate) fn metadata(&self) -> *mut Task {
        self.contents.get().cast::<Task>()
    }

    /// Get the top of the stack
    pub(crate) fn top(&self) -> *mut u32 {
        // SAFETY: Pointing one past this object is allowed, as this is full
        // descending stack and we never write to the 'top' address - only
        // below it
        unsafe { self.contents.get().add(1) as *mut u32 }
    }
}

impl Default for TaskBlock {
    fn default() -> Self {
        TaskBlock::new()
    }
}

/// Supplies and reclaims task blocks
///
/// The scheduler only calls these methods with interrupts masked, so
/// implementations need not protect themselves against re-entry.
pub trait BlockAllocator: Sync {
    /// Hand out a block that nothing else is using, if there is one
    fn allocate(&self) -> Option<NonNull<TaskBlock>>;

    /// Take back a block
    ///
    /// # Safety
    ///
    /// `block` must have come from [`allocate`](Self::allocate) on this
    /// allocator, and nothing may use it afterwards.
    unsafe fn release(&self, block: NonNull<TaskBlock>);
}

/// A fixed pool of `N` task blocks
///
/// Blocks are handed out lowest address first. `N` can be at most 32.
pub struct BlockPool<const N: usize> {
    blocks: [TaskBlock; N],
    /// Bit `n` is set while `blocks[n]` is free
    free: AtomicU32,
}

impl<const N: usize> BlockPool<N> {
    /// Create a pool with every block free
    pub const fn new() -> Self {
        assert!(N <= 32, "a BlockPool holds at most 32 blocks");
        Self {
            blocks: [const { TaskBlock::new() }; N],
            free: AtomicU32::new(if N == 32 { u32::MAX } else { (1 << N) - 1 }),
        }
    }

    /// How many blocks are free right now?
    pub fn available(&self) -> usize {
        self.free.load(Ordering::Relaxed).count_ones() as usize
    }

    /// How many blocks does the pool hold?
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Work out which of our blocks `block` is
    fn index_of(&self, block: NonNull<TaskBlock>) -> usize {
        let base = self.blocks.as_ptr() as usize;
        let offset = (block.as_ptr() as usize).wrapping_sub(base);
        let index = offset / core::mem::size_of::<TaskBlock>();
        assert!(
            index < N && offset % core::mem::size_of::<TaskBlock>() == 0,
            "released a block this pool does not own"
        );
        index
    }
}

impl<const N: usize> Default for BlockPool<N> {
    fn default() -> Self {
        BlockPool::new()
    }
}

impl<const N: usize> BlockAllocator for BlockPool<N> {
    fn allocate(&self) -> Option<NonNull<TaskBlock>> {
        // Plain load/store rather than read-modify-write, as Armv6-M has no
        // atomic RMW instructions. Our caller has interrupts masked.
        let free = self.free.load(Ordering::Relaxed);
        if free == 0 {
            return None;
        }
        let index = free.trailing_zeros() as usize;
        self.free.store(free & !(1 << index), Ordering::Relaxed);
        Some(NonNull::from(&self.blocks[index]))
    }

    unsafe fn release(&self, block: NonNull<TaskBlock>) {
        let index = self.index_of(block);
        let free = self.free.load(Ordering::Relaxed);
        assert!(free & (1 << index) == 0, "block released twice");
        self.free.store(free | (1 << index), Ordering::Relaxed);
    }
}

/// SAFETY: The blocks are only touched by whoever allocated them, and the
/// free mask is only updated with interrupts masked on our single core.
unsafe impl<const N: usize> Sync for BlockPool<N> {}


// End of File
