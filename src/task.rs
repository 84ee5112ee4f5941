//! Holds the [`Task`] type and methods

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::{Error, Scheduler, arch::Context, wait_list::Link};

/// The function a task runs
///
/// Returning from it ends the task, exactly as if it had called
/// [`Scheduler::exit`].
pub type TaskEntryFn = fn(&'static Scheduler, usize);

/// How many bytes of a task name we keep
pub const NAME_LEN: usize = 16;

/// A task name, truncated to [`NAME_LEN`] bytes
pub type TaskName = heapless::String<NAME_LEN>;

/// Written into every task at creation and checked whenever we look at the
/// running task. The stack grows down towards it.
pub(crate) const CANARY: u32 = 0xcd6a_bf4b;

/// Represents a Task
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u32);

impl TaskId {
    /// Represents the Task ID we produce when the scheduler isn't running
    const INVALID_ID: u32 = u32::MAX;

    /// Is this the invalid Task ID?
    pub const fn is_invalid(self) -> bool {
        self.0 == Self::INVALID_ID
    }

    /// Create an invalid Task ID
    pub(crate) const fn invalid() -> TaskId {
        TaskId(Self::INVALID_ID)
    }

    /// Wrap a freshly allocated ID
    pub(crate) const fn new(id: u32) -> TaskId {
        TaskId(id)
    }

    /// Get the numeric value
    pub const fn get(self) -> u32 {
        self.0
    }
}

#[cfg(target_os = "none")]
impl defmt::Format for TaskId {
    fn format(&self, fmt: defmt::Formatter) {
        if self.is_invalid() {
            defmt::write!(fmt, "T---");
        } else {
            defmt::write!(fmt, "T{=u32:03}", self.0);
        }
    }
}

impl core::fmt::Display for TaskId {
    fn fmt(&self, fmt: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_invalid() {
            write!(fmt, "T---")
        } else {
            write!(fmt, "T{:03}", self.0)
        }
    }
}

/// The lifecycle state of a task
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum Status {
    /// Executing right now. Exactly one task is in this state.
    Running,
    /// Waiting in the ready queue for the CPU
    Ready,
    /// Waiting for someone to call [`Scheduler::unblock`]
    Blocked,
    /// Finished, waiting for its block to be reclaimed
    Dying,
}

impl core::fmt::Display for Status {
    fn fmt(&self, fmt: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Status::Running => "running",
            Status::Ready => "ready",
            Status::Blocked => "blocked",
            Status::Dying => "dying",
        };
        fmt.write_str(s)
    }
}

/// A task priority. Larger numbers are more urgent.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct Priority(u8);

impl Priority {
    /// The least urgent priority. The idle task runs here.
    pub const MIN: Priority = Priority(0);

    /// The priority of the boot task
    pub const DEFAULT: Priority = Priority(31);

    /// The most urgent priority
    pub const MAX: Priority = Priority(63);

    /// Make a priority, if `value` is in range
    pub const fn new(value: u8) -> Option<Priority> {
        if value <= Self::MAX.0 {
            Some(Priority(value))
        } else {
            None
        }
    }

    /// Get the numeric value
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::DEFAULT
    }
}

impl TryFrom<u8> for Priority {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Priority::new(value).ok_or(Error::InvalidPriority(value))
    }
}

impl core::fmt::Display for Priority {
    fn fmt(&self, fmt: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(fmt, "P{:02}", self.0)
    }
}

/// A handle to a task, as held by synchronisation code that wants to
/// [`unblock`](Scheduler::unblock) it later
///
/// The handle remembers the task ID as well as where the task lives, so a
/// handle to a task that has since been reclaimed is recognised as stale.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TaskRef {
    pub(crate) slot: usize,
    pub(crate) id: TaskId,
}

impl TaskRef {
    /// The ID of the task this handle refers to
    pub const fn id(&self) -> TaskId {
        self.id
    }
}

/// A snapshot of one task, for diagnostics
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskInfo {
    /// The task's ID
    pub id: TaskId,
    /// The task's name
    pub name: TaskName,
    /// The task's state when the snapshot was taken
    pub status: Status,
    /// The task's priority when the snapshot was taken
    pub priority: Priority,
    /// The tick the task last asked to sleep until
    pub wake_tick: u64,
}

/// The metadata at the bottom of every task block
///
/// The stack sits above it in the same block and grows down towards it, which
/// is why `canary` comes last.
#[repr(C)]
pub(crate) struct Task {
    id: TaskId,
    name: TaskName,
    pub(crate) status: Status,
    pub(crate) priority: Priority,
    pub(crate) wake_tick: u64,
    entry: Option<TaskEntryFn>,
    arg: usize,
    /// Saved CPU state. Only meaningful while we are not running.
    pub(crate) context: Context,
    /// Our membership of the ready queue, the sleep queue or a wait list
    pub(crate) link: Link,
    canary: u32,
}

impl Task {
    /// Create a new [`Task`], in the Blocked state
    pub(crate) fn new(
        id: TaskId,
        name: &str,
        priority: Priority,
        entry: Option<TaskEntryFn>,
        arg: usize,
    ) -> Task {
        Task {
            id,
            name: truncated(name),
            status: Status::Blocked,
            priority,
            wake_tick: 0,
            entry,
            arg,
            context: Context::default(),
            link: Link::new(),
            canary: CANARY,
        }
    }

    /// Get the ID
    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    /// Get the name
    pub(crate) fn name(&self) -> &TaskName {
        &self.name
    }

    /// Get the function this task was created to run, and its argument
    pub(crate) fn entry(&self) -> Option<(TaskEntryFn, usize)> {
        self.entry.map(|f| (f, self.arg))
    }

    /// Has anything scribbled over the end of our metadata?
    pub(crate) fn is_intact(&self) -> bool {
        self.canary == CANARY
    }

    /// Take a snapshot for diagnostics
    pub(crate) fn info(&self) -> TaskInfo {
        TaskInfo {
            id: self.id,
            name: self.name.clone(),
            status: self.status,
            priority: self.priority,
            wake_tick: self.wake_tick,
        }
    }

    /// Overwrite the canary, as a stack overflow would
    #[cfg(test)]
    pub(crate) fn smash_canary(&mut self) {
        self.canary = 0;
    }
}

/// Copy as much of `name` as fits, without splitting a character
fn truncated(name: &str) -> TaskName {
    let mut out = TaskName::new();
    for c in name.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_names_are_truncated() {
        let name = truncated("a-rather-long-task-name");
        assert_eq!(name.as_str(), "a-rather-long-ta");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        // fifteen ASCII bytes, then a two-byte character that won't fit
        let name = truncated("abcdefghijklmnoé");
        assert_eq!(name.as_str(), "abcdefghijklmno");
    }

    #[test]
    fn priority_bounds() {
        assert_eq!(Priority::new(63), Some(Priority::MAX));
        assert_eq!(Priority::new(64), None);
        assert_eq!(Priority::try_from(200), Err(Error::InvalidPriority(200)));
        assert!(Priority::MAX > Priority::DEFAULT);
        assert!(Priority::DEFAULT > Priority::MIN);
    }

    #[test]
    fn task_id_display() {
        assert_eq!(format!("{}", TaskId::new(7)), "T007");
        assert_eq!(format!("{}", TaskId::invalid()), "T---");
    }
}

// End of File
