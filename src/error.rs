//! Holds the [`Error`] type

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

/// The recoverable failures of the scheduler API
///
/// Everything else the scheduler can detect is a broken kernel invariant, and
/// panics instead.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum Error {
    /// No task block (or no task table slot) was available
    OutOfMemory,
    /// The value is outside `Priority::MIN..=Priority::MAX`
    InvalidPriority(u8),
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::OutOfMemory => write!(f, "out of task memory"),
            Error::InvalidPriority(value) => write!(f, "priority {value} out of range"),
        }
    }
}

impl core::error::Error for Error {}

// End of File
