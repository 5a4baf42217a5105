// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Index newtypes for process slots, mutex slots and per-process descriptors
//! OWNERS: @kernel-team
//! PUBLIC API: Pid, MutexId, Descriptor
//! DEPENDS_ON: config (table sizes)
//! INVARIANTS: A Pid is a process-table index; a MutexId is a mutex-table index;
//!             Descriptor::decode rejects values outside the per-process table

use core::fmt;

use crate::config::{MAX_PROC, NUM_MUT, NUM_MUT_PROC};

/// Process identifier. Equal to the process-table slot index.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Pid(u32);

impl Pid {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    /// Returns the PID as an index into the process table.
    #[inline]
    pub const fn as_index(self) -> usize {
        self.0 as usize
    }

    /// Decodes a register value; `None` when it cannot name a slot.
    #[inline]
    pub fn decode(raw: usize) -> Option<Self> {
        if raw < MAX_PROC {
            Some(Self(raw as u32))
        } else {
            None
        }
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mutex-table slot index.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct MutexId(u32);

impl MutexId {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn as_index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub fn decode(raw: usize) -> Option<Self> {
        if raw < NUM_MUT {
            Some(Self(raw as u32))
        } else {
            None
        }
    }
}

impl fmt::Display for MutexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-process mutex handle, analogous to a file descriptor.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Descriptor(usize);

impl Descriptor {
    /// Decodes a register value; `None` when out of range.
    #[inline]
    pub fn decode(raw: usize) -> Option<Self> {
        if raw < NUM_MUT_PROC {
            Some(Self(raw))
        } else {
            None
        }
    }

    #[inline]
    pub const fn as_index(self) -> usize {
        self.0
    }

    /// Iterates every descriptor value in table order.
    pub fn all() -> impl Iterator<Item = Descriptor> {
        (0..NUM_MUT_PROC).map(Descriptor)
    }
}
