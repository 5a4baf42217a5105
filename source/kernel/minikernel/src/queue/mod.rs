// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: FIFO of process indices used for the ready, sleeping and wait lists
//! OWNERS: @kernel-sched-team
//! PUBLIC API: WaitQueue (push_back/pop_front/remove/front/iter), QueueError
//! INVARIANTS: A Pid appears at most once per queue; removing an absent Pid is a checked error
//!
//! Queues hold table indices, never references, so a process entry can be
//! moved between queues without aliasing. Capacity is bounded by `MAX_PROC`.

extern crate alloc;

use alloc::collections::VecDeque;
use core::fmt;

use crate::config::MAX_PROC;
use crate::types::Pid;

#[cfg(test)]
mod tests_prop;

/// Errors produced by queue manipulation.
#[must_use = "queue errors indicate corrupted scheduler state"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// Pid is already a member of this queue.
    AlreadyQueued(Pid),
    /// Pid is not a member of this queue.
    NotQueued(Pid),
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// FIFO of process ids.
#[derive(Debug, Clone, Default)]
pub struct WaitQueue {
    items: VecDeque<Pid>,
}

impl WaitQueue {
    pub fn new() -> Self {
        Self { items: VecDeque::with_capacity(MAX_PROC) }
    }

    /// Appends `pid` at the tail.
    pub fn push_back(&mut self, pid: Pid) -> Result<(), QueueError> {
        if self.contains(pid) {
            return Err(QueueError::AlreadyQueued(pid));
        }
        self.items.push_back(pid);
        Ok(())
    }

    /// Removes and returns the head.
    pub fn pop_front(&mut self) -> Option<Pid> {
        self.items.pop_front()
    }

    /// Removes `pid` wherever it sits, preserving the order of the others.
    pub fn remove(&mut self, pid: Pid) -> Result<(), QueueError> {
        let index =
            self.items.iter().position(|&p| p == pid).ok_or(QueueError::NotQueued(pid))?;
        self.items.remove(index);
        Ok(())
    }

    pub fn front(&self) -> Option<Pid> {
        self.items.front().copied()
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.items.contains(&pid)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates head to tail.
    pub fn iter(&self) -> impl Iterator<Item = Pid> + '_ {
        self.items.iter().copied()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
