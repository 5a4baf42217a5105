// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Shared kernel state and the single queue/state transition primitive
//! OWNERS: @kernel-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests + every integration test calls check_invariants
//! PUBLIC API: KernelState, QueueId, KernelStats, InvariantError
//! DEPENDS_ON: task::ProcessTable, sync::mutex::MutexTable, sched::Scheduler
//! INVARIANTS: `transition` is the only code that changes queue membership or a
//!             membership-relevant state; corruption is fatal

use core::fmt;

use crate::log_error;
use crate::queue::WaitQueue;
use crate::sched::Scheduler;
use crate::sync::mutex::{MutexKind, MutexState, MutexTable};
use crate::task::{PendingCall, ProcState, ProcessTable};
use crate::types::{MutexId, Pid};

/// Identifies every queue a process can be a member of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueId {
    Ready,
    Sleeping,
    /// Processes waiting for a free mutex-table slot.
    MutexSlot,
    /// Waiters of one mutex.
    Mutex(MutexId),
}

/// Counters kept for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KernelStats {
    pub ticks: u64,
    pub context_switches: u64,
    pub idle_halts: u64,
    pub syscalls: u64,
}

/// Inconsistency found by [`KernelState::check_invariants`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvariantError {
    /// State and queue tag disagree.
    StateQueueMismatch { pid: Pid, state: ProcState, queue: Option<QueueId> },
    /// Tagged with a queue that does not hold it.
    MissingFromQueue { pid: Pid, queue: QueueId },
    /// Queue holds a process tagged with another queue.
    StrayQueueEntry { pid: Pid, queue: QueueId },
    /// Parked process carries the wrong pending call.
    PendingMismatch { pid: Pid },
    /// Running process is not the current one, or current is not Running.
    CurrentMismatch { pid: Pid },
    /// Locked mutex owned by a process that is not live.
    OwnerNotLive { mutex: MutexId, owner: Pid },
    /// Lock state, owner and count disagree.
    BadLockState { mutex: MutexId },
    /// Descriptor maps to an Unused mutex.
    DanglingDescriptor { pid: Pid, mutex: MutexId },
}

impl fmt::Display for InvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Logs at ERROR and aborts. There is no recovery path.
#[cold]
pub(crate) fn fatal(args: fmt::Arguments<'_>) -> ! {
    log_error!(target: "kernel", "fatal: {}", args);
    panic!("{}", args);
}

/// Every table and queue the core mutates.
pub struct KernelState {
    pub procs: ProcessTable,
    pub mutexes: MutexTable,
    pub sched: Scheduler,
    pub stats: KernelStats,
}

impl KernelState {
    pub fn new() -> Self {
        Self {
            procs: ProcessTable::new(),
            mutexes: MutexTable::new(),
            sched: Scheduler::new(),
            stats: KernelStats::default(),
        }
    }

    fn queue(&self, id: QueueId) -> Option<&WaitQueue> {
        match id {
            QueueId::Ready => Some(&self.sched.ready),
            QueueId::Sleeping => Some(&self.sched.sleeping),
            QueueId::MutexSlot => Some(&self.mutexes.slot_waiters),
            QueueId::Mutex(mutex) => self.mutexes.get(mutex).map(|m| &m.waiters),
        }
    }

    fn queue_mut(&mut self, id: QueueId) -> Option<&mut WaitQueue> {
        match id {
            QueueId::Ready => Some(&mut self.sched.ready),
            QueueId::Sleeping => Some(&mut self.sched.sleeping),
            QueueId::MutexSlot => Some(&mut self.mutexes.slot_waiters),
            QueueId::Mutex(mutex) => self.mutexes.get_mut(mutex).map(|m| &mut m.waiters),
        }
    }

    /// Moves `pid` out of its current queue, into `to` (appended at the tail),
    /// and sets its state, as one step.
    ///
    /// Moving a process to the queue it already occupies sends it to the tail.
    pub(crate) fn transition(&mut self, pid: Pid, to: Option<QueueId>, state: ProcState) {
        let from = match self.procs.get(pid) {
            Some(pce) => pce.queue,
            None => fatal(format_args!("transition of unknown pid {}", pid)),
        };
        if let Some(from) = from {
            match self.queue_mut(from).map(|q| q.remove(pid)) {
                Some(Ok(())) => {}
                Some(Err(err)) => fatal(format_args!("queue {:?} corrupted: {}", from, err)),
                None => fatal(format_args!("pid {} tagged with missing queue {:?}", pid, from)),
            }
        }
        if let Some(to) = to {
            match self.queue_mut(to).map(|q| q.push_back(pid)) {
                Some(Ok(())) => {}
                Some(Err(err)) => fatal(format_args!("queue {:?} corrupted: {}", to, err)),
                None => fatal(format_args!("pid {} moved to missing queue {:?}", pid, to)),
            }
        }
        if let Some(pce) = self.procs.get_mut(pid) {
            pce.queue = to;
            pce.state = state;
        }
    }

    /// Verifies that process states, queue membership, pending calls and mutex
    /// ownership all agree.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        let current = self.sched.current();
        for pce in self.procs.iter() {
            let pid = pce.pid();
            let expected_ok = match (pce.state(), pce.queue()) {
                (ProcState::Unused | ProcState::Terminated, None) => true,
                (ProcState::Ready | ProcState::Running, Some(QueueId::Ready)) => true,
                (ProcState::Blocked, Some(QueueId::Sleeping | QueueId::MutexSlot)) => true,
                (ProcState::Blocked, Some(QueueId::Mutex(_))) => true,
                _ => false,
            };
            if !expected_ok {
                return Err(InvariantError::StateQueueMismatch {
                    pid,
                    state: pce.state(),
                    queue: pce.queue(),
                });
            }
            if let Some(queue) = pce.queue() {
                if !self.queue(queue).is_some_and(|q| q.contains(pid)) {
                    return Err(InvariantError::MissingFromQueue { pid, queue });
                }
            }
            let pending_ok = match (pce.queue(), pce.pending()) {
                (Some(QueueId::Sleeping), pending) => pending == Some(PendingCall::Sleep),
                (Some(QueueId::MutexSlot), pending) => {
                    matches!(pending, Some(PendingCall::CreateMutex { .. }))
                }
                (Some(QueueId::Mutex(m)), pending) => {
                    pending == Some(PendingCall::Lock { mutex: m })
                }
                _ => true,
            };
            if !pending_ok {
                return Err(InvariantError::PendingMismatch { pid });
            }
            let is_current = current == Some(pid);
            if (pce.state() == ProcState::Running) != is_current {
                return Err(InvariantError::CurrentMismatch { pid });
            }
            if pce.state().is_live() {
                for mutex in pce.descriptors.iter().flatten() {
                    let unused =
                        self.mutexes.get(*mutex).map_or(true, |m| m.state() == MutexState::Unused);
                    if unused {
                        return Err(InvariantError::DanglingDescriptor { pid, mutex: *mutex });
                    }
                }
            }
        }

        let mut queues = [QueueId::Ready, QueueId::Sleeping, QueueId::MutexSlot]
            .into_iter()
            .chain(self.mutexes.iter().map(|m| QueueId::Mutex(m.id())));
        if let Some((pid, queue)) = queues.find_map(|queue| {
            self.queue(queue)?
                .iter()
                .find(|pid| self.procs.get(*pid).map(|p| p.queue()) != Some(Some(queue)))
                .map(|pid| (pid, queue))
        }) {
            return Err(InvariantError::StrayQueueEntry { pid, queue });
        }

        for entry in self.mutexes.iter() {
            let mutex = entry.id();
            let consistent = match entry.state() {
                MutexState::Unused | MutexState::Unlocked => {
                    entry.owner().is_none() && entry.lock_count() == 0 && entry.waiters().is_empty()
                }
                MutexState::Locked => {
                    entry.owner().is_some()
                        && entry.lock_count() >= 1
                        && (entry.kind() == MutexKind::Recursive || entry.lock_count() == 1)
                }
            };
            if !consistent {
                return Err(InvariantError::BadLockState { mutex });
            }
            if let Some(owner) = entry.owner() {
                let live = self.procs.get(owner).is_some_and(|p| p.state().is_live());
                if !live {
                    return Err(InvariantError::OwnerNotLive { mutex, owner });
                }
            }
        }
        Ok(())
    }
}

impl Default for KernelState {
    fn default() -> Self {
        Self::new()
    }
}
