// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Mutex syscall protocols (create/open/lock/unlock/close)
//! OWNERS: @kernel-team
//! DEPENDS_ON: sync::mutex tables, state::transition
//! INVARIANTS: A contended lock parks the caller on the mutex's waiter queue;
//!             unlocking to zero hands the mutex to the head waiter;
//!             a full table parks the creator until a close reclaims a slot

use minikernel_hal::Hal;

use crate::state::QueueId;
use crate::sync::mutex::{LockOutcome, MutexKind, MutexName, MutexState, UnlockOutcome};
use crate::syscall::api::Context;
use crate::syscall::{Error, SysResult};
use crate::task::{PendingCall, ProcState};
use crate::types::{Descriptor, MutexId, Pid};
use crate::{log_debug, log_info};

impl<H: Hal> Context<'_, H> {
    /// Maps a raw descriptor of `pid` to a live mutex slot.
    pub(crate) fn resolve_descriptor(&self, pid: Pid, raw: usize) -> SysResult<MutexId> {
        let descriptor = Descriptor::decode(raw).ok_or(Error::InvalidDescriptor)?;
        let mutex = self.pce(pid).descriptor(descriptor).ok_or(Error::InvalidDescriptor)?;
        match self.state.mutexes.get(mutex) {
            Some(entry) if entry.state() != MutexState::Unused => Ok(mutex),
            _ => Err(Error::InvalidDescriptor),
        }
    }

    /// Creates a mutex and maps it to the lowest free descriptor of `pid`.
    ///
    /// Also runs as the retry of a creator parked on a full table, so the
    /// name is checked again every time.
    pub(crate) fn create_mutex(
        &mut self,
        pid: Pid,
        name: MutexName,
        kind: MutexKind,
    ) -> SysResult<usize> {
        if self.state.mutexes.find(name.as_bytes()).is_some() {
            return Err(Error::NameInUse);
        }
        let descriptor = self.pce(pid).free_descriptor().ok_or(Error::NoFreeDescriptor)?;
        let Some(mutex) = self.state.mutexes.free_slot() else {
            log_info!(target: "mutex", "table full; pid {} waits to create {}", pid, name);
            self.pce_mut(pid).pending = Some(PendingCall::CreateMutex { name, kind });
            self.state.transition(pid, Some(QueueId::MutexSlot), ProcState::Blocked);
            return Err(Error::Blocked);
        };
        self.state.mutexes.install(mutex, name, kind);
        self.pce_mut(pid).map_descriptor(descriptor, mutex);
        log_info!(
            target: "mutex",
            "pid {} created {} ({:?}) in slot {} as descriptor {}",
            pid,
            name,
            kind,
            mutex,
            descriptor.as_index()
        );
        Ok(descriptor.as_index())
    }

    pub(crate) fn open_mutex(&mut self, pid: Pid, name: &MutexName) -> SysResult<usize> {
        let mutex = self.state.mutexes.find(name.as_bytes()).ok_or(Error::NotFound)?;
        let descriptor = self.pce(pid).free_descriptor().ok_or(Error::NoFreeDescriptor)?;
        self.pce_mut(pid).map_descriptor(descriptor, mutex);
        Ok(descriptor.as_index())
    }

    /// Lock algorithm. Parks `pid` when another process holds the mutex.
    pub(crate) fn lock_mutex(&mut self, pid: Pid, mutex: MutexId) -> SysResult<usize> {
        let entry = self.state.mutexes.get_mut(mutex).ok_or(Error::InvalidDescriptor)?;
        match entry.try_lock(pid)? {
            LockOutcome::Acquired => Ok(0),
            LockOutcome::Contended { owner } => {
                log_debug!(target: "mutex", "pid {} waits for mutex {} held by {}", pid, mutex, owner);
                self.pce_mut(pid).pending = Some(PendingCall::Lock { mutex });
                self.state.transition(pid, Some(QueueId::Mutex(mutex)), ProcState::Blocked);
                Err(Error::Blocked)
            }
        }
    }

    /// Completes a parked lock: ownership was handed over on unlock, otherwise
    /// the lock algorithm runs again.
    pub(crate) fn resume_lock(&mut self, pid: Pid, mutex: MutexId) -> SysResult<usize> {
        if self.state.mutexes.get(mutex).is_some_and(|m| m.is_held_by(pid)) {
            return Ok(0);
        }
        self.lock_mutex(pid, mutex)
    }

    /// Drops one lock. Reaching zero with waiters hands the mutex to the head waiter.
    pub(crate) fn unlock_mutex(&mut self, pid: Pid, mutex: MutexId) -> SysResult<usize> {
        let entry = self.state.mutexes.get_mut(mutex).ok_or(Error::InvalidDescriptor)?;
        let heir = match entry.unlock(pid)? {
            UnlockOutcome::Held { .. } => None,
            UnlockOutcome::Released => {
                let heir = entry.waiters.front();
                if let Some(heir) = heir {
                    entry.grant(heir);
                }
                heir
            }
        };
        if let Some(heir) = heir {
            self.state.transition(heir, Some(QueueId::Ready), ProcState::Ready);
            log_debug!(target: "mutex", "mutex {} handed from pid {} to pid {}", mutex, pid, heir);
        }
        Ok(0)
    }

    /// Releases every lock `pid` holds through `descriptor`, unmaps it, and
    /// reclaims the slot once no process references it. Reclaiming wakes one
    /// creator parked on a full table.
    pub(crate) fn close_mutex(&mut self, pid: Pid, descriptor: Descriptor) -> SysResult<usize> {
        let mutex = self.pce(pid).descriptor(descriptor).ok_or(Error::InvalidDescriptor)?;
        while self.state.mutexes.get(mutex).is_some_and(|m| m.is_held_by(pid)) {
            self.unlock_mutex(pid, mutex)?;
        }
        self.pce_mut(pid).unmap_descriptor(descriptor);

        if self.state.procs.references_mutex(mutex) {
            return Ok(0);
        }
        self.state.mutexes.reclaim(mutex);
        log_info!(target: "mutex", "slot {} reclaimed", mutex);
        if let Some(waiter) = self.state.mutexes.slot_waiters().front() {
            self.state.transition(waiter, Some(QueueId::Ready), ProcState::Ready);
            log_debug!(target: "mutex", "pid {} may retry its create", waiter);
        }
        Ok(0)
    }
}
