// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Named mutex table (recursive and non-recursive kinds)
//! OWNERS: @kernel-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests + proptest (recursive lock counts)
//! PUBLIC API: MutexTable, MutexEntry, MutexKind, MutexState, MutexName, MutexError,
//!             LockOutcome, UnlockOutcome
//! DEPENDS_ON: queue::WaitQueue, types::{MutexId, Pid}
//! INVARIANTS: Names unique among non-Unused entries; Unlocked => count 0 and no owner;
//!             Locked => owner set and count >= 1 (exactly 1 for NonRecursive)

use core::fmt;

use crate::config::{MAX_NOM_MUT, NUM_MUT};
use crate::queue::WaitQueue;
use crate::types::{MutexId, Pid};

/// Locking discipline chosen at creation time.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutexKind {
    NonRecursive = 0,
    Recursive = 1,
}

impl MutexKind {
    /// Decodes the user-visible kind value.
    pub fn from_raw(raw: usize) -> Option<Self> {
        match raw {
            0 => Some(MutexKind::NonRecursive),
            1 => Some(MutexKind::Recursive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutexState {
    Unused,
    Unlocked,
    Locked,
}

/// Rejected mutex name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameError {
    Empty,
    TooLong,
}

/// Mutex name stored inline, at most `MAX_NOM_MUT` bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MutexName {
    bytes: [u8; MAX_NOM_MUT],
    len: u8,
}

impl MutexName {
    pub fn new(name: &[u8]) -> Result<Self, NameError> {
        if name.is_empty() {
            return Err(NameError::Empty);
        }
        if name.len() > MAX_NOM_MUT {
            return Err(NameError::TooLong);
        }
        let mut bytes = [0u8; MAX_NOM_MUT];
        bytes[..name.len()].copy_from_slice(name);
        Ok(Self { bytes, len: name.len() as u8 })
    }

    const fn blank() -> Self {
        Self { bytes: [0; MAX_NOM_MUT], len: 0 }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..usize::from(self.len)]
    }
}

impl fmt::Debug for MutexName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MutexName({})", self)
    }
}

impl fmt::Display for MutexName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match core::str::from_utf8(self.as_bytes()) {
            Ok(s) => f.write_str(s),
            Err(_) => write!(f, "{:?}", self.as_bytes()),
        }
    }
}

/// Errors produced by lock-state transitions.
#[must_use = "mutex errors must be handled explicitly"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutexError {
    /// Owner relocking a non-recursive mutex.
    AlreadyLocked,
    /// Caller does not hold the mutex.
    NotOwner,
    /// Entry is not allocated.
    Unused,
}

/// Result of a lock attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// Caller now holds the mutex.
    Acquired,
    /// Held by another process; the caller must wait.
    Contended { owner: Pid },
}

/// Result of a successful unlock step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockOutcome {
    /// Caller still holds `count` recursive locks.
    Held { count: u32 },
    /// Count reached zero; the mutex is Unlocked.
    Released,
}

/// Mutex control entry.
#[derive(Debug, Clone)]
pub struct MutexEntry {
    id: MutexId,
    name: MutexName,
    kind: MutexKind,
    state: MutexState,
    owner: Option<Pid>,
    lock_count: u32,
    pub(crate) waiters: WaitQueue,
}

impl MutexEntry {
    fn unused(id: MutexId) -> Self {
        Self {
            id,
            name: MutexName::blank(),
            kind: MutexKind::NonRecursive,
            state: MutexState::Unused,
            owner: None,
            lock_count: 0,
            waiters: WaitQueue::new(),
        }
    }

    pub fn id(&self) -> MutexId {
        self.id
    }

    pub fn name(&self) -> &MutexName {
        &self.name
    }

    pub fn kind(&self) -> MutexKind {
        self.kind
    }

    pub fn state(&self) -> MutexState {
        self.state
    }

    pub fn owner(&self) -> Option<Pid> {
        self.owner
    }

    pub fn lock_count(&self) -> u32 {
        self.lock_count
    }

    pub fn waiters(&self) -> &WaitQueue {
        &self.waiters
    }

    pub fn is_held_by(&self, pid: Pid) -> bool {
        self.state == MutexState::Locked && self.owner == Some(pid)
    }

    /// Applies the lock algorithm for `pid`.
    pub fn try_lock(&mut self, pid: Pid) -> Result<LockOutcome, MutexError> {
        match self.state {
            MutexState::Unused => Err(MutexError::Unused),
            MutexState::Unlocked => {
                self.grant(pid);
                Ok(LockOutcome::Acquired)
            }
            MutexState::Locked => match self.owner {
                Some(owner) if owner == pid => match self.kind {
                    MutexKind::Recursive => {
                        self.lock_count = self.lock_count.saturating_add(1);
                        Ok(LockOutcome::Acquired)
                    }
                    MutexKind::NonRecursive => Err(MutexError::AlreadyLocked),
                },
                Some(owner) => Ok(LockOutcome::Contended { owner }),
                // Locked entries always carry an owner.
                None => {
                    self.grant(pid);
                    Ok(LockOutcome::Acquired)
                }
            },
        }
    }

    /// Drops one lock held by `pid`.
    pub fn unlock(&mut self, pid: Pid) -> Result<UnlockOutcome, MutexError> {
        match self.state {
            MutexState::Unused => Err(MutexError::Unused),
            MutexState::Locked if self.owner == Some(pid) => {
                self.lock_count = self.lock_count.saturating_sub(1);
                if self.lock_count == 0 {
                    self.state = MutexState::Unlocked;
                    self.owner = None;
                    Ok(UnlockOutcome::Released)
                } else {
                    Ok(UnlockOutcome::Held { count: self.lock_count })
                }
            }
            _ => Err(MutexError::NotOwner),
        }
    }

    /// Hands the mutex to `pid` with a single lock.
    pub(crate) fn grant(&mut self, pid: Pid) {
        self.state = MutexState::Locked;
        self.owner = Some(pid);
        self.lock_count = 1;
    }
}

/// Fixed-capacity mutex table plus the queue of processes waiting for a free slot.
pub struct MutexTable {
    slots: [MutexEntry; NUM_MUT],
    pub(crate) slot_waiters: WaitQueue,
}

impl MutexTable {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|i| MutexEntry::unused(MutexId::from_raw(i as u32))),
            slot_waiters: WaitQueue::new(),
        }
    }

    /// Resets every slot to Unused. Called once at boot.
    pub fn initialize(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = MutexEntry::unused(slot.id);
        }
        self.slot_waiters.clear();
    }

    /// Finds a non-Unused mutex named `name`.
    pub fn find(&self, name: &[u8]) -> Option<MutexId> {
        self.slots
            .iter()
            .find(|slot| slot.state != MutexState::Unused && slot.name.as_bytes() == name)
            .map(|slot| slot.id)
    }

    /// First Unused slot.
    pub fn free_slot(&self) -> Option<MutexId> {
        self.slots.iter().find(|slot| slot.state == MutexState::Unused).map(|slot| slot.id)
    }

    /// Initialises slot `id` as an Unlocked mutex.
    pub(crate) fn install(&mut self, id: MutexId, name: MutexName, kind: MutexKind) {
        if let Some(slot) = self.slots.get_mut(id.as_index()) {
            *slot = MutexEntry::unused(id);
            slot.name = name;
            slot.kind = kind;
            slot.state = MutexState::Unlocked;
        }
    }

    /// Returns slot `id` to Unused.
    pub(crate) fn reclaim(&mut self, id: MutexId) {
        if let Some(slot) = self.slots.get_mut(id.as_index()) {
            *slot = MutexEntry::unused(id);
        }
    }

    pub fn get(&self, id: MutexId) -> Option<&MutexEntry> {
        self.slots.get(id.as_index())
    }

    pub fn get_mut(&mut self, id: MutexId) -> Option<&mut MutexEntry> {
        self.slots.get_mut(id.as_index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &MutexEntry> {
        self.slots.iter()
    }

    /// Processes blocked waiting for a free slot.
    pub fn slot_waiters(&self) -> &WaitQueue {
        &self.slot_waiters
    }

    /// Slots not in state Unused.
    pub fn in_use(&self) -> usize {
        self.slots.iter().filter(|slot| slot.state != MutexState::Unused).count()
    }
}

impl Default for MutexTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(raw: u32) -> Pid {
        Pid::from_raw(raw)
    }

    fn table_with(kind: MutexKind) -> (MutexTable, MutexId) {
        let mut table = MutexTable::new();
        let id = table.free_slot().unwrap();
        table.install(id, MutexName::new(b"m").unwrap(), kind);
        (table, id)
    }

    #[test]
    fn names_validate_length() {
        assert_eq!(MutexName::new(b""), Err(NameError::Empty));
        assert!(MutexName::new(b"12345678").is_ok());
        assert_eq!(MutexName::new(b"123456789"), Err(NameError::TooLong));
        assert_eq!(MutexName::new(b"abc").unwrap().to_string(), "abc");
    }

    #[test]
    fn find_ignores_unused_slots() {
        let (mut table, id) = table_with(MutexKind::NonRecursive);
        assert_eq!(table.find(b"m"), Some(id));
        table.reclaim(id);
        assert_eq!(table.find(b"m"), None);
        assert_eq!(table.in_use(), 0);
    }

    #[test]
    fn non_recursive_relock_fails() {
        let (mut table, id) = table_with(MutexKind::NonRecursive);
        let entry = table.get_mut(id).unwrap();
        assert_eq!(entry.try_lock(pid(1)), Ok(LockOutcome::Acquired));
        assert_eq!(entry.try_lock(pid(1)), Err(MutexError::AlreadyLocked));
        assert_eq!(entry.lock_count(), 1);
    }

    #[test]
    fn contended_lock_reports_owner() {
        let (mut table, id) = table_with(MutexKind::Recursive);
        let entry = table.get_mut(id).unwrap();
        entry.try_lock(pid(1)).unwrap();
        assert_eq!(entry.try_lock(pid(2)), Ok(LockOutcome::Contended { owner: pid(1) }));
        assert_eq!(entry.unlock(pid(2)), Err(MutexError::NotOwner));
    }

    #[test]
    fn unlock_of_unlocked_mutex_is_not_owner() {
        let (mut table, id) = table_with(MutexKind::NonRecursive);
        assert_eq!(table.get_mut(id).unwrap().unlock(pid(0)), Err(MutexError::NotOwner));
    }

    #[test]
    fn table_capacity() {
        let mut table = MutexTable::new();
        for i in 0..NUM_MUT {
            let id = table.free_slot().unwrap();
            let name = [b'a' + (i as u8)];
            table.install(id, MutexName::new(&name).unwrap(), MutexKind::Recursive);
        }
        assert_eq!(table.free_slot(), None);
        assert_eq!(table.in_use(), NUM_MUT);
    }
}
