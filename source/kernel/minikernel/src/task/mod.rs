// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Process table and per-process control entries
//! OWNERS: @kernel-sched-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests + proptest (capacity under create/terminate sequences)
//! PUBLIC API: ProcessTable, Pce, ProcState, PendingCall
//! DEPENDS_ON: minikernel-hal handles, state::QueueId, sync::mutex::{MutexKind, MutexName}
//! INVARIANTS: Fixed capacity MAX_PROC; a slot leaves Unused only through `allocate` + `activate`;
//!             a process holds at most NUM_MUT_PROC descriptors

mod lifecycle;

#[cfg(test)]
mod tests_prop;

use minikernel_hal::{ContextHandle, ImageHandle, StackHandle};

use crate::config::{MAX_PROC, NUM_MUT_PROC};
use crate::state::QueueId;
use crate::sync::mutex::{MutexKind, MutexName};
use crate::types::{Descriptor, MutexId, Pid};

/// Lifecycle state of a process slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    Unused,
    Ready,
    Running,
    Blocked,
    Terminated,
}

impl ProcState {
    /// Ready or Running: the process sits in the ready queue.
    pub const fn is_runnable(self) -> bool {
        matches!(self, ProcState::Ready | ProcState::Running)
    }

    /// Anything but Unused and Terminated.
    pub const fn is_live(self) -> bool {
        !matches!(self, ProcState::Unused | ProcState::Terminated)
    }
}

/// Blocking syscall a parked process is waiting to complete.
///
/// Evaluated again when the scheduler dispatches the process; the outcome is
/// written to the result register of the resumed context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingCall {
    Sleep,
    Lock { mutex: MutexId },
    CreateMutex { name: MutexName, kind: MutexKind },
}

/// Process control entry.
#[derive(Debug, Clone)]
pub struct Pce {
    pub(crate) pid: Pid,
    pub(crate) state: ProcState,
    pub(crate) queue: Option<QueueId>,
    pub(crate) context: Option<ContextHandle>,
    pub(crate) stack: Option<StackHandle>,
    pub(crate) image: Option<ImageHandle>,
    pub(crate) sleep_ticks: u64,
    pub(crate) remaining_ticks: u32,
    pub(crate) descriptors: [Option<MutexId>; NUM_MUT_PROC],
    pub(crate) pending: Option<PendingCall>,
}

impl Pce {
    fn unused(pid: Pid) -> Self {
        Self {
            pid,
            state: ProcState::Unused,
            queue: None,
            context: None,
            stack: None,
            image: None,
            sleep_ticks: 0,
            remaining_ticks: 0,
            descriptors: [None; NUM_MUT_PROC],
            pending: None,
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn state(&self) -> ProcState {
        self.state
    }

    /// Queue currently holding this process, if any.
    pub fn queue(&self) -> Option<QueueId> {
        self.queue
    }

    pub fn context(&self) -> Option<ContextHandle> {
        self.context
    }

    pub fn stack(&self) -> Option<StackHandle> {
        self.stack
    }

    pub fn image(&self) -> Option<ImageHandle> {
        self.image
    }

    /// Ticks left before a sleeping process wakes.
    pub fn sleep_ticks(&self) -> u64 {
        self.sleep_ticks
    }

    /// Ticks left in the current round-robin quantum.
    pub fn remaining_ticks(&self) -> u32 {
        self.remaining_ticks
    }

    pub fn pending(&self) -> Option<PendingCall> {
        self.pending
    }

    /// Mutex slot referenced by `descriptor`, if mapped.
    pub fn descriptor(&self, descriptor: Descriptor) -> Option<MutexId> {
        self.descriptors.get(descriptor.as_index()).copied().flatten()
    }

    /// Lowest unmapped descriptor.
    pub fn free_descriptor(&self) -> Option<Descriptor> {
        Descriptor::all().find(|d| self.descriptor(*d).is_none())
    }

    /// Number of mapped descriptors.
    pub fn open_descriptors(&self) -> usize {
        self.descriptors.iter().filter(|slot| slot.is_some()).count()
    }

    pub(crate) fn map_descriptor(&mut self, descriptor: Descriptor, mutex: MutexId) {
        self.descriptors[descriptor.as_index()] = Some(mutex);
    }

    pub(crate) fn unmap_descriptor(&mut self, descriptor: Descriptor) {
        self.descriptors[descriptor.as_index()] = None;
    }

    fn references(&self, mutex: MutexId) -> bool {
        self.descriptors.iter().any(|slot| *slot == Some(mutex))
    }

    /// Fills a freshly allocated slot. Queue placement is left to the caller.
    pub(crate) fn activate(
        &mut self,
        context: ContextHandle,
        stack: StackHandle,
        image: ImageHandle,
        quantum: u32,
    ) {
        *self = Self::unused(self.pid);
        self.context = Some(context);
        self.stack = Some(stack);
        self.image = Some(image);
        self.remaining_ticks = quantum;
    }

    /// Returns the slot to Unused. Resources must already be released.
    pub(crate) fn reset(&mut self) {
        *self = Self::unused(self.pid);
    }
}

/// Fixed-capacity process table.
pub struct ProcessTable {
    slots: [Pce; MAX_PROC],
}

impl ProcessTable {
    /// Creates a table with every slot Unused.
    pub fn new() -> Self {
        Self { slots: core::array::from_fn(|i| Pce::unused(Pid::from_raw(i as u32))) }
    }

    /// Resets every slot to Unused. Called once at boot.
    pub fn initialize(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.reset();
        }
    }

    /// Finds the first Unused slot. The slot stays Unused until activated.
    pub fn allocate(&self) -> Option<Pid> {
        self.slots.iter().find(|slot| slot.state == ProcState::Unused).map(|slot| slot.pid)
    }

    pub fn get(&self, pid: Pid) -> Option<&Pce> {
        self.slots.get(pid.as_index())
    }

    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut Pce> {
        self.slots.get_mut(pid.as_index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pce> {
        self.slots.iter()
    }

    /// Slots not in state Unused.
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|slot| slot.state != ProcState::Unused).count()
    }

    /// True when any non-Unused process maps a descriptor to `mutex`.
    pub fn references_mutex(&self, mutex: MutexId) -> bool {
        self.slots
            .iter()
            .any(|slot| slot.state != ProcState::Unused && slot.references(mutex))
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}
