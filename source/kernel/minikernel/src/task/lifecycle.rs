// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Process creation, termination and slot reclamation
//! OWNERS: @kernel-sched-team
//! DEPENDS_ON: minikernel-hal (images, stacks, contexts), sync ops (descriptor close)
//! INVARIANTS: Failed creation leaves no resources behind; a terminated process
//!             releases every descriptor before its slot can be reused

use minikernel_hal::Hal;

use crate::state::QueueId;
use crate::syscall::api::Context;
use crate::syscall::{Error, SysResult};
use crate::task::ProcState;
use crate::types::{Descriptor, Pid};
use crate::{log_debug, log_error, log_info, log_warn};

impl<H: Hal> Context<'_, H> {
    /// Creates a Ready process running `program`.
    pub(crate) fn create_process(&mut self, program: &str) -> SysResult<Pid> {
        let pid = self.state.procs.allocate().ok_or(Error::NoFreeSlot)?;
        let loaded = self.hal.load_image(program).map_err(|err| {
            log_warn!(target: "task", "cannot load {}: {}", program, err);
            Error::ImageLoadFailed
        })?;
        let stack_size = self.config.stack_size;
        let stack = match self.hal.alloc_stack(stack_size) {
            Ok(stack) => stack,
            Err(err) => {
                log_warn!(target: "task", "no stack for {}: {}", program, err);
                self.hal.release_image(loaded.image);
                return Err(Error::StackExhausted);
            }
        };
        let context = self.hal.build_context(loaded.image, stack, stack_size, loaded.entry);
        let quantum = self.config.ticks_per_slice;
        self.pce_mut(pid).activate(context, stack, loaded.image, quantum);
        self.state.transition(pid, Some(QueueId::Ready), ProcState::Ready);
        log_info!(target: "task", "created pid {} ({})", pid, program);
        Ok(pid)
    }

    /// Terminates `pid`: releases its image, leaves every queue and closes
    /// every descriptor. The stack is freed later by `retire`, once the
    /// scheduler has picked a successor.
    pub(crate) fn terminate(&mut self, pid: Pid) {
        if let Some(image) = self.pce_mut(pid).image.take() {
            self.hal.release_image(image);
        }
        self.state.transition(pid, None, ProcState::Terminated);
        for descriptor in Descriptor::all() {
            if self.pce(pid).descriptor(descriptor).is_none() {
                continue;
            }
            if let Err(err) = self.close_mutex(pid, descriptor) {
                log_warn!(target: "task", "pid {} descriptor {:?}: {}", pid, descriptor, err);
            }
        }
        self.pce_mut(pid).pending = None;
        log_info!(target: "task", "pid {} terminated", pid);
    }

    /// Frees what a terminated process still owns and returns its slot to Unused.
    pub(crate) fn retire(&mut self, pid: Pid) {
        let pce = self.pce_mut(pid);
        let stack = pce.stack.take();
        let context = pce.context.take();
        if let Some(stack) = stack {
            self.hal.free_stack(stack);
        }
        if let Some(context) = context {
            self.hal.discard_context(context);
        }
        if let Some(mutex) = self.state.mutexes.iter().find(|m| m.owner() == Some(pid)) {
            log_error!(target: "task", "pid {} still owns mutex {}; slot kept", pid, mutex.id());
            return;
        }
        self.pce_mut(pid).reset();
        log_debug!(target: "task", "slot {} reclaimed", pid);
    }
}
