// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Kernel object: boot sequence, trap entry point and read-only inspection
//! OWNERS: @kernel-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: tests/ (all suites boot a Kernel<MockHal>)
//! PUBLIC API: Kernel (new/boot/dispatch/inspectors), KernelStats, SharedKernel
//! DEPENDS_ON: trap::handle, syscall::api::install_handlers, minikernel-hal::Hal
//! INVARIANTS: All state is owned here and lent to one Context per trap;
//!             no reference into the tables survives a dispatch

use minikernel_hal::{Hal, Vector};

use crate::config::{ConfigError, KernelConfig};
use crate::log_info;
use crate::queue::WaitQueue;
use crate::state::{fatal, InvariantError, KernelState};
use crate::sync::mutex::MutexEntry;
use crate::syscall::api::{self, Context};
use crate::syscall::SyscallTable;
use crate::task::Pce;
use crate::trap::{self, Event};
use crate::types::{MutexId, Pid};

pub use crate::state::KernelStats;

/// Kernel guarded by one global lock, for hosts that run traps on several threads.
pub type SharedKernel<H> = spin::Mutex<Kernel<H>>;

/// The kernel core bound to a platform.
pub struct Kernel<H> {
    hal: H,
    config: KernelConfig,
    state: KernelState,
    syscalls: SyscallTable<H>,
}

impl<H: Hal> Kernel<H> {
    /// Builds an unbooted kernel. The configuration is validated here.
    pub fn new(hal: H, config: KernelConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut syscalls = SyscallTable::new();
        api::install_handlers(&mut syscalls);
        Ok(Self { hal, config, state: KernelState::new(), syscalls })
    }

    /// Wraps the kernel in the global exclusion lock.
    pub fn into_shared(self) -> SharedKernel<H> {
        spin::Mutex::new(self)
    }

    /// Installs vectors, starts the controllers, creates the initial process
    /// and puts it on the CPU. A missing initial program is fatal.
    pub fn boot(&mut self) -> Pid {
        for vector in Vector::ALL {
            self.hal.install_handler(vector);
        }
        self.hal.init_interrupt_controller();
        self.hal.init_clock(self.config.ticks_per_second);
        self.hal.init_keyboard();

        self.state.mutexes.initialize();
        self.state.procs.initialize();

        let program = self.config.init_program;
        let mut ctx = Context::new(&mut self.hal, &mut self.state, &self.config);
        let init = match ctx.create_process(program) {
            Ok(pid) => pid,
            Err(err) => fatal(format_args!("initial process {} not started: {}", program, err)),
        };
        ctx.reschedule();
        log_info!(target: "kernel", "boot complete, init is pid {}", init);
        init
    }

    /// Handles one trap. Called with interrupts masked.
    pub fn dispatch(&mut self, event: Event) {
        let Self { hal, config, state, syscalls } = self;
        let mut ctx = Context::new(hal, state, config);
        trap::handle(&mut ctx, syscalls, event);
    }

    pub fn hal(&self) -> &H {
        &self.hal
    }

    pub fn hal_mut(&mut self) -> &mut H {
        &mut self.hal
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn stats(&self) -> KernelStats {
        self.state.stats
    }

    /// Process on the CPU.
    pub fn current(&self) -> Option<Pid> {
        self.state.sched.current()
    }

    pub fn process(&self, pid: Pid) -> Option<&Pce> {
        self.state.procs.get(pid)
    }

    /// Number of processes that are neither Unused nor Terminated.
    pub fn live_processes(&self) -> usize {
        self.state.procs.iter().filter(|p| p.state().is_live()).count()
    }

    pub fn ready(&self) -> &WaitQueue {
        self.state.sched.ready()
    }

    pub fn sleeping(&self) -> &WaitQueue {
        self.state.sched.sleeping()
    }

    pub fn mutex(&self, id: MutexId) -> Option<&MutexEntry> {
        self.state.mutexes.get(id)
    }

    /// Live mutex named `name`.
    pub fn find_mutex(&self, name: &str) -> Option<MutexId> {
        self.state.mutexes.find(name.as_bytes())
    }

    /// Processes parked until a mutex slot is reclaimed.
    pub fn mutex_slot_waiters(&self) -> &WaitQueue {
        self.state.mutexes.slot_waiters()
    }

    pub fn mutexes_in_use(&self) -> usize {
        self.state.mutexes.in_use()
    }

    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        self.state.check_invariants()
    }
}
