// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Trap dispatch: exceptions, clock, terminal, syscalls, software interrupt
//! OWNERS: @kernel-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: tests/dispatch.rs, tests/scheduling.rs
//! PUBLIC API: Event
//! DEPENDS_ON: syscall::SyscallTable, sched (reschedule), task (terminate)
//! INVARIANTS: Runs with interrupts masked; the clock handler never switches context;
//!             a fault raised in kernel mode is fatal

use minikernel_hal::{Hal, Vector, REG_ARG0, REG_RESULT};

use crate::config::TERMINAL_PORT;
use crate::state::{fatal, QueueId};
use crate::syscall::api::Context;
use crate::syscall::{Args, Error, SyscallTable};
use crate::task::ProcState;
use crate::{log_debug, log_info, log_warn};

#[cfg(feature = "trace_dispatch")]
use crate::log_trace;

/// Event classes delivered to [`crate::Kernel::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    ArithmeticFault,
    MemoryFault,
    ClockTick,
    TerminalInput,
    Syscall,
    SoftwareInterrupt,
}

impl Event {
    pub const fn from_vector(vector: Vector) -> Self {
        match vector {
            Vector::ArithmeticFault => Event::ArithmeticFault,
            Vector::MemoryFault => Event::MemoryFault,
            Vector::Clock => Event::ClockTick,
            Vector::Terminal => Event::TerminalInput,
            Vector::Syscall => Event::Syscall,
            Vector::Software => Event::SoftwareInterrupt,
        }
    }

    pub const fn vector(self) -> Vector {
        match self {
            Event::ArithmeticFault => Vector::ArithmeticFault,
            Event::MemoryFault => Vector::MemoryFault,
            Event::ClockTick => Vector::Clock,
            Event::TerminalInput => Vector::Terminal,
            Event::Syscall => Vector::Syscall,
            Event::SoftwareInterrupt => Vector::Software,
        }
    }
}

pub(crate) fn handle<H: Hal>(ctx: &mut Context<'_, H>, table: &SyscallTable<H>, event: Event) {
    #[cfg(feature = "trace_dispatch")]
    log_trace!(target: "trap", "event {:?} current={:?}", event, ctx.state.sched.current());
    match event {
        Event::ArithmeticFault | Event::MemoryFault => ctx.fault(event),
        Event::ClockTick => ctx.clock_tick(),
        Event::TerminalInput => ctx.terminal_input(),
        Event::Syscall => handle_syscall(ctx, table),
        Event::SoftwareInterrupt => ctx.preempt(),
    }
}

fn handle_syscall<H: Hal>(ctx: &mut Context<'_, H>, table: &SyscallTable<H>) {
    ctx.state.stats.syscalls += 1;
    let service = ctx.hal.read_register(REG_RESULT);
    let mut regs = [0usize; minikernel_hal::NUM_REGS - REG_ARG0];
    for (index, reg) in regs.iter_mut().enumerate() {
        *reg = ctx.hal.read_register(REG_ARG0 + index);
    }
    let args = Args::new(regs);
    match table.dispatch(service, ctx, &args) {
        Ok(value) => ctx.hal.write_register(REG_RESULT, value),
        Err(Error::Blocked | Error::TaskExit) => ctx.reschedule(),
        Err(err) => {
            log_debug!(target: "syscall", "service {} failed: {}", service, err);
            ctx.hal.write_register(REG_RESULT, err.to_register());
        }
    }
}

impl<H: Hal> Context<'_, H> {
    /// Arithmetic or memory exception.
    fn fault(&mut self, event: Event) {
        if !self.hal.from_user_mode() {
            fatal(format_args!("{:?} raised in kernel mode", event));
        }
        let Some(pid) = self.state.sched.current() else {
            fatal(format_args!("{:?} with no process on the CPU", event));
        };
        log_warn!(target: "trap", "{:?} in pid {}; terminating it", event, pid);
        self.terminate(pid);
        self.reschedule();
    }

    /// Clock interrupt: age sleepers, charge the running process's quantum.
    pub(crate) fn clock_tick(&mut self) {
        self.state.stats.ticks += 1;

        let mut sleepers = [None; crate::config::MAX_PROC];
        for (slot, pid) in sleepers.iter_mut().zip(self.state.sched.sleeping().iter()) {
            *slot = Some(pid);
        }
        for pid in sleepers.into_iter().flatten() {
            let quantum = self.config.ticks_per_slice;
            let pce = self.pce_mut(pid);
            pce.sleep_ticks = pce.sleep_ticks.saturating_sub(1);
            if pce.sleep_ticks == 0 {
                pce.remaining_ticks = quantum;
                self.state.transition(pid, Some(QueueId::Ready), ProcState::Ready);
                log_debug!(target: "sched", "pid {} woke up", pid);
            }
        }

        let Some(pid) = self.state.sched.current() else {
            return;
        };
        let pce = self.pce_mut(pid);
        if pce.state() != ProcState::Running || pce.remaining_ticks == 0 {
            return;
        }
        pce.remaining_ticks -= 1;
        if pce.remaining_ticks == 0 {
            self.hal.raise_software_interrupt();
        }
    }

    /// Terminal interrupt: diagnostic only.
    pub(crate) fn terminal_input(&mut self) {
        let byte = self.hal.read_port(TERMINAL_PORT);
        log_info!(target: "terminal", "byte 0x{:02x} {:?}", byte, char::from(byte));
    }
}
