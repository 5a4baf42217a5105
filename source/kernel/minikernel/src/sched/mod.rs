// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Round-robin scheduler with idle halt and trap-exit rescheduling
//! OWNERS: @kernel-sched-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: tests/scheduling.rs (quantum, preemption, idle, sleep)
//! PUBLIC API: Scheduler (ready/sleeping/current)
//! DEPENDS_ON: queue::WaitQueue, state::transition, minikernel-hal (irq level, halt, switch)
//! INVARIANTS: The running process is the head of the ready queue;
//!             a switch happens only after the outgoing process has left or rejoined its queue;
//!             selecting the process that was already on the CPU never calls the HAL switch
//!
//! The running process stays in the ready queue while it runs. Preemption
//! moves it to the tail; blocking moves it to a wait queue. `reschedule` is
//! the single place that hands the CPU to someone else.

use minikernel_hal::{Hal, HardwareIrq, IrqLevel, REG_RESULT};

use crate::queue::WaitQueue;
use crate::state::{fatal, QueueId};
use crate::syscall::api::Context;
use crate::syscall::{Error, SysResult};
use crate::task::{PendingCall, ProcState};
use crate::types::Pid;
use crate::{log_debug, log_trace};

/// Ready and sleeping queues plus the process on the CPU.
pub struct Scheduler {
    pub(crate) ready: WaitQueue,
    pub(crate) sleeping: WaitQueue,
    current: Option<Pid>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self { ready: WaitQueue::new(), sleeping: WaitQueue::new(), current: None }
    }

    /// Process on the CPU.
    pub fn current(&self) -> Option<Pid> {
        self.current
    }

    pub fn ready(&self) -> &WaitQueue {
        &self.ready
    }

    pub fn sleeping(&self) -> &WaitQueue {
        &self.sleeping
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Hal> Context<'_, H> {
    /// Returns the head of the ready queue, idling until one exists.
    ///
    /// Idle lowers the interrupt level so clock and terminal interrupts can be
    /// taken, halts, restores the level and services the interrupt in-line.
    pub(crate) fn schedule(&mut self) -> Pid {
        loop {
            if let Some(pid) = self.state.sched.ready.front() {
                return pid;
            }
            log_debug!(target: "sched", "no ready process, waiting for interrupt");
            let saved = self.hal.set_irq_level(IrqLevel::L1);
            let irq = self.hal.halt();
            self.hal.set_irq_level(saved);
            self.state.stats.idle_halts += 1;
            match irq {
                HardwareIrq::Clock => self.clock_tick(),
                HardwareIrq::Terminal => self.terminal_input(),
            }
        }
    }

    /// Picks the next process and hands it the CPU.
    ///
    /// The outgoing process must already be out of the ready queue (blocked or
    /// terminated) or at its tail (preempted). A terminated predecessor is
    /// retired here, before the switch.
    pub(crate) fn reschedule(&mut self) {
        let prev = self.state.sched.current;
        let (next, result) = self.select_next();
        let prev_live =
            prev.filter(|pid| self.state.procs.get(*pid).is_some_and(|p| p.state().is_live()));
        if let Some(dead) = prev.filter(|pid| prev_live != Some(*pid)) {
            self.retire(dead);
        }

        if prev_live == Some(next) {
            log_trace!(target: "sched", "pid {} keeps the CPU", next);
        } else {
            let to = match self.pce(next).context() {
                Some(ctx) => ctx,
                None => fatal(format_args!("pid {} selected without a context", next)),
            };
            let from = prev_live.and_then(|pid| self.pce(pid).context());
            self.hal.switch_context(from, to);
            self.state.stats.context_switches += 1;
            log_debug!(target: "sched", "switch {:?} -> {}", prev, next);
        }

        if let Some(value) = result {
            self.hal.write_register(REG_RESULT, value);
        }
    }

    /// Loops until a selected process has nothing left to wait for. Returns the
    /// process and, when it was parked in a syscall, the value for its result register.
    fn select_next(&mut self) -> (Pid, Option<usize>) {
        loop {
            let next = self.schedule();
            self.put_on_cpu(next);
            let Some(call) = self.pce_mut(next).pending.take() else {
                return (next, None);
            };
            match self.resume(next, call) {
                Ok(value) => return (next, Some(value)),
                Err(Error::Blocked) => continue,
                Err(err) => return (next, Some(err.to_register())),
            }
        }
    }

    fn put_on_cpu(&mut self, pid: Pid) {
        let quantum = self.config.ticks_per_slice;
        let pce = self.pce_mut(pid);
        if pce.queue() != Some(QueueId::Ready) {
            fatal(format_args!("pid {} dispatched from {:?}", pid, pce.queue()));
        }
        pce.state = ProcState::Running;
        pce.remaining_ticks = quantum;
        self.state.sched.current = Some(pid);
    }

    /// Completes or re-evaluates the syscall `pid` was parked in.
    fn resume(&mut self, pid: Pid, call: PendingCall) -> SysResult<usize> {
        log_trace!(target: "sched", "resume pid {} pending {:?}", pid, call);
        match call {
            PendingCall::Sleep => Ok(0),
            PendingCall::Lock { mutex } => self.resume_lock(pid, mutex),
            PendingCall::CreateMutex { name, kind } => self.create_mutex(pid, name, kind),
        }
    }

    /// Software interrupt: rotate the ready queue if anyone else can run.
    pub(crate) fn preempt(&mut self) {
        let Some(pid) = self.state.sched.current else {
            return;
        };
        if self.pce(pid).state() != ProcState::Running {
            log_debug!(target: "sched", "preemption with pid {} off the CPU ignored", pid);
            return;
        }
        if self.state.sched.ready.len() <= 1 {
            self.pce_mut(pid).remaining_ticks = self.config.ticks_per_slice;
            return;
        }
        self.state.transition(pid, Some(QueueId::Ready), ProcState::Ready);
        self.reschedule();
    }

    /// Parks `pid` on the sleeping queue for `ticks` clock interrupts.
    pub(crate) fn sleep(&mut self, pid: Pid, ticks: u64) -> SysResult<usize> {
        if ticks == 0 {
            return Ok(0);
        }
        let pce = self.pce_mut(pid);
        pce.sleep_ticks = ticks;
        pce.pending = Some(PendingCall::Sleep);
        self.state.transition(pid, Some(QueueId::Sleeping), ProcState::Blocked);
        log_debug!(target: "sched", "pid {} sleeps for {} ticks", pid, ticks);
        Err(Error::Blocked)
    }
}
