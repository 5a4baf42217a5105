// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared harness: boots a kernel on MockHal and plays "user mode" by loading
//! registers and dispatching trap events.

#![allow(dead_code)]

use minikernel::syscall::{
    SYSCALL_CLOSE_MUTEX, SYSCALL_CREATE_MUTEX, SYSCALL_CREATE_PROCESS, SYSCALL_LOCK,
    SYSCALL_OPEN_MUTEX, SYSCALL_SLEEP, SYSCALL_TERMINATE_PROCESS, SYSCALL_UNLOCK,
};
use minikernel::log::{self, CaptureSink};
use minikernel::{Event, Kernel, KernelConfig, Pid};
use minikernel_hal::mock::MockHal;
use minikernel_hal::{NUM_REGS, REG_RESULT};

pub const PROGRAMS: &[&str] = &["init", "p1", "p2", "p3", "p4", "p5", "p6", "p7", "p8", "p9"];

pub fn boot() -> Kernel<MockHal> {
    boot_with(KernelConfig::default())
}

pub fn boot_with(config: KernelConfig) -> Kernel<MockHal> {
    let mut kernel = Kernel::new(MockHal::with_programs(PROGRAMS), config).unwrap();
    kernel.boot();
    assert_invariants(&kernel);
    kernel
}

/// Installs the binary-wide capturing log sink and returns it.
pub fn capture() -> &'static CaptureSink {
    static CAPTURE: CaptureSink = CaptureSink::new();
    log::set_sink(&CAPTURE);
    &CAPTURE
}

pub fn assert_invariants(kernel: &Kernel<MockHal>) {
    assert_eq!(kernel.check_invariants(), Ok(()));
}

/// Issues a syscall from the current process and returns register 0 afterwards.
///
/// Only meaningful when the caller is still on the CPU; see [`call_blocking`].
pub fn call(kernel: &mut Kernel<MockHal>, service: usize, args: &[usize]) -> isize {
    let caller = kernel.current();
    trap(kernel, service, args);
    assert_eq!(kernel.current(), caller, "caller lost the CPU");
    kernel.hal().cpu_register(REG_RESULT) as isize
}

/// Issues a syscall that must park the caller.
pub fn call_blocking(kernel: &mut Kernel<MockHal>, service: usize, args: &[usize]) {
    let caller = kernel.current();
    trap(kernel, service, args);
    assert_ne!(kernel.current(), caller, "caller kept the CPU");
}

fn trap(kernel: &mut Kernel<MockHal>, service: usize, args: &[usize]) {
    let mut regs = [0usize; NUM_REGS];
    regs[0] = service;
    for (slot, value) in regs[1..].iter_mut().zip(args) {
        *slot = *value;
    }
    kernel.hal_mut().set_registers(&regs);
    kernel.dispatch(Event::Syscall);
    assert_invariants(kernel);
}

/// Register 0 of `pid`'s context, live or saved.
pub fn result_of(kernel: &Kernel<MockHal>, pid: Pid) -> isize {
    let ctx = kernel.process(pid).and_then(|p| p.context()).unwrap();
    kernel.hal().context_register(ctx, REG_RESULT).unwrap() as isize
}

pub fn spawn(kernel: &mut Kernel<MockHal>, program: &str) -> Pid {
    let addr = kernel.hal_mut().place_str(program);
    let raw = call(kernel, SYSCALL_CREATE_PROCESS, &[addr]);
    assert!(raw >= 0, "create_process({}) failed with {}", program, raw);
    Pid::decode(raw as usize).unwrap()
}

/// Rotates the ready queue until `pid` is on the CPU.
pub fn switch_to(kernel: &mut Kernel<MockHal>, pid: Pid) {
    for _ in 0..=minikernel::config::MAX_PROC {
        if kernel.current() == Some(pid) {
            return;
        }
        kernel.dispatch(Event::SoftwareInterrupt);
        assert_invariants(kernel);
    }
    assert_eq!(kernel.current(), Some(pid), "pid never reached the CPU");
}

/// Delivers `n` clock interrupts without delivering the preemption they may request.
pub fn ticks(kernel: &mut Kernel<MockHal>, n: u64) {
    for _ in 0..n {
        kernel.dispatch(Event::ClockTick);
        assert_invariants(kernel);
    }
}

/// Delivers `n` clock interrupts, each followed by any software interrupt it raised.
pub fn run_ticks(kernel: &mut Kernel<MockHal>, n: u64) {
    for _ in 0..n {
        kernel.dispatch(Event::ClockTick);
        if kernel.hal_mut().take_software_interrupt() {
            kernel.dispatch(Event::SoftwareInterrupt);
        }
        assert_invariants(kernel);
    }
}

pub fn create_mutex(kernel: &mut Kernel<MockHal>, name: &str, kind: usize) -> isize {
    let addr = kernel.hal_mut().place_str(name);
    call(kernel, SYSCALL_CREATE_MUTEX, &[addr, kind])
}

pub fn open_mutex(kernel: &mut Kernel<MockHal>, name: &str) -> isize {
    let addr = kernel.hal_mut().place_str(name);
    call(kernel, SYSCALL_OPEN_MUTEX, &[addr])
}

pub fn lock(kernel: &mut Kernel<MockHal>, descriptor: usize) -> isize {
    call(kernel, SYSCALL_LOCK, &[descriptor])
}

pub fn unlock(kernel: &mut Kernel<MockHal>, descriptor: usize) -> isize {
    call(kernel, SYSCALL_UNLOCK, &[descriptor])
}

pub fn close(kernel: &mut Kernel<MockHal>, descriptor: usize) -> isize {
    call(kernel, SYSCALL_CLOSE_MUTEX, &[descriptor])
}

pub fn sleep(kernel: &mut Kernel<MockHal>, seconds: usize) {
    call_blocking(kernel, SYSCALL_SLEEP, &[seconds]);
}

pub fn terminate(kernel: &mut Kernel<MockHal>) {
    call_blocking(kernel, SYSCALL_TERMINATE_PROCESS, &[]);
}

pub const NON_RECURSIVE: usize = 0;
pub const RECURSIVE: usize = 1;
