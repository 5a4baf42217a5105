// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! TEST_SCOPE: Round-robin quantum, preemption, sleep and idle
//! TEST_SCENARIOS: quantum expiry raises the software interrupt, rotation order,
//!                 lone process keeps the CPU, exact sleep length, idle halt at level 1,
//!                 same-process reselection skips the switch

mod common;

use common::*;
use minikernel::syscall::SYSCALL_SLEEP;
use minikernel::task::{PendingCall, ProcState};
use minikernel::{Event, KernelConfig, Pid};
use minikernel_hal::{HardwareIrq, IrqLevel, REG_RESULT};

#[test]
fn quantum_expiry_requests_preemption_once() {
    let mut kernel = boot();
    spawn(&mut kernel, "p1");
    ticks(&mut kernel, 9);
    assert!(!kernel.hal().software_interrupt_pending());
    assert_eq!(kernel.process(Pid::from_raw(0)).unwrap().remaining_ticks(), 1);
    ticks(&mut kernel, 1);
    assert!(kernel.hal_mut().take_software_interrupt());
    ticks(&mut kernel, 5);
    assert!(!kernel.hal().software_interrupt_pending());
    // The clock handler itself never switches.
    assert_eq!(kernel.current(), Some(Pid::from_raw(0)));
    assert_eq!(kernel.stats().ticks, 15);
}

#[test]
fn preemption_rotates_round_robin() {
    let mut kernel = boot();
    let p1 = spawn(&mut kernel, "p1");
    let p2 = spawn(&mut kernel, "p2");
    let init = Pid::from_raw(0);

    let mut order = Vec::new();
    for _ in 0..6 {
        run_ticks(&mut kernel, 10);
        order.push(kernel.current().unwrap());
    }
    assert_eq!(order, [p1, p2, init, p1, p2, init]);
    let running = kernel.process(kernel.current().unwrap()).unwrap();
    assert_eq!(running.state(), ProcState::Running);
    assert_eq!(running.remaining_ticks(), 10);
    assert_eq!(kernel.ready().front(), kernel.current());
}

#[test]
fn lone_process_keeps_cpu_with_fresh_quantum() {
    let mut kernel = boot();
    ticks(&mut kernel, 10);
    assert!(kernel.hal_mut().take_software_interrupt());
    kernel.dispatch(Event::SoftwareInterrupt);
    assert_invariants(&kernel);

    let init = kernel.process(Pid::from_raw(0)).unwrap();
    assert_eq!(init.remaining_ticks(), 10);
    assert_eq!(init.state(), ProcState::Running);
    assert_eq!(kernel.hal().switches().len(), 1);
}

#[test]
fn sleep_blocks_for_exact_tick_count() {
    let mut kernel = boot();
    let p1 = spawn(&mut kernel, "p1");
    let init = Pid::from_raw(0);

    sleep(&mut kernel, 2);
    assert_eq!(kernel.current(), Some(p1));
    let sleeper = kernel.process(init).unwrap();
    assert_eq!(sleeper.state(), ProcState::Blocked);
    assert_eq!(sleeper.pending(), Some(PendingCall::Sleep));
    assert!(kernel.sleeping().contains(init));
    assert!(!kernel.ready().contains(init));

    ticks(&mut kernel, 199);
    assert_eq!(kernel.process(init).unwrap().state(), ProcState::Blocked);
    assert_eq!(kernel.process(init).unwrap().sleep_ticks(), 1);

    ticks(&mut kernel, 1);
    let woken = kernel.process(init).unwrap();
    assert_eq!(woken.state(), ProcState::Ready);
    assert_eq!(woken.remaining_ticks(), 10);
    assert!(kernel.sleeping().is_empty());
    assert_eq!(kernel.current(), Some(p1));

    switch_to(&mut kernel, init);
    assert_eq!(kernel.hal().cpu_register(REG_RESULT), 0);
    assert_eq!(kernel.process(init).unwrap().pending(), None);
}

#[test]
fn sleep_zero_returns_immediately() {
    let mut kernel = boot();
    assert_eq!(call(&mut kernel, SYSCALL_SLEEP, &[0]), 0);
    assert!(kernel.sleeping().is_empty());
}

#[test]
fn idle_halts_at_level_one_and_reselects_sleeper_without_switch() {
    let mut kernel = boot_with(KernelConfig::new().with_ticks_per_second(3));
    let capture = capture();
    kernel.hal_mut().push_terminal_byte(b'z');
    kernel.hal_mut().script_irq(HardwareIrq::Terminal);
    for _ in 0..3 {
        kernel.hal_mut().script_irq(HardwareIrq::Clock);
    }

    kernel.hal_mut().set_registers(&[SYSCALL_SLEEP, 1, 0, 0]);
    kernel.dispatch(Event::Syscall);
    assert_invariants(&kernel);

    let hal = kernel.hal();
    assert_eq!(hal.halt_levels(), &[IrqLevel::L1; 4]);
    assert_eq!(hal.irq_level(), IrqLevel::L3);
    assert_eq!(hal.switches().len(), 1);
    assert_eq!(hal.cpu_register(REG_RESULT), 0);
    assert_eq!(kernel.current(), Some(Pid::from_raw(0)));
    assert_eq!(kernel.stats().idle_halts, 4);
    assert_eq!(kernel.stats().ticks, 3);
    assert!(capture.contains("byte 0x7a"));
}

#[test]
fn sleeper_woken_during_idle_switches_when_another_was_running() {
    let mut kernel = boot_with(KernelConfig::new().with_ticks_per_second(2));
    let p1 = spawn(&mut kernel, "p1");
    let init = Pid::from_raw(0);

    // init sleeps, p1 runs and then sleeps longer; idle wakes init first.
    sleep(&mut kernel, 1);
    assert_eq!(kernel.current(), Some(p1));
    kernel.hal_mut().script_irq(HardwareIrq::Clock);
    kernel.hal_mut().script_irq(HardwareIrq::Clock);
    sleep(&mut kernel, 5);

    assert_eq!(kernel.current(), Some(init));
    assert_eq!(result_of(&kernel, init), 0);
    assert_eq!(kernel.process(p1).unwrap().sleep_ticks(), 8);
    let last = *kernel.hal().switches().last().unwrap();
    assert_eq!(Some(last.from.unwrap()), kernel.process(p1).unwrap().context());
}
