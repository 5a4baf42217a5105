// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! TEST_SCOPE: MockHal behaviour relied upon by kernel tests
//! TEST_SCENARIOS: context save/restore, user memory copies, scripted halt, resource accounting

#![cfg(feature = "mock")]

use minikernel_hal::mock::MockHal;
use minikernel_hal::{Hal, HalError, HardwareIrq, IrqLevel, Vector, Vectors, REG_RESULT};

#[test]
fn switch_saves_and_restores_registers() {
    let mut hal = MockHal::with_programs(&["a"]);
    let img = hal.load_image("a").unwrap();
    let s1 = hal.alloc_stack(4096).unwrap();
    let s2 = hal.alloc_stack(4096).unwrap();
    let c1 = hal.build_context(img.image, s1, 4096, img.entry);
    let c2 = hal.build_context(img.image, s2, 4096, img.entry);

    hal.switch_context(None, c1);
    hal.write_register(REG_RESULT, 11);
    hal.switch_context(Some(c1), c2);
    assert_eq!(hal.read_register(REG_RESULT), 0);
    hal.write_register(REG_RESULT, 22);
    hal.switch_context(Some(c2), c1);

    assert_eq!(hal.read_register(REG_RESULT), 11);
    assert_eq!(hal.context_register(c2, REG_RESULT), Some(22));
    assert_eq!(hal.live_context(), Some(c1));
    assert_eq!(hal.switches().len(), 3);
}

#[test]
fn cstr_copy_reports_length_or_truncation() {
    let mut hal = MockHal::new();
    let short = hal.place_str("abc");
    let long = hal.place_str("abcdefghijk");

    let mut buf = [0u8; 8];
    assert_eq!(hal.copy_cstr_from_user(short, &mut buf), Ok(3));
    assert_eq!(&buf[..3], b"abc");
    assert_eq!(hal.copy_cstr_from_user(long, &mut buf), Ok(8));
    assert_eq!(hal.copy_cstr_from_user(0x10, &mut buf), Err(HalError::BadAddress));
}

#[test]
fn byte_copy_rejects_overruns() {
    let mut hal = MockHal::new();
    let addr = hal.place_bytes(b"hello");
    let mut ok = [0u8; 5];
    hal.copy_from_user(addr, &mut ok).unwrap();
    assert_eq!(&ok, b"hello");
    let mut too_long = [0u8; 6];
    assert_eq!(hal.copy_from_user(addr, &mut too_long), Err(HalError::BadAddress));
}

#[test]
fn halt_returns_scripted_interrupts_and_records_level() {
    let mut hal = MockHal::new();
    hal.script_irq(HardwareIrq::Terminal);
    hal.script_irq(HardwareIrq::Clock);
    let prev = hal.set_irq_level(IrqLevel::L1);
    assert_eq!(prev, IrqLevel::L3);
    assert_eq!(hal.halt(), HardwareIrq::Terminal);
    assert_eq!(hal.halt(), HardwareIrq::Clock);
    assert_eq!(hal.halt_levels(), &[IrqLevel::L1, IrqLevel::L1]);
}

#[test]
fn resources_are_tracked() {
    let mut hal = MockHal::with_programs(&["init"]);
    assert_eq!(hal.load_image("missing"), Err(HalError::ImageNotFound));
    let img = hal.load_image("init").unwrap();
    let stack = hal.alloc_stack(32 * 1024).unwrap();
    assert_eq!((hal.live_images(), hal.live_stacks()), (1, 1));
    hal.release_image(img.image);
    hal.free_stack(stack);
    assert_eq!((hal.live_images(), hal.live_stacks()), (0, 0));

    hal.set_stack_alloc_failure(true);
    assert_eq!(hal.alloc_stack(16), Err(HalError::OutOfMemory));
}

#[test]
fn vectors_and_devices() {
    let mut hal = MockHal::new();
    for vector in Vector::ALL {
        hal.install_handler(vector);
    }
    assert_eq!(hal.installed_vectors(), Vectors::all());

    hal.push_terminal_byte(b'x');
    assert_eq!(hal.read_port(1), b'x');
    assert_eq!(hal.read_port(1), 0);

    hal.raise_software_interrupt();
    assert!(hal.take_software_interrupt());
    assert!(!hal.take_software_interrupt());

    hal.console_write(b"hi");
    assert_eq!(hal.console_output(), b"hi");
}
