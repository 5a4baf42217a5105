// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Hardware abstraction boundary consumed by the minikernel core
//! OWNERS: @kernel-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests (vectors/levels) + mock HAL integration tests
//! PUBLIC API: Hal, Vector, Vectors, IrqLevel, HardwareIrq, ContextHandle, StackHandle,
//!             ImageHandle, HalError, mock::MockHal (feature "mock")
//! INVARIANTS: Handles are opaque to the kernel; register 0 carries service number and result
//!
//! The kernel never touches hardware directly. Everything it needs from the
//! platform (context save/restore, stacks, executable images, registers, the
//! interrupt mask and the halt instruction) is reached through [`Hal`].

#![cfg_attr(not(test), no_std)]

extern crate alloc;

#[cfg(feature = "mock")]
pub mod mock;

use bitflags::bitflags;
use core::fmt;

/// Register carrying the service number on entry and the result on exit.
pub const REG_RESULT: usize = 0;
/// First register carrying a syscall argument.
pub const REG_ARG0: usize = 1;
/// Number of general registers exposed for syscall marshalling.
pub const NUM_REGS: usize = 4;

/// Interrupt and exception vectors the kernel installs handlers for.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vector {
    ArithmeticFault = 0,
    MemoryFault = 1,
    Clock = 3,
    Terminal = 4,
    Syscall = 5,
    Software = 6,
}

impl Vector {
    pub const ALL: [Vector; 6] = [
        Vector::ArithmeticFault,
        Vector::MemoryFault,
        Vector::Clock,
        Vector::Terminal,
        Vector::Syscall,
        Vector::Software,
    ];

    /// Returns the single-bit set for this vector.
    pub const fn bit(self) -> Vectors {
        Vectors::from_bits_truncate(1 << self as u8)
    }
}

bitflags! {
    /// Set of vectors with an installed handler.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct Vectors: u8 {
        const ARITHMETIC_FAULT = 1 << 0;
        const MEMORY_FAULT = 1 << 1;
        const CLOCK = 1 << 3;
        const TERMINAL = 1 << 4;
        const SYSCALL = 1 << 5;
        const SOFTWARE = 1 << 6;
    }
}

/// Interrupt masking level. Level `n` masks every interrupt source of level `<= n`.
///
/// The software interrupt sits at level 1, the terminal at level 2 and the
/// clock at level 3, so `L3` masks everything and `L1` only defers preemption.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IrqLevel {
    L0 = 0,
    L1 = 1,
    L2 = 2,
    L3 = 3,
}

/// Hardware interrupt that ended a `halt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareIrq {
    Clock,
    Terminal,
}

/// Opaque handle to a saved register snapshot.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ContextHandle(usize);

/// Opaque handle to a process stack allocation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct StackHandle(usize);

/// Opaque handle to a loaded memory image.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ImageHandle(usize);

macro_rules! raw_handle {
    ($($ty:ident),+) => {
        $(
            impl $ty {
                /// Wraps a platform-defined raw value.
                #[inline]
                pub const fn from_raw(raw: usize) -> Self {
                    Self(raw)
                }

                /// Returns the platform-defined raw value.
                #[inline]
                pub const fn as_raw(self) -> usize {
                    self.0
                }
            }
        )+
    };
}

raw_handle!(ContextHandle, StackHandle, ImageHandle);

/// A loaded executable: its memory image plus the initial program counter.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LoadedImage {
    pub image: ImageHandle,
    pub entry: usize,
}

/// Errors reported by the platform.
#[must_use = "HAL errors must be handled explicitly"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalError {
    /// No executable with the requested name.
    ImageNotFound,
    /// Not enough memory for the requested allocation.
    OutOfMemory,
    /// User address not mapped or not readable.
    BadAddress,
}

impl fmt::Display for HalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Platform capabilities used by the kernel core.
///
/// All methods are invoked with interrupts masked at kernel entry; an
/// implementation must not re-enter the kernel from inside any of them.
pub trait Hal {
    // vectors and controllers

    /// Routes `vector` to the kernel's dispatch entry point.
    fn install_handler(&mut self, vector: Vector);
    /// Starts the interrupt controller.
    fn init_interrupt_controller(&mut self);
    /// Starts the periodic clock at `hz` ticks per second.
    fn init_clock(&mut self, hz: u32);
    /// Starts the keyboard controller.
    fn init_keyboard(&mut self);

    // contexts

    /// Builds the initial register snapshot for a new process.
    fn build_context(
        &mut self,
        image: ImageHandle,
        stack: StackHandle,
        stack_size: usize,
        entry: usize,
    ) -> ContextHandle;

    /// Saves the live registers into `from` (when present) and arranges for
    /// `to` to be restored when the kernel returns from the current trap.
    fn switch_context(&mut self, from: Option<ContextHandle>, to: ContextHandle);

    /// Discards a snapshot that will never be restored again.
    fn discard_context(&mut self, ctx: ContextHandle);

    // process resources

    /// Loads the executable `program` and returns its image and entry point.
    fn load_image(&mut self, program: &str) -> Result<LoadedImage, HalError>;
    /// Releases a memory image.
    fn release_image(&mut self, image: ImageHandle);
    /// Allocates a stack of `size` bytes.
    fn alloc_stack(&mut self, size: usize) -> Result<StackHandle, HalError>;
    /// Releases a stack.
    fn free_stack(&mut self, stack: StackHandle);

    // registers and user memory

    /// Reads general register `index` of the live context.
    fn read_register(&self, index: usize) -> usize;
    /// Writes general register `index` of the live context.
    fn write_register(&mut self, index: usize, value: usize);
    /// Copies `buf.len()` bytes from user address `addr`.
    fn copy_from_user(&self, addr: usize, buf: &mut [u8]) -> Result<(), HalError>;
    /// Copies a NUL-terminated string from `addr` into `buf`.
    ///
    /// Returns the string length without the terminator. When no terminator
    /// appears within `buf.len()` bytes the return value equals `buf.len()`.
    fn copy_cstr_from_user(&self, addr: usize, buf: &mut [u8]) -> Result<usize, HalError>;
    /// Returns true when the trap being handled was raised from user mode.
    fn from_user_mode(&self) -> bool;

    // interrupt level, idle

    /// Sets the masking level and returns the previous one.
    fn set_irq_level(&mut self, level: IrqLevel) -> IrqLevel;
    /// Halts until a hardware interrupt arrives and reports which one.
    fn halt(&mut self) -> HardwareIrq;
    /// Requests a software interrupt; it is delivered once the level allows.
    fn raise_software_interrupt(&mut self);

    // devices

    /// Reads one byte from an I/O port.
    fn read_port(&mut self, port: u16) -> u8;
    /// Writes raw bytes to the system console.
    fn console_write(&mut self, bytes: &[u8]);
}
