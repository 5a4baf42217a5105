// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Table sizes and runtime knobs for the kernel core
//! OWNERS: @kernel-team
//! PUBLIC API: MAX_PROC, NUM_MUT, NUM_MUT_PROC, MAX_NOM_MUT, KernelConfig, ConfigError
//! INVARIANTS: Table sizes are compile-time constants; runtime knobs are validated before boot

use core::fmt;

/// Maximum number of processes (process table capacity).
pub const MAX_PROC: usize = 10;
/// Maximum number of mutexes (mutex table capacity).
pub const NUM_MUT: usize = 16;
/// Mutex descriptors per process.
pub const NUM_MUT_PROC: usize = 4;
/// Maximum mutex name length in bytes, excluding the terminator.
pub const MAX_NOM_MUT: usize = 8;
/// Maximum program name length accepted by `create_process`.
pub const MAX_PROGRAM_NAME: usize = 32;
/// Upper bound on a single `write` request.
pub const MAX_WRITE_LEN: usize = 1024;
/// I/O port of the terminal device.
pub const TERMINAL_PORT: u16 = 1;

pub const DEFAULT_TICKS_PER_SECOND: u32 = 100;
pub const DEFAULT_TICKS_PER_SLICE: u32 = 10;
pub const DEFAULT_STACK_SIZE: usize = 32 * 1024;
pub const DEFAULT_INIT_PROGRAM: &str = "init";

static_assertions::const_assert!(MAX_PROC > 0);
static_assertions::const_assert!(NUM_MUT > 0);
static_assertions::const_assert!(NUM_MUT_PROC > 0);
static_assertions::const_assert!(MAX_NOM_MUT > 0);
// Pids and descriptors travel back to user space through one register.
static_assertions::const_assert!(MAX_PROC <= u32::MAX as usize);
static_assertions::const_assert!(DEFAULT_INIT_PROGRAM.len() <= MAX_PROGRAM_NAME);

/// Rejected runtime configuration.
#[must_use = "config errors must be handled explicitly"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    ZeroTickRate,
    ZeroQuantum,
    ZeroStackSize,
    EmptyInitProgram,
    InitProgramTooLong,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Runtime knobs. Table capacities are not configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Clock interrupts per second; also the sleep conversion factor.
    pub ticks_per_second: u32,
    /// Round-robin quantum in ticks.
    pub ticks_per_slice: u32,
    /// Stack size handed to every new process.
    pub stack_size: usize,
    /// Program started at boot.
    pub init_program: &'static str,
}

impl KernelConfig {
    pub const fn new() -> Self {
        Self {
            ticks_per_second: DEFAULT_TICKS_PER_SECOND,
            ticks_per_slice: DEFAULT_TICKS_PER_SLICE,
            stack_size: DEFAULT_STACK_SIZE,
            init_program: DEFAULT_INIT_PROGRAM,
        }
    }

    pub const fn with_ticks_per_second(mut self, hz: u32) -> Self {
        self.ticks_per_second = hz;
        self
    }

    pub const fn with_ticks_per_slice(mut self, ticks: u32) -> Self {
        self.ticks_per_slice = ticks;
        self
    }

    pub const fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes;
        self
    }

    pub const fn with_init_program(mut self, program: &'static str) -> Self {
        self.init_program = program;
        self
    }

    /// Checks that every knob is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ticks_per_second == 0 {
            return Err(ConfigError::ZeroTickRate);
        }
        if self.ticks_per_slice == 0 {
            return Err(ConfigError::ZeroQuantum);
        }
        if self.stack_size == 0 {
            return Err(ConfigError::ZeroStackSize);
        }
        if self.init_program.is_empty() {
            return Err(ConfigError::EmptyInitProgram);
        }
        if self.init_program.len() > MAX_PROGRAM_NAME {
            return Err(ConfigError::InitProgramTooLong);
        }
        Ok(())
    }

    /// Converts seconds to clock ticks, saturating on overflow.
    pub fn seconds_to_ticks(&self, seconds: usize) -> u64 {
        (seconds as u64).saturating_mul(u64::from(self.ticks_per_second))
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::new()
    }
}
