// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Syscall dispatcher and error handling
//! OWNERS: @kernel-team
//! PUBLIC API: SyscallTable, Args, Error, Handler, SYSCALL_* IDs, NSERVICES
//! DEPENDS_ON: syscall::api, sync::mutex, minikernel-hal::HalError
//! INVARIANTS: Fixed NSERVICES window; stable IDs; out-of-range numbers never index the table;
//!             every user-visible error has a stable negative code

pub mod api;

use core::fmt;

use minikernel_hal::{HalError, NUM_REGS, REG_ARG0};

use crate::sync::mutex::{MutexError, NameError};

/// Number of services in the dispatch table.
pub const NSERVICES: usize = 10;

/// Result type used by syscall handlers.
pub type SysResult<T> = Result<T, Error>;

/// Public syscall numbers.
pub const SYSCALL_CREATE_PROCESS: usize = 0;
pub const SYSCALL_TERMINATE_PROCESS: usize = 1;
pub const SYSCALL_WRITE: usize = 2;
pub const SYSCALL_GET_ID: usize = 3;
pub const SYSCALL_SLEEP: usize = 4;
pub const SYSCALL_CREATE_MUTEX: usize = 5;
pub const SYSCALL_OPEN_MUTEX: usize = 6;
pub const SYSCALL_LOCK: usize = 7;
pub const SYSCALL_UNLOCK: usize = 8;
pub const SYSCALL_CLOSE_MUTEX: usize = 9;

static_assertions::const_assert!(SYSCALL_CLOSE_MUTEX < NSERVICES);

const NUM_ARGS: usize = NUM_REGS - REG_ARG0;

/// Syscall arguments taken from registers 1.. of the trapping context.
#[derive(Default, Clone, Copy, Debug)]
pub struct Args {
    regs: [usize; NUM_ARGS],
}

impl Args {
    pub const fn new(regs: [usize; NUM_ARGS]) -> Self {
        Self { regs }
    }

    /// Returns argument `index` (register `index + 1`); missing arguments read as zero.
    pub fn get(&self, index: usize) -> usize {
        self.regs.get(index).copied().unwrap_or(0)
    }
}

/// Error returned by the dispatcher and handler stack.
#[must_use = "syscall errors must be reported to the caller"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Service number not present in the dispatch table.
    InvalidSyscall,
    /// Process table full.
    NoFreeSlot,
    /// Loader could not produce an image for the program.
    ImageLoadFailed,
    /// Per-process descriptor table full.
    NoFreeDescriptor,
    /// Descriptor out of range or not mapped to a live mutex.
    InvalidDescriptor,
    /// No mutex with that name.
    NotFound,
    /// A mutex with that name already exists.
    NameInUse,
    InvalidMutexKind,
    NameTooLong,
    /// Empty or undecodable name.
    InvalidName,
    /// Owner relocking a non-recursive mutex.
    AlreadyLocked,
    /// Unlock by a process that does not hold the mutex.
    NotOwner,
    /// User pointer not readable.
    BadAddress,
    /// No memory for the process stack.
    StackExhausted,
    /// Caller was parked; its result is delivered when it runs again.
    Blocked,
    /// Caller terminated and will not resume.
    TaskExit,
}

impl Error {
    /// Stable negative code written to the result register.
    ///
    /// `Blocked` and `TaskExit` never reach user space and have no code.
    pub const fn code(self) -> Option<isize> {
        let code = match self {
            Error::InvalidSyscall => -1,
            Error::NoFreeSlot => -2,
            Error::ImageLoadFailed => -3,
            Error::NoFreeDescriptor => -4,
            Error::InvalidDescriptor => -5,
            Error::NotFound => -6,
            Error::NameInUse => -7,
            Error::InvalidMutexKind => -8,
            Error::NameTooLong => -9,
            Error::InvalidName => -10,
            Error::AlreadyLocked => -11,
            Error::NotOwner => -12,
            Error::BadAddress => -13,
            Error::StackExhausted => -14,
            Error::Blocked | Error::TaskExit => return None,
        };
        Some(code)
    }

    /// Register encoding of [`Error::code`].
    pub const fn to_register(self) -> usize {
        match self.code() {
            Some(code) => code as usize,
            None => -1isize as usize,
        }
    }
}

impl From<MutexError> for Error {
    fn from(value: MutexError) -> Self {
        match value {
            MutexError::AlreadyLocked => Error::AlreadyLocked,
            MutexError::NotOwner => Error::NotOwner,
            MutexError::Unused => Error::InvalidDescriptor,
        }
    }
}

impl From<NameError> for Error {
    fn from(value: NameError) -> Self {
        match value {
            NameError::Empty => Error::InvalidName,
            NameError::TooLong => Error::NameTooLong,
        }
    }
}

impl From<HalError> for Error {
    fn from(value: HalError) -> Self {
        match value {
            HalError::BadAddress => Error::BadAddress,
            HalError::ImageNotFound => Error::ImageLoadFailed,
            HalError::OutOfMemory => Error::StackExhausted,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Type alias for a syscall handler.
pub type Handler<H> = fn(&mut api::Context<'_, H>, &Args) -> SysResult<usize>;

/// Dispatch table storing handlers by service number.
pub struct SyscallTable<H> {
    handlers: [Option<Handler<H>>; NSERVICES],
}

impl<H> SyscallTable<H> {
    /// Creates an empty dispatch table.
    pub fn new() -> Self {
        Self { handlers: [None; NSERVICES] }
    }

    /// Registers a handler. Numbers outside the table are ignored.
    pub fn register(&mut self, number: usize, handler: Handler<H>) {
        if let Some(slot) = self.handlers.get_mut(number) {
            *slot = Some(handler);
        }
    }

    /// Executes the handler referenced by `number`.
    pub fn dispatch(
        &self,
        number: usize,
        ctx: &mut api::Context<'_, H>,
        args: &Args,
    ) -> SysResult<usize> {
        self.handlers
            .get(number)
            .and_then(|entry| *entry)
            .ok_or(Error::InvalidSyscall)
            .and_then(|handler| handler(ctx, args))
    }
}

impl<H> Default for SyscallTable<H> {
    fn default() -> Self {
        Self::new()
    }
}
