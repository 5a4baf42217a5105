// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Dispatching and synchronization core of a single-CPU preemptible teaching kernel
//! OWNERS: @kernel-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit + proptest modules, tests/ integration suites against MockHal
//! PUBLIC API: Kernel, Event, KernelConfig, syscall service numbers, Error
//! DEPENDS_ON: minikernel-hal::Hal
//! INVARIANTS: One queue per process at a time; state agrees with queue membership;
//!             handlers never switch context (reschedule happens on trap exit)
//!
//! The whole core lives behind [`Kernel::dispatch`]. Hardware glue calls it
//! once per trap with interrupts masked; the core never re-enters itself.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), forbid(clippy::unwrap_used))]

extern crate alloc;

pub mod config;
pub mod diag;
pub mod kernel;
pub mod queue;
pub mod sched;
pub mod state;
pub mod sync;
pub mod syscall;
pub mod task;
pub mod trap;
pub mod types;

pub use diag::log;

pub use config::{ConfigError, KernelConfig};
pub use kernel::{Kernel, KernelStats};
pub use state::InvariantError;
pub use syscall::Error;
pub use trap::Event;
pub use types::{Descriptor, MutexId, Pid};
