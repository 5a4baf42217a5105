// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Named mutexes: table (mutex) and the blocking syscall protocols (ops)
//! OWNERS: @kernel-team

pub mod mutex;
mod ops;

#[cfg(test)]
mod tests_prop;
