// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Kernel diagnostics (structured logging)
//! OWNERS: @kernel-team

pub mod log;
