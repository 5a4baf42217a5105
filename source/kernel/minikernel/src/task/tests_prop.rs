// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg(test)]
//! CONTEXT: Property-based tests for process-table slot accounting
//! OWNERS: @kernel-sched-team
//! NOTE: Tests only; exercises ProcessTable without a HAL.
//!
//! TEST_SCOPE:
//!   - Occupancy never exceeds MAX_PROC
//!   - allocate() fails exactly when every slot is in use
//!
//! TEST_SCENARIOS:
//!   - occupancy_is_bounded(): random activate/reset sequences agree with a set model

use super::{ProcState, ProcessTable};
use crate::config::MAX_PROC;
use minikernel_hal::{ContextHandle, ImageHandle, StackHandle};
use proptest::prelude::*;
use std::collections::BTreeSet;

proptest! {
    #[test]
    fn occupancy_is_bounded(ops in proptest::collection::vec(any::<Option<u8>>(), 0..96)) {
        let mut table = ProcessTable::new();
        let mut live: BTreeSet<usize> = BTreeSet::new();
        for op in ops {
            match op {
                // Some(_) creates, None releases the lowest live slot.
                Some(raw) => match table.allocate() {
                    Some(pid) => {
                        prop_assert!(live.len() < MAX_PROC);
                        prop_assert!(!live.contains(&pid.as_index()));
                        let handle = usize::from(raw);
                        let pce = table.get_mut(pid).unwrap();
                        pce.activate(
                            ContextHandle::from_raw(handle),
                            StackHandle::from_raw(handle),
                            ImageHandle::from_raw(handle),
                            10,
                        );
                        pce.state = ProcState::Ready;
                        live.insert(pid.as_index());
                    }
                    None => prop_assert_eq!(live.len(), MAX_PROC),
                },
                None => {
                    if let Some(&index) = live.iter().next() {
                        let pid = crate::types::Pid::decode(index).unwrap();
                        table.get_mut(pid).unwrap().reset();
                        live.remove(&index);
                    }
                }
            }
            prop_assert_eq!(table.occupied(), live.len());
            prop_assert!(table.occupied() <= MAX_PROC);
        }
    }
}
