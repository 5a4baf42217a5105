// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg(test)]
//! CONTEXT: Property-based tests for mutex lock counting
//! OWNERS: @kernel-team
//! NOTE: Tests only; exercises MutexEntry transitions without a HAL.
//!
//! TEST_SCOPE:
//!   - Recursive lock/unlock symmetry for arbitrary depth
//!   - Non-recursive count never exceeds one
//!
//! TEST_SCENARIOS:
//!   - recursive_depth_round_trips(): N locks then N unlocks leaves the mutex Unlocked
//!   - non_recursive_count_stays_one(): repeated relocks fail without changing the count

use super::mutex::{
    LockOutcome, MutexError, MutexKind, MutexName, MutexState, MutexTable, UnlockOutcome,
};
use crate::types::Pid;
use proptest::prelude::*;

proptest! {
    #[test]
    fn recursive_depth_round_trips(depth in 1u32..64, owner in 0u32..10) {
        let mut table = MutexTable::new();
        let id = table.free_slot().unwrap();
        table.install(id, MutexName::new(b"rec").unwrap(), MutexKind::Recursive);
        let entry = table.get_mut(id).unwrap();
        let pid = Pid::from_raw(owner);

        for n in 1..=depth {
            prop_assert_eq!(entry.try_lock(pid), Ok(LockOutcome::Acquired));
            prop_assert_eq!(entry.lock_count(), n);
        }
        for n in (1..depth).rev() {
            prop_assert_eq!(entry.unlock(pid), Ok(UnlockOutcome::Held { count: n }));
        }
        prop_assert_eq!(entry.unlock(pid), Ok(UnlockOutcome::Released));
        prop_assert_eq!(entry.state(), MutexState::Unlocked);
        prop_assert_eq!(entry.owner(), None);
        prop_assert!(entry.waiters().is_empty());
    }

    #[test]
    fn non_recursive_count_stays_one(attempts in 1usize..16) {
        let mut table = MutexTable::new();
        let id = table.free_slot().unwrap();
        table.install(id, MutexName::new(b"nr").unwrap(), MutexKind::NonRecursive);
        let entry = table.get_mut(id).unwrap();
        let pid = Pid::from_raw(3);

        prop_assert_eq!(entry.try_lock(pid), Ok(LockOutcome::Acquired));
        for _ in 0..attempts {
            prop_assert_eq!(entry.try_lock(pid), Err(MutexError::AlreadyLocked));
            prop_assert_eq!(entry.lock_count(), 1);
        }
    }
}
