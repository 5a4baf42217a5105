// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg(test)]
//! CONTEXT: Property-based tests for the process-index FIFO
//! OWNERS: @kernel-sched-team
//! NOTE: Tests only; no kernel logic. Checks WaitQueue against a Vec model.
//!
//! TEST_SCOPE:
//!   - FIFO order under interleaved push/pop/remove
//!   - Membership uniqueness and checked failures
//!
//! TEST_SCENARIOS:
//!   - matches_vec_model(): random operation sequences agree with a Vec reference
//!   - drain_preserves_insertion_order(): pop_front yields distinct pushes in order

use super::{QueueError, WaitQueue};
use crate::config::MAX_PROC;
use crate::types::Pid;
use proptest::prelude::*;

#[derive(Debug, Clone, Copy)]
enum Op {
    Push(u32),
    Pop,
    Remove(u32),
}

fn arb_op() -> impl Strategy<Value = Op> {
    let max = MAX_PROC as u32;
    prop_oneof![
        (0..max).prop_map(Op::Push),
        Just(Op::Pop),
        (0..max).prop_map(Op::Remove),
    ]
}

proptest! {
    #[test]
    fn matches_vec_model(ops in proptest::collection::vec(arb_op(), 0..64)) {
        let mut queue = WaitQueue::new();
        let mut model: Vec<Pid> = Vec::new();
        for op in ops {
            match op {
                Op::Push(raw) => {
                    let pid = Pid::from_raw(raw);
                    let expected = if model.contains(&pid) {
                        Err(QueueError::AlreadyQueued(pid))
                    } else {
                        model.push(pid);
                        Ok(())
                    };
                    prop_assert_eq!(queue.push_back(pid), expected);
                }
                Op::Pop => {
                    let expected = if model.is_empty() { None } else { Some(model.remove(0)) };
                    prop_assert_eq!(queue.pop_front(), expected);
                }
                Op::Remove(raw) => {
                    let pid = Pid::from_raw(raw);
                    let expected = match model.iter().position(|&p| p == pid) {
                        Some(index) => {
                            model.remove(index);
                            Ok(())
                        }
                        None => Err(QueueError::NotQueued(pid)),
                    };
                    prop_assert_eq!(queue.remove(pid), expected);
                }
            }
            prop_assert_eq!(queue.len(), model.len());
            prop_assert_eq!(queue.front(), model.first().copied());
            prop_assert!(queue.len() <= MAX_PROC);
        }
        prop_assert_eq!(queue.iter().collect::<Vec<_>>(), model);
    }

    #[test]
    fn drain_preserves_insertion_order(order in Just((0..MAX_PROC as u32).collect::<Vec<_>>()).prop_shuffle()) {
        let mut queue = WaitQueue::new();
        for &raw in &order {
            queue.push_back(Pid::from_raw(raw)).unwrap();
        }
        let mut drained = Vec::new();
        while let Some(pid) = queue.pop_front() {
            drained.push(pid.as_raw());
        }
        prop_assert_eq!(drained, order);
        prop_assert!(queue.is_empty());
    }
}
