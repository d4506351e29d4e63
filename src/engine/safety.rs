//! Banker's safety check: fixed-point simulation over Need and Allocation.
//!
//! Starting from `work = available`, repeatedly finish any process whose
//! need fits in `work` and reclaim its allocation, until a full pass makes
//! no progress. The state is safe iff every process finished.

#![allow(missing_docs)]

use serde::Serialize;

use crate::engine::state::StateSnapshot;

/// Result of one safety simulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SafetyReport {
    pub safe: bool,
    /// Processes in the order the simulation finished them. When `safe`,
    /// this is a safe sequence.
    pub finish_order: Vec<usize>,
    /// Processes that could not finish (empty when safe).
    pub stuck: Vec<usize>,
    /// Number of scan passes performed, including the final idle pass.
    pub passes: usize,
}

/// Stateless, deterministic safety checker.
#[derive(Debug, Clone, Copy, Default)]
pub struct SafetyEngine;

impl SafetyEngine {
    pub fn is_safe(snapshot: &StateSnapshot) -> bool {
        Self::evaluate(snapshot).safe
    }

    /// Scan processes in ascending index order.
    pub fn evaluate(snapshot: &StateSnapshot) -> SafetyReport {
        let order: Vec<usize> = (0..snapshot.num_processes()).collect();
        Self::evaluate_with_order(snapshot, &order)
    }

    /// Scan processes in the given order on every pass.
    ///
    /// `order` must be a permutation of `0..num_processes`. The verdict does
    /// not depend on it; only `finish_order` does.
    pub fn evaluate_with_order(snapshot: &StateSnapshot, order: &[usize]) -> SafetyReport {
        debug_assert_eq!(order.len(), snapshot.num_processes());

        let mut work: Vec<u64> = snapshot.available.iter().map(|&a| u64::from(a)).collect();
        let mut finish = vec![false; snapshot.num_processes()];
        let mut finish_order = Vec::with_capacity(finish.len());
        let mut passes = 0;

        loop {
            passes += 1;
            let mut progress = false;
            for &pid in order {
                if finish[pid] || !fits(&snapshot.need[pid], &work) {
                    continue;
                }
                for (w, &held) in work.iter_mut().zip(&snapshot.allocation[pid]) {
                    *w += u64::from(held);
                }
                finish[pid] = true;
                finish_order.push(pid);
                progress = true;
            }
            if !progress {
                break;
            }
        }

        let stuck: Vec<usize> = finish
            .iter()
            .enumerate()
            .filter_map(|(pid, done)| (!done).then_some(pid))
            .collect();

        SafetyReport {
            safe: stuck.is_empty(),
            finish_order,
            stuck,
            passes,
        }
    }
}

fn fits(need: &[u32], work: &[u64]) -> bool {
    need.iter().zip(work).all(|(&n, &w)| u64::from(n) <= w)
}
