//! Resource bookkeeping: Available / Max / Allocation / Need matrices.
//!
//! `ResourceState` keeps the bookkeeping invariants mechanically:
//! - `need[i][j] == max[i][j] - allocation[i][j]`
//! - `available[j] + Σ_i allocation[i][j] == totals[j]`
//!
//! It never checks legality of a delta; that is the coordinator's job.

#![allow(missing_docs)]

use serde::{Deserialize, Serialize};

use crate::core::errors::{BankerError, Result};

/// Direction of a bookkeeping delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Move instances from Available into the process's Allocation.
    Acquire,
    /// Move instances from the process's Allocation back to Available.
    Release,
}

/// Immutable copy of the matrices the safety check reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub available: Vec<u32>,
    pub allocation: Vec<Vec<u32>>,
    pub need: Vec<Vec<u32>>,
}

impl StateSnapshot {
    pub fn num_processes(&self) -> usize {
        self.need.len()
    }

    pub fn num_resources(&self) -> usize {
        self.available.len()
    }
}

/// Shared resource state for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceState {
    available: Vec<u32>,
    max: Vec<Vec<u32>>,
    allocation: Vec<Vec<u32>>,
    need: Vec<Vec<u32>>,
    totals: Vec<u64>,
}

impl ResourceState {
    /// Build the state from the three base structures and derive `need`.
    pub fn initialize(
        available: Vec<u32>,
        max: Vec<Vec<u32>>,
        allocation: Vec<Vec<u32>>,
    ) -> Result<Self> {
        let resources = available.len();
        let processes = max.len();

        if resources == 0 {
            return Err(invalid("system must have at least one resource type"));
        }
        if processes == 0 {
            return Err(invalid("system must have at least one process"));
        }
        if allocation.len() != processes {
            return Err(invalid(format!(
                "allocation has {} rows, max has {processes}",
                allocation.len()
            )));
        }
        for (pid, (max_row, alloc_row)) in max.iter().zip(&allocation).enumerate() {
            if max_row.len() != resources {
                return Err(invalid(format!(
                    "max row {pid} has {} entries, expected {resources}",
                    max_row.len()
                )));
            }
            if alloc_row.len() != resources {
                return Err(invalid(format!(
                    "allocation row {pid} has {} entries, expected {resources}",
                    alloc_row.len()
                )));
            }
        }

        let mut need = Vec::with_capacity(processes);
        for (pid, (max_row, alloc_row)) in max.iter().zip(&allocation).enumerate() {
            let mut row = Vec::with_capacity(resources);
            for (res, (&m, &a)) in max_row.iter().zip(alloc_row).enumerate() {
                let n = m.checked_sub(a).ok_or_else(|| {
                    invalid(format!(
                        "process {pid} holds {a} of resource {res} but declares max {m} (negative need)"
                    ))
                })?;
                row.push(n);
            }
            need.push(row);
        }

        let totals: Vec<u64> = (0..resources)
            .map(|j| {
                u64::from(available[j]) + allocation.iter().map(|row| u64::from(row[j])).sum::<u64>()
            })
            .collect();
        // Every instance must fit back into Available once released.
        if let Some((res, total)) = totals
            .iter()
            .enumerate()
            .find(|&(_, &total)| total > u64::from(u32::MAX))
        {
            return Err(invalid(format!(
                "resource {res} has {total} instances in total, limit is {}",
                u32::MAX
            )));
        }

        Ok(Self {
            available,
            max,
            allocation,
            need,
            totals,
        })
    }

    pub fn num_processes(&self) -> usize {
        self.max.len()
    }

    pub fn num_resources(&self) -> usize {
        self.available.len()
    }

    pub fn available(&self) -> &[u32] {
        &self.available
    }

    pub fn max(&self) -> &[Vec<u32>] {
        &self.max
    }

    pub fn allocation(&self) -> &[Vec<u32>] {
        &self.allocation
    }

    pub fn need(&self) -> &[Vec<u32>] {
        &self.need
    }

    /// Conserved per-resource instance totals.
    pub fn totals(&self) -> &[u64] {
        &self.totals
    }

    /// Move `delta` between Available and the process's Allocation/Need.
    ///
    /// Callers must have validated `pid`, the vector length, and the bounds
    /// for the given direction.
    pub fn apply_delta(&mut self, pid: usize, delta: &[u32], direction: Direction) {
        debug_assert_eq!(delta.len(), self.num_resources());
        let alloc = &mut self.allocation[pid];
        let need = &mut self.need[pid];
        for (j, &d) in delta.iter().enumerate() {
            match direction {
                Direction::Acquire => {
                    self.available[j] -= d;
                    alloc[j] += d;
                    need[j] -= d;
                }
                Direction::Release => {
                    self.available[j] += d;
                    alloc[j] -= d;
                    need[j] += d;
                }
            }
        }
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            available: self.available.clone(),
            allocation: self.allocation.clone(),
            need: self.need.clone(),
        }
    }

    /// Describe the first broken bookkeeping invariant, if any.
    pub fn check_invariants(&self) -> Option<String> {
        for (i, ((m_row, a_row), n_row)) in self
            .max
            .iter()
            .zip(&self.allocation)
            .zip(&self.need)
            .enumerate()
        {
            for j in 0..self.num_resources() {
                if u64::from(n_row[j]) + u64::from(a_row[j]) != u64::from(m_row[j]) {
                    return Some(format!(
                        "need[{i}][{j}]={} != max {} - allocation {}",
                        n_row[j], m_row[j], a_row[j]
                    ));
                }
            }
        }
        for (j, &total) in self.totals.iter().enumerate() {
            let held: u64 = self.allocation.iter().map(|row| u64::from(row[j])).sum();
            let sum = u64::from(self.available[j]) + held;
            if sum != total {
                return Some(format!(
                    "resource {j}: available + allocated = {sum}, expected {total}"
                ));
            }
        }
        None
    }
}

fn invalid(details: impl Into<String>) -> BankerError {
    BankerError::InvalidSetup {
        details: details.into(),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::ResourceState;

    /// The classic 5-process / 3-resource textbook instance.
    pub fn textbook() -> ResourceState {
        ResourceState::initialize(
            vec![3, 3, 2],
            vec![
                vec![7, 5, 3],
                vec![3, 2, 2],
                vec![9, 0, 2],
                vec![2, 2, 2],
                vec![4, 3, 3],
            ],
            vec![
                vec![0, 1, 0],
                vec![2, 0, 0],
                vec![3, 0, 2],
                vec![2, 1, 1],
                vec![0, 0, 2],
            ],
        )
        .expect("textbook instance is well formed")
    }
}
