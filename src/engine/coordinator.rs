//! Allocation coordinator: the only mutator of [`ResourceState`].
//!
//! Every `request`/`release` runs validate → tentative apply → safety check →
//! commit/rollback → event emission inside one `parking_lot::Mutex` critical
//! section, so operations are linearizable and no caller ever observes a
//! tentative state. Denials never mutate state.

#![allow(missing_docs)]

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::errors::{AllocationError, RequestViolation};
use crate::engine::safety::{SafetyEngine, SafetyReport};
use crate::engine::state::{Direction, ResourceState, StateSnapshot};

/// Result type of a single coordinator call.
pub type Decision = std::result::Result<Outcome, AllocationError>;

/// Successful coordinator outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Granted,
    Released,
}

/// Which operation an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Request,
    Release,
}

/// One structured record per coordinator call, emitted in commit order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationEvent {
    /// Position in the linearization order (starts at 1).
    pub seq: u64,
    pub pid: usize,
    pub kind: OperationKind,
    pub amounts: Vec<u32>,
    pub decision: Decision,
}

impl AllocationEvent {
    /// Stable label for the decision: `granted`, `released`, or the error kind.
    pub fn outcome_label(&self) -> &'static str {
        match &self.decision {
            Ok(Outcome::Granted) => "granted",
            Ok(Outcome::Released) => "released",
            Err(e) => e.kind(),
        }
    }
}

/// Sink for allocation events.
///
/// Called synchronously while the coordinator's guard is held: implementors
/// must not call back into the coordinator and should return quickly.
pub trait AllocationObserver: Send + Sync {
    fn on_event(&self, event: &AllocationEvent);
}

struct Ledger {
    state: ResourceState,
    seq: u64,
}

/// Serializes all access to the shared resource state.
pub struct AllocationCoordinator {
    inner: Mutex<Ledger>,
    observers: Vec<Arc<dyn AllocationObserver>>,
}

impl AllocationCoordinator {
    pub fn new(state: ResourceState) -> Self {
        Self {
            inner: Mutex::new(Ledger { state, seq: 0 }),
            observers: Vec::new(),
        }
    }

    /// Register an observer. Observers are fixed once the coordinator is shared.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn AllocationObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn num_processes(&self) -> usize {
        self.inner.lock().state.num_processes()
    }

    pub fn num_resources(&self) -> usize {
        self.inner.lock().state.num_resources()
    }

    /// Ask for `amounts` on behalf of `pid`. Granted only if the resulting
    /// state is safe; otherwise the state is left exactly as it was.
    pub fn request(&self, pid: usize, amounts: &[u32]) -> Decision {
        let mut ledger = self.inner.lock();
        let decision = Self::try_request(&mut ledger.state, pid, amounts);
        self.emit(&mut ledger, pid, OperationKind::Request, amounts, &decision);
        decision
    }

    /// Return `amounts` held by `pid`. Always safe once legal.
    pub fn release(&self, pid: usize, amounts: &[u32]) -> Decision {
        let mut ledger = self.inner.lock();
        let decision = Self::try_release(&mut ledger.state, pid, amounts);
        self.emit(&mut ledger, pid, OperationKind::Release, amounts, &decision);
        decision
    }

    pub fn is_safe(&self) -> bool {
        SafetyEngine::is_safe(&self.inner.lock().state.snapshot())
    }

    pub fn safety_report(&self) -> SafetyReport {
        SafetyEngine::evaluate(&self.inner.lock().state.snapshot())
    }

    /// A safe completion order for the current state, if one exists.
    pub fn safe_sequence(&self) -> Option<Vec<usize>> {
        let report = self.safety_report();
        report.safe.then_some(report.finish_order)
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.inner.lock().state.snapshot()
    }

    /// Clone of the full state, including Max and totals.
    pub fn state(&self) -> ResourceState {
        self.inner.lock().state.clone()
    }

    pub fn need_of(&self, pid: usize) -> Option<Vec<u32>> {
        self.inner.lock().state.need().get(pid).cloned()
    }

    pub fn allocation_of(&self, pid: usize) -> Option<Vec<u32>> {
        self.inner.lock().state.allocation().get(pid).cloned()
    }

    // ──────────────────── internals ────────────────────

    fn try_request(state: &mut ResourceState, pid: usize, amounts: &[u32]) -> Decision {
        check_shape(state, pid, amounts)?;

        let need = &state.need()[pid];
        let available = state.available();
        for (resource, &amount) in amounts.iter().enumerate() {
            if amount > need[resource] {
                return Err(AllocationError::InvalidRequest {
                    pid,
                    resource,
                    reason: RequestViolation::ExceedsNeed,
                });
            }
            if amount > available[resource] {
                return Err(AllocationError::InvalidRequest {
                    pid,
                    resource,
                    reason: RequestViolation::ExceedsAvailable,
                });
            }
        }

        // Committed states are safe, so an empty request cannot change the verdict.
        if amounts.iter().all(|&a| a == 0) {
            return Ok(Outcome::Granted);
        }

        state.apply_delta(pid, amounts, Direction::Acquire);
        if SafetyEngine::is_safe(&state.snapshot()) {
            Ok(Outcome::Granted)
        } else {
            state.apply_delta(pid, amounts, Direction::Release);
            Err(AllocationError::UnsafeState { pid })
        }
    }

    fn try_release(state: &mut ResourceState, pid: usize, amounts: &[u32]) -> Decision {
        check_shape(state, pid, amounts)?;

        let held = &state.allocation()[pid];
        for (resource, &amount) in amounts.iter().enumerate() {
            if amount > held[resource] {
                return Err(AllocationError::InvalidRelease {
                    pid,
                    resource,
                    requested: amount,
                    held: held[resource],
                });
            }
        }

        state.apply_delta(pid, amounts, Direction::Release);
        Ok(Outcome::Released)
    }

    fn emit(
        &self,
        ledger: &mut Ledger,
        pid: usize,
        kind: OperationKind,
        amounts: &[u32],
        decision: &Decision,
    ) {
        ledger.seq += 1;
        debug_assert!(ledger.state.check_invariants().is_none());
        if self.observers.is_empty() {
            return;
        }
        let event = AllocationEvent {
            seq: ledger.seq,
            pid,
            kind,
            amounts: amounts.to_vec(),
            decision: decision.clone(),
        };
        for observer in &self.observers {
            observer.on_event(&event);
        }
    }
}

fn check_shape(state: &ResourceState, pid: usize, amounts: &[u32]) -> Result<(), AllocationError> {
    if pid >= state.num_processes() {
        return Err(AllocationError::UnknownProcess {
            pid,
            processes: state.num_processes(),
        });
    }
    if amounts.len() != state.num_resources() {
        return Err(AllocationError::ShapeMismatch {
            expected: state.num_resources(),
            got: amounts.len(),
        });
    }
    Ok(())
}

/// Observer that keeps every event in memory (tests, replay).
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<AllocationEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AllocationEvent> {
        self.events.lock().clone()
    }
}

impl AllocationObserver for RecordingObserver {
    fn on_event(&self, event: &AllocationEvent) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::state::fixtures::textbook;
    use proptest::prelude::*;

    fn textbook_coordinator() -> (AllocationCoordinator, Arc<RecordingObserver>) {
        let recorder = Arc::new(RecordingObserver::new());
        let coordinator = AllocationCoordinator::new(textbook())
            .with_observer(Arc::clone(&recorder) as Arc<dyn AllocationObserver>);
        (coordinator, recorder)
    }

    #[test]
    fn textbook_is_safe_at_startup() {
        let (coordinator, _) = textbook_coordinator();
        assert!(coordinator.is_safe());
        assert_eq!(coordinator.safe_sequence(), Some(vec![1, 3, 4, 0, 2]));
    }

    #[test]
    fn legal_safe_request_is_granted() {
        let (coordinator, _) = textbook_coordinator();
        assert_eq!(coordinator.request(1, &[1, 0, 2]), Ok(Outcome::Granted));
        let snap = coordinator.snapshot();
        assert_eq!(snap.available, vec![2, 3, 0]);
        assert_eq!(snap.allocation[1], vec![3, 0, 2]);
        assert_eq!(snap.need[1], vec![0, 2, 0]);
        assert!(coordinator.is_safe());
    }

    #[test]
    fn request_above_available_is_invalid_without_mutation() {
        let (coordinator, _) = textbook_coordinator();
        coordinator.request(1, &[1, 0, 2]).unwrap();
        let before = coordinator.state();

        let err = coordinator.request(4, &[3, 3, 0]).unwrap_err();
        assert_eq!(
            err,
            AllocationError::InvalidRequest {
                pid: 4,
                resource: 0,
                reason: RequestViolation::ExceedsAvailable,
            }
        );
        assert_eq!(coordinator.state(), before);
    }

    #[test]
    fn request_above_need_is_invalid() {
        let (coordinator, _) = textbook_coordinator();
        let err = coordinator.request(3, &[1, 0, 0]).unwrap_err();
        assert_eq!(
            err,
            AllocationError::InvalidRequest {
                pid: 3,
                resource: 0,
                reason: RequestViolation::ExceedsNeed,
            }
        );
    }

    #[test]
    fn need_is_checked_before_available_on_the_same_resource() {
        let (coordinator, recorder) = textbook_coordinator();
        let before = coordinator.state();
        // P3: Need[2] = 1, Available[2] = 2; 3 violates both bounds.
        assert_eq!(
            coordinator.request(3, &[0, 0, 3]),
            Err(AllocationError::InvalidRequest {
                pid: 3,
                resource: 2,
                reason: RequestViolation::ExceedsNeed,
            })
        );
        assert_eq!(coordinator.state(), before);
        assert_eq!(recorder.events().len(), 1);
    }

    #[test]
    fn unsafe_request_rolls_back_exactly() {
        let (coordinator, _) = textbook_coordinator();
        coordinator.request(1, &[1, 0, 2]).unwrap();
        let before = coordinator.state();

        let err = coordinator.request(0, &[0, 2, 0]).unwrap_err();
        assert_eq!(err, AllocationError::UnsafeState { pid: 0 });
        assert_eq!(coordinator.state(), before);
        assert!(coordinator.is_safe());
    }

    #[test]
    fn over_release_is_invalid_without_mutation() {
        let (coordinator, _) = textbook_coordinator();
        let before = coordinator.state();
        let err = coordinator.release(0, &[1, 0, 0]).unwrap_err();
        assert_eq!(
            err,
            AllocationError::InvalidRelease {
                pid: 0,
                resource: 0,
                requested: 1,
                held: 0,
            }
        );
        assert_eq!(coordinator.state(), before);
    }

    #[test]
    fn release_returns_instances() {
        let (coordinator, _) = textbook_coordinator();
        assert_eq!(coordinator.release(2, &[3, 0, 2]), Ok(Outcome::Released));
        let snap = coordinator.snapshot();
        assert_eq!(snap.available, vec![6, 3, 4]);
        assert_eq!(snap.allocation[2], vec![0, 0, 0]);
        assert_eq!(snap.need[2], vec![9, 0, 2]);
    }

    #[test]
    fn zero_request_is_granted_without_change() {
        let (coordinator, _) = textbook_coordinator();
        let before = coordinator.state();
        for pid in 0..5 {
            assert_eq!(coordinator.request(pid, &[0, 0, 0]), Ok(Outcome::Granted));
        }
        assert_eq!(coordinator.state(), before);
    }

    #[test]
    fn shape_errors_are_reported() {
        let (coordinator, _) = textbook_coordinator();
        assert_eq!(
            coordinator.request(9, &[0, 0, 0]),
            Err(AllocationError::UnknownProcess {
                pid: 9,
                processes: 5
            })
        );
        assert_eq!(
            coordinator.release(0, &[0, 0]),
            Err(AllocationError::ShapeMismatch {
                expected: 3,
                got: 2
            })
        );
    }

    #[test]
    fn every_call_emits_one_event_in_order() {
        let (coordinator, recorder) = textbook_coordinator();
        let _ = coordinator.request(1, &[1, 0, 2]);
        let _ = coordinator.request(4, &[3, 3, 0]);
        let _ = coordinator.release(0, &[1, 0, 0]);
        let _ = coordinator.release(1, &[1, 0, 2]);

        let events = recorder.events();
        let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4]);
        let labels: Vec<&str> = events.iter().map(AllocationEvent::outcome_label).collect();
        assert_eq!(
            labels,
            vec!["granted", "invalid_request", "invalid_release", "released"]
        );
        assert_eq!(events[0].kind, OperationKind::Request);
        assert_eq!(events[3].amounts, vec![1, 0, 2]);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Request(usize, Vec<u32>),
        Release(usize, Vec<u32>),
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        (
            any::<bool>(),
            0usize..5,
            prop::collection::vec(0u32..4, 3),
        )
            .prop_map(|(is_request, pid, amounts)| {
                if is_request {
                    Op::Request(pid, amounts)
                } else {
                    Op::Release(pid, amounts)
                }
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Bookkeeping and safety hold after every call; denials change nothing.
        #[test]
        fn invariants_hold_across_operation_sequences(
            ops in prop::collection::vec(arb_op(), 1..60)
        ) {
            let coordinator = AllocationCoordinator::new(textbook());
            for op in ops {
                let before = coordinator.state();
                let decision = match &op {
                    Op::Request(pid, amounts) => coordinator.request(*pid, amounts),
                    Op::Release(pid, amounts) => coordinator.release(*pid, amounts),
                };
                let after = coordinator.state();
                prop_assert!(after.check_invariants().is_none(), "{:?}", after.check_invariants());
                prop_assert!(coordinator.is_safe(), "unsafe after {op:?}");
                if decision.is_err() {
                    prop_assert_eq!(before, after);
                }
            }
        }
    }
}
