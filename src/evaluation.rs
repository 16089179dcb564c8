//! Exactly-once completion machinery for policy evaluations.
//!
//! The host reports each evaluation's outcome through a [`Responder`]: a
//! single-shot handle whose `fulfill` consumes it, so delivering twice does
//! not typecheck, and whose `Drop` delivers an [`EvaluationOutcome::Unknown`]
//! if a host backend discards it, so delivering zero times cannot happen
//! either. The outcome crosses back to the caller over a oneshot channel,
//! which also serves as the thread hop: the host may complete on any thread,
//! the caller observes the result on whatever executor it awaits from.

use crate::error::AuthError;
use crate::outcome::EvaluationOutcome;
use parking_lot::{Condvar, Mutex};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Per-context evaluation state: the `Idle -> Evaluating -> Idle` machine,
/// guarded by a single mutex. The generation counter ties each responder to
/// the admission that created it, so a stale completion (e.g. one racing a
/// cancellation) can never flip the state owned by a newer evaluation.
pub(crate) struct EvalCell {
    inner: Mutex<EvalState>,
    completion: Condvar,
}

struct EvalState {
    evaluating: bool,
    generation: u64,
}

impl EvalCell {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(EvalCell {
            inner: Mutex::new(EvalState { evaluating: false, generation: 0 }),
            completion: Condvar::new(),
        })
    }

    /// Admit one evaluation. Synchronous single-flight gate: rejects when one
    /// is already outstanding, otherwise transitions to `Evaluating` and
    /// returns the new generation.
    pub(crate) fn try_admit(&self) -> Result<u64, AuthError> {
        let mut st = self.inner.lock();
        if st.evaluating {
            return Err(AuthError::EvaluationInFlight);
        }
        st.evaluating = true;
        st.generation += 1;
        Ok(st.generation)
    }

    /// Return to `Idle` if `generation` is the one currently in flight.
    /// Reports whether the flip happened.
    fn complete(&self, generation: u64) -> bool {
        let mut st = self.inner.lock();
        let current = st.evaluating && st.generation == generation;
        if current {
            st.evaluating = false;
        }
        // Wake destroy-waiters regardless; a stale completion is still progress.
        self.completion.notify_all();
        current
    }

    pub(crate) fn is_evaluating(&self) -> bool {
        self.inner.lock().evaluating
    }

    /// Block until the in-flight evaluation (if any) has been completed, or
    /// the timeout elapses. Returns true when idle was reached.
    pub(crate) fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        let mut st = self.inner.lock();
        while st.evaluating {
            let now = std::time::Instant::now();
            if now >= deadline {
                return false;
            }
            if self.completion.wait_for(&mut st, deadline - now).timed_out() && st.evaluating {
                return false;
            }
        }
        true
    }
}

/// Single-shot completion handle passed to the host backend for one admitted
/// evaluation. Exactly one outcome reaches the caller per responder.
pub struct Responder {
    tx: Option<oneshot::Sender<EvaluationOutcome>>,
    cell: Arc<EvalCell>,
    generation: u64,
}

impl Responder {
    pub(crate) fn new(
        tx: oneshot::Sender<EvaluationOutcome>,
        cell: Arc<EvalCell>,
        generation: u64,
    ) -> Self {
        Responder { tx: Some(tx), cell, generation }
    }

    /// Deliver the evaluation's terminal outcome. Consumes the responder.
    pub fn fulfill(mut self, outcome: EvaluationOutcome) {
        self.deliver(outcome);
    }

    fn deliver(&mut self, outcome: EvaluationOutcome) {
        let Some(tx) = self.tx.take() else { return };
        let flipped = self.cell.complete(self.generation);
        if !flipped {
            debug!(generation = self.generation, %outcome, "stale evaluation completion");
        } else {
            debug!(generation = self.generation, %outcome, "evaluation completed");
        }
        // The receiver side may already be gone (caller dropped the pending
        // future); the outcome is then discarded, which is fine: delivery is
        // exactly-once toward a receiver that still wants it.
        let _ = tx.send(outcome);
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        if self.tx.is_some() {
            warn!(generation = self.generation, "host discarded a responder without fulfilling it");
            self.deliver(EvaluationOutcome::Unknown {
                message: "host discarded the evaluation without reporting an outcome".into(),
            });
        }
    }
}

/// The asynchronous tail of one accepted `evaluate` call. Resolves to the
/// evaluation's terminal outcome; never errors.
pub struct PendingEvaluation {
    rx: oneshot::Receiver<EvaluationOutcome>,
}

impl PendingEvaluation {
    pub(crate) fn new(rx: oneshot::Receiver<EvaluationOutcome>) -> Self {
        PendingEvaluation { rx }
    }

    /// Block the current (non-async) thread until the outcome arrives.
    /// Used by the FFI bridge threads; must not be called from an executor.
    pub fn wait(self) -> EvaluationOutcome {
        self.rx.blocking_recv().unwrap_or_else(|_| EvaluationOutcome::Unknown {
            message: "evaluation channel closed before completion".into(),
        })
    }
}

impl Future for PendingEvaluation {
    type Output = EvaluationOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            // Unreachable given the responder-drop guarantee, but mapped
            // rather than panicking: the contract is "never zero callbacks".
            Poll::Ready(Err(_)) => Poll::Ready(EvaluationOutcome::Unknown {
                message: "evaluation channel closed before completion".into(),
            }),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admitted(cell: &Arc<EvalCell>) -> (Responder, PendingEvaluation) {
        let generation = cell.try_admit().unwrap();
        let (tx, rx) = oneshot::channel();
        (Responder::new(tx, cell.clone(), generation), PendingEvaluation::new(rx))
    }

    #[test]
    fn single_flight_gate_rejects_second_admission() {
        let cell = EvalCell::new();
        let (_responder, _pending) = admitted(&cell);
        assert_eq!(cell.try_admit(), Err(AuthError::EvaluationInFlight));
    }

    #[tokio::test]
    async fn fulfill_delivers_once_and_returns_to_idle() {
        let cell = EvalCell::new();
        let (responder, pending) = admitted(&cell);
        responder.fulfill(EvaluationOutcome::Succeeded);
        assert_eq!(pending.await, EvaluationOutcome::Succeeded);
        assert!(!cell.is_evaluating());
        // A fresh admission is accepted again.
        assert!(cell.try_admit().is_ok());
    }

    #[tokio::test]
    async fn dropped_responder_still_delivers_unknown() {
        let cell = EvalCell::new();
        let (responder, pending) = admitted(&cell);
        drop(responder);
        match pending.await {
            EvaluationOutcome::Unknown { .. } => {}
            other => panic!("expected Unknown, got {:?}", other),
        }
        assert!(!cell.is_evaluating());
    }

    #[tokio::test]
    async fn stale_completion_does_not_disturb_newer_evaluation() {
        let cell = EvalCell::new();
        let (stale, stale_pending) = admitted(&cell);

        // First evaluation completes through a fresh responder path: simulate
        // by completing the cell directly, then admitting a second one.
        assert!(cell.complete(1));
        let (fresh, fresh_pending) = admitted(&cell);
        assert!(cell.is_evaluating());

        // The stale responder fires late; the newer evaluation stays in flight.
        stale.fulfill(EvaluationOutcome::SystemCanceled);
        assert!(cell.is_evaluating());
        assert_eq!(stale_pending.await, EvaluationOutcome::SystemCanceled);

        fresh.fulfill(EvaluationOutcome::Succeeded);
        assert_eq!(fresh_pending.await, EvaluationOutcome::Succeeded);
        assert!(!cell.is_evaluating());
    }

    #[test]
    fn wait_until_idle_observes_completion_from_another_thread() {
        let cell = EvalCell::new();
        let (responder, _pending) = admitted(&cell);
        let cell2 = cell.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            responder.fulfill(EvaluationOutcome::SystemCanceled);
        });
        assert!(cell.wait_until_idle(Duration::from_secs(5)));
        assert!(!cell2.is_evaluating());
        handle.join().unwrap();
    }

    #[test]
    fn wait_until_idle_times_out_when_nothing_completes() {
        let cell = EvalCell::new();
        let (_responder, _pending) = admitted(&cell);
        assert!(!cell.wait_until_idle(Duration::from_millis(30)));
    }
}
