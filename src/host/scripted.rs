//! In-process host backend with scripted behavior.
//!
//! Used by the integration tests and by embedders that want to exercise
//! their prompting flows without hardware. Outcomes are played back from a
//! queue; evaluations can optionally be parked until released so tests can
//! observe the `Evaluating` window from outside.

use super::{HostAuthenticator, HostSession};
use crate::evaluation::Responder;
use crate::outcome::EvaluationOutcome;
use crate::policy::Policy;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tracing::debug;

#[derive(Default)]
pub struct ScriptedHost {
    next_session: AtomicU64,
    deny_allocation: AtomicBool,
    hold: AtomicBool,
    cancels: AtomicUsize,
    availability: RwLock<HashMap<i32, bool>>,
    script: Mutex<VecDeque<EvaluationOutcome>>,
    parked: Mutex<HashMap<u64, Responder>>,
    titles: Mutex<HashMap<u64, String>>,
    reasons: Mutex<Vec<(u64, Policy, String)>>,
    open: Mutex<HashSet<u64>>,
}

impl ScriptedHost {
    pub fn new() -> Self {
        ScriptedHost::default()
    }

    /// Make (or stop making) `policy` report as satisfiable. Policies never
    /// configured report false, matching the unknown-policy contract.
    pub fn set_availability(&self, policy: Policy, available: bool) {
        self.availability.write().insert(policy.raw(), available);
    }

    /// Queue the outcome for the next evaluation. With an empty queue,
    /// evaluations succeed.
    pub fn script_outcome(&self, outcome: EvaluationOutcome) {
        self.script.lock().push_back(outcome);
    }

    /// Make `open_session` fail, to exercise the allocation-failure path.
    pub fn deny_allocation(&self, deny: bool) {
        self.deny_allocation.store(deny, Ordering::SeqCst);
    }

    /// Park evaluations instead of completing them, until released or
    /// cancelled. Lets a test hold a context in the `Evaluating` state.
    pub fn hold_evaluations(&self, hold: bool) {
        self.hold.store(hold, Ordering::SeqCst);
    }

    /// Complete one parked evaluation with the next scripted outcome.
    /// Returns false when nothing was parked.
    pub fn release_one(&self) -> bool {
        let responder = {
            let mut parked = self.parked.lock();
            let key = match parked.keys().next().copied() {
                Some(k) => k,
                None => return false,
            };
            parked.remove(&key).unwrap()
        };
        responder.fulfill(self.next_outcome());
        true
    }

    /// Drop one parked responder without fulfilling it, simulating a host
    /// that loses an evaluation. Returns false when nothing was parked.
    pub fn abandon_one(&self) -> bool {
        let mut parked = self.parked.lock();
        let key = match parked.keys().next().copied() {
            Some(k) => k,
            None => return false,
        };
        drop(parked.remove(&key));
        true
    }

    pub fn parked_count(&self) -> usize {
        self.parked.lock().len()
    }

    pub fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    pub fn open_session_count(&self) -> usize {
        self.open.lock().len()
    }

    pub fn title_for(&self, session: HostSession) -> Option<String> {
        self.titles.lock().get(&session.raw()).cloned()
    }

    /// `(session, policy, reason)` for every evaluation that reached the host.
    pub fn recorded_evaluations(&self) -> Vec<(u64, Policy, String)> {
        self.reasons.lock().iter().map(|(s, p, r)| (*s, *p, r.clone())).collect()
    }

    fn next_outcome(&self) -> EvaluationOutcome {
        self.script.lock().pop_front().unwrap_or(EvaluationOutcome::Succeeded)
    }
}

impl HostAuthenticator for ScriptedHost {
    fn open_session(&self) -> Option<HostSession> {
        if self.deny_allocation.load(Ordering::SeqCst) {
            return None;
        }
        let id = self.next_session.fetch_add(1, Ordering::SeqCst) + 1;
        self.open.lock().insert(id);
        Some(HostSession::new(id))
    }

    fn close_session(&self, session: HostSession) {
        self.open.lock().remove(&session.raw());
        self.titles.lock().remove(&session.raw());
    }

    fn set_cancel_title(&self, session: HostSession, title: &str) {
        self.titles.lock().insert(session.raw(), title.to_string());
    }

    fn can_evaluate(&self, _session: HostSession, policy: Policy) -> bool {
        self.availability.read().get(&policy.raw()).copied().unwrap_or(false)
    }

    fn begin_evaluation(
        &self,
        session: HostSession,
        policy: Policy,
        reason: &str,
        responder: Responder,
    ) {
        self.reasons.lock().push((session.raw(), policy, reason.to_string()));

        if !self.can_evaluate(session, policy) {
            let outcome = EvaluationOutcome::PolicyUnavailable;
            std::thread::spawn(move || responder.fulfill(outcome));
            return;
        }
        if self.hold.load(Ordering::SeqCst) {
            debug!(session = session.raw(), %policy, "parking evaluation");
            self.parked.lock().insert(session.raw(), responder);
            return;
        }
        let outcome = self.next_outcome();
        // Deliver from another thread, matching the native backend's shape.
        std::thread::spawn(move || responder.fulfill(outcome));
    }

    fn cancel(&self, session: HostSession) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        let responder = self.parked.lock().remove(&session.raw());
        if let Some(responder) = responder {
            debug!(session = session.raw(), "cancelling parked evaluation");
            responder.fulfill(EvaluationOutcome::SystemCanceled);
        }
    }
}
