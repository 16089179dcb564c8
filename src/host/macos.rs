//! Native backend over the macOS LocalAuthentication framework.
//!
//! The prompt call blocks until the user responds, so each evaluation runs on
//! its own thread and reports back through the responder. This backend cannot
//! interrupt a presented prompt: `cancel` is best-effort and the
//! deliver-then-free teardown contract is enforced one layer up by the
//! responder-drop guarantee and the bounded teardown wait.

use super::{HostAuthenticator, HostSession};
use crate::evaluation::Responder;
use crate::outcome::EvaluationOutcome;
use crate::policy::Policy;
use localauthentication_rs::{LAPolicy, LocalAuthentication};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

pub struct MacosHost {
    next_session: AtomicU64,
    open: Mutex<HashSet<u64>>,
}

impl MacosHost {
    pub fn new() -> Self {
        MacosHost { next_session: AtomicU64::new(0), open: Mutex::new(HashSet::new()) }
    }

    fn map_policy(policy: Policy) -> Option<LAPolicy> {
        match policy {
            Policy::BIOMETRICS => Some(LAPolicy::DeviceOwnerAuthenticationWithBiometrics),
            Policy::DEVICE_OWNER => Some(LAPolicy::DeviceOwnerAuthentication),
            _ => None,
        }
    }
}

impl Default for MacosHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostAuthenticator for MacosHost {
    fn open_session(&self) -> Option<HostSession> {
        let id = self.next_session.fetch_add(1, Ordering::SeqCst) + 1;
        self.open.lock().insert(id);
        Some(HostSession::new(id))
    }

    fn close_session(&self, session: HostSession) {
        self.open.lock().remove(&session.raw());
    }

    fn set_cancel_title(&self, session: HostSession, _title: &str) {
        // The framework binding in use offers no cancel-title hook; the
        // system default label is shown instead.
        debug!(session = session.raw(), "cancel title not forwarded by this backend");
    }

    fn can_evaluate(&self, _session: HostSession, policy: Policy) -> bool {
        // Availability beyond the policy mapping (enrollment, lockout) is
        // only learned at evaluation time with this backend.
        Self::map_policy(policy).is_some()
    }

    fn begin_evaluation(
        &self,
        session: HostSession,
        policy: Policy,
        reason: &str,
        responder: Responder,
    ) {
        let Some(native) = Self::map_policy(policy) else {
            std::thread::spawn(move || responder.fulfill(EvaluationOutcome::PolicyUnavailable));
            return;
        };
        debug!(session = session.raw(), %policy, "starting native evaluation");
        let reason = reason.to_string();
        std::thread::spawn(move || {
            // Constructed on the evaluation thread; the native context is not
            // shared across threads.
            let la = LocalAuthentication::new();
            let outcome = if la.evaluate_policy(native, &reason) {
                EvaluationOutcome::Succeeded
            } else {
                EvaluationOutcome::AuthenticationFailed
            };
            responder.fulfill(outcome);
        });
    }

    fn cancel(&self, session: HostSession) {
        // A presented prompt cannot be dismissed through this backend; the
        // evaluation thread finishes when the user or the system resolves it.
        warn!(session = session.raw(), "cancel requested but unsupported by native backend");
    }
}
