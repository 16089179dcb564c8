//! Fallback backend for platforms without local-authentication support.
//! Session allocation fails, which callers observe as `AllocationFailed`.

use super::{HostAuthenticator, HostSession};
use crate::evaluation::Responder;
use crate::outcome::EvaluationOutcome;
use crate::policy::Policy;
use tracing::warn;

pub struct UnsupportedHost;

impl HostAuthenticator for UnsupportedHost {
    fn open_session(&self) -> Option<HostSession> {
        None
    }

    fn close_session(&self, _session: HostSession) {}

    fn set_cancel_title(&self, _session: HostSession, _title: &str) {}

    fn can_evaluate(&self, _session: HostSession, _policy: Policy) -> bool {
        false
    }

    fn begin_evaluation(
        &self,
        session: HostSession,
        _policy: Policy,
        _reason: &str,
        responder: Responder,
    ) {
        // No session can exist on this backend, so this is unreachable in
        // practice; still complete the contract rather than stranding it.
        warn!(session = session.raw(), "evaluation on unsupported platform");
        responder.fulfill(EvaluationOutcome::PolicyUnavailable);
    }

    fn cancel(&self, _session: HostSession) {}
}
