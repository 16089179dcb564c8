//! Owned authentication session contexts.
//!
//! An [`AuthContext`] wraps one host-side session. It is move-only: the
//! session is released exactly once when the context is dropped, so
//! double-free and use-after-free are ruled out by ownership rather than by
//! documentation. Sharing a context across callers, if ever needed, is the
//! embedder's job (wrap it in its own synchronization above this layer).

use crate::error::{AuthError, AuthResult};
use crate::evaluation::{EvalCell, PendingEvaluation, Responder};
use crate::host::{platform_host, HostAuthenticator, HostSession};
use crate::policy::Policy;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Upper bound on how long teardown waits for an in-flight evaluation to be
/// completed after cancellation has been signalled. A healthy backend
/// completes promptly (the scripted host immediately, the native one as soon
/// as the prompt resolves); the bound only guards against a wedged backend.
const TEARDOWN_WAIT: Duration = Duration::from_secs(5);

/// One local-authentication session: configuration slot, single-flight
/// evaluation state, and the host session handle needed to cancel in-flight
/// work.
///
/// State machine per context: `Idle -> Evaluating -> Idle`,
/// with drop valid from either state. A second `evaluate` while one is
/// outstanding is rejected synchronously, never queued.
pub struct AuthContext {
    host: Arc<dyn HostAuthenticator>,
    session: HostSession,
    cell: Arc<EvalCell>,
    cancel_title: Option<String>,
}

impl AuthContext {
    /// Open a session against this platform's native backend.
    ///
    /// Fails with [`AuthError::AllocationFailed`] when the host cannot
    /// allocate a session: resource exhaustion, or a platform with no
    /// local-authentication support.
    pub fn new() -> AuthResult<Self> {
        Self::with_host(platform_host())
    }

    /// Open a session against an explicit backend. This is the seam tests
    /// and embedders use to substitute a scripted host.
    pub fn with_host(host: Arc<dyn HostAuthenticator>) -> AuthResult<Self> {
        let session = host.open_session().ok_or(AuthError::AllocationFailed)?;
        debug!(session = session.raw(), "authentication session opened");
        Ok(AuthContext { host, session, cell: EvalCell::new(), cancel_title: None })
    }

    /// The host session token backing this context.
    pub fn session(&self) -> HostSession {
        self.session
    }

    /// Set the localized label for the prompt's cancel affordance.
    ///
    /// Applies to the *next* evaluation; while one is in flight the call is
    /// ignored rather than applied retroactively.
    pub fn set_cancel_title(&mut self, title: &str) {
        if self.cell.is_evaluating() {
            debug!(session = self.session.raw(), "cancel title ignored while evaluating");
            return;
        }
        self.cancel_title = Some(title.to_string());
        self.host.set_cancel_title(self.session, title);
    }

    /// The configured cancel label, if any.
    pub fn cancel_title(&self) -> Option<&str> {
        self.cancel_title.as_deref()
    }

    /// Whether `policy` can currently be evaluated (hardware present,
    /// credentials enrolled, no lockout). Synchronous and side-effect-free;
    /// safe to call repeatedly, and concurrently with an outstanding
    /// evaluation on the same context. Unknown policies report false.
    pub fn can_evaluate(&self, policy: Policy) -> bool {
        self.host.can_evaluate(self.session, policy)
    }

    /// Start one asynchronous evaluation of `policy`, showing `reason` in the
    /// host's prompt.
    ///
    /// Admission is synchronous: if an evaluation is already outstanding the
    /// call returns [`AuthError::EvaluationInFlight`] and schedules nothing.
    /// On success the returned [`PendingEvaluation`] resolves with the
    /// terminal outcome exactly once (including when the outcome is a
    /// cancellation), and the context is back in the idle state by the time
    /// the outcome is observable.
    pub fn evaluate(&self, policy: Policy, reason: &str) -> AuthResult<PendingEvaluation> {
        let generation = self.cell.try_admit().inspect_err(|_| {
            debug!(session = self.session.raw(), %policy, "evaluation rejected: already in flight");
        })?;
        debug!(session = self.session.raw(), %policy, generation, "evaluation admitted");

        let (tx, rx) = oneshot::channel();
        let responder = Responder::new(tx, self.cell.clone(), generation);
        self.host.begin_evaluation(self.session, policy, reason, responder);
        Ok(PendingEvaluation::new(rx))
    }

    /// Whether an evaluation is currently outstanding.
    pub fn is_evaluating(&self) -> bool {
        self.cell.is_evaluating()
    }
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("session", &self.session)
            .field("cancel_title", &self.cancel_title)
            .finish_non_exhaustive()
    }
}

impl Drop for AuthContext {
    fn drop(&mut self) {
        if self.cell.is_evaluating() {
            // Deliver-then-free: ask the host to cancel, then hold the
            // session open until the pending responder has been consumed so
            // no completion can ever observe a released session.
            debug!(session = self.session.raw(), "cancelling in-flight evaluation on drop");
            self.host.cancel(self.session);
            if !self.cell.wait_until_idle(TEARDOWN_WAIT) {
                warn!(
                    session = self.session.raw(),
                    "in-flight evaluation did not complete within teardown bound"
                );
            }
        }
        self.host.close_session(self.session);
        debug!(session = self.session.raw(), "authentication session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ScriptedHost;
    use crate::outcome::EvaluationOutcome;

    #[test]
    fn allocation_failure_is_reported_synchronously() {
        let host = Arc::new(ScriptedHost::new());
        host.deny_allocation(true);
        match AuthContext::with_host(host) {
            Err(AuthError::AllocationFailed) => {}
            other => panic!("expected AllocationFailed, got {:?}", other),
        }
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn platform_without_support_fails_allocation() {
        assert_eq!(AuthContext::new().err(), Some(AuthError::AllocationFailed));
    }

    #[test]
    fn cancel_title_is_ignored_while_evaluating() {
        let host = Arc::new(ScriptedHost::new());
        host.set_availability(Policy::BIOMETRICS, true);
        host.hold_evaluations(true);

        let mut ctx = AuthContext::with_host(host.clone()).unwrap();
        ctx.set_cancel_title("Use Another Method");
        let session = ctx.session();
        let _pending = ctx.evaluate(Policy::BIOMETRICS, "unlock").unwrap();

        ctx.set_cancel_title("Too Late");
        assert_eq!(ctx.cancel_title(), Some("Use Another Method"));
        assert_eq!(host.title_for(session).as_deref(), Some("Use Another Method"));

        host.release_one();
    }

    #[test]
    fn session_accessor_matches_host_issued_token() {
        let host = Arc::new(ScriptedHost::new());
        let ctx = AuthContext::with_host(host).unwrap();
        assert!(ctx.session().raw() > 0);
        assert!(!ctx.is_evaluating());
    }

    #[tokio::test]
    async fn evaluation_flow_returns_to_idle() {
        let host = Arc::new(ScriptedHost::new());
        host.set_availability(Policy::DEVICE_OWNER, true);
        host.script_outcome(EvaluationOutcome::AuthenticationFailed);

        let ctx = AuthContext::with_host(host).unwrap();
        assert!(!ctx.is_evaluating());
        let outcome = ctx.evaluate(Policy::DEVICE_OWNER, "unlock").unwrap().await;
        assert_eq!(outcome, EvaluationOutcome::AuthenticationFailed);
        assert!(!ctx.is_evaluating());

        // Retryable: a fresh evaluation is admitted immediately.
        let outcome = ctx.evaluate(Policy::DEVICE_OWNER, "unlock again").unwrap().await;
        assert_eq!(outcome, EvaluationOutcome::Succeeded);
    }
}
