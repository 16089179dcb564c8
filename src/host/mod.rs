//! Seam to the host authentication subsystem.
//!
//! The host (sensor hardware, secure enclave, prompt UI) is an external
//! collaborator this crate cannot inspect. Everything behind this trait is
//! treated as untrusted with respect to the crate's own guarantees: a backend
//! may complete on any thread, may complete late, or may drop a responder on
//! the floor; the exactly-once contract survives all three (see
//! [`crate::evaluation::Responder`]).

use crate::evaluation::Responder;
use crate::policy::Policy;

#[cfg(target_os = "macos")]
mod macos;
#[cfg(not(target_os = "macos"))]
mod unsupported;

mod scripted;
pub use scripted::ScriptedHost;

#[cfg(target_os = "macos")]
pub use macos::MacosHost;

/// Opaque token for one host-side authentication session. Minted by a
/// backend's `open_session`, forwarded verbatim, never interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostSession(u64);

impl HostSession {
    pub fn new(raw: u64) -> Self {
        HostSession(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// A backend capable of running local-authentication evaluations.
///
/// `begin_evaluation` must eventually consume the responder (fulfilling it or
/// dropping it); it must not block the calling thread on user interaction.
/// `cancel` is a request, not a guarantee: a backend that cannot interrupt
/// the native prompt may ignore it, in which case the in-flight evaluation
/// finishes on its own terms.
pub trait HostAuthenticator: Send + Sync {
    /// Allocate a session. `None` means resource exhaustion or missing
    /// platform support; the caller surfaces this as an allocation failure.
    fn open_session(&self) -> Option<HostSession>;

    /// Release a session. Called exactly once per successful `open_session`.
    fn close_session(&self, session: HostSession);

    /// Store the cancel-affordance label shown during subsequent evaluations.
    fn set_cancel_title(&self, session: HostSession, title: &str);

    /// Whether `policy` is currently satisfiable. Side-effect-free.
    fn can_evaluate(&self, session: HostSession, policy: Policy) -> bool;

    /// Start one evaluation. Returns immediately; the outcome is reported
    /// through `responder`, possibly from another thread.
    fn begin_evaluation(
        &self,
        session: HostSession,
        policy: Policy,
        reason: &str,
        responder: Responder,
    );

    /// Request cancellation of the session's in-flight evaluation, if any.
    fn cancel(&self, session: HostSession);
}

/// The default backend for this platform.
pub fn platform_host() -> std::sync::Arc<dyn HostAuthenticator> {
    #[cfg(target_os = "macos")]
    {
        std::sync::Arc::new(macos::MacosHost::new())
    }
    #[cfg(not(target_os = "macos"))]
    {
        std::sync::Arc::new(unsupported::UnsupportedHost)
    }
}
