//! Bridge to the host local-authentication subsystem (biometric or
//! device-passcode verification).
//!
//! The crate owns the hard parts of talking to the native prompt machinery:
//! session lifetime, the single-flight evaluation state machine, and
//! exactly-once delivery of each evaluation's outcome. The verification
//! itself happens in the host subsystem, reached through the
//! [`host::HostAuthenticator`] seam: the native backend on macOS, a
//! scripted backend anywhere a real sensor is unavailable or unwanted.
//!
//! ```
//! use std::sync::Arc;
//! use lauth::{AuthContext, EvaluationOutcome, Policy};
//! use lauth::host::ScriptedHost;
//!
//! let host = Arc::new(ScriptedHost::new());
//! host.set_availability(Policy::BIOMETRICS, true);
//! host.script_outcome(EvaluationOutcome::Succeeded);
//!
//! let rt = tokio::runtime::Runtime::new().unwrap();
//! rt.block_on(async {
//!     let mut ctx = AuthContext::with_host(host).unwrap();
//!     ctx.set_cancel_title("Use Another Method");
//!     if ctx.can_evaluate(Policy::BIOMETRICS) {
//!         let outcome = ctx.evaluate(Policy::BIOMETRICS, "Unlock the vault").unwrap().await;
//!         assert!(outcome.is_success());
//!     }
//! });
//! ```
//!
//! A C ABI mirroring the same operations lives in [`ffi`].

pub mod context;
pub mod error;
pub mod evaluation;
pub mod ffi;
pub mod host;
pub mod outcome;
pub mod policy;

pub use context::AuthContext;
pub use error::{AuthError, AuthResult};
pub use evaluation::{PendingEvaluation, Responder};
pub use host::{platform_host, HostAuthenticator, HostSession};
pub use outcome::EvaluationOutcome;
pub use policy::Policy;
