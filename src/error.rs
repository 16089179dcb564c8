//! Synchronous error taxonomy.
//!
//! Only two failures are ever reported on the calling thread: session
//! allocation and single-flight rejection. Every evaluation outcome, success
//! or failure, travels through the asynchronous completion path instead
//! (see [`crate::outcome::EvaluationOutcome`]).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthError {
    /// The host subsystem could not allocate an authentication session,
    /// either from resource exhaustion or because the platform has no
    /// local-authentication support at all.
    #[error("host subsystem could not allocate an authentication session")]
    AllocationFailed,

    /// A second evaluation was requested while one is still outstanding on
    /// the same context. Rejected synchronously; no completion is scheduled
    /// and the in-flight evaluation is unaffected.
    #[error("an evaluation is already in flight on this context")]
    EvaluationInFlight,
}

pub type AuthResult<T> = Result<T, AuthError>;
