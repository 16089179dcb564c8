//! Terminal classification of one evaluation.
//!
//! The host reports raw signed error codes; their numbering is part of the
//! host's versioned contract and is mapped here into the small set of
//! outcomes callers actually branch on. The mapping is pure and total:
//! any code this module does not recognise becomes [`EvaluationOutcome::Unknown`]
//! with the host's diagnostic attached rather than an error.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Raw host error codes, verbatim from the host subsystem's contract.
pub mod host_code {
    pub const AUTHENTICATION_FAILED: i32 = -1;
    pub const USER_CANCEL: i32 = -2;
    pub const USER_FALLBACK: i32 = -3;
    pub const SYSTEM_CANCEL: i32 = -4;
    pub const PASSCODE_NOT_SET: i32 = -5;
    pub const BIOMETRY_NOT_AVAILABLE: i32 = -6;
    pub const BIOMETRY_NOT_ENROLLED: i32 = -7;
    pub const BIOMETRY_LOCKOUT: i32 = -8;
    pub const APP_CANCEL: i32 = -9;
    pub const INVALID_CONTEXT: i32 = -10;
    pub const WATCH_NOT_AVAILABLE: i32 = -11;
    pub const BIOMETRY_NOT_PAIRED: i32 = -12;
    pub const BIOMETRY_DISCONNECTED: i32 = -13;
    pub const NOT_INTERACTIVE: i32 = -1004;
}

/// How one evaluation ended. Delivered exactly once per accepted evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EvaluationOutcome {
    /// The user satisfied the policy.
    Succeeded,
    /// The user dismissed the prompt (cancel affordance or fallback request
    /// with no fallback configured).
    UserCanceled,
    /// The host or the context owner cancelled the attempt: app backgrounded,
    /// context destroyed mid-flight, session invalidated.
    SystemCanceled,
    /// The presented credential was rejected. Expected and retryable; the
    /// caller may start a fresh evaluation.
    AuthenticationFailed,
    /// The policy cannot currently be satisfied: hardware absent or
    /// disconnected, nothing enrolled, passcode not set, or lockout.
    PolicyUnavailable,
    /// Unclassified host failure, with the host's diagnostic message.
    Unknown { message: String },
}

impl EvaluationOutcome {
    /// Map a raw host completion (error code + optional diagnostic) into a
    /// terminal outcome. `code` is only consulted on failure.
    pub fn from_host_code(code: i32, message: Option<&str>) -> Self {
        use host_code::*;
        match code {
            AUTHENTICATION_FAILED => EvaluationOutcome::AuthenticationFailed,
            USER_CANCEL | USER_FALLBACK => EvaluationOutcome::UserCanceled,
            SYSTEM_CANCEL | APP_CANCEL | INVALID_CONTEXT => EvaluationOutcome::SystemCanceled,
            PASSCODE_NOT_SET | BIOMETRY_NOT_AVAILABLE | BIOMETRY_NOT_ENROLLED
            | BIOMETRY_LOCKOUT | WATCH_NOT_AVAILABLE | BIOMETRY_NOT_PAIRED
            | BIOMETRY_DISCONNECTED => EvaluationOutcome::PolicyUnavailable,
            other => EvaluationOutcome::Unknown {
                message: match message {
                    Some(m) if !m.is_empty() => m.to_string(),
                    _ => format!("unclassified host error (code {})", other),
                },
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, EvaluationOutcome::Succeeded)
    }

    /// Whether a caller may reasonably retry with a fresh evaluation on the
    /// same policy. Unavailable policies want a fallback path instead.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EvaluationOutcome::AuthenticationFailed | EvaluationOutcome::UserCanceled
        )
    }

    /// Representative host code for the wire/FFI surface. Success maps to 0.
    pub fn host_code(&self) -> i32 {
        match self {
            EvaluationOutcome::Succeeded => 0,
            EvaluationOutcome::UserCanceled => host_code::USER_CANCEL,
            EvaluationOutcome::SystemCanceled => host_code::SYSTEM_CANCEL,
            EvaluationOutcome::AuthenticationFailed => host_code::AUTHENTICATION_FAILED,
            EvaluationOutcome::PolicyUnavailable => host_code::BIOMETRY_NOT_AVAILABLE,
            EvaluationOutcome::Unknown { .. } => 0,
        }
    }

    /// Diagnostic message, if this outcome carries one.
    pub fn message(&self) -> Option<&str> {
        match self {
            EvaluationOutcome::Unknown { message } => Some(message.as_str()),
            _ => None,
        }
    }
}

impl Display for EvaluationOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            EvaluationOutcome::Succeeded => write!(f, "succeeded"),
            EvaluationOutcome::UserCanceled => write!(f, "user_canceled"),
            EvaluationOutcome::SystemCanceled => write!(f, "system_canceled"),
            EvaluationOutcome::AuthenticationFailed => write!(f, "authentication_failed"),
            EvaluationOutcome::PolicyUnavailable => write!(f, "policy_unavailable"),
            EvaluationOutcome::Unknown { message } => write!(f, "unknown: {}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_code_classification() {
        assert_eq!(
            EvaluationOutcome::from_host_code(host_code::AUTHENTICATION_FAILED, None),
            EvaluationOutcome::AuthenticationFailed
        );
        assert_eq!(
            EvaluationOutcome::from_host_code(host_code::USER_CANCEL, None),
            EvaluationOutcome::UserCanceled
        );
        assert_eq!(
            EvaluationOutcome::from_host_code(host_code::USER_FALLBACK, None),
            EvaluationOutcome::UserCanceled
        );
        for code in [host_code::SYSTEM_CANCEL, host_code::APP_CANCEL, host_code::INVALID_CONTEXT] {
            assert_eq!(
                EvaluationOutcome::from_host_code(code, None),
                EvaluationOutcome::SystemCanceled
            );
        }
        for code in [
            host_code::PASSCODE_NOT_SET,
            host_code::BIOMETRY_NOT_AVAILABLE,
            host_code::BIOMETRY_NOT_ENROLLED,
            host_code::BIOMETRY_LOCKOUT,
            host_code::WATCH_NOT_AVAILABLE,
            host_code::BIOMETRY_NOT_PAIRED,
            host_code::BIOMETRY_DISCONNECTED,
        ] {
            assert_eq!(
                EvaluationOutcome::from_host_code(code, None),
                EvaluationOutcome::PolicyUnavailable
            );
        }
    }

    #[test]
    fn unrecognised_codes_become_unknown_with_diagnostic() {
        let out = EvaluationOutcome::from_host_code(host_code::NOT_INTERACTIVE, Some("UI forbidden"));
        assert_eq!(
            out,
            EvaluationOutcome::Unknown { message: "UI forbidden".into() }
        );

        let out = EvaluationOutcome::from_host_code(-777, None);
        assert_eq!(out.message(), Some("unclassified host error (code -777)"));
    }

    #[test]
    fn retry_semantics() {
        assert!(EvaluationOutcome::AuthenticationFailed.is_retryable());
        assert!(EvaluationOutcome::UserCanceled.is_retryable());
        assert!(!EvaluationOutcome::PolicyUnavailable.is_retryable());
        assert!(!EvaluationOutcome::Succeeded.is_retryable());
        assert!(EvaluationOutcome::Succeeded.is_success());
    }

    #[test]
    fn serde_tagging_matches_error_model() {
        let v = serde_json::to_value(&EvaluationOutcome::PolicyUnavailable).unwrap();
        assert_eq!(v["type"], "policy_unavailable");
        let v = serde_json::to_value(&EvaluationOutcome::Unknown { message: "x".into() }).unwrap();
        assert_eq!(v["type"], "unknown");
        assert_eq!(v["message"], "x");
    }
}
