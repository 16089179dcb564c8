//! Opaque authentication policy tokens.
//!
//! Policy numbering is owned by the host authentication subsystem and is a
//! versioned external contract. The bridge forwards raw values and never
//! branches on their meaning; the constants below are the host's published
//! enumeration, provided for caller convenience only.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// An opaque identifier for an authentication mechanism supported by the
/// host subsystem (biometric-only, biometric-or-passcode, ...).
///
/// Values outside the published enumeration are legal inputs; availability
/// checks simply report them as unsatisfiable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Policy(pub i32);

impl Policy {
    /// User authentication with biometry.
    pub const BIOMETRICS: Policy = Policy(1);
    /// User authentication with biometry, a paired watch, or the device passcode.
    pub const DEVICE_OWNER: Policy = Policy(2);
    /// User authentication with a paired watch.
    pub const WATCH: Policy = Policy(3);
    /// User authentication with either biometry or a paired watch.
    pub const BIOMETRICS_OR_WATCH: Policy = Policy(4);
    /// User authentication with wrist detection (watch-class devices).
    pub const WRIST_DETECTION: Policy = Policy(5);

    pub fn new(raw: i32) -> Self {
        Policy(raw)
    }

    /// The raw host-defined value, forwarded across the boundary unchanged.
    pub fn raw(&self) -> i32 {
        self.0
    }
}

impl Display for Policy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "policy({})", self.0)
    }
}

impl From<i32> for Policy {
    fn from(raw: i32) -> Self {
        Policy(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_values_follow_host_contract() {
        assert_eq!(Policy::BIOMETRICS.raw(), 1);
        assert_eq!(Policy::DEVICE_OWNER.raw(), 2);
        assert_eq!(Policy::WATCH.raw(), 3);
        assert_eq!(Policy::BIOMETRICS_OR_WATCH.raw(), 4);
        assert_eq!(Policy::WRIST_DETECTION.raw(), 5);
    }

    #[test]
    fn unknown_values_are_representable() {
        let p = Policy::new(9999);
        assert_eq!(p.raw(), 9999);
        assert_eq!(Policy::from(9999), p);
    }
}
