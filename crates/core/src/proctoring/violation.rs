use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capture::domain::capture_provider::CaptureError;
use crate::detection::domain::detector_provider::DetectionError;
use crate::focus::focus_event::FocusEvent;

/// A rule the candidate broke, as opposed to an infrastructure failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyBreach {
    MultipleFaces,
    RestrictedObject,
    VisibilityHidden,
    FocusLost,
}

impl PolicyBreach {
    pub fn reason(self) -> &'static str {
        match self {
            Self::MultipleFaces => "Multiple faces detected",
            Self::RestrictedObject => "Mobile phone detected in frame",
            Self::VisibilityHidden => "Tab switch or window minimized detected",
            Self::FocusLost => "User switched tabs or applications",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "breach")]
pub enum ViolationKind {
    /// Capture could not be acquired at start.
    CaptureUnavailable,
    /// The live stream failed or ended mid-session.
    StreamInterrupted,
    /// A detector or its models failed under the fail-closed policy.
    DetectionFailure,
    Policy(PolicyBreach),
}

/// The single event that ends a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub reason: String,
    pub kind: ViolationKind,
    pub timestamp: DateTime<Utc>,
}

impl Violation {
    fn now(kind: ViolationKind, reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            kind,
            timestamp: Utc::now(),
        }
    }

    pub fn policy(breach: PolicyBreach) -> Self {
        Self::now(ViolationKind::Policy(breach), breach.reason())
    }

    pub fn capture_unavailable(err: &CaptureError) -> Self {
        Self::now(
            ViolationKind::CaptureUnavailable,
            format!("Error accessing camera: {err}"),
        )
    }

    pub fn stream_interrupted(err: &CaptureError) -> Self {
        Self::now(
            ViolationKind::StreamInterrupted,
            format!("Camera stream interrupted: {err}"),
        )
    }

    pub fn detection_failure(err: &DetectionError) -> Self {
        Self::now(
            ViolationKind::DetectionFailure,
            format!("Proctoring check failed: {err}"),
        )
    }

    /// The violation a focus event raises, if any. Regaining visibility or
    /// focus raises nothing.
    pub fn from_focus(event: FocusEvent) -> Option<Self> {
        match event {
            FocusEvent::VisibilityHidden => Some(Self::policy(PolicyBreach::VisibilityHidden)),
            FocusEvent::FocusLost => Some(Self::policy(PolicyBreach::FocusLost)),
            FocusEvent::VisibilityVisible | FocusEvent::FocusGained => None,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(PolicyBreach::MultipleFaces, "Multiple faces detected")]
    #[case(PolicyBreach::RestrictedObject, "Mobile phone detected in frame")]
    #[case(PolicyBreach::VisibilityHidden, "Tab switch or window minimized detected")]
    #[case(PolicyBreach::FocusLost, "User switched tabs or applications")]
    fn test_policy_reason(#[case] breach: PolicyBreach, #[case] reason: &str) {
        let violation = Violation::policy(breach);
        assert_eq!(violation.reason, reason);
        assert_eq!(violation.kind, ViolationKind::Policy(breach));
    }

    #[rstest]
    #[case(FocusEvent::VisibilityHidden, Some(PolicyBreach::VisibilityHidden))]
    #[case(FocusEvent::FocusLost, Some(PolicyBreach::FocusLost))]
    #[case(FocusEvent::VisibilityVisible, None)]
    #[case(FocusEvent::FocusGained, None)]
    fn test_from_focus(#[case] event: FocusEvent, #[case] expected: Option<PolicyBreach>) {
        let kind = Violation::from_focus(event).map(|v| v.kind);
        assert_eq!(kind, expected.map(ViolationKind::Policy));
    }

    #[test]
    fn test_capture_unavailable_carries_error() {
        let err = CaptureError::PermissionDenied("/dev/video0".into());
        let violation = Violation::capture_unavailable(&err);
        assert_eq!(violation.kind, ViolationKind::CaptureUnavailable);
        assert!(violation.reason.starts_with("Error accessing camera"));
        assert!(violation.reason.contains("/dev/video0"));
    }

    #[test]
    fn test_detection_failure_carries_error() {
        let err = DetectionError::Inference {
            check: "face",
            reason: "bad tensor".into(),
        };
        let violation = Violation::detection_failure(&err);
        assert_eq!(violation.kind, ViolationKind::DetectionFailure);
        assert!(violation.reason.contains("bad tensor"));
    }

    #[test]
    fn test_kind_serializes_tagged() {
        let json = serde_json::to_string(&ViolationKind::Policy(PolicyBreach::FocusLost)).unwrap();
        assert_eq!(json, r#"{"type":"policy","breach":"focus_lost"}"#);
        let json = serde_json::to_string(&ViolationKind::StreamInterrupted).unwrap();
        assert_eq!(json, r#"{"type":"stream_interrupted"}"#);
    }
}
