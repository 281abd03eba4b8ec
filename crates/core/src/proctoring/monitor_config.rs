use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capture::domain::capture_provider::CaptureConstraints;
use crate::shared::constants::{
    DEFAULT_SAMPLE_HEIGHT, DEFAULT_SAMPLE_INTERVAL_MS, DEFAULT_SAMPLE_WIDTH,
};
use crate::shared::frame_normalizer::{FrameNormalizer, NormalizeError};

/// What a detector error means for the session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectorFailurePolicy {
    /// The error ends the session with a detection-failure violation.
    #[default]
    FailClosed,
    /// The error is logged and the check counts as negative.
    FailOpen,
}

impl fmt::Display for DetectorFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FailClosed => f.write_str("fail-closed"),
            Self::FailOpen => f.write_str("fail-open"),
        }
    }
}

impl FromStr for DetectorFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fail-closed" | "closed" => Ok(Self::FailClosed),
            "fail-open" | "open" => Ok(Self::FailOpen),
            other => Err(format!(
                "unknown detector failure policy '{other}' (expected fail-closed or fail-open)"
            )),
        }
    }
}

/// Settings for every session a monitor starts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub sample_interval_ms: u64,
    pub sample_width: u32,
    pub sample_height: u32,
    pub constraints: CaptureConstraints,
    pub on_detector_error: DetectorFailurePolicy,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
            sample_width: DEFAULT_SAMPLE_WIDTH,
            sample_height: DEFAULT_SAMPLE_HEIGHT,
            constraints: CaptureConstraints::default(),
            on_detector_error: DetectorFailurePolicy::default(),
        }
    }
}

impl MonitorConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms.max(1))
    }

    pub fn normalizer(&self) -> Result<FrameNormalizer, NormalizeError> {
        FrameNormalizer::new(self.sample_width, self.sample_height)
    }
}
