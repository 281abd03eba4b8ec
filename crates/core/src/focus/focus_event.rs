use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A visibility or focus change reported by the host environment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusEvent {
    /// The activity's window was hidden or minimized.
    VisibilityHidden,
    VisibilityVisible,
    /// Input focus moved to another application.
    FocusLost,
    FocusGained,
}

impl FocusEvent {
    /// Events that end the activity when they arrive.
    pub fn is_loss(self) -> bool {
        matches!(self, Self::VisibilityHidden | Self::FocusLost)
    }
}

impl fmt::Display for FocusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::VisibilityHidden => "hidden",
            Self::VisibilityVisible => "visible",
            Self::FocusLost => "blur",
            Self::FocusGained => "focus",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("unknown focus event: {0:?}")]
pub struct ParseFocusEventError(String);

impl FromStr for FocusEvent {
    type Err = ParseFocusEventError;

    /// Accepts the browser event names (`hidden`, `visible`, `blur`, `focus`)
    /// and the variant names in snake case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hidden" | "visibility_hidden" => Ok(Self::VisibilityHidden),
            "visible" | "visibility_visible" => Ok(Self::VisibilityVisible),
            "blur" | "focus_lost" => Ok(Self::FocusLost),
            "focus" | "focus_gained" => Ok(Self::FocusGained),
            _ => Err(ParseFocusEventError(s.to_string())),
        }
    }
}
