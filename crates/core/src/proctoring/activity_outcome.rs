use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::violation::{Violation, ViolationKind};
use super::violation_sink::ViolationSink;

#[derive(Error, Debug)]
pub enum OutcomeError {
    #[error("failed to serialize outcome: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write outcome to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// How a monitored activity ended, as recorded by the enclosing activity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActivityOutcome {
    Completed {
        finished_at: DateTime<Utc>,
    },
    Terminated {
        reason: String,
        kind: ViolationKind,
        at: DateTime<Utc>,
    },
}

impl ActivityOutcome {
    pub fn completed_now() -> Self {
        Self::Completed {
            finished_at: Utc::now(),
        }
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Terminated { reason, .. } => Some(reason),
            Self::Completed { .. } => None,
        }
    }

}

/// What the host records about one monitored activity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActivityReport {
    pub source: String,
    pub session: u64,
    pub outcome: ActivityOutcome,
}

impl ActivityReport {
    pub fn new(source: impl Into<String>, session: u64, outcome: ActivityOutcome) -> Self {
        Self {
            source: source.into(),
            session,
            outcome,
        }
    }

    pub fn to_json(&self) -> Result<String, OutcomeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: &Path) -> Result<(), OutcomeError> {
        fs::write(path, self.to_json()?).map_err(|source| OutcomeError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Report written to {}", path.display());
        Ok(())
    }
}

impl From<Violation> for ActivityOutcome {
    fn from(violation: Violation) -> Self {
        Self::Terminated {
            reason: violation.reason,
            kind: violation.kind,
            at: violation.timestamp,
        }
    }
}

/// Sink that keeps the outcome for the host to read after the session.
#[derive(Clone, Default)]
pub struct OutcomeRecorder {
    slot: Arc<Mutex<Option<ActivityOutcome>>>,
}

impl OutcomeRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink feeding this recorder.
    pub fn sink(&self) -> Box<dyn ViolationSink> {
        Box::new(self.clone())
    }

    /// `None` until the session ends.
    pub fn outcome(&self) -> Option<ActivityOutcome> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, outcome: ActivityOutcome) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(outcome);
        }
    }
}

impl ViolationSink for OutcomeRecorder {
    fn on_violation(self: Box<Self>, violation: Violation) {
        log::warn!("Activity terminated: {}", violation.reason);
        self.record(violation.into());
    }

    fn on_finish(self: Box<Self>) {
        self.record(ActivityOutcome::completed_now());
    }
}
