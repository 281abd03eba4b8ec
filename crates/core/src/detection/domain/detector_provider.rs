use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::shared::frame::Frame;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectionError {
    #[error("failed to load {model} model: {reason}")]
    ModelLoad { model: String, reason: String },
    #[error("{check} inference failed: {reason}")]
    Inference { check: &'static str, reason: String },
}

/// What one sampled frame showed.
///
/// `restricted_object_present` is `None` when the face check already fired
/// and the object check was skipped for that frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DetectionResult {
    pub multiple_faces: bool,
    pub restricted_object_present: Option<bool>,
}

impl DetectionResult {
    pub fn is_clear(&self) -> bool {
        !self.multiple_faces && self.restricted_object_present != Some(true)
    }
}

/// The two per-frame questions the monitor asks.
///
/// `load_models` is idempotent: the first call pays the initialization
/// cost, later calls return immediately. The detect methods load on demand
/// when called first.
pub trait DetectorProvider: Send {
    fn load_models(&mut self) -> Result<(), DetectionError>;

    fn detect_multiple_faces(&mut self, frame: &Frame) -> Result<bool, DetectionError>;

    fn detect_restricted_object(&mut self, frame: &Frame) -> Result<bool, DetectionError>;
}

/// One provider shared by every session of a monitor.
pub type SharedDetectorProvider = Arc<Mutex<dyn DetectorProvider>>;
