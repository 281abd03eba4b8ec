use std::time::Instant;

use crate::detection::domain::detector_provider::{DetectionError, DetectorProvider};
use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::object_detector::ObjectDetector;
use crate::detection::domain::restricted_object_policy::RestrictedObjectPolicy;
use crate::shared::frame::Frame;

/// The pair of inference backends the service drives.
pub struct LoadedModels {
    pub faces: Box<dyn FaceDetector>,
    pub objects: Box<dyn ObjectDetector>,
}

/// Builds the inference backends. Called at most once per service.
pub trait ModelLoader: Send {
    fn load(&self) -> Result<LoadedModels, DetectionError>;
}

/// Owns the detection models and answers the monitor's two questions.
///
/// Models are loaded lazily on the first `load_models` or detect call and
/// kept for the lifetime of the service, so one service can be shared by
/// every session a monitor runs. A failed load is not cached; the next call
/// tries again.
pub struct DetectorService {
    loader: Box<dyn ModelLoader>,
    models: Option<LoadedModels>,
    policy: RestrictedObjectPolicy,
}

impl DetectorService {
    pub fn new(loader: Box<dyn ModelLoader>, policy: RestrictedObjectPolicy) -> Self {
        Self {
            loader,
            models: None,
            policy,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.models.is_some()
    }

    pub fn policy(&self) -> &RestrictedObjectPolicy {
        &self.policy
    }

    fn models(&mut self) -> Result<&mut LoadedModels, DetectionError> {
        let models = match self.models.take() {
            Some(models) => models,
            None => {
                let start = Instant::now();
                let loaded = self.loader.load()?;
                log::info!(
                    "Detection models loaded in {:.0}ms",
                    start.elapsed().as_secs_f64() * 1000.0
                );
                loaded
            }
        };
        Ok(self.models.insert(models))
    }
}

impl DetectorProvider for DetectorService {
    fn load_models(&mut self) -> Result<(), DetectionError> {
        self.models().map(|_| ())
    }

    fn detect_multiple_faces(&mut self, frame: &Frame) -> Result<bool, DetectionError> {
        let faces = self
            .models()?
            .faces
            .detect(frame)
            .map_err(|e| DetectionError::Inference {
                check: "face",
                reason: e.to_string(),
            })?;
        log::debug!("Frame {}: {} face(s)", frame.index(), faces.len());
        Ok(faces.len() > 1)
    }

    fn detect_restricted_object(&mut self, frame: &Frame) -> Result<bool, DetectionError> {
        let detections = self
            .models()?
            .objects
            .detect(frame)
            .map_err(|e| DetectionError::Inference {
                check: "object",
                reason: e.to_string(),
            })?;
        match self.policy.find_violation(&detections) {
            Some(hit) => {
                log::debug!(
                    "Frame {}: restricted object '{}' ({:.2})",
                    frame.index(),
                    hit.label,
                    hit.score()
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
