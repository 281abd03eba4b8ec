use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::detection::domain::detector_provider::DetectionError;
use crate::detection::domain::restricted_object_policy::RestrictedObjectPolicy;
use crate::shared::constants::{
    DEFAULT_FACE_CONFIDENCE, DEFAULT_MAX_OBJECT_DETECTIONS, DEFAULT_OBJECT_CONFIDENCE,
    DEFAULT_RESTRICTED_LABELS, FACE_MODEL_NAME, OBJECT_MODEL_NAME,
};
use crate::shared::model_resolver::{self, ModelSource};

use super::detector_service::{DetectorService, LoadedModels, ModelLoader};
use super::onnx_blazeface_detector::OnnxBlazefaceDetector;
use super::onnx_yolo_object_detector::OnnxYoloObjectDetector;

/// Detection settings: which models to load and how to read their output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub face_model: String,
    pub face_model_url: Option<String>,
    pub object_model: String,
    pub object_model_url: Option<String>,
    /// Searched after the user cache, before any download.
    pub models_dir: Option<PathBuf>,
    pub face_confidence: f64,
    pub object_confidence: f64,
    pub restricted_labels: Vec<String>,
    pub max_object_detections: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            face_model: FACE_MODEL_NAME.to_string(),
            face_model_url: None,
            object_model: OBJECT_MODEL_NAME.to_string(),
            object_model_url: None,
            models_dir: None,
            face_confidence: DEFAULT_FACE_CONFIDENCE,
            object_confidence: DEFAULT_OBJECT_CONFIDENCE,
            restricted_labels: DEFAULT_RESTRICTED_LABELS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_object_detections: DEFAULT_MAX_OBJECT_DETECTIONS,
        }
    }
}

impl DetectorConfig {
    pub fn face_source(&self) -> ModelSource {
        source(&self.face_model, self.face_model_url.as_deref())
    }

    pub fn object_source(&self) -> ModelSource {
        source(&self.object_model, self.object_model_url.as_deref())
    }

    pub fn policy(&self) -> RestrictedObjectPolicy {
        RestrictedObjectPolicy::new(&self.restricted_labels, self.max_object_detections)
    }
}

fn source(name: &str, url: Option<&str>) -> ModelSource {
    let source = ModelSource::new(name);
    match url {
        Some(url) => source.with_url(url),
        None => source,
    }
}

/// Resolves both model files and opens them with ONNX Runtime.
pub struct OnnxModelLoader {
    config: DetectorConfig,
    cache_dir: Option<PathBuf>,
}

impl OnnxModelLoader {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            cache_dir: None,
        }
    }

    /// Overrides the platform cache directory.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    fn resolve(&self, role: &str, source: &ModelSource) -> Result<PathBuf, DetectionError> {
        let bundled = self.config.models_dir.as_deref();
        let progress: model_resolver::ProgressFn = {
            let name = source.name.clone();
            Box::new(move |done, total| {
                if total > 0 {
                    log::debug!("Downloading {name}: {done}/{total} bytes");
                }
            })
        };
        let resolved = match &self.cache_dir {
            Some(dir) => model_resolver::resolve_in(dir, source, bundled, Some(progress)),
            None => model_resolver::resolve(source, bundled, Some(progress)),
        };
        resolved.map_err(|e| DetectionError::ModelLoad {
            model: role.to_string(),
            reason: e.to_string(),
        })
    }
}

impl ModelLoader for OnnxModelLoader {
    fn load(&self) -> Result<LoadedModels, DetectionError> {
        let face_path = self.resolve("face", &self.config.face_source())?;
        let object_path = self.resolve("object", &self.config.object_source())?;

        let faces = OnnxBlazefaceDetector::new(&face_path, self.config.face_confidence)
            .map_err(|e| load_error("face", &face_path, e))?;
        let objects = OnnxYoloObjectDetector::new(&object_path, self.config.object_confidence)
            .map_err(|e| load_error("object", &object_path, e))?;

        log::info!(
            "Loaded face model {} and object model {}",
            face_path.display(),
            object_path.display()
        );
        Ok(LoadedModels {
            faces: Box::new(faces),
            objects: Box::new(objects),
        })
    }
}

fn load_error(role: &str, path: &Path, err: Box<dyn std::error::Error>) -> DetectionError {
    DetectionError::ModelLoad {
        model: role.to_string(),
        reason: format!("{}: {err}", path.display()),
    }
}

impl DetectorService {
    /// Detector service backed by the BlazeFace and YOLO ONNX models.
    pub fn onnx(config: DetectorConfig) -> Self {
        let policy = config.policy();
        Self::new(Box::new(OnnxModelLoader::new(config)), policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::detector_provider::DetectorProvider;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_uses_bundled_names() {
        let config = DetectorConfig::default();
        assert_eq!(config.face_source(), ModelSource::new(FACE_MODEL_NAME));
        assert_eq!(config.object_source(), ModelSource::new(OBJECT_MODEL_NAME));
        assert_eq!(config.restricted_labels, vec!["cell phone", "remote"]);
    }

    #[test]
    fn test_url_carried_into_source() {
        let config = DetectorConfig {
            face_model_url: Some("https://models.local/face.onnx".into()),
            ..Default::default()
        };
        assert_eq!(
            config.face_source().url.as_deref(),
            Some("https://models.local/face.onnx")
        );
        assert!(config.object_source().url.is_none());
    }

    #[test]
    fn test_policy_from_config() {
        let config = DetectorConfig {
            restricted_labels: vec!["Book".into()],
            max_object_detections: 5,
            ..Default::default()
        };
        let policy = config.policy();
        assert!(policy.is_restricted("book"));
        assert!(!policy.is_restricted("cell phone"));
        assert_eq!(policy.max_detections(), 5);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: DetectorConfig =
            serde_json::from_str(r#"{"face_confidence": 0.8}"#).unwrap();
        assert_eq!(config.face_confidence, 0.8);
        assert_eq!(config.object_model, OBJECT_MODEL_NAME);
        assert_eq!(config.max_object_detections, DEFAULT_MAX_OBJECT_DETECTIONS);
    }

    #[test]
    fn test_missing_models_fail_load() {
        let cache = TempDir::new().unwrap();
        let bundled = TempDir::new().unwrap();
        let config = DetectorConfig {
            models_dir: Some(bundled.path().to_path_buf()),
            ..Default::default()
        };
        let loader = OnnxModelLoader::new(config.clone()).with_cache_dir(cache.path());
        let mut service = DetectorService::new(Box::new(loader), config.policy());

        match service.load_models() {
            Err(DetectionError::ModelLoad { model, reason }) => {
                assert_eq!(model, "face");
                assert!(reason.contains(FACE_MODEL_NAME));
            }
            other => panic!("expected model load failure, got {other:?}"),
        }
        assert!(!service.is_loaded());
    }
}
