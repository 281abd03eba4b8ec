use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use proctor_core::detection::infrastructure::onnx_model_loader::DetectorConfig;
use proctor_core::proctoring::monitor_config::MonitorConfig;

/// Settings file contents. Every field is optional in the file; command
/// line flags override what it sets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub monitor: MonitorConfig,
    pub detection: DetectorConfig,
    pub input_format: Option<String>,
    pub duration_secs: Option<u64>,
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("Proctor").join("settings.json"))
    }

    /// Loads `explicit` if given (it must exist and parse), otherwise the
    /// platform settings file if present, otherwise defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, Box<dyn std::error::Error>> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let json = fs::read_to_string(path)
            .map_err(|e| format!("Cannot read settings {}: {e}", path.display()))?;
        let settings = serde_json::from_str(&json)
            .map_err(|e| format!("Invalid settings {}: {e}", path.display()))?;
        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proctor_core::proctoring::monitor_config::DetectorFailurePolicy;
    use tempfile::TempDir;

    #[test]
    fn test_load_partial_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        fs::write(
            &path,
            r#"{
                "monitor": {"on_detector_error": "fail-open"},
                "detection": {"restricted_labels": ["cell phone", "book"]},
                "duration_secs": 30
            }"#,
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();

        assert_eq!(
            settings.monitor.on_detector_error,
            DetectorFailurePolicy::FailOpen
        );
        assert_eq!(settings.monitor.sample_width, 224);
        assert_eq!(settings.detection.restricted_labels, vec!["cell phone", "book"]);
        assert_eq!(settings.duration_secs, Some(30));
        assert!(settings.input_format.is_none());
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let tmp = TempDir::new().unwrap();
        assert!(Settings::load(Some(&tmp.path().join("nope.json"))).is_err());
    }

    #[test]
    fn test_invalid_json_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        let err = Settings::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid settings"));
    }

    #[test]
    fn test_empty_object_is_default() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        fs::write(&path, "{}").unwrap();
        assert_eq!(Settings::load_from(&path).unwrap(), Settings::default());
    }
}
