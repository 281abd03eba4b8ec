use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("failed to create cache directory: {0}")]
    CacheDir(#[source] std::io::Error),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write model to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not determine cache directory")]
    NoCacheDir,
    #[error("model {name} not found in {searched:?} and no download URL is configured")]
    NotFound { name: String, searched: Vec<PathBuf> },
}

/// Progress callback: `(bytes_downloaded, total_bytes)`.
/// `total_bytes` is 0 if the server didn't provide Content-Length.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send>;

/// Where a model file can come from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelSource {
    pub name: String,
    pub url: Option<String>,
}

impl ModelSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// Resolve a model file, checking the user cache and a bundled directory
/// before downloading.
///
/// Resolution order:
/// 1. User cache directory (platform-specific)
/// 2. Bundled path (for development / pre-packaged installs)
/// 3. Download from the source URL to the cache, if one is configured
pub fn resolve(
    source: &ModelSource,
    bundled_dir: Option<&Path>,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    resolve_in(&model_cache_dir()?, source, bundled_dir, progress)
}

/// Same as [`resolve`] with an explicit cache directory.
pub fn resolve_in(
    cache_dir: &Path,
    source: &ModelSource,
    bundled_dir: Option<&Path>,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    let cached_path = cache_dir.join(&source.name);
    if cached_path.exists() {
        return Ok(cached_path);
    }

    let mut searched = vec![cached_path.clone()];
    if let Some(dir) = bundled_dir {
        let bundled_path = dir.join(&source.name);
        if bundled_path.exists() {
            return Ok(bundled_path);
        }
        searched.push(bundled_path);
    }

    let Some(url) = source.url.as_deref() else {
        return Err(ModelResolveError::NotFound {
            name: source.name.clone(),
            searched,
        });
    };

    fs::create_dir_all(cache_dir).map_err(ModelResolveError::CacheDir)?;
    download(url, &cached_path, progress)?;
    Ok(cached_path)
}

/// Platform-specific model cache directory.
///
/// - macOS: `~/Library/Application Support/Proctor/models/`
/// - Linux: `$XDG_CACHE_HOME/Proctor/models/` or `~/.cache/Proctor/models/`
/// - Windows: `%LOCALAPPDATA%/Proctor/models/`
pub fn model_cache_dir() -> Result<PathBuf, ModelResolveError> {
    #[cfg(target_os = "macos")]
    {
        dirs::data_dir()
            .map(|d| d.join("Proctor").join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
    #[cfg(not(target_os = "macos"))]
    {
        dirs::cache_dir()
            .map(|d| d.join("Proctor").join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
}

fn download(url: &str, dest: &Path, progress: Option<ProgressFn>) -> Result<(), ModelResolveError> {
    let temp_path = dest.with_extension("part");

    let result = download_inner(url, dest, &temp_path, progress);

    // Clean up .part file on any error
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }

    result
}

fn download_inner(
    url: &str,
    dest: &Path,
    temp_path: &Path,
    progress: Option<ProgressFn>,
) -> Result<(), ModelResolveError> {
    let write_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| ModelResolveError::Write { path, source }
    };

    let mut response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| ModelResolveError::Download {
            url: url.to_string(),
            source: e,
        })?;

    let total = response.content_length().unwrap_or(0);
    let mut downloaded: u64 = 0;

    let mut file = fs::File::create(temp_path).map_err(write_err(temp_path))?;

    // Stream in chunks; detection models can run to hundreds of MB.
    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = response.read(&mut buf).map_err(write_err(temp_path))?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).map_err(write_err(temp_path))?;
        downloaded += n as u64;
        if let Some(ref cb) = progress {
            cb(downloaded, total);
        }
    }

    file.flush().map_err(write_err(temp_path))?;
    drop(file);

    fs::rename(temp_path, dest).map_err(write_err(dest))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_prefers_cached_file() {
        let tmp = TempDir::new().unwrap();
        let cache = tmp.path().join("cache");
        let bundled = tmp.path().join("bundled");
        fs::create_dir_all(&cache).unwrap();
        fs::create_dir_all(&bundled).unwrap();
        fs::write(cache.join("m.onnx"), b"cached").unwrap();
        fs::write(bundled.join("m.onnx"), b"bundled").unwrap();

        let path = resolve_in(&cache, &ModelSource::new("m.onnx"), Some(&bundled), None).unwrap();

        assert_eq!(path, cache.join("m.onnx"));
    }

    #[test]
    fn test_resolve_falls_back_to_bundled_file() {
        let tmp = TempDir::new().unwrap();
        let cache = tmp.path().join("cache");
        let bundled = tmp.path().join("bundled");
        fs::create_dir_all(&bundled).unwrap();
        fs::write(bundled.join("m.onnx"), b"bundled").unwrap();

        let path = resolve_in(&cache, &ModelSource::new("m.onnx"), Some(&bundled), None).unwrap();

        assert_eq!(path, bundled.join("m.onnx"));
        assert_eq!(fs::read(&path).unwrap(), b"bundled");
    }

    #[test]
    fn test_resolve_without_url_reports_searched_paths() {
        let tmp = TempDir::new().unwrap();
        let cache = tmp.path().join("cache");
        let bundled = tmp.path().join("bundled");

        let err = resolve_in(&cache, &ModelSource::new("m.onnx"), Some(&bundled), None)
            .unwrap_err();

        match err {
            ModelResolveError::NotFound { name, searched } => {
                assert_eq!(name, "m.onnx");
                assert_eq!(searched, vec![cache.join("m.onnx"), bundled.join("m.onnx")]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!cache.exists(), "cache dir must not be created without a download");
    }

    #[test]
    fn test_model_cache_dir_returns_path() {
        let path = model_cache_dir().unwrap();
        assert!(path.to_string_lossy().contains("Proctor"));
        assert!(path.to_string_lossy().contains("models"));
    }

    #[test]
    fn test_download_invalid_url_returns_error() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("model.onnx");
        let result = download("http://invalid.nonexistent.example.com/model", &dest, None);
        assert!(result.is_err());
    }

    #[test]
    fn test_download_atomic_no_partial_on_failure() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("model.onnx");
        let _ = download("http://invalid.nonexistent.example.com/model", &dest, None);
        // Neither the dest nor the .part file should exist after failure
        assert!(!dest.exists());
        assert!(!dest.with_extension("part").exists());
    }
}
