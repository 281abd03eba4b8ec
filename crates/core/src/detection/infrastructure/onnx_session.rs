use std::path::Path;

use ort::execution_providers::ExecutionProviderDispatch;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;

/// Hardware-accelerated providers to try before the CPU fallback.
pub fn preferred_execution_providers() -> Vec<ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![]
    }
}

/// Opens an ONNX model for single-frame inference.
///
/// The monitor keeps one inference in flight, so a single inter-op thread
/// is enough; intra-op parallelism uses every core.
pub fn open_session(model_path: &Path) -> Result<Session, Box<dyn std::error::Error>> {
    let intra_threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_inter_threads(1)?
        .with_intra_threads(intra_threads)?
        .with_execution_providers(preferred_execution_providers())?
        .commit_from_file(model_path)?;
    log::debug!("Opened ONNX session for {}", model_path.display());
    Ok(session)
}
