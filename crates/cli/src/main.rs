mod settings;

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;

use proctor_core::capture::domain::capture_provider::CaptureProvider;
use proctor_core::capture::infrastructure::ffmpeg_capture::FfmpegCaptureProvider;
use proctor_core::capture::infrastructure::image_capture::ImageCaptureProvider;
use proctor_core::detection::domain::detector_provider::SharedDetectorProvider;
use proctor_core::detection::infrastructure::detector_service::DetectorService;
use proctor_core::focus::focus_event::FocusEvent;
use proctor_core::focus::focus_event_bus::FocusEventBus;
use proctor_core::proctoring::activity_outcome::{
    ActivityOutcome, ActivityReport, OutcomeRecorder,
};
use proctor_core::proctoring::monitor::ProctoringMonitor;
use proctor_core::proctoring::monitor_config::DetectorFailurePolicy;
use proctor_core::proctoring::session_logger::StdoutSessionLogger;
use proctor_core::shared::constants::IMAGE_EXTENSIONS;

use settings::Settings;

const EXIT_ERROR: i32 = 1;
const EXIT_TERMINATED: i32 = 2;

/// Watches a camera, video or image for proctoring violations.
#[derive(Parser)]
#[command(name = "proctor")]
struct Cli {
    /// Capture source: a device (e.g. /dev/video0), a video file or an image.
    input: String,

    /// ffmpeg input format for devices (v4l2, avfoundation, dshow).
    #[arg(long)]
    input_format: Option<String>,

    /// Stop normally after this many seconds.
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Milliseconds between sampled frames.
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Detector input size as WIDTHxHEIGHT.
    #[arg(long, value_parser = parse_size)]
    sample_size: Option<(u32, u32)>,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long)]
    face_confidence: Option<f64>,

    /// Object detection confidence threshold (0.0-1.0).
    #[arg(long)]
    object_confidence: Option<f64>,

    /// Object labels that end the activity (comma-separated).
    #[arg(long, value_delimiter = ',')]
    restricted_labels: Option<Vec<String>>,

    /// What a detector error does: fail-closed or fail-open.
    #[arg(long)]
    on_detector_error: Option<DetectorFailurePolicy>,

    /// Do not require an audio track.
    #[arg(long)]
    no_audio: bool,

    /// Directory searched for model files after the user cache.
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// Read focus events (hidden, visible, blur, focus) from stdin, one per line.
    #[arg(long)]
    focus_stdin: bool,

    /// Write the activity outcome as JSON to this file.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Settings file (defaults to the platform config directory).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log a per-stage timing summary when the session ends.
    #[arg(long)]
    stats: bool,
}

fn main() {
    env_logger::init();

    match run() {
        Ok(outcome) => {
            if let Some(reason) = outcome.reason() {
                eprintln!("Activity terminated: {reason}");
                process::exit(EXIT_TERMINATED);
            }
            eprintln!("Activity completed without violations");
        }
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(EXIT_ERROR);
        }
    }
}

fn run() -> Result<ActivityOutcome, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;
    apply_overrides(&cli, &mut settings);
    if is_image(Path::new(&cli.input)) && settings.monitor.constraints.audio {
        log::info!("Still images have no audio track; capturing video only");
        settings.monitor.constraints.audio = false;
    }
    validate(&settings)?;

    let capture = build_capture(&cli.input, settings.input_format.as_deref());
    let detectors: SharedDetectorProvider =
        Arc::new(Mutex::new(DetectorService::onnx(settings.detection.clone())));
    let bus = FocusEventBus::new();

    let mut monitor =
        ProctoringMonitor::new(settings.monitor.clone(), capture, detectors, Arc::new(bus.clone()))?;
    if cli.stats {
        monitor = monitor.with_session_logger(|| Box::new(StdoutSessionLogger::default()));
    }

    let recorder = OutcomeRecorder::new();
    let session = monitor.start(recorder.sink())?;
    if session.active() {
        log::info!("Monitoring {}", cli.input);
        if cli.focus_stdin {
            spawn_focus_reader(bus);
        }
        match settings.duration_secs {
            Some(secs) => {
                if session.wait_timeout(Duration::from_secs(secs)).is_none() {
                    log::info!("Activity time limit of {secs}s reached");
                }
            }
            None => {
                session.wait();
            }
        }
    }
    monitor.stop(&session);

    let outcome = recorder
        .outcome()
        .unwrap_or_else(ActivityOutcome::completed_now);
    if let Some(path) = &cli.report {
        ActivityReport::new(cli.input.as_str(), session.id(), outcome.clone())
            .write_json(path)?;
    }
    Ok(outcome)
}

fn apply_overrides(cli: &Cli, settings: &mut Settings) {
    if let Some(format) = &cli.input_format {
        settings.input_format = Some(format.clone());
    }
    if let Some(secs) = cli.duration_secs {
        settings.duration_secs = Some(secs);
    }
    if let Some(ms) = cli.interval_ms {
        settings.monitor.sample_interval_ms = ms;
    }
    if let Some((width, height)) = cli.sample_size {
        settings.monitor.sample_width = width;
        settings.monitor.sample_height = height;
    }
    if let Some(policy) = cli.on_detector_error {
        settings.monitor.on_detector_error = policy;
    }
    if cli.no_audio {
        settings.monitor.constraints.audio = false;
    }
    if let Some(confidence) = cli.face_confidence {
        settings.detection.face_confidence = confidence;
    }
    if let Some(confidence) = cli.object_confidence {
        settings.detection.object_confidence = confidence;
    }
    if let Some(labels) = &cli.restricted_labels {
        settings.detection.restricted_labels = labels.clone();
    }
    if let Some(dir) = &cli.models_dir {
        settings.detection.models_dir = Some(dir.clone());
    }
}

fn validate(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let detection = &settings.detection;
    for (name, value) in [
        ("Face confidence", detection.face_confidence),
        ("Object confidence", detection.object_confidence),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(format!("{name} must be between 0.0 and 1.0, got {value}").into());
        }
    }
    if detection.restricted_labels.iter().all(|l| l.trim().is_empty()) {
        return Err("At least one restricted label is required".into());
    }
    if settings.monitor.sample_width == 0 || settings.monitor.sample_height == 0 {
        return Err("Sample size must be non-zero".into());
    }
    if !settings.monitor.constraints.video {
        return Err("Video capture cannot be disabled".into());
    }
    if settings.duration_secs == Some(0) {
        return Err("Duration must be at least one second".into());
    }
    Ok(())
}

fn build_capture(input: &str, input_format: Option<&str>) -> Box<dyn CaptureProvider> {
    if is_image(Path::new(input)) {
        return Box::new(ImageCaptureProvider::new(input));
    }
    let provider = FfmpegCaptureProvider::new(input);
    match input_format {
        Some(format) => Box::new(provider.with_input_format(format)),
        None => Box::new(provider),
    }
}

fn spawn_focus_reader(bus: FocusEventBus) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<FocusEvent>() {
                Ok(event) => bus.publish(event),
                Err(e) => log::warn!("{e}"),
            }
        }
    });
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
    let width = w.trim().parse().map_err(|_| format!("invalid width '{w}'"))?;
    let height = h.trim().parse().map_err(|_| format!("invalid height '{h}'"))?;
    Ok((width, height))
}
