//! In-memory collaborators for exercising sessions without devices or models.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::Receiver;

use crate::capture::domain::capture_provider::{
    CaptureConstraints, CaptureError, CaptureProvider, CaptureStream, FrameRead,
};
use crate::detection::domain::detector_provider::{DetectionError, DetectorProvider};
use crate::shared::frame::Frame;

use super::session_logger::SessionLogger;
use super::tick_scheduler::{is_cancelled, TickScheduler};
use super::violation::Violation;
use super::violation_sink::ViolationSink;

#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn bump(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Stream that reports `dimensions` and yields frames of `frame_size`.
pub struct FakeStream {
    pub dimensions: (u32, u32),
    pub frame_size: (u32, u32),
    /// Reads after this many frames fail with `Interrupted`.
    pub fail_after: Option<usize>,
    /// `dimensions` reports 0x0 until this many frames were read.
    pub sized_after_reads: usize,
    pub reads: usize,
    pub releases: Counter,
}

impl FakeStream {
    pub fn new(width: u32, height: u32, releases: Counter) -> Self {
        Self {
            dimensions: (width, height),
            frame_size: (width, height),
            fail_after: None,
            sized_after_reads: 0,
            reads: 0,
            releases,
        }
    }
}

impl CaptureStream for FakeStream {
    fn dimensions(&self) -> (u32, u32) {
        if self.reads < self.sized_after_reads {
            return (0, 0);
        }
        self.dimensions
    }

    fn read_frame(&mut self) -> Result<FrameRead, CaptureError> {
        if self.fail_after.is_some_and(|n| self.reads >= n) {
            return Err(CaptureError::Interrupted("camera unplugged".into()));
        }
        let (w, h) = self.frame_size;
        let frame = Frame::new(vec![90u8; (w * h * 3) as usize], w, h, 3, self.reads);
        self.reads += 1;
        Ok(FrameRead::Frame(frame))
    }

    fn release(&mut self) {
        self.releases.bump();
    }
}

/// Provider that grants a [`FakeStream`] or fails with `error`.
pub struct FakeCapture {
    pub error: Option<CaptureError>,
    pub dimensions: (u32, u32),
    pub fail_after: Option<usize>,
    pub acquires: Counter,
    pub releases: Counter,
    pub last_constraints: Arc<Mutex<Option<CaptureConstraints>>>,
}

impl FakeCapture {
    pub fn working() -> Self {
        Self {
            error: None,
            dimensions: (640, 480),
            fail_after: None,
            acquires: Counter::default(),
            releases: Counter::default(),
            last_constraints: Arc::new(Mutex::new(None)),
        }
    }

    pub fn failing(error: CaptureError) -> Self {
        Self {
            error: Some(error),
            ..Self::working()
        }
    }
}

impl CaptureProvider for FakeCapture {
    fn acquire(
        &mut self,
        constraints: CaptureConstraints,
    ) -> Result<Box<dyn CaptureStream>, CaptureError> {
        self.acquires.bump();
        *self.last_constraints.lock().unwrap() = Some(constraints);
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        let (w, h) = self.dimensions;
        let mut stream = FakeStream::new(w, h, self.releases.clone());
        stream.fail_after = self.fail_after;
        Ok(Box::new(stream))
    }
}

type Script = Box<dyn FnMut(usize) -> Result<bool, DetectionError> + Send>;

/// Detector whose answers come from per-call scripts (1-based call number).
pub struct ScriptedDetector {
    faces: Script,
    objects: Script,
    load_error: Option<DetectionError>,
    pub loads: Counter,
    pub face_calls: Counter,
    pub object_calls: Counter,
    pub seen_sizes: Arc<Mutex<Vec<(u32, u32)>>>,
}

impl ScriptedDetector {
    pub fn clear() -> Self {
        Self {
            faces: Box::new(|_| Ok(false)),
            objects: Box::new(|_| Ok(false)),
            load_error: None,
            loads: Counter::default(),
            face_calls: Counter::default(),
            object_calls: Counter::default(),
            seen_sizes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_faces(
        mut self,
        script: impl FnMut(usize) -> Result<bool, DetectionError> + Send + 'static,
    ) -> Self {
        self.faces = Box::new(script);
        self
    }

    pub fn with_objects(
        mut self,
        script: impl FnMut(usize) -> Result<bool, DetectionError> + Send + 'static,
    ) -> Self {
        self.objects = Box::new(script);
        self
    }

    pub fn with_load_error(mut self, err: DetectionError) -> Self {
        self.load_error = Some(err);
        self
    }
}

impl DetectorProvider for ScriptedDetector {
    fn load_models(&mut self) -> Result<(), DetectionError> {
        self.loads.bump();
        match &self.load_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn detect_multiple_faces(&mut self, frame: &Frame) -> Result<bool, DetectionError> {
        assert!(frame.has_valid_dimensions(), "empty frame reached a detector");
        self.seen_sizes
            .lock()
            .unwrap()
            .push((frame.width(), frame.height()));
        let call = self.face_calls.bump();
        (self.faces)(call)
    }

    fn detect_restricted_object(&mut self, frame: &Frame) -> Result<bool, DetectionError> {
        assert!(frame.has_valid_dimensions(), "empty frame reached a detector");
        let call = self.object_calls.bump();
        (self.objects)(call)
    }
}

/// Ticks as fast as the loop runs, until cancelled.
pub struct ImmediateScheduler;

impl TickScheduler for ImmediateScheduler {
    fn next_tick(&mut self, cancel: &Receiver<()>) -> bool {
        !is_cancelled(cancel)
    }
}

/// Ticks `remaining` times, then idles until cancelled.
pub struct CountedScheduler {
    pub remaining: usize,
}

impl TickScheduler for CountedScheduler {
    fn next_tick(&mut self, cancel: &Receiver<()>) -> bool {
        if self.remaining == 0 {
            let _ = cancel.recv();
            return false;
        }
        self.remaining -= 1;
        !is_cancelled(cancel)
    }
}

#[derive(Debug, Default)]
pub struct SinkLog {
    pub violations: Vec<Violation>,
    pub finishes: usize,
}

/// Sink that records every call it receives.
#[derive(Clone, Default)]
pub struct RecordingSink(pub Arc<Mutex<SinkLog>>);

impl RecordingSink {
    pub fn boxed(&self) -> Box<dyn ViolationSink> {
        Box::new(self.clone())
    }

    pub fn violations(&self) -> Vec<Violation> {
        self.0.lock().unwrap().violations.clone()
    }

    pub fn finishes(&self) -> usize {
        self.0.lock().unwrap().finishes
    }
}

impl ViolationSink for RecordingSink {
    fn on_violation(self: Box<Self>, violation: Violation) {
        self.0.lock().unwrap().violations.push(violation);
    }

    fn on_finish(self: Box<Self>) {
        self.0.lock().unwrap().finishes += 1;
    }
}

/// Logger that keeps metrics and messages for assertions.
#[derive(Clone, Default)]
pub struct RecordingLogger {
    pub metrics: Arc<Mutex<Vec<(String, f64)>>>,
    pub messages: Arc<Mutex<Vec<String>>>,
}

impl SessionLogger for RecordingLogger {
    fn progress(&mut self, _sampled: usize, _skipped: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics.lock().unwrap().push((name.to_string(), value));
    }

    fn info(&mut self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}
