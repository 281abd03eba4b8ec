use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};

use crate::capture::domain::capture_lease::CaptureLease;
use crate::capture::domain::capture_provider::FrameRead;
use crate::detection::domain::detector_provider::{
    DetectionError, DetectionResult, SharedDetectorProvider,
};
use crate::shared::frame_normalizer::FrameNormalizer;

use super::monitor_config::DetectorFailurePolicy;
use super::session_logger::{NullSessionLogger, SessionLogger};
use super::tick_scheduler::TickScheduler;
use super::violation::{PolicyBreach, Violation};

/// What one tick of the sampling loop produced.
#[derive(Debug)]
pub enum TickOutcome {
    /// No usable frame yet; detectors were not called.
    Skipped,
    Checked(DetectionResult),
    Violation(Violation),
}

/// One session's frame-sampling loop.
///
/// Owns the capture lease, so the stream is released when the sampler
/// finishes or is dropped. Each tick runs to completion before the next
/// begins: at most one inference is in flight per session.
pub struct Sampler {
    lease: CaptureLease,
    normalizer: FrameNormalizer,
    detectors: SharedDetectorProvider,
    failure_policy: DetectorFailurePolicy,
    logger: Box<dyn SessionLogger>,
    sampled: usize,
    skipped: usize,
    frame_size: Option<(u32, u32)>,
}

impl Sampler {
    pub fn new(
        lease: CaptureLease,
        normalizer: FrameNormalizer,
        detectors: SharedDetectorProvider,
        failure_policy: DetectorFailurePolicy,
    ) -> Self {
        Self {
            lease,
            normalizer,
            detectors,
            failure_policy,
            logger: Box::new(NullSessionLogger),
            sampled: 0,
            skipped: 0,
            frame_size: None,
        }
    }

    pub fn with_logger(mut self, logger: Box<dyn SessionLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Frames that reached the detectors so far.
    pub fn sampled(&self) -> usize {
        self.sampled
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Runs one iteration: dimension check, read, normalize, faces, objects.
    pub fn sample(&mut self) -> TickOutcome {
        let outcome = self.check();
        match outcome {
            TickOutcome::Skipped => self.skipped += 1,
            _ => self.sampled += 1,
        }
        self.logger.progress(self.sampled, self.skipped);
        outcome
    }

    fn check(&mut self) -> TickOutcome {
        let (width, height) = self.lease.dimensions();
        if width == 0 || height == 0 {
            // Keep pulling so a stream whose size is only known after its
            // first decoded picture can report it. Nothing reaches a detector.
            if let Err(e) = self.lease.read_frame() {
                log::error!("Capture lost: {e}");
                return TickOutcome::Violation(Violation::stream_interrupted(&e));
            }
            return TickOutcome::Skipped;
        }

        let raw = match self.lease.read_frame() {
            Ok(FrameRead::Frame(frame)) if frame.has_valid_dimensions() => frame,
            Ok(_) => return TickOutcome::Skipped,
            Err(e) => {
                log::error!("Capture lost: {e}");
                return TickOutcome::Violation(Violation::stream_interrupted(&e));
            }
        };
        self.record_frame_size(raw.width(), raw.height());

        let start = Instant::now();
        let frame = match self.normalizer.normalize(&raw) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("Skipping frame {}: {e}", raw.index());
                return TickOutcome::Skipped;
            }
        };
        self.logger.timing("normalize", elapsed_ms(start));

        let detectors = Arc::clone(&self.detectors);
        let Ok(mut detectors) = detectors.lock() else {
            let err = DetectionError::Inference {
                check: "detector",
                reason: "detector provider lock poisoned".into(),
            };
            return TickOutcome::Violation(Violation::detection_failure(&err));
        };

        let mut result = DetectionResult::default();

        let start = Instant::now();
        let faces = detectors.detect_multiple_faces(&frame);
        self.logger.timing("faces", elapsed_ms(start));
        result.multiple_faces = match settle(self.failure_policy, faces) {
            Ok(hit) => hit,
            Err(violation) => return TickOutcome::Violation(violation),
        };

        if !result.multiple_faces {
            let start = Instant::now();
            let objects = detectors.detect_restricted_object(&frame);
            self.logger.timing("objects", elapsed_ms(start));
            result.restricted_object_present = match settle(self.failure_policy, objects) {
                Ok(hit) => Some(hit),
                Err(violation) => return TickOutcome::Violation(violation),
            };
        }

        if result.is_clear() {
            return TickOutcome::Checked(result);
        }
        let breach = if result.multiple_faces {
            PolicyBreach::MultipleFaces
        } else {
            PolicyBreach::RestrictedObject
        };
        log::warn!("Frame {}: {}", frame.index(), breach.reason());
        TickOutcome::Violation(Violation::policy(breach))
    }

    /// Reports the capture resolution, announcing it when it first appears
    /// or changes.
    fn record_frame_size(&mut self, width: u32, height: u32) {
        if self.frame_size != Some((width, height)) {
            self.logger
                .info(&format!("Capture delivering {width}x{height} frames"));
            self.frame_size = Some((width, height));
        }
        self.logger.metric("frame_width", width as f64);
        self.logger.metric("frame_height", height as f64);
    }

    /// Samples on every tick until `cancel` disconnects or a violation is
    /// found, then releases capture. A violation is sent at most once.
    pub fn run(
        mut self,
        scheduler: &mut dyn TickScheduler,
        cancel: &Receiver<()>,
        violations: &Sender<Violation>,
    ) {
        while scheduler.next_tick(cancel) {
            if let TickOutcome::Violation(violation) = self.sample() {
                // The controller may already be gone after a stop.
                let _ = violations.send(violation);
                break;
            }
        }
        self.lease.release();
        self.logger.summary();
        log::debug!(
            "Sampling ended after {} frames ({} skipped)",
            self.sampled,
            self.skipped
        );
    }
}

/// Applies the failure policy to one detector answer.
fn settle(
    policy: DetectorFailurePolicy,
    result: Result<bool, DetectionError>,
) -> Result<bool, Violation> {
    match result {
        Ok(hit) => Ok(hit),
        Err(e) => match policy {
            DetectorFailurePolicy::FailClosed => {
                log::error!("{e}");
                Err(Violation::detection_failure(&e))
            }
            DetectorFailurePolicy::FailOpen => {
                log::warn!("{e}; treating check as negative");
                Ok(false)
            }
        },
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

pub(crate) fn spawn_sampler(
    sampler: Sampler,
    mut scheduler: Box<dyn TickScheduler>,
    cancel: Receiver<()>,
    violations: Sender<Violation>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        sampler.run(scheduler.as_mut(), &cancel, &violations);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::domain::capture_provider::{CaptureConstraints, CaptureProvider};
    use crate::proctoring::fakes::{
        Counter, CountedScheduler, FakeCapture, FakeStream, RecordingLogger, ScriptedDetector,
    };
    use crate::proctoring::violation::ViolationKind;
    use std::sync::Mutex;

    fn sampler_with(
        stream: FakeStream,
        detector: ScriptedDetector,
        policy: DetectorFailurePolicy,
    ) -> Sampler {
        Sampler::new(
            CaptureLease::new(Box::new(stream)),
            FrameNormalizer::default(),
            Arc::new(Mutex::new(detector)),
            policy,
        )
    }

    fn detection_error() -> DetectionError {
        DetectionError::Inference {
            check: "face",
            reason: "runtime error".into(),
        }
    }

    #[test]
    fn test_zero_dimensions_skip_without_detection() {
        let detector = ScriptedDetector::clear().with_faces(|_| Ok(true));
        let face_calls = detector.face_calls.clone();
        let stream = FakeStream::new(0, 480, Counter::default());
        let mut sampler = sampler_with(stream, detector, DetectorFailurePolicy::FailClosed);

        for _ in 0..5 {
            assert!(matches!(sampler.sample(), TickOutcome::Skipped));
        }
        assert_eq!(face_calls.get(), 0);
        assert_eq!(sampler.skipped(), 5);
        assert_eq!(sampler.sampled(), 0);
    }

    #[test]
    fn test_empty_frame_is_skipped() {
        let detector = ScriptedDetector::clear();
        let face_calls = detector.face_calls.clone();
        let mut stream = FakeStream::new(640, 480, Counter::default());
        stream.frame_size = (640, 0);
        let mut sampler = sampler_with(stream, detector, DetectorFailurePolicy::FailClosed);

        assert!(matches!(sampler.sample(), TickOutcome::Skipped));
        assert_eq!(face_calls.get(), 0);
    }

    #[test]
    fn test_clear_frame_runs_both_checks_on_normalized_frame() {
        let detector = ScriptedDetector::clear();
        let (faces, objects, sizes) = (
            detector.face_calls.clone(),
            detector.object_calls.clone(),
            detector.seen_sizes.clone(),
        );
        let stream = FakeStream::new(640, 480, Counter::default());
        let mut sampler = sampler_with(stream, detector, DetectorFailurePolicy::FailClosed);

        match sampler.sample() {
            TickOutcome::Checked(result) => assert!(result.is_clear()),
            other => panic!("expected a clear check, got {other:?}"),
        }
        assert_eq!((faces.get(), objects.get()), (1, 1));
        assert_eq!(*sizes.lock().unwrap(), vec![(224, 224)]);
    }

    #[test]
    fn test_faces_short_circuit_objects() {
        let detector = ScriptedDetector::clear()
            .with_faces(|_| Ok(true))
            .with_objects(|_| Ok(true));
        let objects = detector.object_calls.clone();
        let stream = FakeStream::new(640, 480, Counter::default());
        let mut sampler = sampler_with(stream, detector, DetectorFailurePolicy::FailClosed);

        match sampler.sample() {
            TickOutcome::Violation(v) => assert_eq!(v.reason, "Multiple faces detected"),
            other => panic!("expected a violation, got {other:?}"),
        }
        assert_eq!(objects.get(), 0);
    }

    #[test]
    fn test_restricted_object_violation() {
        let detector = ScriptedDetector::clear().with_objects(|_| Ok(true));
        let stream = FakeStream::new(640, 480, Counter::default());
        let mut sampler = sampler_with(stream, detector, DetectorFailurePolicy::FailClosed);

        match sampler.sample() {
            TickOutcome::Violation(v) => {
                assert_eq!(v.reason, "Mobile phone detected in frame");
                assert_eq!(v.kind, ViolationKind::Policy(PolicyBreach::RestrictedObject));
            }
            other => panic!("expected a violation, got {other:?}"),
        }
    }

    #[test]
    fn test_detector_error_fail_closed() {
        let detector = ScriptedDetector::clear().with_faces(|_| Err(detection_error()));
        let stream = FakeStream::new(640, 480, Counter::default());
        let mut sampler = sampler_with(stream, detector, DetectorFailurePolicy::FailClosed);

        match sampler.sample() {
            TickOutcome::Violation(v) => assert_eq!(v.kind, ViolationKind::DetectionFailure),
            other => panic!("expected a violation, got {other:?}"),
        }
    }

    #[test]
    fn test_detector_error_fail_open() {
        let detector = ScriptedDetector::clear().with_faces(|_| Err(detection_error()));
        let objects = detector.object_calls.clone();
        let stream = FakeStream::new(640, 480, Counter::default());
        let mut sampler = sampler_with(stream, detector, DetectorFailurePolicy::FailOpen);

        assert!(matches!(sampler.sample(), TickOutcome::Checked(_)));
        assert_eq!(objects.get(), 1);
    }

    #[test]
    fn test_stream_error_is_interruption() {
        let mut stream = FakeStream::new(640, 480, Counter::default());
        stream.fail_after = Some(0);
        let mut sampler =
            sampler_with(stream, ScriptedDetector::clear(), DetectorFailurePolicy::FailClosed);

        match sampler.sample() {
            TickOutcome::Violation(v) => assert_eq!(v.kind, ViolationKind::StreamInterrupted),
            other => panic!("expected a violation, got {other:?}"),
        }
    }

    #[test]
    fn test_run_stops_at_first_violation_and_releases() {
        let mut capture = FakeCapture::working();
        let releases = capture.releases.clone();
        let stream = capture.acquire(CaptureConstraints::default()).unwrap();
        let detector = ScriptedDetector::clear().with_faces(|call| Ok(call == 2));
        let face_calls = detector.face_calls.clone();
        let sampler = Sampler::new(
            CaptureLease::new(stream),
            FrameNormalizer::default(),
            Arc::new(Mutex::new(detector)),
            DetectorFailurePolicy::FailClosed,
        );
        let (_cancel_tx, cancel_rx) = crossbeam_channel::unbounded::<()>();
        let (violation_tx, violation_rx) = crossbeam_channel::unbounded();

        sampler.run(&mut CountedScheduler { remaining: 10 }, &cancel_rx, &violation_tx);

        assert_eq!(face_calls.get(), 2);
        assert_eq!(violation_rx.try_iter().count(), 1);
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn test_run_releases_on_cancel() {
        let releases = Counter::default();
        let stream = FakeStream::new(640, 480, releases.clone());
        let sampler =
            sampler_with(stream, ScriptedDetector::clear(), DetectorFailurePolicy::FailClosed);
        let (cancel_tx, cancel_rx) = crossbeam_channel::unbounded::<()>();
        let (violation_tx, violation_rx) = crossbeam_channel::unbounded();
        drop(cancel_tx);

        sampler.run(&mut CountedScheduler { remaining: 3 }, &cancel_rx, &violation_tx);

        assert!(violation_rx.try_recv().is_err());
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn test_unsized_stream_is_still_read_until_size_is_known() {
        let detector = ScriptedDetector::clear();
        let face_calls = detector.face_calls.clone();
        let mut stream = FakeStream::new(640, 480, Counter::default());
        stream.sized_after_reads = 1;
        let mut sampler = sampler_with(stream, detector, DetectorFailurePolicy::FailClosed);

        assert!(matches!(sampler.sample(), TickOutcome::Skipped));
        assert_eq!(face_calls.get(), 0);
        assert!(matches!(sampler.sample(), TickOutcome::Checked(_)));
        assert_eq!(face_calls.get(), 1);
    }

    #[test]
    fn test_unsized_stream_loss_is_interruption() {
        let mut stream = FakeStream::new(640, 480, Counter::default());
        stream.sized_after_reads = usize::MAX;
        stream.fail_after = Some(2);
        let mut sampler =
            sampler_with(stream, ScriptedDetector::clear(), DetectorFailurePolicy::FailClosed);

        assert!(matches!(sampler.sample(), TickOutcome::Skipped));
        assert!(matches!(sampler.sample(), TickOutcome::Skipped));
        match sampler.sample() {
            TickOutcome::Violation(v) => assert_eq!(v.kind, ViolationKind::StreamInterrupted),
            other => panic!("expected a violation, got {other:?}"),
        }
    }

    #[test]
    fn test_frame_size_reported_to_logger() {
        let logger = RecordingLogger::default();
        let (metrics, messages) = (logger.metrics.clone(), logger.messages.clone());
        let stream = FakeStream::new(640, 480, Counter::default());
        let mut sampler =
            sampler_with(stream, ScriptedDetector::clear(), DetectorFailurePolicy::FailClosed)
                .with_logger(Box::new(logger));

        sampler.sample();
        sampler.sample();

        assert_eq!(
            *messages.lock().unwrap(),
            vec!["Capture delivering 640x480 frames".to_string()]
        );
        let widths: Vec<f64> = metrics
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == "frame_width")
            .map(|(_, v)| *v)
            .collect();
        assert_eq!(widths, vec![640.0, 640.0]);
    }

    #[test]
    fn test_fail_open_object_error_reads_as_checked_negative() {
        let detector = ScriptedDetector::clear().with_objects(|_| Err(detection_error()));
        let stream = FakeStream::new(640, 480, Counter::default());
        let mut sampler = sampler_with(stream, detector, DetectorFailurePolicy::FailOpen);

        match sampler.sample() {
            TickOutcome::Checked(result) => {
                assert!(result.is_clear());
                assert_eq!(result.restricted_object_present, Some(false));
            }
            other => panic!("expected a clear check, got {other:?}"),
        }
    }
}
