use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, never, select, unbounded, Receiver, Sender};
use thiserror::Error;

use crate::capture::domain::capture_lease::CaptureLease;
use crate::capture::domain::capture_provider::{CaptureError, CaptureProvider};
use crate::detection::domain::detector_provider::{DetectionError, SharedDetectorProvider};
use crate::focus::focus_event::FocusEvent;
use crate::focus::focus_event_bus::{FocusSource, SubscriptionId};
use crate::shared::frame_normalizer::{FrameNormalizer, NormalizeError};

use super::monitor_config::{DetectorFailurePolicy, MonitorConfig};
use super::sampler::{spawn_sampler, Sampler};
use super::session::{Session, SessionState, SessionWorkers, SharedState};
use super::session_logger::{NullSessionLogger, SessionLogger};
use super::tick_scheduler::{IntervalScheduler, TickScheduler};
use super::violation::Violation;
use super::violation_sink::ViolationSink;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("a proctoring session is already running")]
    SessionActive,
    #[error("invalid sample size: {0}")]
    InvalidSampleSize(#[from] NormalizeError),
}

type SchedulerFactory = Box<dyn Fn(&MonitorConfig) -> Box<dyn TickScheduler> + Send + Sync>;
type LoggerFactory = Box<dyn Fn() -> Box<dyn SessionLogger> + Send + Sync>;

/// Watches one activity at a time for proctoring violations.
///
/// Each session gets a sampling thread that owns the capture stream and a
/// controller thread that owns the session state. The controller is the
/// only code that talks to the sink once monitoring is running; it reacts
/// to whichever comes first of a sampling violation, a focus loss or a stop.
pub struct ProctoringMonitor {
    config: MonitorConfig,
    normalizer: FrameNormalizer,
    capture: Mutex<Box<dyn CaptureProvider>>,
    detectors: SharedDetectorProvider,
    focus: Arc<dyn FocusSource>,
    schedulers: SchedulerFactory,
    loggers: LoggerFactory,
    live: Mutex<Option<SharedState>>,
    next_id: AtomicU64,
}

impl ProctoringMonitor {
    pub fn new(
        config: MonitorConfig,
        capture: Box<dyn CaptureProvider>,
        detectors: SharedDetectorProvider,
        focus: Arc<dyn FocusSource>,
    ) -> Result<Self, MonitorError> {
        let normalizer = config.normalizer()?;
        Ok(Self {
            config,
            normalizer,
            capture: Mutex::new(capture),
            detectors,
            focus,
            schedulers: Box::new(|config: &MonitorConfig| -> Box<dyn TickScheduler> {
                Box::new(IntervalScheduler::new(config.sample_interval()))
            }),
            loggers: Box::new(|| -> Box<dyn SessionLogger> { Box::new(NullSessionLogger) }),
            live: Mutex::new(None),
            next_id: AtomicU64::new(1),
        })
    }

    /// Replaces the fixed-interval scheduler used for each session.
    pub fn with_scheduler(
        mut self,
        factory: impl Fn(&MonitorConfig) -> Box<dyn TickScheduler> + Send + Sync + 'static,
    ) -> Self {
        self.schedulers = Box::new(factory);
        self
    }

    /// Gives each session its own logger from `factory`.
    pub fn with_session_logger(
        mut self,
        factory: impl Fn() -> Box<dyn SessionLogger> + Send + Sync + 'static,
    ) -> Self {
        self.loggers = Box::new(factory);
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Starts monitoring a new activity.
    ///
    /// Loads the detection models, acquires capture and starts sampling and
    /// focus watching. If models or capture are unavailable the returned
    /// session is already terminated and `sink` has been told why.
    pub fn start(&self, sink: Box<dyn ViolationSink>) -> Result<Session, MonitorError> {
        let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        if live.as_ref().is_some_and(|s| !s.get().is_final()) {
            return Err(MonitorError::SessionActive);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let state = SharedState::default();
        state.transition(SessionState::Starting);
        *live = Some(state.clone());
        drop(live);
        log::info!("Starting proctoring session {id}");

        if let Err(e) = self.load_models() {
            match self.config.on_detector_error {
                DetectorFailurePolicy::FailClosed => {
                    log::error!("{e}");
                    return Ok(fail_start(id, state, sink, Violation::detection_failure(&e)));
                }
                DetectorFailurePolicy::FailOpen => {
                    log::warn!("{e}; monitoring without detection models");
                }
            }
        }

        let acquired = self
            .capture
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .acquire(self.config.constraints);
        let stream = match acquired {
            Ok(stream) => stream,
            Err(e) => {
                log::error!("Capture unavailable: {e}");
                return Ok(fail_start(id, state, sink, Violation::capture_unavailable(&e)));
            }
        };
        let (width, height) = stream.dimensions();
        log::info!("Capture acquired ({width}x{height})");

        let (stop_tx, stop_rx) = bounded::<()>(0);
        let (halt_tx, halt_rx) = bounded::<()>(0);
        let (violation_tx, violation_rx) = bounded::<Violation>(1);
        let (focus_tx, focus_rx) = unbounded::<FocusEvent>();
        let (finished_tx, finished_rx) = bounded::<()>(0);

        let subscription = self.focus.subscribe(focus_tx);
        state.transition(SessionState::Monitoring);

        let sampler = Sampler::new(
            CaptureLease::new(stream),
            self.normalizer,
            Arc::clone(&self.detectors),
            self.config.on_detector_error,
        )
        .with_logger((self.loggers)());
        let sampler = spawn_sampler(
            sampler,
            (self.schedulers)(&self.config),
            halt_rx,
            violation_tx,
        );
        let controller = spawn_controller(Controller {
            id,
            state: state.clone(),
            sink,
            violations: violation_rx,
            focus: focus_rx,
            stop: stop_rx,
            halt: halt_tx,
            focus_source: Arc::clone(&self.focus),
            subscription,
            finished: finished_tx,
        });

        Ok(Session::new(
            id,
            state,
            finished_rx,
            Some(SessionWorkers {
                stop: stop_tx,
                controller,
                sampler,
            }),
        ))
    }

    /// Ends `session`. Idempotent; see [`Session::stop`].
    pub fn stop(&self, session: &Session) {
        session.stop();
    }

    fn load_models(&self) -> Result<(), DetectionError> {
        match self.detectors.lock() {
            Ok(mut detectors) => detectors.load_models(),
            Err(_) => Err(DetectionError::ModelLoad {
                model: "detector".into(),
                reason: "detector provider lock poisoned".into(),
            }),
        }
    }
}

fn fail_start(
    id: u64,
    state: SharedState,
    sink: Box<dyn ViolationSink>,
    violation: Violation,
) -> Session {
    state.transition(SessionState::Terminated {
        reason: violation.reason.clone(),
    });
    log::warn!("Session {id} terminated before monitoring: {}", violation.reason);
    sink.on_violation(violation);

    let (_, finished_rx) = bounded::<()>(0);
    Session::new(id, state, finished_rx, None)
}

enum Ending {
    Stopped,
    Violation(Violation),
}

/// Owns the session state machine once monitoring is running.
struct Controller {
    id: u64,
    state: SharedState,
    sink: Box<dyn ViolationSink>,
    violations: Receiver<Violation>,
    focus: Receiver<FocusEvent>,
    stop: Receiver<()>,
    /// Dropped to stop the sampling thread.
    halt: Sender<()>,
    focus_source: Arc<dyn FocusSource>,
    subscription: SubscriptionId,
    /// Dropped once the sink has been told how the session ended.
    finished: Sender<()>,
}

impl Controller {
    fn run(self) {
        let ending = self.wait_for_ending();
        let Controller {
            id,
            state,
            sink,
            halt,
            focus_source,
            subscription,
            finished,
            ..
        } = self;

        focus_source.unsubscribe(subscription);
        drop(halt);

        match ending {
            Ending::Stopped => {
                if state.transition(SessionState::Stopped) {
                    log::info!("Session {id} finished without violations");
                    sink.on_finish();
                }
            }
            Ending::Violation(violation) => {
                let reason = violation.reason.clone();
                if state.transition(SessionState::Terminated {
                    reason: reason.clone(),
                }) {
                    log::warn!("Session {id} terminated: {reason}");
                    sink.on_violation(violation);
                }
            }
        }
        drop(finished);
    }

    fn wait_for_ending(&self) -> Ending {
        let closed = never::<FocusEvent>();
        let mut focus = Some(&self.focus);
        loop {
            let event = select! {
                recv(self.stop) -> _ => return Ending::Stopped,
                recv(self.violations) -> msg => {
                    return match msg {
                        Ok(violation) => Ending::Violation(violation),
                        Err(_) => Ending::Violation(Violation::stream_interrupted(
                            &CaptureError::Interrupted("sampling loop exited".into()),
                        )),
                    };
                }
                recv(focus.unwrap_or(&closed)) -> msg => msg,
            };
            match event {
                Ok(event) => match Violation::from_focus(event) {
                    Some(violation) => {
                        log::debug!("Session {}: focus event '{event}'", self.id);
                        return Ending::Violation(violation);
                    }
                    None => log::debug!("Session {}: ignoring focus event '{event}'", self.id),
                },
                Err(_) => {
                    log::debug!("Session {}: focus source closed", self.id);
                    focus = None;
                }
            }
        }
    }
}

fn spawn_controller(controller: Controller) -> JoinHandle<()> {
    std::thread::spawn(move || controller.run())
}
