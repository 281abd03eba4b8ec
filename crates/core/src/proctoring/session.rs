use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

/// Where a session is in its life.
///
/// `Idle → Starting → Monitoring → Terminated | Stopped`, with
/// `Starting → Terminated` when capture or models are unavailable.
/// `Terminated` and `Stopped` are absorbing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    Starting,
    Monitoring,
    Terminated {
        reason: String,
    },
    Stopped,
}

impl SessionState {
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Terminated { .. } | Self::Stopped)
    }

    fn allows(&self, next: &SessionState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Starting)
                | (Self::Starting, Self::Monitoring)
                | (Self::Starting, Self::Terminated { .. })
                | (Self::Monitoring, Self::Terminated { .. })
                | (Self::Monitoring, Self::Stopped)
        )
    }
}

/// State shared between a session handle and its controller.
#[derive(Clone, Debug, Default)]
pub(crate) struct SharedState(Arc<Mutex<SessionState>>);

impl SharedState {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn get(&self) -> SessionState {
        self.lock().clone()
    }

    /// Moves to `next` if the transition is legal. Returns whether it moved.
    pub(crate) fn transition(&self, next: SessionState) -> bool {
        let mut state = self.lock();
        if !state.allows(&next) {
            log::debug!("Ignoring session transition {:?} -> {next:?}", *state);
            return false;
        }
        log::debug!("Session {:?} -> {next:?}", *state);
        *state = next;
        true
    }
}

/// Threads and channels behind a monitoring session.
pub(crate) struct SessionWorkers {
    /// Dropped to ask the controller to stop.
    pub stop: Sender<()>,
    pub controller: JoinHandle<()>,
    pub sampler: JoinHandle<()>,
}

/// Handle to one monitored activity.
///
/// Dropping the handle stops the session.
pub struct Session {
    id: u64,
    state: SharedState,
    /// Disconnects once the session reached a final state and the sink ran.
    finished: Receiver<()>,
    workers: Mutex<Option<SessionWorkers>>,
}

impl Session {
    pub(crate) fn new(
        id: u64,
        state: SharedState,
        finished: Receiver<()>,
        workers: Option<SessionWorkers>,
    ) -> Self {
        Self {
            id,
            state,
            finished,
            workers: Mutex::new(workers),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// Monitoring is running.
    pub fn active(&self) -> bool {
        self.state() == SessionState::Monitoring
    }

    pub fn terminated(&self) -> bool {
        matches!(self.state(), SessionState::Terminated { .. })
    }

    pub fn violation_reason(&self) -> Option<String> {
        match self.state() {
            SessionState::Terminated { reason } => Some(reason),
            _ => None,
        }
    }

    /// Blocks until the session ends by violation or stop.
    pub fn wait(&self) -> SessionState {
        let _ = self.finished.recv();
        self.state()
    }

    /// Like [`Session::wait`] with a limit. Returns `None` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<SessionState> {
        match self.finished.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => None,
            _ => Some(self.state()),
        }
    }

    /// Stops sampling, unsubscribes from focus events and releases capture.
    ///
    /// Returns once every session thread has exited. Calling it again, or
    /// after a violation already ended the session, does nothing more.
    pub fn stop(&self) {
        let workers = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(SessionWorkers {
            stop,
            controller,
            sampler,
        }) = workers
        else {
            return;
        };

        drop(stop);
        if controller.join().is_err() {
            log::error!("Session {} controller panicked", self.id);
        }
        if sampler.join().is_err() {
            log::error!("Session {} sampling thread panicked", self.id);
        }
        log::info!("Session {} stopped: {:?}", self.id, self.state());
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}
