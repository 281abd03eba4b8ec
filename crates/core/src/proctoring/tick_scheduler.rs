use std::time::{Duration, Instant};

use crossbeam_channel::{select, Receiver, TryRecvError};

/// Paces the sampling loop.
///
/// `cancel` never carries messages; the session disconnects it to stop
/// sampling.
pub trait TickScheduler: Send {
    /// Blocks until the next tick. Returns `false` once `cancel` is
    /// disconnected.
    fn next_tick(&mut self, cancel: &Receiver<()>) -> bool;
}

/// Fixed-rate ticks from a crossbeam ticker. A tick that arrives while the
/// previous iteration is still running is delivered once it finishes; ticks
/// never queue up beyond that.
pub struct IntervalScheduler {
    ticker: Receiver<Instant>,
    interval: Duration,
}

impl IntervalScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            ticker: crossbeam_channel::tick(interval),
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl TickScheduler for IntervalScheduler {
    fn next_tick(&mut self, cancel: &Receiver<()>) -> bool {
        if is_cancelled(cancel) {
            return false;
        }
        select! {
            recv(cancel) -> _ => false,
            recv(self.ticker) -> tick => tick.is_ok(),
        }
    }
}

pub(crate) fn is_cancelled(cancel: &Receiver<()>) -> bool {
    matches!(cancel.try_recv(), Err(TryRecvError::Disconnected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn test_ticks_while_not_cancelled() {
        let (_cancel_tx, cancel_rx) = unbounded::<()>();
        let mut scheduler = IntervalScheduler::new(Duration::from_millis(1));
        assert!(scheduler.next_tick(&cancel_rx));
        assert!(scheduler.next_tick(&cancel_rx));
    }

    #[test]
    fn test_cancel_stops_ticking() {
        let (cancel_tx, cancel_rx) = unbounded::<()>();
        let mut scheduler = IntervalScheduler::new(Duration::from_secs(3600));
        drop(cancel_tx);
        let start = Instant::now();
        assert!(!scheduler.next_tick(&cancel_rx));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_cancel_wakes_blocked_scheduler() {
        let (cancel_tx, cancel_rx) = unbounded::<()>();
        let handle = std::thread::spawn(move || {
            let mut scheduler = IntervalScheduler::new(Duration::from_secs(3600));
            scheduler.next_tick(&cancel_rx)
        });
        std::thread::sleep(Duration::from_millis(20));
        drop(cancel_tx);
        assert!(!handle.join().unwrap());
    }
}
