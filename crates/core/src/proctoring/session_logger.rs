use std::collections::HashMap;
use std::time::Instant;

/// Cross-cutting observer for what a session's sampling loop does.
///
/// Keeps timing and counters out of the sampling code so the CLI can
/// report them and tests can ignore them.
pub trait SessionLogger: Send {
    /// A tick ended; `sampled` frames reached the detectors so far and
    /// `skipped` ticks had no usable frame.
    fn progress(&mut self, sampled: usize, skipped: usize);

    /// Record how long a named stage took for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a point-in-time metric, such as the capture resolution.
    fn metric(&mut self, name: &str, value: f64);

    /// Something worth telling the operator once, like a capture
    /// resolution change.
    fn info(&mut self, message: &str);

    /// Emit an end-of-session summary. Default: no-op.
    fn summary(&self) {}
}

/// Discards everything.
pub struct NullSessionLogger;

impl SessionLogger for NullSessionLogger {
    fn progress(&mut self, _sampled: usize, _skipped: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// Aggregates per-stage timings and prints a summary through `log` when
/// the session ends.
///
/// Progress lines are throttled to one every `throttle_samples` sampled
/// frames.
pub struct StdoutSessionLogger {
    throttle_samples: usize,
    timings: HashMap<String, Vec<f64>>,
    metrics: HashMap<String, Vec<f64>>,
    start_time: Instant,
    sampled: usize,
    skipped: usize,
}

impl StdoutSessionLogger {
    pub fn new(throttle_samples: usize) -> Self {
        Self {
            throttle_samples: throttle_samples.max(1),
            timings: HashMap::new(),
            metrics: HashMap::new(),
            start_time: Instant::now(),
            sampled: 0,
            skipped: 0,
        }
    }

    /// Formatted summary, or `None` if nothing was sampled or skipped.
    pub fn summary_string(&self) -> Option<String> {
        if self.sampled == 0 && self.skipped == 0 && self.timings.is_empty() {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let mut lines = vec![format!(
            "Session summary ({} sampled, {} skipped, {:.1}s total):",
            self.sampled,
            self.skipped,
            elapsed_ms / 1000.0
        )];

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &self.timings[stage];
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = average(durations);
            let max_ms = durations.iter().copied().fold(0.0, f64::max);
            lines.push(format!(
                "  {stage:10}: avg {avg_ms:6.1}ms  max {max_ms:6.1}ms  total {total_ms:7.0}ms"
            ));
        }

        let mut names: Vec<_> = self.metrics.keys().collect();
        names.sort();
        for name in names {
            lines.push(format!("  {name}: avg {:.1}", average(&self.metrics[name])));
        }

        if self.sampled > 0 && elapsed_ms > 0.0 {
            let rate = self.sampled as f64 / (elapsed_ms / 1000.0);
            lines.push(format!("  Sample rate: {rate:.1} fps"));
        }

        Some(lines.join("\n"))
    }

    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }

    pub fn metrics_for(&self, name: &str) -> Option<&[f64]> {
        self.metrics.get(name).map(|v| v.as_slice())
    }
}

fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

impl Default for StdoutSessionLogger {
    fn default() -> Self {
        Self::new(300)
    }
}

impl SessionLogger for StdoutSessionLogger {
    fn progress(&mut self, sampled: usize, skipped: usize) {
        let advanced = sampled > self.sampled;
        self.sampled = sampled;
        self.skipped = skipped;
        if advanced && sampled % self.throttle_samples == 0 {
            log::info!("Monitoring: {sampled} frames checked ({skipped} ticks skipped)");
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics.entry(name.to_string()).or_default().push(value);
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_null_logger_all_methods_are_noop() {
        let mut logger = NullSessionLogger;
        logger.progress(1, 0);
        logger.timing("faces", 5.0);
        logger.metric("face_count", 1.0);
        logger.info("hello");
        logger.summary();
    }

    #[test]
    fn test_timing_records_values() {
        let mut logger = StdoutSessionLogger::new(10);
        logger.timing("faces", 20.0);
        logger.timing("faces", 30.0);
        logger.timing("objects", 5.0);

        assert_eq!(logger.timings_for("faces").unwrap(), &[20.0, 30.0]);
        assert_eq!(logger.timings_for("objects").unwrap(), &[5.0]);
        assert!(logger.timings_for("normalize").is_none());
    }

    #[test]
    fn test_metric_average() {
        let mut logger = StdoutSessionLogger::new(10);
        logger.metric("frame_width", 640.0);
        logger.metric("frame_width", 1280.0);
        assert_relative_eq!(average(logger.metrics_for("frame_width").unwrap()), 960.0);
    }

    #[test]
    fn test_summary_lists_stages_and_counts() {
        let mut logger = StdoutSessionLogger::new(10);
        logger.progress(3, 2);
        logger.timing("faces", 12.0);
        logger.timing("objects", 30.0);

        let summary = logger.summary_string().unwrap();
        assert!(summary.contains("Session summary (3 sampled, 2 skipped"));
        assert!(summary.contains("faces"));
        assert!(summary.contains("objects"));
        assert!(summary.contains("fps"));
    }

    #[test]
    fn test_empty_summary_returns_none() {
        assert!(StdoutSessionLogger::new(10).summary_string().is_none());
    }

    #[test]
    fn test_skipped_only_session_has_summary() {
        let mut logger = StdoutSessionLogger::new(10);
        logger.progress(0, 4);
        let summary = logger.summary_string().unwrap();
        assert!(summary.contains("0 sampled, 4 skipped"));
        assert!(!summary.contains("fps"));
    }

    #[test]
    fn test_summary_includes_metrics() {
        let mut logger = StdoutSessionLogger::new(10);
        logger.progress(2, 0);
        logger.metric("frame_width", 640.0);
        logger.metric("frame_width", 640.0);

        let summary = logger.summary_string().unwrap();
        assert!(summary.contains("frame_width: avg 640.0"));
    }

    #[test]
    fn test_throttle_is_at_least_one() {
        assert_eq!(StdoutSessionLogger::new(0).throttle_samples, 1);
        assert_eq!(StdoutSessionLogger::default().throttle_samples, 300);
    }
}
