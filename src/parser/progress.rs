//! Throttled progress reporting for long-running parses.
//!
//! Events are emitted at least once per configured byte interval and at
//! least once per second while bytes are flowing, whichever comes first.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A single progress observation
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub bytes_read: u64,
    pub total_bytes: u64,
    /// 0.0..=100.0; 100 exactly once at completion
    pub percent: f64,
    pub bytes_per_second: f64,
    pub eta_seconds: Option<f64>,
    pub elapsed: Duration,
}

type Observer = Box<dyn Fn(ProgressEvent) + Send + Sync>;

struct ReporterState {
    started: Instant,
    last_emit: Instant,
    last_bytes: u64,
}

/// Emits [`ProgressEvent`]s to an observer callback with byte and wall-clock
/// throttling. Safe to call from blocking reader threads.
pub struct ProgressReporter {
    interval_bytes: u64,
    min_interval: Duration,
    total_bytes: u64,
    observer: Observer,
    state: Mutex<ReporterState>,
}

impl ProgressReporter {
    pub fn new(
        interval_bytes: u64,
        total_bytes: u64,
        observer: impl Fn(ProgressEvent) + Send + Sync + 'static,
    ) -> Self {
        let now = Instant::now();
        Self {
            interval_bytes: interval_bytes.max(1),
            min_interval: Duration::from_secs(1),
            total_bytes,
            observer: Box::new(observer),
            state: Mutex::new(ReporterState { started: now, last_emit: now, last_bytes: 0 }),
        }
    }

    /// Record the current byte position, emitting an event when due
    pub fn advance(&self, bytes_read: u64) {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let due_by_bytes = bytes_read.saturating_sub(state.last_bytes) >= self.interval_bytes;
        let due_by_time = state.last_emit.elapsed() >= self.min_interval;
        if !due_by_bytes && !due_by_time {
            return;
        }

        let event = self.build_event(&state, bytes_read);
        state.last_emit = Instant::now();
        state.last_bytes = bytes_read;
        drop(state);

        (self.observer)(event);
    }

    /// Emit the final 100% event unconditionally
    pub fn finish(&self, bytes_read: u64) {
        let state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut event = self.build_event(&state, bytes_read);
        event.percent = 100.0;
        event.eta_seconds = Some(0.0);
        drop(state);
        (self.observer)(event);
    }

    fn build_event(&self, state: &ReporterState, bytes_read: u64) -> ProgressEvent {
        let elapsed = state.started.elapsed();
        let secs = elapsed.as_secs_f64().max(1e-6);
        let rate = bytes_read as f64 / secs;
        let percent = if self.total_bytes == 0 {
            0.0
        } else {
            (bytes_read as f64 / self.total_bytes as f64 * 100.0).min(100.0)
        };
        let remaining = self.total_bytes.saturating_sub(bytes_read);
        let eta_seconds = if rate > 0.0 { Some(remaining as f64 / rate) } else { None };

        ProgressEvent {
            bytes_read,
            total_bytes: self.total_bytes,
            percent,
            bytes_per_second: rate,
            eta_seconds,
            elapsed,
        }
    }
}
