//! Turn worker metrics and statistics.
//!
//! Tracks how many commands and completions the worker processed, how turns
//! ended, and how long they took.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Counters maintained by the turn worker.
///
/// Uses atomics for lock-free reads from clients while the worker updates.
#[derive(Debug, Default)]
pub struct RuntimeMetrics {
    /// Player commands accepted by the input gate
    commands_accepted: AtomicU64,

    /// Player commands rejected (stale ids, illegal moves, conflicts)
    commands_rejected: AtomicU64,

    /// Completion signals routed to a waiting component
    signals_handled: AtomicU64,

    /// Completion signals nothing was waiting for
    signals_ignored: AtomicU64,

    /// Epochs the guard allowed to advance
    turns_advanced: AtomicU64,

    /// Advances that had to clear residual markers first
    forced_clears: AtomicU64,

    /// End-of-phase evaluations that gave up after the retry
    stalls: AtomicU64,

    /// Sum of all turn durations, in nanoseconds
    total_turn_time_nanos: AtomicU64,

    /// Highest number of pending barrier actions observed
    peak_pending_actions: AtomicU64,
}

impl RuntimeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_command(&self, accepted: bool) {
        let counter = if accepted {
            &self.commands_accepted
        } else {
            &self.commands_rejected
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_signal(&self, handled: bool) {
        let counter = if handled {
            &self.signals_handled
        } else {
            &self.signals_ignored
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an advanced epoch and how long it ran.
    pub fn record_advance(&self, turn_time: Duration, forced_clear: bool) {
        self.turns_advanced.fetch_add(1, Ordering::Relaxed);
        self.total_turn_time_nanos
            .fetch_add(turn_time.as_nanos() as u64, Ordering::Relaxed);
        if forced_clear {
            self.forced_clears.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_stall(&self) {
        self.stalls.fetch_add(1, Ordering::Relaxed);
    }

    /// Tracks the peak number of pending actions.
    pub fn observe_pending(&self, pending: u64) {
        self.peak_pending_actions
            .fetch_max(pending, Ordering::Relaxed);
    }

    pub fn commands_accepted(&self) -> u64 {
        self.commands_accepted.load(Ordering::Relaxed)
    }

    pub fn commands_rejected(&self) -> u64 {
        self.commands_rejected.load(Ordering::Relaxed)
    }

    pub fn signals_handled(&self) -> u64 {
        self.signals_handled.load(Ordering::Relaxed)
    }

    pub fn signals_ignored(&self) -> u64 {
        self.signals_ignored.load(Ordering::Relaxed)
    }

    pub fn turns_advanced(&self) -> u64 {
        self.turns_advanced.load(Ordering::Relaxed)
    }

    pub fn forced_clears(&self) -> u64 {
        self.forced_clears.load(Ordering::Relaxed)
    }

    pub fn stalls(&self) -> u64 {
        self.stalls.load(Ordering::Relaxed)
    }

    pub fn peak_pending_actions(&self) -> u64 {
        self.peak_pending_actions.load(Ordering::Relaxed)
    }

    /// Calculates average turn duration.
    pub fn avg_turn_time(&self) -> Duration {
        let turns = self.turns_advanced();
        if turns == 0 {
            Duration::ZERO
        } else {
            let total_nanos = self.total_turn_time_nanos.load(Ordering::Relaxed);
            Duration::from_nanos(total_nanos / turns)
        }
    }

    /// Creates a snapshot of all metrics for display/logging.
    ///
    /// Individual fields are read atomically but the snapshot as a whole
    /// may mix values from before and after a concurrent update.
    pub fn snapshot(&self) -> RuntimeMetricsSnapshot {
        RuntimeMetricsSnapshot {
            commands_accepted: self.commands_accepted(),
            commands_rejected: self.commands_rejected(),
            signals_handled: self.signals_handled(),
            signals_ignored: self.signals_ignored(),
            turns_advanced: self.turns_advanced(),
            forced_clears: self.forced_clears(),
            stalls: self.stalls(),
            peak_pending_actions: self.peak_pending_actions(),
            avg_turn_time_ms: self.avg_turn_time().as_secs_f64() * 1000.0,
        }
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeMetricsSnapshot {
    pub commands_accepted: u64,
    pub commands_rejected: u64,
    pub signals_handled: u64,
    pub signals_ignored: u64,
    pub turns_advanced: u64,
    pub forced_clears: u64,
    pub stalls: u64,
    pub peak_pending_actions: u64,
    pub avg_turn_time_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_turn_time_over_advances() {
        let metrics = RuntimeMetrics::new();
        assert_eq!(metrics.avg_turn_time(), Duration::ZERO);

        metrics.record_advance(Duration::from_millis(10), false);
        metrics.record_advance(Duration::from_millis(30), true);

        assert_eq!(metrics.turns_advanced(), 2);
        assert_eq!(metrics.forced_clears(), 1);
        assert_eq!(metrics.avg_turn_time(), Duration::from_millis(20));
    }

    #[test]
    fn peak_pending_only_grows() {
        let metrics = RuntimeMetrics::new();
        metrics.observe_pending(3);
        metrics.observe_pending(1);
        assert_eq!(metrics.peak_pending_actions(), 3);
    }

    #[test]
    fn commands_and_signals_split_by_outcome() {
        let metrics = RuntimeMetrics::new();
        metrics.record_command(true);
        metrics.record_command(false);
        metrics.record_command(false);
        metrics.record_signal(false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.commands_accepted, 1);
        assert_eq!(snapshot.commands_rejected, 2);
        assert_eq!(snapshot.signals_ignored, 1);
        assert_eq!(snapshot.signals_handled, 0);
    }
}
