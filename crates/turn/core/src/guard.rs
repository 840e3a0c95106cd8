//! Turn advance guard.
//!
//! Decides whether the current epoch may end. An epoch ends only when the
//! barrier has nothing pending and no tracked unit still carries an
//! in-progress marker. When that does not hold at the end of a phase the
//! guard dumps the barrier, force-clears residual markers and, if that was
//! not enough, arms a single delayed retry.
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::barrier::TurnBarrier;
use crate::state::{ActionMarker, Epoch, MarkerSet, UnitId, UnitRoster};

/// Reason an epoch may not end yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AdvanceBlocker {
    /// No barrier was available to ask.
    BarrierUnavailable,
    /// A tracked unit has no action-state component, so its markers are unknown.
    MissingActionState(UnitId),
    /// Registered actions are still pending.
    BarrierBusy,
    /// At least one tracked unit still carries an in-progress marker.
    MarkersInProgress,
}

impl fmt::Display for AdvanceBlocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BarrierUnavailable => f.write_str("barrier unavailable"),
            Self::MissingActionState(unit) => write!(f, "{unit} has no action state"),
            Self::BarrierBusy => f.write_str("barrier busy"),
            Self::MarkersInProgress => f.write_str("markers in progress"),
        }
    }
}

/// Outcome of a single advance check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AdvanceCheck {
    pub epoch: Epoch,
    pub barrier_quiet: bool,
    pub pending_actions: usize,
    pub in_progress: u32,
    pub blocker: Option<AdvanceBlocker>,
}

impl AdvanceCheck {
    pub fn can_advance(&self) -> bool {
        self.blocker.is_none()
    }

    /// Hard blocks cannot be resolved by clearing markers.
    pub fn is_hard_block(&self) -> bool {
        matches!(
            self.blocker,
            Some(AdvanceBlocker::BarrierUnavailable | AdvanceBlocker::MissingActionState(_))
        )
    }

    fn blocked(epoch: Epoch, blocker: AdvanceBlocker) -> Self {
        Self {
            epoch,
            barrier_quiet: false,
            pending_actions: 0,
            in_progress: 0,
            blocker: Some(blocker),
        }
    }
}

/// What the host should do after an end-of-phase evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhaseEndDecision {
    /// Advance the epoch now. `forced_clear` is set when residual markers had
    /// to be cleared to get here.
    Advance { forced_clear: bool },
    /// Call [`TurnAdvanceGuard::on_retry_fired`] and re-run the end of phase
    /// after `delay`.
    RetryScheduled { delay: Duration },
    /// A retry is already armed; nothing to do.
    RetrySuppressed,
    /// The armed retry ran and the epoch is still blocked.
    Stalled { check: AdvanceCheck },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum RetryState {
    #[default]
    Idle,
    Pending,
    /// The retry fired; its re-evaluation is the last one for this phase.
    Spent,
}

/// Counters for forced clears and retries.
///
/// Atomics so hosts can read them from other threads while the guard keeps
/// running on its owning task.
#[derive(Debug, Default)]
pub struct GuardMetrics {
    /// Phase ends that needed a forced residual-marker clear
    forced_clears: AtomicU64,

    /// Total marker instances removed by forced clears
    markers_cleared: AtomicU64,

    retries_scheduled: AtomicU64,
    retries_suppressed: AtomicU64,

    /// Retries that ran and still found the epoch blocked
    stalls: AtomicU64,
}

impl GuardMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_forced_clear(&self, markers: u64) {
        self.forced_clears.fetch_add(1, Ordering::Relaxed);
        self.markers_cleared.fetch_add(markers, Ordering::Relaxed);
    }

    fn record_retry_scheduled(&self) {
        self.retries_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    fn record_retry_suppressed(&self) {
        self.retries_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_stall(&self) {
        self.stalls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn forced_clears(&self) -> u64 {
        self.forced_clears.load(Ordering::Relaxed)
    }

    pub fn markers_cleared(&self) -> u64 {
        self.markers_cleared.load(Ordering::Relaxed)
    }

    pub fn retries_scheduled(&self) -> u64 {
        self.retries_scheduled.load(Ordering::Relaxed)
    }

    pub fn retries_suppressed(&self) -> u64 {
        self.retries_suppressed.load(Ordering::Relaxed)
    }

    pub fn stalls(&self) -> u64 {
        self.stalls.load(Ordering::Relaxed)
    }

    /// Creates a snapshot of all counters.
    ///
    /// Fields are read one by one, so a snapshot taken while the guard runs
    /// may mix values from adjacent updates.
    pub fn snapshot(&self) -> GuardMetricsSnapshot {
        GuardMetricsSnapshot {
            forced_clears: self.forced_clears(),
            markers_cleared: self.markers_cleared(),
            retries_scheduled: self.retries_scheduled(),
            retries_suppressed: self.retries_suppressed(),
            stalls: self.stalls(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GuardMetricsSnapshot {
    pub forced_clears: u64,
    pub markers_cleared: u64,
    pub retries_scheduled: u64,
    pub retries_suppressed: u64,
    pub stalls: u64,
}

impl fmt::Display for GuardMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "forced_clears={} markers_cleared={} retries={} suppressed={} stalls={}",
            self.forced_clears,
            self.markers_cleared,
            self.retries_scheduled,
            self.retries_suppressed,
            self.stalls
        )
    }
}

/// End-of-phase gatekeeper for epoch advancement.
#[derive(Debug)]
pub struct TurnAdvanceGuard {
    retry_delay: Duration,
    retry: RetryState,
    metrics: Arc<GuardMetrics>,
}

impl TurnAdvanceGuard {
    pub fn new(retry_delay: Duration) -> Self {
        Self {
            retry_delay,
            retry: RetryState::Idle,
            metrics: Arc::new(GuardMetrics::new()),
        }
    }

    pub fn metrics(&self) -> Arc<GuardMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// True while a retry is armed and has not fired yet.
    pub fn retry_pending(&self) -> bool {
        self.retry == RetryState::Pending
    }

    /// Evaluates whether `epoch` may end.
    pub fn can_advance(
        &self,
        epoch: Epoch,
        barrier: Option<&dyn TurnBarrier>,
        units: &UnitRoster,
    ) -> AdvanceCheck {
        let Some(barrier) = barrier else {
            error!(target: "turn::guard", %epoch, "barrier not available");
            return AdvanceCheck::blocked(epoch, AdvanceBlocker::BarrierUnavailable);
        };

        let barrier_quiet = barrier.is_quiescent(epoch);
        let pending_actions = if barrier_quiet {
            0
        } else {
            barrier.pending_count(epoch)
        };
        if !barrier_quiet {
            warn!(target: "turn::guard", %epoch, pending_actions, "barrier not quiescent");
        }

        let mut in_progress = 0u32;
        for unit in units.tracked() {
            let Some(state) = unit.action_state.as_ref() else {
                error!(target: "turn::guard", %epoch, unit = %unit.id, "tracked unit has no action state");
                return AdvanceCheck {
                    barrier_quiet,
                    pending_actions,
                    ..AdvanceCheck::blocked(epoch, AdvanceBlocker::MissingActionState(unit.id))
                };
            };
            in_progress += state.count(ActionMarker::InProgress);
        }
        if in_progress > 0 {
            warn!(target: "turn::guard", %epoch, in_progress, "in-progress markers still active");
        }

        let blocker = if !barrier_quiet {
            Some(AdvanceBlocker::BarrierBusy)
        } else if in_progress > 0 {
            Some(AdvanceBlocker::MarkersInProgress)
        } else {
            None
        };

        match blocker {
            None => debug!(target: "turn::guard", %epoch, "advance check passed"),
            Some(blocker) => warn!(
                target: "turn::guard",
                %epoch,
                %blocker,
                pending_actions,
                in_progress,
                "advance blocked"
            ),
        }

        AdvanceCheck {
            epoch,
            barrier_quiet,
            pending_actions,
            in_progress,
            blocker,
        }
    }

    /// Runs the end-of-phase sequence for `epoch`.
    ///
    /// Residual markers are cleared in every branch that gets past the hard
    /// blocks. A failing check dumps the barrier first and advances without
    /// retry when the clear alone unblocked the epoch.
    pub fn handle_end_of_phase(
        &mut self,
        epoch: Epoch,
        barrier: Option<&dyn TurnBarrier>,
        units: &mut UnitRoster,
    ) -> PhaseEndDecision {
        let check = self.can_advance(epoch, barrier, units);

        if check.can_advance() {
            let forced = self.clear_residual(epoch, units);
            info!(target: "turn::guard", %epoch, "end of phase: advancing");
            return PhaseEndDecision::Advance {
                forced_clear: forced,
            };
        }

        if let Some(barrier) = barrier {
            warn!(target: "turn::guard", %epoch, "barrier state:\n{}", barrier.dump(epoch));
        }

        let forced = self.clear_residual(epoch, units);

        if forced && check.barrier_quiet && check.in_progress > 0 {
            let recheck = self.can_advance(epoch, barrier, units);
            if recheck.can_advance() {
                warn!(
                    target: "turn::guard",
                    %epoch,
                    "residual markers cleared, advancing without retry"
                );
                return PhaseEndDecision::Advance { forced_clear: true };
            }
        }

        self.schedule_retry(check)
    }

    /// Marks the armed retry as fired. The host calls this right before
    /// re-running [`handle_end_of_phase`](Self::handle_end_of_phase).
    pub fn on_retry_fired(&mut self) {
        if self.retry == RetryState::Pending {
            self.retry = RetryState::Spent;
        }
    }

    /// Resets retry bookkeeping once the epoch actually advanced.
    pub fn reset_on_advance(&mut self) {
        self.retry = RetryState::Idle;
    }

    fn schedule_retry(&mut self, check: AdvanceCheck) -> PhaseEndDecision {
        match self.retry {
            RetryState::Idle => {
                self.retry = RetryState::Pending;
                self.metrics.record_retry_scheduled();
                warn!(
                    target: "turn::guard",
                    epoch = %check.epoch,
                    delay_ms = u64::try_from(self.retry_delay.as_millis()).unwrap_or(u64::MAX),
                    "end of phase blocked, retry scheduled"
                );
                PhaseEndDecision::RetryScheduled {
                    delay: self.retry_delay,
                }
            }
            RetryState::Pending => {
                self.metrics.record_retry_suppressed();
                debug!(target: "turn::guard", epoch = %check.epoch, "retry suppressed (already posted)");
                PhaseEndDecision::RetrySuppressed
            }
            RetryState::Spent => {
                self.retry = RetryState::Idle;
                self.metrics.record_stall();
                error!(
                    target: "turn::guard",
                    epoch = %check.epoch,
                    pending_actions = check.pending_actions,
                    in_progress = check.in_progress,
                    "end of phase still blocked after retry"
                );
                PhaseEndDecision::Stalled { check }
            }
        }
    }

    fn clear_residual(&self, epoch: Epoch, units: &mut UnitRoster) -> bool {
        let cleared = units.clear_markers(MarkerSet::RESIDUAL);
        if cleared.is_empty() {
            return false;
        }

        let mut total = 0u64;
        for entry in &cleared {
            total += u64::from(entry.removed.total());
            warn!(
                target: "turn::guard",
                %epoch,
                unit = %entry.unit,
                removed = %entry.removed,
                "forced residual marker clear"
            );
        }
        self.metrics.record_forced_clear(total);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::barrier::ActionBarrier;
    use crate::state::{Cell, Controller, UnitState};

    const EPOCH: Epoch = Epoch(3);

    fn setup() -> (ActionBarrier, UnitRoster, TurnAdvanceGuard) {
        let mut barrier = ActionBarrier::new();
        barrier.begin_epoch(EPOCH);
        let mut units = UnitRoster::new();
        units.insert(UnitState::new(UnitId::PLAYER, Controller::Player, Cell::new(0, 0)));
        units.insert(UnitState::new(UnitId(1), Controller::Ai, Cell::new(2, 2)));
        (barrier, units, TurnAdvanceGuard::new(Duration::from_millis(500)))
    }

    fn mark(units: &mut UnitRoster, unit: UnitId, marker: ActionMarker) {
        units.action_state_mut(unit).unwrap().add_marker(marker);
    }

    #[test]
    fn quiet_epoch_advances_and_still_clears_residue() {
        let (barrier, mut units, mut guard) = setup();
        mark(&mut units, UnitId(1), ActionMarker::Moving);

        let decision = guard.handle_end_of_phase(EPOCH, Some(&barrier), &mut units);

        assert_eq!(decision, PhaseEndDecision::Advance { forced_clear: true });
        assert!(units.marker_totals().is_empty());
        assert_eq!(guard.metrics().forced_clears(), 1);
    }

    #[test]
    fn missing_barrier_is_a_hard_block() {
        let (_, units, guard) = setup();
        let check = guard.can_advance(EPOCH, None, &units);
        assert_eq!(check.blocker, Some(AdvanceBlocker::BarrierUnavailable));
        assert!(check.is_hard_block());
    }

    #[test]
    fn missing_action_state_is_a_hard_block() {
        let (barrier, mut units, guard) = setup();
        units.insert(
            UnitState::new(UnitId(7), Controller::Ai, Cell::new(4, 4)).without_action_state(),
        );

        let check = guard.can_advance(EPOCH, Some(&barrier), &units);
        assert_eq!(check.blocker, Some(AdvanceBlocker::MissingActionState(UnitId(7))));
        assert!(!check.can_advance());
    }

    #[test]
    fn residual_in_progress_clear_advances_without_retry() {
        let (barrier, mut units, mut guard) = setup();
        mark(&mut units, UnitId::PLAYER, ActionMarker::InProgress);
        mark(&mut units, UnitId::PLAYER, ActionMarker::InProgress);

        let check = guard.can_advance(EPOCH, Some(&barrier), &units);
        assert_eq!(check.blocker, Some(AdvanceBlocker::MarkersInProgress));
        assert_eq!(check.in_progress, 2);

        let decision = guard.handle_end_of_phase(EPOCH, Some(&barrier), &mut units);
        assert_eq!(decision, PhaseEndDecision::Advance { forced_clear: true });
        assert_eq!(guard.metrics().markers_cleared(), 2);
        assert_eq!(guard.metrics().retries_scheduled(), 0);
    }

    #[test]
    fn pending_action_schedules_a_single_retry_then_stalls() {
        let (mut barrier, mut units, mut guard) = setup();
        let id = barrier.register_action(UnitId(1), EPOCH);

        let first = guard.handle_end_of_phase(EPOCH, Some(&barrier), &mut units);
        assert_eq!(
            first,
            PhaseEndDecision::RetryScheduled {
                delay: Duration::from_millis(500)
            }
        );
        assert!(guard.retry_pending());

        let again = guard.handle_end_of_phase(EPOCH, Some(&barrier), &mut units);
        assert_eq!(again, PhaseEndDecision::RetrySuppressed);

        guard.on_retry_fired();
        let stalled = guard.handle_end_of_phase(EPOCH, Some(&barrier), &mut units);
        let PhaseEndDecision::Stalled { check } = stalled else {
            panic!("expected stall, got {stalled:?}");
        };
        assert_eq!(check.pending_actions, 1);

        let metrics = guard.metrics().snapshot();
        assert_eq!(metrics.retries_scheduled, 1);
        assert_eq!(metrics.retries_suppressed, 1);
        assert_eq!(metrics.stalls, 1);

        barrier.complete_action(UnitId(1), EPOCH, id);
        let late = guard.handle_end_of_phase(EPOCH, Some(&barrier), &mut units);
        assert_eq!(late, PhaseEndDecision::Advance { forced_clear: false });
    }

    #[test]
    fn retry_that_finds_the_epoch_drained_advances() {
        let (mut barrier, mut units, mut guard) = setup();
        let id = barrier.register_action(UnitId(1), EPOCH);

        guard.handle_end_of_phase(EPOCH, Some(&barrier), &mut units);
        barrier.complete_action(UnitId(1), EPOCH, id);

        guard.on_retry_fired();
        let decision = guard.handle_end_of_phase(EPOCH, Some(&barrier), &mut units);
        assert_eq!(decision, PhaseEndDecision::Advance { forced_clear: false });

        guard.reset_on_advance();
        assert!(!guard.retry_pending());
    }

    #[test]
    fn markers_on_fixtures_do_not_block() {
        let (barrier, mut units, guard) = setup();
        units.insert(
            UnitState::new(UnitId(9), Controller::Ai, Cell::new(6, 6))
                .with_kind(crate::state::UnitKind::Fixture),
        );
        mark(&mut units, UnitId(9), ActionMarker::InProgress);

        assert!(guard.can_advance(EPOCH, Some(&barrier), &units).can_advance());
    }
}
