//! Epoch, input-window and action-point bookkeeping.
use tracing::{debug, info, warn};

use crate::config::TurnConfig;
use crate::state::{Epoch, WindowId};

/// Receives turn boundary notifications (presentation, debug overlays, logs).
pub trait TurnObserver: Send {
    fn on_turn_started(&mut self, epoch: Epoch);

    fn on_turn_ended(&mut self, epoch: Epoch);
}

/// Serializable view of the coordinator's counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlowSnapshot {
    pub epoch: Epoch,
    pub window: WindowId,
    /// Zero-based count of turns advanced since the first one.
    pub turn_index: u64,
    pub action_points: u32,
    pub enemy_phase_queued: bool,
}

pub struct TurnFlowCoordinator {
    epoch: Epoch,
    window: WindowId,
    turn_index: u64,
    action_points: u32,
    action_points_per_turn: u32,
    first_turn_started: bool,
    enemy_phase_queued: bool,
    observers: Vec<Box<dyn TurnObserver>>,
}

impl TurnFlowCoordinator {
    pub fn new(config: &TurnConfig) -> Self {
        Self {
            epoch: Epoch::NONE,
            window: WindowId::default(),
            turn_index: 0,
            action_points: 0,
            action_points_per_turn: config.action_points_per_turn,
            first_turn_started: false,
            enemy_phase_queued: false,
            observers: Vec::new(),
        }
    }

    /// Resumes from previously captured counters. The first turn counts as started.
    pub fn from_snapshot(config: &TurnConfig, snapshot: FlowSnapshot) -> Self {
        Self {
            epoch: snapshot.epoch,
            window: snapshot.window,
            turn_index: snapshot.turn_index,
            action_points: snapshot.action_points,
            action_points_per_turn: config.action_points_per_turn,
            first_turn_started: snapshot.epoch.is_started(),
            enemy_phase_queued: snapshot.enemy_phase_queued,
            observers: Vec::new(),
        }
    }

    pub fn add_observer(&mut self, observer: Box<dyn TurnObserver>) {
        self.observers.push(observer);
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn window(&self) -> WindowId {
        self.window
    }

    pub fn turn_index(&self) -> u64 {
        self.turn_index
    }

    pub fn action_points(&self) -> u32 {
        self.action_points
    }

    pub fn first_turn_started(&self) -> bool {
        self.first_turn_started
    }

    pub fn snapshot(&self) -> FlowSnapshot {
        FlowSnapshot {
            epoch: self.epoch,
            window: self.window,
            turn_index: self.turn_index,
            action_points: self.action_points,
            enemy_phase_queued: self.enemy_phase_queued,
        }
    }

    /// Starts epoch 1. Calling it again is a logged no-op.
    ///
    /// Returns `true` when this call actually started the first turn.
    pub fn start_first_turn(&mut self) -> bool {
        if self.first_turn_started {
            warn!(target: "turn::flow", epoch = %self.epoch, "first turn already started, skipping");
            return false;
        }
        self.first_turn_started = true;
        self.epoch = Epoch::FIRST;
        self.turn_index = 0;
        self.reset_action_points();
        info!(target: "turn::flow", epoch = %self.epoch, "first turn started");
        self.notify_started();
        true
    }

    /// Begins the current epoch: refills action points and notifies observers.
    pub fn start_turn(&mut self) {
        self.reset_action_points();
        info!(target: "turn::flow", epoch = %self.epoch, turn_index = self.turn_index, "turn started");
        self.notify_started();
    }

    pub fn end_turn(&mut self) {
        info!(target: "turn::flow", epoch = %self.epoch, "turn ended");
        for observer in &mut self.observers {
            observer.on_turn_ended(self.epoch);
        }
    }

    /// Moves to the next epoch. Only the advance guard's decision should lead here.
    pub fn advance_turn(&mut self) -> Epoch {
        self.epoch = self.epoch.next();
        self.turn_index += 1;
        self.enemy_phase_queued = false;
        info!(target: "turn::flow", epoch = %self.epoch, turn_index = self.turn_index, "turn advanced");
        self.epoch
    }

    /// True when `epoch` is the current one.
    pub fn is_current(&self, epoch: Epoch) -> bool {
        epoch == self.epoch
    }

    /// Mints a fresh window id for the current epoch.
    pub fn open_new_input_window(&mut self) -> WindowId {
        self.window = self.window.next();
        debug!(target: "turn::flow", epoch = %self.epoch, window = %self.window, "new input window id");
        self.window
    }

    pub fn consume_action_points(&mut self, amount: u32) {
        self.action_points = self.action_points.saturating_sub(amount);
        debug!(target: "turn::flow", amount, remaining = self.action_points, "action points consumed");
    }

    /// Restores points, capped at the per-turn budget.
    pub fn restore_action_points(&mut self, amount: u32) {
        self.action_points = self
            .action_points
            .saturating_add(amount)
            .min(self.action_points_per_turn);
        debug!(target: "turn::flow", amount, current = self.action_points, "action points restored");
    }

    pub fn has_sufficient_action_points(&self, required: u32) -> bool {
        self.action_points >= required
    }

    pub fn queue_enemy_phase(&mut self) {
        self.enemy_phase_queued = true;
        debug!(target: "turn::flow", epoch = %self.epoch, "enemy phase queued");
    }

    pub fn clear_enemy_phase_queue(&mut self) {
        self.enemy_phase_queued = false;
    }

    pub fn enemy_phase_queued(&self) -> bool {
        self.enemy_phase_queued
    }

    fn reset_action_points(&mut self) {
        self.action_points = self.action_points_per_turn;
    }

    fn notify_started(&mut self) {
        for observer in &mut self.observers {
            observer.on_turn_started(self.epoch);
        }
    }
}

impl std::fmt::Debug for TurnFlowCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnFlowCoordinator")
            .field("epoch", &self.epoch)
            .field("window", &self.window)
            .field("turn_index", &self.turn_index)
            .field("action_points", &self.action_points)
            .field("enemy_phase_queued", &self.enemy_phase_queued)
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl TurnObserver for Recorder {
        fn on_turn_started(&mut self, epoch: Epoch) {
            self.0.lock().unwrap().push(format!("start {epoch}"));
        }

        fn on_turn_ended(&mut self, epoch: Epoch) {
            self.0.lock().unwrap().push(format!("end {epoch}"));
        }
    }

    #[test]
    fn first_turn_is_started_once() {
        let mut flow = TurnFlowCoordinator::new(&TurnConfig::default());
        assert!(flow.start_first_turn());
        assert!(!flow.start_first_turn());
        assert_eq!(flow.epoch(), Epoch::FIRST);
        assert_eq!(flow.action_points(), 1);
    }

    #[test]
    fn observers_see_turn_boundaries_in_order() {
        let recorder = Recorder::default();
        let mut flow = TurnFlowCoordinator::new(&TurnConfig::default());
        flow.add_observer(Box::new(recorder.clone()));

        flow.start_first_turn();
        flow.end_turn();
        flow.advance_turn();
        flow.start_turn();

        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec!["start turn 1", "end turn 1", "start turn 2"]
        );
        assert_eq!(flow.turn_index(), 1);
    }

    #[test]
    fn window_ids_increase_across_turns() {
        let mut flow = TurnFlowCoordinator::new(&TurnConfig::default());
        flow.start_first_turn();
        let first = flow.open_new_input_window();
        let second = flow.open_new_input_window();
        flow.advance_turn();
        let third = flow.open_new_input_window();
        assert!(first < second && second < third);
    }

    #[test]
    fn action_points_are_clamped() {
        let config = TurnConfig::default().with_action_points(3);
        let mut flow = TurnFlowCoordinator::new(&config);
        flow.start_first_turn();

        flow.consume_action_points(5);
        assert_eq!(flow.action_points(), 0);
        assert!(!flow.has_sufficient_action_points(1));

        flow.restore_action_points(10);
        assert_eq!(flow.action_points(), 3);

        flow.consume_action_points(1);
        flow.start_turn();
        assert_eq!(flow.action_points(), 3);
    }

    #[test]
    fn snapshot_resume_keeps_counters() {
        let snapshot = FlowSnapshot {
            epoch: Epoch(5),
            window: WindowId(11),
            turn_index: 4,
            action_points: 1,
            enemy_phase_queued: true,
        };
        let mut flow = TurnFlowCoordinator::from_snapshot(&TurnConfig::default(), snapshot);
        assert!(flow.first_turn_started());
        assert!(!flow.start_first_turn());
        assert_eq!(flow.open_new_input_window(), WindowId(12));

        flow.advance_turn();
        assert!(!flow.enemy_phase_queued());
        assert_eq!(flow.epoch(), Epoch(6));
    }
}
