//! Action executor that plays every action as a timed tokio task.
//!
//! Starting an action returns immediately. When its duration elapses the
//! spawned task reports a [`CompletionSignal`] through the runtime's
//! completion channel, which the turn worker feeds back into the engine.
use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, error, warn};
use turn_core::{
    ActionExecutor, ActionKind, ActionMarker, ActionRequest, CompletionSignal, UnitId, WorldPos,
};

use crate::api::CompletionSender;

/// How long simulated actions take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorTiming {
    pub move_duration: Duration,
    pub attack_duration: Duration,
    /// Added once per unit id so completions from the same phase land out
    /// of submission order.
    pub stagger: Duration,
}

impl ExecutorTiming {
    pub const fn instant() -> Self {
        Self {
            move_duration: Duration::ZERO,
            attack_duration: Duration::ZERO,
            stagger: Duration::ZERO,
        }
    }

    fn delay_for(&self, kind: ActionKind, unit: UnitId) -> Duration {
        let base = match kind {
            ActionKind::Attack => self.attack_duration,
            ActionKind::Move | ActionKind::Wait => self.move_duration,
        };
        base + self.stagger * unit.0
    }
}

impl Default for ExecutorTiming {
    fn default() -> Self {
        Self {
            move_duration: Duration::from_millis(40),
            attack_duration: Duration::from_millis(25),
            stagger: Duration::from_millis(5),
        }
    }
}

/// Plays every action as a timed tokio task.
///
/// Started abilities put an `InProgress` marker on their unit and take it
/// off again right before reporting completion, so the advance guard sees
/// the same bookkeeping a real ability system would leave behind.
pub struct TaskExecutor {
    completions: CompletionSender,
    timing: ExecutorTiming,
    refused: HashSet<UnitId>,
    silent: HashSet<UnitId>,
    leaking: HashSet<UnitId>,
}

impl TaskExecutor {
    pub fn new(completions: CompletionSender, timing: ExecutorTiming) -> Self {
        Self {
            completions,
            timing,
            refused: HashSet::new(),
            silent: HashSet::new(),
            leaking: HashSet::new(),
        }
    }

    /// Units whose abilities never trigger (`start` reports zero).
    #[must_use]
    pub fn refusing(mut self, units: impl IntoIterator<Item = UnitId>) -> Self {
        self.refused.extend(units);
        self
    }

    /// Units whose actions start but never report completion.
    #[must_use]
    pub fn never_completing(mut self, units: impl IntoIterator<Item = UnitId>) -> Self {
        self.silent.extend(units);
        self
    }

    /// Units whose abilities complete but never remove their `InProgress` marker.
    #[must_use]
    pub fn leaking_markers(mut self, units: impl IntoIterator<Item = UnitId>) -> Self {
        self.leaking.extend(units);
        self
    }

    /// Sends `started` right away, then `finish` in order once `delay` elapsed.
    fn schedule(
        &self,
        unit: UnitId,
        delay: Duration,
        started: Option<CompletionSignal>,
        finish: Vec<CompletionSignal>,
    ) -> bool {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!(target: "runtime::executor", %unit, "no tokio runtime, action cannot run");
            return false;
        };

        if let Some(signal) = started
            && self.completions.send(signal).is_err()
        {
            debug!(target: "runtime::executor", %unit, "start signal dropped, worker gone");
        }
        if self.silent.contains(&unit) {
            warn!(target: "runtime::executor", %unit, "completion suppressed");
            return true;
        }

        let completions = self.completions.clone();
        runtime.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            for signal in finish {
                if completions.send(signal).is_err() {
                    debug!(target: "runtime::executor", %unit, "completion dropped, worker gone");
                    break;
                }
            }
        });
        true
    }
}

impl ActionExecutor for TaskExecutor {
    fn start(&mut self, request: &ActionRequest) -> u32 {
        let unit = request.unit();
        if self.refused.contains(&unit) {
            debug!(target: "runtime::executor", %unit, kind = %request.kind(), "ability refused");
            return 0;
        }

        let delay = self.timing.delay_for(request.kind(), unit);
        let marker = ActionMarker::InProgress;
        let mut finish = Vec::with_capacity(2);
        if self.leaking.contains(&unit) {
            warn!(target: "runtime::executor", %unit, "ability will leave its marker behind");
        } else {
            finish.push(CompletionSignal::MarkerRemoved { unit, marker });
        }
        finish.push(CompletionSignal::AbilityCompleted {
            unit,
            ticket: request.ticket(),
        });
        debug!(
            target: "runtime::executor",
            %unit,
            kind = %request.kind(),
            delay_ms = saturating_millis(delay),
            "action started"
        );
        let started = CompletionSignal::MarkerAdded { unit, marker };
        u32::from(self.schedule(unit, delay, Some(started), finish))
    }

    fn move_unit(&mut self, unit: UnitId, waypoints: &[WorldPos]) {
        let delay = self.timing.delay_for(ActionKind::Move, unit);
        debug!(
            target: "runtime::executor",
            %unit,
            waypoints = waypoints.len(),
            delay_ms = saturating_millis(delay),
            "movement started"
        );
        self.schedule(
            unit,
            delay,
            None,
            vec![CompletionSignal::MovementFinished { unit }],
        );
    }
}

pub(crate) fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use turn_core::{ActionId, ActionTicket, AttackTarget, Cell, Epoch};

    fn executor(timing: ExecutorTiming) -> (TaskExecutor, mpsc::UnboundedReceiver<CompletionSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (TaskExecutor::new(CompletionSender::new(tx), timing), rx)
    }

    #[tokio::test]
    async fn started_actions_report_their_ticket() {
        let (mut executor, mut rx) = executor(ExecutorTiming::instant());
        let ticket = ActionTicket::new(Epoch(1), ActionId(4));
        let request = ActionRequest::Move {
            unit: UnitId::PLAYER,
            from: Cell::new(0, 0),
            to: Cell::new(0, 1),
            magnitude: 0,
            ticket,
        };

        assert_eq!(executor.start(&request), 1);
        let marker = ActionMarker::InProgress;
        assert_eq!(
            rx.recv().await,
            Some(CompletionSignal::MarkerAdded { unit: UnitId::PLAYER, marker })
        );
        assert_eq!(
            rx.recv().await,
            Some(CompletionSignal::MarkerRemoved { unit: UnitId::PLAYER, marker })
        );
        assert_eq!(
            rx.recv().await,
            Some(CompletionSignal::AbilityCompleted {
                unit: UnitId::PLAYER,
                ticket: Some(ticket),
            })
        );
    }

    #[tokio::test]
    async fn leaking_units_complete_without_removing_the_marker() {
        let (executor, mut rx) = executor(ExecutorTiming::instant());
        let mut executor = executor.leaking_markers([UnitId(1)]);
        let request = ActionRequest::Attack {
            unit: UnitId(1),
            target: AttackTarget::Unit(UnitId::PLAYER),
            ticket: None,
        };

        assert_eq!(executor.start(&request), 1);
        assert!(matches!(rx.recv().await, Some(CompletionSignal::MarkerAdded { .. })));
        assert!(matches!(
            rx.recv().await,
            Some(CompletionSignal::AbilityCompleted { unit: UnitId(1), ticket: None })
        ));
    }

    #[tokio::test]
    async fn staggered_completions_arrive_out_of_order() {
        let timing = ExecutorTiming {
            move_duration: Duration::from_millis(5),
            attack_duration: Duration::ZERO,
            stagger: Duration::from_millis(10),
        };
        let (mut executor, mut rx) = executor(timing);
        executor.move_unit(UnitId(3), &[]);
        executor.move_unit(UnitId(1), &[]);

        assert_eq!(rx.recv().await.map(|s| s.unit()), Some(UnitId(1)));
        assert_eq!(rx.recv().await.map(|s| s.unit()), Some(UnitId(3)));
    }

    #[tokio::test]
    async fn refused_units_never_trigger() {
        let (executor, _rx) = executor(ExecutorTiming::instant());
        let mut executor = executor.refusing([UnitId(2)]);
        let request = ActionRequest::Attack {
            unit: UnitId(2),
            target: AttackTarget::Unit(UnitId::PLAYER),
            ticket: None,
        };
        assert_eq!(executor.start(&request), 0);
    }

    #[test]
    fn starting_outside_a_runtime_fails_closed() {
        let (mut executor, _rx) = executor(ExecutorTiming::instant());
        let request = ActionRequest::Attack {
            unit: UnitId(1),
            target: AttackTarget::Untargetable,
            ticket: None,
        };
        assert_eq!(executor.start(&request), 0);
    }

    #[test]
    fn oversized_delays_saturate_in_logs() {
        assert_eq!(saturating_millis(Duration::from_millis(250)), 250);
        assert_eq!(saturating_millis(Duration::MAX), u64::MAX);
    }
}
