//! Strictly serialized attack dispatch.
//!
//! Attacks are executed one at a time in queue order. Every valid entry is
//! pre-registered with the barrier when the phase begins, so the attack phase
//! counts toward quiescence even before its first ability fires. Exactly one
//! completion listener is live at any time.
use tracing::{debug, info, warn};

use crate::action::{ActionRequest, AttackTarget};
use crate::context::TurnContext;
use crate::state::{ActionTicket, CompletionListener, Epoch, ListenerOwner, UnitId, UnitRoster};

/// One queued attack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttackEntry {
    pub attacker: UnitId,
    pub target: AttackTarget,
    /// Assigned when the phase begins; `None` for entries skipped at pre-registration.
    pub ticket: Option<ActionTicket>,
}

impl AttackEntry {
    pub const fn new(attacker: UnitId, target: AttackTarget) -> Self {
        Self {
            attacker,
            target,
            ticket: None,
        }
    }
}

/// Where the sequencer stands after a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SequencerStep {
    /// Waiting for `attacker` (queue position `index`) to report completion.
    Waiting { index: usize, attacker: UnitId },
    /// The phase just finished. Reported once per [`AttackSequencer::begin`].
    Finished {
        epoch: Epoch,
        dispatched: usize,
        skipped: usize,
    },
    /// Nothing to do: the phase is not running or already reported finished.
    Idle,
}

#[derive(Debug, Default)]
pub struct AttackSequencer {
    queue: Vec<AttackEntry>,
    epoch: Epoch,
    cursor: usize,
    listening: Option<UnitId>,
    active: bool,
    finished_reported: bool,
    dispatched: usize,
    skipped: usize,
}

impl AttackSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn queue(&self) -> &[AttackEntry] {
        &self.queue
    }

    /// Unit whose completion the sequencer is currently waiting on.
    pub fn listening_to(&self) -> Option<UnitId> {
        self.listening
    }

    /// Starts a new attack phase, replacing any phase still in progress.
    pub fn begin(
        &mut self,
        queue: Vec<AttackEntry>,
        epoch: Epoch,
        cx: &mut TurnContext<'_>,
    ) -> SequencerStep {
        self.abort(cx);
        self.unbind(cx.units);
        self.queue = queue;
        self.epoch = epoch;
        self.cursor = 0;
        self.active = true;
        self.finished_reported = false;
        self.dispatched = 0;
        self.skipped = 0;

        for (index, entry) in self.queue.iter_mut().enumerate() {
            entry.ticket = None;
            if !cx.units.contains(entry.attacker) {
                warn!(target: "turn::attack", %epoch, index, attacker = %entry.attacker, "attacker not registered, skipping");
                continue;
            }
            if !entry.target.is_targetable() {
                warn!(target: "turn::attack", %epoch, index, attacker = %entry.attacker, "untargetable attack, skipping");
                continue;
            }
            let action_id = cx.barrier.register_action(entry.attacker, epoch);
            entry.ticket = Some(ActionTicket::new(epoch, action_id));
        }

        info!(target: "turn::attack", %epoch, queued = self.queue.len(), "attack phase begun");
        self.dispatch_next(cx)
    }

    /// Dispatches the entry under the cursor, skipping degraded entries.
    pub fn dispatch_next(&mut self, cx: &mut TurnContext<'_>) -> SequencerStep {
        loop {
            if !self.active {
                return SequencerStep::Idle;
            }
            let Some(entry) = self.queue.get(self.cursor).copied() else {
                return self.finish(cx.units);
            };

            let Some(ticket) = entry.ticket else {
                self.skip(entry, "entry was not pre-registered", cx);
                continue;
            };
            if cx.units.action_state(entry.attacker).is_none() {
                self.skip(entry, "attacker or its action state is missing", cx);
                continue;
            }

            let listener = CompletionListener {
                owner: ListenerOwner::AttackSequencer,
                epoch: self.epoch,
            };
            if let Some(state) = cx.units.action_state_mut(entry.attacker) {
                state.bind_listener(listener);
            }
            self.listening = Some(entry.attacker);

            let request = ActionRequest::Attack {
                unit: entry.attacker,
                target: entry.target,
                ticket: Some(ticket),
            };
            let triggered = cx.executor.start(&request);
            if triggered > 0 {
                self.dispatched += 1;
                info!(
                    target: "turn::attack",
                    epoch = %self.epoch,
                    index = self.cursor,
                    total = self.queue.len(),
                    attacker = %entry.attacker,
                    triggered,
                    "attack dispatched"
                );
                return SequencerStep::Waiting {
                    index: self.cursor,
                    attacker: entry.attacker,
                };
            }

            self.unbind(cx.units);
            self.skip(entry, "no ability reacted to the attack event", cx);
        }
    }

    /// Completion of the attacker currently listened to. Any other unit is ignored.
    pub fn on_completed(&mut self, unit: UnitId, cx: &mut TurnContext<'_>) -> Option<SequencerStep> {
        if !self.active || self.listening != Some(unit) {
            debug!(target: "turn::attack", %unit, listening = ?self.listening, "stale attack completion ignored");
            return None;
        }

        self.unbind(cx.units);
        if let Some(ticket) = self.queue.get(self.cursor).and_then(|entry| entry.ticket) {
            cx.barrier.complete_action(unit, ticket.epoch, ticket.action_id);
        }
        debug!(target: "turn::attack", epoch = %self.epoch, index = self.cursor, %unit, "attack completed");
        self.cursor += 1;
        Some(self.dispatch_next(cx))
    }

    /// Compatibility path for abilities that report completion directly
    /// instead of through the unit's completion event.
    pub fn notify_attack_completed(&mut self, cx: &mut TurnContext<'_>) -> Option<SequencerStep> {
        let unit = self.listening?;
        self.on_completed(unit, cx)
    }

    /// Stops the phase, completing the barrier action of every entry that has not run yet.
    pub fn abort(&mut self, cx: &mut TurnContext<'_>) {
        if !self.active {
            return;
        }
        self.unbind(cx.units);
        let remaining = &self.queue[self.cursor.min(self.queue.len())..];
        for entry in remaining {
            if let Some(ticket) = entry.ticket {
                cx.barrier
                    .complete_action(entry.attacker, ticket.epoch, ticket.action_id);
            }
        }
        warn!(target: "turn::attack", epoch = %self.epoch, remaining = remaining.len(), "attack phase aborted");
        self.cursor = self.queue.len();
        self.active = false;
    }

    fn skip(&mut self, entry: AttackEntry, reason: &'static str, cx: &mut TurnContext<'_>) {
        warn!(
            target: "turn::attack",
            epoch = %self.epoch,
            index = self.cursor,
            attacker = %entry.attacker,
            reason,
            "skipping attack"
        );
        if let Some(ticket) = entry.ticket {
            cx.barrier
                .complete_action(entry.attacker, ticket.epoch, ticket.action_id);
        }
        self.skipped += 1;
        self.cursor += 1;
    }

    fn finish(&mut self, units: &mut UnitRoster) -> SequencerStep {
        self.unbind(units);
        self.active = false;
        if self.finished_reported {
            return SequencerStep::Idle;
        }
        self.finished_reported = true;
        info!(
            target: "turn::attack",
            epoch = %self.epoch,
            dispatched = self.dispatched,
            skipped = self.skipped,
            "attack phase finished"
        );
        SequencerStep::Finished {
            epoch: self.epoch,
            dispatched: self.dispatched,
            skipped: self.skipped,
        }
    }

    fn unbind(&mut self, units: &mut UnitRoster) {
        let Some(unit) = self.listening.take() else {
            return;
        };
        if let Some(state) = units.action_state_mut(unit)
            && state
                .listener()
                .is_some_and(|listener| listener.owner == ListenerOwner::AttackSequencer)
        {
            state.take_listener();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::barrier::{ActionBarrier, TurnBarrier};
    use crate::env::{ActionExecutor, Services};
    use crate::state::{Cell, Controller, UnitState, WorldPos};
    use std::collections::HashSet;

    #[derive(Default)]
    struct ScriptedExecutor {
        deaf: HashSet<UnitId>,
        attacks: Vec<UnitId>,
    }

    impl ActionExecutor for ScriptedExecutor {
        fn start(&mut self, request: &ActionRequest) -> u32 {
            self.attacks.push(request.unit());
            if self.deaf.contains(&request.unit()) { 0 } else { 1 }
        }

        fn move_unit(&mut self, _unit: UnitId, _waypoints: &[WorldPos]) {}
    }

    struct Fixture {
        barrier: ActionBarrier,
        units: UnitRoster,
        services: Services,
        executor: ScriptedExecutor,
    }

    impl Fixture {
        fn new(ids: &[u32]) -> Self {
            let mut units = UnitRoster::new();
            for id in ids {
                units.insert(UnitState::new(UnitId(*id), Controller::Ai, Cell::new(*id as i32, 0)));
            }
            let mut barrier = ActionBarrier::new();
            barrier.begin_epoch(Epoch(2));
            Self {
                barrier,
                units,
                services: Services::empty(),
                executor: ScriptedExecutor::default(),
            }
        }

        fn cx(&mut self) -> TurnContext<'_> {
            TurnContext {
                epoch: Epoch(2),
                barrier: &mut self.barrier,
                units: &mut self.units,
                services: &mut self.services,
                executor: &mut self.executor,
            }
        }
    }

    fn entries(ids: &[u32]) -> Vec<AttackEntry> {
        ids.iter()
            .map(|id| AttackEntry::new(UnitId(*id), AttackTarget::Unit(UnitId::PLAYER)))
            .collect()
    }

    #[test]
    fn empty_queue_finishes_immediately() {
        let mut fx = Fixture::new(&[]);
        let mut sequencer = AttackSequencer::new();
        let step = sequencer.begin(Vec::new(), Epoch(2), &mut fx.cx());
        assert_eq!(
            step,
            SequencerStep::Finished {
                epoch: Epoch(2),
                dispatched: 0,
                skipped: 0
            }
        );
        assert!(!sequencer.is_active());
    }

    #[test]
    fn attacks_run_in_order_and_finish_once() {
        let mut fx = Fixture::new(&[1, 2, 3]);
        let mut sequencer = AttackSequencer::new();

        let step = sequencer.begin(entries(&[1, 2, 3]), Epoch(2), &mut fx.cx());
        assert_eq!(step, SequencerStep::Waiting { index: 0, attacker: UnitId(1) });
        assert_eq!(fx.barrier.pending_count(Epoch(2)), 3);

        let step = sequencer.on_completed(UnitId(1), &mut fx.cx()).unwrap();
        assert_eq!(step, SequencerStep::Waiting { index: 1, attacker: UnitId(2) });
        let step = sequencer.on_completed(UnitId(2), &mut fx.cx()).unwrap();
        assert_eq!(step, SequencerStep::Waiting { index: 2, attacker: UnitId(3) });
        let step = sequencer.on_completed(UnitId(3), &mut fx.cx()).unwrap();
        assert!(matches!(step, SequencerStep::Finished { dispatched: 3, skipped: 0, .. }));

        assert_eq!(fx.executor.attacks, vec![UnitId(1), UnitId(2), UnitId(3)]);
        assert!(fx.barrier.is_quiescent(Epoch(2)));

        // Late or repeated completions never produce a second finish.
        assert_eq!(sequencer.on_completed(UnitId(3), &mut fx.cx()), None);
        assert_eq!(sequencer.dispatch_next(&mut fx.cx()), SequencerStep::Idle);
    }

    #[test]
    fn only_the_listened_unit_advances_the_cursor() {
        let mut fx = Fixture::new(&[1, 2]);
        let mut sequencer = AttackSequencer::new();
        sequencer.begin(entries(&[1, 2]), Epoch(2), &mut fx.cx());

        assert_eq!(sequencer.on_completed(UnitId(2), &mut fx.cx()), None);
        assert_eq!(sequencer.cursor(), 0);
        assert_eq!(sequencer.listening_to(), Some(UnitId(1)));
        assert!(fx.units.action_state(UnitId(1)).unwrap().listener().is_some());
    }

    #[test]
    fn degraded_entries_are_skipped_without_stalling() {
        let mut fx = Fixture::new(&[1, 2, 3, 4]);
        fx.executor.deaf.insert(UnitId(2));
        fx.units.get_mut(UnitId(3)).unwrap().action_state = None;

        let mut queue = entries(&[1, 2, 3, 4, 9]);
        queue.push(AttackEntry::new(UnitId(4), AttackTarget::Untargetable));

        let mut sequencer = AttackSequencer::new();
        let step = sequencer.begin(queue, Epoch(2), &mut fx.cx());
        assert_eq!(step, SequencerStep::Waiting { index: 0, attacker: UnitId(1) });
        // 9 is unknown and the last entry is untargetable: neither is registered.
        assert_eq!(fx.barrier.pending_count(Epoch(2)), 4);

        let step = sequencer.on_completed(UnitId(1), &mut fx.cx()).unwrap();
        // 2 triggers nothing, 3 has no action state: both skipped.
        assert_eq!(step, SequencerStep::Waiting { index: 3, attacker: UnitId(4) });
        assert!(fx.units.action_state(UnitId(2)).unwrap().listener().is_none());

        let step = sequencer.on_completed(UnitId(4), &mut fx.cx()).unwrap();
        assert_eq!(
            step,
            SequencerStep::Finished {
                epoch: Epoch(2),
                dispatched: 2,
                skipped: 4
            }
        );
        assert!(fx.barrier.is_quiescent(Epoch(2)));
    }

    #[test]
    fn begin_replaces_previous_listener() {
        let mut fx = Fixture::new(&[1, 2]);
        let mut sequencer = AttackSequencer::new();
        sequencer.begin(entries(&[1]), Epoch(2), &mut fx.cx());
        sequencer.begin(entries(&[2]), Epoch(2), &mut fx.cx());

        assert!(fx.units.action_state(UnitId(1)).unwrap().listener().is_none());
        assert!(fx.units.action_state(UnitId(2)).unwrap().listener().is_some());
        assert_eq!(sequencer.listening_to(), Some(UnitId(2)));
    }

    #[test]
    fn notify_compat_path_and_abort() {
        let mut fx = Fixture::new(&[1, 2, 3]);
        let mut sequencer = AttackSequencer::new();
        sequencer.begin(entries(&[1, 2, 3]), Epoch(2), &mut fx.cx());

        let step = sequencer.notify_attack_completed(&mut fx.cx()).unwrap();
        assert_eq!(step, SequencerStep::Waiting { index: 1, attacker: UnitId(2) });

        sequencer.abort(&mut fx.cx());
        assert!(!sequencer.is_active());
        assert!(fx.barrier.is_quiescent(Epoch(2)));
        assert!(fx.units.action_state(UnitId(2)).unwrap().listener().is_none());
        assert_eq!(sequencer.notify_attack_completed(&mut fx.cx()), None);
    }
}
