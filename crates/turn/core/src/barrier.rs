//! Turn-scoped action barrier.
//!
//! Every asynchronous per-unit action is registered under the epoch it
//! belongs to and completed exactly once. An epoch is quiescent when none of
//! its registered actions is still pending. Ledgers are kept per epoch and
//! dropped wholesale once they fall out of the retention window.
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use tracing::{debug, trace, warn};

use crate::config::TurnConfig;
use crate::state::{ActionId, Epoch, UnitId};

/// Result of a completion attempt. Only `Completed` changes state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CompletionOutcome {
    /// The action was pending and is now complete.
    Completed { remaining: usize },
    /// The action was already completed earlier.
    Duplicate,
    /// The epoch has no ledger (never registered, or already pruned).
    UnknownEpoch,
    /// The action id is not pending for this unit in this epoch.
    UnknownAction,
}

impl CompletionOutcome {
    /// True when this completion drained the epoch.
    pub fn drained(&self) -> bool {
        matches!(self, Self::Completed { remaining: 0 })
    }
}

/// Barrier contract consumed by dispatch, sequencing and the advance guard.
pub trait TurnBarrier: Send {
    /// Registers a new pending action and returns its fresh id.
    fn register_action(&mut self, unit: UnitId, epoch: Epoch) -> ActionId;

    /// Completes a pending action. Completing twice or completing an unknown id is a no-op.
    fn complete_action(&mut self, unit: UnitId, epoch: Epoch, id: ActionId) -> CompletionOutcome;

    fn is_quiescent(&self, epoch: Epoch) -> bool;

    fn pending_count(&self, epoch: Epoch) -> usize;

    /// Diagnostic snapshot of everything still pending in `epoch`.
    fn dump(&self, epoch: Epoch) -> BarrierDump;
}

#[derive(Debug, Default)]
struct EpochLedger {
    pending: BTreeMap<UnitId, Vec<ActionId>>,
    completed: HashSet<ActionId>,
    registered: u64,
}

impl EpochLedger {
    fn pending_count(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }
}

/// In-process barrier implementation.
#[derive(Debug)]
pub struct ActionBarrier {
    ledgers: BTreeMap<Epoch, EpochLedger>,
    current: Epoch,
    next_id: u64,
    retained_epochs: u64,
}

impl ActionBarrier {
    pub fn new() -> Self {
        Self::with_retention(TurnConfig::DEFAULT_RETAINED_EPOCHS)
    }

    pub fn with_retention(retained_epochs: u64) -> Self {
        Self {
            ledgers: BTreeMap::new(),
            current: Epoch::NONE,
            next_id: 1,
            retained_epochs: retained_epochs.max(1),
        }
    }

    pub fn current_epoch(&self) -> Epoch {
        self.current
    }

    /// Starts tracking `epoch` with an empty ledger and prunes ledgers that
    /// fell out of the retention window.
    pub fn begin_epoch(&mut self, epoch: Epoch) {
        self.current = epoch;
        self.ledgers.insert(epoch, EpochLedger::default());
        debug!(target: "turn::barrier", %epoch, "epoch begun");
        self.prune_before(epoch.back(self.retained_epochs - 1));
    }

    /// Drops every ledger older than `oldest_kept`, returning the dropped
    /// `(unit, action)` pairs that were still pending.
    pub fn prune_before(&mut self, oldest_kept: Epoch) -> Vec<(Epoch, UnitId, ActionId)> {
        let kept = self.ledgers.split_off(&oldest_kept);
        let dropped = std::mem::replace(&mut self.ledgers, kept);

        let mut orphans = Vec::new();
        for (epoch, ledger) in dropped {
            let pending = ledger.pending_count();
            if pending > 0 {
                warn!(
                    target: "turn::barrier",
                    %epoch,
                    pending,
                    "dropping epoch ledger with pending actions"
                );
            }
            for (unit, ids) in ledger.pending {
                orphans.extend(ids.into_iter().map(|id| (epoch, unit, id)));
            }
        }
        orphans
    }

    pub fn registered_count(&self, epoch: Epoch) -> u64 {
        self.ledgers.get(&epoch).map_or(0, |ledger| ledger.registered)
    }

    pub fn completed_count(&self, epoch: Epoch) -> usize {
        self.ledgers
            .get(&epoch)
            .map_or(0, |ledger| ledger.completed.len())
    }

    /// Epochs that currently have a ledger, oldest first.
    pub fn tracked_epochs(&self) -> impl Iterator<Item = Epoch> + '_ {
        self.ledgers.keys().copied()
    }
}

impl Default for ActionBarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnBarrier for ActionBarrier {
    fn register_action(&mut self, unit: UnitId, epoch: Epoch) -> ActionId {
        let id = ActionId(self.next_id);
        self.next_id += 1;

        let ledger = self.ledgers.entry(epoch).or_default();
        ledger.pending.entry(unit).or_default().push(id);
        ledger.registered += 1;

        debug!(
            target: "turn::barrier",
            %epoch,
            %unit,
            action_id = %id,
            pending = ledger.pending_count(),
            "action registered"
        );
        id
    }

    fn complete_action(&mut self, unit: UnitId, epoch: Epoch, id: ActionId) -> CompletionOutcome {
        let Some(ledger) = self.ledgers.get_mut(&epoch) else {
            trace!(target: "turn::barrier", %epoch, %unit, action_id = %id, "completion for unknown epoch ignored");
            return CompletionOutcome::UnknownEpoch;
        };

        if ledger.completed.contains(&id) {
            trace!(target: "turn::barrier", %epoch, %unit, action_id = %id, "duplicate completion ignored");
            return CompletionOutcome::Duplicate;
        }

        let Some(ids) = ledger.pending.get_mut(&unit) else {
            warn!(target: "turn::barrier", %epoch, %unit, action_id = %id, "completion for unit with nothing pending");
            return CompletionOutcome::UnknownAction;
        };
        let Some(index) = ids.iter().position(|pending| *pending == id) else {
            warn!(target: "turn::barrier", %epoch, %unit, action_id = %id, "completion for unknown action");
            return CompletionOutcome::UnknownAction;
        };

        ids.swap_remove(index);
        if ids.is_empty() {
            ledger.pending.remove(&unit);
        }
        ledger.completed.insert(id);

        let remaining = ledger.pending_count();
        debug!(target: "turn::barrier", %epoch, %unit, action_id = %id, remaining, "action completed");
        if remaining == 0 {
            debug!(target: "turn::barrier", %epoch, "all actions finished");
        }
        CompletionOutcome::Completed { remaining }
    }

    fn is_quiescent(&self, epoch: Epoch) -> bool {
        self.pending_count(epoch) == 0
    }

    fn pending_count(&self, epoch: Epoch) -> usize {
        self.ledgers.get(&epoch).map_or(0, EpochLedger::pending_count)
    }

    fn dump(&self, epoch: Epoch) -> BarrierDump {
        let Some(ledger) = self.ledgers.get(&epoch) else {
            return BarrierDump {
                epoch,
                known: false,
                registered: 0,
                completed: 0,
                pending: Vec::new(),
            };
        };

        let mut pending: Vec<PendingEntry> = ledger
            .pending
            .iter()
            .map(|(unit, ids)| {
                let mut actions = ids.clone();
                actions.sort();
                PendingEntry {
                    unit: *unit,
                    actions,
                }
            })
            .collect();
        pending.sort_by_key(|entry| entry.unit);

        BarrierDump {
            epoch,
            known: true,
            registered: ledger.registered,
            completed: ledger.completed.len(),
            pending,
        }
    }
}

/// Pending actions owned by one unit.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PendingEntry {
    pub unit: UnitId,
    pub actions: Vec<ActionId>,
}

/// Human-readable snapshot of an epoch's ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BarrierDump {
    pub epoch: Epoch,
    /// `false` when the barrier has no ledger for this epoch.
    pub known: bool,
    pub registered: u64,
    pub completed: usize,
    pub pending: Vec<PendingEntry>,
}

impl BarrierDump {
    pub fn pending_count(&self) -> usize {
        self.pending.iter().map(|entry| entry.actions.len()).sum()
    }
}

impl fmt::Display for BarrierDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.known {
            return write!(f, "{}: no ledger", self.epoch);
        }
        write!(
            f,
            "{}: registered={} completed={} pending={}",
            self.epoch,
            self.registered,
            self.completed,
            self.pending_count()
        )?;
        for entry in &self.pending {
            write!(f, "\n  {} ->", entry.unit)?;
            for id in &entry.actions {
                write!(f, " {id}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_ids_are_unique_across_epochs() {
        let mut barrier = ActionBarrier::new();
        let a = barrier.register_action(UnitId(1), Epoch(1));
        let b = barrier.register_action(UnitId(1), Epoch(1));
        let c = barrier.register_action(UnitId(2), Epoch(2));
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
    }

    #[test]
    fn quiescence_follows_completions() {
        let mut barrier = ActionBarrier::new();
        barrier.begin_epoch(Epoch(1));
        let a = barrier.register_action(UnitId(1), Epoch(1));
        let b = barrier.register_action(UnitId(2), Epoch(1));
        assert!(!barrier.is_quiescent(Epoch(1)));
        assert_eq!(barrier.pending_count(Epoch(1)), 2);

        assert_eq!(
            barrier.complete_action(UnitId(1), Epoch(1), a),
            CompletionOutcome::Completed { remaining: 1 }
        );
        let last = barrier.complete_action(UnitId(2), Epoch(1), b);
        assert!(last.drained());
        assert!(barrier.is_quiescent(Epoch(1)));
    }

    #[test]
    fn completing_twice_is_a_noop() {
        let mut barrier = ActionBarrier::new();
        let id = barrier.register_action(UnitId(3), Epoch(4));
        let other = barrier.register_action(UnitId(3), Epoch(4));

        barrier.complete_action(UnitId(3), Epoch(4), id);
        assert_eq!(
            barrier.complete_action(UnitId(3), Epoch(4), id),
            CompletionOutcome::Duplicate
        );
        assert_eq!(barrier.pending_count(Epoch(4)), 1);

        barrier.complete_action(UnitId(3), Epoch(4), other);
        assert!(barrier.is_quiescent(Epoch(4)));
    }

    #[test]
    fn unknown_ids_and_epochs_are_ignored() {
        let mut barrier = ActionBarrier::new();
        let id = barrier.register_action(UnitId(1), Epoch(2));

        assert_eq!(
            barrier.complete_action(UnitId(1), Epoch(9), id),
            CompletionOutcome::UnknownEpoch
        );
        assert_eq!(
            barrier.complete_action(UnitId(7), Epoch(2), id),
            CompletionOutcome::UnknownAction
        );
        assert_eq!(
            barrier.complete_action(UnitId(1), Epoch(2), ActionId(999)),
            CompletionOutcome::UnknownAction
        );
        assert_eq!(barrier.pending_count(Epoch(2)), 1);
    }

    #[test]
    fn begin_epoch_keeps_current_and_previous() {
        let mut barrier = ActionBarrier::new();
        barrier.begin_epoch(Epoch(1));
        barrier.register_action(UnitId(1), Epoch(1));
        barrier.begin_epoch(Epoch(2));
        barrier.begin_epoch(Epoch(3));

        let epochs: Vec<_> = barrier.tracked_epochs().collect();
        assert_eq!(epochs, vec![Epoch(2), Epoch(3)]);
        assert!(barrier.is_quiescent(Epoch(1)));
        assert_eq!(barrier.current_epoch(), Epoch(3));
    }

    #[test]
    fn begin_epoch_resets_a_reused_ledger() {
        let mut barrier = ActionBarrier::new();
        barrier.register_action(UnitId(1), Epoch(5));
        barrier.begin_epoch(Epoch(5));
        assert!(barrier.is_quiescent(Epoch(5)));
        assert_eq!(barrier.registered_count(Epoch(5)), 0);
    }

    #[test]
    fn prune_reports_orphaned_actions() {
        let mut barrier = ActionBarrier::new();
        let id = barrier.register_action(UnitId(4), Epoch(1));
        barrier.register_action(UnitId(4), Epoch(3));

        let orphans = barrier.prune_before(Epoch(2));
        assert_eq!(orphans, vec![(Epoch(1), UnitId(4), id)]);
        assert_eq!(barrier.pending_count(Epoch(3)), 1);
    }

    #[test]
    fn dump_lists_pending_per_unit() {
        let mut barrier = ActionBarrier::new();
        barrier.begin_epoch(Epoch(6));
        let a = barrier.register_action(UnitId(2), Epoch(6));
        let b = barrier.register_action(UnitId(1), Epoch(6));
        barrier.register_action(UnitId(2), Epoch(6));
        barrier.complete_action(UnitId(2), Epoch(6), a);

        let dump = barrier.dump(Epoch(6));
        assert!(dump.known);
        assert_eq!(dump.registered, 3);
        assert_eq!(dump.completed, 1);
        assert_eq!(dump.pending_count(), 2);
        assert_eq!(dump.pending[0].unit, UnitId(1));
        assert_eq!(dump.pending[0].actions, vec![b]);

        let text = dump.to_string();
        assert!(text.starts_with("turn 6: registered=3 completed=1 pending=2"));
        assert!(text.contains("#1 -> act-"));

        assert_eq!(barrier.dump(Epoch(42)).to_string(), "turn 42: no ledger");
    }
}
