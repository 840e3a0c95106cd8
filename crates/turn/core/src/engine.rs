//! Turn engine façade.
//!
//! [`TurnEngine`] owns every coordination component and the state they share,
//! and drives one epoch through its lifecycle:
//!
//! 1. open an input window and accept one player command (reserving its cell)
//! 2. collect AI move intents (reserving their cells) and attack entries
//! 3. dispatch the move phase, then run the attack phase
//! 4. feed [`CompletionSignal`]s back in as actions finish
//! 5. end the phase; the advance guard decides when the epoch moves on
//!
//! The engine is synchronous and never blocks. Hosts deliver completion
//! signals and honour retry delays themselves.
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::action::AttackTarget;
use crate::barrier::{ActionBarrier, CompletionOutcome, TurnBarrier};
use crate::config::TurnConfig;
use crate::context::TurnContext;
use crate::env::{ActionExecutor, Services};
use crate::error::{ErrorContext, ErrorSeverity, GameError};
use crate::flow::{FlowSnapshot, TurnFlowCoordinator, TurnObserver};
use crate::guard::{
    AdvanceCheck, GuardMetrics, GuardMetricsSnapshot, PhaseEndDecision, TurnAdvanceGuard,
};
use crate::input::{Command, CommandGate, CommandKind, CommandOutcome, CommandRejection, InputWindow, IntentBoard};
use crate::movement::{DispatchError, DispatchOutcome, MoveDispatcher, ReservationError, ResolvedMove};
use crate::sequencer::{AttackEntry, AttackSequencer, SequencerStep};
use crate::state::{
    ActionMarker, ActionTicket, Cell, Epoch, ListenerOwner, MarkerCounts, UnitId, UnitRoster,
};

/// Completion reported by the host for a previously started action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CompletionSignal {
    /// An ability started through [`ActionExecutor::start`] finished.
    AbilityCompleted {
        unit: UnitId,
        ticket: Option<ActionTicket>,
    },
    /// A direct movement issued through [`ActionExecutor::move_unit`] arrived.
    MovementFinished { unit: UnitId },
    /// An ability placed a marker on its unit (e.g. `InProgress` on activation).
    MarkerAdded { unit: UnitId, marker: ActionMarker },
    /// An ability removed one instance of a marker when it ended.
    MarkerRemoved { unit: UnitId, marker: ActionMarker },
}

impl CompletionSignal {
    pub const fn unit(&self) -> UnitId {
        match self {
            Self::AbilityCompleted { unit, .. }
            | Self::MovementFinished { unit }
            | Self::MarkerAdded { unit, .. }
            | Self::MarkerRemoved { unit, .. } => *unit,
        }
    }
}

/// What a completion signal resolved to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SignalEffect {
    /// The attack sequencer advanced.
    Attack(SequencerStep),
    /// The in-flight player move finished and was committed.
    PlayerMoveCommitted { ticket: ActionTicket },
    /// An AI movement arrived and was committed.
    MovementCommitted { ticket: ActionTicket },
    /// A plain ticketed action completed.
    ActionCompleted {
        ticket: ActionTicket,
        outcome: CompletionOutcome,
    },
    /// A unit's marker count changed; `count` is the new instance count.
    Marker {
        unit: UnitId,
        marker: ActionMarker,
        count: u32,
    },
    /// Nothing was waiting for this signal.
    Ignored,
}

/// Result of [`TurnEngine::end_phase`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EndOfPhase {
    /// The epoch advanced and a new input window is open.
    Advanced {
        epoch: Epoch,
        window: InputWindow,
        forced_clear: bool,
    },
    /// Call [`TurnEngine::retry_end_phase`] after `delay`.
    RetryScheduled { delay: std::time::Duration },
    RetrySuppressed,
    /// The single retry ran and the epoch is still blocked.
    Stalled { check: AdvanceCheck },
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("turn flow has not started")]
    NotStarted,

    #[error("not enough action points: need {required}, have {available}")]
    InsufficientActionPoints {
        required: u32,
        available: u32,
        context: ErrorContext,
    },

    #[error("unit {0} not found")]
    UnitNotFound(UnitId),

    #[error(transparent)]
    Command(#[from] CommandRejection),

    #[error(transparent)]
    Reservation(#[from] ReservationError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl GameError for EngineError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NotStarted => ErrorSeverity::Internal,
            Self::InsufficientActionPoints { .. } => ErrorSeverity::Recoverable,
            Self::UnitNotFound(_) => ErrorSeverity::Validation,
            Self::Command(err) => err.severity(),
            Self::Reservation(err) => err.severity(),
            Self::Dispatch(err) => err.severity(),
        }
    }

    fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::InsufficientActionPoints { context, .. } => Some(context),
            Self::Command(err) => err.context(),
            Self::Reservation(err) => err.context(),
            Self::Dispatch(err) => err.context(),
            _ => None,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::NotStarted => "ENGINE_NOT_STARTED",
            Self::InsufficientActionPoints { .. } => "ENGINE_INSUFFICIENT_ACTION_POINTS",
            Self::UnitNotFound(_) => "ENGINE_UNIT_NOT_FOUND",
            Self::Command(err) => err.error_code(),
            Self::Reservation(err) => err.error_code(),
            Self::Dispatch(err) => err.error_code(),
        }
    }
}

/// Serializable summary of the engine for logs and host UIs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EngineSnapshot {
    pub flow: FlowSnapshot,
    pub window: InputWindow,
    pub pending_actions: usize,
    pub reservations: usize,
    pub planned_moves: usize,
    pub queued_attacks: usize,
    pub attack_phase_active: bool,
    pub markers: MarkerCounts,
    pub guard: GuardMetricsSnapshot,
}

/// State lent to components through [`TurnContext`].
struct Shared {
    barrier: ActionBarrier,
    units: UnitRoster,
    services: Services,
    executor: Box<dyn ActionExecutor>,
}

impl Shared {
    fn cx(&mut self, epoch: Epoch) -> TurnContext<'_> {
        TurnContext {
            epoch,
            barrier: &mut self.barrier,
            units: &mut self.units,
            services: &mut self.services,
            executor: self.executor.as_mut(),
        }
    }
}

/// Turn coordination engine.
pub struct TurnEngine {
    config: TurnConfig,
    shared: Shared,
    flow: TurnFlowCoordinator,
    gate: CommandGate,
    intents: IntentBoard,
    dispatcher: MoveDispatcher,
    sequencer: AttackSequencer,
    guard: TurnAdvanceGuard,
    planned_moves: Vec<ResolvedMove>,
    attack_queue: Vec<AttackEntry>,
}

impl TurnEngine {
    pub fn new(
        config: TurnConfig,
        units: UnitRoster,
        services: Services,
        executor: impl ActionExecutor + 'static,
    ) -> Self {
        Self::with_flow(
            TurnFlowCoordinator::new(&config),
            config,
            units,
            services,
            executor,
        )
    }

    /// Resumes an engine whose flow counters were captured earlier.
    pub fn resume(
        config: TurnConfig,
        flow: FlowSnapshot,
        units: UnitRoster,
        services: Services,
        executor: impl ActionExecutor + 'static,
    ) -> Self {
        let flow = TurnFlowCoordinator::from_snapshot(&config, flow);
        Self::with_flow(flow, config, units, services, executor)
    }

    fn with_flow(
        flow: TurnFlowCoordinator,
        config: TurnConfig,
        units: UnitRoster,
        services: Services,
        executor: impl ActionExecutor + 'static,
    ) -> Self {
        Self {
            shared: Shared {
                barrier: ActionBarrier::with_retention(config.retained_epochs),
                units,
                services,
                executor: Box::new(executor),
            },
            flow,
            gate: CommandGate::new(),
            intents: IntentBoard::new(),
            dispatcher: MoveDispatcher::new(),
            sequencer: AttackSequencer::new(),
            guard: TurnAdvanceGuard::new(config.retry_delay),
            planned_moves: Vec::new(),
            attack_queue: Vec::new(),
            config,
        }
    }

    // ===== accessors =====

    pub fn config(&self) -> &TurnConfig {
        &self.config
    }

    pub fn epoch(&self) -> Epoch {
        self.flow.epoch()
    }

    pub fn input_window(&self) -> InputWindow {
        self.gate.window()
    }

    pub fn units(&self) -> &UnitRoster {
        &self.shared.units
    }

    pub fn units_mut(&mut self) -> &mut UnitRoster {
        &mut self.shared.units
    }

    pub fn barrier(&self) -> &ActionBarrier {
        &self.shared.barrier
    }

    pub fn dispatcher(&self) -> &MoveDispatcher {
        &self.dispatcher
    }

    pub fn sequencer(&self) -> &AttackSequencer {
        &self.sequencer
    }

    pub fn flow(&self) -> &TurnFlowCoordinator {
        &self.flow
    }

    pub fn intents(&self) -> &IntentBoard {
        &self.intents
    }

    pub fn guard_metrics(&self) -> Arc<GuardMetrics> {
        self.guard.metrics()
    }

    pub fn add_observer(&mut self, observer: Box<dyn TurnObserver>) {
        self.flow.add_observer(observer);
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let epoch = self.epoch();
        EngineSnapshot {
            flow: self.flow.snapshot(),
            window: self.gate.window(),
            pending_actions: self.shared.barrier.pending_count(epoch),
            reservations: self.dispatcher.reservations().len(),
            planned_moves: self.planned_moves.len(),
            queued_attacks: self.attack_queue.len(),
            attack_phase_active: self.sequencer.is_active(),
            markers: self.shared.units.marker_totals(),
            guard: self.guard.metrics().snapshot(),
        }
    }

    // ===== turn lifecycle =====

    /// Starts the current epoch and opens its first input window.
    ///
    /// On a fresh engine this starts epoch 1. A resumed engine starts the
    /// epoch it was resumed at.
    pub fn start(&mut self) -> InputWindow {
        if !self.flow.start_first_turn() {
            self.flow.start_turn();
        }
        self.shared.barrier.begin_epoch(self.flow.epoch());
        self.open_input_window()
    }

    /// Opens a fresh input window bound to the current epoch.
    pub fn open_input_window(&mut self) -> InputWindow {
        let window = self.flow.open_new_input_window();
        self.gate.open(self.flow.epoch(), window)
    }

    pub fn close_input_window(&mut self) {
        self.gate.close();
    }

    /// Validates a player command and, for moves, reserves the destination.
    ///
    /// On success the planned move (or wait) is queued for the move phase
    /// and the window closes. A refused reservation leaves the window open.
    pub fn submit_command(
        &mut self,
        unit: UnitId,
        command: Command,
    ) -> Result<CommandOutcome, EngineError> {
        if !self.flow.first_turn_started() {
            return Err(EngineError::NotStarted);
        }

        let consumes_turn = command.kind != CommandKind::TurnFacing;
        if consumes_turn && !self.flow.has_sufficient_action_points(1) {
            return Err(EngineError::InsufficientActionPoints {
                required: 1,
                available: self.flow.action_points(),
                context: ErrorContext::new()
                    .with_unit(unit)
                    .with_epoch(self.flow.epoch()),
            });
        }

        let destination = self.gate.check(
            unit,
            &command,
            &mut self.shared.units,
            &self.shared.services,
            &self.intents,
        )?;

        if let Some(cell) = destination
            && let Err(err) = self
                .dispatcher
                .register_move(unit, cell, &mut self.shared.services)
        {
            self.gate
                .reject_move(unit, &command, &mut self.shared.units, &err);
            return Err(err.into());
        }

        let outcome = self
            .gate
            .accept(unit, command, destination, &mut self.shared.units)?;

        if let CommandOutcome::Applied { command, destination } = outcome {
            let current = self.current_cell(unit)?;
            match command.kind {
                CommandKind::Move => {
                    let next = destination.unwrap_or(Cell::NONE);
                    self.intents.declare(unit, current, next);
                    self.planned_moves.push(ResolvedMove::new(unit, current, next));
                }
                CommandKind::Wait => {
                    self.planned_moves
                        .push(ResolvedMove::new(unit, current, Cell::NONE));
                }
                CommandKind::Attack => {
                    let target = if command.target_cell.is_none() {
                        AttackTarget::Cell(current.offset(command.direction))
                    } else {
                        AttackTarget::Cell(command.target_cell)
                    };
                    self.attack_queue.push(AttackEntry::new(unit, target));
                }
                CommandKind::TurnFacing => {}
            }
            self.flow.consume_action_points(1);
            if !self.flow.has_sufficient_action_points(1) {
                self.flow.queue_enemy_phase();
            }
        }

        Ok(outcome)
    }

    /// Declares and reserves an AI unit's step for this epoch.
    ///
    /// A refused reservation turns the unit's plan into a wait.
    pub fn declare_ai_move(&mut self, unit: UnitId, next: Cell) -> Result<(), EngineError> {
        let current = self.current_cell(unit)?;
        self.intents.declare(unit, current, next);

        if next.is_none() || next == current {
            self.planned_moves.push(ResolvedMove::new(unit, current, Cell::NONE));
            return Ok(());
        }

        match self
            .dispatcher
            .register_move(unit, next, &mut self.shared.services)
        {
            Ok(()) => {
                self.planned_moves.push(ResolvedMove::new(unit, current, next));
                Ok(())
            }
            Err(err) => {
                warn!(target: "turn::engine", %unit, %next, error = %err, "ai reservation refused, unit waits");
                self.planned_moves.push(ResolvedMove::new(unit, current, Cell::NONE));
                Err(err.into())
            }
        }
    }

    /// Queues an attack for the next attack phase.
    pub fn plan_attack(&mut self, attacker: UnitId, target: AttackTarget) {
        self.attack_queue.push(AttackEntry::new(attacker, target));
    }

    /// Dispatches every planned move. Failures are reported per unit and do
    /// not stop the remaining dispatches.
    pub fn dispatch_move_phase(&mut self) -> Vec<(UnitId, Result<DispatchOutcome, EngineError>)> {
        let epoch = self.flow.epoch();
        let moves = std::mem::take(&mut self.planned_moves);
        info!(target: "turn::engine", %epoch, moves = moves.len(), "dispatching move phase");

        let mut cx = self.shared.cx(epoch);
        moves
            .into_iter()
            .map(|mv| {
                let result = self.dispatcher.dispatch(mv, &mut cx).map_err(EngineError::from);
                (mv.unit, result)
            })
            .collect()
    }

    /// Begins the attack phase with everything queued so far.
    pub fn begin_attack_phase(&mut self) -> SequencerStep {
        let queue = std::mem::take(&mut self.attack_queue);
        self.begin_attack_phase_with(queue)
    }

    pub fn begin_attack_phase_with(&mut self, queue: Vec<AttackEntry>) -> SequencerStep {
        let epoch = self.flow.epoch();
        let mut cx = self.shared.cx(epoch);
        self.sequencer.begin(queue, epoch, &mut cx)
    }

    /// Routes a completion signal to whichever component is waiting on it.
    pub fn handle_signal(&mut self, signal: CompletionSignal) -> SignalEffect {
        let epoch = self.flow.epoch();
        match signal {
            CompletionSignal::AbilityCompleted { unit, ticket } => {
                let attack_listener = self
                    .shared
                    .units
                    .action_state(unit)
                    .and_then(|state| state.listener())
                    .is_some_and(|listener| listener.owner == ListenerOwner::AttackSequencer);
                if attack_listener && self.sequencer.listening_to() == Some(unit) {
                    let mut cx = self.shared.cx(epoch);
                    if let Some(step) = self.sequencer.on_completed(unit, &mut cx) {
                        return SignalEffect::Attack(step);
                    }
                }

                let Some(ticket) = ticket else {
                    debug!(target: "turn::engine", %unit, "untracked ability completion ignored");
                    return SignalEffect::Ignored;
                };

                let outcome = self
                    .shared
                    .barrier
                    .complete_action(unit, ticket.epoch, ticket.action_id);
                let mut cx = self.shared.cx(epoch);
                if self.dispatcher.on_player_move_finished(unit, ticket, &mut cx) {
                    return SignalEffect::PlayerMoveCommitted { ticket };
                }
                SignalEffect::ActionCompleted { ticket, outcome }
            }
            CompletionSignal::MovementFinished { unit } => {
                let mut cx = self.shared.cx(epoch);
                match self.dispatcher.on_movement_finished(unit, &mut cx) {
                    Some(ticket) => SignalEffect::MovementCommitted { ticket },
                    None => SignalEffect::Ignored,
                }
            }
            CompletionSignal::MarkerAdded { unit, marker } => self.apply_marker(unit, marker, true),
            CompletionSignal::MarkerRemoved { unit, marker } => {
                self.apply_marker(unit, marker, false)
            }
        }
    }

    /// Mirrors an ability's marker bookkeeping onto the unit's action state.
    ///
    /// Removing a marker that is not present (already force-cleared) is ignored.
    fn apply_marker(&mut self, unit: UnitId, marker: ActionMarker, add: bool) -> SignalEffect {
        let Some(state) = self.shared.units.action_state_mut(unit) else {
            debug!(target: "turn::engine", %unit, %marker, "marker change for unit without action state");
            return SignalEffect::Ignored;
        };
        if add {
            state.add_marker(marker);
        } else if !state.remove_marker(marker) {
            debug!(target: "turn::engine", %unit, %marker, "marker already cleared");
            return SignalEffect::Ignored;
        }
        let count = state.count(marker);
        debug!(target: "turn::engine", %unit, %marker, count, added = add, "marker changed");
        SignalEffect::Marker {
            unit,
            marker,
            count,
        }
    }

    /// True once nothing registered for this epoch is pending and the attack
    /// phase is not running.
    pub fn is_phase_quiet(&self) -> bool {
        !self.sequencer.is_active() && self.shared.barrier.is_quiescent(self.flow.epoch())
    }

    pub fn can_advance(&self) -> AdvanceCheck {
        self.guard.can_advance(
            self.flow.epoch(),
            Some(&self.shared.barrier),
            &self.shared.units,
        )
    }

    /// Runs the advance guard for the current epoch and advances when it allows.
    pub fn end_phase(&mut self) -> EndOfPhase {
        let epoch = self.flow.epoch();
        let decision =
            self.guard
                .handle_end_of_phase(epoch, Some(&self.shared.barrier), &mut self.shared.units);

        match decision {
            PhaseEndDecision::Advance { forced_clear } => {
                let window = self.advance();
                EndOfPhase::Advanced {
                    epoch: window.turn_id,
                    window,
                    forced_clear,
                }
            }
            PhaseEndDecision::RetryScheduled { delay } => EndOfPhase::RetryScheduled { delay },
            PhaseEndDecision::RetrySuppressed => EndOfPhase::RetrySuppressed,
            PhaseEndDecision::Stalled { check } => EndOfPhase::Stalled { check },
        }
    }

    /// Re-runs the end of phase once the scheduled retry delay elapsed.
    pub fn retry_end_phase(&mut self) -> EndOfPhase {
        self.guard.on_retry_fired();
        self.end_phase()
    }

    /// Moves to the next epoch and opens its first input window.
    ///
    /// Per-epoch state is dropped wholesale: the attack phase is aborted,
    /// manual move bindings are completed, reservations and intents are
    /// cleared.
    pub fn advance(&mut self) -> InputWindow {
        let epoch = self.flow.epoch();
        self.flow.end_turn();

        {
            let mut cx = self.shared.cx(epoch);
            self.sequencer.abort(&mut cx);
            self.dispatcher.clear_epoch(&mut cx);
        }
        self.intents.clear();
        self.planned_moves.clear();
        self.attack_queue.clear();
        self.gate.close();

        let next = self.flow.advance_turn();
        self.shared.barrier.begin_epoch(next);
        self.gate.prune_history(next);
        self.guard.reset_on_advance();
        self.flow.start_turn();
        self.open_input_window()
    }

    fn current_cell(&self, unit: UnitId) -> Result<Cell, EngineError> {
        self.shared
            .units
            .get(unit)
            .map(|state| state.cell)
            .ok_or(EngineError::UnitNotFound(unit))
    }
}

impl std::fmt::Debug for TurnEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnEngine")
            .field("flow", &self.flow)
            .field("window", &self.gate.window())
            .field("units", &self.shared.units.len())
            .field("services", &self.shared.services)
            .field("dispatcher", &self.dispatcher)
            .field("sequencer", &self.sequencer)
            .finish_non_exhaustive()
    }
}
