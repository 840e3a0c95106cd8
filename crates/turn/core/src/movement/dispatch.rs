use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, error, info, warn};

use super::reservation::{ReservationError, ReservationTable};
use crate::action::ActionRequest;
use crate::context::TurnContext;
use crate::encoding::pack_cell;
use crate::env::{ServiceError, Services};
use crate::error::{ErrorContext, ErrorSeverity, GameError};
use crate::state::{ActionId, ActionTicket, Cell, Controller, UnitId};

/// A move the resolver settled on for this epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResolvedMove {
    pub unit: UnitId,
    pub current: Cell,
    /// Destination, or [`Cell::NONE`] when the unit stays put.
    pub next: Cell,
}

impl ResolvedMove {
    pub const fn new(unit: UnitId, current: Cell, next: Cell) -> Self {
        Self {
            unit,
            current,
            next,
        }
    }

    pub fn is_wait(&self) -> bool {
        self.next.is_none() || self.next == self.current
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DispatchOutcome {
    /// No-op move: a barrier action was registered and completed on the spot.
    Waited { action_id: ActionId },
    /// The player's move ability reacted; it reports completion itself.
    AbilityTriggered { ticket: ActionTicket, triggered: u32 },
    /// A direct movement command was issued; completion arrives as movement-finished.
    MovementIssued { ticket: ActionTicket },
    /// A player move is already in flight, so this dispatch was skipped.
    PlayerMoveInFlight,
}

impl DispatchOutcome {
    pub fn ticket(&self) -> Option<ActionTicket> {
        match self {
            Self::AbilityTriggered { ticket, .. } | Self::MovementIssued { ticket } => Some(*ticket),
            Self::Waited { .. } | Self::PlayerMoveInFlight => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("unit {0} is not registered")]
    UnitNotFound(UnitId),

    #[error("unit {0} cannot move")]
    NotMovable(UnitId),

    #[error("unit {unit} reserved {reserved:?} but tried to move to {requested}")]
    AuthorizationMismatch {
        unit: UnitId,
        reserved: Option<Cell>,
        requested: Cell,
        context: ErrorContext,
    },

    #[error("no capability reacted to the move request for {0}")]
    NoCapabilityTriggered(UnitId),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl GameError for DispatchError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::UnitNotFound(_) | Self::NotMovable(_) => ErrorSeverity::Validation,
            Self::AuthorizationMismatch { .. } | Self::NoCapabilityTriggered(_) => {
                ErrorSeverity::Internal
            }
            Self::Service(err) => err.severity(),
        }
    }

    fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::AuthorizationMismatch { context, .. } => Some(context),
            _ => None,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::UnitNotFound(_) => "DISPATCH_UNIT_NOT_FOUND",
            Self::NotMovable(_) => "DISPATCH_NOT_MOVABLE",
            Self::AuthorizationMismatch { .. } => "DISPATCH_AUTHORIZATION_MISMATCH",
            Self::NoCapabilityTriggered(_) => "DISPATCH_NO_CAPABILITY_TRIGGERED",
            Self::Service(err) => err.error_code(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct ManualBinding {
    ticket: ActionTicket,
    destination: Cell,
}

#[derive(Clone, Copy, Debug)]
struct PlayerMove {
    unit: UnitId,
    ticket: ActionTicket,
    destination: Cell,
}

/// Cell reservation and move dispatch manager.
///
/// Owns the epoch's reservation table, the manual completion bindings of
/// AI-driven moves, and the in-flight player move.
#[derive(Debug, Default)]
pub struct MoveDispatcher {
    reservations: ReservationTable,
    manual: BTreeMap<UnitId, ManualBinding>,
    movement_listeners: BTreeSet<UnitId>,
    player_move: Option<PlayerMove>,
}

impl MoveDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reservations(&self) -> &ReservationTable {
        &self.reservations
    }

    pub fn register_move(
        &mut self,
        unit: UnitId,
        cell: Cell,
        services: &mut Services,
    ) -> Result<(), ReservationError> {
        let occupancy = services.occupancy_mut()?;
        self.reservations.reserve(unit, cell, occupancy)
    }

    pub fn is_authorized(&self, unit: UnitId, cell: Cell) -> bool {
        self.reservations.is_authorized(unit, cell)
    }

    pub fn holds_reservation(&self, unit: UnitId, cell: Cell) -> bool {
        self.reservations.holds(unit, cell)
    }

    pub fn player_move_in_flight(&self) -> bool {
        self.player_move.is_some()
    }

    pub fn has_movement_listener(&self, unit: UnitId) -> bool {
        self.movement_listeners.contains(&unit)
    }

    /// Number of AI moves still waiting on a movement-finished signal.
    pub fn pending_manual_moves(&self) -> usize {
        self.manual.len()
    }

    /// Dispatches a resolved move. Every failure path releases the unit's reservation.
    pub fn dispatch(
        &mut self,
        mv: ResolvedMove,
        cx: &mut TurnContext<'_>,
    ) -> Result<DispatchOutcome, DispatchError> {
        match self.try_dispatch(mv, cx) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                warn!(
                    target: "turn::dispatch",
                    unit = %mv.unit,
                    next = %mv.next,
                    error = %err,
                    code = err.error_code(),
                    "move dispatch failed"
                );
                self.release(mv.unit, cx);
                Err(err)
            }
        }
    }

    fn try_dispatch(
        &mut self,
        mv: ResolvedMove,
        cx: &mut TurnContext<'_>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let unit = cx
            .units
            .get(mv.unit)
            .ok_or(DispatchError::UnitNotFound(mv.unit))?;
        if !unit.kind.is_movable() {
            return Err(DispatchError::NotMovable(mv.unit));
        }
        let controller = unit.controller;

        if mv.is_wait() {
            self.release(mv.unit, cx);
            let action_id = cx.barrier.register_action(mv.unit, cx.epoch);
            cx.barrier.complete_action(mv.unit, cx.epoch, action_id);
            debug!(target: "turn::dispatch", unit = %mv.unit, %action_id, "wait registered and completed");
            return Ok(DispatchOutcome::Waited { action_id });
        }

        if !self.reservations.is_authorized(mv.unit, mv.next) {
            let reserved = self.reservations.reserved_cell(mv.unit);
            error!(
                target: "turn::dispatch",
                unit = %mv.unit,
                reserved = ?reserved,
                requested = %mv.next,
                "move not authorized by reservation"
            );
            return Err(DispatchError::AuthorizationMismatch {
                unit: mv.unit,
                reserved,
                requested: mv.next,
                context: ErrorContext::new()
                    .with_unit(mv.unit)
                    .with_cell(mv.next)
                    .with_epoch(cx.epoch),
            });
        }

        cx.services.pathfinding()?;
        cx.services.occupancy()?;

        match controller {
            Controller::Player => self.dispatch_player(mv, cx),
            Controller::Ai => self.dispatch_ai(mv, cx),
        }
    }

    fn dispatch_player(
        &mut self,
        mv: ResolvedMove,
        cx: &mut TurnContext<'_>,
    ) -> Result<DispatchOutcome, DispatchError> {
        if let Some(in_flight) = &self.player_move {
            info!(
                target: "turn::dispatch",
                unit = %mv.unit,
                in_flight = %in_flight.unit,
                "player move already in progress, skipping"
            );
            return Ok(DispatchOutcome::PlayerMoveInFlight);
        }

        let magnitude = pack_cell(mv.next)?;

        if let Some(state) = cx.units.action_state_mut(mv.unit) {
            let cleansed = state.cleanse_blocking();
            if !cleansed.is_empty() {
                warn!(target: "turn::dispatch", unit = %mv.unit, cleared = %cleansed, "cleansed blocking markers before move");
            }
        }

        let action_id = cx.barrier.register_action(mv.unit, cx.epoch);
        let ticket = ActionTicket::new(cx.epoch, action_id);
        let request = ActionRequest::Move {
            unit: mv.unit,
            from: mv.current,
            to: mv.next,
            magnitude,
            ticket,
        };

        let triggered = cx.executor.start(&request);
        if triggered == 0 {
            cx.barrier.complete_action(mv.unit, cx.epoch, action_id);
            return Err(DispatchError::NoCapabilityTriggered(mv.unit));
        }

        if let Some(unit) = cx.units.get_mut(mv.unit) {
            unit.face(mv.current.direction_to(mv.next));
        }
        self.player_move = Some(PlayerMove {
            unit: mv.unit,
            ticket,
            destination: mv.next,
        });

        info!(target: "turn::dispatch", unit = %mv.unit, to = %mv.next, %action_id, triggered, "player move triggered");
        Ok(DispatchOutcome::AbilityTriggered { ticket, triggered })
    }

    fn dispatch_ai(
        &mut self,
        mv: ResolvedMove,
        cx: &mut TurnContext<'_>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let elevation = cx.units.get(mv.unit).map_or(0.0, |unit| unit.elevation);
        let target = cx.services.pathfinding()?.cell_to_world(mv.next, elevation);

        let action_id = cx.barrier.register_action(mv.unit, cx.epoch);
        let ticket = ActionTicket::new(cx.epoch, action_id);
        self.manual.insert(
            mv.unit,
            ManualBinding {
                ticket,
                destination: mv.next,
            },
        );
        self.movement_listeners.insert(mv.unit);

        if let Some(unit) = cx.units.get_mut(mv.unit) {
            unit.face(mv.current.direction_to(mv.next));
        }
        cx.executor.move_unit(mv.unit, &[target]);

        debug!(target: "turn::dispatch", unit = %mv.unit, to = %mv.next, %action_id, "ai movement issued");
        Ok(DispatchOutcome::MovementIssued { ticket })
    }

    /// Handles a movement-finished signal for an AI-driven move.
    ///
    /// Returns the completed ticket, or `None` when no listener was bound
    /// (stale or foreign signal).
    pub fn on_movement_finished(
        &mut self,
        unit: UnitId,
        cx: &mut TurnContext<'_>,
    ) -> Option<ActionTicket> {
        if !self.movement_listeners.remove(&unit) {
            debug!(target: "turn::dispatch", %unit, "movement finished without a bound listener");
            return None;
        }

        let binding = self.manual.remove(&unit)?;
        cx.barrier
            .complete_action(unit, binding.ticket.epoch, binding.ticket.action_id);
        self.commit(unit, binding.destination, cx);
        Some(binding.ticket)
    }

    /// Handles completion of the player's move ability.
    ///
    /// Returns `false` when `ticket` does not belong to the in-flight player move.
    pub fn on_player_move_finished(
        &mut self,
        unit: UnitId,
        ticket: ActionTicket,
        cx: &mut TurnContext<'_>,
    ) -> bool {
        match self.player_move {
            Some(in_flight) if in_flight.unit == unit && in_flight.ticket == ticket => {
                self.player_move = None;
                self.commit(unit, in_flight.destination, cx);
                true
            }
            _ => false,
        }
    }

    /// Removes the unit's reservation, manual binding and movement listener.
    ///
    /// A manual binding that is dropped here still has its barrier action
    /// completed so the epoch can drain.
    pub fn release(&mut self, unit: UnitId, cx: &mut TurnContext<'_>) {
        let reserved = self.reservations.remove(unit);
        self.movement_listeners.remove(&unit);
        if let Some(binding) = self.manual.remove(&unit) {
            cx.barrier
                .complete_action(unit, binding.ticket.epoch, binding.ticket.action_id);
        }
        if let Ok(occupancy) = cx.services.occupancy_mut() {
            occupancy.release(unit);
        }
        if let Some(cell) = reserved {
            debug!(target: "turn::dispatch", %unit, %cell, "reservation released");
        }
    }

    /// Wholesale clear at epoch boundaries.
    pub fn clear_epoch(&mut self, cx: &mut TurnContext<'_>) {
        for (unit, binding) in std::mem::take(&mut self.manual) {
            warn!(
                target: "turn::dispatch",
                %unit,
                action_id = %binding.ticket.action_id,
                "completing orphaned manual move on epoch clear"
            );
            cx.barrier
                .complete_action(unit, binding.ticket.epoch, binding.ticket.action_id);
        }
        self.movement_listeners.clear();
        self.player_move = None;

        let drained = self.reservations.drain();
        if let Ok(occupancy) = cx.services.occupancy_mut() {
            for (unit, _) in &drained {
                occupancy.release(*unit);
            }
        }
    }

    fn commit(&mut self, unit: UnitId, destination: Cell, cx: &mut TurnContext<'_>) {
        if let Some(state) = cx.units.get_mut(unit) {
            state.cell = destination;
        }
        self.reservations.remove(unit);
        if let Ok(occupancy) = cx.services.occupancy_mut() {
            occupancy.commit_cell(unit, destination);
            occupancy.release(unit);
        }
        debug!(target: "turn::dispatch", %unit, cell = %destination, "move committed");
    }
}
