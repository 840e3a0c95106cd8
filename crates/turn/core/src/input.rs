//! Input windows and player command validation.
//!
//! A window is bound to one `(turn, window)` pair. Commands are accepted only
//! while it is open and only when both ids match exactly, so a command built
//! for an earlier window is refused even inside the same turn.
use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::env::{MoveRejection, ServiceError, Services};
use crate::error::{ErrorContext, ErrorSeverity, GameError};
use crate::state::{Cell, Direction, Epoch, UnitId, UnitRoster, WindowId};

/// Kind of player command.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr, strum::EnumString,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum CommandKind {
    Move,
    Attack,
    Wait,
    /// Rotate in place. Never consumes the turn.
    TurnFacing,
}

impl CommandKind {
    /// Kinds that are meaningless without a direction.
    pub const fn is_directional(self) -> bool {
        matches!(self, Self::Move | Self::TurnFacing)
    }
}

/// A single player command as submitted by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Command {
    pub turn_id: Epoch,
    pub window_id: WindowId,
    pub kind: CommandKind,
    pub direction: Direction,
    /// [`Cell::NONE`] when the command carries no explicit target.
    pub target_cell: Cell,
}

impl Command {
    pub fn new(turn_id: Epoch, window_id: WindowId, kind: CommandKind) -> Self {
        Self {
            turn_id,
            window_id,
            kind,
            direction: Direction::ZERO,
            target_cell: Cell::NONE,
        }
    }

    #[must_use]
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    #[must_use]
    pub fn with_target(mut self, cell: Cell) -> Self {
        self.target_cell = cell;
        self
    }

    pub fn has_target(&self) -> bool {
        !self.target_cell.is_none()
    }

    /// Whether the command lacks the direction its kind needs.
    ///
    /// A move with an explicit target cell needs no direction.
    pub fn is_missing_direction(&self) -> bool {
        self.kind.is_directional()
            && self.direction.is_zero()
            && !(self.kind == CommandKind::Move && self.has_target())
    }

    /// Facing a unit standing on `from` takes for this command.
    ///
    /// Falls back to the direction of the target cell when none was given.
    pub fn facing_from(&self, from: Cell) -> Direction {
        if self.direction.is_zero() && self.has_target() {
            from.direction_to(self.target_cell)
        } else {
            self.direction
        }
    }
}

/// The currently bound acceptance window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InputWindow {
    pub turn_id: Epoch,
    pub window_id: WindowId,
    pub open: bool,
}

impl InputWindow {
    pub fn matches(&self, command: &Command) -> bool {
        self.turn_id == command.turn_id && self.window_id == command.window_id
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CommandRejection {
    #[error("input window is closed")]
    WindowClosed,

    #[error("command for {got} but the open window belongs to {expected}")]
    StaleTurn { expected: Epoch, got: Epoch },

    #[error("command for {got} but {expected} is open")]
    StaleWindow { expected: WindowId, got: WindowId },

    #[error("a command was already accepted for {turn}")]
    Duplicate { turn: Epoch },

    #[error("{kind} command requires a direction")]
    ZeroDirection { kind: CommandKind },

    #[error("unit {0} not found")]
    UnitNotFound(UnitId),

    #[error("move {from} -> {to} rejected: {reason}")]
    MoveRejected {
        from: Cell,
        to: Cell,
        reason: MoveRejection,
        /// Occupant whose declared intent targets the mover's cell.
        swap_with: Option<UnitId>,
        context: ErrorContext,
    },

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl GameError for CommandRejection {
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Service(err) => err.severity(),
            Self::UnitNotFound(_) => ErrorSeverity::Internal,
            _ => ErrorSeverity::Validation,
        }
    }

    fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::MoveRejected { context, .. } => Some(context),
            _ => None,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::WindowClosed => "COMMAND_WINDOW_CLOSED",
            Self::StaleTurn { .. } => "COMMAND_STALE_TURN",
            Self::StaleWindow { .. } => "COMMAND_STALE_WINDOW",
            Self::Duplicate { .. } => "COMMAND_DUPLICATE",
            Self::ZeroDirection { .. } => "COMMAND_ZERO_DIRECTION",
            Self::UnitNotFound(_) => "COMMAND_UNIT_NOT_FOUND",
            Self::MoveRejected { .. } => "COMMAND_MOVE_REJECTED",
            Self::Service(err) => err.error_code(),
        }
    }
}

/// A unit's declared `(current, next)` step for this epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeclaredIntent {
    pub unit: UnitId,
    pub current: Cell,
    pub next: Cell,
}

/// Per-epoch board of declared move intents. Only read for swap diagnostics.
#[derive(Clone, Debug, Default)]
pub struct IntentBoard {
    intents: BTreeMap<UnitId, DeclaredIntent>,
}

impl IntentBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, unit: UnitId, current: Cell, next: Cell) {
        self.intents.insert(unit, DeclaredIntent { unit, current, next });
    }

    pub fn get(&self, unit: UnitId) -> Option<&DeclaredIntent> {
        self.intents.get(&unit)
    }

    pub fn clear(&mut self) {
        self.intents.clear();
    }

    pub fn len(&self) -> usize {
        self.intents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }
}

/// Result of a command that passed validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CommandOutcome {
    /// The command consumed the turn and closed the window. `destination` is
    /// set for moves.
    Applied {
        command: Command,
        destination: Option<Cell>,
    },
    /// Only facing changed; the window stays open.
    RotatedNoTurn { facing: Direction },
}

/// Owns the input window and the per-turn accepted-command history.
#[derive(Clone, Debug, Default)]
pub struct CommandGate {
    window: InputWindow,
    history: BTreeMap<Epoch, Command>,
}

impl CommandGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn window(&self) -> InputWindow {
        self.window
    }

    pub fn is_open(&self) -> bool {
        self.window.open
    }

    /// Opens a window for `turn_id` under the freshly minted `window_id`.
    pub fn open(&mut self, turn_id: Epoch, window_id: WindowId) -> InputWindow {
        self.window = InputWindow {
            turn_id,
            window_id,
            open: true,
        };
        info!(target: "turn::input", turn = %turn_id, window = %window_id, "input window opened");
        self.window
    }

    pub fn close(&mut self) {
        if self.window.open {
            self.window.open = false;
            info!(
                target: "turn::input",
                turn = %self.window.turn_id,
                window = %self.window.window_id,
                "input window closed"
            );
        }
    }

    /// Window and history checks shared by every command kind.
    pub fn validate(&self, command: &Command) -> Result<(), CommandRejection> {
        if !self.window.open {
            return Err(CommandRejection::WindowClosed);
        }
        if command.turn_id != self.window.turn_id {
            return Err(CommandRejection::StaleTurn {
                expected: self.window.turn_id,
                got: command.turn_id,
            });
        }
        if command.window_id != self.window.window_id {
            return Err(CommandRejection::StaleWindow {
                expected: self.window.window_id,
                got: command.window_id,
            });
        }
        if command.kind != CommandKind::TurnFacing && self.history.contains_key(&command.turn_id) {
            return Err(CommandRejection::Duplicate {
                turn: command.turn_id,
            });
        }
        if command.is_missing_direction() {
            return Err(CommandRejection::ZeroDirection { kind: command.kind });
        }
        Ok(())
    }

    /// Checks terrain and occupancy for the move `unit` would make.
    ///
    /// Returns the destination cell. An "occupied" rejection also reports the
    /// occupant when its declared intent points back at the mover's cell;
    /// such swaps are logged and refused.
    pub fn validate_move(
        &self,
        unit: UnitId,
        command: &Command,
        units: &UnitRoster,
        services: &Services,
        intents: &IntentBoard,
    ) -> Result<Cell, CommandRejection> {
        let from = units
            .get(unit)
            .map(|state| state.cell)
            .ok_or(CommandRejection::UnitNotFound(unit))?;
        let to = if command.target_cell.is_none() {
            from.offset(command.direction)
        } else {
            command.target_cell
        };

        let pathfinding = services.pathfinding()?;
        let occupancy = services.occupancy()?;

        let rejected = |reason: MoveRejection, swap_with: Option<UnitId>| {
            CommandRejection::MoveRejected {
                from,
                to,
                reason,
                swap_with,
                context: ErrorContext::new()
                    .with_unit(unit)
                    .with_cell(to)
                    .with_epoch(command.turn_id),
            }
        };

        pathfinding
            .is_move_valid(from, to, unit)
            .map_err(|reason| rejected(reason, None))?;

        if let Some(occupant) = occupancy.actor_at(to).filter(|occupant| *occupant != unit) {
            let swap_with = intents
                .get(occupant)
                .filter(|intent| intent.next == from)
                .map(|intent| intent.unit);
            if swap_with.is_some() {
                warn!(
                    target: "turn::input",
                    %unit,
                    %occupant,
                    %from,
                    %to,
                    "swap detected: occupant intends to move into the mover's cell"
                );
            }
            return Err(rejected(MoveRejection::Occupied { occupant }, swap_with));
        }

        if let Some(holder) = occupancy
            .reservation_owner(to)
            .filter(|holder| *holder != unit)
        {
            return Err(rejected(MoveRejection::Reserved { holder }, None));
        }

        Ok(to)
    }

    /// Validates and applies a command for `unit`.
    ///
    /// Rejected moves still turn the unit toward the attempted direction and
    /// leave the window open. Accepted turn-consuming commands close the
    /// window and are recorded for duplicate detection.
    pub fn submit(
        &mut self,
        unit: UnitId,
        command: Command,
        units: &mut UnitRoster,
        services: &Services,
        intents: &IntentBoard,
    ) -> Result<CommandOutcome, CommandRejection> {
        let destination = self.check(unit, &command, units, services, intents)?;
        self.accept(unit, command, destination, units)
    }

    /// Runs every check without changing the window or history.
    ///
    /// Returns the destination for moves. A rejected move still updates the
    /// unit's facing.
    pub fn check(
        &self,
        unit: UnitId,
        command: &Command,
        units: &mut UnitRoster,
        services: &Services,
        intents: &IntentBoard,
    ) -> Result<Option<Cell>, CommandRejection> {
        if let Err(rejection) = self.validate(command) {
            warn!(
                target: "turn::input",
                %unit,
                turn = %command.turn_id,
                window = %command.window_id,
                code = rejection.error_code(),
                "command rejected: {rejection}"
            );
            return Err(rejection);
        }

        if command.kind != CommandKind::Move {
            return Ok(None);
        }

        match self.validate_move(unit, command, units, services, intents) {
            Ok(to) => Ok(Some(to)),
            Err(rejection) => {
                self.reject_move(unit, command, units, &rejection);
                Err(rejection)
            }
        }
    }

    /// Turns the unit toward a refused move. The window stays open.
    pub fn reject_move(
        &self,
        unit: UnitId,
        command: &Command,
        units: &mut UnitRoster,
        rejection: &dyn GameError,
    ) {
        if let Some(state) = units.get_mut(unit) {
            let facing = command.facing_from(state.cell);
            state.face(facing);
        }
        warn!(
            target: "turn::input",
            %unit,
            code = rejection.error_code(),
            error = %rejection,
            "move rejected, window stays open"
        );
    }

    /// Applies a command that passed [`check`](Self::check).
    ///
    /// `TurnFacing` only rotates the unit. Every other kind is recorded for
    /// the turn and closes the window.
    pub fn accept(
        &mut self,
        unit: UnitId,
        command: Command,
        destination: Option<Cell>,
        units: &mut UnitRoster,
    ) -> Result<CommandOutcome, CommandRejection> {
        let state = units
            .get_mut(unit)
            .ok_or(CommandRejection::UnitNotFound(unit))?;
        let facing = command.facing_from(state.cell);
        state.face(facing);

        if command.kind == CommandKind::TurnFacing {
            debug!(target: "turn::input", %unit, facing = %state.facing, "rotated without consuming the turn");
            return Ok(CommandOutcome::RotatedNoTurn {
                facing: state.facing,
            });
        }

        self.history.insert(command.turn_id, command);
        self.close();
        info!(
            target: "turn::input",
            %unit,
            turn = %command.turn_id,
            kind = %command.kind,
            "command accepted"
        );
        Ok(CommandOutcome::Applied {
            command,
            destination,
        })
    }

    pub fn last_accepted(&self, turn: Epoch) -> Option<&Command> {
        self.history.get(&turn)
    }

    /// Drops history for turns older than `oldest_kept`.
    pub fn prune_history(&mut self, oldest_kept: Epoch) {
        self.history = self.history.split_off(&oldest_kept);
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}
