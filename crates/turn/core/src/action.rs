//! Requests handed to the ability/capability engine.
//!
//! Every request that carries a [`ActionTicket`] must eventually be answered
//! with exactly one completion for that ticket. Starting an action returns
//! immediately; completion arrives later as a
//! [`CompletionSignal`](crate::engine::CompletionSignal).
use crate::state::{ActionTicket, Cell, UnitId};

/// Kind of per-unit action coordinated within a turn.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr, strum::EnumString,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ActionKind {
    Move,
    Attack,
    Wait,
}

/// What an attack is aimed at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AttackTarget {
    Unit(UnitId),
    Cell(Cell),
    /// The planner could not find anything to hit.
    Untargetable,
}

impl AttackTarget {
    pub const fn is_targetable(&self) -> bool {
        !matches!(self, Self::Untargetable)
    }
}

/// Start request for a single action.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ActionRequest {
    /// Ability-driven move. `magnitude` is the absolute-cell scalar code of `to`.
    Move {
        unit: UnitId,
        from: Cell,
        to: Cell,
        magnitude: i32,
        ticket: ActionTicket,
    },
    /// Attack ability activation for one attack-queue entry.
    Attack {
        unit: UnitId,
        target: AttackTarget,
        ticket: Option<ActionTicket>,
    },
}

impl ActionRequest {
    pub const fn unit(&self) -> UnitId {
        match self {
            Self::Move { unit, .. } | Self::Attack { unit, .. } => *unit,
        }
    }

    pub const fn kind(&self) -> ActionKind {
        match self {
            Self::Move { .. } => ActionKind::Move,
            Self::Attack { .. } => ActionKind::Attack,
        }
    }

    pub const fn ticket(&self) -> Option<ActionTicket> {
        match self {
            Self::Move { ticket, .. } => Some(*ticket),
            Self::Attack { ticket, .. } => *ticket,
        }
    }
}
