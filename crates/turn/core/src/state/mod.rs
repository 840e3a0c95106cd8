//! Identifiers, grid primitives, and per-unit state shared by every component.
mod action_state;
mod common;
mod unit;

pub use action_state::{
    ActionMarker, ActionState, ClearedMarkers, CompletionListener, ListenerOwner, MarkerCounts,
    MarkerSet,
};
pub use common::{ActionId, ActionTicket, Cell, Direction, Epoch, UnitId, WindowId, WorldPos};
pub use unit::{Controller, UnitKind, UnitRoster, UnitState};
