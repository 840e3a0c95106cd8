//! Cell reservation and move dispatch.
//!
//! Moves are reserved while the turn is being resolved and dispatched
//! together afterwards. A reservation gives one unit exclusive claim on a
//! destination cell for the current epoch; dispatch re-checks that claim
//! before anything starts moving.
mod dispatch;
mod reservation;

pub use dispatch::{DispatchError, DispatchOutcome, MoveDispatcher, ResolvedMove};
pub use reservation::{ReservationError, ReservationTable};
