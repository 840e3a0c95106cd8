use crate::state::{Cell, UnitId};

/// Authoritative cell occupancy and reservation bookkeeping.
///
/// The move reservation table in this crate sits in front of this service:
/// it only forwards a reservation after its own exclusivity check passed, and
/// rolls its own record back when the service refuses.
pub trait OccupancyService: Send {
    /// Attempts to reserve `cell` for `unit`. Returns `false` when refused.
    fn reserve_cell(&mut self, unit: UnitId, cell: Cell) -> bool;

    /// Drops any reservation held by `unit`. Releasing nothing is a no-op.
    fn release(&mut self, unit: UnitId);

    /// Unit currently standing on `cell`.
    fn actor_at(&self, cell: Cell) -> Option<UnitId>;

    fn is_reserved(&self, cell: Cell) -> bool {
        self.reservation_owner(cell).is_some()
    }

    fn reservation_owner(&self, cell: Cell) -> Option<UnitId>;

    /// Records `unit` as standing on `cell` after a completed move.
    fn commit_cell(&mut self, unit: UnitId, cell: Cell);
}
