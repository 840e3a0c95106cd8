use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use crate::env::{OccupancyService, ServiceError};
use crate::error::{ErrorContext, ErrorSeverity, GameError};
use crate::state::{Cell, UnitId};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ReservationError {
    #[error("cell {cell} is already reserved by {holder}")]
    CellTaken {
        cell: Cell,
        holder: UnitId,
        context: ErrorContext,
    },

    #[error("occupancy service refused to reserve {cell}")]
    OccupancyRefused { cell: Cell, context: ErrorContext },

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl GameError for ReservationError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::CellTaken { .. } | Self::OccupancyRefused { .. } => ErrorSeverity::Recoverable,
            Self::Service(err) => err.severity(),
        }
    }

    fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::CellTaken { context, .. } | Self::OccupancyRefused { context, .. } => {
                Some(context)
            }
            Self::Service(_) => None,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::CellTaken { .. } => "RESERVATION_CELL_TAKEN",
            Self::OccupancyRefused { .. } => "RESERVATION_OCCUPANCY_REFUSED",
            Self::Service(err) => err.error_code(),
        }
    }
}

/// One-to-one unit ↔ destination cell table for the current epoch.
#[derive(Clone, Debug, Default)]
pub struct ReservationTable {
    by_unit: BTreeMap<UnitId, Cell>,
    by_cell: HashMap<Cell, UnitId>,
}

impl ReservationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves `cell` for `unit`, replacing the unit's previous reservation.
    ///
    /// The table is updated first and then the occupancy service is asked to
    /// confirm. A refusal restores the previous entry so no partial state remains.
    pub fn reserve(
        &mut self,
        unit: UnitId,
        cell: Cell,
        occupancy: &mut dyn OccupancyService,
    ) -> Result<(), ReservationError> {
        if let Some(&holder) = self.by_cell.get(&cell) {
            if holder == unit {
                return Ok(());
            }
            warn!(target: "turn::reservation", %unit, %cell, %holder, "cell already reserved");
            return Err(ReservationError::CellTaken {
                cell,
                holder,
                context: ErrorContext::new().with_unit(unit).with_cell(cell),
            });
        }

        let previous = self.insert(unit, cell);

        if !occupancy.reserve_cell(unit, cell) {
            self.by_cell.remove(&cell);
            self.by_unit.remove(&unit);
            if let Some(previous) = previous {
                self.insert(unit, previous);
            }
            warn!(target: "turn::reservation", %unit, %cell, "occupancy refused reservation, rolled back");
            return Err(ReservationError::OccupancyRefused {
                cell,
                context: ErrorContext::new()
                    .with_unit(unit)
                    .with_cell(cell)
                    .with_message("occupancy service refused"),
            });
        }

        debug!(target: "turn::reservation", %unit, %cell, "cell reserved");
        Ok(())
    }

    /// A unit without a reservation is unconstrained; otherwise it may only
    /// move to the cell it reserved.
    pub fn is_authorized(&self, unit: UnitId, cell: Cell) -> bool {
        self.by_unit.get(&unit).is_none_or(|reserved| *reserved == cell)
    }

    /// Strict variant of [`is_authorized`](Self::is_authorized).
    pub fn holds(&self, unit: UnitId, cell: Cell) -> bool {
        self.by_unit.get(&unit) == Some(&cell)
    }

    pub fn reserved_cell(&self, unit: UnitId) -> Option<Cell> {
        self.by_unit.get(&unit).copied()
    }

    pub fn holder_of(&self, cell: Cell) -> Option<UnitId> {
        self.by_cell.get(&cell).copied()
    }

    /// Removes the unit's table entry. The occupancy service is not touched.
    pub fn remove(&mut self, unit: UnitId) -> Option<Cell> {
        let cell = self.by_unit.remove(&unit)?;
        self.by_cell.remove(&cell);
        Some(cell)
    }

    /// Drains the table, yielding every unit that held a reservation.
    pub fn drain(&mut self) -> Vec<(UnitId, Cell)> {
        self.by_cell.clear();
        std::mem::take(&mut self.by_unit).into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.by_unit.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_unit.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (UnitId, Cell)> + '_ {
        self.by_unit.iter().map(|(unit, cell)| (*unit, *cell))
    }

    fn insert(&mut self, unit: UnitId, cell: Cell) -> Option<Cell> {
        let previous = self.by_unit.insert(unit, cell);
        if let Some(previous) = previous {
            self.by_cell.remove(&previous);
        }
        self.by_cell.insert(cell, unit);
        previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[derive(Default)]
    struct StubOccupancy {
        refused: HashSet<Cell>,
        reserved: HashMap<UnitId, Cell>,
    }

    impl OccupancyService for StubOccupancy {
        fn reserve_cell(&mut self, unit: UnitId, cell: Cell) -> bool {
            if self.refused.contains(&cell) {
                return false;
            }
            self.reserved.insert(unit, cell);
            true
        }

        fn release(&mut self, unit: UnitId) {
            self.reserved.remove(&unit);
        }

        fn actor_at(&self, _cell: Cell) -> Option<UnitId> {
            None
        }

        fn reservation_owner(&self, cell: Cell) -> Option<UnitId> {
            self.reserved
                .iter()
                .find(|(_, c)| **c == cell)
                .map(|(u, _)| *u)
        }

        fn commit_cell(&mut self, _unit: UnitId, _cell: Cell) {}
    }

    #[test]
    fn second_unit_cannot_take_a_reserved_cell() {
        let mut occupancy = StubOccupancy::default();
        let mut table = ReservationTable::new();
        let cell = Cell::new(2, 3);

        table.reserve(UnitId(1), cell, &mut occupancy).unwrap();
        let err = table.reserve(UnitId(2), cell, &mut occupancy).unwrap_err();

        assert_eq!(err.error_code(), "RESERVATION_CELL_TAKEN");
        assert!(err.severity().is_recoverable());
        assert_eq!(table.holder_of(cell), Some(UnitId(1)));
        assert_eq!(table.reserved_cell(UnitId(2)), None);
    }

    #[test]
    fn refusal_restores_previous_reservation() {
        let mut occupancy = StubOccupancy::default();
        let blocked = Cell::new(9, 9);
        occupancy.refused.insert(blocked);

        let mut table = ReservationTable::new();
        table.reserve(UnitId(1), Cell::new(1, 1), &mut occupancy).unwrap();

        let err = table.reserve(UnitId(1), blocked, &mut occupancy).unwrap_err();
        assert!(matches!(err, ReservationError::OccupancyRefused { .. }));
        assert_eq!(table.reserved_cell(UnitId(1)), Some(Cell::new(1, 1)));
        assert_eq!(table.holder_of(blocked), None);
        assert_eq!(table.holder_of(Cell::new(1, 1)), Some(UnitId(1)));
    }

    #[test]
    fn re_reserving_moves_the_unit_to_the_new_cell() {
        let mut occupancy = StubOccupancy::default();
        let mut table = ReservationTable::new();
        table.reserve(UnitId(1), Cell::new(1, 1), &mut occupancy).unwrap();
        table.reserve(UnitId(1), Cell::new(1, 2), &mut occupancy).unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.holder_of(Cell::new(1, 1)), None);
        table.reserve(UnitId(2), Cell::new(1, 1), &mut occupancy).unwrap();
    }

    #[test]
    fn authorization_rules() {
        let mut occupancy = StubOccupancy::default();
        let mut table = ReservationTable::new();
        assert!(table.is_authorized(UnitId(5), Cell::new(0, 0)));
        assert!(!table.holds(UnitId(5), Cell::new(0, 0)));

        table.reserve(UnitId(5), Cell::new(4, 4), &mut occupancy).unwrap();
        assert!(table.is_authorized(UnitId(5), Cell::new(4, 4)));
        assert!(!table.is_authorized(UnitId(5), Cell::new(4, 5)));
        assert!(table.holds(UnitId(5), Cell::new(4, 4)));
    }

    #[test]
    fn exclusivity_survives_a_reservation_storm() {
        let mut occupancy = StubOccupancy::default();
        occupancy.refused.insert(Cell::new(0, 2));
        let mut table = ReservationTable::new();

        for round in 0..6u32 {
            for unit in 0..8u32 {
                let cell = Cell::new(((unit + round) % 3) as i32, ((unit * round) % 3) as i32);
                let _ = table.reserve(UnitId(unit), cell, &mut occupancy);
            }
        }

        let mut seen = HashSet::new();
        for (_, cell) in table.iter() {
            assert!(seen.insert(cell), "cell {cell} reserved twice");
        }
    }
}
