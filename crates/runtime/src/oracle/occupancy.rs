use std::collections::HashMap;

use tracing::debug;
use turn_core::{Cell, OccupancyService, UnitId, UnitRoster};

/// Positions and pending reservations keyed by unit.
///
/// A reservation is refused when another unit already reserved the cell or
/// is standing on it.
#[derive(Debug, Clone, Default)]
pub struct OccupancyMap {
    positions: HashMap<UnitId, Cell>,
    reservations: HashMap<UnitId, Cell>,
}

impl OccupancyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds positions from every unit in the roster.
    pub fn from_roster(units: &UnitRoster) -> Self {
        Self {
            positions: units.iter().map(|unit| (unit.id, unit.cell)).collect(),
            reservations: HashMap::new(),
        }
    }

    pub fn position(&self, unit: UnitId) -> Option<Cell> {
        self.positions.get(&unit).copied()
    }

    pub fn reserved_by(&self, unit: UnitId) -> Option<Cell> {
        self.reservations.get(&unit).copied()
    }

    pub fn reservation_count(&self) -> usize {
        self.reservations.len()
    }
}

impl OccupancyService for OccupancyMap {
    fn reserve_cell(&mut self, unit: UnitId, cell: Cell) -> bool {
        if self
            .reservation_owner(cell)
            .is_some_and(|holder| holder != unit)
        {
            return false;
        }
        if self.actor_at(cell).is_some_and(|occupant| occupant != unit) {
            return false;
        }
        self.reservations.insert(unit, cell);
        true
    }

    fn release(&mut self, unit: UnitId) {
        if let Some(cell) = self.reservations.remove(&unit) {
            debug!(target: "runtime::occupancy", %unit, %cell, "reservation dropped");
        }
    }

    fn actor_at(&self, cell: Cell) -> Option<UnitId> {
        self.positions
            .iter()
            .find_map(|(unit, at)| (*at == cell).then_some(*unit))
    }

    fn reservation_owner(&self, cell: Cell) -> Option<UnitId> {
        self.reservations
            .iter()
            .find_map(|(unit, at)| (*at == cell).then_some(*unit))
    }

    fn commit_cell(&mut self, unit: UnitId, cell: Cell) {
        self.positions.insert(unit, cell);
    }
}
