use crate::state::{Cell, UnitId, WorldPos};

/// Why a single-step move was refused.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MoveRejection {
    #[error("destination is {distance} cells away (must be exactly 1)")]
    InvalidDistance { distance: u32 },

    #[error("destination terrain is not walkable")]
    NotWalkable,

    #[error("diagonal step cuts a blocked corner")]
    CornerCut,

    #[error("cell occupied by {occupant}")]
    Occupied { occupant: UnitId },

    #[error("cell reserved by {holder}")]
    Reserved { holder: UnitId },
}

impl MoveRejection {
    pub fn is_occupied(&self) -> bool {
        matches!(self, Self::Occupied { .. })
    }
}

/// Grid geometry and terrain queries.
///
/// Occupancy is deliberately not part of this trait; see
/// [`OccupancyService`](super::OccupancyService).
pub trait PathfindingOracle: Send + Sync {
    fn world_to_cell(&self, position: WorldPos) -> Cell;

    fn cell_to_world(&self, cell: Cell, z: f32) -> WorldPos;

    fn is_cell_walkable(&self, cell: Cell) -> bool;

    /// Terrain-level legality of a one-cell step: distance, walkability and
    /// corner cutting on diagonals.
    fn is_move_valid(&self, from: Cell, to: Cell, _unit: UnitId) -> Result<(), MoveRejection> {
        let distance = from.chebyshev_distance(to);
        if distance != 1 {
            return Err(MoveRejection::InvalidDistance { distance });
        }

        if !self.is_cell_walkable(to) {
            return Err(MoveRejection::NotWalkable);
        }

        let direction = from.direction_to(to);
        if direction.is_diagonal() {
            let side_x = Cell::new(from.x + direction.dx as i32, from.y);
            let side_y = Cell::new(from.x, from.y + direction.dy as i32);
            if !self.is_cell_walkable(side_x) || !self.is_cell_walkable(side_y) {
                return Err(MoveRejection::CornerCut);
            }
        }

        Ok(())
    }
}
