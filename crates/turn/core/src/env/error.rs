//! Collaborator access errors.

use crate::error::{ErrorSeverity, GameError};
use crate::state::Cell;

/// Errors raised when a required collaborator is missing or refuses a query.
///
/// Components fail closed on these: a missing service never degrades into
/// "assume it would have said yes".
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ServiceError {
    #[error("pathfinding service not available")]
    PathfindingNotAvailable,

    #[error("occupancy service not available")]
    OccupancyNotAvailable,

    #[error("turn barrier not available")]
    BarrierNotAvailable,

    #[error("cell {0} is outside the encodable grid")]
    CellOutOfRange(Cell),
}

impl GameError for ServiceError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::PathfindingNotAvailable
            | Self::OccupancyNotAvailable
            | Self::BarrierNotAvailable => ErrorSeverity::Fatal,
            Self::CellOutOfRange(_) => ErrorSeverity::Validation,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::PathfindingNotAvailable => "SERVICE_PATHFINDING_NOT_AVAILABLE",
            Self::OccupancyNotAvailable => "SERVICE_OCCUPANCY_NOT_AVAILABLE",
            Self::BarrierNotAvailable => "SERVICE_BARRIER_NOT_AVAILABLE",
            Self::CellOutOfRange(_) => "SERVICE_CELL_OUT_OF_RANGE",
        }
    }
}
