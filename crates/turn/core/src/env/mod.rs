//! Collaborators consumed by the turn core.
//!
//! Pathfinding and occupancy are owned by the host and handed to the engine as
//! a [`Services`] bundle. Either may be absent; every component that needs one
//! fails closed with a [`ServiceError`] instead of guessing.
mod error;
mod executor;
mod occupancy;
mod pathfinding;

pub use error::ServiceError;
pub use executor::{ActionExecutor, InertExecutor};
pub use occupancy::OccupancyService;
pub use pathfinding::{MoveRejection, PathfindingOracle};

/// Aggregates the grid services required by reservation, dispatch and validation.
#[derive(Default)]
pub struct Services {
    pathfinding: Option<Box<dyn PathfindingOracle>>,
    occupancy: Option<Box<dyn OccupancyService>>,
}

impl Services {
    pub fn new(
        pathfinding: impl PathfindingOracle + 'static,
        occupancy: impl OccupancyService + 'static,
    ) -> Self {
        Self {
            pathfinding: Some(Box::new(pathfinding)),
            occupancy: Some(Box::new(occupancy)),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_pathfinding(mut self, pathfinding: impl PathfindingOracle + 'static) -> Self {
        self.pathfinding = Some(Box::new(pathfinding));
        self
    }

    #[must_use]
    pub fn with_occupancy(mut self, occupancy: impl OccupancyService + 'static) -> Self {
        self.occupancy = Some(Box::new(occupancy));
        self
    }

    pub fn pathfinding(&self) -> Result<&(dyn PathfindingOracle + 'static), ServiceError> {
        self.pathfinding
            .as_deref()
            .ok_or(ServiceError::PathfindingNotAvailable)
    }

    pub fn occupancy(&self) -> Result<&(dyn OccupancyService + 'static), ServiceError> {
        self.occupancy
            .as_deref()
            .ok_or(ServiceError::OccupancyNotAvailable)
    }

    pub fn occupancy_mut(&mut self) -> Result<&mut (dyn OccupancyService + 'static), ServiceError> {
        self.occupancy
            .as_deref_mut()
            .ok_or(ServiceError::OccupancyNotAvailable)
    }

    pub fn has_pathfinding(&self) -> bool {
        self.pathfinding.is_some()
    }

    pub fn has_occupancy(&self) -> bool {
        self.occupancy.is_some()
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("pathfinding", &self.pathfinding.is_some())
            .field("occupancy", &self.occupancy.is_some())
            .finish()
    }
}
