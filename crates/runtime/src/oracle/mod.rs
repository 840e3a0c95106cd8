//! In-memory implementations of the engine's collaborator traits.
//!
//! [`GridMap`] answers terrain queries for
//! [`turn_core::PathfindingOracle`] and [`OccupancyMap`] tracks positions and
//! reservations for [`turn_core::OccupancyService`]. Both are plain data and
//! are moved into the engine's [`turn_core::Services`] when the runtime is
//! built.
mod grid;
mod occupancy;

pub use grid::{GridMap, GridParseError};
pub use occupancy::OccupancyMap;
