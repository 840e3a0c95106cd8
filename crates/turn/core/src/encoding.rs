//! Scalar encoding of directions and absolute cells.
//!
//! Ability events carry a single integer magnitude. Directions and absolute
//! cells occupy disjoint ranges so a receiver can tell them apart:
//!
//! | range                | meaning         |
//! |----------------------|-----------------|
//! | `>= 2_000_000`       | absolute cell   |
//! | `1000..=1999`        | direction       |
//! | anything else        | invalid         |
//!
//! Every code fits in 23 bits, so it survives a round trip through `f32`.
use crate::config::TurnConfig;
use crate::env::ServiceError;
use crate::state::{Cell, Direction};

pub const DIR_BASE: i32 = 1000;
pub const DIR_MAX: i32 = 1999;
pub const CELL_BASE: i32 = 2_000_000;
pub const CELL_BIAS: i32 = 1024;
pub const CELL_STRIDE: i32 = 2048;
pub const CELL_MAX: i32 = CELL_BASE + CELL_STRIDE * CELL_STRIDE - 1;

/// Packs a direction, clamping each axis to `-1..=1` first.
pub fn pack_dir(dx: i32, dy: i32) -> i32 {
    let dx = dx.clamp(-1, 1);
    let dy = dy.clamp(-1, 1);
    DIR_BASE + (dx + 1) * 100 + (dy + 1)
}

pub fn pack_direction(direction: Direction) -> i32 {
    pack_dir(direction.dx as i32, direction.dy as i32)
}

/// Unpacks a direction code. The zero direction is never valid.
pub fn unpack_dir(magnitude: i32) -> Option<Direction> {
    let v = magnitude.checked_sub(DIR_BASE)?;
    if !(0..=9999).contains(&v) {
        return None;
    }
    let direction = Direction::clamped(v / 100 - 1, v % 100 - 1);
    (!direction.is_zero()).then_some(direction)
}

/// Packs an absolute grid cell. Both coordinates must lie in `-1024..=1023`.
pub fn pack_cell(cell: Cell) -> Result<i32, ServiceError> {
    let range = TurnConfig::MIN_GRID_COORD..=TurnConfig::MAX_GRID_COORD;
    if !range.contains(&cell.x) || !range.contains(&cell.y) {
        return Err(ServiceError::CellOutOfRange(cell));
    }
    Ok(CELL_BASE + (cell.x + CELL_BIAS) * CELL_STRIDE + (cell.y + CELL_BIAS))
}

pub fn unpack_cell(magnitude: i32) -> Option<Cell> {
    if !(CELL_BASE..=CELL_MAX).contains(&magnitude) {
        return None;
    }
    let v = magnitude - CELL_BASE;
    Some(Cell::new(v / CELL_STRIDE - CELL_BIAS, v % CELL_STRIDE - CELL_BIAS))
}

/// A decoded event magnitude.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Magnitude {
    Cell(Cell),
    Direction(Direction),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DecodeError {
    #[error("magnitude {0} is neither a cell nor a direction code")]
    UnknownRange(i32),

    #[error("direction code {0} decodes to the zero direction")]
    ZeroDirection(i32),

    #[error("cell code {0} exceeds the encodable grid")]
    CellOverflow(i32),
}

/// Classifies a magnitude by range and decodes it.
pub fn decode_magnitude(magnitude: i32) -> Result<Magnitude, DecodeError> {
    if magnitude >= CELL_BASE {
        unpack_cell(magnitude)
            .map(Magnitude::Cell)
            .ok_or(DecodeError::CellOverflow(magnitude))
    } else if (DIR_BASE..=DIR_MAX).contains(&magnitude) {
        unpack_dir(magnitude)
            .map(Magnitude::Direction)
            .ok_or(DecodeError::ZeroDirection(magnitude))
    } else {
        Err(DecodeError::UnknownRange(magnitude))
    }
}
