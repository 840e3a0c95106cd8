use std::fmt;

/// Unique identifier for a unit taking part in turn coordination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UnitId(pub u32);

impl UnitId {
    /// Conventional identifier for the locally controlled player unit.
    pub const PLAYER: Self = Self(0);

    #[inline]
    pub const fn is_player(self) -> bool {
        self.0 == Self::PLAYER.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonically increasing turn counter.
///
/// An epoch is created when the game starts (first epoch is `1`) and is only
/// incremented after the advance guard confirms that every action registered
/// for the current epoch has finished.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Epoch(pub u64);

impl Epoch {
    /// Epoch value before the first turn has started.
    pub const NONE: Self = Self(0);
    pub const FIRST: Self = Self(1);

    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the epoch `n` turns before this one, saturating at [`Epoch::NONE`].
    #[must_use]
    pub const fn back(self, n: u64) -> Self {
        Self(self.0.saturating_sub(n))
    }

    pub const fn is_started(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "turn {}", self.0)
    }
}

/// Identifier of an input window. Incremented every time a window is opened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WindowId(pub u64);

impl WindowId {
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window {}", self.0)
    }
}

/// Barrier-issued identifier for a single in-flight action.
///
/// Identifiers are unique for the lifetime of a barrier, not just per epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ActionId(pub u64);

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "act-{}", self.0)
    }
}

/// Pairing of an epoch and an action id, handed to whoever owns completion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ActionTicket {
    pub epoch: Epoch,
    pub action_id: ActionId,
}

impl ActionTicket {
    pub const fn new(epoch: Epoch, action_id: ActionId) -> Self {
        Self { epoch, action_id }
    }
}

/// Discrete grid cell expressed in tile coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub const ORIGIN: Self = Self { x: 0, y: 0 };

    /// Sentinel meaning "no target".
    pub const NONE: Self = Self { x: -1, y: -1 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub const fn is_none(self) -> bool {
        self.x == Self::NONE.x && self.y == Self::NONE.y
    }

    #[must_use]
    pub const fn offset(self, direction: Direction) -> Self {
        Self {
            x: self.x + direction.dx as i32,
            y: self.y + direction.dy as i32,
        }
    }

    /// Unit direction (each component clamped to -1..=1) pointing at `other`.
    pub fn direction_to(self, other: Cell) -> Direction {
        Direction::clamped(other.x - self.x, other.y - self.y)
    }

    /// Chebyshev distance, the metric used for 8-way grid movement.
    pub fn chebyshev_distance(self, other: Cell) -> u32 {
        let dx = (self.x - other.x).unsigned_abs();
        let dy = (self.y - other.y).unsigned_abs();
        dx.max(dy)
    }
}

impl Default for Cell {
    fn default() -> Self {
        Self::ORIGIN
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// One of the nine grid directions, each component in `-1..=1`.
///
/// `(0, 0)` is representable so that "no direction" can flow through
/// validation, but it is never a valid direction for a command.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Direction {
    pub dx: i8,
    pub dy: i8,
}

impl Direction {
    pub const ZERO: Self = Self { dx: 0, dy: 0 };
    pub const NORTH: Self = Self { dx: 0, dy: 1 };
    pub const SOUTH: Self = Self { dx: 0, dy: -1 };
    pub const EAST: Self = Self { dx: 1, dy: 0 };
    pub const WEST: Self = Self { dx: -1, dy: 0 };

    /// Builds a direction from arbitrary deltas, clamping each axis to `-1..=1`.
    pub fn clamped(dx: i32, dy: i32) -> Self {
        Self {
            dx: dx.clamp(-1, 1) as i8,
            dy: dy.clamp(-1, 1) as i8,
        }
    }

    /// Quantizes an analog input vector (e.g. a stick or mouse delta).
    ///
    /// Components whose magnitude is below `dead_zone` are treated as zero.
    pub fn from_vector(x: f32, y: f32, dead_zone: f32) -> Self {
        let axis = |v: f32| -> i32 {
            if v.abs() < dead_zone {
                0
            } else if v > 0.0 {
                1
            } else {
                -1
            }
        };
        Self::clamped(axis(x), axis(y))
    }

    pub const fn is_zero(self) -> bool {
        self.dx == 0 && self.dy == 0
    }

    pub const fn is_diagonal(self) -> bool {
        self.dx != 0 && self.dy != 0
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}, {}>", self.dx, self.dy)
    }
}

/// Continuous world-space location used by movement and presentation.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WorldPos {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl WorldPos {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}
