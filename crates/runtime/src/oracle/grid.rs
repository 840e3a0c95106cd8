use std::collections::HashSet;

use thiserror::Error;
use turn_core::{Cell, PathfindingOracle, TurnConfig, WorldPos};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridParseError {
    #[error("grid text has no rows")]
    Empty,

    #[error("row {row} has {found} tiles, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("unknown tile {tile:?} at row {row}, column {column}")]
    UnknownTile { tile: char, row: usize, column: usize },

    #[error("grid {width}x{height} exceeds the encodable coordinate range")]
    TooLarge { width: usize, height: usize },
}

/// Rectangular walkable grid with wall tiles, anchored at the origin.
///
/// `y` grows northward, so the first text row parsed by [`GridMap::parse`]
/// is the northern edge.
#[derive(Debug, Clone)]
pub struct GridMap {
    width: i32,
    height: i32,
    tile_size: f32,
    walls: HashSet<Cell>,
    spawns: Vec<(char, Cell)>,
}

impl GridMap {
    pub fn open(width: i32, height: i32) -> Self {
        Self {
            width: width.clamp(0, TurnConfig::MAX_GRID_COORD + 1),
            height: height.clamp(0, TurnConfig::MAX_GRID_COORD + 1),
            tile_size: 1.0,
            walls: HashSet::new(),
            spawns: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_tile_size(mut self, tile_size: f32) -> Self {
        self.tile_size = tile_size;
        self
    }

    #[must_use]
    pub fn with_wall(mut self, cell: Cell) -> Self {
        self.walls.insert(cell);
        self
    }

    #[must_use]
    pub fn with_walls(mut self, cells: impl IntoIterator<Item = Cell>) -> Self {
        self.walls.extend(cells);
        self
    }

    /// Parses an ASCII map: `#` is a wall, `.` is floor, and `@` or any
    /// ASCII letter is floor with a spawn marker.
    pub fn parse(text: &str) -> Result<Self, GridParseError> {
        let rows: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        let Some(first) = rows.first() else {
            return Err(GridParseError::Empty);
        };

        let width = first.chars().count();
        let height = rows.len();
        let limit = (TurnConfig::MAX_GRID_COORD + 1) as usize;
        if width > limit || height > limit {
            return Err(GridParseError::TooLarge { width, height });
        }

        let mut map = Self::open(width as i32, height as i32);
        for (row, line) in rows.iter().enumerate() {
            let found = line.chars().count();
            if found != width {
                return Err(GridParseError::RaggedRow {
                    row,
                    expected: width,
                    found,
                });
            }

            let y = (height - 1 - row) as i32;
            for (column, tile) in line.chars().enumerate() {
                let cell = Cell::new(column as i32, y);
                match tile {
                    '#' => {
                        map.walls.insert(cell);
                    }
                    '.' => {}
                    '@' | 'a'..='z' | 'A'..='Z' => map.spawns.push((tile, cell)),
                    _ => return Err(GridParseError::UnknownTile { tile, row, column }),
                }
            }
        }
        Ok(map)
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    /// Spawn markers in reading order.
    pub fn spawns(&self) -> &[(char, Cell)] {
        &self.spawns
    }

    pub fn contains(&self, cell: Cell) -> bool {
        (0..self.width).contains(&cell.x) && (0..self.height).contains(&cell.y)
    }

    pub fn is_wall(&self, cell: Cell) -> bool {
        self.walls.contains(&cell)
    }
}

impl PathfindingOracle for GridMap {
    fn world_to_cell(&self, position: WorldPos) -> Cell {
        Cell::new(
            (position.x / self.tile_size).floor() as i32,
            (position.y / self.tile_size).floor() as i32,
        )
    }

    fn cell_to_world(&self, cell: Cell, z: f32) -> WorldPos {
        WorldPos::new(
            cell.x as f32 * self.tile_size,
            cell.y as f32 * self.tile_size,
            z,
        )
    }

    fn is_cell_walkable(&self, cell: Cell) -> bool {
        self.contains(cell) && !self.is_wall(cell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turn_core::{MoveRejection, UnitId};

    const ROOM: &str = "
        #####
        #..g#
        #.#.#
        #@..#
        #####
    ";

    #[test]
    fn parse_flips_rows_so_north_is_up() {
        let map = GridMap::parse(ROOM).unwrap();
        assert_eq!((map.width(), map.height()), (5, 5));
        assert_eq!(map.spawns(), &[('g', Cell::new(3, 3)), ('@', Cell::new(1, 1))]);
        assert!(map.is_wall(Cell::new(2, 2)));
        assert!(!map.is_cell_walkable(Cell::new(0, 0)));
        assert!(!map.is_cell_walkable(Cell::new(7, 1)));
    }

    #[test]
    fn corner_cut_around_the_pillar_is_refused() {
        let map = GridMap::parse(ROOM).unwrap();
        assert_eq!(
            map.is_move_valid(Cell::new(1, 1), Cell::new(2, 2), UnitId::PLAYER),
            Err(MoveRejection::NotWalkable)
        );
        assert_eq!(
            map.is_move_valid(Cell::new(1, 2), Cell::new(2, 3), UnitId::PLAYER),
            Err(MoveRejection::CornerCut)
        );
        assert_eq!(
            map.is_move_valid(Cell::new(1, 3), Cell::new(2, 3), UnitId::PLAYER),
            Ok(())
        );
    }

    #[test]
    fn malformed_maps_are_rejected() {
        assert!(matches!(GridMap::parse("   \n"), Err(GridParseError::Empty)));
        assert!(matches!(
            GridMap::parse("...\n.."),
            Err(GridParseError::RaggedRow { row: 1, expected: 3, found: 2 })
        ));
        assert!(matches!(
            GridMap::parse("..?"),
            Err(GridParseError::UnknownTile { tile: '?', .. })
        ));
    }

    #[test]
    fn world_positions_snap_to_tiles() {
        let map = GridMap::open(8, 8).with_tile_size(2.0);
        assert_eq!(map.world_to_cell(WorldPos::new(5.9, 0.5, 0.0)), Cell::new(2, 0));
        assert_eq!(map.cell_to_world(Cell::new(3, 1), 1.5), WorldPos::new(6.0, 2.0, 1.5));
    }
}
