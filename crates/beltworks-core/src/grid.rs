//! Grid addressing: integer cells, chunk coordinates, rotations and the
//! conversions between world space and the grid.
//!
//! Everything here is pure. The grid uses a +Y-up basis: a rotation of 0°
//! faces +Y, 90° faces +X, 180° faces −Y and 270° faces −X.

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Side length of a chunk, in cells.
pub const CHUNK_SIZE: i32 = 32;

/// Side length of one cell in world units.
pub const CELL_SIZE: f32 = 1.0;

// ---------------------------------------------------------------------------
// GridPosition
// ---------------------------------------------------------------------------

/// A cell on the global 2D grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPosition {
    pub x: i32,
    pub y: i32,
}

impl GridPosition {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The cell offset by `(dx, dy)`.
    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// The adjacent cell in `dir`.
    pub fn step(&self, dir: Direction) -> Self {
        let (dx, dy) = dir.offset();
        self.offset(dx, dy)
    }

    /// The four edge-adjacent cells, in [`Direction::all`] order.
    pub fn neighbors_4(&self) -> [GridPosition; 4] {
        Direction::all().map(|dir| self.step(dir))
    }

    /// Whether all four neighbours exist. Cells on the `i32` boundary have
    /// none past it, so [`step`](Self::step) from them would overflow.
    pub fn is_interior(&self) -> bool {
        (i32::MIN + 1..i32::MAX).contains(&self.x) && (i32::MIN + 1..i32::MAX).contains(&self.y)
    }
}

// ---------------------------------------------------------------------------
// Rotation / Direction
// ---------------------------------------------------------------------------

/// Rotation of a placed entity, in quarter turns clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    /// 0°, facing +Y.
    #[default]
    None,
    /// 90° clockwise, facing +X.
    Cw90,
    /// 180°, facing −Y.
    Cw180,
    /// 270° clockwise, facing −X.
    Cw270,
}

impl Rotation {
    /// All four rotation values.
    pub fn all() -> [Rotation; 4] {
        [
            Rotation::None,
            Rotation::Cw90,
            Rotation::Cw180,
            Rotation::Cw270,
        ]
    }

    /// Rotate 90 degrees clockwise.
    pub fn rotate_cw(self) -> Self {
        match self {
            Rotation::None => Rotation::Cw90,
            Rotation::Cw90 => Rotation::Cw180,
            Rotation::Cw180 => Rotation::Cw270,
            Rotation::Cw270 => Rotation::None,
        }
    }

    /// Rotate 90 degrees counter-clockwise.
    pub fn rotate_ccw(self) -> Self {
        match self {
            Rotation::None => Rotation::Cw270,
            Rotation::Cw90 => Rotation::None,
            Rotation::Cw180 => Rotation::Cw90,
            Rotation::Cw270 => Rotation::Cw180,
        }
    }

    /// The rotation in degrees (0, 90, 180 or 270).
    pub fn degrees(self) -> i32 {
        match self {
            Rotation::None => 0,
            Rotation::Cw90 => 90,
            Rotation::Cw180 => 180,
            Rotation::Cw270 => 270,
        }
    }

    /// Parse a rotation from degrees. Values are normalised into `0..360`;
    /// anything that is not a cardinal step yields `None`.
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::None),
            90 => Some(Rotation::Cw90),
            180 => Some(Rotation::Cw180),
            270 => Some(Rotation::Cw270),
            _ => None,
        }
    }

    /// The direction an entity with this rotation faces.
    pub fn facing(self) -> Direction {
        match self {
            Rotation::None => Direction::North,
            Rotation::Cw90 => Direction::East,
            Rotation::Cw180 => Direction::South,
            Rotation::Cw270 => Direction::West,
        }
    }
}

/// Cardinal directions in the +Y-up grid basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// +Y
    North,
    /// +X
    East,
    /// −Y
    South,
    /// −X
    West,
}

impl Direction {
    /// All four cardinal directions.
    pub fn all() -> [Direction; 4] {
        [
            Direction::North,
            Direction::East,
            Direction::South,
            Direction::West,
        ]
    }

    /// Unit offset for this direction.
    pub fn offset(&self) -> (i32, i32) {
        match self {
            Direction::North => (0, 1),
            Direction::East => (1, 0),
            Direction::South => (0, -1),
            Direction::West => (-1, 0),
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::North => Direction::South,
            Direction::East => Direction::West,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
        }
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

/// Round a world-space position to the nearest cell.
pub fn snap_to_grid(world: Vec2) -> GridPosition {
    let scaled = (world / CELL_SIZE).round();
    GridPosition::new(scaled.x as i32, scaled.y as i32)
}

/// World-space position of a cell's centre.
pub fn grid_to_world(cell: GridPosition) -> Vec2 {
    Vec2::new(cell.x as f32, cell.y as f32) * CELL_SIZE
}

/// Unit offset for a rotation given in degrees. Rotations that are not a
/// cardinal step map to `(0, 0)`.
pub fn direction_for(degrees: i32) -> (i32, i32) {
    Rotation::from_degrees(degrees)
        .map(|rotation| rotation.facing().offset())
        .unwrap_or((0, 0))
}

// ---------------------------------------------------------------------------
// ChunkCoord
// ---------------------------------------------------------------------------

/// Coordinate of a [`CHUNK_SIZE`]-square region of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkCoord {
    pub x: i32,
    pub y: i32,
}

impl ChunkCoord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The chunk that owns `cell`. Negative cells round toward −∞.
    pub fn containing(cell: GridPosition) -> Self {
        Self::new(cell.x.div_euclid(CHUNK_SIZE), cell.y.div_euclid(CHUNK_SIZE))
    }

    /// The lowest-coordinate cell of this chunk.
    pub fn origin(&self) -> GridPosition {
        GridPosition::new(self.x * CHUNK_SIZE, self.y * CHUNK_SIZE)
    }

    pub fn contains(&self, cell: GridPosition) -> bool {
        Self::containing(cell) == *self
    }

    /// Cell coordinates relative to this chunk's origin.
    pub fn local(&self, cell: GridPosition) -> (i32, i32) {
        let origin = self.origin();
        (cell.x - origin.x, cell.y - origin.y)
    }

    /// Whether `cell` lies on this chunk's outer ring.
    pub fn is_border(&self, cell: GridPosition) -> bool {
        if !self.contains(cell) {
            return false;
        }
        let (lx, ly) = self.local(cell);
        lx == 0 || ly == 0 || lx == CHUNK_SIZE - 1 || ly == CHUNK_SIZE - 1
    }
}
