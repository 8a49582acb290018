//! Maze grid, wall queries and line of sight

use rand::Rng;
use serde::Serialize;

/// Columns in the built-in layout
pub const DEFAULT_WIDTH: i32 = 16;
/// Rows in the built-in layout
pub const DEFAULT_HEIGHT: i32 = 32;
/// Coordinates travel as 6-bit fields on the wire
pub const MAX_DIMENSION: i32 = 64;

/// The classic 32-word maze, one word per row, most significant bit is column 0.
/// No four open squares share a common corner and the outside walls are filled in.
const DEFAULT_LAYOUT: [u16; DEFAULT_HEIGHT as usize] = [
    0o177777, 0o106401, 0o124675, 0o121205, 0o132055, 0o122741, 0o106415, 0o124161,
    0o121405, 0o135775, 0o101005, 0o135365, 0o121205, 0o127261, 0o120205, 0o106765,
    0o124405, 0o166575, 0o122005, 0o107735, 0o120001, 0o135575, 0o105005, 0o125365,
    0o125225, 0o121265, 0o105005, 0o135375, 0o100201, 0o135675, 0o110041, 0o177777,
];

/// Facing direction, in wire order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    North = 0,
    East = 1,
    South = 2,
    West = 3,
}

impl Direction {
    /// Decode the low two bits of a wire field
    pub fn from_bits(bits: u8) -> Self {
        match bits & 3 {
            0 => Direction::North,
            1 => Direction::East,
            2 => Direction::South,
            _ => Direction::West,
        }
    }

    pub fn bits(self) -> u8 {
        self as u8
    }

    pub fn right(self) -> Self {
        Self::from_bits(self.bits() + 1)
    }

    pub fn left(self) -> Self {
        Self::from_bits(self.bits() + 3)
    }

    pub fn reverse(self) -> Self {
        Self::from_bits(self.bits() + 2)
    }

    /// Unit step (dx, dy); north is towards row 0
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::North => (0, -1),
            Direction::East => (1, 0),
            Direction::South => (0, 1),
            Direction::West => (-1, 0),
        }
    }
}

/// A cell plus a facing direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pose {
    pub x: i32,
    pub y: i32,
    pub dir: Direction,
}

impl Pose {
    pub fn new(x: i32, y: i32, dir: Direction) -> Self {
        Self { x, y, dir }
    }

    /// The adjacent cell in direction `dir`
    pub fn step(self, dir: Direction) -> (i32, i32) {
        let (dx, dy) = dir.delta();
        (self.x + dx, self.y + dy)
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::new(0, 0, Direction::North)
    }
}

/// Errors from parsing a maze layout
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MazeError {
    #[error("maze layout is empty")]
    Empty,

    #[error("maze is {width}x{height}, limit is {max}x{max}", max = MAX_DIMENSION)]
    TooLarge { width: usize, height: usize },

    #[error("row {row} has {found} cells, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("unexpected character {ch:?} at row {row}, column {col}")]
    InvalidCell { row: usize, col: usize, ch: char },

    #[error("maze has no open interior cell to spawn in")]
    NoOpenCell,
}

/// Wall grid, one bit per cell
#[derive(Debug, Clone)]
pub struct Maze {
    width: i32,
    height: i32,
    /// Bit `x` of `rows[y]` is set when (x, y) is a wall
    rows: Vec<u64>,
}

impl Maze {
    /// Parse a text layout: `#` or `$` is a wall, space or `.` is open.
    /// Trailing blank lines are ignored.
    pub fn parse(text: &str) -> Result<Self, MazeError> {
        let lines: Vec<&str> = text
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .collect();
        let used = lines
            .iter()
            .rposition(|line| !line.is_empty())
            .map(|last| last + 1)
            .ok_or(MazeError::Empty)?;
        let lines = &lines[..used];

        let width = lines[0].chars().count();
        let height = lines.len();
        if width == 0 {
            return Err(MazeError::Empty);
        }
        if width > MAX_DIMENSION as usize || height > MAX_DIMENSION as usize {
            return Err(MazeError::TooLarge { width, height });
        }

        let mut rows = Vec::with_capacity(height);
        for (row, line) in lines.iter().enumerate() {
            let found = line.chars().count();
            if found != width {
                return Err(MazeError::RaggedRow {
                    row,
                    expected: width,
                    found,
                });
            }

            let mut bits = 0u64;
            for (col, ch) in line.chars().enumerate() {
                match ch {
                    '#' | '$' => bits |= 1u64 << col,
                    ' ' | '.' => {}
                    _ => return Err(MazeError::InvalidCell { row, col, ch }),
                }
            }
            rows.push(bits);
        }

        let maze = Self {
            width: width as i32,
            height: height as i32,
            rows,
        };
        if !maze.has_open_interior() {
            return Err(MazeError::NoOpenCell);
        }
        Ok(maze)
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    /// Anything outside the grid counts as a wall
    pub fn is_wall(&self, x: i32, y: i32) -> bool {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return true;
        }
        self.rows[y as usize] & (1u64 << x) != 0
    }

    /// Distance from `from` to `to` along `from.dir`, or `None` when `to` is not
    /// ahead on the same row/column or a wall lies strictly between them.
    pub fn line_of_sight(&self, from: Pose, to: Pose) -> Option<i32> {
        let (dx, dy) = from.dir.delta();
        let dist = match from.dir {
            Direction::North | Direction::South => {
                if from.x != to.x {
                    return None;
                }
                (to.y - from.y) * dy
            }
            Direction::East | Direction::West => {
                if from.y != to.y {
                    return None;
                }
                (to.x - from.x) * dx
            }
        };
        if dist <= 0 {
            return None;
        }

        (1..dist)
            .all(|step| !self.is_wall(from.x + dx * step, from.y + dy * step))
            .then_some(dist)
    }

    /// Sample interior cells until an open one turns up. The facing comes from
    /// the coordinates, so a given cell always spawns the same way.
    pub fn random_open_pose<R: Rng>(&self, rng: &mut R) -> Pose {
        loop {
            let x = rng.gen_range(1..self.width - 1);
            let y = rng.gen_range(1..self.height - 1);
            if !self.is_wall(x, y) {
                return Pose::new(x, y, Direction::from_bits((x ^ y) as u8));
            }
        }
    }

    fn has_open_interior(&self) -> bool {
        (1..self.height - 1).any(|y| (1..self.width - 1).any(|x| !self.is_wall(x, y)))
    }
}

impl Default for Maze {
    fn default() -> Self {
        let rows = DEFAULT_LAYOUT
            .iter()
            .map(|word| {
                (0..DEFAULT_WIDTH)
                    .filter(|&x| word & (0x8000u16 >> x) != 0)
                    .fold(0u64, |bits, x| bits | 1u64 << x)
            })
            .collect();

        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            rows,
        }
    }
}
