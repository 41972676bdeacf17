//! Compass directions on the tile grid.

use glam::IVec2;
use serde::{Deserialize, Serialize};

/// One of the four directions a robot can face.
///
/// The discriminants are the persisted codes and follow counter-clockwise
/// order, so turning left is "next discriminant, wrapping".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    East = 0,
    North = 1,
    West = 2,
    South = 3,
}

impl Direction {
    /// All directions in counter-clockwise order, starting east.
    pub const ALL: [Direction; 4] = [
        Direction::East,
        Direction::North,
        Direction::West,
        Direction::South,
    ];

    /// The direction after a quarter turn counter-clockwise.
    pub fn turn_left(self) -> Self {
        match self {
            Self::East => Self::North,
            Self::North => Self::West,
            Self::West => Self::South,
            Self::South => Self::East,
        }
    }

    /// Unit step in tile coordinates. Y grows downwards (south).
    pub fn offset(self) -> IVec2 {
        match self {
            Self::East => IVec2::new(1, 0),
            Self::North => IVec2::new(0, -1),
            Self::West => IVec2::new(-1, 0),
            Self::South => IVec2::new(0, 1),
        }
    }

    /// Persisted code, counter-clockwise from east.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Inverse of [`code`](Self::code).
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }
}
