//! The tile grid robots walk on.
//!
//! The engine only talks to the grid through the [`Map`] trait. [`TileMap`] is
//! the in-memory implementation used by workspaces and tests.

use crate::codec::{self, Decoder, Encoder};
use crate::error::{DecodeError, MapError, SaveError};
use glam::IVec2;
use serde::{Deserialize, Serialize};
use std::io;

/// Contents of a single tile.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tile {
    #[default]
    Empty = 0,
    Wall = 1,
    WhiteTag = 2,
    GreyTag = 3,
    BlackTag = 4,
}

impl Tile {
    /// Persisted tile code.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Inverse of [`code`](Self::code).
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Empty),
            1 => Some(Self::Wall),
            2 => Some(Self::WhiteTag),
            3 => Some(Self::GreyTag),
            4 => Some(Self::BlackTag),
            _ => None,
        }
    }

    /// Robots may stand on anything but a wall.
    pub fn is_walkable(self) -> bool {
        self != Self::Wall
    }

    pub fn is_tag(self) -> bool {
        matches!(self, Self::WhiteTag | Self::GreyTag | Self::BlackTag)
    }
}

/// The view of the world the engine needs.
pub trait Map {
    /// Tile at `pos`. Positions outside the map read as [`Tile::Wall`].
    fn tile(&self, pos: IVec2) -> Tile;

    fn set_tile(&mut self, pos: IVec2, tile: Tile) -> Result<(), MapError>;

    fn is_walkable(&self, pos: IVec2) -> bool {
        self.tile(pos).is_walkable()
    }

    fn is_tag(&self, pos: IVec2) -> bool {
        self.tile(pos).is_tag()
    }
}

/// Largest width or height a [`TileMap`] can have.
pub const MAX_MAP_SIDE: i32 = 4096;

/// A rectangular grid of tiles stored row by row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TileGrid", into = "TileGrid")]
pub struct TileMap {
    width: i32,
    height: i32,
    tiles: Vec<Tile>,
}

/// Serialized form of a [`TileMap`], checked on the way in.
#[derive(Serialize, Deserialize)]
struct TileGrid {
    width: i32,
    height: i32,
    tiles: Vec<Tile>,
}

impl TryFrom<TileGrid> for TileMap {
    type Error = MapError;

    fn try_from(grid: TileGrid) -> Result<Self, Self::Error> {
        let TileGrid {
            width,
            height,
            tiles,
        } = grid;
        let fits = (0..=MAX_MAP_SIDE).contains(&width)
            && (0..=MAX_MAP_SIDE).contains(&height)
            && tiles.len() == tile_count(width, height);
        if !fits {
            return Err(MapError::SizeMismatch {
                width,
                height,
                tiles: tiles.len(),
            });
        }
        Ok(Self {
            width,
            height,
            tiles,
        })
    }
}

impl From<TileMap> for TileGrid {
    fn from(map: TileMap) -> Self {
        Self {
            width: map.width,
            height: map.height,
            tiles: map.tiles,
        }
    }
}

/// Tiles in a `width` x `height` grid, both already within `0..=MAX_MAP_SIDE`.
fn tile_count(width: i32, height: i32) -> usize {
    width as usize * height as usize
}

impl TileMap {
    /// Creates an all-empty map. Each side is clamped to `0..=MAX_MAP_SIDE`.
    pub fn new(width: i32, height: i32) -> Self {
        let width = width.clamp(0, MAX_MAP_SIDE);
        let height = height.clamp(0, MAX_MAP_SIDE);
        Self {
            width,
            height,
            tiles: vec![Tile::Empty; tile_count(width, height)],
        }
    }

    /// Builds a map from rows of characters.
    ///
    /// `.` empty, `#` wall, `w`/`g`/`b` white/grey/black tag. Any other
    /// character reads as empty. The width is that of the longest row, and
    /// anything past [`MAX_MAP_SIDE`] is dropped.
    pub fn from_rows(rows: &[&str]) -> Self {
        let side = MAX_MAP_SIDE as usize;
        let width = rows.iter().map(|r| r.chars().count()).max().unwrap_or(0);
        let mut map = Self::new(width.min(side) as i32, rows.len().min(side) as i32);
        let stride = map.width as usize;
        for (y, row) in rows.iter().take(side).enumerate() {
            for (x, ch) in row.chars().take(side).enumerate() {
                let tile = match ch {
                    '#' => Tile::Wall,
                    'w' => Tile::WhiteTag,
                    'g' => Tile::GreyTag,
                    'b' => Tile::BlackTag,
                    _ => Tile::Empty,
                };
                map.tiles[y * stride + x] = tile;
            }
        }
        map
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    /// True if `pos` lies inside the grid.
    pub fn contains(&self, pos: IVec2) -> bool {
        pos.x >= 0 && pos.y >= 0 && pos.x < self.width && pos.y < self.height
    }

    fn index(&self, pos: IVec2) -> Option<usize> {
        self.contains(pos)
            .then(|| (pos.y * self.width + pos.x) as usize)
    }

    pub fn save(&self, writer: impl io::Write) -> Result<(), SaveError> {
        let mut enc = Encoder::new();
        self.encode(&mut enc);
        enc.write_to(writer)?;
        Ok(())
    }

    pub fn load(reader: impl io::Read) -> Result<Self, DecodeError> {
        let text = codec::read_text(reader)?;
        let mut dec = Decoder::new(&text);
        let map = Self::decode(&mut dec)?;
        dec.expect_end()?;
        Ok(map)
    }

    /// Writes `<width> <height>`, a blank line, then one line per row.
    pub fn encode(&self, enc: &mut Encoder) {
        enc.line(format_args!("{} {}", self.width, self.height));
        enc.blank();
        for row in self.tiles.chunks(self.width.max(1) as usize) {
            let codes: Vec<String> = row.iter().map(|t| t.code().to_string()).collect();
            enc.line(format_args!("{}", codes.join(" ")));
        }
    }

    pub fn decode(dec: &mut Decoder<'_>) -> Result<Self, DecodeError> {
        let mut header = dec.line()?;
        let width = header.int("map width")?;
        let height = header.int("map height")?;
        header.finish()?;
        if !(0..=MAX_MAP_SIDE).contains(&width) {
            return Err(header.out_of_range("map width", width.into()));
        }
        if !(0..=MAX_MAP_SIDE).contains(&height) {
            return Err(header.out_of_range("map height", height.into()));
        }

        let mut map = Self::new(width, height);
        if width == 0 {
            return Ok(map);
        }
        for y in 0..height {
            let mut row = dec.line()?;
            for x in 0..width {
                let code = row.uint("tile code")?;
                let tile = Tile::from_code(code)
                    .ok_or_else(|| row.out_of_range("tile code", code.into()))?;
                map.tiles[(y * width + x) as usize] = tile;
            }
            row.finish()?;
        }
        Ok(map)
    }
}

impl Map for TileMap {
    fn tile(&self, pos: IVec2) -> Tile {
        self.index(pos).map_or(Tile::Wall, |i| self.tiles[i])
    }

    fn set_tile(&mut self, pos: IVec2, tile: Tile) -> Result<(), MapError> {
        let i = self.index(pos).ok_or(MapError::OutOfBounds(pos))?;
        self.tiles[i] = tile;
        Ok(())
    }
}
