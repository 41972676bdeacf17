//! Error types for authoring, persisting and running robot programs.
//!
//! World-rule violations ([`RobotError`]) are not failures of the call that
//! triggered them: they are stored on the robot and stop it until reset.
//! Everything else is reported through `Result`.

use crate::program::{BlockId, ProcId, ProcIdent, StmtId};
use crate::robots::RobotId;
use glam::IVec2;
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// A world rule the robot broke while performing an intrinsic.
///
/// Sticky: once set, the robot refuses to step until it is reset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
pub enum RobotError {
    /// The tile in front of the robot is not walkable.
    #[error("hit a wall")]
    HitWall,
    /// Tried to put a tag on a tile that is not empty.
    #[error("tile is not empty")]
    AlreadyTag,
    /// Tried to pick up a tag from a tile that holds none.
    #[error("no tag to pick up")]
    NoTag,
}

impl RobotError {
    /// Persisted code; zero is reserved for "no error".
    pub fn code(self) -> u32 {
        match self {
            Self::HitWall => 1,
            Self::AlreadyTag => 2,
            Self::NoTag => 3,
        }
    }

    /// Inverse of [`code`](Self::code). `Some(None)` is the "no error" code.
    pub fn from_code(code: u32) -> Option<Option<Self>> {
        match code {
            0 => Some(None),
            1 => Some(Some(Self::HitWall)),
            2 => Some(Some(Self::AlreadyTag)),
            3 => Some(Some(Self::NoTag)),
            _ => None,
        }
    }
}

/// Failures while building or navigating a program module.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ModuleError {
    #[error("procedure identifier {0:?} must be {len} printable characters", len = crate::program::PROC_IDENT_LEN)]
    InvalidIdent(String),

    #[error("procedure {0} already exists")]
    DuplicateIdent(ProcIdent),

    #[error("unknown procedure {0:?}")]
    UnknownProc(ProcId),

    #[error("unknown block {0:?}")]
    UnknownBlock(BlockId),

    #[error("unknown statement {0:?}")]
    UnknownStmt(StmtId),

    /// The block is already the body of a procedure or a nested statement.
    #[error("block {0:?} already has an owner")]
    BlockOwned(BlockId),

    /// Adopting the block would make it contain itself.
    #[error("block {0:?} would become its own ancestor")]
    CyclicBlock(BlockId),

    /// The statement does not live inside the given procedure.
    #[error("statement {stmt:?} is not part of procedure {proc:?}")]
    ForeignStmt { proc: ProcId, stmt: StmtId },

    /// Adopting the block would nest blocks deeper than the limit.
    #[error("blocks nested deeper than {limit}")]
    NestingTooDeep { limit: usize },
}

/// Malformed persisted data. Aborts the whole load.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("read failed: {0}")]
    Io(#[from] io::Error),

    #[error("line {line}: unexpected end of input")]
    UnexpectedEof { line: usize },

    #[error("line {line}: expected {expected}, found {found:?}")]
    Malformed {
        line: usize,
        expected: &'static str,
        found: String,
    },

    #[error("line {line}: {what} {value} out of range")]
    OutOfRange {
        line: usize,
        what: &'static str,
        value: i64,
    },

    #[error("line {line}: call to unknown procedure {ident}")]
    UnresolvedProc { line: usize, ident: ProcIdent },

    #[error("line {line}: procedure {ident} defined twice")]
    DuplicateProc { line: usize, ident: ProcIdent },

    #[error("line {line}: procedure {ident} has no statement {index}")]
    BadStmtIndex {
        line: usize,
        ident: ProcIdent,
        index: u32,
    },

    #[error("line {line}: continuation stack deeper than {limit}")]
    StackTooDeep { line: usize, limit: usize },

    #[error("line {line}: blocks nested deeper than {limit}")]
    NestingTooDeep { line: usize, limit: usize },

    /// The decoded parts do not fit together into a valid program.
    #[error(transparent)]
    Module(#[from] ModuleError),
}

/// Failures while writing persisted data.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("write failed: {0}")]
    Io(#[from] io::Error),

    /// A cursor or continuation referenced a statement the module does not have.
    #[error(transparent)]
    Module(#[from] ModuleError),
}

/// Usage errors of the execution engine.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ExecError {
    /// The robot is already running a procedure or is stopped on an error.
    #[error("robot is busy")]
    Busy,

    /// `step` was called on a robot that is idle or stopped on an error.
    #[error("robot is not running")]
    NotRunning,

    #[error("continuation stack overflow (limit {limit})")]
    StackOverflow { limit: usize },

    #[error("unknown robot {0:?}")]
    UnknownRobot(RobotId),

    /// The program the robot was started with no longer matches the module.
    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error(transparent)]
    Robots(#[from] RobotsError),
}

/// Failures of the robots collection bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RobotsError {
    #[error("tile {0} is already occupied by a robot")]
    Occupied(IVec2),

    #[error("unknown robot {0:?}")]
    UnknownRobot(RobotId),

    /// The move would take a coordinate past the range of `i32`.
    #[error("moving robot {id:?} by {delta} leaves the coordinate space")]
    OutOfRange { id: RobotId, delta: IVec2 },
}

/// Failures of map mutation.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MapError {
    #[error("tile {0} is outside the map")]
    OutOfBounds(IVec2),

    /// The tile list does not cover the map's width and height.
    #[error("{width}x{height} map cannot hold {tiles} tiles")]
    SizeMismatch { width: i32, height: i32, tiles: usize },
}
