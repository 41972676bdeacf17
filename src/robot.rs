//! Robot state and its primitive world actions.

use crate::codec::{Decoder, Encoder};
use crate::direction::Direction;
use crate::error::{DecodeError, ModuleError, RobotError};
use crate::map::{Map, Tile};
use crate::program::{Condition, ConditionKind, Intrinsic, Module};
use crate::stack::{Continuation, ContinuationStack};
use glam::IVec2;
use tracing::warn;

/// Where a running robot will continue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cursor {
    /// Execute (or loop back to) this statement next.
    At(Continuation),
    /// The current block has no statements left; the next step leaves it.
    ///
    /// Only reached by starting a procedure whose body is empty.
    Finish,
}

/// A single robot on the map.
///
/// Tracks position, facing and the execution cursor. The robot is busy while
/// it has a cursor; a sticky [`RobotError`] freezes the cursor until
/// [`reset`](crate::Robots::reset).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Robot {
    pub(crate) position: IVec2,
    pub(crate) facing: Direction,
    pub(crate) error: Option<RobotError>,
    pub(crate) cursor: Option<Cursor>,
    pub(crate) stack: ContinuationStack,
}

impl Robot {
    pub(crate) fn new(position: IVec2, facing: Direction, max_stack_depth: usize) -> Self {
        Self {
            position,
            facing,
            error: None,
            cursor: None,
            stack: ContinuationStack::new(max_stack_depth),
        }
    }

    /// The tile the robot stands on.
    pub fn position(&self) -> IVec2 {
        self.position
    }

    /// The direction a move goes.
    pub fn facing(&self) -> Direction {
        self.facing
    }

    /// The sticky error the robot stopped on, if any.
    pub fn error(&self) -> Option<RobotError> {
        self.error
    }

    /// True while the robot has a program position, including when stopped.
    pub fn is_busy(&self) -> bool {
        self.cursor.is_some()
    }

    /// True once a world rule was broken and until the robot is reset.
    pub fn is_stopped(&self) -> bool {
        self.error.is_some()
    }

    /// What the next step executes, `None` while idle.
    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    /// Continuations waiting for the current block to finish.
    pub fn stack(&self) -> &ContinuationStack {
        &self.stack
    }

    /// Clears error, cursor and pending continuations.
    pub(crate) fn reset(&mut self) {
        self.error = None;
        self.cursor = None;
        self.stack.clear();
    }

    /// The tile the robot is facing, `None` past the edge of the coordinate
    /// space.
    pub fn ahead(&self) -> Option<IVec2> {
        offset_position(self.position, self.facing.offset())
    }

    // --- World actions ---

    /// Performs one intrinsic against `map`.
    ///
    /// Position changes are not applied here: a successful move returns the
    /// step to take so the owning collection can keep its draw order. On
    /// failure the sticky error is set and the world is left untouched.
    pub(crate) fn perform<M: Map + ?Sized>(
        &mut self,
        op: Intrinsic,
        map: &mut M,
    ) -> Result<Option<IVec2>, RobotError> {
        let result = match op {
            Intrinsic::TurnLeft => {
                self.facing = self.facing.turn_left();
                Ok(None)
            }
            Intrinsic::Move => match self.ahead() {
                Some(next) if map.is_walkable(next) => Ok(Some(self.facing.offset())),
                _ => Err(RobotError::HitWall),
            },
            Intrinsic::PutWhite => self.put_tag(map, Tile::WhiteTag).map(|_| None),
            Intrinsic::PutGrey => self.put_tag(map, Tile::GreyTag).map(|_| None),
            Intrinsic::PutBlack => self.put_tag(map, Tile::BlackTag).map(|_| None),
            Intrinsic::PickUp => self.pick_up(map).map(|_| None),
        };

        if let Err(err) = result {
            warn!("robot at {} failed {:?}: {}", self.position, op, err);
            self.error = Some(err);
        }
        result
    }

    fn put_tag<M: Map + ?Sized>(&self, map: &mut M, tag: Tile) -> Result<(), RobotError> {
        if map.tile(self.position) != Tile::Empty {
            return Err(RobotError::AlreadyTag);
        }
        // The robot stands on the tile, so it is inside the map.
        map.set_tile(self.position, tag)
            .map_err(|_| RobotError::AlreadyTag)
    }

    fn pick_up<M: Map + ?Sized>(&self, map: &mut M) -> Result<(), RobotError> {
        if !map.is_tag(self.position) {
            return Err(RobotError::NoTag);
        }
        map.set_tile(self.position, Tile::Empty)
            .map_err(|_| RobotError::NoTag)
    }

    /// Evaluates a condition against the robot's surroundings.
    pub fn test<M: Map + ?Sized>(&self, cond: &Condition, map: &M) -> bool {
        let here = map.tile(self.position);
        let raw = match cond.kind {
            ConditionKind::Wall => !self.ahead().is_some_and(|next| map.is_walkable(next)),
            ConditionKind::WhiteTag => here == Tile::WhiteTag,
            ConditionKind::GreyTag => here == Tile::GreyTag,
            ConditionKind::BlackTag => here == Tile::BlackTag,
            ConditionKind::AnyTag => here.is_tag(),
            ConditionKind::FacingEast => self.facing == Direction::East,
            ConditionKind::FacingNorth => self.facing == Direction::North,
            ConditionKind::FacingWest => self.facing == Direction::West,
            ConditionKind::FacingSouth => self.facing == Direction::South,
        };
        raw != cond.negate
    }

    // --- Persistence ---

    /// Writes `x y dir error`, the cursor record, then the continuation stack.
    pub(crate) fn encode(&self, module: &Module, enc: &mut Encoder) -> Result<(), ModuleError> {
        enc.line(format_args!(
            "{} {} {} {}",
            self.position.x,
            self.position.y,
            self.facing.code(),
            self.error.map_or(0, RobotError::code)
        ));
        match &self.cursor {
            None => enc.line(format_args!("0")),
            Some(Cursor::At(cont)) => {
                enc.line(format_args!("1"));
                cont.encode(module, enc)?;
            }
            Some(Cursor::Finish) => enc.line(format_args!("2")),
        }
        self.stack.encode(module, enc)
    }

    pub(crate) fn decode(
        dec: &mut Decoder<'_>,
        module: &Module,
        max_stack_depth: usize,
    ) -> Result<Self, DecodeError> {
        let mut fields = dec.line()?;
        let x = fields.int("robot x")?;
        let y = fields.int("robot y")?;
        let dir = fields.uint("robot direction")?;
        let facing = Direction::from_code(dir)
            .ok_or_else(|| fields.out_of_range("robot direction", dir.into()))?;
        let code = fields.uint("robot error")?;
        let error = RobotError::from_code(code)
            .ok_or_else(|| fields.out_of_range("robot error", code.into()))?;
        fields.finish()?;

        let mut fields = dec.line()?;
        let kind = fields.uint("cursor kind")?;
        fields.finish()?;
        let cursor = match kind {
            0 => None,
            1 => Some(Cursor::At(Continuation::decode(dec, module)?)),
            2 => Some(Cursor::Finish),
            other => return Err(fields.out_of_range("cursor kind", other.into())),
        };

        let stack = ContinuationStack::decode(dec, module, max_stack_depth)?;
        Ok(Self {
            position: IVec2::new(x, y),
            facing,
            error,
            cursor,
            stack,
        })
    }
}

/// `pos + delta`, or `None` when a coordinate overflows `i32`.
pub(crate) fn offset_position(pos: IVec2, delta: IVec2) -> Option<IVec2> {
    Some(IVec2::new(
        pos.x.checked_add(delta.x)?,
        pos.y.checked_add(delta.y)?,
    ))
}
