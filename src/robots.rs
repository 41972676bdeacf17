//! The collection of robots sharing one map.
//!
//! Robots are kept in two views: an unordered index keyed by [`RobotId`] and
//! a draw order sorted by ascending y, so a host can paint back to front.
//! Every position change goes through this collection, which keeps the draw
//! order in sync.

use crate::codec::{self, Decoder, Encoder};
use crate::error::{DecodeError, ExecError, ModuleError, RobotsError, SaveError};
use crate::interpreter::{RobotConfig, StepOutcome};
use crate::map::{Map, TileMap};
use crate::program::{Intrinsic, Module, ProcId};
use crate::robot::{Robot, offset_position};
use glam::IVec2;
use std::collections::HashMap;
use std::io;
use tracing::{debug, info, warn};

/// Stable handle to a robot inside a [`Robots`] collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RobotId(u64);

/// Robots over a single map.
#[derive(Clone, Debug)]
pub struct Robots<M = TileMap> {
    map: M,
    config: RobotConfig,
    robots: HashMap<RobotId, Robot>,
    /// Ids sorted by non-decreasing y.
    draw_order: Vec<RobotId>,
    next_id: u64,
}

impl<M: Map> Robots<M> {
    /// An empty collection over `map` with the default configuration.
    pub fn new(map: M) -> Self {
        Self::with_config(map, RobotConfig::default())
    }

    /// An empty collection whose robots are created from `config`.
    pub fn with_config(map: M, config: RobotConfig) -> Self {
        Self {
            map,
            config,
            robots: HashMap::new(),
            draw_order: Vec::new(),
            next_id: 0,
        }
    }

    /// The map every robot walks on.
    pub fn map(&self) -> &M {
        &self.map
    }

    /// Mutable map access for editors. Robots are not moved off changed tiles.
    pub fn map_mut(&mut self) -> &mut M {
        &mut self.map
    }

    /// Settings applied to robots added or loaded into this collection.
    pub fn config(&self) -> &RobotConfig {
        &self.config
    }

    /// Number of robots.
    pub fn len(&self) -> usize {
        self.robots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.robots.is_empty()
    }

    // --- Membership ---

    /// Places a new robot at `pos`, facing the configured default direction.
    pub fn add(&mut self, pos: IVec2) -> Result<RobotId, RobotsError> {
        if self.lookup(pos).is_some() {
            warn!("refused to add a robot at occupied tile {}", pos);
            return Err(RobotsError::Occupied(pos));
        }
        let robot = Robot::new(pos, self.config.default_facing, self.config.max_stack_depth);
        let id = self.insert(robot);
        debug!("added robot {:?} at {}", id, pos);
        Ok(id)
    }

    fn insert(&mut self, robot: Robot) -> RobotId {
        let id = RobotId(self.next_id);
        self.next_id += 1;
        let y = robot.position.y;
        let slot = self
            .draw_order
            .iter()
            .position(|other| self.y_of(*other) > y)
            .unwrap_or(self.draw_order.len());
        self.draw_order.insert(slot, id);
        self.robots.insert(id, robot);
        id
    }

    /// Removes the robot at `pos`. Does nothing if the tile is free.
    pub fn remove(&mut self, pos: IVec2) -> Option<Robot> {
        let id = self.lookup(pos)?;
        self.draw_order.retain(|other| *other != id);
        let robot = self.robots.remove(&id);
        debug!("removed robot {:?} at {}", id, pos);
        robot
    }

    /// The robot standing at `pos`.
    ///
    /// Robots may share a tile after moving; the first in draw order wins.
    pub fn lookup(&self, pos: IVec2) -> Option<RobotId> {
        self.draw_order
            .iter()
            .copied()
            .find(|id| self.robots.get(id).is_some_and(|r| r.position == pos))
    }

    /// The robot with handle `id`, if it was not removed.
    pub fn get(&self, id: RobotId) -> Option<&Robot> {
        self.robots.get(&id)
    }

    /// Robots in draw order, top row first.
    pub fn iter(&self) -> impl Iterator<Item = (RobotId, &Robot)> {
        self.draw_order
            .iter()
            .filter_map(|id| self.robots.get(id).map(|robot| (*id, robot)))
    }

    /// Shifts a robot by `delta` without consulting the map.
    ///
    /// Fails without moving when the new position does not fit in `i32`.
    pub fn move_robot(&mut self, id: RobotId, delta: IVec2) -> Result<(), RobotsError> {
        let robot = self
            .robots
            .get_mut(&id)
            .ok_or(RobotsError::UnknownRobot(id))?;
        robot.position = offset_position(robot.position, delta)
            .ok_or(RobotsError::OutOfRange { id, delta })?;
        self.relocate(id, delta.y);
        Ok(())
    }

    fn y_of(&self, id: RobotId) -> i32 {
        self.robots.get(&id).map_or(i32::MAX, |r| r.position.y)
    }

    /// Restores the draw order after `id` moved vertically by `dy`.
    fn relocate(&mut self, id: RobotId, dy: i32) {
        let Some(slot) = self.draw_order.iter().position(|other| *other == id) else {
            return;
        };
        let y = self.y_of(id);
        if dy < 0 {
            let mut target = slot;
            while target > 0 && self.y_of(self.draw_order[target - 1]) > y {
                target -= 1;
            }
            self.draw_order[target..=slot].rotate_right(1);
        } else if dy > 0 {
            let mut target = slot;
            while target + 1 < self.draw_order.len() && self.y_of(self.draw_order[target + 1]) <= y
            {
                target += 1;
            }
            self.draw_order[slot..=target].rotate_left(1);
        }
    }

    // --- Execution ---

    fn robot_mut(&mut self, id: RobotId) -> Result<&mut Robot, ExecError> {
        self.robots.get_mut(&id).ok_or(ExecError::UnknownRobot(id))
    }

    /// Starts `proc` on an idle robot.
    pub fn run_proc(&mut self, id: RobotId, module: &Module, proc: ProcId) -> Result<(), ExecError> {
        self.robot_mut(id)?.run_proc(module, proc)
    }

    /// Executes one statement of the robot's running procedure.
    pub fn step(&mut self, id: RobotId, module: &Module) -> Result<StepOutcome, ExecError> {
        let robot = self
            .robots
            .get_mut(&id)
            .ok_or(ExecError::UnknownRobot(id))?;
        let report = robot.step(module, &mut self.map)?;
        if let Some(delta) = report.moved {
            self.move_robot(id, delta)?;
        }
        Ok(report.outcome)
    }

    /// Clears the robot's error and abandons its program.
    pub fn reset(&mut self, id: RobotId) -> Result<(), ExecError> {
        self.robot_mut(id)?.reset();
        debug!("reset robot {:?}", id);
        Ok(())
    }

    /// Performs one intrinsic immediately on an idle robot.
    ///
    /// Returns [`StepOutcome::Idle`] on success and [`StepOutcome::Stopped`]
    /// when the action broke a world rule.
    pub fn perform(&mut self, id: RobotId, op: Intrinsic) -> Result<StepOutcome, ExecError> {
        let robot = self
            .robots
            .get_mut(&id)
            .ok_or(ExecError::UnknownRobot(id))?;
        if robot.is_busy() || robot.is_stopped() {
            warn!("refused immediate {:?} on busy robot {:?}", op, id);
            return Err(ExecError::Busy);
        }
        match robot.perform(op, &mut self.map) {
            Ok(moved) => {
                if let Some(delta) = moved {
                    self.move_robot(id, delta)?;
                }
                Ok(StepOutcome::Idle)
            }
            Err(err) => Ok(StepOutcome::Stopped(err)),
        }
    }

    /// Steps the robot until it goes idle, stops, or `max_steps` is spent.
    ///
    /// Returns [`StepOutcome::Running`] when the budget ran out first.
    pub fn run(
        &mut self,
        id: RobotId,
        module: &Module,
        max_steps: usize,
    ) -> Result<StepOutcome, ExecError> {
        for _ in 0..max_steps {
            match self.step(id, module)? {
                StepOutcome::Running => {}
                done => return Ok(done),
            }
        }
        Ok(StepOutcome::Running)
    }

    // --- Persistence ---

    /// Writes the robot count then every robot record in draw order.
    pub fn encode(&self, module: &Module, enc: &mut Encoder) -> Result<(), ModuleError> {
        enc.line(format_args!("{}", self.draw_order.len()));
        for (_, robot) in self.iter() {
            robot.encode(module, enc)?;
        }
        Ok(())
    }

    /// Reads robots back onto `map`, resolving their programs in `module`.
    ///
    /// Robots are restored as recorded, including ones sharing a tile.
    pub fn decode(
        dec: &mut Decoder<'_>,
        module: &Module,
        map: M,
        config: RobotConfig,
    ) -> Result<Self, DecodeError> {
        let count = dec.count("robot count")?;
        let mut robots = Self::with_config(map, config);
        for _ in 0..count {
            let robot = Robot::decode(dec, module, robots.config.max_stack_depth)?;
            robots.insert(robot);
        }
        Ok(robots)
    }

    /// Writes the robots on their own. Their programs are saved with the module.
    pub fn save(&self, module: &Module, writer: impl io::Write) -> Result<(), SaveError> {
        let mut enc = Encoder::new();
        self.encode(module, &mut enc)?;
        enc.write_to(writer)?;
        info!("saved {} robots", self.len());
        Ok(())
    }

    pub fn load(
        reader: impl io::Read,
        module: &Module,
        map: M,
        config: RobotConfig,
    ) -> Result<Self, DecodeError> {
        let text = codec::read_text(reader)?;
        let mut dec = Decoder::new(&text);
        let robots = Self::decode(&mut dec, module, map, config)?;
        dec.expect_end()?;
        info!("loaded {} robots", robots.len());
        Ok(robots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::direction::Direction;
    use crate::error::RobotError;
    use proptest::prelude::*;

    fn ys(robots: &Robots) -> Vec<i32> {
        robots.iter().map(|(_, r)| r.position().y).collect()
    }

    #[test]
    fn add_keeps_draw_order_and_rejects_occupied_tiles() {
        let mut robots = Robots::new(TileMap::new(5, 5));
        let a = robots.add(IVec2::new(0, 3)).unwrap();
        let b = robots.add(IVec2::new(1, 1)).unwrap();
        let c = robots.add(IVec2::new(2, 3)).unwrap();
        let d = robots.add(IVec2::new(3, 1)).unwrap();

        let order: Vec<_> = robots.iter().map(|(id, _)| id).collect();
        assert_eq!(order, vec![b, d, a, c]);
        assert_eq!(
            robots.add(IVec2::new(2, 3)),
            Err(RobotsError::Occupied(IVec2::new(2, 3)))
        );
        assert_eq!(robots.len(), 4);
    }

    #[test]
    fn new_robots_use_the_configured_facing() {
        let config = RobotConfig {
            default_facing: Direction::South,
            ..RobotConfig::default()
        };
        let mut robots = Robots::with_config(TileMap::new(2, 2), config);
        let id = robots.add(IVec2::ZERO).unwrap();
        assert_eq!(robots.get(id).unwrap().facing(), Direction::South);
        assert_eq!(robots.get(id).unwrap().stack().limit(), 1024);
    }

    #[test]
    fn remove_and_lookup() {
        let mut robots = Robots::new(TileMap::new(3, 3));
        let id = robots.add(IVec2::new(1, 2)).unwrap();
        assert_eq!(robots.lookup(IVec2::new(1, 2)), Some(id));
        assert!(robots.remove(IVec2::new(0, 0)).is_none());

        let removed = robots.remove(IVec2::new(1, 2)).unwrap();
        assert_eq!(removed.position(), IVec2::new(1, 2));
        assert!(robots.is_empty());
        assert_eq!(robots.iter().count(), 0);
        assert!(robots.get(id).is_none());
    }

    #[test]
    fn moving_relocates_in_draw_order() {
        let mut robots = Robots::new(TileMap::new(4, 4));
        let a = robots.add(IVec2::new(0, 0)).unwrap();
        let b = robots.add(IVec2::new(1, 1)).unwrap();
        let c = robots.add(IVec2::new(2, 2)).unwrap();

        robots.move_robot(a, IVec2::new(0, 3)).unwrap();
        let order: Vec<_> = robots.iter().map(|(id, _)| id).collect();
        assert_eq!(order, vec![b, c, a]);

        robots.move_robot(c, IVec2::new(0, -2)).unwrap();
        let order: Vec<_> = robots.iter().map(|(id, _)| id).collect();
        assert_eq!(order, vec![c, b, a]);
    }

    #[test]
    fn unknown_robots_are_reported() {
        let mut robots = Robots::new(TileMap::new(1, 1));
        let id = robots.add(IVec2::ZERO).unwrap();
        robots.remove(IVec2::ZERO);
        assert_eq!(
            robots.move_robot(id, IVec2::X),
            Err(RobotsError::UnknownRobot(id))
        );
        assert_eq!(robots.reset(id), Err(ExecError::UnknownRobot(id)));
        let module = Module::seeded(0);
        assert_eq!(robots.step(id, &module), Err(ExecError::UnknownRobot(id)));
    }

    #[test]
    fn immediate_actions_update_map_and_position() {
        let mut robots = Robots::new(TileMap::from_rows(&["..", "##"]));
        let id = robots.add(IVec2::ZERO).unwrap();

        assert_eq!(robots.perform(id, Intrinsic::PutWhite), Ok(StepOutcome::Idle));
        assert!(robots.map().is_tag(IVec2::ZERO));
        assert_eq!(robots.perform(id, Intrinsic::Move), Ok(StepOutcome::Idle));
        assert_eq!(robots.get(id).unwrap().position(), IVec2::X);
        assert_eq!(robots.lookup(IVec2::X), Some(id));

        assert_eq!(
            robots.perform(id, Intrinsic::Move),
            Ok(StepOutcome::Stopped(RobotError::HitWall))
        );
        assert_eq!(robots.perform(id, Intrinsic::TurnLeft), Err(ExecError::Busy));
        robots.reset(id).unwrap();
        assert_eq!(robots.perform(id, Intrinsic::TurnLeft), Ok(StepOutcome::Idle));
    }

    #[test]
    fn save_and_load_keep_draw_order() {
        let module = Module::seeded(0);
        let mut robots = Robots::new(TileMap::new(4, 4));
        robots.add(IVec2::new(3, 3)).unwrap();
        robots.add(IVec2::new(0, 1)).unwrap();
        let id = robots.add(IVec2::new(2, 1)).unwrap();
        robots.perform(id, Intrinsic::TurnLeft).unwrap();

        let mut out = Vec::new();
        robots.save(&module, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "3\n0 1 0 0\n0\n0\n2 1 1 0\n0\n0\n3 3 0 0\n0\n0\n");

        let loaded =
            Robots::load(text.as_bytes(), &module, TileMap::new(4, 4), RobotConfig::default())
                .unwrap();
        let before: Vec<_> = robots.iter().map(|(_, r)| r.clone()).collect();
        let after: Vec<_> = loaded.iter().map(|(_, r)| r.clone()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn load_rejects_trailing_data() {
        let module = Module::seeded(0);
        let text = "1\n0 0 0 0\n0\n0\n7\n";
        let err = Robots::load(text.as_bytes(), &module, TileMap::new(1, 1), RobotConfig::default())
            .unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { line: 5, .. }));
    }

    #[test]
    fn moves_past_the_coordinate_space_are_refused() {
        let mut robots = Robots::new(TileMap::new(2, 2));
        let id = robots.add(IVec2::new(1, 0)).unwrap();
        robots.move_robot(id, IVec2::new(i32::MAX - 1, 0)).unwrap();
        assert_eq!(robots.get(id).unwrap().position(), IVec2::new(i32::MAX, 0));

        assert_eq!(
            robots.move_robot(id, IVec2::X),
            Err(RobotsError::OutOfRange { id, delta: IVec2::X })
        );
        assert_eq!(robots.get(id).unwrap().position(), IVec2::new(i32::MAX, 0));
        assert_eq!(
            robots.perform(id, Intrinsic::Move),
            Ok(StepOutcome::Stopped(RobotError::HitWall))
        );
    }

    #[derive(Clone, Debug)]
    enum Op {
        Add(i32, i32),
        Remove(prop::sample::Index),
        Move(prop::sample::Index, i32, i32),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..8i32, 0..8i32).prop_map(|(x, y)| Op::Add(x, y)),
            any::<prop::sample::Index>().prop_map(Op::Remove),
            (any::<prop::sample::Index>(), -3..=3i32, -3..=3i32)
                .prop_map(|(pick, dx, dy)| Op::Move(pick, dx, dy)),
        ]
    }

    proptest! {
        #[test]
        fn draw_order_tracks_y(ops in prop::collection::vec(op(), 1..60)) {
            let mut robots = Robots::new(TileMap::new(8, 8));
            let mut ids = Vec::new();
            for op in ops {
                match op {
                    Op::Add(x, y) => {
                        if let Ok(id) = robots.add(IVec2::new(x, y)) {
                            ids.push(id);
                        }
                    }
                    Op::Remove(_) | Op::Move(..) if ids.is_empty() => {}
                    Op::Remove(pick) => {
                        let pos = robots.get(ids[pick.index(ids.len())]).unwrap().position();
                        prop_assert!(robots.remove(pos).is_some());
                        ids.retain(|id| robots.get(*id).is_some());
                    }
                    Op::Move(pick, dx, dy) => {
                        let id = ids[pick.index(ids.len())];
                        robots.move_robot(id, IVec2::new(dx, dy)).unwrap();
                    }
                }
                let order = ys(&robots);
                prop_assert_eq!(order.len(), ids.len());
                prop_assert_eq!(robots.len(), ids.len());
                prop_assert!(order.windows(2).all(|w| w[0] <= w[1]), "{:?}", order);
            }
        }
    }
}
