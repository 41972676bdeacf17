//! A module, its map and the robots running on it, persisted as one unit.

use crate::codec::{self, Decoder, Encoder};
use crate::error::{DecodeError, ExecError, SaveError};
use crate::interpreter::{RobotConfig, StepOutcome};
use crate::map::TileMap;
use crate::program::{Module, ProcId};
use crate::robots::{RobotId, Robots};
use std::io;
use tracing::info;

/// Everything a host needs to resume a session.
///
/// Saved in dependency order: the module first, so robot continuations can be
/// resolved against it, then the map, then the robots.
#[derive(Clone, Debug)]
pub struct Workspace {
    pub module: Module,
    pub robots: Robots<TileMap>,
}

impl Workspace {
    /// A workspace with no robots yet, using the default robot configuration.
    pub fn new(module: Module, map: TileMap) -> Self {
        Self::with_config(module, map, RobotConfig::default())
    }

    /// A workspace with no robots yet.
    pub fn with_config(module: Module, map: TileMap, config: RobotConfig) -> Self {
        Self {
            module,
            robots: Robots::with_config(map, config),
        }
    }

    /// Starts `proc` of this workspace's module on an idle robot.
    pub fn run_proc(&mut self, id: RobotId, proc: ProcId) -> Result<(), ExecError> {
        self.robots.run_proc(id, &self.module, proc)
    }

    /// Executes one statement of the robot's program. See [`Robots::step`].
    pub fn step(&mut self, id: RobotId) -> Result<StepOutcome, ExecError> {
        self.robots.step(id, &self.module)
    }

    /// Steps the robot at most `max_steps` times. See [`Robots::run`].
    pub fn run(&mut self, id: RobotId, max_steps: usize) -> Result<StepOutcome, ExecError> {
        self.robots.run(id, &self.module, max_steps)
    }

    /// Appends module, map and robots to `enc`.
    pub fn encode(&self, enc: &mut Encoder) -> Result<(), SaveError> {
        self.module.encode(enc);
        self.robots.map().encode(enc);
        self.robots.encode(&self.module, enc)?;
        Ok(())
    }

    /// Reads module, map and robots, in that order.
    pub fn decode(dec: &mut Decoder<'_>, config: RobotConfig) -> Result<Self, DecodeError> {
        let module = Module::decode(dec)?;
        let map = TileMap::decode(dec)?;
        let robots = Robots::decode(dec, &module, map, config)?;
        Ok(Self { module, robots })
    }

    /// Writes the whole workspace. Nothing is written if encoding fails.
    pub fn save(&self, writer: impl io::Write) -> Result<(), SaveError> {
        let mut enc = Encoder::new();
        self.encode(&mut enc)?;
        enc.write_to(writer)?;
        info!(
            "saved workspace: {} procedures, {} robots",
            self.module.proc_count(),
            self.robots.len()
        );
        Ok(())
    }

    /// [`load_with_config`](Self::load_with_config) with the default configuration.
    pub fn load(reader: impl io::Read) -> Result<Self, DecodeError> {
        Self::load_with_config(reader, RobotConfig::default())
    }

    /// Reads a workspace written by [`save`](Self::save).
    ///
    /// The load is all or nothing: any malformed part fails the whole call.
    pub fn load_with_config(reader: impl io::Read, config: RobotConfig) -> Result<Self, DecodeError> {
        let text = codec::read_text(reader)?;
        let mut dec = Decoder::new(&text);
        let workspace = Self::decode(&mut dec, config)?;
        dec.expect_end()?;
        info!(
            "loaded workspace: {} procedures, {} robots",
            workspace.module.proc_count(),
            workspace.robots.len()
        );
        Ok(workspace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RobotError;
    use crate::program::{Intrinsic, ProcIdent, StmtKind};
    use glam::IVec2;

    #[test]
    fn text_layout_is_module_map_robots() {
        let mut module = Module::seeded(3);
        let p = module.append_proc(ProcIdent::new("TURNTURN").unwrap()).unwrap();
        let body = module.proc(p).unwrap().body();
        module
            .append_stmt(body, StmtKind::intrinsic(Intrinsic::TurnLeft))
            .unwrap();

        let mut ws = Workspace::new(module, TileMap::from_rows(&[".#"]));
        ws.robots.add(IVec2::ZERO).unwrap();

        let mut out = Vec::new();
        ws.save(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "1\nTURNTURN\n1\n0 0\n2 1\n\n0 1\n1\n0 0 0 0\n0\n0\n"
        );
    }

    #[test]
    fn truncated_input_fails_with_a_line() {
        let err = Workspace::load("1\nTURNTURN\n1\n0 0\n2 1\n".as_bytes()).unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedEof { line: 6 }));
    }

    #[test]
    fn robot_at_the_coordinate_limit_hits_a_wall() {
        let module = "1\nMOVEMOVE\n1\n0 1\n";
        let map = "1 1\n\n0\n";
        let robots = "1\n2147483647 0 0 0\n0\n0\n";
        let text = format!("{module}{map}{robots}");
        let mut ws = Workspace::load(text.as_bytes()).unwrap();

        let id = ws.robots.iter().next().unwrap().0;
        let proc = ws.module.find_proc(&ProcIdent::new("MOVEMOVE").unwrap()).unwrap();
        ws.run_proc(id, proc).unwrap();
        assert_eq!(ws.step(id), Ok(StepOutcome::Stopped(RobotError::HitWall)));
        assert_eq!(
            ws.robots.get(id).unwrap().position(),
            IVec2::new(i32::MAX, 0)
        );
    }
}
