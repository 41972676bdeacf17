//! Step-wise execution of robot programs.
//!
//! A robot runs a procedure by repeatedly calling [`Robots::step`]. Each step
//! performs exactly one intrinsic or one control-flow hop, so a host can
//! animate one action per tick and persist the robot between any two steps.
//!
//! # Control flow
//!
//! * **Call / Recurse**: push the following sibling (if any) and jump to the
//!   callee's first statement. A call in tail position pushes nothing.
//! * **If**: test the condition and enter the chosen branch, pushing the
//!   following sibling when there is one. Missing or empty branches are
//!   skipped.
//! * **Repeat**: every test step first checks the end condition (after an
//!   iteration), then the remaining count, then the start condition. Entering
//!   the body pushes a loop-back entry carrying the remaining count.
//!
//! When a block runs out of statements the top continuation is popped into
//! the cursor; with an empty stack the robot goes idle.
//!
//! [`Robots::step`]: crate::Robots::step

use crate::direction::Direction;
use crate::error::{ExecError, RobotError};
use crate::map::Map;
use crate::program::{Module, ProcId, RepeatStmt, StmtKind};
use crate::robot::{Cursor, Robot};
use crate::stack::{Continuation, Resume};
use glam::IVec2;
use tracing::debug;

/// Configuration for robots created by a [`Robots`](crate::Robots) collection.
#[derive(Clone, Debug)]
pub struct RobotConfig {
    /// Direction newly placed robots face.
    pub default_facing: Direction,
    /// Maximum continuation stack depth per robot.
    pub max_stack_depth: usize,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            default_facing: Direction::East,
            max_stack_depth: 1024,
        }
    }
}

/// State of a robot after a step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// The robot has more to do.
    Running,
    /// The procedure finished.
    Idle,
    /// An intrinsic broke a world rule; the robot is frozen until reset.
    Stopped(RobotError),
}

/// What a single step did, for the owning collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct StepReport {
    pub outcome: StepOutcome,
    /// Step the robot must be moved by.
    pub moved: Option<IVec2>,
}

impl Robot {
    /// Starts executing `proc` from its first statement.
    pub(crate) fn run_proc(&mut self, module: &Module, proc: ProcId) -> Result<(), ExecError> {
        if self.is_busy() || self.is_stopped() {
            return Err(ExecError::Busy);
        }
        let body = module.proc(proc)?.body();
        self.cursor = Some(match module.first_stmt(body)? {
            Some(first) => Cursor::At(Continuation::enter(proc, first)),
            None => Cursor::Finish,
        });
        debug!("robot at {} starts {:?}", self.position, proc);
        Ok(())
    }

    /// Advances execution by one statement.
    pub(crate) fn step<M: Map + ?Sized>(
        &mut self,
        module: &Module,
        map: &mut M,
    ) -> Result<StepReport, ExecError> {
        if self.is_stopped() {
            return Err(ExecError::NotRunning);
        }
        let cont = match self.cursor {
            None => return Err(ExecError::NotRunning),
            Some(Cursor::Finish) => {
                self.leave();
                return Ok(self.report(None));
            }
            Some(Cursor::At(cont)) => cont,
        };

        let kind = *module.stmt(cont.stmt)?.kind();
        match kind {
            StmtKind::Intrinsic(op) => {
                debug!("robot at {} performs {:?}", self.position, op);
                return match self.perform(op, map) {
                    Ok(moved) => {
                        self.advance(module, cont)?;
                        Ok(self.report(moved))
                    }
                    Err(err) => Ok(StepReport {
                        outcome: StepOutcome::Stopped(err),
                        moved: None,
                    }),
                };
            }
            StmtKind::Call(callee) => self.call(module, cont, callee)?,
            StmtKind::Recurse => self.call(module, cont, cont.proc)?,
            StmtKind::If(s) => {
                let branch = if self.test(&s.cond, &*map) {
                    Some(s.then_block)
                } else {
                    s.else_block
                };
                let first = match branch {
                    Some(block) => module.first_stmt(block)?,
                    None => None,
                };
                match first {
                    Some(first) => {
                        if let Some(next) = module.next_stmt(cont.stmt)? {
                            self.stack.push(Continuation::enter(cont.proc, next))?;
                        }
                        self.cursor = Some(Cursor::At(Continuation::enter(cont.proc, first)));
                    }
                    None => self.advance(module, cont)?,
                }
            }
            StmtKind::Repeat(s) => self.repeat(module, &*map, cont, &s)?,
        }
        Ok(self.report(None))
    }

    fn report(&self, moved: Option<IVec2>) -> StepReport {
        let outcome = if self.cursor.is_some() {
            StepOutcome::Running
        } else {
            StepOutcome::Idle
        };
        StepReport { outcome, moved }
    }

    /// Moves to the next sibling, or leaves the block.
    fn advance(&mut self, module: &Module, cont: Continuation) -> Result<(), ExecError> {
        match module.next_stmt(cont.stmt)? {
            Some(next) => self.cursor = Some(Cursor::At(Continuation::enter(cont.proc, next))),
            None => self.leave(),
        }
        Ok(())
    }

    /// Resumes at the top continuation, or goes idle.
    fn leave(&mut self) {
        self.cursor = self.stack.pop().map(Cursor::At);
        if self.cursor.is_none() {
            debug!("robot at {} finished", self.position);
        }
    }

    fn call(&mut self, module: &Module, cont: Continuation, callee: ProcId) -> Result<(), ExecError> {
        let Some(first) = module.first_stmt(module.proc(callee)?.body())? else {
            // Nothing to run; behaves like a no-op statement.
            return self.advance(module, cont);
        };
        match module.next_stmt(cont.stmt)? {
            Some(next) => self.stack.push(Continuation::enter(cont.proc, next))?,
            None => debug!("tail call to {:?}", callee),
        }
        self.cursor = Some(Cursor::At(Continuation::enter(callee, first)));
        Ok(())
    }

    fn repeat<M: Map + ?Sized>(
        &mut self,
        module: &Module,
        map: &M,
        cont: Continuation,
        s: &RepeatStmt,
    ) -> Result<(), ExecError> {
        let remaining = match cont.resume {
            Resume::Enter => (s.count > 0).then_some(s.count),
            Resume::LoopBack { remaining } => {
                if s.end_cond.is_some_and(|c| self.test(&c, map)) {
                    return self.advance(module, cont);
                }
                remaining
            }
        };

        let exhausted = remaining == Some(0);
        let blocked = s.start_cond.is_some_and(|c| !self.test(&c, map));
        let first = module.first_stmt(s.body)?;
        match first {
            Some(first) if !exhausted && !blocked => {
                let left = remaining.map(|n| n - 1);
                self.stack
                    .push(Continuation::loop_back(cont.proc, cont.stmt, left))?;
                self.cursor = Some(Cursor::At(Continuation::enter(cont.proc, first)));
                Ok(())
            }
            _ => self.advance(module, cont),
        }
    }
}
