//! Per-robot continuation stack.
//!
//! Interpreted calls never use the host call stack. Whenever execution enters
//! a block and still has work to do after it, the resumption point is pushed
//! here; when a block runs out of statements the top entry is popped into the
//! robot's cursor. Tail positions push nothing, so tail recursion runs in
//! constant stack depth.

use crate::codec::{Decoder, Encoder};
use crate::error::{DecodeError, ExecError, ModuleError};
use crate::program::{Module, ProcId, StmtId, StmtKind};

/// How to resume at a continuation's statement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resume {
    /// Execute the statement from scratch.
    Enter,
    /// The statement is a Repeat whose body just finished an iteration.
    LoopBack {
        /// Iterations still allowed; `None` when the loop is not count-limited.
        remaining: Option<u32>,
    },
}

/// A resumption point: a statement inside a procedure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Continuation {
    pub proc: ProcId,
    pub stmt: StmtId,
    pub resume: Resume,
}

impl Continuation {
    /// Run `stmt` of `proc` from the top.
    pub fn enter(proc: ProcId, stmt: StmtId) -> Self {
        Self {
            proc,
            stmt,
            resume: Resume::Enter,
        }
    }

    /// Re-evaluate the repeat `stmt` after an iteration.
    ///
    /// `remaining` is `None` for a loop that only a condition ends.
    pub fn loop_back(proc: ProcId, stmt: StmtId, remaining: Option<u32>) -> Self {
        Self {
            proc,
            stmt,
            resume: Resume::LoopBack { remaining },
        }
    }

    /// Writes `<ident>` then `<index>` (or `<index> L <n|->` for loop-backs).
    pub(crate) fn encode(&self, module: &Module, enc: &mut Encoder) -> Result<(), ModuleError> {
        let ident = module.proc(self.proc)?.ident();
        let index = module.stmt_index(self.proc, self.stmt)?;
        enc.line(format_args!("{ident}"));
        match self.resume {
            Resume::Enter => enc.line(format_args!("{index}")),
            Resume::LoopBack { remaining: Some(n) } => enc.line(format_args!("{index} L {n}")),
            Resume::LoopBack { remaining: None } => enc.line(format_args!("{index} L -")),
        }
        Ok(())
    }

    pub(crate) fn decode(dec: &mut Decoder<'_>, module: &Module) -> Result<Self, DecodeError> {
        let (ident, ident_line) = dec.ident()?;
        let proc = module.find_proc(&ident).ok_or_else(|| DecodeError::UnresolvedProc {
            line: ident_line,
            ident: ident.clone(),
        })?;

        let mut fields = dec.line()?;
        let index = fields.uint("statement index")?;
        let stmt = module
            .stmt_by_index(proc, index)?
            .ok_or_else(|| DecodeError::BadStmtIndex {
                line: fields.line(),
                ident,
                index,
            })?;

        let resume = match fields.optional() {
            None => Resume::Enter,
            Some("L") => {
                let remaining = match fields.token("remaining iterations")? {
                    "-" => None,
                    n => Some(n.parse().map_err(|_| DecodeError::Malformed {
                        line: fields.line(),
                        expected: "remaining iterations",
                        found: n.to_owned(),
                    })?),
                };
                if !matches!(module.stmt(stmt)?.kind(), StmtKind::Repeat(_)) {
                    return Err(DecodeError::Malformed {
                        line: fields.line(),
                        expected: "loop-back to a repeat statement",
                        found: format!("statement {index}"),
                    });
                }
                Resume::LoopBack { remaining }
            }
            Some(other) => {
                return Err(DecodeError::Malformed {
                    line: fields.line(),
                    expected: "end of line or L",
                    found: other.to_owned(),
                });
            }
        };
        fields.finish()?;

        Ok(Self { proc, stmt, resume })
    }
}

/// Bounded LIFO of continuations, owned by exactly one robot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContinuationStack {
    entries: Vec<Continuation>,
    limit: usize,
}

impl ContinuationStack {
    /// An empty stack holding at most `limit` entries.
    pub fn new(limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            limit,
        }
    }

    /// Records a resumption point. Fails without change when full.
    pub fn push(&mut self, cont: Continuation) -> Result<(), ExecError> {
        if self.entries.len() >= self.limit {
            return Err(ExecError::StackOverflow { limit: self.limit });
        }
        self.entries.push(cont);
        Ok(())
    }

    /// Removes the most recent entry.
    pub fn pop(&mut self) -> Option<Continuation> {
        self.entries.pop()
    }

    /// The entry [`pop`](Self::pop) would return.
    pub fn top(&self) -> Option<&Continuation> {
        self.entries.last()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries.
    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Entries from the bottom of the stack to the top.
    pub fn iter(&self) -> impl Iterator<Item = &Continuation> {
        self.entries.iter()
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Writes the entry count then every entry, bottom first.
    pub fn encode(&self, module: &Module, enc: &mut Encoder) -> Result<(), ModuleError> {
        enc.line(format_args!("{}", self.entries.len()));
        for entry in &self.entries {
            entry.encode(module, enc)?;
        }
        Ok(())
    }

    /// Reads a stack back, resolving every entry against `module`.
    pub fn decode(
        dec: &mut Decoder<'_>,
        module: &Module,
        limit: usize,
    ) -> Result<Self, DecodeError> {
        let count = dec.count("continuation count")? as usize;
        if count > limit {
            return Err(DecodeError::StackTooDeep {
                line: dec.last_line(),
                limit,
            });
        }
        let mut stack = Self::new(limit);
        for _ in 0..count {
            stack.entries.push(Continuation::decode(dec, module)?);
        }
        Ok(stack)
    }
}
