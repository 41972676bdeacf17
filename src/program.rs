//! Program model: modules, procedures, blocks and statements.
//!
//! A [`Module`] is an arena. Procedures, blocks and statements live in flat
//! vectors and refer to each other through [`ProcId`], [`BlockId`] and
//! [`StmtId`]. Ownership is a tree: every block belongs to exactly one
//! procedure body or compound statement, and every statement records the
//! block it sits in as a plain id (never an owning reference).

use crate::codec::{self, Decoder, Encoder, Fields};
use crate::error::{DecodeError, ModuleError, SaveError};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::str::FromStr;
use tracing::{debug, info};

/// Length of every procedure identifier.
pub const PROC_IDENT_LEN: usize = 8;

/// Deepest block nesting a procedure may have. A procedure body is level 0.
pub const MAX_NESTING: usize = 128;

/// Fixed-length procedure identifier.
///
/// Identifiers name the icon a procedure is drawn with, so they are opaque:
/// any [`PROC_IDENT_LEN`] printable, non-whitespace ASCII characters.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProcIdent(String);

impl ProcIdent {
    /// Validates `ident` as a procedure identifier.
    pub fn new(ident: &str) -> Result<Self, ModuleError> {
        let valid = ident.len() == PROC_IDENT_LEN && ident.bytes().all(|b| b.is_ascii_graphic());
        if valid {
            Ok(Self(ident.to_owned()))
        } else {
            Err(ModuleError::InvalidIdent(ident.to_owned()))
        }
    }

    /// The identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ProcIdent {
    type Err = ModuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ProcIdent {
    type Error = ModuleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<ProcIdent> for String {
    fn from(ident: ProcIdent) -> Self {
        ident.0
    }
}

impl fmt::Display for ProcIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ProcIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProcIdent({})", self.0)
    }
}

/// Index of a procedure inside its module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcId(usize);

/// Index of a block inside its module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(usize);

/// Index of a statement inside its module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StmtId(usize);

/// Primitive robot actions. Discriminants are the persisted op codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Intrinsic {
    TurnLeft = 0,
    Move = 1,
    PutWhite = 2,
    PutGrey = 3,
    PutBlack = 4,
    PickUp = 5,
}

impl Intrinsic {
    pub const ALL: [Intrinsic; 6] = [
        Intrinsic::TurnLeft,
        Intrinsic::Move,
        Intrinsic::PutWhite,
        Intrinsic::PutGrey,
        Intrinsic::PutBlack,
        Intrinsic::PickUp,
    ];

    /// Persisted code: the position in [`Self::ALL`].
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }
}

/// What a [`Condition`] tests before negation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionKind {
    /// The tile in front of the robot is not walkable.
    Wall = 0,
    WhiteTag = 1,
    GreyTag = 2,
    BlackTag = 3,
    /// The tile under the robot holds a tag of any colour.
    AnyTag = 4,
    FacingEast = 5,
    FacingNorth = 6,
    FacingWest = 7,
    FacingSouth = 8,
}

impl ConditionKind {
    pub const ALL: [ConditionKind; 9] = [
        ConditionKind::Wall,
        ConditionKind::WhiteTag,
        ConditionKind::GreyTag,
        ConditionKind::BlackTag,
        ConditionKind::AnyTag,
        ConditionKind::FacingEast,
        ConditionKind::FacingNorth,
        ConditionKind::FacingWest,
        ConditionKind::FacingSouth,
    ];

    /// Persisted code: the position in [`Self::ALL`].
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }
}

/// A possibly negated test of the robot's surroundings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Condition {
    pub negate: bool,
    pub kind: ConditionKind,
}

impl Condition {
    /// True when `kind` holds.
    pub fn is(kind: ConditionKind) -> Self {
        Self {
            negate: false,
            kind,
        }
    }

    /// True when `kind` does not hold.
    pub fn not(kind: ConditionKind) -> Self {
        Self { negate: true, kind }
    }

    fn encode(&self) -> String {
        format!("{} {}", u32::from(self.negate), self.kind.code())
    }

    fn decode(fields: &mut Fields<'_>) -> Result<Self, DecodeError> {
        let negate = fields.flag("condition negation")?;
        let code = fields.uint("condition type")?;
        let kind = ConditionKind::from_code(code)
            .ok_or_else(|| fields.out_of_range("condition type", code.into()))?;
        Ok(Self { negate, kind })
    }
}

/// Conditional statement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IfStmt {
    pub cond: Condition,
    pub then_block: BlockId,
    pub else_block: Option<BlockId>,
}

/// Loop statement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RepeatStmt {
    /// Maximum number of iterations; zero means not count-limited.
    pub count: u32,
    /// Tested before every iteration; the loop runs only while it holds.
    pub start_cond: Option<Condition>,
    pub body: BlockId,
    /// Tested after every iteration; the loop stops once it holds.
    pub end_cond: Option<Condition>,
}

/// The statement variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StmtKind {
    Intrinsic(Intrinsic),
    Call(ProcId),
    If(IfStmt),
    Repeat(RepeatStmt),
    /// Call the procedure the statement belongs to.
    Recurse,
}

impl StmtKind {
    pub fn intrinsic(op: Intrinsic) -> Self {
        Self::Intrinsic(op)
    }

    pub fn call(proc: ProcId) -> Self {
        Self::Call(proc)
    }

    pub fn if_then(cond: Condition, then_block: BlockId) -> Self {
        Self::If(IfStmt {
            cond,
            then_block,
            else_block: None,
        })
    }

    pub fn if_else(cond: Condition, then_block: BlockId, else_block: BlockId) -> Self {
        Self::If(IfStmt {
            cond,
            then_block,
            else_block: Some(else_block),
        })
    }

    pub fn repeat(
        count: u32,
        start_cond: Option<Condition>,
        body: BlockId,
        end_cond: Option<Condition>,
    ) -> Self {
        Self::Repeat(RepeatStmt {
            count,
            start_cond,
            body,
            end_cond,
        })
    }

    pub fn recurse() -> Self {
        Self::Recurse
    }

    /// Persisted statement type tag.
    pub fn type_code(&self) -> u32 {
        match self {
            Self::Intrinsic(_) => 0,
            Self::Call(_) => 1,
            Self::If(_) => 2,
            Self::Repeat(_) => 3,
            Self::Recurse => 4,
        }
    }

    /// Blocks owned by this statement, in pre-order.
    pub fn nested_blocks(&self) -> impl Iterator<Item = BlockId> {
        let (first, second) = match self {
            Self::If(s) => (Some(s.then_block), s.else_block),
            Self::Repeat(s) => (Some(s.body), None),
            _ => (None, None),
        };
        first.into_iter().chain(second)
    }
}

/// A statement placed in a block.
#[derive(Clone, Debug)]
pub struct Statement {
    kind: StmtKind,
    /// Containing block (non-owning).
    block: BlockId,
    /// Position inside the containing block.
    slot: usize,
}

impl Statement {
    pub fn kind(&self) -> &StmtKind {
        &self.kind
    }

    pub fn block(&self) -> BlockId {
        self.block
    }
}

/// Who owns a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockOwner {
    Proc(ProcId),
    Stmt(StmtId),
}

/// An ordered sequence of statements.
#[derive(Clone, Debug, Default)]
pub struct Block {
    owner: Option<BlockOwner>,
    stmts: Vec<StmtId>,
}

impl Block {
    pub fn owner(&self) -> Option<BlockOwner> {
        self.owner
    }

    pub fn stmts(&self) -> &[StmtId] {
        &self.stmts
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }
}

/// A named procedure and its body.
#[derive(Clone, Debug)]
pub struct Procedure {
    ident: ProcIdent,
    body: BlockId,
}

impl Procedure {
    pub fn ident(&self) -> &ProcIdent {
        &self.ident
    }

    pub fn body(&self) -> BlockId {
        self.body
    }
}

/// A set of procedures plus the arena their code lives in.
#[derive(Clone, Debug)]
pub struct Module {
    procs: Vec<Procedure>,
    blocks: Vec<Block>,
    stmts: Vec<Statement>,
    rng: ChaCha8Rng,
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}

impl Module {
    /// Creates an empty module whose identifier generator is seeded from the OS.
    pub fn new() -> Self {
        Self::with_rng(ChaCha8Rng::from_entropy())
    }

    /// Creates an empty module with a reproducible identifier generator.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(ChaCha8Rng::seed_from_u64(seed))
    }

    /// Creates an empty module drawing identifiers from `rng`.
    pub fn with_rng(rng: ChaCha8Rng) -> Self {
        Self {
            procs: Vec::new(),
            blocks: Vec::new(),
            stmts: Vec::new(),
            rng,
        }
    }

    /// Replaces the identifier generator, e.g. after loading.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
    }

    // --- Procedures ---

    /// Appends a new procedure with an empty body.
    pub fn append_proc(&mut self, ident: ProcIdent) -> Result<ProcId, ModuleError> {
        if self.find_proc(&ident).is_some() {
            return Err(ModuleError::DuplicateIdent(ident));
        }
        let id = ProcId(self.procs.len());
        let body = self.create_block();
        self.blocks[body.0].owner = Some(BlockOwner::Proc(id));
        self.procs.push(Procedure { ident, body });
        Ok(id)
    }

    /// Draws random identifiers until one is not used by any procedure.
    pub fn generate_ident(&mut self) -> ProcIdent {
        loop {
            let ident: String = (0..PROC_IDENT_LEN)
                .map(|_| char::from(self.rng.gen_range(b'A'..=b'Z')))
                .collect();
            let ident = ProcIdent(ident);
            if self.find_proc(&ident).is_none() {
                return ident;
            }
            debug!("identifier {} already taken, drawing again", ident);
        }
    }

    /// Finds a procedure by identifier (linear scan).
    pub fn find_proc(&self, ident: &ProcIdent) -> Option<ProcId> {
        self.procs
            .iter()
            .position(|p| &p.ident == ident)
            .map(ProcId)
    }

    /// The procedure `id` refers to.
    pub fn proc(&self, id: ProcId) -> Result<&Procedure, ModuleError> {
        self.procs.get(id.0).ok_or(ModuleError::UnknownProc(id))
    }

    /// Procedures in definition order.
    pub fn procs(&self) -> impl Iterator<Item = (ProcId, &Procedure)> {
        self.procs.iter().enumerate().map(|(i, p)| (ProcId(i), p))
    }

    pub fn proc_count(&self) -> usize {
        self.procs.len()
    }

    // --- Blocks & Statements ---

    /// Creates a detached block, to be adopted by a compound statement.
    pub fn create_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(Block::default());
        id
    }

    /// The block `id` refers to, attached or not.
    pub fn block(&self, id: BlockId) -> Result<&Block, ModuleError> {
        self.blocks.get(id.0).ok_or(ModuleError::UnknownBlock(id))
    }

    /// The statement `id` refers to.
    pub fn stmt(&self, id: StmtId) -> Result<&Statement, ModuleError> {
        self.stmts.get(id.0).ok_or(ModuleError::UnknownStmt(id))
    }

    /// Appends a statement to `block`.
    ///
    /// Blocks nested in the statement become owned by it; each must exist, be
    /// detached, and must not be `block` or one of its ancestors.
    pub fn append_stmt(&mut self, block: BlockId, kind: StmtKind) -> Result<StmtId, ModuleError> {
        self.block(block)?;
        if let StmtKind::Call(callee) = kind {
            self.proc(callee)?;
        }

        let nested: Vec<BlockId> = kind.nested_blocks().collect();
        for (i, &child) in nested.iter().enumerate() {
            if self.block(child)?.owner.is_some() || nested[..i].contains(&child) {
                return Err(ModuleError::BlockOwned(child));
            }
            if self.ancestors(block).any(|b| b == child) {
                return Err(ModuleError::CyclicBlock(child));
            }
        }
        if let Some(deepest) = nested.iter().map(|&b| self.block_height(b)).max() {
            if self.ancestors(block).count() + deepest > MAX_NESTING {
                return Err(ModuleError::NestingTooDeep { limit: MAX_NESTING });
            }
        }

        let id = StmtId(self.stmts.len());
        let slot = self.blocks[block.0].stmts.len();
        self.stmts.push(Statement { kind, block, slot });
        self.blocks[block.0].stmts.push(id);
        for child in nested {
            self.blocks[child.0].owner = Some(BlockOwner::Stmt(id));
        }
        Ok(id)
    }

    /// `block` followed by the blocks enclosing it, innermost first.
    fn ancestors(&self, block: BlockId) -> impl Iterator<Item = BlockId> + '_ {
        let mut next = Some(block);
        std::iter::from_fn(move || {
            let current = next?;
            next = match self.blocks.get(current.0)?.owner {
                Some(BlockOwner::Stmt(s)) => self.stmts.get(s.0).map(|s| s.block),
                _ => None,
            };
            Some(current)
        })
    }

    /// Levels of nested blocks below `block`, zero for a flat block.
    fn block_height(&self, block: BlockId) -> usize {
        let mut deepest = 0;
        let mut pending = vec![(block, 0)];
        while let Some((current, level)) = pending.pop() {
            deepest = deepest.max(level);
            for &stmt in &self.blocks[current.0].stmts {
                for child in self.stmts[stmt.0].kind.nested_blocks() {
                    pending.push((child, level + 1));
                }
            }
        }
        deepest
    }

    pub fn first_stmt(&self, block: BlockId) -> Result<Option<StmtId>, ModuleError> {
        Ok(self.block(block)?.stmts.first().copied())
    }

    /// The statement following `stmt` in its block, if any.
    pub fn next_stmt(&self, stmt: StmtId) -> Result<Option<StmtId>, ModuleError> {
        let s = self.stmt(stmt)?;
        Ok(self.block(s.block)?.stmts.get(s.slot + 1).copied())
    }

    // --- Linear statement index ---

    /// All statements of a procedure in pre-order: each statement precedes the
    /// statements of its nested blocks, and an If's true branch precedes its
    /// false branch.
    pub fn preorder(&self, proc: ProcId) -> Result<Vec<StmtId>, ModuleError> {
        let mut out = Vec::new();
        // Explicit stack of block iterators; nesting depth is user controlled.
        let mut stack = vec![self.block(self.proc(proc)?.body)?.stmts.iter()];
        while let Some(iter) = stack.last_mut() {
            let Some(&stmt) = iter.next() else {
                stack.pop();
                continue;
            };
            out.push(stmt);
            let nested: Vec<BlockId> = self.stmt(stmt)?.kind.nested_blocks().collect();
            for child in nested.into_iter().rev() {
                stack.push(self.block(child)?.stmts.iter());
            }
        }
        Ok(out)
    }

    /// Linear index of `stmt` within `proc` (see [`preorder`](Self::preorder)).
    pub fn stmt_index(&self, proc: ProcId, stmt: StmtId) -> Result<u32, ModuleError> {
        self.preorder(proc)?
            .iter()
            .position(|&s| s == stmt)
            .map(|i| i as u32)
            .ok_or(ModuleError::ForeignStmt { proc, stmt })
    }

    /// Statement at linear `index` within `proc`.
    pub fn stmt_by_index(&self, proc: ProcId, index: u32) -> Result<Option<StmtId>, ModuleError> {
        Ok(self.preorder(proc)?.get(index as usize).copied())
    }

    // --- Persistence ---

    /// Writes the module on its own.
    pub fn save(&self, writer: impl io::Write) -> Result<(), SaveError> {
        let mut enc = Encoder::new();
        self.encode(&mut enc);
        enc.write_to(writer)?;
        info!("saved module with {} procedures", self.procs.len());
        Ok(())
    }

    /// Reads a module written by [`save`](Self::save).
    pub fn load(reader: impl io::Read) -> Result<Self, DecodeError> {
        let text = codec::read_text(reader)?;
        let mut dec = Decoder::new(&text);
        let module = Self::decode(&mut dec)?;
        dec.expect_end()?;
        Ok(module)
    }

    /// Writes the procedure count, then each identifier followed by its body.
    pub fn encode(&self, enc: &mut Encoder) {
        enc.line(format_args!("{}", self.procs.len()));
        for proc in &self.procs {
            enc.line(format_args!("{}", proc.ident));
            self.encode_block(proc.body, enc);
        }
    }

    fn encode_block(&self, block: BlockId, enc: &mut Encoder) {
        let stmts = &self.blocks[block.0].stmts;
        enc.line(format_args!("{}", stmts.len()));
        for &id in stmts {
            let kind = &self.stmts[id.0].kind;
            let tag = kind.type_code();
            match kind {
                StmtKind::Intrinsic(op) => enc.line(format_args!("{tag} {}", op.code())),
                StmtKind::Call(callee) => {
                    enc.line(format_args!("{tag} {}", self.procs[callee.0].ident))
                }
                StmtKind::If(s) => {
                    enc.line(format_args!("{tag} {}", s.cond.encode()));
                    self.encode_block(s.then_block, enc);
                    enc.line(format_args!("{}", u32::from(s.else_block.is_some())));
                    if let Some(else_block) = s.else_block {
                        self.encode_block(else_block, enc);
                    }
                }
                StmtKind::Repeat(s) => {
                    enc.line(format_args!("{tag} {}", s.count));
                    encode_opt_cond(s.start_cond, enc);
                    self.encode_block(s.body, enc);
                    encode_opt_cond(s.end_cond, enc);
                }
                StmtKind::Recurse => enc.line(format_args!("{tag} R")),
            }
        }
    }

    /// Decodes a module.
    ///
    /// Calls are resolved once every procedure has been read, so a procedure
    /// may call one defined after it. Nothing is returned unless the whole
    /// module decodes.
    pub fn decode(dec: &mut Decoder<'_>) -> Result<Self, DecodeError> {
        let count = dec.count("procedure count")?;
        let mut drafts = Vec::new();
        for _ in 0..count {
            let (ident, line) = dec.ident()?;
            let body = decode_block(dec, 0)?;
            drafts.push((ident, line, body));
        }

        let mut module = Self::new();
        let mut ids = HashMap::new();
        for (ident, line, _) in &drafts {
            let id = module
                .append_proc(ident.clone())
                .map_err(|_| DecodeError::DuplicateProc {
                    line: *line,
                    ident: ident.clone(),
                })?;
            ids.insert(ident.clone(), id);
        }
        for (i, (_, _, body)) in drafts.iter().enumerate() {
            let block = module.procs[i].body;
            module.build_block(block, body, &ids)?;
        }

        info!(
            "decoded module with {} procedures, {} statements",
            module.procs.len(),
            module.stmts.len()
        );
        Ok(module)
    }

    fn build_block(
        &mut self,
        block: BlockId,
        drafts: &[Draft],
        ids: &HashMap<ProcIdent, ProcId>,
    ) -> Result<(), DecodeError> {
        for draft in drafts {
            let kind = match draft {
                Draft::Intrinsic(op) => StmtKind::Intrinsic(*op),
                Draft::Call { ident, line } => {
                    let callee = ids.get(ident).ok_or_else(|| DecodeError::UnresolvedProc {
                        line: *line,
                        ident: ident.clone(),
                    })?;
                    StmtKind::Call(*callee)
                }
                Draft::If {
                    cond,
                    then_block,
                    else_block,
                } => {
                    let then_id = self.create_block();
                    self.build_block(then_id, then_block, ids)?;
                    let else_id = match else_block {
                        Some(drafts) => {
                            let id = self.create_block();
                            self.build_block(id, drafts, ids)?;
                            Some(id)
                        }
                        None => None,
                    };
                    StmtKind::If(IfStmt {
                        cond: *cond,
                        then_block: then_id,
                        else_block: else_id,
                    })
                }
                Draft::Repeat {
                    count,
                    start_cond,
                    body,
                    end_cond,
                } => {
                    let body_id = self.create_block();
                    self.build_block(body_id, body, ids)?;
                    StmtKind::repeat(*count, *start_cond, body_id, *end_cond)
                }
                Draft::Recurse => StmtKind::Recurse,
            };
            self.append_stmt(block, kind)?;
        }
        Ok(())
    }
}

fn encode_opt_cond(cond: Option<Condition>, enc: &mut Encoder) {
    match cond {
        Some(cond) => {
            enc.line(format_args!("1"));
            enc.line(format_args!("{}", cond.encode()));
        }
        None => enc.line(format_args!("0")),
    }
}

/// A decoded statement whose calls are not resolved yet.
enum Draft {
    Intrinsic(Intrinsic),
    Call {
        ident: ProcIdent,
        line: usize,
    },
    If {
        cond: Condition,
        then_block: Vec<Draft>,
        else_block: Option<Vec<Draft>>,
    },
    Repeat {
        count: u32,
        start_cond: Option<Condition>,
        body: Vec<Draft>,
        end_cond: Option<Condition>,
    },
    Recurse,
}

/// Reads a block sitting `level` blocks below its procedure body.
fn decode_block(dec: &mut Decoder<'_>, level: usize) -> Result<Vec<Draft>, DecodeError> {
    let count = dec.count("statement count")?;
    let mut stmts = Vec::new();
    for _ in 0..count {
        stmts.push(decode_stmt(dec, level)?);
    }
    Ok(stmts)
}

fn decode_stmt(dec: &mut Decoder<'_>, level: usize) -> Result<Draft, DecodeError> {
    let mut fields = dec.line()?;
    let tag = fields.uint("statement type")?;
    if matches!(tag, 2 | 3) && level >= MAX_NESTING {
        return Err(DecodeError::NestingTooDeep {
            line: fields.line(),
            limit: MAX_NESTING,
        });
    }
    let draft = match tag {
        0 => {
            let code = fields.uint("intrinsic")?;
            let op = Intrinsic::from_code(code)
                .ok_or_else(|| fields.out_of_range("intrinsic", code.into()))?;
            fields.finish()?;
            Draft::Intrinsic(op)
        }
        1 => {
            let ident = fields.ident()?;
            fields.finish()?;
            Draft::Call {
                ident,
                line: fields.line(),
            }
        }
        2 => {
            let cond = Condition::decode(&mut fields)?;
            fields.finish()?;
            let then_block = decode_block(dec, level + 1)?;
            let else_block = if dec.flag("false branch flag")? {
                Some(decode_block(dec, level + 1)?)
            } else {
                None
            };
            Draft::If {
                cond,
                then_block,
                else_block,
            }
        }
        3 => {
            let count = fields.uint("repeat count")?;
            fields.finish()?;
            let start_cond = decode_opt_cond(dec, "start condition flag")?;
            let body = decode_block(dec, level + 1)?;
            let end_cond = decode_opt_cond(dec, "end condition flag")?;
            Draft::Repeat {
                count,
                start_cond,
                body,
                end_cond,
            }
        }
        4 => {
            fields.marker("R")?;
            fields.finish()?;
            Draft::Recurse
        }
        other => return Err(fields.out_of_range("statement type", other.into())),
    };
    Ok(draft)
}

fn decode_opt_cond(
    dec: &mut Decoder<'_>,
    what: &'static str,
) -> Result<Option<Condition>, DecodeError> {
    if !dec.flag(what)? {
        return Ok(None);
    }
    let mut fields = dec.line()?;
    let cond = Condition::decode(&mut fields)?;
    fields.finish()?;
    Ok(Some(cond))
}
