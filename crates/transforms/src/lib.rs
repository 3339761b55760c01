pub mod asset_builder;
pub mod collection_ops;
pub mod constant_arithmetic;
pub mod optimizer;
pub mod pass;
pub mod relocate;

use nefopt_analysis::Error as MetricsError;
use nefopt_core::cfg_ir::{CfgIrBundle, ControlEdges, InstrId, InstructionArena};
use nefopt_core::decoder::Instruction;
use thiserror::Error;

/// Transform error type encompassing all transform module errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Core operation failed: a format error in the input or an internal-consistency error
    /// raised while relocating.
    #[error(transparent)]
    Core(#[from] nefopt_core::result::Error),

    /// Metrics computation failed.
    #[error("metrics computation failed: {0}")]
    Metrics(#[from] MetricsError),
}

impl Error {
    /// True when the input artifacts, not a rewrite, are at fault.
    pub fn is_format_error(&self) -> bool {
        match self {
            Error::Core(err) => err.is_format_error(),
            Error::Metrics(_) => false,
        }
    }
}

/// Transform result type
pub type Result<T> = std::result::Result<T, Error>;

/// A semantics-preserving rewrite over the block structure of a program.
pub trait Strategy: Send + Sync {
    /// Returns the strategy's name for logging and identification.
    fn name(&self) -> &'static str;
    /// Builds the rewritten program. The input bundle is left untouched.
    fn rewrite(&self, ir: &CfgIrBundle) -> Result<Rewrite>;
}

/// A program after a strategy ran: a fresh ordering of instruction ids over a cloned arena,
/// with id-keyed edges.
#[derive(Debug, Clone)]
pub struct Rewrite {
    pub arena: InstructionArena,
    pub order: Vec<InstrId>,
    pub edges: ControlEdges,
    pub changed: bool,
    /// Length of the script the ids' origin addresses refer to.
    pub script_len: usize,
}

impl Rewrite {
    /// The program exactly as the bundle holds it.
    pub fn identity(ir: &CfgIrBundle) -> Self {
        Self {
            arena: ir.arena.clone(),
            order: ir.ordered_instructions(),
            edges: ir.edges.clone(),
            changed: false,
            script_len: ir.script_len,
        }
    }

    pub fn instruction(&self, id: InstrId) -> Option<&Instruction> {
        self.arena.get(id)
    }

    /// Instructions in emission order.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> + '_ {
        self.order.iter().filter_map(|id| self.arena.get(*id))
    }

    /// Allocates `instruction` as a stand-in for `replaced`: it inherits the origin address
    /// and every reference that pointed at `replaced`.
    pub(crate) fn stand_in(&mut self, instruction: Instruction, replaced: InstrId) -> InstrId {
        let origin = self.arena.origin_pc(replaced);
        let id = self.arena.alloc(instruction, origin);
        self.edges.retarget(replaced, id);
        id
    }

    /// Allocates a fresh helper instruction with no origin address.
    pub(crate) fn fresh(&mut self, instruction: Instruction) -> InstrId {
        self.arena.alloc(instruction, None)
    }
}

/// Runs `rewrite_block` over every basic block in address order and concatenates the
/// results. Patterns therefore never span a block boundary.
pub(crate) fn rewrite_blocks<F>(ir: &CfgIrBundle, mut rewrite_block: F) -> Result<Rewrite>
where
    F: FnMut(&[InstrId], &mut Rewrite) -> Result<Vec<InstrId>>,
{
    let mut rewrite = Rewrite::identity(ir);
    rewrite.order.clear();
    for (_, body) in ir.blocks() {
        let ids = rewrite_block(&body.instructions, &mut rewrite)?;
        rewrite.order.extend(ids);
    }
    Ok(rewrite)
}
