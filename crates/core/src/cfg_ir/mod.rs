//! Control Flow Graph Intermediate Representation
//!
//! Blocks are a view over an [`InstructionArena`]: every decoded instruction gets an
//! [`InstrId`] once, and every address-valued operand is recorded as an id-to-id edge in
//! [`ControlEdges`]. Rewrites build a new ordering of ids and never patch offsets by hand;
//! concrete operands are only produced again when the program is relocated.

use crate::Opcode;
use crate::decoder::{Instruction, InstructionStream};
use crate::result::{Error, Result};
use crate::{is_block_ending_opcode, is_terminal_opcode};
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableDiGraph;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

mod trace;

pub use trace::{
    BlockSnapshot, CfgIrSnapshot, EdgeSnapshot, OperationKind, TraceEvent, control_label,
    snapshot_bundle,
};

/// Stable identity of an instruction across rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstrId(pub usize);

impl fmt::Display for InstrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArenaEntry {
    pub instruction: Instruction,
    /// Address the instruction had in the input script. Replacements inherit the address of
    /// the first instruction they stand in for; fresh helper instructions have none.
    pub origin_pc: Option<usize>,
}

/// Owner of every instruction the optimizer has seen. Ids are never reused.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstructionArena {
    entries: Vec<ArenaEntry>,
}

impl InstructionArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, instruction: Instruction, origin_pc: Option<usize>) -> InstrId {
        self.entries.push(ArenaEntry {
            instruction,
            origin_pc,
        });
        InstrId(self.entries.len() - 1)
    }

    pub fn get(&self, id: InstrId) -> Option<&Instruction> {
        self.entries.get(id.0).map(|entry| &entry.instruction)
    }

    pub fn origin_pc(&self, id: InstrId) -> Option<usize> {
        self.entries.get(id.0).and_then(|entry| entry.origin_pc)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Handlers of a `TRY`. `None` encodes an absent handler (offset 0 on the wire).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TryTargets {
    pub catch: Option<InstrId>,
    pub finally: Option<InstrId>,
}

/// Id-keyed address references of a program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlEdges {
    /// Jumps, calls, `ENDTRY` and `PUSHA`.
    pub jumps: BTreeMap<InstrId, InstrId>,
    pub tries: BTreeMap<InstrId, TryTargets>,
    /// Reverse index: target to every instruction referring to it.
    pub sources: BTreeMap<InstrId, BTreeSet<InstrId>>,
}

impl ControlEdges {
    pub fn add_jump(&mut self, source: InstrId, target: InstrId) {
        self.jumps.insert(source, target);
        self.sources.entry(target).or_default().insert(source);
    }

    pub fn add_try(&mut self, source: InstrId, targets: TryTargets) {
        self.tries.insert(source, targets);
        for target in [targets.catch, targets.finally].into_iter().flatten() {
            self.sources.entry(target).or_default().insert(source);
        }
    }

    pub fn is_target(&self, id: InstrId) -> bool {
        self.sources.get(&id).is_some_and(|set| !set.is_empty())
    }

    /// Points every reference to `old` at `new`.
    pub fn retarget(&mut self, old: InstrId, new: InstrId) {
        if old == new {
            return;
        }
        let Some(sources) = self.sources.remove(&old) else {
            return;
        };
        for source in &sources {
            if let Some(target) = self.jumps.get_mut(source) {
                if *target == old {
                    *target = new;
                }
            }
            if let Some(targets) = self.tries.get_mut(source) {
                if targets.catch == Some(old) {
                    targets.catch = Some(new);
                }
                if targets.finally == Some(old) {
                    targets.finally = Some(new);
                }
            }
        }
        self.sources.entry(new).or_default().extend(sources);
    }

    /// Every instruction referenced by any edge.
    pub fn targets(&self) -> impl Iterator<Item = InstrId> + '_ {
        self.sources
            .iter()
            .filter(|(_, set)| !set.is_empty())
            .map(|(target, _)| *target)
    }
}

/// CFG node representation.
#[derive(Debug, Clone, Default)]
pub enum Block {
    #[default]
    Entry,
    Exit,
    Body(BlockBody),
}

/// Concrete contents of a body block.
#[derive(Debug, Clone)]
pub struct BlockBody {
    pub start_pc: usize,
    pub instructions: Vec<InstrId>,
    pub control: BlockControl,
}

/// High-level view of how a block exits. Targets name body blocks; `None` stands for the
/// end of the script.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockControl {
    Fallthrough { next: Option<NodeIndex> },
    Jump { target: NodeIndex },
    /// Conditional jump; the false edge is the fallthrough.
    Branch {
        true_target: NodeIndex,
        false_target: Option<NodeIndex>,
    },
    /// `CALL`/`CALL_L` (`callee` known) or `CALLA` (`callee` dynamic). Execution resumes at
    /// `next` on return.
    Call {
        callee: Option<NodeIndex>,
        next: Option<NodeIndex>,
    },
    Try {
        body: Option<NodeIndex>,
        catch: Option<NodeIndex>,
        finally: Option<NodeIndex>,
    },
    EndTry { target: NodeIndex },
    /// `ENDFINALLY`: continues wherever the pending `ENDTRY` or exception leads.
    Dynamic,
    /// `RET`, `THROW`, `ABORT`, `ABORTMSG`.
    Terminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeType {
    Fallthrough,
    Jump,
    BranchTrue,
    BranchFalse,
    Call,
    Catch,
    Finally,
    EndTry,
}

/// Bundle returned by `build_cfg_ir` and handed to every strategy.
#[derive(Debug, Clone)]
pub struct CfgIrBundle {
    pub cfg: StableDiGraph<Block, EdgeType>,
    pub pc_to_block: HashMap<usize, NodeIndex>,
    pub arena: InstructionArena,
    pub edges: ControlEdges,
    /// Method entry addresses the graph was built with.
    pub entry_points: Vec<usize>,
    pub script_len: usize,
    pub trace: Vec<TraceEvent>,
}

impl CfgIrBundle {
    /// Body blocks ordered by start address.
    pub fn blocks(&self) -> Vec<(NodeIndex, &BlockBody)> {
        let mut blocks: Vec<_> = self
            .cfg
            .node_indices()
            .filter_map(|idx| match &self.cfg[idx] {
                Block::Body(body) => Some((idx, body)),
                _ => None,
            })
            .collect();
        blocks.sort_by_key(|(_, body)| body.start_pc);
        blocks
    }

    pub fn block_starts(&self) -> Vec<usize> {
        let mut starts: Vec<usize> = self.pc_to_block.keys().copied().collect();
        starts.sort_unstable();
        starts
    }

    pub fn block_control(&self, node: NodeIndex) -> Option<&BlockControl> {
        match self.cfg.node_weight(node) {
            Some(Block::Body(body)) => Some(&body.control),
            _ => None,
        }
    }

    pub fn instruction(&self, id: InstrId) -> Option<&Instruction> {
        self.arena.get(id)
    }

    /// Instruction ids in address order.
    pub fn ordered_instructions(&self) -> Vec<InstrId> {
        self.blocks()
            .into_iter()
            .flat_map(|(_, body)| body.instructions.iter().copied())
            .collect()
    }

    pub fn entry_node(&self) -> Option<NodeIndex> {
        self.cfg
            .node_indices()
            .find(|idx| matches!(self.cfg[*idx], Block::Entry))
    }

    pub fn exit_node(&self) -> Option<NodeIndex> {
        self.cfg
            .node_indices()
            .find(|idx| matches!(self.cfg[*idx], Block::Exit))
    }

    /// Records a trace event capturing how the program changed.
    pub fn record_operation(
        &mut self,
        kind: OperationKind,
        remapped_pcs: Option<BTreeMap<usize, usize>>,
    ) {
        self.trace.push(TraceEvent { kind, remapped_pcs });
    }
}

/// Builds the block graph of a decoded script.
///
/// `entry_points` are method start addresses (manifest offsets, debug method starts); each
/// one opens a block and must sit on an instruction boundary.
pub fn build_cfg_ir(stream: &InstructionStream, entry_points: &[usize]) -> Result<CfgIrBundle> {
    tracing::debug!(
        "Building CFG from {} instructions with {} entry points",
        stream.len(),
        entry_points.len()
    );

    let mut arena = InstructionArena::new();
    let ids: Vec<InstrId> = stream
        .iter()
        .map(|ins| arena.alloc(ins.clone(), Some(ins.pc)))
        .collect();
    let id_at = |pc: usize| stream.index_of(pc).map(|idx| ids[idx]);

    let mut boundaries = BTreeSet::new();
    if !stream.is_empty() {
        boundaries.insert(0);
    }
    for &entry in entry_points {
        if !stream.is_boundary(entry) {
            return Err(Error::InvalidEntryPoint(entry));
        }
        boundaries.insert(entry);
    }

    let mut edges = ControlEdges::default();
    for (idx, ins) in stream.iter().enumerate() {
        let source = ids[idx];
        if let Some(offset) = ins.jump_offset() {
            let target = resolve_target(stream, ins, offset)?;
            boundaries.insert(target);
            if let Some(target_id) = id_at(target) {
                edges.add_jump(source, target_id);
            }
        } else if let Some((catch, finally)) = ins.try_offsets() {
            let mut targets = TryTargets::default();
            if catch != 0 {
                let pc = resolve_target(stream, ins, catch)?;
                boundaries.insert(pc);
                targets.catch = id_at(pc);
            }
            if finally != 0 {
                let pc = resolve_target(stream, ins, finally)?;
                boundaries.insert(pc);
                targets.finally = id_at(pc);
            }
            edges.add_try(source, targets);
        }
        let next = ins.pc + ins.byte_size();
        if is_block_ending_opcode(ins.op) && next < stream.script_len() {
            boundaries.insert(next);
        }
    }

    let mut cfg = StableDiGraph::new();
    let entry = cfg.add_node(Block::Entry);
    let exit = cfg.add_node(Block::Exit);

    let mut pc_to_block = HashMap::new();
    let mut ordered_nodes = Vec::new();
    let mut current: Option<BlockBody> = None;
    for (idx, ins) in stream.iter().enumerate() {
        if boundaries.contains(&ins.pc) {
            if let Some(body) = current.take() {
                let start = body.start_pc;
                let node = cfg.add_node(Block::Body(body));
                pc_to_block.insert(start, node);
                ordered_nodes.push(node);
            }
        }
        current
            .get_or_insert_with(|| BlockBody {
                start_pc: ins.pc,
                instructions: Vec::new(),
                control: BlockControl::Fallthrough { next: None },
            })
            .instructions
            .push(ids[idx]);
    }
    if let Some(body) = current.take() {
        let start = body.start_pc;
        let node = cfg.add_node(Block::Body(body));
        pc_to_block.insert(start, node);
        ordered_nodes.push(node);
    }

    let mut bundle = CfgIrBundle {
        cfg,
        pc_to_block,
        arena,
        edges,
        entry_points: entry_points.to_vec(),
        script_len: stream.script_len(),
        trace: Vec::new(),
    };

    analyse_and_connect(&mut bundle, &ordered_nodes, entry, exit)?;

    let body_blocks = trace::body_block_count(&bundle);
    let edge_count = bundle.cfg.edge_count();
    tracing::debug!("CFG has {} blocks and {} edges", body_blocks, edge_count);
    bundle.record_operation(
        OperationKind::Build {
            body_blocks,
            edges: edge_count,
        },
        None,
    );
    Ok(bundle)
}

/// Absolute target of a relative operand, checked against the instruction boundaries.
fn resolve_target(stream: &InstructionStream, ins: &Instruction, offset: i32) -> Result<usize> {
    let target = ins.pc as i64 + offset as i64;
    let invalid = || Error::InvalidJumpTarget {
        pc: ins.pc,
        op: ins.op,
        target,
    };
    let pc = usize::try_from(target).map_err(|_| invalid())?;
    if pc >= stream.script_len() || !stream.is_boundary(pc) {
        return Err(invalid());
    }
    Ok(pc)
}

/// Derives control descriptors for each block and wires up the corresponding edges.
fn analyse_and_connect(
    bundle: &mut CfgIrBundle,
    ordered_nodes: &[NodeIndex],
    entry: NodeIndex,
    exit: NodeIndex,
) -> Result<()> {
    match ordered_nodes.first() {
        Some(first) => {
            bundle.cfg.add_edge(entry, *first, EdgeType::Fallthrough);
        }
        None => {
            bundle.cfg.add_edge(entry, exit, EdgeType::Fallthrough);
        }
    }
    for pc in bundle.entry_points.clone() {
        if let Some(node) = bundle.pc_to_block.get(&pc).copied() {
            if Some(&node) != ordered_nodes.first() {
                bundle.cfg.add_edge(entry, node, EdgeType::Call);
            }
        }
    }

    for (idx, node) in ordered_nodes.iter().enumerate() {
        let next = ordered_nodes.get(idx + 1).copied();
        let control = analyse_block_control(bundle, *node, next)?;
        if let Some(Block::Body(body)) = bundle.cfg.node_weight_mut(*node) {
            body.control = control.clone();
        }
        emit_edges(bundle, *node, &control, exit);
        emit_pointer_edges(bundle, *node)?;
    }
    Ok(())
}

/// Infers the `BlockControl` descriptor for a block using its terminator instruction.
fn analyse_block_control(
    bundle: &CfgIrBundle,
    node: NodeIndex,
    next: Option<NodeIndex>,
) -> Result<BlockControl> {
    let Some(Block::Body(body)) = bundle.cfg.node_weight(node) else {
        return Err(Error::InvalidBlockStructure(format!(
            "node {} is not a body block",
            node.index()
        )));
    };
    let last = body
        .instructions
        .last()
        .copied()
        .ok_or_else(|| Error::InvalidBlockStructure(format!("block at {} is empty", body.start_pc)))?;
    let ins = bundle
        .arena
        .get(last)
        .ok_or(Error::DanglingTarget(last.0))?;

    let target_block = |id: InstrId| -> Result<NodeIndex> {
        let pc = bundle
            .arena
            .origin_pc(id)
            .ok_or(Error::DanglingTarget(id.0))?;
        bundle.pc_to_block.get(&pc).copied().ok_or_else(|| {
            Error::InvalidBlockStructure(format!("target {pc} does not start a block"))
        })
    };
    let jump_target = || -> Result<NodeIndex> {
        let target = bundle
            .edges
            .jumps
            .get(&last)
            .copied()
            .ok_or(Error::DanglingTarget(last.0))?;
        target_block(target)
    };

    let control = match ins.op {
        op if op.is_conditional_jump() => BlockControl::Branch {
            true_target: jump_target()?,
            false_target: next,
        },
        op if op.is_jump() => BlockControl::Jump {
            target: jump_target()?,
        },
        op if op.is_call() => BlockControl::Call {
            callee: Some(jump_target()?),
            next,
        },
        Opcode::CALLA => BlockControl::Call { callee: None, next },
        op if op.is_try() => {
            let targets = bundle.edges.tries.get(&last).copied().unwrap_or_default();
            BlockControl::Try {
                body: next,
                catch: targets.catch.map(&target_block).transpose()?,
                finally: targets.finally.map(&target_block).transpose()?,
            }
        }
        op if op.is_endtry() => BlockControl::EndTry {
            target: jump_target()?,
        },
        Opcode::ENDFINALLY => BlockControl::Dynamic,
        op if is_terminal_opcode(op) => BlockControl::Terminal,
        _ => BlockControl::Fallthrough { next },
    };
    Ok(control)
}

/// Adds outgoing edges that match the supplied control information.
fn emit_edges(bundle: &mut CfgIrBundle, source: NodeIndex, control: &BlockControl, exit: NodeIndex) {
    let cfg = &mut bundle.cfg;
    let or_exit = |node: Option<NodeIndex>| node.unwrap_or(exit);
    match control {
        BlockControl::Fallthrough { next } => {
            cfg.add_edge(source, or_exit(*next), EdgeType::Fallthrough);
        }
        BlockControl::Jump { target } => {
            cfg.add_edge(source, *target, EdgeType::Jump);
        }
        BlockControl::Branch {
            true_target,
            false_target,
        } => {
            cfg.add_edge(source, *true_target, EdgeType::BranchTrue);
            cfg.add_edge(source, or_exit(*false_target), EdgeType::BranchFalse);
        }
        BlockControl::Call { callee, next } => {
            if let Some(callee) = callee {
                cfg.add_edge(source, *callee, EdgeType::Call);
            }
            cfg.add_edge(source, or_exit(*next), EdgeType::Fallthrough);
        }
        BlockControl::Try {
            body,
            catch,
            finally,
        } => {
            cfg.add_edge(source, or_exit(*body), EdgeType::Fallthrough);
            if let Some(catch) = catch {
                cfg.add_edge(source, *catch, EdgeType::Catch);
            }
            if let Some(finally) = finally {
                cfg.add_edge(source, *finally, EdgeType::Finally);
            }
        }
        BlockControl::EndTry { target } => {
            cfg.add_edge(source, *target, EdgeType::EndTry);
        }
        BlockControl::Dynamic | BlockControl::Terminal => {
            cfg.add_edge(source, exit, EdgeType::Fallthrough);
        }
    }
}

/// `PUSHA` pointers make their target reachable through a later `CALLA`.
fn emit_pointer_edges(bundle: &mut CfgIrBundle, source: NodeIndex) -> Result<()> {
    let Some(Block::Body(body)) = bundle.cfg.node_weight(source) else {
        return Ok(());
    };
    let mut callees = Vec::new();
    for id in &body.instructions {
        let is_pointer = bundle
            .arena
            .get(*id)
            .is_some_and(|ins| ins.op == Opcode::PUSHA);
        if !is_pointer {
            continue;
        }
        let target = bundle
            .edges
            .jumps
            .get(id)
            .and_then(|target| bundle.arena.origin_pc(*target))
            .and_then(|pc| bundle.pc_to_block.get(&pc).copied())
            .ok_or(Error::DanglingTarget(id.0))?;
        callees.push(target);
    }
    for target in callees {
        bundle.cfg.add_edge(source, target, EdgeType::Call);
    }
    Ok(())
}
