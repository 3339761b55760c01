use crate::cfg_ir::{Block, BlockControl, CfgIrBundle, EdgeType};
use crate::decoder::Instruction;
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Operations recorded in the CFG trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    Build {
        body_blocks: usize,
        edges: usize,
    },
    Rewrite {
        strategy: String,
        changed: bool,
    },
    Relocate {
        /// Short forms widened to their `_L` counterpart.
        upgraded: usize,
    },
}

/// Trace entry describing an applied operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub kind: OperationKind,
    /// Old address to new address, for operations that moved instructions.
    pub remapped_pcs: Option<BTreeMap<usize, usize>>,
}

/// Serializable picture of a block graph, written by `--emit-debug`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfgIrSnapshot {
    pub blocks: Vec<BlockSnapshot>,
    pub edges: Vec<EdgeSnapshot>,
    pub script_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockSnapshot {
    pub node: usize,
    pub start_pc: usize,
    pub control: String,
    pub instructions: Vec<Instruction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeSnapshot {
    pub source: usize,
    pub target: usize,
    pub kind: EdgeType,
}

/// Captures blocks (in address order) and edges of a bundle.
pub fn snapshot_bundle(bundle: &CfgIrBundle) -> CfgIrSnapshot {
    let blocks = bundle
        .blocks()
        .into_iter()
        .map(|(node, body)| BlockSnapshot {
            node: node.index(),
            start_pc: body.start_pc,
            control: control_label(&body.control).to_string(),
            instructions: body
                .instructions
                .iter()
                .filter_map(|id| bundle.arena.get(*id).cloned())
                .collect(),
        })
        .collect();

    let edges = bundle
        .cfg
        .edge_references()
        .map(|edge| EdgeSnapshot {
            source: edge.source().index(),
            target: edge.target().index(),
            kind: *edge.weight(),
        })
        .collect();

    CfgIrSnapshot {
        blocks,
        edges,
        script_len: bundle.script_len,
    }
}

/// Short label for a block's exit kind.
pub fn control_label(control: &BlockControl) -> &'static str {
    match control {
        BlockControl::Fallthrough { .. } => "fallthrough",
        BlockControl::Jump { .. } => "jump",
        BlockControl::Branch { .. } => "branch",
        BlockControl::Call { .. } => "call",
        BlockControl::Try { .. } => "try",
        BlockControl::EndTry { .. } => "endtry",
        BlockControl::Dynamic => "endfinally",
        BlockControl::Terminal => "terminal",
    }
}

/// Number of body blocks in a bundle.
pub(crate) fn body_block_count(bundle: &CfgIrBundle) -> usize {
    bundle
        .cfg
        .node_indices()
        .filter(|idx| matches!(bundle.cfg[*idx], Block::Body(_)))
        .count()
}
