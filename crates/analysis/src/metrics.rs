use crate::{Error, Result};
/// Module for computing size, control-flow and fee metrics over a NeoVM CFG-IR.
///
/// The optimizer uses these numbers to log what each strategy bought and to fill the
/// optimization report. The static fee is the sum of opcode base prices over every
/// instruction in the script, i.e. the cost of executing each instruction once.
///
/// # Usage
/// ```rust,ignore
/// let (bundle, _) = nefopt_core::process_assets_to_cfg(&assets)?;
/// let metrics = metrics::collect_metrics(&bundle)?;
/// println!("{}", serde_json::to_string_pretty(&metrics)?);
/// ```
use nefopt_core::cfg_ir::{Block, CfgIrBundle};
use petgraph::visit::Dfs;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    /// Script size in bytes.
    pub byte_len: usize,
    pub instruction_count: usize,
    /// Number of basic blocks in the CFG (excluding Entry/Exit).
    pub block_cnt: usize,
    /// Number of edges in the CFG.
    pub edge_cnt: usize,
    /// Body blocks no path from Entry reaches.
    pub unreachable_blocks: usize,
    /// Sum of opcode base prices.
    pub static_fee: u64,
}

/// Collects metrics from a CFG-IR bundle.
///
/// # Returns
/// A `Metrics` struct, or an error if the graph has no body blocks.
pub fn collect_metrics(ir: &CfgIrBundle) -> Result<Metrics> {
    if ir.cfg.node_count() < 2 {
        return Err(Error::EmptyCfg);
    }

    let blocks = ir.blocks();
    if blocks.is_empty() {
        return Err(Error::NoBodyBlocks);
    }

    let mut instruction_count = 0;
    let mut static_fee = 0u64;
    for (_, body) in &blocks {
        for id in &body.instructions {
            let ins = ir.instruction(*id).ok_or(Error::DanglingInstruction(id.0))?;
            instruction_count += 1;
            static_fee += ins.op.base_price();
        }
    }

    let entry = ir.entry_node().ok_or(Error::EmptyCfg)?;
    let mut reached = 0;
    let mut dfs = Dfs::new(&ir.cfg, entry);
    while let Some(node) = dfs.next(&ir.cfg) {
        if matches!(ir.cfg[node], Block::Body(_)) {
            reached += 1;
        }
    }

    Ok(Metrics {
        byte_len: ir.script_len,
        instruction_count,
        block_cnt: blocks.len(),
        edge_cnt: ir.cfg.edge_count(),
        unreachable_blocks: blocks.len() - reached,
        static_fee,
    })
}

/// Relative change of the static fee, in percent. Negative means cheaper.
pub fn compare(before: &Metrics, after: &Metrics) -> f64 {
    if before.static_fee == 0 {
        return 0.0;
    }
    (after.static_fee as f64 - before.static_fee as f64) * 100.0 / before.static_fee as f64
}

/// Change in script size, in bytes.
pub fn size_delta(before: &Metrics, after: &Metrics) -> i64 {
    after.byte_len as i64 - before.byte_len as i64
}
