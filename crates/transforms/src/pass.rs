use crate::asset_builder::build_optimized_assets;
use crate::relocate::relocate;
use crate::{Result, Strategy};
use nefopt_analysis::{Metrics, collect_metrics, compare, size_delta};
use nefopt_core::cfg_ir::{OperationKind, TraceEvent};
use nefopt_core::{ContractAssets, process_assets_to_cfg};
use serde::Serialize;
use tracing::info;

/// One strategy application that changed the program.
#[derive(Debug, Clone, Serialize)]
pub struct StrategyRun {
    pub strategy: String,
    /// Change in script size, in bytes.
    pub size_delta: i64,
    /// Relative change of the static fee, in percent.
    pub fee_delta: f64,
    pub upgraded_jumps: usize,
}

/// Snapshot after running every strategy once.
#[derive(Debug, Clone)]
pub struct PassOutcome {
    pub assets: ContractAssets,
    pub runs: Vec<StrategyRun>,
    pub trace: Vec<TraceEvent>,
}

impl PassOutcome {
    pub fn changed(&self) -> bool {
        !self.runs.is_empty()
    }
}

/// Trait for running a sequence of strategies over contract assets.
pub trait Pass {
    fn run(&self, assets: ContractAssets, strategies: &[Box<dyn Strategy>]) -> Result<PassOutcome>;
}

/// Runs each strategy as a full round trip: block graph, rewrite, relocation and rebuilt
/// assets. The next strategy starts from the rebuilt snapshot.
pub struct DefaultPass;

impl Pass for DefaultPass {
    fn run(&self, assets: ContractAssets, strategies: &[Box<dyn Strategy>]) -> Result<PassOutcome> {
        let mut current = assets;
        let mut runs = Vec::new();
        let mut trace = Vec::new();

        for strategy in strategies {
            let (mut ir, _) = process_assets_to_cfg(&current)?;
            let before = collect_metrics(&ir)?;

            let rewrite = strategy.rewrite(&ir)?;
            ir.record_operation(
                OperationKind::Rewrite {
                    strategy: strategy.name().to_string(),
                    changed: rewrite.changed,
                },
                None,
            );
            if !rewrite.changed {
                trace.append(&mut ir.trace);
                continue;
            }

            let relocation = relocate(&rewrite)?;
            ir.record_operation(
                OperationKind::Relocate {
                    upgraded: relocation.upgraded,
                },
                Some(relocation.address_map.moved()),
            );
            trace.append(&mut ir.trace);

            let next = build_optimized_assets(&current, &relocation)?;
            let (after_ir, _) = process_assets_to_cfg(&next)?;
            let after = collect_metrics(&after_ir)?;
            let run = record(strategy.name(), &before, &after, relocation.upgraded);

            info!(
                "{:>16} Δsize {:+} Δfee {:+.2}%",
                run.strategy, run.size_delta, run.fee_delta
            );
            runs.push(run);
            current = next;
        }

        Ok(PassOutcome {
            assets: current,
            runs,
            trace,
        })
    }
}

fn record(name: &str, before: &Metrics, after: &Metrics, upgraded: usize) -> StrategyRun {
    StrategyRun {
        strategy: name.to_string(),
        size_delta: size_delta(before, after),
        fee_delta: compare(before, after),
        upgraded_jumps: upgraded,
    }
}
