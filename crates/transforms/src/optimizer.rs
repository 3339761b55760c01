use crate::asset_builder::verify_assets;
use crate::collection_ops::{CollectionOps, DEFAULT_THRESHOLD};
use crate::constant_arithmetic::{ArithmeticPolicy, ConstantArithmetic};
use crate::pass::{DefaultPass, Pass, StrategyRun};
use crate::{Result, Strategy};
use nefopt_analysis::{Metrics, collect_metrics};
use nefopt_core::cfg_ir::TraceEvent;
use nefopt_core::result::Error;
use nefopt_core::validator::{validate_addresses, validate_script};
use nefopt_core::{ContractAssets, process_assets_to_cfg};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which strategies run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizationLevel {
    /// Assets pass through unchanged.
    None,
    /// Constant folding only.
    Basic,
    /// Constant folding and collection fusion.
    Experimental,
    #[default]
    All,
}

impl FromStr for OptimizationLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "basic" => Ok(Self::Basic),
            "experimental" => Ok(Self::Experimental),
            "all" => Ok(Self::All),
            other => Err(format!(
                "unknown optimization level '{other}' (expected none, basic, experimental or all)"
            )),
        }
    }
}

impl fmt::Display for OptimizationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Basic => "basic",
            Self::Experimental => "experimental",
            Self::All => "all",
        };
        f.write_str(name)
    }
}

/// Configuration for the optimization pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub level: OptimizationLevel,
    /// Upper bound on passes over the strategy list; stops earlier once nothing changes.
    pub max_rounds: usize,
    pub arithmetic: ArithmeticPolicy,
    /// Smallest collection fused into a single allocation.
    pub fusion_threshold: usize,
    /// Reject inputs whose NEF checksum does not match.
    pub verify_checksum: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            level: OptimizationLevel::default(),
            max_rounds: 8,
            arithmetic: ArithmeticPolicy::neo_vm(),
            fusion_threshold: DEFAULT_THRESHOLD,
            verify_checksum: true,
        }
    }
}

impl OptimizerConfig {
    pub fn with_level(level: OptimizationLevel) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }

    /// Strategies selected by `level`, in the order they run within a round.
    pub fn strategies(&self) -> Vec<Box<dyn Strategy>> {
        let mut strategies: Vec<Box<dyn Strategy>> = Vec::new();
        if self.level == OptimizationLevel::None {
            return strategies;
        }
        strategies.push(Box::new(ConstantArithmetic::new(self.arithmetic.clone())));
        if matches!(
            self.level,
            OptimizationLevel::Experimental | OptimizationLevel::All
        ) {
            strategies.push(Box::new(CollectionOps::new(self.fusion_threshold)));
        }
        strategies
    }
}

/// Summary written by `optimize --emit`.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationReport {
    pub level: OptimizationLevel,
    pub original_size: usize,
    pub optimized_size: usize,
    /// Negative when the script grew.
    pub size_reduction_percentage: f64,
    pub original_instructions: usize,
    pub optimized_instructions: usize,
    pub original_fee: u64,
    pub optimized_fee: u64,
    /// Rounds that changed the program.
    pub rounds: usize,
    /// Names of strategies that changed the program at least once, in first-applied order.
    pub strategies_applied: Vec<String>,
    pub runs: Vec<StrategyRun>,
}

/// Result of the optimization pipeline
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    pub assets: ContractAssets,
    pub report: OptimizationReport,
    /// Block-graph operations captured during optimization
    pub trace: Vec<TraceEvent>,
}

/// Runs the strategies selected by `config` until the program stops changing or
/// `max_rounds` is reached.
///
/// Input that fails validation is rejected before any rewrite. The output is re-validated
/// before it is returned.
pub fn optimize(mut assets: ContractAssets, config: &OptimizerConfig) -> Result<OptimizationResult> {
    tracing::debug!("Starting optimization pipeline:");
    tracing::debug!("  Level: {}", config.level);
    tracing::debug!("  Max rounds: {}", config.max_rounds);

    let computed = assets.nef.compute_checksum()?;
    if computed != assets.nef.checksum {
        if config.verify_checksum {
            return Err(Error::ChecksumMismatch {
                embedded: assets.nef.checksum,
                computed,
            }
            .into());
        }
        tracing::warn!(
            "NEF checksum 0x{:08x} does not match 0x{:08x}; resealing",
            assets.nef.checksum,
            computed
        );
        assets.nef.checksum = computed;
    }
    let stream = validate_script(&assets.nef.script)?;
    validate_addresses(&stream, Some(&assets.manifest), assets.debug_info.as_ref())?;

    let before = metrics_of(&assets)?;
    tracing::debug!("  Input size: {} bytes", before.byte_len);
    tracing::debug!("  Instructions: {}", before.instruction_count);

    let strategies = config.strategies();
    let mut current = assets;
    let mut runs = Vec::new();
    let mut trace = Vec::new();
    let mut rounds = 0;
    if !strategies.is_empty() {
        for round in 0..config.max_rounds {
            let mut outcome = DefaultPass.run(current, &strategies)?;
            current = outcome.assets;
            trace.append(&mut outcome.trace);
            if outcome.runs.is_empty() {
                tracing::debug!("Fixed point reached after {} round(s)", round);
                break;
            }
            rounds += 1;
            runs.append(&mut outcome.runs);
        }
    }

    verify_assets(&current)?;
    let after = metrics_of(&current)?;

    let mut strategies_applied: Vec<String> = Vec::new();
    for run in &runs {
        if !strategies_applied.contains(&run.strategy) {
            strategies_applied.push(run.strategy.clone());
        }
    }
    let size_reduction_percentage = if before.byte_len == 0 {
        0.0
    } else {
        (before.byte_len as f64 - after.byte_len as f64) * 100.0 / before.byte_len as f64
    };

    tracing::debug!(
        "Optimization finished: {} -> {} bytes in {} round(s)",
        before.byte_len,
        after.byte_len,
        rounds
    );

    Ok(OptimizationResult {
        assets: current,
        report: OptimizationReport {
            level: config.level,
            original_size: before.byte_len,
            optimized_size: after.byte_len,
            size_reduction_percentage,
            original_instructions: before.instruction_count,
            optimized_instructions: after.instruction_count,
            original_fee: before.static_fee,
            optimized_fee: after.static_fee,
            rounds,
            strategies_applied,
            runs,
        },
        trace,
    })
}

fn metrics_of(assets: &ContractAssets) -> Result<Metrics> {
    let (ir, _) = process_assets_to_cfg(assets)?;
    Ok(collect_metrics(&ir)?)
}
