//! Module for the `optimize` subcommand.
//!
//! Reads `X.nef`, `X.manifest.json` and (when present) `X.nefdbgnfo`, runs the optimizer
//! from `nefopt-transform` and writes the `X.optimized.*` artifacts next to the input or
//! into `--out-dir`.

use super::{ArtifactPaths, CliError, artifact_stem, load_artifacts, load_sources};
use async_trait::async_trait;
use clap::Args;
use nefopt_core::cfg_ir::snapshot_bundle;
use nefopt_core::dump::dump_nef;
use nefopt_core::interop::InteropRegistry;
use nefopt_core::process_assets_to_cfg;
use nefopt_transform::optimizer::{
    OptimizationLevel, OptimizationResult, OptimizerConfig, optimize,
};
use std::error::Error;
use std::path::{Path, PathBuf};

/// Arguments for the `optimize` subcommand.
#[derive(Args)]
pub struct OptimizeArgs {
    /// NEF file to optimize.
    pub nef: PathBuf,
    /// Manifest path (default: X.manifest.json next to the NEF).
    #[arg(long)]
    manifest: Option<PathBuf>,
    /// Debug info path (default: X.nefdbgnfo next to the NEF, skipped when absent).
    #[arg(long)]
    debug_info: Option<PathBuf>,
    /// Optimization level: none, basic, experimental or all.
    #[arg(long)]
    level: Option<OptimizationLevel>,
    /// JSON file with an optimizer configuration; flags override its fields.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Upper bound on optimization rounds.
    #[arg(long)]
    max_rounds: Option<usize>,
    /// Accept a NEF whose checksum does not match.
    #[arg(long)]
    lenient: bool,
    /// Also write the disassembly of the optimized NEF as X.optimized.nef.txt.
    #[arg(long)]
    assembly: bool,
    /// Path to emit the size/fee report as JSON.
    #[arg(long, value_name = "PATH")]
    emit: Option<PathBuf>,
    /// Path to emit a detailed CFG trace debug report as JSON.
    #[arg(long, value_name = "PATH")]
    emit_debug: Option<PathBuf>,
    /// Directory for the optimized artifacts (default: the NEF's directory).
    #[arg(long, value_name = "DIR")]
    out_dir: Option<PathBuf>,
}

impl OptimizeArgs {
    async fn config(&self) -> Result<OptimizerConfig, CliError> {
        let mut config = match &self.config {
            Some(path) => serde_json::from_str(&tokio::fs::read_to_string(path).await?)?,
            None => OptimizerConfig::default(),
        };
        if let Some(level) = self.level {
            config.level = level;
        }
        if let Some(rounds) = self.max_rounds {
            config.max_rounds = rounds;
        }
        if self.lenient {
            config.verify_checksum = false;
        }
        Ok(config)
    }
}

/// Executes the `optimize` subcommand.
#[async_trait]
impl super::Command for OptimizeArgs {
    async fn execute(self) -> Result<(), Box<dyn Error>> {
        let config = self.config().await?;
        let stem = artifact_stem(&self.nef)?;
        let out_dir = match &self.out_dir {
            Some(dir) => dir.clone(),
            None => self
                .nef
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        };

        let paths = ArtifactPaths::resolve(
            self.nef.clone(),
            self.manifest.clone(),
            self.debug_info.clone(),
        )?;
        let manifest_path = paths.manifest.clone().unwrap_or_default();
        let assets = load_artifacts(&paths, self.lenient)
            .await?
            .into_assets(&manifest_path)?;

        println!("Optimizing {stem}.nef to {stem}.optimized.nef...");
        let result = optimize(assets, &config)?;
        print_summary(&result);

        let output = |suffix: &str| out_dir.join(format!("{stem}.optimized{suffix}"));
        if !out_dir.as_os_str().is_empty() {
            tokio::fs::create_dir_all(&out_dir).await?;
        }
        let assets = &result.assets;
        tokio::fs::write(output(".nef"), assets.nef.to_bytes()?).await?;
        tokio::fs::write(output(".manifest.json"), assets.manifest.to_json()?).await?;
        if let Some(debug_info) = &assets.debug_info {
            let archive = debug_info.to_archive(&format!("{stem}.optimized.debug.json"))?;
            tokio::fs::write(output(".nefdbgnfo"), archive).await?;
        }
        if self.assembly {
            let sources = load_sources(assets.debug_info.as_ref()).await;
            let text = dump_nef(
                &assets.nef,
                assets.debug_info.as_ref(),
                Some(&assets.manifest),
                &InteropRegistry::neo_n3(),
                &sources,
            )?;
            tokio::fs::write(output(".nef.txt"), text).await?;
        }

        if let Some(path) = self.emit.as_ref() {
            tokio::fs::write(path, serde_json::to_string_pretty(&result.report)?).await?;
            println!("Wrote size/fee report to {}", path.display());
        }

        if let Some(path) = self.emit_debug.as_ref() {
            let (final_ir, _) = process_assets_to_cfg(assets)?;
            let debug_payload = serde_json::to_string_pretty(&serde_json::json!({
                "report": &result.report,
                "trace": &result.trace,
                "cfg": snapshot_bundle(&final_ir),
            }))?;
            tokio::fs::write(path, debug_payload).await?;
            println!("Wrote CFG trace debug report to {}", path.display());
        }

        println!("Optimization finished.");
        Ok(())
    }
}

fn print_summary(result: &OptimizationResult) {
    let report = &result.report;
    println!(
        "  size: {} -> {} bytes ({:+.2}%)",
        report.original_size, report.optimized_size, -report.size_reduction_percentage
    );
    println!(
        "  instructions: {} -> {}",
        report.original_instructions, report.optimized_instructions
    );
    println!(
        "  static fee: {} -> {}",
        report.original_fee, report.optimized_fee
    );
    if report.strategies_applied.is_empty() {
        println!("  no strategy changed the program");
    } else {
        println!(
            "  applied: {} over {} round(s)",
            report.strategies_applied.join(", "),
            report.rounds
        );
    }
}
