//! This module decodes a NEF script, builds its block graph using the `cfg_ir` module and
//! renders it as a Graphviz .dot file. The output can be written to a file or printed to
//! stdout.

use super::{ArtifactPaths, load_artifacts};
use async_trait::async_trait;
use clap::Args;
use nefopt_core::cfg_ir::{Block, CfgIrBundle, EdgeType, build_cfg_ir};
use nefopt_core::decoder::decode_script;
use std::error::Error;
use std::fmt::Write as _;
use std::path::PathBuf;

/// Arguments for the `cfg` subcommand.
#[derive(Args)]
pub struct CfgArgs {
    /// NEF file whose script is analysed.
    pub nef: PathBuf,
    /// Manifest whose method offsets become entry points (default: X.manifest.json).
    #[arg(long)]
    manifest: Option<PathBuf>,
    /// Output file for Graphviz .dot (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

/// Executes the `cfg` subcommand to generate a CFG visualization.
#[async_trait]
impl super::Command for CfgArgs {
    async fn execute(self) -> Result<(), Box<dyn Error>> {
        let paths = ArtifactPaths::resolve(self.nef, self.manifest, None)?;
        let artifacts = load_artifacts(&paths, false).await?;
        let entry_points = artifacts
            .manifest
            .as_ref()
            .map(|manifest| manifest.method_offsets())
            .unwrap_or_default();

        let stream = decode_script(&artifacts.nef.script)?;
        let cfg_ir = build_cfg_ir(&stream, &entry_points)?;

        let dot = generate_dot(&cfg_ir);
        match self.output {
            Some(path) => tokio::fs::write(path, &dot).await?,
            None => println!("{dot}"),
        }
        Ok(())
    }
}

/// Generates a Graphviz .dot representation of the CFG.
fn generate_dot(cfg_ir: &CfgIrBundle) -> String {
    let mut dot = String::from("digraph CFG {\n");

    for node in cfg_ir.cfg.node_indices() {
        let label = match &cfg_ir.cfg[node] {
            Block::Entry => "Entry".to_string(),
            Block::Exit => "Exit".to_string(),
            Block::Body(body) => {
                let instrs: Vec<String> = body
                    .instructions
                    .iter()
                    .filter_map(|id| cfg_ir.instruction(*id))
                    .map(|ins| ins.to_string())
                    .collect();
                format!("Block_{}\\n{}", body.start_pc, instrs.join("\\n"))
            }
        };
        let _ = writeln!(dot, "    {} [label=\"{}\"];", node.index(), label);
    }

    for edge in cfg_ir.cfg.edge_indices() {
        let (Some((src, dst)), Some(edge_type)) =
            (cfg_ir.cfg.edge_endpoints(edge), cfg_ir.cfg.edge_weight(edge))
        else {
            continue;
        };
        let label = match edge_type {
            EdgeType::Fallthrough => "Fallthrough",
            EdgeType::Jump => "Jump",
            EdgeType::BranchTrue => "BranchTrue",
            EdgeType::BranchFalse => "BranchFalse",
            EdgeType::Call => "Call",
            EdgeType::Catch => "Catch",
            EdgeType::Finally => "Finally",
            EdgeType::EndTry => "EndTry",
        };
        let _ = writeln!(
            dot,
            "    {} -> {} [label=\"{}\"];",
            src.index(),
            dst.index(),
            label
        );
    }

    dot.push_str("}\n");
    dot
}
