//! Module for the `dump` subcommand, which prints the annotated disassembly of a NEF file.

use super::{ArtifactPaths, load_artifacts, load_sources};
use async_trait::async_trait;
use clap::Args;
use nefopt_core::dump::dump_nef;
use nefopt_core::interop::InteropRegistry;
use std::error::Error;
use std::path::PathBuf;

/// Arguments for the `dump` subcommand.
#[derive(Args)]
pub struct DumpArgs {
    /// NEF file to disassemble.
    pub nef: PathBuf,
    /// Manifest used for method start annotations (default: X.manifest.json next to the NEF).
    #[arg(long)]
    manifest: Option<PathBuf>,
    /// Debug info, zipped or plain JSON (default: X.nefdbgnfo next to the NEF).
    #[arg(long)]
    debug_info: Option<PathBuf>,
    /// Output file for the disassembly (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Accept a NEF whose checksum does not match.
    #[arg(long)]
    lenient: bool,
}

/// Executes the `dump` subcommand.
#[async_trait]
impl super::Command for DumpArgs {
    async fn execute(self) -> Result<(), Box<dyn Error>> {
        let paths = ArtifactPaths::resolve(self.nef, self.manifest, self.debug_info)?;
        let artifacts = load_artifacts(&paths, self.lenient).await?;
        let sources = load_sources(artifacts.debug_info.as_ref()).await;

        let text = dump_nef(
            &artifacts.nef,
            artifacts.debug_info.as_ref(),
            artifacts.manifest.as_ref(),
            &InteropRegistry::neo_n3(),
            &sources,
        )?;
        match self.output {
            Some(path) => tokio::fs::write(path, text).await?,
            None => print!("{text}"),
        }
        Ok(())
    }
}
