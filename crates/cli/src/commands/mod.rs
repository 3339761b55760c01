use async_trait::async_trait;
use clap::Subcommand;
use nefopt_core::ContractAssets;
use nefopt_core::debug_info::DebugInfo;
use nefopt_core::dump::{MemorySources, document_path};
use nefopt_core::manifest::ContractManifest;
use nefopt_core::nef::NefFile;
use std::error::Error;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod cfg;
pub mod dump;
pub mod optimize;

/// Errors raised by the command line host itself.
#[derive(Debug, Error)]
pub enum CliError {
    /// The manifest next to the NEF is required but missing.
    #[error("{0} required for optimization")]
    MissingManifest(PathBuf),
    /// The input path has no file stem to derive sibling artifact names from.
    #[error("cannot derive artifact names from {0}")]
    InvalidInputPath(PathBuf),
    /// File read/write error.
    #[error("file error: {0}")]
    File(#[from] std::io::Error),
    /// JSON serialization error.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    /// Artifact parsing or validation failed.
    #[error(transparent)]
    Core(#[from] nefopt_core::result::Error),
    /// The optimizer rejected its input or failed internally.
    #[error(transparent)]
    Transform(#[from] nefopt_transform::Error),
}

/// CLI subcommands for nefopt.
#[derive(Subcommand)]
pub enum Cmd {
    /// Print the annotated disassembly of a NEF file.
    Dump(dump::DumpArgs),
    /// Write the block graph of a NEF script as Graphviz .dot.
    Cfg(cfg::CfgArgs),
    /// Optimize a NEF together with its manifest and debug info.
    Optimize(optimize::OptimizeArgs),
}

/// Trait for executing CLI subcommands.
#[async_trait]
pub trait Command {
    /// Executes the subcommand.
    async fn execute(self) -> Result<(), Box<dyn Error>>;
}

#[async_trait]
impl Command for Cmd {
    async fn execute(self) -> Result<(), Box<dyn Error>> {
        match self {
            Cmd::Dump(args) => args.execute().await,
            Cmd::Cfg(args) => args.execute().await,
            Cmd::Optimize(args) => args.execute().await,
        }
    }
}

/// `X` for `dir/X.nef`.
pub(crate) fn artifact_stem(nef_path: &Path) -> Result<String, CliError> {
    nef_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .ok_or_else(|| CliError::InvalidInputPath(nef_path.to_path_buf()))
}

/// `dir/X<suffix>` for `dir/X.nef`.
pub(crate) fn sibling(nef_path: &Path, suffix: &str) -> Result<PathBuf, CliError> {
    let stem = artifact_stem(nef_path)?;
    Ok(nef_path.with_file_name(format!("{stem}{suffix}")))
}

/// Where to find the artifacts that accompany a NEF.
pub(crate) struct ArtifactPaths {
    pub nef: PathBuf,
    pub manifest: Option<PathBuf>,
    pub debug_info: Option<PathBuf>,
}

impl ArtifactPaths {
    /// Explicit paths win; otherwise `X.manifest.json` and `X.nefdbgnfo` next to the NEF.
    pub fn resolve(
        nef: PathBuf,
        manifest: Option<PathBuf>,
        debug_info: Option<PathBuf>,
    ) -> Result<Self, CliError> {
        let manifest = match manifest {
            Some(path) => path,
            None => sibling(&nef, ".manifest.json")?,
        };
        let debug_info = match debug_info {
            Some(path) => path,
            None => sibling(&nef, ".nefdbgnfo")?,
        };
        Ok(Self {
            nef,
            manifest: Some(manifest),
            debug_info: Some(debug_info),
        })
    }
}

/// Artifacts as read from disk. The manifest may be absent for read-only commands.
pub(crate) struct LoadedArtifacts {
    pub nef: NefFile,
    pub manifest: Option<ContractManifest>,
    pub debug_info: Option<DebugInfo>,
}

impl LoadedArtifacts {
    pub fn into_assets(self, manifest_path: &Path) -> Result<ContractAssets, CliError> {
        let manifest = self
            .manifest
            .ok_or_else(|| CliError::MissingManifest(manifest_path.to_path_buf()))?;
        Ok(ContractAssets {
            nef: self.nef,
            manifest,
            debug_info: self.debug_info,
        })
    }
}

/// Reads the NEF and whichever companion files exist.
///
/// With `lenient` the NEF checksum is not verified.
pub(crate) async fn load_artifacts(
    paths: &ArtifactPaths,
    lenient: bool,
) -> Result<LoadedArtifacts, CliError> {
    let bytes = tokio::fs::read(&paths.nef).await?;
    let nef = if lenient {
        NefFile::parse_unchecked(&bytes)?
    } else {
        NefFile::parse(&bytes)?
    };

    let manifest = match &paths.manifest {
        Some(path) if tokio::fs::try_exists(path).await? => {
            let text = tokio::fs::read_to_string(path).await?;
            Some(ContractManifest::from_json(&text)?)
        }
        Some(path) => {
            tracing::warn!("no manifest at {}", path.display());
            None
        }
        None => None,
    };

    let debug_info = match &paths.debug_info {
        Some(path) if tokio::fs::try_exists(path).await? => {
            let bytes = tokio::fs::read(path).await?;
            Some(DebugInfo::load(&bytes)?)
        }
        _ => None,
    };

    Ok(LoadedArtifacts {
        nef,
        manifest,
        debug_info,
    })
}

/// Reads every source document the debug info names. Unreadable documents are skipped;
/// their `# Code` annotations carry no source text.
pub(crate) async fn load_sources(debug_info: Option<&DebugInfo>) -> MemorySources {
    let mut sources = MemorySources::new();
    let Some(debug_info) = debug_info else {
        return sources;
    };
    for index in 0..debug_info.documents.len() {
        let Some(path) = document_path(debug_info, index) else {
            continue;
        };
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => sources.insert(path, &text),
            Err(err) => tracing::debug!("skipping source {}: {}", path.display(), err),
        }
    }
    sources
}
