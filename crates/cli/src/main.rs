mod commands;

use clap::Parser;
use commands::{Cmd, Command};
use tracing::Level;

/// nefopt CLI
///
/// nefopt is a post-compilation optimizer for NeoVM contracts. It disassembles NEF files,
/// renders their control flow graphs and rewrites them with semantics-preserving
/// strategies, relocating every address in the NEF, manifest and debug info.
#[derive(Parser)]
#[command(name = "nefopt")]
#[command(about = "nefopt: NeoVM NEF optimizer")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Cmd,
}

/// Runs the nefopt CLI with the provided arguments.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_ansi(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    cli.command.execute().await
}
