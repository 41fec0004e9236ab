/// Entry point for the classweave CLI, a JVM classfile inspection and
/// transformation tool.
///
/// Parses command-line arguments and dispatches to subcommands for
/// disassembling classfiles, dumping constant pools, or running the
/// configured transformer pipeline over class files.
use clap::Parser;
use classweave_cli::commands::{Cmd, Command};
use tracing_subscriber::EnvFilter;

/// Command-line interface for classweave.
#[derive(Parser)]
#[command(name = "classweave")]
#[command(about = "classweave: JVM classfile transformer")]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    cli.command.execute()
}
