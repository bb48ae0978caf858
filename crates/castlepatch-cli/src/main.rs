mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use castlepatch_core::PatchConfig;
use commands::TargetArgs;

#[derive(Parser)]
#[command(name = "castlepatch")]
#[command(about = "Live memory patcher for Castle Story gameplay limits")]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, global = true, env = "CASTLEPATCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Patch a running game process now
    Patch {
        #[command(flatten)]
        target: TargetArgs,

        /// Print the session report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List patch candidates without writing anything
    Scan {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Start the game, wait for it to load, then patch it
    Launch {
        /// Game executable
        #[arg(long)]
        exe: PathBuf,

        /// Arguments passed to the game
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Write back original bytes recorded in a session report
    Restore {
        /// Process ID of the patched game
        #[arg(long)]
        pid: u32,

        /// Session report written by `patch`
        #[arg(long)]
        report: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("castlepatch=info".parse()?))
        .init();

    let args = Args::parse();
    let config = PatchConfig::load_or_default(args.config.as_ref())?;

    match args.command {
        Command::Patch { target, json } => commands::patch::run(&target, config, json),
        Command::Scan { target } => commands::scan::run(&target, config),
        Command::Launch { exe, args } => commands::launch::run(&exe, &args, config),
        Command::Restore { pid, report } => commands::restore::run(pid, &report, config),
    }
}
