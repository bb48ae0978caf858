//! CLI command implementations.

pub mod launch;
pub mod patch;
pub mod restore;
pub mod scan;

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use castlepatch_core::prelude::*;
use castlepatch_core::{find_target_process, list_processes};
use clap::Args;
use owo_colors::OwoColorize;
use tracing::info;

/// Which process to act on
#[derive(Args)]
pub struct TargetArgs {
    /// Process ID of the running game
    #[arg(long, conflicts_with = "exe", required_unless_present = "exe")]
    pub pid: Option<u32>,

    /// Path of the game executable; the matching running process is used
    #[arg(long)]
    pub exe: Option<PathBuf>,
}

impl TargetArgs {
    pub fn resolve(&self) -> Result<u32> {
        match (self.pid, &self.exe) {
            (Some(pid), _) => Ok(pid),
            (None, Some(exe)) => find_by_exe(exe),
            (None, None) => bail!("either --pid or --exe is required"),
        }
    }
}

fn find_by_exe(exe: &Path) -> Result<u32> {
    let processes = list_processes()?;
    match find_target_process(&processes, exe) {
        Some(pid) => {
            info!("Found {} (PID: {})", exe.display(), pid);
            Ok(pid)
        }
        None => bail!("No running process matches {}", exe.display()),
    }
}

/// Human-readable session outcome
pub fn print_result(result: &PatchSessionResult) {
    for record in &result.records {
        println!(
            "  {} {:<16} {}  {} -> {}",
            "+".green(),
            record.category().label(),
            record.address(),
            hex(record.original_bytes()),
            hex(record.new_bytes())
        );
    }
    for rejection in &result.rejections {
        println!(
            "  {} {:<16} {}  {}",
            "-".red(),
            rejection.category.label(),
            rejection.address,
            rejection.reason
        );
    }
    for summary in result.categories.iter().filter(|s| s.is_miss()) {
        println!("  {} {:<16} no candidates", "?".yellow(), summary.category.label());
    }
    if result.chunk_faults > 0 {
        println!(
            "  {} {} unreadable chunk(s) skipped",
            "!".yellow(),
            result.chunk_faults
        );
    }

    println!();
    if let Some(abort) = &result.aborted {
        println!("{} {}", "Aborted:".red().bold(), abort.message);
    }
    if result.any_applied() {
        println!("{}", result.summary().green().bold());
    } else {
        println!("{}", result.summary().yellow().bold());
    }
    if let Some(path) = &result.log_path {
        println!("Log: {}", path.display());
    }
}

pub fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
