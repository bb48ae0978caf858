//! Restore command implementation.

use std::path::Path;

use anyhow::{Context, Result};
use castlepatch_core::prelude::*;
use castlepatch_core::restore_patches;
use owo_colors::OwoColorize;

/// Run the restore command
pub fn run(pid: u32, report: &Path, config: PatchConfig) -> Result<()> {
    let session = PatchSessionResult::load_report(report)
        .with_context(|| format!("Failed to load report {}", report.display()))?;
    if session.pid != pid {
        println!(
            "{} report was written for process {}, restoring into {}",
            "Warning:".yellow(),
            session.pid,
            pid
        );
    }

    let summary = restore_patches(pid, &session.records, config)?;
    for (address, message) in &summary.failures {
        println!("  {} {}  {}", "-".red(), address, message);
    }
    println!(
        "{}",
        format!("{} of {} patches restored", summary.restored, session.records.len()).bold()
    );
    Ok(())
}
