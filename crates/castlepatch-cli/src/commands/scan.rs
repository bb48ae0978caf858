//! Scan command implementation.

use anyhow::{Result, bail};
use castlepatch_core::prelude::*;
use castlepatch_core::{Confidence, scan_process};
use owo_colors::OwoColorize;

use super::{TargetArgs, hex};

/// Run the scan command
pub fn run(target: &TargetArgs, config: PatchConfig) -> Result<()> {
    let pid = target.resolve()?;
    let report = scan_process(pid, config)?;

    if let Some(module) = &report.module {
        println!(
            "Module {} (Base: {}, Size: {} bytes)",
            module.name, module.base, module.size
        );
    }
    if let Some(abort) = &report.aborted {
        bail!("Scan aborted: {}", abort.message);
    }

    println!();
    println!("{:<16} {:<18} {:<12} {:<12} Evidence", "Category", "Address", "Current", "New");
    println!("{}", "-".repeat(80));
    for candidate in &report.candidates {
        let evidence = match &candidate.confidence {
            Confidence::Context { needle } => format!("near \"{}\"", needle).green().to_string(),
            Confidence::Clustered { neighbours } => {
                format!("{} small ints nearby", neighbours).yellow().to_string()
            }
        };
        println!(
            "{:<16} {:<18} {:<12} {:<12} {}",
            candidate.category.label(),
            candidate.address.to_string(),
            hex(candidate.original.as_bytes()),
            hex(candidate.replacement.as_bytes()),
            evidence
        );
    }

    println!();
    println!("{} candidate(s)", report.candidates.len().bold());
    for summary in report.categories.iter().filter(|s| s.is_miss()) {
        println!("  no candidates for {}", summary.category.label());
    }
    if report.chunk_faults > 0 {
        println!("  {} unreadable chunk(s) skipped", report.chunk_faults);
    }
    Ok(())
}
