//! Patch command implementation.

use std::path::PathBuf;

use anyhow::Result;
use castlepatch_core::prelude::*;
use tracing::warn;

use super::{TargetArgs, print_result};

/// Run the patch command
pub fn run(target: &TargetArgs, config: PatchConfig, json: bool) -> Result<()> {
    let pid = target.resolve()?;
    println!("Patching process {}", pid);

    let artifact_dir = config.artifact_dir.clone();
    let result = run_patch_session(pid, config);
    finish(&result, artifact_dir, json)
}

/// Save the session report next to its log, then print the outcome.
///
/// Patching failures are reported, never returned as errors.
pub fn finish(result: &PatchSessionResult, artifact_dir: PathBuf, json: bool) -> Result<()> {
    let report = report_path(result, artifact_dir);
    if result.any_applied() {
        if let Err(e) = result.write_report(&report) {
            warn!("Failed to write report to {}: {}", report.display(), e);
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    print_result(result);
    if result.any_applied() {
        println!("Report: {}", report.display());
    }
    Ok(())
}

fn report_path(result: &PatchSessionResult, artifact_dir: PathBuf) -> PathBuf {
    match &result.log_path {
        Some(log) => log.with_extension("json"),
        None => artifact_dir.join(format!("patch-{}.json", result.pid)),
    }
}
