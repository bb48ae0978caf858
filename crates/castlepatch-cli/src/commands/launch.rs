//! Launch command implementation.

use std::path::Path;

use anyhow::{Result, anyhow};
use castlepatch_core::launch_game;
use castlepatch_core::prelude::*;

use super::patch::finish;

/// Run the launch command
pub fn run(exe: &Path, args: &[String], config: PatchConfig) -> Result<()> {
    let pid = launch_game(exe, args)?;
    println!(
        "Launched {} (PID: {}), patching in {}s",
        exe.display(),
        pid,
        config.launch_delay_secs
    );

    let artifact_dir = config.artifact_dir.clone();
    let result = spawn_delayed_session(pid, config)
        .join()
        .map_err(|_| anyhow!("patch session thread panicked"))?;
    finish(&result, artifact_dir, false)
}
