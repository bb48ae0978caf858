//! Game launcher.

use std::path::Path;
use std::process::Command;

use tracing::info;

use crate::error::{Error, Result};

/// Start `exe` with `args` from its own directory and return the child's pid.
///
/// The child is detached: it keeps running after the launcher exits.
pub fn launch_game<S: AsRef<std::ffi::OsStr>>(exe: &Path, args: &[S]) -> Result<u32> {
    if !exe.is_file() {
        return Err(Error::ProcessNotFound(format!(
            "game executable not found at {}",
            exe.display()
        )));
    }

    let mut command = Command::new(exe);
    command.args(args);
    if let Some(dir) = exe.parent().filter(|d| !d.as_os_str().is_empty()) {
        command.current_dir(dir);
    }

    let child = command.spawn()?;
    info!("Launched {} (pid {})", exe.display(), child.id());
    Ok(child.id())
}
