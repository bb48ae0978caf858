//! Append-only plain-text log of one patch session.
//!
//! Every line also goes through `tracing`, so the console subscriber and the
//! session file see the same events.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{debug, info, warn};

pub struct SessionLog {
    path: Option<PathBuf>,
    file: Option<File>,
}

impl SessionLog {
    /// Open a new `patch-<timestamp>.log` in `dir`
    pub fn create<P: AsRef<Path>>(dir: P) -> std::io::Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(format!(
            "patch-{}.log",
            Local::now().format("%Y%m%d-%H%M%S%3f")
        ));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path: Some(path),
            file: Some(file),
        })
    }

    /// A log that only emits tracing events
    pub fn detached() -> Self {
        Self {
            path: None,
            file: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        debug!("{}", message.as_ref());
        self.append("DEBUG", message.as_ref());
    }

    pub fn info(&self, message: impl AsRef<str>) {
        info!("{}", message.as_ref());
        self.append("INFO", message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        warn!("{}", message.as_ref());
        self.append("WARN", message.as_ref());
    }

    fn append(&self, level: &str, message: &str) {
        let Some(mut file) = self.file.as_ref() else {
            return;
        };
        let line = format!(
            "[{}] {:<5} {}",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            level,
            message
        );
        if let Err(e) = writeln!(file, "{}", line) {
            warn!("Failed to append to session log: {}", e);
        }
    }
}
