//! Forensic backups of bytes overwritten by a patch.
//!
//! Each backup is a raw `.bin` file holding the original bytes plus one line
//! in `backups.txt`:
//!
//! ```text
//! <rfc3339 timestamp>\t<address>\t<length>\t<file name>\t<description>
//! ```

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, Local};
use tracing::{debug, warn};

use crate::address::Address;
use crate::error::Result;

/// Index file name inside the backup directory
pub const BACKUP_INDEX: &str = "backups.txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub timestamp: DateTime<FixedOffset>,
    pub address: Address,
    pub len: usize,
    pub file: PathBuf,
    pub description: String,
}

pub struct BackupStore {
    dir: PathBuf,
}

impl BackupStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist `original` and append its metadata line
    pub fn record(
        &self,
        address: Address,
        original: &[u8],
        description: &str,
    ) -> Result<BackupEntry> {
        fs::create_dir_all(&self.dir)?;

        let now = Local::now();
        let stem = format!("backup_{:X}_{}", address, now.format("%Y%m%d-%H%M%S%3f"));
        let mut file = self.dir.join(format!("{}.bin", stem));
        let mut suffix = 1;
        while file.exists() {
            file = self.dir.join(format!("{}-{}.bin", stem, suffix));
            suffix += 1;
        }
        fs::write(&file, original)?;

        let entry = BackupEntry {
            timestamp: now.fixed_offset(),
            address,
            len: original.len(),
            file,
            description: description.replace(['\t', '\n', '\r'], " "),
        };

        let mut index = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(BACKUP_INDEX))?;
        writeln!(
            index,
            "{}\t{}\t{}\t{}\t{}",
            entry.timestamp.to_rfc3339(),
            entry.address,
            entry.len,
            entry
                .file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            entry.description
        )?;

        debug!("Backed up {} bytes at {} to {}", entry.len, address, entry.file.display());
        Ok(entry)
    }

    /// Parse the index, skipping malformed lines
    pub fn entries(&self) -> Result<Vec<BackupEntry>> {
        let content = match fs::read_to_string(self.dir.join(BACKUP_INDEX)) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| {
                let entry = self.parse_line(line);
                if entry.is_none() {
                    warn!("Skipping malformed backup index line: {}", line);
                }
                entry
            })
            .collect())
    }

    /// Original bytes stored for `entry`
    pub fn read(&self, entry: &BackupEntry) -> Result<Vec<u8>> {
        Ok(fs::read(&entry.file)?)
    }

    fn parse_line(&self, line: &str) -> Option<BackupEntry> {
        let mut fields = line.splitn(5, '\t');
        let timestamp = DateTime::parse_from_rfc3339(fields.next()?).ok()?;
        let address = Address::parse_hex(fields.next()?)?;
        let len = fields.next()?.parse().ok()?;
        let file = self.dir.join(fields.next()?);
        let description = fields.next().unwrap_or_default().to_string();
        Some(BackupEntry {
            timestamp,
            address,
            len,
            file,
            description,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_record_writes_bin_and_index() {
        let dir = tempdir().unwrap();
        let store = BackupStore::new(dir.path());

        let entry = store
            .record(Address::new(0x1400_008C), &[4, 0, 0, 0], "team limit\tvia CurrentTeamInfos")
            .unwrap();
        assert_eq!(fs::read(&entry.file).unwrap(), vec![4, 0, 0, 0]);

        let entries = store.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].address, Address::new(0x1400_008C));
        assert_eq!(entries[0].len, 4);
        assert_eq!(entries[0].description, "team limit via CurrentTeamInfos");
        assert_eq!(store.read(&entries[0]).unwrap(), vec![4, 0, 0, 0]);
    }

    #[test]
    fn test_same_address_twice_gets_distinct_files() {
        let dir = tempdir().unwrap();
        let store = BackupStore::new(dir.path());
        let a = store.record(Address::new(0x10), &[1], "a").unwrap();
        let b = store.record(Address::new(0x10), &[2], "b").unwrap();
        assert_ne!(a.file, b.file);
        assert_eq!(store.entries().unwrap().len(), 2);
    }

    #[test]
    fn test_missing_index_is_empty() {
        let dir = tempdir().unwrap();
        let store = BackupStore::new(dir.path().join("none"));
        assert!(store.entries().unwrap().is_empty());
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(BACKUP_INDEX), "garbage\n\n").unwrap();
        let store = BackupStore::new(dir.path());
        assert!(store.entries().unwrap().is_empty());
    }
}
