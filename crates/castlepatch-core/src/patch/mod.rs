//! Candidate lifecycle: `Proposed → Validated → Applied`, or `Rejected`.
//!
//! The transitions are encoded in types: only [`PatchValidator`] produces a
//! [`ValidatedCandidate`], and only [`PatchApplier`] turns one into a
//! [`PatchRecord`]. `Applied` and `Rejected` are terminal.

mod applier;
mod backup;
mod validator;

use std::fmt;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::limits::{Candidate, LimitCategory};
use crate::scan::BytePattern;

pub use applier::PatchApplier;
pub use backup::{BACKUP_INDEX, BackupEntry, BackupStore};
pub use validator::{PatchValidator, ValidatedCandidate};

/// A write that reached the target process.
///
/// `original` and `new` always have the same length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchRecord {
    address: Address,
    original: BytePattern,
    new: BytePattern,
    category: LimitCategory,
    timestamp: DateTime<Local>,
}

impl PatchRecord {
    pub(crate) fn new(
        address: Address,
        original: BytePattern,
        new: BytePattern,
        category: LimitCategory,
    ) -> Self {
        debug_assert_eq!(original.len(), new.len());
        Self {
            address,
            original,
            new,
            category,
            timestamp: Local::now(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn original_bytes(&self) -> &[u8] {
        self.original.as_bytes()
    }

    pub fn new_bytes(&self) -> &[u8] {
        self.new.as_bytes()
    }

    pub fn category(&self) -> LimitCategory {
        self.category
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    LengthMismatch { original: usize, replacement: usize },
    NoOp,
    ProcessGone,
    Stale { found: Vec<u8> },
    ReadFault { message: String },
    WriteFault { message: String },
    BackupFailed { message: String },
    VerifyFailed { found: Vec<u8> },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LengthMismatch {
                original,
                replacement,
            } => write!(
                f,
                "length mismatch (original {} bytes, replacement {} bytes)",
                original, replacement
            ),
            Self::NoOp => write!(f, "replacement equals original"),
            Self::ProcessGone => write!(f, "process exited or stopped responding"),
            Self::Stale { found } => write!(f, "stale candidate, memory now holds {:02X?}", found),
            Self::ReadFault { message } => write!(f, "read fault: {}", message),
            Self::WriteFault { message } => write!(f, "write fault: {}", message),
            Self::BackupFailed { message } => write!(f, "backup failed: {}", message),
            Self::VerifyFailed { found } => {
                write!(f, "post-write verification read {:02X?}", found)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub address: Address,
    pub category: LimitCategory,
    pub reason: RejectReason,
}

impl Rejection {
    pub fn of(candidate: &Candidate, reason: RejectReason) -> Self {
        Self {
            address: candidate.address,
            category: candidate.category,
            reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateState {
    Proposed(Candidate),
    Validated(ValidatedCandidate),
    Applied(PatchRecord),
    Rejected(Rejection),
}

impl CandidateState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Applied(_) | Self::Rejected(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Proposed(_) => "proposed",
            Self::Validated(_) => "validated",
            Self::Applied(_) => "applied",
            Self::Rejected(_) => "rejected",
        }
    }
}
