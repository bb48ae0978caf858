//! # castlepatch-core
//!
//! Live memory patcher that lifts hard-coded gameplay limits in a running
//! Castle Story process.
//!
//! This crate provides:
//! - Process memory access behind the [`MemoryBackend`] seam, with deadline
//!   bounded OS calls and scoped page-protection changes
//! - Main module resolution and chunked byte-pattern scanning
//! - Context-gated limit detection (team, player, bricktron, resource)
//! - A validate → back up → write → verify pipeline with restore support
//! - Patch sessions with a plain-text log, JSON reports and delayed retries
//! - Target process lookup and game launching
//!
//! Windows is the only platform with a real process backend; elsewhere the
//! OS-facing entry points fail with [`Error::Unsupported`].

pub mod address;
pub mod config;
pub mod error;
pub mod limits;
pub mod memory;
pub mod module;
pub mod patch;
pub mod prelude;
pub mod process;
pub mod scan;
pub mod session;

pub use address::Address;
pub use config::{LimitOverride, PatchConfig, PatchConfigBuilder};
pub use error::{Error, Result};
pub use limits::{
    Candidate, Confidence, ContextRule, HeuristicSettings, LimitCategory, LimitSignature,
    default_signatures, find_candidates,
};
pub use memory::{MemoryBackend, ProcessMemoryAccessor, Protection, TimedBackend};
#[cfg(target_os = "windows")]
pub use memory::WindowsProcess;
pub use module::{ModuleImage, locate_main_module};
pub use patch::{
    BackupEntry, BackupStore, CandidateState, PatchApplier, PatchRecord, PatchValidator,
    RejectReason, Rejection, ValidatedCandidate,
};
pub use process::{ProcessEntry, find_target_process, launch_game, list_processes};
pub use scan::{BytePattern, Endian, IntWidth, ScanMatch, scan};
pub use session::{
    CategorySummary, PatchSession, PatchSessionResult, RestoreSummary, ScanReport,
    SessionAbort, SessionContext, SessionLog, restore_patches, run_patch_session, run_with,
    scan_process, spawn_delayed_session,
};
