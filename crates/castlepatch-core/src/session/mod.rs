//! One end-to-end patch session: locate module → scan → validate → write.
//!
//! A session owns its process handle and a [`SessionContext`]; both are
//! dropped when it ends. Nothing here returns an error to the caller: every
//! fault becomes a rejection, a counted chunk fault, or an aborted
//! [`PatchSessionResult`] reporting zero patches.

mod log;
mod schedule;

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::address::Address;
use crate::config::PatchConfig;
use crate::error::{Error, Result};
use crate::limits::{
    CLUSTER_RADIUS, Candidate, HeuristicSettings, LimitCategory, LimitSignature,
    find_candidates_in,
};
use crate::memory::{MemoryBackend, ProcessMemoryAccessor};
use crate::module::{ModuleImage, locate_main_module};
use crate::patch::{
    BackupStore, CandidateState, PatchApplier, PatchRecord, PatchValidator, Rejection,
};
use crate::scan::chunk_spans;

pub use log::SessionLog;
pub use schedule::{spawn_delayed_session, spawn_delayed_with};

/// Subdirectory of the artifact dir holding backup files
pub const BACKUP_DIR: &str = "backups";

/// Read granularity when a chunk has to be retried page by page
const PAGE_SIZE: usize = 0x1000;

/// Per-session state passed to every component
pub struct SessionContext {
    pub config: PatchConfig,
    pub log: SessionLog,
    pub backups: BackupStore,
}

impl SessionContext {
    pub fn new(config: PatchConfig, log: SessionLog, backups: BackupStore) -> Self {
        Self {
            config,
            log,
            backups,
        }
    }

    /// Context writing its log and backups under `config.artifact_dir`.
    ///
    /// If the log file cannot be created the session still runs, logging
    /// through tracing only.
    pub fn create(config: PatchConfig) -> Self {
        let log = SessionLog::create(&config.artifact_dir).unwrap_or_else(|e| {
            warn!(
                "Cannot create session log in {}: {}",
                config.artifact_dir.display(),
                e
            );
            SessionLog::detached()
        });
        let backups = BackupStore::new(config.artifact_dir.join(BACKUP_DIR));
        Self::new(config, log, backups)
    }
}

/// Why a session stopped before patching anything
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionAbort {
    pub message: String,
    /// A later session against the same process may succeed
    pub retryable: bool,
}

impl SessionAbort {
    fn from_error(error: &Error) -> Self {
        Self {
            message: error.to_string(),
            retryable: error.is_retryable(),
        }
    }
}

/// Per-category outcome. `candidates == 0` is a heuristic miss.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category: LimitCategory,
    pub candidates: usize,
    pub applied: usize,
    pub rejected: usize,
}

impl CategorySummary {
    fn new(category: LimitCategory) -> Self {
        Self {
            category,
            candidates: 0,
            applied: 0,
            rejected: 0,
        }
    }

    pub fn is_miss(&self) -> bool {
        self.candidates == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchSessionResult {
    pub pid: u32,
    pub module: Option<ModuleImage>,
    pub records: Vec<PatchRecord>,
    pub rejections: Vec<Rejection>,
    pub categories: Vec<CategorySummary>,
    /// Module chunks that could not be read and were skipped
    pub chunk_faults: usize,
    pub aborted: Option<SessionAbort>,
    pub log_path: Option<PathBuf>,
}

impl PatchSessionResult {
    fn empty(pid: u32, log_path: Option<PathBuf>) -> Self {
        Self {
            pid,
            module: None,
            records: Vec::new(),
            rejections: Vec::new(),
            categories: Vec::new(),
            chunk_faults: 0,
            aborted: None,
            log_path,
        }
    }

    /// A session that stopped on `error` with zero patches
    pub fn aborted(pid: u32, error: &Error, log_path: Option<PathBuf>) -> Self {
        Self {
            aborted: Some(SessionAbort::from_error(error)),
            ..Self::empty(pid, log_path)
        }
    }

    pub fn any_applied(&self) -> bool {
        !self.records.is_empty()
    }

    pub fn applied_count(&self) -> usize {
        self.records.len()
    }

    pub fn rejected_count(&self) -> usize {
        self.rejections.len()
    }

    pub fn is_retryable(&self) -> bool {
        self.aborted.as_ref().is_some_and(|a| a.retryable)
    }

    /// One-line user-facing status, e.g. `"2 patches applied"`
    pub fn summary(&self) -> String {
        let n = self.applied_count();
        format!("{} {} applied", n, if n == 1 { "patch" } else { "patches" })
    }

    pub fn write_report<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn load_report<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl fmt::Display for PatchSessionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())?;
        if self.rejected_count() > 0 {
            write!(f, ", {} rejected", self.rejected_count())?;
        }
        if let Some(abort) = &self.aborted {
            write!(f, " (aborted: {})", abort.message)?;
        }
        Ok(())
    }
}

/// Candidates found by a dry run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub pid: u32,
    pub module: Option<ModuleImage>,
    pub candidates: Vec<Candidate>,
    pub categories: Vec<CategorySummary>,
    pub chunk_faults: usize,
    pub aborted: Option<SessionAbort>,
}

/// Outcome of writing recorded originals back
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreSummary {
    pub restored: usize,
    pub failures: Vec<(Address, String)>,
}

struct Collected {
    module: Option<ModuleImage>,
    candidates: Vec<Candidate>,
    categories: Vec<CategorySummary>,
    claimed: HashSet<Address>,
    chunk_faults: usize,
    aborted: Option<Error>,
}

impl Collected {
    /// Take the candidates found in `buffer` whose address is not claimed yet
    fn claim(
        &mut self,
        log: &SessionLog,
        signatures: &[LimitSignature],
        heuristics: HeuristicSettings,
        buffer: &[u8],
        base: Address,
        owned: Range<usize>,
    ) {
        for (signature, summary) in signatures.iter().zip(self.categories.iter_mut()) {
            for candidate in
                find_candidates_in(buffer, base, owned.clone(), signature, heuristics)
            {
                if !self.claimed.insert(candidate.address) {
                    debug!(
                        "{} already claimed, ignoring {} match",
                        candidate.address, candidate.category
                    );
                    continue;
                }
                log.debug(format!(
                    "Found {} candidate at {} ({})",
                    candidate.category,
                    candidate.address,
                    describe(&candidate)
                ));
                summary.candidates += 1;
                self.candidates.push(candidate);
            }
        }
    }
}

pub struct PatchSession<B> {
    accessor: ProcessMemoryAccessor<B>,
    ctx: SessionContext,
}

impl<B: MemoryBackend> PatchSession<B> {
    pub fn new(backend: B, ctx: SessionContext) -> Self {
        Self {
            accessor: ProcessMemoryAccessor::new(backend),
            ctx,
        }
    }

    pub fn accessor(&self) -> &ProcessMemoryAccessor<B> {
        &self.accessor
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    fn log_path(&self) -> Option<PathBuf> {
        self.ctx.log.path().map(Path::to_path_buf)
    }

    /// Scan, validate and write every accepted candidate, one at a time
    pub fn run(&self) -> PatchSessionResult {
        let pid = self.accessor.pid();
        let log = &self.ctx.log;
        log.info(format!("Patch session started for process {}", pid));

        let collected = self.collect();
        let mut result = PatchSessionResult {
            module: collected.module,
            categories: collected.categories,
            chunk_faults: collected.chunk_faults,
            ..PatchSessionResult::empty(pid, self.log_path())
        };
        if let Some(error) = collected.aborted {
            log.warn(format!("Session aborted: {}", error));
            result.aborted = Some(SessionAbort::from_error(&error));
            return result;
        }

        let validator = PatchValidator::new(&self.accessor);
        let applier = PatchApplier::new(&self.accessor, &self.ctx.backups, log);

        for candidate in collected.candidates {
            let category = candidate.category;
            let mut state = CandidateState::Proposed(candidate);
            while !state.is_terminal() {
                state = applier.advance(validator.advance(state));
            }

            let summary = result
                .categories
                .iter_mut()
                .find(|s| s.category == category);
            match state {
                CandidateState::Applied(record) => {
                    if let Some(s) = summary {
                        s.applied += 1;
                    }
                    result.records.push(record);
                }
                CandidateState::Rejected(rejection) => {
                    log.warn(format!(
                        "Rejected {} candidate at {}: {}",
                        rejection.category, rejection.address, rejection.reason
                    ));
                    if let Some(s) = summary {
                        s.rejected += 1;
                    }
                    result.rejections.push(rejection);
                }
                CandidateState::Proposed(_) | CandidateState::Validated(_) => {}
            }
        }

        log.info(format!("Session finished: {}", result));
        if let Some(path) = &result.log_path {
            log.info(format!("Log written to {}", path.display()));
        }
        result
    }

    /// Find candidates without validating or writing anything
    pub fn scan_only(&self) -> ScanReport {
        let pid = self.accessor.pid();
        self.ctx
            .log
            .info(format!("Dry-run scan started for process {}", pid));

        let collected = self.collect();
        let aborted = collected.aborted.map(|e| {
            self.ctx.log.warn(format!("Scan aborted: {}", e));
            SessionAbort::from_error(&e)
        });
        ScanReport {
            pid,
            module: collected.module,
            candidates: collected.candidates,
            categories: collected.categories,
            chunk_faults: collected.chunk_faults,
            aborted,
        }
    }

    /// Write back the originals of `records`, newest first
    pub fn restore(&self, records: &[PatchRecord]) -> RestoreSummary {
        let applier = PatchApplier::new(&self.accessor, &self.ctx.backups, &self.ctx.log);
        let mut summary = RestoreSummary::default();
        for record in records.iter().rev() {
            match applier.restore(record) {
                Ok(()) => summary.restored += 1,
                Err(e) => {
                    self.ctx
                        .log
                        .warn(format!("Could not restore {}: {}", record.address(), e));
                    summary.failures.push((record.address(), e.to_string()));
                }
            }
        }
        summary
    }

    fn collect(&self) -> Collected {
        let log = &self.ctx.log;
        let mut collected = Collected {
            module: None,
            candidates: Vec::new(),
            categories: Vec::new(),
            claimed: HashSet::new(),
            chunk_faults: 0,
            aborted: None,
        };

        let signatures = match self.ctx.config.signatures() {
            Ok(signatures) => signatures,
            Err(e) => {
                collected.aborted = Some(e);
                return collected;
            }
        };
        collected.categories = signatures
            .iter()
            .map(|s| CategorySummary::new(s.category))
            .collect();

        let module = match locate_main_module(&self.accessor) {
            Ok(module) => module,
            Err(e) => {
                collected.aborted = Some(e);
                return collected;
            }
        };
        log.info(format!(
            "Scanning {} at {} ({} bytes)",
            module.name, module.base, module.size
        ));

        let (lead, trail) = overlap(&signatures);
        let heuristics = self.ctx.config.heuristics;

        for span in chunk_spans(&module, self.ctx.config.chunk_size, lead, trail) {
            let error = match self.accessor.read_region(span.start, span.len) {
                Ok(buffer) => {
                    collected.claim(log, &signatures, heuristics, &buffer, span.start, span.owned);
                    continue;
                }
                Err(e) => e,
            };

            collected.chunk_faults += 1;
            log.warn(format!("Chunk at {} unreadable: {}", span.start, error));
            if !self.accessor.is_alive() {
                collected.aborted = Some(Error::ProcessExited(self.accessor.pid()));
                break;
            }
            if !matches!(error, Error::ReadFault { .. }) {
                continue;
            }

            for (offset, buffer) in self.readable_runs(span.start, span.len) {
                let end = offset + buffer.len();
                let owned = span.owned.start.max(offset)..span.owned.end.min(end);
                if owned.is_empty() {
                    continue;
                }
                collected.claim(
                    log,
                    &signatures,
                    heuristics,
                    &buffer,
                    span.start.add(offset),
                    owned.start - offset..owned.end - offset,
                );
            }
        }

        if collected.aborted.is_none() {
            for summary in collected.categories.iter().filter(|s| s.is_miss()) {
                log.info(format!(
                    "No {} candidates found, skipping",
                    summary.category.label()
                ));
            }
        }
        collected.module = Some(module);
        collected
    }

    /// Page by page reads of a chunk whose single read failed.
    ///
    /// Returns the readable runs as (offset into the chunk, bytes), merging
    /// adjacent pages.
    fn readable_runs(&self, start: Address, len: usize) -> Vec<(usize, Vec<u8>)> {
        let mut runs: Vec<(usize, Vec<u8>)> = Vec::new();
        let mut offset = 0;
        while offset < len {
            let address = start.add(offset);
            let to_boundary = PAGE_SIZE - (address.as_u64() % PAGE_SIZE as u64) as usize;
            let n = to_boundary.min(len - offset);
            match self.accessor.read_region(address, n) {
                Ok(bytes) => match runs.last_mut() {
                    Some((run_start, run)) if *run_start + run.len() == offset => {
                        run.extend_from_slice(&bytes)
                    }
                    _ => runs.push((offset, bytes)),
                },
                Err(e) => debug!("Page at {} unreadable: {}", address, e),
            }
            offset += n;
        }
        runs
    }
}

/// Bytes read before and after each chunk so that matches near a boundary
/// keep their full context window.
fn overlap(signatures: &[LimitSignature]) -> (usize, usize) {
    let radius = signatures
        .iter()
        .map(LimitSignature::max_window_radius)
        .max()
        .unwrap_or(0)
        .max(CLUSTER_RADIUS);
    let pattern = signatures
        .iter()
        .map(LimitSignature::max_pattern_len)
        .max()
        .unwrap_or(0);
    let needle = signatures
        .iter()
        .flat_map(|s| s.context.iter())
        .map(|r| r.needle.len())
        .max()
        .unwrap_or(0);
    (radius, radius + pattern + needle.max(4))
}

fn describe(candidate: &Candidate) -> String {
    match &candidate.confidence {
        crate::limits::Confidence::Context { needle } => format!("near \"{}\"", needle),
        crate::limits::Confidence::Clustered { neighbours } => {
            format!("{} small integers nearby", neighbours)
        }
    }
}

/// Open `pid` with `open` and run one session.
///
/// An open failure, such as access denied, yields an aborted result.
pub fn run_with<B, F>(pid: u32, open: F, ctx: SessionContext) -> PatchSessionResult
where
    B: MemoryBackend,
    F: FnOnce(u32) -> Result<B>,
{
    match open(pid) {
        Ok(backend) => PatchSession::new(backend, ctx).run(),
        Err(e) => {
            ctx.log
                .warn(format!("Cannot open process {}: {}", pid, e));
            PatchSessionResult::aborted(pid, &e, ctx.log.path().map(Path::to_path_buf))
        }
    }
}

/// Run a session against the live process `pid`.
///
/// Every OS call is bounded by `config.os_call_timeout`.
#[cfg(target_os = "windows")]
pub fn run_patch_session(pid: u32, config: PatchConfig) -> PatchSessionResult {
    use crate::memory::{TimedBackend, WindowsProcess};

    let timeout = config.os_call_timeout();
    run_with(
        pid,
        move |pid| WindowsProcess::open(pid).map(|p| TimedBackend::new(p, timeout)),
        SessionContext::create(config),
    )
}

#[cfg(not(target_os = "windows"))]
pub fn run_patch_session(pid: u32, config: PatchConfig) -> PatchSessionResult {
    let ctx = SessionContext::create(config);
    let error = Error::Unsupported("Memory patching");
    ctx.log.warn(format!("Cannot open process {}: {}", pid, error));
    PatchSessionResult::aborted(pid, &error, ctx.log.path().map(Path::to_path_buf))
}

/// Dry run against the live process `pid`
#[cfg(target_os = "windows")]
pub fn scan_process(pid: u32, config: PatchConfig) -> Result<ScanReport> {
    use crate::memory::{TimedBackend, WindowsProcess};

    let backend = TimedBackend::new(WindowsProcess::open(pid)?, config.os_call_timeout());
    Ok(PatchSession::new(backend, SessionContext::create(config)).scan_only())
}

#[cfg(not(target_os = "windows"))]
pub fn scan_process(_pid: u32, _config: PatchConfig) -> Result<ScanReport> {
    Err(Error::Unsupported("Memory scanning"))
}

/// Undo the patches of an earlier session against the live process `pid`
#[cfg(target_os = "windows")]
pub fn restore_patches(
    pid: u32,
    records: &[PatchRecord],
    config: PatchConfig,
) -> Result<RestoreSummary> {
    use crate::memory::{TimedBackend, WindowsProcess};

    let backend = TimedBackend::new(WindowsProcess::open(pid)?, config.os_call_timeout());
    Ok(PatchSession::new(backend, SessionContext::create(config)).restore(records))
}

#[cfg(not(target_os = "windows"))]
pub fn restore_patches(
    _pid: u32,
    _records: &[PatchRecord],
    _config: PatchConfig,
) -> Result<RestoreSummary> {
    Err(Error::Unsupported("Patch restoration"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MockProcess, MockProcessBuilder, TimedBackend};
    use std::time::Duration;
    use crate::patch::RejectReason;
    use tempfile::{TempDir, tempdir};

    const BASE: u64 = 0x1_4000_0000;

    fn team_image() -> Vec<u8> {
        let mut image = vec![0u8; 4096];
        image[100..116].copy_from_slice(b"CurrentTeamInfos");
        image[140..144].copy_from_slice(&[4, 0, 0, 0]);
        image
    }

    /// Image with one context-backed candidate per category
    fn full_image() -> Vec<u8> {
        let mut image = vec![0u8; 16 * 1024];
        let mut put = |at: usize, bytes: &[u8]| image[at..at + bytes.len()].copy_from_slice(bytes);
        put(100, b"CurrentTeamInfos");
        put(140, &4i32.to_le_bytes());
        put(2000, b"MaxPlayers");
        put(2040, &8i32.to_le_bytes());
        // straddles the 4 KiB chunk boundary
        put(4080, b"MaxBricktrons");
        put(4100, &100i32.to_le_bytes());
        put(9000, b"MaxResources");
        put(9020, &999i32.to_le_bytes());
        image
    }

    fn context(dir: &TempDir) -> SessionContext {
        let config = PatchConfig::builder()
            .artifact_dir(dir.path())
            .heuristics(HeuristicSettings::strict())
            .build();
        SessionContext::create(config)
    }

    fn mock(image: Vec<u8>) -> MockProcessBuilder {
        MockProcess::builder().base(BASE).memory(image)
    }

    #[test]
    fn test_team_limit_patched() {
        let dir = tempdir().unwrap();
        let session = PatchSession::new(mock(team_image()).build(), context(&dir));
        let result = session.run();

        assert!(result.aborted.is_none());
        assert_eq!(result.applied_count(), 1);
        assert_eq!(result.summary(), "1 patch applied");
        let record = &result.records[0];
        assert_eq!(record.address(), Address::new(BASE + 140));
        assert_eq!(record.new_bytes(), &[0x10, 0, 0, 0]);
        assert_eq!(
            session.accessor().backend().bytes_at(BASE + 140, 4),
            vec![0x10, 0, 0, 0]
        );

        let team = &result.categories[0];
        assert_eq!(team.category, LimitCategory::Team);
        assert_eq!((team.candidates, team.applied), (1, 1));
        assert!(result.categories[1..].iter().all(CategorySummary::is_miss));

        let log_path = result.log_path.as_ref().unwrap();
        let log = fs::read_to_string(log_path).unwrap();
        assert!(log.contains("Applied team limit"));
        assert!(log.contains("No player limit candidates found"));
        assert_eq!(session.context().backups.entries().unwrap().len(), 1);
    }

    #[test]
    fn test_every_category_patched_across_chunks() {
        let dir = tempdir().unwrap();
        let session = PatchSession::new(mock(full_image()).build(), context(&dir));
        let result = session.run();

        assert_eq!(result.applied_count(), 4);
        assert_eq!(result.rejected_count(), 0);
        assert!(result.categories.iter().all(|s| s.applied == 1));

        let addresses: Vec<u64> = result.records.iter().map(|r| r.address().as_u64()).collect();
        assert!(addresses.contains(&(BASE + 4100)));
        for record in &result.records {
            assert_eq!(record.original_bytes().len(), record.new_bytes().len());
        }
    }

    #[test]
    fn test_value_outside_window_is_heuristic_miss() {
        let dir = tempdir().unwrap();
        let mut image = vec![0u8; 4096];
        image[100..116].copy_from_slice(b"CurrentTeamInfos");
        image[3000..3004].copy_from_slice(&[4, 0, 0, 0]);

        let result = PatchSession::new(mock(image).build(), context(&dir)).run();
        assert!(result.aborted.is_none());
        assert!(!result.any_applied());
        assert_eq!(result.summary(), "0 patches applied");
        assert!(result.categories.iter().all(CategorySummary::is_miss));
    }

    #[test]
    fn test_write_fault_rejects_one_candidate_only() {
        let dir = tempdir().unwrap();
        let session = PatchSession::new(
            mock(full_image()).fail_write_at(BASE + 2040).build(),
            context(&dir),
        );
        let result = session.run();

        assert_eq!(result.applied_count(), 3);
        assert_eq!(result.rejected_count(), 1);
        let rejection = &result.rejections[0];
        assert_eq!(rejection.category, LimitCategory::Player);
        assert!(matches!(rejection.reason, RejectReason::WriteFault { .. }));
        assert_eq!(
            session.accessor().backend().bytes_at(BASE + 2040, 4),
            vec![8, 0, 0, 0]
        );
    }

    #[test]
    fn test_unreadable_chunk_is_skipped() {
        let dir = tempdir().unwrap();
        let result = PatchSession::new(
            mock(full_image()).fail_read_at(BASE + 9000).build(),
            context(&dir),
        )
        .run();

        assert!(result.aborted.is_none());
        assert!(result.chunk_faults >= 1);
        assert_eq!(result.applied_count(), 3);
        assert!(
            result
                .records
                .iter()
                .all(|r| r.category() != LimitCategory::Resource)
        );
    }

    #[test]
    fn test_readable_pages_of_faulted_chunk_are_scanned() {
        let dir = tempdir().unwrap();
        let session = PatchSession::new(
            mock(full_image()).fail_read_at(BASE + 0x1000).build(),
            context(&dir),
        );
        let report = session.scan_only();

        assert!(report.aborted.is_none());
        assert_eq!(report.chunk_faults, 2);
        let mut addresses: Vec<u64> = report
            .candidates
            .iter()
            .map(|c| c.address.as_u64())
            .collect();
        addresses.sort();
        assert_eq!(addresses, vec![BASE + 140, BASE + 2040, BASE + 9020]);
    }

    #[test]
    fn test_timed_out_write_rejects_candidate() {
        let slow: [fn(MockProcessBuilder) -> MockProcessBuilder; 2] = [
            |b| b.write_delay(Duration::from_millis(300)),
            |b| b.protect_delay(Duration::from_millis(300)),
        ];

        for (i, slow) in slow.iter().enumerate() {
            let dir = tempdir().unwrap();
            let backend =
                TimedBackend::new(slow(mock(team_image())).build(), Duration::from_millis(50));
            let result = PatchSession::new(backend, context(&dir)).run();

            assert!(result.aborted.is_none(), "case {i}");
            assert_eq!(result.applied_count(), 0, "case {i}");
            assert_eq!(result.rejected_count(), 1, "case {i}");
            match &result.rejections[0].reason {
                RejectReason::WriteFault { message } => {
                    assert!(message.contains("did not complete"), "case {i}: {message}")
                }
                other => panic!("case {i}: expected write fault, got {other}"),
            }
        }
    }

    #[test]
    fn test_process_exit_after_scan_rejects_candidates() {
        let dir = tempdir().unwrap();
        // 16 KiB image in 4 KiB chunks: the process exits after the last chunk read.
        let session = PatchSession::new(
            mock(full_image()).kill_after_reads(4).build(),
            context(&dir),
        );
        let result = session.run();

        assert!(result.aborted.is_none());
        assert_eq!(result.chunk_faults, 0);
        assert_eq!(result.applied_count(), 0);
        assert_eq!(result.rejected_count(), 4);
        assert!(
            result
                .rejections
                .iter()
                .all(|r| r.reason == RejectReason::ProcessGone)
        );
        assert!(session.accessor().backend().writes().is_empty());
    }

    #[test]
    fn test_dead_process_aborts_scan() {
        let dir = tempdir().unwrap();
        let result = PatchSession::new(mock(full_image()).dead().build(), context(&dir)).run();

        assert!(!result.any_applied());
        assert_eq!(result.chunk_faults, 1);
        let abort = result.aborted.unwrap();
        assert!(!abort.retryable);
        assert!(abort.message.contains("exited"));
    }

    #[test]
    fn test_missing_module_is_retryable_abort() {
        let dir = tempdir().unwrap();
        let result = PatchSession::new(
            mock(team_image())
                .without_primary_module()
                .without_modules()
                .build(),
            context(&dir),
        )
        .run();

        assert!(!result.any_applied());
        assert!(result.is_retryable());
    }

    #[test]
    fn test_access_denied_reports_zero_patches() {
        let dir = tempdir().unwrap();
        let result = run_with(
            7,
            |pid| mock(team_image()).pid(pid).deny_access().build().open(),
            context(&dir),
        );

        assert_eq!(result.pid, 7);
        assert_eq!(result.applied_count(), 0);
        assert!(!result.is_retryable());
        assert!(result.aborted.unwrap().message.contains("Access denied"));
    }

    #[test]
    fn test_session_never_fails_under_faults() {
        type Fault = fn(MockProcessBuilder) -> MockProcessBuilder;
        let faults: [Fault; 8] = [
            |b| b,
            |b| b.dead(),
            |b| b.fail_read_at(BASE + 140),
            |b| b.fail_read_at(BASE + 4100),
            |b| b.fail_write_at(BASE + 140).fail_write_at(BASE + 9020),
            |b| b.fail_protect_at(BASE + 2040),
            |b| b.without_primary_module(),
            |b| b.without_primary_module().without_modules(),
        ];

        for (i, fault) in faults.iter().enumerate() {
            let dir = tempdir().unwrap();
            let result = run_with(4242, |_| Ok(fault(mock(full_image())).build()), context(&dir));
            assert_eq!(result.pid, 4242, "fault {i}");
            assert!(result.applied_count() + result.rejected_count() <= 4, "fault {i}");
            for record in &result.records {
                assert_eq!(record.original_bytes().len(), record.new_bytes().len());
                assert_ne!(record.original_bytes(), record.new_bytes());
            }
        }
    }

    #[test]
    fn test_loose_fallback_only_when_enabled() {
        let mut image = vec![0u8; 4096];
        image[1000..1004].copy_from_slice(&4i32.to_le_bytes());
        for (i, v) in [2u32, 3, 5].iter().enumerate() {
            let at = 1008 + i * 4;
            image[at..at + 4].copy_from_slice(&v.to_le_bytes());
        }

        let dir = tempdir().unwrap();
        let strict = PatchSession::new(mock(image.clone()).build(), context(&dir)).run();
        assert!(!strict.any_applied());

        let dir = tempdir().unwrap();
        let config = PatchConfig::builder().artifact_dir(dir.path()).build();
        let loose = PatchSession::new(mock(image).build(), SessionContext::create(config)).run();
        assert!(loose.records.iter().any(|r| r.address() == Address::new(BASE + 1000)));
    }

    #[test]
    fn test_scan_only_writes_nothing() {
        let dir = tempdir().unwrap();
        let session = PatchSession::new(mock(full_image()).build(), context(&dir));
        let report = session.scan_only();

        assert_eq!(report.candidates.len(), 4);
        assert!(report.aborted.is_none());
        assert!(session.accessor().backend().writes().is_empty());
        assert!(session.context().backups.entries().unwrap().is_empty());
    }

    #[test]
    fn test_report_round_trip_and_restore() {
        let dir = tempdir().unwrap();
        let session = PatchSession::new(mock(full_image()).build(), context(&dir));
        let before = session.accessor().backend().bytes_at(BASE, 16 * 1024);
        let result = session.run();

        let report = dir.path().join("report.json");
        result.write_report(&report).unwrap();
        let loaded = PatchSessionResult::load_report(&report).unwrap();
        assert_eq!(loaded, result);

        let summary = session.restore(&loaded.records);
        assert_eq!(summary.restored, 4);
        assert!(summary.failures.is_empty());
        assert_eq!(session.accessor().backend().bytes_at(BASE, 16 * 1024), before);
    }

    #[test]
    fn test_overlap_covers_window_and_pattern() {
        let signatures = crate::limits::default_signatures();
        let (lead, trail) = overlap(&signatures);
        assert_eq!(lead, crate::limits::DEFAULT_WINDOW_RADIUS);
        assert!(trail >= lead + 4 + "StockpileCapacity".len());
    }
}
