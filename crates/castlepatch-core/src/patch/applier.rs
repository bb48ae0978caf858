use super::{
    BackupStore, CandidateState, PatchRecord, RejectReason, Rejection, ValidatedCandidate,
};
use crate::error::{Error, Result};
use crate::limits::Confidence;
use crate::memory::{MemoryBackend, ProcessMemoryAccessor};
use crate::session::SessionLog;

pub struct PatchApplier<'a, B> {
    accessor: &'a ProcessMemoryAccessor<B>,
    backups: &'a BackupStore,
    log: &'a SessionLog,
}

impl<'a, B: MemoryBackend> PatchApplier<'a, B> {
    pub fn new(
        accessor: &'a ProcessMemoryAccessor<B>,
        backups: &'a BackupStore,
        log: &'a SessionLog,
    ) -> Self {
        Self {
            accessor,
            backups,
            log,
        }
    }

    /// Back up the original bytes, write the replacement and read it back.
    ///
    /// A write that times out may still land after the rejection; the backup
    /// file keeps the original bytes for a later restore.
    pub fn apply(
        &self,
        validated: ValidatedCandidate,
    ) -> std::result::Result<PatchRecord, Rejection> {
        let candidate = validated.into_inner();
        let address = candidate.address;
        let original = candidate.original.as_bytes();
        let replacement = candidate.replacement.as_bytes();

        let description = match &candidate.confidence {
            Confidence::Context { needle } => {
                format!("{} near \"{}\"", candidate.category.label(), needle)
            }
            Confidence::Clustered { neighbours } => format!(
                "{} by clustered fallback ({} neighbours)",
                candidate.category.label(),
                neighbours
            ),
        };

        let backup = match self.backups.record(address, original, &description) {
            Ok(entry) => entry,
            Err(e) => {
                return Err(Rejection::of(
                    &candidate,
                    RejectReason::BackupFailed {
                        message: e.to_string(),
                    },
                ));
            }
        };

        if let Err(e) = self.accessor.write_region(address, replacement) {
            if matches!(e, Error::Timeout { .. }) {
                self.log.warn(format!(
                    "Write at {} timed out and may still complete; original bytes are in {}",
                    address,
                    backup.file.display()
                ));
            }
            return Err(Rejection::of(
                &candidate,
                RejectReason::WriteFault {
                    message: e.to_string(),
                },
            ));
        }

        match self.accessor.read_region(address, replacement.len()) {
            Ok(found) if found != replacement => {
                return Err(Rejection::of(&candidate, RejectReason::VerifyFailed { found }));
            }
            Ok(_) => {}
            Err(e) => self.log.warn(format!(
                "Wrote {} bytes at {} but could not read them back: {}",
                replacement.len(),
                address,
                e
            )),
        }

        self.log.info(format!(
            "Applied {} at {}: {} -> {} ({} bytes)",
            candidate.category.label(),
            address,
            candidate.original,
            candidate.replacement,
            replacement.len()
        ));

        Ok(PatchRecord::new(
            address,
            candidate.original,
            candidate.replacement,
            candidate.category,
        ))
    }

    /// `Validated` becomes `Applied` or `Rejected`; other states pass through
    pub fn advance(&self, state: CandidateState) -> CandidateState {
        match state {
            CandidateState::Validated(validated) => match self.apply(validated) {
                Ok(record) => CandidateState::Applied(record),
                Err(rejection) => CandidateState::Rejected(rejection),
            },
            other => other,
        }
    }

    /// Write a record's original bytes back.
    ///
    /// Only acts when the live bytes still hold the patched value; memory
    /// already holding the original is left alone.
    pub fn restore(&self, record: &PatchRecord) -> Result<()> {
        let address = record.address();
        let live = self
            .accessor
            .read_region(address, record.original_bytes().len())?;

        if live == record.original_bytes() {
            self.log
                .info(format!("{} already holds original bytes", address));
            return Ok(());
        }
        if live != record.new_bytes() {
            return Err(Error::StaleCandidate {
                address,
                expected: record.new_bytes().to_vec(),
                found: live,
            });
        }

        self.accessor
            .write_region(address, record.original_bytes())?;
        self.log.info(format!(
            "Restored {} bytes at {} ({})",
            record.original_bytes().len(),
            address,
            record.category().label()
        ));
        Ok(())
    }
}
