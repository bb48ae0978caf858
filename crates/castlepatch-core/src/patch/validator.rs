use tracing::debug;

use super::{CandidateState, RejectReason, Rejection};
use crate::limits::Candidate;
use crate::memory::{MemoryBackend, ProcessMemoryAccessor};

/// A candidate that passed every pre-write check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCandidate(Candidate);

impl ValidatedCandidate {
    pub fn candidate(&self) -> &Candidate {
        &self.0
    }

    pub(crate) fn into_inner(self) -> Candidate {
        self.0
    }
}

pub struct PatchValidator<'a, B> {
    accessor: &'a ProcessMemoryAccessor<B>,
}

impl<'a, B: MemoryBackend> PatchValidator<'a, B> {
    pub fn new(accessor: &'a ProcessMemoryAccessor<B>) -> Self {
        Self { accessor }
    }

    /// Run the pre-write checks in order: lengths, no-op, liveness, then a
    /// re-read of the live bytes.
    pub fn validate(&self, candidate: Candidate) -> Result<ValidatedCandidate, Rejection> {
        let original = candidate.original.as_bytes();
        let replacement = candidate.replacement.as_bytes();

        if original.len() != replacement.len() {
            return Err(Rejection::of(
                &candidate,
                RejectReason::LengthMismatch {
                    original: original.len(),
                    replacement: replacement.len(),
                },
            ));
        }
        if original == replacement {
            return Err(Rejection::of(&candidate, RejectReason::NoOp));
        }
        if !self.accessor.is_alive() {
            return Err(Rejection::of(&candidate, RejectReason::ProcessGone));
        }

        let live = self
            .accessor
            .read_region(candidate.address, original.len())
            .map_err(|e| {
                Rejection::of(
                    &candidate,
                    RejectReason::ReadFault {
                        message: e.to_string(),
                    },
                )
            })?;
        if live != original {
            return Err(Rejection::of(&candidate, RejectReason::Stale { found: live }));
        }

        debug!("Validated {} candidate at {}", candidate.category, candidate.address);
        Ok(ValidatedCandidate(candidate))
    }

    /// `Proposed` becomes `Validated` or `Rejected`; other states pass through
    pub fn advance(&self, state: CandidateState) -> CandidateState {
        match state {
            CandidateState::Proposed(candidate) => match self.validate(candidate) {
                Ok(validated) => CandidateState::Validated(validated),
                Err(rejection) => CandidateState::Rejected(rejection),
            },
            other => other,
        }
    }
}
