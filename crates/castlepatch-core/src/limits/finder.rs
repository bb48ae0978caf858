//! Candidate selection for one limit category.
//!
//! A pattern match becomes a candidate only when one of the category's
//! context needles sits close by. When none does and the loose fallback is
//! enabled, a cluster of small integers around the match is accepted
//! instead. The fallback is weak and will occasionally pick a
//! wrong constant.

use std::ops::Range;

use memchr::memmem;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ContextRule, LimitCategory, LimitSignature};
use crate::address::Address;
use crate::scan::{BytePattern, scan};

/// Bytes either side of a candidate searched for small-integer neighbours
pub const CLUSTER_RADIUS: usize = 32;
/// Largest word value that counts as a "small integer"
pub const CLUSTER_MAX_VALUE: u32 = 64;
/// Neighbours required before the fallback accepts a candidate
pub const CLUSTER_MIN_NEIGHBOURS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicSettings {
    /// Accept clustered small integers when no context needle is nearby
    pub loose_fallback: bool,
}

impl Default for HeuristicSettings {
    fn default() -> Self {
        Self {
            loose_fallback: true,
        }
    }
}

impl HeuristicSettings {
    pub fn strict() -> Self {
        Self {
            loose_fallback: false,
        }
    }
}

/// Why a candidate was accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Confidence {
    Context { needle: String },
    Clustered { neighbours: usize },
}

/// An address proposed for patching
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub address: Address,
    pub category: LimitCategory,
    /// Bytes observed at `address` during the scan
    pub original: BytePattern,
    pub replacement: BytePattern,
    pub confidence: Confidence,
}

/// Accepted candidates for `signature` anywhere in `buffer`.
///
/// `base` is the target address of `buffer[0]`. Addresses are unique; when
/// several patterns match at one offset the first accepted pattern wins.
pub fn find_candidates(
    buffer: &[u8],
    base: Address,
    signature: &LimitSignature,
    heuristics: HeuristicSettings,
) -> Vec<Candidate> {
    find_candidates_in(buffer, base, 0..buffer.len(), signature, heuristics)
}

/// Like [`find_candidates`], reporting only matches whose offset lies in `owned`.
///
/// The bytes outside `owned` still serve as context.
pub fn find_candidates_in(
    buffer: &[u8],
    base: Address,
    owned: Range<usize>,
    signature: &LimitSignature,
    heuristics: HeuristicSettings,
) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    let mut last_offset = None;

    for m in scan(buffer, &signature.patterns) {
        if !owned.contains(&m.offset) || last_offset == Some(m.offset) {
            continue;
        }

        let pattern = &signature.patterns[m.pattern_index];
        let address = base.add(m.offset);

        let confidence = match context_needle(buffer, m.offset, &signature.context) {
            Some(rule) => Confidence::Context {
                needle: rule.needle_str(),
            },
            None if heuristics.loose_fallback => {
                let neighbours = clustered_neighbours(buffer, m.offset, pattern.len());
                if neighbours < CLUSTER_MIN_NEIGHBOURS {
                    continue;
                }
                Confidence::Clustered { neighbours }
            }
            None => continue,
        };

        debug!(
            "{} candidate at {} ({:?})",
            signature.category, address, confidence
        );
        last_offset = Some(m.offset);
        candidates.push(Candidate {
            address,
            category: signature.category,
            original: pattern.clone(),
            replacement: signature.replacement.clone(),
            confidence,
        });
    }

    candidates
}

/// First rule whose needle starts within its radius of `offset`
fn context_needle<'r>(
    buffer: &[u8],
    offset: usize,
    rules: &'r [ContextRule],
) -> Option<&'r ContextRule> {
    rules.iter().find(|rule| {
        if rule.needle.is_empty() {
            return false;
        }
        let lo = offset.saturating_sub(rule.window_radius);
        let hi = offset
            .saturating_add(rule.window_radius)
            .saturating_add(rule.needle.len())
            .min(buffer.len());
        lo < hi && memmem::find(&buffer[lo..hi], &rule.needle).is_some()
    })
}

/// Count 32-bit words in `1..=CLUSTER_MAX_VALUE` near `offset`.
///
/// Words are taken at 4-byte steps from the candidate, skipping any word
/// that overlaps the candidate's own `len` bytes.
fn clustered_neighbours(buffer: &[u8], offset: usize, len: usize) -> usize {
    let steps_back = offset.min(CLUSTER_RADIUS) / 4;
    let first = offset - steps_back * 4;
    let last = offset + len + CLUSTER_RADIUS;

    (first..=last)
        .step_by(4)
        .filter(|&p| p + 4 <= buffer.len())
        .filter(|&p| p + 4 <= offset || p >= offset + len)
        .filter(|&p| {
            let word = u32::from_le_bytes([buffer[p], buffer[p + 1], buffer[p + 2], buffer[p + 3]]);
            (1..=CLUSTER_MAX_VALUE).contains(&word)
        })
        .count()
}
