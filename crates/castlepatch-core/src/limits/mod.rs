//! Known gameplay limits and how to recognise them in memory.
//!
//! Each [`LimitSignature`] pairs the values a limit is expected to hold with
//! the value it should be raised to, plus the ASCII field names that are
//! expected to sit near the constant in the module image.

mod finder;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::scan::BytePattern;

pub use finder::{
    CLUSTER_MAX_VALUE, CLUSTER_MIN_NEIGHBOURS, CLUSTER_RADIUS, Candidate, Confidence,
    HeuristicSettings, find_candidates, find_candidates_in,
};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LimitCategory {
    Team,
    Player,
    Bricktron,
    Resource,
}

impl LimitCategory {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Team => "team limit",
            Self::Player => "player limit",
            Self::Bricktron => "bricktron limit",
            Self::Resource => "resource limit",
        }
    }
}

/// A candidate is accepted only if `needle` starts within `window_radius`
/// bytes of it, in the same buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextRule {
    pub needle: Vec<u8>,
    pub window_radius: usize,
}

impl ContextRule {
    pub fn new(needle: &str, window_radius: usize) -> Self {
        Self {
            needle: needle.as_bytes().to_vec(),
            window_radius,
        }
    }

    pub fn needle_str(&self) -> String {
        String::from_utf8_lossy(&self.needle).into_owned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitSignature {
    pub category: LimitCategory,
    /// Plausible current values, in priority order
    pub patterns: Vec<BytePattern>,
    pub replacement: BytePattern,
    pub context: Vec<ContextRule>,
}

impl LimitSignature {
    pub fn max_pattern_len(&self) -> usize {
        self.patterns.iter().map(BytePattern::len).max().unwrap_or(0)
    }

    pub fn max_window_radius(&self) -> usize {
        self.context
            .iter()
            .map(|r| r.window_radius)
            .max()
            .unwrap_or(0)
    }
}

/// Default context window around a candidate
pub const DEFAULT_WINDOW_RADIUS: usize = 128;

/// Built-in signatures for the stock game.
///
/// All limits are C# `int` fields, so patterns are 32-bit little-endian.
pub fn default_signatures() -> Vec<LimitSignature> {
    let rules = |needles: &[&str]| {
        needles
            .iter()
            .map(|n| ContextRule::new(n, DEFAULT_WINDOW_RADIUS))
            .collect::<Vec<_>>()
    };

    vec![
        LimitSignature {
            category: LimitCategory::Team,
            patterns: vec![BytePattern::le32(4)],
            replacement: BytePattern::le32(16),
            context: rules(&["CurrentTeamInfos", "MaxTeamCount", "maxTeams"]),
        },
        LimitSignature {
            category: LimitCategory::Player,
            patterns: vec![BytePattern::le32(8)],
            replacement: BytePattern::le32(32),
            context: rules(&["MaxPlayers", "maxPlayerCount", "PlayerSlots"]),
        },
        LimitSignature {
            category: LimitCategory::Bricktron,
            patterns: vec![BytePattern::le32(100), BytePattern::le32(50)],
            replacement: BytePattern::le32(500),
            context: rules(&["MaxBricktrons", "BricktronCap", "bricktronLimit"]),
        },
        LimitSignature {
            category: LimitCategory::Resource,
            patterns: vec![BytePattern::le32(999)],
            replacement: BytePattern::le32(9999),
            context: rules(&["MaxResources", "ResourceCap", "StockpileCapacity"]),
        },
    ]
}
